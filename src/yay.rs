use crate::settings::AppSettings;
use std::ffi::OsStr;
use std::fmt;

/// One external invocation: a program and its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    /// Extra environment applied on top of the inherited one.
    pub env: Vec<(String, String)>,
}

impl CommandSpec {
    pub fn new<I, S>(program: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.to_string(),
            args: args.into_iter().map(Into::into).collect(),
            env: Vec::new(),
        }
    }

    pub fn with_env(mut self, key: &str, value: &str) -> Self {
        self.env.push((key.to_string(), value.to_string()));
        self
    }

    pub fn argv(&self) -> Vec<&OsStr> {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .map(OsStr::new)
            .collect()
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Install,
    Uninstall,
    UpdateSystem,
}

impl Action {
    pub fn title(&self) -> &'static str {
        match self {
            Action::Install => "Installing",
            Action::Uninstall => "Uninstalling",
            Action::UpdateSystem => "Updating system",
        }
    }
}

/// Builds the command lines for the package manager and the privilege helper.
#[derive(Debug, Clone)]
pub struct YayBackend {
    package_manager: String,
    privilege_tool: String,
    force_c_locale: bool,
}

impl YayBackend {
    pub fn from_settings(settings: &AppSettings) -> Self {
        Self {
            package_manager: settings.package_manager.clone(),
            privilege_tool: settings.privilege_tool.clone(),
            force_c_locale: settings.force_c_locale,
        }
    }

    pub fn package_manager(&self) -> &str {
        &self.package_manager
    }

    pub fn is_installed(&self) -> bool {
        command_exists(&self.package_manager)
    }

    pub fn search_command(&self, query: &str) -> CommandSpec {
        let spec = CommandSpec::new(&self.package_manager, ["-Ss", query]);
        if self.force_c_locale {
            spec.with_env("LC_ALL", "C")
        } else {
            spec
        }
    }

    /// `package` must already be stripped of its scope prefix.
    pub fn action_command(&self, action: Action, package: &str) -> CommandSpec {
        let pm = self.package_manager.as_str();
        match action {
            Action::Install => self.elevated([pm, "-S", "--noconfirm", package]),
            Action::Uninstall => self.elevated([pm, "-Rs", "--noconfirm", package]),
            Action::UpdateSystem => self.elevated([pm, "--noconfirm"]),
        }
    }

    fn elevated<'a, I>(&self, args: I) -> CommandSpec
    where
        I: IntoIterator<Item = &'a str>,
    {
        CommandSpec::new(&self.privilege_tool, args)
    }
}

pub fn command_exists(binary: &str) -> bool {
    std::env::var_os("PATH")
        .map(|paths| {
            std::env::split_paths(&paths)
                .map(|p| p.join(binary))
                .any(|full| full.is_file())
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> YayBackend {
        YayBackend::from_settings(&AppSettings::default())
    }

    #[test]
    fn search_command_uses_ss_and_c_locale() {
        let cmd = backend().search_command("firefox");
        assert_eq!(cmd.program, "yay");
        assert_eq!(cmd.args, vec!["-Ss", "firefox"]);
        assert_eq!(cmd.env, vec![("LC_ALL".to_string(), "C".to_string())]);
    }

    #[test]
    fn search_command_without_locale_override() {
        let settings = AppSettings {
            force_c_locale: false,
            ..AppSettings::default()
        };
        let cmd = YayBackend::from_settings(&settings).search_command("vim");
        assert!(cmd.env.is_empty());
    }

    #[test]
    fn action_commands_run_through_privilege_tool() {
        let b = backend();
        assert_eq!(
            b.action_command(Action::Install, "foo-bar").to_string(),
            "pkexec yay -S --noconfirm foo-bar"
        );
        assert_eq!(
            b.action_command(Action::Uninstall, "foo-bar").to_string(),
            "pkexec yay -Rs --noconfirm foo-bar"
        );
        assert_eq!(
            b.action_command(Action::UpdateSystem, "").to_string(),
            "pkexec yay --noconfirm"
        );
    }

    #[test]
    fn argv_starts_with_program() {
        let cmd = backend().action_command(Action::Install, "htop");
        let argv: Vec<_> = cmd.argv().iter().map(|s| s.to_string_lossy().into_owned()).collect();
        assert_eq!(argv, vec!["pkexec", "yay", "-S", "--noconfirm", "htop"]);
    }

    #[test]
    fn missing_binary_is_not_found() {
        assert!(!command_exists("definitely-not-a-real-binary-yay-packer"));
    }
}
