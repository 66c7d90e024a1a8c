use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::OnceLock;

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct AppSettings {
    pub package_manager: String,
    pub privilege_tool: String,
    pub installed_label: String, // text inside "(Installed)" as printed by the package manager
    pub force_c_locale: bool,
    pub help_url: String,
    pub icon_path: Option<String>,
    pub show_progress_on_actions: bool,
    pub research_after_action: bool,
    pub notify_on_task_complete: bool,
    pub theme: String,     // "default", "light", "dark"
    pub log_level: String, // error, warn, info, debug
    pub max_log_size_mb: u64,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            package_manager: "yay".to_string(),
            privilege_tool: "pkexec".to_string(),
            installed_label: "Installed".to_string(),
            force_c_locale: true,
            help_url: "https://wiki.archlinux.org/title/Pacman".to_string(),
            icon_path: None,
            show_progress_on_actions: true,
            research_after_action: true,
            notify_on_task_complete: false,
            theme: "default".to_string(),
            log_level: "info".to_string(),
            max_log_size_mb: 10,
        }
    }
}

pub static SETTINGS: OnceLock<Mutex<AppSettings>> = OnceLock::new();

pub fn init() {
    let settings = load_settings().unwrap_or_default();
    let _ = SETTINGS.set(Mutex::new(settings));
}

pub fn get() -> AppSettings {
    SETTINGS
        .get()
        .and_then(|s| s.lock().ok().map(|cfg| cfg.clone()))
        .unwrap_or_default()
}

fn get_config_path() -> PathBuf {
    let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push("yay-packer");
    path.push("settings.json");
    path
}

fn load_settings() -> Option<AppSettings> {
    let path = get_config_path();
    let content = fs::read_to_string(path).ok()?;
    parse_settings(&content)
}

fn parse_settings(content: &str) -> Option<AppSettings> {
    serde_json::from_str(content).ok()
}

#[cfg(test)]
mod tests {
    use super::{parse_settings, AppSettings};

    #[test]
    fn settings_roundtrip_json() {
        let settings = AppSettings::default();
        let json = serde_json::to_string(&settings).expect("serialize settings");
        let parsed: AppSettings = serde_json::from_str(&json).expect("deserialize settings");
        assert_eq!(parsed.package_manager, settings.package_manager);
        assert_eq!(parsed.privilege_tool, settings.privilege_tool);
        assert_eq!(parsed.installed_label, settings.installed_label);
        assert_eq!(parsed.force_c_locale, settings.force_c_locale);
        assert_eq!(parsed.help_url, settings.help_url);
        assert_eq!(parsed.icon_path, settings.icon_path);
        assert_eq!(
            parsed.show_progress_on_actions,
            settings.show_progress_on_actions
        );
        assert_eq!(parsed.research_after_action, settings.research_after_action);
        assert_eq!(parsed.theme, settings.theme);
        assert_eq!(parsed.log_level, settings.log_level);
        assert_eq!(parsed.max_log_size_mb, settings.max_log_size_mb);
    }

    #[test]
    fn partial_file_keeps_defaults_for_missing_fields() {
        let parsed = parse_settings(r#"{ "package_manager": "paru", "installed_label": "Instalado" }"#)
            .expect("partial settings parse");
        assert_eq!(parsed.package_manager, "paru");
        assert_eq!(parsed.installed_label, "Instalado");
        assert_eq!(parsed.privilege_tool, "pkexec");
        assert!(parsed.force_c_locale);
    }

    #[test]
    fn malformed_file_is_rejected() {
        assert!(parse_settings("{ not json").is_none());
    }
}
