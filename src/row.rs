use crate::parser::PackageEntry;
use crate::yay::Action;
use std::collections::HashMap;

/// Toggle state behind one search result row.
///
/// The caption always names the action a click performs: "Install" for a
/// package that is not installed, "Uninstall" for one that is. The installed
/// flag only changes once the spawned action exits successfully.
#[derive(Debug, Clone)]
pub struct PackageRow {
    entry: PackageEntry,
    pending: Option<Action>,
}

impl PackageRow {
    pub fn new(entry: PackageEntry) -> Self {
        Self::resume(entry, None)
    }

    /// A row for `entry` whose `pending` action was started before the row
    /// existed, e.g. by a row from an earlier search.
    pub fn resume(entry: PackageEntry, pending: Option<Action>) -> Self {
        Self { entry, pending }
    }

    pub fn entry(&self) -> &PackageEntry {
        &self.entry
    }

    pub fn is_installed(&self) -> bool {
        self.entry.installed
    }

    pub fn is_busy(&self) -> bool {
        self.pending.is_some()
    }

    pub fn caption(&self) -> &'static str {
        match (self.pending, self.entry.installed) {
            (Some(Action::Install), _) => "Installing…",
            (Some(Action::Uninstall), _) => "Removing…",
            (_, false) => "Install",
            (_, true) => "Uninstall",
        }
    }

    /// Returns the action to launch, or `None` while a previous one is still
    /// running for this row.
    pub fn click(&mut self) -> Option<Action> {
        if self.pending.is_some() {
            return None;
        }
        let action = if self.entry.installed {
            Action::Uninstall
        } else {
            Action::Install
        };
        self.pending = Some(action);
        Some(action)
    }

    pub fn complete(&mut self, success: bool) {
        let Some(action) = self.pending.take() else {
            return;
        };
        if success {
            self.entry.installed = action == Action::Install;
        }
    }
}

/// Install/uninstall actions still running, keyed by package name.
#[derive(Debug, Default)]
pub struct ActionsInFlight {
    running: HashMap<String, Action>,
}

impl ActionsInFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` when `name` already has an action running.
    pub fn start(&mut self, name: &str, action: Action) -> bool {
        if self.running.contains_key(name) {
            return false;
        }
        self.running.insert(name.to_string(), action);
        true
    }

    pub fn finish(&mut self, name: &str) -> Option<Action> {
        self.running.remove(name)
    }

    pub fn pending(&self, name: &str) -> Option<Action> {
        self.running.get(name).copied()
    }

    pub fn row_for(&self, entry: PackageEntry) -> PackageRow {
        let pending = self.pending(entry.package_name());
        PackageRow::resume(entry, pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    /// Stands in for the real package manager.
    #[derive(Default)]
    struct FakeSystem {
        installed: HashSet<String>,
        fail_next: bool,
    }

    impl FakeSystem {
        fn apply(&mut self, action: Action, name: &str) -> bool {
            if std::mem::take(&mut self.fail_next) {
                return false;
            }
            match action {
                Action::Install => self.installed.insert(name.to_string()),
                Action::Uninstall => self.installed.remove(name),
                Action::UpdateSystem => true,
            }
        }

        fn search(&self, identifier: &str) -> PackageEntry {
            let name = crate::parser::strip_scope(identifier);
            PackageEntry::new(identifier, self.installed.contains(name))
        }
    }

    #[test]
    fn caption_matches_installed_state() {
        assert_eq!(PackageRow::new(PackageEntry::new("extra/vim", false)).caption(), "Install");
        assert_eq!(PackageRow::new(PackageEntry::new("extra/vim", true)).caption(), "Uninstall");
    }

    #[test]
    fn clicking_install_installs() {
        let mut row = PackageRow::new(PackageEntry::new("aur/foo-bar", false));
        assert_eq!(row.click(), Some(Action::Install));
        assert_eq!(row.caption(), "Installing…");
        assert_eq!(row.click(), None);
        row.complete(true);
        assert!(row.is_installed());
        assert_eq!(row.caption(), "Uninstall");
    }

    #[test]
    fn failed_action_keeps_state() {
        let mut row = PackageRow::new(PackageEntry::new("extra/htop", true));
        assert_eq!(row.click(), Some(Action::Uninstall));
        row.complete(false);
        assert!(row.is_installed());
        assert!(!row.is_busy());
        assert_eq!(row.caption(), "Uninstall");
    }

    #[test]
    fn install_uninstall_cycle_tracks_backend() {
        let mut system = FakeSystem::default();
        let mut row = PackageRow::new(system.search("aur/foo-bar"));

        for _ in 0..2 {
            let action = row.click().expect("row is idle");
            let ok = system.apply(action, row.entry().package_name());
            row.complete(ok);
            assert_eq!(row.is_installed(), system.search("aur/foo-bar").installed);
        }
        assert!(!row.is_installed());

        system.fail_next = true;
        let action = row.click().expect("row is idle");
        let ok = system.apply(action, row.entry().package_name());
        row.complete(ok);
        assert_eq!(row.is_installed(), system.search("aur/foo-bar").installed);
    }

    #[test]
    fn busy_state_survives_a_fresh_search() {
        let mut in_flight = ActionsInFlight::new();
        let mut first = in_flight.row_for(PackageEntry::new("aur/foo-bar", false));
        let action = first.click().expect("row is idle");
        assert!(in_flight.start(first.entry().package_name(), action));
        assert!(!in_flight.start("foo-bar", Action::Install));

        // the list is rebuilt while the install is still running
        let mut rebuilt = in_flight.row_for(PackageEntry::new("aur/foo-bar", false));
        let other = in_flight.row_for(PackageEntry::new("extra/vim", false));
        assert!(rebuilt.is_busy());
        assert_eq!(rebuilt.caption(), "Installing…");
        assert_eq!(rebuilt.click(), None);
        assert!(!other.is_busy());

        assert_eq!(in_flight.finish("foo-bar"), Some(Action::Install));
        rebuilt.complete(true);
        assert!(rebuilt.is_installed());
        assert!(!rebuilt.is_busy());
        assert_eq!(in_flight.pending("foo-bar"), None);
        assert!(!in_flight.row_for(PackageEntry::new("aur/foo-bar", true)).is_busy());
    }
}
