//! Turns `-Ss` output of the package manager into package entries.
//!
//! Search output comes in two-line blocks:
//!
//! ```text
//! extra/firefox 120.0-1 (62.1 MiB 240.3 MiB) (Installed)
//!     Fast, Private & Safe Web Browser
//! ```
//!
//! Only the first line of a block is recognised; description lines, headers and
//! blank lines never match and are skipped.

use regex::Regex;
use std::sync::OnceLock;

static PACKAGE_LINE: OnceLock<Regex> = OnceLock::new();

/// `scope/name version...` at the start of a line.
fn package_line() -> &'static Regex {
    PACKAGE_LINE.get_or_init(|| {
        Regex::new(r"^(\S+/[\w-]+)\s+\S+").expect("package line pattern is valid")
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageEntry {
    /// `scope/name` as printed, e.g. `aur/yay-bin`.
    pub identifier: String,
    pub installed: bool,
}

impl PackageEntry {
    pub fn new(identifier: impl Into<String>, installed: bool) -> Self {
        Self {
            identifier: identifier.into(),
            installed,
        }
    }

    /// Name handed to install/remove commands: everything after the last `/`.
    pub fn package_name(&self) -> &str {
        strip_scope(&self.identifier)
    }
}

pub fn strip_scope(identifier: &str) -> &str {
    identifier.rsplit('/').next().unwrap_or(identifier)
}

pub trait SearchParser {
    fn parse(&self, output: &str) -> Vec<PackageEntry>;
}

pub struct PatternParser {
    installed_marker: Regex,
}

impl PatternParser {
    /// `installed_label` is the word the package manager prints inside the
    /// trailing parentheses, e.g. `Installed` or `Instalado`.
    pub fn new(installed_label: &str) -> Self {
        let marker = format!(r"\({}(?::[^)]*)?\)\s*$", regex::escape(installed_label.trim()));
        let installed_marker = Regex::new(&marker).expect("escaped marker pattern is valid");

        Self { installed_marker }
    }
}

impl SearchParser for PatternParser {
    fn parse(&self, output: &str) -> Vec<PackageEntry> {
        output
            .lines()
            .filter_map(|line| {
                let caps = package_line().captures(line)?;
                Some(PackageEntry::new(
                    &caps[1],
                    self.installed_marker.is_match(line),
                ))
            })
            .collect()
    }
}
