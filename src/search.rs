use crate::error::{Error, Result};
use crate::logger::{log_debug, log_error, log_info, log_warning};
use crate::parser::{PackageEntry, SearchParser};
use crate::subprocess;
use crate::yay::{CommandSpec, YayBackend};
use std::cell::Cell;
use std::rc::Rc;

/// What came back from running the search binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchRun {
    Completed {
        stdout: String,
        stderr: String,
        success: bool,
    },
    SpawnFailed(Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchOutcome {
    Results(Vec<PackageEntry>),
    Failed(Error),
}

pub struct SearchController {
    backend: YayBackend,
    parser: Box<dyn SearchParser>,
    generation: Cell<u64>,
}

impl SearchController {
    pub fn new(backend: YayBackend, parser: Box<dyn SearchParser>) -> Self {
        Self {
            backend,
            parser,
            generation: Cell::new(0),
        }
    }

    pub fn command_for(&self, query: &str) -> Result<CommandSpec> {
        let query = query.trim();
        if query.is_empty() {
            return Err(Error::EmptyQuery);
        }
        Ok(self.backend.search_command(query))
    }

    pub fn interpret(&self, run: SearchRun) -> SearchOutcome {
        match run {
            SearchRun::SpawnFailed(e) => {
                log_error(&format!("Search could not start: {}", e));
                SearchOutcome::Failed(e)
            }
            SearchRun::Completed {
                stdout,
                stderr,
                success,
            } => {
                // yay exits 1 when nothing matches, so a failed status alone
                // is not treated as an error.
                if !success && !stderr.trim().is_empty() {
                    log_warning(&format!("Search reported: {}", stderr.trim()));
                }
                let entries = self.parser.parse(&stdout);
                log_info(&format!("Search completed: found {} packages", entries.len()));
                SearchOutcome::Results(entries)
            }
        }
    }

    /// Start a new search generation, invalidating any search still in flight.
    fn begin(&self) -> u64 {
        let next = self.generation.get() + 1;
        self.generation.set(next);
        next
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.get() == generation
    }

    /// Runs the search on the main loop. Yields `None` when a newer search
    /// was started before this one completed.
    pub async fn search(self: Rc<Self>, query: String) -> Option<SearchOutcome> {
        let spec = match self.command_for(&query) {
            Ok(spec) => spec,
            Err(e) => return Some(SearchOutcome::Failed(e)),
        };
        let generation = self.begin();
        log_debug(&format!("Searching packages: {}", spec));

        let run = subprocess::capture(&spec).await;
        if !self.is_current(generation) {
            log_debug(&format!("Discarding stale results for '{}'", query));
            return None;
        }
        Some(self.interpret(run))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::PatternParser;
    use crate::settings::AppSettings;

    fn controller() -> SearchController {
        SearchController::new(
            YayBackend::from_settings(&AppSettings::default()),
            Box::new(PatternParser::new("Installed")),
        )
    }

    #[test]
    fn blank_query_is_rejected() {
        assert_eq!(controller().command_for("   "), Err(Error::EmptyQuery));
    }

    #[test]
    fn query_is_trimmed_into_command() {
        let cmd = controller().command_for("  firefox ").expect("valid query");
        assert_eq!(cmd.args, vec!["-Ss", "firefox"]);
    }

    #[test]
    fn firefox_scenario() {
        let outcome = controller().interpret(SearchRun::Completed {
            stdout: "extra/firefox 120.0-1 (Installed)\n    Web browser\n".to_string(),
            stderr: String::new(),
            success: true,
        });
        assert_eq!(
            outcome,
            SearchOutcome::Results(vec![PackageEntry::new("extra/firefox", true)])
        );
    }

    #[test]
    fn no_match_exit_is_empty_result() {
        let outcome = controller().interpret(SearchRun::Completed {
            stdout: String::new(),
            stderr: String::new(),
            success: false,
        });
        assert_eq!(outcome, SearchOutcome::Results(Vec::new()));
    }

    #[test]
    fn spawn_failure_is_distinct_from_no_results() {
        let error = Error::Spawn {
            program: "yay".to_string(),
            reason: "No such file or directory".to_string(),
        };
        let outcome = controller().interpret(SearchRun::SpawnFailed(error.clone()));
        assert_eq!(outcome, SearchOutcome::Failed(error));
    }

    #[test]
    fn newer_generation_supersedes_older() {
        let c = controller();
        let first = c.begin();
        let second = c.begin();
        assert!(!c.is_current(first));
        assert!(c.is_current(second));
    }
}
