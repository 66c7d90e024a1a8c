use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("failed to start {program}: {reason}")]
    Spawn { program: String, reason: String },

    #[error("process is no longer running")]
    NotRunning,

    #[error("i/o error: {0}")]
    Io(String),

    #[error("search query is empty")]
    EmptyQuery,
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<gtk4::glib::Error> for Error {
    fn from(e: gtk4::glib::Error) -> Self {
        Error::Io(e.to_string())
    }
}
