/// Core error type.
///
/// Adapter crates should map their specific errors into this type so the
/// reconciler can tell an unreachable host apart from a failed call.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("rendering host unavailable: {0}")]
    HostUnavailable(String),

    #[error("unresolvable sender: {0}")]
    UnresolvableSender(String),

    #[error("malformed report: {0}")]
    MalformedReport(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("external error: {0}")]
    External(String),
}

impl Error {
    /// True when the failure means the whole pending batch should be dropped.
    pub fn is_host_unavailable(&self) -> bool {
        matches!(self, Error::HostUnavailable(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
