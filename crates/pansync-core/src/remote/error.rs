/// Error reported by the remote disk binding.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    #[error("remote request timed out")]
    Timeout,
    #[error("remote rate limit hit")]
    Throttled,
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("remote server error {0}")]
    Server(u16),
    #[error("remote path not found: {0}")]
    NotFound(String),
    #[error("remote path already exists: {0}")]
    AlreadyExists(String),
    #[error("remote quota exceeded")]
    Quota,
    #[error("remote permission denied: {0}")]
    Permission(String),
    #[error("upload session invalid: {0}")]
    InvalidSession(String),
    #[error("remote error {code}: {message}")]
    Api { code: i64, message: String },
}

impl RemoteError {
    pub(crate) fn from_io(e: std::io::Error, path: &str) -> Self {
        match e.kind() {
            std::io::ErrorKind::NotFound => RemoteError::NotFound(path.to_string()),
            std::io::ErrorKind::PermissionDenied => RemoteError::Permission(path.to_string()),
            std::io::ErrorKind::AlreadyExists => RemoteError::AlreadyExists(path.to_string()),
            std::io::ErrorKind::TimedOut => RemoteError::Timeout,
            _ => RemoteError::Api {
                code: -1,
                message: format!("{path}: {e}"),
            },
        }
    }
}
