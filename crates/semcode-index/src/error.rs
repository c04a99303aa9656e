use std::path::PathBuf;

/// Errors raised while materializing a working tree.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("invalid repository name '{0}'")]
    InvalidName(String),

    #[error("local path does not exist or is not a directory: {}", .0.display())]
    LocalPathMissing(PathBuf),

    #[error("remote unreachable: {0}")]
    Unreachable(String),

    #[error("authentication rejected: {0}")]
    AuthRejected(String),

    #[error("git timed out after {0}s")]
    Timeout(u64),

    #[error("git is not available: {0}")]
    GitUnavailable(String),

    /// The target directory exists but is not a git checkout.
    #[error("{} exists but is not a git checkout", .0.display())]
    NotACheckout(PathBuf),

    /// Refused to touch a path outside the fetcher's workspace root.
    #[error("{} is outside the repository workspace", .0.display())]
    OutsideWorkspace(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, FetchError>;
