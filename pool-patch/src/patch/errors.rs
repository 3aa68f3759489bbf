use libredirect::common::exe_version::ExeVersion;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PatchError {
    #[error("Host version {0} has no known address for this patch")]
    UnsupportedVersion(ExeVersion),

    #[error("Address table lists version {0} more than once")]
    DuplicateVersion(ExeVersion),

    #[error("Patch installation was already attempted")]
    AlreadyAttempted,

    #[error("Redirect install failed: {0}")]
    Redirect(String),
}

pub type PatchResult<T> = std::result::Result<T, PatchError>;
