use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiringCacheError {
    #[error("expiring map actor stopped before the command was delivered")]
    Send,
    #[error("expiring map actor stopped before answering")]
    Receive,
}
