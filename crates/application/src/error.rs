use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApplicationError {
    #[error("presence manager is not running")]
    PresenceUnavailable,
    #[error("presence manager dropped the reply for {0}")]
    NoReply(&'static str),
}
