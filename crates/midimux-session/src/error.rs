//! Structured refusals for session operations. Rejections never mutate
//! registry state; the caller relays the reason to the originating
//! connection.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClaimError {
    #[error("session '{0}' already has a sequencer")]
    AlreadyExists(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JoinError {
    #[error("session '{0}' is not available; make sure a sequencer is running")]
    NotAvailable(String),

    #[error("session '{0}' is full; no available tracks")]
    Full(String),
}
