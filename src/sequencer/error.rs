//! C11's narrow internal error type, `thiserror`-derived like
//! [`crate::journal::JournalError`] and converted into [`crate::error::ExchangeError`]
//! at the boundary.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SequencerError {
    #[error("sequencer queue is full")]
    QueueFull,

    #[error("sequencer did not respond within the timeout")]
    Timeout,

    #[error("sequencer worker thread has shut down")]
    Closed,
}

impl From<SequencerError> for crate::error::ExchangeError {
    fn from(_: SequencerError) -> Self {
        crate::error::ExchangeError::SequencerUnresponsive
    }
}
