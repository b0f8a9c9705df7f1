//! C3 — the append-only, crash-recoverable event journal (§4.3/§6).

pub mod error;
pub mod file_journal;
pub mod types;

pub use error::JournalError;
pub use file_journal::{FileJournal, Journal, RawRecord};
pub use types::{EventType, JournalEvent};
