//! Tenure Registry - persisted member records
//!
//! Maps member identity to join time, display name and last-known role
//! labels. Shared by the scheduler's passes and the event ingestor; every
//! read-modify-write of a record runs under the registry lock, and no lock
//! is held while the file is written.
//!
//! # Durability
//!
//! Mutations mark the registry dirty; [`Registry::flush`] writes the whole
//! map as one JSON object (temp file + rename). Callers flush after each
//! mutation batch.
//!
//! # Recovery
//!
//! A missing, empty or unreadable store opens as an empty registry. An
//! unreadable file is moved aside to `<name>.corrupt` so the next flush does
//! not destroy it.

pub mod error;
pub mod record;
pub mod registry;
mod store;
mod timestamp;

pub use error::{Error, Result};
pub use record::{MemberId, MemberRecord};
pub use registry::Registry;
