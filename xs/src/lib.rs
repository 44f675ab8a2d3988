//! SessionStore - generic persistent record storage
//!
//! A small record store backed by JSONL append logs, one file per
//! collection. Records are replayed on open (last write wins), held in
//! memory for reads, and appended on every mutation. An advisory file
//! lock prevents two processes from co-owning a store directory.
//!
//! # Core Concepts
//!
//! - **Record trait**: anything with an id, a timestamp, a collection
//!   name, and indexed fields can be stored
//! - **Append-only log**: mutations append full snapshots; `compact()`
//!   rewrites the log to the live set
//! - **Single writer**: callers serialize access (typically behind an
//!   actor that owns the `Store`)

mod record;
mod store;

pub use record::{Filter, FilterOp, IndexValue, Record, now_ms};
pub use store::{Store, StoreError};
