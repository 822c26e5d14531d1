//! Core of the Lumina collection viewer backend.
//!
//! Two subsystems carry the weight of this crate:
//!
//! - [`index`] — the collection index engine: denormalized sorted views over
//!   the primary collection store, kept in the key-value store for
//!   O(log N) navigation and O(log N + M) page retrieval, with consistency
//!   verification and memory-bounded rebuilds.
//! - [`jobs`] — the background processing pipeline: durable job records,
//!   message-driven dispatch with bounded concurrency, progress reporting,
//!   and dead-lettering on repeated failure.
//!
//! Everything else is adapters ([`kvs`], [`store`], [`bus`]), media plumbing
//! ([`imaging`], [`archive`]) and the credentials subsystem ([`auth`]).

pub mod archive;
pub mod auth;
pub mod bus;
pub mod config;
pub mod error;
pub mod imaging;
pub mod index;
pub mod jobs;
pub mod kvs;
pub mod store;
pub mod util;

pub use error::{CoreError, Result};
