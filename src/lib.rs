//! SeriesVault - an in-memory time-series store with a TCP text interface
//!
//! Clients record `(timestamp, value)` samples under string keys and read
//! them back sorted by timestamp:
//! - newline-framed text protocol parsed with nom
//! - one store shared by every connection, locked per request batch
//! - async client library

pub mod client;
pub mod error;
pub mod executor;
pub mod protocol;
pub mod server;
pub mod session;
pub mod store;

pub use client::Client;
pub use error::{Result, SeriesVaultError};
pub use executor::{Executor, Outcome};
pub use protocol::{decode, encode, Command, Response};
pub use server::{SeriesVaultServer, ServerConfig};
pub use session::{Frame, Session};
pub use store::{MemoryStore, QueryResult, Sample, SharedStore, Store, WILDCARD};
