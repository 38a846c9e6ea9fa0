//! CRDT engine facade for the virtual filesystem runtime.
//!
//! This crate provides the [`EngineFacade`] trait abstracting the CRDT
//! document tree the runtime serves. The real engine lives behind a
//! websocket relay and is outside this crate's scope; [`InMemoryEngine`]
//! is a deterministic reference implementation that makes the rest of the
//! runtime independently testable. This enables:
//!
//! - **Unit testing** the runtime without a live collaborator
//! - **Engine flexibility** — any backend implementing [`EngineFacade`] works
//! - **Clean separation** between RPC/lifecycle logic and document storage
//!
//! # Architecture
//!
//! - [`EngineFacade`] trait with read/write/watch/serialize operations
//! - [`Bundle`] for cheap manifest inspection without a full engine
//! - [`InMemoryEngine`] implementing the facade over an in-memory map

mod error;
mod facade;
mod memory;
mod types;
mod watch;

pub use error::{EngineError, EngineErrorKind};
pub use facade::{Bundle, EngineFacade};
pub use memory::InMemoryEngine;
pub use types::{ChangeEvent, ChangeKind, DocumentData, Manifest, RefNode, SerializedState};
pub use watch::{ChangeReceiver, Subscription};
