//! framesync-core: delta-compressed state-replication protocol.
//!
//! An authority owns a set of objects and event objects and periodically
//! publishes frames. Each peer carries a local set (what this side shows
//! its remote counterpart) and a remote set (a mirrored replica decoded from
//! the counterpart's updates). Every published update deltas against up to
//! four acknowledged baseline frames and is packed through a single
//! arithmetic-coded stream; the probability models on both sides evolve in
//! lockstep so no side information beyond the stream itself is needed.
//!
//! Transport, threading, and process lifetime are the embedder's concern —
//! this crate is synchronous, single-threaded, and produces/consumes opaque
//! byte buffers only.
#![forbid(unsafe_code)]
#![deny(missing_docs, rust_2018_idioms, unused_must_use)]
#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    clippy::cargo,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::dbg_macro,
    clippy::print_stdout,
    clippy::print_stderr
)]
#![allow(
    clippy::must_use_candidate,
    clippy::return_self_not_must_use,
    clippy::unreadable_literal,
    clippy::missing_const_for_fn,
    clippy::module_name_repetitions,
    clippy::use_self,
    clippy::similar_names,
    clippy::multiple_crate_versions
)]

mod alloc;
mod arena;
pub mod authority;
pub mod bitstream;
mod distribs;
pub mod distributions;
pub mod frameset;
pub mod local_set;
pub mod peer;
pub mod remote_set;
pub mod schema;
pub mod telemetry;

pub use authority::{Authority, EventHandle, ObjectHandle, PeerHandle};
pub use bitstream::{ArithmeticDecoder, ArithmeticEncoder, CodecError};
pub use peer::{ObjectRef, Peer};
pub use remote_set::{ConsumeOutcome, RemoteObjectHandle, RemoteSet};
pub use schema::{ClassId, IntField, Protocol, ProtocolBuilder, RefField, SchemaError};
pub use telemetry::{NullTelemetry, Telemetry};

/// Maximum number of baseline frames a frameset may reference (`prevFrames`).
pub const MAX_BASELINES: usize = 4;

/// Maximum number of frames named in an update's framelist (current + up to
/// four baselines).
pub const MAX_UPDATE_FRAMES: usize = MAX_BASELINES + 1;

/// Maximum number of frames named in an ack framelist.
pub const MAX_ACK_FRAMES: usize = MAX_BASELINES;
