//! The IPC transport and routed RPC layer (spec §4.1–§4.3): typed
//! request/reply `Message`s between the CLI, API server, and helper
//! daemons, with error propagation, fd passing, and timeouts.

pub mod client;
pub mod server;
mod transport;

pub use client::Client;
pub use server::{Server, ServerHandle};
