//! Relaychat Runtime
//!
//! Tokio runtime for the relaychat session layer:
//! - `ConnectionManager`: the single WebSocket with reconnect backoff and heartbeat
//! - `ClientTask`: the event loop owning the session context
//! - `ClientBuilder` / `ClientHandle`: how presentation layers start and drive a client
//!
//! Protocol state lives in `relaychat-core`; this crate adds sockets and timers.

pub mod builder;
pub mod client;
pub mod connection;

pub use builder::{
    create_app_event_channel, create_command_channel, AppEventReceiver, AppEventSender,
    ClientBuilder, ClientHandle, CommandReceiver, CommandSender,
};
pub use client::ClientTask;
pub use connection::{ConnectionManager, LinkEvent, LinkedOutbound, TransportEvent};

// Re-export core types for convenience
pub use relaychat_core::{
    AppEvent, ClientConfig, Command, LogEntry, Peer, PmStatus, RelaychatError, RelaychatResult,
    SessionCloseReason,
};
