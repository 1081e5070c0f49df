//! Relaychat Core
//!
//! Sans-IO private-messaging session layer for a relay chat client: the JSON
//! frame catalog, key exchange, sealed-box message codec, the per-peer PM
//! session state machine, inbound dispatch and connection bookkeeping. The
//! runtime crate supplies the socket and the timers.

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod channel;
pub mod codec;
pub mod config;
pub mod connection;
pub mod dispatcher;
pub mod errors;
pub mod frame;
pub mod keys;
pub mod session;
pub mod types;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use channel::{AppEvent, Command, Outbound, RecordingOutbound, SessionCloseReason};
pub use codec::MessageCodec;
pub use config::{ChannelConfig, ClientConfig, ConnectionConfig, MissedPongPolicy, SessionConfig};
pub use connection::{
    is_clean_close, CloseAction, ConnectionPhase, ConnectionState, ReconnectPolicy,
    ScheduledReconnect,
};
pub use dispatcher::{ChatCore, Dispatched};
pub use frame::Frame;
pub use keys::{KeyExchangeService, LocalKeyPair};
pub use session::{PmSession, PmSessionManager, PmStatus};
pub use types::{Author, Fingerprint, LogEntry, Peer, Timestamp};

// ----------------------------------------------------------------------------
// Error Types
// ----------------------------------------------------------------------------

pub use errors::{
    CryptoError, FrameError, RelaychatError, RelaychatResult, Result, SessionError,
    TransportError,
};
