//! Channel Communication Types
//!
//! Typed messages between the presentation layer and the runtime, plus the
//! [`Outbound`] seam through which core handlers reach the socket and the UI.
//!
//! - `Command`: presentation → runtime (user intents)
//! - `AppEvent`: runtime → presentation (state changes to render)

use core::time::Duration;

use serde::{Deserialize, Serialize};

use crate::frame::Frame;
use crate::session::PmStatus;
use crate::types::{Fingerprint, LogEntry, Peer};

// ----------------------------------------------------------------------------
// Command: UI → Runtime
// ----------------------------------------------------------------------------

/// User intents sent from a presentation layer to the runtime
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    /// Post to the public broadcast channel
    SendChat { message: String },
    /// Invite a peer to a private conversation
    InvitePeer { peer: Peer },
    /// Accept a pending inbound invite
    AcceptInvite { peer: Peer },
    /// Decline an inbound invite or withdraw an outbound one
    DeclineInvite { peer: Peer },
    /// Encrypt and send a private message
    SendPrivate { peer: Peer, text: String },
    /// End a private conversation and notify the peer
    DisconnectPm { peer: Peer },
    /// Close a disconnected, read-only conversation
    ClosePm { peer: Peer },
    /// Bring a conversation into focus
    FocusPm { peer: Peer },
    /// Hide the focused conversation without ending it
    MinimizePm,
    /// Close the socket and stop the runtime
    Shutdown,
}

impl Command {
    /// Short name used in failure reports
    pub fn name(&self) -> &'static str {
        match self {
            Command::SendChat { .. } => "send_chat",
            Command::InvitePeer { .. } => "invite_peer",
            Command::AcceptInvite { .. } => "accept_invite",
            Command::DeclineInvite { .. } => "decline_invite",
            Command::SendPrivate { .. } => "send_private",
            Command::DisconnectPm { .. } => "disconnect_pm",
            Command::ClosePm { .. } => "close_pm",
            Command::FocusPm { .. } => "focus_pm",
            Command::MinimizePm => "minimize_pm",
            Command::Shutdown => "shutdown",
        }
    }
}

// ----------------------------------------------------------------------------
// AppEvent: Runtime → UI
// ----------------------------------------------------------------------------

/// Why a PM session (and its tab) went away
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionCloseReason {
    /// The local user declined or withdrew the invite
    DeclinedLocally,
    /// The peer declined the invite
    DeclinedByPeer,
    /// The local user disconnected
    DisconnectedLocally,
    /// The peer disconnected
    DisconnectedByPeer,
    /// The local user closed a read-only session
    Closed,
}

/// State changes the presentation layer renders
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AppEvent {
    /// The socket is open; input may be re-enabled
    Connected,
    /// The socket is gone
    Disconnected { will_reconnect: bool },
    /// A reconnect attempt has been scheduled
    Reconnecting { attempt: u32, delay: Duration },
    /// Public broadcast message
    ChatMessage {
        user: Option<String>,
        message: String,
    },
    /// Online users, excluding the local user
    UserList { users: Vec<String> },
    UserJoined { user: String },
    UserLeft { user: String },
    /// Transient notice (unknown frames, declines, raw server text)
    SystemNotice { text: String },
    /// Cryptography is unavailable; PM affordances must be disabled
    PrivateMessagingDisabled { reason: String },
    /// Show an accept/decline prompt for an inbound invite
    PmInvitePrompt { peer: Peer, expires_in: Duration },
    /// The prompt lapsed without an answer
    PmInvitePromptExpired { peer: Peer },
    /// A session (and its tab) was created
    PmSessionOpened { peer: Peer, status: PmStatus },
    /// An existing session changed status
    PmSessionUpdated { peer: Peer, status: PmStatus },
    /// A session (and its tab) was deleted
    PmSessionClosed {
        peer: Peer,
        reason: SessionCloseReason,
    },
    /// An entry was appended to a conversation log
    PmMessage { peer: Peer, entry: LogEntry },
    /// A conversation received content while not focused
    PmUnread { peer: Peer },
    /// Focus moved (None = nothing focused)
    PmFocusChanged { peer: Option<Peer> },
    /// A peer's public key was imported and cached
    PeerKeyCached {
        peer: Peer,
        fingerprint: Fingerprint,
    },
    /// A user command could not be carried out
    CommandFailed { command: String, error: String },
}

// ----------------------------------------------------------------------------
// Outbound Seam
// ----------------------------------------------------------------------------

/// Everything a core handler may do to the outside world
///
/// The runtime implements this over its connection manager and app-event
/// channel; tests implement it with plain vectors.
pub trait Outbound {
    /// Hand a frame to the transport. Returns false when the socket is not open,
    /// in which case nothing was written.
    fn send_frame(&mut self, frame: Frame) -> bool;

    /// Surface an event to the presentation layer
    fn emit(&mut self, event: AppEvent);
}

/// In-memory [`Outbound`] recording everything, with a switchable socket
#[derive(Debug, Clone)]
pub struct RecordingOutbound {
    pub sent: Vec<Frame>,
    pub events: Vec<AppEvent>,
    pub open: bool,
}

impl Default for RecordingOutbound {
    fn default() -> Self {
        Self {
            sent: Vec::new(),
            events: Vec::new(),
            open: true,
        }
    }
}

impl RecordingOutbound {
    /// A recorder whose socket is closed
    pub fn closed() -> Self {
        Self {
            open: false,
            ..Self::default()
        }
    }

    /// Take everything recorded so far
    pub fn drain(&mut self) -> (Vec<Frame>, Vec<AppEvent>) {
        (
            core::mem::take(&mut self.sent),
            core::mem::take(&mut self.events),
        )
    }
}

impl Outbound for RecordingOutbound {
    fn send_frame(&mut self, frame: Frame) -> bool {
        if !self.open {
            return false;
        }
        self.sent.push(frame);
        true
    }

    fn emit(&mut self, event: AppEvent) {
        self.events.push(event);
    }
}
