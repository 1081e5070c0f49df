//! Inbound frame dispatch and the client context
//!
//! [`ChatCore`] is the one context object owning the key store and the PM
//! sessions. The runtime hands it user commands and inbound text; it answers
//! through an [`Outbound`] and never touches the socket itself.

use tracing::{debug, info, warn};

use crate::channel::{AppEvent, Command, Outbound};
use crate::config::SessionConfig;
use crate::errors::{FrameError, RelaychatError, Result, TransportError};
use crate::frame::Frame;
use crate::keys::KeyExchangeService;
use crate::session::PmSessionManager;
use crate::types::Peer;

// ----------------------------------------------------------------------------
// Dispatch Outcome
// ----------------------------------------------------------------------------

/// What the runtime still has to do after a frame was handled
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatched {
    /// Nothing further
    Handled,
    /// The frame was a ping or pong and proves the link is alive
    Liveness,
    /// An accept/decline prompt was shown for this peer; arm its expiry
    InvitePrompt(Peer),
}

// ----------------------------------------------------------------------------
// Chat Core
// ----------------------------------------------------------------------------

/// Client context: local identity, key store and PM sessions
#[derive(Debug)]
pub struct ChatCore {
    username: String,
    keys: KeyExchangeService,
    sessions: PmSessionManager,
}

impl ChatCore {
    pub fn new(username: impl Into<String>, config: SessionConfig) -> Self {
        Self {
            username: username.into(),
            keys: KeyExchangeService::new(config.private_messaging),
            sessions: PmSessionManager::new(config),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn keys(&self) -> &KeyExchangeService {
        &self.keys
    }

    pub fn sessions(&self) -> &PmSessionManager {
        &self.sessions
    }

    /// Generate the local key pair
    ///
    /// Returns false and emits `PrivateMessagingDisabled` when cryptography is
    /// unavailable; the public channel keeps working.
    pub fn start<O: Outbound>(&mut self, out: &mut O) -> bool {
        match self.keys.ensure_local_key_pair() {
            Ok(_) => true,
            Err(e) => {
                warn!(error = %e, "Private messaging disabled");
                out.emit(AppEvent::PrivateMessagingDisabled {
                    reason: e.to_string(),
                });
                false
            }
        }
    }

    /// The socket (re)opened
    pub fn on_connected<O: Outbound>(&mut self, out: &mut O) {
        if self.sessions.config().resume_handshakes_on_reconnect {
            self.sessions.resume_pending(&self.keys, out);
        }
    }

    /// The accept/decline prompt for `peer` lapsed
    pub fn invite_prompt_expired<O: Outbound>(&mut self, peer: &Peer, out: &mut O) {
        self.sessions.invite_prompt_expired(peer, out);
    }

    /// Drop all key and session state
    pub fn teardown(&mut self) {
        self.keys.clear_peer_keys();
        self.sessions.clear();
    }

    // --- Commands ---

    /// Carry out one user command, reporting failures as `CommandFailed`
    pub fn handle_command<O: Outbound>(&mut self, command: Command, out: &mut O) -> bool {
        let name = command.name();
        match self.execute(command, out) {
            Ok(()) => true,
            Err(e) => {
                warn!(command = name, error = %e, "Command failed");
                out.emit(AppEvent::CommandFailed {
                    command: name.to_string(),
                    error: e.to_string(),
                });
                false
            }
        }
    }

    /// Carry out one user command
    ///
    /// `Shutdown` belongs to the runtime and is a no-op here.
    pub fn execute<O: Outbound>(&mut self, command: Command, out: &mut O) -> Result<()> {
        match command {
            Command::SendChat { message } => self.send_chat(&message, out),
            Command::InvitePeer { peer } => self.sessions.invite(&peer, &self.keys, out),
            Command::AcceptInvite { peer } => self.sessions.accept(&peer, &self.keys, out),
            Command::DeclineInvite { peer } => self.sessions.decline(&peer, out),
            Command::SendPrivate { peer, text } => self
                .sessions
                .send_message(&peer, &text, &self.keys, out)
                .map(|_| ()),
            Command::DisconnectPm { peer } => self.sessions.disconnect(&peer, out),
            Command::ClosePm { peer } => self.sessions.close(&peer, out),
            Command::FocusPm { peer } => self.sessions.focus(&peer, out),
            Command::MinimizePm => {
                self.sessions.minimize(out);
                Ok(())
            }
            Command::Shutdown => Ok(()),
        }
    }

    /// Post to the public channel
    pub fn send_chat<O: Outbound>(&mut self, message: &str, out: &mut O) -> Result<()> {
        let message = message.trim();
        if message.is_empty() {
            return Ok(());
        }
        if !out.send_frame(Frame::chat(message)) {
            return Err(TransportError::NotConnected.into());
        }
        Ok(())
    }

    // --- Inbound ---

    /// Decode and route one inbound text message
    ///
    /// Never fails: undecodable input is surfaced as a system notice carrying
    /// the raw text.
    pub fn dispatch<O: Outbound>(&mut self, text: &str, out: &mut O) -> Dispatched {
        let frame = match Frame::decode(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "Malformed inbound frame");
                out.emit(AppEvent::SystemNotice {
                    text: text.to_string(),
                });
                return Dispatched::Handled;
            }
        };

        match self.route(frame, out) {
            Ok(dispatched) => dispatched,
            Err(e) => {
                warn!(error = %e, "Dropped inbound frame");
                out.emit(AppEvent::SystemNotice {
                    text: text.to_string(),
                });
                Dispatched::Handled
            }
        }
    }

    fn route<O: Outbound>(&mut self, frame: Frame, out: &mut O) -> Result<Dispatched> {
        let kind = frame.kind().to_string();
        match frame {
            Frame::ChatMessage { message, user, .. } => {
                out.emit(AppEvent::ChatMessage { user, message });
            }
            Frame::UserList { users } => {
                let users = users
                    .into_iter()
                    .filter(|user| *user != self.username)
                    .collect();
                out.emit(AppEvent::UserList { users });
            }
            Frame::UserJoin { user } => out.emit(AppEvent::UserJoined { user }),
            Frame::UserLeave { user } => out.emit(AppEvent::UserLeft { user }),
            Frame::ServerBroadcast { message } => {
                out.emit(AppEvent::SystemNotice { text: message });
            }
            Frame::PmInvite { from, .. } => {
                let from = sender(&kind, from)?;
                if self.sessions.handle_remote_invite(&from, &self.keys, out) {
                    return Ok(Dispatched::InvitePrompt(from));
                }
            }
            Frame::PmAccept { from, .. } => {
                let from = sender(&kind, from)?;
                self.sessions.handle_remote_accept(&from, &self.keys, out);
            }
            Frame::PmDecline { from, .. } => {
                let from = sender(&kind, from)?;
                self.sessions.handle_remote_decline(&from, out);
            }
            Frame::PmDisconnect { from, .. } => {
                let from = sender(&kind, from)?;
                self.sessions.handle_remote_disconnect(&from, out);
            }
            Frame::PubkeyRequest { from, .. } => {
                let from = sender(&kind, from)?;
                self.keys.handle_pubkey_request(&from, out);
            }
            Frame::PubkeyResponse {
                from, public_key, ..
            } => {
                let from = sender(&kind, from)?;
                self.keys.handle_pubkey_response(&from, &public_key, out)?;
            }
            Frame::PmMessage {
                from, ciphertext, ..
            } => {
                let from = sender(&kind, from)?;
                self.sessions
                    .handle_remote_message(&from, &ciphertext, &self.keys, out);
            }
            Frame::Ping => {
                out.send_frame(Frame::Pong);
                return Ok(Dispatched::Liveness);
            }
            Frame::Pong => return Ok(Dispatched::Liveness),
            Frame::Unknown { kind, payload } => {
                let text = match (kind, payload) {
                    (None, serde_json::Value::String(text)) => text,
                    (Some(kind), payload) => {
                        debug!(kind = %kind, "Unknown frame kind");
                        payload.to_string()
                    }
                    (None, payload) => payload.to_string(),
                };
                info!("Relay notice: {}", text);
                out.emit(AppEvent::SystemNotice { text });
            }
        }
        Ok(Dispatched::Handled)
    }
}

/// The relay-stamped sender of a routed frame
fn sender(kind: &str, from: Option<Peer>) -> core::result::Result<Peer, RelaychatError> {
    from.ok_or_else(|| {
        FrameError::MissingField {
            kind: kind.to_string(),
            field: "from",
        }
        .into()
    })
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
