//! Private-messaging session state machine
//!
//! One [`PmSession`] per peer. A session exists exactly while its tab exists:
//! every insertion emits `PmSessionOpened` and every removal emits
//! `PmSessionClosed` in the same step.

use core::fmt;

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::channel::{AppEvent, Outbound, SessionCloseReason};
use crate::codec::MessageCodec;
use crate::config::SessionConfig;
use crate::errors::{RelaychatError, Result, SessionError, TransportError};
use crate::frame::Frame;
use crate::keys::KeyExchangeService;
use crate::types::{LogEntry, Peer};

// ----------------------------------------------------------------------------
// Session Status
// ----------------------------------------------------------------------------

/// Resting states of a PM session. Declines delete the session instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PmStatus {
    /// We invited the peer and wait for an answer
    PendingOutbound,
    /// The peer invited us and we have not answered
    PendingInbound,
    /// Both sides agreed; messages may flow
    Accepted,
    /// The peer left; kept read-only until closed
    Disconnected,
}

impl PmStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PmStatus::PendingOutbound => "pending_outbound",
            PmStatus::PendingInbound => "pending_inbound",
            PmStatus::Accepted => "accepted",
            PmStatus::Disconnected => "disconnected",
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, PmStatus::PendingOutbound | PmStatus::PendingInbound)
    }
}

impl fmt::Display for PmStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ----------------------------------------------------------------------------
// Session
// ----------------------------------------------------------------------------

/// One private conversation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PmSession {
    peer: Peer,
    status: PmStatus,
    log: Vec<LogEntry>,
    unread: bool,
}

impl PmSession {
    fn new(peer: Peer, status: PmStatus) -> Self {
        Self {
            peer,
            status,
            log: Vec::new(),
            unread: false,
        }
    }

    pub fn peer(&self) -> &Peer {
        &self.peer
    }

    pub fn status(&self) -> PmStatus {
        self.status
    }

    /// Conversation log in arrival order
    pub fn log(&self) -> &[LogEntry] {
        &self.log
    }

    pub fn has_unread(&self) -> bool {
        self.unread
    }
}

// ----------------------------------------------------------------------------
// Session Manager
// ----------------------------------------------------------------------------

/// Owner of every PM session and of the focus pointer
#[derive(Debug)]
pub struct PmSessionManager {
    config: SessionConfig,
    sessions: HashMap<Peer, PmSession>,
    focused: Option<Peer>,
}

impl PmSessionManager {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            sessions: HashMap::new(),
            focused: None,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn get(&self, peer: &Peer) -> Option<&PmSession> {
        self.sessions.get(peer)
    }

    pub fn contains(&self, peer: &Peer) -> bool {
        self.sessions.contains_key(peer)
    }

    pub fn status(&self, peer: &Peer) -> Option<PmStatus> {
        self.sessions.get(peer).map(PmSession::status)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Peers with a session, sorted for stable display
    pub fn peers(&self) -> Vec<Peer> {
        let mut peers: Vec<Peer> = self.sessions.keys().cloned().collect();
        peers.sort();
        peers
    }

    pub fn focused(&self) -> Option<&Peer> {
        self.focused.as_ref()
    }

    pub fn is_focused(&self, peer: &Peer) -> bool {
        self.focused.as_ref() == Some(peer)
    }

    // --- Local Intents ---

    /// Invite `peer` to a private conversation
    ///
    /// Repeating the invite while it is still pending re-sends the frame, which
    /// is how a user recovers an invite lost to a reconnect.
    pub fn invite<O: Outbound>(
        &mut self,
        peer: &Peer,
        keys: &KeyExchangeService,
        out: &mut O,
    ) -> Result<()> {
        if !keys.is_available() {
            return Err(SessionError::PrivateMessagingDisabled.into());
        }
        match self.status(peer) {
            None => self.insert(peer, PmStatus::PendingOutbound, out),
            Some(PmStatus::PendingOutbound) => {
                debug!(peer = %peer, "Re-sending pending invite");
            }
            Some(PmStatus::PendingInbound) => {
                return Err(RelaychatError::invalid_state(
                    peer,
                    "no session",
                    PmStatus::PendingInbound.as_str(),
                ));
            }
            Some(_) => {
                return Err(SessionError::SessionAlreadyExists { peer: peer.clone() }.into());
            }
        }

        if !out.send_frame(Frame::pm_invite(peer)) {
            warn!(peer = %peer, "Invite not sent: socket closed");
            return Err(TransportError::NotConnected.into());
        }
        info!(peer = %peer, "Sent private message invite");
        keys.get_or_request_peer_key(peer, out);
        Ok(())
    }

    /// Accept the pending inbound invite from `peer`
    ///
    /// The session is untouched when the accept frame cannot be sent.
    pub fn accept<O: Outbound>(
        &mut self,
        peer: &Peer,
        keys: &KeyExchangeService,
        out: &mut O,
    ) -> Result<()> {
        if !keys.is_available() {
            return Err(SessionError::PrivateMessagingDisabled.into());
        }
        self.require_status(peer, PmStatus::PendingInbound)?;

        if !out.send_frame(Frame::pm_accept(peer)) {
            return Err(TransportError::NotConnected.into());
        }
        info!(peer = %peer, "Accepted private message invite");
        self.set_status(peer, PmStatus::Accepted, out);
        keys.request_peer_key(peer, out);
        self.set_focus(peer, out);
        Ok(())
    }

    /// Decline an inbound invite or withdraw an outbound one
    pub fn decline<O: Outbound>(&mut self, peer: &Peer, out: &mut O) -> Result<()> {
        let status = self
            .status(peer)
            .ok_or_else(|| RelaychatError::session_not_found(peer))?;
        if !status.is_pending() {
            return Err(RelaychatError::invalid_state(peer, "pending", status.as_str()));
        }
        self.decline_pending(peer, out);
        Ok(())
    }

    /// Encrypt and send `text` to `peer`, returning the appended log entry
    ///
    /// Nothing is sent and nothing is logged when the peer key is missing or
    /// the socket is closed.
    pub fn send_message<O: Outbound>(
        &mut self,
        peer: &Peer,
        text: &str,
        keys: &KeyExchangeService,
        out: &mut O,
    ) -> Result<LogEntry> {
        self.require_status(peer, PmStatus::Accepted)?;

        let ciphertext = MessageCodec::encrypt(text, peer, keys)?;
        if !out.send_frame(Frame::pm_message(peer, ciphertext)) {
            return Err(TransportError::NotConnected.into());
        }

        let entry = LogEntry::local(text.to_string());
        self.append(peer, entry.clone(), out);
        Ok(entry)
    }

    /// End the conversation with `peer` and notify them
    pub fn disconnect<O: Outbound>(&mut self, peer: &Peer, out: &mut O) -> Result<()> {
        let status = self
            .status(peer)
            .ok_or_else(|| RelaychatError::session_not_found(peer))?;
        if status.is_pending() {
            return Err(RelaychatError::invalid_state(
                peer,
                "accepted or disconnected",
                status.as_str(),
            ));
        }

        if !out.send_frame(Frame::pm_disconnect(peer)) {
            debug!(peer = %peer, "Disconnect not delivered: socket closed");
        }
        info!(peer = %peer, "Disconnected private session");
        self.remove(peer, SessionCloseReason::DisconnectedLocally, out);
        Ok(())
    }

    /// Remove a read-only session left behind by a peer disconnect
    pub fn close<O: Outbound>(&mut self, peer: &Peer, out: &mut O) -> Result<()> {
        self.require_status(peer, PmStatus::Disconnected)?;
        self.remove(peer, SessionCloseReason::Closed, out);
        Ok(())
    }

    /// Focus `peer`, clearing its unread marker
    pub fn focus<O: Outbound>(&mut self, peer: &Peer, out: &mut O) -> Result<()> {
        if !self.contains(peer) {
            return Err(RelaychatError::session_not_found(peer));
        }
        self.set_focus(peer, out);
        Ok(())
    }

    /// Unfocus the current session without touching it
    pub fn minimize<O: Outbound>(&mut self, out: &mut O) {
        if self.focused.take().is_some() {
            out.emit(AppEvent::PmFocusChanged { peer: None });
        }
    }

    // --- Remote Signals ---

    /// Handle `pm_invite` from `from`. Returns true when a prompt was shown.
    pub fn handle_remote_invite<O: Outbound>(
        &mut self,
        from: &Peer,
        keys: &KeyExchangeService,
        out: &mut O,
    ) -> bool {
        if !keys.is_available() {
            info!(peer = %from, "Declining invite: private messaging unavailable");
            out.send_frame(Frame::pm_decline(from));
            out.emit(AppEvent::SystemNotice {
                text: format!(
                    "{} invited you to a private chat, but private messaging is unavailable",
                    from
                ),
            });
            return false;
        }

        match self.status(from) {
            None => self.insert(from, PmStatus::PendingInbound, out),
            Some(PmStatus::Accepted) => {
                debug!(peer = %from, "Ignoring invite for accepted session");
                return false;
            }
            Some(PmStatus::PendingInbound) => {}
            Some(_) => self.set_status(from, PmStatus::PendingInbound, out),
        }

        info!(peer = %from, "Received private message invite");
        out.emit(AppEvent::PmInvitePrompt {
            peer: from.clone(),
            expires_in: self.config.invite_prompt_timeout(),
        });
        true
    }

    /// Handle `pm_accept` from `from`
    pub fn handle_remote_accept<O: Outbound>(
        &mut self,
        from: &Peer,
        keys: &KeyExchangeService,
        out: &mut O,
    ) {
        if !keys.is_available() {
            info!(peer = %from, "Ignoring accept: private messaging unavailable");
            out.emit(AppEvent::SystemNotice {
                text: format!(
                    "{} accepted a private chat, but private messaging is unavailable",
                    from
                ),
            });
            return;
        }

        match self.status(from) {
            None => self.insert(from, PmStatus::Accepted, out),
            Some(PmStatus::Accepted) => {}
            Some(_) => self.set_status(from, PmStatus::Accepted, out),
        }
        info!(peer = %from, "Private message invite accepted");
        keys.get_or_request_peer_key(from, out);
        self.set_focus(from, out);
    }

    /// Handle `pm_decline` from `from`; only a pending session can be declined
    pub fn handle_remote_decline<O: Outbound>(&mut self, from: &Peer, out: &mut O) {
        match self.status(from) {
            Some(status) if status.is_pending() => {}
            Some(status) => {
                debug!(peer = %from, status = %status, "Ignoring decline for established session");
                return;
            }
            None => {
                debug!(peer = %from, "Decline for unknown session");
                return;
            }
        }
        info!(peer = %from, "Private message invite declined");
        out.emit(AppEvent::SystemNotice {
            text: format!("{} declined your private chat invite", from),
        });
        self.remove(from, SessionCloseReason::DeclinedByPeer, out);
    }

    /// Handle `pm_disconnect` from `from`
    pub fn handle_remote_disconnect<O: Outbound>(&mut self, from: &Peer, out: &mut O) {
        let Some(status) = self.status(from) else {
            debug!(peer = %from, "Disconnect for unknown session");
            return;
        };
        info!(peer = %from, "Peer left private session");
        out.emit(AppEvent::SystemNotice {
            text: format!("{} has left the private chat", from),
        });
        if self.config.retain_disconnected_sessions && status == PmStatus::Accepted {
            self.set_status(from, PmStatus::Disconnected, out);
        } else {
            self.remove(from, SessionCloseReason::DisconnectedByPeer, out);
        }
    }

    /// Handle `pm_message` from `from`
    ///
    /// A message is proof of a live conversation: a missing session is created
    /// as accepted and a pending or disconnected one is promoted. Undecryptable
    /// messages are logged as a placeholder. Without cryptography the message
    /// is dropped with a notice and no session is touched.
    pub fn handle_remote_message<O: Outbound>(
        &mut self,
        from: &Peer,
        ciphertext: &str,
        keys: &KeyExchangeService,
        out: &mut O,
    ) -> Option<LogEntry> {
        if !keys.is_available() {
            info!(peer = %from, "Dropping private message: private messaging unavailable");
            out.emit(AppEvent::SystemNotice {
                text: format!(
                    "{} sent a private message, but private messaging is unavailable",
                    from
                ),
            });
            return None;
        }

        match self.status(from) {
            None => {
                info!(peer = %from, "Resuming private session from inbound message");
                self.insert(from, PmStatus::Accepted, out);
                keys.get_or_request_peer_key(from, out);
            }
            Some(PmStatus::Accepted) => {}
            Some(_) => {
                self.set_status(from, PmStatus::Accepted, out);
                keys.get_or_request_peer_key(from, out);
            }
        }

        let entry = match MessageCodec::decrypt(ciphertext, keys) {
            Ok(text) => LogEntry::from_peer(from.clone(), text),
            Err(e) => {
                warn!(peer = %from, error = %e, "Could not decrypt private message");
                LogEntry::undecryptable(from.clone())
            }
        };
        self.append(from, entry.clone(), out);

        if !self.is_focused(from) {
            if let Some(session) = self.sessions.get_mut(from) {
                session.unread = true;
            }
            out.emit(AppEvent::PmUnread { peer: from.clone() });
        }
        Some(entry)
    }

    // --- Lifecycle ---

    /// The accept/decline prompt for `peer` lapsed
    ///
    /// Only a UI signal unless declining on expiry is configured.
    pub fn invite_prompt_expired<O: Outbound>(&mut self, peer: &Peer, out: &mut O) {
        if self.status(peer) != Some(PmStatus::PendingInbound) {
            return;
        }
        out.emit(AppEvent::PmInvitePromptExpired { peer: peer.clone() });
        if self.config.decline_on_prompt_expiry {
            self.decline_pending(peer, out);
        }
    }

    /// Re-send in-flight handshakes after the transport came back
    pub fn resume_pending<O: Outbound>(&self, keys: &KeyExchangeService, out: &mut O) {
        for peer in self.peers() {
            match self.status(&peer) {
                Some(PmStatus::PendingOutbound) => {
                    debug!(peer = %peer, "Resending invite after reconnect");
                    out.send_frame(Frame::pm_invite(&peer));
                }
                Some(PmStatus::Accepted) if keys.peer_key(&peer).is_none() => {
                    keys.request_peer_key(&peer, out);
                }
                _ => {}
            }
        }
    }

    /// Drop every session (client teardown)
    pub fn clear(&mut self) {
        self.sessions.clear();
        self.focused = None;
    }

    // --- Internals ---

    fn require_status(&self, peer: &Peer, expected: PmStatus) -> Result<()> {
        let status = self
            .status(peer)
            .ok_or_else(|| RelaychatError::session_not_found(peer))?;
        if status != expected {
            return Err(RelaychatError::invalid_state(
                peer,
                expected.as_str(),
                status.as_str(),
            ));
        }
        Ok(())
    }

    fn set_focus<O: Outbound>(&mut self, peer: &Peer, out: &mut O) {
        if let Some(session) = self.sessions.get_mut(peer) {
            session.unread = false;
        }
        if self.focused.as_ref() != Some(peer) {
            self.focused = Some(peer.clone());
            out.emit(AppEvent::PmFocusChanged {
                peer: Some(peer.clone()),
            });
        }
    }

    /// Send `pm_decline` and drop a session already known to be pending
    fn decline_pending<O: Outbound>(&mut self, peer: &Peer, out: &mut O) {
        if !out.send_frame(Frame::pm_decline(peer)) {
            debug!(peer = %peer, "Decline not delivered: socket closed");
        }
        info!(peer = %peer, "Declined private message invite");
        self.remove(peer, SessionCloseReason::DeclinedLocally, out);
    }

    fn insert<O: Outbound>(&mut self, peer: &Peer, status: PmStatus, out: &mut O) {
        self.sessions
            .insert(peer.clone(), PmSession::new(peer.clone(), status));
        out.emit(AppEvent::PmSessionOpened {
            peer: peer.clone(),
            status,
        });
    }

    fn set_status<O: Outbound>(&mut self, peer: &Peer, status: PmStatus, out: &mut O) {
        if let Some(session) = self.sessions.get_mut(peer) {
            if session.status != status {
                debug!(peer = %peer, from = %session.status, to = %status, "Session status changed");
                session.status = status;
                out.emit(AppEvent::PmSessionUpdated {
                    peer: peer.clone(),
                    status,
                });
            }
        }
    }

    fn append<O: Outbound>(&mut self, peer: &Peer, entry: LogEntry, out: &mut O) {
        if let Some(session) = self.sessions.get_mut(peer) {
            session.log.push(entry.clone());
            out.emit(AppEvent::PmMessage {
                peer: peer.clone(),
                entry,
            });
        }
    }

    fn remove<O: Outbound>(&mut self, peer: &Peer, reason: SessionCloseReason, out: &mut O) {
        if self.sessions.remove(peer).is_none() {
            return;
        }
        out.emit(AppEvent::PmSessionClosed {
            peer: peer.clone(),
            reason,
        });
        if self.focused.as_ref() == Some(peer) {
            self.focused = None;
            out.emit(AppEvent::PmFocusChanged { peer: None });
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::RecordingOutbound;
    use crate::errors::CryptoError;
    use crate::keys::LocalKeyPair;
    use crate::types::{Author, DECRYPTION_FAILED_PLACEHOLDER};

    fn setup() -> (PmSessionManager, KeyExchangeService, RecordingOutbound) {
        let mut keys = KeyExchangeService::new(true);
        keys.ensure_local_key_pair().unwrap();
        (
            PmSessionManager::new(SessionConfig::default()),
            keys,
            RecordingOutbound::default(),
        )
    }

    fn bob() -> Peer {
        Peer::new("bob")
    }

    #[test]
    fn test_local_invite_creates_pending_outbound() {
        let (mut sessions, keys, mut out) = setup();
        sessions.invite(&bob(), &keys, &mut out).unwrap();

        assert_eq!(sessions.status(&bob()), Some(PmStatus::PendingOutbound));
        assert_eq!(
            out.sent,
            vec![Frame::pm_invite(&bob()), Frame::pubkey_request(&bob())]
        );
        assert!(out.events.contains(&AppEvent::PmSessionOpened {
            peer: bob(),
            status: PmStatus::PendingOutbound,
        }));
    }

    #[test]
    fn test_repeated_invite_resends_frame() {
        let (mut sessions, keys, mut out) = setup();
        sessions.invite(&bob(), &keys, &mut out).unwrap();
        out.drain();

        sessions.invite(&bob(), &keys, &mut out).unwrap();
        assert_eq!(out.sent[0], Frame::pm_invite(&bob()));
        assert!(out.events.is_empty());
    }

    #[test]
    fn test_invite_on_accepted_session_fails() {
        let (mut sessions, keys, mut out) = setup();
        sessions.handle_remote_accept(&bob(), &keys, &mut out);
        out.drain();

        let err = sessions.invite(&bob(), &keys, &mut out).unwrap_err();
        assert!(matches!(
            err,
            RelaychatError::Session(SessionError::SessionAlreadyExists { .. })
        ));
        assert!(out.sent.is_empty());
    }

    #[test]
    fn test_invite_while_disconnected_keeps_session() {
        let (mut sessions, keys, _) = setup();
        let mut out = RecordingOutbound::closed();

        assert!(sessions.invite(&bob(), &keys, &mut out).is_err());
        assert_eq!(sessions.status(&bob()), Some(PmStatus::PendingOutbound));
    }

    #[test]
    fn test_invite_requires_crypto() {
        let mut sessions = PmSessionManager::new(SessionConfig::default());
        let keys = KeyExchangeService::new(false);
        let mut out = RecordingOutbound::default();

        let err = sessions.invite(&bob(), &keys, &mut out).unwrap_err();
        assert!(err.is_crypto_unavailable());
        assert!(sessions.is_empty());
    }

    #[test]
    fn test_remote_invite_prompts_then_accept_focuses() {
        let (mut sessions, keys, mut out) = setup();
        assert!(sessions.handle_remote_invite(&bob(), &keys, &mut out));
        assert_eq!(sessions.status(&bob()), Some(PmStatus::PendingInbound));
        assert!(out
            .events
            .iter()
            .any(|e| matches!(e, AppEvent::PmInvitePrompt { peer, .. } if *peer == bob())));
        out.drain();

        sessions.accept(&bob(), &keys, &mut out).unwrap();
        assert_eq!(sessions.status(&bob()), Some(PmStatus::Accepted));
        assert_eq!(sessions.focused(), Some(&bob()));
        assert_eq!(
            out.sent,
            vec![Frame::pm_accept(&bob()), Frame::pubkey_request(&bob())]
        );
    }

    #[test]
    fn test_accept_failure_leaves_state() {
        let (mut sessions, keys, mut out) = setup();
        sessions.handle_remote_invite(&bob(), &keys, &mut out);

        let mut closed = RecordingOutbound::closed();
        assert!(sessions.accept(&bob(), &keys, &mut closed).is_err());
        assert_eq!(sessions.status(&bob()), Some(PmStatus::PendingInbound));
        assert!(sessions.focused().is_none());
    }

    #[test]
    fn test_accept_requires_pending_inbound() {
        let (mut sessions, keys, mut out) = setup();
        sessions.invite(&bob(), &keys, &mut out).unwrap();
        assert!(matches!(
            sessions.accept(&bob(), &keys, &mut out),
            Err(RelaychatError::Session(SessionError::InvalidState { .. }))
        ));
        assert!(matches!(
            sessions.accept(&Peer::new("carol"), &keys, &mut out),
            Err(RelaychatError::Session(SessionError::SessionNotFound { .. }))
        ));
    }

    #[test]
    fn test_cross_invite_moves_to_pending_inbound() {
        let (mut sessions, keys, mut out) = setup();
        sessions.invite(&bob(), &keys, &mut out).unwrap();
        assert!(sessions.handle_remote_invite(&bob(), &keys, &mut out));
        assert_eq!(sessions.status(&bob()), Some(PmStatus::PendingInbound));
    }

    #[test]
    fn test_remote_invite_on_accepted_is_ignored() {
        let (mut sessions, keys, mut out) = setup();
        sessions.handle_remote_accept(&bob(), &keys, &mut out);
        assert!(!sessions.handle_remote_invite(&bob(), &keys, &mut out));
        assert_eq!(sessions.status(&bob()), Some(PmStatus::Accepted));
    }

    #[test]
    fn test_remote_invite_declined_without_crypto() {
        let mut sessions = PmSessionManager::new(SessionConfig::default());
        let keys = KeyExchangeService::new(false);
        let mut out = RecordingOutbound::default();

        assert!(!sessions.handle_remote_invite(&bob(), &keys, &mut out));
        assert!(sessions.is_empty());
        assert_eq!(out.sent, vec![Frame::pm_decline(&bob())]);
    }

    #[test]
    fn test_decline_removes_session() {
        let (mut sessions, keys, mut out) = setup();
        sessions.handle_remote_invite(&bob(), &keys, &mut out);
        sessions.decline(&bob(), &mut out).unwrap();

        assert!(!sessions.contains(&bob()));
        assert!(out.sent.contains(&Frame::pm_decline(&bob())));
        assert!(out.events.contains(&AppEvent::PmSessionClosed {
            peer: bob(),
            reason: SessionCloseReason::DeclinedLocally,
        }));
    }

    #[test]
    fn test_remote_decline_removes_session_with_notice() {
        let (mut sessions, keys, mut out) = setup();
        sessions.invite(&bob(), &keys, &mut out).unwrap();
        out.drain();

        sessions.handle_remote_decline(&bob(), &mut out);
        assert!(!sessions.contains(&bob()));
        assert!(matches!(out.events[0], AppEvent::SystemNotice { .. }));
        assert_eq!(
            out.events[1],
            AppEvent::PmSessionClosed {
                peer: bob(),
                reason: SessionCloseReason::DeclinedByPeer,
            }
        );
    }

    #[test]
    fn test_remote_decline_ignored_for_accepted_session() {
        let (mut sessions, keys, mut out) = setup();
        sessions.handle_remote_accept(&bob(), &keys, &mut out);
        out.drain();

        sessions.handle_remote_decline(&bob(), &mut out);
        assert_eq!(sessions.status(&bob()), Some(PmStatus::Accepted));
        assert_eq!(sessions.focused(), Some(&bob()));
        assert!(out.events.is_empty());
        assert!(out.sent.is_empty());
    }

    #[test]
    fn test_remote_decline_ignored_for_disconnected_session() {
        let mut keys = KeyExchangeService::new(true);
        keys.ensure_local_key_pair().unwrap();
        let mut sessions = PmSessionManager::new(SessionConfig {
            retain_disconnected_sessions: true,
            ..Default::default()
        });
        let mut out = RecordingOutbound::default();
        sessions.handle_remote_accept(&bob(), &keys, &mut out);
        sessions.handle_remote_disconnect(&bob(), &mut out);
        out.drain();

        sessions.handle_remote_decline(&bob(), &mut out);
        assert_eq!(sessions.status(&bob()), Some(PmStatus::Disconnected));
        assert!(out.events.is_empty());
    }

    #[test]
    fn test_accept_refreshes_cached_peer_key() {
        let (mut sessions, mut keys, mut out) = setup();
        let stale = LocalKeyPair::generate().unwrap();
        keys.handle_pubkey_response(&bob(), &stale.export_public_key(), &mut out)
            .unwrap();
        assert!(keys.peer_key(&bob()).is_some());

        sessions.handle_remote_invite(&bob(), &keys, &mut out);
        out.drain();

        sessions.accept(&bob(), &keys, &mut out).unwrap();
        assert_eq!(
            out.sent,
            vec![Frame::pm_accept(&bob()), Frame::pubkey_request(&bob())]
        );
    }

    #[test]
    fn test_remote_accept_without_crypto_creates_nothing() {
        let mut sessions = PmSessionManager::new(SessionConfig::default());
        let keys = KeyExchangeService::new(false);
        let mut out = RecordingOutbound::default();

        sessions.handle_remote_accept(&bob(), &keys, &mut out);
        assert!(!sessions.contains(&bob()));
        assert!(sessions.focused().is_none());
        assert!(out.sent.is_empty());
        assert!(matches!(out.events[..], [AppEvent::SystemNotice { .. }]));
    }

    #[test]
    fn test_remote_message_without_crypto_is_dropped() {
        let mut sessions = PmSessionManager::new(SessionConfig::default());
        let keys = KeyExchangeService::new(false);
        let mut out = RecordingOutbound::default();

        assert!(sessions
            .handle_remote_message(&bob(), "garbage", &keys, &mut out)
            .is_none());
        assert!(!sessions.contains(&bob()));
        assert!(out.sent.is_empty());
        assert!(matches!(out.events[..], [AppEvent::SystemNotice { .. }]));
    }

    #[test]
    fn test_remote_accept_focuses_and_requests_key() {
        let (mut sessions, keys, mut out) = setup();
        sessions.invite(&bob(), &keys, &mut out).unwrap();
        out.drain();

        sessions.handle_remote_accept(&bob(), &keys, &mut out);
        assert_eq!(sessions.status(&bob()), Some(PmStatus::Accepted));
        assert_eq!(sessions.focused(), Some(&bob()));
        assert_eq!(out.sent, vec![Frame::pubkey_request(&bob())]);
    }

    #[test]
    fn test_send_without_key_sends_nothing() {
        let (mut sessions, keys, mut out) = setup();
        sessions.handle_remote_accept(&bob(), &keys, &mut out);
        out.drain();

        let err = sessions
            .send_message(&bob(), "hello", &keys, &mut out)
            .unwrap_err();
        assert!(matches!(
            err,
            RelaychatError::Crypto(CryptoError::NoKeyAvailable { .. })
        ));
        assert!(out.sent.is_empty());
        assert!(sessions.get(&bob()).unwrap().log().is_empty());
    }

    #[test]
    fn test_send_requires_accepted() {
        let (mut sessions, keys, mut out) = setup();
        sessions.invite(&bob(), &keys, &mut out).unwrap();
        assert!(matches!(
            sessions.send_message(&bob(), "hi", &keys, &mut out),
            Err(RelaychatError::Session(SessionError::InvalidState { .. }))
        ));
    }

    #[test]
    fn test_undecryptable_message_logs_placeholder_and_unread() {
        let (mut sessions, keys, mut out) = setup();
        let entry = sessions
            .handle_remote_message(&bob(), "garbage", &keys, &mut out)
            .unwrap();

        assert!(!entry.decrypted);
        assert_eq!(entry.text, DECRYPTION_FAILED_PLACEHOLDER);
        let session = sessions.get(&bob()).unwrap();
        assert_eq!(session.status(), PmStatus::Accepted);
        assert_eq!(session.log().len(), 1);
        assert_eq!(session.log()[0].author, Author::Peer(bob()));
        assert!(session.has_unread());
        assert!(out.events.contains(&AppEvent::PmUnread { peer: bob() }));
    }

    #[test]
    fn test_focus_clears_unread() {
        let (mut sessions, keys, mut out) = setup();
        sessions.handle_remote_message(&bob(), "garbage", &keys, &mut out);
        sessions.focus(&bob(), &mut out).unwrap();
        assert!(!sessions.get(&bob()).unwrap().has_unread());

        sessions.minimize(&mut out);
        assert!(sessions.focused().is_none());
    }

    #[test]
    fn test_remote_disconnect_deletes_by_default() {
        let (mut sessions, keys, mut out) = setup();
        sessions.handle_remote_accept(&bob(), &keys, &mut out);
        sessions.handle_remote_disconnect(&bob(), &mut out);

        assert!(!sessions.contains(&bob()));
        assert!(sessions.focused().is_none());
    }

    #[test]
    fn test_remote_disconnect_retained_then_closed() {
        let config = SessionConfig {
            retain_disconnected_sessions: true,
            ..SessionConfig::default()
        };
        let (_, keys, mut out) = setup();
        let mut sessions = PmSessionManager::new(config);
        sessions.handle_remote_accept(&bob(), &keys, &mut out);
        sessions.handle_remote_disconnect(&bob(), &mut out);
        assert_eq!(sessions.status(&bob()), Some(PmStatus::Disconnected));

        assert!(sessions.send_message(&bob(), "hi", &keys, &mut out).is_err());
        sessions.close(&bob(), &mut out).unwrap();
        assert!(!sessions.contains(&bob()));
    }

    #[test]
    fn test_local_disconnect_notifies_and_removes() {
        let (mut sessions, keys, mut out) = setup();
        sessions.handle_remote_accept(&bob(), &keys, &mut out);
        out.drain();

        sessions.disconnect(&bob(), &mut out).unwrap();
        assert_eq!(out.sent, vec![Frame::pm_disconnect(&bob())]);
        assert!(!sessions.contains(&bob()));
    }

    #[test]
    fn test_prompt_expiry_keeps_session_by_default() {
        let (mut sessions, keys, mut out) = setup();
        sessions.handle_remote_invite(&bob(), &keys, &mut out);
        sessions.invite_prompt_expired(&bob(), &mut out);

        assert_eq!(sessions.status(&bob()), Some(PmStatus::PendingInbound));
        assert!(out
            .events
            .contains(&AppEvent::PmInvitePromptExpired { peer: bob() }));
    }

    #[test]
    fn test_prompt_expiry_declines_when_configured() {
        let config = SessionConfig {
            decline_on_prompt_expiry: true,
            ..SessionConfig::default()
        };
        let (_, keys, mut out) = setup();
        let mut sessions = PmSessionManager::new(config);
        sessions.handle_remote_invite(&bob(), &keys, &mut out);
        sessions.invite_prompt_expired(&bob(), &mut out);

        assert!(!sessions.contains(&bob()));
        assert!(out.sent.contains(&Frame::pm_decline(&bob())));
    }

    #[test]
    fn test_resume_pending_resends_handshakes() {
        let (mut sessions, keys, mut out) = setup();
        let carol = Peer::new("carol");
        sessions.invite(&bob(), &keys, &mut out).unwrap();
        sessions.handle_remote_accept(&carol, &keys, &mut out);
        out.drain();

        sessions.resume_pending(&keys, &mut out);
        assert_eq!(
            out.sent,
            vec![Frame::pm_invite(&bob()), Frame::pubkey_request(&carol)]
        );
    }
}
