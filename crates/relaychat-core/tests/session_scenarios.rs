//! End-to-end PM scenarios between cores wired through an in-memory relay


use relaychat_core::{
    AppEvent, Author, Command, Frame, MessageCodec, Peer, PmStatus, SessionCloseReason,
    SessionConfig,
};
use test_utils::TestRelay;

fn peer(name: &str) -> Peer {
    Peer::new(name)
}

/// alice invites bob, bob accepts, keys flow both ways
fn establish(relay: &mut TestRelay) {
    assert!(relay.command("alice", Command::InvitePeer { peer: peer("bob") }));
    relay.pump();
    assert!(relay.client("bob").prompts.contains(&peer("alice")));

    assert!(relay.command("bob", Command::AcceptInvite { peer: peer("alice") }));
    relay.pump();
}

#[test]
fn test_happy_path() {
    let mut relay = TestRelay::new(&["alice", "bob"]);
    establish(&mut relay);

    let alice = relay.client("alice");
    let bob = relay.client("bob");
    assert_eq!(alice.core.sessions().status(&peer("bob")), Some(PmStatus::Accepted));
    assert_eq!(bob.core.sessions().status(&peer("alice")), Some(PmStatus::Accepted));
    assert!(alice.core.keys().peer_key(&peer("bob")).is_some());
    assert!(bob.core.keys().peer_key(&peer("alice")).is_some());
    assert_eq!(alice.core.sessions().focused(), Some(&peer("bob")));
    assert_eq!(bob.core.sessions().focused(), Some(&peer("alice")));

    assert!(relay.command(
        "alice",
        Command::SendPrivate {
            peer: peer("bob"),
            text: "hello".to_string(),
        }
    ));
    relay.pump();

    let alice_log = relay.client("alice").core.sessions().get(&peer("bob")).unwrap().log().to_vec();
    assert_eq!(alice_log.len(), 1);
    assert_eq!(alice_log[0].author, Author::Local);
    assert_eq!(alice_log[0].text, "hello");

    let bob_log = relay.client("bob").core.sessions().get(&peer("alice")).unwrap().log().to_vec();
    assert_eq!(bob_log.len(), 1);
    assert_eq!(bob_log[0].author, Author::Peer(peer("alice")));
    assert_eq!(bob_log[0].text, "hello");
    assert!(bob_log[0].decrypted);
}

#[test]
fn test_fingerprints_match_across_clients() {
    let mut relay = TestRelay::new(&["alice", "bob"]);
    establish(&mut relay);

    let bob_local = relay
        .client("bob")
        .core
        .keys()
        .local_key_pair()
        .unwrap()
        .fingerprint();
    assert_eq!(
        relay.client("alice").core.keys().peer_fingerprint(&peer("bob")),
        Some(bob_local.clone())
    );
    assert!(relay.client("alice").out.events.contains(&AppEvent::PeerKeyCached {
        peer: peer("bob"),
        fingerprint: bob_local,
    }));
}

#[test]
fn test_decline() {
    let mut relay = TestRelay::new(&["alice", "bob"]);
    relay.command("alice", Command::InvitePeer { peer: peer("bob") });
    relay.pump();
    relay.client_mut("alice").new_events();

    assert!(relay.command("bob", Command::DeclineInvite { peer: peer("alice") }));
    relay.pump();

    let alice = relay.client_mut("alice");
    assert!(!alice.core.sessions().contains(&peer("bob")));
    let events = alice.new_events();
    assert!(events
        .iter()
        .any(|e| matches!(e, AppEvent::SystemNotice { text } if text.contains("bob"))));
    assert!(events.contains(&AppEvent::PmSessionClosed {
        peer: peer("bob"),
        reason: SessionCloseReason::DeclinedByPeer,
    }));
    assert!(alice.tabs().is_empty());
    assert!(!relay.client("bob").core.sessions().contains(&peer("alice")));
}

#[test]
fn test_disconnect_mid_conversation_then_auto_resume() {
    let mut relay = TestRelay::new(&["alice", "bob"]);
    establish(&mut relay);
    relay.command(
        "bob",
        Command::SendPrivate {
            peer: peer("alice"),
            text: "hi alice".to_string(),
        },
    );
    relay.pump();
    assert_eq!(
        relay.client("alice").core.sessions().get(&peer("bob")).unwrap().log().len(),
        1
    );

    assert!(relay.command("bob", Command::DisconnectPm { peer: peer("alice") }));
    relay.pump();
    assert!(!relay.client("alice").core.sessions().contains(&peer("bob")));
    assert!(!relay.client("alice").tabs().contains(&peer("bob")));

    // bob still holds alice's key and writes without a new invite
    let ciphertext =
        MessageCodec::encrypt("back again", &peer("alice"), relay.client("bob").core.keys())
            .unwrap();
    relay.inject("bob", Frame::pm_message(&peer("alice"), ciphertext));

    let alice = relay.client("alice");
    let session = alice.core.sessions().get(&peer("bob")).unwrap();
    assert_eq!(session.status(), PmStatus::Accepted);
    assert_eq!(session.log().len(), 1);
    assert_eq!(session.log()[0].text, "back again");
    assert!(session.has_unread());
    assert!(alice.tabs().contains(&peer("bob")));
}

#[test]
fn test_reconnect_during_handshake_does_not_resend() {
    let mut relay = TestRelay::new(&["alice", "bob"]);
    relay.command("alice", Command::InvitePeer { peer: peer("bob") });
    let lost = relay.drop_pending("alice");
    assert_eq!(lost[0], Frame::pm_invite(&peer("bob")));

    relay.reconnect("alice");
    relay.pump();

    assert_eq!(
        relay.client("alice").core.sessions().status(&peer("bob")),
        Some(PmStatus::PendingOutbound)
    );
    assert!(relay.client("bob").core.sessions().is_empty());

    // a human resend recovers
    assert!(relay.command("alice", Command::InvitePeer { peer: peer("bob") }));
    relay.pump();
    assert_eq!(
        relay.client("bob").core.sessions().status(&peer("alice")),
        Some(PmStatus::PendingInbound)
    );
}

#[test]
fn test_reconnect_resumes_handshake_when_configured() {
    let config = SessionConfig {
        resume_handshakes_on_reconnect: true,
        ..SessionConfig::default()
    };
    let mut relay = TestRelay::with_config(&["alice", "bob"], config);
    relay.command("alice", Command::InvitePeer { peer: peer("bob") });
    relay.drop_pending("alice");

    relay.reconnect("alice");
    relay.pump();
    assert!(relay.client("bob").prompts.contains(&peer("alice")));
}

#[test]
fn test_send_while_offline_is_not_logged() {
    let mut relay = TestRelay::new(&["alice", "bob"]);
    establish(&mut relay);
    relay.set_online("alice", false);

    assert!(!relay.command(
        "alice",
        Command::SendPrivate {
            peer: peer("bob"),
            text: "lost".to_string(),
        }
    ));
    assert!(relay
        .client("alice")
        .core
        .sessions()
        .get(&peer("bob"))
        .unwrap()
        .log()
        .is_empty());
}

#[test]
fn test_tampered_message_shows_placeholder_and_session_survives() {
    let mut relay = TestRelay::new(&["alice", "bob"]);
    establish(&mut relay);

    relay.inject("bob", Frame::pm_message(&peer("alice"), "AAAA".to_string()));
    relay.command(
        "bob",
        Command::SendPrivate {
            peer: peer("alice"),
            text: "second".to_string(),
        },
    );
    relay.pump();

    let log = relay.client("alice").core.sessions().get(&peer("bob")).unwrap().log().to_vec();
    assert_eq!(log.len(), 2);
    assert!(!log[0].decrypted);
    assert!(log[1].decrypted);
    assert_eq!(log[1].text, "second");
}

#[test]
fn test_public_chat_is_broadcast() {
    let mut relay = TestRelay::new(&["alice", "bob"]);
    relay.command(
        "alice",
        Command::SendChat {
            message: "hi all".to_string(),
        },
    );
    relay.pump();

    assert!(relay.client("bob").out.events.contains(&AppEvent::ChatMessage {
        user: Some("alice".to_string()),
        message: "hi all".to_string(),
    }));
}

#[test]
fn test_sessions_match_tabs_after_mixed_traffic() {
    let mut relay = TestRelay::new(&["alice", "bob", "carol"]);
    establish(&mut relay);
    relay.command("carol", Command::InvitePeer { peer: peer("alice") });
    relay.pump();
    relay.command("alice", Command::DeclineInvite { peer: peer("carol") });
    relay.command("bob", Command::DisconnectPm { peer: peer("alice") });
    relay.pump();

    for name in ["alice", "bob", "carol"] {
        let client = relay.client(name);
        assert_eq!(client.tabs(), client.session_peers(), "{}", name);
    }
}
