//! Property-based tests for the codec, backoff and session invariants

use std::time::{Duration, Instant};

use proptest::prelude::*;
use relaychat_core::{
    connection::CLOSE_ABNORMAL, ChatCore, Command, ConnectionConfig, ConnectionState,
    CryptoError, KeyExchangeService, MessageCodec, Peer, RecordingOutbound, RelaychatError,
    SessionConfig,
};

const PEERS: [&str; 3] = ["bob", "carol", "dave"];

fn arb_peer() -> impl Strategy<Value = Peer> {
    (0..PEERS.len()).prop_map(|i| Peer::new(PEERS[i]))
}

/// One step a client can experience: a local command or an inbound frame
#[derive(Debug, Clone)]
enum Step {
    Local(Command),
    Inbound(String),
}

fn arb_step() -> impl Strategy<Value = Step> {
    prop_oneof![
        arb_peer().prop_map(|peer| Step::Local(Command::InvitePeer { peer })),
        arb_peer().prop_map(|peer| Step::Local(Command::AcceptInvite { peer })),
        arb_peer().prop_map(|peer| Step::Local(Command::DeclineInvite { peer })),
        arb_peer().prop_map(|peer| Step::Local(Command::DisconnectPm { peer })),
        arb_peer().prop_map(|peer| Step::Local(Command::ClosePm { peer })),
        arb_peer().prop_map(|peer| Step::Local(Command::FocusPm { peer })),
        Just(Step::Local(Command::MinimizePm)),
        (arb_peer(), prop::sample::select(vec![
            "pm_invite",
            "pm_accept",
            "pm_decline",
            "pm_disconnect",
        ]))
        .prop_map(|(peer, kind)| Step::Inbound(format!(
            r#"{{"type":"{}","from":"{}"}}"#,
            kind, peer
        ))),
        arb_peer().prop_map(|peer| Step::Inbound(format!(
            r#"{{"type":"pm_message","from":"{}","ciphertext":"AAAA"}}"#,
            peer
        ))),
    ]
}

fn tabs(out: &RecordingOutbound) -> std::collections::BTreeSet<Peer> {
    use relaychat_core::AppEvent;
    let mut tabs = std::collections::BTreeSet::new();
    for event in &out.events {
        match event {
            AppEvent::PmSessionOpened { peer, .. } => {
                tabs.insert(peer.clone());
            }
            AppEvent::PmSessionClosed { peer, .. } => {
                tabs.remove(peer);
            }
            _ => {}
        }
    }
    tabs
}

fn arb_session_config() -> impl Strategy<Value = SessionConfig> {
    (any::<bool>(), any::<bool>()).prop_map(|(retain, decline_on_expiry)| SessionConfig {
        retain_disconnected_sessions: retain,
        decline_on_prompt_expiry: decline_on_expiry,
        ..SessionConfig::default()
    })
}

proptest! {
    #[test]
    fn prop_sealed_box_roundtrip(plaintext in ".{0,512}") {
        let mut alice = KeyExchangeService::new(true);
        let mut bob = KeyExchangeService::new(true);
        alice.ensure_local_key_pair().unwrap();
        bob.ensure_local_key_pair().unwrap();

        let mut out = RecordingOutbound::default();
        let bob_key = bob.export_local_public_key().unwrap();
        alice.handle_pubkey_response(&Peer::new("bob"), &bob_key, &mut out).unwrap();

        let ciphertext = MessageCodec::encrypt(&plaintext, &Peer::new("bob"), &alice).unwrap();
        prop_assert_eq!(MessageCodec::decrypt(&ciphertext, &bob).unwrap(), plaintext);
    }

    #[test]
    fn prop_no_key_no_send(peer in arb_peer(), text in ".{1,64}") {
        let mut core = ChatCore::new("alice", SessionConfig::default());
        let mut out = RecordingOutbound::default();
        core.start(&mut out);
        core.dispatch(&format!(r#"{{"type":"pm_accept","from":"{}"}}"#, peer), &mut out);
        out.drain();

        let result = core.execute(Command::SendPrivate { peer: peer.clone(), text }, &mut out);
        let is_no_key = matches!(
            result,
            Err(RelaychatError::Crypto(CryptoError::NoKeyAvailable { .. }))
        );
        prop_assert!(is_no_key);
        prop_assert!(out.sent.is_empty());
    }

    #[test]
    fn prop_backoff_is_capped_exponential(
        base_ms in 1u64..5_000,
        extra_ms in 0u64..60_000,
        closes in 1u32..24,
    ) {
        let config = ConnectionConfig {
            base_reconnect_delay_ms: base_ms,
            max_reconnect_delay_ms: base_ms + extra_ms,
            ..ConnectionConfig::default()
        };
        let mut state = ConnectionState::new(&config);
        let max = Duration::from_millis(base_ms + extra_ms);

        for n in 1..=closes {
            state.on_close(CLOSE_ABNORMAL);
            let scheduled = state.schedule_reconnect().unwrap();
            let expected = Duration::from_millis(base_ms)
                .saturating_mul(1u32.checked_shl(n - 1).unwrap_or(u32::MAX))
                .min(max);
            prop_assert_eq!(scheduled.attempt, n);
            prop_assert_eq!(scheduled.delay, expected);
            state.on_reconnect_timer();
        }

        state.on_open(Instant::now());
        prop_assert_eq!(state.reconnect_attempts(), 0);
        state.on_close(CLOSE_ABNORMAL);
        prop_assert_eq!(state.schedule_reconnect().unwrap().delay, Duration::from_millis(base_ms));
    }

    #[test]
    fn prop_sessions_match_tabs_and_focus_is_single(
        config in arb_session_config(),
        steps in prop::collection::vec(arb_step(), 0..40),
    ) {
        let mut core = ChatCore::new("alice", config);
        let mut out = RecordingOutbound::default();
        core.start(&mut out);

        for step in steps {
            match step {
                Step::Local(command) => {
                    core.handle_command(command, &mut out);
                }
                Step::Inbound(text) => {
                    core.dispatch(&text, &mut out);
                }
            }

            let sessions: std::collections::BTreeSet<Peer> =
                core.sessions().peers().into_iter().collect();
            prop_assert_eq!(&tabs(&out), &sessions);

            let focused_count = PEERS
                .iter()
                .filter(|name| core.sessions().is_focused(&Peer::new(**name)))
                .count();
            prop_assert!(focused_count <= 1);
            if let Some(focused) = core.sessions().focused() {
                prop_assert!(sessions.contains(focused));
            }
        }
    }

    #[test]
    fn prop_decline_leaves_no_state(peer in arb_peer(), inbound in any::<bool>(), remote in any::<bool>()) {
        let mut core = ChatCore::new("alice", SessionConfig::default());
        let mut out = RecordingOutbound::default();
        core.start(&mut out);

        if inbound {
            core.dispatch(&format!(r#"{{"type":"pm_invite","from":"{}"}}"#, peer), &mut out);
        } else {
            core.execute(Command::InvitePeer { peer: peer.clone() }, &mut out).unwrap();
        }

        if remote {
            core.dispatch(&format!(r#"{{"type":"pm_decline","from":"{}"}}"#, peer), &mut out);
        } else {
            core.execute(Command::DeclineInvite { peer: peer.clone() }, &mut out).unwrap();
        }

        prop_assert!(core.sessions().get(&peer).is_none());
        prop_assert!(!tabs(&out).contains(&peer));
    }
}
