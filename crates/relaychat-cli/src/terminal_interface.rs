//! Terminal Interface
//!
//! Reads line commands from stdin and prints app events. Private
//! conversations are shown inline, prefixed with the peer name; the
//! "focused" tab only decides which conversations count as unread.

use relaychat_core::{AppEvent, Author, Peer, PmStatus, SessionCloseReason};
use relaychat_runtime::{AppEventReceiver, ClientHandle};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info};

use crate::commands::{parse_line, LineInput, HELP};
use crate::config::CliConfig;
use crate::error::Result;

// ----------------------------------------------------------------------------
// Event Rendering
// ----------------------------------------------------------------------------

/// Render one app event as a terminal line; `None` for events with no output
pub fn render_event(event: &AppEvent, config: &CliConfig) -> Option<String> {
    let line = match event {
        AppEvent::Connected => "* connected".to_string(),
        AppEvent::Disconnected { will_reconnect } => {
            if *will_reconnect {
                "* connection lost".to_string()
            } else {
                "* disconnected".to_string()
            }
        }
        AppEvent::Reconnecting { attempt, delay } => {
            format!("* reconnecting in {:.1}s (attempt {})", delay.as_secs_f64(), attempt)
        }
        AppEvent::ChatMessage { user, message } => match user {
            Some(user) => format!("<{}> {}", user, message),
            None => format!("<?> {}", message),
        },
        AppEvent::UserList { users } => {
            if users.is_empty() {
                "* nobody else is online".to_string()
            } else {
                format!("* online: {}", users.join(", "))
            }
        }
        AppEvent::UserJoined { user } => format!("* {} joined", user),
        AppEvent::UserLeft { user } => format!("* {} left", user),
        AppEvent::SystemNotice { text } => format!("* {}", text),
        AppEvent::PrivateMessagingDisabled { reason } => {
            format!("* private messaging disabled: {}", reason)
        }
        AppEvent::PmInvitePrompt { peer, expires_in } => format!(
            "* {} wants to chat privately: /accept {} or /decline {} ({}s)",
            peer,
            peer,
            peer,
            expires_in.as_secs()
        ),
        AppEvent::PmInvitePromptExpired { peer } => {
            format!("* invite from {} is still pending", peer)
        }
        AppEvent::PmSessionOpened { peer, status } | AppEvent::PmSessionUpdated { peer, status } => {
            render_status(peer, *status)
        }
        AppEvent::PmSessionClosed { peer, reason } => match reason {
            SessionCloseReason::DeclinedLocally => format!("[{}] invite declined", peer),
            SessionCloseReason::DeclinedByPeer => return None,
            SessionCloseReason::DisconnectedLocally => format!("[{}] you left", peer),
            SessionCloseReason::DisconnectedByPeer => return None,
            SessionCloseReason::Closed => format!("[{}] closed", peer),
        },
        AppEvent::PmMessage { peer, entry } => match &entry.author {
            Author::Local => format!("[{}] you: {}", peer, entry.text),
            Author::Peer(author) => format!("[{}] {}: {}", peer, author, entry.text),
        },
        AppEvent::PmUnread { peer } => format!("* unread private messages from {}", peer),
        AppEvent::PmFocusChanged { .. } => return None,
        AppEvent::PeerKeyCached { peer, fingerprint } => {
            if !config.show_fingerprints {
                return None;
            }
            format!("* key for {}: {}", peer, fingerprint.short())
        }
        AppEvent::CommandFailed { command, error } => format!("! {}: {}", command, error),
    };
    Some(line)
}

fn render_status(peer: &Peer, status: PmStatus) -> String {
    match status {
        PmStatus::PendingOutbound => format!("[{}] invite sent", peer),
        PmStatus::PendingInbound => format!("[{}] invite received", peer),
        PmStatus::Accepted => format!("[{}] private chat open", peer),
        PmStatus::Disconnected => format!("[{}] peer left (read-only, /close {})", peer, peer),
    }
}

// ----------------------------------------------------------------------------
// Terminal Loop
// ----------------------------------------------------------------------------

/// Line-oriented terminal front end for one client
pub struct TerminalInterface {
    config: CliConfig,
    handle: ClientHandle,
    events: AppEventReceiver,
}

impl TerminalInterface {
    pub fn new(config: CliConfig, mut handle: ClientHandle) -> Result<Self> {
        let events = handle.take_app_event_receiver().ok_or_else(|| {
            crate::error::CliError::usage("app event receiver already taken")
        })?;
        Ok(Self {
            config,
            handle,
            events,
        })
    }

    /// Run until `/quit`, end of input, or the client stops
    pub async fn run(mut self) -> Result<()> {
        println!("Logged in as {}. Type /help for commands.", self.handle.username());
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        loop {
            tokio::select! {
                line = lines.next_line() => match line? {
                    Some(line) => {
                        if !self.handle_line(&line).await? {
                            break;
                        }
                    }
                    None => {
                        debug!("Standard input closed");
                        break;
                    }
                },
                event = self.events.recv() => match event {
                    Some(event) => self.print_event(&event),
                    None => {
                        info!("Client stopped");
                        return Ok(());
                    }
                },
            }
        }

        self.handle.shutdown().await?;
        // the final Disconnected is still queued
        while let Ok(event) = self.events.try_recv() {
            self.print_event(&event);
        }
        Ok(())
    }

    /// Returns false when the user asked to quit
    async fn handle_line(&mut self, line: &str) -> Result<bool> {
        match parse_line(line) {
            Ok(LineInput::Command(command)) => {
                self.handle.send_command(command).await?;
            }
            Ok(LineInput::Help) => println!("{}", HELP),
            Ok(LineInput::Quit) => return Ok(false),
            Ok(LineInput::Empty) => {}
            Err(e) => println!("! {}", e),
        }
        Ok(true)
    }

    fn print_event(&self, event: &AppEvent) {
        if let Some(line) = render_event(event, &self.config) {
            println!("{}", line);
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
