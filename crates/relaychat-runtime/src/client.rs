//! Client Task
//!
//! The single event loop of a client. It owns the [`ChatCore`] context and the
//! [`ConnectionManager`], and multiplexes user commands, socket reports and
//! every timer (reconnect, heartbeat, pong, invite prompts). Handlers never
//! run concurrently, so neither owner needs a lock.

use std::future::Future;

use hashbrown::HashMap;
use relaychat_core::{
    connection::CLOSE_NORMAL, AppEvent, ChatCore, Command, Dispatched, Peer, RelaychatError,
    Result,
};
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info};

use crate::connection::{ConnectionManager, LinkEvent, LinkedOutbound};

/// Wait for `deadline`, or forever when there is none
fn until(deadline: Option<Instant>) -> impl Future<Output = ()> {
    async move {
        match deadline {
            Some(deadline) => sleep_until(deadline).await,
            None => std::future::pending().await,
        }
    }
}

// ----------------------------------------------------------------------------
// Client Task
// ----------------------------------------------------------------------------

/// Event loop owning all client state
pub struct ClientTask {
    core: ChatCore,
    conn: ConnectionManager,
    commands: mpsc::Receiver<Command>,
    app_events: mpsc::Sender<AppEvent>,
    /// Expiry of each visible invite prompt
    prompts: HashMap<Peer, Instant>,
    running: bool,
}

impl ClientTask {
    pub fn new(
        core: ChatCore,
        conn: ConnectionManager,
        commands: mpsc::Receiver<Command>,
        app_events: mpsc::Sender<AppEvent>,
    ) -> Self {
        Self {
            core,
            conn,
            commands,
            app_events,
            prompts: HashMap::new(),
            running: true,
        }
    }

    /// Generate keys, open the socket and process until shutdown
    pub async fn run(mut self) -> Result<()> {
        info!(username = %self.core.username(), "Client task starting");
        self.core.start(&mut LinkedOutbound::new(&mut self.conn));
        self.conn.connect();
        self.flush().await;

        while self.running {
            let reconnect_at = self.conn.reconnect_deadline();
            let heartbeat_at = self.conn.heartbeat_deadline();
            let pong_at = self.conn.pong_deadline();
            let prompt_at = self.prompts.values().min().copied();

            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => {
                        info!("Command channel closed, shutting down");
                        self.shutdown();
                    }
                },
                Some((generation, event)) = self.conn.next_transport_event() => {
                    if let Some(link) = self.conn.handle_transport_event(generation, event) {
                        self.handle_link(link);
                    }
                }
                _ = until(reconnect_at) => self.conn.fire_reconnect(),
                _ = until(heartbeat_at) => self.conn.heartbeat_tick(),
                _ = until(pong_at) => {
                    if let Some(link) = self.conn.pong_timed_out() {
                        self.handle_link(link);
                    }
                }
                _ = until(prompt_at) => self.expire_prompts(),
            }

            self.flush().await;
        }

        info!("Client task stopped");
        Ok(())
    }

    fn handle_command(&mut self, command: Command) {
        debug!(command = command.name(), "Handling command");
        match command {
            Command::Shutdown => {
                self.shutdown();
            }
            command => {
                if let Command::AcceptInvite { peer } | Command::DeclineInvite { peer } = &command {
                    self.prompts.remove(peer);
                }
                let mut out = LinkedOutbound::new(&mut self.conn);
                self.core.handle_command(command, &mut out);
            }
        }
    }

    fn handle_link(&mut self, link: LinkEvent) {
        let mut out = LinkedOutbound::new(&mut self.conn);
        match link {
            LinkEvent::Connected => self.core.on_connected(&mut out),
            LinkEvent::Text(text) => match self.core.dispatch(&text, &mut out) {
                Dispatched::Handled => {}
                Dispatched::Liveness => self.conn.record_liveness(),
                Dispatched::InvitePrompt(peer) => {
                    let expires_at =
                        Instant::now() + self.core.sessions().config().invite_prompt_timeout();
                    self.prompts.insert(peer, expires_at);
                }
            },
            LinkEvent::Lost => {}
        }
    }

    fn expire_prompts(&mut self) {
        let now = Instant::now();
        let expired: Vec<Peer> = self
            .prompts
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(peer, _)| peer.clone())
            .collect();

        let mut out = LinkedOutbound::new(&mut self.conn);
        for peer in expired {
            self.prompts.remove(&peer);
            debug!(peer = %peer, "Invite prompt expired");
            self.core.invite_prompt_expired(&peer, &mut out);
        }
    }

    fn shutdown(&mut self) {
        self.conn.close(CLOSE_NORMAL, "client shutdown");
        self.core.teardown();
        self.prompts.clear();
        self.running = false;
    }

    /// Forward queued app events; a vanished UI stops the task
    async fn flush(&mut self) {
        for event in self.conn.drain_notifications() {
            if self.app_events.send(event).await.is_err() {
                let error = RelaychatError::channel_error("app event receiver dropped");
                info!(error = %error, "Stopping client task");
                self.conn.close(CLOSE_NORMAL, "client gone");
                self.running = false;
                return;
            }
        }
    }
}
