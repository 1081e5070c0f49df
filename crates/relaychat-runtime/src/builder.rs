//! Client Builder API
//!
//! Builder-style entry point for presentation layers (CLI, tests): configure a
//! client, spawn its task, and get back command/app-event handles.

use std::time::Duration;

use relaychat_core::{
    AppEvent, ChannelConfig, ChatCore, ClientConfig, Command, RelaychatError, RelaychatResult,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;

use crate::client::ClientTask;
use crate::connection::ConnectionManager;

pub type CommandSender = mpsc::Sender<Command>;
pub type CommandReceiver = mpsc::Receiver<Command>;
pub type AppEventSender = mpsc::Sender<AppEvent>;
pub type AppEventReceiver = mpsc::Receiver<AppEvent>;

/// Create the UI → runtime command channel
pub fn create_command_channel(config: &ChannelConfig) -> (CommandSender, CommandReceiver) {
    mpsc::channel(config.command_buffer_size)
}

/// Create the runtime → UI app event channel
pub fn create_app_event_channel(config: &ChannelConfig) -> (AppEventSender, AppEventReceiver) {
    mpsc::channel(config.app_event_buffer_size)
}

// ----------------------------------------------------------------------------
// Client Builder
// ----------------------------------------------------------------------------

/// Builder for one relay chat client
pub struct ClientBuilder {
    username: String,
    token: String,
    config: ClientConfig,
}

impl ClientBuilder {
    /// `username` is the identity the relay derives from `token`
    pub fn new(username: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            token: token.into(),
            config: ClientConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Override the relay endpoint
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.config.connection.url = url.into();
        self
    }

    /// Validate the configuration and spawn the client task
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(self) -> RelaychatResult<ClientHandle> {
        self.config.validate()?;
        info!(username = %self.username, url = %self.config.connection.url, "Starting client");

        let (command_sender, command_receiver) = create_command_channel(&self.config.channels);
        let (app_event_sender, app_event_receiver) =
            create_app_event_channel(&self.config.channels);

        let conn = ConnectionManager::new(self.config.connection.clone(), &self.token)?;
        let core = ChatCore::new(self.username.clone(), self.config.session.clone());
        let task = ClientTask::new(core, conn, command_receiver, app_event_sender);

        Ok(ClientHandle {
            username: self.username,
            command_sender,
            app_event_receiver: Some(app_event_receiver),
            task_handle: Some(tokio::spawn(task.run())),
        })
    }
}

// ----------------------------------------------------------------------------
// Client Handle
// ----------------------------------------------------------------------------

/// Handle to a running client task
pub struct ClientHandle {
    username: String,
    command_sender: CommandSender,
    app_event_receiver: Option<AppEventReceiver>,
    task_handle: Option<JoinHandle<RelaychatResult<()>>>,
}

impl ClientHandle {
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Get a command sender for sending commands to the client
    pub fn command_sender(&self) -> CommandSender {
        self.command_sender.clone()
    }

    /// Take the app event receiver (can only be called once)
    pub fn take_app_event_receiver(&mut self) -> Option<AppEventReceiver> {
        self.app_event_receiver.take()
    }

    /// Send a command to the client task
    pub async fn send_command(&self, command: Command) -> RelaychatResult<()> {
        self.command_sender
            .send(command)
            .await
            .map_err(|_| RelaychatError::channel_error("Failed to send command to client task"))
    }

    pub fn is_running(&self) -> bool {
        self.task_handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Wait for the client task to complete
    pub async fn wait(&mut self) -> RelaychatResult<()> {
        match self.task_handle.take() {
            Some(handle) => handle.await.map_err(|e| {
                RelaychatError::channel_error(format!("Client task panicked: {}", e))
            })?,
            None => Ok(()),
        }
    }

    /// Close the connection and stop the client task
    pub async fn shutdown(&mut self) -> RelaychatResult<()> {
        info!(username = %self.username, "Shutting down client");
        let _ = self.send_command(Command::Shutdown).await;

        if let Some(handle) = self.task_handle.take() {
            match tokio::time::timeout(Duration::from_secs(5), handle).await {
                Ok(joined) => {
                    joined.map_err(|e| {
                        RelaychatError::channel_error(format!("Client task panicked: {}", e))
                    })??;
                }
                Err(_) => {
                    return Err(RelaychatError::channel_error(
                        "Client task did not stop within 5s",
                    ))
                }
            }
        }
        Ok(())
    }
}
