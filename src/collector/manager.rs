//! Connection state tracking and lap delivery

use std::sync::Arc;

use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{ChannelEvent, ChannelEvents, CollectorChannel};
use crate::types::{LAP_EVENT, LapEvent, REGISTER_EVENT, RegisterAgent};
use crate::{RelayError, Result};

/// Connection lifecycle as seen by the rest of the agent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Owns a [`CollectorChannel`] and mirrors its lifecycle into a watch channel.
///
/// The manager is the single writer of [`ConnectionState`]. A background task
/// consumes the transport's [`ChannelEvent`]s and registers the agent on every
/// (re)connect; everyone else only reads the state.
pub struct ConnectionManager<C> {
    channel: Arc<C>,
    state_tx: Arc<watch::Sender<ConnectionState>>,
    state_rx: watch::Receiver<ConnectionState>,
    cancel: CancellationToken,
}

impl<C: CollectorChannel> ConnectionManager<C> {
    /// Start tracking the given channel.
    ///
    /// `events` must be the receiver handed out together with `channel`.
    pub fn spawn(channel: C, events: ChannelEvents, identity: RegisterAgent) -> Self {
        let channel = Arc::new(channel);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let state_tx = Arc::new(state_tx);
        let cancel = CancellationToken::new();

        tokio::spawn(Self::event_task(
            Arc::clone(&channel),
            events,
            Arc::clone(&state_tx),
            identity,
            cancel.clone(),
        ));

        Self { channel, state_tx, state_rx, cancel }
    }

    async fn event_task(
        channel: Arc<C>,
        mut events: ChannelEvents,
        state_tx: Arc<watch::Sender<ConnectionState>>,
        identity: RegisterAgent,
        cancel: CancellationToken,
    ) {
        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => break,
                event = events.recv() => match event {
                    Some(event) => event,
                    None => {
                        debug!("Channel event stream closed");
                        state_tx.send_replace(ConnectionState::Disconnected);
                        break;
                    }
                },
            };

            match event {
                ChannelEvent::Connected => {
                    info!(
                        driver = %identity.driver_name,
                        computer = %identity.computer_name,
                        "Collector connected, registering agent"
                    );
                    let registered = serde_json::to_value(&identity)
                        .map_err(RelayError::from)
                        .and_then(|payload| channel.emit(REGISTER_EVENT, payload));
                    if let Err(e) = registered {
                        warn!(error = %e, "Failed to send agent registration");
                    }
                    state_tx.send_replace(ConnectionState::Connected);
                }
                ChannelEvent::Disconnected { reason } => {
                    info!(%reason, "Collector disconnected");
                    state_tx.send_replace(ConnectionState::Disconnected);
                }
                ChannelEvent::ConnectError { detail } => {
                    warn!(%detail, "Collector connection error");
                }
            }
        }
        debug!("Connection event task ended");
    }

    /// Connect to the collector; resolves once the outcome is known.
    pub async fn connect(&self, url: &str) -> Result<()> {
        self.state_tx.send_replace(ConnectionState::Connecting);
        info!(%url, "Connecting to collector");

        if let Err(e) = self.channel.connect(url).await {
            self.state_tx.send_replace(ConnectionState::Disconnected);
            return Err(e);
        }

        // The event task finishes the transition once it has registered.
        let mut state = self.state_rx.clone();
        let settled = state
            .wait_for(|s| *s != ConnectionState::Connecting)
            .await
            .map(|s| *s)
            .map_err(|_closed| RelayError::connection_failed("connection state went away"))?;
        if settled != ConnectionState::Connected {
            return Err(RelayError::connection_failed(
                "collector dropped the connection before registration",
            ));
        }
        debug!("Connect settled");
        Ok(())
    }

    /// Forward a lap to the collector.
    ///
    /// Returns `Ok(false)` when the lap was dropped because the collector is
    /// not connected. Dropped laps are never queued.
    pub fn send(&self, lap: &LapEvent) -> Result<bool> {
        if !self.is_connected() {
            debug!(lap = lap.lap_number, "Not connected, dropping lap");
            return Ok(false);
        }

        let payload = serde_json::to_value(lap)?;
        self.channel.emit(LAP_EVENT, payload)?;
        info!(
            lap = lap.lap_number,
            lap_time = lap.lap_time,
            valid = lap.is_valid,
            "Lap sent to collector"
        );
        Ok(true)
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Stream of state changes, starting with the current state
    pub fn state_updates(&self) -> WatchStream<ConnectionState> {
        WatchStream::new(self.state_rx.clone())
    }

    /// Wait until the connection reaches `target`.
    pub async fn wait_for_state(&self, target: ConnectionState) -> Result<()> {
        let mut state = self.state_rx.clone();
        state
            .wait_for(|s| *s == target)
            .await
            .map(|_| ())
            .map_err(|_closed| RelayError::connection_failed("connection state went away"))
    }

    /// Disconnect if connected and stop tracking events.
    pub async fn shutdown(&self) -> Result<()> {
        let result = if self.state() == ConnectionState::Disconnected {
            Ok(())
        } else {
            info!("Disconnecting from collector");
            self.channel.disconnect().await
        };
        self.state_tx.send_replace(ConnectionState::Disconnected);
        self.cancel.cancel();
        result
    }

    /// Access the underlying channel
    pub fn channel(&self) -> &C {
        &self.channel
    }
}

impl<C> Drop for ConnectionManager<C> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
