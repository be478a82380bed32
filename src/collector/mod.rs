//! Outbound channel to the lap-time collector
//!
//! The collector is reached through a [`CollectorChannel`]: connect once,
//! emit named JSON events, disconnect. Lifecycle changes (connected, lost,
//! failed attempts) are not callbacks; the transport publishes them as
//! [`ChannelEvent`]s on an mpsc channel that the [`ConnectionManager`]
//! consumes.
//!
//! ```text
//! ┌──────────────┐  emit()   ┌────────────────┐  WebSocket  ┌───────────┐
//! │  Connection  │──────────►│ SocketIoChannel│────────────►│ Collector │
//! │   Manager    │◄──────────│  (transport)   │◄────────────│  server   │
//! └──────────────┘  events   └────────────────┘             └───────────┘
//! ```

use tokio::sync::mpsc;

use crate::Result;

pub mod manager;
pub mod socketio;

pub use manager::{ConnectionManager, ConnectionState};
pub use socketio::{SocketIoChannel, TransportConfig};

/// Lifecycle notification published by a transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// Handshake completed; the collector accepts events
    Connected,
    /// An established connection went away
    Disconnected { reason: String },
    /// A connection attempt failed
    ConnectError { detail: String },
}

/// Receiving half of a transport's lifecycle events
pub type ChannelEvents = mpsc::UnboundedReceiver<ChannelEvent>;

/// Bidirectional event channel to the collector
#[async_trait::async_trait]
pub trait CollectorChannel: Send + Sync + 'static {
    /// Open the connection; resolves once the collector accepted it.
    async fn connect(&self, url: &str) -> Result<()>;

    /// Queue a named event for delivery. Never blocks and never waits for an
    /// acknowledgement.
    fn emit(&self, event: &str, payload: serde_json::Value) -> Result<()>;

    /// Close the connection and stop any reconnection.
    async fn disconnect(&self) -> Result<()>;
}
