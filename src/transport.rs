//! Transport session contract shared by the USB and BLE sides.

use crate::midi::MidiEvent;
use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;

/// Connection state of a transport session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportStatus {
    Disconnected,
    Connecting,
    Connected,
}

/// Which physical link an event refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Link {
    Usb,
    Ble,
}

impl std::fmt::Display for Link {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Link::Usb => write!(f, "USB"),
            Link::Ble => write!(f, "BLE"),
        }
    }
}

/// Lifecycle notification emitted by the watchdog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEvent {
    Connected(Link),
    Disconnected(Link),
}

/// Hardware-adjacent failures, caught at the session boundary and converted
/// to state transitions or dropped sends. Only configuration errors escalate
/// past this taxonomy.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Required endpoint absent at open or during re-scan. Retried with
    /// backoff by the watchdog; fatal only for a mandatory device at the
    /// very first check.
    #[error("device not found: {0}")]
    DeviceNotFound(String),

    /// A send was attempted while the session is not connected. The command
    /// is dropped, never queued for late replay.
    #[error("send while disconnected: {0}")]
    SendWhileDisconnected(&'static str),

    /// GATT subscription failed; treated as `DeviceNotFound` for retry.
    #[error("subscription failure: {0}")]
    SubscriptionFailure(String),

    /// The link dropped underneath an established session.
    #[error("transport lost: {0}")]
    TransportLost(String),
}

/// A session the watchdog can drive through its connect/lost/retry cycle.
///
/// All methods take `&mut self`: sessions live on the single main loop and
/// are never shared across tasks.
#[async_trait]
pub trait Session: Send {
    fn link(&self) -> Link;

    fn status(&self) -> TransportStatus;

    /// Cheap presence check. `Err` means the check itself failed (device
    /// enumeration error) and must be treated as "no change" by the caller.
    async fn present(&mut self) -> Result<bool>;

    /// Locate the endpoint and bring the session up. Re-entrant: an already
    /// open session is closed and released first, so no zombie handle stays
    /// registered with the underlying driver.
    async fn open(&mut self) -> Result<(), TransportError>;

    /// Unregister event callbacks, then release the underlying handle.
    async fn close(&mut self);

    /// Fire-and-forget write. Reports `SendWhileDisconnected` instead of
    /// failing hard when the link is down.
    async fn send(&mut self, event: &MidiEvent) -> Result<(), TransportError>;
}
