//! BLE-MIDI peripheral session (btleplug-backed).
//!
//! Scans for a peripheral advertising the MIDI service (or matching the
//! configured name), connects, subscribes to the MIDI I/O characteristic
//! and feeds decoded events to the main loop. The advertisement scan runs
//! in its own task and is reaped by the presence check, so a scan window
//! never suspends the main loop. Loss of the link is detected when the
//! notification stream ends; the watchdog then drives the rescan.

use anyhow::Result;
use async_trait::async_trait;
use btleplug::api::{Central, Characteristic, Peripheral as _, ScanFilter, WriteType};
use btleplug::platform::{Adapter, Peripheral};
use futures::StreamExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::ble::codec;
use crate::midi::{format_hex, MidiEvent};
use crate::transport::{Link, Session, TransportError, TransportStatus};

/// Standard BLE-MIDI service UUID.
pub const MIDI_SERVICE_UUID: Uuid = Uuid::from_u128(0x03B8_0E5A_EDE8_4B33_A751_6CE3_4EC4_C700);
/// Standard BLE-MIDI I/O characteristic UUID.
pub const MIDI_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x7772_E5DB_3868_4112_A1A9_F266_9D10_6BF3);

/// How long one advertisement scan window lasts.
const SCAN_WINDOW: Duration = Duration::from_millis(1500);

/// Session for the BLE effects peripheral.
pub struct BleSession {
    adapter: Adapter,

    /// Advertised-name fallback for peripherals that omit the MIDI service
    /// UUID from their advertisement.
    target_name: String,

    /// Decoded events headed for the main loop.
    event_tx: mpsc::Sender<MidiEvent>,

    /// Pinged by the notification task when the stream ends underneath an
    /// established session (unsolicited disconnect).
    lost_tx: mpsc::Sender<()>,

    peripheral: Option<Peripheral>,
    characteristic: Option<Characteristic>,
    notify_task: Option<JoinHandle<()>>,

    /// Peripheral found by the last completed scan, consumed by `open`.
    candidate: Option<Peripheral>,
    scan_task: Option<JoinHandle<Result<Vec<Peripheral>, btleplug::Error>>>,

    /// Cleared before the handle is released so the notification task stops
    /// forwarding events for a closed session.
    live: Arc<AtomicBool>,

    status: TransportStatus,
}

impl BleSession {
    pub fn new(
        adapter: Adapter,
        target_name: String,
        event_tx: mpsc::Sender<MidiEvent>,
        lost_tx: mpsc::Sender<()>,
    ) -> Self {
        Self {
            adapter,
            target_name,
            event_tx,
            lost_tx,
            peripheral: None,
            characteristic: None,
            notify_task: None,
            candidate: None,
            scan_task: None,
            live: Arc::new(AtomicBool::new(false)),
            status: TransportStatus::Disconnected,
        }
    }

    async fn release(&mut self) {
        self.live.store(false, Ordering::SeqCst);
        if let Some(task) = self.notify_task.take() {
            task.abort();
        }
        if let Some(task) = self.scan_task.take() {
            task.abort();
        }
        if let Some(peripheral) = self.peripheral.take() {
            if let Some(characteristic) = self.characteristic.take() {
                peripheral.unsubscribe(&characteristic).await.ok();
            }
            peripheral.disconnect().await.ok();
        }
        self.characteristic = None;
        self.status = TransportStatus::Disconnected;
    }

    /// Drive the background advertisement scan: reap a finished window or
    /// start the next one. Each call returns immediately; the scan window
    /// sleep happens on the spawned task, never on the main loop.
    async fn poll_scan(&mut self) -> Result<()> {
        if self.candidate.is_some() {
            return Ok(());
        }

        let finished = self.scan_task.as_ref().is_some_and(|t| t.is_finished());
        if finished {
            if let Some(task) = self.scan_task.take() {
                let peripherals = task.await??;
                self.candidate = self.pick_candidate(peripherals).await;
            }
        } else if self.scan_task.is_none() {
            let adapter = self.adapter.clone();
            self.scan_task = Some(tokio::spawn(async move {
                adapter.start_scan(ScanFilter::default()).await?;
                tokio::time::sleep(SCAN_WINDOW).await;
                let peripherals = adapter.peripherals().await?;
                let _ = adapter.stop_scan().await;
                Ok(peripherals)
            }));
        }

        Ok(())
    }

    /// First scanned peripheral advertising the MIDI service or matching
    /// the configured name.
    async fn pick_candidate(&self, peripherals: Vec<Peripheral>) -> Option<Peripheral> {
        for peripheral in peripherals {
            let Ok(Some(properties)) = peripheral.properties().await else {
                continue;
            };
            let name = properties.local_name.clone().unwrap_or_default();
            let has_midi_service = properties
                .services
                .iter()
                .any(|uuid| *uuid == MIDI_SERVICE_UUID);

            if has_midi_service || name.contains(&self.target_name) {
                debug!("BLE candidate: '{}' ({:?})", name, peripheral.id());
                return Some(peripheral);
            }
        }
        None
    }

    fn spawn_notify_task(
        &mut self,
        mut notifications: futures::stream::BoxStream<'static, btleplug::api::ValueNotification>,
    ) {
        let live = Arc::new(AtomicBool::new(true));
        let live_task = live.clone();
        let event_tx = self.event_tx.clone();
        let lost_tx = self.lost_tx.clone();

        self.live = live;
        self.notify_task = Some(tokio::spawn(async move {
            while let Some(notification) = notifications.next().await {
                if !live_task.load(Ordering::SeqCst) {
                    return;
                }
                if notification.uuid != MIDI_CHARACTERISTIC_UUID {
                    continue;
                }
                // Malformed bytes are tolerated by the codec skip rule and
                // simply decode to nothing.
                for event in codec::decode(&notification.value) {
                    debug!("BLE RX: {}", event);
                    if event_tx.send(event).await.is_err() {
                        return;
                    }
                }
            }
            // Stream ended underneath us: unsolicited disconnect.
            if live_task.load(Ordering::SeqCst) {
                let _ = lost_tx.try_send(());
            }
        }));
    }
}

#[async_trait]
impl Session for BleSession {
    fn link(&self) -> Link {
        Link::Ble
    }

    fn status(&self) -> TransportStatus {
        self.status
    }

    async fn present(&mut self) -> Result<bool> {
        match (&self.peripheral, self.status) {
            // Probe the established link; the notification task usually
            // notices loss first, this is the fallback.
            (Some(peripheral), TransportStatus::Connected) => {
                Ok(peripheral.is_connected().await?)
            }
            // While disconnected, present means a completed scan found a
            // matching peripheral for `open` to connect to.
            _ => {
                self.poll_scan().await?;
                Ok(self.candidate.is_some())
            }
        }
    }

    async fn open(&mut self) -> Result<(), TransportError> {
        self.release().await;
        self.status = TransportStatus::Connecting;

        let result = self.open_inner().await;
        if result.is_err() {
            self.release().await;
        }
        result
    }

    async fn close(&mut self) {
        if self.status != TransportStatus::Disconnected {
            info!("BLE peripheral disconnected");
        }
        self.release().await;
    }

    async fn send(&mut self, event: &MidiEvent) -> Result<(), TransportError> {
        if self.status != TransportStatus::Connected {
            warn!("BLE TX dropped (not connected): {}", event);
            return Err(TransportError::SendWhileDisconnected("ble"));
        }
        let (peripheral, characteristic) =
            match (self.peripheral.as_ref(), self.characteristic.as_ref()) {
                (Some(p), Some(c)) => (p.clone(), c.clone()),
                _ => return Err(TransportError::SendWhileDisconnected("ble")),
            };

        let packet = match codec::encode(event) {
            Ok(packet) => packet,
            Err(e) => {
                // Rejected, not masked. The router only builds validated
                // events, so this indicates a config that slipped past
                // validation.
                error!("BLE TX rejected: {}", e);
                return Ok(());
            }
        };

        match peripheral
            .write(&characteristic, &packet, WriteType::WithoutResponse)
            .await
        {
            Ok(()) => {
                debug!("BLE TX: {} | {}", format_hex(&packet), event);
                Ok(())
            }
            Err(e) => {
                warn!("BLE write failed, marking transport lost: {}", e);
                self.release().await;
                Err(TransportError::TransportLost(e.to_string()))
            }
        }
    }
}

impl BleSession {
    async fn open_inner(&mut self) -> Result<(), TransportError> {
        // Consumed on every attempt: a failed connect forces a fresh scan
        // instead of retrying a stale handle.
        let peripheral = self.candidate.take().ok_or_else(|| {
            TransportError::DeviceNotFound(format!(
                "no BLE-MIDI peripheral matching '{}'",
                self.target_name
            ))
        })?;

        let name = peripheral
            .properties()
            .await
            .ok()
            .flatten()
            .and_then(|p| p.local_name)
            .unwrap_or_else(|| "unknown".to_string());
        info!("Connecting to BLE peripheral: {}", name);

        if !peripheral
            .is_connected()
            .await
            .map_err(|e| TransportError::DeviceNotFound(e.to_string()))?
        {
            peripheral
                .connect()
                .await
                .map_err(|e| TransportError::DeviceNotFound(format!("BLE connect: {}", e)))?;
        }

        peripheral
            .discover_services()
            .await
            .map_err(|e| TransportError::DeviceNotFound(format!("BLE discovery: {}", e)))?;

        let characteristic = peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == MIDI_CHARACTERISTIC_UUID)
            .ok_or_else(|| {
                TransportError::SubscriptionFailure(format!(
                    "'{}' has no MIDI I/O characteristic",
                    name
                ))
            })?;

        peripheral
            .subscribe(&characteristic)
            .await
            .map_err(|e| TransportError::SubscriptionFailure(e.to_string()))?;

        let notifications = peripheral.notifications().await.map_err(|e| {
            TransportError::SubscriptionFailure(format!("notification stream: {}", e))
        })?;

        self.spawn_notify_task(notifications);
        self.peripheral = Some(peripheral);
        self.characteristic = Some(characteristic);
        self.status = TransportStatus::Connected;
        info!("BLE peripheral connected: {}", name);
        Ok(())
    }
}
