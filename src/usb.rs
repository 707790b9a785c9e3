//! USB foot controller session (midir-backed).
//!
//! Owns the midir input/output connections for the G-Board, parses incoming
//! MIDI into [`MidiEvent`]s and forwards them to the main loop, and writes
//! LED feedback back out as Note On velocity.

use anyhow::{Context, Result};
use async_trait::async_trait;
use midir::{MidiInput, MidiInputConnection, MidiOutput, MidiOutputConnection};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::midi::{format_hex, MidiEvent};
use crate::transport::{Link, Session, TransportError, TransportStatus};

const CLIENT_NAME: &str = "pedalbridge";

/// List available MIDI input port names
pub fn list_input_ports() -> Result<Vec<String>> {
    let midi_in = MidiInput::new(CLIENT_NAME).context("Failed to create MIDI input")?;

    let mut names = Vec::new();
    for port in midi_in.ports() {
        if let Ok(name) = midi_in.port_name(&port) {
            names.push(name);
        }
    }
    Ok(names)
}

/// List available MIDI output port names
pub fn list_output_ports() -> Result<Vec<String>> {
    let midi_out = MidiOutput::new(CLIENT_NAME).context("Failed to create MIDI output")?;

    let mut names = Vec::new();
    for port in midi_out.ports() {
        if let Ok(name) = midi_out.port_name(&port) {
            names.push(name);
        }
    }
    Ok(names)
}

pub fn matches(name: &str, selector: &str) -> bool {
    name.to_lowercase().contains(&selector.to_lowercase())
}

/// Session for the USB foot controller.
pub struct UsbSession {
    /// Substring matched against input and output port names.
    selector: String,

    /// Decoded events headed for the main loop.
    event_tx: mpsc::Sender<MidiEvent>,

    input_conn: Option<MidiInputConnection<()>>,

    output_conn: Option<Arc<Mutex<MidiOutputConnection>>>,

    /// Cleared before the input handle is released, so the callback stops
    /// forwarding events for a session that is already closed.
    live: Arc<AtomicBool>,

    status: TransportStatus,
}

impl UsbSession {
    pub fn new(selector: String, event_tx: mpsc::Sender<MidiEvent>) -> Self {
        Self {
            selector,
            event_tx,
            input_conn: None,
            output_conn: None,
            live: Arc::new(AtomicBool::new(false)),
            status: TransportStatus::Disconnected,
        }
    }

    fn release(&mut self) {
        // Unregister the callback first: no event for a closed session may
        // be processed after this point.
        self.live.store(false, Ordering::SeqCst);
        self.input_conn = None;
        self.output_conn = None;
        self.status = TransportStatus::Disconnected;
    }

    fn find_ports(
        &self,
        midi_in: &MidiInput,
        midi_out: &MidiOutput,
    ) -> Result<(midir::MidiInputPort, midir::MidiOutputPort, String), TransportError> {
        let in_port = midi_in
            .ports()
            .into_iter()
            .find(|p| {
                midi_in
                    .port_name(p)
                    .map(|n| matches(&n, &self.selector))
                    .unwrap_or(false)
            })
            .ok_or_else(|| {
                TransportError::DeviceNotFound(format!("no USB input matching '{}'", self.selector))
            })?;
        let name = midi_in.port_name(&in_port).unwrap_or_default();

        let out_port = midi_out
            .ports()
            .into_iter()
            .find(|p| {
                midi_out
                    .port_name(p)
                    .map(|n| matches(&n, &self.selector))
                    .unwrap_or(false)
            })
            .ok_or_else(|| {
                TransportError::DeviceNotFound(format!(
                    "no USB output matching '{}'",
                    self.selector
                ))
            })?;

        Ok((in_port, out_port, name))
    }
}

#[async_trait]
impl Session for UsbSession {
    fn link(&self) -> Link {
        Link::Usb
    }

    fn status(&self) -> TransportStatus {
        self.status
    }

    async fn present(&mut self) -> Result<bool> {
        let names = list_input_ports()?;
        Ok(names.iter().any(|n| matches(n, &self.selector)))
    }

    async fn open(&mut self) -> Result<(), TransportError> {
        // Re-entrant: release any prior handles so the driver never keeps a
        // zombie registration around.
        self.release();
        self.status = TransportStatus::Connecting;

        let midi_in = MidiInput::new(CLIENT_NAME)
            .map_err(|e| TransportError::DeviceNotFound(format!("MIDI input init: {}", e)))?;
        let midi_out = MidiOutput::new(CLIENT_NAME)
            .map_err(|e| TransportError::DeviceNotFound(format!("MIDI output init: {}", e)))?;

        let (in_port, out_port, port_name) = match self.find_ports(&midi_in, &midi_out) {
            Ok(found) => found,
            Err(e) => {
                self.status = TransportStatus::Disconnected;
                return Err(e);
            }
        };

        info!("Connecting to USB controller: {}", port_name);

        let live = Arc::new(AtomicBool::new(true));
        let live_cb = live.clone();
        let event_tx = self.event_tx.clone();

        let input_conn = midi_in
            .connect(
                &in_port,
                CLIENT_NAME,
                move |_timestamp, data, _| {
                    if !live_cb.load(Ordering::SeqCst) {
                        return;
                    }
                    match MidiEvent::parse(data) {
                        // Never block the midir callback thread.
                        Some(event) => {
                            let _ = event_tx.try_send(event);
                        }
                        None => debug!("USB RX unparsed: {}", format_hex(data)),
                    }
                },
                (),
            )
            .map_err(|e| {
                self.status = TransportStatus::Disconnected;
                TransportError::DeviceNotFound(format!("USB input connect: {}", e))
            })?;

        let output_conn = match midi_out.connect(&out_port, CLIENT_NAME) {
            Ok(conn) => conn,
            Err(e) => {
                // Don't leave a half-open session behind.
                live.store(false, Ordering::SeqCst);
                drop(input_conn);
                self.status = TransportStatus::Disconnected;
                return Err(TransportError::DeviceNotFound(format!(
                    "USB output connect: {}",
                    e
                )));
            }
        };

        self.live = live;
        self.input_conn = Some(input_conn);
        self.output_conn = Some(Arc::new(Mutex::new(output_conn)));
        self.status = TransportStatus::Connected;
        info!("USB controller connected: {}", port_name);
        Ok(())
    }

    async fn close(&mut self) {
        if self.status != TransportStatus::Disconnected {
            info!("USB controller disconnected");
        }
        self.release();
    }

    async fn send(&mut self, event: &MidiEvent) -> Result<(), TransportError> {
        if self.status != TransportStatus::Connected {
            warn!("USB TX dropped (not connected): {}", event);
            return Err(TransportError::SendWhileDisconnected("usb"));
        }
        let output = self
            .output_conn
            .as_ref()
            .ok_or(TransportError::SendWhileDisconnected("usb"))?
            .clone();

        let data = event.to_bytes();
        let result = output.lock().send(&data);
        match result {
            Ok(()) => {
                debug!("USB TX: {} | {}", format_hex(&data), event);
                Ok(())
            }
            Err(e) => {
                // A failed write means the device is gone; release and let
                // the watchdog drive the reconnect.
                warn!("USB send failed, marking transport lost: {}", e);
                self.release();
                Err(TransportError::TransportLost(e.to_string()))
            }
        }
    }
}
