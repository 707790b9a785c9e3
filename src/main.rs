//! PedalBridge
//!
//! Bridges a USB MIDI foot controller to a BLE-MIDI effects peripheral:
//! switch presses become Control Change commands over BLE, preset feedback
//! from the peripheral drives the controller's LEDs, and both links are
//! supervised with automatic reconnection.

use anyhow::{bail, Result};
use btleplug::api::Manager as _;
use btleplug::platform::Manager;
use clap::Parser;
use tokio::sync::mpsc;
use tokio::time::{interval, Duration};
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod ble;
mod config;
mod leds;
mod midi;
mod router;
mod scan;
mod transport;
mod usb;
mod watchdog;

use crate::ble::BleSession;
use crate::config::AppConfig;
use crate::leds::LedWrite;
use crate::midi::MidiEvent;
use crate::router::Router;
use crate::transport::{Link, LinkEvent, Session};
use crate::usb::UsbSession;
use crate::watchdog::Watchdog;

/// Bridge a USB MIDI foot controller to a BLE-MIDI peripheral
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: String,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// List USB MIDI ports and nearby BLE peripherals, then exit
    #[arg(long)]
    scan: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let args = Args::parse();
    init_logging(&args.log_level)?;

    if args.scan {
        return scan::run().await;
    }

    info!("Starting PedalBridge...");
    let config = AppConfig::load(&args.config).await?;
    info!(
        "Bridging USB '{}' <-> BLE '{}'",
        config.usb.port, config.ble.name
    );

    if config.usb.required && !usb_present(&config.usb.port)? {
        bail!(
            "Required USB controller '{}' not found (use --scan to list ports)",
            config.usb.port
        );
    }

    let manager = Manager::new().await?;
    let adapter = match manager.adapters().await?.into_iter().next() {
        Some(adapter) => adapter,
        None => bail!("No BLE adapter found"),
    };

    let (usb_tx, mut usb_rx) = mpsc::channel::<MidiEvent>(256);
    let (ble_tx, mut ble_rx) = mpsc::channel::<MidiEvent>(256);
    let (lost_tx, mut lost_rx) = mpsc::channel::<()>(4);

    let mut usb_session = UsbSession::new(config.usb.port.clone(), usb_tx);
    let mut ble_session = BleSession::new(adapter, config.ble.name.clone(), ble_tx, lost_tx);

    let mut usb_watchdog = Watchdog::new();
    let mut ble_watchdog = Watchdog::new();
    let mut router = Router::new(&config);

    let mut poll = interval(Duration::from_millis(config.watchdog.poll_ms));
    let mut blink = interval(Duration::from_millis(config.watchdog.blink_ms));
    let mut blink_phase = false;
    let channel = config.midi_channel;

    info!("Entering main loop (Ctrl-C to stop)");
    loop {
        tokio::select! {
            _ = poll.tick() => {
                if let Some(event) = usb_watchdog.tick(&mut usb_session).await {
                    handle_link_event(event, &mut router, &mut usb_session, channel).await;
                }
                if let Some(event) = ble_watchdog.tick(&mut ble_session).await {
                    handle_link_event(event, &mut router, &mut usb_session, channel).await;
                }
            }

            _ = blink.tick() => {
                if router.is_blinking() && router.usb_connected() {
                    blink_phase = !blink_phase;
                    let writes = router.blink_frame(blink_phase);
                    apply_led_writes(&mut usb_session, channel, &writes).await;
                }
            }

            Some(event) = usb_rx.recv() => {
                debug!("USB -> {}", event);
                let output = router.on_usb_event(&event);
                for out in &output.to_ble {
                    if let Err(e) = ble_session.send(out).await {
                        warn!("BLE send failed: {}", e);
                        let event = ble_watchdog.mark_lost(&mut ble_session).await;
                        handle_link_event(event, &mut router, &mut usb_session, channel).await;
                        break;
                    }
                }
                apply_led_writes(&mut usb_session, channel, &output.led_writes).await;
            }

            Some(event) = ble_rx.recv() => {
                debug!("BLE -> {}", event);
                let output = router.on_ble_event(&event);
                apply_led_writes(&mut usb_session, channel, &output.led_writes).await;
            }

            Some(()) = lost_rx.recv() => {
                warn!("BLE link dropped (notification stream ended)");
                let event = ble_watchdog.mark_lost(&mut ble_session).await;
                handle_link_event(event, &mut router, &mut usb_session, channel).await;
                // Re-enter discovery right away rather than waiting out the
                // poll interval.
                if let Some(event) = ble_watchdog.tick(&mut ble_session).await {
                    handle_link_event(event, &mut router, &mut usb_session, channel).await;
                }
            }

            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    ble_session.close().await;
    usb_session.close().await;
    info!("PedalBridge shutdown complete");
    Ok(())
}

/// Feed a watchdog transition into the router and replay the resulting LED
/// updates onto the controller.
async fn handle_link_event(
    event: LinkEvent,
    router: &mut Router,
    usb_session: &mut UsbSession,
    channel: u8,
) {
    let writes = match event {
        LinkEvent::Connected(Link::Usb) => {
            info!("USB controller connected");
            router.set_usb_connected(true)
        }
        LinkEvent::Disconnected(Link::Usb) => {
            warn!("USB controller disconnected");
            router.set_usb_connected(false)
        }
        LinkEvent::Connected(Link::Ble) => {
            info!("BLE peripheral connected");
            router.set_ble_connected(true)
        }
        LinkEvent::Disconnected(Link::Ble) => {
            warn!("BLE peripheral disconnected, blinking until it returns");
            router.set_ble_connected(false)
        }
    };
    apply_led_writes(usb_session, channel, &writes).await;
}

/// LED updates travel to the controller as NoteOn with the switch index as
/// the note and velocity 127/0.
async fn apply_led_writes(usb_session: &mut UsbSession, channel: u8, writes: &[LedWrite]) {
    for write in writes {
        let event = MidiEvent::NoteOn {
            channel,
            note: write.index,
            velocity: if write.on { 127 } else { 0 },
        };
        if let Err(e) = usb_session.send(&event).await {
            debug!("LED write dropped: {}", e);
            return;
        }
    }
}

/// Synchronous startup check so a missing mandatory controller aborts with a
/// clear message instead of silently retrying forever.
fn usb_present(selector: &str) -> Result<bool> {
    let inputs = usb::list_input_ports()?;
    let outputs = usb::list_output_ports()?;
    Ok(inputs.iter().any(|name| usb::matches(name, selector))
        && outputs.iter().any(|name| usb::matches(name, selector)))
}

fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false),
        )
        .init();

    Ok(())
}
