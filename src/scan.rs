//! One-shot device inventory for the `--scan` flag. Lists USB MIDI ports,
//! then runs a short BLE advertisement scan and exits.

use anyhow::{Context, Result};
use btleplug::api::{Central, Manager as _, Peripheral as _, ScanFilter};
use btleplug::platform::Manager;
use colored::Colorize;
use std::time::Duration;
use tokio::time::sleep;

use crate::ble::session::MIDI_SERVICE_UUID;
use crate::usb;

const BLE_SCAN_WINDOW: Duration = Duration::from_secs(5);

pub async fn run() -> Result<()> {
    println!("{}", "USB MIDI input ports:".bold());
    print_ports(usb::list_input_ports()?);

    println!("\n{}", "USB MIDI output ports:".bold());
    print_ports(usb::list_output_ports()?);

    println!(
        "\n{} ({}s)...",
        "Scanning for BLE peripherals".bold(),
        BLE_SCAN_WINDOW.as_secs()
    );
    scan_ble().await?;

    Ok(())
}

fn print_ports(names: Vec<String>) {
    if names.is_empty() {
        println!("  {}", "(none)".dimmed());
        return;
    }
    for (i, name) in names.iter().enumerate() {
        println!("  [{}] {}", i, name.cyan());
    }
}

async fn scan_ble() -> Result<()> {
    let manager = Manager::new()
        .await
        .context("Failed to initialize BLE manager")?;
    let adapter = manager
        .adapters()
        .await
        .context("Failed to enumerate BLE adapters")?
        .into_iter()
        .next()
        .context("No BLE adapter found")?;

    // Unfiltered scan so non-MIDI neighbors show up too.
    adapter
        .start_scan(ScanFilter::default())
        .await
        .context("Failed to start BLE scan")?;
    sleep(BLE_SCAN_WINDOW).await;
    adapter.stop_scan().await.ok();

    let peripherals = adapter
        .peripherals()
        .await
        .context("Failed to list scanned peripherals")?;
    if peripherals.is_empty() {
        println!("  {}", "(no advertisements seen)".dimmed());
        return Ok(());
    }

    for peripheral in peripherals {
        let Ok(Some(props)) = peripheral.properties().await else {
            continue;
        };
        let name = props
            .local_name
            .unwrap_or_else(|| "(unnamed)".to_string());
        let rssi = props
            .rssi
            .map(|r| format!("{} dBm", r))
            .unwrap_or_else(|| "?".to_string());
        let midi = props.services.contains(&MIDI_SERVICE_UUID);

        let line = format!("  {}  id={:?}  rssi={}", name.cyan(), peripheral.id(), rssi);
        if midi {
            println!("{}  {}", line, "[MIDI]".green().bold());
        } else {
            println!("{}", line);
        }
    }

    Ok(())
}
