//! Configuration for the bridge.
//!
//! Loaded from a YAML file; every tunable has a default matching the
//! original G-Board + ToneX rig so the bridge runs without a file at all.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;

use crate::leds::{GroupMode, ToggleGroup};

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub usb: UsbConfig,
    #[serde(default)]
    pub ble: BleConfig,
    /// Channel all outbound CC/PC messages are addressed to.
    #[serde(default)]
    pub midi_channel: u8,
    #[serde(default)]
    pub watchdog: WatchdogConfig,
    #[serde(default = "default_buttons")]
    pub buttons: Vec<ButtonConfig>,
    #[serde(default = "default_groups")]
    pub groups: Vec<GroupConfig>,
    /// Radio group mirroring the preset the peripheral reports via
    /// Program Change.
    #[serde(default = "default_preset_group")]
    pub preset_group: GroupRange,
}

/// USB foot controller port selection
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UsbConfig {
    /// Substring matched (case-insensitive) against input and output port
    /// names.
    #[serde(default = "default_usb_port")]
    pub port: String,
    /// Exit with code 1 when the controller is absent at startup instead of
    /// retrying.
    #[serde(default = "default_true")]
    pub required: bool,
}

/// BLE peripheral selection
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BleConfig {
    /// Advertised-name fallback filter for peripherals that do not include
    /// the MIDI service UUID in their advertisement.
    #[serde(default = "default_ble_name")]
    pub name: String,
}

/// Supervision and feedback timing
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WatchdogConfig {
    /// Presence re-check interval.
    #[serde(default = "default_poll_ms")]
    pub poll_ms: u64,
    /// LED blink period while waiting for the BLE link.
    #[serde(default = "default_blink_ms")]
    pub blink_ms: u64,
}

/// A single footswitch outside any toggle group
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ButtonConfig {
    pub index: u8,
    pub action: ButtonAction,
    /// Target controller number.
    pub cc: u8,
    /// Value sent when the switch turns on.
    #[serde(default = "default_on_value")]
    pub on: u8,
    /// Value sent when the switch turns off.
    #[serde(default)]
    pub off: u8,
}

/// What a standalone footswitch does
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ButtonAction {
    /// Latching on/off toggle (compressor style).
    Cc,
    /// Fire once, LED forced back off (tap tempo style).
    Momentary,
}

/// A mutually exclusive effect group (power CC + type CC pair)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GroupConfig {
    pub range: [u8; 2],
    #[serde(default = "default_group_mode")]
    pub mode: GroupModeConfig,
    /// Controller toggling the effect block on/off.
    pub power_cc: u8,
    /// Controller selecting the effect type within the block.
    pub type_cc: u8,
    /// Added to the button index to form the type value (may be negative).
    #[serde(default)]
    pub type_offset: i16,
}

/// A bare index range with radio semantics (preset feedback target)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GroupRange {
    pub range: [u8; 2],
    #[serde(default = "default_preset_mode")]
    pub mode: GroupModeConfig,
}

/// Serde-facing mirror of [`GroupMode`]
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GroupModeConfig {
    PureRadio,
    RadioToggle,
}

impl From<GroupModeConfig> for GroupMode {
    fn from(mode: GroupModeConfig) -> Self {
        match mode {
            GroupModeConfig::PureRadio => GroupMode::PureRadio,
            GroupModeConfig::RadioToggle => GroupMode::RadioToggle,
        }
    }
}

impl GroupConfig {
    pub fn toggle_group(&self) -> ToggleGroup {
        ToggleGroup {
            min: self.range[0],
            max: self.range[1],
            mode: self.mode.into(),
        }
    }
}

impl GroupRange {
    pub fn toggle_group(&self) -> ToggleGroup {
        ToggleGroup {
            min: self.range[0],
            max: self.range[1],
            mode: self.mode.into(),
        }
    }
}

impl AppConfig {
    /// Load configuration from file, falling back to the built-in defaults
    /// when the file does not exist.
    pub async fn load(path: &str) -> Result<Self> {
        let config = if Path::new(path).exists() {
            let contents = fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read config file: {}", path))?;
            serde_yaml::from_str(&contents)
                .with_context(|| format!("Failed to parse YAML config: {}", path))?
        } else {
            tracing::warn!("Config file '{}' not found, using built-in defaults", path);
            Self::default()
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that cannot possibly match a device. These are
    /// the only errors that abort the process.
    pub fn validate(&self) -> Result<()> {
        if self.usb.port.trim().is_empty() {
            bail!("usb.port must not be empty");
        }
        if self.ble.name.trim().is_empty() {
            bail!("ble.name must not be empty");
        }
        if self.midi_channel > 15 {
            bail!("midi_channel must be 0-15, got {}", self.midi_channel);
        }
        for group in &self.groups {
            if group.range[0] > group.range[1] {
                bail!(
                    "group range [{}, {}] is inverted",
                    group.range[0],
                    group.range[1]
                );
            }
        }
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            usb: UsbConfig::default(),
            ble: BleConfig::default(),
            midi_channel: 0,
            watchdog: WatchdogConfig::default(),
            buttons: default_buttons(),
            groups: default_groups(),
            preset_group: default_preset_group(),
        }
    }
}

impl Default for UsbConfig {
    fn default() -> Self {
        Self {
            port: default_usb_port(),
            required: true,
        }
    }
}

impl Default for BleConfig {
    fn default() -> Self {
        Self {
            name: default_ble_name(),
        }
    }
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            poll_ms: default_poll_ms(),
            blink_ms: default_blink_ms(),
        }
    }
}

// Default value functions
fn default_usb_port() -> String {
    "iCON G_Boar".to_string()
}
fn default_ble_name() -> String {
    "ToneX".to_string()
}
fn default_poll_ms() -> u64 {
    2500
}
fn default_blink_ms() -> u64 {
    500
}
fn default_true() -> bool {
    true
}
fn default_on_value() -> u8 {
    127
}
fn default_group_mode() -> GroupModeConfig {
    GroupModeConfig::RadioToggle
}
fn default_preset_mode() -> GroupModeConfig {
    GroupModeConfig::PureRadio
}

/// Switch table of the original rig: tap tempo on 2, compressor on 3.
fn default_buttons() -> Vec<ButtonConfig> {
    vec![
        ButtonConfig {
            index: 2,
            action: ButtonAction::Momentary,
            cc: 10,
            on: 0,
            off: 0,
        },
        ButtonConfig {
            index: 3,
            action: ButtonAction::Cc,
            cc: 18,
            on: 127,
            off: 0,
        },
    ]
}

/// Delay block on switches 0-1, modulation block on 4-7.
fn default_groups() -> Vec<GroupConfig> {
    vec![
        GroupConfig {
            range: [0, 1],
            mode: GroupModeConfig::RadioToggle,
            power_cc: 2,
            type_cc: 3,
            type_offset: 0,
        },
        GroupConfig {
            range: [4, 7],
            mode: GroupModeConfig::RadioToggle,
            power_cc: 32,
            type_cc: 33,
            type_offset: -3,
        },
    ]
}

fn default_preset_group() -> GroupRange {
    GroupRange {
        range: [0, 3],
        mode: GroupModeConfig::PureRadio,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        AppConfig::default().validate().unwrap();
    }

    #[test]
    fn test_parse_minimal_yaml() {
        let yaml = r#"
usb:
  port: "G_Boar"
ble:
  name: "MidiPortA"
"#;
        let config: AppConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.usb.port, "G_Boar");
        assert_eq!(config.ble.name, "MidiPortA");
        assert!(config.usb.required);
        assert_eq!(config.watchdog.poll_ms, 2500);
        assert_eq!(config.groups.len(), 2);
    }

    #[test]
    fn test_parse_full_group() {
        let yaml = r#"
groups:
  - { range: [4, 7], mode: radio_toggle, power_cc: 32, type_cc: 33, type_offset: -3 }
preset_group:
  range: [0, 3]
  mode: pure_radio
"#;
        let config: AppConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.groups.len(), 1);
        let group = config.groups[0].toggle_group();
        assert_eq!((group.min, group.max), (4, 7));
        assert_eq!(group.mode, GroupMode::RadioToggle);
        assert_eq!(config.preset_group.mode, GroupModeConfig::PureRadio);
    }

    #[test]
    fn test_empty_port_rejected() {
        let mut config = AppConfig::default();
        config.usb.port = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_inverted_range_rejected() {
        let mut config = AppConfig::default();
        config.groups[0].range = [5, 2];
        assert!(config.validate().is_err());
    }
}
