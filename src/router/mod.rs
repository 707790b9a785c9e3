//! Bidirectional event routing between the foot controller and the
//! BLE peripheral.
//!
//! The router owns the LED model and is the only code that mutates it. All
//! methods are synchronous and return the writes to perform, so the whole
//! bridge logic is testable without any hardware attached.

use tracing::{debug, trace, warn};

use crate::config::{AppConfig, ButtonAction, ButtonConfig, GroupConfig};
use crate::leds::{LedModel, LedWrite, ToggleGroup};
use crate::midi::MidiEvent;

#[cfg(test)]
mod tests;

/// Controllers the peripheral uses for bank-select chatter. Inbound CC on
/// these numbers carries no pedal state and is dropped without logging.
const RESERVED_CONTROLLERS: [u8; 2] = [0, 32];

/// What one routing step wants performed on the outside world.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct RouterOutput {
    /// Events to forward to the BLE peripheral, in order.
    pub to_ble: Vec<MidiEvent>,
    /// LED updates for the foot controller, in order.
    pub led_writes: Vec<LedWrite>,
}

impl RouterOutput {
    fn none() -> Self {
        Self::default()
    }
}

pub struct Router {
    channel: u8,
    buttons: Vec<ButtonConfig>,
    groups: Vec<GroupConfig>,
    preset_group: ToggleGroup,
    leds: LedModel,
    usb_connected: bool,
    ble_connected: bool,
}

impl Router {
    pub fn new(config: &AppConfig) -> Self {
        // BLE starts disconnected: the panel blinks from the first tick
        // instead of staying dark until a connect/lose cycle.
        let mut leds = LedModel::new();
        leds.enter_blink();

        Self {
            channel: config.midi_channel,
            buttons: config.buttons.clone(),
            groups: config.groups.clone(),
            preset_group: config.preset_group.toggle_group(),
            leds,
            usb_connected: false,
            ble_connected: false,
        }
    }

    pub fn is_blinking(&self) -> bool {
        self.leds.is_blinking()
    }

    pub fn usb_connected(&self) -> bool {
        self.usb_connected
    }

    pub fn ble_connected(&self) -> bool {
        self.ble_connected
    }

    /// One frame of the waiting-for-BLE blink animation.
    pub fn blink_frame(&mut self, phase: bool) -> Vec<LedWrite> {
        self.leds.blink_frame(phase)
    }

    /// The controller came up or went away. A fresh attachment starts from a
    /// known all-off panel, discarding any snapshot from the previous one.
    pub fn set_usb_connected(&mut self, up: bool) -> Vec<LedWrite> {
        self.usb_connected = up;
        if up {
            self.leds.reset()
        } else {
            Vec::new()
        }
    }

    /// The peripheral came up or went away. Going down starts the blink
    /// animation (snapshotting the panel first); coming back stops it and
    /// restores the snapshot.
    pub fn set_ble_connected(&mut self, up: bool) -> Vec<LedWrite> {
        self.ble_connected = up;
        if up {
            self.leds.leave_blink()
        } else {
            self.leds.enter_blink();
            Vec::new()
        }
    }

    /// A message from the foot controller. The G-Board reports each switch
    /// press as a Program Change carrying the switch index.
    pub fn on_usb_event(&mut self, event: &MidiEvent) -> RouterOutput {
        let index = match event {
            MidiEvent::ProgramChange { program, .. } => *program,
            other => {
                trace!("Ignoring non-press controller message: {}", other);
                return RouterOutput::none();
            }
        };

        if !self.ble_connected {
            warn!("Dropping press of switch {}: BLE link is down", index);
            return RouterOutput::none();
        }

        if let Some(pos) = self.groups.iter().position(|g| g.toggle_group().contains(index)) {
            return self.press_group_switch(index, pos);
        }
        if let Some(pos) = self.buttons.iter().position(|b| b.index == index) {
            return self.press_standalone_switch(pos);
        }

        debug!("Switch {} has no binding", index);
        RouterOutput::none()
    }

    /// A message from the BLE peripheral. Only preset feedback (Program
    /// Change) moves LEDs; nothing is ever echoed back over BLE.
    pub fn on_ble_event(&mut self, event: &MidiEvent) -> RouterOutput {
        match event {
            MidiEvent::ControlChange { controller, .. }
                if RESERVED_CONTROLLERS.contains(controller) =>
            {
                RouterOutput::none()
            }
            MidiEvent::ProgramChange { program, .. } => {
                let index = self.preset_group.min.saturating_add(*program);
                if !self.preset_group.contains(index) {
                    debug!("Preset {} is outside the feedback group", program);
                    return RouterOutput::none();
                }
                debug!("Peripheral reports preset {}, syncing LEDs", program);
                let group = self.preset_group;
                let (_, led_writes) = self.leds.apply_toggle_group(index, true, &group);
                RouterOutput {
                    to_ble: Vec::new(),
                    led_writes,
                }
            }
            other => {
                trace!("Ignoring peripheral message: {}", other);
                RouterOutput::none()
            }
        }
    }

    /// Effect-block switch: toggle within its group, then drive the block's
    /// power controller and, when turning on, its type controller.
    fn press_group_switch(&mut self, index: u8, pos: usize) -> RouterOutput {
        let group = &self.groups[pos];
        let power_cc = group.power_cc;
        let type_cc = group.type_cc;
        let type_value = (index as i16 + group.type_offset).clamp(0, 127) as u8;
        let toggle = group.toggle_group();

        let requested = !self.leds.get(index);
        let (applied, led_writes) = self.leds.apply_toggle_group(index, requested, &toggle);

        let mut to_ble = vec![MidiEvent::ControlChange {
            channel: self.channel,
            controller: power_cc,
            value: if applied { 127 } else { 0 },
        }];
        if applied {
            to_ble.push(MidiEvent::ControlChange {
                channel: self.channel,
                controller: type_cc,
                value: type_value,
            });
        }

        RouterOutput { to_ble, led_writes }
    }

    fn press_standalone_switch(&mut self, pos: usize) -> RouterOutput {
        let button = &self.buttons[pos];
        let index = button.index;

        match button.action {
            ButtonAction::Cc => {
                let on = !self.leds.get(index);
                let value = if on { button.on } else { button.off };
                let led_writes = self.leds.set(index, on).into_iter().collect();
                RouterOutput {
                    to_ble: vec![MidiEvent::ControlChange {
                        channel: self.channel,
                        controller: button.cc,
                        value,
                    }],
                    led_writes,
                }
            }
            // Fire once, panel light stays dark. The controller lights the
            // switch on its own when pressed, so the off write is real work.
            ButtonAction::Momentary => {
                let value = button.on;
                let led_writes = self.leds.set(index, false).into_iter().collect();
                RouterOutput {
                    to_ble: vec![MidiEvent::ControlChange {
                        channel: self.channel,
                        controller: button.cc,
                        value,
                    }],
                    led_writes,
                }
            }
        }
    }
}
