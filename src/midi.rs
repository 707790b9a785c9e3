//! MIDI event type and raw (serial) MIDI parsing/encoding.
//!
//! The bridge only routes the channel messages the foot controller and the
//! effects unit actually exchange: notes (LED feedback), control changes and
//! program changes. Everything else is logged and dropped at parse time.

use std::fmt;

/// A single routed MIDI event.
///
/// All data fields are 7-bit (0-127); `channel` is 0-15.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MidiEvent {
    /// Note On. Velocity 0 parses as `NoteOff`; encoding velocity 0 is
    /// valid and is how LED-off writes go out.
    NoteOn { channel: u8, note: u8, velocity: u8 },

    /// Note Off (also produced for Note On with velocity 0).
    NoteOff { channel: u8, note: u8 },

    /// Control Change.
    ControlChange { channel: u8, controller: u8, value: u8 },

    /// Program Change. The G-Board reports footswitch presses as these.
    ProgramChange { channel: u8, program: u8 },
}

impl MidiEvent {
    /// Parse a raw serial MIDI message as delivered by a midir callback.
    ///
    /// Returns `None` for truncated buffers, running-status fragments and
    /// message families the bridge does not route.
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.is_empty() {
            return None;
        }

        let status = data[0];
        if status < 0x80 || status >= 0xF0 {
            // Running-status data fragment or system message.
            return None;
        }

        let channel = status & 0x0F;
        match status & 0xF0 {
            0x80 => {
                if data.len() < 3 {
                    return None;
                }
                Some(MidiEvent::NoteOff {
                    channel,
                    note: data[1] & 0x7F,
                })
            }
            0x90 => {
                if data.len() < 3 {
                    return None;
                }
                let note = data[1] & 0x7F;
                let velocity = data[2] & 0x7F;
                if velocity == 0 {
                    Some(MidiEvent::NoteOff { channel, note })
                } else {
                    Some(MidiEvent::NoteOn {
                        channel,
                        note,
                        velocity,
                    })
                }
            }
            0xB0 => {
                if data.len() < 3 {
                    return None;
                }
                Some(MidiEvent::ControlChange {
                    channel,
                    controller: data[1] & 0x7F,
                    value: data[2] & 0x7F,
                })
            }
            0xC0 => {
                if data.len() < 2 {
                    return None;
                }
                Some(MidiEvent::ProgramChange {
                    channel,
                    program: data[1] & 0x7F,
                })
            }
            _ => None,
        }
    }

    /// Encode the event as raw serial MIDI bytes (USB side).
    pub fn to_bytes(&self) -> Vec<u8> {
        match *self {
            MidiEvent::NoteOn {
                channel,
                note,
                velocity,
            } => vec![0x90 | (channel & 0x0F), note & 0x7F, velocity & 0x7F],
            MidiEvent::NoteOff { channel, note } => {
                vec![0x80 | (channel & 0x0F), note & 0x7F, 0]
            }
            MidiEvent::ControlChange {
                channel,
                controller,
                value,
            } => vec![0xB0 | (channel & 0x0F), controller & 0x7F, value & 0x7F],
            MidiEvent::ProgramChange { channel, program } => {
                vec![0xC0 | (channel & 0x0F), program & 0x7F]
            }
        }
    }

    /// The channel the event is addressed to (0-15).
    pub fn channel(&self) -> u8 {
        match *self {
            MidiEvent::NoteOn { channel, .. }
            | MidiEvent::NoteOff { channel, .. }
            | MidiEvent::ControlChange { channel, .. }
            | MidiEvent::ProgramChange { channel, .. } => channel,
        }
    }
}

impl fmt::Display for MidiEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            MidiEvent::NoteOn {
                channel,
                note,
                velocity,
            } => write!(f, "NoteOn ch:{} n:{} v:{}", channel + 1, note, velocity),
            MidiEvent::NoteOff { channel, note } => {
                write!(f, "NoteOff ch:{} n:{}", channel + 1, note)
            }
            MidiEvent::ControlChange {
                channel,
                controller,
                value,
            } => write!(f, "CC ch:{} cc:{} v:{}", channel + 1, controller, value),
            MidiEvent::ProgramChange { channel, program } => {
                write!(f, "ProgramChange ch:{} p:{}", channel + 1, program)
            }
        }
    }
}

/// Format MIDI bytes as hex string for debugging
pub fn format_hex(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_program_change_parsing() {
        // The G-Board reports footswitch 5 as a Program Change.
        let data = vec![0xC0, 5];
        let msg = MidiEvent::parse(&data).unwrap();

        assert_eq!(
            msg,
            MidiEvent::ProgramChange {
                channel: 0,
                program: 5,
            }
        );
    }

    #[test]
    fn test_note_on_velocity_zero_is_note_off() {
        let data = vec![0x90, 3, 0];
        let msg = MidiEvent::parse(&data).unwrap();

        assert_eq!(msg, MidiEvent::NoteOff { channel: 0, note: 3 });
    }

    #[test]
    fn test_control_change() {
        let data = vec![0xB2, 18, 127];
        let msg = MidiEvent::parse(&data).unwrap();

        assert_eq!(
            msg,
            MidiEvent::ControlChange {
                channel: 2,
                controller: 18,
                value: 127,
            }
        );
    }

    #[test]
    fn test_system_messages_dropped() {
        assert_eq!(MidiEvent::parse(&[0xF8]), None);
        assert_eq!(MidiEvent::parse(&[0xFE]), None);
        assert_eq!(MidiEvent::parse(&[0xF0, 0x01, 0xF7]), None);
    }

    #[test]
    fn test_truncated_buffers() {
        assert_eq!(MidiEvent::parse(&[]), None);
        assert_eq!(MidiEvent::parse(&[0x90]), None);
        assert_eq!(MidiEvent::parse(&[0x90, 60]), None);
        assert_eq!(MidiEvent::parse(&[0xC0]), None);
    }

    #[test]
    fn test_encode_led_write() {
        let msg = MidiEvent::NoteOn {
            channel: 0,
            note: 5,
            velocity: 127,
        };
        assert_eq!(msg.to_bytes(), vec![0x90, 5, 127]);

        let msg = MidiEvent::NoteOff { channel: 0, note: 5 };
        assert_eq!(msg.to_bytes(), vec![0x80, 5, 0]);
    }

    #[test]
    fn test_led_off_keeps_note_on_status() {
        // The controller expects its LED-off as Note On with velocity 0,
        // not a Note Off status byte.
        let msg = MidiEvent::NoteOn {
            channel: 0,
            note: 5,
            velocity: 0,
        };
        assert_eq!(msg.to_bytes(), vec![0x90, 5, 0]);
        assert_eq!(
            MidiEvent::parse(&msg.to_bytes()),
            Some(MidiEvent::NoteOff { channel: 0, note: 5 })
        );
    }

    #[test]
    fn test_raw_roundtrip() {
        let events = [
            MidiEvent::NoteOn {
                channel: 3,
                note: 60,
                velocity: 100,
            },
            MidiEvent::ControlChange {
                channel: 0,
                controller: 32,
                value: 127,
            },
            MidiEvent::ProgramChange {
                channel: 15,
                program: 7,
            },
        ];
        for event in events {
            assert_eq!(MidiEvent::parse(&event.to_bytes()), Some(event));
        }
    }
}
