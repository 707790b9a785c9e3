//! BLE-MIDI packet codec.
//!
//! BLE-MIDI frames MIDI data inside GATT notification payloads: one header
//! byte, a timestamp-high byte, then status+data groups that may use running
//! status and carry interleaved timestamp-low bytes. Timestamp bytes share
//! the high-bit pattern with status bytes, so a decoder that trusts the high
//! bit alone misparses streams systematically. This decoder only consumes a
//! status candidate when every data byte it needs is present and passes the
//! 7-bit data-byte test; anything else is skipped as a timestamp.
//!
//! Pure functions, no I/O, no state.

use crate::midi::MidiEvent;
use thiserror::Error;

/// Packet header byte sent on every outbound write.
const HEADER: u8 = 0x80;
/// Opaque "now" timestamp byte used on send.
const TIMESTAMP: u8 = 0x80;

/// Encoding rejects out-of-range fields instead of silently masking them.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("{field} {value} out of range (max {max})")]
    InvalidRange {
        field: &'static str,
        value: u8,
        max: u8,
    },
}

fn is_data_byte(b: u8) -> bool {
    b & 0x80 == 0
}

/// Decode a BLE-MIDI notification payload into zero or more events.
///
/// Buffers shorter than 3 bytes carry no message and yield nothing. The scan
/// starts at index 2, past the header and the first timestamp byte. A status
/// candidate that cannot be completed from valid data bytes is skipped
/// without consuming the bytes after it, so a stray timestamp immediately
/// followed by the real status byte decodes correctly.
pub fn decode(buffer: &[u8]) -> Vec<MidiEvent> {
    let mut events = Vec::new();
    if buffer.len() < 3 {
        return events;
    }

    let mut i = 2;
    while i < buffer.len() {
        let status = buffer[i];
        if is_data_byte(status) {
            i += 1;
            continue;
        }

        let message_type = status & 0xF0;
        let channel = status & 0x0F;

        // Program Change, one data byte.
        if message_type == 0xC0 && i + 1 < buffer.len() && is_data_byte(buffer[i + 1]) {
            events.push(MidiEvent::ProgramChange {
                channel,
                program: buffer[i + 1],
            });
            i += 2;
            continue;
        }

        // The two-data-byte families below share the same completeness test.
        let has_two_data = i + 2 < buffer.len()
            && is_data_byte(buffer[i + 1])
            && is_data_byte(buffer[i + 2]);

        if message_type == 0xB0 && has_two_data {
            events.push(MidiEvent::ControlChange {
                channel,
                controller: buffer[i + 1],
                value: buffer[i + 2],
            });
            i += 3;
            continue;
        }

        if message_type == 0x90 && has_two_data {
            let note = buffer[i + 1];
            let velocity = buffer[i + 2];
            if velocity > 0 {
                events.push(MidiEvent::NoteOn {
                    channel,
                    note,
                    velocity,
                });
            } else {
                events.push(MidiEvent::NoteOff { channel, note });
            }
            i += 3;
            continue;
        }

        if message_type == 0x80 && has_two_data {
            events.push(MidiEvent::NoteOff {
                channel,
                note: buffer[i + 1],
            });
            i += 3;
            continue;
        }

        // Timestamp or spurious status byte: skip it, the next byte may be
        // the real status.
        i += 1;
    }

    events
}

/// Encode a single event into a self-contained write packet.
///
/// No running status on the outbound side: every packet is header,
/// timestamp, then one full status+data group.
pub fn encode(event: &MidiEvent) -> Result<Vec<u8>, CodecError> {
    let body = match *event {
        MidiEvent::ControlChange {
            channel,
            controller,
            value,
        } => {
            check("channel", channel, 15)?;
            check("controller", controller, 127)?;
            check("value", value, 127)?;
            vec![0xB0 | channel, controller, value]
        }
        MidiEvent::ProgramChange { channel, program } => {
            check("channel", channel, 15)?;
            check("program", program, 127)?;
            vec![0xC0 | channel, program]
        }
        MidiEvent::NoteOn {
            channel,
            note,
            velocity,
        } => {
            check("channel", channel, 15)?;
            check("note", note, 127)?;
            check("velocity", velocity, 127)?;
            vec![0x90 | channel, note, velocity]
        }
        MidiEvent::NoteOff { channel, note } => {
            check("channel", channel, 15)?;
            check("note", note, 127)?;
            vec![0x80 | channel, note, 0]
        }
    };

    let mut packet = Vec::with_capacity(2 + body.len());
    packet.push(HEADER);
    packet.push(TIMESTAMP);
    packet.extend_from_slice(&body);
    Ok(packet)
}

fn check(field: &'static str, value: u8, max: u8) -> Result<(), CodecError> {
    if value > max {
        return Err(CodecError::InvalidRange { field, value, max });
    }
    Ok(())
}
