//! BLE-MIDI transport: packet codec and btleplug session.

pub mod codec;
pub mod session;

pub use session::BleSession;
