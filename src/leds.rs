//! In-memory LED and toggle-group model for the foot controller.
//!
//! Pure state: callers receive the list of physical LED writes to perform
//! and push them to the USB session themselves. The model also owns the
//! snapshot used for blink feedback, with the invariant that a snapshot is
//! always a prior real state and never a blink frame.

use tracing::debug;

/// Number of footswitches/LEDs on the controller.
pub const NUM_BUTTONS: usize = 8;

/// LED map, one flag per footswitch.
pub type ButtonState = [bool; NUM_BUTTONS];

/// A single physical LED write to replay on the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedWrite {
    pub index: u8,
    pub on: bool,
}

/// Mutual-exclusion semantics of a button range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupMode {
    /// Activating an index always forces it true; re-pressing never turns
    /// it off.
    PureRadio,
    /// Re-pressing the active index turns it off.
    RadioToggle,
}

/// A closed index range with radio semantics. Static configuration, not a
/// dynamically created entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToggleGroup {
    pub min: u8,
    pub max: u8,
    pub mode: GroupMode,
}

impl ToggleGroup {
    pub fn contains(&self, index: u8) -> bool {
        index >= self.min && index <= self.max
    }
}

/// LED state plus the blink-mode backup snapshot.
#[derive(Debug)]
pub struct LedModel {
    leds: ButtonState,
    backup: ButtonState,
    blinking: bool,
}

impl Default for LedModel {
    fn default() -> Self {
        Self::new()
    }
}

impl LedModel {
    /// All LEDs off, not blinking.
    pub fn new() -> Self {
        Self {
            leds: [false; NUM_BUTTONS],
            backup: [false; NUM_BUTTONS],
            blinking: false,
        }
    }

    pub fn get(&self, index: u8) -> bool {
        self.leds
            .get(index as usize)
            .copied()
            .unwrap_or(false)
    }

    pub fn set(&mut self, index: u8, on: bool) -> Option<LedWrite> {
        let slot = self.leds.get_mut(index as usize)?;
        *slot = on;
        Some(LedWrite { index, on })
    }

    /// Set every LED to `on` and return the writes to replay.
    pub fn all_leds(&mut self, on: bool) -> Vec<LedWrite> {
        self.leds = [on; NUM_BUTTONS];
        (0..NUM_BUTTONS as u8).map(|index| LedWrite { index, on }).collect()
    }

    /// Current state, refused while blinking so a blink frame can never be
    /// mistaken for the real state.
    pub fn snapshot(&self) -> Option<ButtonState> {
        if self.blinking {
            return None;
        }
        Some(self.leds)
    }

    /// Replay every index of `state` unconditionally.
    pub fn restore(&mut self, state: ButtonState) -> Vec<LedWrite> {
        self.leds = state;
        self.leds
            .iter()
            .enumerate()
            .map(|(index, &on)| LedWrite {
                index: index as u8,
                on,
            })
            .collect()
    }

    pub fn is_blinking(&self) -> bool {
        self.blinking
    }

    /// Enter blink mode, snapshotting the real state first. Returns false
    /// when already blinking (the snapshot stays untouched).
    pub fn enter_blink(&mut self) -> bool {
        let Some(state) = self.snapshot() else {
            return false;
        };
        self.backup = state;
        self.blinking = true;
        debug!("blink mode entered, state snapshotted");
        true
    }

    /// One blink frame: all LEDs to `phase`. Only valid while blinking.
    pub fn blink_frame(&mut self, phase: bool) -> Vec<LedWrite> {
        if !self.blinking {
            return Vec::new();
        }
        self.leds = [phase; NUM_BUTTONS];
        (0..NUM_BUTTONS as u8)
            .map(|index| LedWrite { index, on: phase })
            .collect()
    }

    /// Leave blink mode and restore the snapshot taken on entry.
    pub fn leave_blink(&mut self) -> Vec<LedWrite> {
        if !self.blinking {
            return Vec::new();
        }
        self.blinking = false;
        debug!("blink mode left, snapshot restored");
        self.restore(self.backup)
    }

    /// Reset both the live state and the pending snapshot to all-off. Used
    /// when the physical controller reports a fresh connection, so a stale
    /// snapshot from a previous attachment is never replayed onto it.
    pub fn reset(&mut self) -> Vec<LedWrite> {
        self.backup = [false; NUM_BUTTONS];
        let was_blinking = self.blinking;
        self.blinking = false;
        let writes = self.all_leds(false);
        self.blinking = was_blinking;
        writes
    }

    /// Apply a toggle group press: clear every other index in the range,
    /// then set the target to the requested value (pure-radio groups force
    /// true). Returns the applied value and the ordered LED writes.
    pub fn apply_toggle_group(
        &mut self,
        index: u8,
        requested: bool,
        group: &ToggleGroup,
    ) -> (bool, Vec<LedWrite>) {
        if !group.contains(index) {
            return (self.get(index), Vec::new());
        }

        let applied = match group.mode {
            GroupMode::PureRadio => true,
            GroupMode::RadioToggle => requested,
        };

        let mut writes = Vec::new();
        for i in group.min..=group.max {
            if i != index {
                if let Some(write) = self.set(i, false) {
                    writes.push(write);
                }
            }
        }
        if let Some(write) = self.set(index, applied) {
            writes.push(write);
        }

        (applied, writes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MOD_GROUP: ToggleGroup = ToggleGroup {
        min: 4,
        max: 7,
        mode: GroupMode::RadioToggle,
    };

    const PRESET_GROUP: ToggleGroup = ToggleGroup {
        min: 0,
        max: 3,
        mode: GroupMode::PureRadio,
    };

    #[test]
    fn test_radio_toggle_double_press_turns_off() {
        let mut model = LedModel::new();

        let (applied, _) = model.apply_toggle_group(5, true, &MOD_GROUP);
        assert!(applied);
        assert!(model.get(5));

        // Second press requests off (caller toggles), group lets it through.
        let (applied, _) = model.apply_toggle_group(5, false, &MOD_GROUP);
        assert!(!applied);
        for i in 0..NUM_BUTTONS as u8 {
            assert!(!model.get(i), "led {} should be off", i);
        }
    }

    #[test]
    fn test_radio_toggle_clears_siblings() {
        let mut model = LedModel::new();
        model.apply_toggle_group(4, true, &MOD_GROUP);
        let (_, writes) = model.apply_toggle_group(6, true, &MOD_GROUP);

        assert!(model.get(6));
        assert!(!model.get(4));
        // Siblings cleared before the target is set.
        assert_eq!(*writes.last().unwrap(), LedWrite { index: 6, on: true });
    }

    #[test]
    fn test_pure_radio_never_turns_off() {
        let mut model = LedModel::new();

        for requested in [true, false, false] {
            let (applied, _) = model.apply_toggle_group(2, requested, &PRESET_GROUP);
            assert!(applied);
            assert!(model.get(2));
        }
        assert!(!model.get(0));
        assert!(!model.get(1));
        assert!(!model.get(3));
    }

    #[test]
    fn test_outside_range_is_untouched() {
        let mut model = LedModel::new();
        model.set(3, true);
        let (_, writes) = model.apply_toggle_group(3, true, &MOD_GROUP);
        assert!(writes.is_empty());
        assert!(model.get(3));
    }

    #[test]
    fn test_snapshot_restore_roundtrip() {
        let mut model = LedModel::new();
        model.set(1, true);
        model.set(5, true);

        let snapshot = model.snapshot().unwrap();
        model.all_leds(false);

        let writes = model.restore(snapshot);
        assert_eq!(writes.len(), NUM_BUTTONS);
        assert!(model.get(1));
        assert!(model.get(5));
        assert!(!model.get(0));
        // Every index is replayed unconditionally.
        assert!(writes.contains(&LedWrite { index: 0, on: false }));
        assert!(writes.contains(&LedWrite { index: 5, on: true }));
    }

    #[test]
    fn test_snapshot_refused_while_blinking() {
        let mut model = LedModel::new();
        model.set(2, true);
        assert!(model.enter_blink());

        assert_eq!(model.snapshot(), None);
        // Re-entering must not overwrite the snapshot with a blink frame.
        model.blink_frame(true);
        assert!(!model.enter_blink());

        let writes = model.leave_blink();
        assert!(model.get(2));
        assert!(writes.contains(&LedWrite { index: 2, on: true }));
    }

    #[test]
    fn test_blink_frames_do_not_leak_into_state() {
        let mut model = LedModel::new();
        model.set(7, true);
        model.enter_blink();

        model.blink_frame(true);
        model.blink_frame(false);
        model.blink_frame(true);

        model.leave_blink();
        assert!(model.get(7));
        assert!(!model.get(0));
        assert!(!model.is_blinking());
    }

    #[test]
    fn test_reset_clears_pending_snapshot() {
        let mut model = LedModel::new();
        model.set(4, true);
        model.enter_blink();

        // Controller re-attached mid-blink: stale snapshot must not come back.
        model.reset();
        let writes = model.leave_blink();
        for write in writes {
            assert!(!write.on);
        }
    }
}
