use super::*;
use crate::config::AppConfig;

/// Router over the default rig with both links up.
fn live_router() -> Router {
    let mut router = Router::new(&AppConfig::default());
    router.set_usb_connected(true);
    router.set_ble_connected(true);
    router
}

fn press(router: &mut Router, index: u8) -> RouterOutput {
    router.on_usb_event(&MidiEvent::ProgramChange {
        channel: 0,
        program: index,
    })
}

fn led_of(output: &RouterOutput, index: u8) -> Option<bool> {
    output
        .led_writes
        .iter()
        .rev()
        .find(|w| w.index == index)
        .map(|w| w.on)
}

#[test]
fn test_group_press_sends_power_then_type() {
    let mut router = live_router();

    // Switch 5 lives in the modulation block [4,7]: power CC32, type CC33
    // with offset -3.
    let output = press(&mut router, 5);
    assert_eq!(
        output.to_ble,
        vec![
            MidiEvent::ControlChange {
                channel: 0,
                controller: 32,
                value: 127,
            },
            MidiEvent::ControlChange {
                channel: 0,
                controller: 33,
                value: 2,
            },
        ]
    );
    assert_eq!(led_of(&output, 5), Some(true));
    for sibling in [4, 6, 7] {
        assert_eq!(led_of(&output, sibling), Some(false));
    }
}

#[test]
fn test_group_repress_turns_block_off() {
    let mut router = live_router();
    press(&mut router, 5);

    let output = press(&mut router, 5);
    // Off sends the power controller only, no type reselect.
    assert_eq!(
        output.to_ble,
        vec![MidiEvent::ControlChange {
            channel: 0,
            controller: 32,
            value: 0,
        }]
    );
    assert_eq!(led_of(&output, 5), Some(false));
}

#[test]
fn test_group_switchover_clears_sibling() {
    let mut router = live_router();
    press(&mut router, 4);

    let output = press(&mut router, 7);
    assert_eq!(led_of(&output, 4), Some(false));
    assert_eq!(led_of(&output, 7), Some(true));
    // Type value is index + offset: 7 - 3 = 4.
    assert_eq!(
        output.to_ble[1],
        MidiEvent::ControlChange {
            channel: 0,
            controller: 33,
            value: 4,
        }
    );
}

#[test]
fn test_delay_group_has_zero_offset() {
    let mut router = live_router();
    let output = press(&mut router, 1);
    assert_eq!(
        output.to_ble,
        vec![
            MidiEvent::ControlChange {
                channel: 0,
                controller: 2,
                value: 127,
            },
            MidiEvent::ControlChange {
                channel: 0,
                controller: 3,
                value: 1,
            },
        ]
    );
}

#[test]
fn test_latching_switch_toggles_cc() {
    let mut router = live_router();

    // Compressor on switch 3: CC18, 127 then 0.
    let output = press(&mut router, 3);
    assert_eq!(
        output.to_ble,
        vec![MidiEvent::ControlChange {
            channel: 0,
            controller: 18,
            value: 127,
        }]
    );
    assert_eq!(led_of(&output, 3), Some(true));

    let output = press(&mut router, 3);
    assert_eq!(
        output.to_ble,
        vec![MidiEvent::ControlChange {
            channel: 0,
            controller: 18,
            value: 0,
        }]
    );
    assert_eq!(led_of(&output, 3), Some(false));
}

#[test]
fn test_momentary_switch_fires_and_stays_dark() {
    let mut router = live_router();

    for _ in 0..2 {
        let output = press(&mut router, 2);
        assert_eq!(
            output.to_ble,
            vec![MidiEvent::ControlChange {
                channel: 0,
                controller: 10,
                value: 0,
            }]
        );
        assert_eq!(led_of(&output, 2), Some(false));
    }
}

#[test]
fn test_press_dropped_while_ble_down() {
    let mut router = live_router();
    router.set_ble_connected(false);

    let output = press(&mut router, 5);
    assert!(output.to_ble.is_empty());
    assert!(output.led_writes.is_empty());
}

#[test]
fn test_preset_feedback_moves_leds_only() {
    let mut router = live_router();

    let output = router.on_ble_event(&MidiEvent::ProgramChange {
        channel: 0,
        program: 1,
    });
    assert!(output.to_ble.is_empty(), "preset feedback must not echo");
    assert_eq!(led_of(&output, 1), Some(true));
    for other in [0, 2, 3] {
        assert_eq!(led_of(&output, other), Some(false));
    }
}

#[test]
fn test_preset_feedback_is_pure_radio() {
    let mut router = live_router();
    let feedback = MidiEvent::ProgramChange {
        channel: 0,
        program: 2,
    };

    router.on_ble_event(&feedback);
    let output = router.on_ble_event(&feedback);
    // Repeats keep the LED lit rather than toggling it off.
    assert_eq!(led_of(&output, 2), Some(true));
}

#[test]
fn test_bank_select_chatter_is_ignored() {
    let mut router = live_router();

    for controller in [0, 32] {
        let output = router.on_ble_event(&MidiEvent::ControlChange {
            channel: 0,
            controller,
            value: 64,
        });
        assert_eq!(output, RouterOutput::default());
    }
}

#[test]
fn test_out_of_range_preset_is_ignored() {
    let mut router = live_router();
    let output = router.on_ble_event(&MidiEvent::ProgramChange {
        channel: 0,
        program: 9,
    });
    assert!(output.led_writes.is_empty());
}

#[test]
fn test_unbound_switch_does_nothing() {
    let mut router = live_router();
    // Default rig binds 0-7; index 8 would be off the panel.
    let output = press(&mut router, 8);
    assert_eq!(output, RouterOutput::default());
}

#[test]
fn test_waiting_blink_runs_from_startup() {
    // No connect/lose cycle yet: the panel must already be waiting.
    let mut router = Router::new(&AppConfig::default());
    router.set_usb_connected(true);
    assert!(router.is_blinking());

    let frame = router.blink_frame(true);
    assert_eq!(frame.len(), crate::leds::NUM_BUTTONS);
    assert!(frame.iter().all(|w| w.on));

    // First BLE connect stops the blink and leaves a dark panel.
    let restored = router.set_ble_connected(true);
    assert!(!router.is_blinking());
    assert!(restored.iter().all(|w| !w.on));
}

#[test]
fn test_ble_loss_blinks_and_reconnect_restores() {
    let mut router = live_router();
    press(&mut router, 5);
    press(&mut router, 3);

    router.set_ble_connected(false);
    assert!(router.is_blinking());
    let frame = router.blink_frame(true);
    assert_eq!(frame.len(), crate::leds::NUM_BUTTONS);
    assert!(frame.iter().all(|w| w.on));

    let restored = router.set_ble_connected(true);
    assert!(!router.is_blinking());
    let lit: Vec<u8> = restored
        .iter()
        .filter(|w| w.on)
        .map(|w| w.index)
        .collect();
    assert_eq!(lit, vec![3, 5]);
}

#[test]
fn test_fresh_usb_connect_resets_panel() {
    let mut router = live_router();
    press(&mut router, 5);
    router.set_ble_connected(false);

    // Controller replaced while blinking: old snapshot must not come back.
    let writes = router.set_usb_connected(true);
    assert!(writes.iter().all(|w| !w.on));
    let restored = router.set_ble_connected(true);
    assert!(restored.iter().all(|w| !w.on));
}

#[test]
fn test_note_from_controller_is_ignored() {
    let mut router = live_router();
    let output = router.on_usb_event(&MidiEvent::NoteOn {
        channel: 0,
        note: 5,
        velocity: 100,
    });
    assert_eq!(output, RouterOutput::default());
}
