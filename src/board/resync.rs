//! Reconciling the panel with the device after (re)connecting.
//!
//! QEMU keeps running while the panel is disconnected, so on connect the
//! panel's idea of the outputs and the latched buttons can be stale. The
//! first IDR value read on a connection is replayed into the model: output
//! pins 8-14 are applied as if they had just gone high, and every button
//! whose input pin reads high gets a press and release with the commands
//! thrown away, which leaves its latch state matching the device.

use crate::board::{BUTTONS, Effects, HardwareModel};

/// Output pins replayed from IDR.
const OUTPUT_PINS: std::ops::RangeInclusive<u8> = 8..=14;

/// Per-connection resync state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncState {
    /// Waiting for the first IDR read of this connection.
    #[default]
    AwaitingResync,
    /// Resync done; IDR reads only update the display.
    Synced,
}

impl SyncState {
    /// Handles an IDR value, resyncing the model the first time only.
    pub fn on_idr(&mut self, model: &mut HardwareModel, idr: u16) -> Effects {
        match self {
            Self::AwaitingResync => {
                *self = Self::Synced;
                resync(model, idr)
            }
            Self::Synced => Effects::default(),
        }
    }
}

/// Replays the IDR bits into the model.
///
/// Button commands are suppressed: the device already has those inputs set.
pub fn resync(model: &mut HardwareModel, idr: u16) -> Effects {
    tracing::debug!("resyncing panel from idr {:04X}", idr);
    let mut effects = Effects::default();

    for pin in OUTPUT_PINS {
        if (idr >> pin) & 1 != 0 {
            effects.extend(model.apply_pin(pin, true));
        }
    }

    for button in &BUTTONS {
        let Some(pin) = button.pin else { continue };
        if (idr >> pin) & 1 != 0 {
            effects.extend(model.press(button).without_commands());
            effects.extend(model.release(button).without_commands());
        }
    }

    effects
}
