//! Board state.
//!
//! The board model is plain synchronous state owned by the driver loop.
//! Every mutation returns [`Effects`]: panel updates to publish and command
//! payloads to write to the diagnostic port. Keeping I/O out of the model
//! lets resync discard the commands it would otherwise send.

pub mod buttons;
pub mod hardware;
pub mod resync;

pub use buttons::{BUTTONS, ButtonMachine, ButtonSpec, ButtonStyle, MAX_PIN, find_button};
pub use hardware::{Direction, HardwareModel, HardwareSnapshot, MOTOR_FRAMES};
pub use resync::{SyncState, resync};

use crate::event::PanelUpdate;

/// Output of a board state change.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Effects {
    /// Updates for the panel renderer, in order.
    pub updates: Vec<PanelUpdate>,
    /// Command payloads for the diagnostic port, in order.
    pub commands: Vec<&'static str>,
}

impl Effects {
    /// Queues a panel update.
    pub fn render(&mut self, update: PanelUpdate) {
        self.updates.push(update);
    }

    /// Queues a button overlay update.
    pub fn render_button(&mut self, button: &ButtonSpec, pressed: bool) {
        self.render(PanelUpdate::Button {
            name: button.name,
            pressed,
        });
    }

    /// Queues a command; empty payloads are skipped.
    pub fn send(&mut self, command: &'static str) {
        if !command.is_empty() {
            self.commands.push(command);
        }
    }

    /// Appends another set of effects after these.
    pub fn extend(&mut self, other: Self) {
        self.updates.extend(other.updates);
        self.commands.extend(other.commands);
    }

    /// Drops the queued commands, keeping the updates.
    #[must_use]
    pub fn without_commands(mut self) -> Self {
        self.commands.clear();
        self
    }

    /// Returns true if there is nothing to render or send.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.updates.is_empty() && self.commands.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effects_skip_empty_commands() {
        let mut effects = Effects::default();
        effects.send("");
        assert!(effects.is_empty());
        effects.send("D0L1 ");
        effects.render(PanelUpdate::Segment(1));
        let mut more = Effects::default();
        more.send("D0d1 ");
        effects.extend(more);
        assert_eq!(effects.commands, vec!["D0L1 ", "D0d1 "]);

        let quiet = effects.without_commands();
        assert!(quiet.commands.is_empty());
        assert_eq!(quiet.updates, vec![PanelUpdate::Segment(1)]);
    }
}
