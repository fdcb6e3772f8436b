//! Panel buttons and their latch/door behaviour.
//!
//! Three kinds of button sit on the WMS board:
//!
//! - **Plain** buttons are momentary: press sends the down command, release
//!   sends the up command.
//! - **Latch** buttons (PS1-PS3, cancel, accept) model a latching push
//!   switch. While the board's latch output (pin 14) is high a pressed
//!   button stays down until the latch is released by the firmware.
//! - **Door** toggles open/closed over a full press+release pair. The second
//!   click only takes effect on release, like a contact sensor that reports
//!   once it settles.

use crate::board::Effects;

/// Highest pin number on the GPIOD bank.
pub const MAX_PIN: u8 = 15;

/// How a button reacts to press and release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ButtonStyle {
    /// Momentary.
    Plain,
    /// Held down while the board latch is enabled.
    Latch,
    /// Toggles open and closed.
    Door,
}

/// Static description of a panel button.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonSpec {
    /// Button name, also the overlay name used by renderers.
    pub name: &'static str,
    /// GPIOD input pin wired to the button.
    pub pin: Option<u8>,
    /// Press/release behaviour.
    pub style: ButtonStyle,
    /// Payload sent when the button goes down (empty for none).
    pub down: &'static str,
    /// Payload sent when the button comes up (empty for none).
    pub up: &'static str,
}

/// Every button on the panel.
pub const BUTTONS: [ButtonSpec; 8] = [
    ButtonSpec {
        name: "reset",
        pin: None,
        style: ButtonStyle::Plain,
        down: "reset ",
        up: "",
    },
    ButtonSpec {
        name: "door",
        pin: Some(0),
        style: ButtonStyle::Door,
        down: "D0L0 ",
        up: "D0d0 ",
    },
    ButtonSpec {
        name: "PS1",
        pin: Some(1),
        style: ButtonStyle::Latch,
        down: "D0L1 ",
        up: "D0d1 ",
    },
    ButtonSpec {
        name: "PS2",
        pin: Some(2),
        style: ButtonStyle::Latch,
        down: "D0L2 ",
        up: "D0d2 ",
    },
    ButtonSpec {
        name: "PS3",
        pin: Some(3),
        style: ButtonStyle::Latch,
        down: "D0L3 ",
        up: "D0d3 ",
    },
    ButtonSpec {
        name: "cancel",
        pin: Some(4),
        style: ButtonStyle::Latch,
        down: "D0L4 ",
        up: "D0d4 ",
    },
    ButtonSpec {
        name: "accept",
        pin: Some(5),
        style: ButtonStyle::Latch,
        down: "D0L5 ",
        up: "D0d5 ",
    },
    ButtonSpec {
        name: "motor",
        pin: Some(6),
        style: ButtonStyle::Plain,
        down: "D0L6 ",
        up: "D0d6 ",
    },
];

/// Finds a button by name.
#[must_use]
pub fn find_button(name: &str) -> Option<&'static ButtonSpec> {
    BUTTONS.iter().find(|button| button.name == name)
}

/// Latch/door state for every button, indexed by pin.
#[derive(Debug, Clone, Default)]
pub struct ButtonMachine {
    latch_enabled: bool,
    latched: [bool; MAX_PIN as usize + 1],
}

impl ButtonMachine {
    /// Creates a machine with the latch disabled and nothing latched.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the board latch flag.
    #[must_use]
    pub const fn latch_enabled(&self) -> bool {
        self.latch_enabled
    }

    /// Returns true if the button is latched down (or the door is open).
    #[must_use]
    pub fn is_latched(&self, button: &ButtonSpec) -> bool {
        button
            .pin
            .is_some_and(|pin| self.latched[usize::from(pin)])
    }

    fn set_latched(&mut self, button: &ButtonSpec, latched: bool) {
        if let Some(pin) = button.pin {
            self.latched[usize::from(pin)] = latched;
        }
    }

    /// Handles a press.
    pub fn press(&mut self, button: &ButtonSpec) -> Effects {
        let mut effects = Effects::default();
        match button.style {
            ButtonStyle::Plain => {}
            ButtonStyle::Latch => {
                if self.latch_enabled && self.is_latched(button) {
                    return effects;
                }
                self.set_latched(button, self.latch_enabled);
            }
            ButtonStyle::Door => {
                if self.is_latched(button) {
                    // closing: nothing happens until release
                    self.set_latched(button, false);
                    return effects;
                }
                self.set_latched(button, true);
            }
        }
        tracing::debug!("button {} down", button.name);
        effects.render_button(button, true);
        effects.send(button.down);
        effects
    }

    /// Handles a release.
    pub fn release(&mut self, button: &ButtonSpec) -> Effects {
        let mut effects = Effects::default();
        let held = match button.style {
            ButtonStyle::Plain => false,
            ButtonStyle::Latch => self.latch_enabled && self.is_latched(button),
            ButtonStyle::Door => self.is_latched(button),
        };
        if held {
            return effects;
        }
        tracing::debug!("button {} up", button.name);
        effects.render_button(button, false);
        effects.send(button.up);
        effects
    }

    /// Updates the board latch flag.
    ///
    /// When the latch drops, every latch-style button is released: its
    /// latched flag is cleared, its up command sent and its overlay reset.
    pub fn set_latch_enabled(&mut self, enabled: bool) -> Effects {
        let mut effects = Effects::default();
        let was_enabled = std::mem::replace(&mut self.latch_enabled, enabled);
        if was_enabled && !enabled {
            tracing::debug!("latch released");
            for button in BUTTONS.iter().filter(|b| b.style == ButtonStyle::Latch) {
                self.set_latched(button, false);
                effects.send(button.up);
                effects.render_button(button, false);
            }
        }
        effects
    }
}
