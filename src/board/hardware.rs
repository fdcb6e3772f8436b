//! Output side of the board: LEDs, seven segment display, motor and latch.
//!
//! GPIOD output pins drive the board:
//!
//! ```text
//! pin 8-11   LED A-D, also the 4-bit seven segment value
//! pin 12     motor on
//! pin 13     motor direction (low = clockwise)
//! pin 14     button latch enable
//! ```

use crate::board::{ButtonMachine, ButtonSpec, Effects};
use crate::event::{Event, PanelUpdate, Spinner};
use crate::protocol::{GPIOD_ENABLE_BIT, USART3_ENABLE_BIT};

/// Number of motor sprite frames.
pub const MOTOR_FRAMES: usize = 3;

const SEGMENT_PINS: std::ops::RangeInclusive<u8> = 8..=11;
const MOTOR_PIN: u8 = 12;
const DIRECTION_PIN: u8 = 13;
const LATCH_PIN: u8 = 14;

/// Motor direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    /// Motor off.
    #[default]
    Stop,
    /// Clockwise.
    Clockwise,
    /// Anticlockwise.
    Anticlockwise,
}

/// Point-in-time copy of the board state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HardwareSnapshot {
    /// Seven segment value (LEDs on pins 8-11).
    pub segment_bits: u8,
    /// Motor running.
    pub motor_on: bool,
    /// Motor direction.
    pub direction: Direction,
    /// Button latch enabled (pin 14).
    pub latch_enabled: bool,
    /// GPIOD clock enabled.
    pub gpiod_enabled: bool,
    /// USART3 clock enabled.
    pub usart_enabled: bool,
    /// GPIOD MODER.
    pub moder: u32,
    /// GPIOD IDR.
    pub idr: u16,
    /// USART3 SR.
    pub sr: u16,
    /// USART3 CR1.
    pub cr1: u16,
}

/// Authoritative client-side view of the board.
#[derive(Debug, Clone, Default)]
pub struct HardwareModel {
    segment_bits: u8,
    motor_on: bool,
    reverse: bool,
    sprite: usize,
    gpiod_enabled: bool,
    usart_enabled: bool,
    moder: u32,
    idr: u16,
    sr: u16,
    cr1: u16,
    buttons: ButtonMachine,
}

impl HardwareModel {
    /// Creates a model with every output low.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the current state.
    #[must_use]
    pub const fn snapshot(&self) -> HardwareSnapshot {
        HardwareSnapshot {
            segment_bits: self.segment_bits,
            motor_on: self.motor_on,
            direction: self.direction(),
            latch_enabled: self.buttons.latch_enabled(),
            gpiod_enabled: self.gpiod_enabled,
            usart_enabled: self.usart_enabled,
            moder: self.moder,
            idr: self.idr,
            sr: self.sr,
            cr1: self.cr1,
        }
    }

    const fn direction(&self) -> Direction {
        match (self.motor_on, self.reverse) {
            (false, _) => Direction::Stop,
            (true, false) => Direction::Clockwise,
            (true, true) => Direction::Anticlockwise,
        }
    }

    /// Returns the button latch state.
    #[must_use]
    pub const fn buttons(&self) -> &ButtonMachine {
        &self.buttons
    }

    /// Returns true once the GPIOD clock has been seen enabled.
    #[must_use]
    pub const fn gpiod_enabled(&self) -> bool {
        self.gpiod_enabled
    }

    /// Returns true once the USART3 clock has been seen enabled.
    #[must_use]
    pub const fn usart_enabled(&self) -> bool {
        self.usart_enabled
    }

    /// Applies an output pin change.
    pub fn apply_pin(&mut self, pin: u8, high: bool) -> Effects {
        let mut effects = Effects::default();
        match pin {
            p if SEGMENT_PINS.contains(&p) => {
                let index = p - SEGMENT_PINS.start();
                if high {
                    self.segment_bits |= 1 << index;
                } else {
                    self.segment_bits &= !(1 << index);
                }
                effects.render(PanelUpdate::Led { index, lit: high });
                effects.render(PanelUpdate::Segment(self.segment_bits));
            }
            MOTOR_PIN => {
                effects.render(PanelUpdate::Motor { frame: self.sprite });
                if self.motor_on && !high {
                    effects.render(PanelUpdate::Spinner(Spinner::Stopped));
                }
                self.motor_on = high;
            }
            DIRECTION_PIN => self.reverse = high,
            LATCH_PIN => effects.extend(self.buttons.set_latch_enabled(high)),
            _ => tracing::trace!("pin {} not wired to the panel", pin),
        }
        effects
    }

    /// Advances the motor animation by one frame.
    pub fn animate(&mut self) -> Effects {
        let mut effects = Effects::default();
        if self.motor_on {
            effects.render(PanelUpdate::Motor { frame: self.sprite });
            self.sprite = (self.sprite + 1) % MOTOR_FRAMES;
            let spinner = if self.reverse {
                Spinner::Anticlockwise
            } else {
                Spinner::Clockwise
            };
            effects.render(PanelUpdate::Spinner(spinner));
        }
        effects
    }

    /// Applies a decoded diagnostic event.
    ///
    /// Warnings are not board state and produce no effects.
    pub fn apply_event(&mut self, event: &Event) -> Effects {
        let mut effects = Effects::default();
        match *event {
            Event::PinLow { pin } => return self.apply_pin(pin, false),
            Event::PinHigh { pin } => return self.apply_pin(pin, true),
            Event::GpiodEnabled(value) => {
                self.gpiod_enabled = (value >> GPIOD_ENABLE_BIT) & 1 != 0;
                effects.render(PanelUpdate::GpiodEnabled(self.gpiod_enabled));
            }
            Event::UsartEnabled(value) => {
                self.usart_enabled = (value >> USART3_ENABLE_BIT) & 1 != 0;
                effects.render(PanelUpdate::UsartEnabled(self.usart_enabled));
            }
            Event::Moder(value) => {
                self.moder = value;
                effects.render(PanelUpdate::Moder(value));
            }
            Event::Idr(value) => {
                self.idr = value as u16;
                effects.render(PanelUpdate::Idr(self.idr));
            }
            Event::Sr(value) => {
                self.sr = value as u16;
                effects.render(PanelUpdate::Sr(self.sr));
            }
            Event::Cr1(value) => {
                self.cr1 = value as u16;
                effects.render(PanelUpdate::Cr1(self.cr1));
            }
            Event::Warning(_) => {}
        }
        effects
    }

    /// Presses a panel button.
    pub fn press(&mut self, button: &ButtonSpec) -> Effects {
        let effects = self.buttons.press(button);
        self.after_button(effects)
    }

    /// Releases a panel button.
    pub fn release(&mut self, button: &ButtonSpec) -> Effects {
        let effects = self.buttons.release(button);
        self.after_button(effects)
    }

    // A reset turns every peripheral clock off, so GPIOD must be re-probed.
    fn after_button(&mut self, mut effects: Effects) -> Effects {
        if effects.commands.iter().any(|cmd| cmd.starts_with("reset")) {
            self.gpiod_enabled = false;
            effects.render(PanelUpdate::GpiodEnabled(false));
        }
        effects
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::find_button;

    #[test]
    fn test_segment_mask() {
        let mut model = HardwareModel::new();
        let effects = model.apply_pin(8, true);
        assert_eq!(
            effects.updates,
            vec![
                PanelUpdate::Led { index: 0, lit: true },
                PanelUpdate::Segment(0b0001)
            ]
        );
        model.apply_pin(11, true);
        assert_eq!(model.snapshot().segment_bits, 0b1001);
        let effects = model.apply_pin(8, false);
        assert_eq!(effects.updates[1], PanelUpdate::Segment(0b1000));
        assert!(effects.commands.is_empty());
    }

    #[test]
    fn test_motor_start_and_stop() {
        let mut model = HardwareModel::new();
        let start = model.apply_pin(12, true);
        assert_eq!(start.updates, vec![PanelUpdate::Motor { frame: 0 }]);
        assert!(model.snapshot().motor_on);
        assert_eq!(model.snapshot().direction, Direction::Clockwise);

        let stop = model.apply_pin(12, false);
        assert_eq!(
            stop.updates,
            vec![
                PanelUpdate::Motor { frame: 0 },
                PanelUpdate::Spinner(Spinner::Stopped)
            ]
        );
        assert_eq!(model.snapshot().direction, Direction::Stop);

        // already stopped: no spinner overlay
        let again = model.apply_pin(12, false);
        assert_eq!(again.updates, vec![PanelUpdate::Motor { frame: 0 }]);
    }

    #[test]
    fn test_direction_is_not_rendered() {
        let mut model = HardwareModel::new();
        assert!(model.apply_pin(13, true).is_empty());
        model.apply_pin(12, true);
        assert_eq!(model.snapshot().direction, Direction::Anticlockwise);
    }

    #[test]
    fn test_animation_cycles_frames() {
        let mut model = HardwareModel::new();
        assert!(model.animate().is_empty());

        model.apply_pin(12, true);
        model.apply_pin(13, true);
        let frames: Vec<_> = (0..4)
            .map(|_| model.animate().updates)
            .map(|updates| updates[0].clone())
            .collect();
        assert_eq!(
            frames,
            vec![
                PanelUpdate::Motor { frame: 0 },
                PanelUpdate::Motor { frame: 1 },
                PanelUpdate::Motor { frame: 2 },
                PanelUpdate::Motor { frame: 0 },
            ]
        );
        assert_eq!(
            model.animate().updates[1],
            PanelUpdate::Spinner(Spinner::Anticlockwise)
        );
    }

    #[test]
    fn test_latch_pin_release_sends_up_commands() {
        let mut model = HardwareModel::new();
        let ps2 = find_button("PS2").unwrap();

        model.apply_pin(14, true);
        model.press(ps2);
        assert!(model.buttons().is_latched(ps2));

        let effects = model.apply_pin(14, false);
        assert!(!model.buttons().is_latched(ps2));
        assert!(effects.commands.contains(&"D0d2 "));
        assert!(!model.snapshot().latch_enabled);
    }

    #[test]
    fn test_unwired_pins_ignored() {
        let mut model = HardwareModel::new();
        assert!(model.apply_pin(3, true).is_empty());
        assert!(model.apply_pin(15, true).is_empty());
        assert_eq!(model.snapshot(), HardwareSnapshot::default());
    }

    #[test]
    fn test_register_events() {
        let mut model = HardwareModel::new();
        let effects = model.apply_event(&Event::GpiodEnabled(0x0010_0008));
        assert_eq!(effects.updates, vec![PanelUpdate::GpiodEnabled(true)]);
        model.apply_event(&Event::UsartEnabled(1 << 18));
        model.apply_event(&Event::Moder(0x5555_0000));
        model.apply_event(&Event::Idr(0x1_4001));
        model.apply_event(&Event::Cr1(0x200c));

        let snapshot = model.snapshot();
        assert!(snapshot.gpiod_enabled);
        assert!(snapshot.usart_enabled);
        assert_eq!(snapshot.moder, 0x5555_0000);
        assert_eq!(snapshot.idr, 0x4001);
        assert_eq!(snapshot.cr1, 0x200c);

        model.apply_event(&Event::GpiodEnabled(0));
        assert!(!model.gpiod_enabled());
        assert!(model.apply_event(&Event::Warning("x".into())).is_empty());
    }

    #[test]
    fn test_reset_clears_gpiod() {
        let mut model = HardwareModel::new();
        model.apply_event(&Event::GpiodEnabled(1 << 3));
        let effects = model.press(find_button("reset").unwrap());
        assert_eq!(effects.commands, vec!["reset "]);
        assert!(effects.updates.contains(&PanelUpdate::GpiodEnabled(false)));
        assert!(!model.gpiod_enabled());
    }
}
