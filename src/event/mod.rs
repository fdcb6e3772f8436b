//! Events flowing through the bridge.
//!
//! Two streams meet in the driver loop:
//!
//! - [`Event`]s decoded from the diagnostic port by the listener task,
//!   delivered in order over the [`channel`] module's `EventChannel`.
//! - [`PanelUpdate`]s produced by the driver for whatever renders the
//!   panel, fanned out by the [`UpdateDispatcher`].

pub mod channel;
pub mod dispatcher;

pub use channel::{EventReceiver, EventSender, event_channel};
pub use dispatcher::{Subscription, UpdateDispatcher};

use crate::protocol::ReplyKind;

/// A decoded diagnostic port message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Output pin went low.
    PinLow { pin: u8 },
    /// Output pin went high.
    PinHigh { pin: u8 },
    /// RCC AHB1ENR value.
    GpiodEnabled(u32),
    /// RCC APB1ENR value.
    UsartEnabled(u32),
    /// GPIOD MODER value.
    Moder(u32),
    /// GPIOD IDR value.
    Idr(u32),
    /// USART3 SR value.
    Sr(u32),
    /// USART3 CR1 value.
    Cr1(u32),
    /// Recoverable problem to show the user.
    Warning(String),
}

impl Event {
    /// Builds the event for a register reply.
    #[must_use]
    pub const fn register(kind: ReplyKind, value: u32) -> Self {
        match kind {
            ReplyKind::GpiodEnabled => Self::GpiodEnabled(value),
            ReplyKind::UsartEnabled => Self::UsartEnabled(value),
            ReplyKind::Moder => Self::Moder(value),
            ReplyKind::Idr => Self::Idr(value),
            ReplyKind::Sr => Self::Sr(value),
            ReplyKind::Cr1 => Self::Cr1(value),
        }
    }

    /// Returns the register this event reports, if any.
    #[must_use]
    pub const fn reply_kind(&self) -> Option<ReplyKind> {
        match self {
            Self::GpiodEnabled(_) => Some(ReplyKind::GpiodEnabled),
            Self::UsartEnabled(_) => Some(ReplyKind::UsartEnabled),
            Self::Moder(_) => Some(ReplyKind::Moder),
            Self::Idr(_) => Some(ReplyKind::Idr),
            Self::Sr(_) => Some(ReplyKind::Sr),
            Self::Cr1(_) => Some(ReplyKind::Cr1),
            Self::PinLow { .. } | Self::PinHigh { .. } | Self::Warning(_) => None,
        }
    }
}

/// Motor spinner overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Spinner {
    /// Motor stopped.
    Stopped,
    /// Turning clockwise.
    Clockwise,
    /// Turning anticlockwise.
    Anticlockwise,
}

/// A change the panel renderer should draw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PanelUpdate {
    /// Diagnostic connection established.
    Connected,
    /// Diagnostic connection closed.
    Disconnected,
    /// Warning line text; `None` clears it.
    Warning(Option<String>),
    /// One of the four LEDs on pins 8-11.
    Led { index: u8, lit: bool },
    /// Seven segment glyph for the 4-bit LED mask.
    Segment(u8),
    /// Motor sprite frame.
    Motor { frame: usize },
    /// Motor spinner overlay.
    Spinner(Spinner),
    /// Button overlay.
    Button { name: &'static str, pressed: bool },
    /// GPIOD clock enabled flag.
    GpiodEnabled(bool),
    /// USART3 clock enabled flag.
    UsartEnabled(bool),
    /// GPIOD MODER value.
    Moder(u32),
    /// GPIOD IDR value.
    Idr(u16),
    /// USART3 SR value.
    Sr(u16),
    /// USART3 CR1 value.
    Cr1(u16),
    /// Text received on the serial console.
    SerialText(String),
}
