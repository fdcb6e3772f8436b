//! Fixed-tick polling plan.
//!
//! The driver loop calls [`PollScheduler::tick`] once per poll period. The
//! scheduler decides which enable probes and register reads go out on that
//! tick, and expires the warning line.
//!
//! The enable registers are probed on every tick, so the firmware turning a
//! peripheral clock off is seen on the next tick. Register reads are only
//! useful while the clock is known to be on.

use std::time::Duration;

use crate::protocol::Command;

/// Default tick period.
pub const DEFAULT_POLL_PERIOD: Duration = Duration::from_millis(100);

/// Default time a warning stays on screen.
pub const DEFAULT_WARNING_DISPLAY: Duration = Duration::from_millis(5000);

/// What the scheduler needs to know about the device on each tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProbeStatus {
    /// GPIOD clock seen enabled.
    pub gpiod_enabled: bool,
    /// USART3 clock seen enabled.
    pub usart_enabled: bool,
    /// Serial console connected.
    pub serial_attached: bool,
}

/// Work for one tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickPlan {
    /// Commands to send, in order.
    pub commands: Vec<Command>,
    /// The warning line timed out on this tick and should be cleared.
    pub warning_expired: bool,
}

/// The single warning on display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Warning {
    /// Warning text.
    pub text: String,
    /// Tick on which the warning is cleared.
    pub expiry_tick: u64,
}

/// Tick counter and warning expiry.
#[derive(Debug, Clone)]
pub struct PollScheduler {
    period: Duration,
    warning_display: Duration,
    tick: u64,
    warning: Option<Warning>,
}

impl Default for PollScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_PERIOD, DEFAULT_WARNING_DISPLAY)
    }
}

impl PollScheduler {
    /// Creates a scheduler.
    ///
    /// A zero `period` is treated as one millisecond.
    #[must_use]
    pub fn new(period: Duration, warning_display: Duration) -> Self {
        Self {
            period: period.max(Duration::from_millis(1)),
            warning_display,
            tick: 0,
            warning: None,
        }
    }

    /// Returns the tick period.
    #[must_use]
    pub const fn period(&self) -> Duration {
        self.period
    }

    /// Returns the number of ticks run so far.
    #[must_use]
    pub const fn ticks(&self) -> u64 {
        self.tick
    }

    /// Returns the warning on display.
    #[must_use]
    pub const fn warning(&self) -> Option<&Warning> {
        self.warning.as_ref()
    }

    /// Shows a warning, replacing any previous one.
    pub fn set_warning(&mut self, text: impl Into<String>) {
        let display_ticks = self.warning_display.as_millis() / self.period.as_millis().max(1);
        let display_ticks = u64::try_from(display_ticks).unwrap_or(u64::MAX);
        self.warning = Some(Warning {
            text: text.into(),
            expiry_tick: self.tick.saturating_add(display_ticks),
        });
    }

    /// Removes the warning without waiting for it to expire.
    pub fn clear_warning(&mut self) {
        self.warning = None;
    }

    /// Advances one tick and returns the work for it.
    pub fn tick(&mut self, status: ProbeStatus) -> TickPlan {
        self.tick += 1;

        let mut commands = Vec::with_capacity(6);
        commands.push(Command::ProbeGpiod);
        if status.serial_attached {
            commands.push(Command::ProbeUsart3);
        }
        if status.gpiod_enabled {
            commands.push(Command::ReadModer);
            commands.push(Command::ReadIdr);
        }
        if status.serial_attached && status.usart_enabled {
            commands.push(Command::ReadSr);
            commands.push(Command::ReadCr1);
        }

        let warning_expired = match self.warning.take() {
            Some(warning) if self.tick >= warning.expiry_tick => {
                tracing::trace!("warning expired: {}", warning.text);
                true
            }
            other => {
                self.warning = other;
                false
            }
        };

        TickPlan {
            commands,
            warning_expired,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ENABLED: ProbeStatus = ProbeStatus {
        gpiod_enabled: true,
        usart_enabled: false,
        serial_attached: false,
    };

    #[test]
    fn test_probe_until_enabled() {
        let mut scheduler = PollScheduler::default();
        let plan = scheduler.tick(ProbeStatus::default());
        assert_eq!(plan.commands, vec![Command::ProbeGpiod]);

        let plan = scheduler.tick(ENABLED);
        assert_eq!(
            plan.commands,
            vec![Command::ProbeGpiod, Command::ReadModer, Command::ReadIdr]
        );
    }

    #[test]
    fn test_enable_checked_on_every_tick() {
        let mut scheduler = PollScheduler::default();
        for _ in 0..120 {
            let plan = scheduler.tick(ENABLED);
            assert_eq!(plan.commands.first(), Some(&Command::ProbeGpiod));
        }

        // clock switched off by the firmware: reads stop on the next tick
        let plan = scheduler.tick(ProbeStatus::default());
        assert_eq!(plan.commands, vec![Command::ProbeGpiod]);
    }

    #[test]
    fn test_serial_bank_only_with_console() {
        let mut scheduler = PollScheduler::default();
        let status = ProbeStatus {
            gpiod_enabled: true,
            usart_enabled: true,
            serial_attached: false,
        };
        let plan = scheduler.tick(status);
        assert!(!plan.commands.contains(&Command::ReadSr));
        assert!(!plan.commands.contains(&Command::ProbeUsart3));

        let plan = scheduler.tick(ProbeStatus {
            serial_attached: true,
            usart_enabled: false,
            ..status
        });
        assert_eq!(
            plan.commands,
            vec![
                Command::ProbeGpiod,
                Command::ProbeUsart3,
                Command::ReadModer,
                Command::ReadIdr
            ]
        );

        let plan = scheduler.tick(ProbeStatus {
            serial_attached: true,
            ..status
        });
        assert_eq!(
            plan.commands,
            vec![
                Command::ProbeGpiod,
                Command::ProbeUsart3,
                Command::ReadModer,
                Command::ReadIdr,
                Command::ReadSr,
                Command::ReadCr1
            ]
        );
    }

    #[test]
    fn test_warning_expires_after_display_time() {
        let mut scheduler = PollScheduler::default();
        for _ in 0..7 {
            scheduler.tick(ENABLED);
        }
        scheduler.set_warning("Invalid command response: ?x");

        // 49 ticks = 4900ms: still shown
        for _ in 0..49 {
            assert!(!scheduler.tick(ENABLED).warning_expired);
            assert!(scheduler.warning().is_some());
        }
        // 50th tick = 5000ms: cleared
        assert!(scheduler.tick(ENABLED).warning_expired);
        assert!(scheduler.warning().is_none());
        assert!(!scheduler.tick(ENABLED).warning_expired);
    }

    #[test]
    fn test_new_warning_overwrites_and_restarts() {
        let mut scheduler = PollScheduler::default();
        scheduler.set_warning("first");
        for _ in 0..30 {
            scheduler.tick(ENABLED);
        }
        scheduler.set_warning("second");
        assert_eq!(scheduler.warning().unwrap().text, "second");
        for _ in 0..49 {
            assert!(!scheduler.tick(ENABLED).warning_expired);
        }
        assert!(scheduler.tick(ENABLED).warning_expired);
    }

    #[test]
    fn test_custom_period() {
        let mut scheduler =
            PollScheduler::new(Duration::from_millis(250), Duration::from_secs(1));
        scheduler.set_warning("w");
        let plans: Vec<_> = (0..4).map(|_| scheduler.tick(ENABLED)).collect();
        assert!(plans[3].warning_expired);
        assert!(!plans[2].warning_expired);
    }
}
