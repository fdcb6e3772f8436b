//! Outbound commands for the diagnostic port.
//!
//! Every command is a literal ASCII payload terminated by a single space.
//! The strings are what the QEMU WMS monitor expects byte for byte.

/// Fixed commands sent to the diagnostic port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// Turn off command echo.
    NoEcho,
    /// Subscribe to asynchronous pin change notifications.
    Listen,
    /// Stop the emulator.
    Halt,
    /// Read GPIOD mode register.
    ReadModer,
    /// Read GPIOD input data register.
    ReadIdr,
    /// Read USART3 status register.
    ReadSr,
    /// Read USART3 control register 1.
    ReadCr1,
    /// Read RCC AHB1ENR (GPIOD clock enable).
    ProbeGpiod,
    /// Read RCC APB1ENR (USART3 clock enable).
    ProbeUsart3,
}

impl Command {
    /// Returns the wire payload.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NoEcho => "noecho ",
            Self::Listen => "listen ",
            Self::Halt => "halt ",
            Self::ReadModer => "D0? ",
            Self::ReadIdr => "D4? ",
            Self::ReadSr => "U0? ",
            Self::ReadCr1 => "U3? ",
            Self::ProbeGpiod => "M40023830? ",
            Self::ProbeUsart3 => "M40023840? ",
        }
    }
}

impl From<Command> for &'static str {
    fn from(cmd: Command) -> Self {
        cmd.as_str()
    }
}

/// GPIOD clock enable bit in RCC AHB1ENR.
pub const GPIOD_ENABLE_BIT: u32 = 3;

/// USART3 clock enable bit in RCC APB1ENR.
pub const USART3_ENABLE_BIT: u32 = 18;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commands_are_space_terminated() {
        for cmd in [
            Command::NoEcho,
            Command::Listen,
            Command::Halt,
            Command::ReadModer,
            Command::ReadIdr,
            Command::ReadSr,
            Command::ReadCr1,
            Command::ProbeGpiod,
            Command::ProbeUsart3,
        ] {
            assert!(cmd.as_str().ends_with(' '), "{cmd:?}");
        }
    }

    #[test]
    fn test_probe_payloads() {
        assert_eq!(Command::ProbeGpiod.as_str(), "M40023830? ");
        assert_eq!(Command::ProbeUsart3.as_str(), "M40023840? ");
        assert_eq!(<&str>::from(Command::ReadIdr), "D4? ");
    }
}
