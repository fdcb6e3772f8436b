//! Register reply kinds.
//!
//! A register reply looks like `=<cmd>?/<hex>`; the `=<cmd>` prefix says
//! which register the value came from.

/// Registers that the diagnostic port reports values for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReplyKind {
    /// RCC AHB1ENR, carries the GPIOD enable bit.
    GpiodEnabled,
    /// RCC APB1ENR, carries the USART3 enable bit.
    UsartEnabled,
    /// GPIOD mode register.
    Moder,
    /// GPIOD input data register.
    Idr,
    /// USART3 status register.
    Sr,
    /// USART3 control register 1.
    Cr1,
}

impl ReplyKind {
    /// Looks up a reply prefix (including the leading `=`), ignoring case.
    #[must_use]
    pub fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix.to_ascii_lowercase().as_str() {
            "=m40023830" => Some(Self::GpiodEnabled),
            "=m40023840" => Some(Self::UsartEnabled),
            "=d0" => Some(Self::Moder),
            "=d4" => Some(Self::Idr),
            "=u0" => Some(Self::Sr),
            "=u3" => Some(Self::Cr1),
            _ => None,
        }
    }

    /// Returns the canonical lower-case prefix.
    #[must_use]
    pub const fn prefix(self) -> &'static str {
        match self {
            Self::GpiodEnabled => "=m40023830",
            Self::UsartEnabled => "=m40023840",
            Self::Moder => "=d0",
            Self::Idr => "=d4",
            Self::Sr => "=u0",
            Self::Cr1 => "=u3",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_kind_from_prefix() {
        assert_eq!(ReplyKind::from_prefix("=d4"), Some(ReplyKind::Idr));
        assert_eq!(ReplyKind::from_prefix("=D0"), Some(ReplyKind::Moder));
        assert_eq!(
            ReplyKind::from_prefix("=M40023840"),
            Some(ReplyKind::UsartEnabled)
        );
        assert_eq!(ReplyKind::from_prefix("=zz"), None);
        assert_eq!(ReplyKind::from_prefix("d4"), None);
    }

    #[test]
    fn test_prefix_round_trips() {
        for kind in [
            ReplyKind::GpiodEnabled,
            ReplyKind::UsartEnabled,
            ReplyKind::Moder,
            ReplyKind::Idr,
            ReplyKind::Sr,
            ReplyKind::Cr1,
        ] {
            assert_eq!(ReplyKind::from_prefix(kind.prefix()), Some(kind));
        }
    }
}
