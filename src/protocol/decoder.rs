//! Token decoding for the diagnostic port.
//!
//! Inbound token grammar:
//!
//! ```text
//! ?<echo>             invalid command response
//! -<x><pin>...        pin went low  (pin is the hex digit at offset 2)
//! +<x><pin>...        pin went high
//! =<cmd>?/<hex>       register reply
//! ```
//!
//! Anything else is not produced by the port and is ignored. A malformed
//! token becomes a [`Event::Warning`] so the listener keeps going.

use crate::event::Event;
use crate::protocol::ReplyKind;

/// Offset of the pin digit in a pin change token.
const PIN_OFFSET: usize = 2;

/// Separator between a register reply prefix and its value.
const REPLY_SEPARATOR: &str = "?/";

/// Decodes one token.
///
/// Returns `None` for tokens that carry nothing of interest.
#[must_use]
pub fn decode_token(token: &str) -> Option<Event> {
    let event = match token.as_bytes().first()? {
        b'?' => Event::Warning(format!("Invalid command response: {token}")),
        b'-' => pin_event(token, false),
        b'+' => pin_event(token, true),
        b'=' => register_event(token),
        _ => {
            tracing::trace!("ignoring token {:?}", token);
            return None;
        }
    };
    Some(event)
}

/// Decodes a batch of tokens, preserving order.
pub fn decode_tokens<I, S>(tokens: I) -> impl Iterator<Item = Event>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    tokens
        .into_iter()
        .filter_map(|token| decode_token(token.as_ref()))
}

fn pin_event(token: &str, high: bool) -> Event {
    let pin = token
        .as_bytes()
        .get(PIN_OFFSET)
        .and_then(|&digit| char::from(digit).to_digit(16));

    match pin {
        // a single hex digit is always 0..=15
        Some(pin) if high => Event::PinHigh { pin: pin as u8 },
        Some(pin) => Event::PinLow { pin: pin as u8 },
        None => Event::Warning(format!("Malformed pin change response: {token}")),
    }
}

fn register_event(token: &str) -> Event {
    let Some((cmd, value)) = token.split_once(REPLY_SEPARATOR) else {
        return Event::Warning(format!(
            "Memory query missing ?/ separator: \"{token}\""
        ));
    };

    let Some(kind) = ReplyKind::from_prefix(cmd) else {
        return Event::Warning(format!(
            "Unknown command prefix in response: {token} \"{cmd}\""
        ));
    };

    match u32::from_str_radix(value, 16) {
        Ok(value) => Event::register(kind, value),
        Err(e) => Event::Warning(format!("Invalid register value in response: {token} ({e})")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_warning(event: Option<Event>) -> bool {
        matches!(event, Some(Event::Warning(_)))
    }

    #[test]
    fn test_register_reply() {
        assert_eq!(decode_token("=d4?/000f"), Some(Event::Idr(15)));
        assert_eq!(
            decode_token("=M40023830?/00100008"),
            Some(Event::GpiodEnabled(0x0010_0008))
        );
        assert_eq!(decode_token("=u3?/200C"), Some(Event::Cr1(0x200c)));
    }

    #[test]
    fn test_unknown_prefix_is_warning() {
        let event = decode_token("=zz?/01");
        assert_eq!(
            event,
            Some(Event::Warning(
                "Unknown command prefix in response: =zz?/01 \"=zz\"".into()
            ))
        );
    }

    #[test]
    fn test_missing_separator_is_warning() {
        assert_eq!(
            decode_token("=d0?01"),
            Some(Event::Warning(
                "Memory query missing ?/ separator: \"=d0?01\"".into()
            ))
        );
    }

    #[test]
    fn test_bad_hex_is_warning() {
        assert!(is_warning(decode_token("=d0?/xyz")));
        assert!(is_warning(decode_token("=d0?/")));
    }

    #[test]
    fn test_pin_changes() {
        assert_eq!(decode_token("-a3"), Some(Event::PinLow { pin: 3 }));
        assert_eq!(decode_token("+a9"), Some(Event::PinHigh { pin: 9 }));
        assert_eq!(decode_token("+dE"), Some(Event::PinHigh { pin: 14 }));
        assert_eq!(decode_token("-dc0"), Some(Event::PinLow { pin: 12 }));
    }

    #[test]
    fn test_malformed_pin_is_warning() {
        assert!(is_warning(decode_token("+a")));
        assert!(is_warning(decode_token("-ag")));
    }

    #[test]
    fn test_invalid_command_echo() {
        assert_eq!(
            decode_token("?D9?"),
            Some(Event::Warning("Invalid command response: ?D9?".into()))
        );
    }

    #[test]
    fn test_other_tokens_ignored() {
        assert_eq!(decode_token("hello"), None);
        assert_eq!(decode_token(""), None);
    }

    #[test]
    fn test_decode_tokens_keeps_going_after_errors() {
        let events: Vec<_> = decode_tokens(["+a8", "=zz?/1", "junk", "-a8"]).collect();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0], Event::PinHigh { pin: 8 });
        assert!(matches!(events[1], Event::Warning(_)));
        assert_eq!(events[2], Event::PinLow { pin: 8 });
    }
}
