//! Diagnostic port protocol.
//!
//! This module contains the wire-level pieces:
//! - Message reassembly and escape filtering
//! - Token decoding into events
//! - Outbound command payloads
//! - Register reply kinds

pub mod command;
pub mod decoder;
pub mod framer;
pub mod reply;

pub use command::{Command, GPIOD_ENABLE_BIT, USART3_ENABLE_BIT};
pub use decoder::{decode_token, decode_tokens};
pub use framer::{ESCAPE, ESCAPE_LEN, MessageFramer, is_space, strip_escapes};
pub use reply::ReplyKind;
