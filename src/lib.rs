//! # wms-link
//!
//! A Rust bridge between the QEMU STM32 washing machine simulator (WMS) and
//! a front panel.
//!
//! QEMU exposes a text diagnostic port: the panel subscribes to GPIO pin
//! changes, polls a few peripheral registers and drives the board inputs by
//! writing pin commands. This library keeps a client-side model of the board
//! in sync with that stream and publishes what a panel should draw.
//!
//! ## Features
//!
//! - Async/await based API using Tokio
//! - Whitespace-token framing with telnet escape filtering
//! - Latch and door button semantics, resync after reconnect
//! - Optional passthrough of the board's serial console
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::time::Duration;
//! use wms_link::{Bridge, PanelUpdate};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), wms_link::Error> {
//!     let mut bridge = Bridge::tcp("localhost");
//!     let mut updates = bridge.subscribe();
//!     bridge.connect().await?;
//!
//!     // open and close the door
//!     bridge.press("door")?;
//!     bridge.release("door")?;
//!
//!     while let Ok(Some(update)) =
//!         tokio::time::timeout(Duration::from_secs(1), updates.recv()).await
//!     {
//!         if let PanelUpdate::Segment(mask) = update {
//!             println!("display: {mask:X}");
//!         }
//!     }
//!
//!     println!("{:?}", bridge.snapshot());
//!     bridge.disconnect().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - [`transport`] - TCP connections to the diagnostic port and serial console
//! - [`protocol`] - Token framing, decoding and outbound commands
//! - [`event`] - Decoded events and outbound panel updates
//! - [`board`] - Board model, button latches and resync
//! - [`scheduler`] - The polling tick
//! - [`bridge`] - High-level [`Bridge`] tying it together

pub mod board;
pub mod bridge;
pub mod error;
pub mod event;
pub mod protocol;
pub mod scheduler;
pub mod transport;

// Re-exports for convenience
pub use board::{
    BUTTONS, ButtonSpec, ButtonStyle, Direction, HardwareModel, HardwareSnapshot, SyncState,
    find_button,
};
pub use bridge::{Bridge, BridgeConfig};
pub use error::{Error, FrameError, Result};
pub use event::{Event, PanelUpdate, Spinner, Subscription, UpdateDispatcher};
pub use protocol::{Command, MessageFramer, ReplyKind, decode_token};
pub use scheduler::PollScheduler;
pub use transport::{SerialConsole, TcpConfig, TcpTransport, Transport};
