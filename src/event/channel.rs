//! Ordered delivery of decoded events from the listener to the driver.
//!
//! The listener must never stall on the driver's 100ms tick, so the channel
//! is unbounded. The driver takes everything pending in one go each tick and
//! handles it as a batch.

use tokio::sync::mpsc;

use crate::error::{Error, Result};
use crate::event::Event;

/// Creates a connected sender/receiver pair.
#[must_use]
pub fn event_channel() -> (EventSender, EventReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventSender { tx }, EventReceiver { rx })
}

/// Producer half, owned by the listener task.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<Event>,
}

impl EventSender {
    /// Enqueues an event without waiting.
    ///
    /// # Errors
    ///
    /// Returns `ChannelClosed` once the receiver is gone.
    pub fn send(&self, event: Event) -> Result<()> {
        self.tx.send(event).map_err(|_| Error::ChannelClosed)
    }

    /// Enqueues a warning.
    pub fn warn(&self, text: impl Into<String>) -> Result<()> {
        self.send(Event::Warning(text.into()))
    }

    /// Returns true if the receiver has been dropped.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer half, owned by the driver loop.
#[derive(Debug)]
pub struct EventReceiver {
    rx: mpsc::UnboundedReceiver<Event>,
}

impl EventReceiver {
    /// Takes every event that is currently queued, oldest first.
    pub fn drain(&mut self) -> Vec<Event> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }

    /// Waits for the next event. Returns `None` once all senders are gone.
    pub async fn recv(&mut self) -> Option<Event> {
        self.rx.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drain_preserves_order() {
        let (tx, mut rx) = event_channel();
        tx.send(Event::PinHigh { pin: 8 }).unwrap();
        tx.warn("first").unwrap();
        tx.send(Event::Idr(0x4000)).unwrap();

        assert_eq!(
            rx.drain(),
            vec![
                Event::PinHigh { pin: 8 },
                Event::Warning("first".into()),
                Event::Idr(0x4000),
            ]
        );
        assert!(rx.drain().is_empty());
    }

    #[test]
    fn test_send_after_receiver_dropped() {
        let (tx, rx) = event_channel();
        drop(rx);
        assert!(tx.is_closed());
        assert!(matches!(
            tx.send(Event::PinLow { pin: 1 }),
            Err(Error::ChannelClosed)
        ));
    }

    #[tokio::test]
    async fn test_producer_never_waits() {
        let (tx, mut rx) = event_channel();
        let producer = tokio::spawn(async move {
            for pin in 0..16u8 {
                for _ in 0..1000 {
                    tx.send(Event::PinHigh { pin }).unwrap();
                }
            }
        });
        producer.await.unwrap();

        let events = rx.drain();
        assert_eq!(events.len(), 16_000);
        assert_eq!(events[0], Event::PinHigh { pin: 0 });
        assert_eq!(events[15_999], Event::PinHigh { pin: 15 });
        assert_eq!(rx.recv().await, None);
    }
}
