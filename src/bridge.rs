//! Main [`Bridge`] implementation.
//!
//! The bridge connects the diagnostic port (and optionally the serial
//! console) and runs two background tasks per connection:
//!
//! - the listener, which reads the diagnostic port, reassembles and decodes
//!   tokens and queues the resulting [`Event`]s;
//! - the driver, which owns the board model, handles button input as it
//!   arrives and runs the polling tick.
//!
//! Board state lives in the driver only. When the driver stops it hands the
//! model back, so a reconnect picks up where the last connection left off.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::board::{ButtonSpec, Effects, HardwareModel, HardwareSnapshot, SyncState, find_button};
use crate::error::{Error, Result};
use crate::event::{
    Event, EventReceiver, EventSender, PanelUpdate, Subscription, UpdateDispatcher, event_channel,
};
use crate::protocol::{Command, MessageFramer, decode_tokens};
use crate::scheduler::{DEFAULT_POLL_PERIOD, DEFAULT_WARNING_DISPLAY, PollScheduler, ProbeStatus};
use crate::transport::console::DEFAULT_SERIAL_PORT;
use crate::transport::tcp::DEFAULT_DIAGNOSTIC_PORT;
use crate::transport::{Receiver, SerialConsole, TcpConfig, TcpTransport, Transport};

/// Warning shown after a successful connect.
pub const CONNECTED_MESSAGE: &str = "Connected to QEMU";

/// Bytes taken from the diagnostic port per read.
const RECEIVE_BUFFER: usize = 256;

/// Configuration for a [`Bridge`].
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Host running QEMU.
    pub host: String,
    /// Diagnostic monitor port.
    pub diagnostic_port: u16,
    /// Serial console port.
    pub serial_port: u16,
    /// Driver tick period.
    pub poll_period: Duration,
    /// Time a warning stays on screen.
    pub warning_display: Duration,
    /// Panel updates buffered per subscriber.
    pub update_capacity: usize,
}

impl BridgeConfig {
    /// Creates a configuration with default ports and timings.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            diagnostic_port: DEFAULT_DIAGNOSTIC_PORT,
            serial_port: DEFAULT_SERIAL_PORT,
            poll_period: DEFAULT_POLL_PERIOD,
            warning_display: DEFAULT_WARNING_DISPLAY,
            update_capacity: 256,
        }
    }

    /// Sets the diagnostic port.
    #[must_use]
    pub const fn diagnostic_port(mut self, port: u16) -> Self {
        self.diagnostic_port = port;
        self
    }

    /// Sets the serial console port.
    #[must_use]
    pub const fn serial_port(mut self, port: u16) -> Self {
        self.serial_port = port;
        self
    }

    /// Sets the driver tick period.
    #[must_use]
    pub const fn poll_period(mut self, period: Duration) -> Self {
        self.poll_period = period;
        self
    }

    /// Sets how long warnings stay on screen.
    #[must_use]
    pub const fn warning_display(mut self, duration: Duration) -> Self {
        self.warning_display = duration;
        self
    }

    /// Sets the per-subscriber update buffer.
    #[must_use]
    pub const fn update_capacity(mut self, capacity: usize) -> Self {
        self.update_capacity = capacity;
        self
    }

    /// TCP settings for the diagnostic port.
    #[must_use]
    pub fn diagnostic_tcp(&self) -> TcpConfig {
        TcpConfig::new(self.host.clone(), self.diagnostic_port)
    }

    /// TCP settings for the serial console.
    #[must_use]
    pub fn serial_tcp(&self) -> TcpConfig {
        TcpConfig::new(self.host.clone(), self.serial_port)
    }

    fn scheduler(&self) -> PollScheduler {
        PollScheduler::new(self.poll_period, self.warning_display)
    }
}

/// User input queued for the driver.
#[derive(Debug)]
enum Input {
    Press(&'static ButtonSpec),
    Release(&'static ButtonSpec),
    Serial(String),
}

/// State that outlives a connection.
#[derive(Debug)]
struct Panel {
    model: HardwareModel,
    scheduler: PollScheduler,
}

/// Handles of a running connection.
struct Session {
    stop: watch::Sender<bool>,
    inputs: mpsc::UnboundedSender<Input>,
    serial_attached: bool,
    listener: JoinHandle<()>,
    driver: JoinHandle<Panel>,
}

/// Bridge between the QEMU washing machine simulator and a panel renderer.
pub struct Bridge<T> {
    config: BridgeConfig,
    transport: Arc<Mutex<T>>,
    dispatcher: UpdateDispatcher,
    snapshot: Arc<watch::Sender<HardwareSnapshot>>,
    panel: Option<Panel>,
    session: Option<Session>,
}

impl Bridge<TcpTransport> {
    /// Creates a bridge for `host` with default ports and timings.
    ///
    /// The bridge is not connected yet.
    #[must_use]
    pub fn tcp(host: impl Into<String>) -> Self {
        Self::with_config(BridgeConfig::new(host))
    }

    /// Creates a bridge with custom configuration.
    #[must_use]
    pub fn with_config(config: BridgeConfig) -> Self {
        let transport = TcpTransport::new(config.diagnostic_tcp());
        Self::new(transport, config)
    }
}

impl<T: Transport + 'static> Bridge<T> {
    /// Creates a bridge over the given transport.
    ///
    /// `config` supplies the timings and the serial console address.
    #[must_use]
    pub fn new(transport: T, config: BridgeConfig) -> Self {
        let dispatcher = UpdateDispatcher::new(config.update_capacity.max(1));
        let panel = Panel {
            model: HardwareModel::new(),
            scheduler: config.scheduler(),
        };
        let (snapshot, _) = watch::channel(panel.model.snapshot());

        Self {
            config,
            transport: Arc::new(Mutex::new(transport)),
            dispatcher,
            snapshot: Arc::new(snapshot),
            panel: Some(panel),
            session: None,
        }
    }

    /// Connects to the diagnostic port and starts the background tasks.
    ///
    /// Sends the `noecho`/`listen` handshake and shows the connected
    /// warning. Does nothing while the current connection is up; after the
    /// link was lost this dials again, keeping the board model.
    ///
    /// # Errors
    ///
    /// Returns a connect failure if the port cannot be reached.
    pub async fn connect(&mut self) -> Result<()> {
        if self.has_live_session().await? {
            return Ok(());
        }
        self.start(None).await
    }

    /// Connects the serial console, then the diagnostic port.
    ///
    /// # Errors
    ///
    /// Returns a connect failure if either port cannot be reached; the
    /// bridge is left disconnected.
    pub async fn connect_with_serial(&mut self) -> Result<()> {
        if self.has_live_session().await? {
            return Ok(());
        }
        let console = SerialConsole::connect(&self.config.serial_tcp()).await?;
        self.start(Some(console)).await
    }

    async fn start(&mut self, console: Option<SerialConsole>) -> Result<()> {
        let receiver = match self.open().await {
            Ok(receiver) => receiver,
            Err(e) => {
                if let Some(console) = console {
                    console.close().await;
                }
                return Err(e);
            }
        };

        let mut panel = self.panel.take().unwrap_or_else(|| Panel {
            model: HardwareModel::new(),
            scheduler: self.config.scheduler(),
        });
        panel.scheduler.set_warning(CONNECTED_MESSAGE);
        self.dispatcher.dispatch(PanelUpdate::Connected);
        self.dispatcher
            .dispatch(PanelUpdate::Warning(Some(CONNECTED_MESSAGE.to_string())));

        let (events_tx, events_rx) = event_channel();
        let (stop_tx, stop_rx) = watch::channel(false);
        let (inputs_tx, inputs_rx) = mpsc::unbounded_channel();
        let serial_attached = console.is_some();

        let listener = tokio::spawn(run_listener(receiver, events_tx, stop_rx.clone()));

        let driver = Driver {
            transport: Arc::clone(&self.transport),
            dispatcher: self.dispatcher.clone(),
            snapshot: Arc::clone(&self.snapshot),
            events: events_rx,
            inputs: inputs_rx,
            stop: stop_rx,
            panel,
            sync: SyncState::AwaitingResync,
            console,
            link_up: true,
        };
        let driver = tokio::spawn(driver.run(self.config.poll_period));

        self.session = Some(Session {
            stop: stop_tx,
            inputs: inputs_tx,
            serial_attached,
            listener,
            driver,
        });
        Ok(())
    }

    // Dials, handshakes and hands back the read side.
    async fn open(&self) -> Result<Receiver> {
        let mut transport = self.transport.lock().await;
        transport.connect().await?;

        match handshake(&mut *transport).await {
            Ok(receiver) => Ok(receiver),
            Err(e) => {
                transport.disconnect().await?;
                Err(e)
            }
        }
    }

    /// Stops the background tasks and closes every connection.
    ///
    /// The board model is kept for the next connect.
    ///
    /// # Errors
    ///
    /// Returns an error if closing the transport fails.
    pub async fn disconnect(&mut self) -> Result<()> {
        let was_running = self.stop().await;
        self.close(was_running).await
    }

    /// Sends `halt` to QEMU, then disconnects.
    ///
    /// The driver is stopped first so `halt` is the last command written.
    ///
    /// # Errors
    ///
    /// Returns the send error if `halt` could not be written; the bridge is
    /// disconnected either way.
    pub async fn halt(&mut self) -> Result<()> {
        let was_running = self.stop().await;
        let sent = {
            let mut transport = self.transport.lock().await;
            if transport.is_connected() {
                tracing::info!("halting QEMU");
                transport
                    .send(Bytes::from_static(Command::Halt.as_str().as_bytes()))
                    .await
                    .map(|_| ())
            } else {
                Err(Error::NotConnected)
            }
        };
        self.close(was_running).await?;
        sent
    }

    async fn close(&self, was_running: bool) -> Result<()> {
        self.transport.lock().await.disconnect().await?;
        if was_running {
            self.dispatcher.dispatch(PanelUpdate::Disconnected);
        }
        Ok(())
    }

    // Reaps a session whose link went down. Returns true if one is still up.
    async fn has_live_session(&mut self) -> Result<bool> {
        if self.session.is_none() {
            return Ok(false);
        }
        if self.transport.lock().await.is_connected() {
            return Ok(true);
        }
        tracing::debug!("reaping session after lost link");
        self.stop().await;
        self.transport.lock().await.disconnect().await?;
        Ok(false)
    }

    // Returns true if a session was running.
    async fn stop(&mut self) -> bool {
        let Some(session) = self.session.take() else {
            return false;
        };
        let _ = session.stop.send(true);

        match session.driver.await {
            Ok(panel) => self.panel = Some(panel),
            Err(e) => {
                tracing::error!("driver task failed: {}", e);
                self.panel = None;
            }
        }
        session.listener.abort();
        true
    }

    /// Presses a panel button.
    ///
    /// # Errors
    ///
    /// Returns `UnknownButton` for a name not on the panel and
    /// `NotConnected` if the bridge is not running.
    pub fn press(&self, name: &str) -> Result<()> {
        let button = lookup(name)?;
        self.queue(Input::Press(button))
    }

    /// Releases a panel button.
    ///
    /// # Errors
    ///
    /// Same as [`press`](Self::press).
    pub fn release(&self, name: &str) -> Result<()> {
        let button = lookup(name)?;
        self.queue(Input::Release(button))
    }

    /// Sends keystrokes to the board's serial input.
    ///
    /// # Errors
    ///
    /// Returns `NotConnected` unless connected with the serial console.
    pub fn send_serial(&self, text: impl Into<String>) -> Result<()> {
        match &self.session {
            Some(session) if session.serial_attached => self.queue(Input::Serial(text.into())),
            _ => Err(Error::NotConnected),
        }
    }

    fn queue(&self, input: Input) -> Result<()> {
        let session = self.session.as_ref().ok_or(Error::NotConnected)?;
        session
            .inputs
            .send(input)
            .map_err(|_| Error::ChannelClosed)
    }

    /// Returns true while the diagnostic connection is up.
    pub async fn is_connected(&self) -> bool {
        self.session.is_some() && self.transport.lock().await.is_connected()
    }

    /// Returns the latest board state.
    #[must_use]
    pub fn snapshot(&self) -> HardwareSnapshot {
        *self.snapshot.borrow()
    }

    /// Subscribes to panel updates.
    #[must_use]
    pub fn subscribe(&self) -> Subscription {
        self.dispatcher.subscribe()
    }

    /// Returns the update dispatcher.
    #[must_use]
    pub const fn dispatcher(&self) -> &UpdateDispatcher {
        &self.dispatcher
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &BridgeConfig {
        &self.config
    }
}

async fn handshake<T: Transport + ?Sized>(transport: &mut T) -> Result<Receiver> {
    for command in [Command::NoEcho, Command::Listen] {
        transport
            .send(Bytes::from_static(command.as_str().as_bytes()))
            .await?;
    }
    transport.take_receiver().ok_or(Error::NotConnected)
}

fn lookup(name: &str) -> Result<&'static ButtonSpec> {
    find_button(name).ok_or_else(|| Error::UnknownButton {
        name: name.to_string(),
    })
}

impl<T> Drop for Bridge<T> {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            let _ = session.stop.send(true);
            session.listener.abort();
            session.driver.abort();
        }
    }
}

/// Reads the diagnostic port until the connection dies or the bridge stops.
async fn run_listener(mut receiver: Receiver, events: EventSender, stop: watch::Receiver<bool>) {
    let mut framer = MessageFramer::new();
    let mut buf = [0u8; RECEIVE_BUFFER];

    loop {
        let n = match receiver.receive(&mut buf).await {
            Ok(n) => n,
            // idle line, just a liveness check
            Err(Error::ReceiveTimeout { .. }) => continue,
            Err(e) => {
                if *stop.borrow() {
                    tracing::debug!("listener stopped");
                } else {
                    tracing::error!("diagnostic connection lost: {}", e);
                    let _ = events.warn(Error::ConnectionClosed.user_message());
                }
                return;
            }
        };

        match framer.push(&buf[..n]) {
            Ok(tokens) => {
                for event in decode_tokens(&tokens) {
                    tracing::trace!("event {:?}", event);
                    if events.send(event).is_err() {
                        return;
                    }
                }
            }
            Err(e) => {
                let e = Error::from(e);
                tracing::warn!("{}", e);
                if events.warn(e.user_message()).is_err() {
                    return;
                }
            }
        }
    }
}

/// Owner of the board state while connected.
struct Driver<T> {
    transport: Arc<Mutex<T>>,
    dispatcher: UpdateDispatcher,
    snapshot: Arc<watch::Sender<HardwareSnapshot>>,
    events: EventReceiver,
    inputs: mpsc::UnboundedReceiver<Input>,
    stop: watch::Receiver<bool>,
    panel: Panel,
    sync: SyncState,
    console: Option<SerialConsole>,
    link_up: bool,
}

impl<T: Transport> Driver<T> {
    async fn run(mut self, period: Duration) -> Panel {
        let mut interval = tokio::time::interval(period.max(Duration::from_millis(1)));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if *self.stop.borrow() {
                break;
            }
            tokio::select! {
                biased;
                _ = self.stop.changed() => break,
                Some(input) = self.inputs.recv() => self.handle_input(input).await,
                _ = interval.tick() => self.tick().await,
            }
            self.snapshot.send_replace(self.panel.model.snapshot());
        }

        if let Some(console) = self.console.take() {
            console.close().await;
        }
        tracing::debug!("driver stopped after {} ticks", self.panel.scheduler.ticks());
        self.panel
    }

    async fn handle_input(&mut self, input: Input) {
        let effects = match input {
            Input::Press(button) => self.panel.model.press(button),
            Input::Release(button) => self.panel.model.release(button),
            Input::Serial(text) => {
                self.write_serial(&text).await;
                return;
            }
        };
        self.apply(effects).await;
    }

    async fn tick(&mut self) {
        for event in self.events.drain() {
            let effects = match event {
                Event::Warning(text) => {
                    self.warn(text);
                    continue;
                }
                Event::Idr(value) => {
                    let mut effects = self.panel.model.apply_event(&event);
                    effects.extend(self.sync.on_idr(&mut self.panel.model, value as u16));
                    effects
                }
                ref other => self.panel.model.apply_event(other),
            };
            self.apply(effects).await;
        }

        self.check_link().await;
        self.poll_serial();

        let status = ProbeStatus {
            gpiod_enabled: self.panel.model.gpiod_enabled(),
            usart_enabled: self.panel.model.usart_enabled(),
            serial_attached: self.console.is_some(),
        };
        let plan = self.panel.scheduler.tick(status);
        for command in plan.commands {
            self.send(command.as_str()).await;
        }

        let frame = self.panel.model.animate();
        self.apply(frame).await;

        if plan.warning_expired {
            self.dispatcher.dispatch(PanelUpdate::Warning(None));
        }
    }

    async fn check_link(&mut self) {
        if self.link_up && !self.transport.lock().await.is_connected() {
            tracing::info!("diagnostic connection down");
            self.link_up = false;
            self.dispatcher.dispatch(PanelUpdate::Disconnected);
        }
    }

    fn poll_serial(&mut self) {
        let Some(console) = self.console.as_mut() else {
            return;
        };
        match console.drain_text() {
            Ok(texts) => {
                for text in texts {
                    self.dispatcher.dispatch(PanelUpdate::SerialText(text));
                }
            }
            Err(e) => {
                tracing::warn!("serial console lost: {}", e);
                self.console = None;
                self.warn(e.user_message());
            }
        }
    }

    async fn write_serial(&mut self, text: &str) {
        let Some(console) = self.console.as_mut() else {
            return;
        };
        if let Err(e) = console.write(text).await {
            tracing::warn!("serial write failed: {}", e);
            self.warn(e.user_message());
        }
    }

    async fn apply(&mut self, effects: Effects) {
        for update in effects.updates {
            self.dispatcher.dispatch(update);
        }
        for command in effects.commands {
            self.send(command).await;
        }
    }

    async fn send(&mut self, command: &'static str) {
        if !self.link_up {
            tracing::trace!("link down, dropping {:?}", command);
            return;
        }
        let result = self
            .transport
            .lock()
            .await
            .send(Bytes::from_static(command.as_bytes()))
            .await;
        if let Err(e) = result {
            tracing::warn!("send {:?} failed: {}", command, e);
            self.warn(e.user_message());
        }
    }

    fn warn(&mut self, text: String) {
        tracing::warn!("{}", text);
        self.panel.scheduler.set_warning(text.clone());
        self.dispatcher.dispatch(PanelUpdate::Warning(Some(text)));
    }
}
