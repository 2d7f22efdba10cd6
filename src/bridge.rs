//! Event loop connecting a UI layer to the router.
//!
//! [`UiBridge`] is the only piece that talks to the UI. It owns the session
//! and the router, and services three inputs on a single thread:
//! - commands from the UI (typed or raw JSON)
//! - store change deliveries
//! - sign-in outcomes
//!
//! Nothing here waits on the store or the identity provider; a pending
//! sign-in is just an outcome that has not arrived yet. Watches the store
//! drops for falling behind are re-established from a fresh snapshot. Events go back to the
//! UI over a bounded channel held by [`UiPort`].
//!
//! # Example
//!
//! ```ignore
//! let (bridge, port) = UiBridge::new(store, auth, Arc::new(TracingSink), SyncConfig::default())?;
//! let worker = bridge.spawn()?;
//!
//! port.send(Command::GetChannels);
//! while let Some(event) = port.recv_timeout(Duration::from_secs(1)) {
//!     println!("{}", event.to_json()?);
//! }
//! drop(port);
//! worker.join().ok();
//! ```

use crate::auth::{AuthOutcome, AuthProvider};
use crate::config::SyncConfig;
use crate::diagnostics::{Diagnostic, DiagnosticKind, DiagnosticSink, Severity};
use crate::error::Result;
use crate::protocol::{Command, Event};
use crate::router::BroadcastRouter;
use crate::session::SessionContext;
use crate::store::{ChannelStore, StoreChange};
use crossbeam_channel::{bounded, select, unbounded, Receiver, Sender, TrySendError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// A message from the UI.
#[derive(Clone, Debug)]
pub enum UiMessage {
    Command(Command),
    /// Undecoded JSON, as received from the carrier.
    Raw(String),
}

/// The UI's end of a bridge.
///
/// Dropping it stops the bridge loop.
pub struct UiPort {
    commands: Sender<UiMessage>,
    events: Receiver<Event>,
}

impl UiPort {
    /// Queue a command. Returns false if the bridge is gone.
    pub fn send(&self, command: Command) -> bool {
        self.commands.send(UiMessage::Command(command)).is_ok()
    }

    /// Queue a JSON command for decoding on the loop.
    pub fn send_json(&self, raw: impl Into<String>) -> bool {
        self.commands.send(UiMessage::Raw(raw.into())).is_ok()
    }

    pub fn try_recv(&self) -> Option<Event> {
        self.events.try_recv().ok()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<Event> {
        self.events.recv_timeout(timeout).ok()
    }

    /// Every event currently queued.
    pub fn drain(&self) -> Vec<Event> {
        self.events.try_iter().collect()
    }

    pub fn events(&self) -> &Receiver<Event> {
        &self.events
    }
}

/// Single-threaded event loop for one client.
pub struct UiBridge {
    router: BroadcastRouter,
    session: SessionContext,
    commands: Receiver<UiMessage>,
    changes: Receiver<StoreChange>,
    auth: Receiver<AuthOutcome>,
    events: Sender<Event>,
    diagnostics: Arc<dyn DiagnosticSink>,
}

impl UiBridge {
    /// Build a bridge and its UI port. Start-up subscriptions are installed
    /// immediately; their snapshots wait in the queue until the loop runs.
    pub fn new(
        store: Arc<dyn ChannelStore>,
        auth: Arc<dyn AuthProvider>,
        diagnostics: Arc<dyn DiagnosticSink>,
        config: SyncConfig,
    ) -> Result<(Self, UiPort)> {
        config.validate()?;
        let (command_tx, command_rx) = unbounded();
        let (event_tx, event_rx) = bounded(config.event_buffer);
        let (change_tx, change_rx) = bounded(config.change_buffer);
        let (auth_tx, auth_rx) = unbounded();

        let mut router = BroadcastRouter::new(
            store,
            auth,
            Arc::clone(&diagnostics),
            config,
            change_tx,
            auth_tx,
        )?;
        router.start();

        let bridge = Self {
            router,
            session: SessionContext::new(),
            commands: command_rx,
            changes: change_rx,
            auth: auth_rx,
            events: event_tx,
            diagnostics,
        };
        let port = UiPort {
            commands: command_tx,
            events: event_rx,
        };
        Ok((bridge, port))
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    pub fn router(&self) -> &BroadcastRouter {
        &self.router
    }

    /// Run until the UI port is dropped or stops reading events.
    pub fn run(mut self) {
        tracing::debug!("bridge loop started");
        let commands = self.commands.clone();
        let changes = self.changes.clone();
        let auth = self.auth.clone();

        loop {
            let keep_going = select! {
                recv(commands) -> msg => match msg {
                    Ok(msg) => {
                        self.dispatch(msg);
                        true
                    }
                    Err(_) => false,
                },
                recv(changes) -> change => match change {
                    Ok(change) => self.on_change(change),
                    Err(_) => false,
                },
                recv(auth) -> outcome => {
                    if let Ok(outcome) = outcome {
                        self.router.handle_auth(&mut self.session, outcome);
                    }
                    true
                },
            };
            if !keep_going {
                break;
            }
        }

        self.router.shutdown();
        tracing::debug!("bridge loop stopped");
    }

    /// Run the loop on its own thread.
    pub fn spawn(self) -> std::io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("channelcast-bridge".to_string())
            .spawn(move || self.run())
    }

    /// Process everything already queued without blocking. Returns the
    /// number of messages handled.
    ///
    /// Sign-in outcomes and store deliveries drain before each command, so
    /// a command always sees the effects of everything before it.
    pub fn run_until_idle(&mut self) -> usize {
        let mut handled = 0;
        loop {
            if let Ok(outcome) = self.auth.try_recv() {
                self.router.handle_auth(&mut self.session, outcome);
            } else if let Ok(change) = self.changes.try_recv() {
                self.on_change(change);
            } else if let Ok(msg) = self.commands.try_recv() {
                self.dispatch(msg);
            } else {
                return handled;
            }
            handled += 1;
        }
    }

    fn dispatch(&mut self, msg: UiMessage) {
        let command = match msg {
            UiMessage::Command(command) => command,
            UiMessage::Raw(raw) => match Command::from_json(&raw) {
                Ok(command) => command,
                Err(e) => {
                    self.diagnostics
                        .record(Diagnostic::from_error("decoding command", &e));
                    return;
                }
            },
        };
        self.router.handle_command(&mut self.session, command);
    }

    /// Deliver a change, then check for dropped watches once the queue has
    /// drained. A watch is only dropped while the queue is full, so every
    /// loss is followed by a drain that finds it.
    fn on_change(&mut self, change: StoreChange) -> bool {
        let open = self.deliver(change);
        if open && self.changes.is_empty() {
            self.router.restore_lost_subscriptions();
        }
        open
    }

    /// Returns false once the UI has gone away.
    fn deliver(&mut self, change: StoreChange) -> bool {
        let Some(event) = self.router.handle_change(change) else {
            return true;
        };
        match self.events.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(event)) => {
                self.diagnostics.record(Diagnostic::new(
                    Severity::Warn,
                    DiagnosticKind::Internal,
                    format!("UI event queue full, dropped {}", event.tag()),
                ));
                true
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }
}
