use std::sync::Arc;
use std::time::Duration;

use derive_more::Display;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::source::{QrSessionSource, SourceError};
use super::state::{ControllerSnapshot, Directive, DisplayMode, Machine};
use crate::service::clock::{Clock, SystemClock};

const COMMAND_BUFFER: usize = 16;

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub mode: DisplayMode,
    /// How often a subscribed display asks the server for its current code.
    pub poll_every: Duration,
    /// Countdown resolution.
    pub tick_every: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            mode: DisplayMode::Rotating { minutes: 1 },
            poll_every: Duration::from_secs(60),
            tick_every: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Display)]
pub enum ControllerError {
    #[display(fmt = "display mode is off")]
    Off,
    #[display(fmt = "{}", _0)]
    Source(SourceError),
    #[display(fmt = "controller has shut down")]
    Stopped,
}

impl std::error::Error for ControllerError {}

impl From<SourceError> for ControllerError {
    fn from(e: SourceError) -> Self {
        ControllerError::Source(e)
    }
}

#[derive(Debug)]
enum Command {
    Generate,
    SetMode(DisplayMode),
    Subscribe,
    Unsubscribe,
    Revoke,
    Shutdown,
}

struct Envelope {
    command: Command,
    done: oneshot::Sender<Result<(), ControllerError>>,
}

/// Handle to a running display controller. Every state change is published
/// on a watch channel; commands are served one at a time by a single task.
pub struct QrController {
    commands: mpsc::Sender<Envelope>,
    state: watch::Receiver<ControllerSnapshot>,
    task: JoinHandle<()>,
}

impl QrController {
    pub fn spawn(source: Arc<dyn QrSessionSource>, config: ControllerConfig) -> Self {
        Self::spawn_with_clock(source, config, Arc::new(SystemClock))
    }

    /// `clock` is the wall clock session expiry times are compared against.
    pub fn spawn_with_clock(
        source: Arc<dyn QrSessionSource>,
        config: ControllerConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let machine = Machine::new(config.mode);
        let (state_tx, state) = watch::channel(machine.snapshot());
        let (commands, rx) = mpsc::channel(COMMAND_BUFFER);

        let driver = Driver {
            source,
            clock,
            machine,
            state: state_tx,
            config,
        };
        let task = tokio::spawn(driver.run(rx));

        Self {
            commands,
            state,
            task,
        }
    }

    /// Issue a code for the current mode and start watching the server.
    pub async fn generate(&self) -> Result<(), ControllerError> {
        self.send(Command::Generate).await
    }

    pub async fn set_mode(&self, mode: DisplayMode) -> Result<(), ControllerError> {
        self.send(Command::SetMode(mode)).await
    }

    pub async fn subscribe(&self) -> Result<(), ControllerError> {
        self.send(Command::Subscribe).await
    }

    pub async fn unsubscribe(&self) -> Result<(), ControllerError> {
        self.send(Command::Unsubscribe).await
    }

    /// Revoke on the server, then clear the display and stop all timers.
    pub async fn revoke(&self) -> Result<(), ControllerError> {
        self.send(Command::Revoke).await
    }

    pub fn watch(&self) -> watch::Receiver<ControllerSnapshot> {
        self.state.clone()
    }

    pub fn snapshot(&self) -> ControllerSnapshot {
        self.state.borrow().clone()
    }

    /// Stops the task; no timer fires after this returns.
    pub async fn shutdown(self) {
        // an error here means the task is already gone
        let _ = self.send(Command::Shutdown).await;
        if let Err(e) = self.task.await {
            warn!(error = %e, "QR controller task ended abnormally");
        }
    }

    async fn send(&self, command: Command) -> Result<(), ControllerError> {
        let (done, reply) = oneshot::channel();
        self.commands
            .send(Envelope { command, done })
            .await
            .map_err(|_| ControllerError::Stopped)?;
        reply.await.map_err(|_| ControllerError::Stopped)?
    }
}

struct Driver {
    source: Arc<dyn QrSessionSource>,
    clock: Arc<dyn Clock>,
    machine: Machine,
    state: watch::Sender<ControllerSnapshot>,
    config: ControllerConfig,
}

/// Waits on an optional timer; an absent timer never fires.
async fn fire(timer: &mut Option<Interval>) {
    match timer {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

fn interval_after(period: Duration) -> Interval {
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

impl Driver {
    async fn run(mut self, mut rx: mpsc::Receiver<Envelope>) {
        let mut countdown: Option<Interval> = None;
        let mut countdown_epoch = self.machine.countdown_epoch();
        let mut poll: Option<Interval> = None;

        info!(mode = ?self.machine.mode(), "QR controller started");

        loop {
            tokio::select! {
                biased;
                envelope = rx.recv() => {
                    let Some(Envelope { command, done }) = envelope else { break };
                    if matches!(command, Command::Shutdown) {
                        let _ = done.send(Ok(()));
                        break;
                    }
                    let result = self.handle(command).await;
                    let _ = done.send(result);
                }
                _ = fire(&mut countdown) => {
                    if self.machine.tick(Instant::now()) == Directive::Regenerate {
                        self.regenerate().await;
                    }
                }
                _ = fire(&mut poll) => self.poll().await,
            }

            // keep at most one countdown and one poll timer, matching the machine
            if !self.machine.countdown_running() {
                countdown = None;
            } else if countdown.is_none() || countdown_epoch != self.machine.countdown_epoch() {
                countdown = Some(interval_after(self.config.tick_every));
            }
            countdown_epoch = self.machine.countdown_epoch();

            if !self.machine.subscribed() {
                poll = None;
            } else if poll.is_none() {
                poll = Some(interval_after(self.config.poll_every));
            }

            self.publish();
        }

        info!("QR controller stopped");
    }

    async fn handle(&mut self, command: Command) -> Result<(), ControllerError> {
        debug!(?command, "QR controller command");
        match command {
            Command::Generate => {
                let Some((session_type, duration)) = self.machine.mode().request() else {
                    return Err(ControllerError::Off);
                };
                match self.source.generate(session_type, duration).await {
                    Ok(session) => {
                        self.machine.show(session, Instant::now(), self.clock.now());
                        self.machine.subscribe();
                        Ok(())
                    }
                    Err(e) => {
                        self.machine.failed(e.to_string());
                        Err(e.into())
                    }
                }
            }
            Command::SetMode(mode) => {
                self.machine.set_mode(mode);
                Ok(())
            }
            Command::Subscribe => {
                self.machine.subscribe();
                Ok(())
            }
            Command::Unsubscribe => {
                self.machine.unsubscribe();
                Ok(())
            }
            Command::Revoke => {
                let revoked = self.source.revoke().await?;
                info!(revoked, "QR sessions revoked");
                self.machine.revoked();
                Ok(())
            }
            Command::Shutdown => Ok(()),
        }
    }

    async fn regenerate(&mut self) {
        let Some((session_type, duration)) = self.machine.mode().request() else {
            return;
        };
        match self.source.generate(session_type, duration).await {
            Ok(session) => {
                info!(session_id = %session.session_id, "Rotated QR code");
                self.machine.show(session, Instant::now(), self.clock.now());
            }
            Err(e) => {
                warn!(error = %e, "QR rotation failed");
                self.machine.failed(e.to_string());
            }
        }
    }

    async fn poll(&mut self) {
        match self.source.current().await {
            Ok(current) => self.machine.polled(current, Instant::now(), self.clock.now()),
            Err(e) => {
                debug!(error = %e, "QR poll failed");
            }
        }
    }

    fn publish(&self) {
        let snapshot = self.machine.snapshot();
        self.state.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        });
    }
}
