//! Display state for a QR kiosk, kept free of timers and I/O. The driver in
//! `runner` owns the clock and feeds events in; this module only decides what
//! the display shows and whether a countdown should be running.

use chrono::{Duration as ChronoDuration, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;

use crate::model::qr_session::{SessionType, SessionView};

/// What the operator asked the display to do. One value, so "rotating and
/// static at once" cannot be expressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum DisplayMode {
    Rotating { minutes: u32 },
    Static { hours: u32 },
    Off,
}

impl DisplayMode {
    /// Session type and duration for a generate call, `None` when off.
    pub fn request(&self) -> Option<(SessionType, u32)> {
        match *self {
            DisplayMode::Rotating { minutes } => Some((SessionType::Rotating, minutes)),
            DisplayMode::Static { hours } => Some((SessionType::Static, hours)),
            DisplayMode::Off => None,
        }
    }

    pub fn rotates(&self) -> bool {
        matches!(self, DisplayMode::Rotating { .. })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ControllerState {
    Idle,
    Displaying(SessionView),
    Expiring {
        session: SessionView,
        seconds_left: u64,
    },
    /// The displayed code ran out and a replacement has been requested.
    Rotated { previous: String },
    /// Nothing usable on screen; the "expired" placeholder.
    Cleared,
}

impl ControllerState {
    pub fn session(&self) -> Option<&SessionView> {
        match self {
            ControllerState::Displaying(session) | ControllerState::Expiring { session, .. } => {
                Some(session)
            }
            _ => None,
        }
    }
}

/// What observers see on the watch channel.
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerSnapshot {
    pub state: ControllerState,
    pub mode: DisplayMode,
    pub subscribed: bool,
    /// Codes replaced automatically at expiry since start.
    pub rotations: u64,
    pub last_error: Option<String>,
}

/// Follow-up work the driver must do after a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    Nothing,
    /// Ask the source for a fresh rotating code.
    Regenerate,
}

#[derive(Debug)]
pub struct Machine {
    state: ControllerState,
    mode: DisplayMode,
    subscribed: bool,
    rotations: u64,
    last_error: Option<String>,
    // id of the most recent session shown, kept after it expires or clears
    last_seen: Option<String>,
    deadline: Option<Instant>,
    // bumped on every countdown start so the driver can replace its timer
    countdown_epoch: u64,
}

impl Machine {
    pub fn new(mode: DisplayMode) -> Self {
        Self {
            state: ControllerState::Idle,
            mode,
            subscribed: false,
            rotations: 0,
            last_error: None,
            last_seen: None,
            deadline: None,
            countdown_epoch: 0,
        }
    }

    pub fn state(&self) -> &ControllerState {
        &self.state
    }

    pub fn mode(&self) -> DisplayMode {
        self.mode
    }

    pub fn subscribed(&self) -> bool {
        self.subscribed
    }

    pub fn countdown_running(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn countdown_epoch(&self) -> u64 {
        self.countdown_epoch
    }

    pub fn snapshot(&self) -> ControllerSnapshot {
        ControllerSnapshot {
            state: self.state.clone(),
            mode: self.mode,
            subscribed: self.subscribed,
            rotations: self.rotations,
            last_error: self.last_error.clone(),
        }
    }

    /// A session arrived from a generate or a poll. Rotating codes count down
    /// whatever is left of their server lifetime as of `wall_now`, never more
    /// than the full lifetime.
    pub fn show(&mut self, session: SessionView, now: Instant, wall_now: NaiveDateTime) {
        self.last_error = None;
        self.last_seen = Some(session.session_id.clone());

        if session.session_type != SessionType::Rotating {
            self.deadline = None;
            self.state = ControllerState::Displaying(session);
            return;
        }

        let left = to_std(session.remaining(wall_now).min(session.lifetime()));
        let deadline = now + left;
        self.deadline = Some(deadline);
        self.countdown_epoch += 1;
        self.state = ControllerState::Expiring {
            seconds_left: seconds_until(deadline, now),
            session,
        };
    }

    /// Countdown tick. At zero the code is either replaced or cleared.
    pub fn tick(&mut self, now: Instant) -> Directive {
        let Some(deadline) = self.deadline else {
            return Directive::Nothing;
        };

        let left = seconds_until(deadline, now);
        if left > 0 {
            if let ControllerState::Expiring { seconds_left, .. } = &mut self.state {
                *seconds_left = left;
            }
            return Directive::Nothing;
        }

        self.deadline = None;
        let previous = self.state.session().map(|s| s.session_id.clone());

        match previous {
            Some(previous) if self.mode.rotates() => {
                self.rotations += 1;
                self.state = ControllerState::Rotated { previous };
                Directive::Regenerate
            }
            _ => {
                self.state = ControllerState::Cleared;
                Directive::Nothing
            }
        }
    }

    /// Background fetch of the server's current code. Only a session this
    /// display has not shown yet changes it; nothing at all leaves it alone.
    pub fn polled(
        &mut self,
        current: Option<SessionView>,
        now: Instant,
        wall_now: NaiveDateTime,
    ) {
        let Some(current) = current else {
            return;
        };
        if self.last_seen.as_deref() != Some(current.session_id.as_str()) {
            self.show(current, now, wall_now);
        }
    }

    /// A generate or fetch failed. A pending rotation falls back to cleared.
    pub fn failed(&mut self, error: String) {
        if matches!(self.state, ControllerState::Rotated { .. }) {
            self.state = ControllerState::Cleared;
        }
        self.last_error = Some(error);
    }

    pub fn set_mode(&mut self, mode: DisplayMode) {
        self.mode = mode;
        if mode == DisplayMode::Off {
            self.clear();
            self.subscribed = false;
        }
    }

    pub fn subscribe(&mut self) {
        self.subscribed = true;
    }

    pub fn unsubscribe(&mut self) {
        self.subscribed = false;
    }

    /// Server-side codes were revoked; drop the display and every timer.
    pub fn revoked(&mut self) {
        self.clear();
        self.subscribed = false;
    }

    fn clear(&mut self) {
        self.deadline = None;
        if !matches!(self.state, ControllerState::Idle) {
            self.state = ControllerState::Cleared;
        }
    }
}

fn to_std(d: ChronoDuration) -> Duration {
    d.to_std().unwrap_or(Duration::ZERO)
}

/// Whole seconds left, rounded up so the display never shows 0 early.
fn seconds_until(deadline: Instant, now: Instant) -> u64 {
    let left = deadline.saturating_duration_since(now);
    let secs = left.as_secs();
    if left.subsec_nanos() > 0 { secs + 1 } else { secs }
}
