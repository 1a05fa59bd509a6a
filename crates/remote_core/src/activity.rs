//! Idle/active feedback: turns discrete interaction events into a smoothly animated
//! intensity in `[0, 1]`.
//!
//! [`ActivityStateMachine`] is driven purely by the instants it is given, so it can be
//! stepped deterministically. [`ActivityMonitor`] wraps one machine with the wall clock,
//! a single ticker task and a `watch` channel for renderers.

use std::{
    sync::{Arc, Mutex, PoisonError},
    time::{Duration, Instant},
};

use tokio::{
    sync::watch,
    task::{AbortHandle, JoinHandle},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivitySettings {
    /// Quiet time after the last interaction before fading out.
    pub idle_timeout: Duration,
    /// Length of every fade, in or out.
    pub fade_duration: Duration,
    /// Ticker period used by [`ActivityMonitor::spawn_ticker`].
    pub frame_interval: Duration,
}

impl Default for ActivitySettings {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(10),
            fade_duration: Duration::from_millis(500),
            frame_interval: Duration::from_millis(16),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ActivityPhase {
    Idle,
    Active,
    Transitioning {
        from: f64,
        to: f64,
        started_at: Instant,
    },
}

#[derive(Debug, Clone)]
pub struct ActivityStateMachine {
    settings: ActivitySettings,
    phase: ActivityPhase,
    deadline: Option<Instant>,
}

impl ActivityStateMachine {
    /// Starts idle at intensity 0 with no fade.
    pub fn new_idle(settings: ActivitySettings) -> Self {
        Self {
            settings,
            phase: ActivityPhase::Idle,
            deadline: None,
        }
    }

    pub fn settings(&self) -> &ActivitySettings {
        &self.settings
    }

    pub fn phase(&self) -> ActivityPhase {
        self.phase
    }

    /// When the idle fade-out will start, if an interaction armed it.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Fades toward fully active from wherever the intensity currently is, and re-arms
    /// the idle deadline.
    pub fn interaction(&mut self, now: Instant) {
        self.advance(now);
        let from = self.value_at(now);
        self.phase = ActivityPhase::Transitioning {
            from,
            to: 1.0,
            started_at: now,
        };
        self.deadline = Some(now + self.settings.idle_timeout);
    }

    /// Applies an elapsed idle deadline and settles a finished fade.
    pub fn advance(&mut self, now: Instant) {
        if let Some(deadline) = self.deadline {
            if now >= deadline {
                let from = self.value_at(deadline);
                self.phase = ActivityPhase::Transitioning {
                    from,
                    to: 0.0,
                    started_at: deadline,
                };
                self.deadline = None;
            }
        }

        if let ActivityPhase::Transitioning { to, started_at, .. } = self.phase {
            if now.saturating_duration_since(started_at) >= self.settings.fade_duration {
                self.phase = if to >= 1.0 {
                    ActivityPhase::Active
                } else {
                    ActivityPhase::Idle
                };
            }
        }
    }

    /// Current intensity after advancing to `now`.
    pub fn intensity(&mut self, now: Instant) -> f64 {
        self.advance(now);
        self.value_at(now)
    }

    fn value_at(&self, now: Instant) -> f64 {
        let value = match self.phase {
            ActivityPhase::Idle => 0.0,
            ActivityPhase::Active => 1.0,
            ActivityPhase::Transitioning {
                from,
                to,
                started_at,
            } => {
                let progress = fade_progress(
                    now.saturating_duration_since(started_at),
                    self.settings.fade_duration,
                );
                from + (to - from) * ease_in_out_quad(progress)
            }
        };
        value.clamp(0.0, 1.0)
    }
}

fn fade_progress(elapsed: Duration, duration: Duration) -> f64 {
    if duration.is_zero() {
        return 1.0;
    }
    (elapsed.as_secs_f64() / duration.as_secs_f64()).clamp(0.0, 1.0)
}

fn ease_in_out_quad(t: f64) -> f64 {
    if t < 0.5 {
        2.0 * t * t
    } else {
        1.0 - (-2.0 * t + 2.0).powi(2) / 2.0
    }
}

/// Receives "the user did something" notifications.
pub trait InteractionSink: Send + Sync {
    fn notify_interaction(&self);
}

/// One [`ActivityStateMachine`] on the wall clock, shared between interaction handlers
/// and the renderer.
pub struct ActivityMonitor {
    machine: Mutex<ActivityStateMachine>,
    intensity_tx: watch::Sender<f64>,
    ticker: Mutex<Option<AbortHandle>>,
}

impl ActivityMonitor {
    pub fn new(settings: ActivitySettings) -> Arc<Self> {
        let (intensity_tx, _) = watch::channel(0.0);
        Arc::new(Self {
            machine: Mutex::new(ActivityStateMachine::new_idle(settings)),
            intensity_tx,
            ticker: Mutex::new(None),
        })
    }

    pub fn intensity(&self) -> f64 {
        let value = self.lock_machine().intensity(Instant::now());
        self.intensity_tx.send_replace(value);
        value
    }

    pub fn phase(&self) -> ActivityPhase {
        let mut machine = self.lock_machine();
        machine.advance(Instant::now());
        machine.phase()
    }

    /// Latest published intensity; updated by the ticker and by every read.
    pub fn subscribe(&self) -> watch::Receiver<f64> {
        self.intensity_tx.subscribe()
    }

    /// Starts the frame ticker, replacing any ticker already running for this monitor.
    pub fn spawn_ticker(self: &Arc<Self>) -> JoinHandle<()> {
        let frame = self.lock_machine().settings().frame_interval;
        let monitor = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(frame);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                let Some(monitor) = monitor.upgrade() else {
                    break;
                };
                monitor.intensity();
            }
        });

        let previous = self
            .ticker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(handle.abort_handle());
        if let Some(previous) = previous {
            previous.abort();
        }
        handle
    }

    fn lock_machine(&self) -> std::sync::MutexGuard<'_, ActivityStateMachine> {
        self.machine.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl InteractionSink for ActivityMonitor {
    fn notify_interaction(&self) {
        let value = {
            let mut machine = self.lock_machine();
            let now = Instant::now();
            machine.interaction(now);
            machine.intensity(now)
        };
        self.intensity_tx.send_replace(value);
    }
}

impl Drop for ActivityMonitor {
    fn drop(&mut self) {
        if let Some(ticker) = self
            .ticker
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            ticker.abort();
        }
    }
}

#[cfg(test)]
#[path = "tests/activity_tests.rs"]
mod tests;
