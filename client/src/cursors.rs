//! Collaborative cursor presence.
//!
//! DESIGN
//! ======
//! Cursor traffic is ephemeral and funnel-scoped. Each session generates a
//! throwaway [`Participant`] identity, throttles its own `cursor:move`
//! emissions to one per 50 ms (dropped, never queued), and tracks remote
//! cursors in a [`CursorTracker`] that forgets anyone silent for 5 s.
//!
//! All time-dependent paths take an explicit `Instant` so tests control the
//! clock; the `Instant::now()` entry points are thin wrappers.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use events::{CursorHint, CursorMove, Envelope, EventBody};
use rand::Rng;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Fixed participant palette; picked at random per session.
pub const CURSOR_PALETTE: [&str; 8] = [
    "#EF4444", "#F59E0B", "#10B981", "#3B82F6", "#8B5CF6", "#EC4899", "#06B6D4", "#84CC16",
];

/// A cursor silent for this long is dropped by [`CursorTracker::sweep`].
pub const CURSOR_STALE_AFTER: Duration = Duration::from_millis(5000);
/// How often the background sweeper runs.
pub const CURSOR_SWEEP_INTERVAL: Duration = Duration::from_millis(1000);
/// Minimum gap between two of our own `cursor:move` emissions.
pub const CURSOR_THROTTLE: Duration = Duration::from_millis(50);

const ID_SUFFIX_LEN: usize = 7;

// =============================================================================
// PARTICIPANT
// =============================================================================

/// Throwaway per-session identity. The server relays it verbatim and never
/// validates it; uniqueness only has to hold among concurrent viewers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub id: String,
    pub name: String,
    pub color: String,
}

impl Participant {
    #[must_use]
    pub fn generate() -> Self {
        let mut rng = rand::rng();

        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        let suffix: String = (0..ID_SUFFIX_LEN)
            .map(|_| (rng.sample(rand::distr::Alphanumeric) as char).to_ascii_lowercase())
            .collect();

        Self {
            id: format!("user_{millis}_{suffix}"),
            name: format!("User {}", rng.random_range(0..1000)),
            color: CURSOR_PALETTE[rng.random_range(0..CURSOR_PALETTE.len())].to_owned(),
        }
    }
}

// =============================================================================
// TRACKER
// =============================================================================

/// A remote viewer's last known pointer position.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteCursor {
    pub oder_id: String,
    pub x: f64,
    pub y: f64,
    pub name: String,
    pub color: String,
    last_update: Instant,
}

/// Remote cursors for one funnel, keyed by participant id. Own events and
/// other funnels' events never land here.
pub struct CursorTracker {
    funnel_id: Uuid,
    self_id: String,
    cursors: HashMap<String, RemoteCursor>,
}

impl CursorTracker {
    #[must_use]
    pub fn new(funnel_id: Uuid, self_id: impl Into<String>) -> Self {
        Self { funnel_id, self_id: self_id.into(), cursors: HashMap::new() }
    }

    /// Feed one inbound event through the tracker.
    ///
    /// `cursor:move` upserts a position, `cursor:leave` removes one.
    /// `cursor:enter` is presence-only and never creates a position; a
    /// participant becomes visible with their first `cursor:move`.
    pub fn apply(&mut self, envelope: &Envelope, now: Instant) {
        match &envelope.body {
            EventBody::CursorMove(m) => {
                if m.funnel_id != self.funnel_id || m.oder_id == self.self_id {
                    return;
                }
                self.cursors.insert(
                    m.oder_id.clone(),
                    RemoteCursor {
                        oder_id: m.oder_id.clone(),
                        x: m.x,
                        y: m.y,
                        name: m.name.clone(),
                        color: m.color.clone(),
                        last_update: now,
                    },
                );
            }
            EventBody::CursorLeave(h) => {
                if h.funnel_id == self.funnel_id {
                    self.cursors.remove(&h.oder_id);
                }
            }
            _ => {}
        }
    }

    /// Drop cursors that have not moved within [`CURSOR_STALE_AFTER`].
    pub fn sweep(&mut self, now: Instant) {
        self.cursors
            .retain(|_, cursor| now.duration_since(cursor.last_update) <= CURSOR_STALE_AFTER);
    }

    /// Current snapshot, one entry per remote participant.
    #[must_use]
    pub fn cursors(&self) -> Vec<RemoteCursor> {
        self.cursors.values().cloned().collect()
    }
}

/// Background task driving [`CursorTracker::sweep`] every
/// [`CURSOR_SWEEP_INTERVAL`]. Aborted on drop.
pub struct CursorSweeper {
    task: JoinHandle<()>,
}

impl CursorSweeper {
    #[must_use]
    pub fn spawn(tracker: Arc<Mutex<CursorTracker>>) -> Self {
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(CURSOR_SWEEP_INTERVAL);
            loop {
                ticker.tick().await;
                tracker
                    .lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner)
                    .sweep(Instant::now());
            }
        });
        Self { task }
    }
}

impl Drop for CursorSweeper {
    fn drop(&mut self) {
        self.task.abort();
    }
}

// =============================================================================
// EMISSION
// =============================================================================

/// Drop-don't-queue rate limiter for our own cursor traffic.
#[derive(Debug)]
pub struct Throttle {
    min_gap: Duration,
    last: Option<Instant>,
}

impl Throttle {
    #[must_use]
    pub fn new(min_gap: Duration) -> Self {
        Self { min_gap, last: None }
    }

    /// True if enough time has passed since the last allowed call; records
    /// `now` when it is.
    pub fn allow(&mut self, now: Instant) -> bool {
        match self.last {
            Some(last) if now.duration_since(last) < self.min_gap => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }
}

impl Default for Throttle {
    fn default() -> Self {
        Self::new(CURSOR_THROTTLE)
    }
}

/// Convert a pixel offset to a 0-100 percentage of the viewport span.
/// Degenerate spans pin to 0 rather than dividing by zero.
#[must_use]
pub fn to_viewport_percent(px: f64, span: f64) -> f64 {
    if span <= 0.0 {
        return 0.0;
    }
    (px / span * 100.0).clamp(0.0, 100.0)
}

/// Outbound cursor state for one participant viewing one funnel: throttled
/// moves, a single enter, and a leave builder for unmount.
pub struct CursorSession {
    participant: Participant,
    funnel_id: Uuid,
    throttle: Throttle,
    entered: bool,
}

impl CursorSession {
    #[must_use]
    pub fn new(participant: Participant, funnel_id: Uuid) -> Self {
        Self { participant, funnel_id, throttle: Throttle::default(), entered: false }
    }

    #[must_use]
    pub fn participant(&self) -> &Participant {
        &self.participant
    }

    /// `cursor:enter` for the first call per session; `None` ever after.
    pub fn enter_once(&mut self) -> Option<Envelope> {
        if self.entered {
            return None;
        }
        self.entered = true;
        Some(Envelope::now(EventBody::CursorEnter(self.hint())))
    }

    /// Throttled `cursor:move`. Coordinates are viewport percentages;
    /// suppressed calls are dropped, not deferred.
    pub fn motion(&mut self, x: f64, y: f64, now: Instant) -> Option<Envelope> {
        if !self.throttle.allow(now) {
            return None;
        }
        Some(Envelope::now(EventBody::CursorMove(CursorMove {
            oder_id: self.participant.id.clone(),
            x,
            y,
            name: self.participant.name.clone(),
            color: self.participant.color.clone(),
            funnel_id: self.funnel_id,
        })))
    }

    /// `cursor:leave`, for unmount or pointer-leave. Never throttled.
    #[must_use]
    pub fn leave(&self) -> Envelope {
        Envelope::now(EventBody::CursorLeave(self.hint()))
    }

    fn hint(&self) -> CursorHint {
        CursorHint {
            oder_id: self.participant.id.clone(),
            name: self.participant.name.clone(),
            color: self.participant.color.clone(),
            funnel_id: self.funnel_id,
        }
    }
}

#[cfg(test)]
#[path = "cursors_test.rs"]
mod tests;
