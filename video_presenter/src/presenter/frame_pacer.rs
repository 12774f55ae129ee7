/// FramePacer - holds frames until their presentation timestamp is due

use std::time::{Duration, Instant};

/// Timestamps further ahead of the clock than this re-anchor the pacer
const MAX_LEAD: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy)]
struct Anchor {
    wall: Instant,
    pts: Duration,
}

/// Maps stream timestamps onto the wall clock.
///
/// The first paced frame anchors the clock. A timestamp that goes backwards
/// (seek, loop) or lies more than a second ahead re-anchors instead of
/// stalling the presenter.
#[derive(Debug, Default)]
pub struct FramePacer {
    anchor: Option<Anchor>,
}

impl FramePacer {
    pub fn new() -> Self {
        Self::default()
    }

    /// How long to wait before presenting `pts`, measured at `now`.
    ///
    /// Updates the anchor when the timestamp cannot be paced against it.
    pub fn delay_at(&mut self, pts: Duration, now: Instant) -> Duration {
        let anchor = match self.anchor {
            Some(anchor) if pts >= anchor.pts => anchor,
            _ => return self.reanchor(pts, now),
        };

        let due = anchor.wall + (pts - anchor.pts);
        let delay = due.saturating_duration_since(now);
        if delay > MAX_LEAD {
            return self.reanchor(pts, now);
        }
        delay
    }

    /// Sleep until `pts` is due
    pub fn wait_for(&mut self, pts: Duration) {
        let delay = self.delay_at(pts, Instant::now());
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
    }

    /// Forget the anchor; the next frame presents immediately
    pub fn flush(&mut self) {
        self.anchor = None;
    }

    pub fn is_anchored(&self) -> bool {
        self.anchor.is_some()
    }

    fn reanchor(&mut self, pts: Duration, now: Instant) -> Duration {
        self.anchor = Some(Anchor { wall: now, pts });
        Duration::ZERO
    }
}

#[cfg(test)]
#[path = "frame_pacer_tests.rs"]
mod tests;
