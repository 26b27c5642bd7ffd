//! Snapshot Interpolation
//!
//! Buffers authoritative position samples per entity and renders each
//! entity a fixed delay behind the newest known server time, interpolating
//! between the two samples that bracket the render time. The delay absorbs
//! network jitter: as long as a fresh snapshot arrives within it, motion
//! stays continuous.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tracing::trace;

/// Default interpolation delay behind the newest sample.
pub const DEFAULT_INTERPOLATION_DELAY: Duration = Duration::from_millis(100);

/// How much history each entity keeps, as server time.
pub const DEFAULT_HISTORY_WINDOW: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy)]
struct Sample {
    timestamp: f64,
    position: [f32; 2],
}

/// Per-entity history of authoritative samples.
///
/// Samples arrive tagged with the server clock and are kept in timestamp
/// order; an out-of-order or duplicate arrival is dropped. History older
/// than the window is pruned on insert.
#[derive(Debug)]
pub struct SnapshotBuffer {
    window: Duration,
    entities: HashMap<String, VecDeque<Sample>>,
}

impl Default for SnapshotBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotBuffer {
    /// Create a buffer with the default history window.
    pub fn new() -> Self {
        Self::with_window(DEFAULT_HISTORY_WINDOW)
    }

    /// Create a buffer keeping `window` of history per entity.
    pub fn with_window(window: Duration) -> Self {
        Self {
            window,
            entities: HashMap::new(),
        }
    }

    /// Record one entity sample at server time `timestamp` (seconds).
    ///
    /// Returns false if the sample was dropped as stale.
    pub fn push(&mut self, entity_id: &str, timestamp: f64, position: [f32; 2]) -> bool {
        let samples = self
            .entities
            .entry(entity_id.to_string())
            .or_default();

        if let Some(last) = samples.back() {
            if timestamp <= last.timestamp {
                trace!(entity_id, timestamp, "stale sample dropped");
                return false;
            }
        }

        samples.push_back(Sample { timestamp, position });

        let horizon = timestamp - self.window.as_secs_f64();
        while samples.len() > 2 && samples[1].timestamp < horizon {
            // Keep at least one sample older than the horizon so the
            // render time stays bracketed.
            samples.pop_front();
        }
        true
    }

    /// Interpolated position of `entity_id` at server time `at` (seconds).
    ///
    /// Before the oldest sample the oldest position is returned; past the
    /// newest sample the newest is held (no extrapolation). Unknown
    /// entities return `None`.
    pub fn sample(&self, entity_id: &str, at: f64) -> Option<[f32; 2]> {
        let samples = self.entities.get(entity_id)?;
        let newest = samples.back()?;
        if at >= newest.timestamp {
            return Some(newest.position);
        }
        let oldest = samples.front()?;
        if at <= oldest.timestamp {
            return Some(oldest.position);
        }

        // Bracket `at` between consecutive samples and lerp.
        for pair in samples.iter().zip(samples.iter().skip(1)) {
            let (a, b) = pair;
            if a.timestamp <= at && at <= b.timestamp {
                let span = b.timestamp - a.timestamp;
                let t = if span > 0.0 {
                    ((at - a.timestamp) / span) as f32
                } else {
                    0.0
                };
                return Some(lerp(a.position, b.position, t));
            }
        }
        Some(newest.position)
    }

    /// Drop all samples older than server time `before`, keeping one older
    /// sample per entity so nearby render times stay bracketed.
    pub fn prune(&mut self, before: f64) {
        for samples in self.entities.values_mut() {
            while samples.len() > 2 && samples[1].timestamp < before {
                samples.pop_front();
            }
        }
    }

    /// Forget one entity's history (it despawned).
    pub fn remove(&mut self, entity_id: &str) {
        self.entities.remove(entity_id);
    }

    /// Forget everything. Call on reconnect; post-resume server time may
    /// not line up with buffered history.
    pub fn clear(&mut self) {
        self.entities.clear();
    }

    /// Number of tracked entities.
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }
}

fn lerp(a: [f32; 2], b: [f32; 2], t: f32) -> [f32; 2] {
    [a[0] + (b[0] - a[0]) * t, a[1] + (b[1] - a[1]) * t]
}

/// Tracks the newest observed server time and derives the render time.
#[derive(Debug, Clone)]
pub struct InterpolationClock {
    delay: Duration,
    latest: Option<f64>,
}

impl Default for InterpolationClock {
    fn default() -> Self {
        Self::new(DEFAULT_INTERPOLATION_DELAY)
    }
}

impl InterpolationClock {
    /// Create a clock rendering `delay` behind the newest snapshot.
    pub fn new(delay: Duration) -> Self {
        Self { delay, latest: None }
    }

    /// Record a snapshot's server timestamp (seconds). Older-than-latest
    /// observations are ignored.
    pub fn observe(&mut self, timestamp: f64) {
        match self.latest {
            Some(latest) if timestamp <= latest => {}
            _ => self.latest = Some(timestamp),
        }
    }

    /// Server time to render at, or `None` before any snapshot arrived.
    pub fn render_time(&self) -> Option<f64> {
        self.latest.map(|t| t - self.delay.as_secs_f64())
    }

    /// Forget the observed clock. Call on reconnect.
    pub fn reset(&mut self) {
        self.latest = None;
    }
}
