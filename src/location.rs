//! Location tracking: throttled position samples from an external source.
//!
//! The position source pushes [`PositionEvent`]s into a channel handed to it
//! by [`LocationTracker::start`]. The tracker only drains that channel when its
//! owner calls [`LocationTracker::pump`], so samples never reenter the rest of
//! the session mid-update. All the tracker ever does with a sample is record
//! it; readers decide what a new sample means.
//!
//! The watch is released by [`LocationTracker::stop`], which is idempotent and
//! also runs on drop.

use std::collections::VecDeque;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};

use jiff::{SignedDuration, Timestamp};
use tracing::{debug, info, warn};

use crate::config::LocationConfig;
use crate::geo;
use crate::model::{Coordinates, LocationSample};

/// Handle to an active watch on a position source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchId(pub u64);

/// What a position source can report.
#[derive(Debug, Clone, PartialEq)]
pub enum PositionEvent {
    Sample(LocationSample),
    PermissionDenied,
    Timeout,
}

/// Errors a position source can report when asked to begin watching.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PositionError {
    #[error("location permission denied")]
    PermissionDenied,

    #[error("position source unavailable: {0}")]
    Unavailable(String),
}

/// A continuous position stream, e.g. the platform geolocation service.
pub trait PositionSource {
    /// Begin delivering events to `sink` until the watch is cleared.
    fn watch(&mut self, sink: Sender<PositionEvent>) -> Result<WatchId, PositionError>;

    /// Stop delivering events for `id`.
    fn clear_watch(&mut self, id: WatchId);
}

/// Tracker status as shown to the driver.
///
/// `PermissionDenied` persists until the next explicit [`LocationTracker::start`];
/// it is never retried automatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerStatus {
    Idle,
    Watching,
    TimedOut,
    PermissionDenied,
    Unavailable,
}

pub struct LocationTracker {
    source: Box<dyn PositionSource>,
    config: LocationConfig,
    watch: Option<WatchId>,
    events: Option<Receiver<PositionEvent>>,
    status: TrackerStatus,
    last_sample: Option<LocationSample>,
    recent: VecDeque<LocationSample>,
}

impl LocationTracker {
    pub fn new(source: Box<dyn PositionSource>, config: LocationConfig) -> Self {
        Self {
            source,
            recent: VecDeque::with_capacity(config.buffer_size),
            config,
            watch: None,
            events: None,
            status: TrackerStatus::Idle,
            last_sample: None,
        }
    }

    /// Begin watching the position source. A no-op if already watching.
    pub fn start(&mut self) -> TrackerStatus {
        if self.watch.is_some() {
            return self.status;
        }

        let (tx, rx) = mpsc::channel();
        match self.source.watch(tx) {
            Ok(id) => {
                info!(watch = id.0, "location watch started");
                self.watch = Some(id);
                self.events = Some(rx);
                self.status = TrackerStatus::Watching;
            }
            Err(PositionError::PermissionDenied) => {
                warn!("location permission denied");
                self.status = TrackerStatus::PermissionDenied;
            }
            Err(PositionError::Unavailable(reason)) => {
                warn!(%reason, "position source unavailable");
                self.status = TrackerStatus::Unavailable;
            }
        }
        self.status
    }

    /// Release the watch. Safe to call any number of times.
    pub fn stop(&mut self) {
        if let Some(id) = self.watch.take() {
            self.source.clear_watch(id);
            info!(watch = id.0, "location watch released");
        }
        self.events = None;
        if matches!(self.status, TrackerStatus::Watching | TrackerStatus::TimedOut) {
            self.status = TrackerStatus::Idle;
        }
    }

    /// Drain pending events from the source. Returns how many samples were recorded.
    pub fn pump(&mut self) -> usize {
        let mut pending = Vec::new();
        if let Some(rx) = &self.events {
            loop {
                match rx.try_recv() {
                    Ok(event) => pending.push(event),
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        debug!("position source closed its channel");
                        break;
                    }
                }
            }
        }

        let mut recorded = 0;
        for event in pending {
            match event {
                PositionEvent::Sample(sample) => {
                    if self.record(sample) {
                        recorded += 1;
                    }
                }
                PositionEvent::Timeout => {
                    debug!("position source timed out");
                    if self.status == TrackerStatus::Watching {
                        self.status = TrackerStatus::TimedOut;
                    }
                }
                PositionEvent::PermissionDenied => {
                    warn!("location permission revoked while watching");
                    self.stop();
                    self.status = TrackerStatus::PermissionDenied;
                    break;
                }
            }
        }
        recorded
    }

    /// Record a sample, subject to throttling.
    ///
    /// A sample arriving less than one interval after the last recorded one is
    /// dropped. Accuracy does not affect whether a sample is recorded.
    pub fn record(&mut self, sample: LocationSample) -> bool {
        if let Some(last) = &self.last_sample
            && sample.timestamp.duration_since(last.timestamp) < self.interval()
        {
            debug!(at = %sample.timestamp, "sample throttled");
            return false;
        }

        if self.status == TrackerStatus::TimedOut {
            self.status = TrackerStatus::Watching;
        }
        if self.recent.len() == self.config.buffer_size {
            self.recent.pop_front();
        }
        self.recent.push_back(sample.clone());
        self.last_sample = Some(sample);
        true
    }

    pub fn status(&self) -> TrackerStatus {
        self.status
    }

    pub fn is_watching(&self) -> bool {
        self.watch.is_some()
    }

    pub fn last_sample(&self) -> Option<&LocationSample> {
        self.last_sample.as_ref()
    }

    /// True when no sample has been recorded within twice the expected interval.
    pub fn is_stale(&self, now: Timestamp) -> bool {
        match &self.last_sample {
            None => true,
            Some(s) => now.duration_since(s.timestamp) > self.interval() * 2,
        }
    }

    /// Whether the last sample is accurate enough to steer navigation.
    pub fn is_accurate(&self) -> bool {
        self.last_sample
            .as_ref()
            .is_some_and(|s| s.accuracy_m <= self.config.accuracy_threshold_m)
    }

    /// Distance from the last sample to `point`, in meters.
    pub fn distance_to(&self, point: Coordinates) -> Option<f64> {
        self.last_sample
            .as_ref()
            .map(|s| geo::distance_m(s.coordinates(), point))
    }

    /// Average ground speed over the rolling buffer, in meters per second.
    pub fn speed_mps(&self) -> Option<f64> {
        let (first, last) = (self.recent.front()?, self.recent.back()?);
        let elapsed = last.timestamp.duration_since(first.timestamp).as_secs_f64();
        if elapsed <= 0.0 {
            return None;
        }
        let travelled: f64 = self
            .recent
            .iter()
            .zip(self.recent.iter().skip(1))
            .map(|(a, b)| geo::distance_m(a.coordinates(), b.coordinates()))
            .sum();
        Some(travelled / elapsed)
    }

    /// Heading across the rolling buffer, in degrees.
    ///
    /// `None` while the driver has not moved far enough to tell.
    pub fn heading_deg(&self) -> Option<f64> {
        let (first, last) = (self.recent.front()?, self.recent.back()?);
        let (a, b) = (first.coordinates(), last.coordinates());
        if geo::distance_m(a, b) < 1.0 {
            return None;
        }
        Some(geo::bearing_deg(a, b))
    }

    fn interval(&self) -> SignedDuration {
        SignedDuration::from_millis(i64::try_from(self.config.interval_ms).unwrap_or(i64::MAX))
    }
}

impl Drop for LocationTracker {
    fn drop(&mut self) {
        self.stop();
    }
}
