//! Frame-rate instrumentation.
//!
use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::{Duration, Instant},
};

use tokio::{task::JoinHandle, time::interval};

pub static METER: Meter = Meter::new();

/// Weight of the newest interval in the moving average of [`FpsCounter`].
const FPS_SMOOTHING: f32 = 0.1;

#[derive(Default)]
pub struct Meter {
    raw_frames: AtomicU64,
    classified_frames: AtomicU64,
}

impl Meter {
    pub const fn new() -> Meter {
        Meter {
            raw_frames: AtomicU64::new(0),
            classified_frames: AtomicU64::new(0),
        }
    }

    pub fn tick_raw(&self) {
        self.raw_frames.fetch_add(1, Ordering::Relaxed);
    }

    pub fn tick_classified(&self) {
        self.classified_frames.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_reset_raw(&self) -> u64 {
        self.raw_frames.swap(0, Ordering::Relaxed)
    }

    pub fn get_reset_classified(&self) -> u64 {
        self.classified_frames.swap(0, Ordering::Relaxed)
    }
}

pub fn spawn_meter_logger() -> JoinHandle<()> {
    tokio::spawn(async {
        let mut log_interval = interval(Duration::from_secs(2));
        log_interval.tick().await;

        loop {
            let start = Instant::now();
            log_interval.tick().await;

            let raw_frames = METER.get_reset_raw();
            let classified_frames = METER.get_reset_classified();
            let elapsed = start.elapsed().as_secs_f32();
            let fps_raw = raw_frames as f32 / elapsed;
            let fps_classified = classified_frames as f32 / elapsed;

            if raw_frames > 0 {
                log::info!("Raw frames per second: {fps_raw:.2}")
            }
            if classified_frames > 0 {
                log::info!("Classified frames per second: {fps_classified:.2}")
            }
        }
    })
}

/// Smoothed frame rate of a single stream.
#[derive(Debug, Default)]
pub struct FpsCounter {
    last_tick: Option<Instant>,
    mean_interval: Option<f32>,
}

impl FpsCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a frame and return the current frame rate.
    pub fn tick(&mut self) -> f32 {
        self.tick_at(Instant::now())
    }

    pub fn tick_at(&mut self, now: Instant) -> f32 {
        if let Some(last) = self.last_tick.replace(now) {
            let interval = now.saturating_duration_since(last).as_secs_f32();
            self.mean_interval = Some(match self.mean_interval {
                None => interval,
                Some(mean) => mean + FPS_SMOOTHING * (interval - mean),
            });
        }
        self.fps()
    }

    /// Whether no frame was registered within `timeout` before `now`.
    pub fn is_idle(&self, now: Instant, timeout: Duration) -> bool {
        match self.last_tick {
            Some(last) => now.saturating_duration_since(last) >= timeout,
            None => true,
        }
    }

    /// Frames per second, zero until two frames were seen.
    pub fn fps(&self) -> f32 {
        match self.mean_interval {
            Some(interval) if interval > 0.0 => 1.0 / interval,
            _ => 0.0,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_meter_resets() {
        let meter = Meter::new();
        meter.tick_raw();
        meter.tick_raw();
        meter.tick_classified();

        assert_eq!(meter.get_reset_raw(), 2);
        assert_eq!(meter.get_reset_raw(), 0);
        assert_eq!(meter.get_reset_classified(), 1);
    }

    #[test]
    fn test_fps_counter_needs_two_frames() {
        let mut counter = FpsCounter::new();
        assert_eq!(counter.tick_at(Instant::now()), 0.0);
    }

    #[test]
    fn test_fps_counter_steady_rate() {
        let mut counter = FpsCounter::new();
        let start = Instant::now();
        for i in 0..20 {
            counter.tick_at(start + Duration::from_millis(40 * i));
        }

        assert!((counter.fps() - 25.0).abs() < 0.1);
    }

    #[test]
    fn test_fps_counter_idle() {
        let mut counter = FpsCounter::new();
        let start = Instant::now();
        let timeout = Duration::from_secs(60);
        assert!(counter.is_idle(start, timeout));

        counter.tick_at(start);
        assert!(!counter.is_idle(start + Duration::from_secs(59), timeout));
        assert!(counter.is_idle(start + Duration::from_secs(60), timeout));
    }

    #[test]
    fn test_fps_counter_smooths_spikes() {
        let mut counter = FpsCounter::new();
        let start = Instant::now();
        for i in 0..10 {
            counter.tick_at(start + Duration::from_millis(100 * i));
        }
        // One slow frame only nudges the rate
        let fps = counter.tick_at(start + Duration::from_millis(900 + 1000));

        assert!(fps < 10.0 && fps > 5.0);
    }
}
