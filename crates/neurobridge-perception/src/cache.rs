//! [`SensorCache`] – latest-value store shared by sensor writers and the
//! cycle driver.
//!
//! Each stream (scan, IMU, odometry) holds only its most recent value.  A
//! writer overwrites one field under the lock; the cycle driver copies every
//! field under the same lock via [`SensorCache::snapshot`] and then works on
//! its private copy, so the lock is never held across inference.
//!
//! # Example
//!
//! ```rust
//! use neurobridge_perception::cache::SensorCache;
//! use neurobridge_types::{ScanData, SensorReading};
//!
//! let cache = SensorCache::new();
//! assert!(cache.snapshot().scan.is_none());
//!
//! cache.update(SensorReading::Scan(ScanData {
//!     ranges: vec![0.5, 1.0],
//!     range_min: 0.1,
//!     range_max: 2.0,
//! }));
//! assert_eq!(cache.snapshot().scan.unwrap().ranges, vec![0.5, 1.0]);
//! ```

use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use neurobridge_types::{ImuData, OdometryData, ScanData, SensorReading, SensorSnapshot};
use tracing::trace;

#[derive(Debug, Default)]
struct Latest {
    scan: Option<ScanData>,
    imu: Option<ImuData>,
    odometry: Option<OdometryData>,
}

/// Thread-safe latest-value store for every sensor stream.
///
/// Share it between writers with an `Arc`; all methods take `&self`.
#[derive(Debug, Default)]
pub struct SensorCache {
    latest: Mutex<Latest>,
}

impl SensorCache {
    /// Create a cache in which no stream has been written yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the latest value of the reading's stream.
    pub fn update(&self, reading: SensorReading) {
        trace!(stream = reading.stream(), "sensor cache update");
        let mut latest = self.lock();
        match reading {
            SensorReading::Scan(scan) => latest.scan = Some(scan),
            SensorReading::Imu(imu) => latest.imu = Some(imu),
            SensorReading::Odometry(odom) => latest.odometry = Some(odom),
        }
    }

    /// Copy every stream at one point in time.
    pub fn snapshot(&self) -> SensorSnapshot {
        let latest = self.lock();
        SensorSnapshot {
            scan: latest.scan.clone(),
            imu: latest.imu,
            odometry: latest.odometry,
            timestamp: Utc::now(),
        }
    }

    // A writer that panicked mid-update leaves at worst one stale field, so
    // a poisoned lock is still usable.
    fn lock(&self) -> MutexGuard<'_, Latest> {
        self.latest.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn scan(ranges: Vec<f32>) -> ScanData {
        ScanData {
            ranges,
            range_min: 0.1,
            range_max: 10.0,
        }
    }

    fn imu(z: f32) -> ImuData {
        ImuData {
            linear_acceleration: [0.0, 0.0, z],
            angular_velocity: [0.0; 3],
            orientation: [0.0, 0.0, 0.0, 1.0],
        }
    }

    fn odom(x: f32) -> OdometryData {
        OdometryData {
            position_x: x,
            position_y: 0.0,
            heading_rad: 0.0,
            linear_velocity: 0.0,
            angular_velocity: 0.0,
        }
    }

    #[test]
    fn fresh_cache_reports_every_stream_absent() {
        let snap = SensorCache::new().snapshot();
        assert!(snap.scan.is_none());
        assert!(snap.imu.is_none());
        assert!(snap.odometry.is_none());
    }

    #[test]
    fn streams_are_independent() {
        let cache = SensorCache::new();
        cache.update(SensorReading::Imu(imu(9.81)));

        let snap = cache.snapshot();
        assert!(snap.scan.is_none());
        assert!(snap.odometry.is_none());
        assert_eq!(snap.imu, Some(imu(9.81)));
    }

    #[test]
    fn update_replaces_previous_value() {
        let cache = SensorCache::new();
        cache.update(SensorReading::Odometry(odom(1.0)));
        cache.update(SensorReading::Odometry(odom(2.0)));
        assert_eq!(cache.snapshot().odometry, Some(odom(2.0)));
    }

    #[test]
    fn snapshot_is_a_detached_copy() {
        let cache = SensorCache::new();
        cache.update(SensorReading::Scan(scan(vec![1.0])));
        let before = cache.snapshot();

        cache.update(SensorReading::Scan(scan(vec![2.0, 3.0])));

        assert_eq!(before.scan.unwrap().ranges, vec![1.0]);
        assert_eq!(cache.snapshot().scan.unwrap().ranges, vec![2.0, 3.0]);
    }

    #[test]
    fn measured_zero_is_distinct_from_absent() {
        let cache = SensorCache::new();
        cache.update(SensorReading::Odometry(odom(0.0)));
        assert_eq!(cache.snapshot().odometry, Some(odom(0.0)));
    }

    #[test]
    fn concurrent_writers_and_reader() {
        let cache = Arc::new(SensorCache::new());
        let mut handles = Vec::new();

        for w in 0..3 {
            let cache = Arc::clone(&cache);
            handles.push(thread::spawn(move || {
                for i in 0..500 {
                    let v = i as f32;
                    match w {
                        0 => cache.update(SensorReading::Scan(scan(vec![v; 4]))),
                        1 => cache.update(SensorReading::Imu(imu(v))),
                        _ => cache.update(SensorReading::Odometry(odom(v))),
                    }
                }
            }));
        }

        let reader = {
            let cache = Arc::clone(&cache);
            thread::spawn(move || {
                for _ in 0..500 {
                    let snap = cache.snapshot();
                    // A scan is always written whole: all four samples agree.
                    if let Some(s) = snap.scan {
                        assert_eq!(s.ranges.len(), 4);
                        assert!(s.ranges.iter().all(|r| *r == s.ranges[0]));
                    }
                }
            })
        };

        for h in handles {
            h.join().unwrap();
        }
        reader.join().unwrap();

        let snap = cache.snapshot();
        assert_eq!(snap.scan.unwrap().ranges, vec![499.0; 4]);
        assert_eq!(snap.imu, Some(imu(499.0)));
        assert_eq!(snap.odometry, Some(odom(499.0)));
    }
}
