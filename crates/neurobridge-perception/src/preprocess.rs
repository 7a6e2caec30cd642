//! [`Preprocessor`] – snapshot → fixed-length model input.
//!
//! # Algorithm
//!
//! 1. Take the snapshot's scan; absent or empty → all zeros.
//! 2. Keep the samples inside `[range_min, range_max]` (non-finite samples
//!    never survive).
//! 3. Divide every survivor by `range_max`, giving values in `[0, 1]`.
//! 4. Take the first `input_size` survivors in stream order and right-pad
//!    with `0.0`.
//!
//! The inertial and odometry streams are cached but not part of the input
//! vector; only ranging data feeds the model.
//!
//! # Example
//!
//! ```rust
//! use neurobridge_perception::preprocess::Preprocessor;
//! use neurobridge_types::{ScanData, SensorSnapshot};
//!
//! let mut snap = SensorSnapshot::empty();
//! snap.scan = Some(ScanData { ranges: vec![0.2, 0.4, 1.0], range_min: 0.0, range_max: 1.0 });
//!
//! let input = Preprocessor::new(5).build(&snap);
//! assert_eq!(input.as_slice(), &[0.2, 0.4, 1.0, 0.0, 0.0]);
//! ```

use neurobridge_types::{InputVector, ScanData, SensorSnapshot};
use tracing::{debug, warn};

/// Builds [`InputVector`]s of a fixed length.
#[derive(Debug, Clone, Copy)]
pub struct Preprocessor {
    input_size: usize,
}

impl Preprocessor {
    pub fn new(input_size: usize) -> Self {
        Self { input_size }
    }

    pub fn input_size(&self) -> usize {
        self.input_size
    }

    /// Build the model input for `snapshot`.  The result always holds
    /// exactly `input_size` values.
    pub fn build(&self, snapshot: &SensorSnapshot) -> InputVector {
        let mut values = match &snapshot.scan {
            Some(scan) if !scan.ranges.is_empty() => self.normalized_ranges(scan),
            _ => Vec::new(),
        };
        values.resize(self.input_size, 0.0);
        InputVector::from_vec(values)
    }

    fn normalized_ranges(&self, scan: &ScanData) -> Vec<f32> {
        let (min, max) = (scan.range_min, scan.range_max);
        if !max.is_finite() || max <= 0.0 || min.is_nan() || min > max {
            warn!(range_min = min, range_max = max, "scan bounds unusable; treating scan as empty");
            return Vec::new();
        }

        let survivors: Vec<f32> = scan
            .ranges
            .iter()
            .copied()
            .filter(|r| *r >= min && *r <= max)
            .take(self.input_size)
            .map(|r| (r / max).clamp(0.0, 1.0))
            .collect();

        if survivors.is_empty() {
            debug!(samples = scan.ranges.len(), "no scan sample inside sensor bounds");
        }
        survivors
    }
}
