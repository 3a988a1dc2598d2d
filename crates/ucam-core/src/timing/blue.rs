//! Timing of co-added blue-channel frames.
//!
//! With `nblue > 1` the blue CCD is read out once every `nblue` frames and
//! its exposure spans the exposures of the intervening red frames.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};

use crate::timing::gps::{add_seconds, seconds_between};

#[derive(Clone, Copy, Debug, PartialEq)]
struct BlueSample {
    ut: DateTime<Utc>,
    expose: f64,
    reliable: bool,
}

/// Blue-channel time, exposure and reliability for one frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BlueTiming {
    pub ut: DateTime<Utc>,
    pub exposure: f64,
    pub reliable: bool,
}

/// Rolling store of the last `nblue` frame times.
#[derive(Clone, Debug, Default)]
pub struct BlueCoadd {
    nblue: usize,
    samples: VecDeque<BlueSample>,
}

impl BlueCoadd {
    pub fn new(nblue: usize) -> Self {
        Self {
            nblue,
            samples: VecDeque::with_capacity(nblue.max(1)),
        }
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Record the main-channel timing of the latest frame and return the
    /// blue-channel timing.
    ///
    /// `bad_blue` marks frames with no valid blue data; their main-channel
    /// values are passed straight through.
    pub fn update(
        &mut self,
        ut: DateTime<Utc>,
        expose: f64,
        reliable: bool,
        bad_blue: bool,
    ) -> BlueTiming {
        let main = BlueTiming {
            ut,
            exposure: expose,
            reliable,
        };
        if self.nblue <= 1 {
            return main;
        }

        self.samples.push_front(BlueSample {
            ut,
            expose,
            reliable,
        });

        let result = if bad_blue {
            main
        } else {
            let ncont = self.nblue.min(self.samples.len());
            let newest = self.samples[0];
            let oldest = self.samples[ncont - 1];
            let end = add_seconds(newest.ut, newest.expose / 2.0);
            let mut start = add_seconds(oldest.ut, -oldest.expose / 2.0);
            let mut exposure = seconds_between(end, start);
            let reliable = if ncont < self.nblue {
                // Not enough frames stored yet; scale up to the full co-add.
                exposure *= self.nblue as f64 / ncont as f64;
                start = add_seconds(end, -exposure);
                false
            } else {
                newest.reliable && oldest.reliable
            };
            BlueTiming {
                ut: add_seconds(start, exposure / 2.0),
                exposure,
                reliable,
            }
        };

        self.samples.truncate(self.nblue);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timing::gps::unix;

    #[test]
    fn single_blue_passes_through() {
        let mut blue = BlueCoadd::new(1);
        let t = unix(1_000_000);
        let out = blue.update(t, 2.0, true, false);
        assert_eq!(out.ut, t);
        assert_eq!(out.exposure, 2.0);
        assert!(blue.is_empty());
    }

    #[test]
    fn full_coadd_spans_stored_frames() {
        let mut blue = BlueCoadd::new(3);
        let t0 = unix(1_000_000);
        blue.update(t0, 1.0, true, true);
        blue.update(add_seconds(t0, 1.0), 1.0, true, true);
        let out = blue.update(add_seconds(t0, 2.0), 1.0, true, false);
        assert!((out.exposure - 3.0).abs() < 1e-9);
        assert!((seconds_between(out.ut, t0) - 1.0).abs() < 1e-9);
        assert!(out.reliable);
        assert_eq!(blue.len(), 3);
    }

    #[test]
    fn short_history_scales_exposure() {
        let mut blue = BlueCoadd::new(4);
        let t0 = unix(1_000_000);
        let out = blue.update(t0, 1.0, true, false);
        assert!((out.exposure - 4.0).abs() < 1e-9);
        assert!(!out.reliable);
        // End of the exposure is still the end of the current frame.
        assert!((seconds_between(out.ut, t0) + 1.5).abs() < 1e-9);
    }
}
