/// Smallest change in overall progress worth reporting.
pub const PROGRESS_EPSILON: f64 = 0.001;

/// Scales the progress of the current sub-job onto the whole batch and
/// drops updates too small to be worth relaying.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressReporter {
    last: f64,
    epsilon: f64,
    sub_jobs: usize,
    current: usize,
}

impl ProgressReporter {
    pub fn new(sub_jobs: usize) -> Self {
        Self::with_epsilon(sub_jobs, PROGRESS_EPSILON)
    }

    pub fn with_epsilon(sub_jobs: usize, epsilon: f64) -> Self {
        Self {
            last: 0.,
            epsilon,
            sub_jobs: sub_jobs.max(1),
            current: 0,
        }
    }

    pub fn begin(&mut self, index: usize) {
        self.current = index.min(self.sub_jobs - 1);
    }

    pub fn last(&self) -> f64 {
        self.last
    }

    /// Overall fraction `(fraction + index) / sub_jobs`, returned only when it
    /// grew by more than epsilon since the last returned value.
    pub fn update(&mut self, fraction: f64) -> Option<f64> {
        let fraction = if fraction.is_nan() {
            0.
        } else {
            fraction.clamp(0., 1.)
        };
        let total = (fraction + self.current as f64) / self.sub_jobs as f64;
        if total - self.last > self.epsilon {
            self.last = total;
            Some(total)
        } else {
            None
        }
    }

    pub fn finish(&mut self) -> Option<f64> {
        if self.last < 1. {
            self.last = 1.;
            Some(1.)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_steps_are_dropped() {
        let mut reporter = ProgressReporter::new(1);
        assert_eq!(reporter.update(0.0005), None);
        assert_eq!(reporter.update(0.002), Some(0.002));
        assert_eq!(reporter.update(0.0025), None);
        assert_eq!(reporter.update(0.5), Some(0.5));
    }

    #[test]
    fn progress_is_scaled_over_sub_jobs() {
        let mut reporter = ProgressReporter::new(4);
        assert_eq!(reporter.update(0.5), Some(0.125));
        reporter.begin(2);
        assert_eq!(reporter.update(0.0), Some(0.5));
        assert_eq!(reporter.update(1.0), Some(0.75));
        reporter.begin(3);
        assert_eq!(reporter.update(1.0), Some(1.0));
        assert_eq!(reporter.finish(), None);
    }

    #[test]
    fn never_goes_backwards() {
        let mut reporter = ProgressReporter::new(2);
        reporter.begin(1);
        assert_eq!(reporter.update(0.4), Some(0.7));
        reporter.begin(0);
        assert_eq!(reporter.update(0.9), None);
        assert_eq!(reporter.update(f64::NAN), None);
        assert_eq!(reporter.last(), 0.7);
        assert_eq!(reporter.finish(), Some(1.));
    }
}
