//! Incremental statistics: plain mean accumulators and confidence-interval
//! mean estimators with Student-t based sample-size detection.

use log::warn;
use statrs::distribution::{ContinuousCDF, Normal, StudentsT};

/// Incremental mean/variance accumulator (Welford update).
///
/// Used for within-replication averages such as the powered-on node count
/// per interval.
#[derive(Debug, Clone)]
pub struct MeanEstimator {
    name: String,
    count: usize,
    mean: f64,
    m2: f64,
}

impl MeanEstimator {
    pub fn new() -> Self {
        Self {
            name: "Unnamed".to_owned(),
            count: 0,
            mean: 0.,
            m2: 0.,
        }
    }

    pub fn with_name(name: &str) -> Self {
        let mut estimator = Self::new();
        estimator.name = name.to_owned();
        estimator
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn collect(&mut self, obs: f64) {
        self.count += 1;
        let delta = obs - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (obs - self.mean);
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn estimate(&self) -> f64 {
        self.mean
    }

    /// Unbiased sample variance.
    pub fn variance(&self) -> f64 {
        if self.count > 1 {
            self.m2 / (self.count - 1) as f64
        } else {
            f64::INFINITY
        }
    }

    pub fn standard_deviation(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn reset(&mut self) {
        self.count = 0;
        self.mean = 0.;
        self.m2 = 0.;
    }
}

impl Default for MeanEstimator {
    fn default() -> Self {
        Self::new()
    }
}

/// Mean estimator with confidence-interval driven sample-size control.
///
/// Each collected observation updates the running mean/variance and then
/// re-detects the sample size required to reach the target relative
/// precision of the confidence-interval half-width, following the procedure
/// of Banks et al., "Discrete-Event System Simulation", chapter 11: an
/// initial estimate from the Normal quantile, then fixed-point iteration
/// with the Student-t quantile. `done` becomes sticky-true as soon as the
/// collected sample count covers the detected target; if the target cannot
/// be detected below `max_sample_size` the estimator flags `aborted` and
/// ignores further observations.
#[derive(Debug, Clone)]
pub struct CiMeanEstimator {
    ci_level: f64,
    target_rel_prec: f64,
    n_min: usize,
    n_max: usize,
    name: String,
    stat: MeanEstimator,
    n_target: usize,
    n_detected: bool,
    n_aborted: bool,
    n_first_call: bool,
    unstable: bool,
    done: bool,
}

impl CiMeanEstimator {
    pub const DEFAULT_CI_LEVEL: f64 = 0.95;
    pub const DEFAULT_RELATIVE_PRECISION: f64 = 0.04;
    pub const DEFAULT_MIN_SAMPLE_SIZE: usize = 2;
    pub const DEFAULT_MAX_SAMPLE_SIZE: usize = usize::MAX;

    /// Creates an estimator with the given confidence level and target
    /// relative precision.
    ///
    /// Panics unless `2 <= min_sample_size <= max_sample_size`.
    pub fn new(confidence_level: f64, relative_precision: f64) -> Self {
        Self::with_sample_sizes(
            confidence_level,
            relative_precision,
            Self::DEFAULT_MIN_SAMPLE_SIZE,
            Self::DEFAULT_MAX_SAMPLE_SIZE,
        )
    }

    pub fn with_sample_sizes(
        confidence_level: f64,
        relative_precision: f64,
        min_sample_size: usize,
        max_sample_size: usize,
    ) -> Self {
        assert!(min_sample_size >= 2, "Min sample size must be >= 2");
        assert!(
            min_sample_size <= max_sample_size,
            "Min sample size must be <= max sample size"
        );
        Self {
            ci_level: confidence_level,
            target_rel_prec: relative_precision,
            n_min: min_sample_size,
            n_max: max_sample_size,
            name: "Unnamed".to_owned(),
            stat: MeanEstimator::new(),
            n_target: usize::MAX,
            n_detected: false,
            n_aborted: false,
            n_first_call: true,
            unstable: false,
            done: false,
        }
    }

    pub fn set_name(&mut self, name: &str) {
        self.name = name.to_owned();
        self.stat = MeanEstimator::with_name(name);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.stat.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stat.is_empty()
    }

    /// The sample size detected as needed to reach the target precision.
    pub fn target_size(&self) -> usize {
        self.n_target
    }

    pub fn estimate(&self) -> f64 {
        self.stat.estimate()
    }

    pub fn variance(&self) -> f64 {
        self.stat.variance()
    }

    pub fn standard_deviation(&self) -> f64 {
        self.stat.standard_deviation()
    }

    /// Half-width of the confidence interval: `t_{n-1,(1+level)/2} * s / sqrt(n)`.
    pub fn half_width(&self) -> f64 {
        let n = self.len();
        if n > 1 {
            let t_dist = StudentsT::new(0., 1., (n - 1) as f64).unwrap();
            let t = t_dist.inverse_cdf((1. + self.ci_level) * 0.5);
            t * self.standard_deviation() / (n as f64).sqrt()
        } else {
            f64::INFINITY
        }
    }

    pub fn target_relative_precision(&self) -> f64 {
        self.target_rel_prec
    }

    pub fn relative_precision(&self) -> f64 {
        if self.estimate() != 0. && self.len() > 1 {
            self.half_width() / self.estimate().abs()
        } else {
            f64::INFINITY
        }
    }

    pub fn lower(&self) -> f64 {
        self.estimate() - self.half_width()
    }

    pub fn upper(&self) -> f64 {
        self.estimate() + self.half_width()
    }

    pub fn done(&self) -> bool {
        self.done
    }

    pub fn unstable(&self) -> bool {
        self.unstable
    }

    pub fn aborted(&self) -> bool {
        self.n_aborted
    }

    /// Whether a target sample size has been detected yet.
    pub fn detected(&self) -> bool {
        self.n_detected
    }

    pub fn collect(&mut self, obs: f64) {
        if self.n_aborted {
            return;
        }

        self.stat.collect(obs);
        self.check_precision();
    }

    pub fn reset(&mut self) {
        self.stat.reset();
        self.n_aborted = false;
        self.n_detected = false;
        self.n_first_call = true;
        self.unstable = false;
        self.done = false;
        self.n_target = usize::MAX;
    }

    fn check_precision(&mut self) {
        let size = self.len();

        if size < self.n_min {
            self.n_detected = false;
            return;
        }
        if size >= self.n_max {
            self.n_aborted = true;
            return;
        }
        if self.target_rel_prec.is_infinite() {
            self.n_target = size;
            self.n_detected = true;
            self.done = true;
            return;
        }

        let mean = self.estimate();
        let sd = self.standard_deviation();

        if sd < 0. || sd.is_infinite() || sd.is_nan() {
            warn!("({}) Standard deviation is negative or not finite", self.name);
            self.n_detected = false;
            return;
        }

        let half_alpha = (1. - self.ci_level) * 0.5;

        let mut n = size;

        // Initial sample-size estimate from the Normal quantile.
        if self.n_first_call {
            self.n_first_call = false;

            let norm = Normal::new(0., 1.).unwrap();
            let z = norm.inverse_cdf(half_alpha);
            let n0 = (z * sd / (self.target_rel_prec * mean)).powi(2);
            n = if n0.is_finite() { n0 as usize } else { self.n_max };
            if n < self.n_min {
                n = self.n_min;
            }
        }

        // Refine with the Student-t quantile until the fixed point.
        loop {
            let t_dist = StudentsT::new(0., 1., (n - 1) as f64).unwrap();
            let t = t_dist.inverse_cdf(half_alpha);
            let n_want = (t * sd / (self.target_rel_prec * mean)).powi(2);

            if !n_want.is_finite() {
                n = self.n_max;
                break;
            }
            if (n as f64) < n_want && n < self.n_max {
                n += 1;
            } else {
                break;
            }
        }

        if n <= self.n_max {
            if n <= size {
                self.done = true;
            }
            self.n_target = n;
            self.n_detected = true;
        } else {
            self.n_target = self.n_max;
            self.n_detected = false;
            self.n_aborted = true;
        }
    }
}
