//! Arrival-rate estimators.
//!
//! The fog provider observes one aggregate request arrival rate per service
//! and interval; an estimator turns the collected observations into the rate
//! the realized workload is scored against. All estimators are stateful and
//! are reset by the experiment driver at the end of each optimization
//! interval.

use rand::Rng;
use rand_distr::{Beta, Distribution, Normal};

use crate::core::common::{ArrivalRateEstimation, SharedRng};

/// Capability set of an arrival-rate estimator.
pub trait ArrivalRateEstimator {
    /// Feeds an observed arrival rate.
    fn collect(&mut self, rate: f64);

    /// Produces the estimated arrival rate from the collected observations.
    fn estimate(&mut self) -> f64;

    /// Clears the collected state.
    fn reset(&mut self);
}

/// Running maximum of the collected rates.
pub struct MaxEstimator {
    max_rate: f64,
}

impl MaxEstimator {
    pub fn new() -> Self {
        Self { max_rate: 0. }
    }
}

impl Default for MaxEstimator {
    fn default() -> Self {
        Self::new()
    }
}

impl ArrivalRateEstimator for MaxEstimator {
    fn collect(&mut self, rate: f64) {
        if rate > self.max_rate {
            self.max_rate = rate;
        }
    }

    fn estimate(&mut self) -> f64 {
        self.max_rate
    }

    fn reset(&mut self) {
        self.max_rate = 0.;
    }
}

/// Most recently observed rate.
pub struct MostRecentlyObservedEstimator {
    mro: f64,
}

impl MostRecentlyObservedEstimator {
    pub fn new() -> Self {
        Self { mro: 0. }
    }
}

impl Default for MostRecentlyObservedEstimator {
    fn default() -> Self {
        Self::new()
    }
}

impl ArrivalRateEstimator for MostRecentlyObservedEstimator {
    fn collect(&mut self, rate: f64) {
        self.mro = rate;
    }

    fn estimate(&mut self) -> f64 {
        self.mro
    }

    fn reset(&mut self) {
        self.mro = 0.;
    }
}

/// Exponentially weighted moving average of the collected rates.
///
/// The first collected sample initializes the state.
pub struct EwmaEstimator {
    smooth_factor: f64,
    ewma: f64,
    first: bool,
}

impl EwmaEstimator {
    pub const DEFAULT_SMOOTHING_FACTOR: f64 = 0.95;

    pub fn new(smooth_factor: f64) -> Self {
        Self {
            smooth_factor,
            ewma: 0.,
            first: true,
        }
    }
}

impl Default for EwmaEstimator {
    fn default() -> Self {
        Self::new(Self::DEFAULT_SMOOTHING_FACTOR)
    }
}

impl ArrivalRateEstimator for EwmaEstimator {
    fn collect(&mut self, rate: f64) {
        if self.first {
            self.ewma = rate;
            self.first = false;
        } else {
            self.ewma = self.smooth_factor * rate + (1. - self.smooth_factor) * self.ewma;
        }
    }

    fn estimate(&mut self) -> f64 {
        self.ewma
    }

    fn reset(&mut self) {
        self.ewma = 0.;
        self.first = true;
    }
}

/// Running maximum perturbed by multiplicative Gaussian white noise:
/// `max(0, max_rate * (1 + Normal(mu, sd)))`.
pub struct PerturbedMaxEstimator {
    base: MaxEstimator,
    rng: SharedRng,
    white_noise: Normal<f64>,
}

impl PerturbedMaxEstimator {
    pub const DEFAULT_MEAN: f64 = 0.;
    pub const DEFAULT_STANDARD_DEVIATION: f64 = 1.;

    pub fn new(rng: SharedRng, mu: f64, sd: f64) -> Self {
        Self {
            base: MaxEstimator::new(),
            rng,
            white_noise: Normal::new(mu, sd).expect("invalid white noise parameters"),
        }
    }
}

impl ArrivalRateEstimator for PerturbedMaxEstimator {
    fn collect(&mut self, rate: f64) {
        self.base.collect(rate);
    }

    fn estimate(&mut self) -> f64 {
        let max_rate = self.base.estimate();
        let err = self.white_noise.sample(&mut *self.rng.borrow_mut());
        (max_rate * (1. + err)).max(0.)
    }

    fn reset(&mut self) {
        self.base.reset();
    }
}

/// Most recently observed rate perturbed by multiplicative Gaussian white noise.
pub struct PerturbedMostRecentlyObservedEstimator {
    base: MostRecentlyObservedEstimator,
    rng: SharedRng,
    white_noise: Normal<f64>,
}

impl PerturbedMostRecentlyObservedEstimator {
    pub fn new(rng: SharedRng, mu: f64, sd: f64) -> Self {
        Self {
            base: MostRecentlyObservedEstimator::new(),
            rng,
            white_noise: Normal::new(mu, sd).expect("invalid white noise parameters"),
        }
    }
}

impl ArrivalRateEstimator for PerturbedMostRecentlyObservedEstimator {
    fn collect(&mut self, rate: f64) {
        self.base.collect(rate);
    }

    fn estimate(&mut self) -> f64 {
        let mro_rate = self.base.estimate();
        let err = self.white_noise.sample(&mut *self.rng.borrow_mut());
        (mro_rate * (1. + err)).max(0.)
    }

    fn reset(&mut self) {
        self.base.reset();
    }
}

/// Uniform draw over `[0, max(collected)]`.
pub struct UniformMaxEstimator {
    base: MaxEstimator,
    rng: SharedRng,
}

impl UniformMaxEstimator {
    pub fn new(rng: SharedRng) -> Self {
        Self {
            base: MaxEstimator::new(),
            rng,
        }
    }
}

impl ArrivalRateEstimator for UniformMaxEstimator {
    fn collect(&mut self, rate: f64) {
        self.base.collect(rate);
    }

    fn estimate(&mut self) -> f64 {
        let max_rate = self.base.estimate();
        if max_rate > 0. {
            self.rng.borrow_mut().gen_range(0.0..max_rate)
        } else {
            0.
        }
    }

    fn reset(&mut self) {
        self.base.reset();
    }
}

/// Uniform draw over `[min(collected), max(collected)]`.
pub struct UniformMinMaxEstimator {
    rng: SharedRng,
    min_rate: f64,
    max_rate: f64,
}

impl UniformMinMaxEstimator {
    pub fn new(rng: SharedRng) -> Self {
        Self {
            rng,
            min_rate: f64::INFINITY,
            max_rate: 0.,
        }
    }
}

impl ArrivalRateEstimator for UniformMinMaxEstimator {
    fn collect(&mut self, rate: f64) {
        if rate > self.max_rate {
            self.max_rate = rate;
        }
        if rate < self.min_rate {
            self.min_rate = rate;
        }
    }

    fn estimate(&mut self) -> f64 {
        let lo = self.min_rate.min(self.max_rate);
        if lo < self.max_rate {
            self.rng.borrow_mut().gen_range(lo..self.max_rate)
        } else {
            self.max_rate
        }
    }

    fn reset(&mut self) {
        self.min_rate = f64::INFINITY;
        self.max_rate = 0.;
    }
}

/// Draw from a Beta distribution scaled to `[lower, upper]`.
///
/// Observations are ignored.
pub struct BetaEstimator {
    rng: SharedRng,
    beta: Beta<f64>,
    lower: f64,
    upper: f64,
}

impl BetaEstimator {
    pub const DEFAULT_SHAPE1: f64 = 1.;
    pub const DEFAULT_SHAPE2: f64 = 1.;
    pub const DEFAULT_LOWER_BOUND: f64 = 0.;
    pub const DEFAULT_UPPER_BOUND: f64 = 1.;

    pub fn new(rng: SharedRng, shape1: f64, shape2: f64, lower: f64, upper: f64) -> Self {
        Self {
            rng,
            beta: Beta::new(shape1, shape2).expect("invalid beta shape parameters"),
            lower,
            upper,
        }
    }
}

impl ArrivalRateEstimator for BetaEstimator {
    fn collect(&mut self, _rate: f64) {}

    fn estimate(&mut self) -> f64 {
        let x = self.beta.sample(&mut *self.rng.borrow_mut());
        self.lower + (self.upper - self.lower) * x
    }

    fn reset(&mut self) {}
}

/// Builds an estimator from the scenario enumeration and its parameter vector.
///
/// Parameter positions follow the scenario format: `beta` takes
/// `[shape1 shape2 lower upper]`, `ewma` takes `[alpha]`, the perturbed
/// variants take `[mean sd]`; missing parameters fall back to the variant
/// defaults.
pub fn make_estimator(
    kind: ArrivalRateEstimation,
    params: &[f64],
    rng: SharedRng,
) -> Box<dyn ArrivalRateEstimator> {
    match kind {
        ArrivalRateEstimation::Beta => {
            if params.len() >= 4 {
                Box::new(BetaEstimator::new(rng, params[0], params[1], params[2], params[3]))
            } else {
                Box::new(BetaEstimator::new(
                    rng,
                    BetaEstimator::DEFAULT_SHAPE1,
                    BetaEstimator::DEFAULT_SHAPE2,
                    BetaEstimator::DEFAULT_LOWER_BOUND,
                    BetaEstimator::DEFAULT_UPPER_BOUND,
                ))
            }
        }
        ArrivalRateEstimation::Ewma => {
            let alpha = params.first().copied().unwrap_or(EwmaEstimator::DEFAULT_SMOOTHING_FACTOR);
            Box::new(EwmaEstimator::new(alpha))
        }
        ArrivalRateEstimation::Max => Box::new(MaxEstimator::new()),
        ArrivalRateEstimation::MostRecentlyObserved => Box::new(MostRecentlyObservedEstimator::new()),
        ArrivalRateEstimation::PerturbedMax => {
            let mu = params.first().copied().unwrap_or(PerturbedMaxEstimator::DEFAULT_MEAN);
            let sd = params
                .get(1)
                .copied()
                .unwrap_or(PerturbedMaxEstimator::DEFAULT_STANDARD_DEVIATION);
            Box::new(PerturbedMaxEstimator::new(rng, mu, sd))
        }
        ArrivalRateEstimation::PerturbedMostRecentlyObserved => {
            let mu = params.first().copied().unwrap_or(PerturbedMaxEstimator::DEFAULT_MEAN);
            let sd = params
                .get(1)
                .copied()
                .unwrap_or(PerturbedMaxEstimator::DEFAULT_STANDARD_DEVIATION);
            Box::new(PerturbedMostRecentlyObservedEstimator::new(rng, mu, sd))
        }
        ArrivalRateEstimation::UniformMax => Box::new(UniformMaxEstimator::new(rng)),
        ArrivalRateEstimation::UniformMinMax => Box::new(UniformMinMaxEstimator::new(rng)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::common::shared_rng;

    #[test]
    fn test_max_estimator() {
        let mut est = MaxEstimator::new();
        est.collect(2.);
        est.collect(5.);
        est.collect(3.);
        assert_eq!(est.estimate(), 5.);
        est.reset();
        assert_eq!(est.estimate(), 0.);
    }

    #[test]
    fn test_mro_estimator() {
        let mut est = MostRecentlyObservedEstimator::new();
        est.collect(2.);
        est.collect(5.);
        est.collect(3.);
        assert_eq!(est.estimate(), 3.);
        est.reset();
        assert_eq!(est.estimate(), 0.);
    }

    #[test]
    fn test_ewma_first_sample_initializes() {
        let mut est = EwmaEstimator::new(0.5);
        est.collect(4.);
        assert_eq!(est.estimate(), 4.);
        est.collect(8.);
        assert_eq!(est.estimate(), 6.);
        est.collect(2.);
        assert_eq!(est.estimate(), 4.);
    }

    #[test]
    fn test_ewma_converges_to_constant_input() {
        let mut est = EwmaEstimator::new(0.5);
        est.collect(10.);
        for _ in 0..60 {
            est.collect(3.);
        }
        assert!((est.estimate() - 3.).abs() < 1e-12);
    }

    #[test]
    fn test_uniform_max_within_bounds() {
        let rng = shared_rng(7);
        let mut est = UniformMaxEstimator::new(rng);
        est.collect(10.);
        for _ in 0..100 {
            let x = est.estimate();
            assert!((0. ..10.).contains(&x));
        }
    }

    #[test]
    fn test_uniform_max_without_observations() {
        let rng = shared_rng(7);
        let mut est = UniformMaxEstimator::new(rng);
        assert_eq!(est.estimate(), 0.);
    }

    #[test]
    fn test_uniform_min_max_within_bounds() {
        let rng = shared_rng(7);
        let mut est = UniformMinMaxEstimator::new(rng);
        est.collect(4.);
        est.collect(8.);
        for _ in 0..100 {
            let x = est.estimate();
            assert!((4. ..8.).contains(&x));
        }
    }

    #[test]
    fn test_beta_ignores_observations_and_respects_bounds() {
        let rng = shared_rng(7);
        let mut est = BetaEstimator::new(rng, 2., 5., 10., 20.);
        est.collect(1000.);
        for _ in 0..100 {
            let x = est.estimate();
            assert!((10. ..=20.).contains(&x));
        }
    }

    #[test]
    fn test_perturbed_estimates_are_nonnegative() {
        let rng = shared_rng(7);
        let mut est = PerturbedMaxEstimator::new(rng, 0., 2.);
        est.collect(1.);
        for _ in 0..200 {
            assert!(est.estimate() >= 0.);
        }
    }

    #[test]
    fn test_factory_dispatch() {
        let rng = shared_rng(7);
        let mut est = make_estimator(ArrivalRateEstimation::Ewma, &[0.5], rng);
        est.collect(4.);
        est.collect(8.);
        assert_eq!(est.estimate(), 6.);
    }

    #[test]
    fn test_deterministic_given_seed() {
        let mut a = UniformMaxEstimator::new(shared_rng(99));
        let mut b = UniformMaxEstimator::new(shared_rng(99));
        a.collect(5.);
        b.collect(5.);
        for _ in 0..10 {
            assert_eq!(a.estimate(), b.estimate());
        }
    }
}
