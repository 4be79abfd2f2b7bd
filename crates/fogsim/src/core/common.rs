//! Common definitions shared across the simulator.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;

use rand::SeedableRng;
use rand_pcg::Pcg64;
use serde::Serialize;

/// Random number engine shared by handle between the stochastic components
/// of a run (arrival-rate estimators and the like), so that a single seed
/// reproduces the whole experiment.
pub type SharedRng = Rc<RefCell<Pcg64>>;

/// Creates the master random number engine for a run.
pub fn shared_rng(seed: u64) -> SharedRng {
    Rc::new(RefCell::new(Pcg64::seed_from_u64(seed)))
}

/// Arrival-rate estimation strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ArrivalRateEstimation {
    Beta,
    Ewma,
    Max,
    MostRecentlyObserved,
    PerturbedMax,
    PerturbedMostRecentlyObserved,
    UniformMax,
    UniformMinMax,
}

impl FromStr for ArrivalRateEstimation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "beta" => Ok(Self::Beta),
            "ewma" => Ok(Self::Ewma),
            "max" => Ok(Self::Max),
            "mro" => Ok(Self::MostRecentlyObserved),
            "perturb-max" => Ok(Self::PerturbedMax),
            "perturb-mro" => Ok(Self::PerturbedMostRecentlyObserved),
            "unif-max" => Ok(Self::UniformMax),
            "unif-min-max" => Ok(Self::UniformMinMax),
            _ => Err(format!("unknown arrival rate estimation '{}'", s)),
        }
    }
}

impl fmt::Display for ArrivalRateEstimation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Beta => "beta",
            Self::Ewma => "ewma",
            Self::Max => "max",
            Self::MostRecentlyObserved => "mro",
            Self::PerturbedMax => "perturb-max",
            Self::PerturbedMostRecentlyObserved => "perturb-mro",
            Self::UniformMax => "unif-max",
            Self::UniformMinMax => "unif-min-max",
        };
        write!(f, "{}", s)
    }
}

/// User mobility model categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UserMobilityModelKind {
    Fixed,
    RandomWaypoint,
    Step,
}

impl FromStr for UserMobilityModelKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fixed" => Ok(Self::Fixed),
            "random-waypoint" => Ok(Self::RandomWaypoint),
            "step" => Ok(Self::Step),
            _ => Err(format!("unknown user mobility model '{}'", s)),
        }
    }
}

impl fmt::Display for UserMobilityModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Fixed => "fixed",
            Self::RandomWaypoint => "random-waypoint",
            Self::Step => "step",
        };
        write!(f, "{}", s)
    }
}

/// VM allocation policies (single-slot solver strategies).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum VmAllocationPolicy {
    Optimal,
    Bahreini2017Match,
    Bahreini2017MatchAlt,
}

impl FromStr for VmAllocationPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "optimal" => Ok(Self::Optimal),
            "bahreini2017_match" => Ok(Self::Bahreini2017Match),
            "bahreini2017_match_alt" => Ok(Self::Bahreini2017MatchAlt),
            _ => Err(format!("unknown VM allocation policy '{}'", s)),
        }
    }
}

impl fmt::Display for VmAllocationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Optimal => "optimal",
            Self::Bahreini2017Match => "bahreini2017_match",
            Self::Bahreini2017MatchAlt => "bahreini2017_match_alt",
        };
        write!(f, "{}", s)
    }
}

/// How the interval is re-evaluated under the realized workload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RealWorkloadAllocation {
    /// Re-solve the placement problem from scratch.
    AllocateAll,
    /// Re-solve, but only over the fog nodes powered on by the predicted solution.
    AllocateWithFixedFns,
    /// Keep the predicted placement and only adjust the profit for
    /// under-allocation penalties and unused-VM revenues.
    AllocateNone,
}

impl FromStr for RealWorkloadAllocation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "allocate-all" => Ok(Self::AllocateAll),
            "allocate-with-fixed-fns" => Ok(Self::AllocateWithFixedFns),
            "allocate-none" => Ok(Self::AllocateNone),
            _ => Err(format!("unknown real workload allocation mode '{}'", s)),
        }
    }
}

impl fmt::Display for RealWorkloadAllocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::AllocateAll => "allocate-all",
            Self::AllocateWithFixedFns => "allocate-with-fixed-fns",
            Self::AllocateNone => "allocate-none",
        };
        write!(f, "{}", s)
    }
}
