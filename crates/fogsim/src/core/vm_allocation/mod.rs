//! VM placement solvers.
//!
//! Two single-slot strategies share one contract: the profit-maximizing
//! integer program ([`optimal::OptimalVmAllocationSolver`]) and the
//! Hungarian-assignment heuristic ([`matching::MatchingVmAllocationSolver`]).
//! The multi-slot oracle ([`optimal::OptimalMultislotVmAllocationSolver`])
//! extends the integer program with a slot dimension and is used once per
//! replication as an upper-bound benchmark.

pub mod matching;
pub mod optimal;

use std::collections::{BTreeMap, BTreeSet};

use log::warn;

use crate::core::common::VmAllocationPolicy;

/// Tolerance on the deviation of relaxed integer variables from their rounding.
pub const INTEGRALITY_TOLERANCE: f64 = 1e-5;

/// Per-node allocations: for each fog node, a map from service to the VM
/// category and the number of VMs of that category allocated on the node.
pub type FnVmAllocations = Vec<BTreeMap<usize, (usize, usize)>>;

/// Per-service minimum VM counts by VM category; `None` marks an infeasible
/// (service, VM category) pair that no number of VMs can satisfy.
pub type MinNumVms = Vec<Vec<Option<usize>>>;

/// Solution of the single-slot VM placement problem.
///
/// Monetary fields are totals over the interval; `profit` equals
/// `revenue - cost` and matches `objective_value` up to the solver gap.
#[derive(Debug, Clone)]
pub struct VmAllocation {
    pub solved: bool,
    pub optimal: bool,
    pub objective_value: f64,
    pub revenue: f64,
    pub cost: f64,
    pub profit: f64,
    pub fn_vm_allocations: FnVmAllocations,
    pub fn_power_states: Vec<bool>,
    pub fn_cpu_allocations: Vec<f64>,
}

impl VmAllocation {
    /// An unsolved (infeasible) placeholder solution.
    pub fn unsolved(num_fns: usize) -> Self {
        Self {
            solved: false,
            optimal: false,
            objective_value: f64::NAN,
            revenue: f64::NAN,
            cost: f64::NAN,
            profit: f64::NAN,
            fn_vm_allocations: vec![BTreeMap::new(); num_fns],
            fn_power_states: vec![false; num_fns],
            fn_cpu_allocations: vec![0.; num_fns],
        }
    }

    /// Number of powered-on fog nodes.
    pub fn num_powered_on(&self) -> usize {
        self.fn_power_states.iter().filter(|&&on| on).count()
    }

    /// Total VMs allocated to `svc` and their category, across all nodes.
    pub fn svc_allocation(&self, svc: usize) -> (usize, usize) {
        let mut vm_cat = 0;
        let mut num_vms = 0;
        for allocs in &self.fn_vm_allocations {
            if let Some(&(cat, n)) = allocs.get(&svc) {
                vm_cat = cat;
                num_vms += n;
            }
        }
        (vm_cat, num_vms)
    }
}

/// Solution of the multi-slot VM placement problem; one entry per slot in
/// each per-slot container.
#[derive(Debug, Clone)]
pub struct MultislotVmAllocation {
    pub solved: bool,
    pub optimal: bool,
    pub objective_value: f64,
    pub revenue: f64,
    pub cost: f64,
    pub profit: f64,
    pub fn_vm_allocations: Vec<FnVmAllocations>,
    pub fn_power_states: Vec<Vec<bool>>,
    pub fn_cpu_allocations: Vec<Vec<f64>>,
}

impl MultislotVmAllocation {
    pub fn unsolved() -> Self {
        Self {
            solved: false,
            optimal: false,
            objective_value: f64::NAN,
            revenue: f64::NAN,
            cost: f64::NAN,
            profit: f64::NAN,
            fn_vm_allocations: Vec::new(),
            fn_power_states: Vec::new(),
            fn_cpu_allocations: Vec::new(),
        }
    }

    /// Number of powered-on fog nodes in the given slot.
    pub fn num_powered_on(&self, slot: usize) -> usize {
        self.fn_power_states[slot].iter().filter(|&&on| on).count()
    }
}

/// Inputs of one single-slot placement call.
pub struct VmAllocationProblem<'a> {
    /// Category of every fog node.
    pub fn_categories: &'a [usize],
    /// Power state of every fog node before this interval.
    pub fn_power_states: &'a [bool],
    /// Allocations in place before this interval.
    pub fn_vm_allocations: &'a FnVmAllocations,
    /// If present, the exact set of fog nodes that must be powered on.
    pub fixed_fns: Option<&'a BTreeSet<usize>>,
    /// Idle power draw by fog node category.
    pub fn_cat_min_powers: &'a [f64],
    /// Full-load power draw by fog node category.
    pub fn_cat_max_powers: &'a [f64],
    /// CPU share of one VM by (VM category, fog node category).
    pub vm_cat_cpu_shares: &'a [Vec<f64>],
    /// Cost of allocating one VM by VM category.
    pub vm_cat_alloc_costs: &'a [f64],
    /// Category of every service.
    pub svc_categories: &'a [usize],
    /// Minimum VMs needed per (service, VM category); `None` = infeasible.
    pub svc_vm_cat_min_num_vms: &'a MinNumVms,
    /// Revenue of one VM per unit of time, by service category.
    pub fp_svc_cat_revenues: &'a [f64],
    /// QoS violation penalty, by service category.
    pub fp_svc_cat_penalties: &'a [f64],
    /// Electricity cost per energy unit.
    pub fp_electricity_cost: f64,
    /// Cost of powering off a node, by fog node category.
    pub fp_fn_cat_asleep_costs: &'a [f64],
    /// Cost of powering on a node, by fog node category.
    pub fp_fn_cat_awake_costs: &'a [f64],
    /// Interval length.
    pub deltat: f64,
}

/// Inputs of one multi-slot placement call; demand is per
/// (slot, service, VM category) and the chained switching/reallocation costs
/// use `fn_power_states` / `fn_vm_allocations` as the slot-0 predecessors.
pub struct MultislotVmAllocationProblem<'a> {
    pub fn_categories: &'a [usize],
    pub fn_power_states: &'a [bool],
    pub fn_vm_allocations: &'a FnVmAllocations,
    pub fn_cat_min_powers: &'a [f64],
    pub fn_cat_max_powers: &'a [f64],
    pub vm_cat_cpu_shares: &'a [Vec<f64>],
    pub vm_cat_alloc_costs: &'a [f64],
    pub svc_categories: &'a [usize],
    pub slot_svc_vm_cat_min_num_vms: &'a [MinNumVms],
    pub fp_svc_cat_revenues: &'a [f64],
    pub fp_svc_cat_penalties: &'a [f64],
    pub fp_electricity_cost: f64,
    pub fp_fn_cat_asleep_costs: &'a [f64],
    pub fp_fn_cat_awake_costs: &'a [f64],
    pub deltat: f64,
}

/// Single-slot placement strategy.
pub trait VmAllocationSolver {
    fn solve(&self, problem: &VmAllocationProblem) -> VmAllocation;
}

/// Multi-slot (oracle) placement strategy.
pub trait MultislotVmAllocationSolver {
    fn solve(&self, problem: &MultislotVmAllocationProblem) -> MultislotVmAllocation;
}

/// Builds the single-slot solver for the given policy.
pub fn make_solver(
    policy: VmAllocationPolicy,
    relative_tolerance: f64,
    time_limit: f64,
) -> Box<dyn VmAllocationSolver> {
    match policy {
        VmAllocationPolicy::Optimal => Box::new(optimal::OptimalVmAllocationSolver::new(
            relative_tolerance,
            time_limit,
        )),
        VmAllocationPolicy::Bahreini2017Match => {
            Box::new(matching::MatchingVmAllocationSolver::new())
        }
        VmAllocationPolicy::Bahreini2017MatchAlt => {
            Box::new(matching::MatchingVmAllocationSolver::new_alt())
        }
    }
}

/// Builds the multi-slot oracle solver.
///
/// The oracle benchmark is always the optimal formulation, also when the
/// per-slot policy is a heuristic.
pub fn make_multislot_solver(
    relative_tolerance: f64,
    time_limit: f64,
) -> Box<dyn MultislotVmAllocationSolver> {
    Box::new(optimal::OptimalMultislotVmAllocationSolver::new(
        relative_tolerance,
        time_limit,
    ))
}

/// Verifies the placement invariants of an accepted solution:
/// CPU capacity within `1 + eps` per node, no VMs on powered-off nodes,
/// a single VM category per service, no allocation beyond the required
/// minimum, and profit consistent with `revenue - cost`.
pub fn check_vm_allocation(
    solution: &VmAllocation,
    problem: &VmAllocationProblem,
    eps: f64,
) -> bool {
    let mut ok = true;

    for (fn_idx, &share) in solution.fn_cpu_allocations.iter().enumerate() {
        if share > 1. + eps {
            warn!("CPU share overflow (FN: {}, share: {})", fn_idx, share);
            ok = false;
        }
    }
    for (fn_idx, allocs) in solution.fn_vm_allocations.iter().enumerate() {
        if !allocs.is_empty() && !solution.fn_power_states[fn_idx] {
            warn!("VMs assigned to a powered-off FN (FN: {})", fn_idx);
            ok = false;
        }
    }

    let num_svcs = problem.svc_categories.len();
    for svc in 0..num_svcs {
        let mut vm_cat: Option<usize> = None;
        let mut total = 0;
        for allocs in &solution.fn_vm_allocations {
            if let Some(&(cat, n)) = allocs.get(&svc) {
                if let Some(prev) = vm_cat {
                    if prev != cat {
                        warn!("Service {} uses multiple VM categories", svc);
                        ok = false;
                    }
                }
                vm_cat = Some(cat);
                total += n;
            }
        }
        if let Some(cat) = vm_cat {
            match problem.svc_vm_cat_min_num_vms[svc][cat] {
                Some(need) if total <= need => {}
                Some(need) => {
                    warn!(
                        "Service {} over-allocated ({} VMs, required {})",
                        svc, total, need
                    );
                    ok = false;
                }
                None => {
                    warn!("Service {} allocated to an infeasible VM category {}", svc, cat);
                    ok = false;
                }
            }
        }
    }

    if !profit_is_consistent(solution.profit, solution.revenue, solution.cost, eps) {
        warn!(
            "Solution profit {} deviates from revenue - cost = {}",
            solution.profit,
            solution.revenue - solution.cost
        );
        ok = false;
    }

    ok
}

/// Multi-slot variant of [`check_vm_allocation`].
pub fn check_multislot_vm_allocation(solution: &MultislotVmAllocation, eps: f64) -> bool {
    let mut ok = true;

    for (slot, shares) in solution.fn_cpu_allocations.iter().enumerate() {
        for (fn_idx, &share) in shares.iter().enumerate() {
            if share > 1. + eps {
                warn!(
                    "CPU share overflow (slot: {}, FN: {}, share: {})",
                    slot, fn_idx, share
                );
                ok = false;
            }
        }
    }
    for (slot, slot_allocs) in solution.fn_vm_allocations.iter().enumerate() {
        for (fn_idx, allocs) in slot_allocs.iter().enumerate() {
            if !allocs.is_empty() && !solution.fn_power_states[slot][fn_idx] {
                warn!(
                    "VMs assigned to a powered-off FN (slot: {}, FN: {})",
                    slot, fn_idx
                );
                ok = false;
            }
        }
    }

    if !profit_is_consistent(solution.profit, solution.revenue, solution.cost, eps) {
        warn!(
            "Solution profit {} deviates from revenue - cost = {}",
            solution.profit,
            solution.revenue - solution.cost
        );
        ok = false;
    }

    ok
}

fn profit_is_consistent(profit: f64, revenue: f64, cost: f64, eps: f64) -> bool {
    (profit - (revenue - cost)).abs() <= eps.max(f64::EPSILON) * profit.abs().max(1.)
}

/// Rounds `x` to `digits` decimal digits.
///
/// The reported CPU shares are rounded to `log10(1/gap)` digits so that
/// shares inflated by the solver gap collapse back onto the capacity bound.
pub fn roundp(x: f64, digits: f64) -> f64 {
    if !digits.is_finite() {
        return x;
    }
    let factor = 10f64.powf(digits);
    (x * factor).round() / factor
}
