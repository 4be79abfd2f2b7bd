//! Hungarian-assignment placement heuristic.
//!
//! Implements the matching-based MCAPP-IM heuristic of Bahreini & Grosu
//! (2017), without inter-node communication costs: required VMs become
//! assignment tasks, fog nodes offer hosting slots, and a minimum-cost
//! matching places one VM per slot. The base variant offers one slot per fog
//! node; the `alt` variant packs as many virtual slots per node as its CPU
//! capacity can host.

use std::collections::BTreeSet;

use log::warn;
use pathfinding::matrix::Matrix;
use pathfinding::prelude::kuhn_munkres_min;

use crate::core::power::LinearPowerModel;

use super::optimal::single_slot_financials;
use super::{check_vm_allocation, VmAllocation, VmAllocationProblem, VmAllocationSolver};

/// Cost assigned to forbidden (VM, slot) pairs. Large enough to lose against
/// any real cost, small enough to keep the scaled integer weights far from
/// overflow.
const FORBIDDEN_COST: f64 = 1e9;
/// Fixed-point scale applied to the cost matrix before matching.
const COST_SCALE: f64 = 1e6;

/// Matching-based placement heuristic. Never reports an optimal solution.
pub struct MatchingVmAllocationSolver {
    alt: bool,
}

impl MatchingVmAllocationSolver {
    /// Base variant: one hosting slot per fog node.
    pub fn new() -> Self {
        Self { alt: false }
    }

    /// Alternative variant: as many virtual slots per fog node as its CPU
    /// capacity can host.
    pub fn new_alt() -> Self {
        Self { alt: true }
    }
}

impl Default for MatchingVmAllocationSolver {
    fn default() -> Self {
        Self::new()
    }
}

impl VmAllocationSolver for MatchingVmAllocationSolver {
    fn solve(&self, problem: &VmAllocationProblem) -> VmAllocation {
        let nfns = problem.fn_categories.len();
        let nsvcs = problem.svc_categories.len();
        let nvmcats = problem.vm_cat_alloc_costs.len();

        // One assignment task per required VM, using the VM category that
        // serves each service with the least total CPU across the observed
        // fog node categories.
        let fn_cat_set: BTreeSet<usize> = problem.fn_categories.iter().copied().collect();
        let mut vm_services = Vec::new();
        let mut vm_categories = Vec::new();
        for svc in 0..nsvcs {
            let mut best_tot_cpu_share = f64::INFINITY;
            let mut best_vm_cat = None;
            for &fn_cat in &fn_cat_set {
                for vm_cat in 0..nvmcats {
                    if let Some(need) = problem.svc_vm_cat_min_num_vms[svc][vm_cat] {
                        let tot_cpu_share =
                            problem.vm_cat_cpu_shares[vm_cat][fn_cat] * need as f64;
                        if tot_cpu_share < best_tot_cpu_share {
                            best_tot_cpu_share = tot_cpu_share;
                            best_vm_cat = Some(vm_cat);
                        }
                    }
                }
            }
            let Some(best_vm_cat) = best_vm_cat else {
                // No category can satisfy this service; the penalty is
                // accounted when the financials find it unserved.
                warn!("Service {} has no feasible VM category", svc);
                continue;
            };
            let svc_nvms = problem.svc_vm_cat_min_num_vms[svc][best_vm_cat].unwrap_or(0);
            for _ in 0..svc_nvms {
                vm_services.push(svc);
                vm_categories.push(best_vm_cat);
            }
        }
        let nvms = vm_services.len();

        // Hosting slots offered by the fog nodes.
        let slot_fns = if self.alt {
            self.virtual_slots(problem, &vm_categories)
        } else {
            (0..nfns).collect()
        };
        let nslots = slot_fns.len();

        let mut costs = vec![vec![0.; nslots]; nvms];
        for vm in 0..nvms {
            let vm_cat = vm_categories[vm];
            let svc = vm_services[vm];
            for (slot, &fn_idx) in slot_fns.iter().enumerate() {
                let fn_cat = problem.fn_categories[fn_idx];
                let cpu_share = problem.vm_cat_cpu_shares[vm_cat][fn_cat];

                if problem
                    .fixed_fns
                    .map_or(false, |fixed| !fixed.contains(&fn_idx))
                {
                    costs[vm][slot] = FORBIDDEN_COST;
                    continue;
                }

                // Energy spent to run the VM. The alt variant spreads the
                // idle power over the virtual slots by CPU share; the base
                // variant charges it in full, one slot per node.
                let power_model = LinearPowerModel::new(
                    problem.fn_cat_min_powers[fn_cat],
                    problem.fn_cat_max_powers[fn_cat],
                );
                costs[vm][slot] = if self.alt {
                    (power_model.min_power() * cpu_share
                        + (power_model.max_power() - power_model.min_power()) * cpu_share)
                        * problem.fp_electricity_cost
                } else {
                    power_model.power(cpu_share) * problem.fp_electricity_cost
                };

                // Allocation cost unless the node already hosts VMs of this
                // category for the service.
                let already_there = matches!(
                    problem.fn_vm_allocations[fn_idx].get(&svc),
                    Some(&(cat, _)) if cat == vm_cat
                );
                if !already_there {
                    costs[vm][slot] += problem.vm_cat_alloc_costs[vm_cat] / problem.deltat;
                }

                // Power-on cost for nodes currently off.
                if !problem.fn_power_states[fn_idx] {
                    let awake_share = if self.alt { cpu_share } else { 1. };
                    costs[vm][slot] +=
                        awake_share * problem.fp_fn_cat_awake_costs[fn_cat] / problem.deltat;
                }
            }
        }

        // Minimum-cost matching of VMs onto slots; the matrix is padded
        // square with forbidden columns so that unplaceable VMs simply end
        // up unmatched.
        let assignment = if nvms > 0 && nslots > 0 {
            let width = nvms.max(nslots);
            let rows = costs.iter().map(|row| {
                let mut scaled: Vec<i64> =
                    row.iter().map(|c| (c * COST_SCALE).round() as i64).collect();
                scaled.resize(width, (FORBIDDEN_COST * COST_SCALE) as i64);
                scaled
            });
            let matrix = Matrix::from_rows(rows).unwrap();
            let (_, assignment) = kuhn_munkres_min(&matrix);
            Some(assignment)
        } else {
            None
        };

        let mut solution = VmAllocation::unsolved(nfns);
        solution.solved = true;
        solution.optimal = false;
        solution.objective_value = 0.;
        solution.fn_power_states = problem.fn_power_states.to_vec();

        for vm in 0..nvms {
            let slot = match &assignment {
                Some(assignment) => assignment[vm],
                None => continue,
            };
            if slot >= nslots {
                // Padding column: the VM stays unplaced.
                continue;
            }
            let fn_idx = slot_fns[slot];
            if problem
                .fixed_fns
                .map_or(false, |fixed| !fixed.contains(&fn_idx))
            {
                // Matched onto an excluded node: treated as unplaced.
                continue;
            }

            let svc = vm_services[vm];
            let vm_cat = vm_categories[vm];
            let entry = solution.fn_vm_allocations[fn_idx]
                .entry(svc)
                .or_insert((vm_cat, 0));
            entry.1 += 1;
            solution.fn_power_states[fn_idx] = true;
            solution.objective_value -= costs[vm][slot];
        }

        for fn_idx in 0..nfns {
            if problem
                .fixed_fns
                .map_or(false, |fixed| fixed.contains(&fn_idx))
            {
                // Selected nodes stay powered on regardless of the matching.
                solution.fn_power_states[fn_idx] = true;
            } else if solution.fn_vm_allocations[fn_idx].is_empty() {
                solution.fn_power_states[fn_idx] = false;
            }

            let fn_cat = problem.fn_categories[fn_idx];
            let mut share = 0.;
            for (_, &(vm_cat, n)) in solution.fn_vm_allocations[fn_idx].iter() {
                share += n as f64 * problem.vm_cat_cpu_shares[vm_cat][fn_cat];
            }
            solution.fn_cpu_allocations[fn_idx] = share;
        }

        let (revenue, cost) =
            single_slot_financials(problem, &solution.fn_power_states, &solution.fn_vm_allocations);
        solution.revenue = revenue;
        solution.cost = cost;
        solution.profit = revenue - cost;

        check_vm_allocation(&solution, problem, 1e-9);

        solution
    }
}

impl MatchingVmAllocationSolver {
    /// Builds the virtual hosting slots of the alt variant: the VM task list
    /// is scanned in order and every fog node opens one slot per VM it can
    /// still fit by CPU.
    fn virtual_slots(&self, problem: &VmAllocationProblem, vm_categories: &[usize]) -> Vec<usize> {
        let nfns = problem.fn_categories.len();
        let mut slot_fns = Vec::new();
        let mut cur_vm = 0;
        for fn_idx in 0..nfns {
            let fn_cat = problem.fn_categories[fn_idx];
            let mut tot_cpu_share = 0.;
            while cur_vm < vm_categories.len() {
                let cpu_share = problem.vm_cat_cpu_shares[vm_categories[cur_vm]][fn_cat];
                if tot_cpu_share + cpu_share > 1. {
                    break;
                }
                tot_cpu_share += cpu_share;
                slot_fns.push(fn_idx);
                cur_vm += 1;
            }
        }
        slot_fns
    }
}
