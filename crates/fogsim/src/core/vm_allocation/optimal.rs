//! Profit-maximizing placement via mixed-integer programming.
//!
//! Decision variables: `x_i` (power on node i), `y_{i,j,v}` (VMs of category
//! v allocated on node i for service j), `z_{j,v}` (service j deploys with
//! category v) and `w_{j,v}` (service j fully served with category v).
//! The objective maximizes interval profit: VM revenues minus electricity,
//! switching, (re)allocation and QoS penalty costs. The multi-slot variant
//! adds a slot dimension and chains switching and reallocation costs across
//! consecutive slots.

use std::time::Instant;

use good_lp::solvers::highs::highs;
use good_lp::{
    constraint, variable, variables, Expression, IntoAffineExpression, ResolutionError, Solution,
    SolverModel, Variable,
};
use log::warn;

use crate::core::power::LinearPowerModel;

use super::{
    check_multislot_vm_allocation, check_vm_allocation, roundp, FnVmAllocations, MinNumVms,
    MultislotVmAllocation, MultislotVmAllocationProblem, MultislotVmAllocationSolver, VmAllocation,
    VmAllocationProblem, VmAllocationSolver, INTEGRALITY_TOLERANCE,
};

/// Single-slot MIP placement solver.
pub struct OptimalVmAllocationSolver {
    relative_tolerance: f64,
    time_limit: f64,
}

impl OptimalVmAllocationSolver {
    /// `relative_tolerance` is the MIP gap under which a solution counts as
    /// optimal (0 disables), `time_limit` the wall-clock budget in seconds
    /// (non-positive disables).
    pub fn new(relative_tolerance: f64, time_limit: f64) -> Self {
        Self {
            relative_tolerance,
            time_limit,
        }
    }
}

impl VmAllocationSolver for OptimalVmAllocationSolver {
    fn solve(&self, problem: &VmAllocationProblem) -> VmAllocation {
        let nfns = problem.fn_categories.len();
        let nsvcs = problem.svc_categories.len();
        let nvmcats = problem.vm_cat_alloc_costs.len();

        let mut vars = variables!();

        // x_i: power on node i.
        let x: Vec<Variable> = (0..nfns).map(|_| vars.add(variable().binary())).collect();

        // y_{i,j,v}: VM count, bounded by the required minimum (0 when the
        // pair (j, v) is infeasible).
        let y: Vec<Vec<Vec<Variable>>> = (0..nfns)
            .map(|_| {
                (0..nsvcs)
                    .map(|j| {
                        (0..nvmcats)
                            .map(|v| {
                                let bound = demand_bound(problem.svc_vm_cat_min_num_vms, j, v);
                                vars.add(variable().integer().min(0).max(bound as f64))
                            })
                            .collect()
                    })
                    .collect()
            })
            .collect();

        // z_{j,v} / w_{j,v}: category selection and full-service indicators,
        // only for feasible positive demands.
        let mut z = vec![vec![None; nvmcats]; nsvcs];
        let mut w = vec![vec![None; nvmcats]; nsvcs];
        for j in 0..nsvcs {
            for v in 0..nvmcats {
                if demand_bound(problem.svc_vm_cat_min_num_vms, j, v) > 0 {
                    z[j][v] = Some(vars.add(variable().binary()));
                    w[j][v] = Some(vars.add(variable().binary()));
                }
            }
        }

        // d_{i,j,v} >= y_{i,j,v} - y_prev: newly allocated VMs.
        let d: Vec<Vec<Vec<Option<Variable>>>> = (0..nfns)
            .map(|_| {
                (0..nsvcs)
                    .map(|j| {
                        (0..nvmcats)
                            .map(|v| {
                                if demand_bound(problem.svc_vm_cat_min_num_vms, j, v) > 0 {
                                    Some(vars.add(variable().min(0)))
                                } else {
                                    None
                                }
                            })
                            .collect()
                    })
                    .collect()
            })
            .collect();

        // CPU utilization of each node.
        let u: Vec<Expression> = (0..nfns)
            .map(|i| {
                let fn_cat = problem.fn_categories[i];
                let mut expr = Expression::default();
                for j in 0..nsvcs {
                    for v in 0..nvmcats {
                        expr += y[i][j][v] * problem.vm_cat_cpu_shares[v][fn_cat];
                    }
                }
                expr
            })
            .collect();

        // Objective: interval revenue minus interval cost.
        let mut revenue = Expression::default();
        for i in 0..nfns {
            for j in 0..nsvcs {
                let svc_cat = problem.svc_categories[j];
                for v in 0..nvmcats {
                    revenue += y[i][j][v] * (problem.fp_svc_cat_revenues[svc_cat] * problem.deltat);
                }
            }
        }

        let mut cost = Expression::default();
        for i in 0..nfns {
            let fn_cat = problem.fn_categories[i];
            let d_power = problem.fn_cat_max_powers[fn_cat] - problem.fn_cat_min_powers[fn_cat];
            let wcost = problem.fp_electricity_cost * problem.deltat;

            // Electricity consumption over the interval.
            cost += x[i] * (problem.fn_cat_min_powers[fn_cat] * wcost);
            cost += u[i].clone() * (d_power * wcost);

            // Switch-on/off costs.
            if problem.fn_power_states[i] {
                cost += problem.fp_fn_cat_asleep_costs[fn_cat];
                cost += x[i] * (-problem.fp_fn_cat_asleep_costs[fn_cat]);
            } else {
                cost += x[i] * problem.fp_fn_cat_awake_costs[fn_cat];
            }
        }
        // VM (re)allocation costs; a category change pays the full cost.
        for i in 0..nfns {
            for j in 0..nsvcs {
                for v in 0..nvmcats {
                    if let Some(d_var) = d[i][j][v] {
                        cost += d_var * problem.vm_cat_alloc_costs[v];
                    }
                }
            }
        }
        // QoS penalties: a service pays unless it is fully served with its
        // selected category. A service whose demand vanishes for some
        // category needs no VMs and pays nothing.
        for j in 0..nsvcs {
            let svc_cat = problem.svc_categories[j];
            if !needs_vms(problem.svc_vm_cat_min_num_vms, j, nvmcats) {
                continue;
            }
            let penalty = problem.fp_svc_cat_penalties[svc_cat] * problem.deltat;
            cost += penalty;
            for v in 0..nvmcats {
                if let Some(w_var) = w[j][v] {
                    cost += w_var * (-penalty);
                }
            }
        }

        let objective = revenue.clone() - cost.clone();

        let mut model = vars.maximise(objective.clone()).using(highs);
        if self.time_limit > 0. {
            model = model.set_time_limit(self.time_limit);
        }
        if self.relative_tolerance > 0. {
            model = match model.set_mip_rel_gap(self.relative_tolerance as f32) {
                Ok(m) => m,
                Err(status) => {
                    warn!("Cannot set the MIP relative gap: {:?}", status);
                    return VmAllocation::unsolved(nfns);
                }
            };
        }

        // (K1) Allocated CPU fits a powered-on node.
        for i in 0..nfns {
            model = model.with(constraint!(u[i].clone() <= x[i]));
        }
        // (K2 + K3) No more VMs than required, all on the selected category.
        for j in 0..nsvcs {
            let mut z_sum = Expression::default();
            let mut any = false;
            for v in 0..nvmcats {
                if let Some(z_var) = z[j][v] {
                    any = true;
                    z_sum += z_var;
                    let need = demand_bound(problem.svc_vm_cat_min_num_vms, j, v) as f64;
                    let y_sum: Expression = (0..nfns).map(|i| y[i][j][v]).sum();
                    model = model.with(constraint!(y_sum.clone() <= z_var * need));
                    if let Some(w_var) = w[j][v] {
                        model = model.with(constraint!(y_sum >= w_var * need));
                    }
                }
            }
            if any {
                model = model.with(constraint!(z_sum <= 1));
            }
        }
        // Newly allocated VMs relative to the previous interval.
        for i in 0..nfns {
            for j in 0..nsvcs {
                for v in 0..nvmcats {
                    if let Some(d_var) = d[i][j][v] {
                        let y_prev = previous_count(problem.fn_vm_allocations, i, j, v);
                        model = model.with(constraint!(d_var >= y[i][j][v] - y_prev as f64));
                    }
                }
            }
        }
        // (K4) Pinned power states for the real-workload re-solve.
        if let Some(fixed_fns) = problem.fixed_fns {
            for (i, &x_var) in x.iter().enumerate() {
                let pinned = if fixed_fns.contains(&i) { 1. } else { 0. };
                model = model.with(constraint!(x_var == pinned));
            }
        }

        let started = Instant::now();
        let lp_solution = match model.solve() {
            Ok(s) => s,
            Err(ResolutionError::Infeasible) => {
                warn!("The VM placement problem is infeasible");
                return VmAllocation::unsolved(nfns);
            }
            Err(err) => {
                warn!("Optimization was stopped: {}", err);
                return VmAllocation::unsolved(nfns);
            }
        };
        let elapsed = started.elapsed().as_secs_f64();

        let mut solution = VmAllocation::unsolved(nfns);
        solution.solved = true;
        solution.optimal = !(self.time_limit > 0. && elapsed >= self.time_limit);
        if !solution.optimal {
            warn!("Optimization hit the time limit; solution may be non-optimal");
        }
        solution.objective_value = objective.eval_with(&lp_solution);

        for i in 0..nfns {
            solution.fn_power_states[i] = lp_solution.value(x[i]) > 0.5;
            for j in 0..nsvcs {
                for v in 0..nvmcats {
                    let n = integer_value(lp_solution.value(y[i][j][v]));
                    if n > 0 {
                        solution.fn_vm_allocations[i].insert(j, (v, n));
                    }
                }
            }
        }

        let (revenue, cost) =
            single_slot_financials(problem, &solution.fn_power_states, &solution.fn_vm_allocations);
        solution.revenue = revenue;
        solution.cost = cost;
        solution.profit = revenue - cost;

        if (solution.objective_value - solution.profit).abs()
            > self.relative_tolerance.max(1e-9) * solution.profit.abs().max(1.)
        {
            warn!(
                "Solver objective {} deviates from recomputed profit {}",
                solution.objective_value, solution.profit
            );
        }

        for i in 0..nfns {
            let fn_cat = problem.fn_categories[i];
            let mut share = 0.;
            for (_, &(v, n)) in solution.fn_vm_allocations[i].iter() {
                share += n as f64 * problem.vm_cat_cpu_shares[v][fn_cat];
            }
            solution.fn_cpu_allocations[i] = if self.relative_tolerance > 0. {
                roundp(share, (1. / self.relative_tolerance).log10())
            } else {
                share
            };
        }

        check_vm_allocation(&solution, problem, self.relative_tolerance.max(1e-9));

        solution
    }
}

/// Multi-slot (oracle) MIP placement solver.
pub struct OptimalMultislotVmAllocationSolver {
    relative_tolerance: f64,
    time_limit: f64,
}

impl OptimalMultislotVmAllocationSolver {
    pub fn new(relative_tolerance: f64, time_limit: f64) -> Self {
        Self {
            relative_tolerance,
            time_limit,
        }
    }
}

impl MultislotVmAllocationSolver for OptimalMultislotVmAllocationSolver {
    fn solve(&self, problem: &MultislotVmAllocationProblem) -> MultislotVmAllocation {
        let nslots = problem.slot_svc_vm_cat_min_num_vms.len();
        let nfns = problem.fn_categories.len();
        let nsvcs = problem.svc_categories.len();
        let nvmcats = problem.vm_cat_alloc_costs.len();

        if nslots == 0 {
            let mut solution = MultislotVmAllocation::unsolved();
            solution.solved = true;
            solution.optimal = true;
            solution.objective_value = 0.;
            solution.revenue = 0.;
            solution.cost = 0.;
            solution.profit = 0.;
            return solution;
        }

        let mut vars = variables!();

        let x: Vec<Vec<Variable>> = (0..nslots)
            .map(|_| (0..nfns).map(|_| vars.add(variable().binary())).collect())
            .collect();

        let y: Vec<Vec<Vec<Vec<Variable>>>> = (0..nslots)
            .map(|t| {
                (0..nfns)
                    .map(|_| {
                        (0..nsvcs)
                            .map(|j| {
                                (0..nvmcats)
                                    .map(|v| {
                                        let bound = demand_bound(
                                            &problem.slot_svc_vm_cat_min_num_vms[t],
                                            j,
                                            v,
                                        );
                                        vars.add(variable().integer().min(0).max(bound as f64))
                                    })
                                    .collect()
                            })
                            .collect()
                    })
                    .collect()
            })
            .collect();

        let mut z = vec![vec![vec![None; nvmcats]; nsvcs]; nslots];
        let mut w = vec![vec![vec![None; nvmcats]; nsvcs]; nslots];
        for t in 0..nslots {
            for j in 0..nsvcs {
                for v in 0..nvmcats {
                    if demand_bound(&problem.slot_svc_vm_cat_min_num_vms[t], j, v) > 0 {
                        z[t][j][v] = Some(vars.add(variable().binary()));
                        w[t][j][v] = Some(vars.add(variable().binary()));
                    }
                }
            }
        }

        // Positive parts of power-state transitions between consecutive slots.
        let switch_on: Vec<Vec<Variable>> = (0..nslots)
            .map(|_| (0..nfns).map(|_| vars.add(variable().min(0))).collect())
            .collect();
        let switch_off: Vec<Vec<Variable>> = (0..nslots)
            .map(|_| (0..nfns).map(|_| vars.add(variable().min(0))).collect())
            .collect();

        // Newly allocated VMs relative to the previous slot.
        let d: Vec<Vec<Vec<Vec<Option<Variable>>>>> = (0..nslots)
            .map(|t| {
                (0..nfns)
                    .map(|_| {
                        (0..nsvcs)
                            .map(|j| {
                                (0..nvmcats)
                                    .map(|v| {
                                        if demand_bound(&problem.slot_svc_vm_cat_min_num_vms[t], j, v)
                                            > 0
                                        {
                                            Some(vars.add(variable().min(0)))
                                        } else {
                                            None
                                        }
                                    })
                                    .collect()
                            })
                            .collect()
                    })
                    .collect()
            })
            .collect();

        let u: Vec<Vec<Expression>> = (0..nslots)
            .map(|t| {
                (0..nfns)
                    .map(|i| {
                        let fn_cat = problem.fn_categories[i];
                        let mut expr = Expression::default();
                        for j in 0..nsvcs {
                            for v in 0..nvmcats {
                                expr += y[t][i][j][v] * problem.vm_cat_cpu_shares[v][fn_cat];
                            }
                        }
                        expr
                    })
                    .collect()
            })
            .collect();

        let mut revenue = Expression::default();
        let mut cost = Expression::default();
        for t in 0..nslots {
            for i in 0..nfns {
                let fn_cat = problem.fn_categories[i];
                let d_power = problem.fn_cat_max_powers[fn_cat] - problem.fn_cat_min_powers[fn_cat];
                let wcost = problem.fp_electricity_cost * problem.deltat;

                cost += x[t][i] * (problem.fn_cat_min_powers[fn_cat] * wcost);
                cost += u[t][i].clone() * (d_power * wcost);
                cost += switch_on[t][i] * problem.fp_fn_cat_awake_costs[fn_cat];
                cost += switch_off[t][i] * problem.fp_fn_cat_asleep_costs[fn_cat];

                for j in 0..nsvcs {
                    let svc_cat = problem.svc_categories[j];
                    for v in 0..nvmcats {
                        revenue +=
                            y[t][i][j][v] * (problem.fp_svc_cat_revenues[svc_cat] * problem.deltat);
                        if let Some(d_var) = d[t][i][j][v] {
                            cost += d_var * problem.vm_cat_alloc_costs[v];
                        }
                    }
                }
            }
            for j in 0..nsvcs {
                let svc_cat = problem.svc_categories[j];
                if !needs_vms(&problem.slot_svc_vm_cat_min_num_vms[t], j, nvmcats) {
                    continue;
                }
                let penalty = problem.fp_svc_cat_penalties[svc_cat] * problem.deltat;
                cost += penalty;
                for v in 0..nvmcats {
                    if let Some(w_var) = w[t][j][v] {
                        cost += w_var * (-penalty);
                    }
                }
            }
        }

        let objective = revenue - cost;

        let mut model = vars.maximise(objective.clone()).using(highs);
        if self.time_limit > 0. {
            model = model.set_time_limit(self.time_limit);
        }
        if self.relative_tolerance > 0. {
            model = match model.set_mip_rel_gap(self.relative_tolerance as f32) {
                Ok(m) => m,
                Err(status) => {
                    warn!("Cannot set the MIP relative gap: {:?}", status);
                    return MultislotVmAllocation::unsolved();
                }
            };
        }

        for t in 0..nslots {
            for i in 0..nfns {
                model = model.with(constraint!(u[t][i].clone() <= x[t][i]));

                // Chained switching costs; slot 0 uses the initial states.
                if t == 0 {
                    let prev = if problem.fn_power_states[i] { 1. } else { 0. };
                    model = model.with(constraint!(switch_on[t][i] >= x[t][i] - prev));
                    model = model.with(constraint!(switch_off[t][i] + x[t][i] >= prev));
                } else {
                    model = model.with(constraint!(switch_on[t][i] >= x[t][i] - x[t - 1][i]));
                    model = model.with(constraint!(switch_off[t][i] >= x[t - 1][i] - x[t][i]));
                }
            }
            for j in 0..nsvcs {
                let mut z_sum = Expression::default();
                let mut any = false;
                for v in 0..nvmcats {
                    if let Some(z_var) = z[t][j][v] {
                        any = true;
                        z_sum += z_var;
                        let need = demand_bound(&problem.slot_svc_vm_cat_min_num_vms[t], j, v) as f64;
                        let y_sum: Expression = (0..nfns).map(|i| y[t][i][j][v]).sum();
                        model = model.with(constraint!(y_sum.clone() <= z_var * need));
                        if let Some(w_var) = w[t][j][v] {
                            model = model.with(constraint!(y_sum >= w_var * need));
                        }
                    }
                }
                if any {
                    model = model.with(constraint!(z_sum <= 1));
                }
            }
            for i in 0..nfns {
                for j in 0..nsvcs {
                    for v in 0..nvmcats {
                        if let Some(d_var) = d[t][i][j][v] {
                            if t == 0 {
                                let y_prev = previous_count(problem.fn_vm_allocations, i, j, v);
                                model = model
                                    .with(constraint!(d_var >= y[t][i][j][v] - y_prev as f64));
                            } else {
                                model = model
                                    .with(constraint!(d_var >= y[t][i][j][v] - y[t - 1][i][j][v]));
                            }
                        }
                    }
                }
            }
        }

        let started = Instant::now();
        let lp_solution = match model.solve() {
            Ok(s) => s,
            Err(ResolutionError::Infeasible) => {
                warn!("The multi-slot VM placement problem is infeasible");
                return MultislotVmAllocation::unsolved();
            }
            Err(err) => {
                warn!("Multi-slot optimization was stopped: {}", err);
                return MultislotVmAllocation::unsolved();
            }
        };
        let elapsed = started.elapsed().as_secs_f64();

        let mut solution = MultislotVmAllocation::unsolved();
        solution.solved = true;
        solution.optimal = !(self.time_limit > 0. && elapsed >= self.time_limit);
        if !solution.optimal {
            warn!("Multi-slot optimization hit the time limit; solution may be non-optimal");
        }
        solution.objective_value = objective.eval_with(&lp_solution);

        let mut total_revenue = 0.;
        let mut total_cost = 0.;
        let mut prev_states: Vec<bool> = problem.fn_power_states.to_vec();
        let mut prev_allocs: FnVmAllocations = problem.fn_vm_allocations.clone();
        for t in 0..nslots {
            let mut slot_states = vec![false; nfns];
            let mut slot_allocs: FnVmAllocations = vec![Default::default(); nfns];
            for i in 0..nfns {
                slot_states[i] = lp_solution.value(x[t][i]) > 0.5;
                for j in 0..nsvcs {
                    for v in 0..nvmcats {
                        let n = integer_value(lp_solution.value(y[t][i][j][v]));
                        if n > 0 {
                            slot_allocs[i].insert(j, (v, n));
                        }
                    }
                }
            }

            let slot_problem = VmAllocationProblem {
                fn_categories: problem.fn_categories,
                fn_power_states: &prev_states,
                fn_vm_allocations: &prev_allocs,
                fixed_fns: None,
                fn_cat_min_powers: problem.fn_cat_min_powers,
                fn_cat_max_powers: problem.fn_cat_max_powers,
                vm_cat_cpu_shares: problem.vm_cat_cpu_shares,
                vm_cat_alloc_costs: problem.vm_cat_alloc_costs,
                svc_categories: problem.svc_categories,
                svc_vm_cat_min_num_vms: &problem.slot_svc_vm_cat_min_num_vms[t],
                fp_svc_cat_revenues: problem.fp_svc_cat_revenues,
                fp_svc_cat_penalties: problem.fp_svc_cat_penalties,
                fp_electricity_cost: problem.fp_electricity_cost,
                fp_fn_cat_asleep_costs: problem.fp_fn_cat_asleep_costs,
                fp_fn_cat_awake_costs: problem.fp_fn_cat_awake_costs,
                deltat: problem.deltat,
            };
            let (slot_revenue, slot_cost) =
                single_slot_financials(&slot_problem, &slot_states, &slot_allocs);
            total_revenue += slot_revenue;
            total_cost += slot_cost;

            let mut slot_shares = vec![0.; nfns];
            for i in 0..nfns {
                let fn_cat = problem.fn_categories[i];
                for (_, &(v, n)) in slot_allocs[i].iter() {
                    slot_shares[i] += n as f64 * problem.vm_cat_cpu_shares[v][fn_cat];
                }
                if self.relative_tolerance > 0. {
                    slot_shares[i] =
                        roundp(slot_shares[i], (1. / self.relative_tolerance).log10());
                }
            }

            prev_states = slot_states.clone();
            prev_allocs = slot_allocs.clone();
            solution.fn_power_states.push(slot_states);
            solution.fn_vm_allocations.push(slot_allocs);
            solution.fn_cpu_allocations.push(slot_shares);
        }

        solution.revenue = total_revenue;
        solution.cost = total_cost;
        solution.profit = total_revenue - total_cost;

        if (solution.objective_value - solution.profit).abs()
            > self.relative_tolerance.max(1e-9) * solution.profit.abs().max(1.)
        {
            warn!(
                "Multi-slot solver objective {} deviates from recomputed profit {}",
                solution.objective_value, solution.profit
            );
        }

        check_multislot_vm_allocation(&solution, self.relative_tolerance.max(1e-9));

        solution
    }
}

/// Upper bound on `y_{i,j,v}`: the required minimum VM count, or 0 when the
/// pair is infeasible.
fn demand_bound(min_num_vms: &MinNumVms, svc: usize, vm_cat: usize) -> usize {
    min_num_vms[svc][vm_cat].unwrap_or(0)
}

/// A service needs VMs unless some category satisfies it with zero VMs.
fn needs_vms(min_num_vms: &MinNumVms, svc: usize, nvmcats: usize) -> bool {
    (0..nvmcats).all(|v| min_num_vms[svc][v] != Some(0))
}

fn previous_count(allocations: &FnVmAllocations, fn_idx: usize, svc: usize, vm_cat: usize) -> usize {
    match allocations[fn_idx].get(&svc) {
        Some(&(cat, n)) if cat == vm_cat => n,
        _ => 0,
    }
}

fn integer_value(x: f64) -> usize {
    if (x - x.round()).abs() > INTEGRALITY_TOLERANCE {
        warn!("Integer variable value {} deviates from its rounding", x);
    }
    x.round().max(0.) as usize
}

/// Recomputes the interval revenue and cost of a placement from the rounded
/// integer allocation, so that the reported profit is exact. The previous
/// power states and allocations are taken from the problem.
pub(crate) fn single_slot_financials(
    problem: &VmAllocationProblem,
    states: &[bool],
    allocs: &FnVmAllocations,
) -> (f64, f64) {
    let fn_categories = problem.fn_categories;
    let prev_states = problem.fn_power_states;
    let prev_allocs = problem.fn_vm_allocations;
    let nfns = fn_categories.len();
    let nsvcs = problem.svc_categories.len();
    let nvmcats = problem.vm_cat_alloc_costs.len();

    let mut revenue = 0.;
    let mut cost = 0.;

    for i in 0..nfns {
        let fn_cat = fn_categories[i];

        let mut share = 0.;
        for (&svc, &(vm_cat, n)) in allocs[i].iter() {
            share += n as f64 * problem.vm_cat_cpu_shares[vm_cat][fn_cat];
            revenue += n as f64
                * problem.fp_svc_cat_revenues[problem.svc_categories[svc]]
                * problem.deltat;

            let prev = previous_count(prev_allocs, i, svc, vm_cat);
            if n > prev {
                cost += (n - prev) as f64 * problem.vm_cat_alloc_costs[vm_cat];
            }
        }

        if states[i] {
            let power_model = LinearPowerModel::new(
                problem.fn_cat_min_powers[fn_cat],
                problem.fn_cat_max_powers[fn_cat],
            );
            cost += power_model.power(share) * problem.fp_electricity_cost * problem.deltat;
            if !prev_states[i] {
                cost += problem.fp_fn_cat_awake_costs[fn_cat];
            }
        } else if prev_states[i] {
            cost += problem.fp_fn_cat_asleep_costs[fn_cat];
        }
    }

    // QoS penalties for unserved or under-served services.
    for j in 0..nsvcs {
        let svc_cat = problem.svc_categories[j];
        if !needs_vms(problem.svc_vm_cat_min_num_vms, j, nvmcats) {
            continue;
        }
        let mut served_in_full = false;
        let mut vm_cat = None;
        let mut total = 0;
        for alloc in allocs.iter() {
            if let Some(&(cat, n)) = alloc.get(&j) {
                vm_cat = Some(cat);
                total += n;
            }
        }
        if let Some(cat) = vm_cat {
            if let Some(need) = problem.svc_vm_cat_min_num_vms[j][cat] {
                served_in_full = total >= need;
            }
        }
        if !served_in_full {
            cost += problem.fp_svc_cat_penalties[svc_cat] * problem.deltat;
        }
    }

    (revenue, cost)
}
