//! Experiment driver.
//!
//! Reacts to the periodic VM-allocation trigger events: reads the user
//! population, estimates arrival rates, sizes every service with the M/M/c
//! model, solves the per-slot placement for the predicted workload, scores
//! the same interval under the realized workload, and records
//! interval/replication statistics. At the end of a replication the
//! multi-slot oracle is solved over the recorded demand traces and the
//! replication aggregates feed the simulation-level confidence-interval
//! estimators.

use std::collections::BTreeSet;
use std::fs::File;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use log::{info, warn};
use serde::Serialize;

use fogsim_core::{cast, Event, EventHandler, SimulationContext};

use crate::core::common::RealWorkloadAllocation;
use crate::core::estimators::ArrivalRateEstimator;
use crate::core::mobility::UserMobilityModel;
use crate::core::queueing;
use crate::core::scenario::Scenario;
use crate::core::stats::{CiMeanEstimator, MeanEstimator};
use crate::core::vm_allocation::{
    check_vm_allocation, make_multislot_solver, make_solver, FnVmAllocations, MinNumVms,
    MultislotVmAllocationProblem, MultislotVmAllocationSolver, VmAllocationProblem,
    VmAllocationSolver,
};

const CSV_NA: &str = "NA";
const CSV_INTERVAL_TAG: &str = "INTERVAL";
const CSV_REPLICATION_TAG: &str = "REPLICATION";
const CSV_SIMULATION_TAG: &str = "SIMULATION";

/// Periodic trigger of the placement loop; the interval spans
/// `[start_time, stop_time)`.
#[derive(Serialize)]
pub struct VmAllocationTrigger {
    pub start_time: f64,
    pub stop_time: f64,
}

/// Runtime settings of one experiment, resolved from the command line.
#[derive(Debug, Clone, Serialize)]
pub struct ExperimentConfig {
    pub rng_seed: u64,
    /// Relative optimality gap for the placement solvers (0 disables).
    pub optim_relative_tolerance: f64,
    /// Wall-clock budget per solver call, in seconds (non-positive disables).
    pub optim_time_limit: f64,
    /// Confidence level of the watched statistics.
    pub ci_level: f64,
    /// Target relative precision of the watched statistics.
    pub ci_rel_precision: f64,
    /// Replication cap; 0 means unlimited.
    pub max_num_replications: usize,
    /// Length of each replication in simulated time.
    pub max_replication_duration: f64,
    pub output_stats_file: Option<PathBuf>,
    pub output_trace_file: Option<PathBuf>,
    /// Command-line override of the scenario's real-workload mode.
    pub real_workload_allocation: Option<RealWorkloadAllocation>,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            rng_seed: 5489,
            optim_relative_tolerance: 0.,
            optim_time_limit: -1.,
            ci_level: 0.95,
            ci_rel_precision: 0.04,
            max_num_replications: 0,
            max_replication_duration: 0.,
            output_stats_file: None,
            output_trace_file: None,
            real_workload_allocation: None,
        }
    }
}

/// Per-service response-time tables: `delays[svc][vm_cat][n]` is the mean
/// response time with `n` allocated VMs; an empty inner table marks an
/// infeasible (service, VM category) pair.
type DelayTables = Vec<Vec<Vec<f64>>>;

pub struct FogExperiment {
    ctx: SimulationContext,
    scenario: Scenario,
    real_workload_allocation: RealWorkloadAllocation,
    deltat: f64,
    /// Numerical tolerance for solution consistency checks; follows the
    /// solver gap.
    eps_rel: f64,

    fn_categories: Vec<usize>,
    svc_categories: Vec<usize>,
    initial_fn_power_states: Vec<bool>,
    initial_fn_vm_allocations: FnVmAllocations,

    mobility_model: Box<dyn UserMobilityModel>,
    estimators: Vec<Box<dyn ArrivalRateEstimator>>,
    solver: Box<dyn VmAllocationSolver>,
    multislot_solver: Box<dyn MultislotVmAllocationSolver>,

    // State of the current replication.
    current_replication: usize,
    rep_fn_power_states: Vec<bool>,
    rep_fn_vm_allocations: FnVmAllocations,
    rep_pred_profit: f64,
    rep_real_profit: f64,
    rep_pred_num_fns: MeanEstimator,
    rep_real_num_fns: MeanEstimator,
    rep_svc_pred_delays: Vec<MeanEstimator>,
    rep_svc_real_delays: Vec<MeanEstimator>,
    rep_global_duration: f64,
    rep_global_pred_demand: Vec<MinNumVms>,
    rep_global_real_demand: Vec<MinNumVms>,
    rep_global_pred_profit: f64,
    rep_global_real_profit: f64,
    rep_global_pred_num_fns: MeanEstimator,
    rep_global_real_num_fns: MeanEstimator,

    // Simulation-level statistics, accumulated across replications.
    pred_profit_ci: CiMeanEstimator,
    real_profit_ci: CiMeanEstimator,
    pred_num_fns_ci: CiMeanEstimator,
    real_num_fns_ci: CiMeanEstimator,
    svc_pred_delay_ci: Vec<CiMeanEstimator>,
    svc_real_delay_ci: Vec<CiMeanEstimator>,
    global_pred_profit_ci: CiMeanEstimator,
    global_real_profit_ci: CiMeanEstimator,
    global_pred_num_fns_ci: CiMeanEstimator,
    global_real_num_fns_ci: CiMeanEstimator,

    stats_writer: Option<csv::Writer<File>>,
    trace_writer: Option<csv::Writer<File>>,
}

impl FogExperiment {
    pub fn new(
        scenario: Scenario,
        config: &ExperimentConfig,
        mobility_model: Box<dyn UserMobilityModel>,
        estimators: Vec<Box<dyn ArrivalRateEstimator>>,
        ctx: SimulationContext,
    ) -> Self {
        let num_fns = scenario.num_fns();
        let num_svcs = scenario.num_svcs();
        assert_eq!(estimators.len(), num_svcs);

        // Flatten the category instance counts into per-entity categories.
        let mut fn_categories = Vec::with_capacity(num_fns);
        for (cat, &count) in scenario.fp_num_fns.iter().enumerate() {
            fn_categories.extend(std::iter::repeat(cat).take(count));
        }
        let mut svc_categories = Vec::with_capacity(num_svcs);
        for (cat, &count) in scenario.fp_num_svcs.iter().enumerate() {
            svc_categories.extend(std::iter::repeat(cat).take(count));
        }

        let solver = make_solver(
            scenario.fp_vm_allocation_policy,
            config.optim_relative_tolerance,
            config.optim_time_limit,
        );
        let multislot_solver = make_multislot_solver(
            config.optim_relative_tolerance,
            config.optim_time_limit,
        );

        let mut ci = |name: String| {
            let mut estimator = CiMeanEstimator::new(config.ci_level, config.ci_rel_precision);
            estimator.set_name(&name);
            estimator
        };
        let pred_profit_ci = ci("LocalPredProfit".to_owned());
        let real_profit_ci = ci("LocalRealProfit".to_owned());
        let pred_num_fns_ci = ci("LocalPredNumFNs".to_owned());
        let real_num_fns_ci = ci("LocalRealNumFNs".to_owned());
        let svc_pred_delay_ci = (0..num_svcs)
            .map(|svc| ci(format!("LocalPredDelay_{{{}}}", svc)))
            .collect();
        let svc_real_delay_ci = (0..num_svcs)
            .map(|svc| ci(format!("LocalRealDelay_{{{}}}", svc)))
            .collect();
        let global_pred_profit_ci = ci("GlobalPredProfit".to_owned());
        let global_real_profit_ci = ci("GlobalRealProfit".to_owned());
        let global_pred_num_fns_ci = ci("GlobalPredNumFNs".to_owned());
        let global_real_num_fns_ci = ci("GlobalRealNumFNs".to_owned());

        let real_workload_allocation = config
            .real_workload_allocation
            .unwrap_or(scenario.fp_real_workload_allocation);
        let deltat = scenario.fp_vm_allocation_interval;

        Self {
            ctx,
            real_workload_allocation,
            deltat,
            eps_rel: config.optim_relative_tolerance.max(1e-9),
            fn_categories,
            svc_categories,
            initial_fn_power_states: vec![false; num_fns],
            initial_fn_vm_allocations: vec![Default::default(); num_fns],
            mobility_model,
            estimators,
            solver,
            multislot_solver,
            current_replication: 0,
            rep_fn_power_states: vec![false; num_fns],
            rep_fn_vm_allocations: vec![Default::default(); num_fns],
            rep_pred_profit: 0.,
            rep_real_profit: 0.,
            rep_pred_num_fns: MeanEstimator::with_name("LocalPredNumFNs"),
            rep_real_num_fns: MeanEstimator::with_name("LocalRealNumFNs"),
            rep_svc_pred_delays: vec![MeanEstimator::new(); num_svcs],
            rep_svc_real_delays: vec![MeanEstimator::new(); num_svcs],
            rep_global_duration: 0.,
            rep_global_pred_demand: Vec::new(),
            rep_global_real_demand: Vec::new(),
            rep_global_pred_profit: 0.,
            rep_global_real_profit: 0.,
            rep_global_pred_num_fns: MeanEstimator::with_name("GlobalPredNumFNs"),
            rep_global_real_num_fns: MeanEstimator::with_name("GlobalRealNumFNs"),
            pred_profit_ci,
            real_profit_ci,
            pred_num_fns_ci,
            real_num_fns_ci,
            svc_pred_delay_ci,
            svc_real_delay_ci,
            global_pred_profit_ci,
            global_real_profit_ci,
            global_pred_num_fns_ci,
            global_real_num_fns_ci,
            stats_writer: None,
            trace_writer: None,
            scenario,
        }
    }

    /// Opens the output files and writes the CSV headers. Failing to open an
    /// output file is fatal.
    pub fn initialize_simulation(&mut self, config: &ExperimentConfig) -> anyhow::Result<()> {
        if let Some(path) = &config.output_stats_file {
            let mut writer = csv::WriterBuilder::new()
                .quote_style(csv::QuoteStyle::NonNumeric)
                .from_path(path)?;
            writer.write_record(self.stats_header())?;
            writer.flush()?;
            self.stats_writer = Some(writer);
        }
        if let Some(path) = &config.output_trace_file {
            let mut writer = csv::WriterBuilder::new()
                .quote_style(csv::QuoteStyle::NonNumeric)
                .from_path(path)?;
            writer.write_record(self.trace_header())?;
            writer.flush()?;
            self.trace_writer = Some(writer);
        }
        Ok(())
    }

    /// Resets the per-replication state and schedules the first trigger.
    pub fn initialize_replication(&mut self) {
        self.current_replication += 1;

        self.rep_fn_power_states = self.initial_fn_power_states.clone();
        self.rep_fn_vm_allocations = self.initial_fn_vm_allocations.clone();

        self.rep_pred_profit = 0.;
        self.rep_real_profit = 0.;
        self.rep_pred_num_fns.reset();
        self.rep_real_num_fns.reset();
        for estimator in self.rep_svc_pred_delays.iter_mut() {
            estimator.reset();
        }
        for estimator in self.rep_svc_real_delays.iter_mut() {
            estimator.reset();
        }
        for estimator in self.estimators.iter_mut() {
            estimator.reset();
        }

        self.rep_global_duration = 0.;
        self.rep_global_pred_demand.clear();
        self.rep_global_real_demand.clear();
        self.rep_global_pred_profit = 0.;
        self.rep_global_real_profit = 0.;
        self.rep_global_pred_num_fns.reset();
        self.rep_global_real_num_fns.reset();

        let start_time = self.ctx.time();
        let stop_time = start_time + self.deltat;
        self.ctx.emit_self(
            VmAllocationTrigger {
                start_time,
                stop_time,
            },
            self.deltat,
        );
    }

    /// Runs the multi-slot oracle over the recorded demand traces and feeds
    /// the replication aggregates into the simulation-level statistics.
    pub fn finalize_replication(&mut self) {
        info!(
            "Replication #{}: {} intervals covering {} time units",
            self.current_replication,
            self.rep_global_pred_demand.len(),
            self.rep_global_duration
        );

        self.global_allocate_vms();

        collect_if_finite(&mut self.pred_profit_ci, self.rep_pred_profit);
        collect_if_finite(&mut self.real_profit_ci, self.rep_real_profit);
        collect_if_finite(&mut self.pred_num_fns_ci, self.rep_pred_num_fns.estimate());
        collect_if_finite(&mut self.real_num_fns_ci, self.rep_real_num_fns.estimate());
        for svc in 0..self.svc_categories.len() {
            self.svc_pred_delay_ci[svc].collect(self.rep_svc_pred_delays[svc].estimate());
            self.svc_real_delay_ci[svc].collect(self.rep_svc_real_delays[svc].estimate());
        }
        collect_if_finite(&mut self.global_pred_profit_ci, self.rep_global_pred_profit);
        collect_if_finite(&mut self.global_real_profit_ci, self.rep_global_real_profit);
        collect_if_finite(
            &mut self.global_pred_num_fns_ci,
            self.rep_global_pred_num_fns.estimate(),
        );
        collect_if_finite(
            &mut self.global_real_num_fns_ci,
            self.rep_global_real_num_fns.estimate(),
        );

        self.write_replication_stats_row();
    }

    /// Emits the simulation-level summary row.
    pub fn finalize_simulation(&mut self) {
        self.write_simulation_stats_row();
        if let Some(writer) = self.stats_writer.as_mut() {
            if let Err(err) = writer.flush() {
                warn!("Cannot flush the stats file: {}", err);
            }
        }
        if let Some(writer) = self.trace_writer.as_mut() {
            if let Err(err) = writer.flush() {
                warn!("Cannot flush the trace file: {}", err);
            }
        }
    }

    /// All watched statistics reached the target precision (or were declared
    /// unable to).
    pub fn stats_done(&self) -> bool {
        let watched = [
            &self.pred_profit_ci,
            &self.real_profit_ci,
            &self.global_pred_profit_ci,
            &self.global_real_profit_ci,
        ];
        watched.iter().all(|stat| stat.done() || stat.unstable())
    }

    pub fn current_replication(&self) -> usize {
        self.current_replication
    }

    // Inspection accessors for the last (or current) replication.

    pub fn replication_pred_profit(&self) -> f64 {
        self.rep_pred_profit
    }

    pub fn replication_real_profit(&self) -> f64 {
        self.rep_real_profit
    }

    pub fn replication_pred_num_fns(&self) -> f64 {
        self.rep_pred_num_fns.estimate()
    }

    pub fn replication_real_num_fns(&self) -> f64 {
        self.rep_real_num_fns.estimate()
    }

    pub fn replication_global_pred_profit(&self) -> f64 {
        self.rep_global_pred_profit
    }

    pub fn replication_global_real_profit(&self) -> f64 {
        self.rep_global_real_profit
    }

    pub fn fn_power_states(&self) -> &[bool] {
        &self.rep_fn_power_states
    }

    pub fn pred_profit_stats(&self) -> &CiMeanEstimator {
        &self.pred_profit_ci
    }

    pub fn real_profit_stats(&self) -> &CiMeanEstimator {
        &self.real_profit_ci
    }

    pub fn global_pred_profit_stats(&self) -> &CiMeanEstimator {
        &self.global_pred_profit_ci
    }

    pub fn global_real_profit_stats(&self) -> &CiMeanEstimator {
        &self.global_real_profit_ci
    }

    fn process_trigger(&mut self, start_time: f64, stop_time: f64) {
        self.allocate_vms(start_time, stop_time);

        let now = self.ctx.time();
        self.ctx.emit_self(
            VmAllocationTrigger {
                start_time: now,
                stop_time: now + self.deltat,
            },
            self.deltat,
        );
    }

    fn allocate_vms(&mut self, start_time: f64, stop_time: f64) {
        let num_svcs = self.svc_categories.len();
        let num_vm_cats = self.scenario.num_vm_categories;
        let duration = stop_time - start_time;
        self.rep_global_duration += duration;

        // Observe the user population and derive predicted and realized
        // arrival rates for every service.
        let mut svc_pred_rates = vec![0.; num_svcs];
        let mut svc_real_rates = vec![0.; num_svcs];
        let mut pred_min_num_vms: MinNumVms = vec![vec![None; num_vm_cats]; num_svcs];
        let mut real_min_num_vms: MinNumVms = vec![vec![None; num_vm_cats]; num_svcs];
        let mut pred_delays: DelayTables = vec![vec![Vec::new(); num_vm_cats]; num_svcs];
        let mut real_delays: DelayTables = vec![vec![Vec::new(); num_vm_cats]; num_svcs];

        for svc in 0..num_svcs {
            let svc_cat = self.svc_categories[svc];
            let num_users = self.mobility_model.next();

            let mut pred_rate = if num_users > 0 {
                num_users as f64 * self.scenario.svc_arrival_rates[svc_cat]
            } else {
                0.
            };
            pred_rate = pred_rate.min(self.scenario.svc_max_arrival_rates[svc_cat]);

            self.estimators[svc].collect(pred_rate);
            let real_rate = self.estimators[svc]
                .estimate()
                .min(self.scenario.svc_max_arrival_rates[svc_cat]);

            svc_pred_rates[svc] = pred_rate;
            svc_real_rates[svc] = real_rate;

            for vm_cat in 0..num_vm_cats {
                let mu = self.scenario.svc_vm_service_rates[svc_cat][vm_cat];
                let max_delay = self.scenario.svc_max_delays[svc_cat];
                let tol = self.scenario.svc_delay_tolerance;

                real_min_num_vms[svc][vm_cat] = queueing::min_num_vms(real_rate, mu, max_delay, tol);
                real_delays[svc][vm_cat] =
                    delay_table(real_rate, mu, real_min_num_vms[svc][vm_cat]);

                pred_min_num_vms[svc][vm_cat] = queueing::min_num_vms(pred_rate, mu, max_delay, tol);
                pred_delays[svc][vm_cat] =
                    delay_table(pred_rate, mu, pred_min_num_vms[svc][vm_cat]);
            }

            self.estimators[svc].reset();
        }

        self.rep_global_pred_demand.push(pred_min_num_vms.clone());
        self.rep_global_real_demand.push(real_min_num_vms.clone());

        let mut interval_pred_profit = f64::NAN;
        let mut interval_real_profit = f64::NAN;
        let mut interval_pred_num_fns = f64::NAN;
        let mut interval_real_num_fns = f64::NAN;
        let mut svc_interval_pred_delays = vec![f64::NAN; num_svcs];
        let mut svc_interval_real_delays = vec![f64::NAN; num_svcs];

        // Both optimizations run against the same snapshot of the current
        // power states and allocations.
        let fn_power_states = self.rep_fn_power_states.clone();
        let fn_vm_allocations = self.rep_fn_vm_allocations.clone();

        // Placement for the predicted workload: this is the allocation that
        // actually runs during the interval.
        let pred_problem = self.make_problem(
            &fn_power_states,
            &fn_vm_allocations,
            None,
            &pred_min_num_vms,
        );
        let pred_solution = self.solver.solve(&pred_problem);

        if pred_solution.solved {
            if !check_vm_allocation(&pred_solution, &pred_problem, self.eps_rel) {
                solution_check_failed();
            }

            interval_pred_profit = pred_solution.profit;
            for svc in 0..num_svcs {
                let (vm_cat, num_vms) = pred_solution.svc_allocation(svc);
                svc_interval_pred_delays[svc] = lookup_delay(&pred_delays, svc, vm_cat, num_vms);
            }
            interval_pred_num_fns = pred_solution.num_powered_on() as f64;

            self.rep_fn_power_states = pred_solution.fn_power_states.clone();
            self.rep_fn_vm_allocations = pred_solution.fn_vm_allocations.clone();
        } else {
            warn!("Predicted workload: the VM placement problem was not solved");
        }

        // Score the same interval under the realized workload.
        match self.real_workload_allocation {
            RealWorkloadAllocation::AllocateAll | RealWorkloadAllocation::AllocateWithFixedFns => {
                // Restrict the re-solve to the nodes powered on by the
                // predicted solution; an empty set leaves the choice free.
                let mut fixed_fns: BTreeSet<usize> = BTreeSet::new();
                if self.real_workload_allocation == RealWorkloadAllocation::AllocateWithFixedFns
                    && pred_solution.solved
                {
                    fixed_fns = pred_solution
                        .fn_power_states
                        .iter()
                        .enumerate()
                        .filter(|(_, &on)| on)
                        .map(|(i, _)| i)
                        .collect();
                }
                let real_problem = self.make_problem(
                    &fn_power_states,
                    &fn_vm_allocations,
                    if fixed_fns.is_empty() { None } else { Some(&fixed_fns) },
                    &real_min_num_vms,
                );
                let real_solution = self.solver.solve(&real_problem);

                if real_solution.solved {
                    if !check_vm_allocation(&real_solution, &real_problem, self.eps_rel) {
                        solution_check_failed();
                    }

                    interval_real_profit = real_solution.profit;
                    for svc in 0..num_svcs {
                        let (vm_cat, num_vms) = real_solution.svc_allocation(svc);
                        svc_interval_real_delays[svc] =
                            lookup_delay(&real_delays, svc, vm_cat, num_vms);
                    }
                    interval_real_num_fns = real_solution.num_powered_on() as f64;
                } else {
                    warn!("Real workload: the VM placement problem was not solved");
                }
            }
            RealWorkloadAllocation::AllocateNone => {
                // Keep the predicted placement; adjust the profit for the
                // realized demand.
                interval_real_profit = interval_pred_profit;
                interval_real_num_fns = interval_pred_num_fns;
                svc_interval_real_delays = svc_interval_pred_delays.clone();

                if pred_solution.solved {
                    for svc in 0..num_svcs {
                        let svc_cat = self.svc_categories[svc];
                        let (vm_cat, num_vms) = pred_solution.svc_allocation(svc);

                        let pred_need = pred_min_num_vms[svc][vm_cat];
                        if pred_need.map_or(true, |need| need > num_vms) {
                            // The predicted demand itself was not fully met;
                            // the penalty is already part of the profit.
                            continue;
                        }
                        match real_min_num_vms[svc][vm_cat] {
                            Some(real_need) if real_need > num_vms => {
                                interval_real_profit -=
                                    self.scenario.fp_svc_penalties[svc_cat] * self.deltat;
                            }
                            Some(real_need) if real_need < num_vms => {
                                interval_real_profit -= (num_vms - real_need) as f64
                                    * self.scenario.fp_svc_revenues[svc_cat]
                                    * self.deltat;
                            }
                            Some(_) => {}
                            None => {
                                // The realized demand cannot be satisfied
                                // with this category at all.
                                interval_real_profit -=
                                    self.scenario.fp_svc_penalties[svc_cat] * self.deltat;
                            }
                        }
                    }
                }
            }
        }

        // Accumulate replication statistics.
        if interval_pred_profit.is_finite() {
            self.rep_pred_profit += interval_pred_profit;
        }
        if interval_real_profit.is_finite() {
            self.rep_real_profit += interval_real_profit;
        }
        if interval_pred_num_fns.is_finite() {
            self.rep_pred_num_fns.collect(interval_pred_num_fns);
        }
        if interval_real_num_fns.is_finite() {
            self.rep_real_num_fns.collect(interval_real_num_fns);
        }
        for svc in 0..num_svcs {
            self.rep_svc_pred_delays[svc].collect(svc_interval_pred_delays[svc]);
            self.rep_svc_real_delays[svc].collect(svc_interval_real_delays[svc]);
        }

        self.write_interval_stats_row(
            start_time,
            duration,
            interval_pred_profit,
            interval_real_profit,
            &svc_interval_pred_delays,
            &svc_interval_real_delays,
            interval_pred_num_fns,
            interval_real_num_fns,
        );
        self.write_trace_row(
            start_time,
            duration,
            interval_pred_profit,
            interval_real_profit,
            &svc_pred_rates,
            &svc_real_rates,
            &svc_interval_pred_delays,
            &svc_interval_real_delays,
            interval_pred_num_fns,
            interval_real_num_fns,
        );
    }

    /// Oracle allocations over the whole replication, for both demand traces.
    fn global_allocate_vms(&mut self) {
        let pred = self.solve_multislot(&self.rep_global_pred_demand);
        if let Some(solution) = pred {
            self.rep_global_pred_profit = solution.profit;
            for slot in 0..solution.fn_power_states.len() {
                self.rep_global_pred_num_fns
                    .collect(solution.num_powered_on(slot) as f64);
            }
        } else {
            self.rep_global_pred_profit = f64::NAN;
        }

        let real = self.solve_multislot(&self.rep_global_real_demand);
        if let Some(solution) = real {
            self.rep_global_real_profit = solution.profit;
            for slot in 0..solution.fn_power_states.len() {
                self.rep_global_real_num_fns
                    .collect(solution.num_powered_on(slot) as f64);
            }
        } else {
            self.rep_global_real_profit = f64::NAN;
        }
    }

    fn solve_multislot(
        &self,
        demand: &[MinNumVms],
    ) -> Option<crate::core::vm_allocation::MultislotVmAllocation> {
        let problem = MultislotVmAllocationProblem {
            fn_categories: &self.fn_categories,
            fn_power_states: &self.initial_fn_power_states,
            fn_vm_allocations: &self.initial_fn_vm_allocations,
            fn_cat_min_powers: &self.scenario.fn_min_powers,
            fn_cat_max_powers: &self.scenario.fn_max_powers,
            vm_cat_cpu_shares: &self.scenario.vm_cpu_requirements,
            vm_cat_alloc_costs: &self.scenario.vm_allocation_costs,
            svc_categories: &self.svc_categories,
            slot_svc_vm_cat_min_num_vms: demand,
            fp_svc_cat_revenues: &self.scenario.fp_svc_revenues,
            fp_svc_cat_penalties: &self.scenario.fp_svc_penalties,
            fp_electricity_cost: self.scenario.fp_electricity_costs,
            fp_fn_cat_asleep_costs: &self.scenario.fp_fn_asleep_costs,
            fp_fn_cat_awake_costs: &self.scenario.fp_fn_awake_costs,
            deltat: self.deltat,
        };
        let solution = self.multislot_solver.solve(&problem);
        if solution.solved {
            Some(solution)
        } else {
            warn!("The multi-slot (oracle) VM placement problem was not solved");
            None
        }
    }

    fn make_problem<'a>(
        &'a self,
        fn_power_states: &'a [bool],
        fn_vm_allocations: &'a FnVmAllocations,
        fixed_fns: Option<&'a BTreeSet<usize>>,
        min_num_vms: &'a MinNumVms,
    ) -> VmAllocationProblem<'a> {
        VmAllocationProblem {
            fn_categories: &self.fn_categories,
            fn_power_states,
            fn_vm_allocations,
            fixed_fns,
            fn_cat_min_powers: &self.scenario.fn_min_powers,
            fn_cat_max_powers: &self.scenario.fn_max_powers,
            vm_cat_cpu_shares: &self.scenario.vm_cpu_requirements,
            vm_cat_alloc_costs: &self.scenario.vm_allocation_costs,
            svc_categories: &self.svc_categories,
            svc_vm_cat_min_num_vms: min_num_vms,
            fp_svc_cat_revenues: &self.scenario.fp_svc_revenues,
            fp_svc_cat_penalties: &self.scenario.fp_svc_penalties,
            fp_electricity_cost: self.scenario.fp_electricity_costs,
            fp_fn_cat_asleep_costs: &self.scenario.fp_fn_asleep_costs,
            fp_fn_cat_awake_costs: &self.scenario.fp_fn_awake_costs,
            deltat: self.deltat,
        }
    }

    // ---- CSV output ----------------------------------------------------

    fn stats_header(&self) -> Vec<String> {
        let num_svcs = self.svc_categories.len();
        let mut header = vec![
            "Timestamp".to_owned(),
            "Tag".to_owned(),
            "Replication".to_owned(),
            "VM Allocation Start Time".to_owned(),
            "VM Allocation Duration".to_owned(),
        ];
        header.push("Interval - Local VM Alloc - FP - Predicted Profit".to_owned());
        header.push("Interval - Local VM Alloc - FP - Real Profit".to_owned());
        for svc in 0..num_svcs {
            header.push(format!("Interval - Local VM Alloc - Service {} - Predicted Delay", svc));
            header.push(format!(
                "Interval - Local VM Alloc - Service {} - Predicted Delay vs. Max Delay",
                svc
            ));
            header.push(format!("Interval - Local VM Alloc - Service {} - Real Delay", svc));
            header.push(format!(
                "Interval - Local VM Alloc - Service {} - Real Delay vs. Max Delay",
                svc
            ));
        }
        header.push("Interval - Local VM Alloc - FP - Predicted #FNs".to_owned());
        header.push("Interval - Local VM Alloc - FP - Real #FNs".to_owned());

        header.push("Replication - Local VM Alloc - FP - Predicted Profit".to_owned());
        header.push("Replication - Local VM Alloc - FP - Real Profit".to_owned());
        for svc in 0..num_svcs {
            header.push(format!(
                "Replication - Local VM Alloc - Service {} - Predicted Delay",
                svc
            ));
            header.push(format!(
                "Replication - Local VM Alloc - Service {} - Predicted Delay vs. Max Delay",
                svc
            ));
            header.push(format!("Replication - Local VM Alloc - Service {} - Real Delay", svc));
            header.push(format!(
                "Replication - Local VM Alloc - Service {} - Real Delay vs. Max Delay",
                svc
            ));
        }
        header.push("Replication - Local VM Alloc - Predicted #FNs".to_owned());
        header.push("Replication - Local VM Alloc - Real #FNs".to_owned());
        header.push("Replication - Global VM Alloc - FP - Predicted Profit".to_owned());
        header.push("Replication - Global VM Alloc - FP - Real Profit".to_owned());
        header.push("Replication - Global VM Alloc - FP - Predicted #FNs".to_owned());
        header.push("Replication - Global VM Alloc - FP - Real #FNs".to_owned());

        header.push("Simulation - Local VM Alloc - FP - Mean Predicted Profit".to_owned());
        header.push("Simulation - Local VM Alloc - FP - S.D. Predicted Profit".to_owned());
        header.push("Simulation - Local VM Alloc - FP - Mean Real Profit".to_owned());
        header.push("Simulation - Local VM Alloc - FP - S.D. Real Profit".to_owned());
        for svc in 0..num_svcs {
            header.push(format!(
                "Simulation - Local VM Alloc - Service {} - Mean Predicted Delay",
                svc
            ));
            header.push(format!(
                "Simulation - Local VM Alloc - Service {} - S.D. Predicted Delay",
                svc
            ));
            header.push(format!(
                "Simulation - Local VM Alloc - Service {} - Mean Predicted Delay vs. Max Delay",
                svc
            ));
            header.push(format!(
                "Simulation - Local VM Alloc - Service {} - Mean Real Delay",
                svc
            ));
            header.push(format!(
                "Simulation - Local VM Alloc - Service {} - S.D. Real Delay",
                svc
            ));
            header.push(format!(
                "Simulation - Local VM Alloc - Service {} - Mean Real Delay vs. Max Delay",
                svc
            ));
        }
        header.push("Simulation - Local VM Alloc - FP - Mean Predicted #FNs".to_owned());
        header.push("Simulation - Local VM Alloc - FP - S.D. Predicted #FNs".to_owned());
        header.push("Simulation - Local VM Alloc - FP - Mean Real #FNs".to_owned());
        header.push("Simulation - Local VM Alloc - FP - S.D. Real #FNs".to_owned());
        header.push("Simulation - Global VM Alloc - FP - Mean Predicted Profit".to_owned());
        header.push("Simulation - Global VM Alloc - FP - S.D. Predicted Profit".to_owned());
        header.push("Simulation - Global VM Alloc - FP - Mean Real Profit".to_owned());
        header.push("Simulation - Global VM Alloc - FP - S.D. Real Profit".to_owned());
        header.push("Simulation - Global VM Alloc - FP - Mean Predicted #FNs".to_owned());
        header.push("Simulation - Global VM Alloc - FP - S.D. Predicted #FNs".to_owned());
        header.push("Simulation - Global VM Alloc - FP - Mean Real #FNs".to_owned());
        header.push("Simulation - Global VM Alloc - FP - S.D. Real #FNs".to_owned());
        header
    }

    fn trace_header(&self) -> Vec<String> {
        let num_svcs = self.svc_categories.len();
        let mut header = vec![
            "Timestamp".to_owned(),
            "Replication".to_owned(),
            "VM Allocation Start Time".to_owned(),
            "VM Allocation Duration".to_owned(),
        ];
        header.push("FP - Predicted Profit".to_owned());
        header.push("FP - Real Profit".to_owned());
        for svc in 0..num_svcs {
            header.push(format!("Service {} - Predicted Arrival Rate", svc));
            header.push(format!("Service {} - Delay", svc));
            header.push(format!("Service {} - Real Arrival Rate", svc));
            header.push(format!("Service {} - Real Delay", svc));
        }
        header.push("FP - Predicted #FNs".to_owned());
        header.push("FP - Real #FNs".to_owned());
        header
    }

    #[allow(clippy::too_many_arguments)]
    fn write_interval_stats_row(
        &mut self,
        start_time: f64,
        duration: f64,
        pred_profit: f64,
        real_profit: f64,
        pred_delays: &[f64],
        real_delays: &[f64],
        pred_num_fns: f64,
        real_num_fns: f64,
    ) {
        let num_svcs = self.svc_categories.len();
        let mut row = vec![
            timestamp(),
            CSV_INTERVAL_TAG.to_owned(),
            self.current_replication.to_string(),
            fmt_value(start_time),
            fmt_value(duration),
        ];

        // Interval stats.
        row.push(fmt_value(pred_profit));
        row.push(fmt_value(real_profit));
        for svc in 0..num_svcs {
            let svc_cat = self.svc_categories[svc];
            let max_delay = self.scenario.svc_max_delays[svc_cat];
            row.push(fmt_value(pred_delays[svc]));
            row.push(fmt_value(relative_increment(pred_delays[svc], max_delay)));
            row.push(fmt_value(real_delays[svc]));
            row.push(fmt_value(relative_increment(real_delays[svc], max_delay)));
        }
        row.push(fmt_value(pred_num_fns));
        row.push(fmt_value(real_num_fns));

        // Incremental replication stats.
        row.push(fmt_value(self.rep_pred_profit));
        row.push(fmt_value(self.rep_real_profit));
        for svc in 0..num_svcs {
            let svc_cat = self.svc_categories[svc];
            let max_delay = self.scenario.svc_max_delays[svc_cat];
            let pred = self.rep_svc_pred_delays[svc].estimate();
            let real = self.rep_svc_real_delays[svc].estimate();
            row.push(fmt_value(pred));
            row.push(fmt_value(relative_increment(pred, max_delay)));
            row.push(fmt_value(real));
            row.push(fmt_value(relative_increment(real, max_delay)));
        }
        row.push(fmt_value(self.rep_pred_num_fns.estimate()));
        row.push(fmt_value(self.rep_real_num_fns.estimate()));
        // Global stats are not available at interval granularity.
        for _ in 0..4 {
            row.push(CSV_NA.to_owned());
        }

        // Simulation stats are not available at interval granularity.
        for _ in 0..(8 + 6 * num_svcs + 8) {
            row.push(CSV_NA.to_owned());
        }

        self.write_stats_row(row);
    }

    fn write_replication_stats_row(&mut self) {
        let num_svcs = self.svc_categories.len();
        let mut row = vec![
            timestamp(),
            CSV_REPLICATION_TAG.to_owned(),
            self.current_replication.to_string(),
            CSV_NA.to_owned(),
            CSV_NA.to_owned(),
        ];

        // Interval stats are not available at replication granularity.
        for _ in 0..(4 + 4 * num_svcs) {
            row.push(CSV_NA.to_owned());
        }

        // Final replication stats.
        row.push(fmt_value(self.rep_pred_profit));
        row.push(fmt_value(self.rep_real_profit));
        for svc in 0..num_svcs {
            let svc_cat = self.svc_categories[svc];
            let max_delay = self.scenario.svc_max_delays[svc_cat];
            let pred = self.rep_svc_pred_delays[svc].estimate();
            let real = self.rep_svc_real_delays[svc].estimate();
            row.push(fmt_value(pred));
            row.push(fmt_value(relative_increment(pred, max_delay)));
            row.push(fmt_value(real));
            row.push(fmt_value(relative_increment(real, max_delay)));
        }
        row.push(fmt_value(self.rep_pred_num_fns.estimate()));
        row.push(fmt_value(self.rep_real_num_fns.estimate()));
        row.push(fmt_value(self.rep_global_pred_profit));
        row.push(fmt_value(self.rep_global_real_profit));
        row.push(fmt_value(self.rep_global_pred_num_fns.estimate()));
        row.push(fmt_value(self.rep_global_real_num_fns.estimate()));

        // Running simulation stats.
        self.push_simulation_stats(&mut row);

        self.write_stats_row(row);
    }

    fn write_simulation_stats_row(&mut self) {
        let num_svcs = self.svc_categories.len();
        let mut row = vec![
            timestamp(),
            CSV_SIMULATION_TAG.to_owned(),
            CSV_NA.to_owned(),
            CSV_NA.to_owned(),
            CSV_NA.to_owned(),
        ];
        // Interval and replication stats are not available at simulation
        // granularity.
        for _ in 0..(4 + 4 * num_svcs) {
            row.push(CSV_NA.to_owned());
        }
        for _ in 0..(8 + 4 * num_svcs) {
            row.push(CSV_NA.to_owned());
        }

        self.push_simulation_stats(&mut row);

        self.write_stats_row(row);
    }

    fn push_simulation_stats(&self, row: &mut Vec<String>) {
        let num_svcs = self.svc_categories.len();
        row.push(fmt_value(self.pred_profit_ci.estimate()));
        row.push(fmt_value(self.pred_profit_ci.standard_deviation()));
        row.push(fmt_value(self.real_profit_ci.estimate()));
        row.push(fmt_value(self.real_profit_ci.standard_deviation()));
        for svc in 0..num_svcs {
            let svc_cat = self.svc_categories[svc];
            let max_delay = self.scenario.svc_max_delays[svc_cat];
            let pred = self.svc_pred_delay_ci[svc].estimate();
            let real = self.svc_real_delay_ci[svc].estimate();
            row.push(fmt_value(pred));
            row.push(fmt_value(self.svc_pred_delay_ci[svc].standard_deviation()));
            row.push(fmt_value(relative_increment(pred, max_delay)));
            row.push(fmt_value(real));
            row.push(fmt_value(self.svc_real_delay_ci[svc].standard_deviation()));
            row.push(fmt_value(relative_increment(real, max_delay)));
        }
        row.push(fmt_value(self.pred_num_fns_ci.estimate()));
        row.push(fmt_value(self.pred_num_fns_ci.standard_deviation()));
        row.push(fmt_value(self.real_num_fns_ci.estimate()));
        row.push(fmt_value(self.real_num_fns_ci.standard_deviation()));
        row.push(fmt_value(self.global_pred_profit_ci.estimate()));
        row.push(fmt_value(self.global_pred_profit_ci.standard_deviation()));
        row.push(fmt_value(self.global_real_profit_ci.estimate()));
        row.push(fmt_value(self.global_real_profit_ci.standard_deviation()));
        row.push(fmt_value(self.global_pred_num_fns_ci.estimate()));
        row.push(fmt_value(self.global_pred_num_fns_ci.standard_deviation()));
        row.push(fmt_value(self.global_real_num_fns_ci.estimate()));
        row.push(fmt_value(self.global_real_num_fns_ci.standard_deviation()));
    }

    fn write_stats_row(&mut self, row: Vec<String>) {
        if let Some(writer) = self.stats_writer.as_mut() {
            if let Err(err) = writer.write_record(&row) {
                warn!("Cannot write the stats file: {}", err);
            }
            if let Err(err) = writer.flush() {
                warn!("Cannot flush the stats file: {}", err);
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn write_trace_row(
        &mut self,
        start_time: f64,
        duration: f64,
        pred_profit: f64,
        real_profit: f64,
        pred_rates: &[f64],
        real_rates: &[f64],
        pred_delays: &[f64],
        real_delays: &[f64],
        pred_num_fns: f64,
        real_num_fns: f64,
    ) {
        let num_svcs = self.svc_categories.len();
        let mut row = vec![
            timestamp(),
            self.current_replication.to_string(),
            fmt_value(start_time),
            fmt_value(duration),
        ];
        row.push(fmt_value(pred_profit));
        row.push(fmt_value(real_profit));
        for svc in 0..num_svcs {
            row.push(fmt_value(pred_rates[svc]));
            row.push(fmt_value(pred_delays[svc]));
            row.push(fmt_value(real_rates[svc]));
            row.push(fmt_value(real_delays[svc]));
        }
        row.push(fmt_value(pred_num_fns));
        row.push(fmt_value(real_num_fns));

        if let Some(writer) = self.trace_writer.as_mut() {
            if let Err(err) = writer.write_record(&row) {
                warn!("Cannot write the trace file: {}", err);
            }
            if let Err(err) = writer.flush() {
                warn!("Cannot flush the trace file: {}", err);
            }
        }
    }
}

impl EventHandler for FogExperiment {
    fn on(&mut self, event: Event) {
        cast!(match event.data {
            VmAllocationTrigger { start_time, stop_time } => {
                self.process_trigger(start_time, stop_time);
            }
        })
    }
}

/// Response times achievable with 0..=min VMs; index 0 is infinite unless no
/// VMs are needed at all.
fn delay_table(rate: f64, mu: f64, min_num_vms: Option<usize>) -> Vec<f64> {
    match min_num_vms {
        Some(0) => vec![0.],
        Some(min) => {
            let mut table = vec![f64::INFINITY; min + 1];
            for n in 1..=min {
                table[n] = queueing::avg_response_time(rate, mu, n);
            }
            table
        }
        None => Vec::new(),
    }
}

fn lookup_delay(tables: &DelayTables, svc: usize, vm_cat: usize, num_vms: usize) -> f64 {
    tables[svc][vm_cat]
        .get(num_vms)
        .copied()
        .unwrap_or(f64::INFINITY)
}

fn collect_if_finite(estimator: &mut CiMeanEstimator, value: f64) {
    if value.is_finite() {
        estimator.collect(value);
    }
}

#[cfg(feature = "strict-checks")]
fn solution_check_failed() {
    panic!("Returned VM allocation solution is not consistent");
}

#[cfg(not(feature = "strict-checks"))]
fn solution_check_failed() {
    warn!("Returned VM allocation solution is not consistent");
}

fn timestamp() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_owned())
}

fn fmt_value(x: f64) -> String {
    if x.is_finite() {
        x.to_string()
    } else {
        CSV_NA.to_owned()
    }
}

/// Relative deviation of `x` from the reference bound.
fn relative_increment(x: f64, reference: f64) -> f64 {
    if reference != 0. {
        (x - reference) / reference
    } else {
        f64::INFINITY
    }
}
