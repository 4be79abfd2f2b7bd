use std::path::PathBuf;

use fogsim::core::common::RealWorkloadAllocation;
use fogsim::core::scenario::Scenario;
use fogsim::experiment::ExperimentConfig;
use fogsim::simulation::FogSimulation;

fn assert_close(a: f64, b: f64, tol: f64) {
    assert!((a - b).abs() <= tol, "{} !~ {}", a, b);
}

/// One node category, one service, one VM category; two fixed users drive an
/// arrival rate of 2, which needs 2 VMs (c = 1 is unstable, c = 2 yields a
/// response time of 2/3 <= 1).
fn base_scenario() -> String {
    r#"
num_fn_categories = 1
num_svc_categories = 1
num_vm_categories = 1

svc.arrival_rates = [1]
svc.max_arrival_rates = [10]
svc.max_delays = [1]
svc.vm_service_rates = [[2]]
svc.arrival_rate_estimation = mro
svc.delay_tolerance = 0
svc.user_mobility_model = fixed
svc.user_mobility_model_params = [n 2]

fp.num_svcs = [1]
fp.num_fns = [1]
fp.electricity_costs = 0.1
fp.fn_asleep_costs = [0]
fp.fn_awake_costs = [0]
fp.svc_revenues = [10]
fp.svc_penalties = [100]
fp.vm_allocation_interval = 1
fp.vm_allocation_policy = optimal

fn.min_powers = [10]
fn.max_powers = [100]

vm.cpu_requirements = [[0.5]]
vm.allocation_costs = [0]
"#
    .to_owned()
}

fn config(max_rep_len: f64, max_num_rep: usize) -> ExperimentConfig {
    ExperimentConfig {
        rng_seed: 42,
        optim_relative_tolerance: 1e-6,
        max_replication_duration: max_rep_len,
        max_num_replications: max_num_rep,
        ..ExperimentConfig::default()
    }
}

#[test]
// Every interval powers the single node and allocates 2 VMs: revenue 20,
// energy (10 + 90 * 1.0) * 0.1 = 10, profit 10 per interval. The realized
// workload equals the prediction, and so does the multi-slot oracle.
fn test_fixed_users_single_replication() {
    let scenario = Scenario::parse(&base_scenario()).unwrap();
    let mut sim = FogSimulation::new(scenario, config(5., 1)).unwrap();
    let replications = sim.run().unwrap();
    assert_eq!(replications, 1);

    let experiment = sim.experiment();
    let experiment = experiment.borrow();
    assert_close(experiment.replication_pred_profit(), 50., 1e-6);
    assert_close(experiment.replication_real_profit(), 50., 1e-6);
    assert_close(experiment.replication_pred_num_fns(), 1., 1e-9);
    assert_close(experiment.replication_real_num_fns(), 1., 1e-9);
    assert_close(experiment.replication_global_pred_profit(), 50., 1e-6);
    assert_close(experiment.replication_global_real_profit(), 50., 1e-6);
    assert_eq!(experiment.fn_power_states(), &[true]);
}

#[test]
// With electricity at 1.5 serving costs 150 against 20 of revenue, which is
// worse than the 100 penalty: the optimizer keeps everything off and the
// provider books the penalty each interval.
fn test_unprofitable_scenario_records_penalties() {
    let text = base_scenario().replace(
        "fp.electricity_costs = 0.1",
        "fp.electricity_costs = 1.5",
    );
    let scenario = Scenario::parse(&text).unwrap();
    let mut sim = FogSimulation::new(scenario, config(5., 1)).unwrap();
    sim.run().unwrap();

    let experiment = sim.experiment();
    let experiment = experiment.borrow();
    assert_close(experiment.replication_pred_profit(), -500., 1e-6);
    assert_close(experiment.replication_real_profit(), -500., 1e-6);
    assert_close(experiment.replication_pred_num_fns(), 0., 1e-9);
    assert_eq!(experiment.fn_power_states(), &[false]);
}

#[test]
// Deterministic replications produce identical profits, so the watched
// confidence intervals reach any relative precision with the minimum sample
// size and the simulation stops after two replications.
fn test_statistical_termination() {
    let scenario = Scenario::parse(&base_scenario()).unwrap();
    let mut sim = FogSimulation::new(scenario, config(2., 0)).unwrap();
    let replications = sim.run().unwrap();
    assert_eq!(replications, 2);

    let experiment = sim.experiment();
    let experiment = experiment.borrow();
    assert!(experiment.pred_profit_stats().done());
    assert!(experiment.real_profit_stats().done());
    assert!(experiment.global_pred_profit_stats().done());
    assert!(experiment.global_real_profit_stats().done());
    assert_eq!(experiment.pred_profit_stats().len(), 2);
    assert_close(experiment.pred_profit_stats().estimate(), 20., 1e-6);
}

#[test]
// Step user source [2 0 2 0]: the trace file records the periodic arrival
// rates, and the realized rate equals the prediction because the estimator
// is reset at the end of every interval.
fn test_step_source_trace_series() {
    let text = base_scenario()
        .replace("svc.user_mobility_model = fixed", "svc.user_mobility_model = step")
        .replace(
            "svc.user_mobility_model_params = [n 2]",
            "svc.user_mobility_model_params = [n 2 n 0 n 2 n 0]",
        )
        .replace(
            "svc.arrival_rate_estimation = mro",
            "svc.arrival_rate_estimation = ewma",
        )
        + "svc.arrival_rate_estimation_params = [0.5]\n";
    let scenario = Scenario::parse(&text).unwrap();

    let trace_path: PathBuf = std::env::temp_dir().join("fogsim_test_step_source_trace.csv");
    let mut cfg = config(4., 1);
    cfg.output_trace_file = Some(trace_path.clone());

    let mut sim = FogSimulation::new(scenario, cfg).unwrap();
    sim.run().unwrap();

    let mut reader = csv::Reader::from_path(&trace_path).unwrap();
    let headers = reader.headers().unwrap().clone();
    assert_eq!(&headers[4], "FP - Predicted Profit");
    assert_eq!(&headers[6], "Service 0 - Predicted Arrival Rate");

    let mut pred_rates = Vec::new();
    let mut real_rates = Vec::new();
    for record in reader.records() {
        let record = record.unwrap();
        pred_rates.push(record[6].parse::<f64>().unwrap());
        real_rates.push(record[8].parse::<f64>().unwrap());
    }
    assert_eq!(pred_rates, vec![2., 0., 2., 0.]);
    assert_eq!(real_rates, pred_rates);

    std::fs::remove_file(&trace_path).ok();
}

#[test]
// ALLOCATE_NONE keeps the predicted placement and only adjusts the profit:
// the degenerate Beta estimator pins the realized rate at 4, which needs 3
// VMs while only 2 were allocated, so each interval pays the penalty.
fn test_allocate_none_profit_adjustment() {
    let text = base_scenario()
        .replace(
            "svc.arrival_rate_estimation = mro",
            "svc.arrival_rate_estimation = beta",
        )
        + "svc.arrival_rate_estimation_params = [1 1 4 4]\n"
        + "fp.real_workload_allocation = allocate-none\n";
    let scenario = Scenario::parse(&text).unwrap();
    let mut sim = FogSimulation::new(scenario, config(3., 1)).unwrap();
    sim.run().unwrap();

    let experiment = sim.experiment();
    let experiment = experiment.borrow();
    assert_close(experiment.replication_pred_profit(), 30., 1e-6);
    // 10 - 100 per interval.
    assert_close(experiment.replication_real_profit(), -270., 1e-6);
    // The predicted placement is the one that runs.
    assert_close(experiment.replication_real_num_fns(), 1., 1e-9);
}

/// Two node categories with power profiles (10, 50) and (20, 30): the
/// prediction (rate 2, 2 VMs) lands on the cheaper second category; the
/// degenerate Beta estimator pins the realized rate at 4, which needs 3 VMs.
fn two_category_scenario() -> String {
    r#"
num_fn_categories = 2
num_svc_categories = 1
num_vm_categories = 1

svc.arrival_rates = [1]
svc.max_arrival_rates = [10]
svc.max_delays = [1]
svc.vm_service_rates = [[2]]
svc.arrival_rate_estimation = beta
svc.arrival_rate_estimation_params = [1 1 4 4]
svc.delay_tolerance = 0
svc.user_mobility_model = fixed
svc.user_mobility_model_params = [n 2]

fp.num_svcs = [1]
fp.num_fns = [1 1]
fp.electricity_costs = 0.1
fp.fn_asleep_costs = [0 0]
fp.fn_awake_costs = [0 0]
fp.svc_revenues = [10]
fp.svc_penalties = [100]
fp.vm_allocation_interval = 1
fp.vm_allocation_policy = optimal

fn.min_powers = [10 20]
fn.max_powers = [50 30]

vm.cpu_requirements = [[0.5 0.5]]
vm.allocation_costs = [0]
"#
    .to_owned()
}

#[test]
// ALLOCATE_ALL re-solves the realized workload over all nodes: the extra VM
// lands on the first-category node and no penalty is paid.
fn test_allocate_all_uses_extra_capacity() {
    let scenario = Scenario::parse(&two_category_scenario()).unwrap();
    let mut cfg = config(1., 1);
    cfg.real_workload_allocation = Some(RealWorkloadAllocation::AllocateAll);
    let mut sim = FogSimulation::new(scenario, cfg).unwrap();
    sim.run().unwrap();

    let experiment = sim.experiment();
    let experiment = experiment.borrow();
    // Prediction: 2 VMs on the (20, 30) node, revenue 20, energy 3.
    assert_close(experiment.replication_pred_profit(), 17., 1e-6);
    // Realized: 3 VMs over both nodes, revenue 30, energy 3 + 3.
    assert_close(experiment.replication_real_profit(), 24., 1e-6);
    assert_close(experiment.replication_real_num_fns(), 2., 1e-9);
}

#[test]
// ALLOCATE_WITH_FIXED_FNS may only use the nodes selected by the predicted
// solution: the third VM does not fit, so the service is under-served and
// pays the penalty.
fn test_allocate_with_fixed_fns_is_restricted() {
    let scenario = Scenario::parse(&two_category_scenario()).unwrap();
    let mut cfg = config(1., 1);
    cfg.real_workload_allocation = Some(RealWorkloadAllocation::AllocateWithFixedFns);
    let mut sim = FogSimulation::new(scenario, cfg).unwrap();
    sim.run().unwrap();

    let experiment = sim.experiment();
    let experiment = experiment.borrow();
    assert_close(experiment.replication_pred_profit(), 17., 1e-6);
    // Realized on the pinned node only: revenue 20, energy 3, penalty 100.
    assert_close(experiment.replication_real_profit(), -83., 1e-6);
    assert_close(experiment.replication_real_num_fns(), 1., 1e-9);
}

#[test]
// The whole experiment is reproducible from the seed, including the
// stochastic mobility model and estimator.
fn test_deterministic_given_seed() {
    let text = base_scenario()
        .replace("svc.user_mobility_model = fixed", "svc.user_mobility_model = random-waypoint")
        .replace(
            "svc.user_mobility_model_params = [n 2]",
            "svc.user_mobility_model_params = [nr_nodes 50 max_x 100 max_y 100 seed 7]",
        )
        .replace(
            "svc.arrival_rate_estimation = mro",
            "svc.arrival_rate_estimation = perturb-mro",
        )
        + "svc.arrival_rate_estimation_params = [0 0.2]\n";

    let run = || {
        let scenario = Scenario::parse(&text).unwrap();
        let mut sim = FogSimulation::new(scenario, config(5., 1)).unwrap();
        sim.run().unwrap();
        let experiment = sim.experiment();
        let pred = experiment.borrow().replication_pred_profit();
        let real = experiment.borrow().replication_real_profit();
        (pred, real)
    };

    let first = run();
    let second = run();
    assert_eq!(first, second);
}
