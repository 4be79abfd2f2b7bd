use std::collections::BTreeSet;

use fogsim::core::vm_allocation::{
    check_vm_allocation, make_multislot_solver, make_solver, FnVmAllocations, MinNumVms,
    MultislotVmAllocationProblem, VmAllocationProblem,
};
use fogsim::core::common::VmAllocationPolicy;

const RELTOL: f64 = 1e-6;

fn assert_close(a: f64, b: f64, tol: f64) {
    assert!((a - b).abs() <= tol, "{} !~ {}", a, b);
}

/// Parameter set shared by the basic scenarios: one service category, one VM
/// category, variable fog node layout.
struct Fixture {
    fn_categories: Vec<usize>,
    fn_power_states: Vec<bool>,
    fn_vm_allocations: FnVmAllocations,
    fn_cat_min_powers: Vec<f64>,
    fn_cat_max_powers: Vec<f64>,
    vm_cat_cpu_shares: Vec<Vec<f64>>,
    vm_cat_alloc_costs: Vec<f64>,
    svc_categories: Vec<usize>,
    svc_vm_cat_min_num_vms: MinNumVms,
    fp_svc_cat_revenues: Vec<f64>,
    fp_svc_cat_penalties: Vec<f64>,
    fp_electricity_cost: f64,
    fp_fn_cat_asleep_costs: Vec<f64>,
    fp_fn_cat_awake_costs: Vec<f64>,
    deltat: f64,
}

impl Fixture {
    fn single_fn() -> Self {
        Self {
            fn_categories: vec![0],
            fn_power_states: vec![false],
            fn_vm_allocations: vec![Default::default()],
            fn_cat_min_powers: vec![10.],
            fn_cat_max_powers: vec![100.],
            vm_cat_cpu_shares: vec![vec![0.5]],
            vm_cat_alloc_costs: vec![0.],
            svc_categories: vec![0],
            svc_vm_cat_min_num_vms: vec![vec![Some(2)]],
            fp_svc_cat_revenues: vec![10.],
            fp_svc_cat_penalties: vec![100.],
            fp_electricity_cost: 0.1,
            fp_fn_cat_asleep_costs: vec![0.],
            fp_fn_cat_awake_costs: vec![0.],
            deltat: 1.,
        }
    }

    fn problem<'a>(&'a self, fixed_fns: Option<&'a BTreeSet<usize>>) -> VmAllocationProblem<'a> {
        VmAllocationProblem {
            fn_categories: &self.fn_categories,
            fn_power_states: &self.fn_power_states,
            fn_vm_allocations: &self.fn_vm_allocations,
            fixed_fns,
            fn_cat_min_powers: &self.fn_cat_min_powers,
            fn_cat_max_powers: &self.fn_cat_max_powers,
            vm_cat_cpu_shares: &self.vm_cat_cpu_shares,
            vm_cat_alloc_costs: &self.vm_cat_alloc_costs,
            svc_categories: &self.svc_categories,
            svc_vm_cat_min_num_vms: &self.svc_vm_cat_min_num_vms,
            fp_svc_cat_revenues: &self.fp_svc_cat_revenues,
            fp_svc_cat_penalties: &self.fp_svc_cat_penalties,
            fp_electricity_cost: self.fp_electricity_cost,
            fp_fn_cat_asleep_costs: &self.fp_fn_cat_asleep_costs,
            fp_fn_cat_awake_costs: &self.fp_fn_cat_awake_costs,
            deltat: self.deltat,
        }
    }
}

#[test]
// One node, one service needing two VMs at half CPU each: power the node,
// allocate both VMs. Revenue 2 * 10, energy (10 + 90 * 1.0) * 0.1 = 10.
fn test_profitable_service_is_fully_allocated() {
    let fixture = Fixture::single_fn();
    let solver = make_solver(VmAllocationPolicy::Optimal, RELTOL, -1.);
    let solution = solver.solve(&fixture.problem(None));

    assert!(solution.solved);
    assert!(solution.optimal);
    assert_eq!(solution.fn_power_states, vec![true]);
    assert_eq!(solution.fn_vm_allocations[0].get(&0), Some(&(0, 2)));
    assert_close(solution.fn_cpu_allocations[0], 1.0, 1e-9);
    assert_close(solution.revenue, 20., 1e-6);
    assert_close(solution.cost, 10., 1e-6);
    assert_close(solution.profit, 10., 1e-6);
    assert!(check_vm_allocation(&solution, &fixture.problem(None), RELTOL));
}

#[test]
// Same as above with electricity at 1.5: serving would cost 150 for a
// revenue of 20, which is worse than paying the 100 penalty, so the optimum
// is to serve nothing and power nothing.
fn test_unprofitable_service_pays_penalty() {
    let mut fixture = Fixture::single_fn();
    fixture.fp_electricity_cost = 1.5;
    let solver = make_solver(VmAllocationPolicy::Optimal, RELTOL, -1.);
    let solution = solver.solve(&fixture.problem(None));

    assert!(solution.solved);
    assert_eq!(solution.fn_power_states, vec![false]);
    assert!(solution.fn_vm_allocations[0].is_empty());
    assert_close(solution.revenue, 0., 1e-9);
    assert_close(solution.cost, 100., 1e-6);
    assert_close(solution.profit, -100., 1e-6);
}

#[test]
// Two node categories with power profiles (10, 50) and (20, 30): at full
// load the second category draws 30 W against 50 W, so the optimizer must
// place the workload there.
fn test_lower_energy_category_is_preferred() {
    let mut fixture = Fixture::single_fn();
    fixture.fn_categories = vec![0, 1];
    fixture.fn_power_states = vec![false, false];
    fixture.fn_vm_allocations = vec![Default::default(), Default::default()];
    fixture.fn_cat_min_powers = vec![10., 20.];
    fixture.fn_cat_max_powers = vec![50., 30.];
    fixture.vm_cat_cpu_shares = vec![vec![0.5, 0.5]];
    fixture.fp_fn_cat_asleep_costs = vec![0., 0.];
    fixture.fp_fn_cat_awake_costs = vec![0., 0.];

    let solver = make_solver(VmAllocationPolicy::Optimal, RELTOL, -1.);
    let solution = solver.solve(&fixture.problem(None));

    assert!(solution.solved);
    assert_eq!(solution.fn_power_states, vec![false, true]);
    assert_eq!(solution.fn_vm_allocations[1].get(&0), Some(&(0, 2)));
    // Revenue 20, energy (20 + 10 * 1.0) * 0.1 = 3.
    assert_close(solution.profit, 17., 1e-6);
}

#[test]
// Two services competing for one node that can host only one of them in
// full: the optimizer serves the higher-revenue service and pays the other
// service's penalty.
fn test_capacity_forces_service_selection() {
    let mut fixture = Fixture::single_fn();
    fixture.svc_categories = vec![0, 1];
    fixture.svc_vm_cat_min_num_vms = vec![vec![Some(2)], vec![Some(2)]];
    fixture.fp_svc_cat_revenues = vec![10., 20.];
    fixture.fp_svc_cat_penalties = vec![50., 50.];

    let solver = make_solver(VmAllocationPolicy::Optimal, RELTOL, -1.);
    let solution = solver.solve(&fixture.problem(None));

    assert!(solution.solved);
    let (_, svc0_vms) = solution.svc_allocation(0);
    let (_, svc1_vms) = solution.svc_allocation(1);
    assert_eq!(svc0_vms, 0);
    assert_eq!(svc1_vms, 2);
    // Revenue 40, energy 10, penalty 50 for the unserved service.
    assert_close(solution.profit, 40. - 10. - 50., 1e-6);
}

#[test]
// Pinned power states: the real-workload re-solve may only use the nodes
// selected by the predicted solution, even when more capacity would pay off.
fn test_fixed_fns_restrict_the_feasible_nodes() {
    let mut fixture = Fixture::single_fn();
    fixture.fn_categories = vec![0, 1];
    fixture.fn_power_states = vec![false, false];
    fixture.fn_vm_allocations = vec![Default::default(), Default::default()];
    fixture.fn_cat_min_powers = vec![10., 20.];
    fixture.fn_cat_max_powers = vec![50., 30.];
    fixture.vm_cat_cpu_shares = vec![vec![0.5, 0.5]];
    fixture.fp_fn_cat_asleep_costs = vec![0., 0.];
    fixture.fp_fn_cat_awake_costs = vec![0., 0.];
    fixture.svc_vm_cat_min_num_vms = vec![vec![Some(3)]];

    let solver = make_solver(VmAllocationPolicy::Optimal, RELTOL, -1.);

    // Unrestricted: three VMs spread over both nodes, no penalty.
    let free = solver.solve(&fixture.problem(None));
    assert!(free.solved);
    assert_eq!(free.num_powered_on(), 2);
    assert_close(free.profit, 30. - 6., 1e-6);

    // Restricted to the second node: only two VMs fit, the penalty applies
    // and the pinned node pays its idle power in any case.
    let fixed: BTreeSet<usize> = [1].into_iter().collect();
    let restricted = solver.solve(&fixture.problem(Some(&fixed)));
    assert!(restricted.solved);
    assert_eq!(restricted.fn_power_states, vec![false, true]);
    let (_, vms) = restricted.svc_allocation(0);
    assert_eq!(vms, 2);
    assert_close(restricted.profit, 20. - 3. - 100., 1e-6);
}

#[test]
// Reallocation costs are charged only for the VM count increase on the same
// (node, service, category); a category change pays the full price.
fn test_reallocation_costs_honor_previous_allocations() {
    let mut fixture = Fixture::single_fn();
    fixture.vm_cat_alloc_costs = vec![3.];
    fixture.fn_power_states = vec![true];
    fixture.fn_vm_allocations[0].insert(0, (0, 1));

    let solver = make_solver(VmAllocationPolicy::Optimal, RELTOL, -1.);
    let solution = solver.solve(&fixture.problem(None));

    assert!(solution.solved);
    assert_eq!(solution.fn_vm_allocations[0].get(&0), Some(&(0, 2)));
    // One of the two VMs is already in place: only one allocation is paid.
    // Revenue 20, energy 10, reallocation 3.
    assert_close(solution.profit, 20. - 10. - 3., 1e-6);
}

#[test]
// Switch-on and switch-off costs follow the previous power states.
fn test_switching_costs() {
    let mut fixture = Fixture::single_fn();
    fixture.fn_categories = vec![0, 0];
    fixture.fn_power_states = vec![false, true];
    fixture.fn_vm_allocations = vec![Default::default(), Default::default()];
    fixture.fp_fn_cat_awake_costs = vec![2.];
    fixture.fp_fn_cat_asleep_costs = vec![1.];

    let solver = make_solver(VmAllocationPolicy::Optimal, RELTOL, -1.);
    let solution = solver.solve(&fixture.problem(None));

    assert!(solution.solved);
    // The workload fits one node; reusing the already-on node avoids the
    // switch-on cost, and no switch-off is paid for it.
    assert_eq!(solution.fn_power_states, vec![false, true]);
    assert_close(solution.profit, 20. - 10., 1e-6);
}

#[test]
// The matching heuristic produces a feasible (never optimal) solution that
// honors the same invariants as the exact solver.
fn test_matching_heuristic_solution_is_consistent() {
    let mut fixture = Fixture::single_fn();
    fixture.fn_categories = vec![0, 0];
    fixture.fn_power_states = vec![false, false];
    fixture.fn_vm_allocations = vec![Default::default(), Default::default()];

    for policy in [
        VmAllocationPolicy::Bahreini2017Match,
        VmAllocationPolicy::Bahreini2017MatchAlt,
    ] {
        let solver = make_solver(policy, RELTOL, -1.);
        let solution = solver.solve(&fixture.problem(None));

        assert!(solution.solved);
        assert!(!solution.optimal);
        assert!(check_vm_allocation(&solution, &fixture.problem(None), RELTOL));
        assert_close(solution.profit, solution.revenue - solution.cost, 1e-9);
    }
}

#[test]
// The base matching variant offers one slot per node, so a service needing
// two VMs on a two-node deployment is fully served.
fn test_matching_base_places_one_vm_per_node() {
    let mut fixture = Fixture::single_fn();
    fixture.fn_categories = vec![0, 0];
    fixture.fn_power_states = vec![false, false];
    fixture.fn_vm_allocations = vec![Default::default(), Default::default()];

    let solver = make_solver(VmAllocationPolicy::Bahreini2017Match, RELTOL, -1.);
    let solution = solver.solve(&fixture.problem(None));

    assert!(solution.solved);
    let (_, vms) = solution.svc_allocation(0);
    assert_eq!(vms, 2);
    assert_eq!(solution.num_powered_on(), 2);
}

#[test]
// The alt matching variant packs virtual slots by CPU, so both VMs land on
// a single node.
fn test_matching_alt_packs_by_cpu() {
    let mut fixture = Fixture::single_fn();
    fixture.fn_categories = vec![0, 0];
    fixture.fn_power_states = vec![false, false];
    fixture.fn_vm_allocations = vec![Default::default(), Default::default()];

    let solver = make_solver(VmAllocationPolicy::Bahreini2017MatchAlt, RELTOL, -1.);
    let solution = solver.solve(&fixture.problem(None));

    assert!(solution.solved);
    let (_, vms) = solution.svc_allocation(0);
    assert_eq!(vms, 2);
    assert_eq!(solution.num_powered_on(), 1);
    assert_close(solution.fn_cpu_allocations[0], 1.0, 1e-9);
}

#[test]
// Multi-slot oracle: when switching back and forth is dearer than idling,
// the oracle keeps the node powered across an idle slot, while the myopic
// per-slot solver switches it off.
fn test_multislot_oracle_keeps_node_on_across_idle_slot() {
    let fixture = {
        let mut fixture = Fixture::single_fn();
        fixture.fn_cat_min_powers = vec![100.];
        fixture.fn_cat_max_powers = vec![200.];
        // Idle energy per slot: 100 * 0.1 = 10; switching off and on again
        // costs 4 + 8 = 12.
        fixture.fp_fn_cat_asleep_costs = vec![4.];
        fixture.fp_fn_cat_awake_costs = vec![8.];
        fixture.fp_svc_cat_revenues = vec![100.];
        fixture
    };

    let busy = vec![vec![Some(2)]];
    let idle = vec![vec![Some(0)]];
    let demand = vec![busy.clone(), idle.clone(), busy.clone()];

    let problem = MultislotVmAllocationProblem {
        fn_categories: &fixture.fn_categories,
        fn_power_states: &fixture.fn_power_states,
        fn_vm_allocations: &fixture.fn_vm_allocations,
        fn_cat_min_powers: &fixture.fn_cat_min_powers,
        fn_cat_max_powers: &fixture.fn_cat_max_powers,
        vm_cat_cpu_shares: &fixture.vm_cat_cpu_shares,
        vm_cat_alloc_costs: &fixture.vm_cat_alloc_costs,
        svc_categories: &fixture.svc_categories,
        slot_svc_vm_cat_min_num_vms: &demand,
        fp_svc_cat_revenues: &fixture.fp_svc_cat_revenues,
        fp_svc_cat_penalties: &fixture.fp_svc_cat_penalties,
        fp_electricity_cost: fixture.fp_electricity_cost,
        fp_fn_cat_asleep_costs: &fixture.fp_fn_cat_asleep_costs,
        fp_fn_cat_awake_costs: &fixture.fp_fn_cat_awake_costs,
        deltat: fixture.deltat,
    };

    let solver = make_multislot_solver(RELTOL, -1.);
    let solution = solver.solve(&problem);

    assert!(solution.solved);
    // The oracle keeps the node on through the idle middle slot: 10 < 12.
    assert_eq!(solution.fn_power_states[0], vec![true]);
    assert_eq!(solution.fn_power_states[1], vec![true]);
    assert_eq!(solution.fn_power_states[2], vec![true]);
    assert!(solution.fn_vm_allocations[1][0].is_empty());

    // The myopic single-slot solver, put in the idle slot with the node on,
    // switches it off: paying 4 beats idling at 10.
    let mut slot_fixture = Fixture::single_fn();
    slot_fixture.fn_cat_min_powers = vec![100.];
    slot_fixture.fn_cat_max_powers = vec![200.];
    slot_fixture.fp_fn_cat_asleep_costs = vec![4.];
    slot_fixture.fp_fn_cat_awake_costs = vec![8.];
    slot_fixture.fp_svc_cat_revenues = vec![100.];
    slot_fixture.fn_power_states = vec![true];
    slot_fixture.svc_vm_cat_min_num_vms = vec![vec![Some(0)]];

    let single_slot = make_solver(VmAllocationPolicy::Optimal, RELTOL, -1.);
    let myopic = single_slot.solve(&slot_fixture.problem(None));
    assert!(myopic.solved);
    assert_eq!(myopic.fn_power_states, vec![false]);
    assert_close(myopic.profit, -4., 1e-6);
}

#[test]
// An infeasible (service, category) pair cannot be allocated; with no
// feasible category at all the service is unserved and pays its penalty.
fn test_infeasible_demand_is_never_allocated() {
    let mut fixture = Fixture::single_fn();
    fixture.svc_vm_cat_min_num_vms = vec![vec![None]];

    let solver = make_solver(VmAllocationPolicy::Optimal, RELTOL, -1.);
    let solution = solver.solve(&fixture.problem(None));

    assert!(solution.solved);
    assert!(solution.fn_vm_allocations[0].is_empty());
    assert_close(solution.profit, -100., 1e-6);
}

#[test]
// CPU capacity (I2) holds in every accepted solution even when demand
// exceeds what the deployment can host.
fn test_cpu_capacity_is_respected_under_pressure() {
    let mut fixture = Fixture::single_fn();
    fixture.svc_vm_cat_min_num_vms = vec![vec![Some(10)]];
    fixture.fp_svc_cat_penalties = vec![5.];

    let solver = make_solver(VmAllocationPolicy::Optimal, RELTOL, -1.);
    let solution = solver.solve(&fixture.problem(None));

    assert!(solution.solved);
    assert!(solution.fn_cpu_allocations[0] <= 1.0 + RELTOL);
    let (_, vms) = solution.svc_allocation(0);
    assert!(vms <= 2);
}
