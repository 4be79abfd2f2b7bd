//! Simulation configuration and execution. Library API.

use std::cell::RefCell;
use std::rc::Rc;

use log::info;
use sugars::{rc, refcell};

use fogsim_core::Simulation;

use crate::core::common::{shared_rng, UserMobilityModelKind};
use crate::core::estimators::{make_estimator, ArrivalRateEstimator};
use crate::core::mobility::{
    FixedUserMobilityModel, RandomWaypointUserMobilityModel, StepUserMobilityModel,
    UserMobilityModel,
};
use crate::core::scenario::{Scenario, ScenarioError};
use crate::experiment::{ExperimentConfig, FogExperiment};

/// Wires the scenario into an experiment driven by the event simulation
/// kernel and runs replications until statistical completion.
pub struct FogSimulation {
    sim: Simulation,
    experiment: Rc<RefCell<FogExperiment>>,
    config: ExperimentConfig,
}

impl FogSimulation {
    /// Builds the simulation: user mobility model, per-service arrival-rate
    /// estimators, placement solvers and the experiment driver.
    pub fn new(scenario: Scenario, config: ExperimentConfig) -> Result<Self, ScenarioError> {
        let mut sim = Simulation::new(config.rng_seed);

        let mobility_model = build_mobility_model(&scenario)?;

        // A single master engine is shared by handle between all stochastic
        // estimators, so one seed reproduces the whole experiment.
        let rng = shared_rng(config.rng_seed);
        let estimators: Vec<Box<dyn ArrivalRateEstimator>> = (0..scenario.num_svcs())
            .map(|_| {
                make_estimator(
                    scenario.svc_arrival_rate_estimation,
                    &scenario.svc_arrival_rate_estimation_params,
                    rng.clone(),
                )
            })
            .collect();

        let ctx = sim.create_context("experiment");
        let experiment = rc!(refcell!(FogExperiment::new(
            scenario,
            &config,
            mobility_model,
            estimators,
            ctx,
        )));
        sim.add_handler("experiment", experiment.clone());

        Ok(Self {
            sim,
            experiment,
            config,
        })
    }

    /// Runs the whole simulation: replications are executed until every
    /// watched statistic is done (or unable to converge) or the replication
    /// cap is reached.
    ///
    /// Returns the number of executed replications.
    pub fn run(&mut self) -> anyhow::Result<usize> {
        self.experiment
            .borrow_mut()
            .initialize_simulation(&self.config)?;

        loop {
            self.sim.reset();
            self.experiment.borrow_mut().initialize_replication();
            let replication = self.experiment.borrow().current_replication();
            info!("Starting replication #{}", replication);

            // Fire events until the replication duration is exhausted or no
            // events remain.
            while self.sim.time() < self.config.max_replication_duration {
                if !self.sim.step() {
                    break;
                }
            }

            self.experiment.borrow_mut().finalize_replication();

            let done = self.experiment.borrow().stats_done();
            let capped = self.config.max_num_replications > 0
                && replication >= self.config.max_num_replications;
            if done || capped {
                break;
            }
        }

        self.experiment.borrow_mut().finalize_simulation();

        Ok(self.experiment.borrow().current_replication())
    }

    /// Access to the experiment driver (statistics, state inspection).
    pub fn experiment(&self) -> Rc<RefCell<FogExperiment>> {
        self.experiment.clone()
    }

    /// Current simulated time.
    pub fn time(&self) -> f64 {
        self.sim.time()
    }
}

/// Builds the user mobility model configured in the scenario.
pub fn build_mobility_model(
    scenario: &Scenario,
) -> Result<Box<dyn UserMobilityModel>, ScenarioError> {
    let params = &scenario.svc_user_mobility_model_params;

    let last_param = |name: &str| -> Option<&String> { params.get(name).and_then(|v| v.last()) };
    let parse_param = |name: &'static str| -> Result<f64, ScenarioError> {
        last_param(name)
            .ok_or_else(|| {
                ScenarioError::Invalid(format!(
                    "missing mandatory user mobility model parameter '{}'",
                    name
                ))
            })?
            .parse()
            .map_err(|_| {
                ScenarioError::Invalid(format!("invalid user mobility model parameter '{}'", name))
            })
    };

    match scenario.svc_user_mobility_model {
        UserMobilityModelKind::Fixed => {
            let num_users = parse_param("n")? as usize;
            Ok(Box::new(FixedUserMobilityModel::new(num_users)))
        }
        UserMobilityModelKind::Step => {
            let values = params.get("n").ok_or_else(|| {
                ScenarioError::Invalid(
                    "missing mandatory user mobility model parameter 'n'".to_owned(),
                )
            })?;
            let seq = values
                .iter()
                .map(|v| v.parse::<usize>())
                .collect::<Result<Vec<_>, _>>()
                .map_err(|_| {
                    ScenarioError::Invalid(
                        "invalid user mobility model parameter 'n'".to_owned(),
                    )
                })?;
            Ok(Box::new(StepUserMobilityModel::new(seq)))
        }
        UserMobilityModelKind::RandomWaypoint => {
            let nr_nodes = parse_param("nr_nodes")? as usize;
            let max_x = parse_param("max_x")?;
            let max_y = parse_param("max_y")?;
            let min_v = match last_param("min_v") {
                Some(_) => parse_param("min_v")?,
                None => RandomWaypointUserMobilityModel::DEFAULT_MIN_V,
            };
            let max_v = match last_param("max_v") {
                Some(_) => parse_param("max_v")?,
                None => RandomWaypointUserMobilityModel::DEFAULT_MAX_V,
            };
            let max_wt = match last_param("max_wt") {
                Some(_) => parse_param("max_wt")?,
                None => RandomWaypointUserMobilityModel::DEFAULT_MAX_WT,
            };
            let seed = match last_param("seed") {
                Some(_) => parse_param("seed")? as u64,
                None => RandomWaypointUserMobilityModel::DEFAULT_SEED,
            };
            Ok(Box::new(RandomWaypointUserMobilityModel::new(
                nr_nodes, max_x, max_y, min_v, max_v, max_wt, seed,
            )))
        }
    }
}
