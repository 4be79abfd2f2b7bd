//! Scenario file parsing and serialization.
//!
//! Scenarios are line-oriented: one `key = value` pair per line, `#` starts a
//! comment, keys are case-insensitive, values are scalars, `[v1 v2 ...]`
//! vectors or `[[...] [...]]` matrices. See the bundled scenario files for
//! examples.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

use serde::Serialize;
use thiserror::Error;

use crate::core::common::{
    ArrivalRateEstimation, RealWorkloadAllocation, UserMobilityModelKind, VmAllocationPolicy,
};

/// Scenario loading/validation failure. Fatal at startup.
#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("cannot read scenario file: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed scenario file (line {line}): {msg}")]
    Parse { line: usize, msg: String },
    #[error("missing mandatory scenario key '{0}'")]
    MissingKey(&'static str),
    #[error("invalid scenario: {0}")]
    Invalid(String),
}

/// Parameters of one simulated deployment.
///
/// Category-indexed vectors are per fog-node category (`fn_*`,
/// `fp_fn_*`, `fp_num_fns`), per service category (`svc_*`, `fp_svc_*`,
/// `fp_num_svcs`) or per VM category (`vm_allocation_costs`); matrices are
/// indexed as documented on each field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Scenario {
    pub num_fn_categories: usize,
    pub num_svc_categories: usize,
    pub num_vm_categories: usize,
    /// Per-user request arrival rate, by service category.
    pub svc_arrival_rates: Vec<f64>,
    /// Aggregate arrival rate cap, by service category.
    pub svc_max_arrival_rates: Vec<f64>,
    /// Response time bound, by service category.
    pub svc_max_delays: Vec<f64>,
    /// Service rate of one VM, by (service category, VM category).
    pub svc_vm_service_rates: Vec<Vec<f64>>,
    pub svc_arrival_rate_estimation: ArrivalRateEstimation,
    pub svc_arrival_rate_estimation_params: Vec<f64>,
    /// Tolerance on the response time bound used by the M/M/c sizing.
    pub svc_delay_tolerance: f64,
    pub svc_user_mobility_model: UserMobilityModelKind,
    /// Mobility model parameters as `name -> values` (a name repeated in the
    /// scenario accumulates values, e.g. the `n` sequence of the step model).
    pub svc_user_mobility_model_params: BTreeMap<String, Vec<String>>,
    /// Number of service instances, by service category.
    pub fp_num_svcs: Vec<usize>,
    /// Number of fog nodes, by fog node category.
    pub fp_num_fns: Vec<usize>,
    /// Electricity cost, in currency per energy unit.
    pub fp_electricity_costs: f64,
    /// Cost to power off a fog node, by fog node category.
    pub fp_fn_asleep_costs: Vec<f64>,
    /// Cost to power on a fog node, by fog node category.
    pub fp_fn_awake_costs: Vec<f64>,
    /// Revenue of one allocated VM per unit of time, by service category.
    pub fp_svc_revenues: Vec<f64>,
    /// QoS violation penalty, by service category.
    pub fp_svc_penalties: Vec<f64>,
    /// Idle power draw, by fog node category.
    pub fn_min_powers: Vec<f64>,
    /// Full-load power draw, by fog node category.
    pub fn_max_powers: Vec<f64>,
    /// CPU share required by one VM, by (VM category, fog node category).
    pub vm_cpu_requirements: Vec<Vec<f64>>,
    /// RAM required by one VM, by (VM category, fog node category).
    pub vm_ram_requirements: Vec<Vec<f64>>,
    /// Cost to allocate one VM, by VM category.
    pub vm_allocation_costs: Vec<f64>,
    /// Slot length, in time units.
    pub fp_vm_allocation_interval: f64,
    pub fp_vm_allocation_policy: VmAllocationPolicy,
    pub fp_real_workload_allocation: RealWorkloadAllocation,
}

impl Scenario {
    /// Reads and validates a scenario from a file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ScenarioError> {
        Self::parse(&fs::read_to_string(path)?)
    }

    /// Parses and validates a scenario from its textual form.
    pub fn parse(text: &str) -> Result<Self, ScenarioError> {
        let mut raw = RawScenario::default();

        for (lineno, raw_line) in text.lines().enumerate() {
            let lineno = lineno + 1;
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let line = line.to_lowercase();
            let (key, value) = line.split_once('=').ok_or_else(|| ScenarioError::Parse {
                line: lineno,
                msg: "'=' is missing".to_owned(),
            })?;
            let key = key.trim();
            let value = value.trim();
            raw.set(key, value)
                .map_err(|msg| ScenarioError::Parse { line: lineno, msg })?;
        }

        raw.finish()
    }

    /// Total number of fog nodes across categories.
    pub fn num_fns(&self) -> usize {
        self.fp_num_fns.iter().sum()
    }

    /// Total number of services across categories.
    pub fn num_svcs(&self) -> usize {
        self.fp_num_svcs.iter().sum()
    }

    fn validate(&self) -> Result<(), ScenarioError> {
        fn check_len<T>(name: &str, v: &[T], want: usize) -> Result<(), ScenarioError> {
            if v.len() != want {
                Err(ScenarioError::Invalid(format!(
                    "'{}' has {} entries, expected {}",
                    name,
                    v.len(),
                    want
                )))
            } else {
                Ok(())
            }
        }

        if self.num_fn_categories < 1 || self.num_svc_categories < 1 || self.num_vm_categories < 1 {
            return Err(ScenarioError::Invalid(
                "category counts must be >= 1".to_owned(),
            ));
        }

        check_len("svc.arrival_rates", &self.svc_arrival_rates, self.num_svc_categories)?;
        check_len(
            "svc.max_arrival_rates",
            &self.svc_max_arrival_rates,
            self.num_svc_categories,
        )?;
        check_len("svc.max_delays", &self.svc_max_delays, self.num_svc_categories)?;
        check_len(
            "svc.vm_service_rates",
            &self.svc_vm_service_rates,
            self.num_svc_categories,
        )?;
        for row in &self.svc_vm_service_rates {
            check_len("svc.vm_service_rates row", row, self.num_vm_categories)?;
        }
        check_len("fp.num_svcs", &self.fp_num_svcs, self.num_svc_categories)?;
        check_len("fp.num_fns", &self.fp_num_fns, self.num_fn_categories)?;
        check_len("fp.fn_asleep_costs", &self.fp_fn_asleep_costs, self.num_fn_categories)?;
        check_len("fp.fn_awake_costs", &self.fp_fn_awake_costs, self.num_fn_categories)?;
        check_len("fp.svc_revenues", &self.fp_svc_revenues, self.num_svc_categories)?;
        check_len("fp.svc_penalties", &self.fp_svc_penalties, self.num_svc_categories)?;
        check_len("fn.min_powers", &self.fn_min_powers, self.num_fn_categories)?;
        check_len("fn.max_powers", &self.fn_max_powers, self.num_fn_categories)?;
        check_len("vm.cpu_requirements", &self.vm_cpu_requirements, self.num_vm_categories)?;
        for row in &self.vm_cpu_requirements {
            check_len("vm.cpu_requirements row", row, self.num_fn_categories)?;
            for &share in row {
                if !(0. ..=1.).contains(&share) {
                    return Err(ScenarioError::Invalid(format!(
                        "CPU requirement {} outside [0, 1]",
                        share
                    )));
                }
            }
        }
        check_len("vm.ram_requirements", &self.vm_ram_requirements, self.num_vm_categories)?;
        for row in &self.vm_ram_requirements {
            check_len("vm.ram_requirements row", row, self.num_fn_categories)?;
        }
        check_len("vm.allocation_costs", &self.vm_allocation_costs, self.num_vm_categories)?;

        if self.fp_vm_allocation_interval <= 0. {
            return Err(ScenarioError::Invalid(
                "fp.vm_allocation_interval must be > 0".to_owned(),
            ));
        }
        if self.fp_electricity_costs < 0. || self.svc_delay_tolerance < 0. {
            return Err(ScenarioError::Invalid(
                "costs and tolerances must be >= 0".to_owned(),
            ));
        }

        Ok(())
    }
}

fn fmt_vec<T: fmt::Display>(v: &[T]) -> String {
    let items: Vec<String> = v.iter().map(|x| x.to_string()).collect();
    format!("[{}]", items.join(" "))
}

fn fmt_matrix<T: fmt::Display>(m: &[Vec<T>]) -> String {
    let rows: Vec<String> = m.iter().map(|row| fmt_vec(row)).collect();
    format!("[{}]", rows.join(" "))
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "num_fn_categories = {}", self.num_fn_categories)?;
        writeln!(f, "num_svc_categories = {}", self.num_svc_categories)?;
        writeln!(f, "num_vm_categories = {}", self.num_vm_categories)?;
        writeln!(f, "svc.arrival_rates = {}", fmt_vec(&self.svc_arrival_rates))?;
        writeln!(f, "svc.max_arrival_rates = {}", fmt_vec(&self.svc_max_arrival_rates))?;
        writeln!(f, "svc.max_delays = {}", fmt_vec(&self.svc_max_delays))?;
        writeln!(f, "svc.vm_service_rates = {}", fmt_matrix(&self.svc_vm_service_rates))?;
        writeln!(f, "svc.arrival_rate_estimation = {}", self.svc_arrival_rate_estimation)?;
        writeln!(
            f,
            "svc.arrival_rate_estimation_params = {}",
            fmt_vec(&self.svc_arrival_rate_estimation_params)
        )?;
        writeln!(f, "svc.delay_tolerance = {}", self.svc_delay_tolerance)?;
        writeln!(f, "svc.user_mobility_model = {}", self.svc_user_mobility_model)?;
        let params: Vec<String> = self
            .svc_user_mobility_model_params
            .iter()
            .flat_map(|(name, values)| values.iter().map(move |value| format!("{} {}", name, value)))
            .collect();
        writeln!(f, "svc.user_mobility_model_params = [{}]", params.join(" "))?;
        writeln!(f, "fp.num_svcs = {}", fmt_vec(&self.fp_num_svcs))?;
        writeln!(f, "fp.num_fns = {}", fmt_vec(&self.fp_num_fns))?;
        writeln!(f, "fp.electricity_costs = {}", self.fp_electricity_costs)?;
        writeln!(f, "fp.fn_asleep_costs = {}", fmt_vec(&self.fp_fn_asleep_costs))?;
        writeln!(f, "fp.fn_awake_costs = {}", fmt_vec(&self.fp_fn_awake_costs))?;
        writeln!(f, "fp.svc_revenues = {}", fmt_vec(&self.fp_svc_revenues))?;
        writeln!(f, "fp.svc_penalties = {}", fmt_vec(&self.fp_svc_penalties))?;
        writeln!(f, "fn.min_powers = {}", fmt_vec(&self.fn_min_powers))?;
        writeln!(f, "fn.max_powers = {}", fmt_vec(&self.fn_max_powers))?;
        writeln!(f, "vm.cpu_requirements = {}", fmt_matrix(&self.vm_cpu_requirements))?;
        writeln!(f, "vm.ram_requirements = {}", fmt_matrix(&self.vm_ram_requirements))?;
        writeln!(f, "vm.allocation_costs = {}", fmt_vec(&self.vm_allocation_costs))?;
        writeln!(f, "fp.vm_allocation_interval = {}", self.fp_vm_allocation_interval)?;
        writeln!(f, "fp.vm_allocation_policy = {}", self.fp_vm_allocation_policy)?;
        writeln!(
            f,
            "fp.real_workload_allocation = {}",
            self.fp_real_workload_allocation
        )?;
        Ok(())
    }
}

#[derive(Default)]
struct RawScenario {
    num_fn_categories: Option<usize>,
    num_svc_categories: Option<usize>,
    num_vm_categories: Option<usize>,
    svc_arrival_rates: Option<Vec<f64>>,
    svc_max_arrival_rates: Option<Vec<f64>>,
    svc_max_delays: Option<Vec<f64>>,
    svc_vm_service_rates: Option<Vec<Vec<f64>>>,
    svc_arrival_rate_estimation: Option<ArrivalRateEstimation>,
    svc_arrival_rate_estimation_params: Option<Vec<f64>>,
    svc_delay_tolerance: Option<f64>,
    svc_user_mobility_model: Option<UserMobilityModelKind>,
    svc_user_mobility_model_params: Option<BTreeMap<String, Vec<String>>>,
    fp_num_svcs: Option<Vec<usize>>,
    fp_num_fns: Option<Vec<usize>>,
    fp_electricity_costs: Option<f64>,
    fp_fn_asleep_costs: Option<Vec<f64>>,
    fp_fn_awake_costs: Option<Vec<f64>>,
    fp_svc_revenues: Option<Vec<f64>>,
    fp_svc_penalties: Option<Vec<f64>>,
    fn_min_powers: Option<Vec<f64>>,
    fn_max_powers: Option<Vec<f64>>,
    vm_cpu_requirements: Option<Vec<Vec<f64>>>,
    vm_ram_requirements: Option<Vec<Vec<f64>>>,
    vm_allocation_costs: Option<Vec<f64>>,
    fp_vm_allocation_interval: Option<f64>,
    fp_vm_allocation_policy: Option<VmAllocationPolicy>,
    fp_real_workload_allocation: Option<RealWorkloadAllocation>,
}

impl RawScenario {
    fn set(&mut self, key: &str, value: &str) -> Result<(), String> {
        match key {
            "num_fn_categories" => self.num_fn_categories = Some(parse_scalar(value)?),
            "num_svc_categories" => self.num_svc_categories = Some(parse_scalar(value)?),
            "num_vm_categories" => self.num_vm_categories = Some(parse_scalar(value)?),
            "svc.arrival_rates" => self.svc_arrival_rates = Some(parse_vector(value)?),
            "svc.max_arrival_rates" => self.svc_max_arrival_rates = Some(parse_vector(value)?),
            "svc.max_delays" => self.svc_max_delays = Some(parse_vector(value)?),
            "svc.vm_service_rates" => self.svc_vm_service_rates = Some(parse_matrix(value)?),
            "svc.arrival_rate_estimation" => {
                self.svc_arrival_rate_estimation = Some(value.parse()?)
            }
            "svc.arrival_rate_estimation_params" => {
                self.svc_arrival_rate_estimation_params = Some(parse_vector(value)?)
            }
            "svc.delay_tolerance" => self.svc_delay_tolerance = Some(parse_scalar(value)?),
            "svc.user_mobility_model" => self.svc_user_mobility_model = Some(value.parse()?),
            "svc.user_mobility_model_params" => {
                self.svc_user_mobility_model_params = Some(parse_named_params(value)?)
            }
            "fp.num_svcs" => self.fp_num_svcs = Some(parse_vector(value)?),
            "fp.num_fns" => self.fp_num_fns = Some(parse_vector(value)?),
            "fp.electricity_costs" => self.fp_electricity_costs = Some(parse_scalar(value)?),
            "fp.fn_asleep_costs" => self.fp_fn_asleep_costs = Some(parse_vector(value)?),
            "fp.fn_awake_costs" => self.fp_fn_awake_costs = Some(parse_vector(value)?),
            "fp.svc_revenues" => self.fp_svc_revenues = Some(parse_vector(value)?),
            "fp.svc_penalties" => self.fp_svc_penalties = Some(parse_vector(value)?),
            "fn.min_powers" => self.fn_min_powers = Some(parse_vector(value)?),
            "fn.max_powers" => self.fn_max_powers = Some(parse_vector(value)?),
            "vm.cpu_requirements" => self.vm_cpu_requirements = Some(parse_matrix(value)?),
            "vm.ram_requirements" => self.vm_ram_requirements = Some(parse_matrix(value)?),
            "vm.allocation_costs" => self.vm_allocation_costs = Some(parse_vector(value)?),
            "fp.vm_allocation_interval" => {
                self.fp_vm_allocation_interval = Some(parse_scalar(value)?)
            }
            "fp.vm_allocation_policy" => self.fp_vm_allocation_policy = Some(value.parse()?),
            "fp.real_workload_allocation" => {
                self.fp_real_workload_allocation = Some(value.parse()?)
            }
            _ => return Err(format!("unknown key '{}'", key)),
        }
        Ok(())
    }

    fn finish(self) -> Result<Scenario, ScenarioError> {
        fn require<T>(v: Option<T>, key: &'static str) -> Result<T, ScenarioError> {
            v.ok_or(ScenarioError::MissingKey(key))
        }

        let num_fn_categories = require(self.num_fn_categories, "num_fn_categories")?;
        let num_vm_categories = require(self.num_vm_categories, "num_vm_categories")?;

        let scenario = Scenario {
            num_fn_categories,
            num_svc_categories: require(self.num_svc_categories, "num_svc_categories")?,
            num_vm_categories,
            svc_arrival_rates: require(self.svc_arrival_rates, "svc.arrival_rates")?,
            svc_max_arrival_rates: require(self.svc_max_arrival_rates, "svc.max_arrival_rates")?,
            svc_max_delays: require(self.svc_max_delays, "svc.max_delays")?,
            svc_vm_service_rates: require(self.svc_vm_service_rates, "svc.vm_service_rates")?,
            svc_arrival_rate_estimation: self
                .svc_arrival_rate_estimation
                .unwrap_or(ArrivalRateEstimation::Max),
            svc_arrival_rate_estimation_params: self
                .svc_arrival_rate_estimation_params
                .unwrap_or_default(),
            svc_delay_tolerance: self.svc_delay_tolerance.unwrap_or(0.),
            svc_user_mobility_model: require(
                self.svc_user_mobility_model,
                "svc.user_mobility_model",
            )?,
            svc_user_mobility_model_params: self.svc_user_mobility_model_params.unwrap_or_default(),
            fp_num_svcs: require(self.fp_num_svcs, "fp.num_svcs")?,
            fp_num_fns: require(self.fp_num_fns, "fp.num_fns")?,
            fp_electricity_costs: require(self.fp_electricity_costs, "fp.electricity_costs")?,
            fp_fn_asleep_costs: require(self.fp_fn_asleep_costs, "fp.fn_asleep_costs")?,
            fp_fn_awake_costs: require(self.fp_fn_awake_costs, "fp.fn_awake_costs")?,
            fp_svc_revenues: require(self.fp_svc_revenues, "fp.svc_revenues")?,
            fp_svc_penalties: require(self.fp_svc_penalties, "fp.svc_penalties")?,
            fn_min_powers: require(self.fn_min_powers, "fn.min_powers")?,
            fn_max_powers: require(self.fn_max_powers, "fn.max_powers")?,
            vm_cpu_requirements: require(self.vm_cpu_requirements, "vm.cpu_requirements")?,
            vm_ram_requirements: self
                .vm_ram_requirements
                .unwrap_or_else(|| vec![vec![0.; num_fn_categories]; num_vm_categories]),
            vm_allocation_costs: require(self.vm_allocation_costs, "vm.allocation_costs")?,
            fp_vm_allocation_interval: require(
                self.fp_vm_allocation_interval,
                "fp.vm_allocation_interval",
            )?,
            fp_vm_allocation_policy: self
                .fp_vm_allocation_policy
                .unwrap_or(VmAllocationPolicy::Optimal),
            fp_real_workload_allocation: self
                .fp_real_workload_allocation
                .unwrap_or(RealWorkloadAllocation::AllocateWithFixedFns),
        };

        scenario.validate()?;
        Ok(scenario)
    }
}

fn parse_scalar<T: std::str::FromStr>(value: &str) -> Result<T, String> {
    value
        .trim()
        .parse()
        .map_err(|_| format!("invalid scalar value '{}'", value))
}

fn strip_brackets(value: &str) -> Result<&str, String> {
    let value = value.trim();
    value
        .strip_prefix('[')
        .and_then(|v| v.strip_suffix(']'))
        .ok_or_else(|| format!("expected a bracketed value, got '{}'", value))
}

fn parse_vector<T: std::str::FromStr>(value: &str) -> Result<Vec<T>, String> {
    strip_brackets(value)?
        .split_whitespace()
        .map(|tok| tok.parse().map_err(|_| format!("invalid value '{}'", tok)))
        .collect()
}

fn parse_matrix<T: std::str::FromStr>(value: &str) -> Result<Vec<Vec<T>>, String> {
    let inner = strip_brackets(value)?;
    let mut rows = Vec::new();
    let mut rest = inner.trim_start();
    while !rest.is_empty() {
        let start = rest
            .find('[')
            .ok_or_else(|| format!("expected a matrix row, got '{}'", rest))?;
        let end = rest[start..]
            .find(']')
            .map(|i| start + i)
            .ok_or_else(|| "']' is missing in matrix row".to_owned())?;
        let row = rest[start + 1..end]
            .split_whitespace()
            .map(|tok| tok.parse().map_err(|_| format!("invalid value '{}'", tok)))
            .collect::<Result<Vec<T>, String>>()?;
        rows.push(row);
        rest = rest[end + 1..].trim_start();
    }
    Ok(rows)
}

/// Parses `[name value name value ...]` pairs; repeated names accumulate
/// their values in order (the step model passes its sequence this way).
fn parse_named_params(value: &str) -> Result<BTreeMap<String, Vec<String>>, String> {
    let mut params: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let tokens: Vec<&str> = strip_brackets(value)?.split_whitespace().collect();
    if tokens.len() % 2 != 0 {
        return Err("mobility model parameters must come in name/value pairs".to_owned());
    }
    for pair in tokens.chunks(2) {
        params
            .entry(pair[0].to_lowercase())
            .or_default()
            .push(pair[1].to_owned());
    }
    Ok(params)
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXAMPLE: &str = r#"
# Example scenario
num_fn_categories = 2
num_svc_categories = 1
num_vm_categories = 1

svc.arrival_rates = [1]
svc.max_arrival_rates = [10]
svc.max_delays = [1]
svc.vm_service_rates = [[2]]
svc.arrival_rate_estimation = ewma
svc.arrival_rate_estimation_params = [0.5]
svc.delay_tolerance = 0.01
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
"#;

    #[test]
    fn test_parse_example() {
        let scenario = Scenario::parse(EXAMPLE).unwrap();
        assert_eq!(scenario.num_fn_categories, 2);
        assert_eq!(scenario.fp_num_fns, vec![1, 1]);
        assert_eq!(scenario.num_fns(), 2);
        assert_eq!(scenario.svc_vm_service_rates, vec![vec![2.]]);
        assert_eq!(scenario.vm_cpu_requirements, vec![vec![0.5, 0.5]]);
        assert_eq!(
            scenario.svc_arrival_rate_estimation,
            ArrivalRateEstimation::Ewma
        );
        assert_eq!(
            scenario.svc_user_mobility_model_params.get("n"),
            Some(&vec!["2".to_owned()])
        );
        // Optional keys fall back to defaults.
        assert_eq!(
            scenario.fp_real_workload_allocation,
            RealWorkloadAllocation::AllocateWithFixedFns
        );
        assert_eq!(scenario.vm_ram_requirements, vec![vec![0., 0.]]);
    }

    #[test]
    fn test_keys_are_case_insensitive() {
        let upper = EXAMPLE.replace("num_fn_categories", "NUM_FN_CATEGORIES");
        let scenario = Scenario::parse(&upper).unwrap();
        assert_eq!(scenario.num_fn_categories, 2);
    }

    #[test]
    fn test_missing_mandatory_key() {
        let text = EXAMPLE.replace("fp.vm_allocation_interval = 1", "");
        let err = Scenario::parse(&text).unwrap_err();
        assert!(matches!(err, ScenarioError::MissingKey("fp.vm_allocation_interval")));
    }

    #[test]
    fn test_dimension_mismatch_is_rejected() {
        let text = EXAMPLE.replace("fn.min_powers = [10 20]", "fn.min_powers = [10]");
        assert!(matches!(
            Scenario::parse(&text),
            Err(ScenarioError::Invalid(_))
        ));
    }

    #[test]
    fn test_repeated_mobility_params_accumulate() {
        let text = EXAMPLE
            .replace("svc.user_mobility_model = fixed", "svc.user_mobility_model = step")
            .replace(
                "svc.user_mobility_model_params = [n 2]",
                "svc.user_mobility_model_params = [n 2 n 0 n 2 n 0]",
            );
        let scenario = Scenario::parse(&text).unwrap();
        assert_eq!(
            scenario.svc_user_mobility_model_params.get("n"),
            Some(&vec!["2".into(), "0".into(), "2".into(), "0".into()])
        );
    }

    #[test]
    fn test_round_trip() {
        let scenario = Scenario::parse(EXAMPLE).unwrap();
        let reparsed = Scenario::parse(&scenario.to_string()).unwrap();
        assert_eq!(scenario, reparsed);
    }
}
