//! Discrete-event simulator that evaluates VM-placement strategies for a fog
//! computing provider.
//!
//! Over repeated time slots the simulator forecasts per-service request
//! arrival rates from observed user counts, sizes each service with an M/M/c
//! queueing model, and places VMs onto fog nodes by solving a profit-maximizing
//! integer program (or a Hungarian-assignment heuristic). The same interval is
//! re-evaluated under realized demand, and a multi-slot oracle allocation over
//! the whole replication provides an upper-bound benchmark.
//! Confidence-interval-driven replication control runs replications until the
//! watched statistics reach the requested precision.

pub mod core;
pub mod experiment;
pub mod simulation;
