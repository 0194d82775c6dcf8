//! The `waypoint-ln` crate contains the payment routing core of a waypoint
//! node: the engines that discover, evaluate, refine, and diversify payment
//! paths over the gossiped channel graph, plus the orchestrated multi-peer
//! funding flow built on the same cooperative runtime.
//!
//! Everything outside this crate (gossip ingest, the wire-level channel
//! protocol, the wallet, the JSON-RPC transport) is reached through the
//! interfaces in [`rpc`].

/// Fee acceleration.
pub mod accelerate;
/// Top level commands that can be initiated by the user.
pub mod command;
/// Multi-peer connect.
pub mod connect;
/// Application-level constants.
pub mod constants;
/// The channel cost metric.
pub mod coster;
/// Differential-heuristic distance cache.
pub mod dhc;
/// Path-diversity engine.
pub mod diversity;
/// Structured errors.
pub mod error;
/// Channel graph view.
pub mod graph;
/// Binary min-heap.
pub mod heap;
/// Tracing subscriber setup.
pub mod logger;
/// Multi-destination channel funding orchestrator.
pub mod multifund;
/// Route repair.
pub mod permute;
/// Distance-cache refresher.
pub mod refresh;
/// Route types.
pub mod route;
/// Interfaces to the node's other subsystems.
pub mod rpc;
/// Command-scoped cooperative sub-tasks.
pub mod spark;
/// Multi-destination withdraw.
pub mod withdraw;

#[cfg(test)]
pub(crate) mod test_support;
