//! Discrete-event simulation kernel for mobile ad-hoc wireless networks.
//!
//! This module provides the complete simulation infrastructure. It integrates:
//! - A time-ordered event scheduler with FIFO tie-breaking and cancellation
//! - A chained propagation-loss pipeline (free space, fading, log-distance, buildings, overrides)
//! - Mobility providers queried on demand at each transmission
//! - Nodes, sockets and the routing-protocol capability
//! - Periodic traffic generation, per-flow statistics and per-second receive-rate sampling
//!
//! ## Module Organization
//!
//! - `types`: Core value types (SimTime, Position, Packet, ids)
//! - `scheduler`: Event queue and simulated clock
//! - `geometry`: Rectangle/box tests and wall crossing
//! - `propagation`: Loss and delay models and chain construction
//! - `mobility`: Constant, random-walk and random-waypoint providers
//! - `random`: Seeded per-component random streams
//! - `node`, `socket`, `routing`: Node, socket and routing abstractions
//! - `network`: Wireless channel, simulation context and run loop
//! - `traffic`: Periodic packet source
//! - `flow_monitor`, `throughput`: Statistics
//!
//! Everything runs on one thread: state changes happen inside event actions, which
//! receive the scheduler and the `SimulationContext` explicitly.

pub mod flow_monitor;
pub mod geometry;
pub mod mobility;
pub mod network;
pub mod node;
pub mod propagation;
pub mod random;
pub mod routing;
pub mod scheduler;
pub mod socket;
pub mod throughput;
pub mod traffic;
pub mod types;

pub use network::{Simulation, SimulationContext, WirelessChannel};
pub use scheduler::{EventHandle, Scheduler};
pub use types::{NodeId, Packet, Position, SimTime, SocketId};
