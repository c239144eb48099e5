//! Nodes and their radio parameters.
//!
//! A node is created at scenario setup and lives for the whole run. It carries:
//! - a mobility provider, queried on demand by the channel
//! - PHY parameters (transmit power, receive sensitivity, data rate)
//! - an IPv4 address assigned sequentially from the container's base
//! - the sockets it owns and the routing protocol installed on it

use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

use super::mobility::MobilityModel;
use super::routing::RoutingProtocolKind;
use super::types::{NodeId, Position, SimTime, SocketId};
use crate::error::SimError;

/// Default transmit power (dBm).
pub const DEFAULT_TX_POWER_DBM: f64 = 16.0;
/// Default receiver sensitivity (dBm).
pub const DEFAULT_RX_SENSITIVITY_DBM: f64 = -96.0;
/// Default PHY data rate (bit/s), 802.11b DSSS 11 Mb/s.
pub const DEFAULT_DATA_RATE_BPS: u64 = 11_000_000;

/// Radio parameters of a node.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WifiPhy {
    pub tx_power_dbm: f64,
    pub rx_sensitivity_dbm: f64,
    pub data_rate_bps: u64,
}

impl Default for WifiPhy {
    fn default() -> Self {
        WifiPhy {
            tx_power_dbm: DEFAULT_TX_POWER_DBM,
            rx_sensitivity_dbm: DEFAULT_RX_SENSITIVITY_DBM,
            data_rate_bps: DEFAULT_DATA_RATE_BPS,
        }
    }
}

impl WifiPhy {
    /// Time on air for `size` bytes at the PHY data rate.
    pub fn tx_duration(&self, size: u32) -> SimTime {
        if self.data_rate_bps == 0 {
            return SimTime::ZERO;
        }
        SimTime::from_secs_f64(size as f64 * 8.0 / self.data_rate_bps as f64)
    }
}

pub struct Node {
    pub id: NodeId,
    pub address: Ipv4Addr,
    pub phy: WifiPhy,
    mobility: Box<dyn MobilityModel>,
    sockets: Vec<SocketId>,
    routing: Option<RoutingProtocolKind>,
}

impl Node {
    pub fn sockets(&self) -> &[SocketId] {
        &self.sockets
    }

    pub(crate) fn attach_socket(&mut self, socket: SocketId) {
        self.sockets.push(socket);
    }

    pub fn routing(&self) -> Option<RoutingProtocolKind> {
        self.routing
    }

    /// A node can create sockets only once a protocol stack is installed.
    pub fn has_stack(&self) -> bool {
        self.routing.is_some()
    }

    pub(crate) fn install_routing(&mut self, protocol: RoutingProtocolKind) -> Result<(), SimError> {
        if let Some(existing) = self.routing {
            return Err(SimError::invalid_state(format!("node {} already runs {}", self.id, existing)));
        }
        self.routing = Some(protocol);
        Ok(())
    }

    pub fn mobility_name(&self) -> &'static str {
        self.mobility.name()
    }
}

/// Owns every node of a simulation and hands out addresses.
pub struct NodeContainer {
    nodes: Vec<Node>,
    address_base: Ipv4Addr,
}

impl Default for NodeContainer {
    fn default() -> Self {
        Self::new(Ipv4Addr::new(10, 1, 1, 0))
    }
}

impl NodeContainer {
    /// Nodes get `address_base + 1`, `address_base + 2`, …
    pub fn new(address_base: Ipv4Addr) -> Self {
        NodeContainer { nodes: Vec::new(), address_base }
    }

    /// Create a node and return its id.
    pub fn add(&mut self, mobility: Box<dyn MobilityModel>, phy: WifiPhy) -> Result<NodeId, SimError> {
        let id = self.nodes.len() as NodeId;
        let raw = u32::from(self.address_base)
            .checked_add(id + 1)
            .ok_or_else(|| SimError::invalid_argument(format!("address space from {} exhausted at node {}", self.address_base, id)))?;
        let address = Ipv4Addr::from(raw);
        log::debug!("Node {} created at {} with {} mobility", id, address, mobility.name());
        self.nodes.push(Node {
            id,
            address,
            phy,
            mobility,
            sockets: Vec::new(),
            routing: None,
        });
        Ok(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: NodeId) -> Result<&Node, SimError> {
        self.nodes.get(id as usize).ok_or_else(|| SimError::invalid_argument(format!("unknown node {}", id)))
    }

    pub fn get_mut(&mut self, id: NodeId) -> Result<&mut Node, SimError> {
        self.nodes.get_mut(id as usize).ok_or_else(|| SimError::invalid_argument(format!("unknown node {}", id)))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut Node> {
        self.nodes.iter_mut()
    }

    /// Position of `id` at `time`, advancing its mobility provider.
    pub fn position_at(&mut self, id: NodeId, time: SimTime) -> Result<Position, SimError> {
        let node = self.get_mut(id)?;
        Ok(node.mobility.position_at(time))
    }

    pub fn node_by_address(&self, address: Ipv4Addr) -> Option<NodeId> {
        self.nodes.iter().find(|node| node.address == address).map(|node| node.id)
    }
}
