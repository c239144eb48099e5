//! UDP-style sockets.
//!
//! Sockets belong to a node and move through `Unconnected → Connected → Closed`.
//! A closed socket rejects every operation with `InvalidState`. Received packets go
//! to the socket's receive callback when one is set, otherwise into its buffer for
//! `recv_from`.

use std::collections::VecDeque;
use std::net::{Ipv4Addr, SocketAddrV4};

use super::node::NodeContainer;
use super::throughput::SinkCounters;
use super::types::{NodeId, Packet, SimTime, SocketId};
use crate::error::SimError;

/// First port handed out by automatic binding.
pub const EPHEMERAL_PORT_START: u16 = 49153;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketState {
    Unconnected,
    Connected,
    Closed,
}

/// A packet handed to a receiving socket.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Delivery {
    pub time: SimTime,
    pub node: NodeId,
    pub socket: SocketId,
    pub packet: Packet,
    pub from: SocketAddrV4,
    pub rx_power_dbm: f64,
}

/// Receive capability invoked synchronously by the delivery event.
pub type RecvCallback = Box<dyn FnMut(&Delivery, &mut SinkCounters)>;

pub struct Socket {
    pub id: SocketId,
    pub node: NodeId,
    local: Option<SocketAddrV4>,
    remote: Option<SocketAddrV4>,
    state: SocketState,
    recv_callback: Option<RecvCallback>,
    rx_buffer: VecDeque<(Packet, SocketAddrV4)>,
}

impl Socket {
    pub fn state(&self) -> SocketState {
        self.state
    }

    pub fn local(&self) -> Option<SocketAddrV4> {
        self.local
    }

    pub fn remote(&self) -> Option<SocketAddrV4> {
        self.remote
    }

    fn ensure_open(&self) -> Result<(), SimError> {
        if self.state == SocketState::Closed {
            return Err(SimError::invalid_state(format!("{} on node {} is closed", self.id, self.node)));
        }
        Ok(())
    }

    fn accepts(&self, node_address: Ipv4Addr, port: u16) -> bool {
        self.state != SocketState::Closed
            && self
                .local
                .is_some_and(|local| local.port() == port && (local.ip().is_unspecified() || *local.ip() == node_address))
    }
}

/// Every socket of a simulation, indexed by `SocketId`.
pub struct SocketTable {
    sockets: Vec<Socket>,
    next_ephemeral: u16,
}

impl Default for SocketTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SocketTable {
    pub fn new() -> Self {
        SocketTable {
            sockets: Vec::new(),
            next_ephemeral: EPHEMERAL_PORT_START,
        }
    }

    /// Create an unbound socket on `node`. The node needs an installed protocol stack.
    pub fn create(&mut self, nodes: &mut NodeContainer, node: NodeId) -> Result<SocketId, SimError> {
        let owner = nodes.get_mut(node)?;
        if !owner.has_stack() {
            return Err(SimError::invalid_state(format!("node {} has no protocol stack installed", node)));
        }
        let id = SocketId(self.sockets.len() as u32);
        self.sockets.push(Socket {
            id,
            node,
            local: None,
            remote: None,
            state: SocketState::Unconnected,
            recv_callback: None,
            rx_buffer: VecDeque::new(),
        });
        owner.attach_socket(id);
        Ok(id)
    }

    pub fn get(&self, id: SocketId) -> Result<&Socket, SimError> {
        self.sockets.get(id.0 as usize).ok_or_else(|| SimError::invalid_argument(format!("unknown {}", id)))
    }

    fn get_mut(&mut self, id: SocketId) -> Result<&mut Socket, SimError> {
        self.sockets.get_mut(id.0 as usize).ok_or_else(|| SimError::invalid_argument(format!("unknown {}", id)))
    }

    fn port_in_use(&self, node: NodeId, port: u16) -> bool {
        self.sockets
            .iter()
            .any(|s| s.node == node && s.state != SocketState::Closed && s.local.is_some_and(|local| local.port() == port))
    }

    fn allocate_ephemeral(&mut self, node: NodeId) -> Result<u16, SimError> {
        let span = (u16::MAX - EPHEMERAL_PORT_START) as u32 + 1;
        for _ in 0..span {
            let port = self.next_ephemeral;
            self.next_ephemeral = if port == u16::MAX { EPHEMERAL_PORT_START } else { port + 1 };
            if !self.port_in_use(node, port) {
                return Ok(port);
            }
        }
        Err(SimError::invalid_state(format!("no ephemeral port left on node {}", node)))
    }

    /// Bind to `address`; port 0 picks an ephemeral port.
    pub fn bind(&mut self, id: SocketId, address: SocketAddrV4) -> Result<SocketAddrV4, SimError> {
        let socket = self.get(id)?;
        socket.ensure_open()?;
        if socket.local.is_some() {
            return Err(SimError::invalid_state(format!("{} is already bound", id)));
        }
        let node = socket.node;
        let port = if address.port() == 0 {
            self.allocate_ephemeral(node)?
        } else if self.port_in_use(node, address.port()) {
            return Err(SimError::invalid_state(format!("port {} already in use on node {}", address.port(), node)));
        } else {
            address.port()
        };
        let local = SocketAddrV4::new(*address.ip(), port);
        self.get_mut(id)?.local = Some(local);
        Ok(local)
    }

    /// Set the default destination. Binds to the node's address and an ephemeral port if unbound.
    pub fn connect(&mut self, nodes: &NodeContainer, id: SocketId, remote: SocketAddrV4) -> Result<(), SimError> {
        let socket = self.get(id)?;
        socket.ensure_open()?;
        if socket.local.is_none() {
            let node_address = nodes.get(socket.node)?.address;
            self.bind(id, SocketAddrV4::new(node_address, 0))?;
        }
        let socket = self.get_mut(id)?;
        socket.remote = Some(remote);
        socket.state = SocketState::Connected;
        Ok(())
    }

    pub fn close(&mut self, id: SocketId) -> Result<(), SimError> {
        let socket = self.get_mut(id)?;
        socket.ensure_open()?;
        socket.state = SocketState::Closed;
        socket.recv_callback = None;
        socket.rx_buffer.clear();
        Ok(())
    }

    pub fn set_recv_callback(&mut self, id: SocketId, callback: RecvCallback) -> Result<(), SimError> {
        let socket = self.get_mut(id)?;
        socket.ensure_open()?;
        socket.recv_callback = Some(callback);
        Ok(())
    }

    /// Source and destination of the next send, or `InvalidState` when not connected.
    pub fn send_endpoints(&self, id: SocketId) -> Result<(NodeId, SocketAddrV4, SocketAddrV4), SimError> {
        let socket = self.get(id)?;
        socket.ensure_open()?;
        match (socket.state, socket.local, socket.remote) {
            (SocketState::Connected, Some(local), Some(remote)) => Ok((socket.node, local, remote)),
            _ => Err(SimError::invalid_state(format!("{} on node {} is not connected", id, socket.node))),
        }
    }

    /// Open socket on `node` bound to `port` on the node's address or the wildcard address.
    pub fn find_receiver(&self, node: NodeId, node_address: Ipv4Addr, port: u16) -> Option<SocketId> {
        self.sockets.iter().find(|s| s.node == node && s.accepts(node_address, port)).map(|s| s.id)
    }

    /// Hand a packet to the socket: callback if set, buffer otherwise.
    pub(crate) fn deliver(&mut self, delivery: &Delivery, counters: &mut SinkCounters) -> Result<(), SimError> {
        let socket = self.get_mut(delivery.socket)?;
        socket.ensure_open()?;
        match socket.recv_callback.as_mut() {
            Some(callback) => callback(delivery, counters),
            None => socket.rx_buffer.push_back((delivery.packet, delivery.from)),
        }
        Ok(())
    }

    /// Pop the oldest buffered packet.
    pub fn recv_from(&mut self, id: SocketId) -> Result<Option<(Packet, SocketAddrV4)>, SimError> {
        let socket = self.get_mut(id)?;
        socket.ensure_open()?;
        Ok(socket.rx_buffer.pop_front())
    }

    pub fn len(&self) -> usize {
        self.sockets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sockets.is_empty()
    }
}
