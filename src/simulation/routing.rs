//! Routing protocol capability.
//!
//! Routing algorithms are external to the kernel: installing a protocol marks the
//! node's stack as ready (so sockets can be created) and records which protocol runs,
//! while packets travel over the direct radio link.

use serde::{Deserialize, Serialize};

use super::node::NodeContainer;
use crate::error::SimError;

/// Something that can be installed on a set of nodes.
pub trait RoutingProtocol {
    fn name(&self) -> &'static str;

    /// Numeric selector used on the command line and in output files.
    fn code(&self) -> u32;

    fn install(&self, nodes: &mut NodeContainer) -> Result<(), SimError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RoutingProtocolKind {
    Olsr,
    Aodv,
    Dsdv,
    Dsr,
}

impl RoutingProtocolKind {
    /// Map a selector (1=OLSR, 2=AODV, 3=DSDV, 4=DSR) to a protocol.
    pub fn from_code(code: u32) -> Result<Self, SimError> {
        match code {
            1 => Ok(RoutingProtocolKind::Olsr),
            2 => Ok(RoutingProtocolKind::Aodv),
            3 => Ok(RoutingProtocolKind::Dsdv),
            4 => Ok(RoutingProtocolKind::Dsr),
            other => Err(SimError::UnknownProtocol(other)),
        }
    }
}

impl RoutingProtocol for RoutingProtocolKind {
    fn name(&self) -> &'static str {
        match self {
            RoutingProtocolKind::Olsr => "OLSR",
            RoutingProtocolKind::Aodv => "AODV",
            RoutingProtocolKind::Dsdv => "DSDV",
            RoutingProtocolKind::Dsr => "DSR",
        }
    }

    fn code(&self) -> u32 {
        match self {
            RoutingProtocolKind::Olsr => 1,
            RoutingProtocolKind::Aodv => 2,
            RoutingProtocolKind::Dsdv => 3,
            RoutingProtocolKind::Dsr => 4,
        }
    }

    fn install(&self, nodes: &mut NodeContainer) -> Result<(), SimError> {
        for node in nodes.iter_mut() {
            node.install_routing(*self)?;
        }
        log::info!("Installed {} routing on {} nodes", self.name(), nodes.len());
        Ok(())
    }
}

impl std::fmt::Display for RoutingProtocolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
