//! Error type shared by the simulation kernel.

/// Failure raised by the scheduler, the node/socket layer or a scenario driver.
///
/// Every variant except `InvalidState` is treated as fatal by the drivers: it
/// propagates out of `run_until` and aborts the run. `InvalidState` is local
/// to a socket and is handled by whoever issued the socket operation.
#[derive(Debug)]
pub enum SimError {
    /// A caller violated a contract (negative delay, unknown node, bad parameter).
    InvalidArgument(String),
    /// An operation is not valid in the current state (send after close, port in use).
    InvalidState(String),
    /// Routing-protocol selector outside the known set.
    UnknownProtocol(u32),
    /// Writing an output file failed.
    Io(std::io::Error),
}

impl SimError {
    pub(crate) fn invalid_argument(msg: impl Into<String>) -> Self {
        SimError::InvalidArgument(msg.into())
    }

    pub(crate) fn invalid_state(msg: impl Into<String>) -> Self {
        SimError::InvalidState(msg.into())
    }

    /// True for errors that stay local to a socket.
    pub fn is_socket_local(&self) -> bool {
        matches!(self, SimError::InvalidState(_))
    }
}

impl std::fmt::Display for SimError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SimError::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
            SimError::InvalidState(msg) => write!(f, "Invalid state: {}", msg),
            SimError::UnknownProtocol(code) => write!(f, "No such protocol: {}", code),
            SimError::Io(err) => write!(f, "I/O error: {}", err),
        }
    }
}

impl std::error::Error for SimError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SimError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for SimError {
    fn from(err: std::io::Error) -> Self {
        SimError::Io(err)
    }
}
