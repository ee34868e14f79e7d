//! Error types for the flowgraph runtime

use crossbeam_channel::{RecvError, SendError};

/// Error type for connection operations
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("Type mismatch: {from_node}.{from_port} ({from_type}) -> {to_node}.{to_port} ({to_type})")]
    TypeMismatch {
        from_node: String,
        from_port: String,
        from_type: &'static str,
        to_node: String,
        to_port: String,
        to_type: &'static str,
    },

    #[error("Node '{0}' not found")]
    NodeNotFound(String),

    #[error("Port '{port}' not found on node '{node}'")]
    PortNotFound { node: String, port: String },

    #[error("Input port '{port}' on node '{node}' is already connected")]
    DuplicateConnection { node: String, port: String },
}

/// Error type for building a flowgraph into a running scheduler
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Node with name '{0}' already exists")]
    DuplicateNode(String),

    #[error("Item type {0} is not registered; call register_type::<T>() before building")]
    UnregisteredType(&'static str),

    #[error("Failed to wire output '{port}' of node '{node}': {reason}")]
    Wiring {
        node: String,
        port: String,
        reason: String,
    },

    #[error(transparent)]
    Connection(#[from] ConnectionError),
}

/// Error type for work function operations
#[derive(Debug, thiserror::Error)]
pub enum WorkError {
    #[error("Failed to receive from input channel: {0}")]
    RecvError(#[from] RecvError),

    #[error("Failed to send to output channel: {0}")]
    SendError(String),

    #[error("Node-specific error: {0}")]
    NodeError(String),

    #[error("Shutdown signal received")]
    Shutdown,
}

impl<T> From<SendError<T>> for WorkError {
    fn from(_: SendError<T>) -> Self {
        WorkError::SendError("all receivers disconnected".to_string())
    }
}

/// Result type for work functions
pub type WorkResult<T = ()> = Result<T, WorkError>;
