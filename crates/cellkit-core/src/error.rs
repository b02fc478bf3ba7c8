//! Error handling for CellKit
//!
//! Provides error types for all layers of the cell controller:
//! - Connection errors (serial, TCP and HTTP transports)
//! - Controller errors (machine state and command failures)
//! - Planner errors (path search and route validation)
//! - Protocol errors (unparseable device responses)
//! - Job errors (job lookup and action dispatch)
//!
//! All error types use `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Connection error type
///
/// Represents errors related to the transport between the controller
/// and a machine: opening, reading, writing and timing out.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConnectionError {
    /// Failed to open the transport
    #[error("Failed to open {port}: {reason}")]
    FailedToOpen {
        /// The port, host or URL that failed to open.
        port: String,
        /// The reason the transport failed to open.
        reason: String,
    },

    /// A read or write exceeded its window
    #[error("Operation timed out after {timeout_ms}ms")]
    Timeout {
        /// The timeout duration in milliseconds.
        timeout_ms: u64,
    },

    /// The transport dropped while in use
    #[error("Connection lost: {reason}")]
    ConnectionLost {
        /// The reason the connection was lost.
        reason: String,
    },

    /// Invalid connection parameters
    #[error("Invalid connection parameters: {reason}")]
    InvalidParameters {
        /// The reason the parameters are invalid.
        reason: String,
    },

    /// I/O error on an open transport
    #[error("I/O error: {reason}")]
    Io {
        /// The reason for the I/O error.
        reason: String,
    },
}

/// Controller error type
///
/// Represents errors raised by a machine driver once a transport exists.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ControllerError {
    /// Command attempted on a closed channel
    #[error("{machine} not connected")]
    NotConnected {
        /// The machine the command was addressed to.
        machine: String,
    },

    /// The device answered with an error
    #[error("Command rejected: {reason}")]
    CommandRejected {
        /// The reason the command was rejected.
        reason: String,
    },

    /// A tool holder name did not resolve
    #[error("Unknown holder: {name}")]
    UnknownHolder {
        /// The holder name.
        name: String,
    },

    /// A named location did not resolve
    #[error("Unknown location: {name}")]
    UnknownLocation {
        /// The location name.
        name: String,
    },

    /// The tool-change bookkeeping would break the one-place-per-tool rule
    #[error("Tool {tool} is tracked in more than one place")]
    ToolConflict {
        /// The duplicated tool id.
        tool: String,
    },

    /// A motion task ended without reporting back
    #[error("Motion aborted: {reason}")]
    MotionAborted {
        /// Why the task ended.
        reason: String,
    },
}

/// Planner error type
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlannerError {
    /// The grid search exhausted the open set without reaching the goal
    #[error("No path from ({:.3}, {:.3}) to ({:.3}, {:.3})", start.0, start.1, goal.0, goal.1)]
    PathNotFound {
        /// XY start of the search.
        start: (f64, f64),
        /// XY goal of the search.
        goal: (f64, f64),
    },

    /// An obstacle reaches the transit height
    #[error("Transit height {safe_z} does not clear obstacle top {obstacle_top}")]
    TransitTooLow {
        /// The requested transit height.
        safe_z: f64,
        /// The highest offending obstacle top face.
        obstacle_top: f64,
    },

    /// Box bounds are inverted on some axis
    #[error("Invalid bounding box: {reason}")]
    InvalidBox {
        /// Which axis is inverted.
        reason: String,
    },

    /// Search parameters are out of range
    #[error("Invalid planner parameter: {reason}")]
    InvalidParameter {
        /// The reason the parameter is invalid.
        reason: String,
    },
}

/// Protocol error type
///
/// Raised while decoding device responses. Status parsing treats these as
/// per-field failures: the field is skipped and the rest of the reply used.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProtocolError {
    /// A recognised field carried a value that did not parse
    #[error("Unparseable {field} in '{line}'")]
    Unparseable {
        /// The field label.
        field: String,
        /// The offending raw line.
        line: String,
    },

    /// A whole response did not decode
    #[error("Malformed response: {reason}")]
    MalformedResponse {
        /// The reason decoding failed.
        reason: String,
    },
}

/// Job error type
#[derive(Error, Debug, Clone, PartialEq)]
pub enum JobError {
    /// No job with this id
    #[error("Job {id} not found")]
    UnknownJob {
        /// The requested job id.
        id: u64,
    },

    /// The job names a machine the registry does not hold
    #[error("Unknown machine: {machine}")]
    UnknownMachine {
        /// The machine name.
        machine: String,
    },

    /// The job names an action the machine kind does not offer
    #[error("Unknown action '{action}' for {machine}")]
    UnknownAction {
        /// The machine name.
        machine: String,
        /// The action name.
        action: String,
    },

    /// Job parameters do not fit the action
    #[error("Invalid parameters for '{action}': {reason}")]
    InvalidParams {
        /// The action name.
        action: String,
        /// The decoding failure.
        reason: String,
    },
    /// The id leaves no room for a successor
    #[error("Job id {id} is out of range")]
    IdOutOfRange {
        /// The rejected id.
        id: u64,
    },
}

/// Main error type for CellKit
///
/// A unified error type that can represent any error from all layers.
/// This is the primary error type used in public APIs.
#[derive(Error, Debug)]
pub enum Error {
    /// Connection error
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// Controller error
    #[error(transparent)]
    Controller(#[from] ControllerError),

    /// Planner error
    #[error(transparent)]
    Planner(#[from] PlannerError),

    /// Protocol error
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Job error
    #[error(transparent)]
    Job(#[from] JobError),

    /// Standard I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encode/decode error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an error from a string message
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    /// Check if this is a timeout error
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Connection(ConnectionError::Timeout { .. }))
    }

    /// Check if this is a connection error
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Error::Connection(_))
    }

    /// Check if the target machine was not connected
    pub fn is_not_connected(&self) -> bool {
        matches!(self, Error::Controller(ControllerError::NotConnected { .. }))
    }

    /// Check if the planner found no route
    pub fn is_path_not_found(&self) -> bool {
        matches!(self, Error::Planner(PlannerError::PathNotFound { .. }))
    }

    /// Check if this is a job lookup or dispatch error
    pub fn is_job_error(&self) -> bool {
        matches!(self, Error::Job(_))
    }
}

/// Result type using Error
pub type Result<T> = std::result::Result<T, Error>;
