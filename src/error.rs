//! Error types for conversion, power flow, verification, solver bridging and I/O.

use thiserror::Error;

/// Errors raised while converting a source network into a target network.
///
/// Every variant aborts the whole conversion: a partially converted network
/// is never returned.
#[derive(Debug, Error)]
pub enum ConvertError {
    /// A referenced bus name has no entry in the bus lookup.
    #[error("{element} '{name}' references bus '{bus}' which is not in the bus table")]
    MissingReference {
        element: &'static str,
        name: String,
        bus: String,
    },

    /// The source bus table contains the same name twice.
    #[error("bus name '{0}' appears more than once in the source bus table")]
    DuplicateBus(String),

    /// Per-km normalisation needs a strictly positive, finite length.
    #[error("line '{name}' has invalid length {length} km, expected a value > 0")]
    InvalidLineLength { name: String, length: f64 },

    /// The target line table counts parallel circuits in whole numbers.
    #[error("line '{name}' has {num_parallel} parallel circuits, expected a whole number >= 1")]
    InvalidParallel { name: String, num_parallel: f64 },

    /// Tap-changing transformers are not converted.
    #[error(
        "transformer '{name}' sits at tap position {tap_position}; tap-changing transformers are not supported"
    )]
    UnsupportedTransformer { name: String, tap_position: f64 },

    /// A standard type name is not present in the catalog.
    #[error("unknown {kind} standard type '{name}'")]
    UnknownStdType { kind: &'static str, name: String },

    /// A generator control mode outside of Slack/PV/PQ.
    #[error("generator '{name}' has unsupported control mode '{control}'")]
    UnsupportedControl { name: String, control: String },

    /// A load sign that cannot be classified.
    #[error("load '{name}' has sign {sign}, which is neither <= 0 nor > 0")]
    InvalidSign { name: String, sign: f64 },
}

/// Errors raised by the Newton-Raphson power flow.
#[derive(Debug, Error)]
pub enum PowerFlowError {
    /// No in-service slack element was found.
    #[error("network has no in-service slack bus")]
    NoSlack,

    /// An element points at a bus index that is not in the bus table.
    #[error("{element} references unknown bus index {bus}")]
    UnknownBus { element: &'static str, bus: i64 },

    /// The Jacobian could not be factorised.
    #[error("jacobian is singular at iteration {iteration}")]
    Singular { iteration: usize },

    /// The iteration limit was hit before the mismatch dropped below tolerance.
    #[error("power flow did not converge after {iterations} iterations (mismatch {mismatch:e})")]
    DidNotConverge { iterations: usize, mismatch: f64 },
}

/// Errors raised when comparing source and target power flow results.
#[derive(Debug, Error)]
pub enum VerifyError {
    /// One of the two models carries no solved results.
    #[error("{0} model has no power flow results")]
    MissingResults(&'static str),

    /// A target bus has no counterpart in the source results.
    #[error("bus '{0}' has no result in the source model")]
    MissingBus(String),

    /// A value diverged beyond tolerance.
    #[error(
        "result mismatch at bus '{bus}': {quantity} source={source_value} target={target_value} (delta {delta:e})"
    )]
    ResultMismatch {
        bus: String,
        quantity: &'static str,
        source_value: f64,
        target_value: f64,
        delta: f64,
    },
}

/// Errors raised by the external optimisation bridge.
#[derive(Debug, Error)]
pub enum SolverError {
    /// The runtime is not installed, not on PATH, or lacks the required package.
    #[error("solver backend '{backend}' is unavailable: {reason}")]
    Unavailable { backend: String, reason: String },

    /// The runtime started but reported a failure.
    #[error("solver backend '{backend}' failed (exit code {exit_code:?}): {message}")]
    Execution {
        backend: String,
        exit_code: Option<i32>,
        message: String,
    },

    /// The runtime did not finish in time and was killed.
    #[error("solver timed out after {seconds} seconds")]
    Timeout { seconds: u64 },

    /// The optimisation ran but did not reach a usable solution.
    #[error("optimisation finished with termination status {0}")]
    Infeasible(String),

    /// The result document does not have the expected structure.
    #[error("malformed solver result: {0}")]
    MalformedResult(String),

    /// The network or the options cannot be turned into a solver run.
    #[error("invalid solver request: {0}")]
    InvalidRequest(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors raised while reading or writing network files.
#[derive(Debug, Error)]
pub enum IoError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[cfg(feature = "zip")]
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// A required table is absent from the input.
    #[error("required table '{0}' is missing")]
    MissingTable(String),

    /// The input parsed but does not have the expected layout.
    #[error("malformed input: {0}")]
    Malformed(String),
}

/// Crate-level error.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Convert(#[from] ConvertError),

    #[error(transparent)]
    PowerFlow(#[from] PowerFlowError),

    #[error(transparent)]
    Verify(#[from] VerifyError),

    #[error(transparent)]
    Solver(#[from] SolverError),

    #[error(transparent)]
    Io(#[from] IoError),
}

pub type Result<T> = std::result::Result<T, Error>;
