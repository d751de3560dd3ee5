use thiserror::Error;

/// Error taxonomy shared across the core. Each boundary surfaces the variants
/// that belong to its contract: validation and not-found errors go straight
/// back to the caller, engine and artifact errors are captured into the job
/// record instead of propagating past the orchestrator.
#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("generation pipeline failed: {0}")]
    Engine(String),

    #[error("artifact export failed: {0}")]
    Artifact(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn engine(msg: impl Into<String>) -> Self {
        Self::Engine(msg.into())
    }

    pub fn artifact(msg: impl Into<String>) -> Self {
        Self::Artifact(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
