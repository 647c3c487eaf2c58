//! Common errors across the parts-rs crate

/// Top level error for configuring a simulation, used as the context of
/// `error_stack` reports. The underlying cause is attached to the report.
#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    #[error("Dimensions of the simulation are inconsistent")]
    Dimensions,
    #[error("Could not set up absorption species {0}")]
    Species(String),
    #[error("The engine rejected {call} for species {species}")]
    Engine { call: &'static str, species: String },
}

impl SetupError {
    pub fn species<S: ToString>(name: S) -> Self {
        Self::Species(name.to_string())
    }
}

/// Error returned by an [`ArtsEngine`](crate::jacobian::ArtsEngine) implementation.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct EngineError(pub String);

impl EngineError {
    pub fn new<S: ToString>(msg: S) -> Self {
        Self(msg.to_string())
    }
}
