use thiserror::Error;

/// Failure modes of a routing request. Every variant maps to a short
/// machine-readable tag (`kind`) and a one-line human message (`Display`).
#[derive(Debug, Error)]
pub enum RouteError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("no navigable water remains after subtracting land and shallows")]
    NoNavigableArea,

    #[error("no sailable path between control points {leg_from} and {leg_to}")]
    NoRoute { leg_from: usize, leg_to: usize },

    #[error("triangulation failed: {0}")]
    MeshingFailed(String),

    #[error("weather fetch failed: {0}")]
    WeatherFetchFailed(String),

    #[error("transient source error: {0}")]
    Transient(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl RouteError {
    /// Stable tag for API surfaces and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            RouteError::InvalidInput(_) => "invalid_input",
            RouteError::NoNavigableArea => "no_navigable_area",
            RouteError::NoRoute { .. } => "no_route",
            RouteError::MeshingFailed(_) => "meshing_failed",
            RouteError::WeatherFetchFailed(_) => "weather_fetch_failed",
            RouteError::Transient(_) => "transient",
            RouteError::Io(_) => "io",
            RouteError::Serde(_) => "serde",
        }
    }

    /// Transient errors may be retried with backoff before being surfaced.
    pub fn is_retriable(&self) -> bool {
        matches!(self, RouteError::Transient(_))
    }
}
