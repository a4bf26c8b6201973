use thiserror::Error;

/// Convenient result alias for the trailgraph library.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level library error type.
#[derive(Debug, Error)]
pub enum Error {
    /// Raised when a region filter is empty or matches no trail in the input.
    #[error("invalid region filter '{region}'{}", format_suggestions(.suggestions))]
    InvalidRegionFilter {
        region: String,
        suggestions: Vec<String>,
    },

    /// Raised when a configuration value is outside its accepted range.
    #[error("invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// Raised when a trail geometry cannot be processed at all.
    #[error("invalid geometry for trail {trail_id}: {reason}")]
    InvalidGeometry { trail_id: String, reason: String },

    /// Raised when a graph operation refers to a node that does not exist.
    #[error("routing node {node_id} does not exist")]
    UnknownNode { node_id: u64 },

    /// Raised when a stage needs a routing graph that has not been built yet.
    #[error("routing graph is empty; build nodes and edges first")]
    EmptyGraph,

    /// Raised when a requested route pattern is not configured.
    #[error("unknown route pattern: {name}")]
    UnknownPattern { name: String },

    /// Raised when a GeoJSON feature does not carry a usable line geometry.
    #[error("feature {index} has unsupported geometry type {kind}")]
    UnsupportedGeometry { index: usize, kind: String },

    /// Wrapper for IO errors.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Wrapper for JSON errors.
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// Wrapper for GeoJSON parsing errors.
    #[error(transparent)]
    GeoJson(#[from] geojson::Error),
}

impl Error {
    /// Shorthand for configuration errors.
    pub fn config(message: impl Into<String>) -> Self {
        Error::InvalidConfig {
            message: message.into(),
        }
    }
}

fn format_suggestions(suggestions: &[String]) -> String {
    if suggestions.is_empty() {
        String::new()
    } else if suggestions.len() == 1 {
        format!(". Did you mean '{}'?", suggestions[0])
    } else {
        format!(
            ". Did you mean one of: {}?",
            suggestions
                .iter()
                .map(|s| format!("'{}'", s))
                .collect::<Vec<_>>()
                .join(", ")
        )
    }
}
