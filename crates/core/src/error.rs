/// Domain-level errors raised by the pure (I/O free) parts of the core.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Invalid action definition '{name}': {reason}")]
    InvalidAction { name: String, reason: String },

    #[error("Failed to parse action definition '{name}': {source}")]
    Parse {
        name: String,
        #[source]
        source: serde_yaml::Error,
    },
}
