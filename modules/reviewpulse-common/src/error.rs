use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReviewPulseError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Store read error: {0}")]
    StoreRead(String),

    #[error("Store write error: {0}")]
    StoreWrite(String),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("No total review count recorded for {entity}; run ingestion first")]
    MissingTotalCount { entity: String },

    #[error("Run lease conflict: another {kind} run is in progress for {entity}")]
    LeaseConflict { entity: String, kind: String },

    #[error("Run cancelled")]
    Cancelled,

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}
