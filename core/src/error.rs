use thiserror::Error;

#[derive(Error, Debug)]
pub enum WaterfallError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Segment '{segment}' in channel '{channel}' has no checks")]
    EmptyCheckSet { channel: String, segment: String },

    #[error("Duplicate check name '{check}' in channel '{channel}', segment '{segment}'")]
    DuplicateCheck {
        channel: String,
        segment: String,
        check: String,
    },

    #[error("Unknown flag column '{check}' in source '{source_name}'")]
    UnknownCheck { source_name: String, check: String },

    #[error("Data access failed for group '{group}': {message}")]
    DataAccess { group: String, message: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type WfResult<T> = Result<T, WaterfallError>;
