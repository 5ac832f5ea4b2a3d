/// Object Store failures. Transfer errors are fatal to the current attempt
/// but retryable by the broker.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("failed to download {key}: {reason}")]
    Download { key: String, reason: String },

    #[error("failed to upload {key}: {reason}")]
    Upload { key: String, reason: String },

    #[error("object store configuration error: {0}")]
    Config(String),
}
