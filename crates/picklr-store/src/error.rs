use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("state I/O error at {path}: {message}")]
    StateIo { path: String, message: String },

    #[error("state parse error: {0}")]
    StateParse(String),

    #[error("state lock held by {holder} since {acquired_at}")]
    StateLocked { holder: String, acquired_at: String },

    #[error("state decryption failed: {0}")]
    StateDecrypt(String),
}
