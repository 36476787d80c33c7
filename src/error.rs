use thiserror::Error;

#[derive(Error, Debug)]
pub enum AiError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Thread not found: {0}")]
    ThreadNotFound(String),

    #[error("Bridge not found: {0}")]
    BridgeNotFound(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Capacity exceeded: {0}")]
    CapacityExceeded(String),

    #[error("Concurrent write rejected: {0}")]
    Conflict(String),

    #[error("Budget exceeded: {0}")]
    BudgetExceeded(String),

    #[error("Record corrupted: {0}")]
    Corruption(String),

    #[error("External provider error: {0}")]
    Provider(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type AiResult<T> = Result<T, AiError>;

/// Error *kinds* from SPEC_FULL.md §7 — distinct from the Rust variant set
/// above, used to fill the RPC reply's `error.kind` field.
impl AiError {
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Provider(_) => "TransientExternal",
            Self::ThreadNotFound(_) | Self::BridgeNotFound(_) => "NotFound",
            Self::InvalidState(_) | Self::CapacityExceeded(_) => "InvalidState",
            Self::Conflict(_) => "Conflict",
            Self::BudgetExceeded(_) => "BudgetExceeded",
            Self::Corruption(_) => "Corruption",
            Self::InvalidInput(_) => "InvalidInput",
            Self::Storage(_) | Self::Serialization(_) | Self::Io(_) => "TransientExternal",
        }
    }
}
