use thiserror::Error;

/// Result type alias using DocError
pub type Result<T> = std::result::Result<T, DocError>;

// ========== Error Facility ==========

/// Canonical error kind taxonomy
///
/// Each kind maps to a stable error code that can be used for programmatic
/// error handling, log assertions and host-facing responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExErrorKind {
    // Transaction contract
    NoActiveTransaction,
    TransactionInProgress,

    // Entity contract
    EntityHasNoState,
    StateAlreadyInitialized,
    DocumentClosed,
    EntityNotInDocument,
    IdsExhausted,

    // History
    MixedDocuments,

    // Load/save
    InvalidEntityId,
    Serialization,
}

impl ExErrorKind {
    /// Get the stable error code for this kind
    pub fn code(&self) -> &'static str {
        match self {
            ExErrorKind::NoActiveTransaction => "ERR_NO_ACTIVE_TRANSACTION",
            ExErrorKind::TransactionInProgress => "ERR_TRANSACTION_IN_PROGRESS",
            ExErrorKind::EntityHasNoState => "ERR_ENTITY_HAS_NO_STATE",
            ExErrorKind::StateAlreadyInitialized => "ERR_STATE_ALREADY_INITIALIZED",
            ExErrorKind::DocumentClosed => "ERR_DOCUMENT_CLOSED",
            ExErrorKind::EntityNotInDocument => "ERR_ENTITY_NOT_IN_DOCUMENT",
            ExErrorKind::IdsExhausted => "ERR_IDS_EXHAUSTED",
            ExErrorKind::MixedDocuments => "ERR_MIXED_DOCUMENTS",
            ExErrorKind::InvalidEntityId => "ERR_INVALID_ENTITY_ID",
            ExErrorKind::Serialization => "ERR_SERIALIZATION",
        }
    }
}

/// Canonical structured error type
///
/// Carries the classification used by the logging macros plus optional
/// context describing where the failure happened.
#[derive(Debug, Clone)]
pub struct ExError {
    kind: ExErrorKind,
    op: Option<String>,
    entity_id: Option<String>,
    message: String,
}

impl ExError {
    /// Create a new error with the specified kind
    pub fn new(kind: ExErrorKind) -> Self {
        Self {
            kind,
            op: None,
            entity_id: None,
            message: String::new(),
        }
    }

    /// Add operation context
    pub fn with_op(mut self, op: impl Into<String>) -> Self {
        self.op = Some(op.into());
        self
    }

    /// Add entity ID context
    pub fn with_entity_id(mut self, id: impl Into<String>) -> Self {
        self.entity_id = Some(id.into());
        self
    }

    /// Add custom message
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn kind(&self) -> ExErrorKind {
        self.kind
    }

    /// Get the stable error code
    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    pub fn op(&self) -> Option<&str> {
        self.op.as_deref()
    }

    pub fn entity_id(&self) -> Option<&str> {
        self.entity_id.as_deref()
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for ExError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.code())?;
        if let Some(op) = &self.op {
            write!(f, " in operation '{}'", op)?;
        }
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }
        if let Some(entity_id) = &self.entity_id {
            write!(f, " (entity_id: {})", entity_id)?;
        }
        Ok(())
    }
}

impl std::error::Error for ExError {}

// ========== End Error Facility ==========

/// Error taxonomy for document operations
///
/// Every variant is a contract violation by the caller (the operation did not
/// proceed) except `Serialization`, which wraps a serde failure. Recoverable
/// conditions such as "a transaction is already open" are reported through
/// `None`/`false` results instead.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DocError {
    /// Mutation, creation or destruction attempted with no open transaction
    #[error("Operation '{op}' requires an active transaction")]
    NoActiveTransaction { op: &'static str },

    /// Operation that must run outside a transaction found one open
    #[error("Operation '{op}' is not allowed while a transaction is active")]
    TransactionInProgress { op: &'static str },

    /// Entity has no state (never initialized, or destroyed)
    #[error("Entity {entity_id} has no state")]
    EntityHasNoState { entity_id: String },

    /// Entity was initialized twice
    #[error("Entity {entity_id} already has state")]
    StateAlreadyInitialized { entity_id: String },

    /// The owning document was dropped while a handle was still in use
    #[error("Document owning entity {entity_id} has been closed")]
    DocumentClosed { entity_id: String },

    /// The handle is not the entity the document maps under its id
    #[error("Entity {entity_id} is not part of this document")]
    EntityNotInDocument { entity_id: String },

    /// The id generator has handed out every id
    #[error("Entity id space exhausted")]
    IdsExhausted,

    /// Requests produced by different documents cannot be merged
    #[error("Cannot merge requests from different documents")]
    MixedDocuments,

    /// Entity identifier could not be parsed
    #[error("Invalid entity id: {value}")]
    InvalidEntityId { value: String },

    /// Serialization error (JSON encoding/decoding)
    #[error("Serialization error: {message}")]
    Serialization { message: String },
}

/// Conversion from DocError to the canonical ExError
impl From<DocError> for ExError {
    fn from(err: DocError) -> Self {
        match err {
            DocError::NoActiveTransaction { op } => ExError::new(ExErrorKind::NoActiveTransaction)
                .with_op(op)
                .with_message("No active transaction"),

            DocError::TransactionInProgress { op } => {
                ExError::new(ExErrorKind::TransactionInProgress)
                    .with_op(op)
                    .with_message("A transaction is already active")
            }

            DocError::EntityHasNoState { entity_id } => ExError::new(ExErrorKind::EntityHasNoState)
                .with_entity_id(entity_id)
                .with_message("Entity has no state"),

            DocError::StateAlreadyInitialized { entity_id } => {
                ExError::new(ExErrorKind::StateAlreadyInitialized)
                    .with_entity_id(entity_id)
                    .with_message("Entity already has state")
            }

            DocError::DocumentClosed { entity_id } => ExError::new(ExErrorKind::DocumentClosed)
                .with_entity_id(entity_id)
                .with_message("Owning document has been closed"),

            DocError::EntityNotInDocument { entity_id } => {
                ExError::new(ExErrorKind::EntityNotInDocument)
                    .with_entity_id(entity_id)
                    .with_message("Handle does not match the mapped entity")
            }

            DocError::IdsExhausted => ExError::new(ExErrorKind::IdsExhausted)
                .with_op("create_entity")
                .with_message("No entity ids left"),

            DocError::MixedDocuments => ExError::new(ExErrorKind::MixedDocuments)
                .with_op("merge")
                .with_message("Requests belong to different documents"),

            DocError::InvalidEntityId { value } => ExError::new(ExErrorKind::InvalidEntityId)
                .with_message(format!("Invalid entity id: {}", value)),

            DocError::Serialization { message } => {
                ExError::new(ExErrorKind::Serialization).with_message(message)
            }
        }
    }
}

/// Conversion from serde_json::Error to DocError
impl From<serde_json::Error> for DocError {
    fn from(err: serde_json::Error) -> Self {
        DocError::Serialization {
            message: err.to_string(),
        }
    }
}
