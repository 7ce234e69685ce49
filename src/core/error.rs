use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DetachError {
    #[error("Type '{0}' is managed by the store but has no discoverable identifier")]
    MissingIdentifier(String),

    #[error("Entity '{0}' has no identifier value (transient instance)")]
    TransientEntity(String),

    #[error("Cannot build a placeholder for {owner}.{property}: declared type '{declared}' is sealed")]
    SealedType {
        owner: String,
        property: String,
        declared: String,
    },

    #[error("Value of type {0} is bound to a store session and cannot be serialized")]
    SessionBound(String),

    #[error("Could not initialize {0}: the owning session is closed")]
    SessionClosed(String),

    #[error("Collection '{0}' is no longer registered with its session")]
    StaleCollection(String),

    #[error("Entity {0} not found")]
    EntityNotFound(String),

    #[error("Placeholder for {0} is not resolved yet")]
    Unresolved(String),

    #[error("Entity type '{0}' is already registered")]
    DuplicateType(String),

    #[error("Entity type '{0}' is not registered")]
    UnknownType(String),

    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    IoError(String),
}

pub type Result<T> = std::result::Result<T, DetachError>;

impl From<rmp_serde::encode::Error> for DetachError {
    fn from(err: rmp_serde::encode::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<rmp_serde::decode::Error> for DetachError {
    fn from(err: rmp_serde::decode::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for DetachError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for DetachError {
    fn from(err: std::io::Error) -> Self {
        Self::IoError(err.to_string())
    }
}
