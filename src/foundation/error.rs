use std::fmt;

/// Result alias used throughout the crate.
pub type LayerResult<T> = Result<T, LayerError>;

/// Failure taxonomy of the persistent store tier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StoreErrorKind {
    /// The requested key has no row.
    NotFound,
    /// A write collided with an existing key.
    Constraint,
    /// The write would exceed the configured byte quota.
    QuotaExceeded,
    /// The store has been closed or is otherwise unavailable.
    Closed,
}

impl fmt::Display for StoreErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NotFound => "not found",
            Self::Constraint => "constraint violation",
            Self::QuotaExceeded => "quota exceeded",
            Self::Closed => "store closed",
        };
        f.write_str(s)
    }
}

#[derive(thiserror::Error, Debug)]
/// Crate-wide error type.
pub enum LayerError {
    /// Invalid options or malformed caller input.
    #[error("validation error: {0}")]
    Validation(String),

    /// A snapshot failed to decode or rasterize.
    #[error("decode failure: {0}")]
    Decode(String),

    /// The texture encoder failed.
    #[error("encode failure: {0}")]
    Encode(String),

    /// A persistent store operation failed.
    #[error("store failure ({kind}): {message}")]
    Store {
        /// Failure kind.
        kind: StoreErrorKind,
        /// Human-readable detail.
        message: String,
    },

    /// Row, blob or document (de)serialization failed.
    #[error("serialization error: {0}")]
    Serde(String),

    /// Any other failure, with context.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl LayerError {
    /// Build a [`LayerError::Validation`].
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Build a [`LayerError::Decode`].
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    /// Build a [`LayerError::Encode`].
    pub fn encode(msg: impl Into<String>) -> Self {
        Self::Encode(msg.into())
    }

    /// Build a [`LayerError::Store`].
    pub fn store(kind: StoreErrorKind, msg: impl Into<String>) -> Self {
        Self::Store {
            kind,
            message: msg.into(),
        }
    }

    /// Build a [`LayerError::Serde`].
    pub fn serde(msg: impl Into<String>) -> Self {
        Self::Serde(msg.into())
    }

    /// Store failure kind, if this is a store error.
    pub fn store_kind(&self) -> Option<StoreErrorKind> {
        match self {
            Self::Store { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// `true` for [`StoreErrorKind::NotFound`].
    pub fn is_not_found(&self) -> bool {
        self.store_kind() == Some(StoreErrorKind::NotFound)
    }
}
