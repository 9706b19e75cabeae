use thiserror::Error;

/// Why a raw record was refused by the normalizer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid `{field}`: {reason}")]
pub struct ValidationError {
    pub field: &'static str,
    pub reason: ValidationReason,
}

impl ValidationError {
    pub fn new(field: &'static str, reason: ValidationReason) -> Self {
        Self { field, reason }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationReason {
    #[error("missing or empty")]
    Missing,
    #[error("expected YYYY-MM-DD, got {0:?}")]
    MalformedDate(String),
    #[error("expected YYYY-MM, got {0:?}")]
    MalformedSlug(String),
    #[error("expected an http:// or https:// url, got {0:?}")]
    MalformedUrl(String),
    #[error("{0}")]
    Unparseable(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unreachable at {location}: {message}")]
    Unreachable { location: String, message: String },
    #[error("store returned status {status} for {location}")]
    Status { status: u16, location: String },
    #[error("write precondition failed for {location}")]
    Conflict { location: String },
    #[error("stored document {location} is corrupt: {source}")]
    Corrupt {
        location: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("store i/o failed at {location}: {source}")]
    Io {
        location: String,
        #[source]
        source: std::io::Error,
    },
}

impl StoreError {
    pub fn io(location: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            location: location.into(),
            source,
        }
    }

    pub fn code(&self) -> IndexErrorCode {
        match self {
            Self::Conflict { .. } => IndexErrorCode::E003Conflict,
            Self::Corrupt { .. } => IndexErrorCode::E004StateCorrupt,
            Self::Unreachable { .. } | Self::Status { .. } | Self::Io { .. } => {
                IndexErrorCode::E002StoreUnreachable
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("collection `{0}` is not configured")]
    UnknownCollection(String),
    #[error("gave up on `{collection}` after {attempts} conflicting writes")]
    ConflictRetriesExhausted { collection: String, attempts: u32 },
}

impl ReconcileError {
    pub fn code(&self) -> IndexErrorCode {
        match self {
            Self::Validation(_) => IndexErrorCode::E001Validation,
            Self::Store(err) => err.code(),
            Self::UnknownCollection(_) => IndexErrorCode::E005ConfigInvalid,
            Self::ConflictRetriesExhausted { .. } => IndexErrorCode::E003Conflict,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexErrorCode {
    E001Validation,
    E002StoreUnreachable,
    E003Conflict,
    E004StateCorrupt,
    E005ConfigInvalid,
}

impl IndexErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::E001Validation => "E001_VALIDATION",
            Self::E002StoreUnreachable => "E002_STORE_UNREACHABLE",
            Self::E003Conflict => "E003_CONFLICT",
            Self::E004StateCorrupt => "E004_STATE_CORRUPT",
            Self::E005ConfigInvalid => "E005_CONFIG_INVALID",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_names_the_field() {
        let err = ValidationError::new(
            "date",
            ValidationReason::MalformedDate("2025-13-01".into()),
        );
        assert_eq!(
            err.to_string(),
            "invalid `date`: expected YYYY-MM-DD, got \"2025-13-01\""
        );
    }

    #[test]
    fn conflict_maps_to_conflict_code() {
        let err = ReconcileError::Store(StoreError::Conflict {
            location: "indexes/news.json".into(),
        });
        assert_eq!(err.code().as_str(), "E003_CONFLICT");
    }
}
