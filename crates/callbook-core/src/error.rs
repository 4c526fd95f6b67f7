use thiserror::Error;

/// Failure class of a [`BookingError`]. The HTTP layer maps these to status
/// codes; the core only cares about the stable `code`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Conflict,
    NotFound,
    StateViolation,
    ExternalFailure,
    Expiry,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Conflict => "conflict",
            ErrorKind::NotFound => "not_found",
            ErrorKind::StateViolation => "state_violation",
            ErrorKind::ExternalFailure => "external_failure",
            ErrorKind::Expiry => "expiry",
            ErrorKind::Internal => "internal",
        }
    }
}

/// Domain failure of a core operation. Every variant except `Internal`
/// carries the snake_case code shown to the caller.
#[derive(Debug, Error)]
pub enum BookingError {
    #[error("invalid input: {0}")]
    Validation(&'static str),

    #[error("conflict: {0}")]
    Conflict(&'static str),

    #[error("not found: {0}")]
    NotFound(&'static str),

    #[error("state violation: {0}")]
    StateViolation(&'static str),

    #[error("external failure ({code}): {detail}")]
    ExternalFailure { code: &'static str, detail: String },

    #[error("expired: {0}")]
    Expiry(&'static str),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl BookingError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BookingError::Validation(_) => ErrorKind::Validation,
            BookingError::Conflict(_) => ErrorKind::Conflict,
            BookingError::NotFound(_) => ErrorKind::NotFound,
            BookingError::StateViolation(_) => ErrorKind::StateViolation,
            BookingError::ExternalFailure { .. } => ErrorKind::ExternalFailure,
            BookingError::Expiry(_) => ErrorKind::Expiry,
            BookingError::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            BookingError::Validation(code)
            | BookingError::Conflict(code)
            | BookingError::NotFound(code)
            | BookingError::StateViolation(code)
            | BookingError::Expiry(code) => code,
            BookingError::ExternalFailure { code, .. } => code,
            BookingError::Internal(_) => "internal_error",
        }
    }

    pub(crate) fn external(code: &'static str, err: impl std::fmt::Display) -> Self {
        BookingError::ExternalFailure {
            code,
            detail: err.to_string(),
        }
    }
}

pub type BookingResult<T> = Result<T, BookingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(BookingError::Conflict("slot_not_available").code(), "slot_not_available");
        assert_eq!(
            BookingError::external("payment_provider_failed", "timeout").code(),
            "payment_provider_failed"
        );
        let internal: BookingError = anyhow::anyhow!("disk full").into();
        assert_eq!(internal.code(), "internal_error");
        assert_eq!(internal.kind(), ErrorKind::Internal);
    }
}
