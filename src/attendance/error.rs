/// Why a request was not applied. `Display` is the user-facing message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    #[error("Invalid Token")]
    InvalidCredential,

    #[error("Missing required fields: {0}")]
    MissingFields(String),

    #[error("Cannot mark attendance for a future date")]
    FutureDate,

    #[error("This lecture has been cancelled")]
    SlotCancelled,

    #[error("No lecture is scheduled at this slot")]
    InvalidSlot,

    #[error("Subject does not match the timetable for this slot")]
    SubjectMismatch,

    #[error("Too many requests, please wait a moment")]
    RateLimited,

    #[error("User does not exist")]
    UserNotFound,

    #[error("Attendance is being updated elsewhere, please retry")]
    TransientConflict,

    #[error("Action Failed")]
    StoreUnavailable,

    #[error("Unauthorized Domain")]
    UnauthorizedDomain,

    #[error("Not an Admin")]
    NotAdmin,
}

impl Rejection {
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidCredential => "invalid_credential",
            Self::MissingFields(_) => "missing_fields",
            Self::FutureDate => "future_date",
            Self::SlotCancelled => "slot_cancelled",
            Self::InvalidSlot => "invalid_slot",
            Self::SubjectMismatch => "subject_mismatch",
            Self::RateLimited => "rate_limited",
            Self::UserNotFound => "user_not_found",
            Self::TransientConflict => "transient_conflict",
            Self::StoreUnavailable => "store_unavailable",
            Self::UnauthorizedDomain => "unauthorized_domain",
            Self::NotAdmin => "not_admin",
        }
    }
}

/// Failures of the backing store. Never shown to callers verbatim.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("corrupt row in {table}: {message}")]
    Corrupt { table: &'static str, message: String },
}

impl StoreError {
    /// Logs the full detail for operators and hands back the generic rejection.
    pub fn into_rejection(self, operation: &str) -> Rejection {
        tracing::error!(operation, error = %self, "attendance store failure");
        Rejection::StoreUnavailable
    }
}
