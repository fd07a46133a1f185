use std::fmt::Display;
use std::path::PathBuf;

// constraint violations detected before anything is written
#[derive(Debug, PartialEq, Clone)]
pub enum ValidationError {
    UnknownField(String),
    IdOutOfRange { id: u32, count: usize },
    MalformedDate(String),
    NegativeAmount(String),
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::UnknownField(field) => write!(
                f,
                "the field {field} is not an available column (expected Date, Description, Amount or Type)"
            ),
            ValidationError::IdOutOfRange { id, count: 0 } => {
                write!(f, "invalid id {id}: the ledger has no records")
            }
            ValidationError::IdOutOfRange { id, count } => {
                write!(f, "invalid id {id}: id must be in range 1 to {count}")
            }
            ValidationError::MalformedDate(value) => {
                write!(f, "{value:?} is not a date in YYYY-MM-DD format")
            }
            ValidationError::NegativeAmount(value) => {
                write!(f, "amount must not be negative, got {value}")
            }
        }
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug)]
pub enum LedgerError {
    Validation(ValidationError),
    NotFound(u32),
    EmptyStore,
    /// A stored row could not be interpreted. `id` is `None` when the row
    /// itself could not be read far enough to know it.
    Parse { id: Option<u32>, reason: String },
    Io(std::io::Error),
    Locked(PathBuf),
}

impl LedgerError {
    pub fn parse(id: Option<u32>, reason: impl Into<String>) -> Self {
        LedgerError::Parse {
            id,
            reason: reason.into(),
        }
    }
}

impl Display for LedgerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LedgerError::Validation(err) => write!(f, "{err}"),
            LedgerError::NotFound(id) => write!(f, "record with id {id} not found"),
            LedgerError::EmptyStore => write!(f, "no records found in the ledger"),
            LedgerError::Parse {
                id: Some(id),
                reason,
            } => write!(f, "record {id} is malformed: {reason}"),
            LedgerError::Parse { id: None, reason } => write!(f, "malformed ledger: {reason}"),
            LedgerError::Io(err) => write!(f, "ledger I/O failed: {err}"),
            LedgerError::Locked(path) => write!(
                f,
                "ledger is locked by another process ({})",
                path.display()
            ),
        }
    }
}

impl std::error::Error for LedgerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LedgerError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ValidationError> for LedgerError {
    fn from(err: ValidationError) -> Self {
        LedgerError::Validation(err)
    }
}

impl From<std::io::Error> for LedgerError {
    fn from(err: std::io::Error) -> Self {
        LedgerError::Io(err)
    }
}

impl From<tempfile::PersistError> for LedgerError {
    fn from(err: tempfile::PersistError) -> Self {
        LedgerError::Io(err.error)
    }
}

impl From<csv::Error> for LedgerError {
    fn from(err: csv::Error) -> Self {
        let reason = err.to_string();
        match err.into_kind() {
            csv::ErrorKind::Io(err) => LedgerError::Io(err),
            _ => LedgerError::parse(None, reason),
        }
    }
}
