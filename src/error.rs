use thiserror::Error;

pub type Result<T> = std::result::Result<T, TsqlError>;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum TsqlError {
    #[error("Conversion failed when converting {from} value '{value}' to data type {to}")]
    ConversionFailed {
        from: String,
        to: String,
        value: String,
    },

    #[error("Arithmetic overflow error converting {0}")]
    ArithmeticOverflow(String),

    #[error("Divide by zero error encountered")]
    DivideByZero,

    #[error("Cannot insert the value NULL into column '{column}', table '{table}'")]
    NullNotAllowed { table: String, column: String },

    #[error("Violation of PRIMARY KEY constraint on '{table}'. Cannot insert duplicate key {key}")]
    DuplicateKey { table: String, key: String },

    #[error("Transaction was deadlocked on resources with another process: {0}")]
    Deadlock(String),

    #[error("Execution timeout expired: {0}")]
    Timeout(String),

    #[error("Not supported: {0}")]
    NotSupported(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid: {0}")]
    Invalid(String),

    #[error("'{name}' requires {expected} argument(s), got {got}")]
    Arity {
        name: String,
        expected: String,
        got: usize,
    },

    #[error("'{0}' is not a recognized built-in function name")]
    UnknownFunction(String),

    #[error("Must declare the scalar variable \"{0}\"")]
    UndeclaredVariable(String),

    #[error("A cursor with the name '{0}' does not exist")]
    CursorNotFound(String),

    #[error("A cursor with the name '{0}' already exists")]
    CursorExists(String),

    #[error("The cursor '{0}' is already open")]
    CursorAlreadyOpen(String),

    #[error("The cursor '{0}' is not open")]
    CursorNotOpen(String),

    #[error("There is already an object named '{0}' in the database")]
    TableExists(String),

    #[error("Invalid object name '{0}'")]
    TableNotFound(String),

    #[error("Cannot insert explicit value for identity column in table '{0}'")]
    IdentityInsert(String),

    #[error("{0}")]
    Transaction(String),

    #[error("{message}")]
    Raised {
        number: i32,
        message: String,
        severity: u8,
        state: u8,
    },
}

impl TsqlError {
    /// SQL Server error number surfaced through `ERROR_NUMBER()` and `@@ERROR`.
    pub fn number(&self) -> i32 {
        match self {
            TsqlError::ConversionFailed { .. } => 245,
            TsqlError::ArithmeticOverflow(_) => 8115,
            TsqlError::DivideByZero => 8134,
            TsqlError::NullNotAllowed { .. } => 515,
            TsqlError::DuplicateKey { .. } => 2627,
            TsqlError::Deadlock(_) => 1205,
            TsqlError::Timeout(_) => -2,
            TsqlError::Arity { .. } => 174,
            TsqlError::UnknownFunction(_) => 195,
            TsqlError::UndeclaredVariable(_) => 137,
            TsqlError::CursorNotFound(_) => 16916,
            TsqlError::CursorExists(_) => 16915,
            TsqlError::CursorAlreadyOpen(_) => 16905,
            TsqlError::CursorNotOpen(_) => 16917,
            TsqlError::TableExists(_) => 2714,
            TsqlError::TableNotFound(_) => 208,
            TsqlError::IdentityInsert(_) => 544,
            TsqlError::Transaction(_) => 3902,
            TsqlError::Raised { number, .. } => *number,
            TsqlError::NotSupported(_) | TsqlError::NotFound(_) | TsqlError::Invalid(_) => {
                GENERIC_ERROR_NUMBER
            }
        }
    }

    pub fn severity(&self) -> u8 {
        match self {
            TsqlError::Raised { severity, .. } => *severity,
            TsqlError::Deadlock(_) => 13,
            TsqlError::ArithmeticOverflow(_)
            | TsqlError::DivideByZero
            | TsqlError::ConversionFailed { .. } => 16,
            TsqlError::DuplicateKey { .. } => 14,
            _ => 16,
        }
    }

    pub fn state(&self) -> u8 {
        match self {
            TsqlError::Raised { state, .. } => *state,
            TsqlError::Deadlock(_) | TsqlError::NullNotAllowed { .. } => 2,
            _ => 1,
        }
    }

    pub fn conversion(from: impl Into<String>, to: impl Into<String>, value: impl Into<String>) -> Self {
        TsqlError::ConversionFailed {
            from: from.into(),
            to: to.into(),
            value: value.into(),
        }
    }

    pub fn arity(name: &str, expected: impl Into<String>, got: usize) -> Self {
        TsqlError::Arity {
            name: name.to_ascii_uppercase(),
            expected: expected.into(),
            got,
        }
    }
}

/// Number used for errors with no dedicated code, and for RAISERROR with a text message.
pub const GENERIC_ERROR_NUMBER: i32 = 50000;
