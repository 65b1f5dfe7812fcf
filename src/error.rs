use thiserror::Error;

#[derive(Error, Debug)]
pub enum TallyError {
    #[error("Database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{entity} not found: {name}")]
    NotFound { entity: &'static str, name: String },

    #[error("{entity} already exists: {name}")]
    Duplicate { entity: &'static str, name: String },

    #[error("{0}")]
    Validation(String),

    #[error("Category '{name}' is an {actual} category, not {expected}")]
    KindMismatch {
        name: String,
        expected: String,
        actual: String,
    },

    #[error("CSV is missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),

    #[error("No active user. Run `tally users add <name>` and `tally login <name>` first.")]
    NoSession,

    #[error("Unknown user: {0}")]
    UnknownUser(String),

    #[error("Database not found at {0}. Run `tally init` to set up.")]
    NotInitialized(String),

    #[error("Settings error: {0}")]
    Settings(String),
}

impl TallyError {
    pub fn not_found(entity: &'static str, name: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            name: name.into(),
        }
    }

    pub fn duplicate(entity: &'static str, name: impl Into<String>) -> Self {
        Self::Duplicate {
            entity,
            name: name.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, TallyError>;
