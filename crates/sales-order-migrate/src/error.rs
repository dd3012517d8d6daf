//! Error types for the migration library.

use thiserror::Error;

/// Exit code for configuration errors (invalid YAML, missing fields, etc.).
pub const EXIT_CONFIG_ERROR: u8 = 1;
/// Exit code for store connectivity and lookup errors.
pub const EXIT_STORE_ERROR: u8 = 2;
/// Exit code for failed page saves.
pub const EXIT_SAVE_ERROR: u8 = 3;
/// Exit code for record transformation and structure errors.
pub const EXIT_TRANSFORM_ERROR: u8 = 4;
/// Exit code for the unsupported rollback operation.
pub const EXIT_ROLLBACK_ERROR: u8 = 5;
/// Exit code for state file errors.
pub const EXIT_STATE_ERROR: u8 = 6;
/// Exit code for IO errors.
pub const EXIT_IO_ERROR: u8 = 7;

/// Main error type for migration operations.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Database driver error from the MySQL store
    #[cfg(feature = "mysql")]
    #[error("Database error: {0}")]
    Database(#[from] mysql_async::Error),

    /// Store-level failure not tied to a specific driver
    #[error("Store error: {0}")]
    Store(String),

    /// Connection pool error with context
    #[error("Pool error: {message}\n  Context: {context}")]
    Pool { message: String, context: String },

    /// A configured document does not exist in its store
    #[error("Document not found: {0}")]
    DocumentNotFound(String),

    /// A record or collection does not fit its document's structure
    #[error("Structure error in document {document}: {message}")]
    Structure { document: String, message: String },

    /// Record transformation failed
    #[error("Transform failed for document {document}: {message}")]
    Transform { document: String, message: String },

    /// Bulk save of a page failed
    #[error("Save failed for document {document} (page {page}): {message}")]
    Save {
        document: String,
        page: usize,
        message: String,
    },

    /// Rollback was requested; migrations are re-run from a clean destination instead
    #[error("Rollback is impossible")]
    RollbackUnsupported,

    /// State file error or invalid state transition
    #[error("State error: {0}")]
    State(String),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MigrateError {
    /// Create a Pool error with context about where it occurred
    pub fn pool(message: impl ToString, context: impl Into<String>) -> Self {
        MigrateError::Pool {
            message: message.to_string(),
            context: context.into(),
        }
    }

    /// Create a Structure error
    pub fn structure(document: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::Structure {
            document: document.into(),
            message: message.into(),
        }
    }

    /// Create a Transform error
    pub fn transform(document: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::Transform {
            document: document.into(),
            message: message.into(),
        }
    }

    /// Create a Save error for the given page
    pub fn save(document: impl Into<String>, page: usize, message: impl ToString) -> Self {
        MigrateError::Save {
            document: document.into(),
            page,
            message: message.to_string(),
        }
    }

    /// Process exit code for this error class.
    pub fn exit_code(&self) -> u8 {
        match self {
            MigrateError::Config(_) | MigrateError::Yaml(_) => EXIT_CONFIG_ERROR,
            #[cfg(feature = "mysql")]
            MigrateError::Database(_) => EXIT_STORE_ERROR,
            MigrateError::Store(_) | MigrateError::Pool { .. } | MigrateError::DocumentNotFound(_) => {
                EXIT_STORE_ERROR
            }
            MigrateError::Save { .. } => EXIT_SAVE_ERROR,
            MigrateError::Transform { .. } | MigrateError::Structure { .. } => EXIT_TRANSFORM_ERROR,
            MigrateError::RollbackUnsupported => EXIT_ROLLBACK_ERROR,
            MigrateError::State(_) | MigrateError::Json(_) => EXIT_STATE_ERROR,
            MigrateError::Io(_) => EXIT_IO_ERROR,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        // Add error chain for wrapped errors
        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;
