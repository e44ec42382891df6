//! Error types for stratum operations

use std::path::PathBuf;

/// Error types for stratum operations
#[derive(Debug, thiserror::Error)]
pub enum StratumError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{command} failed: {stderr}")]
    Git { command: String, stderr: String },

    #[error("Index corrupt: {0}")]
    Corrupt(String),

    #[error("Symbol extraction failed for {path}: {message}")]
    Extract { path: String, message: String },

    #[error("Commit {0} is already indexed")]
    DuplicateCommit(String),

    #[error("Height {height} does not extend indexed tip height {tip}")]
    HeightGap { height: u32, tip: u32 },

    #[error("Config parse error: {0}")]
    ConfigParse(String),

    #[error("Config already exists at {0}")]
    ConfigExists(PathBuf),

    #[error("Schema version mismatch: database is v{found}, expected v{expected}. Delete .stratum/index.db and run 'stratum index' to rebuild.")]
    SchemaVersionMismatch { found: i32, expected: i32 },

    #[error("Not a stratum index (no .stratum directory). Run 'stratum init' first.")]
    NotInitialized,
}
