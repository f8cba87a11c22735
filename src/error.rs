//! Error handling for folio
//!
//! Defines the import error taxonomy and establishes a unified Result type
//! using anyhow for context chaining and error propagation.

use std::path::PathBuf;

use thiserror::Error;

use crate::crypto::CryptoError;

/// Core error types for import operations
#[derive(Error, Debug)]
pub enum ImportError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("drop directory {path:?} is not readable: {source}")]
    DropDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse error: {0}")]
    Parse(String),

    #[error("database error: {0}")]
    Db(String),

    #[error("archive destination already exists: {0:?}")]
    ArchiveCollision(PathBuf),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("passphrase prompt cancelled")]
    PromptCancelled,
}

/// Result type alias for import operations
pub type Result<T> = anyhow::Result<T>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_formatting_is_readable() {
        let err = ImportError::Db("connection failed".to_string());
        assert_eq!(err.to_string(), "database error: connection failed");
    }

    #[test]
    fn test_anyhow_context_chains_errors() {
        use anyhow::Context;
        let result: Result<()> =
            Err(anyhow::anyhow!("original error")).context("failed to publish canonical output");
        match result {
            Err(e) => {
                assert!(e.to_string().contains("failed to publish canonical output"));
                let debug_msg = format!("{:?}", e);
                assert!(debug_msg.contains("original error"));
            }
            Ok(_) => panic!("expected error"),
        }
    }

    #[test]
    fn test_config_error_is_downcastable_through_anyhow() {
        let err: anyhow::Error = ImportError::Config("missing drop dir".to_string()).into();
        assert!(matches!(
            err.downcast_ref::<ImportError>(),
            Some(ImportError::Config(_))
        ));
    }

    #[test]
    fn test_prompt_cancel_message() {
        assert_eq!(
            ImportError::PromptCancelled.to_string(),
            "passphrase prompt cancelled"
        );
    }

    #[test]
    fn test_crypto_errors_pass_through_unchanged() {
        let err = ImportError::from(CryptoError::AuthenticationFailed);
        assert_eq!(err.to_string(), CryptoError::AuthenticationFailed.to_string());
    }
}
