//! ISO Fetcher Library
//!
//! Downloads OS installation images, discovers and verifies their published
//! checksums, and keeps a catalog of the images archived locally.
//!
//! The [`app::service::ArchiveService`] facade is the usual entry point; the
//! components it wires together live under [`app`].

pub mod app;
pub mod cli;
pub mod config;
pub mod constants;
pub mod errors;
pub mod prelude;

// Re-export commonly used types for convenience
pub use errors::{AppError, Result};

#[cfg(test)]
mod tests {
    use super::*;
    use constants::*;

    #[test]
    fn test_constants_accessible() {
        assert_eq!(DEFAULT_MAX_CONCURRENT_JOBS, 3);
        assert_eq!(DEFAULT_RATE_LIMIT_RPS, 10);
        assert!(USER_AGENT.contains("ISO-Fetcher"));
    }

    #[test]
    fn test_error_types() {
        let catalog_error = errors::CatalogError::PathTraversal {
            filename: "../x".to_string(),
        };
        let app_error = AppError::Catalog(catalog_error);

        assert_eq!(app_error.category(), "catalog");
        assert!(!app_error.is_recoverable());
    }
}
