//! MedCat Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, utilities, and error handling for the MedCat project.
//!
//! # Overview
//!
//! This crate provides common functionality used across all MedCat workspace members:
//!
//! - **Error Handling**: Custom error types and result types
//! - **Checksums**: Whole-file and incremental digests for snapshot artifacts
//! - **Records**: Newline-delimited record counting over chunked streams
//! - **Logging**: `tracing` subscriber setup driven by `LOG_*` variables
//! - **Types**: Shared domain types (snapshot status, checksum algorithms)
//!
//! # Example
//!
//! ```no_run
//! use medcat_common::checksum::compute_file_checksum;
//! use medcat_common::types::ChecksumAlgorithm;
//!
//! fn print_digest(path: &str) -> medcat_common::Result<()> {
//!     let digest = compute_file_checksum(path, ChecksumAlgorithm::Sha256)?;
//!     tracing::info!(%digest, "artifact digest");
//!     Ok(())
//! }
//! ```

pub mod checksum;
pub mod error;
pub mod logging;
pub mod records;
pub mod types;

// Re-export commonly used types
pub use error::{MdcError, Result};
