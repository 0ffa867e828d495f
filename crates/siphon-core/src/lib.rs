//! Siphon Core Library
//!
//! This crate provides the core functionality for Siphon:
//! - Expression reference extraction (column, metadata, env-var reads)
//! - Hierarchical source-group reference resolution
//! - Cross-dialect column type compatibility
//! - Pipeline chain validation with forward dataflow
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │   Schema    │────▶│ Validation  │────▶│  Per-item   │
//! │  Snapshot   │     │   Engine    │     │   Report    │
//! └─────────────┘     └─────────────┘     └─────────────┘
//!                           │
//!                 expr / source_ref / type_compat
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use siphon_core::{TableSchema, ValidationEngine};
//!
//! let engine = ValidationEngine::new(&sources, None);
//! let report = engine.validate_chain(&schema, &pipeline.transforms);
//! for item in &report.items {
//!     println!("{}: valid={}", item.item_key, item.is_valid);
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod expr;
pub mod pipeline;
pub mod schema;
pub mod source_ref;
pub mod type_compat;
pub mod validate;

pub use config::Project;
pub use error::{Error, Result};
pub use pipeline::{ColumnTemplateDef, Pipeline, TransformDef, ValueSource};
pub use schema::{SchemaCatalog, TableSchema};
pub use source_ref::{ConfigNode, SourceRef};
pub use validate::{ChainReport, ValidationEngine, ValidationResult};
