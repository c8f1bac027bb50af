//! Declarative, schema-driven validation of form submissions and API call
//! parameters.
//!
//! A rule schema describes the expected shape of a request: field types,
//! required fields, value ranges, patterns, conditional rules that depend on
//! sibling fields (`when`), uniqueness inside a list (`uniq`) and against
//! existing records (`api_uniq`). The schema is compiled once into a
//! canonical rule tree and then applied to any number of submissions:
//!
//! ```text
//! parse_rules(text) → raw DSL → normalize → Rule ─┐
//!                                                 ├→ resolve → validate → uniq → ValidationReport
//!                             data, files ────────┘
//! ```
//!
//! # Quick Start
//!
//! ```rust
//! use formrules::{FileMap, FormValidator};
//! use serde_json::json;
//!
//! let validator = FormValidator::new(&json!({
//!     "name": ["string", "required", "not_empty", {"length": 64}],
//!     "port": ["integer", {"min": 1, "max": 65535}],
//! }))
//! .expect("valid schema");
//!
//! let report = validator.validate(&json!({"name": "web", "port": "0080"}), &FileMap::new());
//! assert!(report.is_success());
//! assert_eq!(report.data, json!({"name": "web", "port": 80}));
//! ```
//!
//! # Feature Flags
//!
//! | Feature              | Default | Description |
//! |----------------------|---------|-------------|
//! | `builtin-validators` | yes     | Registers the `regex`, `user_macro` and `time_unit` validators in [`ValidatorRegistry::new`]. |

pub mod config;
pub mod engine;
pub mod enums;
pub mod error;
pub mod normalize;
pub mod parse;
pub mod path;
pub mod primitives;
pub mod provider;
pub mod registry;
pub mod report;
pub mod resolve;
pub mod serialize;
pub mod types;
pub mod uniq;

mod validate;

pub use config::EngineOptions;
pub use engine::{FormValidator, FormValidatorBuilder};
pub use enums::*;
pub use error::*;
pub use path::DataPath;
pub use provider::{SchemaProvider, StaticSchema};
pub use registry::{FieldValidator, ValidatorRegistry};
pub use report::{ErrorSink, ValidationReport};
pub use types::*;
pub use uniq::{ExistenceQuery, ObjectExistence};

// Re-export entry-point functions at the crate root for convenience.
pub use normalize::normalize;
pub use parse::parse_rules;
pub use resolve::resolve;
pub use serialize::to_yaml;
