//! Pluggable parser and estimator services.
//!
//! This crate provides:
//! - [`ServiceRegistry`]: identifier → service lookup with registration order
//! - [`PropertySchema`]: declared property fields, coercion and field-keyed errors
//! - Parser services (`csv`, `json`) producing [`mlswarm_core::Table`]s
//! - Estimator services (`simple-regressor`, `nearest-centroid-classifier`)
//! - [`Registries::builtin`]: the registries wired at process start

pub mod builtin;
pub mod cancel;
pub mod error;
pub mod estimators;
pub mod parsers;
pub mod properties;
pub mod registry;
pub mod schema;

pub use builtin::Registries;
pub use cancel::CancelFlag;
pub use error::{EstimatorError, FieldErrors, ParseError, ServiceError};
pub use estimators::{Estimator, EstimatorArgs, EstimatorRegistry, RunContext};
pub use parsers::{DatasetParser, ParserArgs, ParserRegistry};
pub use properties::RawProperties;
pub use registry::{Service, ServiceRegistry};
pub use schema::{FieldKind, FieldSpec, PropertySchema};
