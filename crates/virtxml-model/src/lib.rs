//! Typed models bound to nodes of a shared XML [`Document`](virtxml::Document).
//!
//! A model type is a static [`Schema`]: a root tag plus tables of
//! [`PropertyBinding`]s (scalar values reached by a relative path) and
//! [`ChildBinding`]s (nested models, one or many). A [`Model`] is a cheap
//! view holding the shared document and the absolute path of its node; every
//! access re-resolves that path, so views never go stale.
//!
//! ```
//! use virtxml_model::{Model, PropertyBinding, Schema};
//!
//! const CPU: Schema = Schema {
//!     tag: "cpu",
//!     properties: &[
//!         PropertyBinding::text("model", "./model"),
//!         PropertyBinding::integer("sockets", "./topology/@sockets"),
//!     ],
//!     children: &[],
//!     order: &[],
//! };
//!
//! let cpu = Model::new(&CPU);
//! cpu.set_int("sockets", 2)?;
//! cpu.set_text("model", "core2duo")?;
//! assert_eq!(
//!     cpu.to_xml()?,
//!     "<cpu>\n  <model>core2duo</model>\n  <topology sockets=\"2\"/>\n</cpu>"
//! );
//! # Ok::<(), virtxml_model::ModelError>(())
//! ```

mod binding;
mod factory;
mod model;

pub use binding::{Cardinality, ChildBinding, PropertyBinding, Schema, ValueKind, Validator};
pub use factory::{build_from_params, Capability, CapabilityContext, QueryError, QueryParams};
pub use model::{Model, ModelView};
pub use virtxml::{Document, XmlError, XmlPath};

use thiserror::Error;

/// Error type produced by model reads and writes.
#[derive(Debug, Error)]
pub enum ModelError {
    /// Parsing, path resolution or rendering failed in the document layer.
    #[error(transparent)]
    Xml(#[from] XmlError),
    /// A validator rejected the value; the document was not modified.
    #[error("invalid value {value:?} for {property}: {message}")]
    Validation {
        property: String,
        value: String,
        message: String,
    },
    /// Stored text does not decode as the declared kind.
    #[error("cannot decode {property} as {kind}: {value:?}")]
    Decode {
        property: String,
        kind: ValueKind,
        value: String,
    },
    /// Lookup by name found no match.
    #[error("not found: {0}")]
    NotFound(String),
    /// The schema declares no binding with this name.
    #[error("unknown binding: {0}")]
    UnknownBinding(String),
    #[error("{property} is not a {expected} property")]
    KindMismatch {
        property: String,
        expected: ValueKind,
    },
    #[error("{binding} is not a {expected} child binding")]
    Cardinality {
        binding: String,
        expected: Cardinality,
    },
}
