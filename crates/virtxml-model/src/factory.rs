//! Best-effort construction of models from an external capability source.

use thiserror::Error;
use tracing::{debug, warn};

use crate::binding::Schema;
use crate::model::Model;
use crate::ModelError;

/// Failure reported by a [`CapabilityContext`].
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("feature {0} is not supported")]
    Unsupported(String),
    #[error("capability query failed: {0}")]
    Failed(String),
}

/// Ordered parameters for a capability query. Absent values are kept so the
/// collaborator can tell "not given" from "empty".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams {
    entries: Vec<(String, Option<String>)>,
}

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: Option<&str>) -> Self {
        self.entries
            .push((key.to_string(), value.map(str::to_string)));
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(name, _)| name == key)
            .and_then(|(_, value)| value.as_deref())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.entries
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_deref()))
    }
}

/// Source of raw capability XML, such as a hypervisor connection.
pub trait CapabilityContext {
    /// Whether the source implements `feature` at all.
    fn supports(&self, feature: &str) -> bool;

    /// Raw XML answering the query for `feature`.
    fn query_capabilities(&self, feature: &str, params: &QueryParams)
        -> Result<String, QueryError>;
}

/// Outcome of [`build_from_params`]. Both arms carry a usable value; the
/// unsupported arm holds a fresh model whose reads all return defaults.
#[derive(Debug, Clone)]
pub enum Capability<T> {
    Supported(T),
    Unsupported(T),
}

impl<T> Capability<T> {
    pub fn is_supported(&self) -> bool {
        matches!(self, Capability::Supported(_))
    }

    pub fn get(&self) -> &T {
        match self {
            Capability::Supported(value) | Capability::Unsupported(value) => value,
        }
    }

    pub fn into_inner(self) -> T {
        match self {
            Capability::Supported(value) | Capability::Unsupported(value) => value,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Capability<U> {
        match self {
            Capability::Supported(value) => Capability::Supported(f(value)),
            Capability::Unsupported(value) => Capability::Unsupported(f(value)),
        }
    }
}

/// Query `ctx` for `feature` and parse the answer with `schema`. An
/// unsupported feature or a failed query yields a stub model; a reply that
/// is not a well-formed `schema` document is an error.
pub fn build_from_params<C>(
    ctx: &C,
    schema: &'static Schema,
    feature: &str,
    params: &QueryParams,
) -> Result<Capability<Model>, ModelError>
where
    C: CapabilityContext + ?Sized,
{
    if !ctx.supports(feature) {
        debug!(feature, schema = schema.tag, "capability not supported, using stub");
        return Ok(Capability::Unsupported(Model::new(schema)));
    }
    let xml = match ctx.query_capabilities(feature, params) {
        Ok(xml) => xml,
        Err(err) => {
            warn!(feature, error = %err, "capability query failed, using stub");
            return Ok(Capability::Unsupported(Model::new(schema)));
        }
    };
    let model = Model::parse(schema, &xml)?;
    debug!(feature, schema = schema.tag, "built model from capability query");
    Ok(Capability::Supported(model))
}
