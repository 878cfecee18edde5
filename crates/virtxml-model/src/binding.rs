//! Static schema tables: scalar property bindings, child bindings and the
//! declared serialization order of a model type.

use std::fmt;

use virtxml::{Document, NodeId, Step, XmlError, XmlPath};

use crate::ModelError;

/// Check (and optionally normalise) a proposed raw value before it is
/// written. The error string should name the offending value.
pub type Validator = fn(&str) -> Result<String, String>;

/// How a property's raw text is decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    /// Free text; absent reads as `None`.
    Text,
    /// Decimal (or `0x` hex) integer; absent reads as `None`.
    Integer,
    /// Literal `yes`/`no`; absent reads as `false`.
    YesNo,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::Text => "text",
            ValueKind::Integer => "integer",
            ValueKind::YesNo => "yes/no",
        };
        f.write_str(name)
    }
}

/// Scalar attribute declaration.
#[derive(Debug, Clone, Copy)]
pub struct PropertyBinding {
    pub name: &'static str,
    /// Path relative to the owning node, ending at an attribute or element.
    pub path: &'static str,
    pub kind: ValueKind,
    pub validator: Option<Validator>,
}

impl PropertyBinding {
    pub const fn text(name: &'static str, path: &'static str) -> Self {
        PropertyBinding {
            name,
            path,
            kind: ValueKind::Text,
            validator: None,
        }
    }

    pub const fn integer(name: &'static str, path: &'static str) -> Self {
        PropertyBinding {
            name,
            path,
            kind: ValueKind::Integer,
            validator: None,
        }
    }

    pub const fn yesno(name: &'static str, path: &'static str) -> Self {
        PropertyBinding {
            name,
            path,
            kind: ValueKind::YesNo,
            validator: None,
        }
    }

    pub const fn validated(self, validator: Validator) -> Self {
        PropertyBinding {
            validator: Some(validator),
            ..self
        }
    }

    pub(crate) fn decode_int(&self, raw: &str) -> Result<i64, ModelError> {
        let trimmed = raw.trim();
        let parsed = match trimmed.strip_prefix("0x") {
            Some(hex) => i64::from_str_radix(hex, 16).ok(),
            None => trimmed.parse().ok(),
        };
        parsed.ok_or_else(|| self.decode_error(raw))
    }

    pub(crate) fn decode_yesno(&self, raw: &str) -> Result<bool, ModelError> {
        match raw {
            "yes" => Ok(true),
            "no" => Ok(false),
            _ => Err(self.decode_error(raw)),
        }
    }

    fn decode_error(&self, raw: &str) -> ModelError {
        ModelError::Decode {
            property: self.name.to_string(),
            kind: self.kind,
            value: raw.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    /// Exactly one child; synthesized on first write when missing.
    Single,
    /// Every matching child, in document order.
    Many,
}

impl fmt::Display for Cardinality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cardinality::Single => f.write_str("single"),
            Cardinality::Many => f.write_str("many"),
        }
    }
}

/// Structural attribute declaration mapping to nested models.
#[derive(Debug, Clone, Copy)]
pub struct ChildBinding {
    pub name: &'static str,
    pub schema: &'static Schema,
    pub cardinality: Cardinality,
    /// Container path relative to the owner; children are `<schema.tag>`
    /// elements directly below it.
    pub path: &'static str,
}

impl ChildBinding {
    pub const fn single(name: &'static str, schema: &'static Schema) -> Self {
        ChildBinding {
            name,
            schema,
            cardinality: Cardinality::Single,
            path: ".",
        }
    }

    pub const fn many(name: &'static str, schema: &'static Schema) -> Self {
        ChildBinding {
            name,
            schema,
            cardinality: Cardinality::Many,
            path: ".",
        }
    }

    /// Place the children below an intermediate container such as `./cells`.
    pub const fn under(self, path: &'static str) -> Self {
        ChildBinding { path, ..self }
    }

    /// Path from the owner to a child element (without position).
    pub fn relative_path(&self) -> Result<XmlPath, XmlError> {
        Ok(XmlPath::parse(self.path)?.child(Step::element(self.schema.tag)))
    }
}

/// Per-type table describing one model: root tag, bindings and the order
/// in which bound nodes must appear.
#[derive(Debug)]
pub struct Schema {
    pub tag: &'static str,
    pub properties: &'static [PropertyBinding],
    pub children: &'static [ChildBinding],
    /// Binding names in serialization order. Empty means declaration order,
    /// properties first.
    pub order: &'static [&'static str],
}

impl Schema {
    pub fn property(&self, name: &str) -> Option<&PropertyBinding> {
        self.properties.iter().find(|binding| binding.name == name)
    }

    pub fn child(&self, name: &str) -> Option<&ChildBinding> {
        self.children.iter().find(|binding| binding.name == name)
    }

    fn declared_names(&self) -> Vec<&'static str> {
        if !self.order.is_empty() {
            return self.order.to_vec();
        }
        self.properties
            .iter()
            .map(|binding| binding.name)
            .chain(self.children.iter().map(|binding| binding.name))
            .collect()
    }

    fn target(&self, name: &str) -> Option<XmlPath> {
        if let Some(binding) = self.property(name) {
            return XmlPath::parse(binding.path).ok();
        }
        self.child(name)
            .and_then(|binding| binding.relative_path().ok())
    }

    /// Targets of every binding declared after `name`.
    fn later_targets(&self, name: &str) -> Vec<XmlPath> {
        let names = self.declared_names();
        let Some(rank) = names.iter().position(|declared| *declared == name) else {
            return Vec::new();
        };
        names[rank + 1..]
            .iter()
            .filter_map(|later| self.target(later))
            .collect()
    }

    /// Child index for a new element created at `target.steps()[depth]`
    /// under `parent`: before the first sibling owned by a later binding.
    pub(crate) fn element_slot(
        &self,
        doc: &Document,
        parent: NodeId,
        depth: usize,
        name: &str,
        target: &XmlPath,
    ) -> Option<usize> {
        let prefix = &target.steps()[..depth.min(target.len())];
        self.later_targets(name)
            .iter()
            .filter_map(|later| {
                let (elements, _) = later.split_attribute();
                let steps = elements.steps();
                if steps.len() <= depth || steps[..depth] != *prefix {
                    return None;
                }
                doc.select_children(parent, &steps[depth])
                    .into_iter()
                    .filter_map(|sibling| doc.child_position(parent, sibling))
                    .min()
            })
            .min()
    }

    /// Attribute index for a new attribute on `node`: before the first
    /// attribute owned by a later binding on the same element.
    pub(crate) fn attribute_slot(
        &self,
        doc: &Document,
        node: NodeId,
        name: &str,
        elements: &XmlPath,
    ) -> Option<usize> {
        self.later_targets(name)
            .iter()
            .filter_map(|later| {
                let (later_elements, attribute) = later.split_attribute();
                if later_elements != *elements {
                    return None;
                }
                doc.attribute_position(node, &attribute?)
            })
            .min()
    }
}
