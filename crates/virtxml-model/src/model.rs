use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use tracing::debug;
use virtxml::{Document, NodeId, Step, XmlError, XmlPath};

use crate::binding::{Cardinality, ChildBinding, PropertyBinding, Schema, ValueKind};
use crate::ModelError;

/// View of one node of a shared document, typed by a [`Schema`].
///
/// The top-level model owns the document; nested models share it and only
/// carry the absolute path of their node. A model whose node does not exist
/// yet reads defaults and creates the node (and any missing ancestors) on its
/// first write.
#[derive(Clone)]
pub struct Model {
    doc: Rc<RefCell<Document>>,
    schema: &'static Schema,
    path: XmlPath,
    anchor: Option<Rc<Anchor>>,
}

/// Owner and binding a nested model was reached through.
struct Anchor {
    owner: Model,
    binding: &'static ChildBinding,
}

/// Typed wrapper over a [`Model`].
pub trait ModelView: Sized {
    fn from_model(model: Model) -> Self;
    fn model(&self) -> &Model;

    fn to_xml(&self) -> Result<String, ModelError> {
        self.model().to_xml()
    }
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("schema", &self.schema.tag)
            .field("path", &format_args!("{}", self.path))
            .finish()
    }
}

impl Model {
    /// Fresh model over an empty document; nothing exists until a write.
    pub fn new(schema: &'static Schema) -> Self {
        Model {
            doc: Rc::new(RefCell::new(Document::new())),
            schema,
            path: XmlPath::root(schema.tag),
            anchor: None,
        }
    }

    /// Parse `xml` and bind to its root, which must carry the schema's tag.
    pub fn parse(schema: &'static Schema, xml: &str) -> Result<Self, ModelError> {
        let doc = Document::parse(xml)?;
        let found = doc
            .root()
            .and_then(|root| doc.tag(root))
            .map(str::to_owned)
            .unwrap_or_default();
        if found != schema.tag {
            return Err(XmlError::Parse(format!(
                "expected <{}> root element, found <{found}>",
                schema.tag
            ))
            .into());
        }
        debug!(schema = schema.tag, "bound model to parsed document");
        Ok(Model {
            doc: Rc::new(RefCell::new(doc)),
            schema,
            path: XmlPath::root(schema.tag),
            anchor: None,
        })
    }

    pub fn schema(&self) -> &'static Schema {
        self.schema
    }

    /// Absolute path of the node this model is bound to.
    pub fn path(&self) -> &XmlPath {
        &self.path
    }

    /// Whether the model's node currently exists in the document.
    pub fn is_attached(&self) -> Result<bool, ModelError> {
        Ok(self.doc.borrow().resolve_one(&self.path)?.is_some())
    }

    /// Whether both models view the same document.
    pub fn same_document(&self, other: &Model) -> bool {
        Rc::ptr_eq(&self.doc, &other.doc)
    }

    pub fn get_text(&self, name: &str) -> Result<Option<String>, ModelError> {
        let binding = self.property(name)?;
        self.read_raw(binding)
    }

    pub fn get_int(&self, name: &str) -> Result<Option<i64>, ModelError> {
        let binding = self.property_of_kind(name, ValueKind::Integer)?;
        self.read_raw(binding)?
            .map(|raw| binding.decode_int(&raw))
            .transpose()
    }

    pub fn get_bool(&self, name: &str) -> Result<bool, ModelError> {
        let binding = self.property_of_kind(name, ValueKind::YesNo)?;
        match self.read_raw(binding)? {
            Some(raw) => binding.decode_yesno(&raw),
            None => Ok(false),
        }
    }

    pub fn set_text(&self, name: &str, value: &str) -> Result<(), ModelError> {
        let binding = self.property_of_kind(name, ValueKind::Text)?;
        self.write_raw(binding, value.to_string())
    }

    pub fn set_int(&self, name: &str, value: i64) -> Result<(), ModelError> {
        let binding = self.property_of_kind(name, ValueKind::Integer)?;
        self.write_raw(binding, value.to_string())
    }

    pub fn set_bool(&self, name: &str, value: bool) -> Result<(), ModelError> {
        let binding = self.property_of_kind(name, ValueKind::YesNo)?;
        let token = if value { "yes" } else { "no" };
        self.write_raw(binding, token.to_string())
    }

    /// Remove a property's attribute or element. Absent targets are a no-op.
    pub fn clear(&self, name: &str) -> Result<(), ModelError> {
        let binding = self.property(name)?;
        let (elements, attribute) = XmlPath::parse(binding.path)?.split_attribute();
        let mut doc = self.doc.borrow_mut();
        let Some(node) = doc.resolve_one(&self.path)? else {
            return Ok(());
        };
        let Some(target) = doc.resolve_one_from(node, &elements)? else {
            return Ok(());
        };
        match attribute {
            Some(attribute) => {
                doc.remove_attribute(target, &attribute);
            }
            None if elements.is_empty() => doc.clear_text(target),
            None => doc.detach(target),
        }
        debug!(property = binding.name, path = %self.path, "cleared property");
        Ok(())
    }

    /// Model for a `single` child binding. The child may be unattached.
    pub fn child(&self, name: &str) -> Result<Model, ModelError> {
        let binding = self.child_binding(name, Cardinality::Single)?;
        let path = self.path.join(&binding.relative_path()?)?;
        Ok(self.wrap(binding, path))
    }

    /// Live models for a `many` child binding, in document order.
    pub fn children(&self, name: &str) -> Result<Vec<Model>, ModelError> {
        let binding = self.child_binding(name, Cardinality::Many)?;
        let base = self.path.join(&binding.relative_path()?)?;
        let count = self.doc.borrow().resolve_many(&base)?.len();
        (1..=count)
            .map(|position| -> Result<Model, ModelError> {
                Ok(self.wrap(binding, base.with_position(position)?))
            })
            .collect()
    }

    pub fn child_view<T: ModelView>(&self, name: &str) -> Result<T, ModelError> {
        self.child(name).map(T::from_model)
    }

    pub fn children_view<T: ModelView>(&self, name: &str) -> Result<Vec<T>, ModelError> {
        Ok(self
            .children(name)?
            .into_iter()
            .map(T::from_model)
            .collect())
    }

    /// Append a new element for a `many` binding and return its model.
    pub fn add_child(&self, name: &str) -> Result<Model, ModelError> {
        let binding = self.child_binding(name, Cardinality::Many)?;
        let relative = binding.relative_path()?;
        let base = self.path.join(&relative)?;
        let container_path = relative.prefix(relative.len() - 1);
        let item = Step::element(binding.schema.tag);

        let mut doc = self.doc.borrow_mut();
        let owner = self.materialize(&mut doc)?;
        let container = self.ensure_ordered(&mut doc, owner, binding.name, &container_path)?;
        let existing = doc.select_children(container, &item);
        let slot = match existing.last() {
            Some(last) => doc.child_position(container, *last).map(|pos| pos + 1),
            None => self.schema.element_slot(
                &doc,
                container,
                relative.len() - 1,
                binding.name,
                &relative,
            ),
        };
        doc.insert_element(container, slot, binding.schema.tag);
        drop(doc);

        let position = existing.len() + 1;
        debug!(binding = binding.name, position, path = %self.path, "added child");
        Ok(self.wrap(binding, base.with_position(position)?))
    }

    /// Detach the `index`-th (0-based) child of a `many` binding.
    pub fn remove_child(&self, name: &str, index: usize) -> Result<(), ModelError> {
        let children = self.children(name)?;
        let child = children
            .get(index)
            .ok_or_else(|| ModelError::NotFound(format!("{name}[{index}]")))?;
        let mut doc = self.doc.borrow_mut();
        if let Some(node) = doc.resolve_one(&child.path)? {
            doc.detach(node);
        }
        debug!(binding = name, index, path = %self.path, "removed child");
        Ok(())
    }

    /// First child of a `many` binding whose `key` property equals `value`.
    pub fn find_child(&self, name: &str, key: &str, value: &str) -> Result<Model, ModelError> {
        for child in self.children(name)? {
            if child.get_text(key)?.as_deref() == Some(value) {
                return Ok(child);
            }
        }
        Err(ModelError::NotFound(format!("{name} with {key}={value:?}")))
    }

    /// Tags of the element children found at a relative path.
    pub fn child_tags(&self, path: &str) -> Result<Vec<String>, ModelError> {
        let path = XmlPath::parse(path)?;
        let doc = self.doc.borrow();
        let Some(node) = doc.resolve_one(&self.path)? else {
            return Ok(Vec::new());
        };
        let Some(target) = doc.resolve_one_from(node, &path)? else {
            return Ok(Vec::new());
        };
        Ok(doc
            .child_elements(target)
            .into_iter()
            .filter_map(|id| doc.tag(id).map(str::to_owned))
            .collect())
    }

    /// Render this model's node; empty when it has not been materialized.
    pub fn to_xml(&self) -> Result<String, ModelError> {
        let doc = self.doc.borrow();
        match doc.resolve_one(&self.path)? {
            Some(node) if doc.root() == Some(node) => Ok(doc.render()?),
            Some(node) => Ok(doc.render_node(node)?),
            None => Ok(String::new()),
        }
    }

    fn property(&self, name: &str) -> Result<&'static PropertyBinding, ModelError> {
        self.schema
            .property(name)
            .ok_or_else(|| ModelError::UnknownBinding(format!("{}.{name}", self.schema.tag)))
    }

    fn property_of_kind(
        &self,
        name: &str,
        expected: ValueKind,
    ) -> Result<&'static PropertyBinding, ModelError> {
        let binding = self.property(name)?;
        if binding.kind != expected {
            return Err(ModelError::KindMismatch {
                property: format!("{}.{name}", self.schema.tag),
                expected,
            });
        }
        Ok(binding)
    }

    fn child_binding(
        &self,
        name: &str,
        expected: Cardinality,
    ) -> Result<&'static ChildBinding, ModelError> {
        let binding = self
            .schema
            .child(name)
            .ok_or_else(|| ModelError::UnknownBinding(format!("{}.{name}", self.schema.tag)))?;
        if binding.cardinality != expected {
            return Err(ModelError::Cardinality {
                binding: format!("{}.{name}", self.schema.tag),
                expected,
            });
        }
        Ok(binding)
    }

    fn wrap(&self, binding: &'static ChildBinding, path: XmlPath) -> Model {
        Model {
            doc: Rc::clone(&self.doc),
            schema: binding.schema,
            path,
            anchor: Some(Rc::new(Anchor {
                owner: self.clone(),
                binding,
            })),
        }
    }

    fn read_raw(&self, binding: &PropertyBinding) -> Result<Option<String>, ModelError> {
        let (elements, attribute) = XmlPath::parse(binding.path)?.split_attribute();
        let doc = self.doc.borrow();
        let Some(node) = doc.resolve_one(&self.path)? else {
            return Ok(None);
        };
        let Some(target) = doc.resolve_one_from(node, &elements)? else {
            return Ok(None);
        };
        Ok(match attribute {
            Some(attribute) => doc.attribute(target, &attribute).map(str::to_owned),
            None => doc.text(target),
        })
    }

    fn write_raw(
        &self,
        binding: &'static PropertyBinding,
        value: String,
    ) -> Result<(), ModelError> {
        let value = match binding.validator {
            Some(validate) => validate(&value).map_err(|message| ModelError::Validation {
                property: binding.name.to_string(),
                value: value.clone(),
                message,
            })?,
            None => value,
        };
        let (elements, attribute) = XmlPath::parse(binding.path)?.split_attribute();

        let mut doc = self.doc.borrow_mut();
        let node = self.materialize(&mut doc)?;
        let leaf = self.ensure_ordered(&mut doc, node, binding.name, &elements)?;
        match attribute {
            Some(attribute) => {
                let slot = self
                    .schema
                    .attribute_slot(&doc, leaf, binding.name, &elements);
                doc.insert_attribute(leaf, slot, &attribute, &value);
            }
            None => doc.set_text(leaf, &value),
        }
        debug!(property = binding.name, path = %self.path, value = %value, "wrote property");
        Ok(())
    }

    /// Resolve this model's node, creating it (and its owners) when missing.
    fn materialize(&self, doc: &mut Document) -> Result<NodeId, ModelError> {
        if let Some(node) = doc.resolve_one(&self.path)? {
            return Ok(node);
        }
        let Some(anchor) = &self.anchor else {
            let root = doc.create_root(self.schema.tag)?;
            debug!(tag = self.schema.tag, "materialized model root");
            return Ok(root);
        };
        if anchor.binding.cardinality == Cardinality::Many {
            return Err(ModelError::NotFound(format!(
                "{} is no longer in the document",
                self.path
            )));
        }
        let owner = anchor.owner.materialize(doc)?;
        let relative = anchor.binding.relative_path()?;
        let node = anchor
            .owner
            .ensure_ordered(doc, owner, anchor.binding.name, &relative)?;
        debug!(path = %self.path, "materialized child model");
        Ok(node)
    }

    /// Create `relative` below `node`, placing new elements by this model's
    /// declared order for binding `name`.
    fn ensure_ordered(
        &self,
        doc: &mut Document,
        node: NodeId,
        name: &str,
        relative: &XmlPath,
    ) -> Result<NodeId, ModelError> {
        let schema = self.schema;
        Ok(doc.ensure_path_with(Some(node), relative, |doc, parent, depth| {
            schema.element_slot(doc, parent, depth, name, relative)
        })?)
    }
}
