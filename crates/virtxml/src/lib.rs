//! Mutable XML tree backing libvirt capability documents.
//!
//! Nodes live in an arena owned by [`Document`] and are addressed by
//! [`NodeId`]. Detached nodes stay in the arena but are unreachable from the
//! root, so every id handed out remains valid for the life of the document.
//! Parsing and rendering go through quick-xml; rendering keeps element and
//! attribute order exactly as stored.

mod path;

pub use path::{Predicate, Step, XmlPath};

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use thiserror::Error;
use tracing::{debug, trace};

const INDENT: usize = 2;
/// Length of the `xml` target that opens a declaration.
const DECL_NAME_LEN: usize = 3;

#[derive(Debug, Error)]
pub enum XmlError {
    /// Input is not well-formed or does not have the expected root.
    #[error("xml: {0}")]
    Parse(String),
    /// Malformed or ambiguous path expression, or a path that cannot be created.
    #[error("path error: {0}")]
    Path(String),
    #[error("render: {0}")]
    Render(String),
}

/// Handle to a node stored in a [`Document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

#[derive(Debug, Clone)]
enum NodeKind {
    Element(Element),
    Text(String),
    Comment(String),
    Declaration(String),
}

#[derive(Debug, Clone)]
struct Element {
    tag: String,
    attributes: Vec<(String, String)>,
    children: Vec<NodeId>,
}

#[derive(Debug, Clone)]
struct NodeData {
    kind: NodeKind,
    parent: Option<NodeId>,
}

/// In-memory XML tree.
#[derive(Debug, Clone, Default)]
pub struct Document {
    nodes: Vec<NodeData>,
    root: Option<NodeId>,
    prolog: Vec<NodeId>,
    epilogue: Vec<NodeId>,
}

impl Document {
    /// Empty document without a root element.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse well-formed XML text.
    ///
    /// Text content is kept verbatim, including surrounding whitespace.
    /// Whitespace-only text next to child elements or comments is layout and
    /// is dropped, so it is regenerated by [`render`](Self::render). The XML
    /// declaration and comments before or after the root element are kept;
    /// processing instructions and `DOCTYPE` are dropped.
    pub fn parse(xml: &str) -> Result<Self, XmlError> {
        let mut reader = Reader::from_str(xml);
        let mut doc = Document::new();
        let mut stack: Vec<NodeId> = Vec::new();

        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) => {
                    let id = doc.open_element(&e, stack.last().copied())?;
                    stack.push(id);
                }
                Ok(Event::Empty(e)) => {
                    doc.open_element(&e, stack.last().copied())?;
                }
                Ok(Event::End(e)) => match stack.pop() {
                    Some(closed) => doc.drop_layout_text(closed),
                    None => {
                        return Err(XmlError::Parse(format!(
                            "unexpected closing tag </{}>",
                            String::from_utf8_lossy(e.name().as_ref())
                        )))
                    }
                },
                Ok(Event::Text(e)) => {
                    let text = e
                        .unescape()
                        .map_err(|err| XmlError::Parse(err.to_string()))?;
                    doc.push_text(stack.last().copied(), &text)?;
                }
                Ok(Event::CData(e)) => {
                    let text = String::from_utf8(e.into_inner().into_owned())
                        .map_err(|err| XmlError::Parse(format!("invalid UTF-8: {err}")))?;
                    doc.push_text(stack.last().copied(), &text)?;
                }
                Ok(Event::Comment(e)) => {
                    let comment = NodeKind::Comment(String::from_utf8_lossy(&e).into_owned());
                    match stack.last() {
                        Some(&parent) => {
                            doc.push_node(parent, comment);
                        }
                        None => doc.push_outside_root(comment),
                    }
                }
                Ok(Event::Decl(e)) => {
                    let content = String::from_utf8_lossy(&e).into_owned();
                    doc.push_outside_root(NodeKind::Declaration(content));
                }
                Ok(Event::Eof) => break,
                Ok(_) => trace!("dropping processing instruction or doctype"),
                Err(err) => {
                    return Err(XmlError::Parse(format!(
                        "at byte {}: {err}",
                        reader.buffer_position()
                    )))
                }
            }
        }

        if let Some(&open) = stack.last() {
            return Err(XmlError::Parse(format!(
                "unclosed element <{}>",
                doc.tag(open).unwrap_or_default()
            )));
        }
        if doc.root.is_none() {
            return Err(XmlError::Parse("document has no root element".into()));
        }
        debug!(nodes = doc.nodes.len(), "parsed xml document");
        Ok(doc)
    }

    fn open_element(
        &mut self,
        event: &BytesStart<'_>,
        parent: Option<NodeId>,
    ) -> Result<NodeId, XmlError> {
        let tag = String::from_utf8_lossy(event.name().as_ref()).into_owned();
        let mut attributes = Vec::new();
        for attr in event.attributes() {
            let attr = attr.map_err(|err| XmlError::Parse(err.to_string()))?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr
                .unescape_value()
                .map_err(|err| XmlError::Parse(err.to_string()))?
                .into_owned();
            attributes.push((key, value));
        }
        let kind = NodeKind::Element(Element {
            tag,
            attributes,
            children: Vec::new(),
        });
        match parent {
            Some(parent) => Ok(self.push_node(parent, kind)),
            None if self.root.is_some() => {
                Err(XmlError::Parse("multiple root elements".into()))
            }
            None => {
                let id = self.alloc(kind, None);
                self.root = Some(id);
                Ok(id)
            }
        }
    }

    fn push_text(&mut self, parent: Option<NodeId>, text: &str) -> Result<(), XmlError> {
        match parent {
            _ if text.is_empty() => Ok(()),
            Some(parent) => {
                self.push_node(parent, NodeKind::Text(text.to_string()));
                Ok(())
            }
            None if is_blank(text) => Ok(()),
            None => Err(XmlError::Parse(format!(
                "text outside root element: {text:?}"
            ))),
        }
    }

    /// Declaration or comment before the root element, or comment after it.
    fn push_outside_root(&mut self, kind: NodeKind) {
        let id = self.alloc(kind, None);
        if self.root.is_some() {
            self.epilogue.push(id);
        } else {
            self.prolog.push(id);
        }
    }

    /// Drop whitespace-only text of an element that also holds elements or
    /// comments; that text is indentation.
    fn drop_layout_text(&mut self, id: NodeId) {
        let Some(element) = self.element(id) else {
            return;
        };
        let structured = element
            .children
            .iter()
            .any(|child| !matches!(self.nodes[child.0].kind, NodeKind::Text(_)));
        if !structured {
            return;
        }
        let kept: Vec<NodeId> = element
            .children
            .iter()
            .copied()
            .filter(|child| {
                !matches!(&self.nodes[child.0].kind, NodeKind::Text(text) if is_blank(text))
            })
            .collect();
        if let Some(element) = self.element_mut(id) {
            element.children = kept;
        }
    }

    fn alloc(&mut self, kind: NodeKind, parent: Option<NodeId>) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(NodeData { kind, parent });
        id
    }

    fn push_node(&mut self, parent: NodeId, kind: NodeKind) -> NodeId {
        let id = self.alloc(kind, Some(parent));
        if let Some(element) = self.element_mut(parent) {
            element.children.push(id);
        }
        id
    }

    fn element(&self, id: NodeId) -> Option<&Element> {
        match self.nodes.get(id.0).map(|node| &node.kind) {
            Some(NodeKind::Element(element)) => Some(element),
            _ => None,
        }
    }

    fn element_mut(&mut self, id: NodeId) -> Option<&mut Element> {
        match self.nodes.get_mut(id.0).map(|node| &mut node.kind) {
            Some(NodeKind::Element(element)) => Some(element),
            _ => None,
        }
    }

    /// Root element, if one exists.
    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    /// Create the root element, or return it when it already has `tag`.
    pub fn create_root(&mut self, tag: &str) -> Result<NodeId, XmlError> {
        match self.root {
            Some(root) if self.tag(root) == Some(tag) => Ok(root),
            Some(root) => Err(XmlError::Path(format!(
                "document root is <{}>, not <{tag}>",
                self.tag(root).unwrap_or_default()
            ))),
            None => {
                let id = self.alloc(
                    NodeKind::Element(Element {
                        tag: tag.to_string(),
                        attributes: Vec::new(),
                        children: Vec::new(),
                    }),
                    None,
                );
                self.root = Some(id);
                debug!(tag, "created root element");
                Ok(id)
            }
        }
    }

    pub fn tag(&self, id: NodeId) -> Option<&str> {
        self.element(id).map(|element| element.tag.as_str())
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(id.0).and_then(|node| node.parent)
    }

    /// Element children of `id` in document order.
    pub fn child_elements(&self, id: NodeId) -> Vec<NodeId> {
        self.element(id)
            .map(|element| {
                element
                    .children
                    .iter()
                    .copied()
                    .filter(|child| self.element(*child).is_some())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Index of `child` within all children (elements, text, comments) of `parent`.
    pub fn child_position(&self, parent: NodeId, child: NodeId) -> Option<usize> {
        self.element(parent)?
            .children
            .iter()
            .position(|id| *id == child)
    }

    pub fn attribute(&self, id: NodeId, name: &str) -> Option<&str> {
        self.element(id)?
            .attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn attributes(&self, id: NodeId) -> &[(String, String)] {
        self.element(id)
            .map(|element| element.attributes.as_slice())
            .unwrap_or_default()
    }

    pub fn attribute_position(&self, id: NodeId, name: &str) -> Option<usize> {
        self.element(id)?
            .attributes
            .iter()
            .position(|(key, _)| key == name)
    }

    /// Set an attribute, keeping its slot when it already exists.
    pub fn set_attribute(&mut self, id: NodeId, name: &str, value: &str) {
        self.insert_attribute(id, None, name, value);
    }

    /// Set an attribute; a new attribute goes at `index` (appended when `None`).
    pub fn insert_attribute(&mut self, id: NodeId, index: Option<usize>, name: &str, value: &str) {
        let Some(element) = self.element_mut(id) else {
            return;
        };
        if let Some((_, slot)) = element.attributes.iter_mut().find(|(key, _)| key == name) {
            *slot = value.to_string();
            return;
        }
        let index = index
            .unwrap_or(element.attributes.len())
            .min(element.attributes.len());
        element
            .attributes
            .insert(index, (name.to_string(), value.to_string()));
    }

    pub fn remove_attribute(&mut self, id: NodeId, name: &str) -> bool {
        let Some(element) = self.element_mut(id) else {
            return false;
        };
        let before = element.attributes.len();
        element.attributes.retain(|(key, _)| key != name);
        element.attributes.len() < before
    }

    /// Concatenated direct text content; `None` when the element has none.
    pub fn text(&self, id: NodeId) -> Option<String> {
        let element = self.element(id)?;
        let mut out: Option<String> = None;
        for child in &element.children {
            if let Some(NodeKind::Text(text)) = self.nodes.get(child.0).map(|node| &node.kind) {
                out.get_or_insert_with(String::new).push_str(text);
            }
        }
        out
    }

    /// Replace the direct text content of an element.
    ///
    /// An empty value clears the text, since `<a></a>` and `<a/>` read back
    /// the same.
    pub fn set_text(&mut self, id: NodeId, value: &str) {
        if value.is_empty() {
            self.clear_text(id);
            return;
        }
        let Some(element) = self.element(id) else {
            return;
        };
        let children = element.children.clone();
        let slot = children
            .iter()
            .position(|child| matches!(self.nodes[child.0].kind, NodeKind::Text(_)))
            .unwrap_or(0);
        let kept: Vec<NodeId> = children
            .into_iter()
            .filter(|child| !matches!(self.nodes[child.0].kind, NodeKind::Text(_)))
            .collect();
        let text = self.alloc(NodeKind::Text(value.to_string()), Some(id));
        if let Some(element) = self.element_mut(id) {
            element.children = kept;
            let slot = slot.min(element.children.len());
            element.children.insert(slot, text);
        }
    }

    /// Drop the direct text content of an element, keeping child elements.
    pub fn clear_text(&mut self, id: NodeId) {
        let kept: Vec<NodeId> = match self.element(id) {
            Some(element) => element
                .children
                .iter()
                .copied()
                .filter(|child| !matches!(self.nodes[child.0].kind, NodeKind::Text(_)))
                .collect(),
            None => return,
        };
        if let Some(element) = self.element_mut(id) {
            element.children = kept;
        }
    }

    /// Insert a new element under `parent` at `index` among all children
    /// (appended when `None`).
    pub fn insert_element(&mut self, parent: NodeId, index: Option<usize>, tag: &str) -> NodeId {
        let id = self.alloc(
            NodeKind::Element(Element {
                tag: tag.to_string(),
                attributes: Vec::new(),
                children: Vec::new(),
            }),
            Some(parent),
        );
        if let Some(element) = self.element_mut(parent) {
            let index = index
                .unwrap_or(element.children.len())
                .min(element.children.len());
            element.children.insert(index, id);
        }
        id
    }

    pub fn append_element(&mut self, parent: NodeId, tag: &str) -> NodeId {
        self.insert_element(parent, None, tag)
    }

    /// Unlink a node from the tree. Detaching the root empties the document.
    pub fn detach(&mut self, id: NodeId) {
        if self.root == Some(id) {
            self.root = None;
            return;
        }
        let Some(parent) = self.parent(id) else {
            return;
        };
        if let Some(element) = self.element_mut(parent) {
            element.children.retain(|child| *child != id);
        }
        if let Some(node) = self.nodes.get_mut(id.0) {
            node.parent = None;
        }
    }

    fn matches(&self, id: NodeId, step: &Step) -> bool {
        let Step::Element { name, predicate } = step else {
            return false;
        };
        if self.tag(id) != Some(name.as_str()) {
            return false;
        }
        match predicate {
            Some(Predicate::Attribute { name, value }) => {
                self.attribute(id, name) == Some(value.as_str())
            }
            Some(Predicate::Position(_)) | None => true,
        }
    }

    /// Children of `parent` selected by one element step.
    pub fn select_children(&self, parent: NodeId, step: &Step) -> Vec<NodeId> {
        let candidates = self
            .child_elements(parent)
            .into_iter()
            .filter(|child| self.matches(*child, step));
        match step {
            Step::Element {
                predicate: Some(Predicate::Position(pos)),
                ..
            } => candidates
                .enumerate()
                .filter(|(idx, _)| idx + 1 == *pos)
                .map(|(_, id)| id)
                .collect(),
            _ => candidates.collect(),
        }
    }

    fn start(&self, ctx: Option<NodeId>, path: &XmlPath) -> Result<Vec<NodeId>, XmlError> {
        if let Some(step) = path.steps().iter().find(|step| step.is_attribute()) {
            return Err(XmlError::Path(format!(
                "{path} selects attribute {step}, not an element"
            )));
        }
        if path.is_absolute() {
            let first = &path.steps()[0];
            let root = self.root.filter(|root| match first {
                Step::Element {
                    predicate: Some(Predicate::Position(pos)),
                    ..
                } => *pos == 1 && self.matches(*root, first),
                _ => self.matches(*root, first),
            });
            return Ok(root.into_iter().collect());
        }
        let ctx = ctx.ok_or_else(|| {
            XmlError::Path(format!("relative path {path} needs a context node"))
        })?;
        Ok(vec![ctx])
    }

    fn walk(&self, ctx: Option<NodeId>, path: &XmlPath) -> Result<Vec<NodeId>, XmlError> {
        let mut current = self.start(ctx, path)?;
        let skip = usize::from(path.is_absolute());
        for step in &path.steps()[skip..] {
            current = current
                .into_iter()
                .flat_map(|node| self.select_children(node, step))
                .collect();
            if current.is_empty() {
                break;
            }
        }
        Ok(current)
    }

    /// All elements matched by an absolute path, in document order.
    pub fn resolve_many(&self, path: &XmlPath) -> Result<Vec<NodeId>, XmlError> {
        self.walk(None, path)
    }

    /// All elements matched by `path` evaluated from `ctx`.
    pub fn resolve_many_from(&self, ctx: NodeId, path: &XmlPath) -> Result<Vec<NodeId>, XmlError> {
        self.walk(Some(ctx), path)
    }

    /// The unique element matched by an absolute path, if any.
    pub fn resolve_one(&self, path: &XmlPath) -> Result<Option<NodeId>, XmlError> {
        unique(path, self.walk(None, path)?)
    }

    pub fn resolve_one_from(
        &self,
        ctx: NodeId,
        path: &XmlPath,
    ) -> Result<Option<NodeId>, XmlError> {
        unique(path, self.walk(Some(ctx), path)?)
    }

    /// Resolve an absolute path, creating every missing element along it.
    pub fn ensure_path(&mut self, path: &XmlPath) -> Result<NodeId, XmlError> {
        self.ensure_path_with(None, path, |_, _, _| None)
    }

    /// Resolve `path` (absolute, or relative to `ctx`), creating missing
    /// elements. `place(doc, parent, depth)` picks the child index for an
    /// element created at `path.steps()[depth]`; `None` appends.
    pub fn ensure_path_with<F>(
        &mut self,
        ctx: Option<NodeId>,
        path: &XmlPath,
        mut place: F,
    ) -> Result<NodeId, XmlError>
    where
        F: FnMut(&Document, NodeId, usize) -> Option<usize>,
    {
        let mut current = match self.start(ctx, path)?.first() {
            Some(node) => *node,
            None => {
                // Only an absolute path can come back empty here.
                let first = &path.steps()[0];
                if self.root.is_some() {
                    return Err(XmlError::Path(format!(
                        "document root does not match {first}"
                    )));
                }
                let root = self.create_root(first.name())?;
                self.apply_predicate(root, first);
                root
            }
        };
        let skip = usize::from(path.is_absolute());
        for (depth, step) in path.steps().iter().enumerate().skip(skip) {
            let found = self.select_children(current, step);
            current = match found.as_slice() {
                [only] => *only,
                [] => {
                    if let Step::Element {
                        name,
                        predicate: Some(Predicate::Position(pos)),
                    } = step
                    {
                        let existing = self.select_children(current, &Step::element(name.clone()));
                        if *pos != existing.len() + 1 {
                            return Err(XmlError::Path(format!(
                                "cannot create {step}: only {} present",
                                existing.len()
                            )));
                        }
                    }
                    let index = place(self, current, depth);
                    let created = self.insert_element(current, index, step.name());
                    self.apply_predicate(created, step);
                    trace!(step = %step, "created element");
                    created
                }
                _ => {
                    return Err(XmlError::Path(format!(
                        "{step} in {path} matches {} elements",
                        found.len()
                    )))
                }
            };
        }
        Ok(current)
    }

    fn apply_predicate(&mut self, id: NodeId, step: &Step) {
        if let Step::Element {
            predicate: Some(Predicate::Attribute { name, value }),
            ..
        } = step
        {
            self.set_attribute(id, name, value);
        }
    }

    /// Serialize the whole document; empty string when there is no root.
    ///
    /// The XML declaration and comments around the root are written in the
    /// order they were parsed.
    pub fn render(&self) -> Result<String, XmlError> {
        let Some(root) = self.root else {
            return Ok(String::new());
        };
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', INDENT);
        for id in self.prolog.iter().chain([root].iter()).chain(&self.epilogue) {
            self.write_node(&mut writer, *id)?;
        }
        into_string(writer)
    }

    /// Serialize the subtree rooted at `id`.
    pub fn render_node(&self, id: NodeId) -> Result<String, XmlError> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', INDENT);
        self.write_node(&mut writer, id)?;
        into_string(writer)
    }

    fn write_node(&self, writer: &mut Writer<Vec<u8>>, id: NodeId) -> Result<(), XmlError> {
        let event = match self.nodes.get(id.0).map(|node| &node.kind) {
            Some(NodeKind::Element(element)) => {
                let mut start = BytesStart::new(element.tag.as_str());
                for (key, value) in &element.attributes {
                    start.push_attribute((key.as_str(), value.as_str()));
                }
                if element.children.is_empty() {
                    return write_event(writer, Event::Empty(start));
                }
                write_event(writer, Event::Start(start))?;
                for child in &element.children {
                    self.write_node(writer, *child)?;
                }
                Event::End(BytesEnd::new(element.tag.as_str()))
            }
            Some(NodeKind::Text(text)) => Event::Text(BytesText::new(text)),
            Some(NodeKind::Comment(comment)) => {
                Event::Comment(BytesText::from_escaped(comment.as_str()))
            }
            Some(NodeKind::Declaration(content)) => Event::Decl(BytesDecl::from_start(
                BytesStart::from_content(content.as_str(), DECL_NAME_LEN),
            )),
            None => return Err(XmlError::Render(format!("dangling node {}", id.0))),
        };
        write_event(writer, event)
    }
}

fn into_string(writer: Writer<Vec<u8>>) -> Result<String, XmlError> {
    String::from_utf8(writer.into_inner())
        .map_err(|err| XmlError::Render(format!("invalid UTF-8: {err}")))
}

fn is_blank(text: &str) -> bool {
    text.chars().all(char::is_whitespace)
}

fn write_event(writer: &mut Writer<Vec<u8>>, event: Event<'_>) -> Result<(), XmlError> {
    writer
        .write_event(event)
        .map_err(|err| XmlError::Render(err.to_string()))
}

fn unique(path: &XmlPath, found: Vec<NodeId>) -> Result<Option<NodeId>, XmlError> {
    match found.as_slice() {
        [] => Ok(None),
        [only] => Ok(Some(*only)),
        many => Err(XmlError::Path(format!(
            "{path} matches {} elements where one was expected",
            many.len()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = r#"
        <domainCapabilities>
          <!-- firmware -->
          <os supported="yes">
            <loader supported="yes">
              <value>/foo/bar</value>
              <value>/tmp/my_path</value>
              <enum name="type">
                <value>rom</value>
                <value>pflash</value>
              </enum>
            </loader>
          </os>
          <arch>x86_64</arch>
        </domainCapabilities>
    "#;

    fn path(expr: &str) -> XmlPath {
        XmlPath::parse(expr).expect("parse path")
    }

    #[test]
    fn resolve_one_and_many() {
        let doc = Document::parse(FIXTURE).expect("parse fixture");
        let arch = doc
            .resolve_one(&path("/domainCapabilities/arch"))
            .expect("resolve")
            .expect("arch present");
        assert_eq!(doc.text(arch).as_deref(), Some("x86_64"));

        let values = doc
            .resolve_many(&path("/domainCapabilities/os/loader/value"))
            .expect("resolve values");
        let texts: Vec<_> = values.iter().filter_map(|id| doc.text(*id)).collect();
        assert_eq!(texts, ["/foo/bar", "/tmp/my_path"]);

        let second = doc
            .resolve_one(&path("/domainCapabilities/os/loader/value[2]"))
            .expect("resolve")
            .expect("second value");
        assert_eq!(doc.text(second).as_deref(), Some("/tmp/my_path"));

        let missing = doc
            .resolve_one(&path("/domainCapabilities/devices/disk"))
            .expect("absent is not an error");
        assert!(missing.is_none());
        assert!(doc
            .resolve_many(&path("/capabilities/host"))
            .expect("wrong root")
            .is_empty());
    }

    #[test]
    fn resolve_one_rejects_ambiguous_match() {
        let doc = Document::parse(FIXTURE).expect("parse fixture");
        let err = doc
            .resolve_one(&path("/domainCapabilities/os/loader/value"))
            .unwrap_err();
        assert!(matches!(err, XmlError::Path(_)));
    }

    #[test]
    fn predicate_lookup_is_exact() {
        let doc = Document::parse(FIXTURE).expect("parse fixture");
        let loader = doc
            .resolve_one(&path("/domainCapabilities/os/loader"))
            .expect("resolve")
            .expect("loader");
        let found = doc
            .resolve_one_from(loader, &path("./enum[@name='type']"))
            .expect("resolve");
        assert!(found.is_some());
        let upper = doc
            .resolve_one_from(loader, &path("./enum[@name='TYPE']"))
            .expect("resolve");
        assert!(upper.is_none());
    }

    #[test]
    fn ensure_path_creates_and_is_idempotent() {
        let mut doc = Document::new();
        let target = path("/sysinfo/bios/entry[@name='vendor']");
        let entry = doc.ensure_path(&target).expect("create");
        doc.set_text(entry, "LENOVO");
        let again = doc.ensure_path(&target).expect("reuse");
        assert_eq!(entry, again);
        assert_eq!(
            doc.render().expect("render"),
            "<sysinfo>\n  <bios>\n    <entry name=\"vendor\">LENOVO</entry>\n  </bios>\n</sysinfo>"
        );
    }

    #[test]
    fn ensure_path_refuses_foreign_root() {
        let mut doc = Document::parse("<capabilities/>").expect("parse");
        let err = doc.ensure_path(&path("/sysinfo/bios")).unwrap_err();
        assert!(matches!(err, XmlError::Path(_)));
    }

    #[test]
    fn ensure_path_with_places_new_elements() {
        let mut doc = Document::parse("<a><c/></a>").expect("parse");
        let root = doc.root().expect("root");
        doc.ensure_path_with(Some(root), &path("./b"), |_, _, _| Some(0))
            .expect("create b");
        assert_eq!(doc.render().expect("render"), "<a>\n  <b/>\n  <c/>\n</a>");
    }

    #[test]
    fn render_preserves_order_and_is_idempotent() {
        let xml = r#"<cpu b="2" a="1"><z/><y>t &amp; u</y><!-- note --></cpu>"#;
        let doc = Document::parse(xml).expect("parse");
        let first = doc.render().expect("render");
        assert_eq!(
            first,
            "<cpu b=\"2\" a=\"1\">\n  <z/>\n  <y>t &amp; u</y>\n  <!-- note -->\n</cpu>"
        );
        assert_eq!(first, doc.render().expect("render again"));
        let reparsed = Document::parse(&first).expect("reparse");
        assert_eq!(reparsed.render().expect("render"), first);
    }

    #[test]
    fn attributes_and_text_edit_in_place() {
        let mut doc = Document::parse(r#"<value a="1">x</value>"#).expect("parse");
        let root = doc.root().expect("root");
        doc.set_attribute(root, "a", "2");
        doc.insert_attribute(root, Some(0), "z", "0");
        doc.set_text(root, "y");
        assert_eq!(doc.attributes(root)[0], ("z".to_string(), "0".to_string()));
        assert_eq!(doc.attribute(root, "a"), Some("2"));
        assert_eq!(doc.text(root).as_deref(), Some("y"));
        assert!(doc.remove_attribute(root, "z"));
        assert!(!doc.remove_attribute(root, "z"));
        assert_eq!(doc.render().expect("render"), r#"<value a="2">y</value>"#);
    }

    #[test]
    fn detach_removes_subtree() {
        let mut doc = Document::parse(FIXTURE).expect("parse fixture");
        let os = doc
            .resolve_one(&path("/domainCapabilities/os"))
            .expect("resolve")
            .expect("os");
        doc.detach(os);
        assert!(doc
            .resolve_many(&path("/domainCapabilities/os/loader/value"))
            .expect("resolve")
            .is_empty());
        assert!(!doc.render().expect("render").contains("loader"));
    }

    #[test]
    fn text_is_kept_verbatim() {
        let mut doc = Document::parse("<root><name>  padded  </name><blank>   </blank></root>")
            .expect("parse");
        let name = doc
            .resolve_one(&path("/root/name"))
            .expect("resolve")
            .expect("name");
        let blank = doc
            .resolve_one(&path("/root/blank"))
            .expect("resolve")
            .expect("blank");
        assert_eq!(doc.text(name).as_deref(), Some("  padded  "));
        assert_eq!(doc.text(blank).as_deref(), Some("   "));

        doc.set_text(name, " x ");
        let rendered = doc.render().expect("render");
        assert_eq!(
            rendered,
            "<root>\n  <name> x </name>\n  <blank>   </blank>\n</root>"
        );
        let reparsed = Document::parse(&rendered).expect("reparse");
        assert_eq!(reparsed.render().expect("render"), rendered);
        let root = reparsed.root().expect("root");
        let texts: Vec<_> = reparsed
            .child_elements(root)
            .into_iter()
            .filter_map(|id| reparsed.text(id))
            .collect();
        assert_eq!(texts, [" x ", "   "]);
        assert_eq!(reparsed.text(root), None);
    }

    #[test]
    fn empty_text_reads_back_as_absent() {
        let mut doc = Document::parse("<a><b>x</b></a>").expect("parse");
        let b = doc.resolve_one(&path("/a/b")).expect("resolve").expect("b");
        doc.set_text(b, "");
        assert_eq!(doc.text(b), None);
        let rendered = doc.render().expect("render");
        assert_eq!(rendered, "<a>\n  <b/>\n</a>");
        let reparsed = Document::parse(&rendered).expect("reparse");
        let b = reparsed
            .resolve_one(&path("/a/b"))
            .expect("resolve")
            .expect("b");
        assert_eq!(reparsed.text(b), None);
    }

    #[test]
    fn declaration_and_outer_comments_survive() {
        let xml = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
                   <!-- generated -->\n\
                   <caps><host/></caps>\n\
                   <!-- end -->\n";
        let doc = Document::parse(xml).expect("parse");
        let rendered = doc.render().expect("render");
        assert_eq!(
            rendered,
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<!-- generated -->\n\
             <caps>\n  <host/>\n</caps>\n<!-- end -->"
        );
        let root = doc.root().expect("root");
        assert_eq!(doc.render_node(root).expect("subtree"), "<caps>\n  <host/>\n</caps>");
        let reparsed = Document::parse(&rendered).expect("reparse");
        assert_eq!(reparsed.render().expect("render"), rendered);
    }

    #[test]
    fn parse_rejects_malformed_input() {
        for xml in [
            "",
            "   ",
            "<a>",
            "<a></b>",
            "<a/><b/>",
            "text<a/>",
            "<a x='1' x='2'/>",
            "</a>",
        ] {
            let err = Document::parse(xml).unwrap_err();
            assert!(matches!(err, XmlError::Parse(_)), "{xml:?} should fail");
        }
    }
}
