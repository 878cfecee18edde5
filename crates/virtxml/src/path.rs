//! Restricted path expressions: child element steps, a trailing `@attr`
//! selection, and one predicate per step (`[@attr='value']` or `[N]`).

use std::fmt;
use std::str::FromStr;

use crate::XmlError;

/// Filter applied to an element step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    /// `[@name='value']`, exact and case-sensitive.
    Attribute { name: String, value: String },
    /// `[N]`, 1-based among the siblings matching the step name.
    Position(usize),
}

/// One location step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Element {
        name: String,
        predicate: Option<Predicate>,
    },
    Attribute(String),
}

impl Step {
    pub fn element(name: impl Into<String>) -> Self {
        Step::Element {
            name: name.into(),
            predicate: None,
        }
    }

    pub fn element_at(name: impl Into<String>, position: usize) -> Self {
        Step::Element {
            name: name.into(),
            predicate: Some(Predicate::Position(position)),
        }
    }

    pub fn element_where(
        name: impl Into<String>,
        attribute: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Step::Element {
            name: name.into(),
            predicate: Some(Predicate::Attribute {
                name: attribute.into(),
                value: value.into(),
            }),
        }
    }

    /// Element tag or attribute name addressed by the step.
    pub fn name(&self) -> &str {
        match self {
            Step::Element { name, .. } => name,
            Step::Attribute(name) => name,
        }
    }

    pub fn is_attribute(&self) -> bool {
        matches!(self, Step::Attribute(_))
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Element {
                name,
                predicate: None,
            } => write!(f, "{name}"),
            Step::Element {
                name,
                predicate: Some(Predicate::Attribute { name: attr, value }),
            } => write!(f, "{name}[@{attr}='{value}']"),
            Step::Element {
                name,
                predicate: Some(Predicate::Position(pos)),
            } => write!(f, "{name}[{pos}]"),
            Step::Attribute(name) => write!(f, "@{name}"),
        }
    }
}

/// Parsed path expression, either absolute (`/a/b`) or relative to a
/// context element (`./a/@b`, `.`).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct XmlPath {
    absolute: bool,
    steps: Vec<Step>,
}

impl XmlPath {
    /// Parse an expression, rejecting anything outside the supported subset.
    pub fn parse(expr: &str) -> Result<Self, XmlError> {
        let trimmed = expr.trim();
        if trimmed.is_empty() {
            return Err(XmlError::Path("empty path expression".into()));
        }
        let (absolute, body) = match trimmed.strip_prefix('/') {
            Some(rest) => (true, rest),
            None => (false, trimmed),
        };
        let mut steps = Vec::new();
        for segment in split_segments(body)? {
            if segment == "." {
                if absolute {
                    return Err(XmlError::Path(format!("'.' inside absolute path: {expr}")));
                }
                continue;
            }
            if let Some(Step::Attribute(_)) = steps.last() {
                return Err(XmlError::Path(format!(
                    "attribute step must be last: {expr}"
                )));
            }
            steps.push(parse_step(segment, expr)?);
        }
        if absolute && steps.is_empty() {
            return Err(XmlError::Path("absolute path without steps".into()));
        }
        if absolute && steps.first().is_some_and(Step::is_attribute) {
            return Err(XmlError::Path(format!("path cannot start at an attribute: {expr}")));
        }
        Ok(XmlPath { absolute, steps })
    }

    /// Absolute path to a root element.
    pub fn root(tag: impl Into<String>) -> Self {
        XmlPath {
            absolute: true,
            steps: vec![Step::element(tag)],
        }
    }

    /// Relative path addressing the context node itself.
    pub fn current() -> Self {
        XmlPath::default()
    }

    pub fn is_absolute(&self) -> bool {
        self.absolute
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn last(&self) -> Option<&Step> {
        self.steps.last()
    }

    /// Append one step.
    pub fn child(&self, step: Step) -> Self {
        let mut steps = self.steps.clone();
        steps.push(step);
        XmlPath {
            absolute: self.absolute,
            steps,
        }
    }

    /// Resolve `other` relative to `self`.
    pub fn join(&self, other: &XmlPath) -> Result<Self, XmlError> {
        if other.absolute {
            return Err(XmlError::Path(format!(
                "cannot join absolute path {other} onto {self}"
            )));
        }
        if self.steps.last().is_some_and(Step::is_attribute) {
            return Err(XmlError::Path(format!("cannot descend below attribute in {self}")));
        }
        let mut steps = self.steps.clone();
        steps.extend(other.steps.iter().cloned());
        Ok(XmlPath {
            absolute: self.absolute,
            steps,
        })
    }

    /// Same path with its last element step pinned to the given position.
    pub fn with_position(&self, position: usize) -> Result<Self, XmlError> {
        let mut steps = self.steps.clone();
        match steps.last_mut() {
            Some(Step::Element { predicate, .. }) if predicate.is_none() => {
                *predicate = Some(Predicate::Position(position));
            }
            _ => {
                return Err(XmlError::Path(format!(
                    "cannot index {self}: last step must be a plain element"
                )))
            }
        }
        Ok(XmlPath {
            absolute: self.absolute,
            steps,
        })
    }

    /// Split a trailing attribute step off the element part of the path.
    pub fn split_attribute(&self) -> (XmlPath, Option<String>) {
        match self.steps.split_last() {
            Some((Step::Attribute(name), rest)) => (
                XmlPath {
                    absolute: self.absolute,
                    steps: rest.to_vec(),
                },
                Some(name.clone()),
            ),
            _ => (self.clone(), None),
        }
    }

    /// Leading `n` steps as a path of the same kind.
    pub fn prefix(&self, n: usize) -> Self {
        XmlPath {
            absolute: self.absolute,
            steps: self.steps[..n.min(self.steps.len())].to_vec(),
        }
    }
}

impl fmt::Display for XmlPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.absolute {
            for step in &self.steps {
                write!(f, "/{step}")?;
            }
            return Ok(());
        }
        if self.steps.is_empty() {
            return write!(f, ".");
        }
        write!(f, ".")?;
        for step in &self.steps {
            write!(f, "/{step}")?;
        }
        Ok(())
    }
}

impl FromStr for XmlPath {
    type Err = XmlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        XmlPath::parse(s)
    }
}

fn split_segments(body: &str) -> Result<Vec<&str>, XmlError> {
    let mut segments = Vec::new();
    let mut start = 0;
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    for (idx, ch) in body.char_indices() {
        match (quote, ch) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(ch),
            (None, '[') => depth += 1,
            (None, ']') => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| XmlError::Path(format!("unbalanced ']' in {body}")))?;
            }
            (None, '/') if depth == 0 => {
                segments.push(&body[start..idx]);
                start = idx + 1;
            }
            _ => {}
        }
    }
    if quote.is_some() || depth != 0 {
        return Err(XmlError::Path(format!("unterminated predicate in {body}")));
    }
    segments.push(&body[start..]);
    if segments.iter().any(|segment| segment.is_empty()) {
        return Err(XmlError::Path(format!("empty step in {body}")));
    }
    Ok(segments)
}

fn parse_step(segment: &str, expr: &str) -> Result<Step, XmlError> {
    if let Some(name) = segment.strip_prefix('@') {
        check_name(name, expr)?;
        return Ok(Step::Attribute(name.to_string()));
    }
    let Some(open) = segment.find('[') else {
        check_name(segment, expr)?;
        return Ok(Step::element(segment));
    };
    let name = &segment[..open];
    check_name(name, expr)?;
    let inner = segment[open + 1..]
        .strip_suffix(']')
        .ok_or_else(|| XmlError::Path(format!("malformed predicate in {expr}")))?
        .trim();
    if let Some(rest) = inner.strip_prefix('@') {
        let (attr, value) = rest
            .split_once('=')
            .ok_or_else(|| XmlError::Path(format!("predicate must compare with '=': {expr}")))?;
        let attr = attr.trim();
        check_name(attr, expr)?;
        let value = unquote(value.trim())
            .ok_or_else(|| XmlError::Path(format!("predicate value must be quoted: {expr}")))?;
        return Ok(Step::element_where(name, attr, value));
    }
    let position: usize = inner
        .parse()
        .map_err(|_| XmlError::Path(format!("unsupported predicate [{inner}] in {expr}")))?;
    if position == 0 {
        return Err(XmlError::Path(format!("positions are 1-based: {expr}")));
    }
    Ok(Step::element_at(name, position))
}

fn unquote(value: &str) -> Option<&str> {
    let first = value.chars().next()?;
    if (first == '\'' || first == '"') && value.len() >= 2 && value.ends_with(first) {
        let inner = &value[1..value.len() - 1];
        (!inner.contains(first)).then_some(inner)
    } else {
        None
    }
}

fn check_name(name: &str, expr: &str) -> Result<(), XmlError> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | ':'))
        && !name.starts_with(|c: char| c.is_ascii_digit() || c == '-' || c == '.');
    if valid {
        Ok(())
    } else {
        Err(XmlError::Path(format!("unsupported step '{name}' in {expr}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_relative_forms() {
        let path = XmlPath::parse("./bios/entry[@name='date']").expect("parse");
        assert!(!path.is_absolute());
        assert_eq!(
            path.steps(),
            &[
                Step::element("bios"),
                Step::element_where("entry", "name", "date"),
            ]
        );
        assert_eq!(path.to_string(), "./bios/entry[@name='date']");

        let attr = XmlPath::parse("./topology/@sockets").expect("parse");
        let (elements, name) = attr.split_attribute();
        assert_eq!(elements.steps(), &[Step::element("topology")]);
        assert_eq!(name.as_deref(), Some("sockets"));

        let current = XmlPath::parse(".").expect("parse");
        assert!(current.is_empty());
        assert_eq!(current.to_string(), ".");
    }

    #[test]
    fn parse_absolute_with_positions() {
        let path: XmlPath = "/capabilities/host/topology/cells/cell[1]"
            .parse()
            .expect("parse");
        assert!(path.is_absolute());
        assert_eq!(path.len(), 5);
        assert_eq!(path.last(), Some(&Step::element_at("cell", 1)));
        assert_eq!(path.to_string(), "/capabilities/host/topology/cells/cell[1]");
    }

    #[test]
    fn predicate_values_may_contain_slashes() {
        let path = XmlPath::parse("./value[@path=\"/tmp/a\"]").expect("parse");
        assert_eq!(path.steps(), &[Step::element_where("value", "path", "/tmp/a")]);
    }

    #[test]
    fn rejects_unsupported_syntax() {
        for expr in [
            "",
            "//cpu",
            "../cpu",
            "./cpu[@a='x' and @b='y']",
            "./cpu[0]",
            "./@a/b",
            "./cpu[@name=x]",
            "/",
            "./a[",
        ] {
            let err = XmlPath::parse(expr).unwrap_err();
            assert!(matches!(err, XmlError::Path(_)), "{expr} should fail");
        }
    }

    #[test]
    fn join_and_position() {
        let base = XmlPath::root("domainCapabilities");
        let rel = XmlPath::parse("./os/loader").expect("parse");
        let joined = base.join(&rel).expect("join");
        assert_eq!(joined.to_string(), "/domainCapabilities/os/loader");
        let indexed = joined.with_position(2).expect("position");
        assert_eq!(indexed.to_string(), "/domainCapabilities/os/loader[2]");
        assert!(indexed.with_position(3).is_err());
        assert!(joined.join(&base).is_err());
    }
}
