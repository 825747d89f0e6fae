use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

/// Node of an intermediate tree: a name, attributes kept in key order, and
/// ordered children.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize)]
pub struct Element {
    /// Element name, e.g. `select` or `columnref`.
    pub name: String,
    /// Attributes, sorted by key.
    pub attributes: BTreeMap<String, String>,
    /// Child elements in source order.
    pub children: Vec<Element>,
}

impl Element {
    /// Creates an element without attributes or children.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: BTreeMap::new(),
            children: Vec::new(),
        }
    }

    /// Builder form of [`set_attr`](Self::set_attr).
    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attr(key, value);
        self
    }

    /// Builder form of [`push`](Self::push).
    pub fn with_child(mut self, child: Element) -> Self {
        self.push(child);
        self
    }

    /// Sets or replaces an attribute.
    pub fn set_attr(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.attributes.insert(key.into(), value.into());
    }

    /// Removes an attribute, returning its previous value.
    pub fn remove_attr(&mut self, key: &str) -> Option<String> {
        self.attributes.remove(key)
    }

    /// Reads an attribute.
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// True when the attribute is present and equals `"true"`.
    pub fn flag(&self, key: &str) -> bool {
        self.attr(key) == Some("true")
    }

    /// Appends a child.
    pub fn push(&mut self, child: Element) {
        self.children.push(child);
    }

    /// First child with the given name.
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Mutable access to the first child with the given name.
    pub fn child_mut(&mut self, name: &str) -> Option<&mut Element> {
        self.children.iter_mut().find(|c| c.name == name)
    }

    /// Children with the given name, in order.
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Visits this element and all descendants in pre-order.
    pub fn walk<'a>(&'a self, f: &mut impl FnMut(&'a Element)) {
        f(self);
        for child in &self.children {
            child.walk(f);
        }
    }

    /// Mutable pre-order visit.
    pub fn walk_mut(&mut self, f: &mut impl FnMut(&mut Element)) {
        f(self);
        for child in &mut self.children {
            child.walk_mut(f);
        }
    }

    /// Canonical single-line rendering. Two trees render identically exactly
    /// when they are equal.
    pub fn to_min_string(&self) -> String {
        let mut out = String::new();
        self.write_min(&mut out);
        out
    }

    fn write_min(&self, out: &mut String) {
        out.push_str(&self.name);
        if !self.attributes.is_empty() {
            out.push('[');
            for (i, (key, value)) in self.attributes.iter().enumerate() {
                if i > 0 {
                    out.push(';');
                }
                out.push_str(key);
                out.push('=');
                out.push_str(&format!("{value:?}"));
            }
            out.push(']');
        }
        if !self.children.is_empty() {
            out.push('{');
            for (i, child) in self.children.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                child.write_min(out);
            }
            out.push('}');
        }
    }

    fn fmt_indented(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        write!(f, "{:width$}{}", "", self.name, width = depth * 2)?;
        for (key, value) in &self.attributes {
            write!(f, " {key}={value:?}")?;
        }
        writeln!(f)?;
        for child in &self.children {
            child.fmt_indented(f, depth + 1)?;
        }
        Ok(())
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_indented(f, 0)
    }
}
