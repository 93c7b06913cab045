// Working tree for pasted markup: a scraper fragment mutated in place
// through its ego_tree arena.
//
// Nodes are addressed by `NodeId`. Removing a node only detaches it, so ids
// collected by an earlier query stay valid while a later pass mutates the
// tree. Queries use `scraper::Selector` and serialization goes through the
// html5ever serializer behind `ElementRef::inner_html`.

pub mod ops;

use anyhow::{anyhow, Result};
use ego_tree::NodeRef;
use html5ever::tendril::StrTendril;
use html5ever::{Attribute, LocalName, Namespace, QualName};
use scraper::node::{Element, Text};
use scraper::{ElementRef, Html, Node, Selector};

pub use ego_tree::NodeId;

const HTML_NAMESPACE: &str = "http://www.w3.org/1999/xhtml";

/// Parse a CSS selector, reporting the offending input on failure.
pub fn parse_selector(selector: &str) -> Result<Selector> {
    Selector::parse(selector).map_err(|e| anyhow!("Invalid selector {selector:?}: {e}"))
}

fn element_name(name: &str) -> QualName {
    QualName::new(
        None,
        Namespace::from(HTML_NAMESPACE),
        LocalName::from(name.to_ascii_lowercase()),
    )
}

fn build_element(name: QualName, attrs: Vec<(String, String)>) -> Element {
    let attributes = attrs
        .into_iter()
        .map(|(key, value)| Attribute {
            name: QualName::new(None, Namespace::from(""), LocalName::from(key)),
            value: StrTendril::from(value),
        })
        .collect();
    Element::new(name, attributes)
}

/// A mutable document tree.
#[derive(Debug, Clone)]
pub struct Tree {
    html: Html,
    root: NodeId,
}

impl Tree {
    /// Create an empty tree.
    pub fn new() -> Self {
        Self::parse("")
    }

    /// Parse an HTML fragment into a new tree.
    pub fn parse(markup: &str) -> Self {
        let html = Html::parse_fragment(markup);
        let root = html.root_element().id();
        Self { html, root }
    }

    /// The fragment's root element. It is never serialized itself.
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Parse `markup` as a fragment and append the resulting nodes to `parent`.
    ///
    /// Returns the ids of the newly appended top-level nodes.
    pub fn append_html(&mut self, parent: NodeId, markup: &str) -> Vec<NodeId> {
        let fragment = Html::parse_fragment(markup);
        let mut appended = Vec::new();
        for child in fragment.root_element().children() {
            if let Some(id) = self.import_node(child) {
                self.append(parent, id);
                appended.push(id);
            }
        }
        appended
    }

    fn import_node(&mut self, node: NodeRef<'_, Node>) -> Option<NodeId> {
        if !matches!(node.value(), Node::Text(_) | Node::Element(_)) {
            return None;
        }
        let id = self.html.tree.orphan(node.value().clone()).id();
        for child in node.children() {
            if let Some(child_id) = self.import_node(child) {
                self.append(id, child_id);
            }
        }
        Some(id)
    }

    fn get(&self, id: NodeId) -> Option<NodeRef<'_, Node>> {
        self.html.tree.get(id)
    }

    fn element_ref(&self, id: NodeId) -> Option<ElementRef<'_>> {
        self.get(id).and_then(ElementRef::wrap)
    }

    // Construction

    /// Create a detached element with no attributes.
    pub fn create_element(&mut self, name: &str) -> NodeId {
        self.create_element_with(name, Vec::new())
    }

    /// Create a detached element with the given attributes, in order.
    pub fn create_element_with(&mut self, name: &str, attrs: Vec<(String, String)>) -> NodeId {
        let element = build_element(element_name(name), attrs);
        self.html.tree.orphan(Node::Element(element)).id()
    }

    /// Create a detached text node.
    pub fn create_text(&mut self, text: &str) -> NodeId {
        let text = Text {
            text: StrTendril::from(text),
        };
        self.html.tree.orphan(Node::Text(text)).id()
    }

    // Structure

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.get(id)?.parent().map(|p| p.id())
    }

    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        self.get(id)
            .map(|node| node.children().map(|c| c.id()).collect())
            .unwrap_or_default()
    }

    pub fn first_child(&self, id: NodeId) -> Option<NodeId> {
        self.get(id)?.first_child().map(|c| c.id())
    }

    /// Element children only, in document order.
    pub fn element_children(&self, id: NodeId) -> Vec<NodeId> {
        self.get(id)
            .map(|node| {
                node.children()
                    .filter(|c| c.value().is_element())
                    .map(|c| c.id())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// All descendants of `id` in document order (excluding `id`).
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        self.get(id)
            .map(|node| node.descendants().skip(1).map(|d| d.id()).collect())
            .unwrap_or_default()
    }

    /// Ancestors of `id`, nearest first, up to and including the root.
    pub fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let Some(node) = self.get(id) else {
            return out;
        };
        for ancestor in node.ancestors() {
            out.push(ancestor.id());
            if ancestor.id() == self.root {
                break;
            }
        }
        out
    }

    /// True when the node is still reachable from the root.
    pub fn is_attached(&self, id: NodeId) -> bool {
        id == self.root || self.ancestors(id).last() == Some(&self.root)
    }

    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        self.get(id)?.next_sibling().map(|s| s.id())
    }

    pub fn prev_sibling(&self, id: NodeId) -> Option<NodeId> {
        self.get(id)?.prev_sibling().map(|s| s.id())
    }

    pub fn next_element_sibling(&self, id: NodeId) -> Option<NodeId> {
        self.get(id)?
            .next_siblings()
            .find(|s| s.value().is_element())
            .map(|s| s.id())
    }

    /// Append `child` as the last child of `parent`, detaching it first.
    pub fn append(&mut self, parent: NodeId, child: NodeId) {
        if parent == child {
            return;
        }
        if let Some(mut node) = self.html.tree.get_mut(parent) {
            node.append_id(child);
        }
    }

    /// Insert `node` immediately before `reference`.
    ///
    /// `node` is detached even when `reference` has no parent.
    pub fn insert_before(&mut self, reference: NodeId, node: NodeId) {
        if node == reference || self.prev_sibling(reference) == Some(node) {
            return;
        }
        self.detach(node);
        if self.parent(reference).is_none() {
            return;
        }
        if let Some(mut target) = self.html.tree.get_mut(reference) {
            target.insert_id_before(node);
        }
    }

    /// Insert `node` immediately after `reference`.
    pub fn insert_after(&mut self, reference: NodeId, node: NodeId) {
        match self.next_sibling(reference) {
            Some(next) => self.insert_before(next, node),
            None => {
                if let Some(parent) = self.parent(reference) {
                    self.append(parent, node);
                }
            }
        }
    }

    /// Remove a node from its parent. The subtree stays intact in the arena.
    pub fn detach(&mut self, id: NodeId) {
        if let Some(mut node) = self.html.tree.get_mut(id) {
            node.detach();
        }
    }

    /// Put `replacement` where `old` was and detach `old`.
    pub fn replace(&mut self, old: NodeId, replacement: NodeId) {
        self.insert_before(old, replacement);
        self.detach(old);
    }

    /// Move every child of `id` into its parent at its position, then detach `id`.
    pub fn unwrap(&mut self, id: NodeId) {
        if self.parent(id).is_none() {
            return;
        }
        for child in self.children(id) {
            self.insert_before(id, child);
        }
        self.detach(id);
    }

    /// Remove every child of `id`.
    pub fn clear_children(&mut self, id: NodeId) {
        for child in self.children(id) {
            self.detach(child);
        }
    }

    /// Replace the children of `id` with a single text node.
    pub fn set_text(&mut self, id: NodeId, text: &str) {
        self.clear_children(id);
        if !text.is_empty() {
            let text_node = self.create_text(text);
            self.append(id, text_node);
        }
    }

    /// Replace the content of a text node. No-op for other nodes.
    pub fn replace_text(&mut self, id: NodeId, text: &str) {
        if let Some(mut node) = self.html.tree.get_mut(id) {
            if let Node::Text(existing) = node.value() {
                existing.text = StrTendril::from(text);
            }
        }
    }

    /// Deep-copy the subtree rooted at `id`. The copy is detached.
    pub fn clone_subtree(&mut self, id: NodeId) -> NodeId {
        let value = match self.get(id) {
            Some(node) => node.value().clone(),
            None => return id,
        };
        let copy = self.html.tree.orphan(value).id();
        for child in self.children(id) {
            let child_copy = self.clone_subtree(child);
            self.append(copy, child_copy);
        }
        copy
    }

    /// Merge adjacent text nodes and drop empty ones below `id`.
    pub fn merge_adjacent_text(&mut self, id: NodeId) {
        let mut previous_text: Option<(NodeId, String)> = None;
        for child in self.children(id) {
            match self.text(child).map(str::to_string) {
                Some(text) => match previous_text.as_mut() {
                    Some((prev, merged)) => {
                        merged.push_str(&text);
                        let (prev, merged) = (*prev, merged.clone());
                        self.replace_text(prev, &merged);
                        self.detach(child);
                    }
                    None if text.is_empty() => self.detach(child),
                    None => previous_text = Some((child, text)),
                },
                None => {
                    previous_text = None;
                    self.merge_adjacent_text(child);
                }
            }
        }
    }

    // Node data

    pub fn is_element(&self, id: NodeId) -> bool {
        self.get(id).is_some_and(|n| n.value().is_element())
    }

    pub fn is_text(&self, id: NodeId) -> bool {
        self.get(id).is_some_and(|n| n.value().is_text())
    }

    /// Lowercase tag name of an element.
    pub fn tag(&self, id: NodeId) -> Option<&str> {
        self.get(id)?.value().as_element().map(Element::name)
    }

    pub fn is_tag(&self, id: NodeId, name: &str) -> bool {
        self.tag(id) == Some(name)
    }

    /// True for h1..h6.
    pub fn is_heading(&self, id: NodeId) -> bool {
        matches!(self.tag(id), Some("h1" | "h2" | "h3" | "h4" | "h5" | "h6"))
    }

    pub fn text(&self, id: NodeId) -> Option<&str> {
        self.get(id)?.value().as_text().map(|t| &**t)
    }

    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        self.get(id)?.value().as_element()?.attr(name)
    }

    pub fn has_attr(&self, id: NodeId, name: &str) -> bool {
        self.attr(id, name).is_some()
    }

    /// Attributes of an element in document order.
    pub fn attrs(&self, id: NodeId) -> Vec<(&str, &str)> {
        self.get(id)
            .and_then(|n| n.value().as_element())
            .map(|e| e.attrs().collect())
            .unwrap_or_default()
    }

    /// Rebuild an element's attribute list. scraper caches the id and class
    /// list per element, so attributes are never edited in place.
    fn rewrite_attrs(&mut self, id: NodeId, edit: impl FnOnce(&mut Vec<(String, String)>)) {
        let Some(mut node) = self.html.tree.get_mut(id) else {
            return;
        };
        let Node::Element(element) = node.value() else {
            return;
        };
        let mut attrs: Vec<(String, String)> = element
            .attrs()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        edit(&mut attrs);
        *element = build_element(element.name.clone(), attrs);
    }

    pub fn set_attr(&mut self, id: NodeId, name: &str, value: &str) {
        if self.attr(id, name) == Some(value) {
            return;
        }
        self.rewrite_attrs(id, |attrs| match attrs.iter_mut().find(|(k, _)| k == name) {
            Some(slot) => slot.1 = value.to_string(),
            None => attrs.push((name.to_string(), value.to_string())),
        });
    }

    pub fn remove_attr(&mut self, id: NodeId, name: &str) {
        if self.has_attr(id, name) {
            self.rewrite_attrs(id, |attrs| attrs.retain(|(k, _)| k != name));
        }
    }

    /// Keep only the attributes for which `keep` returns true.
    pub fn retain_attrs(&mut self, id: NodeId, mut keep: impl FnMut(&str, &str) -> bool) {
        let drops = self.attrs(id).into_iter().any(|(k, v)| !keep(k, v));
        if drops {
            self.rewrite_attrs(id, |attrs| attrs.retain(|(k, v)| keep(k, v)));
        }
    }

    pub fn has_class(&self, id: NodeId, class: &str) -> bool {
        self.attr(id, "class")
            .is_some_and(|c| c.split_whitespace().any(|c| c == class))
    }

    pub fn add_class(&mut self, id: NodeId, class: &str) {
        if self.has_class(id, class) {
            return;
        }
        let value = match self.attr(id, "class") {
            Some(existing) if !existing.trim().is_empty() => format!("{} {}", existing.trim(), class),
            _ => class.to_string(),
        };
        self.set_attr(id, "class", &value);
    }

    /// Concatenated text of all descendant text nodes.
    pub fn text_content(&self, id: NodeId) -> String {
        let Some(node) = self.get(id) else {
            return String::new();
        };
        node.descendants()
            .filter_map(|d| d.value().as_text().map(|t| &**t))
            .collect()
    }

    // Queries

    /// All descendants of `scope` matching `selector`, in document order.
    pub fn select(&self, scope: NodeId, selector: &str) -> Result<Vec<NodeId>> {
        Ok(self.select_with(scope, &parse_selector(selector)?))
    }

    /// First descendant of `scope` matching `selector`.
    pub fn select_first(&self, scope: NodeId, selector: &str) -> Result<Option<NodeId>> {
        let selector = parse_selector(selector)?;
        Ok(self
            .element_ref(scope)
            .and_then(|el| el.select(&selector).next())
            .map(|found| found.id()))
    }

    pub fn select_with(&self, scope: NodeId, selector: &Selector) -> Vec<NodeId> {
        self.element_ref(scope)
            .map(|el| el.select(selector).map(|found| found.id()).collect())
            .unwrap_or_default()
    }

    /// True when the element matches `selector`.
    pub fn matches(&self, id: NodeId, selector: &str) -> Result<bool> {
        let selector = parse_selector(selector)?;
        Ok(self.element_ref(id).is_some_and(|el| selector.matches(&el)))
    }

    /// Nearest inclusive ancestor matching `selector`.
    pub fn closest(&self, id: NodeId, selector: &str) -> Result<Option<NodeId>> {
        let selector = parse_selector(selector)?;
        Ok(std::iter::once(id)
            .chain(self.ancestors(id))
            .filter(|&a| a != self.root)
            .find(|&a| self.element_ref(a).is_some_and(|el| selector.matches(&el))))
    }

    /// Nearest ancestor (excluding `id`) for which `pred` holds.
    pub fn find_ancestor(&self, id: NodeId, pred: impl Fn(&Self, NodeId) -> bool) -> Option<NodeId> {
        self.ancestors(id).into_iter().find(|&a| pred(self, a))
    }

    /// Text node descendants of `scope` in document order.
    pub fn text_nodes(&self, scope: NodeId) -> Vec<NodeId> {
        self.get(scope)
            .map(|node| {
                node.descendants()
                    .skip(1)
                    .filter(|d| d.value().is_text())
                    .map(|d| d.id())
                    .collect()
            })
            .unwrap_or_default()
    }

    // Serialization

    /// Serialize the whole document (children of the root).
    pub fn to_html(&self) -> String {
        self.inner_html(self.root)
    }

    pub fn inner_html(&self, id: NodeId) -> String {
        self.element_ref(id)
            .map(|el| el.inner_html())
            .unwrap_or_default()
    }

    pub fn outer_html(&self, id: NodeId) -> String {
        match self.element_ref(id) {
            Some(el) => el.html(),
            None => self.text(id).map(escape_text).unwrap_or_default(),
        }
    }
}

impl Default for Tree {
    fn default() -> Self {
        Self::new()
    }
}

/// Escape text for inclusion in markup, as the serializer writes text nodes.
pub fn escape_text(text: &str) -> String {
    let mut tree = Tree::new();
    let node = tree.create_text(text);
    tree.append(tree.root(), node);
    tree.to_html()
}
