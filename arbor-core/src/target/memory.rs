//! In-memory render target.
//!
//! `MemoryDocument` is a small DOM-like tree: elements with attributes, a
//! class name, a form value and listeners, plus text nodes. It exists so the
//! engine can run headless and so tests can assert on node identity.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use indexmap::IndexMap;
use tracing::warn;

use super::{Event, EventHandler, RenderTarget, TargetNode};
use crate::error::{Error, Result};

#[derive(Debug)]
enum NodeData {
    Element {
        tag: String,
        attributes: IndexMap<String, String>,
        class_name: String,
        value: String,
        listeners: Vec<(String, EventHandler)>,
    },
    Text(String),
}

#[derive(Debug)]
struct MemoryNode {
    data: NodeData,
    parent: Option<TargetNode>,
    children: Vec<TargetNode>,
}

#[derive(Debug, Default)]
struct DocumentState {
    next_id: u64,
    nodes: HashMap<TargetNode, MemoryNode>,
}

impl DocumentState {
    fn create(&mut self, data: NodeData) -> TargetNode {
        let id = TargetNode::from_raw(self.next_id);
        self.next_id += 1;
        self.nodes.insert(
            id,
            MemoryNode {
                data,
                parent: None,
                children: Vec::new(),
            },
        );
        id
    }

    fn node(&self, id: TargetNode) -> Result<&MemoryNode> {
        self.nodes
            .get(&id)
            .ok_or_else(|| Error::internal(format!("unknown target node {id}")))
    }

    fn node_mut(&mut self, id: TargetNode) -> Result<&mut MemoryNode> {
        self.nodes
            .get_mut(&id)
            .ok_or_else(|| Error::internal(format!("unknown target node {id}")))
    }

    fn detach(&mut self, child: TargetNode) -> Result<()> {
        if let Some(parent) = self.node_mut(child)?.parent.take() {
            self.node_mut(parent)?.children.retain(|c| *c != child);
        }
        Ok(())
    }

    /// Remove `id` and its descendants from the document.
    fn drop_subtree(&mut self, id: TargetNode) {
        if let Some(node) = self.nodes.remove(&id) {
            for child in node.children {
                self.drop_subtree(child);
            }
        }
    }

    fn text_content(&self, id: TargetNode, out: &mut String) {
        let Some(node) = self.nodes.get(&id) else { return };
        match &node.data {
            NodeData::Text(text) => out.push_str(text),
            NodeData::Element { .. } => {
                for child in &node.children {
                    self.text_content(*child, out);
                }
            }
        }
    }

    fn html(&self, id: TargetNode, out: &mut String) {
        let Some(node) = self.nodes.get(&id) else { return };
        match &node.data {
            NodeData::Text(text) => out.push_str(&escape(text)),
            NodeData::Element {
                tag,
                attributes,
                class_name,
                ..
            } => {
                out.push('<');
                out.push_str(tag);
                if !class_name.is_empty() {
                    out.push_str(&format!(" class=\"{}\"", escape(class_name)));
                }
                for (name, value) in attributes {
                    out.push_str(&format!(" {name}=\"{}\"", escape(value)));
                }
                out.push('>');
                for child in &node.children {
                    self.html(*child, out);
                }
                out.push_str(&format!("</{tag}>"));
            }
        }
    }

    fn collect(
        &self,
        id: TargetNode,
        matches: &dyn Fn(&NodeData) -> bool,
        out: &mut Vec<TargetNode>,
    ) {
        let Some(node) = self.nodes.get(&id) else { return };
        if matches(&node.data) {
            out.push(id);
        }
        for child in &node.children {
            self.collect(*child, matches, out);
        }
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// A cloneable handle to an in-memory document.
#[derive(Clone, Default)]
pub struct MemoryDocument {
    state: Rc<RefCell<DocumentState>>,
}

impl MemoryDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a detached element to render into.
    pub fn create_root(&self, tag: &str) -> TargetNode {
        self.create_element(tag)
    }

    pub fn contains(&self, node: TargetNode) -> bool {
        self.state.borrow().nodes.contains_key(&node)
    }

    /// Number of live nodes, attached or not.
    pub fn node_count(&self) -> usize {
        self.state.borrow().nodes.len()
    }

    pub fn parent(&self, node: TargetNode) -> Option<TargetNode> {
        self.state.borrow().nodes.get(&node).and_then(|n| n.parent)
    }

    pub fn children(&self, node: TargetNode) -> Vec<TargetNode> {
        self.state
            .borrow()
            .nodes
            .get(&node)
            .map(|n| n.children.clone())
            .unwrap_or_default()
    }

    /// Concatenated text of the node and its descendants.
    pub fn text_content(&self, node: TargetNode) -> String {
        let mut out = String::new();
        self.state.borrow().text_content(node, &mut out);
        out
    }

    pub fn attribute(&self, node: TargetNode, name: &str) -> Option<String> {
        match &self.state.borrow().nodes.get(&node)?.data {
            NodeData::Element { attributes, .. } => attributes.get(name).cloned(),
            NodeData::Text(_) => None,
        }
    }

    pub fn class_name(&self, node: TargetNode) -> Option<String> {
        match &self.state.borrow().nodes.get(&node)?.data {
            NodeData::Element { class_name, .. } => Some(class_name.clone()),
            NodeData::Text(_) => None,
        }
    }

    pub fn listener_count(&self, node: TargetNode, event: &str) -> usize {
        match self.state.borrow().nodes.get(&node).map(|n| &n.data) {
            Some(NodeData::Element { listeners, .. }) => {
                listeners.iter().filter(|(name, _)| name == event).count()
            }
            _ => 0,
        }
    }

    /// Current form value of an element.
    pub fn value(&self, node: TargetNode) -> String {
        match self.state.borrow().nodes.get(&node).map(|n| &n.data) {
            Some(NodeData::Element { value, .. }) => value.clone(),
            _ => String::new(),
        }
    }

    /// Set an element's form value without dispatching anything.
    pub fn set_value(&self, node: TargetNode, value: &str) {
        let mut state = self.state.borrow_mut();
        match state.nodes.get_mut(&node).map(|n| &mut n.data) {
            Some(NodeData::Element { value: current, .. }) => *current = value.to_string(),
            _ => warn!(%node, "set_value on a node that is not an element"),
        }
    }

    /// Serialize a subtree as HTML, class first, then attributes in
    /// insertion order.
    pub fn to_html(&self, node: TargetNode) -> String {
        let mut out = String::new();
        self.state.borrow().html(node, &mut out);
        out
    }

    /// Descendants (including `root`) whose tag matches.
    pub fn find_by_tag(&self, root: TargetNode, tag: &str) -> Vec<TargetNode> {
        let mut out = Vec::new();
        self.state.borrow().collect(
            root,
            &|data| matches!(data, NodeData::Element { tag: t, .. } if t == tag),
            &mut out,
        );
        out
    }

    /// Descendants (including `root`) whose class list contains `class`.
    pub fn find_by_class(&self, root: TargetNode, class: &str) -> Vec<TargetNode> {
        let mut out = Vec::new();
        self.state.borrow().collect(
            root,
            &|data| {
                matches!(data, NodeData::Element { class_name, .. }
                    if class_name.split_whitespace().any(|c| c == class))
            },
            &mut out,
        );
        out
    }

    /// Invoke the node's listeners for `event.kind`.
    ///
    /// Listeners are cloned out first, so they are free to re-enter the
    /// document. The first listener error is returned after all listeners
    /// have run.
    pub fn dispatch(&self, node: TargetNode, event: &Event) -> Result<()> {
        let listeners: Vec<EventHandler> = {
            let state = self.state.borrow();
            match state.nodes.get(&node).map(|n| &n.data) {
                Some(NodeData::Element { listeners, .. }) => listeners
                    .iter()
                    .filter(|(name, _)| *name == event.kind)
                    .map(|(_, handler)| handler.clone())
                    .collect(),
                _ => Vec::new(),
            }
        };

        let mut first_error = None;
        for listener in listeners {
            if let Err(err) = listener.call(event) {
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Dispatch a bare event of the given kind.
    pub fn fire(&self, node: TargetNode, kind: &str) -> Result<()> {
        self.dispatch(node, &Event::new(kind, node).with_value(self.value(node)))
    }

    /// Simulate typing: set the value, then dispatch `change`.
    pub fn type_text(&self, node: TargetNode, text: &str) -> Result<()> {
        self.set_value(node, text);
        self.fire(node, "change")
    }

    /// Simulate a key press: dispatch `keyup` carrying the key and value.
    pub fn press_key(&self, node: TargetNode, key: &str) -> Result<()> {
        let event = Event::new("keyup", node).with_value(self.value(node)).with_key(key);
        self.dispatch(node, &event)
    }
}

impl RenderTarget for MemoryDocument {
    fn create_element(&self, tag: &str) -> TargetNode {
        self.state.borrow_mut().create(NodeData::Element {
            tag: tag.to_string(),
            attributes: IndexMap::new(),
            class_name: String::new(),
            value: String::new(),
            listeners: Vec::new(),
        })
    }

    fn create_text(&self, text: &str) -> TargetNode {
        self.state.borrow_mut().create(NodeData::Text(text.to_string()))
    }

    fn tag_name(&self, node: TargetNode) -> Option<String> {
        match &self.state.borrow().nodes.get(&node)?.data {
            NodeData::Element { tag, .. } => Some(tag.clone()),
            NodeData::Text(_) => None,
        }
    }

    fn set_text(&self, node: TargetNode, text: &str) {
        let mut state = self.state.borrow_mut();
        match state.nodes.get_mut(&node).map(|n| &mut n.data) {
            Some(NodeData::Text(current)) => *current = text.to_string(),
            _ => warn!(%node, "set_text on a node that is not a text node"),
        }
    }

    fn set_attribute(&self, node: TargetNode, name: &str, value: &str) {
        let mut state = self.state.borrow_mut();
        match state.nodes.get_mut(&node).map(|n| &mut n.data) {
            Some(NodeData::Element { attributes, value: form_value, .. }) => {
                if name == "value" {
                    *form_value = value.to_string();
                }
                attributes.insert(name.to_string(), value.to_string());
            }
            _ => warn!(%node, name, "set_attribute on a node that is not an element"),
        }
    }

    fn remove_attribute(&self, node: TargetNode, name: &str) {
        let mut state = self.state.borrow_mut();
        let data = state.nodes.get_mut(&node).map(|n| &mut n.data);
        if let Some(NodeData::Element { attributes, .. }) = data {
            attributes.shift_remove(name);
        }
    }

    fn set_class_name(&self, node: TargetNode, class_name: &str) {
        let mut state = self.state.borrow_mut();
        match state.nodes.get_mut(&node).map(|n| &mut n.data) {
            Some(NodeData::Element {
                class_name: current,
                ..
            }) => *current = class_name.to_string(),
            _ => warn!(%node, "set_class_name on a node that is not an element"),
        }
    }

    fn add_listener(&self, node: TargetNode, event: &str, handler: EventHandler) {
        let mut state = self.state.borrow_mut();
        match state.nodes.get_mut(&node).map(|n| &mut n.data) {
            Some(NodeData::Element { listeners, .. }) => {
                // same handler for the same event is registered once
                if !listeners.iter().any(|(name, h)| name == event && h.ptr_eq(&handler)) {
                    listeners.push((event.to_string(), handler));
                }
            }
            _ => warn!(%node, event, "add_listener on a node that is not an element"),
        }
    }

    fn remove_listener(&self, node: TargetNode, event: &str, handler: &EventHandler) {
        let mut state = self.state.borrow_mut();
        let data = state.nodes.get_mut(&node).map(|n| &mut n.data);
        if let Some(NodeData::Element { listeners, .. }) = data {
            listeners.retain(|(name, h)| !(name == event && h.ptr_eq(handler)));
        }
    }

    fn insert_before(
        &self,
        parent: TargetNode,
        child: TargetNode,
        before: Option<TargetNode>,
    ) -> Result<()> {
        let mut state = self.state.borrow_mut();
        if matches!(state.node(parent)?.data, NodeData::Text(_)) {
            return Err(Error::internal(format!("cannot insert {child} under text node {parent}")));
        }
        state.detach(child)?;

        let parent_node = state.node_mut(parent)?;
        let index = match before {
            None => parent_node.children.len(),
            Some(reference) => parent_node
                .children
                .iter()
                .position(|c| *c == reference)
                .ok_or_else(|| Error::internal(format!("{reference} is not a child of {parent}")))?,
        };
        parent_node.children.insert(index, child);
        state.node_mut(child)?.parent = Some(parent);
        Ok(())
    }

    fn remove_child(&self, parent: TargetNode, child: TargetNode) -> Result<()> {
        let mut state = self.state.borrow_mut();
        if state.node(child)?.parent != Some(parent) {
            return Err(Error::internal(format!("{child} is not a child of {parent}")));
        }
        state.detach(child)
    }

    fn release(&self, node: TargetNode) {
        let mut state = self.state.borrow_mut();
        if let Err(err) = state.detach(node) {
            warn!(%node, %err, "release of an unknown node");
            return;
        }
        state.drop_subtree(node);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn insert_append_and_move() {
        let doc = MemoryDocument::new();
        let root = doc.create_root("div");
        let a = doc.create_text("a");
        let b = doc.create_text("b");
        let c = doc.create_element("span");

        doc.insert_before(root, a, None).unwrap();
        doc.insert_before(root, c, None).unwrap();
        doc.insert_before(root, b, Some(c)).unwrap();
        assert_eq!(doc.children(root), vec![a, b, c]);

        // moving a node detaches it from its previous position
        doc.insert_before(c, a, None).unwrap();
        assert_eq!(doc.children(root), vec![b, c]);
        assert_eq!(doc.parent(a), Some(c));
        assert_eq!(doc.to_html(root), "b<span>a</span>");
    }

    #[test]
    fn invalid_reference_is_internal_error() {
        let doc = MemoryDocument::new();
        let root = doc.create_root("div");
        let stray = doc.create_text("x");
        let child = doc.create_text("y");
        let err = doc.insert_before(root, child, Some(stray)).unwrap_err();
        assert!(err.is_internal());
        assert!(doc.remove_child(root, stray).unwrap_err().is_internal());
    }

    #[test]
    fn release_drops_the_whole_subtree() {
        let doc = MemoryDocument::new();
        let root = doc.create_root("div");
        let list = doc.create_element("ul");
        let item = doc.create_element("li");
        let text = doc.create_text("x");
        doc.insert_before(root, list, None).unwrap();
        doc.insert_before(list, item, None).unwrap();
        doc.insert_before(item, text, None).unwrap();
        doc.add_listener(item, "click", EventHandler::new(|_| Ok(())));
        assert_eq!(doc.node_count(), 4);

        doc.release(list);
        assert_eq!(doc.node_count(), 1);
        assert!(doc.children(root).is_empty());
        assert!(![list, item, text].iter().any(|node| doc.contains(*node)));

        // releasing twice is harmless
        doc.release(list);
        assert_eq!(doc.node_count(), 1);
    }

    #[test]
    fn html_escapes_and_orders_attributes() {
        let doc = MemoryDocument::new();
        let root = doc.create_root("p");
        doc.set_class_name(root, "note");
        doc.set_attribute(root, "title", "a\"b");
        let text = doc.create_text("1 < 2");
        doc.insert_before(root, text, None).unwrap();
        assert_eq!(doc.to_html(root), "<p class=\"note\" title=\"a&quot;b\">1 &lt; 2</p>");
        assert_eq!(doc.text_content(root), "1 < 2");
    }

    #[test]
    fn dispatch_calls_matching_listeners_outside_the_borrow() {
        let doc = MemoryDocument::new();
        let button = doc.create_element("button");
        let clicks = Rc::new(Cell::new(0));

        let counter = clicks.clone();
        let reentrant = doc.clone();
        doc.add_listener(
            button,
            "click",
            EventHandler::new(move |event| {
                counter.set(counter.get() + 1);
                // re-entering the document must not panic
                reentrant.set_attribute(event.target, "data-clicked", "yes");
                Ok(())
            }),
        );

        doc.fire(button, "click").unwrap();
        doc.fire(button, "keyup").unwrap();
        assert_eq!(clicks.get(), 1);
        assert_eq!(doc.attribute(button, "data-clicked").as_deref(), Some("yes"));
    }

    #[test]
    fn find_helpers() {
        let doc = MemoryDocument::new();
        let root = doc.create_root("div");
        let p = doc.create_element("p");
        doc.set_class_name(p, "card number-card");
        doc.insert_before(root, p, None).unwrap();
        assert_eq!(doc.find_by_class(root, "number-card"), vec![p]);
        assert_eq!(doc.find_by_tag(root, "p"), vec![p]);
        assert!(doc.find_by_class(root, "card-wrapper").is_empty());
    }

    #[test]
    fn typing_sets_value_and_fires_change() {
        let doc = MemoryDocument::new();
        let input = doc.create_element("input");
        let seen = Rc::new(RefCell::new(String::new()));
        let sink = seen.clone();
        doc.add_listener(
            input,
            "change",
            EventHandler::new(move |event| {
                *sink.borrow_mut() = event.value.clone();
                Ok(())
            }),
        );
        doc.type_text(input, "42").unwrap();
        assert_eq!(*seen.borrow(), "42");
        assert_eq!(doc.value(input), "42");
    }
}
