//! The rendering surface a widget writes into.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

/// A node the widget can fill with markup and look children up in.
pub trait Element: Send + Sync {
    fn set_inner_html(&self, html: &str);

    fn inner_html(&self) -> String;

    /// Descendant with the given `id`, if the current markup declares one.
    fn child(&self, id: &str) -> Option<Arc<dyn Element>>;
}

#[derive(Default)]
struct Node {
    html: String,
    children: BTreeMap<String, Arc<MemoryElement>>,
}

/// In-memory [`Element`]. Setting markup creates one empty child per `id="..."` it declares.
#[derive(Default)]
pub struct MemoryElement {
    node: Mutex<Node>,
}

impl MemoryElement {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Ids declared by the current markup, sorted.
    pub fn child_ids(&self) -> Vec<String> {
        self.lock().children.keys().cloned().collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Node> {
        self.node.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Element for MemoryElement {
    fn set_inner_html(&self, html: &str) {
        let children = declared_ids(html)
            .into_iter()
            .map(|id| (id, Arc::new(MemoryElement::default())))
            .collect();
        let mut node = self.lock();
        node.html = html.to_string();
        node.children = children;
    }

    fn inner_html(&self) -> String {
        self.lock().html.clone()
    }

    fn child(&self, id: &str) -> Option<Arc<dyn Element>> {
        let child = self.lock().children.get(id).cloned()?;
        Some(child as Arc<dyn Element>)
    }
}

fn declared_ids(html: &str) -> Vec<String> {
    const MARKER: &str = "id=\"";
    let mut ids = Vec::new();
    let mut rest = html;
    while let Some(start) = rest.find(MARKER) {
        rest = &rest[start + MARKER.len()..];
        let Some(end) = rest.find('"') else { break };
        ids.push(rest[..end].to_string());
        rest = &rest[end + 1..];
    }
    ids
}
