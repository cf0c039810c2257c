//! In-memory content store
//!
//! A [`ContentSession`] backed by plain maps. This is the store the admin
//! tooling and the test suite run against; it persists as a single JSON
//! document through the archive module.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::attributes::{AttrValue, Attributes};
use crate::model::{ContentType, SiteRef};
use crate::session::{
    ContentSession, Customization, CustomizationContext, CustomizationId, NodeKind, ObjectId,
};

/// One node of the tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Node {
    kind: NodeKind,
    name: String,
    parent: Option<ObjectId>,
    children: Vec<ObjectId>,
    attrs: Attributes,
    /// Navigation page link, validated against live nodes on read.
    #[serde(default)]
    link: Option<ObjectId>,
    /// The window's own customization.
    #[serde(default)]
    customization: Option<CustomizationId>,
    /// Site and page customizations, keyed by caller-chosen name.
    #[serde(default)]
    named_customizations: BTreeMap<String, CustomizationId>,
}

/// One customization record.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CustomizationRecord {
    content_type: ContentType,
    content_id: String,
    context: CustomizationContext,
    /// Own state; when `None` the record reads through `base`.
    #[serde(default)]
    state: Option<serde_json::Value>,
    /// Extended record, for windows sharing a site customization.
    #[serde(default)]
    base: Option<CustomizationId>,
}

/// In-memory content tree.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryStore {
    nodes: BTreeMap<ObjectId, Node>,
    /// Site roots, keyed by `kind/name`.
    sites: BTreeMap<String, ObjectId>,
    customizations: BTreeMap<CustomizationId, CustomizationRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert_node(&mut self, kind: NodeKind, name: &str, parent: Option<ObjectId>) -> ObjectId {
        let id = ObjectId::generate();
        self.nodes.insert(
            id.clone(),
            Node {
                kind,
                name: name.to_string(),
                parent: parent.clone(),
                children: Vec::new(),
                attrs: Attributes::new(),
                link: None,
                customization: None,
                named_customizations: BTreeMap::new(),
            },
        );
        if let Some(parent) = parent {
            if let Some(p) = self.nodes.get_mut(&parent) {
                p.children.push(id.clone());
            }
        }
        id
    }

    /// Unhook a node from its current parent without destroying it.
    fn detach(&mut self, child: &ObjectId) {
        let Some(parent) = self.nodes.get(child).and_then(|n| n.parent.clone()) else {
            return;
        };
        if let Some(p) = self.nodes.get_mut(&parent) {
            p.children.retain(|c| c != child);
        }
        if let Some(n) = self.nodes.get_mut(child) {
            n.parent = None;
        }
    }

    /// Drop a subtree and every customization record attached inside it.
    fn destroy_subtree(&mut self, id: &ObjectId) {
        let Some(node) = self.nodes.remove(id) else {
            return;
        };
        if let Some(c) = node.customization {
            self.customizations.remove(&c);
        }
        for c in node.named_customizations.into_values() {
            self.customizations.remove(&c);
        }
        for child in node.children {
            self.destroy_subtree(&child);
        }
    }

    fn new_customization(
        &mut self,
        content_type: ContentType,
        content_id: &str,
        context: CustomizationContext,
        state: Option<serde_json::Value>,
        base: Option<CustomizationId>,
    ) -> CustomizationId {
        let id = CustomizationId::generate();
        self.customizations.insert(
            id.clone(),
            CustomizationRecord {
                content_type,
                content_id: content_id.to_string(),
                context,
                state,
                base,
            },
        );
        id
    }

    fn replace_named_customization(
        &mut self,
        node: &ObjectId,
        key: &str,
        id: CustomizationId,
    ) -> CustomizationId {
        if let Some(n) = self.nodes.get_mut(node) {
            if let Some(old) = n.named_customizations.insert(key.to_string(), id.clone()) {
                self.customizations.remove(&old);
            }
        }
        id
    }
}

impl ContentSession for MemoryStore {
    // ── Nodes ──────────────────────────────────────────

    fn node_kind(&self, id: &ObjectId) -> Option<NodeKind> {
        self.nodes.get(id).map(|n| n.kind)
    }

    fn node_name(&self, id: &ObjectId) -> Option<String> {
        self.nodes.get(id).map(|n| n.name.clone())
    }

    fn node_path(&self, id: &ObjectId) -> String {
        let mut segments = Vec::new();
        let mut cursor = Some(id.clone());
        while let Some(c) = cursor {
            match self.nodes.get(&c) {
                Some(n) => {
                    segments.push(n.name.clone());
                    cursor = n.parent.clone();
                }
                None => {
                    segments.push(format!("?{}", c));
                    break;
                }
            }
        }
        segments.reverse();
        format!("/{}", segments.join("/"))
    }

    fn find_node(&self, kind: NodeKind, id: &ObjectId) -> Option<ObjectId> {
        let node = self.nodes.get(id)?;
        (node.kind == kind).then(|| id.clone())
    }

    fn parent_of(&self, id: &ObjectId) -> Option<ObjectId> {
        self.nodes.get(id).and_then(|n| n.parent.clone())
    }

    // ── Attributes ─────────────────────────────────────

    fn attr(&self, id: &ObjectId, name: &str) -> Option<AttrValue> {
        self.nodes.get(id).and_then(|n| n.attrs.get(name).cloned())
    }

    fn set_attr(&mut self, id: &ObjectId, name: &str, value: Option<AttrValue>) -> bool {
        match self.nodes.get_mut(id) {
            Some(n) => n.attrs.set(name, value),
            None => false,
        }
    }

    fn attr_names(&self, id: &ObjectId) -> Vec<String> {
        self.nodes.get(id).map(|n| n.attrs.names()).unwrap_or_default()
    }

    // ── Children ───────────────────────────────────────

    fn children(&self, id: &ObjectId) -> Vec<ObjectId> {
        self.nodes.get(id).map(|n| n.children.clone()).unwrap_or_default()
    }

    fn child_by_name(&self, id: &ObjectId, name: &str) -> Option<ObjectId> {
        self.nodes
            .get(id)?
            .children
            .iter()
            .find(|c| self.nodes.get(c).is_some_and(|n| n.name == name))
            .cloned()
    }

    fn create_child(&mut self, parent: &ObjectId, kind: NodeKind, name: &str) -> ObjectId {
        self.insert_node(kind, name, Some(parent.clone()))
    }

    fn move_child(&mut self, new_parent: &ObjectId, child: &ObjectId) {
        if !self.nodes.contains_key(new_parent) || !self.nodes.contains_key(child) {
            return;
        }
        self.detach(child);
        if let Some(p) = self.nodes.get_mut(new_parent) {
            p.children.push(child.clone());
        }
        if let Some(n) = self.nodes.get_mut(child) {
            n.parent = Some(new_parent.clone());
        }
    }

    fn insert_child_at(&mut self, parent: &ObjectId, index: usize, child: &ObjectId) {
        if !self.nodes.contains_key(parent) || !self.nodes.contains_key(child) {
            return;
        }
        self.detach(child);
        if let Some(p) = self.nodes.get_mut(parent) {
            let index = index.min(p.children.len());
            p.children.insert(index, child.clone());
        }
        if let Some(n) = self.nodes.get_mut(child) {
            n.parent = Some(parent.clone());
        }
    }

    fn remove_child(&mut self, parent: &ObjectId, child: &ObjectId) {
        if self.nodes.get(child).and_then(|n| n.parent.as_ref()) != Some(parent) {
            return;
        }
        self.detach(child);
        self.destroy_subtree(child);
    }

    // ── Sites ──────────────────────────────────────────

    fn find_site(&self, site: &SiteRef) -> Option<ObjectId> {
        self.sites.get(&site.to_string()).cloned()
    }

    fn create_site(&mut self, site: &SiteRef) -> ObjectId {
        if let Some(existing) = self.find_site(site) {
            return existing;
        }
        let root = self.insert_node(NodeKind::Site, &site.name, None);
        self.insert_node(NodeKind::Container, "layout", Some(root.clone()));
        self.insert_node(NodeKind::Navigation, "navigation", Some(root.clone()));
        self.sites.insert(site.to_string(), root.clone());
        root
    }

    fn site_ref(&self, site_node: &ObjectId) -> Option<SiteRef> {
        self.sites.iter().find_map(|(key, id)| {
            if id == site_node {
                key.parse().ok()
            } else {
                None
            }
        })
    }

    fn site_of(&self, id: &ObjectId) -> Option<ObjectId> {
        let mut cursor = id.clone();
        loop {
            let node = self.nodes.get(&cursor)?;
            if node.kind == NodeKind::Site {
                return Some(cursor);
            }
            cursor = node.parent.clone()?;
        }
    }

    fn site_layout(&self, site_node: &ObjectId) -> Option<ObjectId> {
        let node = self.nodes.get(site_node)?;
        node.children
            .iter()
            .find(|c| {
                self.nodes
                    .get(c)
                    .is_some_and(|n| n.kind == NodeKind::Container && n.name == "layout")
            })
            .cloned()
    }

    fn site_navigation(&self, site_node: &ObjectId) -> Option<ObjectId> {
        let node = self.nodes.get(site_node)?;
        node.children
            .iter()
            .find(|c| self.nodes.get(c).is_some_and(|n| n.kind == NodeKind::Navigation))
            .cloned()
    }

    // ── Pages ──────────────────────────────────────────

    fn find_page(&self, site_node: &ObjectId, name: &str) -> Option<ObjectId> {
        let node = self.nodes.get(site_node)?;
        node.children
            .iter()
            .find(|c| {
                self.nodes
                    .get(c)
                    .is_some_and(|n| n.kind == NodeKind::Page && n.name == name)
            })
            .cloned()
    }

    fn create_page(&mut self, site_node: &ObjectId, name: &str) -> ObjectId {
        let page = self.insert_node(NodeKind::Page, name, Some(site_node.clone()));
        self.insert_node(NodeKind::Container, "root", Some(page.clone()));
        page
    }

    fn page_container(&self, page_node: &ObjectId) -> Option<ObjectId> {
        let node = self.nodes.get(page_node)?;
        if node.kind != NodeKind::Page {
            return None;
        }
        node.children
            .iter()
            .find(|c| self.nodes.get(c).is_some_and(|n| n.kind == NodeKind::Container))
            .cloned()
    }

    fn page_names(&self, site_node: &ObjectId) -> Vec<String> {
        let Some(node) = self.nodes.get(site_node) else {
            return Vec::new();
        };
        node.children
            .iter()
            .filter_map(|c| {
                let n = self.nodes.get(c)?;
                (n.kind == NodeKind::Page).then(|| n.name.clone())
            })
            .collect()
    }

    // ── Navigation links ───────────────────────────────

    fn page_link(&self, nav_node: &ObjectId) -> Option<ObjectId> {
        let link = self.nodes.get(nav_node)?.link.clone()?;
        self.nodes.contains_key(&link).then_some(link)
    }

    fn set_page_link(&mut self, nav_node: &ObjectId, page: &ObjectId) {
        if let Some(n) = self.nodes.get_mut(nav_node) {
            n.link = Some(page.clone());
        }
    }

    // ── Customizations ─────────────────────────────────

    fn window_customization(&self, window: &ObjectId) -> Option<CustomizationId> {
        self.nodes.get(window)?.customization.clone()
    }

    fn site_customization(&self, site_node: &ObjectId, key: &str) -> Option<CustomizationId> {
        self.nodes.get(site_node)?.named_customizations.get(key).cloned()
    }

    fn page_customization(&self, page_node: &ObjectId, key: &str) -> Option<CustomizationId> {
        self.nodes.get(page_node)?.named_customizations.get(key).cloned()
    }

    fn customize_site(
        &mut self,
        site_node: &ObjectId,
        key: &str,
        content_type: ContentType,
        content_id: &str,
        state: Option<serde_json::Value>,
    ) -> CustomizationId {
        let id = self.new_customization(
            content_type,
            content_id,
            CustomizationContext::Site(site_node.clone()),
            state,
            None,
        );
        self.replace_named_customization(site_node, key, id)
    }

    fn customize_page(
        &mut self,
        page_node: &ObjectId,
        key: &str,
        content_type: ContentType,
        content_id: &str,
        state: Option<serde_json::Value>,
    ) -> CustomizationId {
        let id = self.new_customization(
            content_type,
            content_id,
            CustomizationContext::Page(page_node.clone()),
            state,
            None,
        );
        self.replace_named_customization(page_node, key, id)
    }

    fn customize_window(
        &mut self,
        window: &ObjectId,
        content_type: ContentType,
        content_id: &str,
        state: Option<serde_json::Value>,
    ) -> CustomizationId {
        let id = self.new_customization(
            content_type,
            content_id,
            CustomizationContext::Window(window.clone()),
            state,
            None,
        );
        if let Some(n) = self.nodes.get_mut(window) {
            n.customization = Some(id.clone());
        }
        id
    }

    fn extend_window_customization(
        &mut self,
        window: &ObjectId,
        base: &CustomizationId,
    ) -> Option<CustomizationId> {
        let record = self.customizations.get(base)?;
        let (content_type, content_id) = (record.content_type, record.content_id.clone());
        let id = self.new_customization(
            content_type,
            &content_id,
            CustomizationContext::Window(window.clone()),
            None,
            Some(base.clone()),
        );
        if let Some(n) = self.nodes.get_mut(window) {
            n.customization = Some(id.clone());
        }
        Some(id)
    }

    fn destroy_window_customization(&mut self, window: &ObjectId) {
        let Some(n) = self.nodes.get_mut(window) else {
            return;
        };
        if let Some(id) = n.customization.take() {
            self.customizations.remove(&id);
        }
    }

    fn customization(&self, id: &CustomizationId) -> Option<Customization> {
        let record = self.customizations.get(id)?;
        Some(Customization {
            id: id.clone(),
            content_type: record.content_type,
            content_id: record.content_id.clone(),
            context: record.context.clone(),
        })
    }

    fn customization_state(&self, id: &CustomizationId) -> Option<serde_json::Value> {
        let mut cursor = id.clone();
        loop {
            let record = self.customizations.get(&cursor)?;
            if let Some(state) = &record.state {
                return Some(state.clone());
            }
            cursor = record.base.clone()?;
        }
    }

    fn set_customization_state(&mut self, id: &CustomizationId, state: serde_json::Value) -> bool {
        match self.customizations.get_mut(id) {
            Some(record) => {
                if record.state.as_ref() == Some(&state) {
                    false
                } else {
                    record.state = Some(state);
                    true
                }
            }
            None => false,
        }
    }
}
