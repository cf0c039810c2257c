//! Content session abstraction
//!
//! The mapper consumes a hierarchical node store through this trait: typed
//! nodes with ordered children, a flat attribute map per node, site and page
//! lookup, navigation page links, and customization records. One caller owns
//! a session for a whole load/mutate/save cycle; nothing here locks or
//! retries.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::attributes::AttrValue;
use crate::model::{ContentType, SiteRef};

/// Stable node identity, store-assigned on creation.
///
/// Nodes are compared by id, never by handle, since a store is free to hand
/// out fresh handles for the same node on every access.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(String);

impl ObjectId {
    /// Mint a fresh id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ObjectId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ObjectId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Identity of a customization record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CustomizationId(String);

impl CustomizationId {
    /// Mint a fresh id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CustomizationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CustomizationId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// The kinds of node a content tree holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    Site,
    Page,
    Container,
    Window,
    Body,
    Navigation,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Site => "site",
            NodeKind::Page => "page",
            NodeKind::Container => "container",
            NodeKind::Window => "window",
            NodeKind::Body => "body",
            NodeKind::Navigation => "navigation",
        }
    }
}

/// The owner a customization record is attached to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CustomizationContext {
    Site(ObjectId),
    Page(ObjectId),
    Window(ObjectId),
}

/// A customization record, minus its state payload.
///
/// State is read separately through [`ContentSession::customization_state`]
/// because it resolves through extension links.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customization {
    /// Record identity.
    pub id: CustomizationId,
    /// The bound content kind.
    pub content_type: ContentType,
    /// The bound content id (application/portlet, gadget name, or uri).
    pub content_id: String,
    /// Who owns the record.
    pub context: CustomizationContext,
}

/// Session over a hierarchical content store.
///
/// Lookups answer with `None` rather than failing; the mapper turns absence
/// into its own errors. Mutating calls with ids unknown to the session are
/// ignored. Child order is significant everywhere and preserved verbatim.
pub trait ContentSession {
    // ── Nodes ──────────────────────────────────────────

    /// Kind of a node.
    fn node_kind(&self, id: &ObjectId) -> Option<NodeKind>;

    /// Storage name of a node.
    fn node_name(&self, id: &ObjectId) -> Option<String>;

    /// Human-readable path of a node, for diagnostics.
    fn node_path(&self, id: &ObjectId) -> String;

    /// Find a node by kind and id.
    fn find_node(&self, kind: NodeKind, id: &ObjectId) -> Option<ObjectId>;

    /// Parent of a node.
    fn parent_of(&self, id: &ObjectId) -> Option<ObjectId>;

    // ── Attributes ─────────────────────────────────────

    /// Read an attribute.
    fn attr(&self, id: &ObjectId, name: &str) -> Option<AttrValue>;

    /// Write or clear an attribute; returns whether the stored value changed.
    fn set_attr(&mut self, id: &ObjectId, name: &str, value: Option<AttrValue>) -> bool;

    /// All attribute names on a node.
    fn attr_names(&self, id: &ObjectId) -> Vec<String>;

    // ── Children ───────────────────────────────────────

    /// Ordered children of a node.
    fn children(&self, id: &ObjectId) -> Vec<ObjectId>;

    /// First child with the given storage name.
    fn child_by_name(&self, id: &ObjectId, name: &str) -> Option<ObjectId>;

    /// Create a child node of the given kind, appended last.
    fn create_child(&mut self, parent: &ObjectId, kind: NodeKind, name: &str) -> ObjectId;

    /// Reparent a node under `new_parent`, appended last.
    fn move_child(&mut self, new_parent: &ObjectId, child: &ObjectId);

    /// Reposition a node at `index` under `parent`.
    fn insert_child_at(&mut self, parent: &ObjectId, index: usize, child: &ObjectId);

    /// Remove a child and destroy its whole subtree.
    fn remove_child(&mut self, parent: &ObjectId, child: &ObjectId);

    // ── Sites ──────────────────────────────────────────

    /// Look up a site node.
    fn find_site(&self, site: &SiteRef) -> Option<ObjectId>;

    /// Create a site (with its layout and navigation roots) if absent.
    fn create_site(&mut self, site: &SiteRef) -> ObjectId;

    /// The site reference of a site node.
    fn site_ref(&self, site_node: &ObjectId) -> Option<SiteRef>;

    /// The site a node lives under.
    fn site_of(&self, id: &ObjectId) -> Option<ObjectId>;

    /// The root layout container of a site.
    fn site_layout(&self, site_node: &ObjectId) -> Option<ObjectId>;

    /// The root navigation node of a site.
    fn site_navigation(&self, site_node: &ObjectId) -> Option<ObjectId>;

    // ── Pages ──────────────────────────────────────────

    /// Look up a page of a site by name.
    fn find_page(&self, site_node: &ObjectId, name: &str) -> Option<ObjectId>;

    /// Create a page (with its root container) under a site.
    fn create_page(&mut self, site_node: &ObjectId, name: &str) -> ObjectId;

    /// The root container of a page.
    fn page_container(&self, page_node: &ObjectId) -> Option<ObjectId>;

    /// Names of all pages of a site, in creation order.
    fn page_names(&self, site_node: &ObjectId) -> Vec<String>;

    // ── Navigation links ───────────────────────────────

    /// The page a navigation node links to. `None` when no link was set or
    /// the target has been deleted since.
    fn page_link(&self, nav_node: &ObjectId) -> Option<ObjectId>;

    /// Point a navigation node at a page.
    fn set_page_link(&mut self, nav_node: &ObjectId, page: &ObjectId);

    // ── Customizations ─────────────────────────────────

    /// A window's own customization.
    fn window_customization(&self, window: &ObjectId) -> Option<CustomizationId>;

    /// A site's named customization.
    fn site_customization(&self, site_node: &ObjectId, key: &str) -> Option<CustomizationId>;

    /// A page's named customization.
    fn page_customization(&self, page_node: &ObjectId, key: &str) -> Option<CustomizationId>;

    /// Create or replace a site's named customization.
    fn customize_site(
        &mut self,
        site_node: &ObjectId,
        key: &str,
        content_type: ContentType,
        content_id: &str,
        state: Option<serde_json::Value>,
    ) -> CustomizationId;

    /// Create or replace a page's named customization.
    fn customize_page(
        &mut self,
        page_node: &ObjectId,
        key: &str,
        content_type: ContentType,
        content_id: &str,
        state: Option<serde_json::Value>,
    ) -> CustomizationId;

    /// Attach a fresh customization to a window.
    fn customize_window(
        &mut self,
        window: &ObjectId,
        content_type: ContentType,
        content_id: &str,
        state: Option<serde_json::Value>,
    ) -> CustomizationId;

    /// Attach a customization to a window that extends `base`, sharing its
    /// state until overridden. `None` when `base` is unknown.
    fn extend_window_customization(
        &mut self,
        window: &ObjectId,
        base: &CustomizationId,
    ) -> Option<CustomizationId>;

    /// Destroy a window's customization, if any.
    fn destroy_window_customization(&mut self, window: &ObjectId);

    /// Describe a customization record.
    fn customization(&self, id: &CustomizationId) -> Option<Customization>;

    /// The effective state of a customization, resolved through its
    /// extension chain.
    fn customization_state(&self, id: &CustomizationId) -> Option<serde_json::Value>;

    /// Overwrite a customization's own state; returns whether it changed.
    fn set_customization_state(&mut self, id: &CustomizationId, state: serde_json::Value) -> bool;
}
