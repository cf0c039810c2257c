//! Model mapper
//!
//! Bidirectional translation between the domain model and a content tree.
//! Loads rebuild model values from nodes; saves reconcile a mutated model
//! back onto the tree with the minimum of structural operations and report
//! what they applied as an ordered change log.

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::attributes::{keys, AttrType, AttrValue, Key};
use crate::model::{
    AppRef, AppState, Body, BodyType, Component, Container, ContainerKind, ModelChange, NavNode,
    Navigation, Page, PageRef, ParseError, Portal, SiteRef, StorageId, TransientState, Window,
    EVERYONE,
};
use crate::session::{ContentSession, CustomizationContext, CustomizationId, NodeKind, ObjectId};

/// Result type for mapper operations.
pub type Result<T> = std::result::Result<T, MapperError>;

/// Errors a load or save can hit.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MapperError {
    #[error("no such site: {0}")]
    MissingSite(SiteRef),

    #[error("no such page: {0}")]
    MissingPage(PageRef),

    #[error("no such component: {0}")]
    MissingComponent(ObjectId),

    #[error("no such customization: {0}")]
    MissingCustomization(CustomizationId),

    #[error("window {0} has no customization")]
    Uncustomized(ObjectId),

    #[error("save target {target} does not match model id {model}")]
    WrongTarget { target: ObjectId, model: ObjectId },

    #[error("expected a {wanted} node at {path}, found {actual}")]
    UnexpectedKind {
        wanted: &'static str,
        actual: &'static str,
        path: String,
    },

    #[error("storage id {0} occurs twice in the model")]
    DuplicateStorageId(ObjectId),

    #[error("duplicate sibling name {name:?} under {path}")]
    DuplicateName { name: String, path: String },

    #[error("component {id} moved under {path} from outside the saved hierarchy")]
    StrayComponent { id: ObjectId, path: String },

    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// Site attribute names that never pass through the properties map.
pub const SITE_RESERVED: [&str; 7] = [
    "locale",
    "access-permissions",
    "edit-permission",
    "skin",
    "title",
    "creator",
    "modifier",
];

/// Window attribute names that never pass through the properties map.
pub const WINDOW_RESERVED: [&str; 11] = [
    "type",
    "theme",
    "title",
    "access-permissions",
    "show-info-bar",
    "show-state",
    "show-mode",
    "description",
    "icon",
    "width",
    "height",
];

// ─────────────────────────────────────────────────────
// Change log
// ─────────────────────────────────────────────────────

/// Bookkeeping for one save.
///
/// `Update` is recorded at most once per node, and only when the save
/// actually changed something: a scalar, the node's parent, or a child
/// sequence. A created node only ever gets its `Create` entry.
#[derive(Debug, Default)]
struct SaveContext {
    changes: Vec<ModelChange>,
    created: HashSet<ObjectId>,
    updated: HashSet<ObjectId>,
    moved: HashSet<ObjectId>,
}

impl SaveContext {
    fn record_create(&mut self, id: &ObjectId) {
        self.created.insert(id.clone());
        self.changes.push(ModelChange::Create(id.clone()));
    }

    fn record_update(&mut self, id: &ObjectId) {
        if self.created.contains(id) || !self.updated.insert(id.clone()) {
            return;
        }
        self.changes.push(ModelChange::Update(id.clone()));
    }

    fn record_destroy(&mut self, id: &ObjectId) {
        self.changes.push(ModelChange::Destroy(id.clone()));
    }

    fn record_move(&mut self, id: &ObjectId) {
        self.moved.insert(id.clone());
    }

    fn was_moved(&self, id: &ObjectId) -> bool {
        self.moved.contains(id)
    }
}

// ─────────────────────────────────────────────────────
// Hierarchy snapshot
// ─────────────────────────────────────────────────────

/// Where the model wants every already-persisted component, captured before
/// any mutation. The save passes consult it to tell moves apart from
/// deletes: a tree child missing from its parent's model children is only
/// deleted when no other model parent claims it.
#[derive(Debug)]
struct Snapshot {
    /// Every existing id anywhere in the model subtree.
    claimed: HashSet<ObjectId>,
    /// Existing child id to its model parent's existing id. Children of
    /// not-yet-persisted parents have no entry; a save that would have to
    /// move such a child fails instead.
    parents: HashMap<ObjectId, ObjectId>,
}

impl Snapshot {
    fn build(children: &[Component], dst: &ObjectId) -> Result<Self> {
        let mut snapshot = Self {
            claimed: HashSet::new(),
            parents: HashMap::new(),
        };
        snapshot.visit(children, Some(dst))?;
        Ok(snapshot)
    }

    fn visit(&mut self, children: &[Component], parent: Option<&ObjectId>) -> Result<()> {
        for child in children {
            let id = child.storage().existing();
            if let Some(id) = id {
                if !self.claimed.insert(id.clone()) {
                    return Err(MapperError::DuplicateStorageId(id.clone()));
                }
                if let Some(parent) = parent {
                    self.parents.insert(id.clone(), parent.clone());
                }
            }
            if let Component::Container(c) = child {
                self.visit(&c.children, id)?;
            }
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────
// Mapper
// ─────────────────────────────────────────────────────

/// Bidirectional mapper over one content session.
pub struct Mapper<'s, S> {
    session: &'s mut S,
}

impl<'s, S: ContentSession> Mapper<'s, S> {
    pub fn new(session: &'s mut S) -> Self {
        Self { session }
    }

    fn read<T: AttrType>(&self, id: &ObjectId, key: Key<T>) -> Option<T> {
        self.session.attr(id, key.name()).as_ref().and_then(T::from_attr)
    }

    fn write<T: AttrType>(&mut self, id: &ObjectId, key: Key<T>, value: Option<T>) -> bool {
        self.session.set_attr(id, key.name(), value.map(T::into_attr))
    }

    fn site_node(&self, site: &SiteRef) -> Result<ObjectId> {
        self.session
            .find_site(site)
            .ok_or_else(|| MapperError::MissingSite(site.clone()))
    }

    fn layout_node(&self, site_node: &ObjectId) -> Result<ObjectId> {
        self.session
            .site_layout(site_node)
            .ok_or_else(|| MapperError::MissingComponent(site_node.clone()))
    }

    fn resolve_page(&self, page_ref: &PageRef) -> Result<ObjectId> {
        let site_node = self.site_node(&page_ref.site)?;
        self.session
            .find_page(&site_node, &page_ref.page)
            .ok_or_else(|| MapperError::MissingPage(page_ref.clone()))
    }

    /// Reject a model claiming an id other than the node it is saved onto.
    fn check_target(&self, storage: &StorageId, target: &ObjectId) -> Result<()> {
        match storage.existing() {
            Some(model) if model != target => Err(MapperError::WrongTarget {
                target: target.clone(),
                model: model.clone(),
            }),
            _ => Ok(()),
        }
    }

    // ── Portals ────────────────────────────────────────

    /// Load a site and its root layout.
    pub fn load_portal(&self, site: &SiteRef) -> Result<Portal> {
        let node = self.site_node(site)?;
        let layout = self.layout_node(&node)?;
        Ok(Portal {
            storage: StorageId::Existing(node.clone()),
            site: site.clone(),
            locale: self.read(&node, keys::LOCALE),
            access_permissions: split_permissions(self.read(&node, keys::ACCESS_PERMISSIONS)),
            edit_permission: self.read(&node, keys::EDIT_PERMISSION),
            properties: self.load_properties(&node, &SITE_RESERVED),
            skin: self.read(&node, keys::SKIN),
            title: self.read(&node, keys::TITLE),
            layout: self.load_container(&layout)?,
            creator: self.read(&node, keys::CREATOR),
            modifier: self.read(&node, keys::MODIFIER),
        })
    }

    /// Save a site against its tree location and report the changes.
    pub fn save_portal(&mut self, portal: &Portal) -> Result<Vec<ModelChange>> {
        let node = self.site_node(&portal.site)?;
        self.check_target(&portal.storage, &node)?;
        let layout = self.layout_node(&node)?;
        tracing::debug!("saving portal {}", portal.site);

        let snapshot = Snapshot::build(&portal.layout.children, &layout)?;
        let mut ctx = SaveContext::default();

        let mut changed = false;
        changed |= self.write(&node, keys::LOCALE, portal.locale.clone());
        changed |= self.write(
            &node,
            keys::ACCESS_PERMISSIONS,
            join_permissions(&portal.access_permissions),
        );
        changed |= self.write(&node, keys::EDIT_PERMISSION, portal.edit_permission.clone());
        changed |= self.write(&node, keys::SKIN, portal.skin.clone());
        changed |= self.write(&node, keys::TITLE, portal.title.clone());
        changed |= self.write(&node, keys::CREATOR, portal.creator.clone());
        changed |= self.write(&node, keys::MODIFIER, portal.modifier.clone());
        changed |= self.save_properties(&node, &portal.properties, &SITE_RESERVED);
        if changed {
            ctx.record_update(&node);
        }

        self.save_container(&portal.layout, &layout, &snapshot, &mut ctx)?;
        Ok(ctx.changes)
    }

    // ── Pages ──────────────────────────────────────────

    /// Load a page and its top-level components.
    pub fn load_page(&self, page_ref: &PageRef) -> Result<Page> {
        let node = self.resolve_page(page_ref)?;
        let container = self
            .session
            .page_container(&node)
            .ok_or_else(|| MapperError::MissingComponent(node.clone()))?;
        Ok(Page {
            storage: StorageId::Existing(node.clone()),
            name: page_ref.page.clone(),
            owner: page_ref.site.clone(),
            factory_id: self.read(&node, keys::FACTORY_ID),
            title: self.read(&node, keys::TITLE),
            access_permissions: split_permissions(self.read(&node, keys::ACCESS_PERMISSIONS)),
            edit_permission: self.read(&node, keys::EDIT_PERMISSION),
            show_max_window: self.read(&node, keys::SHOW_MAX_WINDOW).unwrap_or(false),
            creator: self.read(&node, keys::CREATOR),
            modifier: self.read(&node, keys::MODIFIER),
            children: self.load_children(&container)?,
        })
    }

    /// Save a page under its owner site, creating it when absent.
    pub fn save_page(&mut self, page: &Page) -> Result<Vec<ModelChange>> {
        let site_node = self.site_node(&page.owner)?;
        tracing::debug!("saving page {} of {}", page.name, page.owner);

        let mut ctx = SaveContext::default();
        let node = match self.session.find_page(&site_node, &page.name) {
            Some(existing) => {
                self.check_target(&page.storage, &existing)?;
                existing
            }
            None => {
                let created = self.session.create_page(&site_node, &page.name);
                ctx.record_create(&created);
                created
            }
        };

        let mut changed = false;
        changed |= self.write(&node, keys::TITLE, page.title.clone());
        changed |= self.write(&node, keys::FACTORY_ID, page.factory_id.clone());
        changed |= self.write(
            &node,
            keys::ACCESS_PERMISSIONS,
            join_permissions(&page.access_permissions),
        );
        changed |= self.write(&node, keys::EDIT_PERMISSION, page.edit_permission.clone());
        changed |= self.write(&node, keys::SHOW_MAX_WINDOW, Some(page.show_max_window));
        changed |= self.write(&node, keys::CREATOR, page.creator.clone());
        changed |= self.write(&node, keys::MODIFIER, page.modifier.clone());
        if changed {
            ctx.record_update(&node);
        }

        let container = self
            .session
            .page_container(&node)
            .ok_or_else(|| MapperError::MissingComponent(node.clone()))?;
        let snapshot = Snapshot::build(&page.children, &container)?;
        self.save_children(&page.children, &container, &node, &snapshot, &mut ctx)?;
        Ok(ctx.changes)
    }

    // ── Dashboards ─────────────────────────────────────

    /// Load a dashboard container by its node id.
    pub fn load_dashboard(&self, id: &ObjectId) -> Result<Container> {
        let node = self.checked_node(id, NodeKind::Container, "container")?;
        let mut dashboard = self.load_container(&node)?;
        dashboard.kind = ContainerKind::Dashboard;
        Ok(dashboard)
    }

    /// Save a dashboard onto its container node and report the changes.
    pub fn save_dashboard(&mut self, dashboard: &Container, id: &ObjectId) -> Result<Vec<ModelChange>> {
        let node = self.checked_node(id, NodeKind::Container, "container")?;
        self.check_target(&dashboard.storage, &node)?;
        tracing::debug!("saving dashboard {}", self.session.node_path(&node));

        let snapshot = Snapshot::build(&dashboard.children, &node)?;
        let mut ctx = SaveContext::default();
        // The marker kind survives whatever the model claims.
        let mut dashboard = dashboard.clone();
        dashboard.kind = ContainerKind::Dashboard;
        self.save_container(&dashboard, &node, &snapshot, &mut ctx)?;
        Ok(ctx.changes)
    }

    // ── Navigation ─────────────────────────────────────

    /// Load a site's navigation tree.
    pub fn load_navigation(&self, site: &SiteRef) -> Result<Navigation> {
        let site_node = self.site_node(site)?;
        let root = self
            .session
            .site_navigation(&site_node)
            .ok_or_else(|| MapperError::MissingComponent(site_node.clone()))?;
        Ok(Navigation {
            storage: StorageId::Existing(root.clone()),
            site: site.clone(),
            description: self.read(&root, keys::DESCRIPTION),
            creator: self.read(&root, keys::CREATOR),
            modifier: self.read(&root, keys::MODIFIER),
            priority: self.read(&root, keys::PRIORITY).unwrap_or(1),
            children: self.load_nav_children(&root)?,
        })
    }

    /// Save a site's navigation tree and report the changes.
    pub fn save_navigation(&mut self, nav: &Navigation) -> Result<Vec<ModelChange>> {
        let site_node = self.site_node(&nav.site)?;
        let root = self
            .session
            .site_navigation(&site_node)
            .ok_or_else(|| MapperError::MissingComponent(site_node.clone()))?;
        self.check_target(&nav.storage, &root)?;
        tracing::debug!("saving navigation of {}", nav.site);

        let mut ctx = SaveContext::default();
        let mut changed = false;
        changed |= self.write(&root, keys::PRIORITY, Some(nav.priority));
        changed |= self.write(&root, keys::CREATOR, nav.creator.clone());
        changed |= self.write(&root, keys::MODIFIER, nav.modifier.clone());
        changed |= self.write(&root, keys::DESCRIPTION, nav.description.clone());
        if changed {
            ctx.record_update(&root);
        }

        self.save_nav_children(&nav.children, &root, &mut ctx)?;
        Ok(ctx.changes)
    }

    fn load_nav_children(&self, node: &ObjectId) -> Result<Vec<NavNode>> {
        let mut out = Vec::new();
        for child in self.session.children(node) {
            out.push(self.load_nav_node(&child)?);
        }
        Ok(out)
    }

    fn load_nav_node(&self, node: &ObjectId) -> Result<NavNode> {
        let name = self
            .session
            .node_name(node)
            .ok_or_else(|| MapperError::MissingComponent(node.clone()))?;
        // A link whose target page is gone reads as no link at all.
        let page = self
            .session
            .page_link(node)
            .and_then(|page_node| self.page_ref_of(&page_node));
        Ok(NavNode {
            storage: StorageId::Existing(node.clone()),
            name,
            uri: self.read(node, keys::URI),
            label: self.read(node, keys::LABEL),
            icon: self.read(node, keys::ICON),
            start_publication: self.read(node, keys::START_PUBLICATION_DATE),
            end_publication: self.read(node, keys::END_PUBLICATION_DATE),
            show_publication_date: self.read(node, keys::SHOW_PUBLICATION_DATE).unwrap_or(false),
            visible: self.read(node, keys::VISIBLE).unwrap_or(true),
            page,
            children: self.load_nav_children(node)?,
        })
    }

    fn page_ref_of(&self, page_node: &ObjectId) -> Option<PageRef> {
        let name = self.session.node_name(page_node)?;
        let site_node = self.session.site_of(page_node)?;
        let site = self.session.site_ref(&site_node)?;
        Some(PageRef::new(site, name))
    }

    fn save_nav_children(
        &mut self,
        children: &[NavNode],
        dst: &ObjectId,
        ctx: &mut SaveContext,
    ) -> Result<()> {
        // Sibling names must be unique before anything is touched.
        let mut names = HashSet::new();
        for child in children {
            if !names.insert(child.name.as_str()) {
                return Err(MapperError::DuplicateName {
                    name: child.name.clone(),
                    path: self.session.node_path(dst),
                });
            }
        }

        let mut saved = HashSet::new();
        for child in children {
            saved.insert(self.save_nav_node(child, dst, ctx)?);
        }

        // Orphan sweep: tree children the model no longer lists.
        for existing in self.session.children(dst) {
            if !saved.contains(&existing) {
                tracing::debug!("destroying navigation node {}", self.session.node_path(&existing));
                self.session.remove_child(dst, &existing);
                ctx.record_destroy(&existing);
            }
        }
        Ok(())
    }

    fn save_nav_node(
        &mut self,
        node: &NavNode,
        dst: &ObjectId,
        ctx: &mut SaveContext,
    ) -> Result<ObjectId> {
        let target = match &node.storage {
            StorageId::Existing(id) => self.checked_node(id, NodeKind::Navigation, "navigation")?,
            StorageId::New => match self.session.child_by_name(dst, &node.name) {
                Some(existing) => existing,
                None => {
                    let created = self.session.create_child(dst, NodeKind::Navigation, &node.name);
                    ctx.record_create(&created);
                    created
                }
            },
        };

        let mut changed = false;
        changed |= self.write(&target, keys::URI, node.uri.clone());
        changed |= self.write(&target, keys::LABEL, node.label.clone());
        changed |= self.write(&target, keys::ICON, node.icon.clone());
        changed |= self.write(&target, keys::START_PUBLICATION_DATE, node.start_publication);
        changed |= self.write(&target, keys::END_PUBLICATION_DATE, node.end_publication);
        changed |= self.write(
            &target,
            keys::SHOW_PUBLICATION_DATE,
            Some(node.show_publication_date),
        );
        changed |= self.write(&target, keys::VISIBLE, Some(node.visible));

        // The link is only ever written, never cleared, and only when the
        // model names a page that actually exists.
        if let Some(page_ref) = &node.page {
            let page_node = self.resolve_page(page_ref)?;
            if self.session.page_link(&target).as_ref() != Some(&page_node) {
                self.session.set_page_link(&target, &page_node);
                changed = true;
            }
        }
        if changed {
            ctx.record_update(&target);
        }

        self.save_nav_children(&node.children, &target, ctx)?;
        Ok(target)
    }

    // ── Layout load ────────────────────────────────────

    fn load_children(&self, node: &ObjectId) -> Result<Vec<Component>> {
        let mut out = Vec::new();
        for child in self.session.children(node) {
            let kind = self
                .session
                .node_kind(&child)
                .ok_or_else(|| MapperError::MissingComponent(child.clone()))?;
            let component = match kind {
                NodeKind::Container if self.is_dashboard_node(&child) => {
                    Component::Window(self.promote_dashboard(&child)?)
                }
                NodeKind::Container => Component::Container(self.load_container(&child)?),
                NodeKind::Window => Component::Window(self.load_window(&child)?),
                NodeKind::Body => Component::Body(self.load_body(&child)),
                other => {
                    return Err(MapperError::UnexpectedKind {
                        wanted: "component",
                        actual: other.as_str(),
                        path: self.session.node_path(&child),
                    })
                }
            };
            out.push(component);
        }
        Ok(out)
    }

    fn is_dashboard_node(&self, node: &ObjectId) -> bool {
        self.read(node, keys::TYPE).as_deref() == Some("dashboard")
    }

    /// A dashboard container loads as a placeholder window bound to the
    /// dashboard sentinel; its own subtree is not walked.
    fn promote_dashboard(&self, node: &ObjectId) -> Result<Window> {
        let site_node = self
            .session
            .site_of(node)
            .ok_or_else(|| MapperError::MissingComponent(node.clone()))?;
        let owner = self
            .session
            .site_ref(&site_node)
            .ok_or_else(|| MapperError::MissingComponent(site_node.clone()))?;

        let mut window = Window::of(AppRef::dashboard());
        window.storage = StorageId::Existing(node.clone());
        window.storage_name = self.session.node_name(node);
        window.state = AppState::Transient(TransientState {
            owner: Some(owner),
            unique_id: None,
            content_state: None,
        });
        window.access_permissions = vec![EVERYONE.to_string()];
        Ok(window)
    }

    fn load_container(&self, node: &ObjectId) -> Result<Container> {
        Ok(Container {
            storage: StorageId::Existing(node.clone()),
            storage_name: self.session.node_name(node),
            kind: if self.is_dashboard_node(node) {
                ContainerKind::Dashboard
            } else {
                ContainerKind::Normal
            },
            id: self.read(node, keys::ID),
            name: self.read(node, keys::NAME),
            icon: self.read(node, keys::ICON),
            decorator: self.read(node, keys::DECORATOR),
            template: self.read(node, keys::TEMPLATE),
            factory_id: self.read(node, keys::FACTORY_ID),
            title: self.read(node, keys::TITLE),
            description: self.read(node, keys::DESCRIPTION),
            width: self.read(node, keys::WIDTH),
            height: self.read(node, keys::HEIGHT),
            access_permissions: split_permissions(self.read(node, keys::ACCESS_PERMISSIONS)),
            children: self.load_children(node)?,
        })
    }

    fn load_window(&self, node: &ObjectId) -> Result<Window> {
        let customization_id = self
            .session
            .window_customization(node)
            .ok_or_else(|| MapperError::Uncustomized(node.clone()))?;
        let customization = self
            .session
            .customization(&customization_id)
            .ok_or_else(|| MapperError::MissingCustomization(customization_id.clone()))?;
        let content = AppRef::decode(customization.content_type, &customization.content_id)?;

        Ok(Window {
            storage: StorageId::Existing(node.clone()),
            storage_name: self.session.node_name(node),
            content,
            state: AppState::Persistent(customization_id),
            title: self.read(node, keys::TITLE),
            icon: self.read(node, keys::ICON),
            description: self.read(node, keys::DESCRIPTION),
            show_info_bar: self.read(node, keys::SHOW_INFO_BAR).unwrap_or(false),
            show_state: self.read(node, keys::SHOW_STATE).unwrap_or(false),
            show_mode: self.read(node, keys::SHOW_MODE).unwrap_or(false),
            theme: self.read(node, keys::THEME),
            width: self.read(node, keys::WIDTH),
            height: self.read(node, keys::HEIGHT),
            properties: self.load_properties(node, &WINDOW_RESERVED),
            access_permissions: split_permissions(self.read(node, keys::ACCESS_PERMISSIONS)),
        })
    }

    fn load_body(&self, node: &ObjectId) -> Body {
        Body {
            storage: StorageId::Existing(node.clone()),
            storage_name: self.session.node_name(node),
            body_type: BodyType::Page,
        }
    }

    /// String attributes outside the reserved set become properties.
    fn load_properties(&self, node: &ObjectId, reserved: &[&str]) -> BTreeMap<String, String> {
        let mut properties = BTreeMap::new();
        for name in self.session.attr_names(node) {
            if reserved.contains(&name.as_str()) {
                continue;
            }
            if let Some(AttrValue::String(value)) = self.session.attr(node, &name) {
                properties.insert(name, value);
            }
        }
        properties
    }

    // ── Layout save ────────────────────────────────────

    /// Reconcile one container level: upsert in model order, move strays
    /// out, delete the unclaimed, then restore exact model order.
    fn save_children(
        &mut self,
        children: &[Component],
        dst: &ObjectId,
        blame: &ObjectId,
        snapshot: &Snapshot,
        ctx: &mut SaveContext,
    ) -> Result<()> {
        let before = self.session.children(dst);

        // Upsert pass, in model order. Dashboard placeholders persist as
        // containers, so the real dashboard is swapped in before saving.
        let mut desired = Vec::with_capacity(children.len());
        for child in children {
            let substituted;
            let child = match child {
                Component::Window(w) if w.content.is_dashboard() => {
                    substituted = Component::Container(match w.storage.existing() {
                        Some(id) => self.load_dashboard(id)?,
                        None => Container::empty_dashboard(),
                    });
                    &substituted
                }
                other => other,
            };
            desired.push(self.save_component(child, dst, snapshot, ctx)?);
        }

        // Move-out pass: children the model reparents under another
        // persisted container go there now. No destroy is recorded; the
        // node's update lands when its new parent saves it.
        let saved: HashSet<ObjectId> = desired.iter().cloned().collect();
        for child in self.session.children(dst) {
            if saved.contains(&child) {
                continue;
            }
            if let Some(new_parent) = snapshot.parents.get(&child) {
                let parent_node = self
                    .session
                    .find_node(NodeKind::Container, new_parent)
                    .ok_or_else(|| MapperError::MissingComponent(new_parent.clone()))?;
                tracing::debug!("moving {} to {}", child, self.session.node_path(&parent_node));
                self.session.move_child(&parent_node, &child);
                ctx.record_move(&child);
            }
        }

        // Delete pass: whatever is left and not claimed anywhere in the
        // model goes away, subtree and all.
        for child in self.session.children(dst) {
            if saved.contains(&child) || snapshot.claimed.contains(&child) {
                continue;
            }
            tracing::debug!("destroying {}", self.session.node_path(&child));
            self.session.remove_child(dst, &child);
            ctx.record_destroy(&child);
        }

        // Reorder pass: exact model order, child by child.
        let current = self.session.children(dst);
        if current != desired {
            for (index, child) in desired.iter().enumerate() {
                self.session.insert_child_at(dst, index, child);
            }
        }
        if before != desired {
            ctx.record_update(blame);
        }
        Ok(())
    }

    fn save_component(
        &mut self,
        child: &Component,
        dst: &ObjectId,
        snapshot: &Snapshot,
        ctx: &mut SaveContext,
    ) -> Result<ObjectId> {
        let kind = match child {
            Component::Container(_) => NodeKind::Container,
            Component::Window(_) => NodeKind::Window,
            Component::Body(_) => NodeKind::Body,
        };

        let node = match child.storage() {
            StorageId::Existing(id) => {
                let node = self.checked_node(id, kind, child.kind_name())?;
                if self.session.parent_of(&node).as_ref() != Some(dst) {
                    // A child may only move in when the snapshot placed it
                    // under some persisted parent.
                    if !snapshot.parents.contains_key(&node) {
                        return Err(MapperError::StrayComponent {
                            id: node,
                            path: self.session.node_path(dst),
                        });
                    }
                    tracing::debug!("moving {} under {}", node, self.session.node_path(dst));
                    self.session.move_child(dst, &node);
                    ctx.record_move(&node);
                }
                node
            }
            StorageId::New => {
                let name = match child.storage_name() {
                    Some(name) => {
                        if self.session.child_by_name(dst, name).is_some() {
                            return Err(MapperError::DuplicateName {
                                name: name.to_string(),
                                path: self.session.node_path(dst),
                            });
                        }
                        name.to_string()
                    }
                    None => uuid::Uuid::new_v4().to_string(),
                };
                let node = self.session.create_child(dst, kind, &name);
                ctx.record_create(&node);
                node
            }
        };

        match child {
            Component::Container(c) => self.save_container(c, &node, snapshot, ctx)?,
            Component::Window(w) => self.save_window(w, &node, ctx)?,
            // Bodies carry no scalars, but a moved one still reports itself.
            Component::Body(_) => {
                if ctx.was_moved(&node) {
                    ctx.record_update(&node);
                }
            }
        }
        Ok(node)
    }

    fn save_container(
        &mut self,
        container: &Container,
        node: &ObjectId,
        snapshot: &Snapshot,
        ctx: &mut SaveContext,
    ) -> Result<()> {
        let mut changed = false;
        changed |= self.write(node, keys::ID, container.id.clone());
        changed |= self.write(
            node,
            keys::TYPE,
            match container.kind {
                ContainerKind::Dashboard => Some("dashboard".to_string()),
                ContainerKind::Normal => None,
            },
        );
        changed |= self.write(node, keys::TITLE, container.title.clone());
        changed |= self.write(node, keys::ICON, container.icon.clone());
        changed |= self.write(node, keys::TEMPLATE, container.template.clone());
        changed |= self.write(
            node,
            keys::ACCESS_PERMISSIONS,
            join_permissions(&container.access_permissions),
        );
        changed |= self.write(node, keys::FACTORY_ID, container.factory_id.clone());
        changed |= self.write(node, keys::DECORATOR, container.decorator.clone());
        changed |= self.write(node, keys::DESCRIPTION, container.description.clone());
        changed |= self.write(node, keys::WIDTH, container.width.clone());
        changed |= self.write(node, keys::HEIGHT, container.height.clone());
        changed |= self.write(node, keys::NAME, container.name.clone());
        if changed || ctx.was_moved(node) {
            ctx.record_update(node);
        }

        self.save_children(&container.children, node, node, snapshot, ctx)
    }

    fn save_window(&mut self, window: &Window, node: &ObjectId, ctx: &mut SaveContext) -> Result<()> {
        let mut changed = false;
        changed |= self.write(node, keys::THEME, window.theme.clone());
        changed |= self.write(node, keys::TITLE, window.title.clone());
        changed |= self.write(
            node,
            keys::ACCESS_PERMISSIONS,
            join_permissions(&window.access_permissions),
        );
        changed |= self.write(node, keys::SHOW_INFO_BAR, Some(window.show_info_bar));
        changed |= self.write(node, keys::SHOW_STATE, Some(window.show_state));
        changed |= self.write(node, keys::SHOW_MODE, Some(window.show_mode));
        changed |= self.write(node, keys::DESCRIPTION, window.description.clone());
        changed |= self.write(node, keys::ICON, window.icon.clone());
        changed |= self.write(node, keys::WIDTH, window.width.clone());
        changed |= self.write(node, keys::HEIGHT, window.height.clone());
        changed |= self.save_properties(node, &window.properties, &WINDOW_RESERVED);
        changed |= self.save_window_state(window, node)?;
        if changed || ctx.was_moved(node) {
            ctx.record_update(node);
        }
        Ok(())
    }

    /// Make the properties map authoritative for the node's non-reserved
    /// string attributes: write every entry, clear every straggler.
    fn save_properties(
        &mut self,
        node: &ObjectId,
        properties: &BTreeMap<String, String>,
        reserved: &[&str],
    ) -> bool {
        let mut changed = false;
        for name in self.session.attr_names(node) {
            if reserved.contains(&name.as_str()) || properties.contains_key(&name) {
                continue;
            }
            if matches!(self.session.attr(node, &name), Some(AttrValue::String(_))) {
                changed |= self.session.set_attr(node, &name, None);
            }
        }
        for (name, value) in properties {
            if reserved.contains(&name.as_str()) {
                continue;
            }
            changed |= self
                .session
                .set_attr(node, name, Some(AttrValue::String(value.clone())));
        }
        changed
    }

    // ── Customization resolver ─────────────────────────

    /// Turn a window's transient state into a durable customization.
    /// Persistent state passes through untouched.
    fn save_window_state(&mut self, window: &Window, node: &ObjectId) -> Result<bool> {
        let state = match &window.state {
            AppState::Persistent(_) => return Ok(false),
            AppState::Transient(state) => state,
        };

        let current_site = self
            .session
            .site_of(node)
            .ok_or_else(|| MapperError::MissingComponent(node.clone()))?;

        // The window's own site counts as "no explicit owner", and so does
        // an owner naming a site that does not exist.
        let resolved_site = state
            .owner
            .as_ref()
            .and_then(|owner| self.session.find_site(owner))
            .filter(|site_node| *site_node != current_site);

        let content_type = window.content.content_type();
        let content_id = window.content.content_id();

        // The unique id picks the customization to inherit from.
        let candidate: Option<CustomizationId> = match state.unique_id.as_deref() {
            Some(unique_id) => {
                if let Some(window_ref) = unique_id.strip_prefix('@') {
                    // Another window's customization; pointing a window at
                    // itself means nothing to inherit.
                    let other = ObjectId::from(window_ref);
                    if other == *node {
                        None
                    } else {
                        let other_node = self.checked_node(&other, NodeKind::Window, "window")?;
                        self.session.window_customization(&other_node)
                    }
                } else if let Some((key, page_name)) = unique_id.split_once('#') {
                    // A page customization within the resolved site.
                    let site_node = resolved_site.clone().unwrap_or_else(|| current_site.clone());
                    let site = self
                        .session
                        .site_ref(&site_node)
                        .ok_or_else(|| MapperError::MissingComponent(site_node.clone()))?;
                    let page_ref = PageRef::new(site, page_name);
                    let page_node = self
                        .session
                        .find_page(&site_node, page_name)
                        .ok_or_else(|| MapperError::MissingPage(page_ref))?;
                    self.session.page_customization(&page_node, key)
                } else {
                    // A site customization; within the current site it is
                    // created on first use.
                    match &resolved_site {
                        Some(site_node) => self.session.site_customization(site_node, unique_id),
                        None => Some(match self.session.site_customization(&current_site, unique_id) {
                            Some(existing) => existing,
                            None => self.session.customize_site(
                                &current_site,
                                unique_id,
                                content_type,
                                &content_id,
                                None,
                            ),
                        }),
                    }
                }
            }
            None => None,
        };

        // Whatever the window held before is gone either way.
        self.session.destroy_window_customization(node);

        let attached = match candidate {
            Some(candidate_id) => {
                let record = self
                    .session
                    .customization(&candidate_id)
                    .ok_or_else(|| MapperError::MissingCustomization(candidate_id.clone()))?;
                if record.content_type == content_type && record.content_id == content_id {
                    let same_site = matches!(
                        &record.context,
                        CustomizationContext::Site(owner) if *owner == current_site
                    );
                    if same_site {
                        // Share live state with the site customization.
                        self.session
                            .extend_window_customization(node, &candidate_id)
                            .ok_or_else(|| MapperError::MissingCustomization(candidate_id))?
                    } else {
                        // Snapshot the foreign state into an own record.
                        let virtual_state = self.session.customization_state(&candidate_id);
                        self.session
                            .customize_window(node, content_type, &content_id, virtual_state)
                    }
                } else {
                    self.session
                        .customize_window(node, content_type, &content_id, None)
                }
            }
            None => self
                .session
                .customize_window(node, content_type, &content_id, None),
        };

        // Inline payload wins last.
        if let Some(payload) = &state.content_state {
            self.session.set_customization_state(&attached, payload.clone());
        }
        Ok(true)
    }

    /// Find a node by id and insist on its kind.
    fn checked_node(&self, id: &ObjectId, kind: NodeKind, wanted: &'static str) -> Result<ObjectId> {
        let actual = self
            .session
            .node_kind(id)
            .ok_or_else(|| MapperError::MissingComponent(id.clone()))?;
        if actual != kind {
            return Err(MapperError::UnexpectedKind {
                wanted,
                actual: actual.as_str(),
                path: self.session.node_path(id),
            });
        }
        Ok(id.clone())
    }
}

fn join_permissions(permissions: &[String]) -> Option<String> {
    if permissions.is_empty() {
        None
    } else {
        Some(permissions.join("|"))
    }
}

fn split_permissions(joined: Option<String>) -> Vec<String> {
    match joined {
        Some(s) if !s.is_empty() => s.split('|').map(str::to_string).collect(),
        _ => Vec::new(),
    }
}
