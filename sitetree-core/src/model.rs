//! Domain model
//!
//! Value objects the mapper moves between callers and the content tree:
//! sites, pages, navigation trees, and the layout component hierarchy.
//! Storage identity is explicit: [`StorageId::New`] marks a value not yet
//! persisted, [`StorageId::Existing`] carries the store-assigned id.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::session::{CustomizationId, ObjectId};

/// The open access permission.
pub const EVERYONE: &str = "Everyone";

/// Result type for wire-format parsing.
pub type ParseResult<T> = std::result::Result<T, ParseError>;

/// Errors from parsing the model's wire formats.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseError {
    #[error("invalid site type: {0}")]
    InvalidSiteType(String),

    #[error("malformed page reference: {0}")]
    MalformedPageRef(String),

    #[error("malformed window id: {0}")]
    MalformedWindowId(String),

    #[error("malformed content id: {0}")]
    MalformedContentId(String),
}

/// Storage identity of a model value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StorageId {
    /// Not yet persisted; the store assigns an id on save.
    New,
    /// Persisted under this id.
    Existing(ObjectId),
}

impl StorageId {
    /// The id, when persisted.
    pub fn existing(&self) -> Option<&ObjectId> {
        match self {
            StorageId::New => None,
            StorageId::Existing(id) => Some(id),
        }
    }

    pub fn is_new(&self) -> bool {
        matches!(self, StorageId::New)
    }
}

impl Default for StorageId {
    fn default() -> Self {
        StorageId::New
    }
}

// ─────────────────────────────────────────────────────
// Site addressing
// ─────────────────────────────────────────────────────

/// The three site kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SiteType {
    Portal,
    Group,
    User,
}

impl SiteType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SiteType::Portal => "portal",
            SiteType::Group => "group",
            SiteType::User => "user",
        }
    }
}

impl fmt::Display for SiteType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SiteType {
    type Err = ParseError;

    fn from_str(s: &str) -> ParseResult<Self> {
        match s {
            "portal" => Ok(SiteType::Portal),
            "group" => Ok(SiteType::Group),
            "user" => Ok(SiteType::User),
            other => Err(ParseError::InvalidSiteType(other.to_string())),
        }
    }
}

/// A site, addressed by kind and name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SiteRef {
    pub kind: SiteType,
    pub name: String,
}

impl SiteRef {
    pub fn new(kind: SiteType, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }

    /// Shorthand for a portal site.
    pub fn portal(name: impl Into<String>) -> Self {
        Self::new(SiteType::Portal, name)
    }
}

impl fmt::Display for SiteRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.name)
    }
}

impl FromStr for SiteRef {
    type Err = ParseError;

    fn from_str(s: &str) -> ParseResult<Self> {
        let (kind, name) = s
            .split_once('/')
            .ok_or_else(|| ParseError::InvalidSiteType(s.to_string()))?;
        Ok(Self {
            kind: kind.parse()?,
            name: name.to_string(),
        })
    }
}

/// A page of a site, in the `type::name::page` wire form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageRef {
    pub site: SiteRef,
    pub page: String,
}

impl PageRef {
    pub fn new(site: SiteRef, page: impl Into<String>) -> Self {
        Self {
            site,
            page: page.into(),
        }
    }
}

impl fmt::Display for PageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}::{}", self.site.kind, self.site.name, self.page)
    }
}

impl FromStr for PageRef {
    type Err = ParseError;

    fn from_str(s: &str) -> ParseResult<Self> {
        let chunks: Vec<&str> = s.split("::").collect();
        let [kind, name, page] = chunks[..] else {
            return Err(ParseError::MalformedPageRef(s.to_string()));
        };
        Ok(Self {
            site: SiteRef::new(kind.parse::<SiteType>()?, name),
            page: page.to_string(),
        })
    }
}

/// A window address in the `ownerType#ownerId:/rest` wire form.
///
/// Parsing is positional: the first `#`, then the first `:/` after it. The
/// `rest` part is carried verbatim so formatting reproduces the input
/// byte for byte.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WindowId {
    pub site: SiteRef,
    pub rest: String,
}

impl WindowId {
    pub fn new(site: SiteRef, rest: impl Into<String>) -> Self {
        Self {
            site,
            rest: rest.into(),
        }
    }

    /// Split `rest` on its first `/` into up to two chunks.
    pub fn rest_chunks(&self) -> (&str, Option<&str>) {
        match self.rest.split_once('/') {
            Some((head, tail)) => (head, Some(tail)),
            None => (self.rest.as_str(), None),
        }
    }
}

impl fmt::Display for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}:/{}", self.site.kind, self.site.name, self.rest)
    }
}

impl FromStr for WindowId {
    type Err = ParseError;

    fn from_str(s: &str) -> ParseResult<Self> {
        let hash = s
            .find('#')
            .ok_or_else(|| ParseError::MalformedWindowId(s.to_string()))?;
        let sep = s[hash + 1..]
            .find(":/")
            .map(|i| hash + 1 + i)
            .ok_or_else(|| ParseError::MalformedWindowId(s.to_string()))?;
        Ok(Self {
            site: SiteRef::new(s[..hash].parse::<SiteType>()?, &s[hash + 1..sep]),
            rest: s[sep + 2..].to_string(),
        })
    }
}

// ─────────────────────────────────────────────────────
// Navigation
// ─────────────────────────────────────────────────────

/// A node of a navigation tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavNode {
    #[serde(default)]
    pub storage: StorageId,
    /// Storage name, unique among siblings.
    pub name: String,
    #[serde(default)]
    pub uri: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub start_publication: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_publication: Option<DateTime<Utc>>,
    #[serde(default)]
    pub show_publication_date: bool,
    #[serde(default = "default_true")]
    pub visible: bool,
    /// Page this node links to, if any. A dangling link loads as `None`.
    #[serde(default)]
    pub page: Option<PageRef>,
    #[serde(default)]
    pub children: Vec<NavNode>,
}

impl NavNode {
    /// A bare node with the given name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            storage: StorageId::New,
            name: name.into(),
            uri: None,
            label: None,
            icon: None,
            start_publication: None,
            end_publication: None,
            show_publication_date: false,
            visible: true,
            page: None,
            children: Vec::new(),
        }
    }
}

/// A site's navigation tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Navigation {
    #[serde(default)]
    pub storage: StorageId,
    pub site: SiteRef,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub creator: Option<String>,
    #[serde(default)]
    pub modifier: Option<String>,
    #[serde(default = "default_priority")]
    pub priority: i32,
    #[serde(default)]
    pub children: Vec<NavNode>,
}

impl Navigation {
    /// An empty navigation for a site.
    pub fn empty(site: SiteRef) -> Self {
        Self {
            storage: StorageId::New,
            site,
            description: None,
            creator: None,
            modifier: None,
            priority: 1,
            children: Vec::new(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_priority() -> i32 {
    1
}

// ─────────────────────────────────────────────────────
// Layout components
// ─────────────────────────────────────────────────────

/// Container kinds. Dashboards are ordinary containers with a marker kind;
/// the mapper promotes them to window placeholders on load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerKind {
    #[default]
    Normal,
    Dashboard,
}

/// A layout container.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Container {
    #[serde(default)]
    pub storage: StorageId,
    /// Storage name; generated when absent on creation.
    #[serde(default)]
    pub storage_name: Option<String>,
    #[serde(default)]
    pub kind: ContainerKind,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub decorator: Option<String>,
    #[serde(default)]
    pub template: Option<String>,
    #[serde(default)]
    pub factory_id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub width: Option<String>,
    #[serde(default)]
    pub height: Option<String>,
    #[serde(default)]
    pub access_permissions: Vec<String>,
    #[serde(default)]
    pub children: Vec<Component>,
}

impl Container {
    /// The canonical empty dashboard, used when a dashboard placeholder is
    /// saved for the first time.
    pub fn empty_dashboard() -> Self {
        Self {
            kind: ContainerKind::Dashboard,
            ..Self::default()
        }
    }
}

/// Content kinds a window can bind to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Portlet,
    Gadget,
    Wsrp,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Portlet => "portlet",
            ContentType::Gadget => "gadget",
            ContentType::Wsrp => "wsrp",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed content reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppRef {
    Portlet { application: String, portlet: String },
    Gadget { name: String },
    Wsrp { uri: String },
}

impl AppRef {
    /// The placeholder reference marking "this slot holds a dashboard".
    pub fn dashboard() -> Self {
        AppRef::Portlet {
            application: "dashboard".to_string(),
            portlet: "DashboardPortlet".to_string(),
        }
    }

    pub fn is_dashboard(&self) -> bool {
        matches!(
            self,
            AppRef::Portlet { application, portlet }
                if application == "dashboard" && portlet == "DashboardPortlet"
        )
    }

    /// The content kind this reference binds.
    pub fn content_type(&self) -> ContentType {
        match self {
            AppRef::Portlet { .. } => ContentType::Portlet,
            AppRef::Gadget { .. } => ContentType::Gadget,
            AppRef::Wsrp { .. } => ContentType::Wsrp,
        }
    }

    /// The content id stored on a customization record.
    pub fn content_id(&self) -> String {
        match self {
            AppRef::Portlet { application, portlet } => format!("{}/{}", application, portlet),
            AppRef::Gadget { name } => name.clone(),
            AppRef::Wsrp { uri } => uri.clone(),
        }
    }

    /// Rebuild a reference from a customization record's type and content id.
    pub fn decode(content_type: ContentType, content_id: &str) -> ParseResult<Self> {
        match content_type {
            ContentType::Portlet => {
                let (application, portlet) = content_id
                    .split_once('/')
                    .ok_or_else(|| ParseError::MalformedContentId(content_id.to_string()))?;
                Ok(AppRef::Portlet {
                    application: application.to_string(),
                    portlet: portlet.to_string(),
                })
            }
            ContentType::Gadget => Ok(AppRef::Gadget {
                name: content_id.to_string(),
            }),
            ContentType::Wsrp => Ok(AppRef::Wsrp {
                uri: content_id.to_string(),
            }),
        }
    }
}

/// In-memory description of a window's content binding, consumed by the
/// customization resolver on save.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransientState {
    /// Originating site; the current site when absent.
    #[serde(default)]
    pub owner: Option<SiteRef>,
    /// Customization key: `@window-id`, a bare site key, or `key#page`.
    #[serde(default)]
    pub unique_id: Option<String>,
    /// Inline state merged into the attached customization.
    #[serde(default)]
    pub content_state: Option<serde_json::Value>,
}

/// A window's content state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AppState {
    /// Not yet durable; resolved into a customization on save.
    Transient(TransientState),
    /// A stable customization id; passed through untouched on save.
    Persistent(CustomizationId),
}

impl Default for AppState {
    fn default() -> Self {
        AppState::Transient(TransientState::default())
    }
}

/// A window: a slot rendering one application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Window {
    #[serde(default)]
    pub storage: StorageId,
    #[serde(default)]
    pub storage_name: Option<String>,
    pub content: AppRef,
    #[serde(default)]
    pub state: AppState,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub show_info_bar: bool,
    #[serde(default)]
    pub show_state: bool,
    #[serde(default)]
    pub show_mode: bool,
    #[serde(default)]
    pub theme: Option<String>,
    #[serde(default)]
    pub width: Option<String>,
    #[serde(default)]
    pub height: Option<String>,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
    #[serde(default)]
    pub access_permissions: Vec<String>,
}

impl Window {
    /// A bare window for the given content reference.
    pub fn of(content: AppRef) -> Self {
        Self {
            storage: StorageId::New,
            storage_name: None,
            content,
            state: AppState::default(),
            title: None,
            icon: None,
            description: None,
            show_info_bar: false,
            show_state: false,
            show_mode: false,
            theme: None,
            width: None,
            height: None,
            properties: BTreeMap::new(),
            access_permissions: Vec::new(),
        }
    }
}

/// Body placeholder kinds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BodyType {
    #[default]
    Page,
}

/// A stateless body placeholder.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Body {
    #[serde(default)]
    pub storage: StorageId,
    #[serde(default)]
    pub storage_name: Option<String>,
    #[serde(default)]
    pub body_type: BodyType,
}

/// One layout component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Component {
    Container(Container),
    Window(Window),
    Body(Body),
}

impl Component {
    pub fn storage(&self) -> &StorageId {
        match self {
            Component::Container(c) => &c.storage,
            Component::Window(w) => &w.storage,
            Component::Body(b) => &b.storage,
        }
    }

    pub fn storage_name(&self) -> Option<&str> {
        match self {
            Component::Container(c) => c.storage_name.as_deref(),
            Component::Window(w) => w.storage_name.as_deref(),
            Component::Body(b) => b.storage_name.as_deref(),
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Component::Container(_) => "container",
            Component::Window(_) => "window",
            Component::Body(_) => "body",
        }
    }
}

// ─────────────────────────────────────────────────────
// Sites and pages
// ─────────────────────────────────────────────────────

/// A site and its root layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Portal {
    #[serde(default)]
    pub storage: StorageId,
    pub site: SiteRef,
    #[serde(default)]
    pub locale: Option<String>,
    #[serde(default)]
    pub access_permissions: Vec<String>,
    #[serde(default)]
    pub edit_permission: Option<String>,
    /// Free-form site properties; reserved attribute names never pass
    /// through here.
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
    #[serde(default)]
    pub skin: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub layout: Container,
    #[serde(default)]
    pub creator: Option<String>,
    #[serde(default)]
    pub modifier: Option<String>,
}

impl Portal {
    /// A bare portal for a site.
    pub fn of(site: SiteRef) -> Self {
        Self {
            storage: StorageId::New,
            site,
            locale: None,
            access_permissions: Vec::new(),
            edit_permission: None,
            properties: BTreeMap::new(),
            skin: None,
            title: None,
            layout: Container::default(),
            creator: None,
            modifier: None,
        }
    }
}

/// A page and its top-level components.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    #[serde(default)]
    pub storage: StorageId,
    pub name: String,
    pub owner: SiteRef,
    #[serde(default)]
    pub factory_id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub access_permissions: Vec<String>,
    #[serde(default)]
    pub edit_permission: Option<String>,
    #[serde(default)]
    pub show_max_window: bool,
    #[serde(default)]
    pub creator: Option<String>,
    #[serde(default)]
    pub modifier: Option<String>,
    #[serde(default)]
    pub children: Vec<Component>,
}

impl Page {
    /// A bare page of a site.
    pub fn named(owner: SiteRef, name: impl Into<String>) -> Self {
        Self {
            storage: StorageId::New,
            name: name.into(),
            owner,
            factory_id: None,
            title: None,
            access_permissions: Vec::new(),
            edit_permission: None,
            show_max_window: false,
            creator: None,
            modifier: None,
            children: Vec::new(),
        }
    }
}

// ─────────────────────────────────────────────────────
// Change log
// ─────────────────────────────────────────────────────

/// One structural change applied by a save, in application order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelChange {
    Create(ObjectId),
    Update(ObjectId),
    Destroy(ObjectId),
}

impl ModelChange {
    /// The affected node.
    pub fn id(&self) -> &ObjectId {
        match self {
            ModelChange::Create(id) | ModelChange::Update(id) | ModelChange::Destroy(id) => id,
        }
    }
}

impl fmt::Display for ModelChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelChange::Create(id) => write!(f, "create {}", id),
            ModelChange::Update(id) => write!(f, "update {}", id),
            ModelChange::Destroy(id) => write!(f, "destroy {}", id),
        }
    }
}
