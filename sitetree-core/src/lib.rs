//! SiteTree Core Library
//!
//! Core functionality for SiteTree including:
//! - Domain model (sites, pages, navigation, layout components, windows)
//! - Typed attribute keys and values
//! - Content session abstraction over a hierarchical node store
//! - In-memory store implementation
//! - Bidirectional mapper (load, save/reconcile, customization resolution)
//! - JSON archives for workspaces and site definitions

pub mod archive;
pub mod attributes;
pub mod mapper;
pub mod memory;
pub mod model;
pub mod session;

pub use attributes::{AttrType, AttrValue, Attributes, Key};
pub use mapper::{Mapper, MapperError, Result};
pub use memory::MemoryStore;
pub use model::{
    AppRef, AppState, Body, BodyType, Component, Container, ContainerKind, ContentType,
    ModelChange, NavNode, Navigation, Page, PageRef, ParseError, Portal, SiteRef, SiteType,
    StorageId, TransientState, Window, WindowId, EVERYONE,
};
pub use session::{
    ContentSession, Customization, CustomizationContext, CustomizationId, NodeKind, ObjectId,
};
