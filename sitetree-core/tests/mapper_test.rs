//! Mapper scenario tests against the in-memory store.

use serde_json::json;
use sitetree_core::{
    AppRef, AppState, Body, Component, Container, ContainerKind, ContentSession, ContentType,
    Mapper, MapperError, MemoryStore, ModelChange, NavNode, Navigation, ObjectId, Page, PageRef,
    Portal, SiteRef, SiteType, StorageId, TransientState, Window, EVERYONE,
};

fn classic() -> SiteRef {
    SiteRef::new(SiteType::Portal, "classic")
}

fn store_with_site() -> MemoryStore {
    let mut store = MemoryStore::new();
    store.create_site(&classic());
    store
}

fn gadget(name: &str) -> Window {
    Window::of(AppRef::Gadget {
        name: name.to_string(),
    })
}

fn portlet(application: &str, portlet: &str) -> Window {
    Window::of(AppRef::Portlet {
        application: application.to_string(),
        portlet: portlet.to_string(),
    })
}

fn window_at(portal: &Portal, index: usize) -> &Window {
    match &portal.layout.children[index] {
        Component::Window(w) => w,
        other => panic!("expected a window, got {:?}", other),
    }
}

fn container_at(portal: &Portal, index: usize) -> &Container {
    match &portal.layout.children[index] {
        Component::Container(c) => c,
        other => panic!("expected a container, got {:?}", other),
    }
}

// ─────────────────────────────────────────────────────
// Portals
// ─────────────────────────────────────────────────────

#[test]
fn test_portal_round_trip() {
    let mut store = store_with_site();
    let mut mapper = Mapper::new(&mut store);

    let mut portal = mapper.load_portal(&classic()).unwrap();
    portal.title = Some("Classic".to_string());
    portal.locale = Some("en".to_string());
    portal.access_permissions = vec![EVERYONE.to_string(), "*:/platform/users".to_string()];
    portal
        .properties
        .insert("sessionAlive".to_string(), "onDemand".to_string());
    portal.layout.children.push(Component::Window(gadget("Clock")));

    let changes = mapper.save_portal(&portal).unwrap();
    assert_eq!(changes.len(), 3);
    assert!(matches!(&changes[0], ModelChange::Update(id) if Some(id) == portal.storage.existing()));
    assert!(matches!(&changes[1], ModelChange::Create(_)));
    assert!(matches!(&changes[2], ModelChange::Update(id) if Some(id) == portal.layout.storage.existing()));

    let reloaded = mapper.load_portal(&classic()).unwrap();
    assert_eq!(reloaded.title.as_deref(), Some("Classic"));
    assert_eq!(reloaded.locale.as_deref(), Some("en"));
    assert_eq!(
        reloaded.access_permissions,
        vec![EVERYONE.to_string(), "*:/platform/users".to_string()]
    );
    assert_eq!(
        reloaded.properties.get("sessionAlive").map(String::as_str),
        Some("onDemand")
    );

    let window = window_at(&reloaded, 0);
    assert_eq!(
        window.content,
        AppRef::Gadget {
            name: "Clock".to_string()
        }
    );
    assert!(matches!(window.state, AppState::Persistent(_)));
}

#[test]
fn test_unchanged_resave_yields_empty_log() {
    let mut store = store_with_site();
    let mut mapper = Mapper::new(&mut store);

    let mut portal = mapper.load_portal(&classic()).unwrap();
    portal.title = Some("Classic".to_string());
    portal
        .properties
        .insert("sessionAlive".to_string(), "onDemand".to_string());
    let mut left = Container::default();
    left.children.push(Component::Window(gadget("Clock")));
    left.children.push(Component::Window(portlet("web", "Banner")));
    portal.layout.children.push(Component::Container(left));
    mapper.save_portal(&portal).unwrap();

    let reloaded = mapper.load_portal(&classic()).unwrap();
    let changes = mapper.save_portal(&reloaded).unwrap();
    assert!(changes.is_empty(), "unexpected changes: {:?}", changes);
}

#[test]
fn test_wrong_target_portal_is_rejected() {
    let mut store = store_with_site();
    let mut mapper = Mapper::new(&mut store);

    let mut portal = mapper.load_portal(&classic()).unwrap();
    portal.storage = StorageId::Existing(ObjectId::from("someone-else"));

    let err = mapper.save_portal(&portal).unwrap_err();
    assert!(matches!(err, MapperError::WrongTarget { .. }));
}

#[test]
fn test_save_against_missing_site_fails() {
    let mut store = MemoryStore::new();
    let mut mapper = Mapper::new(&mut store);

    let err = mapper.save_portal(&Portal::of(classic())).unwrap_err();
    assert_eq!(err, MapperError::MissingSite(classic()));
}

// ─────────────────────────────────────────────────────
// Layout reconciliation
// ─────────────────────────────────────────────────────

#[test]
fn test_move_is_not_a_delete() {
    let mut store = store_with_site();
    let mut mapper = Mapper::new(&mut store);

    let mut portal = mapper.load_portal(&classic()).unwrap();
    let mut left = Container::default();
    left.children.push(Component::Window(gadget("Clock")));
    portal.layout.children.push(Component::Container(left));
    portal.layout.children.push(Component::Container(Container::default()));
    mapper.save_portal(&portal).unwrap();

    // Reparent the window from the left container to the right one.
    let mut portal = mapper.load_portal(&classic()).unwrap();
    let window = match &mut portal.layout.children[0] {
        Component::Container(left) => match left.children.remove(0) {
            Component::Window(w) => w,
            other => panic!("expected a window, got {:?}", other),
        },
        other => panic!("expected a container, got {:?}", other),
    };
    let window_id = window.storage.existing().unwrap().clone();
    match &mut portal.layout.children[1] {
        Component::Container(right) => right.children.push(Component::Window(window)),
        other => panic!("expected a container, got {:?}", other),
    }

    let changes = mapper.save_portal(&portal).unwrap();
    assert!(!changes.iter().any(|c| matches!(c, ModelChange::Create(_))));
    assert!(!changes.iter().any(|c| matches!(c, ModelChange::Destroy(_))));
    let window_updates = changes
        .iter()
        .filter(|c| matches!(c, ModelChange::Update(id) if *id == window_id))
        .count();
    assert_eq!(window_updates, 1);

    let reloaded = mapper.load_portal(&classic()).unwrap();
    assert!(container_at(&reloaded, 0).children.is_empty());
    let right = container_at(&reloaded, 1);
    assert_eq!(right.children.len(), 1);
    assert_eq!(right.children[0].storage().existing(), Some(&window_id));
}

#[test]
fn test_moved_body_records_an_update() {
    let mut store = store_with_site();
    let mut mapper = Mapper::new(&mut store);

    let mut portal = mapper.load_portal(&classic()).unwrap();
    let mut left = Container::default();
    left.children.push(Component::Body(Body::default()));
    portal.layout.children.push(Component::Container(left));
    portal.layout.children.push(Component::Container(Container::default()));
    mapper.save_portal(&portal).unwrap();

    // Reparent the body from the left container to the right one.
    let mut portal = mapper.load_portal(&classic()).unwrap();
    let body = match &mut portal.layout.children[0] {
        Component::Container(left) => left.children.remove(0),
        other => panic!("expected a container, got {:?}", other),
    };
    let body_id = body.storage().existing().unwrap().clone();
    match &mut portal.layout.children[1] {
        Component::Container(right) => right.children.push(body),
        other => panic!("expected a container, got {:?}", other),
    }

    let changes = mapper.save_portal(&portal).unwrap();
    assert!(!changes.iter().any(|c| matches!(c, ModelChange::Create(_))));
    assert!(!changes.iter().any(|c| matches!(c, ModelChange::Destroy(_))));
    let body_updates = changes
        .iter()
        .filter(|c| matches!(c, ModelChange::Update(id) if *id == body_id))
        .count();
    assert_eq!(body_updates, 1);

    let reloaded = mapper.load_portal(&classic()).unwrap();
    assert!(container_at(&reloaded, 0).children.is_empty());
    let right = container_at(&reloaded, 1);
    assert_eq!(right.children[0].storage().existing(), Some(&body_id));
    assert!(matches!(right.children[0], Component::Body(_)));
}

#[test]
fn test_move_into_unsaved_container_is_rejected() {
    let mut store = store_with_site();
    let mut mapper = Mapper::new(&mut store);

    let mut portal = mapper.load_portal(&classic()).unwrap();
    let mut old = Container::default();
    old.children.push(Component::Window(gadget("Clock")));
    portal.layout.children.push(Component::Container(old));
    mapper.save_portal(&portal).unwrap();

    // The old container comes first in model order, so its own passes run
    // before the claim under the brand-new container is discovered.
    let mut portal = mapper.load_portal(&classic()).unwrap();
    let window = match &mut portal.layout.children[0] {
        Component::Container(old) => match old.children.remove(0) {
            Component::Window(w) => w,
            other => panic!("expected a window, got {:?}", other),
        },
        other => panic!("expected a container, got {:?}", other),
    };
    let window_id = window.storage.existing().unwrap().clone();
    let mut fresh = Container::default();
    fresh.children.push(Component::Window(window));
    portal.layout.children.push(Component::Container(fresh));

    let err = mapper.save_portal(&portal).unwrap_err();
    assert!(matches!(err, MapperError::StrayComponent { id, .. } if id == window_id));

    // The window was neither destroyed nor reparented along the way.
    let reloaded = mapper.load_portal(&classic()).unwrap();
    let old = container_at(&reloaded, 0);
    assert_eq!(old.children[0].storage().existing(), Some(&window_id));
}

#[test]
fn test_removed_children_are_destroyed() {
    let mut store = store_with_site();
    let mut mapper = Mapper::new(&mut store);

    let mut portal = mapper.load_portal(&classic()).unwrap();
    portal.layout.children.push(Component::Window(gadget("Clock")));
    portal.layout.children.push(Component::Window(gadget("Weather")));
    mapper.save_portal(&portal).unwrap();

    let mut portal = mapper.load_portal(&classic()).unwrap();
    let dropped = portal.layout.children.remove(1);
    let dropped_id = dropped.storage().existing().unwrap().clone();

    let changes = mapper.save_portal(&portal).unwrap();
    assert!(changes.contains(&ModelChange::Destroy(dropped_id.clone())));

    let reloaded = mapper.load_portal(&classic()).unwrap();
    assert_eq!(reloaded.layout.children.len(), 1);
    assert_ne!(reloaded.layout.children[0].storage().existing(), Some(&dropped_id));
}

#[test]
fn test_reorder_applies_exact_model_order() {
    let mut store = store_with_site();
    let mut mapper = Mapper::new(&mut store);

    let mut portal = mapper.load_portal(&classic()).unwrap();
    for name in ["a", "b", "c"] {
        portal.layout.children.push(Component::Window(gadget(name)));
    }
    mapper.save_portal(&portal).unwrap();

    let mut portal = mapper.load_portal(&classic()).unwrap();
    let last = portal.layout.children.pop().unwrap();
    portal.layout.children.insert(0, last);

    let changes = mapper.save_portal(&portal).unwrap();
    let layout_id = portal.layout.storage.existing().unwrap().clone();
    assert_eq!(changes, vec![ModelChange::Update(layout_id)]);

    let reloaded = mapper.load_portal(&classic()).unwrap();
    let names: Vec<String> = reloaded
        .layout
        .children
        .iter()
        .map(|c| match c {
            Component::Window(w) => match &w.content {
                AppRef::Gadget { name } => name.clone(),
                other => panic!("expected a gadget, got {:?}", other),
            },
            other => panic!("expected a window, got {:?}", other),
        })
        .collect();
    assert_eq!(names, vec!["c", "a", "b"]);
}

#[test]
fn test_new_components_get_unique_names() {
    let mut store = store_with_site();
    let mut mapper = Mapper::new(&mut store);

    let mut portal = mapper.load_portal(&classic()).unwrap();
    for name in ["a", "b", "c"] {
        portal.layout.children.push(Component::Window(gadget(name)));
    }
    mapper.save_portal(&portal).unwrap();

    let reloaded = mapper.load_portal(&classic()).unwrap();
    let names: std::collections::HashSet<String> = reloaded
        .layout
        .children
        .iter()
        .map(|c| c.storage_name().unwrap().to_string())
        .collect();
    assert_eq!(names.len(), 3);
    assert!(names.iter().all(|n| !n.is_empty()));
}

#[test]
fn test_explicit_storage_name_conflict_is_rejected() {
    let mut store = store_with_site();
    let mut mapper = Mapper::new(&mut store);

    let mut portal = mapper.load_portal(&classic()).unwrap();
    let mut banner = gadget("Banner");
    banner.storage_name = Some("banner".to_string());
    portal.layout.children.push(Component::Window(banner));
    mapper.save_portal(&portal).unwrap();

    let mut portal = mapper.load_portal(&classic()).unwrap();
    let mut second = gadget("Banner");
    second.storage_name = Some("banner".to_string());
    portal.layout.children.push(Component::Window(second));

    let err = mapper.save_portal(&portal).unwrap_err();
    assert!(matches!(err, MapperError::DuplicateName { name, .. } if name == "banner"));
}

#[test]
fn test_duplicate_storage_id_is_rejected_before_mutation() {
    let mut store = store_with_site();
    let mut mapper = Mapper::new(&mut store);

    let mut portal = mapper.load_portal(&classic()).unwrap();
    portal.layout.children.push(Component::Window(gadget("Clock")));
    mapper.save_portal(&portal).unwrap();

    let mut portal = mapper.load_portal(&classic()).unwrap();
    portal.title = Some("changed".to_string());
    let duplicate = portal.layout.children[0].clone();
    let id = duplicate.storage().existing().unwrap().clone();
    portal.layout.children.push(duplicate);

    let err = mapper.save_portal(&portal).unwrap_err();
    assert_eq!(err, MapperError::DuplicateStorageId(id));

    // Nothing was written, not even the site scalars.
    let reloaded = mapper.load_portal(&classic()).unwrap();
    assert_eq!(reloaded.title, None);
}

#[test]
fn test_unknown_component_id_is_rejected() {
    let mut store = store_with_site();
    let mut mapper = Mapper::new(&mut store);

    let mut portal = mapper.load_portal(&classic()).unwrap();
    let mut ghost = gadget("Clock");
    ghost.storage = StorageId::Existing(ObjectId::from("ghost"));
    portal.layout.children.push(Component::Window(ghost));

    let err = mapper.save_portal(&portal).unwrap_err();
    assert_eq!(err, MapperError::MissingComponent(ObjectId::from("ghost")));
}

#[test]
fn test_component_kind_mismatch_is_rejected() {
    let mut store = store_with_site();
    let mut mapper = Mapper::new(&mut store);

    let mut portal = mapper.load_portal(&classic()).unwrap();
    portal.layout.children.push(Component::Container(Container::default()));
    mapper.save_portal(&portal).unwrap();

    let portal = mapper.load_portal(&classic()).unwrap();
    let container_id = portal.layout.children[0].storage().existing().unwrap().clone();

    let mut bogus = mapper.load_portal(&classic()).unwrap();
    let mut window = gadget("Clock");
    window.storage = StorageId::Existing(container_id);
    bogus.layout.children = vec![Component::Window(window)];

    let err = mapper.save_portal(&bogus).unwrap_err();
    assert!(matches!(
        err,
        MapperError::UnexpectedKind {
            wanted: "window",
            actual: "container",
            ..
        }
    ));
}

// ─────────────────────────────────────────────────────
// Pages
// ─────────────────────────────────────────────────────

#[test]
fn test_page_create_then_update() {
    let mut store = store_with_site();
    let mut mapper = Mapper::new(&mut store);

    let mut page = Page::named(classic(), "home");
    page.title = Some("Home".to_string());
    page.children.push(Component::Window(gadget("Clock")));

    let changes = mapper.save_page(&page).unwrap();
    assert_eq!(changes.len(), 2);
    assert!(matches!(&changes[0], ModelChange::Create(_)));
    assert!(matches!(&changes[1], ModelChange::Create(_)));

    let page_ref = PageRef::new(classic(), "home");
    let mut loaded = mapper.load_page(&page_ref).unwrap();
    assert_eq!(loaded.title.as_deref(), Some("Home"));
    assert_eq!(loaded.children.len(), 1);
    assert!(matches!(&changes[0], ModelChange::Create(id) if Some(id) == loaded.storage.existing()));

    loaded.title = Some("Start".to_string());
    let changes = mapper.save_page(&loaded).unwrap();
    let page_id = loaded.storage.existing().unwrap().clone();
    assert_eq!(changes, vec![ModelChange::Update(page_id)]);

    let reloaded = mapper.load_page(&page_ref).unwrap();
    assert_eq!(reloaded.title.as_deref(), Some("Start"));
}

#[test]
fn test_page_resave_is_idempotent() {
    let mut store = store_with_site();
    let mut mapper = Mapper::new(&mut store);

    let mut page = Page::named(classic(), "home");
    page.show_max_window = true;
    page.access_permissions = vec![EVERYONE.to_string()];
    page.children.push(Component::Window(gadget("Clock")));
    mapper.save_page(&page).unwrap();

    let loaded = mapper.load_page(&PageRef::new(classic(), "home")).unwrap();
    assert!(loaded.show_max_window);
    let changes = mapper.save_page(&loaded).unwrap();
    assert!(changes.is_empty(), "unexpected changes: {:?}", changes);
}

// ─────────────────────────────────────────────────────
// Dashboards
// ─────────────────────────────────────────────────────

#[test]
fn test_dashboard_loads_as_placeholder_window() {
    let mut store = store_with_site();
    let mut mapper = Mapper::new(&mut store);

    let mut portal = mapper.load_portal(&classic()).unwrap();
    portal.layout.children.push(Component::Window(Window::of(AppRef::dashboard())));
    let changes = mapper.save_portal(&portal).unwrap();
    assert!(changes.iter().any(|c| matches!(c, ModelChange::Create(_))));

    let reloaded = mapper.load_portal(&classic()).unwrap();
    let placeholder = window_at(&reloaded, 0);
    assert!(placeholder.content.is_dashboard());
    assert_eq!(placeholder.access_permissions, vec![EVERYONE.to_string()]);
    match &placeholder.state {
        AppState::Transient(state) => assert_eq!(state.owner, Some(classic())),
        other => panic!("expected transient state, got {:?}", other),
    }
}

#[test]
fn test_dashboard_content_survives_portal_saves() {
    let mut store = store_with_site();
    let mut mapper = Mapper::new(&mut store);

    let mut portal = mapper.load_portal(&classic()).unwrap();
    portal.layout.children.push(Component::Window(Window::of(AppRef::dashboard())));
    mapper.save_portal(&portal).unwrap();

    let reloaded = mapper.load_portal(&classic()).unwrap();
    let dashboard_id = window_at(&reloaded, 0).storage.existing().unwrap().clone();

    // Fill the dashboard through its own entry point.
    let mut dashboard = mapper.load_dashboard(&dashboard_id).unwrap();
    assert_eq!(dashboard.kind, ContainerKind::Dashboard);
    dashboard.children.push(Component::Window(gadget("Todo")));
    let changes = mapper.save_dashboard(&dashboard, &dashboard_id).unwrap();
    assert!(changes.iter().any(|c| matches!(c, ModelChange::Create(_))));

    // A portal round-trip sees only the placeholder and must not disturb
    // the content behind it.
    let portal = mapper.load_portal(&classic()).unwrap();
    assert!(window_at(&portal, 0).content.is_dashboard());
    let changes = mapper.save_portal(&portal).unwrap();
    assert!(changes.is_empty(), "unexpected changes: {:?}", changes);

    let dashboard = mapper.load_dashboard(&dashboard_id).unwrap();
    assert_eq!(dashboard.children.len(), 1);
}

// ─────────────────────────────────────────────────────
// Window properties and permissions
// ─────────────────────────────────────────────────────

#[test]
fn test_reserved_names_never_reach_properties() {
    let mut store = store_with_site();
    let mut mapper = Mapper::new(&mut store);

    let mut portal = mapper.load_portal(&classic()).unwrap();
    let mut window = gadget("Clock");
    window.title = Some("Clock".to_string());
    window.properties.insert("refresh".to_string(), "30".to_string());
    window.properties.insert("title".to_string(), "smuggled".to_string());
    portal.layout.children.push(Component::Window(window));
    portal.properties.insert("skin".to_string(), "smuggled".to_string());
    mapper.save_portal(&portal).unwrap();

    let reloaded = mapper.load_portal(&classic()).unwrap();
    assert_eq!(reloaded.skin, None);
    assert!(!reloaded.properties.contains_key("skin"));

    let window = window_at(&reloaded, 0);
    assert_eq!(window.title.as_deref(), Some("Clock"));
    assert_eq!(window.properties.get("refresh").map(String::as_str), Some("30"));
    assert!(!window.properties.contains_key("title"));
}

#[test]
fn test_stale_properties_are_cleared() {
    let mut store = store_with_site();
    let mut mapper = Mapper::new(&mut store);

    let mut portal = mapper.load_portal(&classic()).unwrap();
    portal.properties.insert("a".to_string(), "1".to_string());
    portal.properties.insert("b".to_string(), "2".to_string());
    mapper.save_portal(&portal).unwrap();

    let mut portal = mapper.load_portal(&classic()).unwrap();
    portal.properties.remove("a");
    mapper.save_portal(&portal).unwrap();

    let reloaded = mapper.load_portal(&classic()).unwrap();
    assert!(!reloaded.properties.contains_key("a"));
    assert_eq!(reloaded.properties.get("b").map(String::as_str), Some("2"));
}

#[test]
fn test_empty_permissions_round_trip_empty() {
    let mut store = store_with_site();
    let mut mapper = Mapper::new(&mut store);

    let portal = mapper.load_portal(&classic()).unwrap();
    assert!(portal.access_permissions.is_empty());
    mapper.save_portal(&portal).unwrap();

    let reloaded = mapper.load_portal(&classic()).unwrap();
    assert!(reloaded.access_permissions.is_empty());
}

// ─────────────────────────────────────────────────────
// Customization resolution
// ─────────────────────────────────────────────────────

#[test]
fn test_window_extends_site_customization() {
    let mut store = store_with_site();
    let site_node = store.find_site(&classic()).unwrap();
    let base = store.customize_site(
        &site_node,
        "clock-shared",
        ContentType::Gadget,
        "Clock",
        Some(json!({"tz": "PST"})),
    );

    let mut mapper = Mapper::new(&mut store);
    let mut portal = mapper.load_portal(&classic()).unwrap();
    let mut window = gadget("Clock");
    window.state = AppState::Transient(TransientState {
        owner: None,
        unique_id: Some("clock-shared".to_string()),
        content_state: None,
    });
    portal.layout.children.push(Component::Window(window));
    mapper.save_portal(&portal).unwrap();

    let reloaded = mapper.load_portal(&classic()).unwrap();
    let id = match &window_at(&reloaded, 0).state {
        AppState::Persistent(id) => id.clone(),
        other => panic!("expected persistent state, got {:?}", other),
    };

    // The extension reads through to the site record, live.
    assert_eq!(store.customization_state(&id), Some(json!({"tz": "PST"})));
    store.set_customization_state(&base, json!({"tz": "CET"}));
    assert_eq!(store.customization_state(&id), Some(json!({"tz": "CET"})));
}

#[test]
fn test_site_customization_created_on_first_use() {
    let mut store = store_with_site();
    let mut mapper = Mapper::new(&mut store);

    let mut portal = mapper.load_portal(&classic()).unwrap();
    let mut window = gadget("Clock");
    window.state = AppState::Transient(TransientState {
        owner: None,
        unique_id: Some("clock-shared".to_string()),
        content_state: Some(json!({"tz": "UTC"})),
    });
    portal.layout.children.push(Component::Window(window));
    mapper.save_portal(&portal).unwrap();

    let site_node = store.find_site(&classic()).unwrap();
    assert!(store.site_customization(&site_node, "clock-shared").is_some());

    let mut mapper = Mapper::new(&mut store);
    let reloaded = mapper.load_portal(&classic()).unwrap();
    let id = match &window_at(&reloaded, 0).state {
        AppState::Persistent(id) => id.clone(),
        other => panic!("expected persistent state, got {:?}", other),
    };
    // The inline payload landed on the window's own record.
    assert_eq!(store.customization_state(&id), Some(json!({"tz": "UTC"})));
}

#[test]
fn test_unknown_owner_site_falls_back_to_current() {
    let mut store = store_with_site();
    let mut mapper = Mapper::new(&mut store);

    let mut portal = mapper.load_portal(&classic()).unwrap();
    let mut window = gadget("Clock");
    window.state = AppState::Transient(TransientState {
        owner: Some(SiteRef::new(SiteType::Portal, "ghost")),
        unique_id: Some("clock-shared".to_string()),
        content_state: None,
    });
    portal.layout.children.push(Component::Window(window));
    mapper.save_portal(&portal).unwrap();

    // An owner naming no real site behaves like no owner at all: the key
    // is created on the window's own site.
    let site_node = store.find_site(&classic()).unwrap();
    assert!(store.site_customization(&site_node, "clock-shared").is_some());
}

#[test]
fn test_cross_site_customization_is_cloned() {
    let mut store = store_with_site();
    let other = SiteRef::new(SiteType::Portal, "other");
    store.create_site(&other);
    let other_node = store.find_site(&other).unwrap();
    let source = store.customize_site(
        &other_node,
        "banner",
        ContentType::Portlet,
        "web/Banner",
        Some(json!({"height": "300px"})),
    );

    let mut mapper = Mapper::new(&mut store);
    let mut portal = mapper.load_portal(&classic()).unwrap();
    let mut window = portlet("web", "Banner");
    window.state = AppState::Transient(TransientState {
        owner: Some(other.clone()),
        unique_id: Some("banner".to_string()),
        content_state: None,
    });
    portal.layout.children.push(Component::Window(window));
    mapper.save_portal(&portal).unwrap();

    let reloaded = mapper.load_portal(&classic()).unwrap();
    let id = match &window_at(&reloaded, 0).state {
        AppState::Persistent(id) => id.clone(),
        other => panic!("expected persistent state, got {:?}", other),
    };
    assert_ne!(id, source);
    assert_eq!(store.customization_state(&id), Some(json!({"height": "300px"})));

    // The clone is a snapshot, not a live link.
    store.set_customization_state(&source, json!({"height": "10px"}));
    assert_eq!(store.customization_state(&id), Some(json!({"height": "300px"})));
}

#[test]
fn test_content_mismatch_falls_back_to_fresh_state() {
    let mut store = store_with_site();
    let site_node = store.find_site(&classic()).unwrap();
    store.customize_site(
        &site_node,
        "banner",
        ContentType::Portlet,
        "web/Banner",
        Some(json!({"height": "300px"})),
    );

    let mut mapper = Mapper::new(&mut store);
    let mut portal = mapper.load_portal(&classic()).unwrap();
    let mut window = gadget("Clock");
    window.state = AppState::Transient(TransientState {
        owner: None,
        unique_id: Some("banner".to_string()),
        content_state: None,
    });
    portal.layout.children.push(Component::Window(window));
    mapper.save_portal(&portal).unwrap();

    let reloaded = mapper.load_portal(&classic()).unwrap();
    let window = window_at(&reloaded, 0);
    assert_eq!(
        window.content,
        AppRef::Gadget {
            name: "Clock".to_string()
        }
    );
    let id = match &window.state {
        AppState::Persistent(id) => id.clone(),
        other => panic!("expected persistent state, got {:?}", other),
    };
    assert_eq!(store.customization_state(&id), None);
}

#[test]
fn test_window_reuses_another_windows_customization() {
    let mut store = store_with_site();
    let mut mapper = Mapper::new(&mut store);

    let mut portal = mapper.load_portal(&classic()).unwrap();
    let mut first = gadget("Clock");
    first.state = AppState::Transient(TransientState {
        owner: None,
        unique_id: None,
        content_state: Some(json!({"tz": "UTC"})),
    });
    portal.layout.children.push(Component::Window(first));
    mapper.save_portal(&portal).unwrap();

    let portal = mapper.load_portal(&classic()).unwrap();
    let first_id = window_at(&portal, 0).storage.existing().unwrap().clone();
    let first_customization = match &window_at(&portal, 0).state {
        AppState::Persistent(id) => id.clone(),
        other => panic!("expected persistent state, got {:?}", other),
    };

    let mut portal = mapper.load_portal(&classic()).unwrap();
    let mut second = gadget("Clock");
    second.state = AppState::Transient(TransientState {
        owner: None,
        unique_id: Some(format!("@{}", first_id)),
        content_state: None,
    });
    portal.layout.children.push(Component::Window(second));
    mapper.save_portal(&portal).unwrap();

    let reloaded = mapper.load_portal(&classic()).unwrap();
    let second_customization = match &window_at(&reloaded, 1).state {
        AppState::Persistent(id) => id.clone(),
        other => panic!("expected persistent state, got {:?}", other),
    };
    assert_ne!(second_customization, first_customization);
    assert_eq!(
        store.customization_state(&second_customization),
        Some(json!({"tz": "UTC"}))
    );
}

#[test]
fn test_window_pointing_at_itself_starts_fresh() {
    let mut store = store_with_site();
    let mut mapper = Mapper::new(&mut store);

    let mut portal = mapper.load_portal(&classic()).unwrap();
    let mut window = gadget("Clock");
    window.state = AppState::Transient(TransientState {
        owner: None,
        unique_id: None,
        content_state: Some(json!({"tz": "UTC"})),
    });
    portal.layout.children.push(Component::Window(window));
    mapper.save_portal(&portal).unwrap();

    let mut portal = mapper.load_portal(&classic()).unwrap();
    let window_id = window_at(&portal, 0).storage.existing().unwrap().clone();
    let old_customization = match &window_at(&portal, 0).state {
        AppState::Persistent(id) => id.clone(),
        other => panic!("expected persistent state, got {:?}", other),
    };
    match &mut portal.layout.children[0] {
        Component::Window(w) => {
            w.state = AppState::Transient(TransientState {
                owner: None,
                unique_id: Some(format!("@{}", window_id)),
                content_state: None,
            });
        }
        other => panic!("expected a window, got {:?}", other),
    }
    mapper.save_portal(&portal).unwrap();

    let reloaded = mapper.load_portal(&classic()).unwrap();
    let new_customization = match &window_at(&reloaded, 0).state {
        AppState::Persistent(id) => id.clone(),
        other => panic!("expected persistent state, got {:?}", other),
    };
    assert_ne!(new_customization, old_customization);
    assert_eq!(store.customization_state(&new_customization), None);
}

#[test]
fn test_page_scoped_customization() {
    let mut store = store_with_site();
    let mut mapper = Mapper::new(&mut store);
    mapper.save_page(&Page::named(classic(), "home")).unwrap();

    let site_node = store.find_site(&classic()).unwrap();
    let page_node = store.find_page(&site_node, "home").unwrap();
    store.customize_page(
        &page_node,
        "prefs",
        ContentType::Gadget,
        "Clock",
        Some(json!({"mode": "mini"})),
    );

    let mut mapper = Mapper::new(&mut store);
    let mut portal = mapper.load_portal(&classic()).unwrap();
    let mut window = gadget("Clock");
    window.state = AppState::Transient(TransientState {
        owner: None,
        unique_id: Some("prefs#home".to_string()),
        content_state: None,
    });
    portal.layout.children.push(Component::Window(window));
    mapper.save_portal(&portal).unwrap();

    let reloaded = mapper.load_portal(&classic()).unwrap();
    let id = match &window_at(&reloaded, 0).state {
        AppState::Persistent(id) => id.clone(),
        other => panic!("expected persistent state, got {:?}", other),
    };
    assert_eq!(store.customization_state(&id), Some(json!({"mode": "mini"})));
}

#[test]
fn test_page_scoped_customization_needs_the_page() {
    let mut store = store_with_site();
    let mut mapper = Mapper::new(&mut store);

    let mut portal = mapper.load_portal(&classic()).unwrap();
    let mut window = gadget("Clock");
    window.state = AppState::Transient(TransientState {
        owner: None,
        unique_id: Some("prefs#nosuch".to_string()),
        content_state: None,
    });
    portal.layout.children.push(Component::Window(window));

    let err = mapper.save_portal(&portal).unwrap_err();
    assert!(matches!(err, MapperError::MissingPage(page_ref) if page_ref.page == "nosuch"));
}

#[test]
fn test_persistent_state_passes_through() {
    let mut store = store_with_site();
    let mut mapper = Mapper::new(&mut store);

    let mut portal = mapper.load_portal(&classic()).unwrap();
    portal.layout.children.push(Component::Window(gadget("Clock")));
    mapper.save_portal(&portal).unwrap();

    let mut portal = mapper.load_portal(&classic()).unwrap();
    let before = match &window_at(&portal, 0).state {
        AppState::Persistent(id) => id.clone(),
        other => panic!("expected persistent state, got {:?}", other),
    };
    let window_id = window_at(&portal, 0).storage.existing().unwrap().clone();
    match &mut portal.layout.children[0] {
        Component::Window(w) => w.title = Some("Clock".to_string()),
        other => panic!("expected a window, got {:?}", other),
    }

    let changes = mapper.save_portal(&portal).unwrap();
    assert_eq!(changes, vec![ModelChange::Update(window_id)]);

    let reloaded = mapper.load_portal(&classic()).unwrap();
    match &window_at(&reloaded, 0).state {
        AppState::Persistent(after) => assert_eq!(*after, before),
        other => panic!("expected persistent state, got {:?}", other),
    }
}

// ─────────────────────────────────────────────────────
// Navigation
// ─────────────────────────────────────────────────────

#[test]
fn test_navigation_round_trip() {
    let mut store = store_with_site();
    let mut mapper = Mapper::new(&mut store);

    let mut nav = mapper.load_navigation(&classic()).unwrap();
    assert_eq!(nav.priority, 1);
    nav.priority = 3;
    nav.description = Some("main menu".to_string());
    let mut home = NavNode::named("home");
    home.label = Some("Home".to_string());
    home.uri = Some("/home".to_string());
    home.children.push(NavNode::named("news"));
    nav.children.push(home);

    let changes = mapper.save_navigation(&nav).unwrap();
    assert_eq!(changes.len(), 3);
    assert!(matches!(&changes[0], ModelChange::Update(_)));
    assert!(matches!(&changes[1], ModelChange::Create(_)));
    assert!(matches!(&changes[2], ModelChange::Create(_)));

    let reloaded = mapper.load_navigation(&classic()).unwrap();
    assert_eq!(reloaded.priority, 3);
    assert_eq!(reloaded.description.as_deref(), Some("main menu"));
    assert_eq!(reloaded.children.len(), 1);
    let home = &reloaded.children[0];
    assert_eq!(home.name, "home");
    assert_eq!(home.label.as_deref(), Some("Home"));
    assert!(home.visible);
    assert!(!home.show_publication_date);
    assert_eq!(home.children[0].name, "news");

    let changes = mapper.save_navigation(&reloaded).unwrap();
    assert!(changes.is_empty(), "unexpected changes: {:?}", changes);
}

#[test]
fn test_navigation_upserts_by_name_and_deletes_orphans() {
    let mut store = store_with_site();
    let mut mapper = Mapper::new(&mut store);

    let mut nav = mapper.load_navigation(&classic()).unwrap();
    nav.children.push(NavNode::named("home"));
    nav.children.push(NavNode::named("sitemap"));
    mapper.save_navigation(&nav).unwrap();

    let seeded = mapper.load_navigation(&classic()).unwrap();
    let home_id = seeded.children[0].storage.existing().unwrap().clone();
    let sitemap_id = seeded.children[1].storage.existing().unwrap().clone();

    // A definition written from scratch: home again (by name), no sitemap.
    let mut replacement = Navigation::empty(classic());
    let mut home = NavNode::named("home");
    home.label = Some("Start".to_string());
    replacement.children.push(home);

    let changes = mapper.save_navigation(&replacement).unwrap();
    assert_eq!(
        changes,
        vec![
            ModelChange::Update(home_id.clone()),
            ModelChange::Destroy(sitemap_id),
        ]
    );

    let reloaded = mapper.load_navigation(&classic()).unwrap();
    assert_eq!(reloaded.children.len(), 1);
    assert_eq!(reloaded.children[0].storage.existing(), Some(&home_id));
    assert_eq!(reloaded.children[0].label.as_deref(), Some("Start"));
}

#[test]
fn test_navigation_duplicate_names_are_rejected() {
    let mut store = store_with_site();
    let mut mapper = Mapper::new(&mut store);

    let mut nav = Navigation::empty(classic());
    nav.children.push(NavNode::named("home"));
    nav.children.push(NavNode::named("home"));

    let err = mapper.save_navigation(&nav).unwrap_err();
    assert!(matches!(err, MapperError::DuplicateName { name, .. } if name == "home"));
    assert!(mapper.load_navigation(&classic()).unwrap().children.is_empty());
}

#[test]
fn test_navigation_page_link() {
    let mut store = store_with_site();
    let mut mapper = Mapper::new(&mut store);
    mapper.save_page(&Page::named(classic(), "home")).unwrap();

    let mut nav = mapper.load_navigation(&classic()).unwrap();
    let mut node = NavNode::named("home");
    node.page = Some(PageRef::new(classic(), "home"));
    nav.children.push(node);
    mapper.save_navigation(&nav).unwrap();

    let reloaded = mapper.load_navigation(&classic()).unwrap();
    assert_eq!(
        reloaded.children[0].page,
        Some(PageRef::new(classic(), "home"))
    );
}

#[test]
fn test_navigation_link_to_missing_page_fails_save() {
    let mut store = store_with_site();
    let mut mapper = Mapper::new(&mut store);

    let mut nav = Navigation::empty(classic());
    let mut node = NavNode::named("home");
    node.page = Some(PageRef::new(classic(), "nosuch"));
    nav.children.push(node);

    let err = mapper.save_navigation(&nav).unwrap_err();
    assert!(matches!(err, MapperError::MissingPage(page_ref) if page_ref.page == "nosuch"));
}

#[test]
fn test_deleted_page_link_loads_as_none() {
    let mut store = store_with_site();
    let mut mapper = Mapper::new(&mut store);
    mapper.save_page(&Page::named(classic(), "home")).unwrap();

    let mut nav = mapper.load_navigation(&classic()).unwrap();
    let mut node = NavNode::named("home");
    node.page = Some(PageRef::new(classic(), "home"));
    nav.children.push(node);
    mapper.save_navigation(&nav).unwrap();

    // The page disappears underneath the navigation.
    let site_node = store.find_site(&classic()).unwrap();
    let page_node = store.find_page(&site_node, "home").unwrap();
    store.remove_child(&site_node, &page_node);

    let mut mapper = Mapper::new(&mut store);
    let reloaded = mapper.load_navigation(&classic()).unwrap();
    assert_eq!(reloaded.children[0].page, None);

    // And re-saving the loaded tree does not resurrect it.
    let changes = mapper.save_navigation(&reloaded).unwrap();
    assert!(changes.is_empty(), "unexpected changes: {:?}", changes);
}
