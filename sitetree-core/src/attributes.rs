//! Typed node attributes
//!
//! Content-tree nodes carry a flat attribute map. Keys declare their value
//! type at compile time so mapper reads and writes cannot disagree on it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::marker::PhantomData;

/// An attribute value stored on a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttrValue {
    String(String),
    Bool(bool),
    Int(i32),
    Date(DateTime<Utc>),
}

impl AttrValue {
    /// Borrow the string payload, if this is a string value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::String(s) => Some(s),
            _ => None,
        }
    }
}

/// Conversion between Rust values and [`AttrValue`].
pub trait AttrType: Sized {
    fn from_attr(value: &AttrValue) -> Option<Self>;
    fn into_attr(self) -> AttrValue;
}

impl AttrType for String {
    fn from_attr(value: &AttrValue) -> Option<Self> {
        match value {
            AttrValue::String(s) => Some(s.clone()),
            _ => None,
        }
    }

    fn into_attr(self) -> AttrValue {
        AttrValue::String(self)
    }
}

impl AttrType for bool {
    fn from_attr(value: &AttrValue) -> Option<Self> {
        match value {
            AttrValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    fn into_attr(self) -> AttrValue {
        AttrValue::Bool(self)
    }
}

impl AttrType for i32 {
    fn from_attr(value: &AttrValue) -> Option<Self> {
        match value {
            AttrValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    fn into_attr(self) -> AttrValue {
        AttrValue::Int(self)
    }
}

impl AttrType for DateTime<Utc> {
    fn from_attr(value: &AttrValue) -> Option<Self> {
        match value {
            AttrValue::Date(d) => Some(*d),
            _ => None,
        }
    }

    fn into_attr(self) -> AttrValue {
        AttrValue::Date(self)
    }
}

/// A typed attribute key.
///
/// The phantom parameter ties a key name to the value type read and
/// written under it.
pub struct Key<T> {
    name: &'static str,
    _marker: PhantomData<T>,
}

impl<T> Key<T> {
    /// Declare a key with the given wire name.
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _marker: PhantomData,
        }
    }

    /// The key's wire name.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> Clone for Key<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Key<T> {}

/// Attribute map of a single node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Attributes {
    #[serde(default)]
    entries: BTreeMap<String, AttrValue>,
}

impl Attributes {
    /// Create an empty attribute map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get an attribute value.
    pub fn get(&self, name: &str) -> Option<&AttrValue> {
        self.entries.get(name)
    }

    /// Set or clear an attribute. `None` removes the entry.
    ///
    /// Returns whether the stored value actually changed.
    pub fn set(&mut self, name: &str, value: Option<AttrValue>) -> bool {
        match value {
            Some(value) => {
                if self.entries.get(name) == Some(&value) {
                    false
                } else {
                    self.entries.insert(name.to_string(), value);
                    true
                }
            }
            None => self.entries.remove(name).is_some(),
        }
    }

    /// List all attribute names.
    pub fn names(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }
}

/// Keys understood by the mapper.
pub mod keys {
    use super::Key;
    use chrono::{DateTime, Utc};

    /// Component id visible to templates.
    pub const ID: Key<String> = Key::new("id");

    /// Component display name.
    pub const NAME: Key<String> = Key::new("name");

    /// Container kind marker ("dashboard" for dashboards).
    pub const TYPE: Key<String> = Key::new("type");

    /// Icon reference.
    pub const ICON: Key<String> = Key::new("icon");

    /// Container decorator.
    pub const DECORATOR: Key<String> = Key::new("decorator");

    /// Container render template.
    pub const TEMPLATE: Key<String> = Key::new("template");

    /// Factory id of the creating tool.
    pub const FACTORY_ID: Key<String> = Key::new("factory-id");

    /// Display title.
    pub const TITLE: Key<String> = Key::new("title");

    /// Description text.
    pub const DESCRIPTION: Key<String> = Key::new("description");

    /// Preferred width.
    pub const WIDTH: Key<String> = Key::new("width");

    /// Preferred height.
    pub const HEIGHT: Key<String> = Key::new("height");

    /// Access permission list, joined with `|`.
    pub const ACCESS_PERMISSIONS: Key<String> = Key::new("access-permissions");

    /// Edit permission.
    pub const EDIT_PERMISSION: Key<String> = Key::new("edit-permission");

    /// Site locale.
    pub const LOCALE: Key<String> = Key::new("locale");

    /// Site skin.
    pub const SKIN: Key<String> = Key::new("skin");

    /// Creating user.
    pub const CREATOR: Key<String> = Key::new("creator");

    /// Last modifying user.
    pub const MODIFIER: Key<String> = Key::new("modifier");

    /// Navigation node uri.
    pub const URI: Key<String> = Key::new("uri");

    /// Navigation node label.
    pub const LABEL: Key<String> = Key::new("label");

    /// Start of the publication window.
    pub const START_PUBLICATION_DATE: Key<DateTime<Utc>> = Key::new("start-publication-date");

    /// End of the publication window.
    pub const END_PUBLICATION_DATE: Key<DateTime<Utc>> = Key::new("end-publication-date");

    /// Whether the publication window is shown.
    pub const SHOW_PUBLICATION_DATE: Key<bool> = Key::new("show-publication-date");

    /// Navigation node visibility.
    pub const VISIBLE: Key<bool> = Key::new("visible");

    /// Navigation priority.
    pub const PRIORITY: Key<i32> = Key::new("priority");

    /// Whether the window info bar is shown.
    pub const SHOW_INFO_BAR: Key<bool> = Key::new("show-info-bar");

    /// Whether the window state controls are shown.
    pub const SHOW_STATE: Key<bool> = Key::new("show-state");

    /// Whether the window mode controls are shown.
    pub const SHOW_MODE: Key<bool> = Key::new("show-mode");

    /// Window theme.
    pub const THEME: Key<String> = Key::new("theme");

    /// Whether a page maximizes its active window.
    pub const SHOW_MAX_WINDOW: Key<bool> = Key::new("show-max-window");
}
