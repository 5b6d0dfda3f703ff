//! Projection of host properties onto a native node.
//!
//! - `on<Upper>...` keys bind listeners under the lower-cased remainder
//! - `children` and `ref` are never projected
//! - `className` goes through the class property
//! - every other key is hyphenated and set as an attribute

use tracing::{trace, warn};

use super::{RenderTarget, TargetNode};
use crate::element::{Props, Value};

const RESERVED_KEYS: [&str; 2] = ["children", "ref"];

/// Event name bound by a property key: `onKeyUp` binds `keyup`.
///
/// Only keys starting with `on` followed by an upper-case letter are events.
pub fn event_name(key: &str) -> Option<String> {
    let rest = key.strip_prefix("on")?;
    let first = rest.chars().next()?;
    first.is_ascii_uppercase().then(|| rest.to_ascii_lowercase())
}

/// Attribute name for a camel-case property key: `dataTestId` becomes
/// `data-test-id`.
pub fn attribute_name(key: &str) -> String {
    let mut name = String::with_capacity(key.len() + 4);
    let mut previous: Option<char> = None;
    for c in key.chars() {
        if c.is_ascii_uppercase() && previous.is_some_and(|p| p.is_ascii_lowercase()) {
            name.push('-');
        }
        name.push(c.to_ascii_lowercase());
        previous = Some(c);
    }
    name
}

/// Bring `node`'s attributes and listeners from `old` to `new`.
///
/// `old` is `None` for a freshly created node. Unchanged values (by strict
/// equality) are left alone; removed keys are unbound.
pub(crate) fn apply_props(
    target: &dyn RenderTarget,
    node: TargetNode,
    old: Option<&Props>,
    new: &Props,
) {
    if let Some(old) = old {
        for (key, value) in old.iter() {
            if RESERVED_KEYS.contains(&key) || new.contains_key(key) {
                continue;
            }
            remove_prop(target, node, key, value);
        }
    }

    for (key, value) in new.iter() {
        if RESERVED_KEYS.contains(&key) {
            continue;
        }
        let previous = old.and_then(|o| o.get(key));
        if previous == Some(value) {
            continue;
        }

        if let Some(event) = event_name(key) {
            if let Some(Value::Handler(stale)) = previous {
                target.remove_listener(node, &event, stale);
            }
            match value {
                Value::Handler(handler) => {
                    trace!(%node, event = %event, "binding listener");
                    target.add_listener(node, &event, handler.clone());
                }
                other => warn!(%node, key, value = ?other, "event property is not a handler"),
            }
            continue;
        }

        if key == "className" {
            target.set_class_name(node, &value.to_text().unwrap_or_default());
            continue;
        }

        let name = attribute_name(key);
        match value {
            Value::Null => target.remove_attribute(node, &name),
            other => match other.to_text() {
                Some(text) => target.set_attribute(node, &name, &text),
                None => warn!(%node, key, "property has no attribute form, skipping"),
            },
        }
    }
}

fn remove_prop(target: &dyn RenderTarget, node: TargetNode, key: &str, value: &Value) {
    if let Some(event) = event_name(key) {
        if let Value::Handler(handler) = value {
            target.remove_listener(node, &event, handler);
        }
    } else if key == "className" {
        target.set_class_name(node, "");
    } else {
        target.remove_attribute(node, &attribute_name(key));
    }
}
