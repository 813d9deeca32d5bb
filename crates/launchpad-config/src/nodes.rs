// Helper functions for extracting values from KDL nodes

use kdl::KdlNode;
use std::collections::BTreeMap;

use crate::{ConfigError, ConfigResult};

pub(crate) fn get_first_string_arg(node: &KdlNode) -> Option<String> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_string())
        .map(|s| s.to_string())
}

pub(crate) fn get_all_string_args(node: &KdlNode) -> Vec<String> {
    node.entries()
        .iter()
        .filter(|e| e.name().is_none())
        .filter_map(|e| e.value().as_string())
        .map(|s| s.to_string())
        .collect()
}

pub(crate) fn get_first_integer_arg(node: &KdlNode) -> Option<i128> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_integer())
}

pub(crate) fn require_string_arg(node: &KdlNode, field: &str) -> ConfigResult<String> {
    get_first_string_arg(node).ok_or_else(|| ConfigError::MissingField(field.to_string()))
}

/// A flag node is true when present with no argument, otherwise its boolean
/// or string argument decides.
pub(crate) fn get_flag(node: &KdlNode) -> ConfigResult<bool> {
    let Some(entry) = node.entries().iter().find(|e| e.name().is_none()) else {
        return Ok(true);
    };
    if let Some(b) = entry.value().as_bool() {
        return Ok(b);
    }
    match entry.value().as_string() {
        Some("true") | Some("yes") | Some("on") => Ok(true),
        Some("false") | Some("no") | Some("off") => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            field: node.name().value().to_string(),
            message: format!("expected a boolean, got {}", entry.value()),
        }),
    }
}

pub(crate) fn get_positive_integer(node: &KdlNode, field: &str) -> ConfigResult<u64> {
    let value =
        get_first_integer_arg(node).ok_or_else(|| ConfigError::MissingField(field.to_string()))?;
    u64::try_from(value)
        .ok()
        .filter(|v| *v > 0)
        .ok_or_else(|| ConfigError::InvalidValue {
            field: field.to_string(),
            message: format!("expected a positive integer, got {}", value),
        })
}

/// Child nodes of the form `KEY "value"`.
pub(crate) fn get_string_map(node: &KdlNode) -> ConfigResult<BTreeMap<String, String>> {
    let mut map = BTreeMap::new();
    if let Some(children) = node.children() {
        for child in children.nodes() {
            let key = child.name().value().to_string();
            let value = get_first_string_arg(child).ok_or_else(|| ConfigError::InvalidValue {
                field: key.clone(),
                message: "expected a string value".to_string(),
            })?;
            map.insert(key, value);
        }
    }
    Ok(map)
}
