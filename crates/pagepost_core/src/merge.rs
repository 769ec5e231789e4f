use std::fs;
use std::path::Path;

use indexmap::IndexMap;
use toml::Value;

use crate::error::{PostError, Result};

const ROOT_PATH: &str = "<root>";

/// One node of a partially specified configuration.
///
/// Tables keep the order their keys were first seen in, so page order in the
/// least specific layer that defines a page is the order the page is
/// processed in.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigNode {
    /// Any TOML value that is not a table. Arrays are leaves.
    Scalar(Value),
    Table(IndexMap<String, ConfigNode>),
}

impl ConfigNode {
    pub fn empty_table() -> Self {
        Self::Table(IndexMap::new())
    }

    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Table(table) => Self::Table(
                table
                    .into_iter()
                    .map(|(key, value)| (key, Self::from_value(value)))
                    .collect(),
            ),
            other => Self::Scalar(other),
        }
    }

    pub fn into_value(self) -> Value {
        match self {
            Self::Scalar(value) => value,
            Self::Table(entries) => {
                let mut table = toml::Table::new();
                for (key, node) in entries {
                    table.insert(key, node.into_value());
                }
                Value::Table(table)
            }
        }
    }

    /// Parse one TOML source. The document root is always a table.
    pub fn parse(text: &str, origin: &Path) -> Result<Self> {
        let table =
            toml::from_str::<toml::Table>(text).map_err(|error| PostError::ConfigParse {
                path: origin.to_path_buf(),
                detail: error.to_string(),
            })?;
        Ok(Self::from_value(Value::Table(table)))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|error| PostError::io(path, error))?;
        Self::parse(&text, path)
    }

    pub fn as_table(&self) -> Option<&IndexMap<String, ConfigNode>> {
        match self {
            Self::Table(entries) => Some(entries),
            Self::Scalar(_) => None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&ConfigNode> {
        self.as_table().and_then(|entries| entries.get(key))
    }

    /// Build a nested table holding `value` at the dotted `path`.
    pub fn at_path(path: &[&str], value: Value) -> Self {
        path.iter()
            .rev()
            .fold(Self::Scalar(value), |node, key| {
                let mut entries = IndexMap::new();
                entries.insert((*key).to_string(), node);
                Self::Table(entries)
            })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Scalar(value) => value.type_str(),
            Self::Table(_) => "table",
        }
    }
}

/// Merge `overlay` on top of `base`.
///
/// Tables are unioned recursively; for scalars present on both sides the
/// overlay wins, provided both scalars have the same TOML type. A table on
/// one side facing a scalar on the other is a structure error.
pub fn merge(base: ConfigNode, overlay: ConfigNode) -> Result<ConfigNode> {
    let mut path = Vec::new();
    merge_at(&mut path, base, overlay)
}

/// Fold `merge` left to right over layers ordered from least to most specific.
pub fn merge_layers<I>(layers: I) -> Result<ConfigNode>
where
    I: IntoIterator<Item = ConfigNode>,
{
    layers
        .into_iter()
        .try_fold(ConfigNode::empty_table(), merge)
}

fn merge_at(path: &mut Vec<String>, base: ConfigNode, overlay: ConfigNode) -> Result<ConfigNode> {
    match (base, overlay) {
        (ConfigNode::Table(mut base_entries), ConfigNode::Table(overlay_entries)) => {
            for (key, overlay_node) in overlay_entries {
                match base_entries.get_mut(&key) {
                    Some(slot) => {
                        let base_node = std::mem::replace(slot, ConfigNode::empty_table());
                        path.push(key);
                        *slot = merge_at(path, base_node, overlay_node)?;
                        path.pop();
                    }
                    None => {
                        base_entries.insert(key, overlay_node);
                    }
                }
            }
            Ok(ConfigNode::Table(base_entries))
        }
        (ConfigNode::Scalar(base_value), ConfigNode::Scalar(overlay_value)) => {
            if base_value.type_str() == overlay_value.type_str() {
                Ok(ConfigNode::Scalar(overlay_value))
            } else {
                Err(PostError::type_error(
                    display_path(path),
                    format!(
                        "{} in one layer, {} in another",
                        base_value.type_str(),
                        overlay_value.type_str()
                    ),
                ))
            }
        }
        (base, overlay) => {
            let scalar_kind = match (&base, &overlay) {
                (ConfigNode::Scalar(value), _) | (_, ConfigNode::Scalar(value)) => value.type_str(),
                _ => "table",
            };
            Err(PostError::structure(
                display_path(path),
                format!("is a section in one layer but a {scalar_kind} in another"),
            ))
        }
    }
}

fn display_path(path: &[String]) -> String {
    if path.is_empty() {
        ROOT_PATH.to_string()
    } else {
        path.join(".")
    }
}
