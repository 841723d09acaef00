use crate::error::{Error, Result};
use crate::node::{NsId, MAX_NAMESPACES};
use std::collections::BTreeMap;
use std::path::Path;

/// Name used for the single namespace of a graph loaded without a config.
pub const EMPTY_CONFIG_NAME: &str = "EMPTY_CONFIG_FILE";

/// Namespace id to human-readable name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceTable {
    id_name_map: BTreeMap<NsId, String>,
}

impl NamespaceTable {
    /// One namespace, id 0.
    pub fn single() -> Self {
        let mut id_name_map = BTreeMap::new();
        id_name_map.insert(0, EMPTY_CONFIG_NAME.to_string());
        NamespaceTable { id_name_map }
    }

    pub fn from_pairs<I, S>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, NsId)>,
        S: Into<String>,
    {
        let mut id_name_map = BTreeMap::new();
        let mut names = std::collections::HashSet::new();
        for (name, id) in pairs {
            let name = name.into();
            if id as usize >= MAX_NAMESPACES {
                return Err(Error::config(format!(
                    "namespace id {} exceeds {}",
                    id,
                    MAX_NAMESPACES - 1
                )));
            }
            if !names.insert(name.clone()) {
                return Err(Error::config(format!("duplicate namespace name: {}", name)));
            }
            if id_name_map.insert(id, name).is_some() {
                return Err(Error::config(format!("duplicate namespace id: {}", id)));
            }
        }
        if id_name_map.is_empty() {
            return Ok(Self::single());
        }
        Ok(NamespaceTable { id_name_map })
    }

    /// Parses `name id` lines. Blank lines and `#` comments are skipped.
    pub fn parse(text: &str) -> Result<Self> {
        let mut pairs = Vec::new();
        for (lineno, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut parts = line.split_whitespace();
            let (Some(name), Some(id), None) = (parts.next(), parts.next(), parts.next()) else {
                return Err(Error::config(format!(
                    "namespace config line {}: expected `name id`, got `{}`",
                    lineno + 1,
                    line
                )));
            };
            let id: NsId = id.parse().map_err(|_| {
                Error::config(format!(
                    "namespace config line {}: bad id `{}`",
                    lineno + 1,
                    id
                ))
            })?;
            pairs.push((name.to_string(), id));
        }
        Self::from_pairs(pairs)
    }

    /// Reads the config at `path`, or falls back to a single namespace.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::parse(&std::fs::read_to_string(path)?),
            None => Ok(Self::single()),
        }
    }

    /// Highest namespace id plus one.
    pub fn ns_size(&self) -> usize {
        self.id_name_map
            .keys()
            .next_back()
            .map(|&id| id as usize + 1)
            .unwrap_or(0)
    }

    pub fn contains(&self, ns: NsId) -> bool {
        self.id_name_map.contains_key(&ns)
    }

    pub fn name(&self, ns: NsId) -> Option<&str> {
        self.id_name_map.get(&ns).map(String::as_str)
    }

    pub fn id_name_map(&self) -> &BTreeMap<NsId, String> {
        &self.id_name_map
    }
}
