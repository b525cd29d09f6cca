//! Site dictionaries: sensor and flowtype ids resolved to names.
//!
//! The engine treats both ids as opaque and never validates them against a
//! dictionary; resolution is a display concern for the tools.  The map
//! loads from a JSON file of the shape
//!
//! ```json
//! {
//!   "sensors": { "11": "S11-border" },
//!   "flowtypes": { "4": { "class": "all", "type": "inweb" } }
//! }
//! ```

use std::collections::HashMap;
use std::io;
use std::path::Path;

use serde::Deserialize;

use crate::error::Result;

#[derive(Debug, Clone, Deserialize)]
pub struct FlowtypeName {
    pub class: String,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SiteMap {
    #[serde(default)]
    sensors: HashMap<u16, String>,
    #[serde(default)]
    flowtypes: HashMap<u8, FlowtypeName>,
}

impl SiteMap {
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read(path)?;
        let map = serde_json::from_slice(&data)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        Ok(map)
    }

    pub fn resolve_sensor_name(&self, id: u16) -> Option<&str> {
        self.sensors.get(&id).map(String::as_str)
    }

    /// Resolves a flowtype id to its `(class, type)` pair.
    pub fn resolve_flowtype(&self, id: u8) -> Option<(&str, &str)> {
        self.flowtypes
            .get(&id)
            .map(|f| (f.class.as_str(), f.kind.as_str()))
    }

    pub fn add_sensor(&mut self, id: u16, name: impl Into<String>) {
        self.sensors.insert(id, name.into());
    }

    pub fn add_flowtype(&mut self, id: u8, class: impl Into<String>, kind: impl Into<String>) {
        self.flowtypes.insert(
            id,
            FlowtypeName {
                class: class.into(),
                kind: kind.into(),
            },
        );
    }
}
