//! Logical device directory.
//!
//! Maps the single-character ids used on the remote-control link to physical
//! endpoints. Loaded from settings once and never mutated afterwards.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// What a logical id stands for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceTarget {
    /// A BLE peripheral address
    Address(String),
    /// Hardware wired to the hub itself (e.g. the locks)
    Local,
    /// Every connected remote controller
    AllControllers,
}

#[derive(Debug, Clone, Default)]
pub struct Directory {
    by_id: BTreeMap<char, DeviceTarget>,
    by_address: BTreeMap<String, char>,
}

impl Directory {
    pub fn new(entries: impl IntoIterator<Item = (char, DeviceTarget)>) -> Self {
        let mut by_id = BTreeMap::new();
        let mut by_address = BTreeMap::new();
        for (id, target) in entries {
            if let DeviceTarget::Address(address) = &target {
                by_address.insert(normalize_address(address), id);
            }
            by_id.insert(id, target);
        }
        Self { by_id, by_address }
    }

    pub fn target(&self, id: char) -> Option<&DeviceTarget> {
        self.by_id.get(&id)
    }

    pub fn address_of(&self, id: char) -> Option<&str> {
        match self.by_id.get(&id) {
            Some(DeviceTarget::Address(address)) => Some(address),
            _ => None,
        }
    }

    pub fn id_for_address(&self, address: &str) -> Option<char> {
        self.by_address.get(&normalize_address(address)).copied()
    }

    /// Sorted ids of the given live addresses; unknown addresses are skipped
    pub fn summarize<'a>(&self, addresses: impl IntoIterator<Item = &'a String>) -> String {
        let mut ids: Vec<char> = addresses
            .into_iter()
            .filter_map(|address| self.id_for_address(address))
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids.into_iter().collect()
    }
}

fn normalize_address(address: &str) -> String {
    address.to_ascii_lowercase()
}
