//! Volume category hierarchy
//!
//! Categories form a forest: each carries its own gain multiplier and an
//! optional parent. The effective gain of a category is the product of its
//! own gain and every ancestor's, times the global gain. Gain changes are
//! applied to live voices by the director immediately after `set_gain`,
//! using [`VolumeHierarchy::chain_contains`] to find affected voices.

use crate::catalog::CategoryDef;
use crate::{DirectorError, DirectorResult};
use log::warn;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone)]
struct CategoryNode {
    gain: f32,
    parent: Option<String>,
}

/// Resolved category tree with a global master gain
#[derive(Debug, Clone)]
pub struct VolumeHierarchy {
    categories: HashMap<String, CategoryNode>,
    global_gain: f32,
}

impl Default for VolumeHierarchy {
    fn default() -> Self {
        Self::new()
    }
}

impl VolumeHierarchy {
    /// Create an empty hierarchy with global gain 1.0
    pub fn new() -> Self {
        Self {
            categories: HashMap::new(),
            global_gain: 1.0,
        }
    }

    /// Build from category definitions, rejecting unknown parents and cycles
    pub fn from_defs(defs: &[CategoryDef]) -> DirectorResult<Self> {
        let names: HashSet<&str> = defs.iter().map(|d| d.name.as_str()).collect();
        let by_name: HashMap<&str, &CategoryDef> =
            defs.iter().map(|d| (d.name.as_str(), d)).collect();

        for def in defs {
            let mut seen = HashSet::new();
            seen.insert(def.name.as_str());
            let mut current = def;
            while let Some(parent_name) = current.parent.as_deref() {
                if !names.contains(parent_name) {
                    return Err(DirectorError::UnknownCategory(parent_name.to_string()));
                }
                if !seen.insert(parent_name) {
                    return Err(DirectorError::CategoryCycle(def.name.clone()));
                }
                current = by_name[parent_name];
            }
        }

        let categories = defs
            .iter()
            .map(|d| {
                (
                    d.name.clone(),
                    CategoryNode {
                        gain: d.gain,
                        parent: d.parent.clone(),
                    },
                )
            })
            .collect();

        Ok(Self {
            categories,
            global_gain: 1.0,
        })
    }

    /// Set a category's own gain; returns false if the category is unknown
    pub fn set_gain(&mut self, name: &str, value: f32) -> bool {
        match self.categories.get_mut(name) {
            Some(node) => {
                node.gain = value;
                true
            }
            None => {
                warn!("set_gain on unknown category '{name}'");
                false
            }
        }
    }

    /// A category's own gain (not the effective product)
    pub fn gain(&self, name: &str) -> Option<f32> {
        self.categories.get(name).map(|n| n.gain)
    }

    /// Set the global master gain
    #[inline]
    pub fn set_global_gain(&mut self, value: f32) {
        self.global_gain = value;
    }

    /// Global master gain
    #[inline]
    pub fn global_gain(&self) -> f32 {
        self.global_gain
    }

    /// Effective multiplicative gain for a category (global included)
    ///
    /// `None` or an unknown category resolves to the global gain alone.
    pub fn effective_gain(&self, category: Option<&str>) -> f32 {
        let mut gain = self.global_gain;
        let mut next = category;
        while let Some(name) = next {
            let Some(node) = self.categories.get(name) else {
                break;
            };
            gain *= node.gain;
            next = node.parent.as_deref();
        }
        gain
    }

    /// Whether `category`'s parent chain (itself included) contains `ancestor`
    pub fn chain_contains(&self, category: Option<&str>, ancestor: &str) -> bool {
        let mut next = category;
        while let Some(name) = next {
            if name == ancestor {
                return true;
            }
            next = self
                .categories
                .get(name)
                .and_then(|n| n.parent.as_deref());
        }
        false
    }

    /// Whether a category is defined
    pub fn contains(&self, name: &str) -> bool {
        self.categories.contains_key(name)
    }
}
