//! Capabilities detected for an application.
//!
//! Capabilities are produced by an external analysis step and are only read
//! here. Both kinds are ordered so capability sets iterate the same way on
//! every run.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// A server capability requirement, e.g. a subsystem the application uses.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Layer {
    pub name: String,
}

impl Layer {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// A named extension within a family.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AddOn {
    pub family: String,
    pub name: String,
}

impl AddOn {
    pub fn new(family: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            family: family.into(),
            name: name.into(),
        }
    }
}

/// The capability a deployer was matched on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Capability {
    Layer(Layer),
    AddOn(AddOn),
}

impl Capability {
    /// The identifier handed to deployers.
    pub fn id(&self) -> &str {
        match self {
            Capability::Layer(layer) => &layer.name,
            Capability::AddOn(add_on) => &add_on.name,
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::Layer(layer) => write!(f, "layer {}", layer.name),
            Capability::AddOn(add_on) => write!(f, "add-on {}/{}", add_on.family, add_on.name),
        }
    }
}

/// Everything the analysis step detected for one application.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub layers: BTreeSet<Layer>,
    pub add_ons: BTreeSet<AddOn>,
}

impl Capabilities {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_layer(mut self, name: impl Into<String>) -> Self {
        self.layers.insert(Layer::new(name));
        self
    }

    pub fn with_add_on(mut self, family: impl Into<String>, name: impl Into<String>) -> Self {
        self.add_ons.insert(AddOn::new(family, name));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty() && self.add_ons.is_empty()
    }
}
