//! Run-wide aggregators shared by every file task.
//!
//! Each aggregator accepts concurrent inserts and is only read through a
//! sorted snapshot once every task has joined, so the aggregate content never
//! depends on task completion order.

use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::{DashMap, DashSet};
use serde::{Deserialize, Serialize};

use crate::registry::{ControlConverter, ControlRegistry};

/// Namespaces surfaced in the generated `_Imports.razor`.
#[derive(Default)]
pub struct ImportAggregator {
    imports: DashSet<String>,
}

impl ImportAggregator {
    pub fn add(&self, namespace: &str) -> bool {
        let namespace = namespace.trim();
        if namespace.is_empty() {
            return false;
        }
        self.imports.insert(namespace.to_string())
    }

    pub fn snapshot(&self) -> Vec<String> {
        sorted(self.imports.iter().map(|entry| entry.key().clone()))
    }
}

/// Package dependencies requested by converted controls.
#[derive(Default)]
pub struct PackageAggregator {
    packages: DashSet<String>,
}

impl PackageAggregator {
    pub fn add(&self, package: &str) -> bool {
        let package = package.trim();
        if package.is_empty() {
            return false;
        }
        self.packages.insert(package.to_string())
    }

    pub fn snapshot(&self) -> Vec<String> {
        sorted(self.packages.iter().map(|entry| entry.key().clone()))
    }
}

/// Hooks exposed by a converted root application class.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct StartupHooks {
    /// Fully qualified class name.
    pub class: String,
    pub configure_services: bool,
    pub configure: bool,
}

/// Contributions to `Program.cs` and `App.razor`.
#[derive(Default)]
pub struct StartupAggregator {
    middleware: DashSet<String>,
    layouts: DashSet<String>,
    startup: DashMap<String, StartupHooks>,
}

impl StartupAggregator {
    pub fn add_middleware(&self, class: &str) {
        self.middleware.insert(class.to_string());
    }

    pub fn add_layout(&self, layout: &str) {
        self.layouts.insert(layout.to_string());
    }

    pub fn add_startup(&self, hooks: StartupHooks) {
        self.startup.insert(hooks.class.clone(), hooks);
    }

    pub fn middleware(&self) -> Vec<String> {
        sorted(self.middleware.iter().map(|entry| entry.key().clone()))
    }

    pub fn layouts(&self) -> Vec<String> {
        sorted(self.layouts.iter().map(|entry| entry.key().clone()))
    }

    pub fn startup(&self) -> Vec<StartupHooks> {
        let mut hooks: Vec<_> = self
            .startup
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        hooks.sort();
        hooks
    }
}

/// Shared services injected into every file task.
#[derive(Clone, Default)]
pub struct MigrationServices {
    pub registry: Arc<ControlRegistry>,
    pub imports: Arc<ImportAggregator>,
    pub packages: Arc<PackageAggregator>,
    pub startup: Arc<StartupAggregator>,
}

impl MigrationServices {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read-only view of every aggregator. Only meaningful after the join.
    pub fn snapshot(&self) -> AggregateSnapshot {
        AggregateSnapshot {
            imports: self.imports.snapshot(),
            packages: self.packages.snapshot(),
            registry: self.registry.snapshot(),
            middleware: self.startup.middleware(),
            layouts: self.startup.layouts(),
            startup: self.startup.startup(),
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AggregateSnapshot {
    pub imports: Vec<String>,
    pub packages: Vec<String>,
    pub registry: BTreeMap<String, ControlConverter>,
    pub middleware: Vec<String>,
    pub layouts: Vec<String>,
    pub startup: Vec<StartupHooks>,
}

fn sorted(items: impl Iterator<Item = String>) -> Vec<String> {
    let mut items: Vec<String> = items.collect();
    items.sort();
    items
}
