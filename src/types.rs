//! Shared data types for the dev-runner backend
//!
//! This module contains all serializable types used across the crate:
//! - App definitions (AppDef)
//! - Port pools (PortCategory, PortSet)
//! - The persisted snapshot (Snapshot)
//! - The aggregate state pushed to observers (AggregateState)

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

/// Token inside a command that is replaced with the assigned port at launch time
pub const PORT_PLACEHOLDER: &str = "{PORT}";

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

pub fn default_app_type() -> String {
    "Service".to_string()
}

pub fn default_app_icon() -> String {
    "box".to_string()
}

// ============================================================================
// APP TYPES
// ============================================================================

/// A launchable unit declared by the user (or created from detection)
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct AppDef {
    pub id: String,
    pub name: String,
    #[serde(rename = "type", default = "default_app_type")]
    pub app_type: String,
    #[serde(default = "default_app_icon")]
    pub icon: String,
    /// Executable and arguments; may contain `{PORT}`
    pub command: String,
    /// Working directory. Empty means the supervisor's own directory.
    #[serde(default)]
    pub cwd: String,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Stack name the app was detected as (empty when entered by hand)
    #[serde(default)]
    pub framework: String,
}

/// Fields accepted when creating or patching an app. Absent fields are left
/// unchanged on update and take their defaults on create.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct AppInput {
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub app_type: Option<String>,
    pub icon: Option<String>,
    pub command: Option<String>,
    pub cwd: Option<String>,
    pub env: Option<BTreeMap<String, String>>,
    pub framework: Option<String>,
}

impl AppInput {
    /// Overwrite the fields of `app` that are present in this input
    pub fn apply_to(self, app: &mut AppDef) {
        if let Some(name) = self.name {
            app.name = name;
        }
        if let Some(app_type) = self.app_type {
            app.app_type = app_type;
        }
        if let Some(icon) = self.icon {
            app.icon = icon;
        }
        if let Some(command) = self.command {
            app.command = command;
        }
        if let Some(cwd) = self.cwd {
            app.cwd = cwd;
        }
        if let Some(env) = self.env {
            app.env = env;
        }
        if let Some(framework) = self.framework {
            app.framework = framework;
        }
    }
}

// ============================================================================
// PORT TYPES
// ============================================================================

/// UI grouping for a registered port
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PortCategory {
    Frontend,
    Backend,
}

impl FromStr for PortCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "frontend" => Ok(PortCategory::Frontend),
            "backend" => Ok(PortCategory::Backend),
            other => Err(format!("Unknown port category: {}", other)),
        }
    }
}

/// Registered ports grouped by category.
///
/// A port number appears at most once across both lists.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct PortSet {
    #[serde(default)]
    pub frontend: Vec<u16>,
    #[serde(default)]
    pub backend: Vec<u16>,
}

impl PortSet {
    pub fn contains(&self, port: u16) -> bool {
        self.category_of(port).is_some()
    }

    pub fn category_of(&self, port: u16) -> Option<PortCategory> {
        if self.frontend.contains(&port) {
            Some(PortCategory::Frontend)
        } else if self.backend.contains(&port) {
            Some(PortCategory::Backend)
        } else {
            None
        }
    }

    fn list_mut(&mut self, category: PortCategory) -> &mut Vec<u16> {
        match category {
            PortCategory::Frontend => &mut self.frontend,
            PortCategory::Backend => &mut self.backend,
        }
    }

    /// Insert a port keeping the category sorted. Returns false if the port
    /// is already registered under any category.
    pub fn insert(&mut self, category: PortCategory, port: u16) -> bool {
        if self.contains(port) {
            return false;
        }
        let list = self.list_mut(category);
        list.push(port);
        list.sort_unstable();
        true
    }

    /// Remove a port from whichever category holds it
    pub fn remove(&mut self, port: u16) -> bool {
        let before = self.frontend.len() + self.backend.len();
        self.frontend.retain(|p| *p != port);
        self.backend.retain(|p| *p != port);
        before != self.frontend.len() + self.backend.len()
    }
}

// ============================================================================
// SNAPSHOT & STATE TYPES
// ============================================================================

/// The persisted JSON document (apps.json)
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct Snapshot {
    #[serde(default)]
    pub apps: Vec<AppDef>,
    #[serde(default)]
    pub ports: PortSet,
    /// port → app id
    #[serde(default)]
    pub assignments: BTreeMap<u16, String>,
}

/// Derived status of an assignment
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AssignmentStatus {
    /// Recorded, but no live process backs it
    Assigned,
    Running,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentView {
    pub app_id: String,
    pub status: AssignmentStatus,
    pub app: Option<AppDef>,
}

/// Full aggregate pushed with every `state` event
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct AggregateState {
    pub apps: Vec<AppDef>,
    pub ports: PortSet,
    pub assignments: BTreeMap<u16, AssignmentView>,
}

impl AggregateState {
    pub fn running_count(&self) -> usize {
        self.assignments
            .values()
            .filter(|a| a.status == AssignmentStatus::Running)
            .count()
    }
}

// ============================================================================
// TESTS
// ============================================================================
