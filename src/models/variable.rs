//! Scoped variables and the update maps scripts produce.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Identifies one variable scope a store can load and update.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "scope", content = "id", rename_all = "snake_case")]
pub enum ScopeId {
    /// Environment variables, the highest stored precedence
    Environment(String),
    /// Collection variables
    Collection(String),
    /// Workspace ("global") variables
    Workspace(String),
}

impl ScopeId {
    pub fn id(&self) -> &str {
        match self {
            ScopeId::Environment(id) | ScopeId::Collection(id) | ScopeId::Workspace(id) => id,
        }
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScopeId::Environment(id) => write!(f, "environment {}", id),
            ScopeId::Collection(id) => write!(f, "collection {}", id),
            ScopeId::Workspace(id) => write!(f, "workspace {}", id),
        }
    }
}

/// Secret variables mask their value in Debug output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariableKind {
    #[default]
    Default,
    Secret,
}

/// One stored variable. Disabled variables are kept but never resolve.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variable {
    pub key: String,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub kind: VariableKind,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl Variable {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Variable {
            key: key.into(),
            value: value.into(),
            kind: VariableKind::Default,
            enabled: true,
        }
    }

    pub fn secret(key: impl Into<String>, value: impl Into<String>) -> Self {
        Variable {
            kind: VariableKind::Secret,
            ..Variable::new(key, value)
        }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

// Manual Debug so secret values cannot leak through log lines.
impl fmt::Debug for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shown = match self.kind {
            VariableKind::Secret => "***",
            VariableKind::Default => self.value.as_str(),
        };
        f.debug_struct("Variable")
            .field("key", &self.key)
            .field("value", &shown)
            .field("kind", &self.kind)
            .field("enabled", &self.enabled)
            .finish()
    }
}

/// One pending change a script requested for a scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum VarUpdate {
    Set { value: String },
    Unset,
}

/// Ordered key-to-update map produced by one script phase.
pub type VariableUpdates = IndexMap<String, VarUpdate>;

/// Applies an update map to a variable list. Set upserts (new keys arrive
/// enabled and non-secret, existing keys keep their kind and are re-enabled),
/// unset removes. Every scope holder must apply updates this way so the
/// in-memory view and the store stay in agreement.
pub fn apply_updates(vars: &mut Vec<Variable>, updates: &VariableUpdates) {
    for (key, update) in updates {
        match update {
            VarUpdate::Set { value } => {
                if let Some(existing) = vars.iter_mut().find(|v| v.key == *key) {
                    existing.value = value.clone();
                    existing.enabled = true;
                } else {
                    vars.push(Variable::new(key.clone(), value.clone()));
                }
            }
            VarUpdate::Unset => {
                vars.retain(|v| v.key != *key);
            }
        }
    }
}
