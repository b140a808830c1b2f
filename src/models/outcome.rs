//! Script outcomes: test entries, console capture, and the variable
//! updates a script phase requested.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::models::variable::VariableUpdates;

/// Which script slot an outcome came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptPhase {
    PreRequest,
    Test,
}

impl ScriptPhase {
    /// Display name, also used for synthetic failure entries when a
    /// script throws outside any test block.
    pub fn label(&self) -> &'static str {
        match self {
            ScriptPhase::PreRequest => "Pre-request script",
            ScriptPhase::Test => "Test script",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleLevel {
    Log,
    Info,
    Warn,
    Error,
    Debug,
}

/// One captured console call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsoleLine {
    pub level: ConsoleLevel,
    pub message: String,
}

/// Result of one `test(name, fn)` block, or a synthetic entry for a
/// script-level failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestEntry {
    pub name: String,
    pub passed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Aggregated outcome of the script phases that ran for one execution.
/// The update maps record what the scripts changed; the engine persists
/// them as each phase finishes, so by the time a caller sees this they
/// have already been applied.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestOutcome {
    pub tests: Vec<TestEntry>,
    pub passed: usize,
    pub failed: usize,
    pub elapsed_ms: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub console: Vec<ConsoleLine>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub environment_updates: VariableUpdates,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub collection_updates: VariableUpdates,
}

impl TestOutcome {
    /// Appends a synthetic failing entry, such as a phase-level throw.
    pub fn push_failure(&mut self, name: impl Into<String>, message: impl Into<String>) {
        self.tests.push(TestEntry {
            name: name.into(),
            passed: false,
            error: Some(message.into()),
        });
        self.failed += 1;
    }

    /// Folds a later phase into this one: entries and console lines are
    /// concatenated, counts and elapsed summed, and the later phase wins
    /// per key in the update maps.
    pub fn merge(mut self, later: TestOutcome) -> TestOutcome {
        self.tests.extend(later.tests);
        self.console.extend(later.console);
        self.passed += later.passed;
        self.failed += later.failed;
        self.elapsed_ms += later.elapsed_ms;
        for (key, update) in later.environment_updates {
            self.environment_updates.insert(key, update);
        }
        for (key, update) in later.collection_updates {
            self.collection_updates.insert(key, update);
        }
        self
    }

    pub fn all_passed(&self) -> bool {
        self.failed == 0
    }
}
