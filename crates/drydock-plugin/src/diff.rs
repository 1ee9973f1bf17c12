//! Desired vs. current state comparison
//!
//! A [`ResourceDiff`] is never persisted. Only its fingerprint is, so the
//! actuator can recognise a delta it has already acted on.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use sha2::{Digest, Sha256};

/// How a single path differs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffKind {
    /// Present in desired only
    Added,
    /// Present in current only
    Removed,
    /// Present in both with different values
    Changed,
}

/// One differing leaf
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffEntry {
    /// JSON pointer style path, `/` for the root
    pub path: String,
    pub kind: DiffKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub desired: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current: Option<Value>,
}

/// Comparison of a resource's desired and current state
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceDiff {
    pub desired: Value,
    pub current: Option<Value>,
    entries: Vec<DiffEntry>,
}

impl ResourceDiff {
    /// Compare desired against current
    #[must_use]
    pub fn compute(desired: Value, current: Option<Value>) -> Self {
        let mut entries = Vec::new();
        if let Some(current) = &current {
            walk("", Some(&desired), Some(current), &mut entries);
        }
        Self {
            desired,
            current,
            entries,
        }
    }

    /// The resource does not exist yet
    #[must_use]
    pub fn is_missing(&self) -> bool {
        self.current.is_none()
    }

    /// Something needs actuating
    #[must_use]
    pub fn has_changes(&self) -> bool {
        self.is_missing() || !self.entries.is_empty()
    }

    #[must_use]
    pub fn entries(&self) -> &[DiffEntry] {
        &self.entries
    }

    /// Stable hash of the delta
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let canonical = if self.is_missing() {
            json!({ "missing": self.desired })
        } else {
            json!({ "entries": self.entries })
        };

        // serde_json maps are ordered, so the encoding is deterministic
        let bytes = serde_json::to_vec(&canonical).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        format!("{:x}", hasher.finalize())
    }

    /// Delta as reported in `ResourceDeltaDetected` events
    #[must_use]
    pub fn to_delta(&self) -> Value {
        let mut delta = Map::new();
        for entry in &self.entries {
            delta.insert(
                entry.path.clone(),
                json!({
                    "state": entry.kind,
                    "desired": entry.desired,
                    "current": entry.current,
                }),
            );
        }
        Value::Object(delta)
    }
}

fn walk(path: &str, desired: Option<&Value>, current: Option<&Value>, out: &mut Vec<DiffEntry>) {
    match (desired, current) {
        (None, None) => {}
        (Some(d), None) => out.push(entry(path, DiffKind::Added, Some(d), None)),
        (None, Some(c)) => out.push(entry(path, DiffKind::Removed, None, Some(c))),
        (Some(Value::Object(d)), Some(Value::Object(c))) => {
            let keys: BTreeSet<&String> = d.keys().chain(c.keys()).collect();
            for key in keys {
                walk(&format!("{path}/{key}"), d.get(key), c.get(key), out);
            }
        }
        (Some(Value::Array(d)), Some(Value::Array(c))) => {
            for idx in 0..d.len().max(c.len()) {
                walk(&format!("{path}/{idx}"), d.get(idx), c.get(idx), out);
            }
        }
        (Some(d), Some(c)) => {
            if d != c {
                out.push(entry(path, DiffKind::Changed, Some(d), Some(c)));
            }
        }
    }
}

fn entry(path: &str, kind: DiffKind, desired: Option<&Value>, current: Option<&Value>) -> DiffEntry {
    DiffEntry {
        path: if path.is_empty() { "/".to_string() } else { path.to_string() },
        kind,
        desired: desired.cloned(),
        current: current.cloned(),
    }
}
