//! Differ - Compare desired configuration with recorded state
//!
//! Produces the per-resource action (create, update, replace, no-op) and the
//! set of changed attributes that drives partial updates.

use std::collections::{BTreeSet, HashMap};

use crate::resource::{Resource, ResourceId, State, Value};
use crate::schema::ResourceSchema;

/// Result of a diff operation
#[derive(Debug, Clone, PartialEq)]
pub enum Diff {
    /// Resource does not exist -> needs creation
    Create(Resource),
    /// Resource exists with in-place updatable differences
    Update {
        id: ResourceId,
        from: State,
        to: Resource,
        changed_attributes: Vec<String>,
    },
    /// A force-new attribute changed -> delete and create again
    Replace {
        from: State,
        to: Resource,
        changed_attributes: Vec<String>,
    },
    /// Resource exists with no differences -> no action needed
    NoChange(ResourceId),
}

impl Diff {
    /// Returns whether this Diff involves a change
    pub fn is_change(&self) -> bool {
        !matches!(self, Diff::NoChange(_))
    }
}

/// Compare desired state with current state to compute a Diff
pub fn diff(schema: &ResourceSchema, desired: &Resource, current: &State) -> Diff {
    if !current.exists {
        return Diff::Create(desired.clone());
    }

    let changed = changed_attributes(&current.attributes, &desired.attributes);

    if changed.is_empty() {
        return Diff::NoChange(desired.id.clone());
    }

    let force_new = schema.force_new_attributes();
    if changed.iter().any(|name| force_new.contains(&name.as_str())) {
        Diff::Replace {
            from: current.clone(),
            to: desired.clone(),
            changed_attributes: changed,
        }
    } else {
        Diff::Update {
            id: desired.id.clone(),
            from: current.clone(),
            to: desired.clone(),
            changed_attributes: changed,
        }
    }
}

/// Find attributes that differ between the current and desired attributes
///
/// Both key sets are considered, so removing an attribute counts as a change.
/// An absent attribute equals null or an empty collection. The result is sorted.
pub fn changed_attributes(
    current: &HashMap<String, Value>,
    desired: &HashMap<String, Value>,
) -> Vec<String> {
    let keys: BTreeSet<&String> = current.keys().chain(desired.keys()).collect();

    keys.into_iter()
        .filter(|key| {
            match (current.get(*key), desired.get(*key)) {
                (Some(a), Some(b)) if a == b => false,
                (Some(v), None) | (None, Some(v)) => !v.is_empty(),
                (Some(a), Some(b)) => !(a.is_empty() && b.is_empty()),
                (None, None) => false,
            }
        })
        .cloned()
        .collect()
}

/// Changed attributes together with their previously recorded values
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    changed: BTreeSet<String>,
    prior: HashMap<String, Value>,
}

impl ChangeSet {
    /// Compute the change set between recorded and desired attributes
    pub fn between(prior: &HashMap<String, Value>, desired: &HashMap<String, Value>) -> Self {
        Self {
            changed: changed_attributes(prior, desired).into_iter().collect(),
            prior: prior.clone(),
        }
    }

    /// Whether the named attribute changed
    pub fn has_change(&self, name: &str) -> bool {
        self.changed.contains(name)
    }

    /// Whether any of the named attributes changed
    pub fn has_changes(&self, names: &[&str]) -> bool {
        names.iter().any(|n| self.has_change(n))
    }

    /// Previously recorded value of an attribute
    pub fn prior(&self, name: &str) -> Option<&Value> {
        self.prior.get(name)
    }

    pub fn changed(&self) -> impl Iterator<Item = &str> {
        self.changed.iter().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.changed.is_empty()
    }
}
