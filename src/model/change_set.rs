use serde_json::{Map, Value};

use crate::model::KeyValue;

/// The entity an update or delete applies to
#[derive(Debug, Clone, PartialEq)]
pub enum EntityTarget {
    Keyed { entity_set: String, key: KeyValue },
    Singleton(String),
}

impl std::fmt::Display for EntityTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            EntityTarget::Keyed { entity_set, key } => write!(f, "{}({})", entity_set, key),
            EntityTarget::Singleton(name) => write!(f, "{}", name),
        }
    }
}

/// One pending create, update, delete or action invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeSetEntry {
    Create {
        entity_set: String,
        entity: Map<String, Value>,
    },
    Update {
        target: EntityTarget,
        entity: Map<String, Value>,
        /// Full replacement (PUT) rather than a merge (PATCH)
        replace: bool,
        if_match: Option<String>,
    },
    Delete {
        target: EntityTarget,
        if_match: Option<String>,
    },
    Invoke {
        operation: String,
        /// Entity the action is bound to, if any
        bound_to: Option<EntityTarget>,
        parameters: Map<String, Value>,
    },
}

impl ChangeSetEntry {
    pub fn describe(&self) -> String {
        match self {
            ChangeSetEntry::Create { entity_set, .. } => format!("create in {}", entity_set),
            ChangeSetEntry::Update {
                target, replace, ..
            } => {
                if *replace {
                    format!("replace {}", target)
                } else {
                    format!("merge {}", target)
                }
            }
            ChangeSetEntry::Delete { target, .. } => format!("delete {}", target),
            ChangeSetEntry::Invoke { operation, .. } => format!("invoke {}", operation),
        }
    }
}

/// Ordered collection of pending entries submitted as one unit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    pub entries: Vec<ChangeSetEntry>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(entry: ChangeSetEntry) -> Self {
        Self {
            entries: vec![entry],
        }
    }

    /// Append an entry, returning its position in the set
    pub fn push(&mut self, entry: ChangeSetEntry) -> usize {
        self.entries.push(entry);
        self.entries.len() - 1
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Outcome of a single applied entry
#[derive(Debug, Clone, PartialEq)]
pub enum EntryResult {
    Created(Value),
    Updated(Value),
    Deleted,
    Invoked(Option<Value>),
}

/// Result of a successful submission, positionally aligned with the change set
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubmitResult {
    pub entries: Vec<EntryResult>,
}

impl SubmitResult {
    pub fn get(&self, index: usize) -> Option<&EntryResult> {
        self.entries.get(index)
    }
}
