use itertools::Itertools;
use serde::{Deserialize, Serialize};

/// Path template of the service root
pub const SERVICE_ROOT_TEMPLATE: &str = "~";
/// Path template of the metadata document
pub const METADATA_TEMPLATE: &str = "~/$metadata";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    /// Side-effecting operation invoked via POST
    Action,
    /// Read-only operation invoked via GET
    Function,
}

/// A single typed segment of a parsed resource path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    EntitySet(String),
    Singleton(String),
    Key(KeyValue),
    Property(String),
    /// Navigation or any other segment routing does not look into
    Navigation(String),
    /// Operation bound to the preceding segment. `candidates` holds the kinds
    /// of every overload the name resolved to, in model order.
    Operation {
        name: String,
        candidates: Vec<OperationKind>,
    },
    OperationImport {
        name: String,
        candidates: Vec<OperationKind>,
    },
    Metadata,
    Batch,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeyValue {
    Int(i64),
    String(String),
}

impl std::fmt::Display for KeyValue {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            KeyValue::Int(value) => write!(f, "{}", value),
            KeyValue::String(value) => write!(f, "'{}'", value),
        }
    }
}

impl KeyValue {
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            KeyValue::Int(value) => serde_json::Value::from(*value),
            KeyValue::String(value) => serde_json::Value::from(value.clone()),
        }
    }

    /// Key value read back from an entity property
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Number(n) => n.as_i64().map(KeyValue::Int),
            serde_json::Value::String(s) => Some(KeyValue::String(s.clone())),
            _ => None,
        }
    }
}

impl PathSegment {
    /// Template fragment used to build [`ResourcePath::template`]
    pub fn template(&self) -> &'static str {
        match self {
            PathSegment::EntitySet(_) => "entityset",
            PathSegment::Singleton(_) => "singleton",
            PathSegment::Key(_) => "key",
            PathSegment::Property(_) => "property",
            PathSegment::Navigation(_) => "navigation",
            PathSegment::Operation { candidates, .. } => match candidates.first() {
                Some(OperationKind::Action) => "action",
                _ => "function",
            },
            PathSegment::OperationImport { candidates, .. } => match candidates.first() {
                Some(OperationKind::Action) => "unboundaction",
                _ => "unboundfunction",
            },
            PathSegment::Metadata => "$metadata",
            PathSegment::Batch => "$batch",
        }
    }

    /// Identifier of the segment as it appeared in the URL
    pub fn identifier(&self) -> String {
        match self {
            PathSegment::EntitySet(name)
            | PathSegment::Singleton(name)
            | PathSegment::Property(name)
            | PathSegment::Navigation(name) => name.clone(),
            PathSegment::Operation { name, .. } | PathSegment::OperationImport { name, .. } => {
                name.clone()
            }
            PathSegment::Key(key) => key.to_string(),
            PathSegment::Metadata => "$metadata".to_string(),
            PathSegment::Batch => "$batch".to_string(),
        }
    }
}

/// Ordered sequence of path segments. An empty path denotes the service root.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourcePath {
    pub segments: Vec<PathSegment>,
}

impl ResourcePath {
    pub fn new(segments: Vec<PathSegment>) -> Self {
        Self { segments }
    }

    pub fn root() -> Self {
        Self::default()
    }

    pub fn first(&self) -> Option<&PathSegment> {
        self.segments.first()
    }

    pub fn last(&self) -> Option<&PathSegment> {
        self.segments.last()
    }

    /// Name of the entity set or singleton the path starts with
    pub fn leading_resource(&self) -> Option<&str> {
        match self.first() {
            Some(PathSegment::EntitySet(name)) | Some(PathSegment::Singleton(name)) => Some(name),
            _ => None,
        }
    }

    pub fn template(&self) -> String {
        if self.segments.is_empty() {
            return SERVICE_ROOT_TEMPLATE.to_string();
        }
        format!(
            "{}/{}",
            SERVICE_ROOT_TEMPLATE,
            self.segments.iter().map(PathSegment::template).join("/")
        )
    }
}

impl std::fmt::Display for ResourcePath {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                PathSegment::Key(key) => out.push_str(&format!("({})", key)),
                other => {
                    out.push('/');
                    out.push_str(&other.identifier());
                }
            }
        }
        if out.is_empty() {
            out.push('/');
        }
        write!(f, "{}", out)
    }
}
