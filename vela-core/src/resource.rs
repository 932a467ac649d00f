//! Resource - Representing low-level resource declarations
//!
//! Constructs declared on a [`Stack`](crate::stack::Stack) expand into
//! resources. A resource is identified by its logical id and carries
//! attribute values, some of which reference other resources.

use std::collections::{BTreeSet, HashMap};

/// Unique identifier for a resource
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId {
    /// Resource type (e.g., "vpc", "subnet")
    pub resource_type: String,
    /// Logical id of the resource within its deployment unit
    pub name: String,
}

impl ResourceId {
    pub fn new(resource_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for ResourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.resource_type, self.name)
    }
}

/// Attribute value of a resource
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Int(i64),
    Bool(bool),
    List(Vec<Value>),
    Map(HashMap<String, Value>),
    /// Reference to another resource's attribute (logical_id, attribute_name)
    ResourceRef(String, String),
    /// Availability zone selected by position from the deployment region
    AvailabilityZoneIndex(usize),
}

impl Value {
    pub fn string(s: impl Into<String>) -> Self {
        Value::String(s.into())
    }

    /// Reference to the `id` attribute of a resource
    pub fn id_of(logical_id: impl Into<String>) -> Self {
        Value::ResourceRef(logical_id.into(), "id".to_string())
    }

    pub fn attribute_of(logical_id: impl Into<String>, attribute: impl Into<String>) -> Self {
        Value::ResourceRef(logical_id.into(), attribute.into())
    }

    /// Build a map value from key/value pairs
    pub fn map<K: Into<String>>(entries: impl IntoIterator<Item = (K, Value)>) -> Self {
        Value::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

/// Desired state of a single resource
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    pub id: ResourceId,
    pub attributes: HashMap<String, Value>,
    /// Explicit ordering constraints that are not expressed as references
    pub depends_on: Vec<String>,
}

impl Resource {
    pub fn new(resource_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: ResourceId::new(resource_type, name),
            attributes: HashMap::new(),
            depends_on: Vec::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    pub fn with_dependency(mut self, logical_id: impl Into<String>) -> Self {
        self.depends_on.push(logical_id.into());
        self
    }

    pub fn logical_id(&self) -> &str {
        &self.id.name
    }

    pub fn resource_type(&self) -> &str {
        &self.id.resource_type
    }

    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    /// (logical id, attribute) pairs referenced from attribute values
    pub fn referenced_attributes(&self) -> BTreeSet<(String, String)> {
        let mut refs = BTreeSet::new();
        for value in self.attributes.values() {
            collect_references(value, &mut refs);
        }
        refs
    }

    /// Logical ids referenced from attribute values
    pub fn references(&self) -> BTreeSet<String> {
        self.referenced_attributes()
            .into_iter()
            .map(|(id, _)| id)
            .collect()
    }

    /// All logical ids this resource must be ordered after
    pub fn dependencies(&self) -> BTreeSet<String> {
        let mut deps = self.references();
        deps.extend(self.depends_on.iter().cloned());
        deps
    }
}

fn collect_references(value: &Value, refs: &mut BTreeSet<(String, String)>) {
    match value {
        Value::ResourceRef(logical_id, attribute) => {
            refs.insert((logical_id.clone(), attribute.clone()));
        }
        Value::List(items) => {
            for item in items {
                collect_references(item, refs);
            }
        }
        Value::Map(map) => {
            for v in map.values() {
                collect_references(v, refs);
            }
        }
        _ => {}
    }
}
