use serde::Serialize;
use serde_json::{json, Value};

use crate::model::{MetadataTypeRegistry, OperationKind};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityTypeDef {
    pub name: String,
    pub key: Vec<String>,
    pub properties: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntitySetDef {
    pub name: String,
    pub entity_type: String,
    /// Updates and deletes must carry a matching If-Match header
    pub concurrency_check: bool,
    pub read_only: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SingletonDef {
    pub name: String,
    pub entity_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationDef {
    pub name: String,
    pub kind: OperationKind,
    /// Entity type the operation is bound to; unbound operations are exposed as imports
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bound_type: Option<String>,
    pub parameters: Vec<String>,
}

/// The shape of the data exposed by the service, as produced by the data provider.
#[derive(Debug, Clone, Default)]
pub struct EntityModel {
    pub namespace: String,
    pub entity_types: Vec<EntityTypeDef>,
    pub entity_sets: Vec<EntitySetDef>,
    pub singletons: Vec<SingletonDef>,
    pub operations: Vec<OperationDef>,
    pub annotations: MetadataTypeRegistry,
}

impl EntityModel {
    pub fn builder(namespace: &str) -> EntityModelBuilder {
        EntityModelBuilder {
            model: EntityModel {
                namespace: namespace.to_string(),
                ..Default::default()
            },
        }
    }

    pub fn entity_type(&self, name: &str) -> Option<&EntityTypeDef> {
        self.entity_types.iter().find(|t| t.name == name)
    }

    pub fn entity_set(&self, name: &str) -> Option<&EntitySetDef> {
        self.entity_sets.iter().find(|s| s.name == name)
    }

    pub fn singleton(&self, name: &str) -> Option<&SingletonDef> {
        self.singletons.iter().find(|s| s.name == name)
    }

    /// Entity type behind an entity set or singleton
    pub fn type_of(&self, resource: &str) -> Option<&EntityTypeDef> {
        let type_name = self
            .entity_set(resource)
            .map(|s| s.entity_type.as_str())
            .or_else(|| self.singleton(resource).map(|s| s.entity_type.as_str()))?;
        self.entity_type(type_name)
    }

    /// Strip the model namespace from a qualified operation name
    pub fn unqualify<'a>(&self, name: &'a str) -> &'a str {
        name.strip_prefix(&self.namespace)
            .and_then(|rest| rest.strip_prefix('.'))
            .unwrap_or(name)
    }

    /// Kinds of every operation called `name` bound to `bound_type`
    /// (`None` for operation imports), in declaration order.
    pub fn operation_candidates(&self, name: &str, bound_type: Option<&str>) -> Vec<OperationKind> {
        let name = self.unqualify(name);
        self.operations
            .iter()
            .filter(|op| op.name == name && op.bound_type.as_deref() == bound_type)
            .map(|op| op.kind)
            .collect()
    }

    pub fn operation(&self, name: &str, bound_type: Option<&str>) -> Option<&OperationDef> {
        let name = self.unqualify(name);
        self.operations
            .iter()
            .find(|op| op.name == name && op.bound_type.as_deref() == bound_type)
    }

    /// Service document listing every addressable top-level resource
    pub fn service_document(&self) -> Value {
        let mut resources: Vec<Value> = Vec::new();
        for set in &self.entity_sets {
            resources.push(json!({ "name": set.name, "kind": "EntitySet", "url": set.name }));
        }
        for singleton in &self.singletons {
            resources.push(json!({ "name": singleton.name, "kind": "Singleton", "url": singleton.name }));
        }
        for op in self.operations.iter().filter(|op| op.bound_type.is_none()) {
            let kind = match op.kind {
                OperationKind::Action => "ActionImport",
                OperationKind::Function => "FunctionImport",
            };
            resources.push(json!({ "name": op.name, "kind": kind, "url": op.name }));
        }
        json!({ "@context": "$metadata", "value": resources })
    }

    /// Metadata document describing types, containers and annotations
    pub fn metadata_document(&self) -> Value {
        let types: Vec<Value> = self
            .entity_types
            .iter()
            .map(|t| {
                let described = self.annotations.describe(&t.name);
                json!({
                    "name": t.name,
                    "key": t.key,
                    "properties": t.properties,
                    "annotations": described.map(|d| d.attributes).unwrap_or_default(),
                })
            })
            .collect();

        json!({
            "namespace": self.namespace,
            "entityTypes": types,
            "entitySets": self.entity_sets,
            "singletons": self.singletons,
            "operations": self.operations,
        })
    }
}

pub struct EntityModelBuilder {
    model: EntityModel,
}

impl EntityModelBuilder {
    pub fn entity_type(mut self, name: &str, key: &[&str], properties: &[&str]) -> Self {
        self.model.entity_types.push(EntityTypeDef {
            name: name.to_string(),
            key: key.iter().map(|s| s.to_string()).collect(),
            properties: properties.iter().map(|s| s.to_string()).collect(),
        });
        self
    }

    pub fn entity_set(mut self, name: &str, entity_type: &str) -> Self {
        self.model.entity_sets.push(EntitySetDef {
            name: name.to_string(),
            entity_type: entity_type.to_string(),
            concurrency_check: false,
            read_only: false,
        });
        self
    }

    /// Flag the most recently added entity set
    pub fn with_concurrency_check(mut self) -> Self {
        if let Some(set) = self.model.entity_sets.last_mut() {
            set.concurrency_check = true;
        }
        self
    }

    pub fn read_only(mut self) -> Self {
        if let Some(set) = self.model.entity_sets.last_mut() {
            set.read_only = true;
        }
        self
    }

    pub fn singleton(mut self, name: &str, entity_type: &str) -> Self {
        self.model.singletons.push(SingletonDef {
            name: name.to_string(),
            entity_type: entity_type.to_string(),
        });
        self
    }

    pub fn operation(
        mut self,
        name: &str,
        kind: OperationKind,
        bound_type: Option<&str>,
        parameters: &[&str],
    ) -> Self {
        self.model.operations.push(OperationDef {
            name: name.to_string(),
            kind,
            bound_type: bound_type.map(|s| s.to_string()),
            parameters: parameters.iter().map(|s| s.to_string()).collect(),
        });
        self
    }

    pub fn annotations(mut self, registry: MetadataTypeRegistry) -> Self {
        self.model.annotations = registry;
        self
    }

    pub fn build(self) -> EntityModel {
        self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> EntityModel {
        EntityModel::builder("Demo")
            .entity_type("Person", &["Id"], &["Id", "Name"])
            .entity_set("People", "Person")
            .with_concurrency_check()
            .singleton("Me", "Person")
            .operation("Promote", OperationKind::Action, Some("Person"), &[])
            .operation("Search", OperationKind::Function, None, &["term"])
            .build()
    }

    #[test]
    fn test_lookups() {
        let model = model();
        assert!(model.entity_set("People").unwrap().concurrency_check);
        assert_eq!(model.type_of("Me").unwrap().name, "Person");
        assert!(model.type_of("Nope").is_none());
    }

    #[test]
    fn test_operation_candidates_respect_binding() {
        let model = model();
        assert_eq!(
            model.operation_candidates("Demo.Promote", Some("Person")),
            vec![OperationKind::Action]
        );
        assert!(model.operation_candidates("Promote", None).is_empty());
        assert_eq!(
            model.operation_candidates("Search", None),
            vec![OperationKind::Function]
        );
    }

    #[test]
    fn test_service_document_lists_imports_only_for_unbound_operations() {
        let doc = model().service_document();
        let names: Vec<&str> = doc["value"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["People", "Me", "Search"]);
    }
}
