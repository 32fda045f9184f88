use anyhow::Result;
use serde_json::{json, Map, Value};

use crate::error::{ApiError, ApiResult};
use crate::model::{
    AttributeDescriptor, EntityModel, EntityTarget, MetadataTypeRegistry, OperationKind, TypeDescriptor,
};
use crate::store::memory::{InMemoryStore, MemoryTables};

pub const NAMESPACE: &str = "Demo";

fn people() -> Vec<Value> {
    vec![
        json!({"Id": 1, "Name": "Ada Lovelace", "Email": "ada@example.com", "Age": 36}),
        json!({"Id": 2, "Name": "Alan Turing", "Email": "alan@example.com", "Age": 41}),
        json!({"Id": 3, "Name": "Grace Hopper", "Email": "grace@example.com", "Age": 85}),
    ]
}

fn orders() -> Vec<Value> {
    vec![
        json!({"Id": 1, "PersonId": 1, "Product": "Difference engine", "Amount": 120.0}),
        json!({"Id": 2, "PersonId": 1, "Product": "Punch cards", "Amount": 15.5}),
        json!({"Id": 3, "PersonId": 3, "Product": "Compiler", "Amount": 80.0}),
    ]
}

fn audit_log() -> Vec<Value> {
    vec![json!({"Id": 1, "Message": "Service created"})]
}

fn annotations() -> Result<MetadataTypeRegistry> {
    let mut registry = MetadataTypeRegistry::new();
    registry.register_type(TypeDescriptor::new(
        "Person",
        vec![
            AttributeDescriptor::new("Id"),
            AttributeDescriptor::new("Name").required().max_length(50),
            AttributeDescriptor::new("Email"),
            AttributeDescriptor::new("Age"),
        ],
    ));
    // Annotations kept apart from the entity type itself
    registry.register_type(TypeDescriptor::new(
        "PersonMetadata",
        vec![
            AttributeDescriptor::new("Name")
                .required()
                .max_length(50)
                .display_name("Full name"),
            AttributeDescriptor::new("Email").max_length(100),
        ],
    ));
    registry.associate_metadata_type("Person", "PersonMetadata")?;

    registry.register_type(TypeDescriptor::new(
        "Order",
        vec![
            AttributeDescriptor::new("Id"),
            AttributeDescriptor::new("PersonId").required(),
            AttributeDescriptor::new("Product").required().max_length(40),
            AttributeDescriptor::new("Amount"),
        ],
    ));
    Ok(registry)
}

pub fn demo_model() -> Result<EntityModel> {
    Ok(EntityModel::builder(NAMESPACE)
        .entity_type("Person", &["Id"], &["Id", "Name", "Email", "Age"])
        .entity_type("Order", &["Id"], &["Id", "PersonId", "Product", "Amount"])
        .entity_type("AuditEntry", &["Id"], &["Id", "Message"])
        .entity_set("People", "Person")
        .entity_set("Orders", "Order")
        .with_concurrency_check()
        .entity_set("AuditLog", "AuditEntry")
        .read_only()
        .singleton("Me", "Person")
        .operation("ResetData", OperationKind::Action, None, &[])
        .operation("TotalSpent", OperationKind::Function, Some("Person"), &[])
        .annotations(annotations()?)
        .build())
}

fn reload(tables: &mut MemoryTables, entity_set: &str, entities: Vec<Value>) {
    tables.entities_mut(entity_set).clear();
    for entity in entities {
        if let Value::Object(properties) = entity {
            tables.insert(entity_set, properties);
        }
    }
}

fn reset_data(
    tables: &mut MemoryTables,
    _bound: Option<&EntityTarget>,
    _parameters: &Map<String, Value>,
) -> ApiResult<Option<Value>> {
    reload(tables, "People", people());
    reload(tables, "Orders", orders());
    Ok(None)
}

fn total_spent(
    tables: &MemoryTables,
    bound: Option<&Value>,
    _parameters: &Map<String, Value>,
) -> ApiResult<Value> {
    let person_id = bound
        .and_then(|person| person.get("Id"))
        .ok_or_else(|| ApiError::malformed("TotalSpent must be bound to a person"))?;
    let total: f64 = tables
        .entities("Orders")
        .iter()
        .filter(|order| order.properties.get("PersonId") == Some(person_id))
        .filter_map(|order| order.properties.get("Amount").and_then(Value::as_f64))
        .sum();
    Ok(json!(total))
}

/// Store exposing the demo model, populated with sample data when `load_seed_data` is set
pub fn build_store(load_seed_data: bool) -> Result<InMemoryStore> {
    let mut builder = InMemoryStore::builder(demo_model()?)
        .with_action("ResetData", reset_data)
        .with_function("TotalSpent", total_spent);

    if load_seed_data {
        builder = builder
            .with_entities("People", people())
            .with_entities("Orders", orders())
            .with_entities("AuditLog", audit_log())
            .with_singleton(
                "Me",
                json!({"Id": 0, "Name": "Service Owner", "Email": "owner@example.com"}),
            );
        log::info!("Seed data loaded");
    }
    Ok(builder.build())
}
