use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::error::{ApiError, ApiResult};
use crate::model::{
    etag_for_version, generate_id, version_from_etag, ChangeSet, ChangeSetEntry, EntityModel,
    EntityTarget, EntityTypeDef, EntryResult, KeyValue, PathSegment, ResourcePath, SubmitResult,
    ValidationResult,
};
use crate::store::traits::{DataScope, ModelProducer, QueryExecutor, ScopeFactory};

pub const ETAG_PROPERTY: &str = "@odata.etag";

#[derive(Debug, Clone, PartialEq)]
pub struct EntityRecord {
    pub properties: Map<String, Value>,
    pub version: u64,
}

impl EntityRecord {
    pub fn to_json(&self) -> Value {
        let mut properties = self.properties.clone();
        properties.insert(
            ETAG_PROPERTY.to_string(),
            Value::String(etag_for_version(self.version)),
        );
        Value::Object(properties)
    }
}

/// Entity data held by the in-memory store
#[derive(Debug, Clone, Default)]
pub struct MemoryTables {
    sets: HashMap<String, Vec<EntityRecord>>,
    singletons: HashMap<String, EntityRecord>,
    last_version: u64,
}

impl MemoryTables {
    pub fn entities(&self, entity_set: &str) -> &[EntityRecord] {
        self.sets.get(entity_set).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn entities_mut(&mut self, entity_set: &str) -> &mut Vec<EntityRecord> {
        self.sets.entry(entity_set.to_string()).or_default()
    }

    pub fn singleton(&self, name: &str) -> Option<&EntityRecord> {
        self.singletons.get(name)
    }

    pub fn next_version(&mut self) -> u64 {
        self.last_version += 1;
        self.last_version
    }

    /// Append an entity with a fresh version
    pub fn insert(&mut self, entity_set: &str, properties: Map<String, Value>) {
        let version = self.next_version();
        self.entities_mut(entity_set)
            .push(EntityRecord { properties, version });
    }
}

/// Side-effecting operation: may change the tables, may return a value
pub type ActionFn = Arc<
    dyn Fn(&mut MemoryTables, Option<&EntityTarget>, &Map<String, Value>) -> ApiResult<Option<Value>>
        + Send
        + Sync,
>;

/// Read-only operation; receives the entity it is bound to, if any
pub type FunctionFn =
    Arc<dyn Fn(&MemoryTables, Option<&Value>, &Map<String, Value>) -> ApiResult<Value> + Send + Sync>;

#[derive(Debug, Default)]
pub struct ScopeStats {
    acquired: AtomicUsize,
    released: AtomicUsize,
}

impl ScopeStats {
    pub fn acquired(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

struct Shared {
    model: Arc<EntityModel>,
    tables: RwLock<MemoryTables>,
    actions: HashMap<String, ActionFn>,
    functions: HashMap<String, FunctionFn>,
    stats: ScopeStats,
}

/// Data provider keeping every entity in memory. Change sets are applied
/// to a copy of the tables that replaces the live tables only when every
/// entry succeeded.
#[derive(Clone)]
pub struct InMemoryStore {
    shared: Arc<Shared>,
}

pub struct InMemoryStoreBuilder {
    model: EntityModel,
    tables: MemoryTables,
    actions: HashMap<String, ActionFn>,
    functions: HashMap<String, FunctionFn>,
}

impl InMemoryStoreBuilder {
    /// Seed an entity set. Values that are not JSON objects are skipped.
    pub fn with_entities(mut self, entity_set: &str, entities: Vec<Value>) -> Self {
        for entity in entities {
            if let Value::Object(properties) = entity {
                self.tables.insert(entity_set, properties);
            }
        }
        self
    }

    pub fn with_singleton(mut self, name: &str, entity: Value) -> Self {
        if let Value::Object(properties) = entity {
            let version = self.tables.next_version();
            self.tables
                .singletons
                .insert(name.to_string(), EntityRecord { properties, version });
        }
        self
    }

    pub fn with_action<F>(mut self, name: &str, action: F) -> Self
    where
        F: Fn(&mut MemoryTables, Option<&EntityTarget>, &Map<String, Value>) -> ApiResult<Option<Value>>
            + Send
            + Sync
            + 'static,
    {
        self.actions.insert(name.to_string(), Arc::new(action));
        self
    }

    pub fn with_function<F>(mut self, name: &str, function: F) -> Self
    where
        F: Fn(&MemoryTables, Option<&Value>, &Map<String, Value>) -> ApiResult<Value>
            + Send
            + Sync
            + 'static,
    {
        self.functions.insert(name.to_string(), Arc::new(function));
        self
    }

    pub fn build(self) -> InMemoryStore {
        InMemoryStore {
            shared: Arc::new(Shared {
                model: Arc::new(self.model),
                tables: RwLock::new(self.tables),
                actions: self.actions,
                functions: self.functions,
                stats: ScopeStats::default(),
            }),
        }
    }
}

impl InMemoryStore {
    pub fn builder(model: EntityModel) -> InMemoryStoreBuilder {
        InMemoryStoreBuilder {
            model,
            tables: MemoryTables::default(),
            actions: HashMap::new(),
            functions: HashMap::new(),
        }
    }

    pub fn model(&self) -> &Arc<EntityModel> {
        &self.shared.model
    }

    pub fn scope_stats(&self) -> &ScopeStats {
        &self.shared.stats
    }

    /// Copy of the current tables
    pub fn snapshot(&self) -> MemoryTables {
        self.shared.tables.read().clone()
    }
}

#[async_trait::async_trait]
impl ModelProducer for InMemoryStore {
    async fn get_model(&self) -> ApiResult<Arc<EntityModel>> {
        Ok(self.shared.model.clone())
    }
}

#[async_trait::async_trait]
impl QueryExecutor for InMemoryStore {
    async fn query(&self, path: &ResourcePath) -> ApiResult<Value> {
        let tables = self.shared.tables.read();
        query_tables(&self.shared, &tables, path)
    }
}

#[async_trait::async_trait]
impl ScopeFactory for InMemoryStore {
    async fn acquire_scope(&self) -> ApiResult<Box<dyn DataScope>> {
        self.shared.stats.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryScope {
            shared: self.shared.clone(),
            released: false,
        }))
    }
}

struct MemoryScope {
    shared: Arc<Shared>,
    released: bool,
}

#[async_trait::async_trait]
impl DataScope for MemoryScope {
    async fn submit(
        &self,
        change_set: &ChangeSet,
        cancel: &CancellationToken,
    ) -> ApiResult<SubmitResult> {
        let model = &self.shared.model;

        let results: Vec<ValidationResult> = change_set
            .entries
            .iter()
            .flat_map(|entry| validate_entry(model, entry))
            .collect();
        if results.iter().any(ValidationResult::is_error) {
            return Err(ApiError::ChangeSetValidation { results });
        }

        let mut live = self.shared.tables.write();
        let mut working = live.clone();
        let mut applied = Vec::with_capacity(change_set.len());

        for entry in &change_set.entries {
            if cancel.is_cancelled() {
                return Err(ApiError::Cancelled);
            }
            log::debug!("Applying {}", entry.describe());
            applied.push(apply_entry(&self.shared, &mut working, entry)?);
        }

        *live = working;
        Ok(SubmitResult { entries: applied })
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.shared.stats.released.fetch_add(1, Ordering::SeqCst);
        }
    }
}

fn entity_type_of<'a>(model: &'a EntityModel, resource: &str) -> ApiResult<&'a EntityTypeDef> {
    model
        .type_of(resource)
        .ok_or_else(|| ApiError::not_found(format!("Resource '{}' does not exist", resource)))
}

fn key_property(model: &EntityModel, entity_set: &str) -> ApiResult<String> {
    entity_type_of(model, entity_set)?
        .key
        .first()
        .cloned()
        .ok_or_else(|| {
            ApiError::not_implemented(format!("Entity set '{}' has no key", entity_set))
        })
}

/// Annotation checks. `merge` only checks properties present in the entity.
fn validate_properties(
    model: &EntityModel,
    resource: &str,
    entity: &Map<String, Value>,
    merge: bool,
) -> Vec<ValidationResult> {
    let Some(entity_type) = model.type_of(resource) else {
        return Vec::new();
    };
    let Some(descriptor) = model.annotations.describe(&entity_type.name) else {
        return Vec::new();
    };

    let mut results = Vec::new();
    for attribute in &descriptor.attributes {
        let value = entity.get(&attribute.name);
        if attribute.required {
            let missing = match value {
                None => !merge,
                Some(Value::Null) => true,
                Some(Value::String(s)) => s.trim().is_empty(),
                Some(_) => false,
            };
            if missing {
                results.push(
                    ValidationResult::error(
                        format!("The {} field is required.", attribute.label()),
                        &attribute.name,
                    )
                    .with_target(resource),
                );
                continue;
            }
        }
        if let (Some(max), Some(Value::String(s))) = (attribute.max_length, value) {
            if s.chars().count() > max {
                results.push(
                    ValidationResult::error(
                        format!(
                            "The field {} must be a string with a maximum length of {}.",
                            attribute.label(),
                            max
                        ),
                        &attribute.name,
                    )
                    .with_target(resource),
                );
            }
        }
    }
    results
}

fn target_resource(target: &EntityTarget) -> &str {
    match target {
        EntityTarget::Keyed { entity_set, .. } => entity_set.as_str(),
        EntityTarget::Singleton(name) => name.as_str(),
    }
}

fn validate_entry(model: &EntityModel, entry: &ChangeSetEntry) -> Vec<ValidationResult> {
    match entry {
        ChangeSetEntry::Create { entity_set, entity } => {
            validate_properties(model, entity_set, entity, false)
        }
        ChangeSetEntry::Update {
            target,
            entity,
            replace,
            ..
        } => validate_properties(model, target_resource(target), entity, !replace),
        ChangeSetEntry::Delete { .. } | ChangeSetEntry::Invoke { .. } => Vec::new(),
    }
}

fn check_writable(model: &EntityModel, entity_set: &str) -> ApiResult<bool> {
    let set = model
        .entity_set(entity_set)
        .ok_or_else(|| ApiError::not_found(format!("Entity set '{}' does not exist", entity_set)))?;
    if set.read_only {
        return Err(ApiError::AccessDenied(format!(
            "Entity set '{}' is read-only",
            entity_set
        )));
    }
    Ok(set.concurrency_check)
}

fn check_precondition(
    target: &EntityTarget,
    record: &EntityRecord,
    if_match: Option<&str>,
    required: bool,
) -> ApiResult<()> {
    match if_match {
        None if required => Err(ApiError::PreconditionRequired(format!(
            "An If-Match header is required to modify {}",
            target
        ))),
        None => Ok(()),
        Some(tag) if tag.trim() == "*" => Ok(()),
        Some(tag) => {
            if version_from_etag(tag) == Some(record.version) {
                Ok(())
            } else {
                Err(ApiError::PreconditionFailed(format!(
                    "The entity tag of {} does not match",
                    target
                )))
            }
        }
    }
}

fn find_index(
    model: &EntityModel,
    tables: &MemoryTables,
    entity_set: &str,
    key: &KeyValue,
) -> ApiResult<usize> {
    let key_name = key_property(model, entity_set)?;
    let wanted = key.to_json();
    tables
        .entities(entity_set)
        .iter()
        .position(|record| record.properties.get(&key_name) == Some(&wanted))
        .ok_or_else(|| ApiError::not_found(format!("{}({}) was not found", entity_set, key)))
}

/// Next key for entities created without one: integers continue the
/// sequence, anything else gets a generated id.
fn next_key(tables: &MemoryTables, entity_set: &str, key_name: &str) -> ApiResult<Value> {
    let existing = tables.entities(entity_set);
    let all_ints = existing
        .iter()
        .all(|r| r.properties.get(key_name).map_or(false, Value::is_i64));
    if all_ints {
        let max = existing
            .iter()
            .filter_map(|r| r.properties.get(key_name).and_then(Value::as_i64))
            .max()
            .unwrap_or(0);
        max.checked_add(1).map(Value::from).ok_or_else(|| {
            ApiError::malformed(format!(
                "'{}' has no integer key left after {}; supply '{}' explicitly",
                entity_set, max, key_name
            ))
        })
    } else {
        Ok(Value::String(generate_id()))
    }
}

fn apply_entry(
    shared: &Shared,
    tables: &mut MemoryTables,
    entry: &ChangeSetEntry,
) -> ApiResult<EntryResult> {
    let model = &shared.model;
    match entry {
        ChangeSetEntry::Create { entity_set, entity } => {
            check_writable(model, entity_set)?;
            let key_name = key_property(model, entity_set)?;
            let mut properties = entity.clone();
            properties.remove(ETAG_PROPERTY);

            let key = match properties.get(&key_name) {
                Some(value) if !value.is_null() => value.clone(),
                _ => next_key(tables, entity_set, &key_name)?,
            };
            if tables
                .entities(entity_set)
                .iter()
                .any(|r| r.properties.get(&key_name) == Some(&key))
            {
                return Err(ApiError::malformed(format!(
                    "An entity with key {} already exists in '{}'",
                    key, entity_set
                )));
            }
            properties.insert(key_name, key);

            let version = tables.next_version();
            let record = EntityRecord {
                properties,
                version,
            };
            let json = record.to_json();
            tables.entities_mut(entity_set).push(record);
            Ok(EntryResult::Created(json))
        }
        ChangeSetEntry::Update {
            target,
            entity,
            replace,
            if_match,
        } => {
            let mut incoming = entity.clone();
            incoming.remove(ETAG_PROPERTY);
            let version = tables.next_version();

            let record = match target {
                EntityTarget::Keyed { entity_set, key } => {
                    let concurrency = check_writable(model, entity_set)?;
                    let key_name = key_property(model, entity_set)?;
                    let index = find_index(model, tables, entity_set, key)?;
                    let record = &mut tables.entities_mut(entity_set)[index];
                    check_precondition(target, record, if_match.as_deref(), concurrency)?;

                    let key_value = record.properties.get(&key_name).cloned();
                    merge_properties(record, incoming, *replace);
                    if let Some(key_value) = key_value {
                        record.properties.insert(key_name, key_value);
                    }
                    record.version = version;
                    record.clone()
                }
                EntityTarget::Singleton(name) => {
                    let record = tables.singletons.get_mut(name).ok_or_else(|| {
                        ApiError::not_found(format!("Singleton '{}' does not exist", name))
                    })?;
                    check_precondition(target, record, if_match.as_deref(), false)?;
                    merge_properties(record, incoming, *replace);
                    record.version = version;
                    record.clone()
                }
            };
            Ok(EntryResult::Updated(record.to_json()))
        }
        ChangeSetEntry::Delete { target, if_match } => match target {
            EntityTarget::Keyed { entity_set, key } => {
                let concurrency = check_writable(model, entity_set)?;
                let index = find_index(model, tables, entity_set, key)?;
                let entities = tables.entities_mut(entity_set);
                check_precondition(target, &entities[index], if_match.as_deref(), concurrency)?;
                entities.remove(index);
                Ok(EntryResult::Deleted)
            }
            EntityTarget::Singleton(name) => Err(ApiError::not_implemented(format!(
                "Singleton '{}' cannot be deleted",
                name
            ))),
        },
        ChangeSetEntry::Invoke {
            operation,
            bound_to,
            parameters,
        } => {
            let name = model.unqualify(operation);
            let action = shared.actions.get(name).ok_or_else(|| {
                ApiError::not_implemented(format!("Action '{}' has no implementation", name))
            })?;
            let result = action(tables, bound_to.as_ref(), parameters)?;
            Ok(EntryResult::Invoked(result))
        }
    }
}

fn merge_properties(record: &mut EntityRecord, incoming: Map<String, Value>, replace: bool) {
    if replace {
        record.properties = incoming;
    } else {
        record.properties.extend(incoming);
    }
}

/// Entity addressed by the leading segments, with the number of segments consumed
fn resolve_entity(
    model: &EntityModel,
    tables: &MemoryTables,
    segments: &[PathSegment],
) -> ApiResult<(Value, usize)> {
    match segments {
        [PathSegment::EntitySet(set), PathSegment::Key(key), ..] => {
            let index = find_index(model, tables, set, key)?;
            Ok((tables.entities(set)[index].to_json(), 2))
        }
        [PathSegment::Singleton(name), ..] => {
            let record = tables
                .singleton(name)
                .ok_or_else(|| ApiError::not_found(format!("Singleton '{}' does not exist", name)))?;
            Ok((record.to_json(), 1))
        }
        _ => Err(ApiError::not_implemented(
            "Only entities addressed by key or singletons can be navigated",
        )),
    }
}

fn call_function(
    shared: &Shared,
    tables: &MemoryTables,
    name: &str,
    bound: Option<&Value>,
) -> ApiResult<Value> {
    let name = shared.model.unqualify(name);
    let function = shared.functions.get(name).ok_or_else(|| {
        ApiError::not_implemented(format!("Function '{}' has no implementation", name))
    })?;
    let result = function(tables, bound, &Map::new())?;
    Ok(serde_json::json!({ "value": result }))
}

fn query_tables(shared: &Shared, tables: &MemoryTables, path: &ResourcePath) -> ApiResult<Value> {
    let model = &shared.model;
    let segments = path.segments.as_slice();

    match segments {
        [PathSegment::EntitySet(set)] => {
            if model.entity_set(set).is_none() {
                return Err(ApiError::not_found(format!(
                    "Entity set '{}' does not exist",
                    set
                )));
            }
            let values: Vec<Value> = tables.entities(set).iter().map(EntityRecord::to_json).collect();
            Ok(serde_json::json!({ "value": values }))
        }
        [PathSegment::OperationImport { name, .. }] => call_function(shared, tables, name, None),
        [] => Err(ApiError::not_implemented("The service root is not queryable")),
        _ => {
            let (entity, consumed) = resolve_entity(model, tables, segments)?;
            match &segments[consumed..] {
                [] => Ok(entity),
                [PathSegment::Property(property)] => {
                    let value = entity.get(property).cloned().ok_or_else(|| {
                        ApiError::not_found(format!("Property '{}' has no value", property))
                    })?;
                    Ok(serde_json::json!({ "value": value }))
                }
                [PathSegment::Operation { name, .. }] => {
                    call_function(shared, tables, name, Some(&entity))
                }
                [PathSegment::Navigation(name), ..] => Err(ApiError::not_implemented(format!(
                    "Navigation '{}' is not supported",
                    name
                ))),
                _ => Err(ApiError::not_implemented(format!(
                    "Path '{}' is not supported",
                    path
                ))),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AttributeDescriptor, MetadataTypeRegistry, OperationKind, TypeDescriptor};
    use serde_json::json;

    fn store() -> InMemoryStore {
        let mut annotations = MetadataTypeRegistry::new();
        annotations.register_type(TypeDescriptor::new(
            "Person",
            vec![
                AttributeDescriptor::new("Id"),
                AttributeDescriptor::new("Name").required().max_length(10),
            ],
        ));

        let model = EntityModel::builder("Demo")
            .entity_type("Person", &["Id"], &["Id", "Name"])
            .entity_set("People", "Person")
            .entity_set("Staff", "Person")
            .with_concurrency_check()
            .entity_set("Archive", "Person")
            .read_only()
            .operation("NameLength", OperationKind::Function, Some("Person"), &[])
            .operation("Clear", OperationKind::Action, None, &[])
            .annotations(annotations)
            .build();

        InMemoryStore::builder(model)
            .with_entities("People", vec![json!({"Id": 1, "Name": "Ann"})])
            .with_entities("Staff", vec![json!({"Id": 1, "Name": "Bob"})])
            .with_entities("Archive", vec![json!({"Id": 1, "Name": "Old"})])
            .with_function("NameLength", |_tables, bound, _params| {
                let name = bound.and_then(|b| b["Name"].as_str()).unwrap_or_default();
                Ok(json!(name.len()))
            })
            .with_action("Clear", |tables, _bound, _params| {
                tables.entities_mut("People").clear();
                Ok(None)
            })
            .build()
    }

    fn people_key(key: i64) -> EntityTarget {
        EntityTarget::Keyed {
            entity_set: "People".to_string(),
            key: KeyValue::Int(key),
        }
    }

    fn create(name: &str) -> ChangeSetEntry {
        let mut entity = Map::new();
        entity.insert("Name".to_string(), json!(name));
        ChangeSetEntry::Create {
            entity_set: "People".to_string(),
            entity,
        }
    }

    async fn submit(store: &InMemoryStore, change_set: ChangeSet) -> ApiResult<SubmitResult> {
        let mut scope = store.acquire_scope().await?;
        let result = scope.submit(&change_set, &CancellationToken::new()).await;
        scope.release();
        result
    }

    #[tokio::test]
    async fn test_create_assigns_next_integer_key() {
        let store = store();
        let result = submit(&store, ChangeSet::single(create("Cy"))).await.unwrap();
        match &result.entries[0] {
            EntryResult::Created(entity) => {
                assert_eq!(entity["Id"], 2);
                assert_eq!(entity["Name"], "Cy");
                assert!(entity[ETAG_PROPERTY].as_str().unwrap().starts_with("W/"));
            }
            other => panic!("unexpected result {:?}", other),
        }
        assert_eq!(store.snapshot().entities("People").len(), 2);
        assert_eq!(store.scope_stats().acquired(), 1);
        assert_eq!(store.scope_stats().released(), 1);
    }

    #[tokio::test]
    async fn test_exhausted_integer_keys_are_rejected() {
        let model = EntityModel::builder("Demo")
            .entity_type("Person", &["Id"], &["Id", "Name"])
            .entity_set("People", "Person")
            .build();
        let store = InMemoryStore::builder(model)
            .with_entities("People", vec![json!({"Id": i64::MAX, "Name": "Last"})])
            .build();

        let err = submit(&store, ChangeSet::single(create("Next")))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::MalformedQuery(_)));
        assert_eq!(store.snapshot().entities("People").len(), 1);

        let mut explicit = Map::new();
        explicit.insert("Id".to_string(), json!(1));
        explicit.insert("Name".to_string(), json!("First"));
        let entry = ChangeSetEntry::Create {
            entity_set: "People".to_string(),
            entity: explicit,
        };
        submit(&store, ChangeSet::single(entry)).await.unwrap();
        assert_eq!(store.snapshot().entities("People").len(), 2);
    }

    #[tokio::test]
    async fn test_validation_failure_reports_every_result() {
        let store = store();
        let mut change_set = ChangeSet::new();
        change_set.push(create(""));
        change_set.push(create("A name that is far too long"));

        match submit(&store, change_set).await {
            Err(ApiError::ChangeSetValidation { results }) => {
                assert_eq!(results.len(), 2);
                assert_eq!(results[0].message, "The Name field is required.");
                assert_eq!(results[1].member_names, vec!["Name".to_string()]);
            }
            other => panic!("expected validation failure, got {:?}", other),
        }
        assert_eq!(store.snapshot().entities("People").len(), 1);
    }

    #[tokio::test]
    async fn test_failed_entry_rolls_back_whole_change_set() {
        let store = store();
        let mut change_set = ChangeSet::new();
        change_set.push(create("Dee"));
        change_set.push(ChangeSetEntry::Delete {
            target: people_key(99),
            if_match: None,
        });

        let err = submit(&store, change_set).await.unwrap_err();
        assert!(matches!(err, ApiError::ResourceNotFound(_)));
        assert_eq!(store.snapshot().entities("People").len(), 1);
    }

    #[tokio::test]
    async fn test_concurrency_checked_sets_require_matching_etag() {
        let store = store();
        let staff = EntityTarget::Keyed {
            entity_set: "Staff".to_string(),
            key: KeyValue::Int(1),
        };
        let update = |if_match: Option<&str>| ChangeSetEntry::Update {
            target: staff.clone(),
            entity: Map::new(),
            replace: false,
            if_match: if_match.map(|s| s.to_string()),
        };

        let err = submit(&store, ChangeSet::single(update(None))).await.unwrap_err();
        assert!(matches!(err, ApiError::PreconditionRequired(_)));

        let err = submit(&store, ChangeSet::single(update(Some("W/\"999\""))))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::PreconditionFailed(_)));

        let current = store.snapshot().entities("Staff")[0].version;
        let tag = etag_for_version(current);
        assert!(submit(&store, ChangeSet::single(update(Some(tag.as_str())))).await.is_ok());
    }

    #[tokio::test]
    async fn test_read_only_set_denies_writes() {
        let store = store();
        let err = submit(
            &store,
            ChangeSet::single(ChangeSetEntry::Delete {
                target: EntityTarget::Keyed {
                    entity_set: "Archive".to_string(),
                    key: KeyValue::Int(1),
                },
                if_match: None,
            }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::AccessDenied(_)));
    }

    #[tokio::test]
    async fn test_patch_merges_and_keeps_key() {
        let store = store();
        let mut entity = Map::new();
        entity.insert("Id".to_string(), json!(42));
        entity.insert("Name".to_string(), json!("Anne"));
        let result = submit(
            &store,
            ChangeSet::single(ChangeSetEntry::Update {
                target: people_key(1),
                entity,
                replace: false,
                if_match: None,
            }),
        )
        .await
        .unwrap();
        match &result.entries[0] {
            EntryResult::Updated(entity) => {
                assert_eq!(entity["Id"], 1);
                assert_eq!(entity["Name"], "Anne");
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_queries_and_functions() {
        let store = store();
        let people = ResourcePath::new(vec![PathSegment::EntitySet("People".to_string())]);
        let list = store.query(&people).await.unwrap();
        assert_eq!(list["value"].as_array().unwrap().len(), 1);

        let name = ResourcePath::new(vec![
            PathSegment::EntitySet("People".to_string()),
            PathSegment::Key(KeyValue::Int(1)),
            PathSegment::Property("Name".to_string()),
        ]);
        assert_eq!(store.query(&name).await.unwrap()["value"], "Ann");

        let length = ResourcePath::new(vec![
            PathSegment::EntitySet("People".to_string()),
            PathSegment::Key(KeyValue::Int(1)),
            PathSegment::Operation {
                name: "Demo.NameLength".to_string(),
                candidates: vec![OperationKind::Function],
            },
        ]);
        assert_eq!(store.query(&length).await.unwrap()["value"], 3);

        let missing = ResourcePath::new(vec![
            PathSegment::EntitySet("People".to_string()),
            PathSegment::Key(KeyValue::Int(5)),
        ]);
        assert!(matches!(
            store.query(&missing).await,
            Err(ApiError::ResourceNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_actions_apply_inside_the_change_set() {
        let store = store();
        let result = submit(
            &store,
            ChangeSet::single(ChangeSetEntry::Invoke {
                operation: "Clear".to_string(),
                bound_to: None,
                parameters: Map::new(),
            }),
        )
        .await
        .unwrap();
        assert_eq!(result.entries, vec![EntryResult::Invoked(None)]);
        assert!(store.snapshot().entities("People").is_empty());
    }
}
