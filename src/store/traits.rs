use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::error::ApiResult;
use crate::model::{ChangeSet, EntityModel, ResourcePath, SubmitResult};

/// Produces the entity model exposed by the service
#[async_trait::async_trait]
pub trait ModelProducer: Send + Sync {
    async fn get_model(&self) -> ApiResult<Arc<EntityModel>>;
}

/// Executes read requests (entity sets, entities, properties, functions)
#[async_trait::async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn query(&self, path: &ResourcePath) -> ApiResult<serde_json::Value>;
}

/// Storage scope shared by every entry of one change set
#[async_trait::async_trait]
pub trait DataScope: Send + Sync {
    /// Apply the whole change set as one unit. Entries must be applied in order.
    async fn submit(
        &self,
        change_set: &ChangeSet,
        cancel: &CancellationToken,
    ) -> ApiResult<SubmitResult>;

    /// Release whatever the scope holds. Called exactly once per scope.
    fn release(&mut self);
}

#[async_trait::async_trait]
pub trait ScopeFactory: Send + Sync {
    async fn acquire_scope(&self) -> ApiResult<Box<dyn DataScope>>;
}

pub trait Store: ModelProducer + QueryExecutor + ScopeFactory + Send + Sync {}
impl<T: ModelProducer + QueryExecutor + ScopeFactory + Send + Sync> Store for T {}
