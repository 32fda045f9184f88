use parking_lot::Mutex;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::error::{ApiError, ApiResult};
use crate::model::{ChangeSet, ChangeSetEntry, EntryResult, Id, SubRequest, SubmitResult};
use crate::store::traits::{DataScope, ScopeFactory};

/// Change set shared by reference between every sub-request of a batch change set.
#[derive(Debug)]
pub struct SharedChangeSet {
    pub id: Id,
    change_set: Mutex<ChangeSet>,
    outcome: Mutex<Option<Arc<SubmitResult>>>,
}

impl SharedChangeSet {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            change_set: Mutex::new(ChangeSet::new()),
            outcome: Mutex::new(None),
        }
    }

    /// Append an entry, returning its position in the change set
    pub fn stage(&self, entry: ChangeSetEntry) -> usize {
        self.change_set.lock().push(entry)
    }

    pub fn snapshot(&self) -> ChangeSet {
        self.change_set.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.change_set.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Result of the submission, once it succeeded
    pub fn outcome(&self) -> Option<Arc<SubmitResult>> {
        self.outcome.lock().clone()
    }

    fn set_outcome(&self, result: Arc<SubmitResult>) {
        *self.outcome.lock() = Some(result);
    }
}

/// A batched sub-request stamped with the change set it belongs to
#[derive(Debug, Clone)]
pub struct SubRequestContext {
    pub request: SubRequest,
    change_set: Arc<SharedChangeSet>,
}

impl SubRequestContext {
    pub fn change_set(&self) -> &Arc<SharedChangeSet> {
        &self.change_set
    }
}

/// Owns a data scope and releases it exactly once, on whichever exit path
/// comes first.
pub struct ScopeGuard {
    scope: Option<Box<dyn DataScope>>,
}

impl ScopeGuard {
    pub fn new(scope: Box<dyn DataScope>) -> Self {
        Self { scope: Some(scope) }
    }

    pub fn scope(&self) -> ApiResult<&dyn DataScope> {
        self.scope
            .as_deref()
            .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("data scope already released")))
    }

    pub fn release(&mut self) {
        if let Some(mut scope) = self.scope.take() {
            scope.release();
        }
    }

    pub fn is_released(&self) -> bool {
        self.scope.is_none()
    }
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        self.release();
    }
}

/// One change set in flight: the shared change set, the stamped
/// sub-request contexts and the scope acquired for it.
pub struct ChangeSetHandle {
    shared: Arc<SharedChangeSet>,
    contexts: Vec<SubRequestContext>,
    scope: ScopeGuard,
}

impl ChangeSetHandle {
    pub fn id(&self) -> &str {
        &self.shared.id
    }

    pub fn contexts(&self) -> &[SubRequestContext] {
        &self.contexts
    }

    pub fn change_set(&self) -> &Arc<SharedChangeSet> {
        &self.shared
    }
}

/// Groups batched sub-requests into one change set and submits it once.
#[derive(Clone)]
pub struct ChangeSetCoordinator {
    factory: Arc<dyn ScopeFactory>,
}

impl ChangeSetCoordinator {
    pub fn new(factory: Arc<dyn ScopeFactory>) -> Self {
        Self { factory }
    }

    /// Acquire a scope and stamp every sub-request with one shared change set.
    pub async fn begin_change_set(
        &self,
        group_id: &str,
        sub_requests: Vec<SubRequest>,
    ) -> ApiResult<ChangeSetHandle> {
        let scope = ScopeGuard::new(self.factory.acquire_scope().await?);
        let shared = Arc::new(SharedChangeSet::new(group_id));

        let contexts = sub_requests
            .into_iter()
            .map(|request| SubRequestContext {
                request,
                change_set: shared.clone(),
            })
            .collect::<Vec<_>>();

        log::debug!(
            "Began change set '{}' with {} sub-request(s)",
            group_id,
            contexts.len()
        );

        Ok(ChangeSetHandle {
            shared,
            contexts,
            scope,
        })
    }

    /// Submit every staged entry once, in staging order. Errors from the
    /// data provider are returned unchanged.
    pub async fn submit(
        &self,
        handle: &ChangeSetHandle,
        cancel: &CancellationToken,
    ) -> ApiResult<Arc<SubmitResult>> {
        let change_set = handle.shared.snapshot();
        let scope = handle.scope.scope()?;

        log::debug!(
            "Submitting change set '{}' with {} entr(ies)",
            handle.id(),
            change_set.len()
        );

        let result = submit_cancellable(scope, &change_set, cancel).await?;
        let result = Arc::new(result);
        handle.shared.set_outcome(result.clone());
        Ok(result)
    }

    /// Release the change set and its scope
    pub fn dispose(&self, mut handle: ChangeSetHandle) {
        handle.scope.release();
        log::debug!("Disposed change set '{}'", handle.id());
    }

    /// Submit a single entry outside of any batch, in its own scope.
    pub async fn submit_single(
        &self,
        entry: ChangeSetEntry,
        cancel: &CancellationToken,
    ) -> ApiResult<EntryResult> {
        let mut guard = ScopeGuard::new(self.factory.acquire_scope().await?);
        let change_set = ChangeSet::single(entry);
        let result = submit_cancellable(guard.scope()?, &change_set, cancel).await;
        guard.release();

        result?
            .entries
            .into_iter()
            .next()
            .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("submission returned no result")))
    }
}

async fn submit_cancellable(
    scope: &dyn DataScope,
    change_set: &ChangeSet,
    cancel: &CancellationToken,
) -> ApiResult<SubmitResult> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ApiError::Cancelled),
        result = scope.submit(change_set, cancel) => result,
    }
}
