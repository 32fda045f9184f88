pub mod api;
pub mod config;
pub mod error;
pub mod logic;
pub mod model;
pub mod seed;
pub mod store;

// Export API types
pub use api::handlers;
pub use api::routes;

pub use error::{ApiError, ApiResult, ErrorKind};

// Export logic types
pub use logic::{
    classify, resolve, respond, ChangeSetCoordinator, ControllerRegistry, ConventionChain,
    HandlerResponse, RequestContext, ResourceController, RoutingConvention,
};

// Export all model types
pub use model::*;

// Export store types
pub use store::{InMemoryStore, Store};

/// Router serving `store` with the given configuration
pub fn build_app<S: Store + 'static>(
    store: std::sync::Arc<S>,
    controllers: ControllerRegistry,
    config: crate::config::ApiConfig,
) -> axum::Router {
    let service = api::handlers::ApiService::new(store, controllers, config);
    api::routes::create_router().with_state(std::sync::Arc::new(service))
}
