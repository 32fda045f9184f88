//! Ordered routing conventions. Each convention may claim a request; the
//! chain is walked in order and the first claim wins.

use std::sync::Arc;

use crate::logic::action_resolver::resolve;
use crate::logic::path_classifier::is_metadata_path;
use crate::logic::request::{ControllerRegistry, ResourceController};
use crate::model::{PathSegment, ResourcePath, RouteEntry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConventionKind {
    /// Explicit, user-declared routes
    AttributeRouting,
    /// Fallback routing to the generic resource handlers
    Generic,
    /// Service document and metadata document
    Metadata,
    Custom,
}

pub struct RouteRequest<'a> {
    pub verb: &'a str,
    pub path: &'a ResourcePath,
}

/// The handler a convention selected for a request
#[derive(Clone)]
pub enum RouteSelection {
    Controller(Arc<dyn ResourceController>),
    Generic(&'static RouteEntry),
    ServiceDocument,
    MetadataDocument,
}

impl std::fmt::Debug for RouteSelection {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            RouteSelection::Controller(controller) => {
                write!(f, "Controller({})", controller.resource())
            }
            RouteSelection::Generic(entry) => write!(f, "Generic({})", entry.action_name),
            RouteSelection::ServiceDocument => write!(f, "ServiceDocument"),
            RouteSelection::MetadataDocument => write!(f, "MetadataDocument"),
        }
    }
}

pub trait RoutingConvention: Send + Sync {
    fn name(&self) -> &'static str;

    fn kind(&self) -> ConventionKind;

    /// Claim the request by returning a selection, or pass with `None`
    fn select(&self, request: &RouteRequest<'_>) -> Option<RouteSelection>;
}

/// Routes to explicitly registered controllers
pub struct AttributeRoutingConvention {
    controllers: Arc<ControllerRegistry>,
}

impl AttributeRoutingConvention {
    pub fn new(controllers: Arc<ControllerRegistry>) -> Self {
        Self { controllers }
    }
}

impl RoutingConvention for AttributeRoutingConvention {
    fn name(&self) -> &'static str {
        "attribute"
    }

    fn kind(&self) -> ConventionKind {
        ConventionKind::AttributeRouting
    }

    fn select(&self, request: &RouteRequest<'_>) -> Option<RouteSelection> {
        self.controllers
            .find(request.verb, request.path)
            .map(RouteSelection::Controller)
    }
}

/// Routes any remaining resource request to the generic handlers
pub struct GenericRoutingConvention {
    controllers: Arc<ControllerRegistry>,
}

impl GenericRoutingConvention {
    pub fn new(controllers: Arc<ControllerRegistry>) -> Self {
        Self { controllers }
    }
}

impl RoutingConvention for GenericRoutingConvention {
    fn name(&self) -> &'static str {
        "generic"
    }

    fn kind(&self) -> ConventionKind {
        ConventionKind::Generic
    }

    fn select(&self, request: &RouteRequest<'_>) -> Option<RouteSelection> {
        let has_controller = self
            .controllers
            .has_controller_for(request.verb, request.path);
        resolve(request.verb, request.path, has_controller).map(RouteSelection::Generic)
    }
}

/// Serves the service root and `$metadata` documents for GET
pub struct MetadataRoutingConvention;

impl RoutingConvention for MetadataRoutingConvention {
    fn name(&self) -> &'static str {
        "metadata"
    }

    fn kind(&self) -> ConventionKind {
        ConventionKind::Metadata
    }

    fn select(&self, request: &RouteRequest<'_>) -> Option<RouteSelection> {
        if !request.verb.eq_ignore_ascii_case("GET") || !is_metadata_path(request.path) {
            return None;
        }
        match request.path.first() {
            None => Some(RouteSelection::ServiceDocument),
            Some(PathSegment::Metadata) => Some(RouteSelection::MetadataDocument),
            Some(_) => None,
        }
    }
}

/// Ordered list of conventions, read-only once the service is running.
#[derive(Default, Clone)]
pub struct ConventionChain {
    conventions: Vec<Arc<dyn RoutingConvention>>,
}

impl ConventionChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attribute routing followed by metadata routing; the generic
    /// convention is added by [`register_generic_convention`].
    pub fn with_attribute_routing(controllers: Arc<ControllerRegistry>) -> Self {
        Self {
            conventions: vec![
                Arc::new(AttributeRoutingConvention::new(controllers)),
                Arc::new(MetadataRoutingConvention),
            ],
        }
    }

    pub fn push(&mut self, convention: Arc<dyn RoutingConvention>) {
        self.conventions.push(convention);
    }

    pub fn insert(&mut self, index: usize, convention: Arc<dyn RoutingConvention>) {
        self.conventions.insert(index, convention);
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.conventions.iter().map(|c| c.name()).collect()
    }

    pub fn position(&self, kind: ConventionKind) -> Option<usize> {
        self.conventions.iter().position(|c| c.kind() == kind)
    }

    /// Walk the chain; the first convention to claim the request wins.
    pub fn select(&self, request: &RouteRequest<'_>) -> Option<(&'static str, RouteSelection)> {
        self.conventions.iter().find_map(|convention| {
            convention
                .select(request)
                .map(|selection| (convention.name(), selection))
        })
    }
}

/// Insert the generic convention directly after attribute routing, or at
/// the head of the chain when there is no attribute routing.
pub fn register_generic_convention(
    chain: &mut ConventionChain,
    generic: Arc<dyn RoutingConvention>,
) {
    let index = chain
        .position(ConventionKind::AttributeRouting)
        .map(|i| i + 1)
        .unwrap_or(0);
    log::debug!(
        "Registering routing convention '{}' at position {}",
        generic.name(),
        index
    );
    chain.insert(index, generic);
}

/// The chain used by the service: attribute, generic, metadata.
pub fn create_default_conventions(controllers: Arc<ControllerRegistry>) -> ConventionChain {
    let mut chain = ConventionChain::with_attribute_routing(controllers.clone());
    register_generic_convention(
        &mut chain,
        Arc::new(GenericRoutingConvention::new(controllers)),
    );
    chain
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ApiResult;
    use crate::logic::request::{HandlerResponse, RequestContext};
    use crate::model::{KeyValue, RouteAction};
    use async_trait::async_trait;

    struct PeopleController;

    #[async_trait]
    impl ResourceController for PeopleController {
        fn resource(&self) -> &str {
            "People"
        }

        fn supports(&self, verb: &str, _path: &ResourcePath) -> bool {
            verb == "GET" || verb == "DELETE"
        }

        async fn handle(&self, _request: &RequestContext) -> ApiResult<HandlerResponse> {
            Ok(HandlerResponse::NoContent)
        }
    }

    struct Custom;

    impl RoutingConvention for Custom {
        fn name(&self) -> &'static str {
            "custom"
        }

        fn kind(&self) -> ConventionKind {
            ConventionKind::Custom
        }

        fn select(&self, _request: &RouteRequest<'_>) -> Option<RouteSelection> {
            None
        }
    }

    fn controllers() -> Arc<ControllerRegistry> {
        let mut registry = ControllerRegistry::new();
        registry.register(Arc::new(PeopleController));
        Arc::new(registry)
    }

    fn person() -> ResourcePath {
        ResourcePath::new(vec![
            PathSegment::EntitySet("People".to_string()),
            PathSegment::Key(KeyValue::Int(1)),
        ])
    }

    #[test]
    fn test_generic_inserted_after_attribute_routing() {
        let mut chain = ConventionChain::new();
        chain.push(Arc::new(Custom));
        chain.push(Arc::new(AttributeRoutingConvention::new(controllers())));
        chain.push(Arc::new(MetadataRoutingConvention));

        register_generic_convention(
            &mut chain,
            Arc::new(GenericRoutingConvention::new(controllers())),
        );
        assert_eq!(chain.names(), vec!["custom", "attribute", "generic", "metadata"]);
    }

    #[test]
    fn test_generic_inserted_at_head_without_attribute_routing() {
        let mut chain = ConventionChain::new();
        chain.push(Arc::new(Custom));
        chain.push(Arc::new(MetadataRoutingConvention));

        register_generic_convention(
            &mut chain,
            Arc::new(GenericRoutingConvention::new(controllers())),
        );
        assert_eq!(chain.names(), vec!["generic", "custom", "metadata"]);
    }

    #[test]
    fn test_explicit_controller_wins_for_supported_verbs() {
        let chain = create_default_conventions(controllers());
        let path = person();

        let (name, selection) = chain
            .select(&RouteRequest { verb: "GET", path: &path })
            .unwrap();
        assert_eq!(name, "attribute");
        assert!(matches!(selection, RouteSelection::Controller(_)));

        let (name, selection) = chain
            .select(&RouteRequest { verb: "PUT", path: &path })
            .unwrap();
        assert_eq!(name, "generic");
        match selection {
            RouteSelection::Generic(entry) => assert_eq!(entry.action, RouteAction::Put),
            other => panic!("unexpected selection {:?}", other),
        }
    }

    #[test]
    fn test_metadata_requests_fall_through_to_metadata_convention() {
        let chain = create_default_conventions(controllers());

        let root = ResourcePath::root();
        let (name, selection) = chain
            .select(&RouteRequest { verb: "GET", path: &root })
            .unwrap();
        assert_eq!(name, "metadata");
        assert!(matches!(selection, RouteSelection::ServiceDocument));

        let metadata = ResourcePath::new(vec![PathSegment::Metadata]);
        let (_, selection) = chain
            .select(&RouteRequest { verb: "GET", path: &metadata })
            .unwrap();
        assert!(matches!(selection, RouteSelection::MetadataDocument));
    }

    #[test]
    fn test_unclaimed_request() {
        let chain = create_default_conventions(controllers());
        let path = person();
        assert!(chain
            .select(&RouteRequest { verb: "patch", path: &path })
            .is_none());
    }
}
