use crate::model::{OperationKind, PathSegment, ResourcePath, METADATA_TEMPLATE, SERVICE_ROOT_TEMPLATE};

/// True iff the path is exactly the service root or exactly the metadata document.
pub fn is_metadata_path(path: &ResourcePath) -> bool {
    let template = path.template();
    template == SERVICE_ROOT_TEMPLATE || template == METADATA_TEMPLATE
}

/// True if `segment` is an operation (bound or imported) whose first
/// resolved overload is an action. Missing segments and operations that
/// resolved to nothing are not actions.
pub fn is_action_segment(segment: Option<&PathSegment>) -> bool {
    match segment {
        Some(PathSegment::Operation { candidates, .. })
        | Some(PathSegment::OperationImport { candidates, .. }) => {
            candidates.first() == Some(&OperationKind::Action)
        }
        _ => false,
    }
}

/// Convenience for the last segment of a path
pub fn last_segment_is_action(path: &ResourcePath) -> bool {
    is_action_segment(path.last())
}
