use crate::logic::path_classifier::{is_metadata_path, last_segment_is_action};
use crate::model::{ResourcePath, RouteAction, RouteEntry};

/// Select the generic action serving `verb` on `path`.
///
/// Returns `None` when a user-defined controller already handles the
/// leading resource, or when no generic action applies (metadata path,
/// unknown verb). `None` hands the request to the next convention.
pub fn resolve(
    verb: &str,
    path: &ResourcePath,
    has_user_defined_controller: bool,
) -> Option<&'static RouteEntry> {
    if has_user_defined_controller {
        return None;
    }

    let is_action = last_segment_is_action(path);

    let action = if verb.eq_ignore_ascii_case("GET") {
        if is_metadata_path(path) || is_action {
            return None;
        }
        RouteAction::Get
    } else if verb.eq_ignore_ascii_case("POST") {
        if is_action {
            RouteAction::PostAction
        } else {
            RouteAction::Post
        }
    } else if verb.eq_ignore_ascii_case("DELETE") {
        RouteAction::Delete
    } else if verb.eq_ignore_ascii_case("PUT") {
        RouteAction::Put
    } else if verb == "PATCH" {
        // PATCH only matches the exact uppercase token
        RouteAction::Patch
    } else {
        return None;
    };

    Some(RouteEntry::for_action(action))
}
