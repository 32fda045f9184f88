use serde::Serialize;

/// The generic handler actions the resource controller exposes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RouteAction {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    PostAction,
}

/// What the bound handler reads from the request besides the path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ParameterShape {
    None,
    /// Entity representation in the request body
    Entity,
    /// Operation parameters object in the request body
    Parameters,
}

#[derive(Debug, PartialEq, Eq, Serialize)]
pub struct RouteEntry {
    pub action: RouteAction,
    pub action_name: &'static str,
    pub verbs: &'static [&'static str],
    pub parameter_shape: ParameterShape,
}

/// Process-wide action bindings, one per [`RouteAction`], in declaration order.
pub static ROUTE_TABLE: [RouteEntry; 6] = [
    RouteEntry {
        action: RouteAction::Get,
        action_name: "Get",
        verbs: &["GET"],
        parameter_shape: ParameterShape::None,
    },
    RouteEntry {
        action: RouteAction::Post,
        action_name: "Post",
        verbs: &["POST"],
        parameter_shape: ParameterShape::Entity,
    },
    RouteEntry {
        action: RouteAction::Put,
        action_name: "Put",
        verbs: &["PUT"],
        parameter_shape: ParameterShape::Entity,
    },
    RouteEntry {
        action: RouteAction::Patch,
        action_name: "Patch",
        verbs: &["PATCH"],
        parameter_shape: ParameterShape::Entity,
    },
    RouteEntry {
        action: RouteAction::Delete,
        action_name: "Delete",
        verbs: &["DELETE"],
        parameter_shape: ParameterShape::None,
    },
    RouteEntry {
        action: RouteAction::PostAction,
        action_name: "PostAction",
        verbs: &["POST"],
        parameter_shape: ParameterShape::Parameters,
    },
];

impl RouteEntry {
    pub fn for_action(action: RouteAction) -> &'static RouteEntry {
        let index = match action {
            RouteAction::Get => 0,
            RouteAction::Post => 1,
            RouteAction::Put => 2,
            RouteAction::Patch => 3,
            RouteAction::Delete => 4,
            RouteAction::PostAction => 5,
        };
        &ROUTE_TABLE[index]
    }
}
