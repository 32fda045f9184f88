pub mod action_resolver;
pub mod change_set_coordinator;
pub mod conventions;
pub mod exception_filter;
pub mod path_classifier;
pub mod request;

pub use action_resolver::resolve;
pub use change_set_coordinator::*;
pub use conventions::*;
pub use exception_filter::{classify, respond, ErrorBody, ErrorDetail, ErrorResponse};
pub use path_classifier::*;
pub use request::*;
