pub mod annotations;
pub mod batch;
pub mod change_set;
pub mod common;
pub mod entity_model;
pub mod path;
pub mod route;
pub mod validation;

pub use annotations::*;
pub use batch::*;
pub use change_set::*;
pub use common::*;
pub use entity_model::*;
pub use path::*;
pub use route::*;
pub use validation::*;
