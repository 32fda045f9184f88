pub mod batch_handlers;
pub mod handlers;
pub mod path_parser;
pub mod routes;

pub use batch_handlers::*;
pub use handlers::*;
pub use path_parser::*;
pub use routes::*;
