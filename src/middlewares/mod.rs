pub mod auth;
pub mod cors;

pub use auth::{AuthMiddleware, CurrentManager, current_manager};
pub use cors::create_cors;
