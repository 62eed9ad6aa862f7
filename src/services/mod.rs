pub mod auth_service;
pub mod payment_outcome;
pub mod payment_service;
pub mod redeem_service;
pub mod verification_service;

pub use auth_service::*;
pub use payment_outcome::*;
pub use payment_service::*;
pub use redeem_service::*;
pub use verification_service::*;
