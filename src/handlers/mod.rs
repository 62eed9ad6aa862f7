pub mod auth;
pub mod payment;
pub mod redeem;
pub mod verification;

pub use auth::*;
pub use payment::*;
pub use redeem::*;
pub use verification::*;
