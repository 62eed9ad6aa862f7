pub mod common;
pub mod manager;
pub mod pagination;
pub mod payment;
pub mod redeem;
pub mod verification;

pub use common::*;
pub use manager::*;
pub use pagination::*;
pub use payment::*;
pub use redeem::*;
pub use verification::*;
