pub mod managers;
pub mod redeem_codes;

pub use managers as manager_entity;
pub use redeem_codes as redeem_code_entity;
pub use redeem_codes::RedeemStatus;
