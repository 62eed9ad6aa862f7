pub mod code_generator;
pub mod jwt;
pub mod password;
pub mod redeem_code;
pub mod rsa_sign;
pub mod validation;

pub use code_generator::{
    REDEEM_CODE_LEN, beijing_offset, generate_six_digit_code, generate_trade_no,
    is_valid_redeem_code, random_redeem_code,
};
pub use jwt::*;
pub use password::*;
pub use redeem_code::{CodeRegistry, generate_unique_redeem_code};
pub use rsa_sign::{RsaSigner, RsaVerifier};
pub use validation::*;
