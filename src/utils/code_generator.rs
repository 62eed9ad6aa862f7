use chrono::{DateTime, FixedOffset, Offset, Utc};
use rand::rngs::OsRng;
use rand::{Rng, RngCore};

const REDEEM_ALPHABET: &[u8; 36] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// 兑换码长度
pub const REDEEM_CODE_LEN: usize = 30;

/// 生成6位数字验证码，范围 000000-999999
pub fn generate_six_digit_code() -> String {
    let mut rng = rand::thread_rng();
    format!("{:06}", rng.gen_range(0..=999_999u32))
}

/// 生成一个 30 位的大写字母数字兑换码 (未做唯一性检查)
///
/// 每个字符取一个 OsRng 字节对 36 取模。
pub fn random_redeem_code() -> String {
    let mut bytes = [0u8; REDEEM_CODE_LEN];
    OsRng.fill_bytes(&mut bytes);
    bytes
        .iter()
        .map(|b| REDEEM_ALPHABET[(*b as usize) % REDEEM_ALPHABET.len()] as char)
        .collect()
}

/// 北京时间 (UTC+8)，支付宝时间戳与订单号都按此时区格式化
pub fn beijing_offset() -> FixedOffset {
    FixedOffset::east_opt(8 * 3600).unwrap_or_else(|| Utc.fix())
}

/// 商户订单号: 北京时间 YYYYMMDDHHMMSS + 6 位随机数字
pub fn generate_trade_no(now: DateTime<Utc>) -> String {
    let local = now.with_timezone(&beijing_offset());
    let mut rng = rand::thread_rng();
    format!(
        "{}{:06}",
        local.format("%Y%m%d%H%M%S"),
        rng.gen_range(0..=999_999u32)
    )
}

/// 校验兑换码格式
pub fn is_valid_redeem_code(code: &str) -> bool {
    code.len() == REDEEM_CODE_LEN && code.bytes().all(|b| REDEEM_ALPHABET.contains(&b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_generate_six_digit_code() {
        for _ in 0..200 {
            let code = generate_six_digit_code();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
            let code_num: u32 = code.parse().unwrap();
            assert!(code_num <= 999_999);
        }
    }

    #[test]
    fn test_random_redeem_code_alphabet() {
        for _ in 0..50 {
            let code = random_redeem_code();
            assert_eq!(code.len(), REDEEM_CODE_LEN);
            assert!(is_valid_redeem_code(&code), "bad code {code}");
        }
        assert_ne!(random_redeem_code(), random_redeem_code());
    }

    #[test]
    fn test_is_valid_redeem_code() {
        assert!(is_valid_redeem_code("ABCDEFGHIJKLMNOPQRSTUVWXYZ0123"));
        assert!(!is_valid_redeem_code("abcdefghijklmnopqrstuvwxyz0123"));
        assert!(!is_valid_redeem_code("SHORT"));
    }

    #[test]
    fn test_generate_trade_no_format() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 4, 5, 6).unwrap();
        let no = generate_trade_no(now);
        assert_eq!(no.len(), 20);
        assert!(no.starts_with("20240601120506"));
        assert!(no.chars().all(|c| c.is_ascii_digit()));
    }
}
