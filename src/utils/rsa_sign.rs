//! SHA256withRSA 签名与验签 (支付宝 RSA2 / 微信支付 v3 共用)

use crate::error::{AppError, AppResult};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey};
use rsa::pkcs1v15::{Signature, SigningKey, VerifyingKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::sha2::Sha256;
use rsa::signature::{SignatureEncoding, Signer, Verifier};
use rsa::{RsaPrivateKey, RsaPublicKey};

fn key_error(what: &str, e: impl std::fmt::Display) -> AppError {
    AppError::ConfigError(format!("Invalid {what}: {e}"))
}

/// 去掉 PEM 头尾与换行后解码 base64
fn decode_bare_base64(key: &str) -> AppResult<Vec<u8>> {
    let cleaned: String = key.chars().filter(|c| !c.is_whitespace()).collect();
    STANDARD
        .decode(cleaned)
        .map_err(|e| key_error("base64 key", e))
}

/// 应用私钥，支持 PKCS#1 / PKCS#8 PEM，也支持支付宝后台导出的裸 base64
pub fn parse_private_key(key: &str) -> AppResult<RsaPrivateKey> {
    let key = key.trim();
    if key.contains("BEGIN RSA PRIVATE KEY") {
        RsaPrivateKey::from_pkcs1_pem(key).map_err(|e| key_error("PKCS#1 private key", e))
    } else if key.contains("BEGIN PRIVATE KEY") {
        RsaPrivateKey::from_pkcs8_pem(key).map_err(|e| key_error("PKCS#8 private key", e))
    } else {
        let der = decode_bare_base64(key)?;
        RsaPrivateKey::from_pkcs8_der(&der)
            .or_else(|_| RsaPrivateKey::from_pkcs1_der(&der))
            .map_err(|e| key_error("private key", e))
    }
}

pub fn parse_public_key(key: &str) -> AppResult<RsaPublicKey> {
    let key = key.trim();
    if key.contains("BEGIN RSA PUBLIC KEY") {
        RsaPublicKey::from_pkcs1_pem(key).map_err(|e| key_error("PKCS#1 public key", e))
    } else if key.contains("BEGIN PUBLIC KEY") {
        RsaPublicKey::from_public_key_pem(key).map_err(|e| key_error("public key", e))
    } else {
        let der = decode_bare_base64(key)?;
        RsaPublicKey::from_public_key_der(&der)
            .or_else(|_| RsaPublicKey::from_pkcs1_der(&der))
            .map_err(|e| key_error("public key", e))
    }
}

#[derive(Clone)]
pub struct RsaSigner {
    key: SigningKey<Sha256>,
}

impl RsaSigner {
    pub fn new(private_key: RsaPrivateKey) -> Self {
        Self {
            key: SigningKey::<Sha256>::new(private_key),
        }
    }

    pub fn from_key_str(key: &str) -> AppResult<Self> {
        Ok(Self::new(parse_private_key(key)?))
    }

    /// 返回 base64 编码的签名
    pub fn sign_base64(&self, content: &str) -> AppResult<String> {
        let signature = self
            .key
            .try_sign(content.as_bytes())
            .map_err(|e| AppError::InternalError(format!("RSA signing failed: {e}")))?;
        Ok(STANDARD.encode(signature.to_bytes()))
    }
}

#[derive(Clone)]
pub struct RsaVerifier {
    key: VerifyingKey<Sha256>,
}

impl RsaVerifier {
    pub fn new(public_key: RsaPublicKey) -> Self {
        Self {
            key: VerifyingKey::<Sha256>::new(public_key),
        }
    }

    pub fn from_key_str(key: &str) -> AppResult<Self> {
        Ok(Self::new(parse_public_key(key)?))
    }

    pub fn verify_base64(&self, content: &str, signature_b64: &str) -> AppResult<()> {
        let raw = STANDARD
            .decode(signature_b64.trim())
            .map_err(|e| AppError::ExternalApiError(format!("Malformed signature: {e}")))?;
        let signature = Signature::try_from(raw.as_slice())
            .map_err(|e| AppError::ExternalApiError(format!("Malformed signature: {e}")))?;
        self.key
            .verify(content.as_bytes(), &signature)
            .map_err(|_| AppError::ExternalApiError("Response signature mismatch".to_string()))
    }
}
