use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{
    AuthResponse, CheckRedeemResponse, ManagerProfile, PaginatedRedeemCodes, PaymentCreatedResponse,
    PaymentStatusResponse, RedeemCodeResponse, SendCodeResponse, VerifyCodeResponse,
    WechatOpenIdResponse,
};

/// 统一响应包: `{success, data | message | error}`
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[aliases(
    AuthApiResponse = ApiResponse<AuthResponse>,
    ManagerApiResponse = ApiResponse<ManagerProfile>,
    SendCodeApiResponse = ApiResponse<SendCodeResponse>,
    VerifyCodeApiResponse = ApiResponse<VerifyCodeResponse>,
    PaymentCreatedApiResponse = ApiResponse<PaymentCreatedResponse>,
    PaymentStatusApiResponse = ApiResponse<PaymentStatusResponse>,
    WechatOpenIdApiResponse = ApiResponse<WechatOpenIdResponse>,
    RedeemCodeApiResponse = ApiResponse<RedeemCodeResponse>,
    RedeemCodeListApiResponse = ApiResponse<PaginatedRedeemCodes>,
    CheckRedeemApiResponse = ApiResponse<CheckRedeemResponse>,
)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            error: None,
        }
    }

    pub fn success_with_message(data: T, message: impl Into<String>) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: Some(message.into()),
            error: None,
        }
    }
}

impl ApiResponse<()> {
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        ApiResponse {
            success: false,
            data: None,
            message: None,
            error: Some(ApiError {
                code: code.into(),
                message: message.into(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_envelope_shape() {
        let ok = serde_json::to_value(ApiResponse::success(json!({"n": 1}))).unwrap();
        assert_eq!(ok, json!({"success": true, "data": {"n": 1}}));

        let err = serde_json::to_value(ApiResponse::error("NOT_FOUND", "missing")).unwrap();
        assert_eq!(
            err,
            json!({"success": false, "error": {"code": "NOT_FOUND", "message": "missing"}})
        );
    }
}
