use actix_web::web;
use utoipa::OpenApi;
use utoipa::{
    Modify,
    openapi::security::{Http, HttpAuthScheme, SecurityScheme},
};
use utoipa_swagger_ui::SwaggerUi;

use crate::entities::RedeemStatus;
use crate::handlers;
use crate::models::*;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
        )
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::verification::send_code,
        handlers::verification::verify_code,
        handlers::auth::register,
        handlers::auth::login,
        handlers::auth::refresh,
        handlers::auth::reset_password,
        handlers::auth::me,
        handlers::payment::alipay_precreate,
        handlers::payment::wechat_jsapi,
        handlers::payment::wechat_openid,
        handlers::payment::payment_status,
        handlers::payment::cancel_payment,
        handlers::redeem::list_redeem_codes,
        handlers::redeem::create_redeem_codes,
        handlers::redeem::get_redeem_code,
        handlers::redeem::update_redeem_code,
        handlers::redeem::delete_redeem_code,
        handlers::redeem::check_redeem_code,
    ),
    components(
        schemas(
            SendCodeRequest,
            SendCodeResponse,
            VerifyCodeRequest,
            VerifyCodeResponse,
            RegisterRequest,
            LoginRequest,
            ResetPasswordRequest,
            ManagerProfile,
            AuthResponse,
            PaymentChannel,
            PaymentOutcome,
            JsapiParams,
            AlipayPrecreateRequest,
            WechatJsapiRequest,
            WechatOpenIdRequest,
            WechatOpenIdResponse,
            PaymentCreatedResponse,
            PaymentStatusResponse,
            CancelPaymentRequest,
            CancelPaymentResponse,
            RedeemStatus,
            RedeemCodeResponse,
            CreateRedeemCodesRequest,
            UpdateRedeemCodeRequest,
            CheckRedeemRequest,
            CheckRedeemResponse,
            PaginatedRedeemCodes,
            ApiError,
            AuthApiResponse,
            ManagerApiResponse,
            SendCodeApiResponse,
            VerifyCodeApiResponse,
            PaymentCreatedApiResponse,
            PaymentStatusApiResponse,
            WechatOpenIdApiResponse,
            RedeemCodeApiResponse,
            RedeemCodeListApiResponse,
            CheckRedeemApiResponse,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "verification", description = "E-mail verification code API"),
        (name = "auth", description = "Manager authentication API"),
        (name = "payment", description = "Alipay / WeChat Pay API"),
        (name = "redeem", description = "Redeem code API"),
    ),
    info(
        title = "Stay Backend API",
        version = "1.0.0",
        description = "Stay Backend REST API documentation"
    ),
    servers(
        (url = "/api/v1", description = "Local server")
    )
)]
pub struct ApiDoc;

pub fn swagger_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        SwaggerUi::new("/swagger-ui/{_:.*}").url("/api-docs/openapi.json", ApiDoc::openapi()),
    )
    .route(
        "/swagger-ui",
        web::get().to(|| async {
            actix_web::HttpResponse::Found()
                .append_header(("Location", "/swagger-ui/"))
                .finish()
        }),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_lists_routes_and_bearer_scheme() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/payments/status"));
        assert!(doc.paths.paths.contains_key("/redeem-codes/check"));
        let components = doc.components.unwrap();
        assert!(components.security_schemes.contains_key("bearer_auth"));
    }
}
