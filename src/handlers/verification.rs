use crate::models::*;
use crate::services::VerificationService;
use actix_web::{HttpResponse, ResponseError, Result, web};

#[utoipa::path(
    post,
    path = "/verification/send-code",
    tag = "verification",
    request_body = SendCodeRequest,
    responses(
        (status = 200, description = "验证码已发送", body = SendCodeApiResponse),
        (status = 400, description = "邮箱格式错误或发送过于频繁"),
        (status = 502, description = "邮件发送失败")
    )
)]
pub async fn send_code(
    verification_service: web::Data<VerificationService>,
    request: web::Json<SendCodeRequest>,
) -> Result<HttpResponse> {
    match verification_service.send_code(&request.email).await {
        Ok(response) => Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
            response,
            "验证码已发送",
        ))),
        Err(e) => Ok(e.error_response()),
    }
}

/// 校验成功后验证码即失效
#[utoipa::path(
    post,
    path = "/verification/verify",
    tag = "verification",
    request_body = VerifyCodeRequest,
    responses(
        (status = 200, description = "验证通过", body = VerifyCodeApiResponse),
        (status = 401, description = "验证码无效或已过期")
    )
)]
pub async fn verify_code(
    verification_service: web::Data<VerificationService>,
    request: web::Json<VerifyCodeRequest>,
) -> Result<HttpResponse> {
    match verification_service
        .verify_code(&request.email, &request.code)
        .await
    {
        Ok(()) => Ok(HttpResponse::Ok().json(ApiResponse::success(VerifyCodeResponse {
            verified: true,
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

pub fn verification_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/verification")
            .route("/send-code", web::post().to(send_code))
            .route("/verify", web::post().to(verify_code)),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VerificationConfig;
    use crate::services::verification_service::tests::RecordingMailer;
    use actix_web::{App, http::StatusCode, test};
    use std::sync::Arc;

    #[actix_web::test]
    async fn test_send_then_verify_once() {
        let mailer = Arc::new(RecordingMailer::default());
        let svc = VerificationService::new(mailer.clone(), &VerificationConfig::default());
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(svc))
                .configure(verification_config),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/verification/send-code")
            .set_json(serde_json::json!({"email": "guest@example.com"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let code = mailer.last_code().unwrap();
        let verify = || {
            test::TestRequest::post()
                .uri("/verification/verify")
                .set_json(serde_json::json!({"email": "guest@example.com", "code": code}))
                .to_request()
        };

        let resp = test::call_service(&app, verify()).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = test::call_service(&app, verify()).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(
            body["error"]["message"],
            "验证码不存在或已过期"
        );
    }
}
