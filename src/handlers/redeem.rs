use crate::models::*;
use crate::services::RedeemService;
use actix_web::{HttpResponse, ResponseError, Result, web};

#[utoipa::path(
    get,
    path = "/redeem-codes",
    tag = "redeem",
    params(RedeemCodeQuery),
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "兑换码列表", body = RedeemCodeListApiResponse),
        (status = 401, description = "未授权")
    )
)]
pub async fn list_redeem_codes(
    redeem_service: web::Data<RedeemService>,
    query: web::Query<RedeemCodeQuery>,
) -> Result<HttpResponse> {
    match redeem_service.list(&query).await {
        Ok(page) => Ok(HttpResponse::Ok().json(ApiResponse::success(page))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/redeem-codes",
    tag = "redeem",
    request_body = CreateRedeemCodesRequest,
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "批量生成成功", body = [RedeemCodeResponse]),
        (status = 400, description = "请求参数错误"),
        (status = 401, description = "未授权"),
        (status = 500, description = "无法生成唯一兑换码")
    )
)]
pub async fn create_redeem_codes(
    redeem_service: web::Data<RedeemService>,
    request: web::Json<CreateRedeemCodesRequest>,
) -> Result<HttpResponse> {
    match redeem_service.create_batch(request.into_inner()).await {
        Ok(codes) => Ok(HttpResponse::Ok().json(ApiResponse::success(codes))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    get,
    path = "/redeem-codes/{id}",
    tag = "redeem",
    params(
        ("id" = i64, Path, description = "兑换码 ID")
    ),
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "兑换码详情", body = RedeemCodeApiResponse),
        (status = 404, description = "兑换码不存在")
    )
)]
pub async fn get_redeem_code(
    redeem_service: web::Data<RedeemService>,
    path: web::Path<i64>,
) -> Result<HttpResponse> {
    match redeem_service.get(path.into_inner()).await {
        Ok(code) => Ok(HttpResponse::Ok().json(ApiResponse::success(code))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    put,
    path = "/redeem-codes/{id}",
    tag = "redeem",
    params(
        ("id" = i64, Path, description = "兑换码 ID")
    ),
    request_body = UpdateRedeemCodeRequest,
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "更新成功", body = RedeemCodeApiResponse),
        (status = 400, description = "请求参数错误"),
        (status = 404, description = "兑换码不存在")
    )
)]
pub async fn update_redeem_code(
    redeem_service: web::Data<RedeemService>,
    path: web::Path<i64>,
    request: web::Json<UpdateRedeemCodeRequest>,
) -> Result<HttpResponse> {
    match redeem_service
        .update(path.into_inner(), request.into_inner())
        .await
    {
        Ok(code) => Ok(HttpResponse::Ok().json(ApiResponse::success(code))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    delete,
    path = "/redeem-codes/{id}",
    tag = "redeem",
    params(
        ("id" = i64, Path, description = "兑换码 ID")
    ),
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "删除成功"),
        (status = 404, description = "兑换码不存在")
    )
)]
pub async fn delete_redeem_code(
    redeem_service: web::Data<RedeemService>,
    path: web::Path<i64>,
) -> Result<HttpResponse> {
    match redeem_service.delete(path.into_inner()).await {
        Ok(()) => Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
            (),
            "Redeem code deleted",
        ))),
        Err(e) => Ok(e.error_response()),
    }
}

/// 店员核销，只有第一次核销成功
#[utoipa::path(
    post,
    path = "/redeem-codes/check",
    tag = "redeem",
    request_body = CheckRedeemRequest,
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "核销成功", body = CheckRedeemApiResponse),
        (status = 400, description = "不在有效期内"),
        (status = 404, description = "兑换码不存在"),
        (status = 409, description = "兑换码已被使用")
    )
)]
pub async fn check_redeem_code(
    redeem_service: web::Data<RedeemService>,
    request: web::Json<CheckRedeemRequest>,
) -> Result<HttpResponse> {
    match redeem_service.check_redeem(&request.code).await {
        Ok(code) => Ok(HttpResponse::Ok().json(ApiResponse::success(CheckRedeemResponse {
            redeemed: true,
            redeem_code: code,
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

pub fn redeem_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/redeem-codes")
            .route("", web::get().to(list_redeem_codes))
            .route("", web::post().to(create_redeem_codes))
            .route("/check", web::post().to(check_redeem_code))
            .route("/{id}", web::get().to(get_redeem_code))
            .route("/{id}", web::put().to(update_redeem_code))
            .route("/{id}", web::delete().to(delete_redeem_code)),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RedeemConfig;
    use crate::database::create_test_pool;
    use actix_web::{App, http::StatusCode, test};
    use chrono::{Duration, Utc};

    #[actix_web::test]
    async fn test_create_then_check_twice() {
        let pool = create_test_pool().await;
        let svc = RedeemService::new(pool, &RedeemConfig::default());
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(svc))
                .configure(redeem_config),
        )
        .await;

        let now = Utc::now();
        let req = test::TestRequest::post()
            .uri("/redeem-codes")
            .set_json(serde_json::json!({
                "product_name": "月卡",
                "count": 1,
                "start_time": now - Duration::hours(1),
                "end_time": now + Duration::hours(1),
                "price": 9900
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: serde_json::Value = test::read_body_json(resp).await;
        let code = body["data"][0]["code"].as_str().unwrap().to_string();
        let id = body["data"][0]["id"].as_i64().unwrap();

        let check = || {
            test::TestRequest::post()
                .uri("/redeem-codes/check")
                .set_json(serde_json::json!({ "code": code }))
                .to_request()
        };

        let resp = test::call_service(&app, check()).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["data"]["redeemed"], true);

        let resp = test::call_service(&app, check()).await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);

        let req = test::TestRequest::get()
            .uri(&format!("/redeem-codes/{id}"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["data"]["status"], "redeemed");

        let req = test::TestRequest::get().uri("/redeem-codes/999999").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
