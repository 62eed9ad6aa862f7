use crate::models::*;
use crate::services::PaymentService;
use actix_web::{HttpResponse, ResponseError, Result, web};

#[utoipa::path(
    post,
    path = "/payments/alipay/precreate",
    tag = "payment",
    request_body = AlipayPrecreateRequest,
    responses(
        (status = 200, description = "预下单成功，返回二维码内容", body = PaymentCreatedApiResponse),
        (status = 400, description = "金额不合法"),
        (status = 502, description = "支付宝接口调用失败")
    )
)]
pub async fn alipay_precreate(
    payment_service: web::Data<PaymentService>,
    request: web::Json<AlipayPrecreateRequest>,
) -> Result<HttpResponse> {
    match payment_service
        .create_alipay_precreate(request.into_inner())
        .await
    {
        Ok(response) => Ok(HttpResponse::Ok().json(ApiResponse::success(response))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/payments/wechat/jsapi",
    tag = "payment",
    request_body = WechatJsapiRequest,
    responses(
        (status = 200, description = "下单成功，返回 JSAPI 调起参数", body = PaymentCreatedApiResponse),
        (status = 400, description = "请求参数错误"),
        (status = 502, description = "微信支付接口调用失败")
    )
)]
pub async fn wechat_jsapi(
    payment_service: web::Data<PaymentService>,
    request: web::Json<WechatJsapiRequest>,
) -> Result<HttpResponse> {
    match payment_service.create_wechat_jsapi(request.into_inner()).await {
        Ok(response) => Ok(HttpResponse::Ok().json(ApiResponse::success(response))),
        Err(e) => Ok(e.error_response()),
    }
}

/// 小程序登录 code 换取 openid，用于微信 JSAPI 下单
#[utoipa::path(
    post,
    path = "/payments/wechat/openid",
    tag = "payment",
    request_body = WechatOpenIdRequest,
    responses(
        (status = 200, description = "获取 openid 成功", body = WechatOpenIdApiResponse),
        (status = 400, description = "缺少 code"),
        (status = 502, description = "微信接口调用失败")
    )
)]
pub async fn wechat_openid(
    payment_service: web::Data<PaymentService>,
    request: web::Json<WechatOpenIdRequest>,
) -> Result<HttpResponse> {
    match payment_service.resolve_openid(request.into_inner()).await {
        Ok(response) => Ok(HttpResponse::Ok().json(ApiResponse::success(response))),
        Err(e) => Ok(e.error_response()),
    }
}

/// 前端轮询支付结果
#[utoipa::path(
    get,
    path = "/payments/status",
    tag = "payment",
    params(PaymentStatusQuery),
    responses(
        (status = 200, description = "支付状态", body = PaymentStatusApiResponse),
        (status = 404, description = "交易不存在")
    )
)]
pub async fn payment_status(
    payment_service: web::Data<PaymentService>,
    query: web::Query<PaymentStatusQuery>,
) -> Result<HttpResponse> {
    match payment_service.get_status(&query.out_trade_no).await {
        Ok(response) => Ok(HttpResponse::Ok().json(ApiResponse::success(response))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/payments/cancel",
    tag = "payment",
    request_body = CancelPaymentRequest,
    responses(
        (status = 200, description = "撤销结果"),
        (status = 400, description = "请求参数错误"),
        (status = 502, description = "支付渠道调用失败")
    )
)]
pub async fn cancel_payment(
    payment_service: web::Data<PaymentService>,
    request: web::Json<CancelPaymentRequest>,
) -> Result<HttpResponse> {
    match payment_service.cancel(request.into_inner()).await {
        Ok(response) => Ok(HttpResponse::Ok().json(ApiResponse::success(response))),
        Err(e) => Ok(e.error_response()),
    }
}

pub fn payment_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/payments")
            .route("/alipay/precreate", web::post().to(alipay_precreate))
            .route("/wechat/jsapi", web::post().to(wechat_jsapi))
            .route("/wechat/openid", web::post().to(wechat_openid))
            .route("/status", web::get().to(payment_status))
            .route("/cancel", web::post().to(cancel_payment)),
    );
}
