use actix_cors::Cors;

pub fn create_cors() -> Cors {
    Cors::default()
        // 点餐小程序与后台前端域名不固定
        .allowed_origin_fn(|_, _req_head| true)
        .allowed_methods(vec!["GET", "POST", "PUT", "DELETE", "OPTIONS"])
        .allow_any_header()
        .supports_credentials()
        .max_age(3600)
}
