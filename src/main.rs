use actix_web::{App, HttpServer, middleware::Logger, web};
use chrono::Local; // timestamp in log lines
use env_logger::{Env, Target};
use std::io::Write; // for env_logger custom formatter
use std::sync::Arc;

use stay_backend::{
    config::Config,
    database::{create_pool, run_migrations},
    external::{AlipayGateway, EmailSender, HttpMailer, PaymentGateway, WechatPayGateway},
    handlers,
    middlewares::{AuthMiddleware, create_cors},
    services::*,
    swagger::swagger_config,
    tasks::{self, PaymentReconciler},
    utils::JwtService,
};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .format(|buf, record| {
            let ts = Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z");
            let level = record.level().as_str().to_ascii_lowercase();
            let msg_json = serde_json::to_string(&format!("{}", record.args()))
                .unwrap_or_else(|_| "\"<invalid utf8>\"".to_string());
            writeln!(
                buf,
                "{{\"timestamp\":\"{}\",\"level\":\"{}\",\"message\":{},\"target\":\"{}\"}}",
                ts,
                level,
                msg_json,
                record.target(),
            )
        })
        .target(Target::Stdout)
        .init();

    // 加载配置
    let config = Config::from_toml().expect("Failed to load configuration file");

    // 创建数据库连接池
    let pool = create_pool(&config.database)
        .await
        .expect("Failed to create database connection pool");

    // 运行数据库迁移
    run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");

    let jwt_service = JwtService::new(
        &config.jwt.secret,
        config.jwt.access_token_expires_in,
        config.jwt.refresh_token_expires_in,
    );

    // 验证码邮件
    let mailer: Arc<dyn EmailSender> = Arc::new(HttpMailer::new(config.mail.clone()));
    let verification_service = VerificationService::new(mailer, &config.verification);

    // 支付渠道，未配置的渠道调用时返回配置错误
    let alipay: Option<Arc<dyn PaymentGateway>> = if config.alipay.is_enabled() {
        match AlipayGateway::new(config.alipay.clone()) {
            Ok(gateway) => Some(Arc::new(gateway)),
            Err(e) => {
                log::error!("Failed to initialize Alipay gateway: {e}");
                None
            }
        }
    } else {
        log::warn!("Alipay is not configured, channel disabled");
        None
    };

    let wechat: Option<Arc<WechatPayGateway>> = if config.wechat.is_enabled() {
        match WechatPayGateway::new(config.wechat.clone()) {
            Ok(gateway) => Some(Arc::new(gateway)),
            Err(e) => {
                log::error!("Failed to initialize WeChat Pay gateway: {e}");
                None
            }
        }
    } else {
        log::warn!("WeChat Pay is not configured, channel disabled");
        None
    };

    let outcomes = PaymentOutcomeStore::new();
    let reconciler = PaymentReconciler::new(outcomes.clone(), &config.payment);
    let mut payment_service = PaymentService::new(
        alipay,
        wechat.clone().map(|g| g as Arc<dyn PaymentGateway>),
        outcomes.clone(),
        reconciler.clone(),
        &config.payment,
        config.wechat.notify_path.clone(),
    );
    if let Some(gateway) = wechat {
        payment_service = payment_service.with_openid_resolver(gateway);
    }

    let redeem_service = RedeemService::new(pool.clone(), &config.redeem);
    let auth_service = AuthService::new(
        pool.clone(),
        jwt_service.clone(),
        verification_service.clone(),
    );

    // 定期清理过期验证码和已结束的支付记录
    let sweeper = tasks::spawn_all(
        outcomes,
        verification_service.store().clone(),
        &config.payment,
        reconciler.shutdown_signal(),
    );

    log::info!(
        "Starting HTTP server at {}:{}",
        config.server.host,
        config.server.port
    );

    let server = HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .wrap(create_cors())
            .wrap(AuthMiddleware::new(jwt_service.clone()))
            .app_data(web::Data::new(auth_service.clone()))
            .app_data(web::Data::new(verification_service.clone()))
            .app_data(web::Data::new(payment_service.clone()))
            .app_data(web::Data::new(redeem_service.clone()))
            .configure(swagger_config)
            .service(
                web::scope("/api/v1")
                    .configure(handlers::verification_config)
                    .configure(handlers::auth_config)
                    .configure(handlers::payment_config)
                    .configure(handlers::redeem_config),
            )
    })
    .bind((config.server.host.as_str(), config.server.port))?
    .run()
    .await;

    // 停止仍在轮询的对账任务与清理任务
    reconciler.shutdown().await;
    if let Err(e) = sweeper.await {
        log::error!("Sweeper task failed: {e}");
    }
    log::info!("Server stopped");

    server
}
