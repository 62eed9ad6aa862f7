use crate::database::DbPool;
use crate::entities::manager_entity as managers;
use crate::error::{AppError, AppResult};
use crate::models::*;
use crate::services::VerificationService;
use crate::utils::*;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DbErr, EntityTrait, IntoActiveModel, QueryFilter, Set, SqlErr,
};

const INVALID_CREDENTIALS: &str = "账号不存在或密码错误";

/// 唯一索引冲突转为 409
fn map_unique_violation(err: DbErr) -> AppError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => {
            AppError::Conflict("用户名或邮箱已注册".to_string())
        }
        _ => AppError::DatabaseError(err),
    }
}

/// 后台管理员注册 / 登录
#[derive(Clone)]
pub struct AuthService {
    pool: DbPool,
    jwt_service: JwtService,
    verification: VerificationService,
}

impl AuthService {
    pub fn new(pool: DbPool, jwt_service: JwtService, verification: VerificationService) -> Self {
        Self {
            pool,
            jwt_service,
            verification,
        }
    }

    fn issue_tokens(&self, manager: managers::Model) -> AppResult<AuthResponse> {
        let access_token = self
            .jwt_service
            .generate_access_token(manager.id, &manager.username)?;
        let refresh_token = self
            .jwt_service
            .generate_refresh_token(manager.id, &manager.username)?;

        Ok(AuthResponse {
            manager: manager.into(),
            access_token,
            refresh_token: Some(refresh_token),
            expires_in: self.jwt_service.get_access_token_expires_in(),
        })
    }

    async fn find_by_email(&self, email: &str) -> AppResult<Option<managers::Model>> {
        Ok(managers::Entity::find()
            .filter(managers::Column::Email.eq(email))
            .one(&self.pool)
            .await?)
    }

    async fn find_by_username(&self, username: &str) -> AppResult<Option<managers::Model>> {
        Ok(managers::Entity::find()
            .filter(managers::Column::Username.eq(username))
            .one(&self.pool)
            .await?)
    }

    pub async fn register(&self, request: RegisterRequest) -> AppResult<AuthResponse> {
        let username = request.username.trim().to_string();
        let email = normalize_email(&request.email);
        validate_username(&username)?;
        validate_email(&email)?;
        validate_password(&request.password)?;

        // 重复检查放在消费验证码之前，避免验证码被白白用掉
        if self.find_by_username(&username).await?.is_some() {
            return Err(AppError::Conflict("用户名已注册".to_string()));
        }
        if self.find_by_email(&email).await?.is_some() {
            return Err(AppError::Conflict("邮箱已注册".to_string()));
        }

        self.verification
            .verify_code(&email, &request.verification_code)
            .await?;

        let password_hash = hash_password(&request.password)?;
        let now = Utc::now();
        let manager = managers::ActiveModel {
            username: Set(username),
            email: Set(email),
            password_hash: Set(password_hash),
            created_at: Set(Some(now)),
            updated_at: Set(Some(now)),
            ..Default::default()
        }
        .insert(&self.pool)
        .await
        .map_err(map_unique_violation)?;

        log::info!("Manager registered: {} ({})", manager.username, manager.id);
        self.issue_tokens(manager)
    }

    /// account 可以是用户名或邮箱
    pub async fn login(&self, request: LoginRequest) -> AppResult<AuthResponse> {
        let account = request.account.trim();
        let manager = if account.contains('@') {
            self.find_by_email(&normalize_email(account)).await?
        } else {
            self.find_by_username(account).await?
        };

        let manager =
            manager.ok_or_else(|| AppError::AuthError(INVALID_CREDENTIALS.to_string()))?;

        if !verify_password(&request.password, &manager.password_hash)? {
            return Err(AppError::AuthError(INVALID_CREDENTIALS.to_string()));
        }

        self.issue_tokens(manager)
    }

    pub async fn refresh_token(&self, refresh_token: &str) -> AppResult<AuthResponse> {
        let claims = self.jwt_service.verify_refresh_token(refresh_token)?;
        let manager = self.get_manager_by_id(claims.manager_id()?).await?;

        let access_token = self
            .jwt_service
            .generate_access_token(manager.id, &manager.username)?;

        Ok(AuthResponse {
            manager: manager.into(),
            access_token,
            refresh_token: None,
            expires_in: self.jwt_service.get_access_token_expires_in(),
        })
    }

    pub async fn reset_password(&self, request: ResetPasswordRequest) -> AppResult<()> {
        let email = normalize_email(&request.email);
        validate_email(&email)?;
        validate_password(&request.new_password)?;

        self.verification
            .verify_code(&email, &request.verification_code)
            .await?;

        let manager = self
            .find_by_email(&email)
            .await?
            .ok_or_else(|| AppError::NotFound("账号不存在".to_string()))?;

        let mut am = manager.into_active_model();
        am.password_hash = Set(hash_password(&request.new_password)?);
        am.updated_at = Set(Some(Utc::now()));
        let manager = am.update(&self.pool).await?;

        log::info!("Manager {} reset password", manager.id);
        Ok(())
    }

    pub async fn get_profile(&self, manager_id: i64) -> AppResult<ManagerProfile> {
        Ok(self.get_manager_by_id(manager_id).await?.into())
    }

    async fn get_manager_by_id(&self, manager_id: i64) -> AppResult<managers::Model> {
        managers::Entity::find_by_id(manager_id)
            .one(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound("管理员不存在".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VerificationConfig;
    use crate::database::create_test_pool;
    use crate::services::verification_service::tests::RecordingMailer;
    use std::sync::Arc;

    async fn setup() -> (AuthService, Arc<RecordingMailer>) {
        let mailer = Arc::new(RecordingMailer::default());
        let verification = VerificationService::new(
            mailer.clone(),
            &VerificationConfig {
                code_ttl_secs: 600,
                resend_interval_secs: 0,
            },
        );
        let jwt = JwtService::new("test-secret", 3600, 7200);
        (
            AuthService::new(create_test_pool().await, jwt, verification),
            mailer,
        )
    }

    async fn code_for(svc: &AuthService, mailer: &RecordingMailer, email: &str) -> String {
        svc.verification.send_code(email).await.unwrap();
        mailer.last_code().unwrap()
    }

    fn register_req(username: &str, email: &str, code: String) -> RegisterRequest {
        RegisterRequest {
            username: username.to_string(),
            email: email.to_string(),
            password: "Password123".to_string(),
            verification_code: code,
        }
    }

    #[tokio::test]
    async fn test_register_login_refresh() {
        let (svc, mailer) = setup().await;
        let code = code_for(&svc, &mailer, "boss@example.com").await;

        let auth = svc
            .register(register_req("boss", "Boss@Example.com", code.clone()))
            .await
            .unwrap();
        assert_eq!(auth.manager.email, "boss@example.com");
        assert!(auth.refresh_token.is_some());

        // 邮箱已注册
        let err = svc
            .register(register_req("boss2", "boss@example.com", code))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        let by_name = svc
            .login(LoginRequest {
                account: "boss".to_string(),
                password: "Password123".to_string(),
            })
            .await
            .unwrap();
        let by_email = svc
            .login(LoginRequest {
                account: "BOSS@example.com".to_string(),
                password: "Password123".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(by_name.manager.id, by_email.manager.id);

        let refreshed = svc
            .refresh_token(by_name.refresh_token.as_deref().unwrap())
            .await
            .unwrap();
        assert_eq!(refreshed.manager.id, auth.manager.id);
        assert!(refreshed.refresh_token.is_none());
        assert!(svc.refresh_token(&refreshed.access_token).await.is_err());
    }

    #[tokio::test]
    async fn test_register_requires_valid_code() {
        let (svc, mailer) = setup().await;
        let code = code_for(&svc, &mailer, "a@example.com").await;
        let wrong = if code == "111111" { "222222" } else { "111111" };

        let err = svc
            .register(register_req("alice", "a@example.com", wrong.to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::AuthError(_)));
    }

    #[tokio::test]
    async fn test_login_failures_are_generic() {
        let (svc, mailer) = setup().await;
        let code = code_for(&svc, &mailer, "c@example.com").await;
        svc.register(register_req("carol", "c@example.com", code))
            .await
            .unwrap();

        for (account, password) in [("carol", "WrongPass123"), ("nobody", "Password123")] {
            let err = svc
                .login(LoginRequest {
                    account: account.to_string(),
                    password: password.to_string(),
                })
                .await
                .unwrap_err();
            assert!(matches!(err, AppError::AuthError(ref m) if m == INVALID_CREDENTIALS));
        }
    }

    #[tokio::test]
    async fn test_reset_password() {
        let (svc, mailer) = setup().await;
        let code = code_for(&svc, &mailer, "d@example.com").await;
        svc.register(register_req("dave", "d@example.com", code))
            .await
            .unwrap();

        let code = code_for(&svc, &mailer, "d@example.com").await;
        svc.reset_password(ResetPasswordRequest {
            email: "d@example.com".to_string(),
            verification_code: code,
            new_password: "NewPassword456".to_string(),
        })
        .await
        .unwrap();

        assert!(svc
            .login(LoginRequest {
                account: "dave".to_string(),
                password: "Password123".to_string(),
            })
            .await
            .is_err());
        let auth = svc
            .login(LoginRequest {
                account: "dave".to_string(),
                password: "NewPassword456".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(svc.get_profile(auth.manager.id).await.unwrap().username, "dave");
    }
}
