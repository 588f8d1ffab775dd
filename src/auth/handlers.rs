use actix_web::{HttpRequest, HttpResponse, web};
use chrono::{Duration, Utc};
use serde_json::json;
use tracing::{debug, error, info, instrument};

use crate::{
    auth::{
        auth::{authenticate, bearer_token},
        jwt::{Subject, generate_access_token, generate_refresh_token, verify_token},
        password::{hash_password, verify_password},
    },
    config::Config,
    error::{AppError, StoreError},
    model::{role::Role, user::NewUser},
    models::{LoginReqDto, RegisterReq, TokenPair, TokenType},
    store::Store,
};

fn token_error(e: jsonwebtoken::errors::Error) -> AppError {
    error!(error = %e, "Failed to sign token");
    AppError::Internal("Failed to issue token".into())
}

fn expires_in(ttl: usize) -> chrono::DateTime<Utc> {
    Utc::now() + Duration::seconds(ttl as i64)
}

async fn insert_user(
    store: &dyn Store,
    username: &str,
    password: &str,
    role: Role,
    employee_id: Option<u64>,
) -> Result<(), AppError> {
    let password_hash = hash_password(password).map_err(|e| {
        error!(error = %e, "Failed to hash password");
        AppError::Internal("Failed to register user".into())
    })?;

    let user = NewUser {
        username: username.to_string(),
        password_hash,
        role,
        employee_id,
    };
    match store.insert_user(&user).await {
        Ok(created) => {
            info!(user_id = created.id, %role, "User registered");
            Ok(())
        }
        Err(StoreError::DuplicateKey(_)) => {
            Err(AppError::DuplicateKey("Username already exists".into()))
        }
        Err(e) => Err(e.into()),
    }
}

/// Creates the configured system admin unless the username already exists.
pub async fn ensure_admin(store: &dyn Store, config: &Config) -> Result<(), AppError> {
    let (Some(username), Some(password)) = (&config.admin_username, &config.admin_password) else {
        return Ok(());
    };
    if store.find_user_by_username(username).await?.is_some() {
        debug!(%username, "Admin user already present");
        return Ok(());
    }
    insert_user(store, username, password, Role::SystemAdmin, None).await
}

#[utoipa::path(
    post,
    path = "/auth/register",
    tag = "Auth",
    request_body = RegisterReq,
    responses(
        (status = 201, description = "User registered"),
        (status = 400, description = "Missing username or password"),
        (status = 403, description = "Privileged role requested without an admin token"),
        (status = 409, description = "Username already exists")
    )
)]
pub async fn register(
    req: HttpRequest,
    user: web::Json<RegisterReq>,
    store: web::Data<dyn Store>,
    config: web::Data<Config>,
) -> Result<HttpResponse, AppError> {
    let username = user.username.trim();
    if username.is_empty() || user.password.is_empty() {
        return Err(AppError::Validation(
            "Username and password must not be empty".into(),
        ));
    }

    let role = user.role.unwrap_or(Role::Employee);
    if role != Role::Employee {
        let caller = bearer_token(&req)
            .ok_or_else(|| AppError::Forbidden(format!("Registering a {role} requires an admin")))
            .and_then(|token| authenticate(token, &config.jwt_secret))?;
        if !caller.role.is_admin() {
            return Err(AppError::Forbidden(format!(
                "Registering a {role} requires an admin"
            )));
        }
    }
    if let Some(employee_id) = user.employee_id {
        crate::service::referenced(store.get_employee(employee_id), "employee", employee_id)
            .await?;
    }

    insert_user(store.get_ref(), username, &user.password, role, user.employee_id).await?;
    Ok(HttpResponse::Created().json(json!({
        "message": "User registered successfully"
    })))
}

#[utoipa::path(
    post,
    path = "/auth/login",
    tag = "Auth",
    request_body = LoginReqDto,
    responses(
        (status = 200, description = "Token pair", body = TokenPair),
        (status = 401, description = "Invalid credentials")
    )
)]
#[instrument(
    name = "auth_login",
    skip(store, config, user),
    fields(username = %user.username)
)]
pub async fn login(
    user: web::Json<LoginReqDto>,
    store: web::Data<dyn Store>,
    config: web::Data<Config>,
) -> Result<HttpResponse, AppError> {
    info!("Login request received");

    if user.username.trim().is_empty() || user.password.is_empty() {
        info!("Validation failed: empty username or password");
        return Err(AppError::Validation("Username or password required".into()));
    }

    let invalid = || AppError::Unauthorized("Invalid credentials".into());

    let db_user = match store.find_user_by_username(user.username.trim()).await? {
        Some(u) if u.is_active => u,
        Some(_) => {
            info!("Invalid credentials: user inactive");
            return Err(invalid());
        }
        None => {
            info!("Invalid credentials: user not found");
            return Err(invalid());
        }
    };

    if let Err(e) = verify_password(&user.password, &db_user.password_hash) {
        info!(error = %e, "Invalid credentials: password mismatch");
        return Err(invalid());
    }
    debug!(user_id = db_user.id, "Password verified");

    let subject = Subject {
        user_id: db_user.id,
        username: db_user.username.clone(),
        role: db_user.role,
        employee_id: db_user.employee_id,
    };
    let access_token = generate_access_token(&subject, &config.jwt_secret, config.access_token_ttl)
        .map_err(token_error)?;
    let (refresh_token, refresh_claims) =
        generate_refresh_token(&subject, &config.jwt_secret, config.refresh_token_ttl)
            .map_err(token_error)?;

    debug!(user_id = db_user.id, jti = %refresh_claims.jti, "Storing refresh token");
    store
        .insert_refresh_token(
            db_user.id,
            &refresh_claims.jti,
            expires_in(config.refresh_token_ttl),
        )
        .await?;

    if let Err(e) = store.touch_last_login(db_user.id).await {
        // not fatal for the login itself
        error!(error = %e, "Failed to update last_login_at");
    }

    info!("Login successful");
    Ok(HttpResponse::Ok().json(TokenPair {
        access_token,
        refresh_token,
    }))
}

#[utoipa::path(
    post,
    path = "/auth/refresh",
    tag = "Auth",
    responses(
        (status = 200, description = "Rotated token pair", body = TokenPair),
        (status = 401, description = "Refresh token missing, invalid or revoked")
    ),
    security(("bearer_auth" = []))
)]
pub async fn refresh_token(
    req: HttpRequest,
    store: web::Data<dyn Store>,
    config: web::Data<Config>,
) -> Result<HttpResponse, AppError> {
    let unauthorized = || AppError::Unauthorized("Invalid refresh token".into());

    let token = bearer_token(&req).ok_or_else(|| AppError::Unauthorized("No token".into()))?;
    let claims = verify_token(token, &config.jwt_secret).map_err(|_| unauthorized())?;
    if claims.token_type != TokenType::Refresh {
        return Err(unauthorized());
    }

    match store.find_refresh_token(&claims.jti).await? {
        Some(record) if !record.revoked && record.expires_at > Utc::now() => {}
        _ => return Err(unauthorized()),
    }

    let subject = Subject::from(&claims);
    let (new_refresh_token, new_claims) =
        generate_refresh_token(&subject, &config.jwt_secret, config.refresh_token_ttl)
            .map_err(token_error)?;

    // A token that was rotated concurrently loses here.
    let rotated = store
        .rotate_refresh_token(
            &claims.jti,
            claims.user_id,
            &new_claims.jti,
            expires_in(config.refresh_token_ttl),
        )
        .await?;
    if !rotated {
        info!(user_id = claims.user_id, "Refresh token reuse rejected");
        return Err(unauthorized());
    }

    let access_token = generate_access_token(&subject, &config.jwt_secret, config.access_token_ttl)
        .map_err(token_error)?;

    Ok(HttpResponse::Ok().json(TokenPair {
        access_token,
        refresh_token: new_refresh_token,
    }))
}

#[utoipa::path(
    post,
    path = "/auth/logout",
    tag = "Auth",
    responses((status = 204, description = "Refresh token revoked (or nothing to revoke)")),
    security(("bearer_auth" = []))
)]
pub async fn logout(
    req: HttpRequest,
    store: web::Data<dyn Store>,
    config: web::Data<Config>,
) -> HttpResponse {
    let Some(token) = bearer_token(&req) else {
        return HttpResponse::NoContent().finish();
    };

    let claims = match verify_token(token, &config.jwt_secret) {
        Ok(c) => c,
        Err(_) => return HttpResponse::NoContent().finish(),
    };

    // only refresh tokens can logout
    if claims.token_type != TokenType::Refresh {
        return HttpResponse::NoContent().finish();
    }

    if let Err(e) = store.revoke_refresh_token(&claims.jti).await {
        error!(error = %e, "Failed to revoke refresh token");
    }

    // success even if the token didn't exist
    HttpResponse::NoContent().finish()
}
