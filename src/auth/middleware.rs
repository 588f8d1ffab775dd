use actix_web::middleware::Next;
use actix_web::{
    Error, HttpMessage, ResponseError,
    body::BoxBody,
    dev::{ServiceRequest, ServiceResponse},
    web::Data,
};
use tracing::debug;

use crate::auth::auth::authenticate;
use crate::config::Config;
use crate::error::AppError;

pub async fn auth_middleware(
    req: ServiceRequest,
    next: Next<BoxBody>,
) -> Result<ServiceResponse<BoxBody>, Error> {
    let config = req
        .app_data::<Data<Config>>()
        .ok_or_else(|| AppError::Internal("App config missing".into()))?;

    let header_value = match req.headers().get("Authorization") {
        Some(h) => h.to_str().map_err(|_| {
            AppError::Unauthorized("Invalid Authorization header encoding".into())
        })?,
        None => {
            let resp = AppError::Unauthorized("Missing Authorization header".into()).error_response();
            return Ok(req.into_response(resp));
        }
    };

    let token = match header_value.strip_prefix("Bearer ") {
        Some(t) => t,
        None => {
            let resp = AppError::Unauthorized(
                "Authorization header must start with Bearer".into(),
            )
            .error_response();
            return Ok(req.into_response(resp));
        }
    };

    let auth_user = match authenticate(token, &config.jwt_secret) {
        Ok(user) => user,
        Err(e) => {
            debug!(error = %e, path = %req.path(), "Rejected bearer token");
            return Ok(req.into_response(e.error_response()));
        }
    };

    req.extensions_mut().insert(auth_user);

    next.call(req).await
}
