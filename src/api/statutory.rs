use actix_web::{HttpResponse, web};
use serde::Deserialize;
use utoipa::IntoParams;

use crate::{
    auth::{Action, AuthUser, Resource},
    error::AppError,
    model::statutory::{ConfigStatus, InsuranceBracket, NewInsuranceBracket, NewTaxRule, TaxRule},
    service::statutory as service,
    store::Store,
};

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct StatusQuery {
    /// `draft` or `approved`
    pub status: Option<ConfigStatus>,
}

#[utoipa::path(
    post,
    path = "/api/payroll-configuration/tax-rules",
    request_body = NewTaxRule,
    responses(
        (status = 201, description = "Tax rule created as draft", body = TaxRule),
        (status = 400, description = "Invalid rate or salary range")
    ),
    tag = "Statutory",
    security(("bearer_auth" = []))
)]
pub async fn create_tax_rule(
    auth: AuthUser,
    store: web::Data<dyn Store>,
    payload: web::Json<NewTaxRule>,
) -> Result<HttpResponse, AppError> {
    auth.authorize(Resource::StatutoryConfig, Action::Create)?;
    let rule = service::create_tax_rule(store.get_ref(), &payload, auth.user_id).await?;
    Ok(HttpResponse::Created().json(rule))
}

#[utoipa::path(
    get,
    path = "/api/payroll-configuration/tax-rules",
    params(StatusQuery),
    responses((status = 200, description = "Tax rules", body = [TaxRule])),
    tag = "Statutory",
    security(("bearer_auth" = []))
)]
pub async fn get_tax_rules(
    auth: AuthUser,
    store: web::Data<dyn Store>,
    query: web::Query<StatusQuery>,
) -> Result<HttpResponse, AppError> {
    auth.authorize(Resource::StatutoryConfig, Action::Read)?;
    let rules = service::get_tax_rules(store.get_ref(), query.status).await?;
    Ok(HttpResponse::Ok().json(rules))
}

#[utoipa::path(
    post,
    path = "/api/payroll-configuration/tax-rules/{id}/approve",
    params(("id" = u64, Path, description = "Tax rule id")),
    responses(
        (status = 200, description = "Tax rule approved", body = TaxRule),
        (status = 404, description = "Tax rule not found")
    ),
    tag = "Statutory",
    security(("bearer_auth" = []))
)]
pub async fn approve_tax_rule(
    auth: AuthUser,
    store: web::Data<dyn Store>,
    path: web::Path<u64>,
) -> Result<HttpResponse, AppError> {
    auth.authorize(Resource::StatutoryConfig, Action::Approve)?;
    let rule = service::approve_tax_rule(store.get_ref(), path.into_inner(), auth.user_id).await?;
    Ok(HttpResponse::Ok().json(rule))
}

#[utoipa::path(
    post,
    path = "/api/payroll-configuration/insurance-brackets",
    request_body = NewInsuranceBracket,
    responses(
        (status = 201, description = "Insurance bracket created as draft", body = InsuranceBracket),
        (status = 400, description = "Invalid rate or salary range")
    ),
    tag = "Statutory",
    security(("bearer_auth" = []))
)]
pub async fn create_insurance_bracket(
    auth: AuthUser,
    store: web::Data<dyn Store>,
    payload: web::Json<NewInsuranceBracket>,
) -> Result<HttpResponse, AppError> {
    auth.authorize(Resource::StatutoryConfig, Action::Create)?;
    let bracket = service::create_insurance_bracket(store.get_ref(), &payload, auth.user_id).await?;
    Ok(HttpResponse::Created().json(bracket))
}

#[utoipa::path(
    get,
    path = "/api/payroll-configuration/insurance-brackets",
    params(StatusQuery),
    responses((status = 200, description = "Insurance brackets", body = [InsuranceBracket])),
    tag = "Statutory",
    security(("bearer_auth" = []))
)]
pub async fn get_insurance_brackets(
    auth: AuthUser,
    store: web::Data<dyn Store>,
    query: web::Query<StatusQuery>,
) -> Result<HttpResponse, AppError> {
    auth.authorize(Resource::StatutoryConfig, Action::Read)?;
    let brackets = service::get_insurance_brackets(store.get_ref(), query.status).await?;
    Ok(HttpResponse::Ok().json(brackets))
}

#[utoipa::path(
    post,
    path = "/api/payroll-configuration/insurance-brackets/{id}/approve",
    params(("id" = u64, Path, description = "Insurance bracket id")),
    responses(
        (status = 200, description = "Insurance bracket approved", body = InsuranceBracket),
        (status = 404, description = "Insurance bracket not found")
    ),
    tag = "Statutory",
    security(("bearer_auth" = []))
)]
pub async fn approve_insurance_bracket(
    auth: AuthUser,
    store: web::Data<dyn Store>,
    path: web::Path<u64>,
) -> Result<HttpResponse, AppError> {
    auth.authorize(Resource::StatutoryConfig, Action::Approve)?;
    let bracket =
        service::approve_insurance_bracket(store.get_ref(), path.into_inner(), auth.user_id)
            .await?;
    Ok(HttpResponse::Ok().json(bracket))
}
