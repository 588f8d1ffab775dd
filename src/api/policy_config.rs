use actix_web::{HttpResponse, web};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use utoipa::IntoParams;

use crate::{
    auth::{Action, AuthUser, Resource},
    error::AppError,
    model::policy::{
        AttendanceHolidayCheck, Holiday, HolidayCheck, HolidayUpdate, LatenessRule,
        LatenessRuleUpdate, NewHoliday, NewLatenessRule, NewOvertimeRule, OvertimeRule,
        OvertimeRuleUpdate,
    },
    service::policy_config as service,
    store::Store,
};

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ActiveQuery {
    #[serde(alias = "isActive")]
    pub active: Option<bool>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct HoursQuery {
    /// Hours worked in the day
    #[param(value_type = String, example = "9.5")]
    pub hours: Decimal,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct LatenessQuery {
    #[serde(alias = "minutesLate")]
    pub minutes_late: u32,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct DateQuery {
    #[param(value_type = String, format = Date, example = "2025-04-21")]
    pub date: NaiveDate,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AttendanceQuery {
    #[serde(alias = "employeeId")]
    pub employee_id: u64,
    #[param(value_type = String, format = Date)]
    pub date: NaiveDate,
    /// Suppress the lateness penalty when the day is a holiday
    #[serde(default, alias = "suppressPenalty")]
    pub suppress_penalty: bool,
}

// ---------------- Overtime rules ----------------

#[utoipa::path(
    post,
    path = "/api/policy-config/overtime-rules",
    request_body = NewOvertimeRule,
    responses(
        (status = 201, description = "Overtime rule created", body = OvertimeRule),
        (status = 400, description = "Invalid threshold or multiplier")
    ),
    tag = "Policy config",
    security(("bearer_auth" = []))
)]
pub async fn create_overtime_rule(
    auth: AuthUser,
    store: web::Data<dyn Store>,
    payload: web::Json<NewOvertimeRule>,
) -> Result<HttpResponse, AppError> {
    auth.authorize(Resource::WorkRule, Action::Create)?;
    let rule = service::create_overtime_rule(store.get_ref(), &payload, auth.user_id).await?;
    Ok(HttpResponse::Created().json(rule))
}

#[utoipa::path(
    get,
    path = "/api/policy-config/overtime-rules",
    params(ActiveQuery),
    responses((status = 200, description = "Overtime rules", body = [OvertimeRule])),
    tag = "Policy config",
    security(("bearer_auth" = []))
)]
pub async fn get_overtime_rules(
    auth: AuthUser,
    store: web::Data<dyn Store>,
    query: web::Query<ActiveQuery>,
) -> Result<HttpResponse, AppError> {
    auth.authorize(Resource::WorkRule, Action::Read)?;
    let rules = service::get_overtime_rules(store.get_ref(), query.active).await?;
    Ok(HttpResponse::Ok().json(rules))
}

#[utoipa::path(
    get,
    path = "/api/policy-config/overtime-rules/applicable",
    params(HoursQuery),
    responses((status = 200, description = "Active, approved rules whose threshold is exceeded", body = [OvertimeRule])),
    tag = "Policy config",
    security(("bearer_auth" = []))
)]
pub async fn get_applicable_overtime_rules(
    auth: AuthUser,
    store: web::Data<dyn Store>,
    query: web::Query<HoursQuery>,
) -> Result<HttpResponse, AppError> {
    auth.authorize(Resource::WorkRule, Action::Read)?;
    let rules = service::get_applicable_overtime_rules(store.get_ref(), query.hours).await?;
    Ok(HttpResponse::Ok().json(rules))
}

#[utoipa::path(
    get,
    path = "/api/policy-config/overtime-rules/{id}",
    params(("id" = u64, Path, description = "Rule id")),
    responses(
        (status = 200, description = "Overtime rule", body = OvertimeRule),
        (status = 404, description = "Rule not found")
    ),
    tag = "Policy config",
    security(("bearer_auth" = []))
)]
pub async fn get_overtime_rule(
    auth: AuthUser,
    store: web::Data<dyn Store>,
    path: web::Path<u64>,
) -> Result<HttpResponse, AppError> {
    auth.authorize(Resource::WorkRule, Action::Read)?;
    let rule = service::get_overtime_rule(store.get_ref(), path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(rule))
}

#[utoipa::path(
    put,
    path = "/api/policy-config/overtime-rules/{id}",
    params(("id" = u64, Path, description = "Rule id")),
    request_body = OvertimeRuleUpdate,
    responses(
        (status = 200, description = "Overtime rule updated", body = OvertimeRule),
        (status = 404, description = "Rule not found")
    ),
    tag = "Policy config",
    security(("bearer_auth" = []))
)]
pub async fn update_overtime_rule(
    auth: AuthUser,
    store: web::Data<dyn Store>,
    path: web::Path<u64>,
    payload: web::Json<OvertimeRuleUpdate>,
) -> Result<HttpResponse, AppError> {
    auth.authorize(Resource::WorkRule, Action::Update)?;
    let rule =
        service::update_overtime_rule(store.get_ref(), path.into_inner(), &payload, auth.user_id)
            .await?;
    Ok(HttpResponse::Ok().json(rule))
}

#[utoipa::path(
    post,
    path = "/api/policy-config/overtime-rules/{id}/approve",
    params(("id" = u64, Path, description = "Rule id")),
    responses(
        (status = 200, description = "Overtime rule approved", body = OvertimeRule),
        (status = 404, description = "Rule not found")
    ),
    tag = "Policy config",
    security(("bearer_auth" = []))
)]
pub async fn approve_overtime_rule(
    auth: AuthUser,
    store: web::Data<dyn Store>,
    path: web::Path<u64>,
) -> Result<HttpResponse, AppError> {
    auth.authorize(Resource::WorkRule, Action::Approve)?;
    let rule = service::approve_overtime_rule(store.get_ref(), path.into_inner(), auth.user_id)
        .await?;
    Ok(HttpResponse::Ok().json(rule))
}

#[utoipa::path(
    delete,
    path = "/api/policy-config/overtime-rules/{id}",
    params(("id" = u64, Path, description = "Rule id")),
    responses(
        (status = 204, description = "Overtime rule deleted"),
        (status = 404, description = "Rule not found")
    ),
    tag = "Policy config",
    security(("bearer_auth" = []))
)]
pub async fn delete_overtime_rule(
    auth: AuthUser,
    store: web::Data<dyn Store>,
    path: web::Path<u64>,
) -> Result<HttpResponse, AppError> {
    auth.authorize(Resource::WorkRule, Action::Delete)?;
    service::delete_overtime_rule(store.get_ref(), path.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}

// ---------------- Lateness rules ----------------

#[utoipa::path(
    post,
    path = "/api/policy-config/lateness-rules",
    request_body = NewLatenessRule,
    responses(
        (status = 201, description = "Lateness rule created", body = LatenessRule),
        (status = 400, description = "Invalid deduction")
    ),
    tag = "Policy config",
    security(("bearer_auth" = []))
)]
pub async fn create_lateness_rule(
    auth: AuthUser,
    store: web::Data<dyn Store>,
    payload: web::Json<NewLatenessRule>,
) -> Result<HttpResponse, AppError> {
    auth.authorize(Resource::WorkRule, Action::Create)?;
    let rule = service::create_lateness_rule(store.get_ref(), &payload, auth.user_id).await?;
    Ok(HttpResponse::Created().json(rule))
}

#[utoipa::path(
    get,
    path = "/api/policy-config/lateness-rules",
    params(ActiveQuery),
    responses((status = 200, description = "Lateness rules", body = [LatenessRule])),
    tag = "Policy config",
    security(("bearer_auth" = []))
)]
pub async fn get_lateness_rules(
    auth: AuthUser,
    store: web::Data<dyn Store>,
    query: web::Query<ActiveQuery>,
) -> Result<HttpResponse, AppError> {
    auth.authorize(Resource::WorkRule, Action::Read)?;
    let rules = service::get_lateness_rules(store.get_ref(), query.active).await?;
    Ok(HttpResponse::Ok().json(rules))
}

#[utoipa::path(
    get,
    path = "/api/policy-config/lateness-rules/applicable",
    params(LatenessQuery),
    responses((status = 200, description = "Active, approved rules past their grace period", body = [LatenessRule])),
    tag = "Policy config",
    security(("bearer_auth" = []))
)]
pub async fn get_applicable_lateness_rules(
    auth: AuthUser,
    store: web::Data<dyn Store>,
    query: web::Query<LatenessQuery>,
) -> Result<HttpResponse, AppError> {
    auth.authorize(Resource::WorkRule, Action::Read)?;
    let rules = service::get_applicable_lateness_rules(store.get_ref(), query.minutes_late).await?;
    Ok(HttpResponse::Ok().json(rules))
}

#[utoipa::path(
    get,
    path = "/api/policy-config/lateness-rules/{id}",
    params(("id" = u64, Path, description = "Rule id")),
    responses(
        (status = 200, description = "Lateness rule", body = LatenessRule),
        (status = 404, description = "Rule not found")
    ),
    tag = "Policy config",
    security(("bearer_auth" = []))
)]
pub async fn get_lateness_rule(
    auth: AuthUser,
    store: web::Data<dyn Store>,
    path: web::Path<u64>,
) -> Result<HttpResponse, AppError> {
    auth.authorize(Resource::WorkRule, Action::Read)?;
    let rule = service::get_lateness_rule(store.get_ref(), path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(rule))
}

#[utoipa::path(
    put,
    path = "/api/policy-config/lateness-rules/{id}",
    params(("id" = u64, Path, description = "Rule id")),
    request_body = LatenessRuleUpdate,
    responses(
        (status = 200, description = "Lateness rule updated", body = LatenessRule),
        (status = 404, description = "Rule not found")
    ),
    tag = "Policy config",
    security(("bearer_auth" = []))
)]
pub async fn update_lateness_rule(
    auth: AuthUser,
    store: web::Data<dyn Store>,
    path: web::Path<u64>,
    payload: web::Json<LatenessRuleUpdate>,
) -> Result<HttpResponse, AppError> {
    auth.authorize(Resource::WorkRule, Action::Update)?;
    let rule =
        service::update_lateness_rule(store.get_ref(), path.into_inner(), &payload, auth.user_id)
            .await?;
    Ok(HttpResponse::Ok().json(rule))
}

#[utoipa::path(
    post,
    path = "/api/policy-config/lateness-rules/{id}/approve",
    params(("id" = u64, Path, description = "Rule id")),
    responses(
        (status = 200, description = "Lateness rule approved", body = LatenessRule),
        (status = 404, description = "Rule not found")
    ),
    tag = "Policy config",
    security(("bearer_auth" = []))
)]
pub async fn approve_lateness_rule(
    auth: AuthUser,
    store: web::Data<dyn Store>,
    path: web::Path<u64>,
) -> Result<HttpResponse, AppError> {
    auth.authorize(Resource::WorkRule, Action::Approve)?;
    let rule = service::approve_lateness_rule(store.get_ref(), path.into_inner(), auth.user_id)
        .await?;
    Ok(HttpResponse::Ok().json(rule))
}

#[utoipa::path(
    delete,
    path = "/api/policy-config/lateness-rules/{id}",
    params(("id" = u64, Path, description = "Rule id")),
    responses(
        (status = 204, description = "Lateness rule deleted"),
        (status = 404, description = "Rule not found")
    ),
    tag = "Policy config",
    security(("bearer_auth" = []))
)]
pub async fn delete_lateness_rule(
    auth: AuthUser,
    store: web::Data<dyn Store>,
    path: web::Path<u64>,
) -> Result<HttpResponse, AppError> {
    auth.authorize(Resource::WorkRule, Action::Delete)?;
    service::delete_lateness_rule(store.get_ref(), path.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}

// ---------------- Holidays ----------------

#[utoipa::path(
    post,
    path = "/api/policy-config/holidays",
    request_body = NewHoliday,
    responses(
        (status = 201, description = "Holiday created", body = Holiday),
        (status = 400, description = "End date precedes start date")
    ),
    tag = "Policy config",
    security(("bearer_auth" = []))
)]
pub async fn create_holiday(
    auth: AuthUser,
    store: web::Data<dyn Store>,
    payload: web::Json<NewHoliday>,
) -> Result<HttpResponse, AppError> {
    auth.authorize(Resource::Holiday, Action::Create)?;
    let holiday = service::create_holiday(store.get_ref(), &payload, auth.user_id).await?;
    Ok(HttpResponse::Created().json(holiday))
}

#[utoipa::path(
    get,
    path = "/api/policy-config/holidays",
    params(ActiveQuery),
    responses((status = 200, description = "Holidays", body = [Holiday])),
    tag = "Policy config",
    security(("bearer_auth" = []))
)]
pub async fn get_holidays(
    auth: AuthUser,
    store: web::Data<dyn Store>,
    query: web::Query<ActiveQuery>,
) -> Result<HttpResponse, AppError> {
    auth.authorize(Resource::Holiday, Action::Read)?;
    let holidays = service::get_holidays(store.get_ref(), query.active).await?;
    Ok(HttpResponse::Ok().json(holidays))
}

#[utoipa::path(
    get,
    path = "/api/policy-config/holidays/check",
    params(DateQuery),
    responses((status = 200, description = "Whether the date is a holiday", body = HolidayCheck)),
    tag = "Policy config",
    security(("bearer_auth" = []))
)]
pub async fn check_holiday(
    auth: AuthUser,
    store: web::Data<dyn Store>,
    query: web::Query<DateQuery>,
) -> Result<HttpResponse, AppError> {
    auth.authorize(Resource::Holiday, Action::Read)?;
    let check = service::check_holiday(store.get_ref(), query.date).await?;
    Ok(HttpResponse::Ok().json(check))
}

#[utoipa::path(
    get,
    path = "/api/policy-config/holidays/attendance-check",
    params(AttendanceQuery),
    responses(
        (status = 200, description = "Holiday check for an attendance record", body = AttendanceHolidayCheck),
        (status = 404, description = "Employee not found")
    ),
    tag = "Policy config",
    security(("bearer_auth" = []))
)]
pub async fn validate_attendance_holiday(
    auth: AuthUser,
    store: web::Data<dyn Store>,
    query: web::Query<AttendanceQuery>,
) -> Result<HttpResponse, AppError> {
    auth.authorize(Resource::Holiday, Action::Read)?;
    let check = service::validate_attendance_holiday(
        store.get_ref(),
        query.employee_id,
        query.date,
        query.suppress_penalty,
    )
    .await?;
    Ok(HttpResponse::Ok().json(check))
}

#[utoipa::path(
    get,
    path = "/api/policy-config/holidays/{id}",
    params(("id" = u64, Path, description = "Holiday id")),
    responses(
        (status = 200, description = "Holiday", body = Holiday),
        (status = 404, description = "Holiday not found")
    ),
    tag = "Policy config",
    security(("bearer_auth" = []))
)]
pub async fn get_holiday(
    auth: AuthUser,
    store: web::Data<dyn Store>,
    path: web::Path<u64>,
) -> Result<HttpResponse, AppError> {
    auth.authorize(Resource::Holiday, Action::Read)?;
    let holiday = service::get_holiday(store.get_ref(), path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(holiday))
}

#[utoipa::path(
    put,
    path = "/api/policy-config/holidays/{id}",
    params(("id" = u64, Path, description = "Holiday id")),
    request_body = HolidayUpdate,
    responses(
        (status = 200, description = "Holiday updated", body = Holiday),
        (status = 400, description = "End date precedes start date"),
        (status = 404, description = "Holiday not found")
    ),
    tag = "Policy config",
    security(("bearer_auth" = []))
)]
pub async fn update_holiday(
    auth: AuthUser,
    store: web::Data<dyn Store>,
    path: web::Path<u64>,
    payload: web::Json<HolidayUpdate>,
) -> Result<HttpResponse, AppError> {
    auth.authorize(Resource::Holiday, Action::Update)?;
    let holiday =
        service::update_holiday(store.get_ref(), path.into_inner(), &payload, auth.user_id)
            .await?;
    Ok(HttpResponse::Ok().json(holiday))
}

#[utoipa::path(
    delete,
    path = "/api/policy-config/holidays/{id}",
    params(("id" = u64, Path, description = "Holiday id")),
    responses(
        (status = 204, description = "Holiday deleted"),
        (status = 404, description = "Holiday not found")
    ),
    tag = "Policy config",
    security(("bearer_auth" = []))
)]
pub async fn delete_holiday(
    auth: AuthUser,
    store: web::Data<dyn Store>,
    path: web::Path<u64>,
) -> Result<HttpResponse, AppError> {
    auth.authorize(Resource::Holiday, Action::Delete)?;
    service::delete_holiday(store.get_ref(), path.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}
