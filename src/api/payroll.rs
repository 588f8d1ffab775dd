use actix_web::{HttpRequest, HttpResponse, web};
use serde::Deserialize;
use utoipa::IntoParams;

use crate::{
    auth::{Action, AuthUser, Resource},
    config::Config,
    error::AppError,
    model::{
        payroll_run::{EntryAdjustment, PayrollRun, RunEntry, RunFilter, RunStatus, RunTransitionRecord},
        payslip::{Payslip, PayslipFilter},
        statutory::StatutoryBreakdown,
    },
    service::{
        payroll::{
            self as service, ApplyStatutoryRequest, Idempotent, ProcessInitiationRequest,
            ProposePeriodRequest, ReviewInitiationRequest, ReviewPeriodRequest, UnlockRequest,
        },
        statutory,
    },
    store::Store,
};

pub const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct RunQuery {
    pub status: Option<RunStatus>,
    pub entity: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PayslipQuery {
    #[serde(alias = "runId")]
    pub run_id: Option<String>,
    #[serde(alias = "employeeId")]
    pub employee_id: Option<u64>,
}

fn idempotency_key(req: &HttpRequest) -> Option<&str> {
    req.headers()
        .get(IDEMPOTENCY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|k| !k.is_empty())
}

/// 201 for a new run, 200 when the key had already been used.
fn idempotent_response(result: Idempotent<PayrollRun>) -> HttpResponse {
    match result {
        Idempotent::Fresh(run) => HttpResponse::Created().json(run),
        Idempotent::Replayed(run) => HttpResponse::Ok().json(run),
    }
}

/// Callers who may only read their own payslips need a linked employee.
fn own_employee_id(auth: &AuthUser) -> Result<Option<u64>, AppError> {
    if auth.can(Resource::Payslip, Action::Read) {
        return Ok(None);
    }
    auth.authorize(Resource::Payslip, Action::ReadOwn)?;
    auth.employee_id
        .map(Some)
        .ok_or_else(|| AppError::Forbidden("No employee record linked to this user".into()))
}

// ---------------- Period ----------------

#[utoipa::path(
    post,
    path = "/api/payroll-execution/periods",
    request_body = ProposePeriodRequest,
    params(("Idempotency-Key" = Option<String>, Header, description = "Replays the first result when reused")),
    responses(
        (status = 201, description = "Period proposed", body = PayrollRun),
        (status = 200, description = "Idempotent replay of an earlier proposal", body = PayrollRun),
        (status = 400, description = "Invalid period, entity or currency"),
        (status = 409, description = "A run for this period and entity already exists")
    ),
    tag = "Payroll",
    security(("bearer_auth" = []))
)]
pub async fn propose_period(
    req: HttpRequest,
    auth: AuthUser,
    store: web::Data<dyn Store>,
    config: web::Data<Config>,
    payload: web::Json<ProposePeriodRequest>,
) -> Result<HttpResponse, AppError> {
    auth.authorize(Resource::PayrollRun, Action::Create)?;
    let result = service::propose_period(
        store.get_ref(),
        &config.payroll,
        &payload,
        auth.user_id,
        idempotency_key(&req),
    )
    .await?;
    Ok(idempotent_response(result))
}

#[utoipa::path(
    post,
    path = "/api/payroll-execution/periods/{run_id}/review",
    params(("run_id" = String, Path, description = "Payroll run id")),
    request_body = ReviewPeriodRequest,
    responses(
        (status = 200, description = "Period approved or rejected", body = PayrollRun),
        (status = 400, description = "Rejection without a reason"),
        (status = 404, description = "Run not found"),
        (status = 409, description = "Run is not awaiting period review")
    ),
    tag = "Payroll",
    security(("bearer_auth" = []))
)]
pub async fn review_period(
    auth: AuthUser,
    store: web::Data<dyn Store>,
    path: web::Path<String>,
    payload: web::Json<ReviewPeriodRequest>,
) -> Result<HttpResponse, AppError> {
    auth.authorize(Resource::PayrollRun, Action::Approve)?;
    let run = service::review_period(store.get_ref(), &path, &payload, auth.user_id).await?;
    Ok(HttpResponse::Ok().json(run))
}

// ---------------- Initiation ----------------

#[utoipa::path(
    post,
    path = "/api/payroll-execution/process-initiation",
    request_body = ProcessInitiationRequest,
    params(("Idempotency-Key" = Option<String>, Header, description = "Replays the first result when reused")),
    responses(
        (status = 201, description = "Draft run with one entry per active employee", body = PayrollRun),
        (status = 200, description = "Idempotent replay of an earlier initiation", body = PayrollRun),
        (status = 400, description = "Invalid period, entity or currency"),
        (status = 409, description = "No approved period for this month and entity")
    ),
    tag = "Payroll",
    security(("bearer_auth" = []))
)]
pub async fn process_initiation(
    req: HttpRequest,
    auth: AuthUser,
    store: web::Data<dyn Store>,
    config: web::Data<Config>,
    payload: web::Json<ProcessInitiationRequest>,
) -> Result<HttpResponse, AppError> {
    auth.authorize(Resource::PayrollRun, Action::Create)?;
    let result = service::process_initiation(
        store.get_ref(),
        &config.payroll,
        &payload,
        auth.user_id,
        idempotency_key(&req),
    )
    .await?;
    Ok(idempotent_response(result))
}

#[utoipa::path(
    post,
    path = "/api/payroll-execution/review-initiation",
    request_body = ReviewInitiationRequest,
    responses(
        (status = 200, description = "Draft approved or rejected", body = PayrollRun),
        (status = 400, description = "Rejection without a reason"),
        (status = 404, description = "Run not found"),
        (status = 409, description = "Run is not in DRAFT")
    ),
    tag = "Payroll",
    security(("bearer_auth" = []))
)]
pub async fn review_initiation(
    auth: AuthUser,
    store: web::Data<dyn Store>,
    payload: web::Json<ReviewInitiationRequest>,
) -> Result<HttpResponse, AppError> {
    auth.authorize(Resource::PayrollRun, Action::Approve)?;
    let run = service::review_initiation(store.get_ref(), &payload, auth.user_id).await?;
    Ok(HttpResponse::Ok().json(run))
}

#[utoipa::path(
    patch,
    path = "/api/payroll-execution/runs/{run_id}/entries/{employee_id}",
    params(
        ("run_id" = String, Path, description = "Payroll run id"),
        ("employee_id" = u64, Path, description = "Employee id")
    ),
    request_body = EntryAdjustment,
    responses(
        (status = 200, description = "Entry recalculated", body = RunEntry),
        (status = 400, description = "Negative adjustment"),
        (status = 404, description = "Run or entry not found"),
        (status = 409, description = "Run is not in DRAFT")
    ),
    tag = "Payroll",
    security(("bearer_auth" = []))
)]
pub async fn adjust_entry(
    auth: AuthUser,
    store: web::Data<dyn Store>,
    path: web::Path<(String, u64)>,
    payload: web::Json<EntryAdjustment>,
) -> Result<HttpResponse, AppError> {
    auth.authorize(Resource::PayrollRun, Action::Update)?;
    let (run_id, employee_id) = path.into_inner();
    let entry = service::adjust_entry(store.get_ref(), &run_id, employee_id, &payload).await?;
    Ok(HttpResponse::Ok().json(entry))
}

// ---------------- Execution ----------------

#[utoipa::path(
    post,
    path = "/api/payroll-execution/apply-statutory-rules",
    request_body = ApplyStatutoryRequest,
    responses(
        (status = 200, description = "Taxes and insurance owed on the salary", body = StatutoryBreakdown),
        (status = 400, description = "Negative salary"),
        (status = 404, description = "Employee not found")
    ),
    tag = "Payroll",
    security(("bearer_auth" = []))
)]
pub async fn apply_statutory_rules(
    auth: AuthUser,
    store: web::Data<dyn Store>,
    payload: web::Json<ApplyStatutoryRequest>,
) -> Result<HttpResponse, AppError> {
    auth.authorize(Resource::PayrollRun, Action::Execute)?;
    let breakdown =
        statutory::apply_statutory_rules(store.get_ref(), payload.employee_id, payload.base_salary)
            .await?;
    Ok(HttpResponse::Ok().json(breakdown))
}

#[utoipa::path(
    post,
    path = "/api/payroll-execution/runs/{run_id}/apply-deductions",
    params(("run_id" = String, Path, description = "Payroll run id")),
    responses(
        (status = 200, description = "Deductions applied to every entry", body = PayrollRun),
        (status = 404, description = "Run not found"),
        (status = 409, description = "Run is not APPROVED")
    ),
    tag = "Payroll",
    security(("bearer_auth" = []))
)]
pub async fn apply_deductions(
    auth: AuthUser,
    store: web::Data<dyn Store>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    auth.authorize(Resource::PayrollRun, Action::Execute)?;
    let run = service::apply_deductions(store.get_ref(), &path, auth.user_id).await?;
    Ok(HttpResponse::Ok().json(run))
}

#[utoipa::path(
    post,
    path = "/api/payroll-execution/runs/{run_id}/payslips",
    params(("run_id" = String, Path, description = "Payroll run id")),
    responses(
        (status = 200, description = "One payslip per entry generated", body = PayrollRun),
        (status = 404, description = "Run not found"),
        (status = 409, description = "Deductions have not been applied")
    ),
    tag = "Payroll",
    security(("bearer_auth" = []))
)]
pub async fn generate_payslips(
    auth: AuthUser,
    store: web::Data<dyn Store>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    auth.authorize(Resource::PayrollRun, Action::Execute)?;
    let run = service::generate_payslips(store.get_ref(), &path, auth.user_id).await?;
    Ok(HttpResponse::Ok().json(run))
}

#[utoipa::path(
    post,
    path = "/api/payroll-execution/runs/{run_id}/lock",
    params(("run_id" = String, Path, description = "Payroll run id")),
    responses(
        (status = 200, description = "Run locked", body = PayrollRun),
        (status = 409, description = "Payslips have not been generated")
    ),
    tag = "Payroll",
    security(("bearer_auth" = []))
)]
pub async fn lock_run(
    auth: AuthUser,
    store: web::Data<dyn Store>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    auth.authorize(Resource::PayrollRun, Action::Approve)?;
    let run = service::lock_run(store.get_ref(), &path, auth.user_id).await?;
    Ok(HttpResponse::Ok().json(run))
}

#[utoipa::path(
    post,
    path = "/api/payroll-execution/runs/{run_id}/unlock",
    params(("run_id" = String, Path, description = "Payroll run id")),
    request_body = UnlockRequest,
    responses(
        (status = 200, description = "Run unlocked", body = PayrollRun),
        (status = 400, description = "Missing reason"),
        (status = 409, description = "Run is not LOCKED")
    ),
    tag = "Payroll",
    security(("bearer_auth" = []))
)]
pub async fn unlock_run(
    auth: AuthUser,
    store: web::Data<dyn Store>,
    path: web::Path<String>,
    payload: web::Json<UnlockRequest>,
) -> Result<HttpResponse, AppError> {
    auth.authorize(Resource::PayrollRun, Action::Approve)?;
    let run = service::unlock_run(store.get_ref(), &path, &payload, auth.user_id).await?;
    Ok(HttpResponse::Ok().json(run))
}

#[utoipa::path(
    post,
    path = "/api/payroll-execution/runs/{run_id}/mark-paid",
    params(("run_id" = String, Path, description = "Payroll run id")),
    responses(
        (status = 200, description = "Run and its payslips marked paid", body = PayrollRun),
        (status = 409, description = "Run is not LOCKED")
    ),
    tag = "Payroll",
    security(("bearer_auth" = []))
)]
pub async fn mark_paid(
    auth: AuthUser,
    store: web::Data<dyn Store>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    auth.authorize(Resource::PayrollRun, Action::Settle)?;
    let run = service::mark_paid(store.get_ref(), &path, auth.user_id).await?;
    Ok(HttpResponse::Ok().json(run))
}

// ---------------- Queries ----------------

#[utoipa::path(
    get,
    path = "/api/payroll-execution/runs",
    params(RunQuery),
    responses((status = 200, description = "Payroll runs, newest period first", body = [PayrollRun])),
    tag = "Payroll",
    security(("bearer_auth" = []))
)]
pub async fn get_runs(
    auth: AuthUser,
    store: web::Data<dyn Store>,
    query: web::Query<RunQuery>,
) -> Result<HttpResponse, AppError> {
    auth.authorize(Resource::PayrollRun, Action::Read)?;
    let filter = RunFilter {
        status: query.status,
        entity: query.entity.clone().filter(|e| !e.trim().is_empty()),
    };
    let runs = service::get_runs(store.get_ref(), &filter).await?;
    Ok(HttpResponse::Ok().json(runs))
}

#[utoipa::path(
    get,
    path = "/api/payroll-execution/runs/{run_id}",
    params(("run_id" = String, Path, description = "Payroll run id")),
    responses(
        (status = 200, description = "Payroll run", body = PayrollRun),
        (status = 404, description = "Run not found")
    ),
    tag = "Payroll",
    security(("bearer_auth" = []))
)]
pub async fn get_run(
    auth: AuthUser,
    store: web::Data<dyn Store>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    auth.authorize(Resource::PayrollRun, Action::Read)?;
    let run = service::get_run(store.get_ref(), &path).await?;
    Ok(HttpResponse::Ok().json(run))
}

#[utoipa::path(
    get,
    path = "/api/payroll-execution/runs/{run_id}/entries",
    params(("run_id" = String, Path, description = "Payroll run id")),
    responses(
        (status = 200, description = "Per-employee entries", body = [RunEntry]),
        (status = 404, description = "Run not found")
    ),
    tag = "Payroll",
    security(("bearer_auth" = []))
)]
pub async fn get_run_entries(
    auth: AuthUser,
    store: web::Data<dyn Store>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    auth.authorize(Resource::PayrollRun, Action::Read)?;
    let entries = service::get_run_entries(store.get_ref(), &path).await?;
    Ok(HttpResponse::Ok().json(entries))
}

#[utoipa::path(
    get,
    path = "/api/payroll-execution/runs/{run_id}/transitions",
    params(("run_id" = String, Path, description = "Payroll run id")),
    responses((status = 200, description = "Audit trail of status changes", body = [RunTransitionRecord])),
    tag = "Payroll",
    security(("bearer_auth" = []))
)]
pub async fn get_run_transitions(
    auth: AuthUser,
    store: web::Data<dyn Store>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    auth.authorize(Resource::PayrollRun, Action::Read)?;
    let transitions = service::get_run_transitions(store.get_ref(), &path).await?;
    Ok(HttpResponse::Ok().json(transitions))
}

#[utoipa::path(
    get,
    path = "/api/payroll-execution/payslips",
    params(PayslipQuery),
    responses(
        (status = 200, description = "Payslips; employees only see their own", body = [Payslip]),
        (status = 403, description = "No permission or no linked employee")
    ),
    tag = "Payroll",
    security(("bearer_auth" = []))
)]
pub async fn get_payslips(
    auth: AuthUser,
    store: web::Data<dyn Store>,
    query: web::Query<PayslipQuery>,
) -> Result<HttpResponse, AppError> {
    let own = own_employee_id(&auth)?;
    let filter = PayslipFilter {
        payroll_run_id: query.run_id.clone(),
        employee_id: own.or(query.employee_id),
    };
    let payslips = service::get_payslips(store.get_ref(), &filter).await?;
    Ok(HttpResponse::Ok().json(payslips))
}

#[utoipa::path(
    get,
    path = "/api/payroll-execution/payslips/{id}",
    params(("id" = u64, Path, description = "Payslip id")),
    responses(
        (status = 200, description = "Payslip", body = Payslip),
        (status = 403, description = "Payslip belongs to another employee"),
        (status = 404, description = "Payslip not found")
    ),
    tag = "Payroll",
    security(("bearer_auth" = []))
)]
pub async fn get_payslip(
    auth: AuthUser,
    store: web::Data<dyn Store>,
    path: web::Path<u64>,
) -> Result<HttpResponse, AppError> {
    let own = own_employee_id(&auth)?;
    let payslip = service::get_payslip(store.get_ref(), path.into_inner()).await?;
    if own.is_some_and(|id| id != payslip.employee_id) {
        return Err(AppError::Forbidden("Payslip belongs to another employee".into()));
    }
    Ok(HttpResponse::Ok().json(payslip))
}
