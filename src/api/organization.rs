use actix_web::{HttpResponse, web};
use chrono::NaiveDate;
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};

use crate::{
    auth::{Action, AuthUser, Resource},
    error::AppError,
    model::change_request::{
        ApprovalDecision, ChangeRequestStatus, ChangeRequestUpdate, NewChangeRequest,
        StructureApproval, StructureChangeRequest,
    },
    model::department::{
        Department, DepartmentNode, DepartmentUpdate, NewAssignment, NewDepartment, NewPosition,
        Position, PositionAssignment, PositionUpdate,
    },
    service::organization as service,
    store::Store,
};

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ActiveQuery {
    #[serde(alias = "isActive")]
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PositionQuery {
    #[serde(alias = "departmentId")]
    pub department_id: Option<u64>,
    #[serde(alias = "isActive")]
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AssignmentQuery {
    #[serde(alias = "employeeId")]
    pub employee_id: Option<u64>,
    #[serde(alias = "positionId")]
    pub position_id: Option<u64>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ChangeRequestQuery {
    pub status: Option<ChangeRequestStatus>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct EndAssignment {
    pub end_date: NaiveDate,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ApprovalDecisionReq {
    /// `approved` or `rejected`
    pub decision: ApprovalDecision,
    pub comments: Option<String>,
}

// ---------------- Departments ----------------

#[utoipa::path(
    post,
    path = "/api/organization-structure/departments",
    request_body = NewDepartment,
    responses(
        (status = 201, description = "Department created", body = Department),
        (status = 400, description = "Invalid payload or unknown parent"),
        (status = 409, description = "Department code already exists")
    ),
    tag = "Organization",
    security(("bearer_auth" = []))
)]
pub async fn create_department(
    auth: AuthUser,
    store: web::Data<dyn Store>,
    payload: web::Json<NewDepartment>,
) -> Result<HttpResponse, AppError> {
    auth.authorize(Resource::OrgStructure, Action::Create)?;
    let dept = service::create_department(store.get_ref(), &payload).await?;
    Ok(HttpResponse::Created().json(dept))
}

#[utoipa::path(
    get,
    path = "/api/organization-structure/departments",
    params(ActiveQuery),
    responses((status = 200, description = "Departments", body = [Department])),
    tag = "Organization",
    security(("bearer_auth" = []))
)]
pub async fn get_departments(
    auth: AuthUser,
    store: web::Data<dyn Store>,
    query: web::Query<ActiveQuery>,
) -> Result<HttpResponse, AppError> {
    auth.authorize(Resource::OrgStructure, Action::Read)?;
    let depts = service::get_departments(store.get_ref(), query.is_active).await?;
    Ok(HttpResponse::Ok().json(depts))
}

#[utoipa::path(
    get,
    path = "/api/organization-structure/departments/hierarchy",
    responses((status = 200, description = "Active departments as a forest", body = [DepartmentNode])),
    tag = "Organization",
    security(("bearer_auth" = []))
)]
pub async fn get_department_hierarchy(
    auth: AuthUser,
    store: web::Data<dyn Store>,
) -> Result<HttpResponse, AppError> {
    auth.authorize(Resource::OrgStructure, Action::Read)?;
    let tree = service::get_department_hierarchy(store.get_ref()).await?;
    Ok(HttpResponse::Ok().json(tree))
}

#[utoipa::path(
    get,
    path = "/api/organization-structure/departments/{id}",
    params(("id" = u64, Path, description = "Department id")),
    responses(
        (status = 200, description = "Department", body = Department),
        (status = 404, description = "Department not found")
    ),
    tag = "Organization",
    security(("bearer_auth" = []))
)]
pub async fn get_department(
    auth: AuthUser,
    store: web::Data<dyn Store>,
    path: web::Path<u64>,
) -> Result<HttpResponse, AppError> {
    auth.authorize(Resource::OrgStructure, Action::Read)?;
    let dept = service::get_department(store.get_ref(), path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(dept))
}

#[utoipa::path(
    put,
    path = "/api/organization-structure/departments/{id}",
    params(("id" = u64, Path, description = "Department id")),
    request_body = DepartmentUpdate,
    responses(
        (status = 200, description = "Department updated", body = Department),
        (status = 400, description = "Unknown parent or parent cycle"),
        (status = 404, description = "Department not found")
    ),
    tag = "Organization",
    security(("bearer_auth" = []))
)]
pub async fn update_department(
    auth: AuthUser,
    store: web::Data<dyn Store>,
    path: web::Path<u64>,
    payload: web::Json<DepartmentUpdate>,
) -> Result<HttpResponse, AppError> {
    auth.authorize(Resource::OrgStructure, Action::Update)?;
    let dept = service::update_department(store.get_ref(), path.into_inner(), &payload).await?;
    Ok(HttpResponse::Ok().json(dept))
}

#[utoipa::path(
    delete,
    path = "/api/organization-structure/departments/{id}",
    params(("id" = u64, Path, description = "Department id")),
    responses(
        (status = 200, description = "Department deactivated", body = Department),
        (status = 404, description = "Department not found")
    ),
    tag = "Organization",
    security(("bearer_auth" = []))
)]
pub async fn deactivate_department(
    auth: AuthUser,
    store: web::Data<dyn Store>,
    path: web::Path<u64>,
) -> Result<HttpResponse, AppError> {
    auth.authorize(Resource::OrgStructure, Action::Delete)?;
    let dept = service::deactivate_department(store.get_ref(), path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(dept))
}

// ---------------- Positions ----------------

#[utoipa::path(
    post,
    path = "/api/organization-structure/positions",
    request_body = NewPosition,
    responses(
        (status = 201, description = "Position created", body = Position),
        (status = 400, description = "Unknown or inactive department"),
        (status = 409, description = "Position code already exists")
    ),
    tag = "Organization",
    security(("bearer_auth" = []))
)]
pub async fn create_position(
    auth: AuthUser,
    store: web::Data<dyn Store>,
    payload: web::Json<NewPosition>,
) -> Result<HttpResponse, AppError> {
    auth.authorize(Resource::OrgStructure, Action::Create)?;
    let position = service::create_position(store.get_ref(), &payload).await?;
    Ok(HttpResponse::Created().json(position))
}

#[utoipa::path(
    get,
    path = "/api/organization-structure/positions",
    params(PositionQuery),
    responses((status = 200, description = "Positions", body = [Position])),
    tag = "Organization",
    security(("bearer_auth" = []))
)]
pub async fn get_positions(
    auth: AuthUser,
    store: web::Data<dyn Store>,
    query: web::Query<PositionQuery>,
) -> Result<HttpResponse, AppError> {
    auth.authorize(Resource::OrgStructure, Action::Read)?;
    let positions =
        service::get_positions(store.get_ref(), query.department_id, query.is_active).await?;
    Ok(HttpResponse::Ok().json(positions))
}

#[utoipa::path(
    get,
    path = "/api/organization-structure/positions/{id}",
    params(("id" = u64, Path, description = "Position id")),
    responses(
        (status = 200, description = "Position", body = Position),
        (status = 404, description = "Position not found")
    ),
    tag = "Organization",
    security(("bearer_auth" = []))
)]
pub async fn get_position(
    auth: AuthUser,
    store: web::Data<dyn Store>,
    path: web::Path<u64>,
) -> Result<HttpResponse, AppError> {
    auth.authorize(Resource::OrgStructure, Action::Read)?;
    let position = service::get_position(store.get_ref(), path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(position))
}

#[utoipa::path(
    put,
    path = "/api/organization-structure/positions/{id}",
    params(("id" = u64, Path, description = "Position id")),
    request_body = PositionUpdate,
    responses(
        (status = 200, description = "Position updated", body = Position),
        (status = 400, description = "Reporting line would form a cycle"),
        (status = 404, description = "Position not found")
    ),
    tag = "Organization",
    security(("bearer_auth" = []))
)]
pub async fn update_position(
    auth: AuthUser,
    store: web::Data<dyn Store>,
    path: web::Path<u64>,
    payload: web::Json<PositionUpdate>,
) -> Result<HttpResponse, AppError> {
    auth.authorize(Resource::OrgStructure, Action::Update)?;
    let position = service::update_position(store.get_ref(), path.into_inner(), &payload).await?;
    Ok(HttpResponse::Ok().json(position))
}

#[utoipa::path(
    delete,
    path = "/api/organization-structure/positions/{id}",
    params(("id" = u64, Path, description = "Position id")),
    responses(
        (status = 200, description = "Position deactivated", body = Position),
        (status = 404, description = "Position not found")
    ),
    tag = "Organization",
    security(("bearer_auth" = []))
)]
pub async fn deactivate_position(
    auth: AuthUser,
    store: web::Data<dyn Store>,
    path: web::Path<u64>,
) -> Result<HttpResponse, AppError> {
    auth.authorize(Resource::OrgStructure, Action::Delete)?;
    let position = service::deactivate_position(store.get_ref(), path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(position))
}

// ---------------- Assignments ----------------

#[utoipa::path(
    post,
    path = "/api/organization-structure/assignments",
    request_body = NewAssignment,
    responses(
        (status = 201, description = "Employee assigned", body = PositionAssignment),
        (status = 400, description = "Unknown employee or inactive position")
    ),
    tag = "Organization",
    security(("bearer_auth" = []))
)]
pub async fn assign_position(
    auth: AuthUser,
    store: web::Data<dyn Store>,
    payload: web::Json<NewAssignment>,
) -> Result<HttpResponse, AppError> {
    auth.authorize(Resource::OrgStructure, Action::Create)?;
    let assignment = service::assign_position(store.get_ref(), &payload).await?;
    Ok(HttpResponse::Created().json(assignment))
}

#[utoipa::path(
    get,
    path = "/api/organization-structure/assignments",
    params(AssignmentQuery),
    responses((status = 200, description = "Assignments", body = [PositionAssignment])),
    tag = "Organization",
    security(("bearer_auth" = []))
)]
pub async fn get_assignments(
    auth: AuthUser,
    store: web::Data<dyn Store>,
    query: web::Query<AssignmentQuery>,
) -> Result<HttpResponse, AppError> {
    auth.authorize(Resource::OrgStructure, Action::Read)?;
    let assignments =
        service::get_assignments(store.get_ref(), query.employee_id, query.position_id).await?;
    Ok(HttpResponse::Ok().json(assignments))
}

#[utoipa::path(
    post,
    path = "/api/organization-structure/assignments/{id}/end",
    params(("id" = u64, Path, description = "Assignment id")),
    request_body = EndAssignment,
    responses(
        (status = 200, description = "Assignment ended", body = PositionAssignment),
        (status = 400, description = "End date precedes start date"),
        (status = 404, description = "Assignment not found")
    ),
    tag = "Organization",
    security(("bearer_auth" = []))
)]
pub async fn end_assignment(
    auth: AuthUser,
    store: web::Data<dyn Store>,
    path: web::Path<u64>,
    payload: web::Json<EndAssignment>,
) -> Result<HttpResponse, AppError> {
    auth.authorize(Resource::OrgStructure, Action::Update)?;
    let assignment =
        service::end_assignment(store.get_ref(), path.into_inner(), payload.end_date).await?;
    Ok(HttpResponse::Ok().json(assignment))
}

// ---------------- Change requests ----------------

#[utoipa::path(
    post,
    path = "/api/organization-structure/change-requests",
    request_body = NewChangeRequest,
    responses(
        (status = 201, description = "Change request created in `pending`", body = StructureChangeRequest),
        (status = 400, description = "Missing reason or target")
    ),
    tag = "Organization",
    security(("bearer_auth" = []))
)]
pub async fn create_change_request(
    auth: AuthUser,
    store: web::Data<dyn Store>,
    payload: web::Json<NewChangeRequest>,
) -> Result<HttpResponse, AppError> {
    auth.authorize(Resource::ChangeRequest, Action::Create)?;
    let request = service::create_change_request(store.get_ref(), &payload, auth.user_id).await?;
    Ok(HttpResponse::Created().json(request))
}

#[utoipa::path(
    get,
    path = "/api/organization-structure/change-requests",
    params(ChangeRequestQuery),
    responses((status = 200, description = "Change requests", body = [StructureChangeRequest])),
    tag = "Organization",
    security(("bearer_auth" = []))
)]
pub async fn get_change_requests(
    auth: AuthUser,
    store: web::Data<dyn Store>,
    query: web::Query<ChangeRequestQuery>,
) -> Result<HttpResponse, AppError> {
    auth.authorize(Resource::ChangeRequest, Action::Read)?;
    let requests = service::get_change_requests(store.get_ref(), query.status).await?;
    Ok(HttpResponse::Ok().json(requests))
}

#[utoipa::path(
    get,
    path = "/api/organization-structure/change-requests/{id}",
    params(("id" = u64, Path, description = "Change request id")),
    responses(
        (status = 200, description = "Change request", body = StructureChangeRequest),
        (status = 404, description = "Change request not found")
    ),
    tag = "Organization",
    security(("bearer_auth" = []))
)]
pub async fn get_change_request(
    auth: AuthUser,
    store: web::Data<dyn Store>,
    path: web::Path<u64>,
) -> Result<HttpResponse, AppError> {
    auth.authorize(Resource::ChangeRequest, Action::Read)?;
    let request = service::get_change_request(store.get_ref(), path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(request))
}

#[utoipa::path(
    put,
    path = "/api/organization-structure/change-requests/{id}",
    params(("id" = u64, Path, description = "Change request id")),
    request_body = ChangeRequestUpdate,
    responses(
        (status = 200, description = "Change request updated", body = StructureChangeRequest),
        (status = 409, description = "Request is no longer pending")
    ),
    tag = "Organization",
    security(("bearer_auth" = []))
)]
pub async fn update_change_request(
    auth: AuthUser,
    store: web::Data<dyn Store>,
    path: web::Path<u64>,
    payload: web::Json<ChangeRequestUpdate>,
) -> Result<HttpResponse, AppError> {
    auth.authorize(Resource::ChangeRequest, Action::Update)?;
    let request =
        service::update_change_request(store.get_ref(), path.into_inner(), &payload).await?;
    Ok(HttpResponse::Ok().json(request))
}

#[utoipa::path(
    post,
    path = "/api/organization-structure/change-requests/{id}/submit",
    params(("id" = u64, Path, description = "Change request id")),
    responses(
        (status = 200, description = "Submitted", body = StructureChangeRequest),
        (status = 409, description = "Request is not pending")
    ),
    tag = "Organization",
    security(("bearer_auth" = []))
)]
pub async fn submit_change_request(
    auth: AuthUser,
    store: web::Data<dyn Store>,
    path: web::Path<u64>,
) -> Result<HttpResponse, AppError> {
    auth.authorize(Resource::ChangeRequest, Action::Submit)?;
    let request = service::submit_change_request(store.get_ref(), path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(request))
}

#[utoipa::path(
    post,
    path = "/api/organization-structure/change-requests/{id}/cancel",
    params(("id" = u64, Path, description = "Change request id")),
    responses(
        (status = 200, description = "Cancelled", body = StructureChangeRequest),
        (status = 409, description = "Request is already under review or decided")
    ),
    tag = "Organization",
    security(("bearer_auth" = []))
)]
pub async fn cancel_change_request(
    auth: AuthUser,
    store: web::Data<dyn Store>,
    path: web::Path<u64>,
) -> Result<HttpResponse, AppError> {
    auth.authorize(Resource::ChangeRequest, Action::Delete)?;
    let request = service::cancel_change_request(store.get_ref(), path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(request))
}

// ---------------- Approvals ----------------

#[utoipa::path(
    post,
    path = "/api/organization-structure/change-requests/{id}/approvals",
    params(("id" = u64, Path, description = "Change request id")),
    responses(
        (status = 201, description = "Review opened; request is now under_review", body = StructureApproval),
        (status = 409, description = "Request is not submitted")
    ),
    tag = "Organization",
    security(("bearer_auth" = []))
)]
pub async fn create_approval(
    auth: AuthUser,
    store: web::Data<dyn Store>,
    path: web::Path<u64>,
) -> Result<HttpResponse, AppError> {
    auth.authorize(Resource::StructureApproval, Action::Create)?;
    let approval = service::create_approval(store.get_ref(), path.into_inner(), auth.user_id).await?;
    Ok(HttpResponse::Created().json(approval))
}

#[utoipa::path(
    get,
    path = "/api/organization-structure/change-requests/{id}/approvals",
    params(("id" = u64, Path, description = "Change request id")),
    responses((status = 200, description = "Approvals", body = [StructureApproval])),
    tag = "Organization",
    security(("bearer_auth" = []))
)]
pub async fn get_approvals(
    auth: AuthUser,
    store: web::Data<dyn Store>,
    path: web::Path<u64>,
) -> Result<HttpResponse, AppError> {
    auth.authorize(Resource::StructureApproval, Action::Read)?;
    let approvals = service::get_approvals(store.get_ref(), path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(approvals))
}

#[utoipa::path(
    put,
    path = "/api/organization-structure/approvals/{id}",
    params(("id" = u64, Path, description = "Approval id")),
    request_body = ApprovalDecisionReq,
    responses(
        (status = 200, description = "Decision recorded", body = StructureApproval),
        (status = 400, description = "Decision must be approved or rejected"),
        (status = 409, description = "Approval already decided")
    ),
    tag = "Organization",
    security(("bearer_auth" = []))
)]
pub async fn update_approval_decision(
    auth: AuthUser,
    store: web::Data<dyn Store>,
    path: web::Path<u64>,
    payload: web::Json<ApprovalDecisionReq>,
) -> Result<HttpResponse, AppError> {
    auth.authorize(Resource::StructureApproval, Action::Approve)?;
    let approval = service::update_approval_decision(
        store.get_ref(),
        path.into_inner(),
        payload.decision,
        payload.comments.as_deref(),
    )
    .await?;
    Ok(HttpResponse::Ok().json(approval))
}
