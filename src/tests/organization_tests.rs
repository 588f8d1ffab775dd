use actix_web::{http::StatusCode, test};
use serde_json::{Value, json};

use super::helpers::{app, as_role, seed_employee, store};
use crate::model::change_request::{
    ApprovalDecision, ChangeRequestStatus, StructureApproval, StructureChangeRequest,
};
use crate::model::department::{Department, Position, PositionAssignment};
use crate::model::role::Role;

const HR_MANAGER: u64 = 2;
const HR_EMPLOYEE: u64 = 3;

#[actix_web::test]
async fn hierarchy_lists_active_departments_with_children() {
    let app = test::init_service(app(store())).await;

    let resp = test::call_service(
        &app,
        as_role(test::TestRequest::post().uri("/api/organization-structure/departments"), HR_MANAGER, Role::HrManager)
            .set_json(json!({ "code": "ENG", "name": "Engineering" }))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let eng: Department = test::read_body_json(resp).await;
    assert!(eng.is_active);

    let hierarchy = |role| {
        as_role(test::TestRequest::get().uri("/api/organization-structure/departments/hierarchy"), 40, role)
            .to_request()
    };
    let resp = test::call_service(&app, hierarchy(Role::Employee)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let tree: Value = test::read_body_json(resp).await;
    assert_eq!(tree.as_array().map(Vec::len), Some(1));
    assert_eq!(tree[0]["code"], "ENG");
    assert_eq!(tree[0]["children"], json!([]));

    let resp = test::call_service(
        &app,
        as_role(test::TestRequest::post().uri("/api/organization-structure/departments"), HR_MANAGER, Role::HrManager)
            .set_json(json!({ "code": "ENG-PLT", "name": "Platform", "parent_department_id": eng.id }))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let platform: Department = test::read_body_json(resp).await;

    let resp = test::call_service(&app, hierarchy(Role::Employee)).await;
    let tree: Value = test::read_body_json(resp).await;
    assert_eq!(tree[0]["children"][0]["code"], "ENG-PLT");

    let resp = test::call_service(
        &app,
        as_role(
            test::TestRequest::delete().uri(&format!("/api/organization-structure/departments/{}", platform.id)),
            HR_MANAGER,
            Role::HrManager,
        )
        .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let platform: Department = test::read_body_json(resp).await;
    assert!(!platform.is_active);

    let resp = test::call_service(&app, hierarchy(Role::Employee)).await;
    let tree: Value = test::read_body_json(resp).await;
    assert_eq!(tree[0]["children"], json!([]));
}

#[actix_web::test]
async fn department_codes_are_unique_and_parents_must_exist() {
    let app = test::init_service(app(store())).await;
    let create = |body: Value| {
        as_role(test::TestRequest::post().uri("/api/organization-structure/departments"), HR_MANAGER, Role::HrManager)
            .set_json(body)
            .to_request()
    };

    let resp = test::call_service(&app, create(json!({ "code": "FIN", "name": "Finance" }))).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let resp = test::call_service(&app, create(json!({ "code": "FIN", "name": "Finance again" }))).await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    let resp = test::call_service(
        &app,
        create(json!({ "code": "OPS", "name": "Ops", "parent_department_id": 404 })),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn employees_cannot_change_structure() {
    let app = test::init_service(app(store())).await;
    let resp = test::call_service(
        &app,
        as_role(test::TestRequest::post().uri("/api/organization-structure/departments"), 40, Role::Employee)
            .set_json(json!({ "code": "ENG", "name": "Engineering" }))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

#[actix_web::test]
async fn position_assignment_can_be_ended() {
    let store = store();
    let employee = seed_employee(&store, "E1", "10000", "0").await;
    let app = test::init_service(app(store)).await;

    let resp = test::call_service(
        &app,
        as_role(test::TestRequest::post().uri("/api/organization-structure/departments"), HR_MANAGER, Role::HrManager)
            .set_json(json!({ "code": "ENG", "name": "Engineering" }))
            .to_request(),
    )
    .await;
    let eng: Department = test::read_body_json(resp).await;

    let resp = test::call_service(
        &app,
        as_role(test::TestRequest::post().uri("/api/organization-structure/positions"), HR_MANAGER, Role::HrManager)
            .set_json(json!({ "code": "ENG-LEAD", "title": "Engineering Lead", "department_id": eng.id }))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let lead: Position = test::read_body_json(resp).await;

    let resp = test::call_service(
        &app,
        as_role(test::TestRequest::post().uri("/api/organization-structure/assignments"), HR_MANAGER, Role::HrManager)
            .set_json(json!({ "employee_id": employee.id, "position_id": lead.id, "start_date": "2025-01-01" }))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let assignment: PositionAssignment = test::read_body_json(resp).await;
    assert_eq!(assignment.end_date, None);

    // Ending before the start is invalid.
    let end = |date: &str| {
        as_role(
            test::TestRequest::post()
                .uri(&format!("/api/organization-structure/assignments/{}/end", assignment.id)),
            HR_MANAGER,
            Role::HrManager,
        )
        .set_json(json!({ "end_date": date }))
        .to_request()
    };
    let resp = test::call_service(&app, end("2024-12-31")).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let resp = test::call_service(&app, end("2025-06-30")).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let ended: PositionAssignment = test::read_body_json(resp).await;
    assert!(ended.end_date.is_some());
}

#[actix_web::test]
async fn change_request_review_flow() {
    let app = test::init_service(app(store())).await;

    let resp = test::call_service(
        &app,
        as_role(test::TestRequest::post().uri("/api/organization-structure/departments"), HR_MANAGER, Role::HrManager)
            .set_json(json!({ "code": "ENG", "name": "Engineering" }))
            .to_request(),
    )
    .await;
    let eng: Department = test::read_body_json(resp).await;

    let resp = test::call_service(
        &app,
        as_role(test::TestRequest::post().uri("/api/organization-structure/change-requests"), HR_EMPLOYEE, Role::HrEmployee)
            .set_json(json!({
                "request_type": "UPDATE_DEPARTMENT",
                "target_department_id": eng.id,
                "reason": "split platform team"
            }))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let request: StructureChangeRequest = test::read_body_json(resp).await;
    assert_eq!(request.status, ChangeRequestStatus::Pending);
    assert_eq!(request.requested_by, HR_EMPLOYEE);
    assert!(request.request_number.starts_with("SCR-"));

    let approvals_uri = format!("/api/organization-structure/change-requests/{}/approvals", request.id);
    let open_review = || {
        as_role(test::TestRequest::post().uri(&approvals_uri), HR_MANAGER, Role::HrManager).to_request()
    };

    // Reviews only start once the request is submitted.
    let resp = test::call_service(&app, open_review()).await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);

    let resp = test::call_service(
        &app,
        as_role(
            test::TestRequest::post()
                .uri(&format!("/api/organization-structure/change-requests/{}/submit", request.id)),
            HR_EMPLOYEE,
            Role::HrEmployee,
        )
        .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let submitted: StructureChangeRequest = test::read_body_json(resp).await;
    assert_eq!(submitted.status, ChangeRequestStatus::Submitted);

    // HR employees can read approvals but not open one.
    let resp = test::call_service(
        &app,
        as_role(test::TestRequest::post().uri(&approvals_uri), HR_EMPLOYEE, Role::HrEmployee).to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let resp = test::call_service(&app, open_review()).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let approval: StructureApproval = test::read_body_json(resp).await;
    assert_eq!(approval.decision, ApprovalDecision::Pending);

    let resp = test::call_service(
        &app,
        as_role(
            test::TestRequest::get()
                .uri(&format!("/api/organization-structure/change-requests/{}", request.id)),
            HR_EMPLOYEE,
            Role::HrEmployee,
        )
        .to_request(),
    )
    .await;
    let under_review: StructureChangeRequest = test::read_body_json(resp).await;
    assert_eq!(under_review.status, ChangeRequestStatus::UnderReview);

    // Too late to cancel.
    let resp = test::call_service(
        &app,
        as_role(
            test::TestRequest::post()
                .uri(&format!("/api/organization-structure/change-requests/{}/cancel", request.id)),
            HR_EMPLOYEE,
            Role::HrEmployee,
        )
        .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);

    let decide = |decision: &str| {
        as_role(
            test::TestRequest::put().uri(&format!("/api/organization-structure/approvals/{}", approval.id)),
            HR_MANAGER,
            Role::HrManager,
        )
        .set_json(json!({ "decision": decision, "comments": "ok" }))
        .to_request()
    };
    let resp = test::call_service(&app, decide("pending")).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let resp = test::call_service(&app, decide("approved")).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let decided: StructureApproval = test::read_body_json(resp).await;
    assert_eq!(decided.decision, ApprovalDecision::Approved);
    assert!(decided.decided_at.is_some());

    let resp = test::call_service(&app, decide("rejected")).await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);

    let resp = test::call_service(
        &app,
        as_role(
            test::TestRequest::get().uri("/api/organization-structure/change-requests?status=approved"),
            HR_MANAGER,
            Role::HrManager,
        )
        .to_request(),
    )
    .await;
    let approved: Vec<StructureChangeRequest> = test::read_body_json(resp).await;
    assert_eq!(approved.len(), 1);
    assert_eq!(approved[0].id, request.id);
}

#[actix_web::test]
async fn pending_request_can_be_cancelled() {
    let app = test::init_service(app(store())).await;
    let resp = test::call_service(
        &app,
        as_role(test::TestRequest::post().uri("/api/organization-structure/change-requests"), HR_EMPLOYEE, Role::HrEmployee)
            .set_json(json!({ "request_type": "CREATE_DEPARTMENT", "details": "Legal", "reason": "compliance" }))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let request: StructureChangeRequest = test::read_body_json(resp).await;

    let resp = test::call_service(
        &app,
        as_role(
            test::TestRequest::post()
                .uri(&format!("/api/organization-structure/change-requests/{}/cancel", request.id)),
            HR_EMPLOYEE,
            Role::HrEmployee,
        )
        .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let cancelled: StructureChangeRequest = test::read_body_json(resp).await;
    assert_eq!(cancelled.status, ChangeRequestStatus::Cancelled);
}
