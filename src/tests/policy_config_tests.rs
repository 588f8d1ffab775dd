use actix_web::{http::StatusCode, test};
use serde_json::{Value, json};

use super::helpers::{app, as_role, date, seed_employee, store};
use crate::model::policy::{Holiday, LatenessRule, OvertimeRule};
use crate::model::role::Role;

const HR_MANAGER: u64 = 2;
const SPECIALIST: u64 = 7;
const PAYROLL_MANAGER: u64 = 9;

#[actix_web::test]
async fn only_approved_overtime_rules_apply() {
    let app = test::init_service(app(store())).await;

    let resp = test::call_service(
        &app,
        as_role(test::TestRequest::post().uri("/api/policy-config/overtime-rules"), SPECIALIST, Role::PayrollSpecialist)
            .set_json(json!({ "name": "Weekday overtime", "threshold_hours": "8", "multiplier": "1.5" }))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let rule: OvertimeRule = test::read_body_json(resp).await;
    assert!(rule.active);
    assert!(!rule.approved);
    assert_eq!(rule.created_by, SPECIALIST);

    let applicable = |hours: &str| {
        as_role(
            test::TestRequest::get()
                .uri(&format!("/api/policy-config/overtime-rules/applicable?hours={hours}")),
            SPECIALIST,
            Role::PayrollSpecialist,
        )
        .to_request()
    };
    let resp = test::call_service(&app, applicable("10")).await;
    let rules: Vec<OvertimeRule> = test::read_body_json(resp).await;
    assert!(rules.is_empty());

    // Specialists draft rules; approval is a manager action.
    let approve = |user, role| {
        as_role(
            test::TestRequest::post()
                .uri(&format!("/api/policy-config/overtime-rules/{}/approve", rule.id)),
            user,
            role,
        )
        .to_request()
    };
    let resp = test::call_service(&app, approve(SPECIALIST, Role::PayrollSpecialist)).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    let resp = test::call_service(&app, approve(PAYROLL_MANAGER, Role::PayrollManager)).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = test::call_service(&app, applicable("10")).await;
    let rules: Vec<OvertimeRule> = test::read_body_json(resp).await;
    assert_eq!(rules.len(), 1);
    let resp = test::call_service(&app, applicable("8")).await;
    let rules: Vec<OvertimeRule> = test::read_body_json(resp).await;
    assert!(rules.is_empty());
}

#[actix_web::test]
async fn overtime_multiplier_must_be_positive() {
    let app = test::init_service(app(store())).await;
    let resp = test::call_service(
        &app,
        as_role(test::TestRequest::post().uri("/api/policy-config/overtime-rules"), HR_MANAGER, Role::HrManager)
            .set_json(json!({ "name": "Broken", "threshold_hours": "8", "multiplier": "0" }))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn lateness_rules_respect_grace_period_and_deletion() {
    let app = test::init_service(app(store())).await;

    let resp = test::call_service(
        &app,
        as_role(test::TestRequest::post().uri("/api/policy-config/lateness-rules"), HR_MANAGER, Role::HrManager)
            .set_json(json!({ "name": "Standard", "grace_period_minutes": 15, "deduction_per_minute": "2.50" }))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let rule: LatenessRule = test::read_body_json(resp).await;

    let resp = test::call_service(
        &app,
        as_role(
            test::TestRequest::post().uri(&format!("/api/policy-config/lateness-rules/{}/approve", rule.id)),
            HR_MANAGER,
            Role::HrManager,
        )
        .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);

    let applicable = |minutes: u32| {
        as_role(
            test::TestRequest::get()
                .uri(&format!("/api/policy-config/lateness-rules/applicable?minutes_late={minutes}")),
            HR_MANAGER,
            Role::HrManager,
        )
        .to_request()
    };
    let resp = test::call_service(&app, applicable(15)).await;
    let rules: Vec<LatenessRule> = test::read_body_json(resp).await;
    assert!(rules.is_empty());
    let resp = test::call_service(&app, applicable(20)).await;
    let rules: Vec<LatenessRule> = test::read_body_json(resp).await;
    assert_eq!(rules.len(), 1);

    let resp = test::call_service(
        &app,
        as_role(
            test::TestRequest::delete().uri(&format!("/api/policy-config/lateness-rules/{}", rule.id)),
            HR_MANAGER,
            Role::HrManager,
        )
        .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    let resp = test::call_service(
        &app,
        as_role(
            test::TestRequest::get().uri(&format!("/api/policy-config/lateness-rules/{}", rule.id)),
            HR_MANAGER,
            Role::HrManager,
        )
        .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn holiday_checks_cover_ranges_and_suppress_penalties() {
    let store = store();
    let employee = seed_employee(&store, "E1", "10000", "0").await;
    let app = test::init_service(app(store)).await;

    let create = |body: Value| {
        as_role(test::TestRequest::post().uri("/api/policy-config/holidays"), HR_MANAGER, Role::HrManager)
            .set_json(body)
            .to_request()
    };
    let resp = test::call_service(
        &app,
        create(json!({
            "name": "Eid al-Fitr",
            "holiday_type": "NATIONAL",
            "start_date": "2025-03-30",
            "end_date": "2025-04-01"
        })),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let eid: Holiday = test::read_body_json(resp).await;

    let resp = test::call_service(
        &app,
        create(json!({
            "name": "Backwards",
            "holiday_type": "ORGANIZATIONAL",
            "start_date": "2025-05-02",
            "end_date": "2025-05-01"
        })),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let check = |day: &str| {
        as_role(
            test::TestRequest::get().uri(&format!("/api/policy-config/holidays/check?date={day}")),
            40,
            Role::Employee,
        )
        .to_request()
    };
    let resp = test::call_service(&app, check("2025-03-31")).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["is_holiday"], true);
    assert_eq!(body["holiday"]["id"], eid.id);

    let resp = test::call_service(&app, check("2025-04-02")).await;
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["is_holiday"], false);
    assert_eq!(body["holiday"], Value::Null);

    let attendance = |day: &str, suppress: bool| {
        as_role(
            test::TestRequest::get().uri(&format!(
                "/api/policy-config/holidays/attendance-check?employee_id={}&date={day}&suppress_penalty={suppress}",
                employee.id
            )),
            HR_MANAGER,
            Role::HrManager,
        )
        .to_request()
    };
    let resp = test::call_service(&app, attendance("2025-04-01", true)).await;
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["is_holiday"], true);
    assert_eq!(body["penalty_suppressed"], true);

    let resp = test::call_service(&app, attendance("2025-04-01", false)).await;
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["penalty_suppressed"], false);

    let resp = test::call_service(&app, attendance("2025-04-05", true)).await;
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["is_holiday"], false);
    assert_eq!(body["penalty_suppressed"], false);

    let resp = test::call_service(
        &app,
        as_role(
            test::TestRequest::get()
                .uri("/api/policy-config/holidays/attendance-check?employee_id=999&date=2025-04-01"),
            HR_MANAGER,
            Role::HrManager,
        )
        .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    // Deactivated holidays no longer count.
    let resp = test::call_service(
        &app,
        as_role(
            test::TestRequest::put().uri(&format!("/api/policy-config/holidays/{}", eid.id)),
            HR_MANAGER,
            Role::HrManager,
        )
        .set_json(json!({ "active": false }))
        .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let updated: Holiday = test::read_body_json(resp).await;
    assert!(!updated.active);
    assert_eq!(updated.start_date, date(2025, 3, 30));

    let resp = test::call_service(&app, check("2025-03-31")).await;
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["is_holiday"], false);
}
