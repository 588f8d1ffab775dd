use actix_web::{http::StatusCode, test};
use serde_json::json;

use super::helpers::{app, as_role, dec, store};
use crate::model::role::Role;
use crate::model::statutory::{ConfigStatus, InsuranceBracket, TaxRule};

const SPECIALIST: u64 = 7;
const MANAGER: u64 = 9;

#[actix_web::test]
async fn tax_rules_start_as_drafts_until_approved() {
    let app = test::init_service(app(store())).await;

    let resp = test::call_service(
        &app,
        as_role(test::TestRequest::post().uri("/api/payroll-configuration/tax-rules"), SPECIALIST, Role::PayrollSpecialist)
            .set_json(json!({ "name": "Band 2", "rate": "15", "min_salary": "10000", "max_salary": "30000" }))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let rule: TaxRule = test::read_body_json(resp).await;
    assert_eq!(rule.status, ConfigStatus::Draft);
    assert_eq!(rule.rate, dec("15"));

    let list = |status: &str| {
        as_role(
            test::TestRequest::get().uri(&format!("/api/payroll-configuration/tax-rules?status={status}")),
            MANAGER,
            Role::PayrollManager,
        )
        .to_request()
    };
    let resp = test::call_service(&app, list("approved")).await;
    let approved: Vec<TaxRule> = test::read_body_json(resp).await;
    assert!(approved.is_empty());

    let resp = test::call_service(
        &app,
        as_role(
            test::TestRequest::post().uri(&format!("/api/payroll-configuration/tax-rules/{}/approve", rule.id)),
            MANAGER,
            Role::PayrollManager,
        )
        .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let rule: TaxRule = test::read_body_json(resp).await;
    assert_eq!(rule.status, ConfigStatus::Approved);
    assert_eq!(rule.approved_by, Some(MANAGER));

    let resp = test::call_service(&app, list("approved")).await;
    let approved: Vec<TaxRule> = test::read_body_json(resp).await;
    assert_eq!(approved.len(), 1);
}

#[actix_web::test]
async fn bracket_bounds_and_rates_are_validated() {
    let app = test::init_service(app(store())).await;
    let create = |uri: &str, body: serde_json::Value| {
        as_role(test::TestRequest::post().uri(uri), SPECIALIST, Role::PayrollSpecialist)
            .set_json(body)
            .to_request()
    };

    let resp = test::call_service(
        &app,
        create(
            "/api/payroll-configuration/tax-rules",
            json!({ "name": "Inverted", "rate": "10", "min_salary": "5000", "max_salary": "1000" }),
        ),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = test::call_service(
        &app,
        create(
            "/api/payroll-configuration/insurance-brackets",
            json!({ "name": "Negative", "employee_rate": "-1" }),
        ),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = test::call_service(
        &app,
        create(
            "/api/payroll-configuration/insurance-brackets",
            json!({ "name": "Social insurance", "employee_rate": "11", "employer_rate": "18.75" }),
        ),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let bracket: InsuranceBracket = test::read_body_json(resp).await;
    assert_eq!(bracket.status, ConfigStatus::Draft);
    assert_eq!(bracket.min_salary, dec("0"));
}

#[actix_web::test]
async fn specialists_cannot_approve_statutory_config() {
    let app = test::init_service(app(store())).await;
    let resp = test::call_service(
        &app,
        as_role(test::TestRequest::post().uri("/api/payroll-configuration/tax-rules"), SPECIALIST, Role::PayrollSpecialist)
            .set_json(json!({ "name": "Flat", "rate": "5" }))
            .to_request(),
    )
    .await;
    let rule: TaxRule = test::read_body_json(resp).await;

    let resp = test::call_service(
        &app,
        as_role(
            test::TestRequest::post().uri(&format!("/api/payroll-configuration/tax-rules/{}/approve", rule.id)),
            SPECIALIST,
            Role::PayrollSpecialist,
        )
        .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}
