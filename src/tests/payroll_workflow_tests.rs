use actix_web::{http::StatusCode, test};
use serde_json::json;

use super::helpers::{app, as_role, bearer, date, dec, seed_employee, store, token};
use crate::model::payroll_run::{PayrollRun, RunEntry, RunStatus, RunTransitionRecord};
use crate::model::payslip::{PaymentStatus, Payslip};
use crate::model::role::Role;
use crate::model::statutory::{InsuranceBracket, TaxRule};

const SPECIALIST: u64 = 7;
const MANAGER: u64 = 9;
const FINANCE: u64 = 11;

macro_rules! post {
    ($app:expr, $uri:expr, $user:expr, $role:expr, $body:expr) => {
        test::call_service(
            &$app,
            as_role(test::TestRequest::post().uri($uri), $user, $role)
                .set_json($body)
                .to_request(),
        )
        .await
    };
}

macro_rules! get {
    ($app:expr, $uri:expr, $user:expr, $role:expr) => {
        test::call_service(
            &$app,
            as_role(test::TestRequest::get().uri($uri), $user, $role).to_request(),
        )
        .await
    };
}

#[actix_web::test]
async fn proposed_period_is_normalized_to_first_of_month() {
    let app = test::init_service(app(store())).await;

    let resp = post!(
        app,
        "/api/payroll-execution/periods",
        SPECIALIST,
        Role::PayrollSpecialist,
        json!({ "payroll_period": "2025-02-15", "entity": "Acme" })
    );
    assert_eq!(resp.status(), StatusCode::CREATED);
    let run: PayrollRun = test::read_body_json(resp).await;
    assert_eq!(run.payroll_period, date(2025, 2, 1));
    assert_eq!(run.status, RunStatus::PeriodProposed);
    assert_eq!(run.currency, "EGP");
    assert_eq!(run.payroll_specialist_id, SPECIALIST);
    assert!(run.run_id.starts_with("PR-202502-"));
}

#[actix_web::test]
async fn second_live_run_for_same_period_is_a_conflict() {
    let app = test::init_service(app(store())).await;
    let body = json!({ "payroll_period": "2025-03-01", "entity": "Acme" });

    let first = post!(app, "/api/payroll-execution/periods", SPECIALIST, Role::PayrollSpecialist, &body);
    assert_eq!(first.status(), StatusCode::CREATED);
    let second = post!(app, "/api/payroll-execution/periods", SPECIALIST, Role::PayrollSpecialist, &body);
    assert_eq!(second.status(), StatusCode::CONFLICT);
}

#[actix_web::test]
async fn propose_period_replays_on_same_idempotency_key() {
    let app = test::init_service(app(store())).await;
    let request = || {
        as_role(
            test::TestRequest::post().uri("/api/payroll-execution/periods"),
            SPECIALIST,
            Role::PayrollSpecialist,
        )
        .insert_header(("Idempotency-Key", "period-2025-04"))
        .set_json(json!({ "payroll_period": "2025-04-10", "entity": "Acme" }))
        .to_request()
    };

    let first = test::call_service(&app, request()).await;
    assert_eq!(first.status(), StatusCode::CREATED);
    let first: PayrollRun = test::read_body_json(first).await;

    let again = test::call_service(&app, request()).await;
    assert_eq!(again.status(), StatusCode::OK);
    let again: PayrollRun = test::read_body_json(again).await;
    assert_eq!(again.run_id, first.run_id);
}

#[actix_web::test]
async fn initiation_requires_an_approved_period() {
    let store = store();
    seed_employee(&store, "E1", "12000", "1500").await;
    let app = test::init_service(app(store)).await;
    let initiation = json!({
        "payroll_period": "2025-02-01",
        "entity": "Acme",
        "payroll_specialist_id": SPECIALIST
    });

    // Nothing proposed yet.
    let resp = post!(app, "/api/payroll-execution/process-initiation", SPECIALIST, Role::PayrollSpecialist, &initiation);
    assert_eq!(resp.status(), StatusCode::CONFLICT);

    // Proposed but not approved.
    let resp = post!(
        app,
        "/api/payroll-execution/periods",
        SPECIALIST,
        Role::PayrollSpecialist,
        json!({ "payroll_period": "2025-02-20", "entity": "Acme" })
    );
    assert_eq!(resp.status(), StatusCode::CREATED);
    let resp = post!(app, "/api/payroll-execution/process-initiation", SPECIALIST, Role::PayrollSpecialist, &initiation);
    assert_eq!(resp.status(), StatusCode::CONFLICT);
}

#[actix_web::test]
async fn stale_period_review_is_rejected() {
    let app = test::init_service(app(store())).await;
    let resp = post!(
        app,
        "/api/payroll-execution/periods",
        SPECIALIST,
        Role::PayrollSpecialist,
        json!({ "payroll_period": "2025-05-01", "entity": "Acme" })
    );
    let run: PayrollRun = test::read_body_json(resp).await;
    let uri = format!("/api/payroll-execution/periods/{}/review", run.run_id);

    let resp = post!(app, &uri, MANAGER, Role::PayrollManager, json!({ "approved": true }));
    assert_eq!(resp.status(), StatusCode::OK);

    // A second reviewer working from the old state.
    let resp = post!(
        app,
        &uri,
        MANAGER,
        Role::PayrollManager,
        json!({ "approved": false, "reason": "late" })
    );
    assert_eq!(resp.status(), StatusCode::CONFLICT);

    let resp = get!(app, &format!("/api/payroll-execution/runs/{}", run.run_id), MANAGER, Role::PayrollManager);
    let run: PayrollRun = test::read_body_json(resp).await;
    assert_eq!(run.status, RunStatus::PeriodApproved);
}

#[actix_web::test]
async fn period_rejection_needs_a_reason() {
    let app = test::init_service(app(store())).await;
    let resp = post!(
        app,
        "/api/payroll-execution/periods",
        SPECIALIST,
        Role::PayrollSpecialist,
        json!({ "payroll_period": "2025-06-01", "entity": "Acme" })
    );
    let run: PayrollRun = test::read_body_json(resp).await;
    let uri = format!("/api/payroll-execution/periods/{}/review", run.run_id);

    let resp = post!(app, &uri, MANAGER, Role::PayrollManager, json!({ "approved": false }));
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = post!(
        app,
        &uri,
        MANAGER,
        Role::PayrollManager,
        json!({ "approved": false, "reason": "wrong entity" })
    );
    assert_eq!(resp.status(), StatusCode::OK);
    let run: PayrollRun = test::read_body_json(resp).await;
    assert_eq!(run.status, RunStatus::PeriodRejected);
    assert_eq!(run.rejection_reason.as_deref(), Some("wrong entity"));
}

#[actix_web::test]
async fn specialist_cannot_review_own_period() {
    let app = test::init_service(app(store())).await;
    let resp = post!(
        app,
        "/api/payroll-execution/periods",
        SPECIALIST,
        Role::PayrollSpecialist,
        json!({ "payroll_period": "2025-07-01", "entity": "Acme" })
    );
    let run: PayrollRun = test::read_body_json(resp).await;

    let resp = post!(
        app,
        &format!("/api/payroll-execution/periods/{}/review", run.run_id),
        SPECIALIST,
        Role::PayrollSpecialist,
        json!({ "approved": true })
    );
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

#[actix_web::test]
async fn full_run_from_proposal_to_paid() {
    let store = store();
    let alice = seed_employee(&store, "E1", "12000", "1500").await;
    let bob = seed_employee(&store, "E2", "8000", "0").await;
    let app = test::init_service(app(store)).await;

    // Statutory configuration: drafted by the specialist, approved by the manager.
    let resp = post!(
        app,
        "/api/payroll-configuration/tax-rules",
        SPECIALIST,
        Role::PayrollSpecialist,
        json!({ "name": "Income tax", "rate": "10", "min_salary": "0" })
    );
    assert_eq!(resp.status(), StatusCode::CREATED);
    let tax: TaxRule = test::read_body_json(resp).await;
    let resp = post!(
        app,
        &format!("/api/payroll-configuration/tax-rules/{}/approve", tax.id),
        MANAGER,
        Role::PayrollManager,
        json!({})
    );
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = post!(
        app,
        "/api/payroll-configuration/insurance-brackets",
        SPECIALIST,
        Role::PayrollSpecialist,
        json!({ "name": "Social insurance", "employee_rate": "11", "employer_rate": "18.75" })
    );
    assert_eq!(resp.status(), StatusCode::CREATED);
    let bracket: InsuranceBracket = test::read_body_json(resp).await;
    let resp = post!(
        app,
        &format!("/api/payroll-configuration/insurance-brackets/{}/approve", bracket.id),
        MANAGER,
        Role::PayrollManager,
        json!({})
    );
    assert_eq!(resp.status(), StatusCode::OK);

    // Period
    let resp = post!(
        app,
        "/api/payroll-execution/periods",
        SPECIALIST,
        Role::PayrollSpecialist,
        json!({ "payroll_period": "2025-02-15", "entity": "Acme", "payroll_manager_id": MANAGER })
    );
    let run: PayrollRun = test::read_body_json(resp).await;
    let run_uri = format!("/api/payroll-execution/runs/{}", run.run_id);
    let resp = post!(
        app,
        &format!("/api/payroll-execution/periods/{}/review", run.run_id),
        MANAGER,
        Role::PayrollManager,
        json!({ "approved": true })
    );
    assert_eq!(resp.status(), StatusCode::OK);

    // Initiation, replayed once with the same key.
    let initiate = || {
        as_role(
            test::TestRequest::post().uri("/api/payroll-execution/process-initiation"),
            SPECIALIST,
            Role::PayrollSpecialist,
        )
        .insert_header(("Idempotency-Key", "init-2025-02"))
        .set_json(json!({
            "payroll_period": "2025-02-01",
            "entity": "Acme",
            "payroll_specialist_id": SPECIALIST
        }))
        .to_request()
    };
    let resp = test::call_service(&app, initiate()).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let drafted: PayrollRun = test::read_body_json(resp).await;
    assert_eq!(drafted.run_id, run.run_id);
    assert_eq!(drafted.status, RunStatus::Draft);
    assert_eq!(drafted.employees, 2);
    assert_eq!(drafted.total_gross_pay, dec("21500"));

    let resp = test::call_service(&app, initiate()).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let replayed: PayrollRun = test::read_body_json(resp).await;
    assert_eq!(replayed.run_id, run.run_id);
    assert_eq!(replayed.status, RunStatus::Draft);

    // Draft adjustment
    let resp = test::call_service(
        &app,
        as_role(
            test::TestRequest::patch().uri(&format!("{run_uri}/entries/{}", bob.id)),
            SPECIALIST,
            Role::PayrollSpecialist,
        )
        .set_json(json!({ "bonuses": "500" }))
        .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let entry: RunEntry = test::read_body_json(resp).await;
    assert_eq!(entry.gross_pay, dec("8500"));

    let resp = post!(
        app,
        "/api/payroll-execution/review-initiation",
        MANAGER,
        Role::PayrollManager,
        json!({ "run_id": run.run_id, "approved": true })
    );
    assert_eq!(resp.status(), StatusCode::OK);
    let approved: PayrollRun = test::read_body_json(resp).await;
    assert_eq!(approved.status, RunStatus::Approved);
    assert_eq!(approved.payroll_manager_id, Some(MANAGER));

    // Entries are frozen once the draft is approved.
    let resp = test::call_service(
        &app,
        as_role(
            test::TestRequest::patch().uri(&format!("{run_uri}/entries/{}", bob.id)),
            SPECIALIST,
            Role::PayrollSpecialist,
        )
        .set_json(json!({ "bonuses": "900" }))
        .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);

    // Payslips cannot skip deductions.
    let resp = post!(app, &format!("{run_uri}/payslips"), SPECIALIST, Role::PayrollSpecialist, json!({}));
    assert_eq!(resp.status(), StatusCode::CONFLICT);

    let resp = post!(app, &format!("{run_uri}/apply-deductions"), SPECIALIST, Role::PayrollSpecialist, json!({}));
    assert_eq!(resp.status(), StatusCode::OK);
    let deducted: PayrollRun = test::read_body_json(resp).await;
    assert_eq!(deducted.status, RunStatus::DeductionsApplied);
    assert_eq!(deducted.total_deductions, dec("4200"));
    assert_eq!(deducted.total_net_pay, dec("17800"));

    let resp = get!(app, &format!("{run_uri}/entries"), MANAGER, Role::PayrollManager);
    let entries: Vec<RunEntry> = test::read_body_json(resp).await;
    let alice_entry = entries.iter().find(|e| e.employee_id == alice.id).expect("alice entry");
    assert_eq!(alice_entry.taxes, dec("1200"));
    assert_eq!(alice_entry.insurance, dec("1320"));
    assert_eq!(alice_entry.net_pay, dec("10980"));

    let resp = post!(app, &format!("{run_uri}/payslips"), SPECIALIST, Role::PayrollSpecialist, json!({}));
    assert_eq!(resp.status(), StatusCode::OK);

    // Lock, unlock with a reason, lock again.
    let resp = post!(app, &format!("{run_uri}/lock"), MANAGER, Role::PayrollManager, json!({}));
    assert_eq!(resp.status(), StatusCode::OK);
    let resp = post!(app, &format!("{run_uri}/unlock"), MANAGER, Role::PayrollManager, json!({ "reason": " " }));
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let resp = post!(
        app,
        &format!("{run_uri}/unlock"),
        MANAGER,
        Role::PayrollManager,
        json!({ "reason": "bank file correction" })
    );
    assert_eq!(resp.status(), StatusCode::OK);
    let unlocked: PayrollRun = test::read_body_json(resp).await;
    assert_eq!(unlocked.status, RunStatus::PayslipsGenerated);
    assert_eq!(unlocked.unlock_reason.as_deref(), Some("bank file correction"));
    let resp = post!(app, &format!("{run_uri}/lock"), MANAGER, Role::PayrollManager, json!({}));
    assert_eq!(resp.status(), StatusCode::OK);

    // Only finance settles.
    let resp = post!(app, &format!("{run_uri}/mark-paid"), MANAGER, Role::PayrollManager, json!({}));
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    let resp = post!(app, &format!("{run_uri}/mark-paid"), FINANCE, Role::FinanceStaff, json!({}));
    assert_eq!(resp.status(), StatusCode::OK);
    let paid: PayrollRun = test::read_body_json(resp).await;
    assert_eq!(paid.status, RunStatus::Paid);

    let resp = get!(
        app,
        &format!("/api/payroll-execution/payslips?run_id={}", run.run_id),
        FINANCE,
        Role::FinanceStaff
    );
    let payslips: Vec<Payslip> = test::read_body_json(resp).await;
    assert_eq!(payslips.len(), 2);
    assert!(payslips.iter().all(|p| p.payment_status == PaymentStatus::Paid));

    let resp = get!(app, &format!("{run_uri}/transitions"), MANAGER, Role::PayrollManager);
    let history: Vec<RunTransitionRecord> = test::read_body_json(resp).await;
    let statuses: Vec<RunStatus> = history.iter().map(|t| t.to_status).collect();
    assert_eq!(
        statuses,
        vec![
            RunStatus::PeriodProposed,
            RunStatus::PeriodApproved,
            RunStatus::Draft,
            RunStatus::Approved,
            RunStatus::DeductionsApplied,
            RunStatus::PayslipsGenerated,
            RunStatus::Locked,
            RunStatus::PayslipsGenerated,
            RunStatus::Locked,
            RunStatus::Paid,
        ]
    );

    // Paid is terminal.
    let resp = post!(app, &format!("{run_uri}/lock"), MANAGER, Role::PayrollManager, json!({}));
    assert_eq!(resp.status(), StatusCode::CONFLICT);
}

#[actix_web::test]
async fn employees_only_see_their_own_payslips() {
    let store = store();
    let alice = seed_employee(&store, "E1", "12000", "0").await;
    let bob = seed_employee(&store, "E2", "9000", "0").await;
    let app = test::init_service(app(store)).await;

    let resp = post!(
        app,
        "/api/payroll-execution/periods",
        SPECIALIST,
        Role::PayrollSpecialist,
        json!({ "payroll_period": "2025-08-01", "entity": "Acme" })
    );
    let run: PayrollRun = test::read_body_json(resp).await;
    let run_uri = format!("/api/payroll-execution/runs/{}", run.run_id);
    post!(
        app,
        &format!("/api/payroll-execution/periods/{}/review", run.run_id),
        MANAGER,
        Role::PayrollManager,
        json!({ "approved": true })
    );
    post!(
        app,
        "/api/payroll-execution/process-initiation",
        SPECIALIST,
        Role::PayrollSpecialist,
        json!({ "payroll_period": "2025-08-01", "entity": "Acme", "payroll_specialist_id": SPECIALIST })
    );
    post!(
        app,
        "/api/payroll-execution/review-initiation",
        MANAGER,
        Role::PayrollManager,
        json!({ "run_id": run.run_id, "approved": true })
    );
    post!(app, &format!("{run_uri}/apply-deductions"), SPECIALIST, Role::PayrollSpecialist, json!({}));
    let resp = post!(app, &format!("{run_uri}/payslips"), SPECIALIST, Role::PayrollSpecialist, json!({}));
    assert_eq!(resp.status(), StatusCode::OK);

    let alice_token = token(30, Role::Employee, Some(alice.id));

    // Asking for someone else's payslips still yields only the caller's own.
    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri(&format!("/api/payroll-execution/payslips?employee_id={}", bob.id))
            .insert_header(bearer(&alice_token))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let own: Vec<Payslip> = test::read_body_json(resp).await;
    assert_eq!(own.len(), 1);
    assert_eq!(own[0].employee_id, alice.id);

    let resp = get!(
        app,
        &format!("/api/payroll-execution/payslips?employee_id={}", bob.id),
        SPECIALIST,
        Role::PayrollSpecialist
    );
    let bobs: Vec<Payslip> = test::read_body_json(resp).await;
    assert_eq!(bobs.len(), 1);

    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri(&format!("/api/payroll-execution/payslips/{}", bobs[0].id))
            .insert_header(bearer(&alice_token))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    // An employee account without a linked record sees nothing.
    let resp = get!(app, "/api/payroll-execution/payslips", 31, Role::Employee);
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    // Runs themselves are off limits.
    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri(&run_uri)
            .insert_header(bearer(&alice_token))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

#[actix_web::test]
async fn statutory_preview_is_repeatable() {
    let store = store();
    let alice = seed_employee(&store, "E1", "12000", "0").await;
    let app = test::init_service(app(store)).await;

    let resp = post!(
        app,
        "/api/payroll-configuration/tax-rules",
        SPECIALIST,
        Role::PayrollSpecialist,
        json!({ "name": "Income tax", "rate": "10" })
    );
    let tax: TaxRule = test::read_body_json(resp).await;
    post!(
        app,
        &format!("/api/payroll-configuration/tax-rules/{}/approve", tax.id),
        MANAGER,
        Role::PayrollManager,
        json!({})
    );

    let body = json!({ "employee_id": alice.id, "base_salary": "12000" });
    let first = post!(app, "/api/payroll-execution/apply-statutory-rules", SPECIALIST, Role::PayrollSpecialist, &body);
    assert_eq!(first.status(), StatusCode::OK);
    let first: serde_json::Value = test::read_body_json(first).await;
    let second = post!(app, "/api/payroll-execution/apply-statutory-rules", SPECIALIST, Role::PayrollSpecialist, &body);
    let second: serde_json::Value = test::read_body_json(second).await;
    assert_eq!(first, second);

    let resp = post!(
        app,
        "/api/payroll-execution/apply-statutory-rules",
        SPECIALIST,
        Role::PayrollSpecialist,
        json!({ "employee_id": 999, "base_salary": "12000" })
    );
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn out_of_range_amounts_are_bad_requests() {
    let store = store();
    let bob = seed_employee(&store, "E2", "8000", "0").await;
    let app = test::init_service(app(store)).await;

    let resp = post!(
        app,
        "/api/payroll-execution/periods",
        SPECIALIST,
        Role::PayrollSpecialist,
        json!({ "payroll_period": "2025-05-01", "entity": "Acme", "payroll_manager_id": MANAGER })
    );
    let run: PayrollRun = test::read_body_json(resp).await;
    let run_uri = format!("/api/payroll-execution/runs/{}", run.run_id);
    post!(
        app,
        &format!("/api/payroll-execution/periods/{}/review", run.run_id),
        MANAGER,
        Role::PayrollManager,
        json!({ "approved": true })
    );
    let resp = post!(
        app,
        "/api/payroll-execution/process-initiation",
        SPECIALIST,
        Role::PayrollSpecialist,
        json!({ "payroll_period": "2025-05-01", "entity": "Acme", "payroll_specialist_id": SPECIALIST })
    );
    assert_eq!(resp.status(), StatusCode::CREATED);

    let adjust = |bonuses: &str| {
        as_role(
            test::TestRequest::patch().uri(&format!("{run_uri}/entries/{}", bob.id)),
            SPECIALIST,
            Role::PayrollSpecialist,
        )
        .set_json(json!({ "bonuses": bonuses }))
        .to_request()
    };
    for bonuses in ["1000000000000", "79228162514264337593543950335"] {
        let resp = test::call_service(&app, adjust(bonuses)).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "bonuses {bonuses}");
    }

    // The run is untouched and still accepts a sane adjustment.
    let resp = test::call_service(&app, adjust("500")).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let entry: RunEntry = test::read_body_json(resp).await;
    assert_eq!(entry.gross_pay, dec("8500"));
    let resp = get!(app, &run_uri, MANAGER, Role::PayrollManager);
    let current: PayrollRun = test::read_body_json(resp).await;
    assert_eq!(current.total_gross_pay, dec("8500"));

    let preview = |base_salary: &str| json!({ "employee_id": bob.id, "base_salary": base_salary });
    let resp = post!(
        app,
        "/api/payroll-execution/apply-statutory-rules",
        SPECIALIST,
        Role::PayrollSpecialist,
        preview("1000000000000")
    );
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let resp = post!(
        app,
        "/api/payroll-execution/apply-statutory-rules",
        SPECIALIST,
        Role::PayrollSpecialist,
        preview("8000")
    );
    assert_eq!(resp.status(), StatusCode::OK);

    let hire = |code: &str, base_salary: &str| {
        json!({
            "employee_code": code,
            "first_name": "Rich",
            "last_name": code,
            "email": format!("{}@example.com", code.to_lowercase()),
            "hire_date": "2025-01-01",
            "base_salary": base_salary
        })
    };
    let resp = post!(app, "/api/employees", 5, Role::HrManager, hire("E3", "1000000000000"));
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let resp = post!(app, "/api/employees", 5, Role::HrManager, hire("E3", "999999999999.99"));
    assert_eq!(resp.status(), StatusCode::CREATED);
}

#[actix_web::test]
async fn labels_wider_than_their_columns_are_bad_requests() {
    let app = test::init_service(app(store())).await;
    let propose = |entity: String, key: String| {
        as_role(
            test::TestRequest::post().uri("/api/payroll-execution/periods"),
            SPECIALIST,
            Role::PayrollSpecialist,
        )
        .insert_header(("Idempotency-Key", key))
        .set_json(json!({ "payroll_period": "2025-06-01", "entity": entity }))
        .to_request()
    };

    let resp = test::call_service(&app, propose("x".repeat(129), "k-1".to_string())).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let resp = test::call_service(&app, propose("Acme".to_string(), "k".repeat(129))).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = test::call_service(&app, propose("x".repeat(128), "k".repeat(128))).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
}
