use actix_web::{http::StatusCode, test};
use serde_json::json;

use super::helpers::{app, bearer, store, test_config, token};
use crate::auth::handlers::ensure_admin;
use crate::model::role::Role;
use crate::models::TokenPair;

#[actix_web::test]
async fn protected_routes_need_a_bearer_token() {
    let app = test::init_service(app(store())).await;

    let resp = test::call_service(
        &app,
        test::TestRequest::get().uri("/api/payroll-execution/runs").to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/api/payroll-execution/runs")
            .insert_header(bearer("not-a-jwt"))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/api/payroll-execution/runs")
            .insert_header(bearer(&token(9, Role::PayrollManager, None)))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
}

#[actix_web::test]
async fn register_login_refresh_and_logout() {
    let app = test::init_service(app(store())).await;

    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/auth/register")
            .set_json(json!({ "username": "mona", "password": "s3cret!" }))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/auth/register")
            .set_json(json!({ "username": "mona", "password": "other" }))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);

    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/auth/login")
            .set_json(json!({ "username": "mona", "password": "wrong" }))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/auth/login")
            .set_json(json!({ "username": "mona", "password": "s3cret!" }))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let tokens: TokenPair = test::read_body_json(resp).await;

    // Refresh tokens do not open the API.
    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/api/organization-structure/departments")
            .insert_header(bearer(&tokens.refresh_token))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/api/organization-structure/departments")
            .insert_header(bearer(&tokens.access_token))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);

    let refresh = || {
        test::TestRequest::post()
            .uri("/auth/refresh")
            .insert_header(bearer(&tokens.refresh_token))
            .to_request()
    };
    let resp = test::call_service(&app, refresh()).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let rotated: TokenPair = test::read_body_json(resp).await;

    // The old refresh token was rotated out.
    let resp = test::call_service(&app, refresh()).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/auth/logout")
            .insert_header(bearer(&rotated.refresh_token))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/auth/refresh")
            .insert_header(bearer(&rotated.refresh_token))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn privileged_roles_need_an_admin_to_register() {
    let store = store();
    ensure_admin(store.as_ref(), &test_config()).await.unwrap();
    let app = test::init_service(app(store)).await;
    let body = json!({ "username": "pm", "password": "pw", "role": "PAYROLL_MANAGER" });

    let resp = test::call_service(
        &app,
        test::TestRequest::post().uri("/auth/register").set_json(&body).to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/auth/register")
            .insert_header(bearer(&token(5, Role::HrManager, None)))
            .set_json(&body)
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    // The seeded admin logs in and registers the manager.
    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/auth/login")
            .set_json(json!({ "username": "admin", "password": "admin-pass" }))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let admin: TokenPair = test::read_body_json(resp).await;

    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/auth/register")
            .insert_header(bearer(&admin.access_token))
            .set_json(&body)
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::CREATED);
}

#[actix_web::test]
async fn admin_seeding_is_idempotent() {
    let store = store();
    let config = test_config();
    ensure_admin(store.as_ref(), &config).await.unwrap();
    ensure_admin(store.as_ref(), &config).await.unwrap();
}
