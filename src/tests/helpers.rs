use std::str::FromStr;
use std::sync::Arc;

use actix_web::{
    App, Error,
    body::MessageBody,
    dev::{ServiceFactory, ServiceRequest, ServiceResponse},
    http::header,
    middleware::from_fn,
    test::TestRequest,
    web,
};
use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::auth::jwt::{Subject, generate_access_token};
use crate::auth::middleware::auth_middleware;
use crate::config::{Config, StoreBackend};
use crate::model::employee::{Employee, NewEmployee};
use crate::model::role::Role;
use crate::routes::{api_routes, auth_routes};
use crate::service::payroll::PayrollSettings;
use crate::store::{EmployeeStore, MemoryStore, Store};

pub const SECRET: &str = "test-secret";

pub fn test_config() -> Config {
    Config {
        server_addr: "127.0.0.1:0".to_string(),
        store_backend: StoreBackend::Memory,
        database_url: None,
        migrate_on_start: false,
        jwt_secret: SECRET.to_string(),
        access_token_ttl: 900,
        refresh_token_ttl: 3600,
        admin_username: Some("admin".to_string()),
        admin_password: Some("admin-pass".to_string()),
        rate_login_per_min: 1000,
        rate_register_per_min: 1000,
        rate_refresh_per_min: 1000,
        rate_protected_per_min: 1000,
        api_prefix: "/api".to_string(),
        log_dir: "logs".to_string(),
        log_level: tracing::Level::DEBUG,
        payroll: PayrollSettings::default(),
    }
}

pub fn store() -> Arc<MemoryStore> {
    Arc::new(MemoryStore::new())
}

/// Same routing as production, without the rate limiters.
pub fn app(
    store: Arc<MemoryStore>,
) -> App<
    impl ServiceFactory<
        ServiceRequest,
        Config = (),
        Response = ServiceResponse<impl MessageBody>,
        Error = Error,
        InitError = (),
    >,
> {
    let config = test_config();
    let store: Arc<dyn Store> = store;
    App::new()
        .app_data(web::Data::from(store))
        .app_data(web::Data::new(config.clone()))
        .configure(auth_routes)
        .service(
            web::scope(&config.api_prefix)
                .wrap(from_fn(auth_middleware))
                .configure(api_routes),
        )
}

pub fn token(user_id: u64, role: Role, employee_id: Option<u64>) -> String {
    let subject = Subject {
        user_id,
        username: format!("user-{user_id}"),
        role,
        employee_id,
    };
    generate_access_token(&subject, SECRET, 900).expect("sign token")
}

pub fn bearer(token: &str) -> (header::HeaderName, String) {
    (header::AUTHORIZATION, format!("Bearer {token}"))
}

/// Request builder carrying a token for `role`.
pub fn as_role(req: TestRequest, user_id: u64, role: Role) -> TestRequest {
    req.insert_header(bearer(&token(user_id, role, None)))
}

pub fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).expect("decimal literal")
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

pub async fn seed_employee(store: &MemoryStore, code: &str, base: &str, allowances: &str) -> Employee {
    let new = NewEmployee {
        employee_code: code.to_string(),
        first_name: "Test".to_string(),
        last_name: code.to_string(),
        email: format!("{}@example.com", code.to_lowercase()),
        department_id: None,
        position_id: None,
        hire_date: date(2024, 1, 1),
        base_salary: dec(base),
        allowances: dec(allowances),
    };
    store.insert_employee(&new).await.expect("seed employee")
}
