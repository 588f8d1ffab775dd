use crate::{
    api::{employee, organization, payroll, policy_config, statutory},
    auth::{handlers, middleware::auth_middleware},
    config::Config,
};
use actix_governor::{
    Governor, GovernorConfig, GovernorConfigBuilder, PeerIpKeyExtractor,
    governor::middleware::NoOpMiddleware,
};
use actix_web::{middleware::from_fn, web};
use std::sync::Arc;
use tracing::warn;

// Per-route limiter replenishing `requests_per_min` tokens a minute.
fn build_limiter(requests_per_min: u32) -> Governor<PeerIpKeyExtractor, NoOpMiddleware> {
    let burst = requests_per_min.max(1);
    let per_ms = (60_000 / burst as u64).max(1);
    let cfg = GovernorConfigBuilder::default()
        .per_millisecond(per_ms)
        .burst_size(burst)
        .key_extractor(PeerIpKeyExtractor)
        .finish()
        .unwrap_or_else(|| {
            warn!(requests_per_min, "Invalid rate limit, using the default limiter");
            GovernorConfig::default()
        });
    Governor::new(&cfg)
}

pub fn configure(cfg: &mut web::ServiceConfig, config: Config) {
    let login_limiter = Arc::new(build_limiter(config.rate_login_per_min));
    let register_limiter = Arc::new(build_limiter(config.rate_register_per_min));
    let refresh_limiter = Arc::new(build_limiter(config.rate_refresh_per_min));
    let protected_limiter = Arc::new(build_limiter(config.rate_protected_per_min));

    // Public routes
    cfg.service(
        web::scope("/auth")
            .service(
                web::resource("/login")
                    .wrap(login_limiter.clone())
                    .route(web::post().to(handlers::login)),
            )
            .service(
                web::resource("/register")
                    .wrap(register_limiter)
                    .route(web::post().to(handlers::register)),
            )
            .service(
                web::resource("/refresh")
                    .wrap(refresh_limiter)
                    .route(web::post().to(handlers::refresh_token)),
            )
            .service(
                web::resource("/logout")
                    .wrap(login_limiter)
                    .route(web::post().to(handlers::logout)),
            ),
    );

    // Protected routes
    cfg.service(
        web::scope(&config.api_prefix)
            .wrap(from_fn(auth_middleware)) // authentication
            .wrap(protected_limiter) // rate limiting
            .configure(api_routes),
    );
}

/// Auth endpoints without rate limiting.
#[cfg(test)]
pub fn auth_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/auth")
            .route("/login", web::post().to(handlers::login))
            .route("/register", web::post().to(handlers::register))
            .route("/refresh", web::post().to(handlers::refresh_token))
            .route("/logout", web::post().to(handlers::logout)),
    );
}

/// Everything under the API prefix. Callers wrap it with authentication.
pub fn api_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/employees")
            // /employees
            .service(
                web::resource("")
                    .route(web::post().to(employee::create_employee))
                    .route(web::get().to(employee::list_employees)),
            )
            // /employees/{id}
            .service(
                web::resource("/{id}")
                    .route(web::get().to(employee::get_employee))
                    .route(web::put().to(employee::update_employee)),
            ),
    )
    .service(
        web::scope("/organization-structure")
            .service(
                web::resource("/departments")
                    .route(web::post().to(organization::create_department))
                    .route(web::get().to(organization::get_departments)),
            )
            // registered before /departments/{id} so it is not taken for an id
            .service(
                web::resource("/departments/hierarchy")
                    .route(web::get().to(organization::get_department_hierarchy)),
            )
            .service(
                web::resource("/departments/{id}")
                    .route(web::get().to(organization::get_department))
                    .route(web::put().to(organization::update_department))
                    .route(web::delete().to(organization::deactivate_department)),
            )
            .service(
                web::resource("/positions")
                    .route(web::post().to(organization::create_position))
                    .route(web::get().to(organization::get_positions)),
            )
            .service(
                web::resource("/positions/{id}")
                    .route(web::get().to(organization::get_position))
                    .route(web::put().to(organization::update_position))
                    .route(web::delete().to(organization::deactivate_position)),
            )
            .service(
                web::resource("/assignments")
                    .route(web::post().to(organization::assign_position))
                    .route(web::get().to(organization::get_assignments)),
            )
            .service(
                web::resource("/assignments/{id}/end")
                    .route(web::post().to(organization::end_assignment)),
            )
            .service(
                web::resource("/change-requests")
                    .route(web::post().to(organization::create_change_request))
                    .route(web::get().to(organization::get_change_requests)),
            )
            .service(
                web::resource("/change-requests/{id}")
                    .route(web::get().to(organization::get_change_request))
                    .route(web::put().to(organization::update_change_request)),
            )
            .service(
                web::resource("/change-requests/{id}/submit")
                    .route(web::post().to(organization::submit_change_request)),
            )
            .service(
                web::resource("/change-requests/{id}/cancel")
                    .route(web::post().to(organization::cancel_change_request)),
            )
            .service(
                web::resource("/change-requests/{id}/approvals")
                    .route(web::post().to(organization::create_approval))
                    .route(web::get().to(organization::get_approvals)),
            )
            .service(
                web::resource("/approvals/{id}")
                    .route(web::put().to(organization::update_approval_decision)),
            ),
    )
    .service(
        web::scope("/policy-config")
            .service(
                web::resource("/overtime-rules")
                    .route(web::post().to(policy_config::create_overtime_rule))
                    .route(web::get().to(policy_config::get_overtime_rules)),
            )
            .service(
                web::resource("/overtime-rules/applicable")
                    .route(web::get().to(policy_config::get_applicable_overtime_rules)),
            )
            .service(
                web::resource("/overtime-rules/{id}")
                    .route(web::get().to(policy_config::get_overtime_rule))
                    .route(web::put().to(policy_config::update_overtime_rule))
                    .route(web::delete().to(policy_config::delete_overtime_rule)),
            )
            .service(
                web::resource("/overtime-rules/{id}/approve")
                    .route(web::post().to(policy_config::approve_overtime_rule)),
            )
            .service(
                web::resource("/lateness-rules")
                    .route(web::post().to(policy_config::create_lateness_rule))
                    .route(web::get().to(policy_config::get_lateness_rules)),
            )
            .service(
                web::resource("/lateness-rules/applicable")
                    .route(web::get().to(policy_config::get_applicable_lateness_rules)),
            )
            .service(
                web::resource("/lateness-rules/{id}")
                    .route(web::get().to(policy_config::get_lateness_rule))
                    .route(web::put().to(policy_config::update_lateness_rule))
                    .route(web::delete().to(policy_config::delete_lateness_rule)),
            )
            .service(
                web::resource("/lateness-rules/{id}/approve")
                    .route(web::post().to(policy_config::approve_lateness_rule)),
            )
            .service(
                web::resource("/holidays")
                    .route(web::post().to(policy_config::create_holiday))
                    .route(web::get().to(policy_config::get_holidays)),
            )
            .service(
                web::resource("/holidays/check").route(web::get().to(policy_config::check_holiday)),
            )
            .service(
                web::resource("/holidays/attendance-check")
                    .route(web::get().to(policy_config::validate_attendance_holiday)),
            )
            .service(
                web::resource("/holidays/{id}")
                    .route(web::get().to(policy_config::get_holiday))
                    .route(web::put().to(policy_config::update_holiday))
                    .route(web::delete().to(policy_config::delete_holiday)),
            ),
    )
    .service(
        web::scope("/payroll-configuration")
            .service(
                web::resource("/tax-rules")
                    .route(web::post().to(statutory::create_tax_rule))
                    .route(web::get().to(statutory::get_tax_rules)),
            )
            .service(
                web::resource("/tax-rules/{id}/approve")
                    .route(web::post().to(statutory::approve_tax_rule)),
            )
            .service(
                web::resource("/insurance-brackets")
                    .route(web::post().to(statutory::create_insurance_bracket))
                    .route(web::get().to(statutory::get_insurance_brackets)),
            )
            .service(
                web::resource("/insurance-brackets/{id}/approve")
                    .route(web::post().to(statutory::approve_insurance_bracket)),
            ),
    )
    .service(
        web::scope("/payroll-execution")
            .service(web::resource("/periods").route(web::post().to(payroll::propose_period)))
            .service(
                web::resource("/periods/{run_id}/review")
                    .route(web::post().to(payroll::review_period)),
            )
            .service(
                web::resource("/process-initiation")
                    .route(web::post().to(payroll::process_initiation)),
            )
            .service(
                web::resource("/review-initiation")
                    .route(web::post().to(payroll::review_initiation)),
            )
            .service(
                web::resource("/apply-statutory-rules")
                    .route(web::post().to(payroll::apply_statutory_rules)),
            )
            .service(web::resource("/runs").route(web::get().to(payroll::get_runs)))
            .service(web::resource("/runs/{run_id}").route(web::get().to(payroll::get_run)))
            .service(
                web::resource("/runs/{run_id}/entries")
                    .route(web::get().to(payroll::get_run_entries)),
            )
            .service(
                web::resource("/runs/{run_id}/entries/{employee_id}")
                    .route(web::patch().to(payroll::adjust_entry)),
            )
            .service(
                web::resource("/runs/{run_id}/transitions")
                    .route(web::get().to(payroll::get_run_transitions)),
            )
            .service(
                web::resource("/runs/{run_id}/apply-deductions")
                    .route(web::post().to(payroll::apply_deductions)),
            )
            .service(
                web::resource("/runs/{run_id}/payslips")
                    .route(web::post().to(payroll::generate_payslips)),
            )
            .service(web::resource("/runs/{run_id}/lock").route(web::post().to(payroll::lock_run)))
            .service(
                web::resource("/runs/{run_id}/unlock").route(web::post().to(payroll::unlock_run)),
            )
            .service(
                web::resource("/runs/{run_id}/mark-paid")
                    .route(web::post().to(payroll::mark_paid)),
            )
            .service(web::resource("/payslips").route(web::get().to(payroll::get_payslips)))
            .service(web::resource("/payslips/{id}").route(web::get().to(payroll::get_payslip))),
    );
}

// LOGIN
//  ├─ access_token (15 min)
//  └─ refresh_token (7 days)

// API REQUEST
//  └─ Authorization: Bearer access_token

// ACCESS EXPIRED
//  └─ POST /auth/refresh with refresh_token
//       └─ returns a new token pair; the old refresh token is revoked
