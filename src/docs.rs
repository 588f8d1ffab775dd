use crate::api::employee::EmployeeListResponse;
use crate::api::organization::{ApprovalDecisionReq, EndAssignment};
use crate::model::change_request::{
    ApprovalDecision, ChangeRequestStatus, ChangeRequestType, ChangeRequestUpdate,
    NewChangeRequest, StructureApproval, StructureChangeRequest,
};
use crate::model::department::{
    Department, DepartmentNode, DepartmentUpdate, NewAssignment, NewDepartment, NewPosition,
    Position, PositionAssignment, PositionUpdate,
};
use crate::model::employee::{Employee, EmployeeStatus, EmployeeUpdate, NewEmployee};
use crate::model::payroll_run::{
    EntryAdjustment, PayrollRun, RunEntry, RunStatus, RunTransitionRecord,
};
use crate::model::payslip::{DeductionsDetails, EarningsDetails, PaymentStatus, Payslip};
use crate::model::policy::{
    AttendanceHolidayCheck, Holiday, HolidayCheck, HolidayType, HolidayUpdate, LatenessRule,
    LatenessRuleUpdate, NewHoliday, NewLatenessRule, NewOvertimeRule, OvertimeRule,
    OvertimeRuleUpdate,
};
use crate::model::role::Role;
use crate::model::statutory::{
    AppliedRule, ConfigStatus, InsuranceBracket, NewInsuranceBracket, NewTaxRule, RuleKind,
    StatutoryBreakdown, TaxRule,
};
use crate::models::{LoginReqDto, RegisterReq, TokenPair};
use crate::service::payroll::{
    ApplyStatutoryRequest, ProcessInitiationRequest, ProposePeriodRequest,
    ReviewInitiationRequest, ReviewPeriodRequest, UnlockRequest,
};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi, openapi};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "HR Payroll API",
        version = "1.0.0",
        description = r#"
## HR & Payroll Backend

Organization structure, employee records, time-policy configuration,
statutory deduction brackets and the payroll run workflow.

### Payroll run lifecycle
`PERIOD_PROPOSED -> PERIOD_APPROVED -> DRAFT -> APPROVED -> DEDUCTIONS_APPLIED -> PAYSLIPS_GENERATED <-> LOCKED -> PAID`

The backend owns the run status. Every step is rejected with **409** when the
run is not in the state the step starts from, so stale or concurrent clients
cannot skip or repeat steps.

`POST /periods` and `POST /process-initiation` accept an `Idempotency-Key`
header. Reusing a key returns the original run with **200**.

### Security
Endpoints under `/api` need a JWT access token (`Authorization: Bearer ...`).
Permissions are checked per role, resource and action.
"#,
    ),
    paths(
        crate::auth::handlers::register,
        crate::auth::handlers::login,
        crate::auth::handlers::refresh_token,
        crate::auth::handlers::logout,

        crate::api::employee::create_employee,
        crate::api::employee::list_employees,
        crate::api::employee::get_employee,
        crate::api::employee::update_employee,

        crate::api::organization::create_department,
        crate::api::organization::get_departments,
        crate::api::organization::get_department_hierarchy,
        crate::api::organization::get_department,
        crate::api::organization::update_department,
        crate::api::organization::deactivate_department,
        crate::api::organization::create_position,
        crate::api::organization::get_positions,
        crate::api::organization::get_position,
        crate::api::organization::update_position,
        crate::api::organization::deactivate_position,
        crate::api::organization::assign_position,
        crate::api::organization::get_assignments,
        crate::api::organization::end_assignment,
        crate::api::organization::create_change_request,
        crate::api::organization::get_change_requests,
        crate::api::organization::get_change_request,
        crate::api::organization::update_change_request,
        crate::api::organization::submit_change_request,
        crate::api::organization::cancel_change_request,
        crate::api::organization::create_approval,
        crate::api::organization::get_approvals,
        crate::api::organization::update_approval_decision,

        crate::api::policy_config::create_overtime_rule,
        crate::api::policy_config::get_overtime_rules,
        crate::api::policy_config::get_applicable_overtime_rules,
        crate::api::policy_config::get_overtime_rule,
        crate::api::policy_config::update_overtime_rule,
        crate::api::policy_config::approve_overtime_rule,
        crate::api::policy_config::delete_overtime_rule,
        crate::api::policy_config::create_lateness_rule,
        crate::api::policy_config::get_lateness_rules,
        crate::api::policy_config::get_applicable_lateness_rules,
        crate::api::policy_config::get_lateness_rule,
        crate::api::policy_config::update_lateness_rule,
        crate::api::policy_config::approve_lateness_rule,
        crate::api::policy_config::delete_lateness_rule,
        crate::api::policy_config::create_holiday,
        crate::api::policy_config::get_holidays,
        crate::api::policy_config::check_holiday,
        crate::api::policy_config::validate_attendance_holiday,
        crate::api::policy_config::get_holiday,
        crate::api::policy_config::update_holiday,
        crate::api::policy_config::delete_holiday,

        crate::api::statutory::create_tax_rule,
        crate::api::statutory::get_tax_rules,
        crate::api::statutory::approve_tax_rule,
        crate::api::statutory::create_insurance_bracket,
        crate::api::statutory::get_insurance_brackets,
        crate::api::statutory::approve_insurance_bracket,

        crate::api::payroll::propose_period,
        crate::api::payroll::review_period,
        crate::api::payroll::process_initiation,
        crate::api::payroll::review_initiation,
        crate::api::payroll::adjust_entry,
        crate::api::payroll::apply_statutory_rules,
        crate::api::payroll::apply_deductions,
        crate::api::payroll::generate_payslips,
        crate::api::payroll::lock_run,
        crate::api::payroll::unlock_run,
        crate::api::payroll::mark_paid,
        crate::api::payroll::get_runs,
        crate::api::payroll::get_run,
        crate::api::payroll::get_run_entries,
        crate::api::payroll::get_run_transitions,
        crate::api::payroll::get_payslips,
        crate::api::payroll::get_payslip
    ),
    components(
        schemas(
            RegisterReq,
            LoginReqDto,
            TokenPair,
            Role,
            Employee,
            EmployeeStatus,
            NewEmployee,
            EmployeeUpdate,
            EmployeeListResponse,
            Department,
            DepartmentNode,
            NewDepartment,
            DepartmentUpdate,
            Position,
            NewPosition,
            PositionUpdate,
            PositionAssignment,
            NewAssignment,
            EndAssignment,
            StructureChangeRequest,
            ChangeRequestType,
            ChangeRequestStatus,
            NewChangeRequest,
            ChangeRequestUpdate,
            StructureApproval,
            ApprovalDecision,
            ApprovalDecisionReq,
            OvertimeRule,
            NewOvertimeRule,
            OvertimeRuleUpdate,
            LatenessRule,
            NewLatenessRule,
            LatenessRuleUpdate,
            Holiday,
            HolidayType,
            NewHoliday,
            HolidayUpdate,
            HolidayCheck,
            AttendanceHolidayCheck,
            TaxRule,
            NewTaxRule,
            InsuranceBracket,
            NewInsuranceBracket,
            ConfigStatus,
            StatutoryBreakdown,
            AppliedRule,
            RuleKind,
            PayrollRun,
            RunStatus,
            RunEntry,
            EntryAdjustment,
            RunTransitionRecord,
            Payslip,
            PaymentStatus,
            EarningsDetails,
            DeductionsDetails,
            ProposePeriodRequest,
            ReviewPeriodRequest,
            ProcessInitiationRequest,
            ReviewInitiationRequest,
            UnlockRequest,
            ApplyStatutoryRequest
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Auth", description = "Registration, login and token rotation"),
        (name = "Employee", description = "Employee records"),
        (name = "Organization", description = "Departments, positions and structure change requests"),
        (name = "Policy config", description = "Overtime and lateness rules, holidays"),
        (name = "Statutory", description = "Tax rules and insurance brackets"),
        (name = "Payroll", description = "Payroll run workflow and payslips"),
    )
)]
pub struct ApiDoc;

pub struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_lists_payroll_paths_and_bearer_scheme() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/api/payroll-execution/process-initiation"));
        assert!(doc.paths.paths.contains_key("/api/organization-structure/departments/hierarchy"));
        let components = doc.components.expect("components");
        assert!(components.security_schemes.contains_key("bearer_auth"));
    }
}
