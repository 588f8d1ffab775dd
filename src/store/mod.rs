//! Repository boundary.
//!
//! Every collection sits behind a trait so handlers and services work with
//! `dyn Store` regardless of backend. `MySqlStore` is the production backend;
//! `MemoryStore` keeps the same guarantees (unique keys, compare-and-set
//! status updates, all-or-nothing transitions) behind a lock and backs tests
//! and `STORE_BACKEND=memory`.

use chrono::{DateTime, NaiveDate, Utc};
use futures::future::BoxFuture;

use crate::error::StoreError;
use crate::model::change_request::{
    ApprovalDecision, ChangeRequestStatus, ChangeRequestUpdate, NewChangeRequest,
    StructureApproval, StructureChangeRequest,
};
use crate::model::department::{
    Department, DepartmentUpdate, NewAssignment, NewDepartment, NewPosition, Position,
    PositionAssignment, PositionUpdate,
};
use crate::model::employee::{Employee, EmployeeFilter, EmployeeUpdate, NewEmployee};
use crate::model::payroll_run::{
    EntryAdjustment, NewRun, PayrollRun, RunEntry, RunFilter, RunStatus, RunTotals,
    RunTransitionRecord,
};
use crate::model::payslip::{NewPayslip, Payslip, PayslipFilter};
use crate::model::policy::{
    Holiday, HolidayUpdate, LatenessRule, LatenessRuleUpdate, NewHoliday, NewLatenessRule,
    NewOvertimeRule, OvertimeRule, OvertimeRuleUpdate,
};
use crate::model::statutory::{
    ConfigStatus, InsuranceBracket, NewInsuranceBracket, NewTaxRule, StatutorySnapshot, TaxRule,
};
use crate::model::user::{NewUser, RefreshTokenRecord, User};

pub mod memory;
pub mod mysql;

pub use memory::MemoryStore;
pub use mysql::MySqlStore;

pub type StoreFuture<'a, T> = BoxFuture<'a, Result<T, StoreError>>;

pub trait UserStore: Send + Sync {
    fn insert_user<'a>(&'a self, user: &'a NewUser) -> StoreFuture<'a, User>;
    fn find_user_by_username<'a>(&'a self, username: &'a str) -> StoreFuture<'a, Option<User>>;
    fn touch_last_login(&self, user_id: u64) -> StoreFuture<'_, ()>;
    fn insert_refresh_token<'a>(
        &'a self,
        user_id: u64,
        jti: &'a str,
        expires_at: DateTime<Utc>,
    ) -> StoreFuture<'a, ()>;
    fn find_refresh_token<'a>(&'a self, jti: &'a str)
    -> StoreFuture<'a, Option<RefreshTokenRecord>>;
    /// Revokes `old_jti` and stores `new_jti` together. `false` when the old
    /// token was already revoked or unknown, in which case nothing is written.
    fn rotate_refresh_token<'a>(
        &'a self,
        old_jti: &'a str,
        user_id: u64,
        new_jti: &'a str,
        expires_at: DateTime<Utc>,
    ) -> StoreFuture<'a, bool>;
    fn revoke_refresh_token<'a>(&'a self, jti: &'a str) -> StoreFuture<'a, bool>;
}

pub trait EmployeeStore: Send + Sync {
    fn insert_employee<'a>(&'a self, employee: &'a NewEmployee) -> StoreFuture<'a, Employee>;
    fn get_employee(&self, id: u64) -> StoreFuture<'_, Employee>;
    /// Page of matching employees plus the total match count.
    fn list_employees<'a>(
        &'a self,
        filter: &'a EmployeeFilter,
    ) -> StoreFuture<'a, (Vec<Employee>, u64)>;
    fn update_employee<'a>(
        &'a self,
        id: u64,
        update: &'a EmployeeUpdate,
    ) -> StoreFuture<'a, Employee>;
    fn list_active_employees(&self) -> StoreFuture<'_, Vec<Employee>>;
}

pub trait OrganizationStore: Send + Sync {
    fn insert_department<'a>(&'a self, dept: &'a NewDepartment) -> StoreFuture<'a, Department>;
    fn get_department(&self, id: u64) -> StoreFuture<'_, Department>;
    fn list_departments(&self, active: Option<bool>) -> StoreFuture<'_, Vec<Department>>;
    fn update_department<'a>(
        &'a self,
        id: u64,
        update: &'a DepartmentUpdate,
    ) -> StoreFuture<'a, Department>;
    fn set_department_active(&self, id: u64, active: bool) -> StoreFuture<'_, Department>;

    fn insert_position<'a>(&'a self, position: &'a NewPosition) -> StoreFuture<'a, Position>;
    fn get_position(&self, id: u64) -> StoreFuture<'_, Position>;
    fn list_positions(
        &self,
        department_id: Option<u64>,
        active: Option<bool>,
    ) -> StoreFuture<'_, Vec<Position>>;
    fn update_position<'a>(
        &'a self,
        id: u64,
        update: &'a PositionUpdate,
    ) -> StoreFuture<'a, Position>;
    fn set_position_active(&self, id: u64, active: bool) -> StoreFuture<'_, Position>;

    fn insert_assignment<'a>(
        &'a self,
        assignment: &'a NewAssignment,
    ) -> StoreFuture<'a, PositionAssignment>;
    fn list_assignments(
        &self,
        employee_id: Option<u64>,
        position_id: Option<u64>,
    ) -> StoreFuture<'_, Vec<PositionAssignment>>;
    fn end_assignment(&self, id: u64, end_date: NaiveDate)
    -> StoreFuture<'_, PositionAssignment>;

    fn insert_change_request<'a>(
        &'a self,
        request: &'a NewChangeRequest,
        request_number: &'a str,
        requested_by: u64,
    ) -> StoreFuture<'a, StructureChangeRequest>;
    fn get_change_request(&self, id: u64) -> StoreFuture<'_, StructureChangeRequest>;
    fn list_change_requests(
        &self,
        status: Option<ChangeRequestStatus>,
    ) -> StoreFuture<'_, Vec<StructureChangeRequest>>;
    /// Edits a request that is still `pending`.
    fn update_change_request<'a>(
        &'a self,
        id: u64,
        update: &'a ChangeRequestUpdate,
    ) -> StoreFuture<'a, StructureChangeRequest>;
    /// Compare-and-set on the request status.
    fn set_change_request_status(
        &self,
        id: u64,
        from: ChangeRequestStatus,
        to: ChangeRequestStatus,
    ) -> StoreFuture<'_, StructureChangeRequest>;
    /// Opens a pending approval and moves the request from `submitted` to
    /// `under_review` in one step.
    fn insert_approval(
        &self,
        change_request_id: u64,
        approver_id: u64,
    ) -> StoreFuture<'_, StructureApproval>;
    fn get_approval(&self, id: u64) -> StoreFuture<'_, StructureApproval>;
    fn list_approvals(&self, change_request_id: u64) -> StoreFuture<'_, Vec<StructureApproval>>;
    /// Records a final decision on a pending approval and the matching
    /// request status in one step.
    fn decide_approval<'a>(
        &'a self,
        id: u64,
        decision: ApprovalDecision,
        comments: Option<&'a str>,
    ) -> StoreFuture<'a, StructureApproval>;
}

pub trait PolicyStore: Send + Sync {
    fn insert_overtime_rule<'a>(
        &'a self,
        rule: &'a NewOvertimeRule,
        actor: u64,
    ) -> StoreFuture<'a, OvertimeRule>;
    fn get_overtime_rule(&self, id: u64) -> StoreFuture<'_, OvertimeRule>;
    fn list_overtime_rules(&self, active: Option<bool>) -> StoreFuture<'_, Vec<OvertimeRule>>;
    fn update_overtime_rule<'a>(
        &'a self,
        id: u64,
        update: &'a OvertimeRuleUpdate,
        actor: u64,
    ) -> StoreFuture<'a, OvertimeRule>;
    fn approve_overtime_rule(&self, id: u64, actor: u64) -> StoreFuture<'_, OvertimeRule>;
    fn delete_overtime_rule(&self, id: u64) -> StoreFuture<'_, ()>;

    fn insert_lateness_rule<'a>(
        &'a self,
        rule: &'a NewLatenessRule,
        actor: u64,
    ) -> StoreFuture<'a, LatenessRule>;
    fn get_lateness_rule(&self, id: u64) -> StoreFuture<'_, LatenessRule>;
    fn list_lateness_rules(&self, active: Option<bool>) -> StoreFuture<'_, Vec<LatenessRule>>;
    fn update_lateness_rule<'a>(
        &'a self,
        id: u64,
        update: &'a LatenessRuleUpdate,
        actor: u64,
    ) -> StoreFuture<'a, LatenessRule>;
    fn approve_lateness_rule(&self, id: u64, actor: u64) -> StoreFuture<'_, LatenessRule>;
    fn delete_lateness_rule(&self, id: u64) -> StoreFuture<'_, ()>;

    fn insert_holiday<'a>(&'a self, holiday: &'a NewHoliday, actor: u64)
    -> StoreFuture<'a, Holiday>;
    fn get_holiday(&self, id: u64) -> StoreFuture<'_, Holiday>;
    fn list_holidays(&self, active: Option<bool>) -> StoreFuture<'_, Vec<Holiday>>;
    fn update_holiday<'a>(
        &'a self,
        id: u64,
        update: &'a HolidayUpdate,
        actor: u64,
    ) -> StoreFuture<'a, Holiday>;
    fn delete_holiday(&self, id: u64) -> StoreFuture<'_, ()>;
    /// Active holidays whose range contains `date`.
    fn holidays_covering(&self, date: NaiveDate) -> StoreFuture<'_, Vec<Holiday>>;
}

pub trait StatutoryStore: Send + Sync {
    fn insert_tax_rule<'a>(&'a self, rule: &'a NewTaxRule, actor: u64) -> StoreFuture<'a, TaxRule>;
    fn list_tax_rules(&self, status: Option<ConfigStatus>) -> StoreFuture<'_, Vec<TaxRule>>;
    fn approve_tax_rule(&self, id: u64, actor: u64) -> StoreFuture<'_, TaxRule>;

    fn insert_insurance_bracket<'a>(
        &'a self,
        bracket: &'a NewInsuranceBracket,
        actor: u64,
    ) -> StoreFuture<'a, InsuranceBracket>;
    fn list_insurance_brackets(
        &self,
        status: Option<ConfigStatus>,
    ) -> StoreFuture<'_, Vec<InsuranceBracket>>;
    fn approve_insurance_bracket(&self, id: u64, actor: u64) -> StoreFuture<'_, InsuranceBracket>;

    /// All approved tax rules and insurance brackets, read consistently.
    fn statutory_snapshot(&self) -> StoreFuture<'_, StatutorySnapshot>;
}

/// Scope of an idempotency key; the same key may be reused across scopes.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum IdempotencyScope {
    ProposePeriod,
    ProcessInitiation,
}

impl IdempotencyScope {
    pub fn as_str(self) -> &'static str {
        match self {
            IdempotencyScope::ProposePeriod => "propose_period",
            IdempotencyScope::ProcessInitiation => "process_initiation",
        }
    }
}

/// A status change on a run plus everything that must be written with it.
#[derive(Debug, Clone)]
pub struct RunTransition {
    pub run_id: String,
    pub from: RunStatus,
    pub to: RunStatus,
    pub actor_id: u64,
    pub note: Option<String>,
    pub changes: RunChanges,
}

#[derive(Debug, Clone, Default)]
pub struct RunChanges {
    pub totals: Option<RunTotals>,
    pub currency: Option<String>,
    pub payroll_specialist_id: Option<u64>,
    pub payroll_manager_id: Option<u64>,
    pub rejection_reason: Option<String>,
    pub unlock_reason: Option<String>,
    /// Replace all entries of the run.
    pub entries: Option<Vec<RunEntry>>,
    pub payslips: Option<Vec<NewPayslip>>,
    pub mark_payslips_paid: bool,
    pub idempotency_key: Option<(IdempotencyScope, String)>,
}

impl RunTransition {
    /// `run` as it reads once this transition is applied.
    pub fn applied_to(&self, run: &PayrollRun, at: DateTime<Utc>) -> PayrollRun {
        let changes = &self.changes;
        let mut next = run.clone();
        next.status = self.to;
        next.updated_at = at;
        if let Some(totals) = changes.totals {
            next.employees = totals.employees;
            next.total_gross_pay = totals.total_gross_pay;
            next.total_deductions = totals.total_deductions;
            next.total_net_pay = totals.total_net_pay;
        }
        if let Some(currency) = &changes.currency {
            next.currency = currency.clone();
        }
        if let Some(id) = changes.payroll_specialist_id {
            next.payroll_specialist_id = id;
        }
        if let Some(id) = changes.payroll_manager_id {
            next.payroll_manager_id = Some(id);
        }
        if let Some(reason) = &changes.rejection_reason {
            next.rejection_reason = Some(reason.clone());
        }
        if let Some(reason) = &changes.unlock_reason {
            next.unlock_reason = Some(reason.clone());
        }
        next
    }
}

pub trait PayrollStore: Send + Sync {
    /// Inserts a `PERIOD_PROPOSED` run, its first transition record and the
    /// optional idempotency key together. `DuplicateKey` when another live
    /// run holds the same period and entity, or the key is already taken.
    fn create_run<'a>(
        &'a self,
        run: &'a NewRun,
        actor_id: u64,
        idempotency_key: Option<&'a str>,
    ) -> StoreFuture<'a, PayrollRun>;
    fn get_run<'a>(&'a self, run_id: &'a str) -> StoreFuture<'a, PayrollRun>;
    fn list_runs<'a>(&'a self, filter: &'a RunFilter) -> StoreFuture<'a, Vec<PayrollRun>>;
    /// The live (not rejected) run for a period and entity, if any.
    fn find_live_run<'a>(
        &'a self,
        period: NaiveDate,
        entity: &'a str,
    ) -> StoreFuture<'a, Option<PayrollRun>>;
    fn find_run_by_idempotency_key<'a>(
        &'a self,
        scope: IdempotencyScope,
        key: &'a str,
    ) -> StoreFuture<'a, Option<PayrollRun>>;
    /// Compare-and-set `from -> to` and apply `changes` atomically. `Conflict`
    /// when the run is no longer in `from`.
    fn apply_transition<'a>(&'a self, transition: &'a RunTransition)
    -> StoreFuture<'a, PayrollRun>;
    fn list_entries<'a>(&'a self, run_id: &'a str) -> StoreFuture<'a, Vec<RunEntry>>;
    /// Adjusts one entry while the run is still in `expected`, refreshing
    /// run totals in the same step.
    fn adjust_entry<'a>(
        &'a self,
        run_id: &'a str,
        employee_id: u64,
        expected: RunStatus,
        adjustment: &'a EntryAdjustment,
    ) -> StoreFuture<'a, RunEntry>;
    fn list_transitions<'a>(&'a self, run_id: &'a str)
    -> StoreFuture<'a, Vec<RunTransitionRecord>>;
    fn list_payslips<'a>(&'a self, filter: &'a PayslipFilter) -> StoreFuture<'a, Vec<Payslip>>;
    fn get_payslip(&self, id: u64) -> StoreFuture<'_, Payslip>;
}

pub trait Store:
    UserStore + EmployeeStore + OrganizationStore + PolicyStore + StatutoryStore + PayrollStore
{
}

impl<T> Store for T where
    T: UserStore + EmployeeStore + OrganizationStore + PolicyStore + StatutoryStore + PayrollStore
{
}
