use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, NaiveDate, Utc};
use futures::future;

use crate::error::{StoreError, StoreResult};
use crate::model::change_request::{
    ApprovalDecision, ChangeRequestStatus, ChangeRequestUpdate, NewChangeRequest,
    StructureApproval, StructureChangeRequest,
};
use crate::model::department::{
    Department, DepartmentUpdate, NewAssignment, NewDepartment, NewPosition, Position,
    PositionAssignment, PositionUpdate, reaches,
};
use crate::model::employee::{Employee, EmployeeFilter, EmployeeStatus, EmployeeUpdate, NewEmployee};
use crate::model::payroll_run::{
    EntryAdjustment, NewRun, PayrollRun, RunEntry, RunFilter, RunStatus, RunTotals,
    RunTransitionRecord, entity_key, period_key,
};
use crate::model::payslip::{PaymentStatus, Payslip, PayslipFilter};
use crate::model::policy::{
    Holiday, HolidayUpdate, LatenessRule, LatenessRuleUpdate, NewHoliday, NewLatenessRule,
    NewOvertimeRule, OvertimeRule, OvertimeRuleUpdate,
};
use crate::model::statutory::{
    ConfigStatus, InsuranceBracket, NewInsuranceBracket, NewTaxRule, StatutorySnapshot, TaxRule,
};
use crate::model::user::{NewUser, RefreshTokenRecord, User};

use super::{
    EmployeeStore, IdempotencyScope, OrganizationStore, PayrollStore, PolicyStore, RunTransition,
    StatutoryStore, StoreFuture, UserStore,
};

#[derive(Default)]
struct Tables {
    sequence: u64,
    users: BTreeMap<u64, User>,
    last_login: HashMap<u64, DateTime<Utc>>,
    refresh_tokens: BTreeMap<u64, RefreshTokenRecord>,
    employees: BTreeMap<u64, Employee>,
    departments: BTreeMap<u64, Department>,
    positions: BTreeMap<u64, Position>,
    assignments: BTreeMap<u64, PositionAssignment>,
    change_requests: BTreeMap<u64, StructureChangeRequest>,
    approvals: BTreeMap<u64, StructureApproval>,
    overtime_rules: BTreeMap<u64, OvertimeRule>,
    lateness_rules: BTreeMap<u64, LatenessRule>,
    holidays: BTreeMap<u64, Holiday>,
    tax_rules: BTreeMap<u64, TaxRule>,
    insurance_brackets: BTreeMap<u64, InsuranceBracket>,
    runs: BTreeMap<String, PayrollRun>,
    live_runs: HashMap<String, String>,
    entries: BTreeMap<(String, u64), RunEntry>,
    transitions: Vec<RunTransitionRecord>,
    payslips: BTreeMap<u64, Payslip>,
    idempotency: HashMap<(IdempotencyScope, String), String>,
}

impl Tables {
    fn next_id(&mut self) -> u64 {
        self.sequence += 1;
        self.sequence
    }

    fn record_transition(
        &mut self,
        run_id: &str,
        from: Option<RunStatus>,
        to: RunStatus,
        actor_id: u64,
        note: Option<String>,
        at: DateTime<Utc>,
    ) {
        let id = self.next_id();
        self.transitions.push(RunTransitionRecord {
            id,
            run_id: run_id.to_string(),
            from_status: from,
            to_status: to,
            actor_id,
            note,
            created_at: at,
        });
    }

    fn run_entries(&self, run_id: &str) -> Vec<RunEntry> {
        self.entries
            .values()
            .filter(|e| e.run_id == run_id)
            .cloned()
            .collect()
    }
}

/// Lock-protected in-process store.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

fn poisoned() -> StoreError {
    StoreError::Unknown("memory store lock poisoned".to_string())
}

fn duplicate(what: impl std::fmt::Display) -> StoreError {
    StoreError::DuplicateKey(what.to_string())
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, Tables>> {
        self.tables.read().map_err(|_| poisoned())
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, Tables>> {
        self.tables.write().map_err(|_| poisoned())
    }

    fn with<'a, T, F>(&self, f: F) -> StoreFuture<'a, T>
    where
        T: Send + 'a,
        F: FnOnce(&Tables) -> StoreResult<T>,
    {
        let result = self.read().and_then(|t| f(&t));
        Box::pin(future::ready(result))
    }

    fn with_mut<'a, T, F>(&self, f: F) -> StoreFuture<'a, T>
    where
        T: Send + 'a,
        F: FnOnce(&mut Tables) -> StoreResult<T>,
    {
        let result = self.write().and_then(|mut t| f(&mut t));
        Box::pin(future::ready(result))
    }
}

fn get<'t, V>(map: &'t BTreeMap<u64, V>, entity: &'static str, id: u64) -> StoreResult<&'t V> {
    map.get(&id).ok_or_else(|| StoreError::not_found(entity, id))
}

fn get_mut<'t, V>(
    map: &'t mut BTreeMap<u64, V>,
    entity: &'static str,
    id: u64,
) -> StoreResult<&'t mut V> {
    map.get_mut(&id).ok_or_else(|| StoreError::not_found(entity, id))
}

impl UserStore for MemoryStore {
    fn insert_user<'a>(&'a self, user: &'a NewUser) -> StoreFuture<'a, User> {
        self.with_mut(|t| {
            if t.users
                .values()
                .any(|u| u.username.eq_ignore_ascii_case(&user.username))
            {
                return Err(duplicate(format_args!("username {}", user.username)));
            }
            let id = t.next_id();
            let record = User {
                id,
                username: user.username.clone(),
                password_hash: user.password_hash.clone(),
                role: user.role,
                employee_id: user.employee_id,
                is_active: true,
            };
            t.users.insert(id, record.clone());
            Ok(record)
        })
    }

    fn find_user_by_username<'a>(&'a self, username: &'a str) -> StoreFuture<'a, Option<User>> {
        self.with(|t| {
            Ok(t.users
                .values()
                .find(|u| u.username.eq_ignore_ascii_case(username))
                .cloned())
        })
    }

    fn touch_last_login(&self, user_id: u64) -> StoreFuture<'_, ()> {
        self.with_mut(|t| {
            get(&t.users, "user", user_id)?;
            t.last_login.insert(user_id, Utc::now());
            Ok(())
        })
    }

    fn insert_refresh_token<'a>(
        &'a self,
        user_id: u64,
        jti: &'a str,
        expires_at: DateTime<Utc>,
    ) -> StoreFuture<'a, ()> {
        self.with_mut(|t| {
            if t.refresh_tokens.values().any(|r| r.jti == jti) {
                return Err(duplicate(format_args!("jti {jti}")));
            }
            let id = t.next_id();
            t.refresh_tokens.insert(
                id,
                RefreshTokenRecord {
                    id,
                    user_id,
                    jti: jti.to_string(),
                    expires_at,
                    revoked: false,
                },
            );
            Ok(())
        })
    }

    fn find_refresh_token<'a>(
        &'a self,
        jti: &'a str,
    ) -> StoreFuture<'a, Option<RefreshTokenRecord>> {
        self.with(|t| Ok(t.refresh_tokens.values().find(|r| r.jti == jti).cloned()))
    }

    fn rotate_refresh_token<'a>(
        &'a self,
        old_jti: &'a str,
        user_id: u64,
        new_jti: &'a str,
        expires_at: DateTime<Utc>,
    ) -> StoreFuture<'a, bool> {
        self.with_mut(|t| {
            let Some(old) = t
                .refresh_tokens
                .values_mut()
                .find(|r| r.jti == old_jti && !r.revoked)
            else {
                return Ok(false);
            };
            old.revoked = true;
            let id = t.next_id();
            t.refresh_tokens.insert(
                id,
                RefreshTokenRecord {
                    id,
                    user_id,
                    jti: new_jti.to_string(),
                    expires_at,
                    revoked: false,
                },
            );
            Ok(true)
        })
    }

    fn revoke_refresh_token<'a>(&'a self, jti: &'a str) -> StoreFuture<'a, bool> {
        self.with_mut(|t| {
            match t
                .refresh_tokens
                .values_mut()
                .find(|r| r.jti == jti && !r.revoked)
            {
                Some(record) => {
                    record.revoked = true;
                    Ok(true)
                }
                None => Ok(false),
            }
        })
    }
}

impl EmployeeStore for MemoryStore {
    fn insert_employee<'a>(&'a self, employee: &'a NewEmployee) -> StoreFuture<'a, Employee> {
        self.with_mut(|t| {
            for existing in t.employees.values() {
                if existing.employee_code == employee.employee_code {
                    return Err(duplicate(format_args!(
                        "employee_code {}",
                        employee.employee_code
                    )));
                }
                if existing.email.eq_ignore_ascii_case(&employee.email) {
                    return Err(duplicate(format_args!("email {}", employee.email)));
                }
            }
            let id = t.next_id();
            let record = Employee {
                id,
                employee_code: employee.employee_code.clone(),
                first_name: employee.first_name.clone(),
                last_name: employee.last_name.clone(),
                email: employee.email.clone(),
                department_id: employee.department_id,
                position_id: employee.position_id,
                hire_date: employee.hire_date,
                status: EmployeeStatus::Active,
                base_salary: employee.base_salary,
                allowances: employee.allowances,
            };
            t.employees.insert(id, record.clone());
            Ok(record)
        })
    }

    fn get_employee(&self, id: u64) -> StoreFuture<'_, Employee> {
        self.with(|t| get(&t.employees, "employee", id).cloned())
    }

    fn list_employees<'a>(
        &'a self,
        filter: &'a EmployeeFilter,
    ) -> StoreFuture<'a, (Vec<Employee>, u64)> {
        self.with(|t| {
            let matching: Vec<&Employee> = t
                .employees
                .values()
                .rev()
                .filter(|e| e.matches(filter))
                .collect();
            let total = matching.len() as u64;
            let page = matching
                .into_iter()
                .skip(filter.offset as usize)
                .take(filter.limit as usize)
                .cloned()
                .collect();
            Ok((page, total))
        })
    }

    fn update_employee<'a>(
        &'a self,
        id: u64,
        update: &'a EmployeeUpdate,
    ) -> StoreFuture<'a, Employee> {
        self.with_mut(|t| {
            if let Some(email) = &update.email {
                if t.employees
                    .values()
                    .any(|e| e.id != id && e.email.eq_ignore_ascii_case(email))
                {
                    return Err(duplicate(format_args!("email {email}")));
                }
            }
            let employee = get_mut(&mut t.employees, "employee", id)?;
            employee.apply(update);
            Ok(employee.clone())
        })
    }

    fn list_active_employees(&self) -> StoreFuture<'_, Vec<Employee>> {
        self.with(|t| {
            Ok(t.employees
                .values()
                .filter(|e| e.is_active())
                .cloned()
                .collect())
        })
    }
}

impl OrganizationStore for MemoryStore {
    fn insert_department<'a>(&'a self, dept: &'a NewDepartment) -> StoreFuture<'a, Department> {
        self.with_mut(|t| {
            if t.departments.values().any(|d| d.code == dept.code) {
                return Err(duplicate(format_args!("department code {}", dept.code)));
            }
            let id = t.next_id();
            let now = Utc::now();
            let record = Department {
                id,
                code: dept.code.clone(),
                name: dept.name.clone(),
                description: dept.description.clone(),
                parent_department_id: dept.parent_department_id,
                head_position_id: dept.head_position_id,
                is_active: true,
                created_at: now,
                updated_at: now,
            };
            t.departments.insert(id, record.clone());
            Ok(record)
        })
    }

    fn get_department(&self, id: u64) -> StoreFuture<'_, Department> {
        self.with(|t| get(&t.departments, "department", id).cloned())
    }

    fn list_departments(&self, active: Option<bool>) -> StoreFuture<'_, Vec<Department>> {
        self.with(move |t| {
            Ok(t.departments
                .values()
                .filter(|d| active.is_none_or(|a| d.is_active == a))
                .cloned()
                .collect())
        })
    }

    fn update_department<'a>(
        &'a self,
        id: u64,
        update: &'a DepartmentUpdate,
    ) -> StoreFuture<'a, Department> {
        self.with_mut(|t| {
            if let Some(parent) = update.parent_department_id {
                let departments = &t.departments;
                if reaches(parent, id, |d| departments.get(&d).and_then(|x| x.parent_department_id)) {
                    return Err(StoreError::ValidationFailed(format!(
                        "department {parent} cannot become the parent of department {id}: it would create a cycle"
                    )));
                }
            }
            let dept = get_mut(&mut t.departments, "department", id)?;
            dept.apply(update);
            dept.updated_at = Utc::now();
            Ok(dept.clone())
        })
    }

    fn set_department_active(&self, id: u64, active: bool) -> StoreFuture<'_, Department> {
        self.with_mut(move |t| {
            let dept = get_mut(&mut t.departments, "department", id)?;
            dept.is_active = active;
            dept.updated_at = Utc::now();
            Ok(dept.clone())
        })
    }

    fn insert_position<'a>(&'a self, position: &'a NewPosition) -> StoreFuture<'a, Position> {
        self.with_mut(|t| {
            if t.positions.values().any(|p| p.code == position.code) {
                return Err(duplicate(format_args!("position code {}", position.code)));
            }
            let id = t.next_id();
            let now = Utc::now();
            let record = Position {
                id,
                code: position.code.clone(),
                title: position.title.clone(),
                department_id: position.department_id,
                reports_to_position_id: position.reports_to_position_id,
                is_active: true,
                created_at: now,
                updated_at: now,
            };
            t.positions.insert(id, record.clone());
            Ok(record)
        })
    }

    fn get_position(&self, id: u64) -> StoreFuture<'_, Position> {
        self.with(|t| get(&t.positions, "position", id).cloned())
    }

    fn list_positions(
        &self,
        department_id: Option<u64>,
        active: Option<bool>,
    ) -> StoreFuture<'_, Vec<Position>> {
        self.with(move |t| {
            Ok(t.positions
                .values()
                .filter(|p| department_id.is_none_or(|d| p.department_id == d))
                .filter(|p| active.is_none_or(|a| p.is_active == a))
                .cloned()
                .collect())
        })
    }

    fn update_position<'a>(
        &'a self,
        id: u64,
        update: &'a PositionUpdate,
    ) -> StoreFuture<'a, Position> {
        self.with_mut(|t| {
            if let Some(manager) = update.reports_to_position_id {
                let positions = &t.positions;
                if reaches(manager, id, |p| positions.get(&p).and_then(|x| x.reports_to_position_id)) {
                    return Err(StoreError::ValidationFailed(format!(
                        "position {id} cannot report to position {manager}: it would create a cycle"
                    )));
                }
            }
            let position = get_mut(&mut t.positions, "position", id)?;
            position.apply(update);
            position.updated_at = Utc::now();
            Ok(position.clone())
        })
    }

    fn set_position_active(&self, id: u64, active: bool) -> StoreFuture<'_, Position> {
        self.with_mut(move |t| {
            let position = get_mut(&mut t.positions, "position", id)?;
            position.is_active = active;
            position.updated_at = Utc::now();
            Ok(position.clone())
        })
    }

    fn insert_assignment<'a>(
        &'a self,
        assignment: &'a NewAssignment,
    ) -> StoreFuture<'a, PositionAssignment> {
        self.with_mut(|t| {
            let id = t.next_id();
            let record = PositionAssignment {
                id,
                employee_id: assignment.employee_id,
                position_id: assignment.position_id,
                start_date: assignment.start_date,
                end_date: None,
                created_at: Utc::now(),
            };
            t.assignments.insert(id, record.clone());
            Ok(record)
        })
    }

    fn list_assignments(
        &self,
        employee_id: Option<u64>,
        position_id: Option<u64>,
    ) -> StoreFuture<'_, Vec<PositionAssignment>> {
        self.with(move |t| {
            Ok(t.assignments
                .values()
                .filter(|a| employee_id.is_none_or(|e| a.employee_id == e))
                .filter(|a| position_id.is_none_or(|p| a.position_id == p))
                .cloned()
                .collect())
        })
    }

    fn end_assignment(
        &self,
        id: u64,
        end_date: NaiveDate,
    ) -> StoreFuture<'_, PositionAssignment> {
        self.with_mut(move |t| {
            let assignment = get_mut(&mut t.assignments, "position assignment", id)?;
            if assignment.end_date.is_some() {
                return Err(StoreError::Conflict(format!(
                    "position assignment {id} already ended"
                )));
            }
            assignment.end_date = Some(end_date);
            Ok(assignment.clone())
        })
    }

    fn insert_change_request<'a>(
        &'a self,
        request: &'a NewChangeRequest,
        request_number: &'a str,
        requested_by: u64,
    ) -> StoreFuture<'a, StructureChangeRequest> {
        self.with_mut(|t| {
            if t.change_requests
                .values()
                .any(|r| r.request_number == request_number)
            {
                return Err(duplicate(format_args!("request number {request_number}")));
            }
            let id = t.next_id();
            let now = Utc::now();
            let record = StructureChangeRequest {
                id,
                request_number: request_number.to_string(),
                requested_by,
                request_type: request.request_type,
                target_department_id: request.target_department_id,
                target_position_id: request.target_position_id,
                details: request.details.clone(),
                reason: request.reason.clone(),
                status: ChangeRequestStatus::Pending,
                submitted_at: None,
                created_at: now,
                updated_at: now,
            };
            t.change_requests.insert(id, record.clone());
            Ok(record)
        })
    }

    fn get_change_request(&self, id: u64) -> StoreFuture<'_, StructureChangeRequest> {
        self.with(|t| get(&t.change_requests, "change request", id).cloned())
    }

    fn list_change_requests(
        &self,
        status: Option<ChangeRequestStatus>,
    ) -> StoreFuture<'_, Vec<StructureChangeRequest>> {
        self.with(move |t| {
            Ok(t.change_requests
                .values()
                .rev()
                .filter(|r| status.is_none_or(|s| r.status == s))
                .cloned()
                .collect())
        })
    }

    fn update_change_request<'a>(
        &'a self,
        id: u64,
        update: &'a ChangeRequestUpdate,
    ) -> StoreFuture<'a, StructureChangeRequest> {
        self.with_mut(|t| {
            let request = get_mut(&mut t.change_requests, "change request", id)?;
            if request.status != ChangeRequestStatus::Pending {
                return Err(StoreError::Conflict(format!(
                    "change request {id} is {}",
                    request.status
                )));
            }
            request.apply(update);
            request.updated_at = Utc::now();
            Ok(request.clone())
        })
    }

    fn set_change_request_status(
        &self,
        id: u64,
        from: ChangeRequestStatus,
        to: ChangeRequestStatus,
    ) -> StoreFuture<'_, StructureChangeRequest> {
        self.with_mut(move |t| {
            let request = get_mut(&mut t.change_requests, "change request", id)?;
            if request.status != from {
                return Err(StoreError::Conflict(format!(
                    "change request {id} is {}, expected {from}",
                    request.status
                )));
            }
            let now = Utc::now();
            request.status = to;
            request.updated_at = now;
            if to == ChangeRequestStatus::Submitted {
                request.submitted_at = Some(now);
            }
            Ok(request.clone())
        })
    }

    fn insert_approval(
        &self,
        change_request_id: u64,
        approver_id: u64,
    ) -> StoreFuture<'_, StructureApproval> {
        self.with_mut(move |t| {
            let request = get_mut(&mut t.change_requests, "change request", change_request_id)?;
            if request.status != ChangeRequestStatus::Submitted {
                return Err(StoreError::Conflict(format!(
                    "change request {change_request_id} is {}, expected submitted",
                    request.status
                )));
            }
            let now = Utc::now();
            request.status = ChangeRequestStatus::UnderReview;
            request.updated_at = now;

            let id = t.next_id();
            let approval = StructureApproval {
                id,
                change_request_id,
                approver_id,
                decision: ApprovalDecision::Pending,
                comments: None,
                decided_at: None,
                created_at: now,
            };
            t.approvals.insert(id, approval.clone());
            Ok(approval)
        })
    }

    fn get_approval(&self, id: u64) -> StoreFuture<'_, StructureApproval> {
        self.with(|t| get(&t.approvals, "approval", id).cloned())
    }

    fn list_approvals(&self, change_request_id: u64) -> StoreFuture<'_, Vec<StructureApproval>> {
        self.with(move |t| {
            Ok(t.approvals
                .values()
                .filter(|a| a.change_request_id == change_request_id)
                .cloned()
                .collect())
        })
    }

    fn decide_approval<'a>(
        &'a self,
        id: u64,
        decision: ApprovalDecision,
        comments: Option<&'a str>,
    ) -> StoreFuture<'a, StructureApproval> {
        self.with_mut(move |t| {
            let resulting = decision.resulting_status().ok_or_else(|| {
                StoreError::ValidationFailed("decision must be approved or rejected".into())
            })?;
            let approval = get(&t.approvals, "approval", id)?;
            if approval.decision != ApprovalDecision::Pending {
                return Err(StoreError::Conflict(format!(
                    "approval {id} already {}",
                    approval.decision
                )));
            }
            let request_id = approval.change_request_id;
            let request = get_mut(&mut t.change_requests, "change request", request_id)?;
            if request.status != ChangeRequestStatus::UnderReview {
                return Err(StoreError::Conflict(format!(
                    "change request {request_id} is {}, expected under_review",
                    request.status
                )));
            }

            let now = Utc::now();
            request.status = resulting;
            request.updated_at = now;

            let approval = get_mut(&mut t.approvals, "approval", id)?;
            approval.decision = decision;
            approval.comments = comments.map(str::to_string);
            approval.decided_at = Some(now);
            Ok(approval.clone())
        })
    }
}

impl PolicyStore for MemoryStore {
    fn insert_overtime_rule<'a>(
        &'a self,
        rule: &'a NewOvertimeRule,
        actor: u64,
    ) -> StoreFuture<'a, OvertimeRule> {
        self.with_mut(move |t| {
            let id = t.next_id();
            let now = Utc::now();
            let record = OvertimeRule {
                id,
                name: rule.name.clone(),
                description: rule.description.clone(),
                threshold_hours: rule.threshold_hours,
                multiplier: rule.multiplier,
                active: rule.active,
                approved: false,
                created_by: actor,
                updated_by: None,
                created_at: now,
                updated_at: now,
            };
            t.overtime_rules.insert(id, record.clone());
            Ok(record)
        })
    }

    fn get_overtime_rule(&self, id: u64) -> StoreFuture<'_, OvertimeRule> {
        self.with(|t| get(&t.overtime_rules, "overtime rule", id).cloned())
    }

    fn list_overtime_rules(&self, active: Option<bool>) -> StoreFuture<'_, Vec<OvertimeRule>> {
        self.with(move |t| {
            Ok(t.overtime_rules
                .values()
                .filter(|r| active.is_none_or(|a| r.active == a))
                .cloned()
                .collect())
        })
    }

    fn update_overtime_rule<'a>(
        &'a self,
        id: u64,
        update: &'a OvertimeRuleUpdate,
        actor: u64,
    ) -> StoreFuture<'a, OvertimeRule> {
        self.with_mut(move |t| {
            let rule = get_mut(&mut t.overtime_rules, "overtime rule", id)?;
            rule.apply(update);
            rule.updated_by = Some(actor);
            rule.updated_at = Utc::now();
            Ok(rule.clone())
        })
    }

    fn approve_overtime_rule(&self, id: u64, actor: u64) -> StoreFuture<'_, OvertimeRule> {
        self.with_mut(move |t| {
            let rule = get_mut(&mut t.overtime_rules, "overtime rule", id)?;
            rule.approved = true;
            rule.updated_by = Some(actor);
            rule.updated_at = Utc::now();
            Ok(rule.clone())
        })
    }

    fn delete_overtime_rule(&self, id: u64) -> StoreFuture<'_, ()> {
        self.with_mut(move |t| {
            t.overtime_rules
                .remove(&id)
                .map(|_| ())
                .ok_or_else(|| StoreError::not_found("overtime rule", id))
        })
    }

    fn insert_lateness_rule<'a>(
        &'a self,
        rule: &'a NewLatenessRule,
        actor: u64,
    ) -> StoreFuture<'a, LatenessRule> {
        self.with_mut(move |t| {
            let id = t.next_id();
            let now = Utc::now();
            let record = LatenessRule {
                id,
                name: rule.name.clone(),
                description: rule.description.clone(),
                grace_period_minutes: rule.grace_period_minutes,
                deduction_per_minute: rule.deduction_per_minute,
                active: rule.active,
                approved: false,
                created_by: actor,
                updated_by: None,
                created_at: now,
                updated_at: now,
            };
            t.lateness_rules.insert(id, record.clone());
            Ok(record)
        })
    }

    fn get_lateness_rule(&self, id: u64) -> StoreFuture<'_, LatenessRule> {
        self.with(|t| get(&t.lateness_rules, "lateness rule", id).cloned())
    }

    fn list_lateness_rules(&self, active: Option<bool>) -> StoreFuture<'_, Vec<LatenessRule>> {
        self.with(move |t| {
            Ok(t.lateness_rules
                .values()
                .filter(|r| active.is_none_or(|a| r.active == a))
                .cloned()
                .collect())
        })
    }

    fn update_lateness_rule<'a>(
        &'a self,
        id: u64,
        update: &'a LatenessRuleUpdate,
        actor: u64,
    ) -> StoreFuture<'a, LatenessRule> {
        self.with_mut(move |t| {
            let rule = get_mut(&mut t.lateness_rules, "lateness rule", id)?;
            rule.apply(update);
            rule.updated_by = Some(actor);
            rule.updated_at = Utc::now();
            Ok(rule.clone())
        })
    }

    fn approve_lateness_rule(&self, id: u64, actor: u64) -> StoreFuture<'_, LatenessRule> {
        self.with_mut(move |t| {
            let rule = get_mut(&mut t.lateness_rules, "lateness rule", id)?;
            rule.approved = true;
            rule.updated_by = Some(actor);
            rule.updated_at = Utc::now();
            Ok(rule.clone())
        })
    }

    fn delete_lateness_rule(&self, id: u64) -> StoreFuture<'_, ()> {
        self.with_mut(move |t| {
            t.lateness_rules
                .remove(&id)
                .map(|_| ())
                .ok_or_else(|| StoreError::not_found("lateness rule", id))
        })
    }

    fn insert_holiday<'a>(
        &'a self,
        holiday: &'a NewHoliday,
        actor: u64,
    ) -> StoreFuture<'a, Holiday> {
        self.with_mut(move |t| {
            let id = t.next_id();
            let now = Utc::now();
            let record = Holiday {
                id,
                name: holiday.name.clone(),
                holiday_type: holiday.holiday_type,
                start_date: holiday.start_date,
                end_date: holiday.end_date,
                active: holiday.active,
                created_by: actor,
                updated_by: None,
                created_at: now,
                updated_at: now,
            };
            t.holidays.insert(id, record.clone());
            Ok(record)
        })
    }

    fn get_holiday(&self, id: u64) -> StoreFuture<'_, Holiday> {
        self.with(|t| get(&t.holidays, "holiday", id).cloned())
    }

    fn list_holidays(&self, active: Option<bool>) -> StoreFuture<'_, Vec<Holiday>> {
        self.with(move |t| {
            let mut holidays: Vec<Holiday> = t
                .holidays
                .values()
                .filter(|h| active.is_none_or(|a| h.active == a))
                .cloned()
                .collect();
            holidays.sort_by_key(|h| (h.start_date, h.id));
            Ok(holidays)
        })
    }

    fn update_holiday<'a>(
        &'a self,
        id: u64,
        update: &'a HolidayUpdate,
        actor: u64,
    ) -> StoreFuture<'a, Holiday> {
        self.with_mut(move |t| {
            let holiday = get_mut(&mut t.holidays, "holiday", id)?;
            holiday.apply(update);
            holiday.updated_by = Some(actor);
            holiday.updated_at = Utc::now();
            Ok(holiday.clone())
        })
    }

    fn delete_holiday(&self, id: u64) -> StoreFuture<'_, ()> {
        self.with_mut(move |t| {
            t.holidays
                .remove(&id)
                .map(|_| ())
                .ok_or_else(|| StoreError::not_found("holiday", id))
        })
    }

    fn holidays_covering(&self, date: NaiveDate) -> StoreFuture<'_, Vec<Holiday>> {
        self.with(move |t| {
            Ok(t.holidays
                .values()
                .filter(|h| h.active && h.covers(date))
                .cloned()
                .collect())
        })
    }
}

impl StatutoryStore for MemoryStore {
    fn insert_tax_rule<'a>(&'a self, rule: &'a NewTaxRule, actor: u64) -> StoreFuture<'a, TaxRule> {
        self.with_mut(move |t| {
            let id = t.next_id();
            let now = Utc::now();
            let record = TaxRule {
                id,
                name: rule.name.clone(),
                description: rule.description.clone(),
                rate: rule.rate,
                min_salary: rule.min_salary,
                max_salary: rule.max_salary,
                status: ConfigStatus::Draft,
                created_by: actor,
                approved_by: None,
                created_at: now,
                updated_at: now,
            };
            t.tax_rules.insert(id, record.clone());
            Ok(record)
        })
    }

    fn list_tax_rules(&self, status: Option<ConfigStatus>) -> StoreFuture<'_, Vec<TaxRule>> {
        self.with(move |t| {
            Ok(t.tax_rules
                .values()
                .filter(|r| status.is_none_or(|s| r.status == s))
                .cloned()
                .collect())
        })
    }

    fn approve_tax_rule(&self, id: u64, actor: u64) -> StoreFuture<'_, TaxRule> {
        self.with_mut(move |t| {
            let rule = get_mut(&mut t.tax_rules, "tax rule", id)?;
            if rule.status != ConfigStatus::Draft {
                return Err(StoreError::Conflict(format!("tax rule {id} already approved")));
            }
            rule.status = ConfigStatus::Approved;
            rule.approved_by = Some(actor);
            rule.updated_at = Utc::now();
            Ok(rule.clone())
        })
    }

    fn insert_insurance_bracket<'a>(
        &'a self,
        bracket: &'a NewInsuranceBracket,
        actor: u64,
    ) -> StoreFuture<'a, InsuranceBracket> {
        self.with_mut(move |t| {
            let id = t.next_id();
            let now = Utc::now();
            let record = InsuranceBracket {
                id,
                name: bracket.name.clone(),
                min_salary: bracket.min_salary,
                max_salary: bracket.max_salary,
                employee_rate: bracket.employee_rate,
                employer_rate: bracket.employer_rate,
                status: ConfigStatus::Draft,
                created_by: actor,
                approved_by: None,
                created_at: now,
                updated_at: now,
            };
            t.insurance_brackets.insert(id, record.clone());
            Ok(record)
        })
    }

    fn list_insurance_brackets(
        &self,
        status: Option<ConfigStatus>,
    ) -> StoreFuture<'_, Vec<InsuranceBracket>> {
        self.with(move |t| {
            Ok(t.insurance_brackets
                .values()
                .filter(|b| status.is_none_or(|s| b.status == s))
                .cloned()
                .collect())
        })
    }

    fn approve_insurance_bracket(&self, id: u64, actor: u64) -> StoreFuture<'_, InsuranceBracket> {
        self.with_mut(move |t| {
            let bracket = get_mut(&mut t.insurance_brackets, "insurance bracket", id)?;
            if bracket.status != ConfigStatus::Draft {
                return Err(StoreError::Conflict(format!(
                    "insurance bracket {id} already approved"
                )));
            }
            bracket.status = ConfigStatus::Approved;
            bracket.approved_by = Some(actor);
            bracket.updated_at = Utc::now();
            Ok(bracket.clone())
        })
    }

    fn statutory_snapshot(&self) -> StoreFuture<'_, StatutorySnapshot> {
        self.with(|t| {
            Ok(StatutorySnapshot {
                tax_rules: t
                    .tax_rules
                    .values()
                    .filter(|r| r.status == ConfigStatus::Approved)
                    .cloned()
                    .collect(),
                insurance_brackets: t
                    .insurance_brackets
                    .values()
                    .filter(|b| b.status == ConfigStatus::Approved)
                    .cloned()
                    .collect(),
            })
        })
    }
}

impl PayrollStore for MemoryStore {
    fn create_run<'a>(
        &'a self,
        run: &'a NewRun,
        actor_id: u64,
        idempotency_key: Option<&'a str>,
    ) -> StoreFuture<'a, PayrollRun> {
        self.with_mut(move |t| {
            let live_key = period_key(run.payroll_period, &run.entity);
            if t.live_runs.contains_key(&live_key) {
                return Err(duplicate(format_args!(
                    "a payroll run for {} / {} already exists",
                    run.payroll_period, run.entity
                )));
            }
            let idem = idempotency_key.map(|k| (IdempotencyScope::ProposePeriod, k.to_string()));
            if let Some(key) = &idem {
                if t.idempotency.contains_key(key) {
                    return Err(duplicate(format_args!("idempotency key {}", key.1)));
                }
            }
            if t.runs.contains_key(&run.run_id) {
                return Err(duplicate(format_args!("run id {}", run.run_id)));
            }

            let now = Utc::now();
            let record = PayrollRun {
                run_id: run.run_id.clone(),
                payroll_period: run.payroll_period,
                entity: run.entity.clone(),
                currency: run.currency.clone(),
                status: RunStatus::PeriodProposed,
                employees: 0,
                total_gross_pay: Default::default(),
                total_deductions: Default::default(),
                total_net_pay: Default::default(),
                payroll_specialist_id: run.payroll_specialist_id,
                payroll_manager_id: run.payroll_manager_id,
                rejection_reason: None,
                unlock_reason: None,
                created_at: now,
                updated_at: now,
            };
            t.runs.insert(record.run_id.clone(), record.clone());
            t.live_runs.insert(live_key, record.run_id.clone());
            if let Some(key) = idem {
                t.idempotency.insert(key, record.run_id.clone());
            }
            t.record_transition(
                &record.run_id,
                None,
                RunStatus::PeriodProposed,
                actor_id,
                None,
                now,
            );
            Ok(record)
        })
    }

    fn get_run<'a>(&'a self, run_id: &'a str) -> StoreFuture<'a, PayrollRun> {
        self.with(|t| {
            t.runs
                .get(run_id)
                .cloned()
                .ok_or_else(|| StoreError::not_found("payroll run", run_id))
        })
    }

    fn list_runs<'a>(&'a self, filter: &'a RunFilter) -> StoreFuture<'a, Vec<PayrollRun>> {
        self.with(|t| {
            let mut runs: Vec<PayrollRun> = t
                .runs
                .values()
                .filter(|r| filter.status.is_none_or(|s| r.status == s))
                .filter(|r| {
                    filter
                        .entity
                        .as_ref()
                        .is_none_or(|e| entity_key(&r.entity) == entity_key(e))
                })
                .cloned()
                .collect();
            runs.sort_by(|a, b| {
                b.payroll_period
                    .cmp(&a.payroll_period)
                    .then(b.created_at.cmp(&a.created_at))
            });
            Ok(runs)
        })
    }

    fn find_live_run<'a>(
        &'a self,
        period: NaiveDate,
        entity: &'a str,
    ) -> StoreFuture<'a, Option<PayrollRun>> {
        self.with(move |t| {
            Ok(t.live_runs
                .get(&period_key(period, entity))
                .and_then(|run_id| t.runs.get(run_id))
                .cloned())
        })
    }

    fn find_run_by_idempotency_key<'a>(
        &'a self,
        scope: IdempotencyScope,
        key: &'a str,
    ) -> StoreFuture<'a, Option<PayrollRun>> {
        self.with(move |t| {
            Ok(t.idempotency
                .get(&(scope, key.to_string()))
                .and_then(|run_id| t.runs.get(run_id))
                .cloned())
        })
    }

    fn apply_transition<'a>(
        &'a self,
        transition: &'a RunTransition,
    ) -> StoreFuture<'a, PayrollRun> {
        self.with_mut(|t| {
            let run_id = transition.run_id.as_str();
            let current = current_run(t, run_id)?;
            if current.status != transition.from {
                return Err(StoreError::Conflict(format!(
                    "payroll run {run_id} is {}, expected {}",
                    current.status, transition.from
                )));
            }

            // All checks happen before the first write.
            let changes = &transition.changes;
            if let Some((scope, key)) = &changes.idempotency_key {
                if t.idempotency.contains_key(&(*scope, key.clone())) {
                    return Err(duplicate(format_args!("idempotency key {key}")));
                }
            }
            if let Some(payslips) = &changes.payslips {
                let taken = payslips.iter().any(|p| {
                    t.payslips.values().any(|existing| {
                        existing.payroll_run_id == p.payroll_run_id
                            && existing.employee_id == p.employee_id
                    })
                });
                if taken {
                    return Err(duplicate(format_args!("payslips for run {run_id}")));
                }
            }

            let now = Utc::now();
            let live_key = period_key(current.payroll_period, &current.entity);
            let updated = transition.applied_to(current, now);

            if let Some(entries) = &changes.entries {
                t.entries.retain(|(r, _), _| r != run_id);
                for entry in entries {
                    t.entries
                        .insert((run_id.to_string(), entry.employee_id), entry.clone());
                }
            }
            if let Some(payslips) = &changes.payslips {
                for p in payslips {
                    let id = t.next_id();
                    t.payslips.insert(
                        id,
                        Payslip {
                            id,
                            employee_id: p.employee_id,
                            payroll_run_id: p.payroll_run_id.clone(),
                            earnings_details: p.earnings_details.clone(),
                            deductions_details: p.deductions_details.clone(),
                            total_gross_salary: p.total_gross_salary,
                            total_deductions: p.total_deductions,
                            net_pay: p.net_pay,
                            payment_status: PaymentStatus::Pending,
                            created_at: now,
                            updated_at: now,
                        },
                    );
                }
            }
            if changes.mark_payslips_paid {
                for payslip in t
                    .payslips
                    .values_mut()
                    .filter(|p| p.payroll_run_id == run_id)
                {
                    payslip.payment_status = PaymentStatus::Paid;
                    payslip.updated_at = now;
                }
            }
            if let Some((scope, key)) = &changes.idempotency_key {
                t.idempotency
                    .insert((*scope, key.clone()), run_id.to_string());
            }
            if transition.to.releases_period() {
                t.live_runs.remove(&live_key);
            }

            t.runs.insert(run_id.to_string(), updated.clone());

            t.record_transition(
                run_id,
                Some(transition.from),
                transition.to,
                transition.actor_id,
                transition.note.clone(),
                now,
            );
            Ok(updated)
        })
    }

    fn list_entries<'a>(&'a self, run_id: &'a str) -> StoreFuture<'a, Vec<RunEntry>> {
        self.with(|t| {
            if !t.runs.contains_key(run_id) {
                return Err(StoreError::not_found("payroll run", run_id));
            }
            Ok(t.run_entries(run_id))
        })
    }

    fn adjust_entry<'a>(
        &'a self,
        run_id: &'a str,
        employee_id: u64,
        expected: RunStatus,
        adjustment: &'a EntryAdjustment,
    ) -> StoreFuture<'a, RunEntry> {
        // Figures are computed under the read lock; the write lock only
        // swaps them in if nothing moved in between.
        let prepared = self.read().and_then(|t| {
            let status = t
                .runs
                .get(run_id)
                .map(|r| r.status)
                .ok_or_else(|| StoreError::not_found("payroll run", run_id))?;
            if status != expected {
                return Err(StoreError::Conflict(format!(
                    "payroll run {run_id} is {status}, expected {expected}"
                )));
            }
            let key = (run_id.to_string(), employee_id);
            let current = t.entries.get(&key).cloned().ok_or_else(|| {
                StoreError::not_found("run entry", format!("{run_id}/{employee_id}"))
            })?;
            let updated = current.adjusted(adjustment)?;
            let mut entries = t.run_entries(run_id);
            for e in entries.iter_mut().filter(|e| e.employee_id == employee_id) {
                *e = updated.clone();
            }
            let totals = RunTotals::from_entries(&entries)?;
            Ok((current, updated, totals))
        });
        let (current, updated, totals) = match prepared {
            Ok(prepared) => prepared,
            Err(e) => return Box::pin(future::ready(Err(e))),
        };

        self.with_mut(move |t| {
            let key = (run_id.to_string(), employee_id);
            let unchanged = t.runs.get(run_id).is_some_and(|r| r.status == expected)
                && t.entries.get(&key) == Some(&current);
            if !unchanged {
                return Err(StoreError::Conflict(format!(
                    "payroll run {run_id} changed during the adjustment"
                )));
            }
            t.entries.insert(key, updated.clone());
            if let Some(run) = t.runs.get_mut(run_id) {
                run.employees = totals.employees;
                run.total_gross_pay = totals.total_gross_pay;
                run.total_deductions = totals.total_deductions;
                run.total_net_pay = totals.total_net_pay;
                run.updated_at = Utc::now();
            }
            Ok(updated)
        })
    }

    fn list_transitions<'a>(
        &'a self,
        run_id: &'a str,
    ) -> StoreFuture<'a, Vec<RunTransitionRecord>> {
        self.with(|t| {
            if !t.runs.contains_key(run_id) {
                return Err(StoreError::not_found("payroll run", run_id));
            }
            Ok(t.transitions
                .iter()
                .filter(|r| r.run_id == run_id)
                .cloned()
                .collect())
        })
    }

    fn list_payslips<'a>(&'a self, filter: &'a PayslipFilter) -> StoreFuture<'a, Vec<Payslip>> {
        self.with(|t| {
            Ok(t.payslips
                .values()
                .filter(|p| filter.matches(p))
                .cloned()
                .collect())
        })
    }

    fn get_payslip(&self, id: u64) -> StoreFuture<'_, Payslip> {
        self.with(|t| get(&t.payslips, "payslip", id).cloned())
    }
}

fn current_run<'t>(t: &'t Tables, run_id: &str) -> StoreResult<&'t PayrollRun> {
    t.runs
        .get(run_id)
        .ok_or_else(|| StoreError::not_found("payroll run", run_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    use crate::model::payroll_run::{RunAction, new_run_id};
    use crate::store::RunChanges;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn new_run(entity: &str) -> NewRun {
        let period = date(2025, 2, 1);
        NewRun {
            run_id: new_run_id(period),
            payroll_period: period,
            entity: entity.to_string(),
            currency: "EGP".to_string(),
            payroll_specialist_id: 7,
            payroll_manager_id: None,
        }
    }

    fn step(run_id: &str, from: RunStatus, action: RunAction) -> RunTransition {
        RunTransition {
            run_id: run_id.to_string(),
            from,
            to: from.next(action).unwrap(),
            actor_id: 9,
            note: None,
            changes: RunChanges::default(),
        }
    }

    #[actix_web::test]
    async fn one_live_run_per_period_and_entity() {
        let store = MemoryStore::new();
        store.create_run(&new_run("Acme"), 7, None).await.unwrap();
        let err = store.create_run(&new_run("ACME"), 7, None).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateKey(_)));
        store.create_run(&new_run("Globex"), 7, None).await.unwrap();
    }

    #[actix_web::test]
    async fn rejection_frees_the_period() {
        let store = MemoryStore::new();
        let run = store.create_run(&new_run("Acme"), 7, None).await.unwrap();
        store
            .apply_transition(&step(&run.run_id, RunStatus::PeriodProposed, RunAction::RejectPeriod))
            .await
            .unwrap();
        store.create_run(&new_run("Acme"), 7, None).await.unwrap();
    }

    #[actix_web::test]
    async fn stale_transition_is_a_conflict() {
        let store = MemoryStore::new();
        let run = store.create_run(&new_run("Acme"), 7, None).await.unwrap();
        let approve = step(&run.run_id, RunStatus::PeriodProposed, RunAction::ApprovePeriod);
        store.apply_transition(&approve).await.unwrap();

        let err = store.apply_transition(&approve).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        let history = store.list_transitions(&run.run_id).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].from_status, None);
        assert_eq!(history[1].to_status, RunStatus::PeriodApproved);
    }

    #[actix_web::test]
    async fn failed_transition_writes_nothing() {
        let store = MemoryStore::new();
        let run = store.create_run(&new_run("Acme"), 7, None).await.unwrap();
        let mut approve = step(&run.run_id, RunStatus::PeriodProposed, RunAction::ApprovePeriod);
        approve.changes.idempotency_key =
            Some((IdempotencyScope::ProcessInitiation, "k-1".to_string()));
        store.apply_transition(&approve).await.unwrap();

        let mut initiate = step(&run.run_id, RunStatus::PeriodApproved, RunAction::Initiate);
        initiate.changes.entries = Some(vec![RunEntry::draft(
            &run.run_id,
            1,
            Default::default(),
            Default::default(),
        )
        .unwrap()]);
        initiate.changes.idempotency_key =
            Some((IdempotencyScope::ProcessInitiation, "k-1".to_string()));
        let err = store.apply_transition(&initiate).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateKey(_)));

        let run = store.get_run(&run.run_id).await.unwrap();
        assert_eq!(run.status, RunStatus::PeriodApproved);
        assert!(store.list_entries(&run.run_id).await.unwrap().is_empty());
    }

    #[actix_web::test]
    async fn oversized_adjustment_is_refused_and_store_stays_usable() {
        let store = MemoryStore::new();
        let run = store.create_run(&new_run("Acme"), 7, None).await.unwrap();
        store
            .apply_transition(&step(&run.run_id, RunStatus::PeriodProposed, RunAction::ApprovePeriod))
            .await
            .unwrap();
        let mut initiate = step(&run.run_id, RunStatus::PeriodApproved, RunAction::Initiate);
        initiate.changes.entries = Some(vec![
            RunEntry::draft(&run.run_id, 1, Decimal::new(1_000_000, 2), Decimal::ZERO).unwrap(),
        ]);
        store.apply_transition(&initiate).await.unwrap();

        let huge = EntryAdjustment {
            bonuses: Some(Decimal::MAX),
            ..EntryAdjustment::default()
        };
        let err = store
            .adjust_entry(&run.run_id, 1, RunStatus::Draft, &huge)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ValidationFailed(_)));

        let entries = store.list_entries(&run.run_id).await.unwrap();
        assert_eq!(entries[0].gross_pay, Decimal::new(1_000_000, 2));
        let bonus = EntryAdjustment {
            bonuses: Some(Decimal::new(50_000, 2)),
            ..EntryAdjustment::default()
        };
        let entry = store
            .adjust_entry(&run.run_id, 1, RunStatus::Draft, &bonus)
            .await
            .unwrap();
        assert_eq!(entry.gross_pay, Decimal::new(1_050_000, 2));
        let run = store.get_run(&run.run_id).await.unwrap();
        assert_eq!(run.total_gross_pay, Decimal::new(1_050_000, 2));
    }

    #[actix_web::test]
    async fn entity_filter_ignores_padding_and_case() {
        let store = MemoryStore::new();
        let run = store.create_run(&new_run("Acme"), 7, None).await.unwrap();
        store.create_run(&new_run("Globex"), 7, None).await.unwrap();

        let filter = RunFilter {
            entity: Some("  acme ".to_string()),
            ..RunFilter::default()
        };
        let runs = store.list_runs(&filter).await.unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].run_id, run.run_id);
    }

    #[actix_web::test]
    async fn parent_update_that_closes_a_loop_is_refused() {
        let store = MemoryStore::new();
        let department = |code: &str, parent: Option<u64>| NewDepartment {
            code: code.to_string(),
            name: code.to_string(),
            description: None,
            parent_department_id: parent,
            head_position_id: None,
        };
        let eng = store.insert_department(&department("ENG", None)).await.unwrap();
        let web = store.insert_department(&department("WEB", Some(eng.id))).await.unwrap();
        let fe = store.insert_department(&department("FE", Some(web.id))).await.unwrap();

        let reparent = |parent: u64| DepartmentUpdate {
            parent_department_id: Some(parent),
            ..DepartmentUpdate::default()
        };
        let err = store.update_department(eng.id, &reparent(fe.id)).await.unwrap_err();
        assert!(matches!(err, StoreError::ValidationFailed(_)));
        let err = store.update_department(eng.id, &reparent(eng.id)).await.unwrap_err();
        assert!(matches!(err, StoreError::ValidationFailed(_)));
        assert_eq!(store.get_department(eng.id).await.unwrap().parent_department_id, None);

        // Moving a leaf elsewhere is fine.
        let ops = store.insert_department(&department("OPS", None)).await.unwrap();
        let moved = store.update_department(fe.id, &reparent(ops.id)).await.unwrap();
        assert_eq!(moved.parent_department_id, Some(ops.id));
    }
}
