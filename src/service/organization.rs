//! Departments, positions, assignments and structure change requests.

use std::collections::HashMap;

use chrono::{NaiveDate, Utc};
use tracing::info;

use crate::error::{AppError, StoreError};
use crate::model::change_request::{
    ApprovalDecision, ChangeRequestStatus, ChangeRequestUpdate, NewChangeRequest,
    StructureApproval, StructureChangeRequest, request_number,
};
use crate::model::department::{
    Department, DepartmentNode, DepartmentUpdate, NewAssignment, NewDepartment, NewPosition,
    Position, PositionAssignment, PositionUpdate, build_hierarchy, reaches,
};
use crate::store::Store;

use super::{referenced, required};

// ---------------- Departments ----------------

pub async fn create_department(
    store: &dyn Store,
    input: &NewDepartment,
) -> Result<Department, AppError> {
    required(&input.code, "code")?;
    required(&input.name, "name")?;
    if let Some(parent) = input.parent_department_id {
        referenced(store.get_department(parent), "parent department", parent).await?;
    }
    if let Some(head) = input.head_position_id {
        referenced(store.get_position(head), "head position", head).await?;
    }

    let dept = store.insert_department(input).await.map_err(|e| match e {
        StoreError::DuplicateKey(_) => {
            AppError::DuplicateKey(format!("department code {} already exists", input.code))
        }
        other => other.into(),
    })?;
    info!(department_id = dept.id, code = %dept.code, "Department created");
    Ok(dept)
}

pub async fn get_departments(
    store: &dyn Store,
    active: Option<bool>,
) -> Result<Vec<Department>, AppError> {
    Ok(store.list_departments(active).await?)
}

pub async fn get_department(store: &dyn Store, id: u64) -> Result<Department, AppError> {
    Ok(store.get_department(id).await?)
}

pub async fn update_department(
    store: &dyn Store,
    id: u64,
    update: &DepartmentUpdate,
) -> Result<Department, AppError> {
    if let Some(name) = &update.name {
        required(name, "name")?;
    }
    store.get_department(id).await?;

    if let Some(parent) = update.parent_department_id {
        if parent == id {
            return Err(AppError::Validation(
                "a department cannot be its own parent".into(),
            ));
        }
        referenced(store.get_department(parent), "parent department", parent).await?;

        let parents: HashMap<u64, Option<u64>> = store
            .list_departments(None)
            .await?
            .into_iter()
            .map(|d| (d.id, d.parent_department_id))
            .collect();
        if reaches(parent, id, |d| parents.get(&d).copied().flatten()) {
            return Err(AppError::Validation(format!(
                "department {parent} is a descendant of department {id}"
            )));
        }
    }
    if let Some(head) = update.head_position_id {
        referenced(store.get_position(head), "head position", head).await?;
    }

    Ok(store.update_department(id, update).await?)
}

pub async fn deactivate_department(store: &dyn Store, id: u64) -> Result<Department, AppError> {
    let dept = store.set_department_active(id, false).await?;
    info!(department_id = id, "Department deactivated");
    Ok(dept)
}

pub async fn get_department_hierarchy(store: &dyn Store) -> Result<Vec<DepartmentNode>, AppError> {
    let departments = store.list_departments(Some(true)).await?;
    Ok(build_hierarchy(departments))
}

// ---------------- Positions ----------------

pub async fn create_position(store: &dyn Store, input: &NewPosition) -> Result<Position, AppError> {
    required(&input.code, "code")?;
    required(&input.title, "title")?;
    let dept = referenced(
        store.get_department(input.department_id),
        "department",
        input.department_id,
    )
    .await?;
    if !dept.is_active {
        return Err(AppError::Validation(format!(
            "department {} is inactive",
            dept.id
        )));
    }
    if let Some(manager) = input.reports_to_position_id {
        referenced(store.get_position(manager), "reporting position", manager).await?;
    }

    let position = store.insert_position(input).await.map_err(|e| match e {
        StoreError::DuplicateKey(_) => {
            AppError::DuplicateKey(format!("position code {} already exists", input.code))
        }
        other => other.into(),
    })?;
    info!(position_id = position.id, code = %position.code, "Position created");
    Ok(position)
}

pub async fn get_positions(
    store: &dyn Store,
    department_id: Option<u64>,
    active: Option<bool>,
) -> Result<Vec<Position>, AppError> {
    Ok(store.list_positions(department_id, active).await?)
}

pub async fn get_position(store: &dyn Store, id: u64) -> Result<Position, AppError> {
    Ok(store.get_position(id).await?)
}

pub async fn update_position(
    store: &dyn Store,
    id: u64,
    update: &PositionUpdate,
) -> Result<Position, AppError> {
    if let Some(title) = &update.title {
        required(title, "title")?;
    }
    store.get_position(id).await?;

    if let Some(dept) = update.department_id {
        referenced(store.get_department(dept), "department", dept).await?;
    }
    if let Some(manager) = update.reports_to_position_id {
        if manager == id {
            return Err(AppError::Validation(
                "a position cannot report to itself".into(),
            ));
        }
        referenced(store.get_position(manager), "reporting position", manager).await?;

        let lines: HashMap<u64, Option<u64>> = store
            .list_positions(None, None)
            .await?
            .into_iter()
            .map(|p| (p.id, p.reports_to_position_id))
            .collect();
        if reaches(manager, id, |p| lines.get(&p).copied().flatten()) {
            return Err(AppError::Validation(format!(
                "position {manager} already reports to position {id}"
            )));
        }
    }

    Ok(store.update_position(id, update).await?)
}

pub async fn deactivate_position(store: &dyn Store, id: u64) -> Result<Position, AppError> {
    let position = store.set_position_active(id, false).await?;
    info!(position_id = id, "Position deactivated");
    Ok(position)
}

// ---------------- Assignments ----------------

pub async fn assign_position(
    store: &dyn Store,
    input: &NewAssignment,
) -> Result<PositionAssignment, AppError> {
    referenced(store.get_employee(input.employee_id), "employee", input.employee_id).await?;
    let position = referenced(
        store.get_position(input.position_id),
        "position",
        input.position_id,
    )
    .await?;
    if !position.is_active {
        return Err(AppError::Validation(format!(
            "position {} is inactive",
            position.id
        )));
    }
    Ok(store.insert_assignment(input).await?)
}

pub async fn get_assignments(
    store: &dyn Store,
    employee_id: Option<u64>,
    position_id: Option<u64>,
) -> Result<Vec<PositionAssignment>, AppError> {
    Ok(store.list_assignments(employee_id, position_id).await?)
}

pub async fn end_assignment(
    store: &dyn Store,
    id: u64,
    end_date: NaiveDate,
) -> Result<PositionAssignment, AppError> {
    let current = store
        .list_assignments(None, None)
        .await?
        .into_iter()
        .find(|a| a.id == id)
        .ok_or_else(|| AppError::NotFound(format!("position assignment {id} not found")))?;
    if end_date < current.start_date {
        return Err(AppError::Validation(
            "end_date must not precede start_date".into(),
        ));
    }
    Ok(store.end_assignment(id, end_date).await?)
}

// ---------------- Change requests ----------------

fn check_targets(
    request_type: crate::model::change_request::ChangeRequestType,
    department: Option<u64>,
    position: Option<u64>,
) -> Result<(), AppError> {
    if request_type.targets_department() && department.is_none() {
        return Err(AppError::Validation(format!(
            "{request_type} requires target_department_id"
        )));
    }
    if request_type.targets_position() && position.is_none() {
        return Err(AppError::Validation(format!(
            "{request_type} requires target_position_id"
        )));
    }
    Ok(())
}

pub async fn create_change_request(
    store: &dyn Store,
    input: &NewChangeRequest,
    requested_by: u64,
) -> Result<StructureChangeRequest, AppError> {
    required(&input.reason, "reason")?;
    check_targets(
        input.request_type,
        input.target_department_id,
        input.target_position_id,
    )?;
    if let Some(dept) = input.target_department_id {
        referenced(store.get_department(dept), "department", dept).await?;
    }
    if let Some(position) = input.target_position_id {
        referenced(store.get_position(position), "position", position).await?;
    }

    let number = request_number(Utc::now());
    let request = store
        .insert_change_request(input, &number, requested_by)
        .await?;
    info!(
        change_request_id = request.id,
        request_number = %request.request_number,
        "Structure change request created"
    );
    Ok(request)
}

pub async fn get_change_requests(
    store: &dyn Store,
    status: Option<ChangeRequestStatus>,
) -> Result<Vec<StructureChangeRequest>, AppError> {
    Ok(store.list_change_requests(status).await?)
}

pub async fn get_change_request(
    store: &dyn Store,
    id: u64,
) -> Result<StructureChangeRequest, AppError> {
    Ok(store.get_change_request(id).await?)
}

pub async fn update_change_request(
    store: &dyn Store,
    id: u64,
    update: &ChangeRequestUpdate,
) -> Result<StructureChangeRequest, AppError> {
    if let Some(reason) = &update.reason {
        required(reason, "reason")?;
    }
    let current = store.get_change_request(id).await?;
    check_targets(
        current.request_type,
        update.target_department_id.or(current.target_department_id),
        update.target_position_id.or(current.target_position_id),
    )?;
    Ok(store.update_change_request(id, update).await?)
}

pub async fn submit_change_request(
    store: &dyn Store,
    id: u64,
) -> Result<StructureChangeRequest, AppError> {
    let request = store
        .set_change_request_status(
            id,
            ChangeRequestStatus::Pending,
            ChangeRequestStatus::Submitted,
        )
        .await?;
    info!(change_request_id = id, "Structure change request submitted");
    Ok(request)
}

pub async fn cancel_change_request(
    store: &dyn Store,
    id: u64,
) -> Result<StructureChangeRequest, AppError> {
    let current = store.get_change_request(id).await?;
    if !current.status.can_cancel() {
        return Err(AppError::Conflict(format!(
            "change request {id} is {} and can no longer be cancelled",
            current.status
        )));
    }
    Ok(store
        .set_change_request_status(id, current.status, ChangeRequestStatus::Cancelled)
        .await?)
}

/// Opens the review of a submitted request.
pub async fn create_approval(
    store: &dyn Store,
    change_request_id: u64,
    approver_id: u64,
) -> Result<StructureApproval, AppError> {
    let approval = store.insert_approval(change_request_id, approver_id).await?;
    info!(
        change_request_id,
        approval_id = approval.id,
        "Structure change request under review"
    );
    Ok(approval)
}

pub async fn get_approvals(
    store: &dyn Store,
    change_request_id: u64,
) -> Result<Vec<StructureApproval>, AppError> {
    store.get_change_request(change_request_id).await?;
    Ok(store.list_approvals(change_request_id).await?)
}

pub async fn update_approval_decision(
    store: &dyn Store,
    approval_id: u64,
    decision: ApprovalDecision,
    comments: Option<&str>,
) -> Result<StructureApproval, AppError> {
    if decision == ApprovalDecision::Pending {
        return Err(AppError::Validation(
            "decision must be approved or rejected".into(),
        ));
    }
    let approval = store
        .decide_approval(approval_id, decision, comments)
        .await?;
    info!(
        approval_id,
        change_request_id = approval.change_request_id,
        decision = %decision,
        "Structure change request decided"
    );
    Ok(approval)
}
