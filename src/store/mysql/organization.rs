use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{Executor, FromRow, MySql, QueryBuilder};

use crate::error::{StoreError, StoreResult};
use crate::model::change_request::{
    ApprovalDecision, ChangeRequestStatus, ChangeRequestUpdate, NewChangeRequest,
    StructureApproval, StructureChangeRequest,
};
use crate::model::department::{
    Department, DepartmentUpdate, NewAssignment, NewDepartment, NewPosition, Position,
    PositionAssignment, PositionUpdate, reaches,
};
use crate::store::{OrganizationStore, StoreFuture};

use super::{MySqlStore, expect_row, parse};

const DEPARTMENT_COLUMNS: &str = "id, code, name, description, parent_department_id, \
     head_position_id, is_active, created_at, updated_at";
const POSITION_COLUMNS: &str =
    "id, code, title, department_id, reports_to_position_id, is_active, created_at, updated_at";
const ASSIGNMENT_COLUMNS: &str = "id, employee_id, position_id, start_date, end_date, created_at";
const REQUEST_COLUMNS: &str = "id, request_number, requested_by, request_type, \
     target_department_id, target_position_id, details, reason, status, submitted_at, \
     created_at, updated_at";
const APPROVAL_COLUMNS: &str =
    "id, change_request_id, approver_id, decision, comments, decided_at, created_at";

#[derive(FromRow)]
struct DepartmentRow {
    id: u64,
    code: String,
    name: String,
    description: Option<String>,
    parent_department_id: Option<u64>,
    head_position_id: Option<u64>,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<DepartmentRow> for Department {
    fn from(row: DepartmentRow) -> Self {
        Department {
            id: row.id,
            code: row.code,
            name: row.name,
            description: row.description,
            parent_department_id: row.parent_department_id,
            head_position_id: row.head_position_id,
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(FromRow)]
struct PositionRow {
    id: u64,
    code: String,
    title: String,
    department_id: u64,
    reports_to_position_id: Option<u64>,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<PositionRow> for Position {
    fn from(row: PositionRow) -> Self {
        Position {
            id: row.id,
            code: row.code,
            title: row.title,
            department_id: row.department_id,
            reports_to_position_id: row.reports_to_position_id,
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(FromRow)]
struct AssignmentRow {
    id: u64,
    employee_id: u64,
    position_id: u64,
    start_date: NaiveDate,
    end_date: Option<NaiveDate>,
    created_at: DateTime<Utc>,
}

impl From<AssignmentRow> for PositionAssignment {
    fn from(row: AssignmentRow) -> Self {
        PositionAssignment {
            id: row.id,
            employee_id: row.employee_id,
            position_id: row.position_id,
            start_date: row.start_date,
            end_date: row.end_date,
            created_at: row.created_at,
        }
    }
}

#[derive(FromRow)]
struct ChangeRequestRow {
    id: u64,
    request_number: String,
    requested_by: u64,
    request_type: String,
    target_department_id: Option<u64>,
    target_position_id: Option<u64>,
    details: Option<String>,
    reason: String,
    status: String,
    submitted_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ChangeRequestRow> for StructureChangeRequest {
    type Error = StoreError;

    fn try_from(row: ChangeRequestRow) -> StoreResult<Self> {
        Ok(StructureChangeRequest {
            id: row.id,
            request_number: row.request_number,
            requested_by: row.requested_by,
            request_type: parse(&row.request_type)?,
            target_department_id: row.target_department_id,
            target_position_id: row.target_position_id,
            details: row.details,
            reason: row.reason,
            status: parse(&row.status)?,
            submitted_at: row.submitted_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(FromRow)]
struct ApprovalRow {
    id: u64,
    change_request_id: u64,
    approver_id: u64,
    decision: String,
    comments: Option<String>,
    decided_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<ApprovalRow> for StructureApproval {
    type Error = StoreError;

    fn try_from(row: ApprovalRow) -> StoreResult<Self> {
        Ok(StructureApproval {
            id: row.id,
            change_request_id: row.change_request_id,
            approver_id: row.approver_id,
            decision: parse(&row.decision)?,
            comments: row.comments,
            decided_at: row.decided_at,
            created_at: row.created_at,
        })
    }
}

impl MySqlStore {
    /// Reads and locks every `(id, parent)` link of a self-referencing table
    /// until the transaction ends, so no concurrent update can close a loop.
    async fn locked_links<'e, E>(executor: E, sql: &str) -> StoreResult<HashMap<u64, Option<u64>>>
    where
        E: Executor<'e, Database = MySql>,
    {
        let rows: Vec<(u64, Option<u64>)> = sqlx::query_as(sql).fetch_all(executor).await?;
        Ok(rows.into_iter().collect())
    }

    async fn fetch_department<'e, E>(executor: E, id: u64, lock: bool) -> StoreResult<Department>
    where
        E: Executor<'e, Database = MySql>,
    {
        let sql = format!(
            "SELECT {DEPARTMENT_COLUMNS} FROM departments WHERE id = ?{}",
            if lock { " FOR UPDATE" } else { "" }
        );
        let row: Option<DepartmentRow> =
            sqlx::query_as(&sql).bind(id).fetch_optional(executor).await?;
        row.map(Into::into)
            .ok_or_else(|| StoreError::not_found("department", id))
    }

    async fn fetch_position<'e, E>(executor: E, id: u64, lock: bool) -> StoreResult<Position>
    where
        E: Executor<'e, Database = MySql>,
    {
        let sql = format!(
            "SELECT {POSITION_COLUMNS} FROM positions WHERE id = ?{}",
            if lock { " FOR UPDATE" } else { "" }
        );
        let row: Option<PositionRow> =
            sqlx::query_as(&sql).bind(id).fetch_optional(executor).await?;
        row.map(Into::into)
            .ok_or_else(|| StoreError::not_found("position", id))
    }

    async fn fetch_change_request<'e, E>(
        executor: E,
        id: u64,
        lock: bool,
    ) -> StoreResult<StructureChangeRequest>
    where
        E: Executor<'e, Database = MySql>,
    {
        let sql = format!(
            "SELECT {REQUEST_COLUMNS} FROM structure_change_requests WHERE id = ?{}",
            if lock { " FOR UPDATE" } else { "" }
        );
        let row: Option<ChangeRequestRow> =
            sqlx::query_as(&sql).bind(id).fetch_optional(executor).await?;
        row.ok_or_else(|| StoreError::not_found("change request", id))?
            .try_into()
    }

    async fn fetch_approval<'e, E>(
        executor: E,
        id: u64,
        lock: bool,
    ) -> StoreResult<StructureApproval>
    where
        E: Executor<'e, Database = MySql>,
    {
        let sql = format!(
            "SELECT {APPROVAL_COLUMNS} FROM structure_approvals WHERE id = ?{}",
            if lock { " FOR UPDATE" } else { "" }
        );
        let row: Option<ApprovalRow> =
            sqlx::query_as(&sql).bind(id).fetch_optional(executor).await?;
        row.ok_or_else(|| StoreError::not_found("approval", id))?
            .try_into()
    }

    async fn write_department<'e, E>(executor: E, dept: &Department) -> StoreResult<()>
    where
        E: Executor<'e, Database = MySql>,
    {
        let result = sqlx::query(
            r#"
            UPDATE departments
            SET name = ?, description = ?, parent_department_id = ?, head_position_id = ?,
                is_active = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&dept.name)
        .bind(&dept.description)
        .bind(dept.parent_department_id)
        .bind(dept.head_position_id)
        .bind(dept.is_active)
        .bind(dept.updated_at)
        .bind(dept.id)
        .execute(executor)
        .await?;
        expect_row(result, "department", dept.id)
    }

    async fn write_position<'e, E>(executor: E, position: &Position) -> StoreResult<()>
    where
        E: Executor<'e, Database = MySql>,
    {
        let result = sqlx::query(
            r#"
            UPDATE positions
            SET title = ?, department_id = ?, reports_to_position_id = ?, is_active = ?,
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&position.title)
        .bind(position.department_id)
        .bind(position.reports_to_position_id)
        .bind(position.is_active)
        .bind(position.updated_at)
        .bind(position.id)
        .execute(executor)
        .await?;
        expect_row(result, "position", position.id)
    }
}

fn stale_request(id: u64, actual: ChangeRequestStatus, expected: ChangeRequestStatus) -> StoreError {
    StoreError::Conflict(format!(
        "change request {id} is {actual}, expected {expected}"
    ))
}

impl OrganizationStore for MySqlStore {
    fn insert_department<'a>(&'a self, dept: &'a NewDepartment) -> StoreFuture<'a, Department> {
        Box::pin(async move {
            let now = Utc::now();
            let result = sqlx::query(
                r#"
                INSERT INTO departments
                (code, name, description, parent_department_id, head_position_id, is_active,
                 created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, TRUE, ?, ?)
                "#,
            )
            .bind(&dept.code)
            .bind(&dept.name)
            .bind(&dept.description)
            .bind(dept.parent_department_id)
            .bind(dept.head_position_id)
            .bind(now)
            .bind(now)
            .execute(&self.pool)
            .await?;

            Ok(Department {
                id: result.last_insert_id(),
                code: dept.code.clone(),
                name: dept.name.clone(),
                description: dept.description.clone(),
                parent_department_id: dept.parent_department_id,
                head_position_id: dept.head_position_id,
                is_active: true,
                created_at: now,
                updated_at: now,
            })
        })
    }

    fn get_department(&self, id: u64) -> StoreFuture<'_, Department> {
        Box::pin(Self::fetch_department(&self.pool, id, false))
    }

    fn list_departments(&self, active: Option<bool>) -> StoreFuture<'_, Vec<Department>> {
        Box::pin(async move {
            let mut qb = QueryBuilder::<MySql>::new(format!(
                "SELECT {DEPARTMENT_COLUMNS} FROM departments"
            ));
            if let Some(active) = active {
                qb.push(" WHERE is_active = ").push_bind(active);
            }
            qb.push(" ORDER BY id");
            let rows: Vec<DepartmentRow> = qb.build_query_as().fetch_all(&self.pool).await?;
            Ok(rows.into_iter().map(Into::into).collect())
        })
    }

    fn update_department<'a>(
        &'a self,
        id: u64,
        update: &'a DepartmentUpdate,
    ) -> StoreFuture<'a, Department> {
        Box::pin(async move {
            let mut tx = self.pool.begin().await?;
            if let Some(parent) = update.parent_department_id {
                let links = Self::locked_links(
                    &mut *tx,
                    "SELECT id, parent_department_id FROM departments FOR UPDATE",
                )
                .await?;
                if reaches(parent, id, |d| links.get(&d).copied().flatten()) {
                    return Err(StoreError::ValidationFailed(format!(
                        "department {parent} cannot become the parent of department {id}: it would create a cycle"
                    )));
                }
            }
            let mut dept = Self::fetch_department(&mut *tx, id, true).await?;
            dept.apply(update);
            dept.updated_at = Utc::now();
            Self::write_department(&mut *tx, &dept).await?;
            tx.commit().await?;
            Ok(dept)
        })
    }

    fn set_department_active(&self, id: u64, active: bool) -> StoreFuture<'_, Department> {
        Box::pin(async move {
            let mut tx = self.pool.begin().await?;
            let mut dept = Self::fetch_department(&mut *tx, id, true).await?;
            dept.is_active = active;
            dept.updated_at = Utc::now();
            Self::write_department(&mut *tx, &dept).await?;
            tx.commit().await?;
            Ok(dept)
        })
    }

    fn insert_position<'a>(&'a self, position: &'a NewPosition) -> StoreFuture<'a, Position> {
        Box::pin(async move {
            let now = Utc::now();
            let result = sqlx::query(
                r#"
                INSERT INTO positions
                (code, title, department_id, reports_to_position_id, is_active, created_at, updated_at)
                VALUES (?, ?, ?, ?, TRUE, ?, ?)
                "#,
            )
            .bind(&position.code)
            .bind(&position.title)
            .bind(position.department_id)
            .bind(position.reports_to_position_id)
            .bind(now)
            .bind(now)
            .execute(&self.pool)
            .await?;

            Ok(Position {
                id: result.last_insert_id(),
                code: position.code.clone(),
                title: position.title.clone(),
                department_id: position.department_id,
                reports_to_position_id: position.reports_to_position_id,
                is_active: true,
                created_at: now,
                updated_at: now,
            })
        })
    }

    fn get_position(&self, id: u64) -> StoreFuture<'_, Position> {
        Box::pin(Self::fetch_position(&self.pool, id, false))
    }

    fn list_positions(
        &self,
        department_id: Option<u64>,
        active: Option<bool>,
    ) -> StoreFuture<'_, Vec<Position>> {
        Box::pin(async move {
            let mut qb = QueryBuilder::<MySql>::new(format!(
                "SELECT {POSITION_COLUMNS} FROM positions WHERE 1 = 1"
            ));
            if let Some(department_id) = department_id {
                qb.push(" AND department_id = ").push_bind(department_id);
            }
            if let Some(active) = active {
                qb.push(" AND is_active = ").push_bind(active);
            }
            qb.push(" ORDER BY id");
            let rows: Vec<PositionRow> = qb.build_query_as().fetch_all(&self.pool).await?;
            Ok(rows.into_iter().map(Into::into).collect())
        })
    }

    fn update_position<'a>(
        &'a self,
        id: u64,
        update: &'a PositionUpdate,
    ) -> StoreFuture<'a, Position> {
        Box::pin(async move {
            let mut tx = self.pool.begin().await?;
            if let Some(manager) = update.reports_to_position_id {
                let links = Self::locked_links(
                    &mut *tx,
                    "SELECT id, reports_to_position_id FROM positions FOR UPDATE",
                )
                .await?;
                if reaches(manager, id, |p| links.get(&p).copied().flatten()) {
                    return Err(StoreError::ValidationFailed(format!(
                        "position {id} cannot report to position {manager}: it would create a cycle"
                    )));
                }
            }
            let mut position = Self::fetch_position(&mut *tx, id, true).await?;
            position.apply(update);
            position.updated_at = Utc::now();
            Self::write_position(&mut *tx, &position).await?;
            tx.commit().await?;
            Ok(position)
        })
    }

    fn set_position_active(&self, id: u64, active: bool) -> StoreFuture<'_, Position> {
        Box::pin(async move {
            let mut tx = self.pool.begin().await?;
            let mut position = Self::fetch_position(&mut *tx, id, true).await?;
            position.is_active = active;
            position.updated_at = Utc::now();
            Self::write_position(&mut *tx, &position).await?;
            tx.commit().await?;
            Ok(position)
        })
    }

    fn insert_assignment<'a>(
        &'a self,
        assignment: &'a NewAssignment,
    ) -> StoreFuture<'a, PositionAssignment> {
        Box::pin(async move {
            let now = Utc::now();
            let result = sqlx::query(
                "INSERT INTO position_assignments (employee_id, position_id, start_date, created_at) VALUES (?, ?, ?, ?)",
            )
            .bind(assignment.employee_id)
            .bind(assignment.position_id)
            .bind(assignment.start_date)
            .bind(now)
            .execute(&self.pool)
            .await?;

            Ok(PositionAssignment {
                id: result.last_insert_id(),
                employee_id: assignment.employee_id,
                position_id: assignment.position_id,
                start_date: assignment.start_date,
                end_date: None,
                created_at: now,
            })
        })
    }

    fn list_assignments(
        &self,
        employee_id: Option<u64>,
        position_id: Option<u64>,
    ) -> StoreFuture<'_, Vec<PositionAssignment>> {
        Box::pin(async move {
            let mut qb = QueryBuilder::<MySql>::new(format!(
                "SELECT {ASSIGNMENT_COLUMNS} FROM position_assignments WHERE 1 = 1"
            ));
            if let Some(employee_id) = employee_id {
                qb.push(" AND employee_id = ").push_bind(employee_id);
            }
            if let Some(position_id) = position_id {
                qb.push(" AND position_id = ").push_bind(position_id);
            }
            qb.push(" ORDER BY id");
            let rows: Vec<AssignmentRow> = qb.build_query_as().fetch_all(&self.pool).await?;
            Ok(rows.into_iter().map(Into::into).collect())
        })
    }

    fn end_assignment(
        &self,
        id: u64,
        end_date: NaiveDate,
    ) -> StoreFuture<'_, PositionAssignment> {
        Box::pin(async move {
            let mut tx = self.pool.begin().await?;
            let row: Option<AssignmentRow> = sqlx::query_as(&format!(
                "SELECT {ASSIGNMENT_COLUMNS} FROM position_assignments WHERE id = ? FOR UPDATE"
            ))
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
            let mut assignment: PositionAssignment = row
                .map(Into::into)
                .ok_or_else(|| StoreError::not_found("position assignment", id))?;
            if assignment.end_date.is_some() {
                return Err(StoreError::Conflict(format!(
                    "position assignment {id} already ended"
                )));
            }

            sqlx::query("UPDATE position_assignments SET end_date = ? WHERE id = ?")
                .bind(end_date)
                .bind(id)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;

            assignment.end_date = Some(end_date);
            Ok(assignment)
        })
    }

    fn insert_change_request<'a>(
        &'a self,
        request: &'a NewChangeRequest,
        request_number: &'a str,
        requested_by: u64,
    ) -> StoreFuture<'a, StructureChangeRequest> {
        Box::pin(async move {
            let now = Utc::now();
            let status = ChangeRequestStatus::Pending;
            let result = sqlx::query(
                r#"
                INSERT INTO structure_change_requests
                (request_number, requested_by, request_type, target_department_id,
                 target_position_id, details, reason, status, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(request_number)
            .bind(requested_by)
            .bind(request.request_type.to_string())
            .bind(request.target_department_id)
            .bind(request.target_position_id)
            .bind(&request.details)
            .bind(&request.reason)
            .bind(status.to_string())
            .bind(now)
            .bind(now)
            .execute(&self.pool)
            .await?;

            Ok(StructureChangeRequest {
                id: result.last_insert_id(),
                request_number: request_number.to_string(),
                requested_by,
                request_type: request.request_type,
                target_department_id: request.target_department_id,
                target_position_id: request.target_position_id,
                details: request.details.clone(),
                reason: request.reason.clone(),
                status,
                submitted_at: None,
                created_at: now,
                updated_at: now,
            })
        })
    }

    fn get_change_request(&self, id: u64) -> StoreFuture<'_, StructureChangeRequest> {
        Box::pin(Self::fetch_change_request(&self.pool, id, false))
    }

    fn list_change_requests(
        &self,
        status: Option<ChangeRequestStatus>,
    ) -> StoreFuture<'_, Vec<StructureChangeRequest>> {
        Box::pin(async move {
            let mut qb = QueryBuilder::<MySql>::new(format!(
                "SELECT {REQUEST_COLUMNS} FROM structure_change_requests"
            ));
            if let Some(status) = status {
                qb.push(" WHERE status = ").push_bind(status.to_string());
            }
            qb.push(" ORDER BY id DESC");
            let rows: Vec<ChangeRequestRow> = qb.build_query_as().fetch_all(&self.pool).await?;
            rows.into_iter().map(TryInto::try_into).collect()
        })
    }

    fn update_change_request<'a>(
        &'a self,
        id: u64,
        update: &'a ChangeRequestUpdate,
    ) -> StoreFuture<'a, StructureChangeRequest> {
        Box::pin(async move {
            let mut tx = self.pool.begin().await?;
            let mut request = Self::fetch_change_request(&mut *tx, id, true).await?;
            if request.status != ChangeRequestStatus::Pending {
                return Err(StoreError::Conflict(format!(
                    "change request {id} is {}",
                    request.status
                )));
            }
            request.apply(update);
            request.updated_at = Utc::now();

            sqlx::query(
                r#"
                UPDATE structure_change_requests
                SET target_department_id = ?, target_position_id = ?, details = ?, reason = ?,
                    updated_at = ?
                WHERE id = ?
                "#,
            )
            .bind(request.target_department_id)
            .bind(request.target_position_id)
            .bind(&request.details)
            .bind(&request.reason)
            .bind(request.updated_at)
            .bind(id)
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;
            Ok(request)
        })
    }

    fn set_change_request_status(
        &self,
        id: u64,
        from: ChangeRequestStatus,
        to: ChangeRequestStatus,
    ) -> StoreFuture<'_, StructureChangeRequest> {
        Box::pin(async move {
            let mut tx = self.pool.begin().await?;
            let mut request = Self::fetch_change_request(&mut *tx, id, true).await?;
            if request.status != from {
                return Err(stale_request(id, request.status, from));
            }

            let now = Utc::now();
            request.status = to;
            request.updated_at = now;
            if to == ChangeRequestStatus::Submitted {
                request.submitted_at = Some(now);
            }

            sqlx::query(
                "UPDATE structure_change_requests SET status = ?, submitted_at = ?, updated_at = ? WHERE id = ? AND status = ?",
            )
            .bind(to.to_string())
            .bind(request.submitted_at)
            .bind(now)
            .bind(id)
            .bind(from.to_string())
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;
            Ok(request)
        })
    }

    fn insert_approval(
        &self,
        change_request_id: u64,
        approver_id: u64,
    ) -> StoreFuture<'_, StructureApproval> {
        Box::pin(async move {
            let mut tx = self.pool.begin().await?;
            let request = Self::fetch_change_request(&mut *tx, change_request_id, true).await?;
            if request.status != ChangeRequestStatus::Submitted {
                return Err(stale_request(
                    change_request_id,
                    request.status,
                    ChangeRequestStatus::Submitted,
                ));
            }

            let now = Utc::now();
            sqlx::query("UPDATE structure_change_requests SET status = ?, updated_at = ? WHERE id = ?")
                .bind(ChangeRequestStatus::UnderReview.to_string())
                .bind(now)
                .bind(change_request_id)
                .execute(&mut *tx)
                .await?;

            let decision = ApprovalDecision::Pending;
            let result = sqlx::query(
                "INSERT INTO structure_approvals (change_request_id, approver_id, decision, created_at) VALUES (?, ?, ?, ?)",
            )
            .bind(change_request_id)
            .bind(approver_id)
            .bind(decision.to_string())
            .bind(now)
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;
            Ok(StructureApproval {
                id: result.last_insert_id(),
                change_request_id,
                approver_id,
                decision,
                comments: None,
                decided_at: None,
                created_at: now,
            })
        })
    }

    fn get_approval(&self, id: u64) -> StoreFuture<'_, StructureApproval> {
        Box::pin(Self::fetch_approval(&self.pool, id, false))
    }

    fn list_approvals(&self, change_request_id: u64) -> StoreFuture<'_, Vec<StructureApproval>> {
        Box::pin(async move {
            let rows: Vec<ApprovalRow> = sqlx::query_as(&format!(
                "SELECT {APPROVAL_COLUMNS} FROM structure_approvals WHERE change_request_id = ? ORDER BY id"
            ))
            .bind(change_request_id)
            .fetch_all(&self.pool)
            .await?;
            rows.into_iter().map(TryInto::try_into).collect()
        })
    }

    fn decide_approval<'a>(
        &'a self,
        id: u64,
        decision: ApprovalDecision,
        comments: Option<&'a str>,
    ) -> StoreFuture<'a, StructureApproval> {
        Box::pin(async move {
            let resulting = decision.resulting_status().ok_or_else(|| {
                StoreError::ValidationFailed("decision must be approved or rejected".into())
            })?;

            let mut tx = self.pool.begin().await?;
            let mut approval = Self::fetch_approval(&mut *tx, id, true).await?;
            if approval.decision != ApprovalDecision::Pending {
                return Err(StoreError::Conflict(format!(
                    "approval {id} already {}",
                    approval.decision
                )));
            }
            let request_id = approval.change_request_id;
            let request = Self::fetch_change_request(&mut *tx, request_id, true).await?;
            if request.status != ChangeRequestStatus::UnderReview {
                return Err(stale_request(
                    request_id,
                    request.status,
                    ChangeRequestStatus::UnderReview,
                ));
            }

            let now = Utc::now();
            sqlx::query("UPDATE structure_change_requests SET status = ?, updated_at = ? WHERE id = ?")
                .bind(resulting.to_string())
                .bind(now)
                .bind(request_id)
                .execute(&mut *tx)
                .await?;
            sqlx::query(
                "UPDATE structure_approvals SET decision = ?, comments = ?, decided_at = ? WHERE id = ?",
            )
            .bind(decision.to_string())
            .bind(comments)
            .bind(now)
            .bind(id)
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;
            approval.decision = decision;
            approval.comments = comments.map(str::to_string);
            approval.decided_at = Some(now);
            Ok(approval)
        })
    }
}
