use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::{FromRow, MySql, QueryBuilder};

use crate::error::{StoreError, StoreResult};
use crate::model::employee::{Employee, EmployeeFilter, EmployeeStatus, EmployeeUpdate, NewEmployee};
use crate::store::{EmployeeStore, StoreFuture};

use super::{MySqlStore, expect_row, like_pattern, parse};

const EMPLOYEE_COLUMNS: &str = "id, employee_code, first_name, last_name, email, department_id, \
     position_id, hire_date, status, base_salary, allowances";

#[derive(FromRow)]
struct EmployeeRow {
    id: u64,
    employee_code: String,
    first_name: String,
    last_name: String,
    email: String,
    department_id: Option<u64>,
    position_id: Option<u64>,
    hire_date: NaiveDate,
    status: String,
    base_salary: Decimal,
    allowances: Decimal,
}

impl TryFrom<EmployeeRow> for Employee {
    type Error = StoreError;

    fn try_from(row: EmployeeRow) -> StoreResult<Self> {
        Ok(Employee {
            id: row.id,
            employee_code: row.employee_code,
            first_name: row.first_name,
            last_name: row.last_name,
            email: row.email,
            department_id: row.department_id,
            position_id: row.position_id,
            hire_date: row.hire_date,
            status: parse(&row.status)?,
            base_salary: row.base_salary,
            allowances: row.allowances,
        })
    }
}

fn push_filters(qb: &mut QueryBuilder<'_, MySql>, filter: &EmployeeFilter) {
    qb.push(" WHERE 1 = 1");
    if let Some(department_id) = filter.department_id {
        qb.push(" AND department_id = ").push_bind(department_id);
    }
    if let Some(status) = filter.status {
        qb.push(" AND status = ").push_bind(status.to_string());
    }
    if let Some(term) = &filter.search {
        let pattern = like_pattern(term);
        qb.push(" AND (first_name LIKE ")
            .push_bind(pattern.clone())
            .push(" OR last_name LIKE ")
            .push_bind(pattern.clone())
            .push(" OR email LIKE ")
            .push_bind(pattern)
            .push(")");
    }
}

impl MySqlStore {
    async fn fetch_employee<'e, E>(executor: E, id: u64) -> StoreResult<Employee>
    where
        E: sqlx::Executor<'e, Database = MySql>,
    {
        let row: Option<EmployeeRow> =
            sqlx::query_as(&format!("SELECT {EMPLOYEE_COLUMNS} FROM employees WHERE id = ?"))
                .bind(id)
                .fetch_optional(executor)
                .await?;
        row.ok_or_else(|| StoreError::not_found("employee", id))?
            .try_into()
    }
}

impl EmployeeStore for MySqlStore {
    fn insert_employee<'a>(&'a self, employee: &'a NewEmployee) -> StoreFuture<'a, Employee> {
        Box::pin(async move {
            let result = sqlx::query(
                r#"
                INSERT INTO employees
                (employee_code, first_name, last_name, email, department_id, position_id,
                 hire_date, status, base_salary, allowances)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&employee.employee_code)
            .bind(&employee.first_name)
            .bind(&employee.last_name)
            .bind(&employee.email)
            .bind(employee.department_id)
            .bind(employee.position_id)
            .bind(employee.hire_date)
            .bind(EmployeeStatus::Active.to_string())
            .bind(employee.base_salary)
            .bind(employee.allowances)
            .execute(&self.pool)
            .await?;

            Ok(Employee {
                id: result.last_insert_id(),
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
            })
        })
    }

    fn get_employee(&self, id: u64) -> StoreFuture<'_, Employee> {
        Box::pin(Self::fetch_employee(&self.pool, id))
    }

    fn list_employees<'a>(
        &'a self,
        filter: &'a EmployeeFilter,
    ) -> StoreFuture<'a, (Vec<Employee>, u64)> {
        Box::pin(async move {
            let mut count = QueryBuilder::<MySql>::new("SELECT COUNT(*) FROM employees");
            push_filters(&mut count, filter);
            let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

            let mut page = QueryBuilder::<MySql>::new(format!(
                "SELECT {EMPLOYEE_COLUMNS} FROM employees"
            ));
            push_filters(&mut page, filter);
            page.push(" ORDER BY id DESC LIMIT ")
                .push_bind(filter.limit)
                .push(" OFFSET ")
                .push_bind(filter.offset);
            let rows: Vec<EmployeeRow> = page.build_query_as().fetch_all(&self.pool).await?;

            let employees = rows
                .into_iter()
                .map(Employee::try_from)
                .collect::<StoreResult<Vec<_>>>()?;
            Ok((employees, total.max(0) as u64))
        })
    }

    fn update_employee<'a>(
        &'a self,
        id: u64,
        update: &'a EmployeeUpdate,
    ) -> StoreFuture<'a, Employee> {
        Box::pin(async move {
            let mut tx = self.pool.begin().await?;
            let mut employee = Self::fetch_employee(&mut *tx, id).await?;
            employee.apply(update);

            let result = sqlx::query(
                r#"
                UPDATE employees
                SET first_name = ?, last_name = ?, email = ?, department_id = ?, position_id = ?,
                    status = ?, base_salary = ?, allowances = ?
                WHERE id = ?
                "#,
            )
            .bind(&employee.first_name)
            .bind(&employee.last_name)
            .bind(&employee.email)
            .bind(employee.department_id)
            .bind(employee.position_id)
            .bind(employee.status.to_string())
            .bind(employee.base_salary)
            .bind(employee.allowances)
            .bind(id)
            .execute(&mut *tx)
            .await?;
            expect_row(result, "employee", id)?;

            tx.commit().await?;
            Ok(employee)
        })
    }

    fn list_active_employees(&self) -> StoreFuture<'_, Vec<Employee>> {
        Box::pin(async move {
            let rows: Vec<EmployeeRow> = sqlx::query_as(&format!(
                "SELECT {EMPLOYEE_COLUMNS} FROM employees WHERE status = ? ORDER BY id"
            ))
            .bind(EmployeeStatus::Active.to_string())
            .fetch_all(&self.pool)
            .await?;
            rows.into_iter().map(Employee::try_from).collect()
        })
    }
}
