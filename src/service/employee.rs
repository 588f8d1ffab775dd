use rust_decimal::Decimal;
use tracing::info;

use crate::error::{AppError, StoreError};
use crate::model::employee::{Employee, EmployeeFilter, EmployeeUpdate, NewEmployee};
use crate::store::Store;

use super::{amount, referenced, required};

fn check_compensation(base_salary: Option<Decimal>, allowances: Option<Decimal>) -> Result<(), AppError> {
    if let Some(v) = base_salary {
        amount(v, "base_salary")?;
    }
    if let Some(v) = allowances {
        amount(v, "allowances")?;
    }
    Ok(())
}

fn duplicate_employee(err: StoreError) -> AppError {
    match err {
        StoreError::DuplicateKey(_) => {
            AppError::DuplicateKey("employee code or email already exists".into())
        }
        other => other.into(),
    }
}

pub async fn create_employee(store: &dyn Store, input: &NewEmployee) -> Result<Employee, AppError> {
    required(&input.employee_code, "employee_code")?;
    required(&input.first_name, "first_name")?;
    required(&input.email, "email")?;
    if !input.email.contains('@') {
        return Err(AppError::Validation("email is not valid".into()));
    }
    check_compensation(Some(input.base_salary), Some(input.allowances))?;
    if let Some(dept) = input.department_id {
        referenced(store.get_department(dept), "department", dept).await?;
    }
    if let Some(position) = input.position_id {
        referenced(store.get_position(position), "position", position).await?;
    }

    let employee = store
        .insert_employee(input)
        .await
        .map_err(duplicate_employee)?;
    info!(employee_id = employee.id, code = %employee.employee_code, "Employee created");
    Ok(employee)
}

pub async fn get_employee(store: &dyn Store, id: u64) -> Result<Employee, AppError> {
    Ok(store.get_employee(id).await?)
}

pub async fn list_employees(
    store: &dyn Store,
    filter: &EmployeeFilter,
) -> Result<(Vec<Employee>, u64), AppError> {
    Ok(store.list_employees(filter).await?)
}

pub async fn update_employee(
    store: &dyn Store,
    id: u64,
    update: &EmployeeUpdate,
) -> Result<Employee, AppError> {
    check_compensation(update.base_salary, update.allowances)?;
    if let Some(email) = &update.email {
        if !email.contains('@') {
            return Err(AppError::Validation("email is not valid".into()));
        }
    }
    store
        .update_employee(id, update)
        .await
        .map_err(duplicate_employee)
}
