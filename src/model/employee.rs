use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use utoipa::ToSchema;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, Display, EnumString, ToSchema)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum EmployeeStatus {
    Active,
    Inactive,
    Terminated,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(
    example = json!({
        "id": 1,
        "employee_code": "EMP-001",
        "first_name": "John",
        "last_name": "Doe",
        "email": "john.doe@company.com",
        "department_id": 10,
        "position_id": 3,
        "hire_date": "2024-01-01",
        "status": "active",
        "base_salary": "12000.00",
        "allowances": "1500.00"
    })
)]
pub struct Employee {
    pub id: u64,
    pub employee_code: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub department_id: Option<u64>,
    pub position_id: Option<u64>,
    pub hire_date: NaiveDate,
    pub status: EmployeeStatus,
    pub base_salary: Decimal,
    pub allowances: Decimal,
}

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct NewEmployee {
    #[schema(example = "EMP-001")]
    pub employee_code: String,
    #[schema(example = "John")]
    pub first_name: String,
    #[schema(example = "Doe")]
    pub last_name: String,
    #[schema(example = "john@email.com", format = "email")]
    pub email: String,
    pub department_id: Option<u64>,
    pub position_id: Option<u64>,
    #[schema(example = "2026-01-01")]
    pub hire_date: NaiveDate,
    #[schema(example = "12000.00")]
    pub base_salary: Decimal,
    #[serde(default)]
    pub allowances: Decimal,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, ToSchema)]
pub struct EmployeeUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub department_id: Option<u64>,
    pub position_id: Option<u64>,
    pub status: Option<EmployeeStatus>,
    pub base_salary: Option<Decimal>,
    pub allowances: Option<Decimal>,
}

#[derive(Debug, Clone, Default)]
pub struct EmployeeFilter {
    pub department_id: Option<u64>,
    pub status: Option<EmployeeStatus>,
    pub search: Option<String>,
    pub limit: u32,
    pub offset: u32,
}

impl Employee {
    pub fn is_active(&self) -> bool {
        self.status == EmployeeStatus::Active
    }

    pub fn apply(&mut self, update: &EmployeeUpdate) {
        if let Some(v) = &update.first_name {
            self.first_name = v.clone();
        }
        if let Some(v) = &update.last_name {
            self.last_name = v.clone();
        }
        if let Some(v) = &update.email {
            self.email = v.clone();
        }
        if update.department_id.is_some() {
            self.department_id = update.department_id;
        }
        if update.position_id.is_some() {
            self.position_id = update.position_id;
        }
        if let Some(v) = update.status {
            self.status = v;
        }
        if let Some(v) = update.base_salary {
            self.base_salary = v;
        }
        if let Some(v) = update.allowances {
            self.allowances = v;
        }
    }

    pub fn matches(&self, filter: &EmployeeFilter) -> bool {
        if filter.department_id.is_some() && self.department_id != filter.department_id {
            return false;
        }
        if filter.status.is_some_and(|s| s != self.status) {
            return false;
        }
        match &filter.search {
            Some(term) => {
                let term = term.to_lowercase();
                self.first_name.to_lowercase().contains(&term)
                    || self.last_name.to_lowercase().contains(&term)
                    || self.email.to_lowercase().contains(&term)
            }
            None => true,
        }
    }
}
