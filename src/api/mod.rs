pub mod employee;
pub mod organization;
pub mod payroll;
pub mod policy_config;
pub mod statutory;
