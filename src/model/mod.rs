pub mod change_request;
pub mod department;
pub mod employee;
pub mod money;
pub mod payroll_run;
pub mod payslip;
pub mod policy;
pub mod role;
pub mod statutory;
pub mod user;
