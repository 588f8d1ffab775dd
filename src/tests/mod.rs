mod helpers;

mod auth_tests;
mod organization_tests;
mod payroll_workflow_tests;
mod policy_config_tests;
mod statutory_tests;
