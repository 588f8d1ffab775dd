//! Who may do what.
//!
//! One static grant table keyed by `(Role, Resource, Action)`. Handlers ask
//! once, through [`AuthUser::authorize`](crate::auth::AuthUser::authorize),
//! before touching the store. `SYSTEM_ADMIN` is allowed everything and is not
//! listed.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use strum::Display;

use crate::model::role::Role;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Display)]
#[strum(serialize_all = "snake_case")]
pub enum Resource {
    /// Departments, positions and assignments.
    OrgStructure,
    ChangeRequest,
    StructureApproval,
    Employee,
    /// Overtime and lateness rules.
    WorkRule,
    Holiday,
    /// Tax rules and insurance brackets.
    StatutoryConfig,
    PayrollRun,
    Payslip,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Display)]
#[strum(serialize_all = "snake_case")]
pub enum Action {
    Read,
    /// Read only records that belong to the caller's employee profile.
    ReadOwn,
    Create,
    Update,
    Delete,
    Submit,
    Approve,
    /// Run a computation step of the payroll workflow.
    Execute,
    /// Release payment.
    Settle,
}

const ALL: &[Action] = &[
    Action::Read,
    Action::Create,
    Action::Update,
    Action::Delete,
    Action::Submit,
    Action::Approve,
];

fn grants() -> Vec<(Role, Resource, &'static [Action])> {
    use Action::*;
    use Resource::*;
    use Role as R;

    vec![
        (R::HrManager, OrgStructure, ALL),
        (R::HrManager, ChangeRequest, ALL),
        (R::HrManager, StructureApproval, ALL),
        (R::HrManager, Employee, ALL),
        (R::HrManager, WorkRule, ALL),
        (R::HrManager, Holiday, ALL),
        (R::HrManager, StatutoryConfig, &[Read]),
        (R::HrManager, Payslip, &[ReadOwn]),
        (R::HrEmployee, OrgStructure, &[Read]),
        (R::HrEmployee, ChangeRequest, &[Read, Create, Update, Submit, Delete]),
        (R::HrEmployee, StructureApproval, &[Read]),
        (R::HrEmployee, Employee, &[Read, Create, Update]),
        (R::HrEmployee, WorkRule, &[Read]),
        (R::HrEmployee, Holiday, &[Read]),
        (R::HrEmployee, Payslip, &[ReadOwn]),
        (R::PayrollSpecialist, Employee, &[Read]),
        (R::PayrollSpecialist, WorkRule, &[Read, Create, Update]),
        (R::PayrollSpecialist, Holiday, &[Read]),
        (R::PayrollSpecialist, StatutoryConfig, &[Read, Create]),
        (R::PayrollSpecialist, PayrollRun, &[Read, Create, Update, Execute]),
        (R::PayrollSpecialist, Payslip, &[Read]),
        (R::PayrollManager, Employee, &[Read]),
        (R::PayrollManager, WorkRule, &[Read, Approve]),
        (R::PayrollManager, Holiday, &[Read]),
        (R::PayrollManager, StatutoryConfig, &[Read, Approve]),
        (R::PayrollManager, PayrollRun, &[Read, Approve]),
        (R::PayrollManager, Payslip, &[Read]),
        (R::FinanceStaff, PayrollRun, &[Read, Settle]),
        (R::FinanceStaff, Payslip, &[Read]),
        (R::Employee, OrgStructure, &[Read]),
        (R::Employee, Holiday, &[Read]),
        (R::Employee, Payslip, &[ReadOwn]),
    ]
}

static POLICY: Lazy<HashSet<(Role, Resource, Action)>> = Lazy::new(|| {
    grants()
        .into_iter()
        .flat_map(|(role, resource, actions)| {
            actions.iter().map(move |action| (role, resource, *action))
        })
        .collect()
});

pub fn is_allowed(role: Role, resource: Resource, action: Action) -> bool {
    role.is_admin() || POLICY.contains(&(role, resource, action))
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn admin_is_allowed_everything() {
        assert!(is_allowed(Role::SystemAdmin, Resource::PayrollRun, Action::Settle));
        assert!(is_allowed(Role::SystemAdmin, Resource::OrgStructure, Action::Delete));
    }

    #[test]
    fn payroll_duties_are_split() {
        assert!(is_allowed(Role::PayrollSpecialist, Resource::PayrollRun, Action::Create));
        assert!(!is_allowed(Role::PayrollSpecialist, Resource::PayrollRun, Action::Approve));
        assert!(is_allowed(Role::PayrollManager, Resource::PayrollRun, Action::Approve));
        assert!(!is_allowed(Role::PayrollManager, Resource::PayrollRun, Action::Settle));
        assert!(is_allowed(Role::FinanceStaff, Resource::PayrollRun, Action::Settle));
        assert!(!is_allowed(Role::FinanceStaff, Resource::PayrollRun, Action::Execute));
    }

    #[test]
    fn employees_only_see_their_own_payslips() {
        assert!(is_allowed(Role::Employee, Resource::Payslip, Action::ReadOwn));
        assert!(!is_allowed(Role::Employee, Resource::Payslip, Action::Read));
        assert!(!is_allowed(Role::Employee, Resource::PayrollRun, Action::Read));
    }

    #[test]
    fn every_role_can_do_something() {
        for role in Role::iter() {
            assert!(
                POLICY.iter().any(|(r, _, _)| *r == role) || role.is_admin(),
                "{role} has no grants"
            );
        }
    }
}
