use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};
use utoipa::ToSchema;

#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
    ToSchema,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    SystemAdmin,
    HrManager,
    HrEmployee,
    PayrollSpecialist,
    PayrollManager,
    FinanceStaff,
    Employee,
}

impl Role {
    pub fn is_admin(self) -> bool {
        self == Role::SystemAdmin
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use strum::IntoEnumIterator;

    #[test]
    fn role_names_match_claim_strings() {
        assert_eq!(Role::PayrollSpecialist.to_string(), "PAYROLL_SPECIALIST");
        assert_eq!(Role::from_str("HR_MANAGER").unwrap(), Role::HrManager);
        assert!(Role::from_str("hr manager").is_err());
    }

    #[test]
    fn serde_and_strum_agree() {
        for role in Role::iter() {
            let json = serde_json::to_string(&role).unwrap();
            assert_eq!(json, format!("\"{role}\""));
        }
    }
}
