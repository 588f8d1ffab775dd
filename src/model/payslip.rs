use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use utoipa::ToSchema;

use crate::model::payroll_run::RunEntry;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, Display, EnumString, ToSchema)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Paid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct EarningsDetails {
    pub base_salary: Decimal,
    pub allowances: Decimal,
    pub bonuses: Decimal,
    pub benefits: Decimal,
    pub refunds: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct DeductionsDetails {
    pub taxes: Decimal,
    pub insurances: Decimal,
    pub penalties: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Payslip {
    pub id: u64,
    pub employee_id: u64,
    pub payroll_run_id: String,
    pub earnings_details: EarningsDetails,
    pub deductions_details: DeductionsDetails,
    pub total_gross_salary: Decimal,
    pub total_deductions: Decimal,
    pub net_pay: Decimal,
    pub payment_status: PaymentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewPayslip {
    pub employee_id: u64,
    pub payroll_run_id: String,
    pub earnings_details: EarningsDetails,
    pub deductions_details: DeductionsDetails,
    pub total_gross_salary: Decimal,
    pub total_deductions: Decimal,
    pub net_pay: Decimal,
}

#[derive(Debug, Clone, Default)]
pub struct PayslipFilter {
    pub payroll_run_id: Option<String>,
    pub employee_id: Option<u64>,
}

impl From<&RunEntry> for NewPayslip {
    fn from(entry: &RunEntry) -> Self {
        NewPayslip {
            employee_id: entry.employee_id,
            payroll_run_id: entry.run_id.clone(),
            earnings_details: EarningsDetails {
                base_salary: entry.base_salary,
                allowances: entry.allowances,
                bonuses: entry.bonuses,
                benefits: entry.benefits,
                refunds: entry.refunds,
            },
            deductions_details: DeductionsDetails {
                taxes: entry.taxes,
                insurances: entry.insurance,
                penalties: entry.penalties,
            },
            total_gross_salary: entry.gross_pay,
            total_deductions: entry.total_deductions,
            net_pay: entry.net_pay,
        }
    }
}

impl PayslipFilter {
    pub fn matches(&self, payslip: &Payslip) -> bool {
        self.payroll_run_id
            .as_ref()
            .is_none_or(|run| &payslip.payroll_run_id == run)
            && self.employee_id.is_none_or(|e| payslip.employee_id == e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payslip_fields_keep_their_wire_names() {
        let entry = RunEntry::draft("PR-1", 3, Decimal::new(1_000_000, 2), Decimal::ZERO).unwrap();
        let new = NewPayslip::from(&entry);
        let now = Utc::now();
        let payslip = Payslip {
            id: 1,
            employee_id: new.employee_id,
            payroll_run_id: new.payroll_run_id,
            earnings_details: new.earnings_details,
            deductions_details: new.deductions_details,
            total_gross_salary: new.total_gross_salary,
            total_deductions: new.total_deductions,
            net_pay: new.net_pay,
            payment_status: PaymentStatus::Pending,
            created_at: now,
            updated_at: now,
        };

        let json = serde_json::to_value(&payslip).unwrap();
        for key in ["total_gross_salary", "total_deductions", "net_pay"] {
            assert!(json.get(key).is_some(), "missing {key}");
        }
        assert!(json["deductions_details"].get("insurances").is_some());
        assert_eq!(json["payment_status"], "pending");
    }
}
