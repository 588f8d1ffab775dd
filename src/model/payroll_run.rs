//! Payroll run lifecycle.
//!
//! A run is created when a payroll specialist proposes a period and is then
//! driven through the workflow below. Every edge is checked here before the
//! store is asked to compare-and-set the persisted status.
//!
//! ```text
//! PERIOD_PROPOSED -> PERIOD_APPROVED -> DRAFT -> APPROVED -> DEDUCTIONS_APPLIED
//!        |                                |                        |
//!        v                                v                        v
//! PERIOD_REJECTED                     REJECTED            PAYSLIPS_GENERATED <-> LOCKED -> PAID
//! ```

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use thiserror::Error;
use utoipa::ToSchema;

use crate::model::money::{AmountOutOfRange, bounded, max_total, sum_money};
use crate::model::statutory::StatutoryBreakdown;

#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize, Display, EnumString, ToSchema,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    PeriodProposed,
    PeriodApproved,
    PeriodRejected,
    Draft,
    Approved,
    Rejected,
    DeductionsApplied,
    PayslipsGenerated,
    Locked,
    Paid,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RunAction {
    ApprovePeriod,
    RejectPeriod,
    Initiate,
    ApproveRun,
    RejectRun,
    ApplyDeductions,
    GeneratePayslips,
    Lock,
    Unlock,
    MarkPaid,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot {action} a payroll run in status {from}")]
pub struct InvalidTransition {
    pub from: RunStatus,
    pub action: RunAction,
}

impl RunStatus {
    pub fn next(self, action: RunAction) -> Result<RunStatus, InvalidTransition> {
        use RunAction as A;
        use RunStatus as S;

        let to = match (self, action) {
            (S::PeriodProposed, A::ApprovePeriod) => S::PeriodApproved,
            (S::PeriodProposed, A::RejectPeriod) => S::PeriodRejected,
            (S::PeriodApproved, A::Initiate) => S::Draft,
            (S::Draft, A::ApproveRun) => S::Approved,
            (S::Draft, A::RejectRun) => S::Rejected,
            (S::Approved, A::ApplyDeductions) => S::DeductionsApplied,
            (S::DeductionsApplied, A::GeneratePayslips) => S::PayslipsGenerated,
            (S::PayslipsGenerated, A::Lock) => S::Locked,
            (S::Locked, A::Unlock) => S::PayslipsGenerated,
            (S::Locked, A::MarkPaid) => S::Paid,
            (from, action) => return Err(InvalidTransition { from, action }),
        };
        Ok(to)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RunStatus::PeriodRejected | RunStatus::Rejected | RunStatus::Paid)
    }

    /// Rejected runs release their `(period, entity)` slot.
    pub fn releases_period(self) -> bool {
        matches!(self, RunStatus::PeriodRejected | RunStatus::Rejected)
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Default, Deserialize, Serialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PeriodPolicy {
    /// Silently move any day of the month to the first.
    #[default]
    Coerce,
    /// Refuse periods that are not the first of a month.
    Reject,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("payroll period {0} must be the first day of a month")]
pub struct PeriodNotFirstOfMonth(pub NaiveDate);

pub fn first_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

pub fn normalize_period(
    date: NaiveDate,
    policy: PeriodPolicy,
) -> Result<NaiveDate, PeriodNotFirstOfMonth> {
    let first = first_of_month(date);
    if first != date && policy == PeriodPolicy::Reject {
        return Err(PeriodNotFirstOfMonth(date));
    }
    Ok(first)
}

/// Key that makes at most one live run per period and entity.
/// Entity names compare trimmed and case-insensitively.
pub fn entity_key(entity: &str) -> String {
    entity.trim().to_lowercase()
}

pub fn period_key(period: NaiveDate, entity: &str) -> String {
    format!("{}|{}", period.format("%Y-%m"), entity_key(entity))
}

pub fn new_run_id(period: NaiveDate) -> String {
    let suffix = uuid::Uuid::new_v4().to_string()[..8].to_uppercase();
    format!("PR-{}-{}", period.format("%Y%m"), suffix)
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "run_id": "PR-202502-9F1C2A7B",
    "payroll_period": "2025-02-01",
    "entity": "Acme Egypt",
    "currency": "EGP",
    "status": "DRAFT",
    "employees": 42,
    "total_gross_pay": "560000.00",
    "total_deductions": "0",
    "total_net_pay": "560000.00",
    "payroll_specialist_id": 7,
    "payroll_manager_id": 9,
    "rejection_reason": null,
    "unlock_reason": null,
    "created_at": "2025-02-15T09:00:00Z",
    "updated_at": "2025-02-15T09:30:00Z"
}))]
pub struct PayrollRun {
    pub run_id: String,
    pub payroll_period: NaiveDate,
    pub entity: String,
    pub currency: String,
    pub status: RunStatus,
    pub employees: u32,
    pub total_gross_pay: Decimal,
    pub total_deductions: Decimal,
    pub total_net_pay: Decimal,
    pub payroll_specialist_id: u64,
    pub payroll_manager_id: Option<u64>,
    pub rejection_reason: Option<String>,
    pub unlock_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewRun {
    pub run_id: String,
    pub payroll_period: NaiveDate,
    pub entity: String,
    pub currency: String,
    pub payroll_specialist_id: u64,
    pub payroll_manager_id: Option<u64>,
}

#[derive(Debug, Clone, Default)]
pub struct RunFilter {
    pub status: Option<RunStatus>,
    pub entity: Option<String>,
}

/// One employee's line inside a run, from draft to payslip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct RunEntry {
    pub run_id: String,
    pub employee_id: u64,
    pub base_salary: Decimal,
    pub allowances: Decimal,
    pub bonuses: Decimal,
    pub benefits: Decimal,
    pub refunds: Decimal,
    pub taxes: Decimal,
    pub insurance: Decimal,
    pub penalties: Decimal,
    pub gross_pay: Decimal,
    pub total_deductions: Decimal,
    pub net_pay: Decimal,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, ToSchema)]
pub struct EntryAdjustment {
    pub bonuses: Option<Decimal>,
    pub benefits: Option<Decimal>,
    pub refunds: Option<Decimal>,
    pub penalties: Option<Decimal>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RunTotals {
    pub employees: u32,
    pub total_gross_pay: Decimal,
    pub total_deductions: Decimal,
    pub total_net_pay: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RunTransitionRecord {
    pub id: u64,
    pub run_id: String,
    pub from_status: Option<RunStatus>,
    pub to_status: RunStatus,
    pub actor_id: u64,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl RunEntry {
    pub fn draft(
        run_id: &str,
        employee_id: u64,
        base_salary: Decimal,
        allowances: Decimal,
    ) -> Result<Self, AmountOutOfRange> {
        let mut entry = RunEntry {
            run_id: run_id.to_string(),
            employee_id,
            base_salary,
            allowances,
            bonuses: Decimal::ZERO,
            benefits: Decimal::ZERO,
            refunds: Decimal::ZERO,
            taxes: Decimal::ZERO,
            insurance: Decimal::ZERO,
            penalties: Decimal::ZERO,
            gross_pay: Decimal::ZERO,
            total_deductions: Decimal::ZERO,
            net_pay: Decimal::ZERO,
        };
        entry.recompute()?;
        Ok(entry)
    }

    /// `gross = base + allowances + bonuses + benefits + refunds`,
    /// `deductions = taxes + insurance + penalties`, `net = gross - deductions`.
    /// Leaves the entry untouched when any figure leaves the money range.
    pub fn recompute(&mut self) -> Result<(), AmountOutOfRange> {
        let gross_pay = sum_money([
            self.base_salary,
            self.allowances,
            self.bonuses,
            self.benefits,
            self.refunds,
        ])?;
        let total_deductions = sum_money([self.taxes, self.insurance, self.penalties])?;
        let net_pay = sum_money([gross_pay, -total_deductions])?;
        self.gross_pay = gross_pay;
        self.total_deductions = total_deductions;
        self.net_pay = net_pay;
        Ok(())
    }

    /// The entry with `adjustment` applied; `self` is not modified.
    pub fn adjusted(&self, adjustment: &EntryAdjustment) -> Result<Self, AmountOutOfRange> {
        let mut next = self.clone();
        if let Some(v) = adjustment.bonuses {
            next.bonuses = v;
        }
        if let Some(v) = adjustment.benefits {
            next.benefits = v;
        }
        if let Some(v) = adjustment.refunds {
            next.refunds = v;
        }
        if let Some(v) = adjustment.penalties {
            next.penalties = v;
        }
        next.recompute()?;
        Ok(next)
    }

    pub fn apply_statutory(&mut self, breakdown: &StatutoryBreakdown) -> Result<(), AmountOutOfRange> {
        let mut next = self.clone();
        next.taxes = breakdown.taxes;
        next.insurance = breakdown.insurance;
        next.recompute()?;
        *self = next;
        Ok(())
    }
}

impl EntryAdjustment {
    /// Each supplied amount with its field name.
    pub fn amounts(&self) -> impl Iterator<Item = (&'static str, Decimal)> {
        [
            ("bonuses", self.bonuses),
            ("benefits", self.benefits),
            ("refunds", self.refunds),
            ("penalties", self.penalties),
        ]
        .into_iter()
        .filter_map(|(field, v)| v.map(|v| (field, v)))
    }
}

impl RunTotals {
    pub fn from_entries(entries: &[RunEntry]) -> Result<Self, AmountOutOfRange> {
        let sum = |pick: fn(&RunEntry) -> Decimal| {
            entries
                .iter()
                .try_fold(Decimal::ZERO, |acc, e| acc.checked_add(pick(e)))
                .ok_or(AmountOutOfRange)
                .and_then(|total| bounded(total, max_total()))
        };
        Ok(RunTotals {
            employees: u32::try_from(entries.len()).map_err(|_| AmountOutOfRange)?,
            total_gross_pay: sum(|e| e.gross_pay)?,
            total_deductions: sum(|e| e.total_deductions)?,
            total_net_pay: sum(|e| e.net_pay)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn any_day_coerces_to_first_of_month() {
        for day in 1..=28 {
            let got = normalize_period(date(2025, 2, day), PeriodPolicy::Coerce).unwrap();
            assert_eq!(got, date(2025, 2, 1));
        }
        assert_eq!(
            normalize_period(date(2024, 12, 31), PeriodPolicy::Coerce).unwrap(),
            date(2024, 12, 1)
        );
    }

    #[test]
    fn coercion_is_idempotent() {
        let once = normalize_period(date(2025, 2, 15), PeriodPolicy::Coerce).unwrap();
        let twice = normalize_period(once, PeriodPolicy::Coerce).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn reject_policy_refuses_mid_month() {
        assert_eq!(
            normalize_period(date(2025, 2, 15), PeriodPolicy::Reject),
            Err(PeriodNotFirstOfMonth(date(2025, 2, 15)))
        );
        assert!(normalize_period(date(2025, 2, 1), PeriodPolicy::Reject).is_ok());
    }

    #[test]
    fn happy_path_walks_every_state() {
        let path = [
            RunAction::ApprovePeriod,
            RunAction::Initiate,
            RunAction::ApproveRun,
            RunAction::ApplyDeductions,
            RunAction::GeneratePayslips,
            RunAction::Lock,
            RunAction::MarkPaid,
        ];
        let end = path
            .iter()
            .try_fold(RunStatus::PeriodProposed, |s, a| s.next(*a))
            .unwrap();
        assert_eq!(end, RunStatus::Paid);
        assert!(end.is_terminal());
    }

    #[test]
    fn draft_cannot_skip_review() {
        let err = RunStatus::Draft.next(RunAction::ApplyDeductions).unwrap_err();
        assert_eq!(err.from, RunStatus::Draft);
        assert_eq!(err.to_string(), "cannot apply_deductions a payroll run in status DRAFT");
    }

    #[test]
    fn initiation_requires_approved_period() {
        assert!(RunStatus::PeriodProposed.next(RunAction::Initiate).is_err());
        assert!(RunStatus::PeriodRejected.next(RunAction::Initiate).is_err());
        assert_eq!(
            RunStatus::PeriodApproved.next(RunAction::Initiate),
            Ok(RunStatus::Draft)
        );
    }

    #[test]
    fn unlock_returns_to_generated() {
        assert_eq!(
            RunStatus::Locked.next(RunAction::Unlock),
            Ok(RunStatus::PayslipsGenerated)
        );
        assert!(RunStatus::Paid.next(RunAction::Unlock).is_err());
    }

    #[test]
    fn entity_key_trims_and_folds_case() {
        assert_eq!(entity_key("  Acme Egypt "), "acme egypt");
        assert_eq!(entity_key("ÉLAN"), entity_key("élan"));
    }

    #[test]
    fn period_key_ignores_day_and_case() {
        assert_eq!(
            period_key(date(2025, 2, 1), " Acme "),
            period_key(date(2025, 2, 1), "acme")
        );
    }

    #[test]
    fn entry_math() {
        let entry = RunEntry::draft("PR-1", 1, dec("12000"), dec("1500")).unwrap();
        assert_eq!(entry.gross_pay, dec("13500"));
        assert_eq!(entry.net_pay, dec("13500"));

        let mut entry = entry
            .adjusted(&EntryAdjustment {
                bonuses: Some(dec("500")),
                penalties: Some(dec("100")),
                ..EntryAdjustment::default()
            })
            .unwrap();
        entry
            .apply_statutory(&StatutoryBreakdown {
                taxes: dec("1200"),
                insurance: dec("1320"),
                total: dec("2520"),
                applied_rules: vec![],
            })
            .unwrap();

        assert_eq!(entry.gross_pay, dec("14000"));
        assert_eq!(entry.total_deductions, dec("2620"));
        assert_eq!(entry.net_pay, dec("11380"));

        let totals = RunTotals::from_entries(&[entry.clone(), entry]).unwrap();
        assert_eq!(totals.employees, 2);
        assert_eq!(totals.total_net_pay, dec("22760"));
    }

    #[test]
    fn oversized_adjustment_leaves_entry_unchanged() {
        let entry = RunEntry::draft("PR-1", 1, dec("12000"), dec("0")).unwrap();
        let huge = EntryAdjustment {
            bonuses: Some(Decimal::MAX),
            ..EntryAdjustment::default()
        };
        assert_eq!(entry.adjusted(&huge), Err(AmountOutOfRange));

        let near_limit = EntryAdjustment {
            bonuses: Some(dec("999999999999.99")),
            ..EntryAdjustment::default()
        };
        assert_eq!(entry.adjusted(&near_limit), Err(AmountOutOfRange));
        assert_eq!(entry.gross_pay, dec("12000"));
    }

    #[test]
    fn totals_refuse_overflow() {
        let mut entry = RunEntry::draft("PR-1", 1, dec("999999999999.99"), dec("0")).unwrap();
        entry.net_pay = Decimal::MAX;
        assert_eq!(RunTotals::from_entries(&[entry.clone(), entry]), Err(AmountOutOfRange));
    }
}
