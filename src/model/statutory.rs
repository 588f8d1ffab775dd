use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use utoipa::ToSchema;

use crate::model::money::{AmountOutOfRange, max_amount, percent_of, sum_money};

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, Display, EnumString, ToSchema)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ConfigStatus {
    Draft,
    Approved,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TaxRule {
    pub id: u64,
    #[schema(example = "Income tax band 2")]
    pub name: String,
    pub description: Option<String>,
    /// Percentage of base salary, e.g. `10` for 10%.
    #[schema(example = "10")]
    pub rate: Decimal,
    pub min_salary: Decimal,
    pub max_salary: Option<Decimal>,
    pub status: ConfigStatus,
    pub created_by: u64,
    pub approved_by: Option<u64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct NewTaxRule {
    pub name: String,
    pub description: Option<String>,
    pub rate: Decimal,
    #[serde(default)]
    pub min_salary: Decimal,
    pub max_salary: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct InsuranceBracket {
    pub id: u64,
    #[schema(example = "Social insurance")]
    pub name: String,
    pub min_salary: Decimal,
    pub max_salary: Option<Decimal>,
    #[schema(example = "11")]
    pub employee_rate: Decimal,
    #[schema(example = "18.75")]
    pub employer_rate: Decimal,
    pub status: ConfigStatus,
    pub created_by: u64,
    pub approved_by: Option<u64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct NewInsuranceBracket {
    pub name: String,
    #[serde(default)]
    pub min_salary: Decimal,
    pub max_salary: Option<Decimal>,
    pub employee_rate: Decimal,
    #[serde(default)]
    pub employer_rate: Decimal,
}

/// Approved brackets read in one go, so a whole run is computed against the
/// same configuration.
#[derive(Debug, Clone, Default)]
pub struct StatutorySnapshot {
    pub tax_rules: Vec<TaxRule>,
    pub insurance_brackets: Vec<InsuranceBracket>,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    Tax,
    Insurance,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AppliedRule {
    pub kind: RuleKind,
    pub rule_id: u64,
    pub name: String,
    pub rate: Decimal,
    pub amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "taxes": "1200",
    "insurance": "1320",
    "total": "2520",
    "applied_rules": []
}))]
pub struct StatutoryBreakdown {
    pub taxes: Decimal,
    pub insurance: Decimal,
    pub total: Decimal,
    pub applied_rules: Vec<AppliedRule>,
}

fn in_range(salary: Decimal, min: Decimal, max: Option<Decimal>) -> bool {
    salary >= min && max.is_none_or(|max| salary <= max)
}

impl TaxRule {
    pub fn covers(&self, salary: Decimal) -> bool {
        in_range(salary, self.min_salary, self.max_salary)
    }
}

impl InsuranceBracket {
    pub fn covers(&self, salary: Decimal) -> bool {
        in_range(salary, self.min_salary, self.max_salary)
    }
}

pub fn valid_bounds(min: Decimal, max: Option<Decimal>) -> bool {
    min >= Decimal::ZERO
        && min <= max_amount()
        && max.is_none_or(|max| max >= min && max <= max_amount())
}

/// Rates are percentages.
pub fn valid_rate(rate: Decimal) -> bool {
    rate >= Decimal::ZERO && rate <= Decimal::ONE_HUNDRED
}

impl StatutorySnapshot {
    /// Statutory deductions on `base_salary`. Only approved entries count, even
    /// if the snapshot was built from a wider list.
    pub fn compute(&self, base_salary: Decimal) -> Result<StatutoryBreakdown, AmountOutOfRange> {
        let mut applied = Vec::new();

        for rule in self
            .tax_rules
            .iter()
            .filter(|r| r.status == ConfigStatus::Approved && r.covers(base_salary))
        {
            applied.push(AppliedRule {
                kind: RuleKind::Tax,
                rule_id: rule.id,
                name: rule.name.clone(),
                rate: rule.rate,
                amount: percent_of(base_salary, rule.rate)?,
            });
        }

        for bracket in self
            .insurance_brackets
            .iter()
            .filter(|b| b.status == ConfigStatus::Approved && b.covers(base_salary))
        {
            applied.push(AppliedRule {
                kind: RuleKind::Insurance,
                rule_id: bracket.id,
                name: bracket.name.clone(),
                rate: bracket.employee_rate,
                amount: percent_of(base_salary, bracket.employee_rate)?,
            });
        }

        let of_kind = |kind: RuleKind| {
            sum_money(applied.iter().filter(|r| r.kind == kind).map(|r| r.amount))
        };
        let taxes = of_kind(RuleKind::Tax)?;
        let insurance = of_kind(RuleKind::Insurance)?;
        Ok(StatutoryBreakdown {
            taxes,
            insurance,
            total: sum_money([taxes, insurance])?,
            applied_rules: applied,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn tax(id: u64, rate: &str, min: &str, max: Option<&str>, status: ConfigStatus) -> TaxRule {
        let now = Utc::now();
        TaxRule {
            id,
            name: format!("tax-{id}"),
            description: None,
            rate: d(rate),
            min_salary: d(min),
            max_salary: max.map(d),
            status,
            created_by: 1,
            approved_by: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn insurance(id: u64, rate: &str, min: &str, max: Option<&str>) -> InsuranceBracket {
        let now = Utc::now();
        InsuranceBracket {
            id,
            name: format!("ins-{id}"),
            min_salary: d(min),
            max_salary: max.map(d),
            employee_rate: d(rate),
            employer_rate: d("18.75"),
            status: ConfigStatus::Approved,
            created_by: 1,
            approved_by: Some(1),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn sums_matching_approved_brackets() {
        let snapshot = StatutorySnapshot {
            tax_rules: vec![
                tax(1, "10", "0", Some("20000"), ConfigStatus::Approved),
                tax(2, "22.5", "20000.01", None, ConfigStatus::Approved),
                tax(3, "50", "0", None, ConfigStatus::Draft),
            ],
            insurance_brackets: vec![insurance(1, "11", "2000", Some("14000"))],
        };

        let result = snapshot.compute(d("12000")).unwrap();
        assert_eq!(result.taxes, d("1200"));
        assert_eq!(result.insurance, d("1320"));
        assert_eq!(result.total, d("2520"));
        assert_eq!(result.applied_rules.len(), 2);

        let high = snapshot.compute(d("30000")).unwrap();
        assert_eq!(high.taxes, d("6750"));
        assert_eq!(high.insurance, Decimal::ZERO);
    }

    #[test]
    fn computation_is_repeatable() {
        let snapshot = StatutorySnapshot {
            tax_rules: vec![tax(1, "7.5", "0", None, ConfigStatus::Approved)],
            insurance_brackets: vec![insurance(1, "11", "0", None)],
        };
        assert_eq!(snapshot.compute(d("9876.54")), snapshot.compute(d("9876.54")));
    }

    #[test]
    fn no_brackets_means_no_deductions() {
        let result = StatutorySnapshot::default().compute(d("5000")).unwrap();
        assert_eq!(result.total, Decimal::ZERO);
        assert!(result.applied_rules.is_empty());
    }

    #[test]
    fn bounds() {
        assert!(valid_bounds(d("0"), None));
        assert!(valid_bounds(d("100"), Some(d("100"))));
        assert!(!valid_bounds(d("100"), Some(d("99"))));
        assert!(!valid_bounds(d("-1"), None));
        assert!(!valid_bounds(d("0"), Some(d("1000000000000"))));
        assert!(valid_rate(d("100")));
        assert!(!valid_rate(d("100.001")));
        assert!(!valid_rate(d("-0.5")));
    }

    #[test]
    fn oversized_salary_is_refused() {
        let snapshot = StatutorySnapshot {
            tax_rules: vec![tax(1, "10", "0", None, ConfigStatus::Approved)],
            insurance_brackets: vec![],
        };
        assert_eq!(snapshot.compute(Decimal::MAX), Err(AmountOutOfRange));
    }
}
