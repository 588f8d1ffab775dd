use rust_decimal::Decimal;
use tracing::{debug, info};

use crate::error::AppError;
use crate::model::statutory::{
    ConfigStatus, InsuranceBracket, NewInsuranceBracket, NewTaxRule, StatutoryBreakdown, TaxRule,
    valid_bounds, valid_rate,
};
use crate::store::Store;

use super::{amount, required};

fn check_bracket(min: Decimal, max: Option<Decimal>, rates: &[(Decimal, &str)]) -> Result<(), AppError> {
    if !valid_bounds(min, max) {
        return Err(AppError::Validation(
            "salary range must start at zero or above, stay within the money range, and max_salary must not be below min_salary"
                .into(),
        ));
    }
    for (rate, field) in rates {
        if !valid_rate(*rate) {
            return Err(AppError::Validation(format!(
                "{field} must be a percentage between 0 and 100"
            )));
        }
    }
    Ok(())
}

pub async fn create_tax_rule(
    store: &dyn Store,
    input: &NewTaxRule,
    actor: u64,
) -> Result<TaxRule, AppError> {
    required(&input.name, "name")?;
    check_bracket(input.min_salary, input.max_salary, &[(input.rate, "rate")])?;
    let rule = store.insert_tax_rule(input, actor).await?;
    info!(rule_id = rule.id, "Tax rule created");
    Ok(rule)
}

pub async fn get_tax_rules(
    store: &dyn Store,
    status: Option<ConfigStatus>,
) -> Result<Vec<TaxRule>, AppError> {
    Ok(store.list_tax_rules(status).await?)
}

pub async fn approve_tax_rule(store: &dyn Store, id: u64, actor: u64) -> Result<TaxRule, AppError> {
    let rule = store.approve_tax_rule(id, actor).await?;
    info!(rule_id = id, approved_by = actor, "Tax rule approved");
    Ok(rule)
}

pub async fn create_insurance_bracket(
    store: &dyn Store,
    input: &NewInsuranceBracket,
    actor: u64,
) -> Result<InsuranceBracket, AppError> {
    required(&input.name, "name")?;
    check_bracket(
        input.min_salary,
        input.max_salary,
        &[
            (input.employee_rate, "employee_rate"),
            (input.employer_rate, "employer_rate"),
        ],
    )?;
    let bracket = store.insert_insurance_bracket(input, actor).await?;
    info!(bracket_id = bracket.id, "Insurance bracket created");
    Ok(bracket)
}

pub async fn get_insurance_brackets(
    store: &dyn Store,
    status: Option<ConfigStatus>,
) -> Result<Vec<InsuranceBracket>, AppError> {
    Ok(store.list_insurance_brackets(status).await?)
}

pub async fn approve_insurance_bracket(
    store: &dyn Store,
    id: u64,
    actor: u64,
) -> Result<InsuranceBracket, AppError> {
    let bracket = store.approve_insurance_bracket(id, actor).await?;
    info!(bracket_id = id, approved_by = actor, "Insurance bracket approved");
    Ok(bracket)
}

/// Taxes and insurance owed on `base_salary` under the approved brackets.
/// Reads only; calling it twice with the same configuration gives the same
/// breakdown.
pub async fn apply_statutory_rules(
    store: &dyn Store,
    employee_id: u64,
    base_salary: Decimal,
) -> Result<StatutoryBreakdown, AppError> {
    amount(base_salary, "base_salary")?;
    store.get_employee(employee_id).await?;

    let breakdown = store.statutory_snapshot().await?.compute(base_salary)?;
    debug!(
        employee_id,
        %base_salary,
        total = %breakdown.total,
        rules = breakdown.applied_rules.len(),
        "Statutory rules applied"
    );
    Ok(breakdown)
}
