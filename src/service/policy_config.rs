//! Overtime and lateness rules, holidays, and the holiday checks attendance
//! relies on.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use tracing::info;

use crate::error::AppError;
use crate::model::policy::{
    AttendanceHolidayCheck, Holiday, HolidayCheck, HolidayUpdate, LatenessRule,
    LatenessRuleUpdate, NewHoliday, NewLatenessRule, NewOvertimeRule, OvertimeRule,
    OvertimeRuleUpdate, find_covering, valid_range,
};
use crate::store::Store;

use super::required;

/// `DECIMAL(6,2)` columns.
fn max_factor() -> Decimal {
    Decimal::new(999_999, 2)
}

/// `DECIMAL(10,2)` column.
fn max_rate_per_minute() -> Decimal {
    Decimal::new(9_999_999_999, 2)
}

fn too_large(field: &str, limit: Decimal) -> AppError {
    AppError::Validation(format!("{field} must not exceed {limit}"))
}

fn check_overtime(threshold: Option<Decimal>, multiplier: Option<Decimal>) -> Result<(), AppError> {
    if threshold.is_some_and(|v| v.is_sign_negative()) {
        return Err(AppError::Validation("threshold_hours must not be negative".into()));
    }
    if threshold.is_some_and(|v| v > max_factor()) {
        return Err(too_large("threshold_hours", max_factor()));
    }
    if multiplier.is_some_and(|v| v <= Decimal::ZERO) {
        return Err(AppError::Validation("multiplier must be positive".into()));
    }
    if multiplier.is_some_and(|v| v > max_factor()) {
        return Err(too_large("multiplier", max_factor()));
    }
    Ok(())
}

fn check_deduction(per_minute: Option<Decimal>) -> Result<(), AppError> {
    if per_minute.is_some_and(|v| v.is_sign_negative()) {
        return Err(AppError::Validation(
            "deduction_per_minute must not be negative".into(),
        ));
    }
    if per_minute.is_some_and(|v| v > max_rate_per_minute()) {
        return Err(too_large("deduction_per_minute", max_rate_per_minute()));
    }
    Ok(())
}

// ---------------- Overtime ----------------

pub async fn create_overtime_rule(
    store: &dyn Store,
    input: &NewOvertimeRule,
    actor: u64,
) -> Result<OvertimeRule, AppError> {
    required(&input.name, "name")?;
    check_overtime(Some(input.threshold_hours), Some(input.multiplier))?;
    let rule = store.insert_overtime_rule(input, actor).await?;
    info!(rule_id = rule.id, created_by = actor, "Overtime rule created");
    Ok(rule)
}

pub async fn get_overtime_rules(
    store: &dyn Store,
    active: Option<bool>,
) -> Result<Vec<OvertimeRule>, AppError> {
    Ok(store.list_overtime_rules(active).await?)
}

pub async fn get_overtime_rule(store: &dyn Store, id: u64) -> Result<OvertimeRule, AppError> {
    Ok(store.get_overtime_rule(id).await?)
}

pub async fn update_overtime_rule(
    store: &dyn Store,
    id: u64,
    update: &OvertimeRuleUpdate,
    actor: u64,
) -> Result<OvertimeRule, AppError> {
    if let Some(name) = &update.name {
        required(name, "name")?;
    }
    check_overtime(update.threshold_hours, update.multiplier)?;
    Ok(store.update_overtime_rule(id, update, actor).await?)
}

pub async fn approve_overtime_rule(
    store: &dyn Store,
    id: u64,
    actor: u64,
) -> Result<OvertimeRule, AppError> {
    let rule = store.approve_overtime_rule(id, actor).await?;
    info!(rule_id = id, approved_by = actor, "Overtime rule approved");
    Ok(rule)
}

pub async fn delete_overtime_rule(store: &dyn Store, id: u64) -> Result<(), AppError> {
    store.delete_overtime_rule(id).await?;
    info!(rule_id = id, "Overtime rule deleted");
    Ok(())
}

/// Active, approved rules whose threshold `hours` exceeds.
pub async fn get_applicable_overtime_rules(
    store: &dyn Store,
    hours: Decimal,
) -> Result<Vec<OvertimeRule>, AppError> {
    if hours.is_sign_negative() {
        return Err(AppError::Validation("hours must not be negative".into()));
    }
    Ok(store
        .list_overtime_rules(Some(true))
        .await?
        .into_iter()
        .filter(|r| r.applies_to(hours))
        .collect())
}

// ---------------- Lateness ----------------

pub async fn create_lateness_rule(
    store: &dyn Store,
    input: &NewLatenessRule,
    actor: u64,
) -> Result<LatenessRule, AppError> {
    required(&input.name, "name")?;
    check_deduction(Some(input.deduction_per_minute))?;
    let rule = store.insert_lateness_rule(input, actor).await?;
    info!(rule_id = rule.id, created_by = actor, "Lateness rule created");
    Ok(rule)
}

pub async fn get_lateness_rules(
    store: &dyn Store,
    active: Option<bool>,
) -> Result<Vec<LatenessRule>, AppError> {
    Ok(store.list_lateness_rules(active).await?)
}

pub async fn get_lateness_rule(store: &dyn Store, id: u64) -> Result<LatenessRule, AppError> {
    Ok(store.get_lateness_rule(id).await?)
}

pub async fn update_lateness_rule(
    store: &dyn Store,
    id: u64,
    update: &LatenessRuleUpdate,
    actor: u64,
) -> Result<LatenessRule, AppError> {
    if let Some(name) = &update.name {
        required(name, "name")?;
    }
    check_deduction(update.deduction_per_minute)?;
    Ok(store.update_lateness_rule(id, update, actor).await?)
}

pub async fn approve_lateness_rule(
    store: &dyn Store,
    id: u64,
    actor: u64,
) -> Result<LatenessRule, AppError> {
    let rule = store.approve_lateness_rule(id, actor).await?;
    info!(rule_id = id, approved_by = actor, "Lateness rule approved");
    Ok(rule)
}

pub async fn delete_lateness_rule(store: &dyn Store, id: u64) -> Result<(), AppError> {
    store.delete_lateness_rule(id).await?;
    info!(rule_id = id, "Lateness rule deleted");
    Ok(())
}

pub async fn get_applicable_lateness_rules(
    store: &dyn Store,
    minutes_late: u32,
) -> Result<Vec<LatenessRule>, AppError> {
    Ok(store
        .list_lateness_rules(Some(true))
        .await?
        .into_iter()
        .filter(|r| r.applies_to(minutes_late))
        .collect())
}

// ---------------- Holidays ----------------

fn check_range(start: NaiveDate, end: Option<NaiveDate>) -> Result<(), AppError> {
    if !valid_range(start, end) {
        return Err(AppError::Validation(
            "end_date must not precede start_date".into(),
        ));
    }
    Ok(())
}

pub async fn create_holiday(
    store: &dyn Store,
    input: &NewHoliday,
    actor: u64,
) -> Result<Holiday, AppError> {
    required(&input.name, "name")?;
    check_range(input.start_date, input.end_date)?;
    let holiday = store.insert_holiday(input, actor).await?;
    info!(
        holiday_id = holiday.id,
        start_date = %holiday.start_date,
        "Holiday created"
    );
    Ok(holiday)
}

pub async fn get_holidays(
    store: &dyn Store,
    active: Option<bool>,
) -> Result<Vec<Holiday>, AppError> {
    Ok(store.list_holidays(active).await?)
}

pub async fn get_holiday(store: &dyn Store, id: u64) -> Result<Holiday, AppError> {
    Ok(store.get_holiday(id).await?)
}

pub async fn update_holiday(
    store: &dyn Store,
    id: u64,
    update: &HolidayUpdate,
    actor: u64,
) -> Result<Holiday, AppError> {
    if let Some(name) = &update.name {
        required(name, "name")?;
    }
    // The range is checked against the merged record, not the patch alone.
    let mut merged = store.get_holiday(id).await?;
    merged.apply(update);
    check_range(merged.start_date, merged.end_date)?;
    Ok(store.update_holiday(id, update, actor).await?)
}

pub async fn delete_holiday(store: &dyn Store, id: u64) -> Result<(), AppError> {
    store.delete_holiday(id).await?;
    info!(holiday_id = id, "Holiday deleted");
    Ok(())
}

pub async fn check_holiday(store: &dyn Store, date: NaiveDate) -> Result<HolidayCheck, AppError> {
    let covering = store.holidays_covering(date).await?;
    let holiday = find_covering(&covering, date).cloned();
    Ok(HolidayCheck {
        is_holiday: holiday.is_some(),
        holiday,
    })
}

pub async fn validate_attendance_holiday(
    store: &dyn Store,
    employee_id: u64,
    date: NaiveDate,
    suppress_penalty: bool,
) -> Result<AttendanceHolidayCheck, AppError> {
    store.get_employee(employee_id).await?;
    let check = check_holiday(store, date).await?;
    Ok(AttendanceHolidayCheck {
        employee_id,
        date,
        is_holiday: check.is_holiday,
        holiday: check.holiday,
        penalty_suppressed: check.is_holiday && suppress_penalty,
    })
}
