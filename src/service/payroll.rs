//! Payroll initiation workflow.
//!
//! The run status stored by the backend is the only source of truth for where
//! a run stands. Each step here validates the edge against
//! [`RunStatus::next`], builds every dependent write the step needs, and hands
//! the whole bundle to the store as one compare-and-set transition. A step
//! that fails leaves the run in the state it was read in, so it can be
//! retried.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{info, warn};
use utoipa::ToSchema;

use crate::error::{AppError, StoreError};
use crate::model::payroll_run::{
    EntryAdjustment, NewRun, PayrollRun, PeriodPolicy, RunAction, RunEntry, RunFilter, RunStatus,
    RunTotals, RunTransitionRecord, new_run_id, normalize_period,
};
use crate::model::payslip::{NewPayslip, Payslip, PayslipFilter};
use crate::model::statutory::{RuleKind, StatutoryBreakdown};
use crate::store::{IdempotencyScope, RunChanges, RunTransition, Store};

use super::{amount, required};

#[derive(Debug, Clone)]
pub struct PayrollSettings {
    pub period_policy: PeriodPolicy,
    pub default_currency: String,
}

impl Default for PayrollSettings {
    fn default() -> Self {
        PayrollSettings {
            period_policy: PeriodPolicy::Coerce,
            default_currency: "EGP".to_string(),
        }
    }
}

/// Result of a step guarded by an idempotency key.
#[derive(Debug)]
pub enum Idempotent<T> {
    Fresh(T),
    /// The key had been used before; this is what the first call produced.
    Replayed(T),
}

impl<T> Idempotent<T> {
    pub fn is_replay(&self) -> bool {
        matches!(self, Idempotent::Replayed(_))
    }

    pub fn into_inner(self) -> T {
        match self {
            Idempotent::Fresh(v) | Idempotent::Replayed(v) => v,
        }
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[schema(example = json!({
    "payroll_period": "2025-02-15",
    "entity": "Acme Egypt",
    "currency": "EGP",
    "payroll_manager_id": 9
}))]
pub struct ProposePeriodRequest {
    /// Any day of the target month.
    pub payroll_period: NaiveDate,
    pub entity: String,
    pub currency: Option<String>,
    pub payroll_manager_id: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ReviewPeriodRequest {
    pub approved: bool,
    /// Required when rejecting.
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[schema(example = json!({
    "payroll_period": "2025-02-15",
    "entity": "Acme Egypt",
    "payroll_specialist_id": 7
}))]
pub struct ProcessInitiationRequest {
    pub payroll_period: NaiveDate,
    pub entity: String,
    pub payroll_specialist_id: u64,
    pub currency: Option<String>,
    pub payroll_manager_id: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ReviewInitiationRequest {
    pub run_id: String,
    pub approved: bool,
    pub rejection_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct UnlockRequest {
    pub reason: String,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ApplyStatutoryRequest {
    pub employee_id: u64,
    pub base_salary: Decimal,
}

fn currency_or_default(requested: Option<&str>, settings: &PayrollSettings) -> Result<String, AppError> {
    match requested.map(str::trim) {
        None => Ok(settings.default_currency.clone()),
        Some(code) if code.len() == 3 && code.chars().all(|c| c.is_ascii_alphabetic()) => {
            Ok(code.to_ascii_uppercase())
        }
        Some(code) => Err(AppError::Validation(format!(
            "currency {code:?} is not a three-letter code"
        ))),
    }
}

/// Width of the `entity` and idempotency key columns.
const MAX_LABEL_LEN: usize = 128;

fn within_width(value: &str, field: &str) -> Result<(), AppError> {
    if value.chars().count() > MAX_LABEL_LEN {
        return Err(AppError::Validation(format!(
            "{field} must be at most {MAX_LABEL_LEN} characters"
        )));
    }
    Ok(())
}

/// Entity name and idempotency key, checked before anything is looked up.
fn check_labels(entity: &str, idempotency_key: Option<&str>) -> Result<(), AppError> {
    required(entity, "entity")?;
    within_width(entity.trim(), "entity")?;
    if let Some(key) = idempotency_key {
        within_width(key, "Idempotency-Key")?;
    }
    Ok(())
}

fn reason_required(reason: Option<&str>, field: &str) -> Result<String, AppError> {
    let reason = reason.unwrap_or_default();
    required(reason, field)?;
    Ok(reason.trim().to_string())
}

/// Applies `action` to `run` and returns the run as persisted afterwards.
async fn transition(
    store: &dyn Store,
    run: &PayrollRun,
    action: RunAction,
    actor_id: u64,
    note: Option<String>,
    changes: RunChanges,
) -> Result<PayrollRun, AppError> {
    let to = run.status.next(action)?;
    let request = RunTransition {
        run_id: run.run_id.clone(),
        from: run.status,
        to,
        actor_id,
        note,
        changes,
    };
    let updated = store.apply_transition(&request).await.inspect_err(|e| {
        if let StoreError::Conflict(_) = e {
            warn!(run_id = %run.run_id, %action, "Payroll run changed underneath transition");
        }
    })?;
    info!(
        run_id = %updated.run_id,
        from = %run.status,
        to = %updated.status,
        actor_id,
        "Payroll run transitioned"
    );
    Ok(updated)
}

async fn replayed(
    store: &dyn Store,
    scope: IdempotencyScope,
    key: Option<&str>,
) -> Result<Option<PayrollRun>, AppError> {
    match key {
        Some(key) => Ok(store.find_run_by_idempotency_key(scope, key).await?),
        None => Ok(None),
    }
}

// ---------------- Period ----------------

pub async fn propose_period(
    store: &dyn Store,
    settings: &PayrollSettings,
    input: &ProposePeriodRequest,
    actor_id: u64,
    idempotency_key: Option<&str>,
) -> Result<Idempotent<PayrollRun>, AppError> {
    check_labels(&input.entity, idempotency_key)?;
    if let Some(run) = replayed(store, IdempotencyScope::ProposePeriod, idempotency_key).await? {
        return Ok(Idempotent::Replayed(run));
    }

    let period = normalize_period(input.payroll_period, settings.period_policy)?;
    let new_run = NewRun {
        run_id: new_run_id(period),
        payroll_period: period,
        entity: input.entity.trim().to_string(),
        currency: currency_or_default(input.currency.as_deref(), settings)?,
        payroll_specialist_id: actor_id,
        payroll_manager_id: input.payroll_manager_id,
    };

    match store.create_run(&new_run, actor_id, idempotency_key).await {
        Ok(run) => {
            info!(
                run_id = %run.run_id,
                period = %run.payroll_period,
                entity = %run.entity,
                "Payroll period proposed"
            );
            Ok(Idempotent::Fresh(run))
        }
        Err(StoreError::DuplicateKey(_)) => {
            // A concurrent request with the same key may have won the insert.
            if let Some(run) =
                replayed(store, IdempotencyScope::ProposePeriod, idempotency_key).await?
            {
                return Ok(Idempotent::Replayed(run));
            }
            Err(AppError::Conflict(format!(
                "a payroll run for {} / {} already exists",
                period, new_run.entity
            )))
        }
        Err(e) => Err(e.into()),
    }
}

pub async fn review_period(
    store: &dyn Store,
    run_id: &str,
    input: &ReviewPeriodRequest,
    actor_id: u64,
) -> Result<PayrollRun, AppError> {
    let run = store.get_run(run_id).await?;
    if input.approved {
        transition(
            store,
            &run,
            RunAction::ApprovePeriod,
            actor_id,
            input.reason.clone(),
            RunChanges::default(),
        )
        .await
    } else {
        let reason = reason_required(input.reason.as_deref(), "reason")?;
        transition(
            store,
            &run,
            RunAction::RejectPeriod,
            actor_id,
            Some(reason.clone()),
            RunChanges {
                rejection_reason: Some(reason),
                ..RunChanges::default()
            },
        )
        .await
    }
}

// ---------------- Initiation ----------------

/// Moves the approved period into `DRAFT` with one entry per active employee.
pub async fn process_initiation(
    store: &dyn Store,
    settings: &PayrollSettings,
    input: &ProcessInitiationRequest,
    actor_id: u64,
    idempotency_key: Option<&str>,
) -> Result<Idempotent<PayrollRun>, AppError> {
    check_labels(&input.entity, idempotency_key)?;
    if let Some(run) =
        replayed(store, IdempotencyScope::ProcessInitiation, idempotency_key).await?
    {
        return Ok(Idempotent::Replayed(run));
    }

    let period = normalize_period(input.payroll_period, settings.period_policy)?;
    let entity = input.entity.trim();
    let run = store
        .find_live_run(period, entity)
        .await?
        .ok_or_else(|| {
            AppError::Conflict(format!(
                "no approved payroll period for {period} / {entity}; propose and approve it first"
            ))
        })?;
    if run.status != RunStatus::PeriodApproved {
        return Err(AppError::Conflict(format!(
            "payroll run {} is {}; initiation requires PERIOD_APPROVED",
            run.run_id, run.status
        )));
    }

    let entries = store
        .list_active_employees()
        .await?
        .into_iter()
        .map(|e| RunEntry::draft(&run.run_id, e.id, e.base_salary, e.allowances))
        .collect::<Result<Vec<RunEntry>, _>>()?;
    let totals = RunTotals::from_entries(&entries)?;
    let currency = match input.currency.as_deref() {
        Some(code) => Some(currency_or_default(Some(code), settings)?),
        None => None,
    };
    let changes = RunChanges {
        totals: Some(totals),
        currency,
        payroll_specialist_id: Some(input.payroll_specialist_id),
        payroll_manager_id: input.payroll_manager_id,
        entries: Some(entries),
        idempotency_key: idempotency_key
            .map(|k| (IdempotencyScope::ProcessInitiation, k.to_string())),
        ..RunChanges::default()
    };

    match transition(store, &run, RunAction::Initiate, actor_id, None, changes).await {
        Ok(updated) => {
            info!(
                run_id = %updated.run_id,
                employees = updated.employees,
                gross = %updated.total_gross_pay,
                "Payroll initiation drafted"
            );
            Ok(Idempotent::Fresh(updated))
        }
        Err(e @ (AppError::DuplicateKey(_) | AppError::Conflict(_))) => {
            replay_after_race(store, idempotency_key, e).await
        }
        Err(e) => Err(e),
    }
}

/// A concurrent initiation with the same key either stored the key first or
/// moved the run out of PERIOD_APPROVED first; its run is replayed then.
async fn replay_after_race(
    store: &dyn Store,
    idempotency_key: Option<&str>,
    err: AppError,
) -> Result<Idempotent<PayrollRun>, AppError> {
    match replayed(store, IdempotencyScope::ProcessInitiation, idempotency_key).await? {
        Some(run) => Ok(Idempotent::Replayed(run)),
        None => Err(err),
    }
}

pub async fn adjust_entry(
    store: &dyn Store,
    run_id: &str,
    employee_id: u64,
    adjustment: &EntryAdjustment,
) -> Result<RunEntry, AppError> {
    for (field, value) in adjustment.amounts() {
        amount(value, field)?;
    }
    let run = store.get_run(run_id).await?;
    if run.status != RunStatus::Draft {
        return Err(AppError::Conflict(format!(
            "payroll run {run_id} is {}; entries can only be adjusted in DRAFT",
            run.status
        )));
    }
    let entry = store
        .adjust_entry(run_id, employee_id, RunStatus::Draft, adjustment)
        .await?;
    info!(run_id, employee_id, net_pay = %entry.net_pay, "Payroll entry adjusted");
    Ok(entry)
}

pub async fn review_initiation(
    store: &dyn Store,
    input: &ReviewInitiationRequest,
    actor_id: u64,
) -> Result<PayrollRun, AppError> {
    let run = store.get_run(&input.run_id).await?;
    if input.approved {
        transition(
            store,
            &run,
            RunAction::ApproveRun,
            actor_id,
            None,
            RunChanges {
                payroll_manager_id: Some(actor_id),
                ..RunChanges::default()
            },
        )
        .await
    } else {
        let reason = reason_required(input.rejection_reason.as_deref(), "rejection_reason")?;
        transition(
            store,
            &run,
            RunAction::RejectRun,
            actor_id,
            Some(reason.clone()),
            RunChanges {
                payroll_manager_id: Some(actor_id),
                rejection_reason: Some(reason),
                ..RunChanges::default()
            },
        )
        .await
    }
}

// ---------------- Execution ----------------

fn applied_summary(breakdowns: &[StatutoryBreakdown]) -> String {
    let mut tax = Vec::new();
    let mut insurance = Vec::new();
    for rule in breakdowns.iter().flat_map(|b| &b.applied_rules) {
        let ids = match rule.kind {
            RuleKind::Tax => &mut tax,
            RuleKind::Insurance => &mut insurance,
        };
        if !ids.contains(&rule.rule_id) {
            ids.push(rule.rule_id);
        }
    }
    tax.sort_unstable();
    insurance.sort_unstable();
    format!("tax rules {tax:?}; insurance brackets {insurance:?}")
}

/// Computes statutory deductions for every entry against one snapshot of the
/// approved brackets and persists them with the status change.
pub async fn apply_deductions(
    store: &dyn Store,
    run_id: &str,
    actor_id: u64,
) -> Result<PayrollRun, AppError> {
    let run = store.get_run(run_id).await?;
    run.status.next(RunAction::ApplyDeductions)?;

    let snapshot = store.statutory_snapshot().await?;
    let mut entries = store.list_entries(run_id).await?;
    let mut breakdowns = Vec::with_capacity(entries.len());
    for entry in entries.iter_mut() {
        let breakdown = snapshot.compute(entry.base_salary)?;
        entry.apply_statutory(&breakdown)?;
        breakdowns.push(breakdown);
    }
    let changes = RunChanges {
        totals: Some(RunTotals::from_entries(&entries)?),
        entries: Some(entries),
        ..RunChanges::default()
    };
    transition(
        store,
        &run,
        RunAction::ApplyDeductions,
        actor_id,
        Some(applied_summary(&breakdowns)),
        changes,
    )
    .await
}

pub async fn generate_payslips(
    store: &dyn Store,
    run_id: &str,
    actor_id: u64,
) -> Result<PayrollRun, AppError> {
    let run = store.get_run(run_id).await?;
    run.status.next(RunAction::GeneratePayslips)?;

    let payslips: Vec<NewPayslip> = store
        .list_entries(run_id)
        .await?
        .iter()
        .map(NewPayslip::from)
        .collect();
    let count = payslips.len();
    let changes = RunChanges {
        payslips: Some(payslips),
        ..RunChanges::default()
    };
    transition(
        store,
        &run,
        RunAction::GeneratePayslips,
        actor_id,
        Some(format!("{count} payslips")),
        changes,
    )
    .await
}

pub async fn lock_run(store: &dyn Store, run_id: &str, actor_id: u64) -> Result<PayrollRun, AppError> {
    let run = store.get_run(run_id).await?;
    transition(store, &run, RunAction::Lock, actor_id, None, RunChanges::default()).await
}

pub async fn unlock_run(
    store: &dyn Store,
    run_id: &str,
    input: &UnlockRequest,
    actor_id: u64,
) -> Result<PayrollRun, AppError> {
    let reason = reason_required(Some(&input.reason), "reason")?;
    let run = store.get_run(run_id).await?;
    transition(
        store,
        &run,
        RunAction::Unlock,
        actor_id,
        Some(reason.clone()),
        RunChanges {
            unlock_reason: Some(reason),
            ..RunChanges::default()
        },
    )
    .await
}

pub async fn mark_paid(store: &dyn Store, run_id: &str, actor_id: u64) -> Result<PayrollRun, AppError> {
    let run = store.get_run(run_id).await?;
    transition(
        store,
        &run,
        RunAction::MarkPaid,
        actor_id,
        None,
        RunChanges {
            mark_payslips_paid: true,
            ..RunChanges::default()
        },
    )
    .await
}

// ---------------- Queries ----------------

pub async fn get_runs(store: &dyn Store, filter: &RunFilter) -> Result<Vec<PayrollRun>, AppError> {
    Ok(store.list_runs(filter).await?)
}

pub async fn get_run(store: &dyn Store, run_id: &str) -> Result<PayrollRun, AppError> {
    Ok(store.get_run(run_id).await?)
}

pub async fn get_run_entries(store: &dyn Store, run_id: &str) -> Result<Vec<RunEntry>, AppError> {
    store.get_run(run_id).await?;
    Ok(store.list_entries(run_id).await?)
}

pub async fn get_run_transitions(
    store: &dyn Store,
    run_id: &str,
) -> Result<Vec<RunTransitionRecord>, AppError> {
    Ok(store.list_transitions(run_id).await?)
}

pub async fn get_payslips(
    store: &dyn Store,
    filter: &PayslipFilter,
) -> Result<Vec<Payslip>, AppError> {
    Ok(store.list_payslips(filter).await?)
}

pub async fn get_payslip(store: &dyn Store, id: u64) -> Result<Payslip, AppError> {
    Ok(store.get_payslip(id).await?)
}
