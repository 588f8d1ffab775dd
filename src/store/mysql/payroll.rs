use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::{Executor, FromRow, MySql, MySqlConnection, QueryBuilder};
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::model::payroll_run::{
    EntryAdjustment, NewRun, PayrollRun, RunEntry, RunFilter, RunStatus, RunTotals,
    RunTransitionRecord, entity_key, period_key,
};
use crate::model::payslip::{DeductionsDetails, EarningsDetails, PaymentStatus, Payslip, PayslipFilter};
use crate::store::{IdempotencyScope, PayrollStore, RunTransition, StoreFuture};

use super::{MySqlStore, parse};

const RUN_COLUMNS: &str = "run_id, payroll_period, entity, currency, status, employees, \
     total_gross_pay, total_deductions, total_net_pay, payroll_specialist_id, payroll_manager_id, \
     rejection_reason, unlock_reason, created_at, updated_at";
const ENTRY_COLUMNS: &str = "run_id, employee_id, base_salary, allowances, bonuses, benefits, \
     refunds, taxes, insurance, penalties, gross_pay, total_deductions, net_pay";
const PAYSLIP_COLUMNS: &str = "id, employee_id, payroll_run_id, base_salary, allowances, bonuses, \
     benefits, refunds, taxes, insurances, penalties, total_gross_salary, total_deductions, \
     net_pay, payment_status, created_at, updated_at";

#[derive(FromRow)]
struct RunRow {
    run_id: String,
    payroll_period: NaiveDate,
    entity: String,
    currency: String,
    status: String,
    employees: u32,
    total_gross_pay: Decimal,
    total_deductions: Decimal,
    total_net_pay: Decimal,
    payroll_specialist_id: u64,
    payroll_manager_id: Option<u64>,
    rejection_reason: Option<String>,
    unlock_reason: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<RunRow> for PayrollRun {
    type Error = StoreError;

    fn try_from(row: RunRow) -> StoreResult<Self> {
        Ok(PayrollRun {
            run_id: row.run_id,
            payroll_period: row.payroll_period,
            entity: row.entity,
            currency: row.currency,
            status: parse(&row.status)?,
            employees: row.employees,
            total_gross_pay: row.total_gross_pay,
            total_deductions: row.total_deductions,
            total_net_pay: row.total_net_pay,
            payroll_specialist_id: row.payroll_specialist_id,
            payroll_manager_id: row.payroll_manager_id,
            rejection_reason: row.rejection_reason,
            unlock_reason: row.unlock_reason,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(FromRow)]
struct EntryRow {
    run_id: String,
    employee_id: u64,
    base_salary: Decimal,
    allowances: Decimal,
    bonuses: Decimal,
    benefits: Decimal,
    refunds: Decimal,
    taxes: Decimal,
    insurance: Decimal,
    penalties: Decimal,
    gross_pay: Decimal,
    total_deductions: Decimal,
    net_pay: Decimal,
}

impl From<EntryRow> for RunEntry {
    fn from(row: EntryRow) -> Self {
        RunEntry {
            run_id: row.run_id,
            employee_id: row.employee_id,
            base_salary: row.base_salary,
            allowances: row.allowances,
            bonuses: row.bonuses,
            benefits: row.benefits,
            refunds: row.refunds,
            taxes: row.taxes,
            insurance: row.insurance,
            penalties: row.penalties,
            gross_pay: row.gross_pay,
            total_deductions: row.total_deductions,
            net_pay: row.net_pay,
        }
    }
}

#[derive(FromRow)]
struct TransitionRow {
    id: u64,
    run_id: String,
    from_status: Option<String>,
    to_status: String,
    actor_id: u64,
    note: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<TransitionRow> for RunTransitionRecord {
    type Error = StoreError;

    fn try_from(row: TransitionRow) -> StoreResult<Self> {
        Ok(RunTransitionRecord {
            id: row.id,
            run_id: row.run_id,
            from_status: row.from_status.as_deref().map(parse).transpose()?,
            to_status: parse(&row.to_status)?,
            actor_id: row.actor_id,
            note: row.note,
            created_at: row.created_at,
        })
    }
}

#[derive(FromRow)]
struct PayslipRow {
    id: u64,
    employee_id: u64,
    payroll_run_id: String,
    base_salary: Decimal,
    allowances: Decimal,
    bonuses: Decimal,
    benefits: Decimal,
    refunds: Decimal,
    taxes: Decimal,
    insurances: Decimal,
    penalties: Decimal,
    total_gross_salary: Decimal,
    total_deductions: Decimal,
    net_pay: Decimal,
    payment_status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<PayslipRow> for Payslip {
    type Error = StoreError;

    fn try_from(row: PayslipRow) -> StoreResult<Self> {
        Ok(Payslip {
            id: row.id,
            employee_id: row.employee_id,
            payroll_run_id: row.payroll_run_id,
            earnings_details: EarningsDetails {
                base_salary: row.base_salary,
                allowances: row.allowances,
                bonuses: row.bonuses,
                benefits: row.benefits,
                refunds: row.refunds,
            },
            deductions_details: DeductionsDetails {
                taxes: row.taxes,
                insurances: row.insurances,
                penalties: row.penalties,
            },
            total_gross_salary: row.total_gross_salary,
            total_deductions: row.total_deductions,
            net_pay: row.net_pay,
            payment_status: parse(&row.payment_status)?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

impl MySqlStore {
    async fn fetch_run<'e, E>(executor: E, run_id: &str, lock: bool) -> StoreResult<PayrollRun>
    where
        E: Executor<'e, Database = MySql>,
    {
        let sql = format!(
            "SELECT {RUN_COLUMNS} FROM payroll_runs WHERE run_id = ?{}",
            if lock { " FOR UPDATE" } else { "" }
        );
        let row: Option<RunRow> = sqlx::query_as(&sql)
            .bind(run_id)
            .fetch_optional(executor)
            .await?;
        row.ok_or_else(|| StoreError::not_found("payroll run", run_id))?
            .try_into()
    }

    async fn select_entries<'e, E>(executor: E, run_id: &str) -> StoreResult<Vec<RunEntry>>
    where
        E: Executor<'e, Database = MySql>,
    {
        let rows: Vec<EntryRow> = sqlx::query_as(&format!(
            "SELECT {ENTRY_COLUMNS} FROM payroll_run_entries WHERE run_id = ? ORDER BY employee_id"
        ))
        .bind(run_id)
        .fetch_all(executor)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn ensure_run_exists(&self, run_id: &str) -> StoreResult<()> {
        let found: Option<String> =
            sqlx::query_scalar("SELECT run_id FROM payroll_runs WHERE run_id = ?")
                .bind(run_id)
                .fetch_optional(&self.pool)
                .await?;
        found
            .map(|_| ())
            .ok_or_else(|| StoreError::not_found("payroll run", run_id))
    }
}

async fn insert_transition(
    conn: &mut MySqlConnection,
    run_id: &str,
    from: Option<RunStatus>,
    to: RunStatus,
    actor_id: u64,
    note: Option<&str>,
    at: DateTime<Utc>,
) -> StoreResult<()> {
    sqlx::query(
        "INSERT INTO payroll_run_transitions (run_id, from_status, to_status, actor_id, note, created_at) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(run_id)
    .bind(from.map(|s| s.to_string()))
    .bind(to.to_string())
    .bind(actor_id)
    .bind(note)
    .bind(at)
    .execute(conn)
    .await?;
    Ok(())
}

async fn insert_idempotency_key(
    conn: &mut MySqlConnection,
    scope: IdempotencyScope,
    key: &str,
    run_id: &str,
) -> StoreResult<()> {
    sqlx::query("INSERT INTO idempotency_keys (scope, idem_key, run_id) VALUES (?, ?, ?)")
        .bind(scope.as_str())
        .bind(key)
        .bind(run_id)
        .execute(conn)
        .await?;
    Ok(())
}

async fn write_entry(conn: &mut MySqlConnection, entry: &RunEntry) -> StoreResult<()> {
    sqlx::query(
        r#"
        INSERT INTO payroll_run_entries
        (run_id, employee_id, base_salary, allowances, bonuses, benefits, refunds, taxes,
         insurance, penalties, gross_pay, total_deductions, net_pay)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON DUPLICATE KEY UPDATE
            bonuses = VALUES(bonuses), benefits = VALUES(benefits), refunds = VALUES(refunds),
            taxes = VALUES(taxes), insurance = VALUES(insurance), penalties = VALUES(penalties),
            gross_pay = VALUES(gross_pay), total_deductions = VALUES(total_deductions),
            net_pay = VALUES(net_pay)
        "#,
    )
    .bind(&entry.run_id)
    .bind(entry.employee_id)
    .bind(entry.base_salary)
    .bind(entry.allowances)
    .bind(entry.bonuses)
    .bind(entry.benefits)
    .bind(entry.refunds)
    .bind(entry.taxes)
    .bind(entry.insurance)
    .bind(entry.penalties)
    .bind(entry.gross_pay)
    .bind(entry.total_deductions)
    .bind(entry.net_pay)
    .execute(conn)
    .await?;
    Ok(())
}

impl PayrollStore for MySqlStore {
    fn create_run<'a>(
        &'a self,
        run: &'a NewRun,
        actor_id: u64,
        idempotency_key: Option<&'a str>,
    ) -> StoreFuture<'a, PayrollRun> {
        Box::pin(async move {
            let now = Utc::now();
            let status = RunStatus::PeriodProposed;
            let mut tx = self.pool.begin().await?;

            sqlx::query(
                r#"
                INSERT INTO payroll_runs
                (run_id, payroll_period, entity, active_key, currency, status,
                 payroll_specialist_id, payroll_manager_id, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&run.run_id)
            .bind(run.payroll_period)
            .bind(&run.entity)
            .bind(period_key(run.payroll_period, &run.entity))
            .bind(&run.currency)
            .bind(status.to_string())
            .bind(run.payroll_specialist_id)
            .bind(run.payroll_manager_id)
            .bind(now)
            .bind(now)
            .execute(&mut *tx)
            .await?;

            if let Some(key) = idempotency_key {
                insert_idempotency_key(&mut tx, IdempotencyScope::ProposePeriod, key, &run.run_id)
                    .await?;
            }
            insert_transition(&mut tx, &run.run_id, None, status, actor_id, None, now).await?;
            tx.commit().await?;

            Ok(PayrollRun {
                run_id: run.run_id.clone(),
                payroll_period: run.payroll_period,
                entity: run.entity.clone(),
                currency: run.currency.clone(),
                status,
                employees: 0,
                total_gross_pay: Decimal::ZERO,
                total_deductions: Decimal::ZERO,
                total_net_pay: Decimal::ZERO,
                payroll_specialist_id: run.payroll_specialist_id,
                payroll_manager_id: run.payroll_manager_id,
                rejection_reason: None,
                unlock_reason: None,
                created_at: now,
                updated_at: now,
            })
        })
    }

    fn get_run<'a>(&'a self, run_id: &'a str) -> StoreFuture<'a, PayrollRun> {
        Box::pin(Self::fetch_run(&self.pool, run_id, false))
    }

    fn list_runs<'a>(&'a self, filter: &'a RunFilter) -> StoreFuture<'a, Vec<PayrollRun>> {
        Box::pin(async move {
            let mut qb =
                QueryBuilder::<MySql>::new(format!("SELECT {RUN_COLUMNS} FROM payroll_runs WHERE 1 = 1"));
            if let Some(status) = filter.status {
                qb.push(" AND status = ").push_bind(status.to_string());
            }
            if let Some(entity) = &filter.entity {
                qb.push(" AND LOWER(entity) = ")
                    .push_bind(entity_key(entity));
            }
            qb.push(" ORDER BY payroll_period DESC, created_at DESC");
            let rows: Vec<RunRow> = qb.build_query_as().fetch_all(&self.pool).await?;
            rows.into_iter().map(TryInto::try_into).collect()
        })
    }

    fn find_live_run<'a>(
        &'a self,
        period: NaiveDate,
        entity: &'a str,
    ) -> StoreFuture<'a, Option<PayrollRun>> {
        Box::pin(async move {
            let row: Option<RunRow> = sqlx::query_as(&format!(
                "SELECT {RUN_COLUMNS} FROM payroll_runs WHERE active_key = ?"
            ))
            .bind(period_key(period, entity))
            .fetch_optional(&self.pool)
            .await?;
            row.map(PayrollRun::try_from).transpose()
        })
    }

    fn find_run_by_idempotency_key<'a>(
        &'a self,
        scope: IdempotencyScope,
        key: &'a str,
    ) -> StoreFuture<'a, Option<PayrollRun>> {
        Box::pin(async move {
            let run_id: Option<String> = sqlx::query_scalar(
                "SELECT run_id FROM idempotency_keys WHERE scope = ? AND idem_key = ?",
            )
            .bind(scope.as_str())
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
            match run_id {
                Some(run_id) => Ok(Some(Self::fetch_run(&self.pool, &run_id, false).await?)),
                None => Ok(None),
            }
        })
    }

    fn apply_transition<'a>(
        &'a self,
        transition: &'a RunTransition,
    ) -> StoreFuture<'a, PayrollRun> {
        Box::pin(async move {
            let run_id = transition.run_id.as_str();
            let changes = &transition.changes;
            let mut tx = self.pool.begin().await?;

            let current = Self::fetch_run(&mut *tx, run_id, true).await?;
            if current.status != transition.from {
                return Err(StoreError::Conflict(format!(
                    "payroll run {run_id} is {}, expected {}",
                    current.status, transition.from
                )));
            }

            let now = Utc::now();
            let next = transition.applied_to(&current, now);

            if let Some(entries) = &changes.entries {
                sqlx::query("DELETE FROM payroll_run_entries WHERE run_id = ?")
                    .bind(run_id)
                    .execute(&mut *tx)
                    .await?;
                for entry in entries {
                    write_entry(&mut tx, entry).await?;
                }
            }

            if let Some(payslips) = &changes.payslips {
                for p in payslips {
                    sqlx::query(
                        r#"
                        INSERT INTO payslips
                        (employee_id, payroll_run_id, base_salary, allowances, bonuses, benefits,
                         refunds, taxes, insurances, penalties, total_gross_salary,
                         total_deductions, net_pay, payment_status, created_at, updated_at)
                        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                        "#,
                    )
                    .bind(p.employee_id)
                    .bind(&p.payroll_run_id)
                    .bind(p.earnings_details.base_salary)
                    .bind(p.earnings_details.allowances)
                    .bind(p.earnings_details.bonuses)
                    .bind(p.earnings_details.benefits)
                    .bind(p.earnings_details.refunds)
                    .bind(p.deductions_details.taxes)
                    .bind(p.deductions_details.insurances)
                    .bind(p.deductions_details.penalties)
                    .bind(p.total_gross_salary)
                    .bind(p.total_deductions)
                    .bind(p.net_pay)
                    .bind(PaymentStatus::Pending.to_string())
                    .bind(now)
                    .bind(now)
                    .execute(&mut *tx)
                    .await?;
                }
            }

            if changes.mark_payslips_paid {
                sqlx::query(
                    "UPDATE payslips SET payment_status = ?, updated_at = ? WHERE payroll_run_id = ?",
                )
                .bind(PaymentStatus::Paid.to_string())
                .bind(now)
                .bind(run_id)
                .execute(&mut *tx)
                .await?;
            }

            if let Some((scope, key)) = &changes.idempotency_key {
                insert_idempotency_key(&mut tx, *scope, key, run_id).await?;
            }

            let result = sqlx::query(
                r#"
                UPDATE payroll_runs
                SET status = ?, currency = ?, employees = ?, total_gross_pay = ?,
                    total_deductions = ?, total_net_pay = ?, payroll_specialist_id = ?,
                    payroll_manager_id = ?, rejection_reason = ?, unlock_reason = ?,
                    active_key = IF(?, NULL, active_key), updated_at = ?
                WHERE run_id = ? AND status = ?
                "#,
            )
            .bind(next.status.to_string())
            .bind(&next.currency)
            .bind(next.employees)
            .bind(next.total_gross_pay)
            .bind(next.total_deductions)
            .bind(next.total_net_pay)
            .bind(next.payroll_specialist_id)
            .bind(next.payroll_manager_id)
            .bind(&next.rejection_reason)
            .bind(&next.unlock_reason)
            .bind(next.status.releases_period())
            .bind(now)
            .bind(run_id)
            .bind(transition.from.to_string())
            .execute(&mut *tx)
            .await?;
            if result.rows_affected() == 0 {
                return Err(StoreError::Conflict(format!(
                    "payroll run {run_id} changed during {}",
                    transition.to
                )));
            }

            insert_transition(
                &mut tx,
                run_id,
                Some(transition.from),
                transition.to,
                transition.actor_id,
                transition.note.as_deref(),
                now,
            )
            .await?;

            tx.commit().await?;
            debug!(run_id, from = %transition.from, to = %transition.to, "Run transition committed");
            Ok(next)
        })
    }

    fn list_entries<'a>(&'a self, run_id: &'a str) -> StoreFuture<'a, Vec<RunEntry>> {
        Box::pin(async move {
            self.ensure_run_exists(run_id).await?;
            Self::select_entries(&self.pool, run_id).await
        })
    }

    fn adjust_entry<'a>(
        &'a self,
        run_id: &'a str,
        employee_id: u64,
        expected: RunStatus,
        adjustment: &'a EntryAdjustment,
    ) -> StoreFuture<'a, RunEntry> {
        Box::pin(async move {
            let mut tx = self.pool.begin().await?;
            let run = Self::fetch_run(&mut *tx, run_id, true).await?;
            if run.status != expected {
                return Err(StoreError::Conflict(format!(
                    "payroll run {run_id} is {}, expected {expected}",
                    run.status
                )));
            }

            let row: Option<EntryRow> = sqlx::query_as(&format!(
                "SELECT {ENTRY_COLUMNS} FROM payroll_run_entries WHERE run_id = ? AND employee_id = ? FOR UPDATE"
            ))
            .bind(run_id)
            .bind(employee_id)
            .fetch_optional(&mut *tx)
            .await?;
            let current: RunEntry = row.map(Into::into).ok_or_else(|| {
                StoreError::not_found("run entry", format!("{run_id}/{employee_id}"))
            })?;
            let entry = current.adjusted(adjustment)?;
            write_entry(&mut tx, &entry).await?;

            let totals = RunTotals::from_entries(&Self::select_entries(&mut *tx, run_id).await?)?;
            sqlx::query(
                r#"
                UPDATE payroll_runs
                SET employees = ?, total_gross_pay = ?, total_deductions = ?, total_net_pay = ?,
                    updated_at = ?
                WHERE run_id = ?
                "#,
            )
            .bind(totals.employees)
            .bind(totals.total_gross_pay)
            .bind(totals.total_deductions)
            .bind(totals.total_net_pay)
            .bind(Utc::now())
            .bind(run_id)
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;
            Ok(entry)
        })
    }

    fn list_transitions<'a>(
        &'a self,
        run_id: &'a str,
    ) -> StoreFuture<'a, Vec<RunTransitionRecord>> {
        Box::pin(async move {
            self.ensure_run_exists(run_id).await?;
            let rows: Vec<TransitionRow> = sqlx::query_as(
                "SELECT id, run_id, from_status, to_status, actor_id, note, created_at FROM payroll_run_transitions WHERE run_id = ? ORDER BY id",
            )
            .bind(run_id)
            .fetch_all(&self.pool)
            .await?;
            rows.into_iter().map(TryInto::try_into).collect()
        })
    }

    fn list_payslips<'a>(&'a self, filter: &'a PayslipFilter) -> StoreFuture<'a, Vec<Payslip>> {
        Box::pin(async move {
            let mut qb =
                QueryBuilder::<MySql>::new(format!("SELECT {PAYSLIP_COLUMNS} FROM payslips WHERE 1 = 1"));
            if let Some(run_id) = &filter.payroll_run_id {
                qb.push(" AND payroll_run_id = ").push_bind(run_id.clone());
            }
            if let Some(employee_id) = filter.employee_id {
                qb.push(" AND employee_id = ").push_bind(employee_id);
            }
            qb.push(" ORDER BY id");
            let rows: Vec<PayslipRow> = qb.build_query_as().fetch_all(&self.pool).await?;
            rows.into_iter().map(TryInto::try_into).collect()
        })
    }

    fn get_payslip(&self, id: u64) -> StoreFuture<'_, Payslip> {
        Box::pin(async move {
            let row: Option<PayslipRow> =
                sqlx::query_as(&format!("SELECT {PAYSLIP_COLUMNS} FROM payslips WHERE id = ?"))
                    .bind(id)
                    .fetch_optional(&self.pool)
                    .await?;
            row.ok_or_else(|| StoreError::not_found("payslip", id))?
                .try_into()
        })
    }
}
