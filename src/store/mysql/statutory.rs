use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{Executor, FromRow, MySql, QueryBuilder};

use crate::error::{StoreError, StoreResult};
use crate::model::statutory::{
    ConfigStatus, InsuranceBracket, NewInsuranceBracket, NewTaxRule, StatutorySnapshot, TaxRule,
};
use crate::store::{StatutoryStore, StoreFuture};

use super::{MySqlStore, parse};

const TAX_COLUMNS: &str = "id, name, description, rate, min_salary, max_salary, status, \
     created_by, approved_by, created_at, updated_at";
const BRACKET_COLUMNS: &str = "id, name, min_salary, max_salary, employee_rate, employer_rate, \
     status, created_by, approved_by, created_at, updated_at";

#[derive(FromRow)]
struct TaxRuleRow {
    id: u64,
    name: String,
    description: Option<String>,
    rate: Decimal,
    min_salary: Decimal,
    max_salary: Option<Decimal>,
    status: String,
    created_by: u64,
    approved_by: Option<u64>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<TaxRuleRow> for TaxRule {
    type Error = StoreError;

    fn try_from(row: TaxRuleRow) -> StoreResult<Self> {
        Ok(TaxRule {
            id: row.id,
            name: row.name,
            description: row.description,
            rate: row.rate,
            min_salary: row.min_salary,
            max_salary: row.max_salary,
            status: parse(&row.status)?,
            created_by: row.created_by,
            approved_by: row.approved_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(FromRow)]
struct InsuranceBracketRow {
    id: u64,
    name: String,
    min_salary: Decimal,
    max_salary: Option<Decimal>,
    employee_rate: Decimal,
    employer_rate: Decimal,
    status: String,
    created_by: u64,
    approved_by: Option<u64>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<InsuranceBracketRow> for InsuranceBracket {
    type Error = StoreError;

    fn try_from(row: InsuranceBracketRow) -> StoreResult<Self> {
        Ok(InsuranceBracket {
            id: row.id,
            name: row.name,
            min_salary: row.min_salary,
            max_salary: row.max_salary,
            employee_rate: row.employee_rate,
            employer_rate: row.employer_rate,
            status: parse(&row.status)?,
            created_by: row.created_by,
            approved_by: row.approved_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

impl MySqlStore {
    async fn select_tax_rules<'e, E>(
        executor: E,
        status: Option<ConfigStatus>,
    ) -> StoreResult<Vec<TaxRule>>
    where
        E: Executor<'e, Database = MySql>,
    {
        let mut qb = QueryBuilder::<MySql>::new(format!("SELECT {TAX_COLUMNS} FROM tax_rules"));
        if let Some(status) = status {
            qb.push(" WHERE status = ").push_bind(status.to_string());
        }
        qb.push(" ORDER BY id");
        let rows: Vec<TaxRuleRow> = qb.build_query_as().fetch_all(executor).await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn select_insurance_brackets<'e, E>(
        executor: E,
        status: Option<ConfigStatus>,
    ) -> StoreResult<Vec<InsuranceBracket>>
    where
        E: Executor<'e, Database = MySql>,
    {
        let mut qb = QueryBuilder::<MySql>::new(format!(
            "SELECT {BRACKET_COLUMNS} FROM insurance_brackets"
        ));
        if let Some(status) = status {
            qb.push(" WHERE status = ").push_bind(status.to_string());
        }
        qb.push(" ORDER BY id");
        let rows: Vec<InsuranceBracketRow> = qb.build_query_as().fetch_all(executor).await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// Draft -> approved, or `Conflict` when already approved.
    async fn approve_config(
        &self,
        table: &'static str,
        entity: &'static str,
        id: u64,
        actor: u64,
    ) -> StoreResult<()> {
        let result = sqlx::query(&format!(
            "UPDATE {table} SET status = ?, approved_by = ?, updated_at = ? WHERE id = ? AND status = ?"
        ))
        .bind(ConfigStatus::Approved.to_string())
        .bind(actor)
        .bind(Utc::now())
        .bind(id)
        .bind(ConfigStatus::Draft.to_string())
        .execute(&self.pool)
        .await?;
        if result.rows_affected() > 0 {
            return Ok(());
        }

        let exists: Option<u64> = sqlx::query_scalar(&format!("SELECT id FROM {table} WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        match exists {
            Some(_) => Err(StoreError::Conflict(format!("{entity} {id} already approved"))),
            None => Err(StoreError::not_found(entity, id)),
        }
    }
}

impl StatutoryStore for MySqlStore {
    fn insert_tax_rule<'a>(&'a self, rule: &'a NewTaxRule, actor: u64) -> StoreFuture<'a, TaxRule> {
        Box::pin(async move {
            let now = Utc::now();
            let status = ConfigStatus::Draft;
            let result = sqlx::query(
                r#"
                INSERT INTO tax_rules
                (name, description, rate, min_salary, max_salary, status, created_by, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&rule.name)
            .bind(&rule.description)
            .bind(rule.rate)
            .bind(rule.min_salary)
            .bind(rule.max_salary)
            .bind(status.to_string())
            .bind(actor)
            .bind(now)
            .bind(now)
            .execute(&self.pool)
            .await?;

            Ok(TaxRule {
                id: result.last_insert_id(),
                name: rule.name.clone(),
                description: rule.description.clone(),
                rate: rule.rate,
                min_salary: rule.min_salary,
                max_salary: rule.max_salary,
                status,
                created_by: actor,
                approved_by: None,
                created_at: now,
                updated_at: now,
            })
        })
    }

    fn list_tax_rules(&self, status: Option<ConfigStatus>) -> StoreFuture<'_, Vec<TaxRule>> {
        Box::pin(Self::select_tax_rules(&self.pool, status))
    }

    fn approve_tax_rule(&self, id: u64, actor: u64) -> StoreFuture<'_, TaxRule> {
        Box::pin(async move {
            self.approve_config("tax_rules", "tax rule", id, actor).await?;
            let row: TaxRuleRow =
                sqlx::query_as(&format!("SELECT {TAX_COLUMNS} FROM tax_rules WHERE id = ?"))
                    .bind(id)
                    .fetch_one(&self.pool)
                    .await?;
            row.try_into()
        })
    }

    fn insert_insurance_bracket<'a>(
        &'a self,
        bracket: &'a NewInsuranceBracket,
        actor: u64,
    ) -> StoreFuture<'a, InsuranceBracket> {
        Box::pin(async move {
            let now = Utc::now();
            let status = ConfigStatus::Draft;
            let result = sqlx::query(
                r#"
                INSERT INTO insurance_brackets
                (name, min_salary, max_salary, employee_rate, employer_rate, status, created_by,
                 created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&bracket.name)
            .bind(bracket.min_salary)
            .bind(bracket.max_salary)
            .bind(bracket.employee_rate)
            .bind(bracket.employer_rate)
            .bind(status.to_string())
            .bind(actor)
            .bind(now)
            .bind(now)
            .execute(&self.pool)
            .await?;

            Ok(InsuranceBracket {
                id: result.last_insert_id(),
                name: bracket.name.clone(),
                min_salary: bracket.min_salary,
                max_salary: bracket.max_salary,
                employee_rate: bracket.employee_rate,
                employer_rate: bracket.employer_rate,
                status,
                created_by: actor,
                approved_by: None,
                created_at: now,
                updated_at: now,
            })
        })
    }

    fn list_insurance_brackets(
        &self,
        status: Option<ConfigStatus>,
    ) -> StoreFuture<'_, Vec<InsuranceBracket>> {
        Box::pin(Self::select_insurance_brackets(&self.pool, status))
    }

    fn approve_insurance_bracket(&self, id: u64, actor: u64) -> StoreFuture<'_, InsuranceBracket> {
        Box::pin(async move {
            self.approve_config("insurance_brackets", "insurance bracket", id, actor)
                .await?;
            let row: InsuranceBracketRow = sqlx::query_as(&format!(
                "SELECT {BRACKET_COLUMNS} FROM insurance_brackets WHERE id = ?"
            ))
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
            row.try_into()
        })
    }

    fn statutory_snapshot(&self) -> StoreFuture<'_, StatutorySnapshot> {
        Box::pin(async move {
            // Both reads share one InnoDB read view.
            let mut tx = self.pool.begin().await?;
            let tax_rules = Self::select_tax_rules(&mut *tx, Some(ConfigStatus::Approved)).await?;
            let insurance_brackets =
                Self::select_insurance_brackets(&mut *tx, Some(ConfigStatus::Approved)).await?;
            tx.commit().await?;
            Ok(StatutorySnapshot {
                tax_rules,
                insurance_brackets,
            })
        })
    }
}
