use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::{Executor, FromRow, MySql, QueryBuilder};

use crate::error::{StoreError, StoreResult};
use crate::model::policy::{
    Holiday, HolidayUpdate, LatenessRule, LatenessRuleUpdate, NewHoliday, NewLatenessRule,
    NewOvertimeRule, OvertimeRule, OvertimeRuleUpdate,
};
use crate::store::{PolicyStore, StoreFuture};

use super::{MySqlStore, expect_row, parse};

const OVERTIME_COLUMNS: &str = "id, name, description, threshold_hours, multiplier, active, \
     approved, created_by, updated_by, created_at, updated_at";
const LATENESS_COLUMNS: &str = "id, name, description, grace_period_minutes, \
     deduction_per_minute, active, approved, created_by, updated_by, created_at, updated_at";
const HOLIDAY_COLUMNS: &str = "id, name, holiday_type, start_date, end_date, active, created_by, \
     updated_by, created_at, updated_at";

#[derive(FromRow)]
struct OvertimeRuleRow {
    id: u64,
    name: String,
    description: Option<String>,
    threshold_hours: Decimal,
    multiplier: Decimal,
    active: bool,
    approved: bool,
    created_by: u64,
    updated_by: Option<u64>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<OvertimeRuleRow> for OvertimeRule {
    fn from(row: OvertimeRuleRow) -> Self {
        OvertimeRule {
            id: row.id,
            name: row.name,
            description: row.description,
            threshold_hours: row.threshold_hours,
            multiplier: row.multiplier,
            active: row.active,
            approved: row.approved,
            created_by: row.created_by,
            updated_by: row.updated_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(FromRow)]
struct LatenessRuleRow {
    id: u64,
    name: String,
    description: Option<String>,
    grace_period_minutes: u32,
    deduction_per_minute: Decimal,
    active: bool,
    approved: bool,
    created_by: u64,
    updated_by: Option<u64>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<LatenessRuleRow> for LatenessRule {
    fn from(row: LatenessRuleRow) -> Self {
        LatenessRule {
            id: row.id,
            name: row.name,
            description: row.description,
            grace_period_minutes: row.grace_period_minutes,
            deduction_per_minute: row.deduction_per_minute,
            active: row.active,
            approved: row.approved,
            created_by: row.created_by,
            updated_by: row.updated_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(FromRow)]
struct HolidayRow {
    id: u64,
    name: String,
    holiday_type: String,
    start_date: NaiveDate,
    end_date: Option<NaiveDate>,
    active: bool,
    created_by: u64,
    updated_by: Option<u64>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<HolidayRow> for Holiday {
    type Error = StoreError;

    fn try_from(row: HolidayRow) -> StoreResult<Self> {
        Ok(Holiday {
            id: row.id,
            name: row.name,
            holiday_type: parse(&row.holiday_type)?,
            start_date: row.start_date,
            end_date: row.end_date,
            active: row.active,
            created_by: row.created_by,
            updated_by: row.updated_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

impl MySqlStore {
    async fn fetch_overtime_rule<'e, E>(executor: E, id: u64, lock: bool) -> StoreResult<OvertimeRule>
    where
        E: Executor<'e, Database = MySql>,
    {
        let sql = format!(
            "SELECT {OVERTIME_COLUMNS} FROM overtime_rules WHERE id = ?{}",
            if lock { " FOR UPDATE" } else { "" }
        );
        let row: Option<OvertimeRuleRow> =
            sqlx::query_as(&sql).bind(id).fetch_optional(executor).await?;
        row.map(Into::into)
            .ok_or_else(|| StoreError::not_found("overtime rule", id))
    }

    async fn write_overtime_rule<'e, E>(executor: E, rule: &OvertimeRule) -> StoreResult<()>
    where
        E: Executor<'e, Database = MySql>,
    {
        let result = sqlx::query(
            r#"
            UPDATE overtime_rules
            SET name = ?, description = ?, threshold_hours = ?, multiplier = ?, active = ?,
                approved = ?, updated_by = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&rule.name)
        .bind(&rule.description)
        .bind(rule.threshold_hours)
        .bind(rule.multiplier)
        .bind(rule.active)
        .bind(rule.approved)
        .bind(rule.updated_by)
        .bind(rule.updated_at)
        .bind(rule.id)
        .execute(executor)
        .await?;
        expect_row(result, "overtime rule", rule.id)
    }

    async fn fetch_lateness_rule<'e, E>(executor: E, id: u64, lock: bool) -> StoreResult<LatenessRule>
    where
        E: Executor<'e, Database = MySql>,
    {
        let sql = format!(
            "SELECT {LATENESS_COLUMNS} FROM lateness_rules WHERE id = ?{}",
            if lock { " FOR UPDATE" } else { "" }
        );
        let row: Option<LatenessRuleRow> =
            sqlx::query_as(&sql).bind(id).fetch_optional(executor).await?;
        row.map(Into::into)
            .ok_or_else(|| StoreError::not_found("lateness rule", id))
    }

    async fn write_lateness_rule<'e, E>(executor: E, rule: &LatenessRule) -> StoreResult<()>
    where
        E: Executor<'e, Database = MySql>,
    {
        let result = sqlx::query(
            r#"
            UPDATE lateness_rules
            SET name = ?, description = ?, grace_period_minutes = ?, deduction_per_minute = ?,
                active = ?, approved = ?, updated_by = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&rule.name)
        .bind(&rule.description)
        .bind(rule.grace_period_minutes)
        .bind(rule.deduction_per_minute)
        .bind(rule.active)
        .bind(rule.approved)
        .bind(rule.updated_by)
        .bind(rule.updated_at)
        .bind(rule.id)
        .execute(executor)
        .await?;
        expect_row(result, "lateness rule", rule.id)
    }

    async fn fetch_holiday<'e, E>(executor: E, id: u64, lock: bool) -> StoreResult<Holiday>
    where
        E: Executor<'e, Database = MySql>,
    {
        let sql = format!(
            "SELECT {HOLIDAY_COLUMNS} FROM holidays WHERE id = ?{}",
            if lock { " FOR UPDATE" } else { "" }
        );
        let row: Option<HolidayRow> =
            sqlx::query_as(&sql).bind(id).fetch_optional(executor).await?;
        row.ok_or_else(|| StoreError::not_found("holiday", id))?
            .try_into()
    }

    async fn delete_by_id(&self, table: &'static str, entity: &'static str, id: u64) -> StoreResult<()> {
        let result = sqlx::query(&format!("DELETE FROM {table} WHERE id = ?"))
            .bind(id)
            .execute(&self.pool)
            .await?;
        expect_row(result, entity, id)
    }
}

impl PolicyStore for MySqlStore {
    fn insert_overtime_rule<'a>(
        &'a self,
        rule: &'a NewOvertimeRule,
        actor: u64,
    ) -> StoreFuture<'a, OvertimeRule> {
        Box::pin(async move {
            let now = Utc::now();
            let result = sqlx::query(
                r#"
                INSERT INTO overtime_rules
                (name, description, threshold_hours, multiplier, active, approved, created_by,
                 created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, FALSE, ?, ?, ?)
                "#,
            )
            .bind(&rule.name)
            .bind(&rule.description)
            .bind(rule.threshold_hours)
            .bind(rule.multiplier)
            .bind(rule.active)
            .bind(actor)
            .bind(now)
            .bind(now)
            .execute(&self.pool)
            .await?;

            Ok(OvertimeRule {
                id: result.last_insert_id(),
                name: rule.name.clone(),
                description: rule.description.clone(),
                threshold_hours: rule.threshold_hours,
                multiplier: rule.multiplier,
                active: rule.active,
                approved: false,
                created_by: actor,
                updated_by: None,
                created_at: now,
                updated_at: now,
            })
        })
    }

    fn get_overtime_rule(&self, id: u64) -> StoreFuture<'_, OvertimeRule> {
        Box::pin(Self::fetch_overtime_rule(&self.pool, id, false))
    }

    fn list_overtime_rules(&self, active: Option<bool>) -> StoreFuture<'_, Vec<OvertimeRule>> {
        Box::pin(async move {
            let mut qb = QueryBuilder::<MySql>::new(format!(
                "SELECT {OVERTIME_COLUMNS} FROM overtime_rules"
            ));
            if let Some(active) = active {
                qb.push(" WHERE active = ").push_bind(active);
            }
            qb.push(" ORDER BY id");
            let rows: Vec<OvertimeRuleRow> = qb.build_query_as().fetch_all(&self.pool).await?;
            Ok(rows.into_iter().map(Into::into).collect())
        })
    }

    fn update_overtime_rule<'a>(
        &'a self,
        id: u64,
        update: &'a OvertimeRuleUpdate,
        actor: u64,
    ) -> StoreFuture<'a, OvertimeRule> {
        Box::pin(async move {
            let mut tx = self.pool.begin().await?;
            let mut rule = Self::fetch_overtime_rule(&mut *tx, id, true).await?;
            rule.apply(update);
            rule.updated_by = Some(actor);
            rule.updated_at = Utc::now();
            Self::write_overtime_rule(&mut *tx, &rule).await?;
            tx.commit().await?;
            Ok(rule)
        })
    }

    fn approve_overtime_rule(&self, id: u64, actor: u64) -> StoreFuture<'_, OvertimeRule> {
        Box::pin(async move {
            let mut tx = self.pool.begin().await?;
            let mut rule = Self::fetch_overtime_rule(&mut *tx, id, true).await?;
            rule.approved = true;
            rule.updated_by = Some(actor);
            rule.updated_at = Utc::now();
            Self::write_overtime_rule(&mut *tx, &rule).await?;
            tx.commit().await?;
            Ok(rule)
        })
    }

    fn delete_overtime_rule(&self, id: u64) -> StoreFuture<'_, ()> {
        Box::pin(self.delete_by_id("overtime_rules", "overtime rule", id))
    }

    fn insert_lateness_rule<'a>(
        &'a self,
        rule: &'a NewLatenessRule,
        actor: u64,
    ) -> StoreFuture<'a, LatenessRule> {
        Box::pin(async move {
            let now = Utc::now();
            let result = sqlx::query(
                r#"
                INSERT INTO lateness_rules
                (name, description, grace_period_minutes, deduction_per_minute, active, approved,
                 created_by, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, FALSE, ?, ?, ?)
                "#,
            )
            .bind(&rule.name)
            .bind(&rule.description)
            .bind(rule.grace_period_minutes)
            .bind(rule.deduction_per_minute)
            .bind(rule.active)
            .bind(actor)
            .bind(now)
            .bind(now)
            .execute(&self.pool)
            .await?;

            Ok(LatenessRule {
                id: result.last_insert_id(),
                name: rule.name.clone(),
                description: rule.description.clone(),
                grace_period_minutes: rule.grace_period_minutes,
                deduction_per_minute: rule.deduction_per_minute,
                active: rule.active,
                approved: false,
                created_by: actor,
                updated_by: None,
                created_at: now,
                updated_at: now,
            })
        })
    }

    fn get_lateness_rule(&self, id: u64) -> StoreFuture<'_, LatenessRule> {
        Box::pin(Self::fetch_lateness_rule(&self.pool, id, false))
    }

    fn list_lateness_rules(&self, active: Option<bool>) -> StoreFuture<'_, Vec<LatenessRule>> {
        Box::pin(async move {
            let mut qb = QueryBuilder::<MySql>::new(format!(
                "SELECT {LATENESS_COLUMNS} FROM lateness_rules"
            ));
            if let Some(active) = active {
                qb.push(" WHERE active = ").push_bind(active);
            }
            qb.push(" ORDER BY id");
            let rows: Vec<LatenessRuleRow> = qb.build_query_as().fetch_all(&self.pool).await?;
            Ok(rows.into_iter().map(Into::into).collect())
        })
    }

    fn update_lateness_rule<'a>(
        &'a self,
        id: u64,
        update: &'a LatenessRuleUpdate,
        actor: u64,
    ) -> StoreFuture<'a, LatenessRule> {
        Box::pin(async move {
            let mut tx = self.pool.begin().await?;
            let mut rule = Self::fetch_lateness_rule(&mut *tx, id, true).await?;
            rule.apply(update);
            rule.updated_by = Some(actor);
            rule.updated_at = Utc::now();
            Self::write_lateness_rule(&mut *tx, &rule).await?;
            tx.commit().await?;
            Ok(rule)
        })
    }

    fn approve_lateness_rule(&self, id: u64, actor: u64) -> StoreFuture<'_, LatenessRule> {
        Box::pin(async move {
            let mut tx = self.pool.begin().await?;
            let mut rule = Self::fetch_lateness_rule(&mut *tx, id, true).await?;
            rule.approved = true;
            rule.updated_by = Some(actor);
            rule.updated_at = Utc::now();
            Self::write_lateness_rule(&mut *tx, &rule).await?;
            tx.commit().await?;
            Ok(rule)
        })
    }

    fn delete_lateness_rule(&self, id: u64) -> StoreFuture<'_, ()> {
        Box::pin(self.delete_by_id("lateness_rules", "lateness rule", id))
    }

    fn insert_holiday<'a>(
        &'a self,
        holiday: &'a NewHoliday,
        actor: u64,
    ) -> StoreFuture<'a, Holiday> {
        Box::pin(async move {
            let now = Utc::now();
            let result = sqlx::query(
                r#"
                INSERT INTO holidays
                (name, holiday_type, start_date, end_date, active, created_by, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&holiday.name)
            .bind(holiday.holiday_type.to_string())
            .bind(holiday.start_date)
            .bind(holiday.end_date)
            .bind(holiday.active)
            .bind(actor)
            .bind(now)
            .bind(now)
            .execute(&self.pool)
            .await?;

            Ok(Holiday {
                id: result.last_insert_id(),
                name: holiday.name.clone(),
                holiday_type: holiday.holiday_type,
                start_date: holiday.start_date,
                end_date: holiday.end_date,
                active: holiday.active,
                created_by: actor,
                updated_by: None,
                created_at: now,
                updated_at: now,
            })
        })
    }

    fn get_holiday(&self, id: u64) -> StoreFuture<'_, Holiday> {
        Box::pin(Self::fetch_holiday(&self.pool, id, false))
    }

    fn list_holidays(&self, active: Option<bool>) -> StoreFuture<'_, Vec<Holiday>> {
        Box::pin(async move {
            let mut qb = QueryBuilder::<MySql>::new(format!(
                "SELECT {HOLIDAY_COLUMNS} FROM holidays"
            ));
            if let Some(active) = active {
                qb.push(" WHERE active = ").push_bind(active);
            }
            qb.push(" ORDER BY start_date, id");
            let rows: Vec<HolidayRow> = qb.build_query_as().fetch_all(&self.pool).await?;
            rows.into_iter().map(TryInto::try_into).collect()
        })
    }

    fn update_holiday<'a>(
        &'a self,
        id: u64,
        update: &'a HolidayUpdate,
        actor: u64,
    ) -> StoreFuture<'a, Holiday> {
        Box::pin(async move {
            let mut tx = self.pool.begin().await?;
            let mut holiday = Self::fetch_holiday(&mut *tx, id, true).await?;
            holiday.apply(update);
            holiday.updated_by = Some(actor);
            holiday.updated_at = Utc::now();

            sqlx::query(
                r#"
                UPDATE holidays
                SET name = ?, holiday_type = ?, start_date = ?, end_date = ?, active = ?,
                    updated_by = ?, updated_at = ?
                WHERE id = ?
                "#,
            )
            .bind(&holiday.name)
            .bind(holiday.holiday_type.to_string())
            .bind(holiday.start_date)
            .bind(holiday.end_date)
            .bind(holiday.active)
            .bind(holiday.updated_by)
            .bind(holiday.updated_at)
            .bind(id)
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;
            Ok(holiday)
        })
    }

    fn delete_holiday(&self, id: u64) -> StoreFuture<'_, ()> {
        Box::pin(self.delete_by_id("holidays", "holiday", id))
    }

    fn holidays_covering(&self, date: NaiveDate) -> StoreFuture<'_, Vec<Holiday>> {
        Box::pin(async move {
            let rows: Vec<HolidayRow> = sqlx::query_as(&format!(
                r#"
                SELECT {HOLIDAY_COLUMNS} FROM holidays
                WHERE active = TRUE AND start_date <= ? AND COALESCE(end_date, start_date) >= ?
                ORDER BY start_date, id
                "#
            ))
            .bind(date)
            .bind(date)
            .fetch_all(&self.pool)
            .await?;
            rows.into_iter().map(TryInto::try_into).collect()
        })
    }
}
