use chrono::{DateTime, Utc};
use sqlx::FromRow;

use crate::error::{StoreError, StoreResult};
use crate::model::user::{NewUser, RefreshTokenRecord, User};
use crate::store::{StoreFuture, UserStore};

use super::{MySqlStore, parse};

#[derive(FromRow)]
struct UserRow {
    id: u64,
    username: String,
    password_hash: String,
    role: String,
    employee_id: Option<u64>,
    is_active: bool,
}

impl TryFrom<UserRow> for User {
    type Error = StoreError;

    fn try_from(row: UserRow) -> StoreResult<Self> {
        Ok(User {
            id: row.id,
            username: row.username,
            password_hash: row.password_hash,
            role: parse(&row.role)?,
            employee_id: row.employee_id,
            is_active: row.is_active,
        })
    }
}

#[derive(FromRow)]
struct RefreshTokenRow {
    id: u64,
    user_id: u64,
    jti: String,
    expires_at: DateTime<Utc>,
    revoked: bool,
}

impl From<RefreshTokenRow> for RefreshTokenRecord {
    fn from(row: RefreshTokenRow) -> Self {
        RefreshTokenRecord {
            id: row.id,
            user_id: row.user_id,
            jti: row.jti,
            expires_at: row.expires_at,
            revoked: row.revoked,
        }
    }
}

impl UserStore for MySqlStore {
    fn insert_user<'a>(&'a self, user: &'a NewUser) -> StoreFuture<'a, User> {
        Box::pin(async move {
            let result = sqlx::query(
                "INSERT INTO users (username, password_hash, role, employee_id) VALUES (?, ?, ?, ?)",
            )
            .bind(&user.username)
            .bind(&user.password_hash)
            .bind(user.role.to_string())
            .bind(user.employee_id)
            .execute(&self.pool)
            .await?;

            Ok(User {
                id: result.last_insert_id(),
                username: user.username.clone(),
                password_hash: user.password_hash.clone(),
                role: user.role,
                employee_id: user.employee_id,
                is_active: true,
            })
        })
    }

    fn find_user_by_username<'a>(&'a self, username: &'a str) -> StoreFuture<'a, Option<User>> {
        Box::pin(async move {
            let row: Option<UserRow> = sqlx::query_as(
                "SELECT id, username, password_hash, role, employee_id, is_active FROM users WHERE username = ?",
            )
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;
            row.map(User::try_from).transpose()
        })
    }

    fn touch_last_login(&self, user_id: u64) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            sqlx::query("UPDATE users SET last_login_at = ? WHERE id = ?")
                .bind(Utc::now())
                .bind(user_id)
                .execute(&self.pool)
                .await?;
            Ok(())
        })
    }

    fn insert_refresh_token<'a>(
        &'a self,
        user_id: u64,
        jti: &'a str,
        expires_at: DateTime<Utc>,
    ) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            sqlx::query("INSERT INTO refresh_tokens (user_id, jti, expires_at) VALUES (?, ?, ?)")
                .bind(user_id)
                .bind(jti)
                .bind(expires_at)
                .execute(&self.pool)
                .await?;
            Ok(())
        })
    }

    fn find_refresh_token<'a>(
        &'a self,
        jti: &'a str,
    ) -> StoreFuture<'a, Option<RefreshTokenRecord>> {
        Box::pin(async move {
            let row: Option<RefreshTokenRow> = sqlx::query_as(
                "SELECT id, user_id, jti, expires_at, revoked FROM refresh_tokens WHERE jti = ?",
            )
            .bind(jti)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row.map(Into::into))
        })
    }

    fn rotate_refresh_token<'a>(
        &'a self,
        old_jti: &'a str,
        user_id: u64,
        new_jti: &'a str,
        expires_at: DateTime<Utc>,
    ) -> StoreFuture<'a, bool> {
        Box::pin(async move {
            let mut tx = self.pool.begin().await?;

            let revoked =
                sqlx::query("UPDATE refresh_tokens SET revoked = TRUE WHERE jti = ? AND revoked = FALSE")
                    .bind(old_jti)
                    .execute(&mut *tx)
                    .await?;
            if revoked.rows_affected() == 0 {
                return Ok(false);
            }

            sqlx::query("INSERT INTO refresh_tokens (user_id, jti, expires_at) VALUES (?, ?, ?)")
                .bind(user_id)
                .bind(new_jti)
                .bind(expires_at)
                .execute(&mut *tx)
                .await?;

            tx.commit().await?;
            Ok(true)
        })
    }

    fn revoke_refresh_token<'a>(&'a self, jti: &'a str) -> StoreFuture<'a, bool> {
        Box::pin(async move {
            let result =
                sqlx::query("UPDATE refresh_tokens SET revoked = TRUE WHERE jti = ? AND revoked = FALSE")
                    .bind(jti)
                    .execute(&self.pool)
                    .await?;
            Ok(result.rows_affected() > 0)
        })
    }
}
