use chrono::{DateTime, Utc};

use crate::model::role::Role;

#[derive(Debug, Clone)]
pub struct User {
    pub id: u64,
    pub username: String,
    pub password_hash: String,
    pub role: Role,
    pub employee_id: Option<u64>,
    pub is_active: bool,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub password_hash: String,
    pub role: Role,
    pub employee_id: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct RefreshTokenRecord {
    pub id: u64,
    pub user_id: u64,
    pub jti: String,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
}
