//! PostgreSQL-backed implementation of the domain repository port.
//!
//! One SQL statement per operation, all executed through the caller's
//! [`QueryCtx`] so the request deadline bounds every round trip.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dbkit::QueryCtx;
use sqlx::PgPool;
use tracing::debug;

use crate::contract::model::User;
use crate::domain::repo::UsersRepository;

const INSERT_USER: &str = "INSERT INTO users (name, email) VALUES ($1, $2) RETURNING id, created_at";
const SELECT_USER: &str = "SELECT id, name, email, created_at FROM users WHERE id = $1";
const SELECT_USERS: &str = "SELECT id, name, email, created_at FROM users ORDER BY id";
const UPDATE_USER: &str = "UPDATE users SET name = $1, email = $2 WHERE id = $3 RETURNING created_at";
const DELETE_USER: &str = "DELETE FROM users WHERE id = $1";

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: i64,
    name: String,
    email: String,
    created_at: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            email: row.email,
            created_at: row.created_at,
        }
    }
}

/// sqlx adapter over a shared pool.
#[derive(Clone)]
pub struct PgUsersRepository {
    pool: PgPool,
}

impl PgUsersRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UsersRepository for PgUsersRepository {
    async fn create(&self, ctx: &QueryCtx, user: &mut User) -> dbkit::Result<()> {
        let (id, created_at): (i64, DateTime<Utc>) = ctx
            .run(
                sqlx::query_as::<_, (i64, DateTime<Utc>)>(INSERT_USER)
                    .bind(&user.name)
                    .bind(&user.email)
                    .fetch_one(&self.pool),
            )
            .await?;

        user.id = id;
        user.created_at = created_at;
        debug!(user_id = id, "inserted user row");
        Ok(())
    }

    async fn get_by_id(&self, ctx: &QueryCtx, id: i64) -> dbkit::Result<User> {
        let row: UserRow = ctx
            .run(sqlx::query_as::<_, UserRow>(SELECT_USER).bind(id).fetch_one(&self.pool))
            .await?;
        Ok(row.into())
    }

    async fn list_all(&self, ctx: &QueryCtx) -> dbkit::Result<Vec<User>> {
        let rows: Vec<UserRow> = ctx
            .run(sqlx::query_as::<_, UserRow>(SELECT_USERS).fetch_all(&self.pool))
            .await?;
        debug!(count = rows.len(), "fetched user rows");
        Ok(rows.into_iter().map(User::from).collect())
    }

    async fn update(&self, ctx: &QueryCtx, user: &mut User) -> dbkit::Result<()> {
        let created_at: DateTime<Utc> = ctx
            .run(
                sqlx::query_scalar::<_, DateTime<Utc>>(UPDATE_USER)
                    .bind(&user.name)
                    .bind(&user.email)
                    .bind(user.id)
                    .fetch_one(&self.pool),
            )
            .await?;

        user.created_at = created_at;
        debug!(user_id = user.id, "updated user row");
        Ok(())
    }

    async fn delete(&self, ctx: &QueryCtx, id: i64) -> dbkit::Result<bool> {
        let done = ctx
            .run(sqlx::query(DELETE_USER).bind(id).execute(&self.pool))
            .await?;
        debug!(user_id = id, rows = done.rows_affected(), "delete executed");
        Ok(done.rows_affected() > 0)
    }
}
