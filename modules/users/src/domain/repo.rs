use crate::contract::model::User;
use async_trait::async_trait;
use dbkit::QueryCtx;

/// Port for the domain layer: persistence operations the domain needs.
///
/// Every call runs under the caller's [`QueryCtx`]. A keyed statement that
/// matches no row fails with `sqlx::Error::RowNotFound`
/// (see [`dbkit::DbError::is_row_not_found`]).
#[async_trait]
pub trait UsersRepository: Send + Sync {
    /// Insert `name`/`email`; writes the generated `id` and `created_at` back.
    async fn create(&self, ctx: &QueryCtx, user: &mut User) -> dbkit::Result<()>;
    /// Load a user by id.
    async fn get_by_id(&self, ctx: &QueryCtx, id: i64) -> dbkit::Result<User>;
    /// All users ordered by id ascending.
    async fn list_all(&self, ctx: &QueryCtx) -> dbkit::Result<Vec<User>>;
    /// Overwrite `name`/`email` of the row `user.id`; reads `created_at` back.
    async fn update(&self, ctx: &QueryCtx, user: &mut User) -> dbkit::Result<()>;
    /// Delete by id. Returns true if a row was deleted.
    async fn delete(&self, ctx: &QueryCtx, id: i64) -> dbkit::Result<bool>;
}
