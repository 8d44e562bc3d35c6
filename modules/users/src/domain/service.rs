use std::sync::Arc;

use crate::contract::model::{NewUser, User, UserUpdate};
use crate::domain::error::DomainError;
use crate::domain::repo::UsersRepository;
use dbkit::{DbError, QueryCtx};
use tracing::{debug, info, instrument};

pub const EMPTY_FIELDS_MESSAGE: &str = "name and email must not be empty";

/// Domain service with business rules for user management.
/// Depends only on the repository port, not on infra types.
#[derive(Clone)]
pub struct Service {
    repo: Arc<dyn UsersRepository>,
}

impl Service {
    pub fn new(repo: Arc<dyn UsersRepository>) -> Self {
        Self { repo }
    }

    #[instrument(
        name = "users.service.create_user",
        skip(self, ctx),
        fields(name = %new_user.name, email = %new_user.email)
    )]
    pub async fn create_user(&self, ctx: &QueryCtx, new_user: NewUser) -> Result<User, DomainError> {
        info!("Creating new user");
        validate_fields(&new_user.name, &new_user.email)?;

        let mut user = new_user.into_user();
        self.repo
            .create(ctx, &mut user)
            .await
            .map_err(|e| DomainError::database(format!("failed to create user: {e}")))?;

        info!(user_id = user.id, "Successfully created user");
        Ok(user)
    }

    #[instrument(name = "users.service.get_user", skip(self, ctx), fields(user_id = id))]
    pub async fn get_user(&self, ctx: &QueryCtx, id: i64) -> Result<User, DomainError> {
        debug!("Getting user by id");

        let user = self
            .repo
            .get_by_id(ctx, id)
            .await
            .map_err(|e| not_found_or(e, id, "failed to get user"))?;

        debug!("Successfully retrieved user");
        Ok(user)
    }

    #[instrument(name = "users.service.list_users", skip(self, ctx))]
    pub async fn list_users(&self, ctx: &QueryCtx) -> Result<Vec<User>, DomainError> {
        debug!("Listing users");

        let users = self
            .repo
            .list_all(ctx)
            .await
            .map_err(|e| DomainError::database(format!("failed to list users: {e}")))?;

        debug!("Successfully listed {} users", users.len());
        Ok(users)
    }

    #[instrument(name = "users.service.update_user", skip(self, ctx, update), fields(user_id = id))]
    pub async fn update_user(
        &self,
        ctx: &QueryCtx,
        id: i64,
        update: UserUpdate,
    ) -> Result<User, DomainError> {
        info!("Updating user");
        validate_fields(&update.name, &update.email)?;

        let mut user = User {
            id,
            name: update.name,
            email: update.email,
            created_at: Default::default(),
        };
        self.repo
            .update(ctx, &mut user)
            .await
            .map_err(|e| not_found_or(e, id, "failed to update user"))?;

        info!("Successfully updated user");
        Ok(user)
    }

    /// Deleting an id that does not exist is not an error.
    #[instrument(name = "users.service.delete_user", skip(self, ctx), fields(user_id = id))]
    pub async fn delete_user(&self, ctx: &QueryCtx, id: i64) -> Result<(), DomainError> {
        info!("Deleting user");

        let deleted = self
            .repo
            .delete(ctx, id)
            .await
            .map_err(|e| DomainError::database(format!("failed to delete user: {e}")))?;

        if deleted {
            info!("Successfully deleted user");
        } else {
            debug!("No user to delete");
        }
        Ok(())
    }
}

fn validate_fields(name: &str, email: &str) -> Result<(), DomainError> {
    if name.is_empty() || email.is_empty() {
        return Err(DomainError::validation(EMPTY_FIELDS_MESSAGE));
    }
    Ok(())
}

fn not_found_or(e: DbError, id: i64, action: &str) -> DomainError {
    if e.is_row_not_found() {
        DomainError::user_not_found(id)
    } else {
        DomainError::database(format!("{action}: {e}"))
    }
}
