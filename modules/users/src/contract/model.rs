use chrono::{DateTime, Utc};

/// A persisted user record.
///
/// `id` and `created_at` are assigned by the database on insert and never
/// change afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

/// Data for creating a new user.
#[derive(Debug, Clone, Default)]
pub struct NewUser {
    pub name: String,
    pub email: String,
}

/// Full replacement of the mutable fields of a user.
#[derive(Debug, Clone, Default)]
pub struct UserUpdate {
    pub name: String,
    pub email: String,
}

impl NewUser {
    /// Record to hand to storage; `id` and `created_at` are filled in by the insert.
    pub fn into_user(self) -> User {
        User {
            id: 0,
            name: self.name,
            email: self.email,
            created_at: DateTime::<Utc>::default(),
        }
    }
}
