use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::contract::model::{NewUser, User, UserUpdate};

/// REST DTO for user representation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserDto {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

/// Request body shared by create and update.
///
/// Missing or `null` fields decode as empty strings and are rejected by
/// validation rather than by the decoder. Unknown fields are ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserReq {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

/// Body of every error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

// Conversion implementations between REST DTOs and contract models

impl From<User> for UserDto {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            created_at: user.created_at,
        }
    }
}

impl From<UserReq> for NewUser {
    fn from(req: UserReq) -> Self {
        Self {
            name: req.name.unwrap_or_default(),
            email: req.email.unwrap_or_default(),
        }
    }
}

impl From<UserReq> for UserUpdate {
    fn from(req: UserReq) -> Self {
        Self {
            name: req.name.unwrap_or_default(),
            email: req.email.unwrap_or_default(),
        }
    }
}
