// src/models/user.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// Represents the 'users' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct User {
    pub id: i64,

    /// Unique login email.
    pub email: String,

    /// Argon2 password hash.
    /// Skipped during serialization to prevent leaking sensitive data.
    #[serde(skip)]
    pub password: String,

    pub full_name: String,

    /// User role: 'student' or 'admin'.
    pub role: String,

    /// Tenant the candidate belongs to. NULL = no organization.
    pub organization_id: Option<i64>,

    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// The env-configured super admin. Never stored in the database; it exists
/// only as long as the process configuration says so.
#[derive(Debug, Clone)]
pub struct AdminPrincipal {
    pub email: String,
}

/// Resolved acting principal.
///
/// Modeled as a variant instead of a fabricated `User` row so code cannot
/// accidentally persist or foreign-key the virtual admin.
#[derive(Debug, Clone)]
pub enum Identity {
    Student(User),
    Admin(AdminPrincipal),
}

impl Identity {
    /// Claims user id: the row id for students, 0 for the virtual admin.
    pub fn user_id(&self) -> i64 {
        match self {
            Identity::Student(u) => u.id,
            Identity::Admin(_) => 0,
        }
    }

    pub fn organization_id(&self) -> Option<i64> {
        match self {
            Identity::Student(u) => u.organization_id,
            Identity::Admin(_) => None,
        }
    }

    pub fn is_admin(&self) -> bool {
        match self {
            Identity::Student(u) => u.role == "admin",
            Identity::Admin(_) => true,
        }
    }

    pub fn display_name(&self) -> &str {
        match self {
            Identity::Student(u) => &u.full_name,
            Identity::Admin(_) => "Super Admin",
        }
    }
}

/// DTO for registration.
#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(email(message = "A valid email address is required."))]
    pub email: String,
    #[validate(length(
        min = 6,
        max = 128,
        message = "Password length must be between 6 and 128 characters."
    ))]
    pub password: String,
    #[validate(length(min = 1, max = 100))]
    pub full_name: String,
    pub organization_id: Option<i64>,
}

/// DTO for login.
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, max = 200))]
    pub email: String,
    #[validate(length(min = 1, max = 128))]
    pub password: String,
}
