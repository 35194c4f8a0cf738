use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Internal staff member who schedules interviews.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
}
