use sqlx::FromRow;
use time::OffsetDateTime;

/// Account record in the database.
#[derive(Debug, Clone, FromRow)]
pub struct Account {
    pub id: i64,
    pub email: String,
    pub nickname: String,
    pub password: String, // Argon2 PHC string
    pub email_verified: bool,
    pub email_check_token: Option<String>,
    pub email_check_token_generated_at: Option<OffsetDateTime>,
    pub joined_at: Option<OffsetDateTime>,
    pub study_created_by_email: bool,
    pub study_created_by_web: bool,
    pub study_enrollment_result_by_email: bool,
    pub study_enrollment_result_by_web: bool,
    pub study_updated_by_email: bool,
    pub study_updated_by_web: bool,
    /// Bumped on logout; session tokens carrying an older value are rejected.
    pub session_version: i64,
}

/// Values needed to insert a fresh account row.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub email: String,
    pub nickname: String,
    pub password: String,
    pub email_check_token: String,
    pub email_check_token_generated_at: OffsetDateTime,
    pub study_created_by_web: bool,
    pub study_enrollment_result_by_web: bool,
    pub study_updated_by_web: bool,
}

impl Account {
    pub fn is_valid_token(&self, token: &str) -> bool {
        matches!(&self.email_check_token, Some(t) if t == token)
    }
}
