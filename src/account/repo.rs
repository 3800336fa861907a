use axum::async_trait;
use sqlx::PgPool;
use thiserror::Error;
use time::OffsetDateTime;

use crate::account::repo_types::{Account, NewAccount};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("{0} already taken")]
    Duplicate(&'static str),
    #[error("account {0} not found")]
    NotFound(i64),
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

pub type RepoResult<T> = Result<T, RepoError>;

#[async_trait]
pub trait AccountRepository: Send + Sync {
    async fn exists_by_email(&self, email: &str) -> RepoResult<bool>;
    async fn exists_by_nickname(&self, nickname: &str) -> RepoResult<bool>;
    async fn find_by_id(&self, id: i64) -> RepoResult<Option<Account>>;
    async fn find_by_email(&self, email: &str) -> RepoResult<Option<Account>>;
    async fn find_by_nickname(&self, nickname: &str) -> RepoResult<Option<Account>>;
    async fn save(&self, new: NewAccount) -> RepoResult<Account>;
    async fn update_email_check_token(
        &self,
        id: i64,
        token: &str,
        generated_at: OffsetDateTime,
    ) -> RepoResult<()>;
    /// Marks the email verified, stamps `joined_at` and consumes the token.
    async fn complete_sign_up(&self, id: i64, joined_at: OffsetDateTime) -> RepoResult<Account>;
    async fn clear_email_check_token(&self, id: i64) -> RepoResult<()>;
    /// Invalidates every session issued so far; returns the new version.
    async fn bump_session_version(&self, id: i64) -> RepoResult<i64>;
    async fn count(&self) -> RepoResult<i64>;
}

const ACCOUNT_COLUMNS: &str = r#"
    id, email, nickname, password, email_verified,
    email_check_token, email_check_token_generated_at, joined_at,
    study_created_by_email, study_created_by_web,
    study_enrollment_result_by_email, study_enrollment_result_by_web,
    study_updated_by_email, study_updated_by_web, session_version
"#;

#[derive(Clone)]
pub struct PgAccountRepository {
    db: PgPool,
}

impl PgAccountRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    async fn find_one(&self, column: &str, value: &str) -> RepoResult<Option<Account>> {
        let sql = format!("SELECT {ACCOUNT_COLUMNS} FROM account WHERE {column} = $1");
        let account = sqlx::query_as::<_, Account>(&sql)
            .bind(value)
            .fetch_optional(&self.db)
            .await?;
        Ok(account)
    }
}

/// Form field behind a violated unique constraint (`account_nickname_key`, ...).
fn duplicate_field(constraint: Option<&str>) -> &'static str {
    match constraint {
        Some(c) if c.contains("nickname") => "nickname",
        _ => "email",
    }
}

fn map_unique_violation(e: sqlx::Error) -> RepoError {
    if let sqlx::Error::Database(db_err) = &e {
        if db_err.is_unique_violation() {
            return RepoError::Duplicate(duplicate_field(db_err.constraint()));
        }
    }
    RepoError::Db(e)
}

#[async_trait]
impl AccountRepository for PgAccountRepository {
    async fn exists_by_email(&self, email: &str) -> RepoResult<bool> {
        let exists: bool =
            sqlx::query_scalar(r#"SELECT EXISTS(SELECT 1 FROM account WHERE email = $1)"#)
                .bind(email)
                .fetch_one(&self.db)
                .await?;
        Ok(exists)
    }

    async fn exists_by_nickname(&self, nickname: &str) -> RepoResult<bool> {
        let exists: bool =
            sqlx::query_scalar(r#"SELECT EXISTS(SELECT 1 FROM account WHERE nickname = $1)"#)
                .bind(nickname)
                .fetch_one(&self.db)
                .await?;
        Ok(exists)
    }

    async fn find_by_id(&self, id: i64) -> RepoResult<Option<Account>> {
        let sql = format!("SELECT {ACCOUNT_COLUMNS} FROM account WHERE id = $1");
        let account = sqlx::query_as::<_, Account>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        Ok(account)
    }

    async fn find_by_email(&self, email: &str) -> RepoResult<Option<Account>> {
        self.find_one("email", email).await
    }

    async fn find_by_nickname(&self, nickname: &str) -> RepoResult<Option<Account>> {
        self.find_one("nickname", nickname).await
    }

    async fn save(&self, new: NewAccount) -> RepoResult<Account> {
        let sql = format!(
            r#"
            INSERT INTO account (
                email, nickname, password,
                email_check_token, email_check_token_generated_at,
                study_created_by_web, study_enrollment_result_by_web, study_updated_by_web
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {ACCOUNT_COLUMNS}
            "#
        );
        sqlx::query_as::<_, Account>(&sql)
            .bind(&new.email)
            .bind(&new.nickname)
            .bind(&new.password)
            .bind(&new.email_check_token)
            .bind(new.email_check_token_generated_at)
            .bind(new.study_created_by_web)
            .bind(new.study_enrollment_result_by_web)
            .bind(new.study_updated_by_web)
            .fetch_one(&self.db)
            .await
            .map_err(map_unique_violation)
    }

    async fn update_email_check_token(
        &self,
        id: i64,
        token: &str,
        generated_at: OffsetDateTime,
    ) -> RepoResult<()> {
        let res = sqlx::query(
            r#"
            UPDATE account
            SET email_check_token = $2, email_check_token_generated_at = $3
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(token)
        .bind(generated_at)
        .execute(&self.db)
        .await?;
        if res.rows_affected() == 0 {
            return Err(RepoError::NotFound(id));
        }
        Ok(())
    }

    async fn complete_sign_up(&self, id: i64, joined_at: OffsetDateTime) -> RepoResult<Account> {
        let sql = format!(
            r#"
            UPDATE account
            SET email_verified = TRUE, joined_at = $2, email_check_token = NULL
            WHERE id = $1
            RETURNING {ACCOUNT_COLUMNS}
            "#
        );
        sqlx::query_as::<_, Account>(&sql)
            .bind(id)
            .bind(joined_at)
            .fetch_optional(&self.db)
            .await?
            .ok_or(RepoError::NotFound(id))
    }

    async fn clear_email_check_token(&self, id: i64) -> RepoResult<()> {
        sqlx::query(r#"UPDATE account SET email_check_token = NULL WHERE id = $1"#)
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    async fn bump_session_version(&self, id: i64) -> RepoResult<i64> {
        sqlx::query_scalar(
            r#"
            UPDATE account
            SET session_version = session_version + 1
            WHERE id = $1
            RETURNING session_version
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?
        .ok_or(RepoError::NotFound(id))
    }

    async fn count(&self) -> RepoResult<i64> {
        let n: i64 = sqlx::query_scalar(r#"SELECT COUNT(*) FROM account"#)
            .fetch_one(&self.db)
            .await?;
        Ok(n)
    }
}
