use crate::account::repo::{AccountRepository, PgAccountRepository};
use crate::config::{AppConfig, MailTransport};
use crate::mail::{ConsoleMailSender, HttpMailSender, MailSender};
use anyhow::Context;
use sqlx::PgPool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub accounts: Arc<dyn AccountRepository>,
    pub mailer: Arc<dyn MailSender>,
}

impl AppState {
    /// Builds the production state around an already migrated pool.
    pub fn init(config: AppConfig, db: PgPool) -> anyhow::Result<Self> {
        let mailer: Arc<dyn MailSender> = match config.mail.transport {
            MailTransport::Console => Arc::new(ConsoleMailSender),
            MailTransport::Http => {
                Arc::new(HttpMailSender::new(&config.mail).context("init http mail sender")?)
            }
        };
        let accounts = Arc::new(PgAccountRepository::new(db)) as Arc<dyn AccountRepository>;
        Ok(Self::from_parts(Arc::new(config), accounts, mailer))
    }

    pub fn from_parts(
        config: Arc<AppConfig>,
        accounts: Arc<dyn AccountRepository>,
        mailer: Arc<dyn MailSender>,
    ) -> Self {
        Self {
            config,
            accounts,
            mailer,
        }
    }
}
