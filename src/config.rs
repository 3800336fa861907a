use anyhow::Context;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
    pub cookie_name: String,
    pub cookie_secure: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailTransport {
    Console,
    Http,
}

#[derive(Debug, Clone)]
pub struct MailConfig {
    pub transport: MailTransport,
    pub from: String,
    pub api_url: String,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    /// Absolute URL prefixed to links sent by email.
    pub base_url: String,
    pub session: SessionConfig,
    pub mail: MailConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL")?;
        let session = SessionConfig {
            secret: std::env::var("SESSION_SECRET").context("SESSION_SECRET")?,
            issuer: std::env::var("SESSION_ISSUER").unwrap_or_else(|_| "studyolle".into()),
            audience: std::env::var("SESSION_AUDIENCE").unwrap_or_else(|_| "studyolle-web".into()),
            ttl_minutes: std::env::var("SESSION_TTL_MINUTES")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(60 * 24),
            cookie_name: std::env::var("SESSION_COOKIE_NAME").unwrap_or_else(|_| "SESSION".into()),
            cookie_secure: std::env::var("SESSION_COOKIE_SECURE")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
        };
        let mail = MailConfig {
            transport: parse_transport(
                &std::env::var("MAIL_TRANSPORT").unwrap_or_else(|_| "console".into()),
            )?,
            from: std::env::var("MAIL_FROM").unwrap_or_else(|_| "noreply@studyolle.local".into()),
            api_url: std::env::var("MAIL_API_URL")
                .unwrap_or_else(|_| "https://api.resend.com/emails".into()),
            api_key: std::env::var("MAIL_API_KEY").ok(),
        };
        let base_url = std::env::var("APP_BASE_URL")
            .unwrap_or_else(|_| "http://localhost:8080".into())
            .trim_end_matches('/')
            .to_string();
        Ok(Self {
            database_url,
            base_url,
            session,
            mail,
        })
    }
}

fn parse_transport(raw: &str) -> anyhow::Result<MailTransport> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "console" => Ok(MailTransport::Console),
        "http" => Ok(MailTransport::Http),
        other => anyhow::bail!("unknown MAIL_TRANSPORT: {other}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_transports() {
        assert_eq!(parse_transport("console").unwrap(), MailTransport::Console);
        assert_eq!(parse_transport(" HTTP ").unwrap(), MailTransport::Http);
    }

    #[test]
    fn rejects_unknown_transport() {
        let err = parse_transport("smtp").unwrap_err();
        assert!(err.to_string().contains("smtp"));
    }
}
