use std::time::Duration;

use anyhow::Context;
use axum::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, info};

use crate::config::MailConfig;

/// Plain-text message handed to a [`MailSender`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub text: String,
}

#[async_trait]
pub trait MailSender: Send + Sync {
    async fn send(&self, message: EmailMessage) -> anyhow::Result<()>;
}

/// Writes messages to the log instead of delivering them.
#[derive(Clone, Default)]
pub struct ConsoleMailSender;

#[async_trait]
impl MailSender for ConsoleMailSender {
    async fn send(&self, message: EmailMessage) -> anyhow::Result<()> {
        info!(to = %message.to, subject = %message.subject, text = %message.text, "mail (console)");
        Ok(())
    }
}

#[derive(Serialize)]
struct ApiEmail<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    text: &'a str,
}

/// Delivers through a JSON mail API (Resend-compatible payload).
#[derive(Clone)]
pub struct HttpMailSender {
    client: Client,
    api_url: String,
    api_key: String,
    from: String,
}

impl HttpMailSender {
    pub fn new(config: &MailConfig) -> anyhow::Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .context("MAIL_API_KEY is required for the http mail transport")?;
        let client = Client::builder()
            .user_agent("studyolle/0.1 (+reqwest)")
            .timeout(Duration::from_secs(30))
            .build()
            .context("build mail http client")?;
        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            api_key,
            from: config.from.clone(),
        })
    }
}

#[async_trait]
impl MailSender for HttpMailSender {
    async fn send(&self, message: EmailMessage) -> anyhow::Result<()> {
        let body = ApiEmail {
            from: &self.from,
            to: [&message.to],
            subject: &message.subject,
            text: &message.text,
        };
        let res = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .context("mail api request")?;

        let status = res.status();
        if !status.is_success() {
            let text = res.text().await.unwrap_or_default();
            anyhow::bail!("mail api error: HTTP {status}: {text}");
        }
        debug!(to = %message.to, %status, "mail delivered");
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MailTransport;
    use axum::{
        extract::State,
        http::{header::AUTHORIZATION, HeaderMap, StatusCode},
        routing::post,
        Json, Router,
    };
    use serde_json::Value;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<(Option<String>, Value)>>>);

    async fn accept(
        State(captured): State<Captured>,
        headers: HeaderMap,
        Json(body): Json<Value>,
    ) -> StatusCode {
        let auth = headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        captured.0.lock().unwrap().push((auth, body));
        StatusCode::OK
    }

    async fn reject() -> (StatusCode, &'static str) {
        (StatusCode::UNPROCESSABLE_ENTITY, "invalid from address")
    }

    /// Serves a stand-in mail API on an ephemeral port; returns its base URL.
    async fn mail_api(captured: Captured) -> String {
        let app = Router::new()
            .route("/emails", post(accept))
            .route("/rejecting", post(reject))
            .with_state(captured);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn http_sender(api_url: String) -> HttpMailSender {
        HttpMailSender::new(&MailConfig {
            transport: MailTransport::Http,
            from: "noreply@studyolle.com".into(),
            api_url,
            api_key: Some("re_test_key".into()),
        })
        .unwrap()
    }

    fn message() -> EmailMessage {
        EmailMessage {
            to: "email@email.com".into(),
            subject: "스터디올래, 회원 가입 인증".into(),
            text: "/check-email-token?token=abc&email=email@email.com".into(),
        }
    }

    #[tokio::test]
    async fn http_sender_posts_json_with_bearer_key() {
        let captured = Captured::default();
        let base = mail_api(captured.clone()).await;

        http_sender(format!("{base}/emails"))
            .send(message())
            .await
            .expect("delivered");

        let calls = captured.0.lock().unwrap().clone();
        assert_eq!(calls.len(), 1);
        let (auth, body) = &calls[0];
        assert_eq!(auth.as_deref(), Some("Bearer re_test_key"));
        assert_eq!(body["from"], "noreply@studyolle.com");
        assert_eq!(body["to"][0], "email@email.com");
        assert_eq!(body["subject"], "스터디올래, 회원 가입 인증");
        assert!(body["text"].as_str().unwrap().contains("token=abc"));
    }

    #[tokio::test]
    async fn http_sender_fails_on_client_error() {
        let base = mail_api(Captured::default()).await;

        let err = http_sender(format!("{base}/rejecting"))
            .send(message())
            .await
            .expect_err("4xx must fail");
        let msg = err.to_string();
        assert!(msg.contains("422"), "{msg}");
        assert!(msg.contains("invalid from address"), "{msg}");
    }

    #[test]
    fn http_sender_requires_api_key() {
        let config = MailConfig {
            transport: MailTransport::Http,
            from: "noreply@example.com".into(),
            api_url: "https://mail.example.com/emails".into(),
            api_key: None,
        };
        let err = HttpMailSender::new(&config).err().expect("missing key must fail");
        assert!(err.to_string().contains("MAIL_API_KEY"));
    }

    #[test]
    fn api_payload_shape() {
        let body = ApiEmail {
            from: "noreply@example.com",
            to: ["a@b.com"],
            subject: "hello",
            text: "body",
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["to"][0], "a@b.com");
        assert_eq!(json["subject"], "hello");
        assert_eq!(json["text"], "body");
    }

    #[tokio::test]
    async fn console_sender_accepts_messages() {
        let sender = ConsoleMailSender;
        let msg = EmailMessage {
            to: "a@b.com".into(),
            subject: "s".into(),
            text: "t".into(),
        };
        sender.send(msg).await.expect("console send");
    }
}
