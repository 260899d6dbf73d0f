use aws_sdk_sesv2::{
    error::DisplayErrorContext,
    operation::send_email::SendEmailError,
    types::{Body, Content, Destination, EmailContent, Message},
    Client as SesClient,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One outgoing email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub text: String,
    pub html: String,
}

/// What the mail provider reported for one send.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendInfo {
    pub accepted: Vec<String>,
    pub rejected: Vec<String>,
    pub pending: Vec<String>,
    pub message_id: Option<String>,
}

impl SendInfo {
    pub fn accepted(to: impl Into<String>, message_id: Option<String>) -> Self {
        Self {
            accepted: vec![to.into()],
            message_id,
            ..Default::default()
        }
    }

    pub fn rejected(to: impl Into<String>) -> Self {
        Self {
            rejected: vec![to.into()],
            ..Default::default()
        }
    }
}

/// A send that did not reach the provider, or that the provider refused to
/// process at all.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("mail transport failed: {0}")]
pub struct TransportError(pub String);

/// Something that can deliver an [`Envelope`].
#[rocket::async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, envelope: &Envelope) -> Result<SendInfo, TransportError>;
}

/// Delivers mail through Amazon SES.
pub struct SesMailer {
    client: SesClient,
}

impl SesMailer {
    pub fn new(client: SesClient) -> Self {
        Self { client }
    }
}

#[rocket::async_trait]
impl MailTransport for SesMailer {
    async fn send(&self, envelope: &Envelope) -> Result<SendInfo, TransportError> {
        let body = Body::builder()
            .text(utf8(&envelope.text)?)
            .html(utf8(&envelope.html)?)
            .build();
        let message = Message::builder()
            .subject(utf8(&envelope.subject)?)
            .body(body)
            .build();
        let result = self
            .client
            .send_email()
            .from_email_address(&envelope.from)
            .destination(Destination::builder().to_addresses(&envelope.to).build())
            .content(EmailContent::builder().simple(message).build())
            .send()
            .await;

        match result {
            Ok(output) => Ok(SendInfo::accepted(
                &envelope.to,
                output.message_id().map(str::to_string),
            )),
            // SES refusing the message is a delivery outcome, not a transport failure.
            Err(err) => match err.into_service_error() {
                SendEmailError::MessageRejected(rejection) => {
                    debug!("SES rejected mail to {}: {rejection}", envelope.to);
                    Ok(SendInfo::rejected(&envelope.to))
                }
                other => Err(TransportError(DisplayErrorContext(&other).to_string())),
            },
        }
    }
}

fn utf8(data: &str) -> Result<Content, TransportError> {
    Content::builder()
        .data(data)
        .charset("UTF-8")
        .build()
        .map_err(|e| TransportError(e.to_string()))
}
