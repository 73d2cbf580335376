use crate::core::Notifier;
use crate::utils::error::Result;
use async_trait::async_trait;

/// Prints reports instead of mailing them.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<()> {
        tracing::info!("Report for {}: {}", recipient, subject);
        println!("{}\n\n{}", subject, body);
        Ok(())
    }
}

#[cfg(feature = "aws")]
pub use ses::SesNotifier;

#[cfg(feature = "aws")]
mod ses {
    use super::*;
    use crate::utils::error::TrackerError;
    use aws_sdk_sesv2::types::{Body, Content, Destination, EmailContent, Message};
    use aws_sdk_sesv2::Client as SesClient;

    /// Plain-text mail through SES.
    #[derive(Debug, Clone)]
    pub struct SesNotifier {
        client: SesClient,
        sender: String,
    }

    impl SesNotifier {
        pub fn new(client: SesClient, sender: impl Into<String>) -> Self {
            Self {
                client,
                sender: sender.into(),
            }
        }
    }

    fn content(data: &str) -> Result<Content> {
        Content::builder()
            .data(data)
            .charset("UTF-8")
            .build()
            .map_err(|e| TrackerError::NotificationError {
                message: e.to_string(),
            })
    }

    #[async_trait]
    impl Notifier for SesNotifier {
        async fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<()> {
            let message = Message::builder()
                .subject(content(subject)?)
                .body(Body::builder().text(content(body)?).build())
                .build();

            self.client
                .send_email()
                .from_email_address(&self.sender)
                .destination(Destination::builder().to_addresses(recipient).build())
                .content(EmailContent::builder().simple(message).build())
                .send()
                .await
                .map_err(|e| TrackerError::NotificationError {
                    message: format!("SES send_email to {} failed: {}", recipient, e),
                })?;

            tracing::info!("Sent '{}' to {}", subject, recipient);
            Ok(())
        }
    }
}
