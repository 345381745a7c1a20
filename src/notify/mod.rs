use async_trait::async_trait;

pub mod content;

// ============================================================================
// Notification Collaborator
// ============================================================================
//
// Mail delivery is external. The core builds message content and triggers a
// send; whether that ends up as SMTP, an API call or a console line is the
// implementation's business. Sends happen after the primary state change has
// been committed and are best-effort: a failed send is logged and counted
// but never rolls anything back.
//
// ============================================================================

#[derive(Debug, Clone)]
pub struct OutgoingMail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, mail: OutgoingMail) -> anyhow::Result<()>;
}

/// Reference implementation: writes the mail to the log instead of
/// delivering it. Useful for development and tests.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, mail: OutgoingMail) -> anyhow::Result<()> {
        tracing::info!(
            to = %mail.to,
            subject = %mail.subject,
            body_len = mail.body.len(),
            "Outgoing mail"
        );
        Ok(())
    }
}
