use crate::config::Config;
use crate::models::candidate::Candidate;
use crate::models::user::Role;
use chrono::{DateTime, Utc};
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use std::time::Duration;
use tokio::sync::mpsc;

const QUEUE_DEPTH: usize = 256;
const MAX_ATTEMPTS: u32 = 3;
const SEND_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct OutboundMail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Fire-and-forget SMTP mailer. HTTP handlers only enqueue; a single worker
/// drains the queue, retrying transient failures with exponential backoff.
/// Permanent failures are logged and counted, never surfaced to the request.
#[derive(Clone)]
pub struct MailService {
    tx: mpsc::Sender<OutboundMail>,
    failed: Arc<AtomicU64>,
}

impl MailService {
    pub fn new(config: &Config) -> Self {
        let transport = build_transport(config);
        let from_address = config.mail_from.clone();
        let (tx, rx) = mpsc::channel(QUEUE_DEPTH);
        let failed = Arc::new(AtomicU64::new(0));

        tokio::spawn(drain_queue(rx, transport, from_address, failed.clone()));

        Self { tx, failed }
    }

    pub fn failed_count(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn enqueue(&self, to: &str, subject: &str, body: String) {
        let mail = OutboundMail {
            to: to.to_string(),
            subject: subject.to_string(),
            body,
        };
        if let Err(e) = self.tx.try_send(mail) {
            self.failed.fetch_add(1, Ordering::Relaxed);
            tracing::error!("Mail queue full, dropping message: {}", e);
        }
    }

    pub fn send_role_invitation(&self, to: &str, role: Role, registration_url: &str) {
        self.enqueue(
            to,
            "You have been invited to the hiring portal",
            build_role_invitation_body(role, registration_url),
        );
    }

    pub fn send_candidate_assignment(&self, to: &str, candidate: &Candidate) {
        self.enqueue(
            to,
            &format!("Candidate assigned for interview: {}", candidate.reference_id),
            build_candidate_assignment_body(candidate, candidate.interview_time),
        );
    }

    pub fn send_password_reset(&self, to: &str, reset_url: &str) {
        self.enqueue(
            to,
            "Reset your password",
            build_password_reset_body(reset_url),
        );
    }

    pub fn send_password_changed(&self, to: &str, name: &str) {
        self.enqueue(
            to,
            "Your password was changed",
            build_password_changed_body(name),
        );
    }
}

fn build_transport(config: &Config) -> Option<AsyncSmtpTransport<Tokio1Executor>> {
    let host = config.smtp_host.as_deref()?;
    let builder = match AsyncSmtpTransport::<Tokio1Executor>::relay(host) {
        Ok(b) => b.port(config.smtp_port),
        Err(e) => {
            tracing::warn!("Failed to build SMTP transport: {}", e);
            return None;
        }
    };
    let builder = match (&config.smtp_username, &config.smtp_password) {
        (Some(user), Some(pass)) => builder.credentials(Credentials::new(user.clone(), pass.clone())),
        _ => builder,
    };
    Some(builder.build())
}

async fn drain_queue(
    mut rx: mpsc::Receiver<OutboundMail>,
    transport: Option<AsyncSmtpTransport<Tokio1Executor>>,
    from_address: Option<String>,
    failed: Arc<AtomicU64>,
) {
    while let Some(mail) = rx.recv().await {
        let (Some(transport), Some(from)) = (&transport, &from_address) else {
            tracing::debug!("SMTP not configured, skipping email to {}", mail.to);
            continue;
        };
        if let Err(e) = deliver(transport, from, &mail).await {
            failed.fetch_add(1, Ordering::Relaxed);
            tracing::error!("Giving up on email to {}: {}", mail.to, e);
        }
    }
}

async fn deliver(
    transport: &AsyncSmtpTransport<Tokio1Executor>,
    from: &str,
    mail: &OutboundMail,
) -> anyhow::Result<()> {
    let from_mailbox: Mailbox = from
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid from address '{}': {}", from, e))?;
    let to_mailbox: Mailbox = mail
        .to
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid to address '{}': {}", mail.to, e))?;

    let message = Message::builder()
        .from(from_mailbox)
        .to(to_mailbox)
        .subject(&mail.subject)
        .header(ContentType::TEXT_PLAIN)
        .body(mail.body.clone())?;

    let mut last_err = None;
    for attempt in 0..MAX_ATTEMPTS {
        if attempt > 0 {
            tokio::time::sleep(Duration::from_secs(1 << attempt)).await;
        }
        match tokio::time::timeout(SEND_TIMEOUT, transport.send(message.clone())).await {
            Ok(Ok(_)) => {
                tracing::info!("Email sent to {}: {}", mail.to, mail.subject);
                return Ok(());
            }
            Ok(Err(e)) => {
                tracing::warn!(attempt, "SMTP send failed: {}", e);
                last_err = Some(anyhow::Error::from(e));
            }
            Err(_) => {
                tracing::warn!(attempt, "SMTP send timed out");
                last_err = Some(anyhow::anyhow!("send timed out"));
            }
        }
    }
    Err(last_err.unwrap_or_else(|| anyhow::anyhow!("send failed")))
}

fn role_display(role: Role) -> &'static str {
    match role {
        Role::Admin => "Admin",
        Role::Hr => "HR",
        Role::Manager => "Manager",
    }
}

pub fn build_role_invitation_body(role: Role, registration_url: &str) -> String {
    format!(
        "Hello,\n\n\
         You have been invited to join the Invensis hiring portal as {role}.\n\n\
         Complete your registration here:\n{url}\n\n\
         If you were not expecting this invitation, you can ignore this email.\n",
        role = role_display(role),
        url = registration_url,
    )
}

pub fn build_candidate_assignment_body(
    candidate: &Candidate,
    interview_time: Option<DateTime<Utc>>,
) -> String {
    let mut body = format!(
        "A candidate has been assigned to you for interview.\n\n\
         Reference: {reference}\n\
         Name: {first} {last}\n\
         Email: {email}\n\
         Phone: {phone}\n\
         Experience: {experience} years\n",
        reference = candidate.reference_id,
        first = candidate.first_name,
        last = candidate.last_name,
        email = candidate.email,
        phone = candidate.phone,
        experience = candidate.experience,
    );
    if let Some(time) = interview_time {
        body.push_str(&format!(
            "Interview time: {}\n",
            time.format("%Y-%m-%d %H:%M UTC")
        ));
    }
    body.push_str("\nPlease sign in to the portal to review the candidate.\n");
    body
}

pub fn build_password_reset_body(reset_url: &str) -> String {
    format!(
        "A password reset was requested for your account.\n\n\
         Click the link below to choose a new password:\n{url}\n\n\
         This link expires in 60 minutes. If you did not request this, you can\n\
         safely ignore this email.\n",
        url = reset_url,
    )
}

pub fn build_password_changed_body(name: &str) -> String {
    format!(
        "Hello {name},\n\n\
         Your password was just changed. If this was not you, contact the\n\
         administrator immediately.\n",
        name = name,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_candidate() -> Candidate {
        let now = Utc::now();
        Candidate {
            id: uuid::Uuid::new_v4(),
            reference_id: "INV-20260830-0001".to_string(),
            first_name: "Jane".to_string(),
            last_name: "Doe".to_string(),
            email: "jane@ex.com".to_string(),
            phone: "123".to_string(),
            gender: None,
            dob: None,
            education: None,
            experience: 5,
            resume_path: None,
            image_path: None,
            hr_rating: None,
            hr_review: None,
            tech_rating: None,
            tech_review: None,
            status: "new".to_string(),
            assigned_by: None,
            assigned_to: None,
            interview_time: None,
            reject_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn invitation_body_names_role_and_link() {
        let body = build_role_invitation_body(Role::Manager, "http://localhost/register?token=t");
        assert!(body.contains("Manager"));
        assert!(body.contains("/register"));
    }

    #[test]
    fn assignment_body_contains_candidate_fields() {
        let c = sample_candidate();
        let body = build_candidate_assignment_body(&c, None);
        for needle in ["Jane", "Doe", "jane@ex.com", "INV-20260830-0001"] {
            assert!(body.contains(needle), "missing {}", needle);
        }
        assert!(!body.contains("Interview time"));

        let time = Utc.with_ymd_and_hms(2099, 1, 1, 10, 0, 0).unwrap();
        let body = build_candidate_assignment_body(&c, Some(time));
        assert!(body.contains("2099-01-01 10:00 UTC"));
    }

    #[test]
    fn reset_body_contains_url_and_expiry_phrase() {
        let body = build_password_reset_body("http://localhost/reset-password?token=abc");
        assert!(body.contains("http://localhost/reset-password?token=abc"));
        assert!(body.contains("expires in 60 minutes"));
    }
}
