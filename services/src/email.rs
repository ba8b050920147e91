//! Outgoing e-mail: template rendering, message composition, SMTP delivery
//! and the background mail queue.
//!
//! Subjects and bodies come from the runtime [`Settings`] so an administrator
//! can change them without a restart. Placeholders use `{name}` syntax;
//! unknown placeholders render as an empty string.

use std::sync::Arc;

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use documents::DOCX_MIME;
use util::paths::{attendance_attachment_name, report_attachment_name};
use util::settings::{
    Settings, SettingsStore, DEFAULT_SENDER_NAME, DEFAULT_VALUES, EMAIL_FOOTER, EMAIL_LIST_BODY,
    EMAIL_LIST_SUBJECT, EMAIL_LOGIN, EMAIL_PASSWORD, EMAIL_RECIPIENT, EMAIL_REPORT_BODY,
    EMAIL_REPORT_SUBJECT, EMAIL_SENDER_NAME, EMAIL_USE_TRAINER_NAME, SMTP_HOST, SMTP_PORT,
};

use crate::error::EmailError;

/// Port on which the SMTP server expects TLS from the first byte.
pub const IMPLICIT_TLS_PORT: u16 = 465;

/// Substitutes `{name}` placeholders from `vars`.
///
/// `{{` and `}}` produce literal braces. A placeholder whose name is not in
/// `vars` renders as nothing; an unterminated `{` is copied through.
pub fn render_template(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(pos) = rest.find(['{', '}']) {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];

        if tail.starts_with("{{") || tail.starts_with("}}") {
            out.push_str(&tail[..1]);
            rest = &tail[2..];
            continue;
        }
        if tail.starts_with('}') {
            out.push('}');
            rest = &tail[1..];
            continue;
        }
        match tail[1..].find('}') {
            Some(end) => {
                let name = tail[1..1 + end].trim();
                if let Some((_, value)) = vars.iter().find(|(k, _)| *k == name) {
                    out.push_str(value);
                }
                rest = &tail[end + 2..];
            }
            None => {
                out.push_str(tail);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

/// The configured template for `key`, or its built-in default.
fn template<'a>(settings: &'a Settings, key: &str) -> &'a str {
    settings.get(key).unwrap_or_else(|| {
        DEFAULT_VALUES
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| *v)
            .unwrap_or("")
    })
}

fn with_footer(settings: &Settings, body: String) -> String {
    match settings.get(EMAIL_FOOTER) {
        Some(footer) => format!("{body}\n\n{footer}"),
        None => body,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MailAttachment {
    pub filename: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

/// A fully composed message, independent of the transport.
#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingMail {
    pub from_name: String,
    pub from_address: String,
    pub to: String,
    pub subject: String,
    pub body: String,
    pub attachment: Option<MailAttachment>,
}

fn parse_address(address: &str) -> Result<Address, EmailError> {
    address.trim().parse().map_err(|e: lettre::address::AddressError| EmailError::Address {
        address: address.to_string(),
        reason: e.to_string(),
    })
}

impl OutgoingMail {
    /// Converts into a `lettre` message: plain text, or multipart/mixed when
    /// an attachment is present.
    pub fn to_message(&self) -> Result<Message, EmailError> {
        let from = Mailbox::new(Some(self.from_name.clone()), parse_address(&self.from_address)?);
        let to = Mailbox::new(None, parse_address(&self.to)?);
        let builder = Message::builder().from(from).to(to).subject(self.subject.clone());

        let message = match &self.attachment {
            None => builder
                .header(ContentType::TEXT_PLAIN)
                .body(self.body.clone()),
            Some(attachment) => {
                let content_type = ContentType::parse(&attachment.content_type)
                    .map_err(|e| EmailError::Build(e.to_string()))?;
                builder.multipart(
                    MultiPart::mixed()
                        .singlepart(SinglePart::plain(self.body.clone()))
                        .singlepart(
                            Attachment::new(attachment.filename.clone())
                                .body(attachment.data.clone(), content_type),
                        ),
                )
            }
        };
        message.map_err(|e| EmailError::Build(e.to_string()))
    }
}

/// Sender display name: the trainer's name when the setting asks for it,
/// otherwise the configured sender name.
pub fn sender_name(settings: &Settings, trainer_name: Option<&str>) -> String {
    match trainer_name.map(str::trim).filter(|n| !n.is_empty()) {
        Some(name) if settings.flag(EMAIL_USE_TRAINER_NAME) => name.to_string(),
        _ => settings
            .get_or(EMAIL_SENDER_NAME, DEFAULT_SENDER_NAME)
            .to_string(),
    }
}

/// Composes a plain-text message from a subject/body template pair.
pub fn compose(
    settings: &Settings,
    to: &str,
    subject_key: &str,
    body_key: &str,
    vars: &[(&str, &str)],
    trainer_name: Option<&str>,
) -> Result<OutgoingMail, EmailError> {
    let from_address = settings.get(EMAIL_LOGIN).ok_or(EmailError::Config(EMAIL_LOGIN))?;
    Ok(OutgoingMail {
        from_name: sender_name(settings, trainer_name),
        from_address: from_address.to_string(),
        to: to.trim().to_string(),
        subject: render_template(template(settings, subject_key), vars),
        body: with_footer(settings, render_template(template(settings, body_key), vars)),
        attachment: None,
    })
}

/// Which generated document is being sent to the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorDocument {
    AttendanceList,
    MonthlyReport,
}

impl CoordinatorDocument {
    fn keys(self) -> (&'static str, &'static str) {
        match self {
            CoordinatorDocument::AttendanceList => (EMAIL_LIST_SUBJECT, EMAIL_LIST_BODY),
            CoordinatorDocument::MonthlyReport => (EMAIL_REPORT_SUBJECT, EMAIL_REPORT_BODY),
        }
    }

    fn attachment_name(self, date_label: &str) -> String {
        match self {
            CoordinatorDocument::AttendanceList => attendance_attachment_name(date_label),
            CoordinatorDocument::MonthlyReport => report_attachment_name(date_label),
        }
    }
}

/// Builds the coordinator message for a generated document.
///
/// Returns `Ok(None)` when no recipient is configured.
pub fn coordinator_mail(
    settings: &Settings,
    kind: CoordinatorDocument,
    date_label: &str,
    trainer_name: Option<&str>,
    document: Vec<u8>,
) -> Result<Option<OutgoingMail>, EmailError> {
    let Some(recipient) = settings.get(EMAIL_RECIPIENT) else {
        warn!("email_recipient not configured, skipping mail send");
        return Ok(None);
    };
    let (subject_key, body_key) = kind.keys();
    let mut mail = compose(
        settings,
        recipient,
        subject_key,
        body_key,
        &[("date", date_label)],
        trainer_name,
    )?;
    mail.attachment = Some(MailAttachment {
        filename: kind.attachment_name(date_label),
        content_type: DOCX_MIME.to_string(),
        data: document,
    });
    Ok(Some(mail))
}

/// Sends a generated document to the coordinator and waits for the result.
///
/// Every failure is logged and reported as `false`.
pub async fn send_to_coordinator(
    transport: &dyn MailTransport,
    settings: &Settings,
    kind: CoordinatorDocument,
    date_label: &str,
    trainer_name: Option<&str>,
    document: Vec<u8>,
) -> bool {
    let mail = match coordinator_mail(settings, kind, date_label, trainer_name, document) {
        Ok(Some(mail)) => mail,
        Ok(None) => return false,
        Err(e) => {
            error!(error = %e, ?kind, "failed to compose coordinator mail");
            return false;
        }
    };
    match transport.send(&mail).await {
        Ok(()) => {
            info!(to = %mail.to, ?kind, date = date_label, "coordinator mail sent");
            true
        }
        Err(e) => {
            error!(error = %e, ?kind, date = date_label, "failed to send coordinator mail");
            false
        }
    }
}

/// Delivers composed messages.
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), EmailError>;
}

/// SMTP delivery configured from the current settings snapshot on every send.
pub struct SmtpMailTransport {
    settings: Arc<SettingsStore>,
}

impl SmtpMailTransport {
    pub fn new(settings: Arc<SettingsStore>) -> Self {
        Self { settings }
    }

    fn transport(settings: &Settings) -> Result<AsyncSmtpTransport<Tokio1Executor>, EmailError> {
        let host = settings.get(SMTP_HOST).ok_or(EmailError::Config(SMTP_HOST))?;
        let port = settings.smtp_port().ok_or(EmailError::Config(SMTP_PORT))?;

        let builder = if port == IMPLICIT_TLS_PORT {
            AsyncSmtpTransport::<Tokio1Executor>::relay(host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
        }
        .map_err(|e| EmailError::Transport(e.to_string()))?
        .port(port);

        let builder = match settings.get(EMAIL_LOGIN) {
            Some(login) => builder.credentials(Credentials::new(
                login.to_string(),
                settings.raw(EMAIL_PASSWORD).to_string(),
            )),
            None => builder,
        };
        Ok(builder.build())
    }
}

#[async_trait]
impl MailTransport for SmtpMailTransport {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), EmailError> {
        let settings = self.settings.snapshot();
        let message = mail.to_message()?;
        let transport = Self::transport(&settings)?;
        transport
            .send(message)
            .await
            .map_err(|e| EmailError::Transport(e.to_string()))?;
        debug!(to = %mail.to, subject = %mail.subject, "smtp delivery accepted");
        Ok(())
    }
}

/// Fire-and-forget delivery through a bounded channel and one worker task.
pub struct MailQueue {
    sender: mpsc::Sender<OutgoingMail>,
    worker: JoinHandle<()>,
}

impl MailQueue {
    /// Spawns the worker on the current tokio runtime.
    pub fn start(transport: Arc<dyn MailTransport>, capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let worker = tokio::spawn(run_worker(receiver, transport));
        Self { sender, worker }
    }

    /// Queues `mail`, waiting for room when the queue is full.
    pub async fn enqueue(&self, mail: OutgoingMail) -> Result<(), EmailError> {
        debug!(to = %mail.to, subject = %mail.subject, "queueing mail");
        self.sender
            .send(mail)
            .await
            .map_err(|_| EmailError::QueueClosed)
    }

    /// Stops accepting mail and waits until everything queued was handled.
    pub async fn shutdown(self) {
        let Self { sender, worker } = self;
        drop(sender);
        if let Err(e) = worker.await {
            error!(error = %e, "mail worker terminated abnormally");
        }
    }
}

async fn run_worker(mut receiver: mpsc::Receiver<OutgoingMail>, transport: Arc<dyn MailTransport>) {
    while let Some(mail) = receiver.recv().await {
        match transport.send(&mail).await {
            Ok(()) => info!(to = %mail.to, subject = %mail.subject, "mail sent"),
            Err(e) => error!(to = %mail.to, error = %e, "failed to send queued mail"),
        }
    }
    debug!("mail queue drained, worker stopping");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::RecordingTransport;
    use util::settings::{RESET_EMAIL_BODY, RESET_EMAIL_SUBJECT};

    fn settings(pairs: &[(&str, &str)]) -> Settings {
        Settings::defaults().overlay(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string())),
        )
    }

    #[test]
    fn placeholders_and_braces() {
        let vars = [("date", "2025-03-14"), ("name", "Anna")];
        assert_eq!(render_template("Lista – {date}", &vars), "Lista – 2025-03-14");
        assert_eq!(render_template("{name}: {missing}!", &vars), "Anna: !");
        assert_eq!(render_template("{{date}} = {date}", &vars), "{date} = 2025-03-14");
        assert_eq!(render_template("a }} b", &vars), "a } b");
        assert_eq!(render_template("open { end", &vars), "open { end");
        assert_eq!(render_template("", &vars), "");
    }

    #[test]
    fn coordinator_list_mail_uses_defaults_and_footer() {
        let s = settings(&[
            (EMAIL_RECIPIENT, "koordynator@example.com"),
            (EMAIL_LOGIN, "noreply@example.com"),
            (EMAIL_FOOTER, "Pozdrawiamy"),
        ]);
        let mail = coordinator_mail(
            &s,
            CoordinatorDocument::AttendanceList,
            "2025-03-14",
            Some("Anna Nowak"),
            vec![1, 2, 3],
        )
        .unwrap()
        .unwrap();

        assert_eq!(mail.to, "koordynator@example.com");
        assert_eq!(mail.from_name, DEFAULT_SENDER_NAME);
        assert_eq!(mail.subject, "Lista obecności – 2025-03-14");
        assert_eq!(mail.body, "W załączniku lista obecności z zajęć.\n\nPozdrawiamy");
        let attachment = mail.attachment.unwrap();
        assert_eq!(attachment.filename, "lista_2025-03-14.docx");
        assert_eq!(attachment.content_type, DOCX_MIME);
    }

    #[test]
    fn trainer_name_is_sender_when_enabled() {
        let s = settings(&[
            (EMAIL_RECIPIENT, "k@example.com"),
            (EMAIL_LOGIN, "noreply@example.com"),
            (EMAIL_USE_TRAINER_NAME, "1"),
        ]);
        let mail = coordinator_mail(&s, CoordinatorDocument::MonthlyReport, "3_2025", Some("Anna Nowak"), Vec::new())
            .unwrap()
            .unwrap();
        assert_eq!(mail.from_name, "Anna Nowak");
        assert_eq!(mail.subject, "Raport miesięczny – 3_2025");
        assert_eq!(mail.attachment.unwrap().filename, "raport_3_2025.docx");
    }

    #[test]
    fn missing_recipient_skips() {
        let s = settings(&[(EMAIL_LOGIN, "noreply@example.com")]);
        let mail = coordinator_mail(&s, CoordinatorDocument::AttendanceList, "2025-03-14", None, Vec::new()).unwrap();
        assert!(mail.is_none());
    }

    #[test]
    fn compose_requires_sender_login() {
        let s = settings(&[]);
        let err = compose(&s, "a@b.pl", RESET_EMAIL_SUBJECT, RESET_EMAIL_BODY, &[], None).unwrap_err();
        assert!(matches!(err, EmailError::Config(key) if key == EMAIL_LOGIN));
    }

    #[test]
    fn message_conversion_validates_addresses() {
        let s = settings(&[(EMAIL_LOGIN, "noreply@example.com")]);
        let mut mail = compose(&s, "a@b.pl", RESET_EMAIL_SUBJECT, RESET_EMAIL_BODY, &[("link", "x")], None).unwrap();
        assert!(mail.to_message().is_ok());

        mail.to = "not an address".into();
        assert!(matches!(mail.to_message(), Err(EmailError::Address { .. })));
    }

    #[test]
    fn smtp_transport_needs_host_and_port() {
        let s = settings(&[]);
        assert!(matches!(SmtpMailTransport::transport(&s), Err(EmailError::Config(SMTP_HOST))));
        let s = settings(&[(SMTP_HOST, "localhost")]);
        assert!(matches!(SmtpMailTransport::transport(&s), Err(EmailError::Config(SMTP_PORT))));
    }

    #[tokio::test]
    async fn send_to_coordinator_reports_outcome() {
        let s = settings(&[
            (EMAIL_RECIPIENT, "k@example.com"),
            (EMAIL_LOGIN, "noreply@example.com"),
        ]);
        let ok = RecordingTransport::default();
        assert!(send_to_coordinator(&ok, &s, CoordinatorDocument::AttendanceList, "2025-03-14", None, vec![1]).await);
        assert_eq!(ok.sent().len(), 1);

        let failing = RecordingTransport::failing();
        assert!(!send_to_coordinator(&failing, &s, CoordinatorDocument::AttendanceList, "2025-03-14", None, vec![1]).await);
    }

    #[tokio::test]
    async fn queue_drains_before_shutdown() {
        let transport = Arc::new(RecordingTransport::default());
        let queue = MailQueue::start(transport.clone(), 2);
        let s = settings(&[(EMAIL_LOGIN, "noreply@example.com")]);
        for i in 0..5 {
            let to = format!("user{i}@example.com");
            let mail = compose(&s, &to, RESET_EMAIL_SUBJECT, RESET_EMAIL_BODY, &[], None).unwrap();
            queue.enqueue(mail).await.unwrap();
        }
        queue.shutdown().await;

        let sent = transport.sent();
        assert_eq!(sent.len(), 5);
        assert_eq!(sent[4].to, "user4@example.com");
    }
}
