// ✉️ Mail transports - Concrete MailSender implementations
//
// - SmtpSender:   relay SMTP (STARTTLS o TLS implícito)
// - OutboxSender: escribe .eml en un directorio (dry-run / cliente de escritorio)

use crate::config::{MailConfig, SmtpConfig, TransportKind};
use crate::dispatch::{Delivery, MailSender, OutgoingMessage, SendError};
use anyhow::{Context, Result};
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{FileTransport, Message, SmtpTransport, Transport};
use std::fs;
use std::path::{Path, PathBuf};

// ============================================================================
// MIME BUILDING
// ============================================================================

fn parse_mailbox(address: &str) -> Result<Mailbox, SendError> {
    address.parse::<Mailbox>().map_err(|e| SendError::InvalidAddress {
        address: address.to_string(),
        reason: format!("{}", e),
    })
}

/// Build the MIME message: plain-text body + one PDF part per attachment
pub fn build_mime(from: &str, message: &OutgoingMessage) -> Result<Message, SendError> {
    if message.recipients.is_empty() {
        return Err(SendError::NoRecipients(message.subject.clone()));
    }

    let mut builder = Message::builder()
        .from(parse_mailbox(from)?)
        .subject(message.subject.clone());

    for recipient in &message.recipients {
        builder = builder.to(parse_mailbox(recipient)?);
    }

    let pdf = ContentType::parse("application/pdf")
        .map_err(|e| SendError::Build(format!("content type: {}", e)))?;

    let mut body = MultiPart::mixed().singlepart(SinglePart::plain(message.body.clone()));

    for path in &message.attachments {
        let content = fs::read(path).map_err(|source| SendError::Attachment {
            path: path.clone(),
            source,
        })?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "adjunto.pdf".to_string());

        body = body.singlepart(Attachment::new(filename).body(content, pdf.clone()));
    }

    builder
        .multipart(body)
        .map_err(|e| SendError::Build(e.to_string()))
}

// ============================================================================
// SMTP
// ============================================================================

pub struct SmtpSender {
    from: String,
    config: SmtpConfig,
}

impl SmtpSender {
    pub fn new(from: String, config: SmtpConfig) -> Self {
        SmtpSender { from, config }
    }

    fn transport(&self) -> Result<SmtpTransport, SendError> {
        let relay = if self.config.starttls {
            SmtpTransport::starttls_relay(&self.config.host)
        } else {
            SmtpTransport::relay(&self.config.host)
        };

        let builder = relay
            .map_err(|e| SendError::Transport(format!("SMTP relay error: {}", e)))?
            .port(self.config.port);

        let builder = match (&self.config.username, self.config.password()) {
            (Some(user), Some(password)) => {
                builder.credentials(Credentials::new(user.clone(), password))
            }
            (Some(user), None) => {
                log::warn!(
                    "SMTP user {} configured but {} is not set; sending unauthenticated",
                    user,
                    self.config.password_env
                );
                builder
            }
            _ => builder,
        };

        Ok(builder.build())
    }
}

impl MailSender for SmtpSender {
    fn send(&self, message: &OutgoingMessage) -> Result<Delivery, SendError> {
        let email = build_mime(&self.from, message)?;
        let mailer = self.transport()?;

        let response = mailer
            .send(&email)
            .map_err(|e| SendError::Transport(format!("SMTP send failed: {}", e)))?;

        log::info!("SMTP accepted {:?} ({})", message.subject, response.code());
        Ok(Delivery::Sent(self.describe()))
    }

    fn describe(&self) -> String {
        format!("smtp://{}:{}", self.config.host, self.config.port)
    }
}

// ============================================================================
// OUTBOX (.eml files)
// ============================================================================

pub struct OutboxSender {
    from: String,
    dir: PathBuf,
}

impl OutboxSender {
    pub fn new(from: String, dir: PathBuf) -> Self {
        OutboxSender { from, dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl MailSender for OutboxSender {
    fn send(&self, message: &OutgoingMessage) -> Result<Delivery, SendError> {
        let email = build_mime(&self.from, message)?;

        fs::create_dir_all(&self.dir).map_err(|e| {
            SendError::Transport(format!("cannot create outbox {}: {}", self.dir.display(), e))
        })?;

        let id = FileTransport::new(&self.dir)
            .send(&email)
            .map_err(|e| SendError::Transport(format!("outbox write failed: {}", e)))?;

        // Sólo queda en disco: el operador lo tiene que ver así
        let path = self.dir.join(format!("{}.eml", id));
        log::info!("Wrote {:?} to {}", message.subject, path.display());
        Ok(Delivery::Saved(path))
    }

    fn describe(&self) -> String {
        format!("outbox {}", self.dir.display())
    }
}

/// Pick the transport named in configuration
pub fn build_sender(config: &MailConfig) -> Result<Box<dyn MailSender>> {
    // Validar el remitente antes de la primera confirmación
    parse_mailbox(&config.from).context("Invalid [mail] from address")?;

    let sender: Box<dyn MailSender> = match config.transport {
        TransportKind::Smtp => Box::new(SmtpSender::new(config.from.clone(), config.smtp.clone())),
        TransportKind::Outbox => {
            Box::new(OutboxSender::new(config.from.clone(), config.outbox_dir.clone()))
        }
    };

    log::debug!("Mail transport: {}", sender.describe());
    Ok(sender)
}
