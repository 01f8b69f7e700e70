// 📤 Dispatch Adapter - Compose + hand off one supplier's mail
//
// El core nunca depende de un cliente concreto: todo pasa por MailSender.
// Éxito = el sender devolvió Ok con lo que hizo (enviado o sólo guardado);
// cualquier error se propaga sin tragarlo.

use crate::dates::subject_date;
use chrono::{Local, NaiveDate};
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// Fixed plain-text body
pub const MESSAGE_BODY: &str = "Estimados:\n\n\
Se adjuntan todos los comprobantes correspondientes al último pago.\n\n\
Saludos!";

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum SendError {
    #[error("no recipients for supplier {0}")]
    NoRecipients(String),

    #[error("invalid address {address:?}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("cannot read attachment {}: {source}", .path.display())]
    Attachment {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to build message: {0}")]
    Build(String),

    #[error("mail client failed: {0}")]
    Transport(String),
}

// ============================================================================
// MESSAGE + SENDER SEAM
// ============================================================================

/// Fully composed outbound message
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutgoingMessage {
    pub recipients: Vec<String>,
    pub subject: String,
    pub body: String,
    pub attachments: Vec<PathBuf>,
}

/// What the transport did with an accepted message
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "target", rename_all = "lowercase")]
pub enum Delivery {
    /// Handed to a server or client that delivers it
    Sent(String),
    /// Written to disk only; nothing left the machine
    Saved(PathBuf),
}

impl Delivery {
    /// Operator-facing outcome line
    pub fn report(&self, supplier: &str) -> String {
        match self {
            Delivery::Sent(via) => {
                format!("Mail enviado a {} correctamente ({}).", supplier, via)
            }
            Delivery::Saved(path) => format!(
                "Mail para {} guardado en outbox {} (no se envió).",
                supplier,
                path.display()
            ),
        }
    }
}

/// Result of one confirmed dispatch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Dispatched {
    pub message: OutgoingMessage,
    pub delivery: Delivery,
}

/// MailSender - Capability interface over a concrete mail client
///
/// Implementations: SMTP relay, .eml outbox (see `mailer`), test doubles.
/// `Ok` must say truthfully whether the message left the machine.
pub trait MailSender {
    fn send(&self, message: &OutgoingMessage) -> Result<Delivery, SendError>;

    /// Short label for logs/UI
    fn describe(&self) -> String {
        "mail client".to_string()
    }
}

impl<T: MailSender + ?Sized> MailSender for Box<T> {
    fn send(&self, message: &OutgoingMessage) -> Result<Delivery, SendError> {
        (**self).send(message)
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

// ============================================================================
// COMPOSITION
// ============================================================================

/// Build the outgoing message for one supplier
///
/// Subject: "Pago {name} {DD/MM/YYYY}", date = earliest leading date among
/// attachment filenames, or `today` when none parses.
pub fn compose_message(
    supplier: &str,
    recipients: &[String],
    attachments: &[PathBuf],
    today: NaiveDate,
) -> OutgoingMessage {
    let date = subject_date(attachments, today);

    OutgoingMessage {
        recipients: recipients.to_vec(),
        subject: format!("Pago {} {}", supplier, date),
        body: MESSAGE_BODY.to_string(),
        attachments: attachments.to_vec(),
    }
}

/// Compose with today's local date and send through `sender`
pub fn dispatch(
    sender: &dyn MailSender,
    supplier: &str,
    recipients: &[String],
    attachments: &[PathBuf],
) -> Result<Dispatched, SendError> {
    if recipients.is_empty() {
        return Err(SendError::NoRecipients(supplier.to_string()));
    }

    let today = Local::now().date_naive();
    let message = compose_message(supplier, recipients, attachments, today);

    log::info!(
        "Sending {:?} to {} recipient(s) with {} attachment(s) via {}",
        message.subject,
        message.recipients.len(),
        message.attachments.len(),
        sender.describe()
    );

    let delivery = sender.send(&message)?;
    Ok(Dispatched { message, delivery })
}
