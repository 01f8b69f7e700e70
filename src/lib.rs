// Payment Dispatch - Core Library
// Exposes all modules for use in CLI, TUI, web server and tests

pub mod normalize;   // Canonical supplier names
pub mod config;      // payment-dispatch.toml
pub mod roster;      // Supplier roster (xlsx/xls/ods/CSV) → emails
pub mod classifier;  // Filename → category + supplier
pub mod dates;       // Leading YYYY-MM-DD → subject date
pub mod engine;      // Directory walk → bundles
pub mod dispatch;    // MailSender seam + message composition
pub mod mailer;      // SMTP / outbox transports
pub mod archive;     // ZIP extraction
pub mod session;     // One roster + one archive, explicit confirmations

// Re-export commonly used types
pub use normalize::normalize;
pub use config::{AppConfig, MailConfig, RosterConfig, SmtpConfig, TransportKind};
pub use roster::{Roster, RosterFormat, SupplierRecord, is_valid_email, split_emails};
pub use classifier::{Category, FileClassification, classify_filename};
pub use dates::{earliest_date, leading_date, subject_date};
pub use engine::{Classification, ClassificationEngine, ClassifiedBundle, classify_dir};
pub use dispatch::{Delivery, Dispatched, MailSender, OutgoingMessage, SendError, compose_message, dispatch};
pub use mailer::{OutboxSender, SmtpSender, build_sender};
pub use archive::extract_archive;
pub use session::{DispatchStatus, Session, SessionSummary, SupplierSummary, WorkdirCleanup};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
