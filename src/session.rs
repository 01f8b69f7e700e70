// 🧾 Session - Una corrida: roster + zip → bundles → envíos confirmados
//
// Reemplaza el estado global de UI: el llamador es dueño de la sesión.
// Los archivos extraídos viven en un TempDir que se borra al hacer drop,
// haya salido bien o mal el procesamiento. Si el proceso muere por señal
// no hay drop: WorkdirCleanup permite borrarlo desde el handler.

use crate::archive::extract_archive;
use crate::config::RosterConfig;
use crate::dispatch::{dispatch, Delivery, Dispatched, MailSender};
use crate::engine::{classify_dir, ClassifiedBundle, Classification};
use crate::roster::{Roster, RosterFormat};
use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use uuid::Uuid;

const ROSTER_STEM: &str = "proveedores";
const ARCHIVE_FILE: &str = "archivos.zip";
const PDF_DIR: &str = "pdfs";

// ============================================================================
// DISPATCH STATUS
// ============================================================================

/// Per-supplier outcome of the confirmation step
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "lowercase")]
pub enum DispatchStatus {
    /// Waiting for an explicit yes/no
    Pending,
    /// Operator said no
    Declined,
    Sent,
    /// Written to the outbox only; carries the .eml path
    Saved(String),
    /// Last attempt failed; can be retried manually
    Failed(String),
}

impl DispatchStatus {
    pub fn label(&self) -> &str {
        match self {
            DispatchStatus::Pending => "Pendiente",
            DispatchStatus::Declined => "No enviar",
            DispatchStatus::Sent => "Enviado",
            DispatchStatus::Saved(_) => "En outbox",
            DispatchStatus::Failed(_) => "Error",
        }
    }
}

impl From<&Delivery> for DispatchStatus {
    fn from(delivery: &Delivery) -> Self {
        match delivery {
            Delivery::Sent(_) => DispatchStatus::Sent,
            Delivery::Saved(path) => DispatchStatus::Saved(path.display().to_string()),
        }
    }
}

// ============================================================================
// WORKDIR CLEANUP
// ============================================================================

/// Deletes a session directory without owning the Session
///
/// For signal handlers: they run on another thread and exit the process,
/// so the TempDir is never dropped.
#[derive(Debug, Clone)]
pub struct WorkdirCleanup {
    path: PathBuf,
}

impl WorkdirCleanup {
    pub fn new(path: &Path) -> Self {
        WorkdirCleanup {
            path: path.to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the directory; already gone is fine
    pub fn run(&self) -> io::Result<()> {
        match fs::remove_dir_all(&self.path) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            result => result,
        }
    }
}

fn roster_file_name(format: RosterFormat) -> String {
    format!("{}.{}", ROSTER_STEM, format.extension())
}

// ============================================================================
// SESSION
// ============================================================================

pub struct Session {
    id: Uuid,
    workdir: TempDir,
    roster: Roster,
    bundles: Classification,
    statuses: BTreeMap<String, DispatchStatus>,
    extracted_files: usize,
}

impl Session {
    /// Start a session from files on disk
    pub fn open(roster_path: &Path, archive_path: &Path, config: &RosterConfig) -> Result<Self> {
        let workdir = TempDir::new().context("Failed to create session directory")?;
        Self::open_in(workdir, roster_path, archive_path, config)
    }

    /// Same as `open`, inside a caller-created work dir
    ///
    /// Lets the caller arm a `WorkdirCleanup` before extraction starts.
    pub fn open_in(
        workdir: TempDir,
        roster_path: &Path,
        archive_path: &Path,
        config: &RosterConfig,
    ) -> Result<Self> {
        let roster_file = roster_file_name(RosterFormat::from_path(roster_path));
        let roster_copy = workdir.path().join(&roster_file);
        fs::copy(roster_path, &roster_copy)
            .with_context(|| format!("Failed to read roster file: {}", roster_path.display()))?;

        let archive_copy = workdir.path().join(ARCHIVE_FILE);
        fs::copy(archive_path, &archive_copy)
            .with_context(|| format!("Failed to read archive: {}", archive_path.display()))?;

        Self::build(workdir, &roster_file, config)
    }

    /// Start a session from uploaded bytes (web form)
    pub fn from_uploads(roster: &[u8], archive: &[u8], config: &RosterConfig) -> Result<Self> {
        let workdir = TempDir::new().context("Failed to create session directory")?;

        let roster_file = roster_file_name(RosterFormat::sniff(roster));
        fs::write(workdir.path().join(&roster_file), roster)
            .context("Failed to store uploaded roster")?;
        fs::write(workdir.path().join(ARCHIVE_FILE), archive)
            .context("Failed to store uploaded archive")?;

        Self::build(workdir, &roster_file, config)
    }

    fn build(workdir: TempDir, roster_file: &str, config: &RosterConfig) -> Result<Self> {
        let id = Uuid::new_v4();
        let pdf_dir = workdir.path().join(PDF_DIR);

        let extracted_files = extract_archive(&workdir.path().join(ARCHIVE_FILE), &pdf_dir)?;
        let roster = Roster::load(&workdir.path().join(roster_file), config)?;
        let bundles = classify_dir(&pdf_dir, &roster)?;

        let statuses = bundles
            .keys()
            .map(|name| (name.clone(), DispatchStatus::Pending))
            .collect();

        log::info!(
            "Session {}: {} suppliers with files ({} extracted, {} in roster)",
            id,
            bundles.len(),
            extracted_files,
            roster.len()
        );

        Ok(Session {
            id,
            workdir,
            roster,
            bundles,
            statuses,
            extracted_files,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Directory holding the extracted files (removed on drop)
    pub fn workdir(&self) -> &Path {
        self.workdir.path()
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    pub fn bundles(&self) -> &Classification {
        &self.bundles
    }

    pub fn bundle(&self, supplier: &str) -> Option<&ClassifiedBundle> {
        self.bundles.get(supplier)
    }

    /// Supplier names in display order
    pub fn suppliers(&self) -> Vec<String> {
        self.bundles.keys().cloned().collect()
    }

    pub fn extracted_files(&self) -> usize {
        self.extracted_files
    }

    pub fn status(&self, supplier: &str) -> Option<&DispatchStatus> {
        self.statuses.get(supplier)
    }

    /// Record an explicit "no" for a supplier
    pub fn decline(&mut self, supplier: &str) -> Result<()> {
        let status = self
            .statuses
            .get_mut(supplier)
            .with_context(|| format!("Supplier not in results: {}", supplier))?;

        *status = DispatchStatus::Declined;
        Ok(())
    }

    /// Send one supplier's bundle after an explicit "yes"
    ///
    /// Outcome is recorded as Sent/Saved/Failed; errors are returned to the
    /// caller. Other suppliers are not affected.
    pub fn send(&mut self, supplier: &str, sender: &dyn MailSender) -> Result<Dispatched> {
        let bundle = self
            .bundles
            .get(supplier)
            .with_context(|| format!("Supplier not in results: {}", supplier))?;

        let attachments: Vec<PathBuf> = bundle.attachments();
        let result = dispatch(sender, supplier, &bundle.email, &attachments);

        let status = match &result {
            Ok(dispatched) => DispatchStatus::from(&dispatched.delivery),
            Err(err) => {
                log::warn!("Send to {} failed: {}", supplier, err);
                DispatchStatus::Failed(err.to_string())
            }
        };
        self.statuses.insert(supplier.to_string(), status);

        result.with_context(|| format!("Failed to send mail to {}", supplier))
    }

    /// Serializable results view
    pub fn summary(&self) -> SessionSummary {
        let suppliers = self
            .bundles
            .iter()
            .map(|(name, bundle)| SupplierSummary {
                name: name.clone(),
                email: bundle.email.clone(),
                payment: file_names(&bundle.payment),
                order: file_names(&bundle.order),
                credit_note: file_names(&bundle.credit_note),
                status: self
                    .statuses
                    .get(name)
                    .cloned()
                    .unwrap_or(DispatchStatus::Pending),
            })
            .collect();

        SessionSummary {
            id: self.id,
            extracted_files: self.extracted_files,
            roster_size: self.roster.len(),
            suppliers,
        }
    }
}

fn file_names(paths: &[PathBuf]) -> Vec<String> {
    paths
        .iter()
        .map(|p| {
            p.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| p.display().to_string())
        })
        .collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub id: Uuid,
    pub extracted_files: usize,
    pub roster_size: usize,
    pub suppliers: Vec<SupplierSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SupplierSummary {
    pub name: String,
    pub email: Vec<String>,
    pub payment: Vec<String>,
    pub order: Vec<String>,
    #[serde(rename = "credit-note")]
    pub credit_note: Vec<String>,
    #[serde(flatten)]
    pub status: DispatchStatus,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{OutgoingMessage, SendError};
    use crate::mailer::OutboxSender;
    use crate::roster::tests::xlsx_bytes;
    use std::cell::RefCell;
    use std::fs::File;
    use std::io::Write;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    struct RecordingSender {
        sent: RefCell<Vec<OutgoingMessage>>,
        fail_for: Option<String>,
    }

    impl RecordingSender {
        fn new() -> Self {
            RecordingSender {
                sent: RefCell::new(Vec::new()),
                fail_for: None,
            }
        }
    }

    impl MailSender for RecordingSender {
        fn send(&self, message: &OutgoingMessage) -> Result<Delivery, SendError> {
            if let Some(name) = &self.fail_for {
                if message.subject.contains(name.as_str()) {
                    return Err(SendError::Transport("connection refused".to_string()));
                }
            }
            self.sent.borrow_mut().push(message.clone());
            Ok(Delivery::Sent("smtp://test".to_string()))
        }
    }

    fn write_zip(path: &Path, names: &[&str]) {
        let mut zip = ZipWriter::new(File::create(path).unwrap());
        for name in names {
            zip.start_file(*name, SimpleFileOptions::default()).unwrap();
            zip.write_all(b"%PDF-1.4").unwrap();
        }
        zip.finish().unwrap();
    }

    fn fixture(roster_csv: &str, entries: &[&str]) -> (TempDir, PathBuf, PathBuf) {
        let dir = TempDir::new().unwrap();
        let roster = dir.path().join("proveedores.csv");
        fs::write(&roster, roster_csv).unwrap();
        let archive = dir.path().join("archivos.zip");
        write_zip(&archive, entries);
        (dir, roster, archive)
    }

    #[test]
    fn test_end_to_end_bundle() {
        let (_dir, roster, archive) = fixture(
            "Razón Social,Mail\nACME,\"a@x.com; b@y.com\"\n",
            &["2024-01-05 PAGO ACME.pdf", "lote/2024-01-05_OP_ACME_001.pdf"],
        );

        let session = Session::open(&roster, &archive, &RosterConfig::default()).unwrap();

        let bundle = session.bundle("ACME").unwrap();
        assert_eq!(bundle.email.len(), 2);
        assert_eq!(bundle.payment.len(), 1);
        assert_eq!(bundle.order.len(), 1);
        assert_eq!(bundle.credit_note.len(), 0);
        assert_eq!(session.status("ACME"), Some(&DispatchStatus::Pending));
        assert_eq!(session.extracted_files(), 2);
    }

    #[test]
    fn test_only_roster_suppliers_in_results() {
        let (_dir, roster, archive) = fixture(
            "Razón Social,Mail\nACME,a@x.com\n",
            &["2024-01-05 PAGO ACME.pdf", "2024-01-05 PAGO OTHERCO.pdf"],
        );

        let session = Session::open(&roster, &archive, &RosterConfig::default()).unwrap();

        assert_eq!(session.suppliers(), vec!["ACME".to_string()]);
    }

    #[test]
    fn test_workdir_removed_on_drop() {
        let (_dir, roster, archive) = fixture(
            "Razón Social,Mail\nACME,a@x.com\n",
            &["2024-01-05 PAGO ACME.pdf"],
        );

        let session = Session::open(&roster, &archive, &RosterConfig::default()).unwrap();
        let workdir = session.workdir().to_path_buf();
        assert!(workdir.join("pdfs").is_dir());

        drop(session);
        assert!(!workdir.exists());
    }

    #[test]
    fn test_interrupt_cleanup_removes_extracted_files() {
        let (_dir, roster, archive) = fixture(
            "Razón Social,Mail\nACME,a@x.com\n",
            &["2024-01-05 PAGO ACME.pdf"],
        );

        // Como en la CLI: el handler se arma antes de extraer
        let workdir = TempDir::new().unwrap();
        let cleanup = WorkdirCleanup::new(workdir.path());
        let session =
            Session::open_in(workdir, &roster, &archive, &RosterConfig::default()).unwrap();
        assert!(cleanup.path().join("pdfs/2024-01-05 PAGO ACME.pdf").is_file());

        // Señal: corre sin que la sesión haga drop
        cleanup.run().unwrap();
        assert!(!cleanup.path().exists());

        // Segunda corrida y drop posterior no fallan
        cleanup.run().unwrap();
        drop(session);
    }

    #[test]
    fn test_outbox_send_recorded_as_saved_not_sent() {
        let (dir, roster, archive) = fixture(
            "Razón Social,Mail\nACME,a@x.com\n",
            &["2024-01-05 PAGO ACME.pdf"],
        );
        let mut session = Session::open(&roster, &archive, &RosterConfig::default()).unwrap();
        let outbox = OutboxSender::new("tesoreria@example.com".to_string(), dir.path().join("out"));

        let dispatched = session.send("ACME", &outbox).unwrap();

        let Delivery::Saved(path) = &dispatched.delivery else {
            panic!("outbox must not report a sent mail: {:?}", dispatched.delivery);
        };
        assert!(path.is_file());
        assert!(matches!(session.status("ACME"), Some(DispatchStatus::Saved(_))));
        assert!(!dispatched.delivery.report("ACME").contains("enviado a"));

        let json = serde_json::to_value(session.summary()).unwrap();
        assert_eq!(json["suppliers"][0]["status"], "saved");
    }

    #[test]
    fn test_xlsx_roster_from_path_and_upload() {
        let dir = TempDir::new().unwrap();
        let roster = dir.path().join("proveedores.xlsx");
        let workbook = xlsx_bytes(&[&["Razón Social", "Mail"], &["Acme", "a@x.com"]]);
        fs::write(&roster, &workbook).unwrap();
        let archive = dir.path().join("archivos.zip");
        write_zip(&archive, &["2024-01-05_OP_ACME_1.pdf"]);

        let session = Session::open(&roster, &archive, &RosterConfig::default()).unwrap();
        assert!(session.workdir().join("proveedores.xlsx").is_file());
        assert_eq!(session.suppliers(), vec!["ACME".to_string()]);

        let archive_bytes = fs::read(&archive).unwrap();
        let uploaded =
            Session::from_uploads(&workbook, &archive_bytes, &RosterConfig::default()).unwrap();
        assert!(uploaded.workdir().join("proveedores.xlsx").is_file());
        assert_eq!(uploaded.bundle("ACME").unwrap().order.len(), 1);
    }

    #[test]
    fn test_send_records_status_and_attachment_order() {
        let (_dir, roster, archive) = fixture(
            "Razón Social,Mail\nACME,a@x.com\n",
            &[
                "2024-02-01_CG_ACME_1.pdf",
                "2024-01-20_OP_ACME_1.pdf",
                "2024-03-01 PAGO ACME.pdf",
            ],
        );
        let mut session = Session::open(&roster, &archive, &RosterConfig::default()).unwrap();
        let sender = RecordingSender::new();

        let message = session.send("ACME", &sender).unwrap().message;

        assert_eq!(message.subject, "Pago ACME 20/01/2024");
        let names = file_names(&message.attachments);
        assert_eq!(
            names,
            vec![
                "2024-03-01 PAGO ACME.pdf",
                "2024-01-20_OP_ACME_1.pdf",
                "2024-02-01_CG_ACME_1.pdf",
            ]
        );
        assert_eq!(session.status("ACME"), Some(&DispatchStatus::Sent));
        assert_eq!(sender.sent.borrow().len(), 1);
    }

    #[test]
    fn test_failure_isolated_per_supplier() {
        let (_dir, roster, archive) = fixture(
            "Razón Social,Mail\nACME,a@x.com\nBETA,b@y.com\n",
            &["2024-01-05 PAGO ACME.pdf", "2024-01-05 PAGO BETA.pdf"],
        );
        let mut session = Session::open(&roster, &archive, &RosterConfig::default()).unwrap();
        let sender = RecordingSender {
            sent: RefCell::new(Vec::new()),
            fail_for: Some("ACME".to_string()),
        };

        let err = session.send("ACME", &sender).unwrap_err();
        assert!(format!("{:#}", err).contains("connection refused"));
        assert!(matches!(session.status("ACME"), Some(DispatchStatus::Failed(_))));

        session.send("BETA", &sender).unwrap();
        assert_eq!(session.status("BETA"), Some(&DispatchStatus::Sent));
    }

    #[test]
    fn test_decline_and_unknown_supplier() {
        let (_dir, roster, archive) = fixture(
            "Razón Social,Mail\nACME,a@x.com\n",
            &["2024-01-05 PAGO ACME.pdf"],
        );
        let mut session = Session::open(&roster, &archive, &RosterConfig::default()).unwrap();

        session.decline("ACME").unwrap();
        assert_eq!(session.status("ACME"), Some(&DispatchStatus::Declined));

        assert!(session.decline("NADIE").is_err());
        assert!(session.send("NADIE", &RecordingSender::new()).is_err());
    }

    #[test]
    fn test_from_uploads_and_summary() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("a.zip");
        write_zip(&archive, &["2024-01-05_CG_ACME_9.pdf"]);
        let archive_bytes = fs::read(&archive).unwrap();

        let session = Session::from_uploads(
            b"Razon Social,Mail\n",
            &archive_bytes,
            &RosterConfig {
                name_column: "Razon Social".to_string(),
                ..RosterConfig::default()
            },
        )
        .unwrap();
        assert!(session.bundles().is_empty());

        let session = Session::from_uploads(
            "Razón Social,Mail\nacme,a@x.com\n".as_bytes(),
            &archive_bytes,
            &RosterConfig::default(),
        )
        .unwrap();

        let summary = session.summary();
        assert_eq!(summary.suppliers.len(), 1);
        assert_eq!(summary.suppliers[0].credit_note, vec!["2024-01-05_CG_ACME_9.pdf"]);

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["suppliers"][0]["status"], "pending");
        assert_eq!(json["roster_size"], 1);
    }

    #[test]
    fn test_bad_archive_fails_session() {
        let result = Session::from_uploads(
            "Razón Social,Mail\nACME,a@x.com\n".as_bytes(),
            b"not a zip",
            &RosterConfig::default(),
        );
        assert!(result.is_err());
    }
}
