// 🗂️ Classification Engine - Directory walk → per-supplier bundles
//
// Recorre el directorio extraído, clasifica cada PDF y agrupa por proveedor.
// Sólo entran proveedores presentes en el roster; el resto se descarta
// (sin reporte al operador, sólo log::debug!).

use crate::classifier::{classify_filename, Category};
use crate::roster::Roster;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

// ============================================================================
// CLASSIFIED BUNDLE
// ============================================================================

/// Files + recipients for one supplier
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifiedBundle {
    /// Recipients, copied from the roster
    pub email: Vec<String>,

    pub payment: Vec<PathBuf>,
    pub order: Vec<PathBuf>,

    #[serde(rename = "credit-note")]
    pub credit_note: Vec<PathBuf>,
}

impl ClassifiedBundle {
    /// Files of one category (empty for Unknown)
    pub fn files(&self, category: Category) -> &[PathBuf] {
        match category {
            Category::Payment => &self.payment,
            Category::Order => &self.order,
            Category::CreditNote => &self.credit_note,
            Category::Unknown => &[],
        }
    }

    /// All attachments in send order: payments, orders, credit notes
    pub fn attachments(&self) -> Vec<PathBuf> {
        Category::BUNDLED
            .iter()
            .flat_map(|category| self.files(*category).iter().cloned())
            .collect()
    }

    pub fn file_count(&self) -> usize {
        self.payment.len() + self.order.len() + self.credit_note.len()
    }

    fn push(&mut self, category: Category, path: PathBuf) {
        match category {
            Category::Payment => self.payment.push(path),
            Category::Order => self.order.push(path),
            Category::CreditNote => self.credit_note.push(path),
            Category::Unknown => {}
        }
    }
}

/// Canonical supplier name → bundle
pub type Classification = BTreeMap<String, ClassifiedBundle>;

// ============================================================================
// ENGINE
// ============================================================================

pub struct ClassificationEngine<'a> {
    roster: &'a Roster,
}

impl<'a> ClassificationEngine<'a> {
    pub fn new(roster: &'a Roster) -> Self {
        ClassificationEngine { roster }
    }

    /// Walk `root` recursively and group every matching PDF by supplier
    pub fn classify_dir(&self, root: &Path) -> Result<Classification> {
        anyhow::ensure!(
            root.is_dir(),
            "Classification root is not a directory: {}",
            root.display()
        );

        let mut result = Classification::new();

        // Orden por nombre: listas por categoría deterministas
        let walker = WalkDir::new(root).sort_by_file_name();

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    log::warn!("Skipping unreadable entry under {}: {}", root.display(), err);
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }

            self.classify_file(entry.path(), &mut result);
        }

        log::info!(
            "Classified {} files for {} suppliers",
            result.values().map(ClassifiedBundle::file_count).sum::<usize>(),
            result.len()
        );

        Ok(result)
    }

    fn classify_file(&self, path: &Path, result: &mut Classification) {
        if !is_pdf(path) {
            log::debug!("Ignoring non-PDF file {}", path.display());
            return;
        }

        let filename = match path.file_name().and_then(|n| n.to_str()) {
            Some(name) => name,
            None => {
                log::debug!("Ignoring non UTF-8 filename {}", path.display());
                return;
            }
        };

        let classified = classify_filename(filename);

        let supplier = match (classified.category, classified.supplier) {
            (Category::Unknown, _) | (_, None) => {
                log::debug!("Unclassified file dropped: {}", filename);
                return;
            }
            (_, Some(supplier)) => supplier,
        };

        let record = match self.roster.get(&supplier) {
            Some(record) => record,
            None => {
                log::debug!("Supplier {:?} not in roster, dropping {}", supplier, filename);
                return;
            }
        };

        let bundle = result.entry(supplier).or_default();
        bundle.email = record.emails.clone();
        bundle.push(classified.category, path.to_path_buf());
    }
}

/// Classify a directory against a roster
pub fn classify_dir(root: &Path, roster: &Roster) -> Result<Classification> {
    ClassificationEngine::new(roster)
        .classify_dir(root)
        .with_context(|| format!("Failed to classify files under {}", root.display()))
}

/// Lowercased file name ends with ".pdf" (a bare ".pdf" counts too)
fn is_pdf(path: &Path) -> bool {
    path.file_name()
        .map(|name| name.to_string_lossy().to_lowercase().ends_with(".pdf"))
        .unwrap_or(false)
}
