// 📇 Roster Loader - Supplier name → email addresses
// Lee la planilla de proveedores: .xlsx/.xls/.ods (calamine) o CSV exportado.
// CSV en UTF-8 o Windows-1252 (export típico de Excel es-AR).

use crate::config::RosterConfig;
use crate::normalize::normalize;
use anyhow::{Context, Result};
use calamine::{open_workbook_auto, Data, Reader};
use csv::ReaderBuilder;
use encoding_rs::WINDOWS_1252;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::LazyLock;

static EMAIL_SEPARATORS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[;,\s]+").expect("valid regex"));

static EMAIL_SHAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[a-zA-Z]{2,}$").expect("valid regex"));

// ============================================================================
// SUPPLIER RECORD
// ============================================================================

/// One roster entry: canonical name + deduplicated valid addresses
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupplierRecord {
    /// Canonical (normalized) supplier name
    pub name: String,

    /// Shape-valid addresses, first-seen order, no duplicates
    pub emails: Vec<String>,
}

impl SupplierRecord {
    fn new(name: String) -> Self {
        SupplierRecord {
            name,
            emails: Vec::new(),
        }
    }

    fn add_email(&mut self, email: String) {
        if !self.emails.contains(&email) {
            self.emails.push(email);
        }
    }
}

// ============================================================================
// EMAIL TOKENS
// ============================================================================

/// Basic address shape: local-part@domain.tld with a TLD of 2+ letters
pub fn is_valid_email(token: &str) -> bool {
    EMAIL_SHAPE.is_match(token)
}

/// Split a roster email cell on runs of `;`, `,` or whitespace and keep
/// only shape-valid tokens
pub fn split_emails(cell: &str) -> Vec<String> {
    EMAIL_SEPARATORS
        .split(cell)
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .filter(|token| {
            let valid = is_valid_email(token);
            if !valid {
                log::debug!("Discarding invalid email token {:?}", token);
            }
            valid
        })
        .map(str::to_string)
        .collect()
}

// ============================================================================
// FILE FORMAT
// ============================================================================

/// Roster file kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RosterFormat {
    Xlsx,
    Xls,
    Ods,
    /// Delimited text; also the fallback for unknown extensions
    Csv,
}

impl RosterFormat {
    /// Pick the reader from the file extension (case-insensitive)
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        match ext.as_str() {
            "xlsx" | "xlsm" => RosterFormat::Xlsx,
            "xls" => RosterFormat::Xls,
            "ods" => RosterFormat::Ods,
            _ => RosterFormat::Csv,
        }
    }

    /// Guess from content (uploads carry no trustworthy name)
    ///
    /// OLE2 header → xls; ZIP container → ods if it declares the
    /// OpenDocument mimetype, otherwise xlsx; anything else → CSV.
    pub fn sniff(bytes: &[u8]) -> Self {
        const OLE2: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];
        const ZIP: &[u8] = b"PK\x03\x04";
        const ODS_MIME: &[u8] = b"application/vnd.oasis.opendocument.spreadsheet";

        if bytes.starts_with(OLE2) {
            RosterFormat::Xls
        } else if bytes.starts_with(ZIP) {
            let head = &bytes[..bytes.len().min(128)];
            if head.windows(ODS_MIME.len()).any(|w| w == ODS_MIME) {
                RosterFormat::Ods
            } else {
                RosterFormat::Xlsx
            }
        } else {
            RosterFormat::Csv
        }
    }

    pub fn extension(&self) -> &str {
        match self {
            RosterFormat::Xlsx => "xlsx",
            RosterFormat::Xls => "xls",
            RosterFormat::Ods => "ods",
            RosterFormat::Csv => "csv",
        }
    }
}

/// Decode one CSV field: UTF-8 if valid, Windows-1252 otherwise
fn decode_field(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => WINDOWS_1252.decode_without_bom_handling(bytes).0.into_owned(),
    }
}

/// Workbook cell as text; whole numbers without the trailing ".0"
fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(text) => text.clone(),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        other => other.to_string(),
    }
}

// ============================================================================
// ROSTER
// ============================================================================

/// Canonical name → SupplierRecord, in insertion order of distinct names
///
/// Built once per load, read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct Roster {
    records: Vec<SupplierRecord>,
    index: HashMap<String, usize>,
}

impl Roster {
    /// Create an empty roster
    pub fn new() -> Self {
        Self::default()
    }

    /// Load roster from a spreadsheet or CSV file, chosen by extension
    pub fn load(path: &Path, config: &RosterConfig) -> Result<Self> {
        let roster = match RosterFormat::from_path(path) {
            RosterFormat::Csv => {
                let file = File::open(path).with_context(|| {
                    format!("Failed to open roster file: {}", path.display())
                })?;
                Self::from_reader(file, config)
            }
            _ => Self::from_workbook(path, config),
        };

        roster.with_context(|| format!("Failed to load roster: {}", path.display()))
    }

    /// First sheet of an xlsx/xls/ods workbook; first row is the header
    pub fn from_workbook(path: &Path, config: &RosterConfig) -> Result<Self> {
        let mut workbook = open_workbook_auto(path)
            .with_context(|| format!("Failed to open workbook: {}", path.display()))?;

        let range = workbook
            .worksheet_range_at(0)
            .context("Workbook has no sheets")?
            .context("Failed to read first sheet")?;

        let rows = range
            .rows()
            .map(|row| Ok::<_, anyhow::Error>(row.iter().map(cell_text).collect::<Vec<_>>()));

        Self::from_rows(rows, config)
    }

    /// Load roster from any CSV source (header row required)
    pub fn from_reader<R: Read>(reader: R, config: &RosterConfig) -> Result<Self> {
        let mut reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .delimiter(config.delimiter_byte()?)
            .from_reader(reader);

        let rows = reader.byte_records().enumerate().map(|(line_num, result)| -> Result<_> {
            let record = result
                .with_context(|| format!("Failed to parse roster line {}", line_num + 1))?;
            Ok(record.iter().map(decode_field).collect::<Vec<_>>())
        });

        Self::from_rows(rows, config)
    }

    /// Build from raw rows: the first one is the header
    pub fn from_rows<I>(rows: I, config: &RosterConfig) -> Result<Self>
    where
        I: IntoIterator<Item = Result<Vec<String>>>,
    {
        let mut rows = rows.into_iter();

        let headers = rows
            .next()
            .context("Roster is empty (no header row)")?
            .context("Failed to read roster header row")?;
        let name_idx = find_column(&headers, &config.name_column)?;
        let email_idx = find_column(&headers, &config.email_column)?;

        let mut roster = Roster::new();

        for row in rows {
            let row = row?;
            let name = row.get(name_idx).map(String::as_str).unwrap_or("");
            let emails = row.get(email_idx).map(String::as_str).unwrap_or("");
            roster.add_row(name, emails);
        }

        log::info!("Roster loaded: {} suppliers with valid emails", roster.len());
        Ok(roster)
    }

    /// Merge one spreadsheet row into the roster
    ///
    /// A name only becomes a key once it has at least one valid address;
    /// repeated rows for the same supplier union their addresses.
    pub fn add_row(&mut self, raw_name: &str, raw_emails: &str) {
        let name = normalize(raw_name);
        if name.is_empty() {
            return;
        }

        for email in split_emails(raw_emails) {
            let idx = match self.index.get(&name) {
                Some(idx) => *idx,
                None => {
                    self.records.push(SupplierRecord::new(name.clone()));
                    self.index.insert(name.clone(), self.records.len() - 1);
                    self.records.len() - 1
                }
            };
            self.records[idx].add_email(email);
        }
    }

    /// Lookup by canonical name
    pub fn get(&self, name: &str) -> Option<&SupplierRecord> {
        self.index.get(name).map(|idx| &self.records[*idx])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &SupplierRecord> {
        self.records.iter()
    }
}

/// Locate a header by normalized comparison (case/whitespace-insensitive)
fn find_column(headers: &[String], wanted: &str) -> Result<usize> {
    let wanted_norm = normalize(wanted);

    headers
        .iter()
        .position(|h| normalize(h.trim_start_matches('\u{feff}')) == wanted_norm)
        .with_context(|| {
            format!(
                "Roster is missing column {:?} (found: {})",
                wanted,
                headers.join(", ")
            )
        })
}
