// 📅 Date Extractor - Fecha representativa para el asunto del mail
// Busca "YYYY-MM-DD" al inicio del basename y se queda con la más temprana

use chrono::NaiveDate;
use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;

static LEADING_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{4}-\d{2}-\d{2})").expect("valid regex"));

/// Display format used in outgoing subjects
pub const SUBJECT_DATE_FORMAT: &str = "%d/%m/%Y";

/// Parse a leading YYYY-MM-DD token from a file's basename
///
/// Returns None when there is no token or it is not a real date
/// (e.g. "2024-02-30").
pub fn leading_date<P: AsRef<Path>>(path: P) -> Option<NaiveDate> {
    let basename = path.as_ref().file_name()?.to_str()?;
    let token = LEADING_DATE.captures(basename)?.get(1)?.as_str();

    NaiveDate::parse_from_str(token, "%Y-%m-%d").ok()
}

/// Earliest leading date across a set of filenames
///
/// Unparseable entries are skipped; None if nothing parsed.
pub fn earliest_date<I, P>(paths: I) -> Option<NaiveDate>
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    paths.into_iter().filter_map(leading_date).min()
}

/// Subject date: earliest filename date, falling back to `today`
pub fn subject_date<I, P>(paths: I, today: NaiveDate) -> String
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    earliest_date(paths)
        .unwrap_or(today)
        .format(SUBJECT_DATE_FORMAT)
        .to_string()
}
