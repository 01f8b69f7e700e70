// 🏷️ Filename Classifier - Category + supplier from a PDF filename
//
// Convenciones de nombres:
// - Pagos:  "2024-01-05 PAGO ACME SA.pdf"   → proveedor entre "PAGO " y ".PDF"
// - OPs:    "2024-01-05_OP_ACME_001.pdf"    → proveedor = 3er segmento "_"
// - CGs:    "2024-01-05_CG_ACME_001.pdf"    → idem OP
//
// OP y CG son chequeos de substring crudos (no tokens delimitados): un
// nombre como "SHOP_X_Y.pdf" cae en OP. Se mantiene así a propósito.

use crate::normalize::normalize;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::LazyLock;

static PAYMENT_SUPPLIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"PAGO\s+(.+?)\.PDF$").expect("valid regex"));

// ============================================================================
// CATEGORY
// ============================================================================

/// Category - Qué tipo de comprobante es el archivo
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    Payment,
    Order,
    CreditNote,
    Unknown,
}

impl Category {
    /// Categories that end up in a bundle, in attachment order
    pub const BUNDLED: [Category; 3] = [Category::Payment, Category::Order, Category::CreditNote];

    /// Human-readable name for display
    pub fn name(&self) -> &str {
        match self {
            Category::Payment => "Pagos",
            Category::Order => "OPs",
            Category::CreditNote => "CGs",
            Category::Unknown => "Desconocido",
        }
    }

    /// Short tag shown next to filenames
    pub fn tag(&self) -> &str {
        match self {
            Category::Payment => "PAGO",
            Category::Order => "OP",
            Category::CreditNote => "CG",
            Category::Unknown => "?",
        }
    }

    /// Stable identifier (matches the serde form)
    pub fn code(&self) -> &str {
        match self {
            Category::Payment => "payment",
            Category::Order => "order",
            Category::CreditNote => "credit-note",
            Category::Unknown => "unknown",
        }
    }
}

// ============================================================================
// CLASSIFICATION
// ============================================================================

/// Result of inspecting one filename
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileClassification {
    pub category: Category,

    /// Canonical supplier name, when one could be extracted
    pub supplier: Option<String>,
}

impl FileClassification {
    fn unknown() -> Self {
        FileClassification {
            category: Category::Unknown,
            supplier: None,
        }
    }
}

/// Classify a filename (a path is reduced to its basename first)
///
/// Checks run in fixed priority: PAGO, then OP, then CG. First match wins.
pub fn classify_filename(filename: &str) -> FileClassification {
    let basename = Path::new(filename)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(filename);
    let name_upper = basename.to_uppercase();

    let (category, raw_supplier) = if name_upper.contains("PAGO") {
        let supplier = PAYMENT_SUPPLIER
            .captures(&name_upper)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().trim().to_string());
        (Category::Payment, supplier)
    } else if name_upper.contains("OP") {
        (Category::Order, underscore_supplier(&name_upper))
    } else if name_upper.contains("CG") {
        (Category::CreditNote, underscore_supplier(&name_upper))
    } else {
        return FileClassification::unknown();
    };

    let supplier = raw_supplier
        .map(normalize)
        .filter(|name| !name.is_empty());

    FileClassification { category, supplier }
}

/// Third "_" segment with any ".PDF" removed
fn underscore_supplier(name_upper: &str) -> Option<String> {
    name_upper
        .split('_')
        .nth(2)
        .map(|segment| segment.replace(".PDF", "").trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classified(filename: &str) -> (Category, Option<String>) {
        let result = classify_filename(filename);
        (result.category, result.supplier)
    }

    #[test]
    fn test_payment() {
        assert_eq!(
            classified("2024-01-05 PAGO ACME SA.PDF"),
            (Category::Payment, Some("ACME SA".to_string()))
        );
    }

    #[test]
    fn test_payment_is_case_insensitive() {
        assert_eq!(
            classified("2024-01-05 pago  Acme   sa .pdf"),
            (Category::Payment, Some("ACME SA".to_string()))
        );
    }

    #[test]
    fn test_payment_without_supplier_segment() {
        assert_eq!(classified("PAGO.pdf"), (Category::Payment, None));
    }

    #[test]
    fn test_order() {
        assert_eq!(
            classified("2024-01-05_OP_ACME_001.PDF"),
            (Category::Order, Some("ACME".to_string()))
        );
    }

    #[test]
    fn test_order_supplier_is_last_segment() {
        assert_eq!(
            classified("2024-01-05_op_acme sa.pdf"),
            (Category::Order, Some("ACME SA".to_string()))
        );
    }

    #[test]
    fn test_order_with_too_few_segments() {
        assert_eq!(classified("OP_ACME.pdf"), (Category::Order, None));
    }

    #[test]
    fn test_credit_note() {
        assert_eq!(
            classified("2024-01-05_CG_ACME_001.pdf"),
            (Category::CreditNote, Some("ACME".to_string()))
        );
    }

    #[test]
    fn test_unknown() {
        assert_eq!(classified("factura_acme.pdf"), (Category::Unknown, None));
        assert_eq!(classified(""), (Category::Unknown, None));
    }

    #[test]
    fn test_priority_payment_over_order() {
        // Contiene PAGO y OP: gana PAGO
        let (category, supplier) = classified("2024-01-05 PAGO OPTICA SUR.pdf");
        assert_eq!(category, Category::Payment);
        assert_eq!(supplier, Some("OPTICA SUR".to_string()));
    }

    #[test]
    fn test_priority_order_over_credit_note() {
        // Token CG, pero "OPTIMA" contiene OP y OP se evalúa antes
        let (category, supplier) = classified("2024-01-05_CG_OPTIMA_1.pdf");
        assert_eq!(category, Category::Order);
        assert_eq!(supplier, Some("OPTIMA".to_string()));

        // OP y CG como tokens: gana OP
        let (category, supplier) = classified("2024-01-05_OP-CG_ACME_1.pdf");
        assert_eq!(category, Category::Order);
        assert_eq!(supplier, Some("ACME".to_string()));
    }

    #[test]
    fn test_credit_note_supplier_containing_op_is_order() {
        let (category, supplier) = classified("2024-01-05_CG_COOPERATIVA SUR_3.pdf");
        assert_eq!(category, Category::Order);
        assert_eq!(supplier, Some("COOPERATIVA SUR".to_string()));

        // Sin OP en ningún lado sí es CG
        let (category, _) = classified("2024-01-05_CG_ACME_3.pdf");
        assert_eq!(category, Category::CreditNote);
    }

    #[test]
    fn test_incidental_substring_matches_order() {
        // "SHOP" contiene "OP": clasificación permisiva
        let (category, supplier) = classified("2024_SHOP_ACME_x.pdf");
        assert_eq!(category, Category::Order);
        assert_eq!(supplier, Some("ACME".to_string()));
    }

    #[test]
    fn test_path_is_reduced_to_basename() {
        let (category, supplier) = classified("nested/OP_dir/2024-01-05_CG_ACME_1.pdf");
        assert_eq!(category, Category::CreditNote);
        assert_eq!(supplier, Some("ACME".to_string()));
    }

    #[test]
    fn test_category_codes() {
        assert_eq!(Category::CreditNote.code(), "credit-note");
        assert_eq!(
            serde_json::to_string(&Category::CreditNote).unwrap(),
            "\"credit-note\""
        );
        assert_eq!(Category::BUNDLED.len(), 3);
    }
}
