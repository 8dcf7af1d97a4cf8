// src/dedup.rs

use crate::fields::ExtractedFields;
use std::fmt;

/// Fields that identify an invoice, in key order.
const KEY_FIELDS: [&str; 4] = [
    "invoice_number",
    "account_number",
    "total_amount_due",
    "billing_date",
];

const SEPARATOR: &str = "::";
const MISSING: &str = "NA";
const FALLBACK_PREFIX: &str = "FALLBACK::";

/// Identity of a processed invoice, as stored in the processed-key log.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey(String);

impl DedupKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for DedupKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for DedupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Build the dedup key for an invoice.
///
/// Invoices that agree on invoice number, account number, total due and
/// billing date collapse to the same key. When the model found none of those,
/// the file's content hash (or id) is the only identity left.
pub fn build_unique_key(fields: &ExtractedFields, fallback: &str) -> DedupKey {
    let parts: Vec<&str> = KEY_FIELDS.iter().map(|f| fields.get(f).trim()).collect();

    if parts.iter().any(|p| !p.is_empty()) {
        let joined = parts
            .iter()
            .map(|p| if p.is_empty() { MISSING } else { p })
            .collect::<Vec<_>>()
            .join(SEPARATOR);
        DedupKey(joined)
    } else {
        DedupKey(format!("{FALLBACK_PREFIX}{fallback}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(inv: &str, acc: &str, total: &str, date: &str) -> ExtractedFields {
        let mut f = ExtractedFields::empty();
        f.set("invoice_number", inv);
        f.set("account_number", acc);
        f.set("total_amount_due", total);
        f.set("billing_date", date);
        f
    }

    #[test]
    fn test_all_key_fields_present() {
        let key = build_unique_key(&fields("INV-1", "ACC-9", "100.00", "2024-01-01"), "x");
        assert_eq!(key.as_str(), "INV-1::ACC-9::100.00::2024-01-01");
    }

    #[test]
    fn test_all_empty_uses_fallback() {
        let key = build_unique_key(&ExtractedFields::empty(), "hash123");
        assert_eq!(key.as_str(), "FALLBACK::hash123");
    }

    #[test]
    fn test_fallback_ignores_other_fields() {
        let mut f = fields("", " ", "", "\t");
        f.set("company_name", "Acme Fiber");
        f.set("file_name", "march.pdf");
        assert_eq!(build_unique_key(&f, "hash123").as_str(), "FALLBACK::hash123");
    }

    #[test]
    fn test_missing_components_become_na() {
        let key = build_unique_key(&fields("INV-1", "", "", ""), "x");
        assert_eq!(key.as_str(), "INV-1::NA::NA::NA");

        let key = build_unique_key(&fields("", "", "", "2024-02-01"), "x");
        assert_eq!(key.as_str(), "NA::NA::NA::2024-02-01");
    }

    #[test]
    fn test_whitespace_is_trimmed() {
        let a = build_unique_key(&fields("  INV-1 ", "ACC-9\n", "100.00", "2024-01-01"), "x");
        let b = build_unique_key(&fields("INV-1", "ACC-9", "100.00", "2024-01-01"), "y");
        assert_eq!(a, b);
    }

    #[test]
    fn test_any_key_field_change_changes_key() {
        let base = fields("INV-1", "ACC-9", "100.00", "2024-01-01");
        let base_key = build_unique_key(&base, "x");
        for (i, name) in KEY_FIELDS.iter().enumerate() {
            let mut changed = base.clone();
            changed.set(*name, format!("other-{i}"));
            assert_ne!(build_unique_key(&changed, "x"), base_key, "field {name}");
        }
    }
}
