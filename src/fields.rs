// src/fields.rs

use serde_json::{Map, Value};
use std::collections::HashMap;

/// Column order of the spreadsheet. Row 1 carries exactly these names.
pub const FIELDS: [&str; 26] = [
    "file_name",
    "invoice_number",
    "account_number",
    "billing_date",
    "services_from",
    "services_to",
    "previous_balance",
    "payments",
    "balance_forward",
    "regular_monthly_charges",
    "taxes_fees_other_charges",
    "new_charges",
    "amount_due_date",
    "total_amount_due",
    "company_name",
    "company_address",
    "bandwidth",
    "port_id",
    "circuit_id",
    "evc_area_type",
    "ipv4_25_price",
    "ipv4_24_price",
    "equipment_charges",
    "sales_tax_city",
    "sales_tax_county",
    "sales_tax_state",
];

/// Field values returned by the model for one invoice.
///
/// Keys are whatever the model sent back; nothing here checks them against
/// [`FIELDS`]. Missing names read as the empty string.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedFields {
    values: HashMap<String, String>,
}

impl ExtractedFields {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build from a decoded JSON object. Strings are kept as-is, numbers and
    /// booleans are rendered, everything else becomes empty.
    pub fn from_json_object(obj: Map<String, Value>) -> Self {
        let values = obj
            .into_iter()
            .map(|(k, v)| {
                let s = match v {
                    Value::String(s) => s,
                    Value::Number(n) => n.to_string(),
                    Value::Bool(b) => b.to_string(),
                    Value::Null | Value::Array(_) | Value::Object(_) => String::new(),
                };
                (k, s)
            })
            .collect();
        Self { values }
    }

    pub fn get(&self, name: &str) -> &str {
        self.values.get(name).map(String::as_str).unwrap_or("")
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    /// Insert an empty value for every schema field the model left out.
    pub fn normalize(&mut self, names: &[&str]) {
        for name in names {
            self.values.entry((*name).to_string()).or_default();
        }
    }

    /// Values in column order, missing ones as empty strings.
    pub fn to_row(&self, names: &[&str]) -> Vec<String> {
        names.iter().map(|n| self.get(n).to_string()).collect()
    }

    /// How many schema fields carry a non-blank value.
    pub fn coverage(&self) -> (usize, usize) {
        let filled = FIELDS
            .iter()
            .filter(|f| !self.get(f).trim().is_empty())
            .count();
        (filled, FIELDS.len())
    }

    pub fn is_empty(&self) -> bool {
        self.values.values().all(|v| v.trim().is_empty())
    }
}
