// src/sheet_writer.rs

use crate::error::SheetError;
use crate::fields::ExtractedFields;
use crate::google_hub::Connector;
use async_trait::async_trait;
use google_sheets4::Sheets;
use google_sheets4::api::{Scope, ValueRange};
use serde_json::Value;
use tokio::sync::OnceCell;
use tracing::{error, info};

/// Result of appending one invoice row.
#[derive(Debug, Clone, PartialEq)]
pub enum AppendOutcome {
    Success { row: Vec<String> },
    Error { message: String },
}

/// Where extracted invoices end up.
#[async_trait]
pub trait SheetSink: Send + Sync {
    /// Write `names` into row 1 if row 1 is empty. Failures are logged only.
    async fn ensure_headers(&self, names: &[&str]);

    /// Append one row in `names` order, missing values empty.
    async fn append_row(&self, fields: &ExtractedFields, names: &[&str]) -> AppendOutcome;

    /// Header check followed by the append.
    async fn write(&self, fields: &ExtractedFields, names: &[&str]) -> AppendOutcome {
        self.ensure_headers(names).await;
        self.append_row(fields, names).await
    }
}

/// First worksheet of a Google spreadsheet.
pub struct GoogleSheet {
    hub: Sheets<Connector>,
    sheet_id: String,
    worksheet: OnceCell<String>,
}

impl GoogleSheet {
    pub fn new(hub: Sheets<Connector>, sheet_id: impl Into<String>) -> Self {
        Self {
            hub,
            sheet_id: sheet_id.into(),
            worksheet: OnceCell::new(),
        }
    }

    /// Quoted title of the first worksheet, looked up once.
    async fn worksheet(&self) -> Result<&str, SheetError> {
        let title = self
            .worksheet
            .get_or_try_init(|| async {
                let (_, spreadsheet) = self
                    .hub
                    .spreadsheets()
                    .get(&self.sheet_id)
                    .param("fields", "sheets.properties.title")
                    .add_scope(Scope::Spreadsheet)
                    .doit()
                    .await?;

                let title = spreadsheet
                    .sheets
                    .unwrap_or_default()
                    .into_iter()
                    .next()
                    .and_then(|s| s.properties)
                    .and_then(|p| p.title)
                    .ok_or(SheetError::NoWorksheet)?;

                info!(worksheet = %title, "Resolved first worksheet");
                Ok::<_, SheetError>(quote_title(&title))
            })
            .await?;
        Ok(title.as_str())
    }

    async fn try_ensure_headers(&self, names: &[&str]) -> Result<(), SheetError> {
        let ws = self.worksheet().await?;

        let (_, existing) = self
            .hub
            .spreadsheets()
            .values_get(&self.sheet_id, &format!("{ws}!1:1"))
            .add_scope(Scope::Spreadsheet)
            .doit()
            .await?;

        let first_row = existing
            .values
            .unwrap_or_default()
            .into_iter()
            .next()
            .unwrap_or_default();

        if !needs_header(&first_row) {
            info!(columns = first_row.len(), "Headers already exist");
            return Ok(());
        }

        info!("First row empty — writing headers");
        let header = ValueRange {
            values: Some(vec![names.iter().map(|n| Value::from(*n)).collect()]),
            ..Default::default()
        };
        self.hub
            .spreadsheets()
            .values_update(header, &self.sheet_id, &format!("{ws}!A1"))
            .value_input_option("RAW")
            .add_scope(Scope::Spreadsheet)
            .doit()
            .await?;
        Ok(())
    }

    async fn try_append(&self, row: &[String]) -> Result<(), SheetError> {
        let ws = self.worksheet().await?;
        let body = ValueRange {
            values: Some(vec![row.iter().map(|v| Value::from(v.as_str())).collect()]),
            ..Default::default()
        };
        self.hub
            .spreadsheets()
            .values_append(body, &self.sheet_id, ws)
            .value_input_option("RAW")
            .insert_data_option("INSERT_ROWS")
            .add_scope(Scope::Spreadsheet)
            .doit()
            .await?;
        Ok(())
    }
}

/// A1-notation sheet reference: `'Title'` with embedded quotes doubled.
fn quote_title(title: &str) -> String {
    format!("'{}'", title.replace('\'', "''"))
}

#[async_trait]
impl SheetSink for GoogleSheet {
    async fn ensure_headers(&self, names: &[&str]) {
        if let Err(e) = self.try_ensure_headers(names).await {
            error!(error = %e, "Failed to ensure headers");
        }
    }

    async fn append_row(&self, fields: &ExtractedFields, names: &[&str]) -> AppendOutcome {
        let row = fields.to_row(names);
        info!(columns = row.len(), "Appending row");
        match self.try_append(&row).await {
            Ok(()) => {
                info!("Row successfully added");
                AppendOutcome::Success { row }
            }
            Err(e) => {
                error!(error = %e, "Failed to append row");
                AppendOutcome::Error {
                    message: e.to_string(),
                }
            }
        }
    }
}

/// Row 1 only gets the header when it holds nothing but blank cells.
fn needs_header(first_row: &[Value]) -> bool {
    first_row.iter().all(|cell| match cell {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_needs_header_only_for_blank_first_row() {
        assert!(needs_header(&[]));
        assert!(needs_header(&[json!(""), Value::Null, json!("  ")]));

        assert!(!needs_header(&[json!("file_name"), json!("invoice_number")]));
        assert!(!needs_header(&[json!(""), json!("INV-1")]));
        assert!(!needs_header(&[json!(0)]));
    }

    #[test]
    fn test_quote_title() {
        assert_eq!(quote_title("Sheet1"), "'Sheet1'");
        assert_eq!(quote_title("Bob's invoices"), "'Bob''s invoices'");
    }
}
