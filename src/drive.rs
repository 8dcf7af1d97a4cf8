// src/drive.rs

use crate::error::DriveError;
use crate::google_hub::Connector;
use crate::pdf_extract::{self, PdfContent};
use async_trait::async_trait;
use google_drive3::DriveHub;
use google_drive3::api::Scope;
use http_body_util::BodyExt;
use tracing::{info, warn};

/// One PDF found in the source folder during a poll cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct InvoiceFileRef {
    pub id: String,
    pub name: String,
    /// Storage checksum, or the file id when the storage reports none.
    pub content_hash: String,
}

impl InvoiceFileRef {
    pub fn new(id: impl Into<String>, name: impl Into<String>, checksum: Option<String>) -> Self {
        let id = id.into();
        let content_hash = checksum.filter(|c| !c.is_empty()).unwrap_or_else(|| id.clone());
        Self {
            id,
            name: name.into(),
            content_hash,
        }
    }
}

/// Where invoices come from.
#[async_trait]
pub trait FolderSource: Send + Sync {
    /// Every PDF currently in the folder.
    async fn list_pdfs(&self) -> Result<Vec<InvoiceFileRef>, DriveError>;

    /// Plain text of the file; empty when nothing could be extracted.
    async fn read_text(&self, file: &InvoiceFileRef) -> Result<String, DriveError>;
}

pub struct DriveFolder {
    hub: DriveHub<Connector>,
    folder_id: String,
}

impl DriveFolder {
    pub fn new(hub: DriveHub<Connector>, folder_id: impl Into<String>) -> Self {
        Self {
            hub,
            folder_id: folder_id.into(),
        }
    }

    fn query(&self) -> String {
        pdf_query(&self.folder_id)
    }

    fn list_page<'a>(
        &'a self,
        query: &'a str,
        page_token: Option<String>,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Vec<InvoiceFileRef>, DriveError>> + Send + 'a>,
    > {
        info!(query = %query, has_page_token = page_token.is_some(), "Listing folder");

        Box::pin(async move {
            let mut req = self
                .hub
                .files()
                .list()
                .q(query)
                .param("fields", "nextPageToken, files(id, name, md5Checksum)")
                .add_scope(Scope::Readonly);

            if let Some(ref token) = page_token {
                req = req.page_token(token);
            }

            let (_, response) = req.doit().await?;

            let mut files: Vec<InvoiceFileRef> = response
                .files
                .unwrap_or_default()
                .into_iter()
                .filter_map(|f| {
                    let id = f.id?;
                    let name = f.name.unwrap_or_else(|| id.clone());
                    Some(InvoiceFileRef::new(id, name, f.md5_checksum))
                })
                .collect();

            if let Some(token) = response.next_page_token {
                let mut rest = self.list_page(query, Some(token)).await?;
                files.append(&mut rest);
            }
            Ok(files)
        })
    }
}

/// Drive search query for live PDFs directly under `folder_id`.
pub fn pdf_query(folder_id: &str) -> String {
    let escaped = folder_id.replace('\\', "\\\\").replace('\'', "\\'");
    format!("'{escaped}' in parents and mimeType='application/pdf' and trashed=false")
}

#[async_trait]
impl FolderSource for DriveFolder {
    async fn list_pdfs(&self) -> Result<Vec<InvoiceFileRef>, DriveError> {
        let query = self.query();
        let files = self.list_page(&query, None).await?;
        info!(count = files.len(), "Folder listing complete");
        Ok(files)
    }

    async fn read_text(&self, file: &InvoiceFileRef) -> Result<String, DriveError> {
        info!(file_id = %file.id, "Downloading file");
        let (response, _) = self
            .hub
            .files()
            .get(&file.id)
            .param("alt", "media")
            .add_scope(Scope::Readonly)
            .doit()
            .await?;

        let bytes = response
            .into_body()
            .collect()
            .await
            .map_err(|e| DriveError::Body(e.to_string()))?
            .to_bytes();

        info!(bytes = bytes.len(), "Downloaded file");
        let content = pdf_extract::extract_text_from_pdf(&bytes);
        if let PdfContent::Error(ref e) = content {
            warn!(error = %e, "PDF could not be read");
        }
        let text = content.into_text();
        info!(chars = text.chars().count(), "Extracted text from file");
        Ok(text)
    }
}
