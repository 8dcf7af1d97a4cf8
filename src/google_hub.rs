use crate::error::PipelineError;
use google_drive3::DriveHub;
use google_sheets4::Sheets;
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use std::path::Path;
use tracing::info;

pub type Connector = HttpsConnector<HttpConnector>;

/// Drive and Sheets hubs sharing one service-account authenticator.
pub struct GoogleHubs {
    pub drive: DriveHub<Connector>,
    pub sheets: Sheets<Connector>,
}

fn https_connector() -> Connector {
    hyper_rustls::HttpsConnectorBuilder::new()
        .with_webpki_roots()
        .https_or_http()
        .enable_http1()
        .build()
}

pub async fn create_hubs(service_account_path: impl AsRef<Path>) -> Result<GoogleHubs, PipelineError> {
    let path = service_account_path.as_ref();
    let key = yup_oauth2::read_service_account_key(path)
        .await
        .map_err(|e| PipelineError::Auth(format!("cannot read {}: {e}", path.display())))?;

    info!(client_email = %key.client_email, "Using service account");

    let auth = yup_oauth2::ServiceAccountAuthenticator::builder(key)
        .build()
        .await
        .map_err(|e| PipelineError::Auth(e.to_string()))?;

    Ok(GoogleHubs {
        drive: DriveHub::new(
            hyper_util::client::legacy::Client::builder(TokioExecutor::new())
                .build(https_connector()),
            auth.clone(),
        ),
        sheets: Sheets::new(
            hyper_util::client::legacy::Client::builder(TokioExecutor::new())
                .build(https_connector()),
            auth,
        ),
    })
}
