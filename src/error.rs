// src/error.rs

use thiserror::Error;

/// Problems with the runtime configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Failures talking to the source folder.
#[derive(Error, Debug)]
pub enum DriveError {
    #[error("drive api error: {0}")]
    Api(#[from] google_drive3::Error),

    #[error("failed to read download body: {0}")]
    Body(String),
}

/// Failures invoking the language model.
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("model request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("model api error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("empty response from model")]
    EmptyResponse,
}

/// The model answered with something that is not a usable JSON object.
#[derive(Error, Debug, PartialEq)]
pub enum ResponseParseError {
    #[error("no JSON object found in model response")]
    NoObject,

    #[error("model response is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("model response JSON is not an object")]
    NotAnObject,
}

/// Failures writing to the spreadsheet.
#[derive(Error, Debug)]
pub enum SheetError {
    #[error("sheets api error: {0}")]
    Api(#[from] google_sheets4::Error),

    #[error("spreadsheet has no worksheets")]
    NoWorksheet,
}

/// Failures reading or appending the processed-key log.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("processed-key log I/O error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Anything that aborts a poll cycle or the startup sequence.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Drive(#[from] DriveError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("authentication setup failed: {0}")]
    Auth(String),
}
