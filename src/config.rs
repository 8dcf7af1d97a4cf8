use crate::error::ConfigError;
use serde::Deserialize;
use std::{env, fs, path::Path, time::Duration};

/// Runtime configuration. The TOML file is optional; environment variables
/// win over anything it sets.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub sheet_id: String,
    pub folder_id: String,
    pub service_account_path: String,
    pub processed_log_path: String,
    pub poll_interval_secs: u64,
    pub max_read_attempts: u32,
    pub max_prompt_chars: usize,
    pub llm: LlmSection,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sheet_id: String::new(),
            folder_id: String::new(),
            service_account_path: "service_account.json".to_string(),
            processed_log_path: "processed_invoices.txt".to_string(),
            poll_interval_secs: 60,
            max_read_attempts: 5,
            max_prompt_chars: 8000,
            llm: LlmSection::default(),
        }
    }
}

/// Which model API the field extractor talks to.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LlmBackend {
    Gemini,
    OpenAi,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    pub backend: LlmBackend,
    /// Empty means the backend's default model.
    pub model: String,
    /// Empty means the backend's public endpoint.
    pub base_url: String,
    /// Filled from `GOOGLE_API_KEY` (gemini) or `LLM_API_KEY` (openai).
    #[serde(skip)]
    pub api_key: String,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            backend: LlmBackend::Gemini,
            model: String::new(),
            base_url: String::new(),
            api_key: String::new(),
        }
    }
}

impl LlmSection {
    pub fn model(&self) -> &str {
        match (self.model.trim(), self.backend) {
            ("", LlmBackend::Gemini) => "gemini-2.5-flash",
            ("", LlmBackend::OpenAi) => "gpt-4o-mini",
            (model, _) => model,
        }
    }

    pub fn base_url(&self) -> &str {
        match (self.base_url.trim(), self.backend) {
            ("", LlmBackend::Gemini) => "https://generativelanguage.googleapis.com/v1beta",
            ("", LlmBackend::OpenAi) => "https://api.openai.com/v1",
            (url, _) => url.trim_end_matches('/'),
        }
    }
}

impl Config {
    /// Load the TOML file if it exists, then apply `.env` and the process
    /// environment on top.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        let mut cfg = match fs::read_to_string(path.as_ref()) {
            Ok(content) => Self::from_toml(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(e) => return Err(e.into()),
        };
        cfg.apply_env(|name| env::var(name).ok());
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("SHEET_ID") {
            self.sheet_id = v;
        }
        if let Some(v) = lookup("FOLDER_ID") {
            self.folder_id = v;
        }
        let key_var = match self.llm.backend {
            LlmBackend::Gemini => "GOOGLE_API_KEY",
            LlmBackend::OpenAi => "LLM_API_KEY",
        };
        if let Some(v) = lookup(key_var) {
            self.llm.api_key = v;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sheet_id.trim().is_empty() {
            return Err(ConfigError::Missing("SHEET_ID"));
        }
        if self.folder_id.trim().is_empty() {
            return Err(ConfigError::Missing("FOLDER_ID"));
        }
        if self.llm.api_key.trim().is_empty() {
            return Err(ConfigError::Missing(match self.llm.backend {
                LlmBackend::Gemini => "GOOGLE_API_KEY",
                LlmBackend::OpenAi => "LLM_API_KEY",
            }));
        }
        if self.poll_interval_secs == 0 {
            return Err(ConfigError::Invalid {
                name: "poll_interval_secs",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.max_prompt_chars == 0 {
            return Err(ConfigError::Invalid {
                name: "max_prompt_chars",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}
