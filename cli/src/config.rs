use clap::{Args, ValueEnum};
use url::Url;

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_GEMINI_URL: &str = "https://generativelanguage.googleapis.com/v1beta/";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),
    #[error("{var} is not a valid URL: {source}")]
    InvalidUrl {
        var: &'static str,
        #[source]
        source: url::ParseError,
    },
}

/// Environment-backed settings. `.env` is loaded before parsing, so every
/// value may come from the file, the real environment or a flag.
#[derive(Debug, Clone, Args)]
pub struct ConfigArgs {
    /// Supabase project URL
    #[arg(long, env = "SUPABASE_URL", global = true)]
    pub supabase_url: Option<String>,

    /// Supabase anonymous (public) API key
    #[arg(long, env = "SUPABASE_ANON_KEY", hide_env_values = true, global = true)]
    pub supabase_anon_key: Option<String>,

    /// Gemini API key; without it the assistant is disabled
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true, global = true)]
    pub gemini_api_key: Option<String>,

    /// Gemini model used by the assistant
    #[arg(long, env = "GEMINI_MODEL", default_value = DEFAULT_MODEL, global = true)]
    pub gemini_model: String,

    /// Gemini REST endpoint (override for proxies)
    #[arg(long, env = "GEMINI_BASE_URL", default_value = DEFAULT_GEMINI_URL, global = true, hide = true)]
    pub gemini_base_url: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub url: Url,
    pub anon_key: String,
}

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: Url,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub backend: BackendConfig,
    /// `None` when no Gemini key is configured.
    pub agent: Option<AgentConfig>,
}

impl ConfigArgs {
    pub fn resolve(&self) -> Result<Config, ConfigError> {
        let url = non_blank(self.supabase_url.as_deref()).ok_or(ConfigError::Missing("SUPABASE_URL"))?;
        let anon_key =
            non_blank(self.supabase_anon_key.as_deref()).ok_or(ConfigError::Missing("SUPABASE_ANON_KEY"))?;
        let backend = BackendConfig {
            url: base_url("SUPABASE_URL", url)?,
            anon_key: anon_key.to_string(),
        };

        let agent = match non_blank(self.gemini_api_key.as_deref()) {
            Some(api_key) => Some(AgentConfig {
                api_key: api_key.to_string(),
                model: self.gemini_model.trim().to_string(),
                base_url: base_url("GEMINI_BASE_URL", &self.gemini_base_url)?,
            }),
            None => None,
        };

        Ok(Config { backend, agent })
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Parse a base URL so that relative joins append to its path.
pub fn base_url(var: &'static str, raw: &str) -> Result<Url, ConfigError> {
    let mut url = Url::parse(raw.trim()).map_err(|source| ConfigError::InvalidUrl { var, source })?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}
