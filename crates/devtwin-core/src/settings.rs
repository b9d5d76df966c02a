//! Provider credentials and workspace settings, read once from the environment

use crate::error::{Error, Result};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Provider {
    Google,
    OpenAi,
    Anthropic,
    OpenRouter,
}

impl Provider {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Google => "google",
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::OpenRouter => "openrouter",
        }
    }

    /// Name of the environment variable holding this provider's API key.
    pub fn api_key_var(self) -> &'static str {
        match self {
            Self::Google => "GOOGLE_API_KEY",
            Self::OpenAi => "OPENAI_API_KEY",
            Self::Anthropic => "ANTHROPIC_API_KEY",
            Self::OpenRouter => "OPENROUTER_API_KEY",
        }
    }
}

impl FromStr for Provider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "google" => Ok(Self::Google),
            "openai" => Ok(Self::OpenAi),
            "anthropic" => Ok(Self::Anthropic),
            "openrouter" => Ok(Self::OpenRouter),
            other => Err(Error::Settings(format!(
                "PROVIDER must be one of: google, openai, anthropic, openrouter (got '{other}')"
            ))),
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read-only after init. Missing required variables are fatal at startup.
#[derive(Clone, Debug)]
pub struct Settings {
    pub provider: Provider,
    pub api_key: String,
    pub default_model: String,
    pub base_url: Option<String>,
    /// Base directory for cloned repos and run artifacts.
    pub workdir: PathBuf,
    pub github_token: Option<String>,
    pub repo_url: Option<String>,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        let provider: Provider = std::env::var("PROVIDER")
            .unwrap_or_else(|_| "anthropic".to_string())
            .parse()?;

        let api_key = std::env::var(provider.api_key_var()).map_err(|_| {
            Error::Settings(format!(
                "{} is required when PROVIDER={}",
                provider.api_key_var(),
                provider
            ))
        })?;

        let default_model = std::env::var("DEFAULT_MODEL").unwrap_or_else(|_| {
            match provider {
                Provider::Google => "gemini-2.0-flash",
                Provider::OpenAi => "gpt-4o",
                Provider::Anthropic => "claude-sonnet-4-20250514",
                Provider::OpenRouter => "anthropic/claude-sonnet-4",
            }
            .to_string()
        });

        Ok(Self {
            provider,
            api_key,
            default_model,
            base_url: std::env::var("BASE_URL").ok().filter(|s| !s.is_empty()),
            workdir: std::env::var("WORKDIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(".devtwin_work")),
            github_token: std::env::var("GITHUB_TOKEN").ok().filter(|s| !s.is_empty()),
            repo_url: std::env::var("REPO_URL").ok().filter(|s| !s.is_empty()),
        })
    }
}
