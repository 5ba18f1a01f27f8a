use anyhow::{anyhow, Context, Result};
use std::path::PathBuf;

use crate::feed::DEFAULT_PAGE_SIZE;

pub const ENV_DATA_DIR: &str = "JOBBOARD_DATA_DIR";
pub const ENV_PAGE_SIZE: &str = "JOBBOARD_PAGE_SIZE";
pub const ENV_REST_URL: &str = "JOBBOARD_REST_URL";
pub const ENV_REST_KEY: &str = "JOBBOARD_REST_KEY";
pub const ENV_REST_TIMEOUT: &str = "JOBBOARD_REST_TIMEOUT_SECS";

const DEFAULT_REST_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestConfig {
    pub url: String,
    pub api_key: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub data_dir: PathBuf,
    pub page_size: usize,
    /// When set, the job feed reads from this backend instead of SQLite.
    pub rest: Option<RestConfig>,
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::from_lookup(default_data_dir(), |key| std::env::var(key).ok())
    }

    pub fn from_lookup(
        default_dir: PathBuf,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let data_dir = lookup(ENV_DATA_DIR)
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or(default_dir);

        let page_size = match lookup(ENV_PAGE_SIZE) {
            Some(raw) => parse_page_size(&raw)?,
            None => DEFAULT_PAGE_SIZE,
        };

        let rest = match (lookup(ENV_REST_URL), lookup(ENV_REST_KEY)) {
            (Some(url), Some(api_key)) => {
                let timeout_secs = match lookup(ENV_REST_TIMEOUT) {
                    Some(raw) => raw
                        .trim()
                        .parse()
                        .with_context(|| format!("{} must be a number of seconds", ENV_REST_TIMEOUT))?,
                    None => DEFAULT_REST_TIMEOUT_SECS,
                };
                Some(RestConfig {
                    url,
                    api_key,
                    timeout_secs,
                })
            }
            (Some(_), None) => {
                return Err(anyhow!(
                    "{} is set but {} is missing",
                    ENV_REST_URL,
                    ENV_REST_KEY
                ));
            }
            _ => None,
        };

        Ok(Self {
            data_dir,
            page_size,
            rest,
        })
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("jobboard.db")
    }

    pub fn session_path(&self) -> PathBuf {
        self.data_dir.join("session.json")
    }

    pub fn resume_dir(&self) -> PathBuf {
        self.data_dir.join("resumes")
    }

    pub fn log_path(&self) -> PathBuf {
        self.data_dir.join("jobboard.log")
    }
}

pub fn parse_page_size(raw: &str) -> Result<usize> {
    let size: usize = raw
        .trim()
        .parse()
        .with_context(|| format!("Invalid page size '{}'", raw))?;
    if size == 0 {
        return Err(anyhow!("Page size must be at least 1"));
    }
    Ok(size)
}

fn default_data_dir() -> PathBuf {
    // Use XDG data directory or fallback
    if let Some(proj_dirs) = directories::ProjectDirs::from("", "", "jobboard") {
        proj_dirs.data_dir().to_path_buf()
    } else {
        PathBuf::from(".jobboard")
    }
}
