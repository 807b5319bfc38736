use anyhow::{Context, Result};
use clap::Parser;
use std::env;

const DEFAULT_MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub storage_dir: String,
    /// Public base URL used in emailed links, without a trailing slash.
    pub base_url: String,
    pub max_upload_bytes: usize,
    pub smtp_host: String,
    pub smtp_port: u16,
    /// SMTP credentials come from the environment only, never the CLI.
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    pub mail_from: String,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Email-verified single-use file transfer service")]
pub struct Args {
    /// Host to bind to (overrides FILEGATE_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides FILEGATE_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory where uploaded files are stored (overrides FILEGATE_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Public base URL used in emailed links (overrides FILEGATE_BASE_URL)
    #[arg(long)]
    pub base_url: Option<String>,

    /// SMTP relay host (overrides FILEGATE_SMTP_HOST)
    #[arg(long)]
    pub smtp_host: Option<String>,

    /// SMTP relay port (overrides FILEGATE_SMTP_PORT)
    #[arg(long)]
    pub smtp_port: Option<u16>,

    /// From address for outbound mail (overrides FILEGATE_MAIL_FROM)
    #[arg(long)]
    pub mail_from: Option<String>,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig.
    pub fn from_env_and_args() -> Result<Self> {
        // Parse CLI once
        let args = Args::parse();

        // --- Environment fallback ---
        let env_host = env::var("FILEGATE_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = match env::var("FILEGATE_PORT") {
            Ok(value) => value
                .parse::<u16>()
                .with_context(|| format!("parsing FILEGATE_PORT value `{}`", value))?,
            Err(env::VarError::NotPresent) => 3000,
            Err(err) => return Err(err).context("reading FILEGATE_PORT"),
        };
        let env_storage =
            env::var("FILEGATE_STORAGE_DIR").unwrap_or_else(|_| "./data/uploads".into());
        let port = args.port.unwrap_or(env_port);
        let env_base_url =
            env::var("FILEGATE_BASE_URL").unwrap_or_else(|_| format!("http://localhost:{}", port));
        let max_upload_bytes = match env::var("FILEGATE_MAX_UPLOAD_BYTES") {
            Ok(value) => value
                .parse::<usize>()
                .with_context(|| format!("parsing FILEGATE_MAX_UPLOAD_BYTES value `{}`", value))?,
            Err(env::VarError::NotPresent) => DEFAULT_MAX_UPLOAD_BYTES,
            Err(err) => return Err(err).context("reading FILEGATE_MAX_UPLOAD_BYTES"),
        };
        let env_smtp_host = env::var("FILEGATE_SMTP_HOST").unwrap_or_else(|_| "localhost".into());
        let env_smtp_port = match env::var("FILEGATE_SMTP_PORT") {
            Ok(value) => value
                .parse::<u16>()
                .with_context(|| format!("parsing FILEGATE_SMTP_PORT value `{}`", value))?,
            Err(env::VarError::NotPresent) => 465,
            Err(err) => return Err(err).context("reading FILEGATE_SMTP_PORT"),
        };
        let smtp_username = env::var("FILEGATE_SMTP_USERNAME").ok().filter(|v| !v.is_empty());
        let smtp_password = env::var("FILEGATE_SMTP_PASSWORD").ok().filter(|v| !v.is_empty());
        let env_mail_from = env::var("FILEGATE_MAIL_FROM")
            .unwrap_or_else(|_| "Filegate <no-reply@localhost>".into());

        // --- Merge ---
        let cfg = Self {
            host: args.host.unwrap_or(env_host),
            port,
            storage_dir: args.storage_dir.unwrap_or(env_storage),
            base_url: args
                .base_url
                .unwrap_or(env_base_url)
                .trim_end_matches('/')
                .to_string(),
            max_upload_bytes,
            smtp_host: args.smtp_host.unwrap_or(env_smtp_host),
            smtp_port: args.smtp_port.unwrap_or(env_smtp_port),
            smtp_username,
            smtp_password,
            mail_from: args.mail_from.unwrap_or(env_mail_from),
        };

        Ok(cfg)
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Both halves or nothing; a lone username is ignored.
    pub fn smtp_credentials(&self) -> Option<(String, String)> {
        match (&self.smtp_username, &self.smtp_password) {
            (Some(username), Some(password)) => Some((username.clone(), password.clone())),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn sample() -> AppConfig {
        AppConfig {
            host: "127.0.0.1".into(),
            port: 3000,
            storage_dir: "./data/uploads".into(),
            base_url: "http://localhost:3000".into(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            smtp_host: "localhost".into(),
            smtp_port: 465,
            smtp_username: None,
            smtp_password: None,
            mail_from: "Filegate <no-reply@localhost>".into(),
        }
    }

    #[test]
    fn args_are_well_formed() {
        Args::command().debug_assert();
    }

    #[test]
    fn addr_joins_host_and_port() {
        assert_eq!(sample().addr(), "127.0.0.1:3000");
    }

    #[test]
    fn smtp_credentials_require_both_parts() {
        let mut cfg = sample();
        assert!(cfg.smtp_credentials().is_none());
        cfg.smtp_username = Some("user".into());
        assert!(cfg.smtp_credentials().is_none());
        cfg.smtp_password = Some("pass".into());
        assert_eq!(cfg.smtp_credentials(), Some(("user".into(), "pass".into())));
    }
}
