use clap::{Parser, Subcommand, ValueEnum};
use serde::Deserialize;
use std::path::PathBuf;

/// Environment variable that overrides `auth.jwt_secret`.
pub const JWT_SECRET_ENV: &str = "STUDYHALL_JWT_SECRET";

#[derive(Parser, Debug)]
#[command(name = "studyhall", about = "Student community backend")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Host to bind to
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Path to data directory
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Deployment environment (controls password-reset email delivery)
    #[arg(long, value_enum)]
    pub environment: Option<Environment>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Re-copy every author's current profile picture onto their posts
    BackfillPictures,
}

#[derive(Deserialize, ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Reset links are logged; SMTP delivery is attempted only when configured.
    #[default]
    Development,
    /// Reset links must be delivered over SMTP.
    Production,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub media: MediaConfig,
    pub auth: AuthConfig,
    pub email: EmailConfig,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Upper bound on request bodies; uploads are validated below this.
    pub max_body_bytes: usize,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct MediaConfig {
    pub path: Option<PathBuf>,
    /// Prefix of the URLs handed out for stored media.
    pub public_url: String,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct AuthConfig {
    pub jwt_secret: Option<String>,
    pub token_expiry_minutes: i64,
    pub bcrypt_cost: u32,
    pub reset_token_hours: i64,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct EmailConfig {
    pub environment: Environment,
    pub frontend_url: String,
    pub from_email: String,
    pub from_name: String,
    pub smtp: Option<SmtpConfig>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    pub username: String,
    pub password: String,
}

fn default_smtp_port() -> u16 {
    587
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            max_body_bytes: 25 * 1024 * 1024,
        }
    }
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            path: None,
            public_url: "/media".to_string(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            token_expiry_minutes: 30,
            bcrypt_cost: bcrypt::DEFAULT_COST,
            reset_token_hours: 24,
        }
    }
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            environment: Environment::Development,
            frontend_url: "http://localhost:3000".to_string(),
            from_email: "no-reply@studyhall.local".to_string(),
            from_name: "StudyHall".to_string(),
            smtp: None,
        }
    }
}

impl Config {
    pub fn load(cli: &Cli) -> anyhow::Result<Self> {
        let data_dir = Self::data_dir(cli);
        let config_path = cli
            .config
            .clone()
            .unwrap_or_else(|| data_dir.join("config.toml"));

        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            toml::from_str(&content)?
        } else {
            Config::default()
        };

        if let Ok(secret) = std::env::var(JWT_SECRET_ENV) {
            if !secret.is_empty() {
                config.auth.jwt_secret = Some(secret);
            }
        }

        // CLI overrides
        if let Some(ref host) = cli.host {
            config.server.host = host.clone();
        }
        if let Some(port) = cli.port {
            config.server.port = port;
        }
        if let Some(environment) = cli.environment {
            config.email.environment = environment;
        }

        // Resolve paths relative to data dir
        if config.database.path.is_none() {
            config.database.path = Some(data_dir.join("studyhall.db"));
        }
        if config.media.path.is_none() {
            config.media.path = Some(data_dir.join("media"));
        }

        Ok(config)
    }

    pub fn data_dir(cli: &Cli) -> PathBuf {
        cli.data_dir.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".studyhall")
        })
    }

    pub fn db_path(&self) -> PathBuf {
        self.database
            .path
            .clone()
            .unwrap_or_else(|| PathBuf::from("studyhall.db"))
    }

    pub fn media_path(&self) -> PathBuf {
        self.media
            .path
            .clone()
            .unwrap_or_else(|| PathBuf::from("media"))
    }

    /// Route the media directory is served under: the path of a relative
    /// `public_url`, or `/media` when media URLs point at another host.
    pub fn media_mount(&self) -> String {
        let url = self.media.public_url.trim_end_matches('/');
        if url.starts_with('/') && !url.starts_with("//") && url.len() > 1 {
            url.to_string()
        } else {
            "/media".to_string()
        }
    }
}
