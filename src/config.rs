//! Configuration for tradebill

use anyhow::{Context, Result};
use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Server and client configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub delivery: DeliveryConfig,
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub tokens: Vec<TokenConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to SQLite database file
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    /// Public location sent invoice PDFs are served from
    #[serde(default = "default_pdf_base_url")]
    pub pdf_base_url: String,
}

/// Where the `invoices` commands find the server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_server_url")]
    pub server_url: String,

    /// API token in plain text (the server only keeps its hash)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenConfig {
    /// Human-readable name for the token
    pub name: String,
    /// The hashed API token (argon2 hash, or plain text for backwards compat)
    pub token_hash: String,
}

fn default_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3030
}

fn default_db_path() -> PathBuf {
    PathBuf::from("tradebill.sqlite")
}

fn default_pdf_base_url() -> String {
    "http://localhost:3030/files".to_string()
}

fn default_server_url() -> String {
    "http://localhost:3030".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            pdf_base_url: default_pdf_base_url(),
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            token: None,
        }
    }
}

impl Config {
    /// Default config path
    pub fn default_path() -> Result<PathBuf> {
        if let Ok(env_path) = std::env::var("TRADEBILL_CONFIG") {
            return Ok(PathBuf::from(env_path));
        }

        let local = PathBuf::from("config.toml");
        if local.exists() {
            return Ok(local);
        }

        // Docker default
        let data_config = PathBuf::from("/data/config.toml");
        if data_config.exists() {
            return Ok(data_config);
        }

        let config_dir = dirs::config_dir()
            .context("Could not determine config directory")?
            .join("tradebill");

        Ok(config_dir.join("config.toml"))
    }

    /// Load config from default path
    pub fn load() -> Result<Self> {
        let path = Self::default_path()?;
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).context("Failed to read config file")?;
        toml::from_str(&content).context("Failed to parse config file")
    }

    /// Save config to specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        let with_comments = format!(
            "# tradebill configuration\n\n\
             {}\n\n\
             # Add tokens with: tradebill token --name <device-name>\n",
            content
        );

        std::fs::write(path, with_comments).context("Failed to write config file")?;

        Ok(())
    }

    /// Check if a token is valid (supports both hashed and legacy plain tokens)
    pub fn validate_token(&self, token: &str) -> bool {
        let argon2 = Argon2::default();

        self.tokens.iter().any(|t| match PasswordHash::new(&t.token_hash) {
            Ok(parsed_hash) => argon2
                .verify_password(token.as_bytes(), &parsed_hash)
                .is_ok(),
            // Plain text comparison (legacy configs)
            Err(_) => t.token_hash == token,
        })
    }
}

/// Hash a token using argon2
pub fn hash_token(token: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(token.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash token: {}", e))?;
    Ok(hash.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_sections_fall_back_to_defaults() {
        let cfg: Config = toml::from_str("[server]\nport = 8080\n").unwrap();
        assert_eq!(cfg.server.port, 8080);
        assert_eq!(cfg.server.bind, "0.0.0.0");
        assert_eq!(cfg.database.path, PathBuf::from("tradebill.sqlite"));
        assert_eq!(cfg.client.server_url, "http://localhost:3030");
        assert!(cfg.tokens.is_empty());
    }

    #[test]
    fn hashed_and_plain_tokens_validate() {
        let hash = hash_token("tbk_secret").unwrap();
        let cfg = Config {
            tokens: vec![
                TokenConfig {
                    name: "phone".to_string(),
                    token_hash: hash,
                },
                TokenConfig {
                    name: "legacy".to_string(),
                    token_hash: "plain-token".to_string(),
                },
            ],
            ..Config::default()
        };

        assert!(cfg.validate_token("tbk_secret"));
        assert!(cfg.validate_token("plain-token"));
        assert!(!cfg.validate_token("tbk_other"));
    }

    #[test]
    fn save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut cfg = Config::default();
        cfg.delivery.pdf_base_url = "https://files.example.com".to_string();
        cfg.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.delivery.pdf_base_url, "https://files.example.com");
        assert_eq!(loaded.server.port, 3030);
    }
}
