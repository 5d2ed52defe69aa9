//! Server configuration module
//!
//! Handles loading and parsing of server configuration from files and environment variables.

use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Path to the configuration file
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Server name displayed to players
    #[serde(default = "default_server_name")]
    pub server_name: String,

    /// WebSocket gateway port for game clients
    #[serde(default = "default_gateway_port")]
    pub gateway_port: u16,

    /// Status API port
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Path to data files (world, items, factions, shops)
    #[serde(default = "default_data_path")]
    pub data_path: PathBuf,

    /// Maximum number of online characters
    #[serde(default = "default_max_players")]
    pub max_players: u32,

    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Gameplay tuning
    #[serde(default)]
    pub game: GameConfig,

    /// Named maintenance timers
    #[serde(default = "default_timers")]
    pub timers: Vec<TimerConfig>,

    /// Development mode flag (in-memory storage, name-derived identities)
    #[serde(default)]
    pub dev_mode: bool,

    /// Enable debug logging
    #[serde(default)]
    pub debug: bool,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database host
    #[serde(default = "default_db_host")]
    pub host: String,

    /// Database port
    #[serde(default = "default_db_port")]
    pub port: u16,

    /// Database name
    #[serde(default = "default_db_name")]
    pub database: String,

    /// Database username
    #[serde(default = "default_db_user")]
    pub username: String,

    /// Database password
    #[serde(default)]
    pub password: String,

    /// Maximum connection pool size
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
}

/// Gameplay tuning values
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameConfig {
    /// Map new characters spawn into
    #[serde(default = "default_starting_map")]
    pub starting_map: String,

    /// Movement cooldown window in milliseconds
    #[serde(default = "default_move_cooldown")]
    pub move_cooldown_ms: u64,

    /// Equip/unequip cooldown window in milliseconds
    #[serde(default = "default_equip_cooldown")]
    pub equip_cooldown_ms: u64,

    /// Inventory capacity for new characters
    #[serde(default = "default_capacity")]
    pub starting_capacity: u32,
}

/// A named maintenance timer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimerConfig {
    /// Timer name; the game maps known names to maintenance actions
    pub name: String,

    /// Firing interval in seconds
    pub interval_secs: u64,

    /// Whether the timer runs at all
    #[serde(default = "default_true")]
    pub enabled: bool,
}

// Default value functions
fn default_server_name() -> String {
    "Duskmere".to_string()
}

fn default_gateway_port() -> u16 {
    4000
}

fn default_api_port() -> u16 {
    4080
}

fn default_data_path() -> PathBuf {
    PathBuf::from("./data")
}

fn default_max_players() -> u32 {
    2000
}

fn default_true() -> bool {
    true
}

fn default_db_host() -> String {
    "localhost".to_string()
}

fn default_db_port() -> u16 {
    5432
}

fn default_db_name() -> String {
    "duskmere".to_string()
}

fn default_db_user() -> String {
    "duskmere".to_string()
}

fn default_pool_size() -> u32 {
    10
}

fn default_starting_map() -> String {
    "city".to_string()
}

fn default_move_cooldown() -> u64 {
    500
}

fn default_equip_cooldown() -> u64 {
    800
}

fn default_capacity() -> u32 {
    20
}

fn default_timers() -> Vec<TimerConfig> {
    vec![
        TimerConfig {
            name: "autosave".to_string(),
            interval_secs: 300,
            enabled: true,
        },
        TimerConfig {
            name: "new-day".to_string(),
            interval_secs: 1200,
            enabled: true,
        },
    ]
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: default_db_host(),
            port: default_db_port(),
            database: default_db_name(),
            username: default_db_user(),
            password: String::new(),
            pool_size: default_pool_size(),
        }
    }
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            starting_map: default_starting_map(),
            move_cooldown_ms: default_move_cooldown(),
            equip_cooldown_ms: default_equip_cooldown(),
            starting_capacity: default_capacity(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            config_path: PathBuf::from("config/server.toml"),
            server_name: default_server_name(),
            gateway_port: default_gateway_port(),
            api_port: default_api_port(),
            data_path: default_data_path(),
            max_players: default_max_players(),
            database: DatabaseConfig::default(),
            game: GameConfig::default(),
            timers: default_timers(),
            dev_mode: false,
            debug: false,
        }
    }
}

impl ServerConfig {
    /// Load configuration from file and environment variables
    pub async fn load() -> Result<Self> {
        // Determine config path from environment or use default
        let config_path = env::var("DUSKMERE_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config/server.toml"));

        // Try to load from file
        let mut config = if config_path.exists() {
            let content = tokio::fs::read_to_string(&config_path)
                .await
                .with_context(|| {
                    format!("Failed to read config file: {}", config_path.display())
                })?;

            toml::from_str(&content).with_context(|| {
                format!("Failed to parse config file: {}", config_path.display())
            })?
        } else {
            tracing::warn!(
                "Config file not found at {}, using defaults",
                config_path.display()
            );
            Self::default()
        };

        config.config_path = config_path;

        // Override with environment variables
        config.apply_env_overrides();

        // Validate configuration
        config.validate()?;

        Ok(config)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = env::var("DUSKMERE_SERVER_NAME") {
            self.server_name = val;
        }
        if let Ok(val) = env::var("DUSKMERE_GATEWAY_PORT") {
            if let Ok(port) = val.parse() {
                self.gateway_port = port;
            }
        }
        if let Ok(val) = env::var("DUSKMERE_API_PORT") {
            if let Ok(port) = val.parse() {
                self.api_port = port;
            }
        }
        if let Ok(val) = env::var("DUSKMERE_DATA_PATH") {
            self.data_path = PathBuf::from(val);
        }
        if let Ok(val) = env::var("DUSKMERE_MAX_PLAYERS") {
            if let Ok(max) = val.parse() {
                self.max_players = max;
            }
        }
        if let Ok(val) = env::var("DUSKMERE_DEV_MODE") {
            self.dev_mode = val.to_lowercase() == "true" || val == "1";
        }
        if let Ok(val) = env::var("DUSKMERE_DEBUG") {
            self.debug = val.to_lowercase() == "true" || val == "1";
        }

        // Database overrides
        if let Ok(val) = env::var("DUSKMERE_DATABASE_HOST") {
            self.database.host = val;
        }
        if let Ok(val) = env::var("DUSKMERE_DATABASE_PORT") {
            if let Ok(port) = val.parse() {
                self.database.port = port;
            }
        }
        if let Ok(val) = env::var("DUSKMERE_DATABASE_NAME") {
            self.database.database = val;
        }
        if let Ok(val) = env::var("DUSKMERE_DATABASE_USER") {
            self.database.username = val;
        }
        if let Ok(val) = env::var("DUSKMERE_DATABASE_PASSWORD") {
            self.database.password = val;
        }
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        // Ports must be unique
        if self.gateway_port == self.api_port {
            anyhow::bail!("Gateway port and API port must be different");
        }

        // Max players must be reasonable
        if self.max_players == 0 || self.max_players > 10000 {
            anyhow::bail!("Max players must be between 1 and 10000");
        }

        // Enabled timers need a real interval
        for timer in &self.timers {
            if timer.enabled && timer.interval_secs == 0 {
                anyhow::bail!("Timer '{}' is enabled with a zero interval", timer.name);
            }
        }

        // New characters must fit their map
        if self.game.starting_map.is_empty() {
            anyhow::bail!("Starting map must not be empty");
        }

        Ok(())
    }

    /// Get the database connection URL
    pub fn database_url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.database.username,
            self.database.password,
            self.database.host,
            self.database.port,
            self.database.database
        )
    }
}
