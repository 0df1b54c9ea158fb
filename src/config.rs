//! Configuration for the census loader
//!
//! Tunable constants live here alongside the connection settings, which are
//! built once at startup and passed down to every component.

use derive_builder::Builder;
use sqlx::postgres::PgConnectOptions;
use std::time::Duration;

// ============================================================================
// Connection Configuration
// ============================================================================

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(45);

pub const DEFAULT_HOST: &str = "localhost";

pub const DEFAULT_PORT: u16 = 5432;

pub const DEFAULT_DATABASE: &str = "postgres";

pub const DEFAULT_USER: &str = "postgres";

pub const DEFAULT_PASSWORD: &str = "postgres";

// ============================================================================
// Load Configuration
// ============================================================================

/// Destination table used when none is given on the command line
pub const DEFAULT_TABLE_NAME: &str = "census_data";

/// Size of the pieces the raw file is cut into when streamed through COPY
///
/// 64KB keeps the number of CopyData messages low without holding much of
/// the file in memory at once.
pub const COPY_CHUNK_SIZE: usize = 64 * 1024; // 64 KB

/// Redraw the row progress bar at most this many times per second
pub const PROGRESS_REFRESH_HZ: u8 = 10;

/// Connection settings for the destination PostgreSQL database
#[derive(Debug, Clone, Builder)]
pub struct DatabaseConfig {
    #[builder(setter(into), default = "DEFAULT_HOST.to_string()")]
    pub host: String,
    #[builder(default = "DEFAULT_PORT")]
    pub port: u16,
    #[builder(setter(into), default = "DEFAULT_DATABASE.to_string()")]
    pub database: String,
    #[builder(setter(into), default = "DEFAULT_USER.to_string()")]
    pub user: String,
    #[builder(setter(into), default = "DEFAULT_PASSWORD.to_string()")]
    pub password: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            database: DEFAULT_DATABASE.to_string(),
            user: DEFAULT_USER.to_string(),
            password: DEFAULT_PASSWORD.to_string(),
        }
    }
}

impl DatabaseConfig {
    pub fn connect_options(&self) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .database(&self.database)
            .username(&self.user)
            .password(&self.password)
    }
}
