// src/config.rs

use dotenvy::dotenv;
use std::env;

/// Cosine-similarity threshold above which a summary counts as copied
/// from the passage.
pub const PLAGIARISM_THRESHOLD: f32 = 0.85;

/// Cosine-similarity threshold for counting a key idea as covered.
pub const KEY_IDEA_THRESHOLD: f32 = 0.6;

/// Number of concurrent model calls (embeddings + judge) allowed at once.
pub const MODEL_WORKERS: usize = 3;

/// Grace period added on top of the test duration before a session expires.
pub const SESSION_GRACE_MINUTES: i64 = 5;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub jwt_expiration: u64,
    pub rust_log: String,
    /// Directory holding the static question bank JSON files.
    pub bank_dir: String,
    /// Generative judge API settings.
    pub judge_api_key: String,
    pub judge_api_base: String,
    /// Virtual super-admin credentials. The admin is never stored in the
    /// database; these are matched at login time.
    pub admin_email: Option<String>,
    pub admin_password: Option<String>,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");

        let jwt_secret = env::var("JWT_SECRET").expect("JWT_SECRET must be set");

        let jwt_expiration = env::var("JWT_EXPIRATION")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(86400);

        let rust_log = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        let bank_dir = env::var("BANK_DIR").unwrap_or_else(|_| "data/banks".to_string());

        let judge_api_key = env::var("JUDGE_API_KEY").unwrap_or_default();
        let judge_api_base = env::var("JUDGE_API_BASE")
            .unwrap_or_else(|_| "https://generativelanguage.googleapis.com/v1beta".to_string());

        let admin_email = env::var("ADMIN_EMAIL").ok();
        let admin_password = env::var("ADMIN_PASSWORD").ok();

        Self {
            database_url,
            jwt_secret,
            jwt_expiration,
            rust_log,
            bank_dir,
            judge_api_key,
            judge_api_base,
            admin_email,
            admin_password,
        }
    }
}
