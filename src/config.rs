use crate::time_utils::SurveyTimezone;
use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose, Engine as _};

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub max_connections: u32,
    pub session_key: Vec<u8>,
    pub timezone: SurveyTimezone,
    pub bind_addr: String,
    pub bootstrap_admin: Option<(String, String)>,
    pub login_rate_limit: usize,
    pub secure_cookies: bool,
}

impl Config {
    /// Reads configuration from the process environment (call `dotenvy::dotenv()` first).
    pub fn from_env() -> Result<Self> {
        let database_url =
            std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://surveys.db".to_string());

        let max_connections = match std::env::var("DB_MAX_CONNECTIONS") {
            Ok(raw) => raw
                .parse::<u32>()
                .context("DB_MAX_CONNECTIONS must be a positive integer")?,
            Err(_) => 5,
        };

        let session_key_b64 = std::env::var("SESSION_KEY").context("SESSION_KEY missing")?;
        let session_key = general_purpose::STANDARD
            .decode(session_key_b64.trim())
            .context("SESSION_KEY must be base64")?;
        if session_key.len() < 32 {
            return Err(anyhow!("SESSION_KEY must decode to at least 32 bytes"));
        }

        let timezone = match std::env::var("SURVEY_TIMEZONE") {
            Ok(raw) => SurveyTimezone::parse(&raw)
                .ok_or_else(|| anyhow!("SURVEY_TIMEZONE is not a known timezone: {raw}"))?,
            Err(_) => SurveyTimezone::default(),
        };

        let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| {
            let port = std::env::var("PORT").unwrap_or_else(|_| "3000".to_string());
            format!("0.0.0.0:{}", port)
        });

        let bootstrap_admin = std::env::var("BOOTSTRAP_ADMIN_PASSWORD").ok().map(|password| {
            let username = std::env::var("BOOTSTRAP_ADMIN_USERNAME")
                .unwrap_or_else(|_| "admin".to_string());
            (username, password)
        });

        let login_rate_limit = std::env::var("LOGIN_RATE_LIMIT")
            .ok()
            .and_then(|raw| raw.parse::<usize>().ok())
            .unwrap_or(5);

        // Secure cookies only make sense behind HTTPS.
        let secure_cookies = std::env::var("PRODUCTION").is_ok()
            || std::env::var("COOKIE_SECURE").is_ok_and(|v| v == "1" || v.eq_ignore_ascii_case("true"));

        Ok(Self {
            database_url,
            max_connections,
            session_key,
            timezone,
            bind_addr,
            bootstrap_admin,
            login_rate_limit,
            secure_cookies,
        })
    }
}
