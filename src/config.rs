use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub environment: String,
    pub version: String,
    /// Base URL of the web client; activation links point here.
    pub frontend_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_open_conns: u32,
    pub max_idle_time: Duration,
    /// Deadline applied to every single store or cache call.
    pub query_timeout: Duration,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BasicAuthConfig {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    pub enabled: bool,
    pub addr: String,
    pub password: Option<String>,
    pub db: i64,
}

impl CacheConfig {
    pub fn redis_url(&self) -> String {
        match &self.password {
            Some(pw) => format!("redis://:{}@{}/{}", pw, self.addr, self.db),
            None => format!("redis://{}/{}", self.addr, self.db),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MailConfig {
    pub from_email: String,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_username: String,
    pub smtp_password: String,
    pub invitation_ttl: Duration,
    pub sandbox: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub jwt: JwtConfig,
    pub basic: BasicAuthConfig,
    pub cache: CacheConfig,
    pub mail: MailConfig,
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.into())
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn env_flag(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .and_then(|v| parse_flag(&v))
        .unwrap_or(default)
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let environment = env_string("ENVIRONMENT", "development");

        let server = ServerConfig {
            host: env_string("APP_HOST", "0.0.0.0"),
            port: env_or("APP_PORT", 8080),
            version: env_string("VERSION", env!("CARGO_PKG_VERSION")),
            frontend_url: env_string("FRONTEND_URL", "http://localhost:5173"),
            environment,
        };

        let database = DatabaseConfig {
            url: std::env::var("DATABASE_URL")?,
            max_open_conns: env_or("DB_MAX_OPEN_CONNS", 30),
            max_idle_time: Duration::from_secs(env_or("DB_MAX_IDLE_TIME_SECS", 15 * 60)),
            query_timeout: Duration::from_secs(env_or("DB_QUERY_TIMEOUT_SECS", 5)),
        };

        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET")?,
            issuer: env_string("JWT_ISSUER", "social"),
            audience: env_string("JWT_AUDIENCE", "social"),
            ttl_minutes: env_or("JWT_TTL_MINUTES", 60 * 24 * 3),
        };

        let basic = BasicAuthConfig {
            username: env_string("AUTH_BASIC_USER", "admin"),
            password: std::env::var("AUTH_BASIC_PASSWORD")?,
        };

        let cache = CacheConfig {
            enabled: env_flag("CACHE_ENABLED", false),
            addr: env_string("REDIS_ADDR", "localhost:6379"),
            password: std::env::var("REDIS_PASSWORD").ok().filter(|p| !p.is_empty()),
            db: env_or("REDIS_DB", 0),
        };

        let mail = MailConfig {
            from_email: env_string("MAIL_FROM_EMAIL", "no-reply@social.local"),
            smtp_host: env_string("SMTP_HOST", "localhost"),
            smtp_port: env_or("SMTP_PORT", 587),
            smtp_username: env_string("SMTP_USERNAME", ""),
            smtp_password: env_string("SMTP_PASSWORD", ""),
            invitation_ttl: Duration::from_secs(
                env_or::<u64>("MAIL_INVITATION_EXP_HOURS", 72) * 60 * 60,
            ),
            sandbox: env_flag("MAIL_SANDBOX", server.environment != "production"),
        };

        Ok(Self {
            server,
            database,
            jwt,
            basic,
            cache,
            mail,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_flag_accepts_common_spellings() {
        assert_eq!(parse_flag("true"), Some(true));
        assert_eq!(parse_flag(" ON "), Some(true));
        assert_eq!(parse_flag("0"), Some(false));
        assert_eq!(parse_flag("No"), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }

    #[test]
    fn redis_url_includes_password_when_set() {
        let mut cache = CacheConfig {
            enabled: true,
            addr: "cache:6379".into(),
            password: None,
            db: 2,
        };
        assert_eq!(cache.redis_url(), "redis://cache:6379/2");

        cache.password = Some("s3cret".into());
        assert_eq!(cache.redis_url(), "redis://:s3cret@cache:6379/2");
    }
}
