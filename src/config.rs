use std::{env, net::SocketAddr, str::FromStr};

use crate::error::AppError;

/// Where trip, request and notification documents are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentBackend {
    Sqlite,
    Memory,
}

impl FromStr for DocumentBackend {
    type Err = AppError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "sqlite" => Ok(Self::Sqlite),
            "memory" => Ok(Self::Memory),
            other => Err(AppError::Config(format!(
                "invalid DOCUMENT_BACKEND {other:?}, expected sqlite or memory"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub listen_addr: SocketAddr,
    pub cookie_secret: String,
    pub session_ttl_days: i64,
    pub document_backend: DocumentBackend,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let database_url =
            env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://ride2green.db".to_string());
        let listen_addr: SocketAddr = env::var("APP_LISTEN_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:3000".to_string())
            .parse()
            .map_err(|err| AppError::Config(format!("invalid APP_LISTEN_ADDR: {err}")))?;

        let cookie_secret = env::var("COOKIE_SECRET")
            .unwrap_or_else(|_| "change-me-ride2green-cookie-secret".to_string());

        let session_ttl_days = match env::var("SESSION_TTL_DAYS") {
            Ok(raw) => raw
                .parse::<i64>()
                .ok()
                .filter(|days| *days > 0)
                .ok_or_else(|| AppError::Config(format!("invalid SESSION_TTL_DAYS: {raw}")))?,
            Err(_) => 30,
        };

        let document_backend = env::var("DOCUMENT_BACKEND")
            .map(|raw| raw.parse())
            .unwrap_or(Ok(DocumentBackend::Sqlite))?;

        Ok(Self {
            database_url,
            listen_addr,
            cookie_secret,
            session_ttl_days,
            document_backend,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_document_backend() {
        assert_eq!(
            "Memory".parse::<DocumentBackend>().unwrap(),
            DocumentBackend::Memory
        );
        assert_eq!(
            " sqlite ".parse::<DocumentBackend>().unwrap(),
            DocumentBackend::Sqlite
        );
        assert!("redis".parse::<DocumentBackend>().is_err());
    }
}
