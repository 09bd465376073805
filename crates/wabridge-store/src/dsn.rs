use std::path::PathBuf;

use crate::error::{Result, StoreError};

/// A classified store location: a filesystem path for the embedded driver or
/// a connection string for the external one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dsn {
    Sqlite(PathBuf),
    Postgres(String),
}

impl Dsn {
    /// Classify a raw DSN string.
    ///
    /// `postgres://` / `postgresql://` select the external driver;
    /// `sqlite://` and `file:` prefixes (or a bare path) select the embedded
    /// one. DSNs demanding in-driver TLS are rejected up front rather than
    /// silently downgraded.
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(StoreError::InvalidDsn("empty DSN".into()));
        }

        if raw.starts_with("postgres://") || raw.starts_with("postgresql://") {
            if raw.contains("sslmode=require") || raw.contains("sslmode=verify") {
                return Err(StoreError::InvalidDsn(
                    "sslmode=require is not supported; terminate TLS at a local proxy \
                     and connect with sslmode=disable"
                        .into(),
                ));
            }
            return Ok(Dsn::Postgres(raw.to_string()));
        }

        let path = raw
            .strip_prefix("sqlite://")
            .or_else(|| raw.strip_prefix("file:"))
            .unwrap_or(raw);
        if path.is_empty() {
            return Err(StoreError::InvalidDsn(format!("no path in DSN {raw:?}")));
        }
        Ok(Dsn::Sqlite(PathBuf::from(path)))
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, Dsn::Postgres(_))
    }

    /// Human-readable location for status reporting. Postgres credentials are
    /// stripped down to the host part.
    pub fn display_host(&self) -> String {
        match self {
            Dsn::Sqlite(path) => path.display().to_string(),
            Dsn::Postgres(conn) => postgres_host(conn),
        }
    }
}

fn postgres_host(conn: &str) -> String {
    let rest = conn.splitn(2, "://").nth(1).unwrap_or(conn);
    let host_port = match rest.rsplit_once('@') {
        Some((_creds, tail)) => tail,
        None => rest,
    };
    host_port
        .split(['/', '?'])
        .next()
        .unwrap_or(host_port)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_postgres() {
        let dsn = Dsn::parse("postgres://user:pw@db.example.com:5432/wa").unwrap();
        assert!(dsn.is_remote());
        assert_eq!(dsn.display_host(), "db.example.com:5432");
    }

    #[test]
    fn classifies_sqlite_prefixes() {
        for raw in ["sqlite:///data/messages.db", "file:/data/messages.db", "/data/messages.db"] {
            let dsn = Dsn::parse(raw).unwrap();
            assert!(!dsn.is_remote(), "{raw}");
        }
    }

    #[test]
    fn rejects_tls_required() {
        let err = Dsn::parse("postgres://u@h/db?sslmode=require").unwrap_err();
        assert!(matches!(err, StoreError::InvalidDsn(_)));
    }

    #[test]
    fn rejects_empty() {
        assert!(Dsn::parse("  ").is_err());
    }
}
