use std::env;

/// Database configuration.
///
/// Reads `REGIMEN_DATABASE_URL` (falling back to
/// `postgresql://localhost:5432/regimen`) and `REGIMEN_DB_MAX_CONNECTIONS`.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Full PostgreSQL connection URL.
    pub database_url: String,
    /// Upper bound on pooled connections. The worker daemon holds one per
    /// in-flight generation plus one per scheduler job.
    pub max_connections: u32,
}

impl DbConfig {
    /// The default connection URL used when no environment variable is set.
    pub const DEFAULT_URL: &str = "postgresql://localhost:5432/regimen";

    /// Default pool size.
    pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;

    /// Build a config from the environment.
    pub fn from_env() -> Self {
        let database_url = env::var("REGIMEN_DATABASE_URL")
            .unwrap_or_else(|_| Self::DEFAULT_URL.to_owned());
        let max_connections = env::var("REGIMEN_DB_MAX_CONNECTIONS")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|n| *n > 0)
            .unwrap_or(Self::DEFAULT_MAX_CONNECTIONS);
        Self {
            database_url,
            max_connections,
        }
    }

    /// Build a config from an explicit URL (CLI flags, config file, tests).
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            max_connections: Self::DEFAULT_MAX_CONNECTIONS,
        }
    }

    /// Override the pool size.
    pub fn with_max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections.max(1);
        self
    }

    /// Extract the database name from the URL, ignoring any query string.
    pub fn database_name(&self) -> Option<&str> {
        let without_query = self
            .database_url
            .split('?')
            .next()
            .unwrap_or(&self.database_url);
        without_query.rsplit('/').next().filter(|s| !s.is_empty())
    }

    /// Return a URL pointing at the `postgres` maintenance database on the
    /// same host. Used to issue `CREATE DATABASE` when the target DB does not
    /// yet exist. Query parameters (e.g. `sslmode`) are preserved.
    pub fn maintenance_url(&self) -> String {
        let (base, query) = match self.database_url.split_once('?') {
            Some((base, query)) => (base, Some(query)),
            None => (self.database_url.as_str(), None),
        };
        let mut url = match base.rfind('/') {
            Some(pos) => format!("{}/postgres", &base[..pos]),
            None => return self.database_url.clone(),
        };
        if let Some(query) = query {
            url.push('?');
            url.push_str(query);
        }
        url
    }

    /// The URL with any password replaced by `***`, for logs and messages.
    pub fn redacted_url(&self) -> String {
        let url = &self.database_url;
        let Some(scheme_end) = url.find("://") else {
            return url.clone();
        };
        let rest = &url[scheme_end + 3..];
        let Some(at) = rest.find('@') else {
            return url.clone();
        };
        let userinfo = &rest[..at];
        match userinfo.split_once(':') {
            Some((user, _password)) => format!(
                "{}://{}:***@{}",
                &url[..scheme_end],
                user,
                &rest[at + 1..]
            ),
            None => url.clone(),
        }
    }
}

impl Default for DbConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_url() {
        let cfg = DbConfig::new(DbConfig::DEFAULT_URL);
        assert_eq!(cfg.database_url, "postgresql://localhost:5432/regimen");
        assert_eq!(cfg.max_connections, DbConfig::DEFAULT_MAX_CONNECTIONS);
    }

    #[test]
    fn database_name_extraction() {
        let cfg = DbConfig::new("postgresql://localhost:5432/mydb");
        assert_eq!(cfg.database_name(), Some("mydb"));
    }

    #[test]
    fn database_name_ignores_query() {
        let cfg = DbConfig::new("postgresql://localhost:5432/mydb?sslmode=require");
        assert_eq!(cfg.database_name(), Some("mydb"));
    }

    #[test]
    fn maintenance_url_replaces_db() {
        let cfg = DbConfig::new("postgresql://localhost:5432/regimen");
        assert_eq!(cfg.maintenance_url(), "postgresql://localhost:5432/postgres");
    }

    #[test]
    fn maintenance_url_keeps_query() {
        let cfg = DbConfig::new("postgresql://db:5432/regimen?sslmode=require");
        assert_eq!(
            cfg.maintenance_url(),
            "postgresql://db:5432/postgres?sslmode=require"
        );
    }

    #[test]
    fn redacts_password() {
        let cfg = DbConfig::new("postgresql://coach:s3cret@db:5432/regimen");
        assert_eq!(cfg.redacted_url(), "postgresql://coach:***@db:5432/regimen");

        let no_password = DbConfig::new("postgresql://coach@db:5432/regimen");
        assert_eq!(no_password.redacted_url(), no_password.database_url);
    }

    #[test]
    fn max_connections_floor() {
        let cfg = DbConfig::new(DbConfig::DEFAULT_URL).with_max_connections(0);
        assert_eq!(cfg.max_connections, 1);
    }
}
