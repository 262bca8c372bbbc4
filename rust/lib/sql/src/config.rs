use std::collections::BTreeMap;

use serde::Deserialize;

/// Connection settings of one site database.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct DbConfig {
    /// Database name; for sqlite, the file path.
    #[serde(default)]
    pub name: String,
    /// Adapter name: `sqlite` (default), `sqlite3`, `memory`, `postgres`, `mysql`.
    #[serde(default)]
    pub adapter: String,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub port: u16,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub ssl: bool,
    /// Extra DSN query arguments.
    #[serde(default)]
    pub args: BTreeMap<String, String>,
}

impl DbConfig {
    pub fn sqlite(path: impl Into<String>) -> Self {
        Self {
            name: path.into(),
            adapter: "sqlite".into(),
            ..Default::default()
        }
    }

    pub fn adapter(&self) -> &str {
        if self.adapter.is_empty() { "sqlite" } else { &self.adapter }
    }

    pub fn is_sqlite(&self) -> bool {
        matches!(self.adapter(), "sqlite" | "sqlite3")
    }

    fn host_port(&self) -> String {
        if self.port == 0 {
            self.host.clone()
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    fn args_query(&self) -> String {
        self.args
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&")
    }

    /// Driver connection string for this adapter.
    pub fn dsn(&self) -> String {
        match self.adapter() {
            "postgres" => {
                let mut query = Vec::new();
                if !self.ssl {
                    query.push("sslmode=disable".to_string());
                }
                query.push("binary_parameters=yes".to_string());
                let extra = self.args_query();
                if !extra.is_empty() {
                    query.push(extra);
                }
                format!(
                    "postgres://{}:{}@{}/{}?{}",
                    self.user,
                    self.password,
                    self.host_port(),
                    self.name,
                    query.join("&")
                )
            }
            "mysql" => {
                let mut dsn = format!(
                    "{}:{}@tcp({})/{}?parseTime=true",
                    self.user,
                    self.password,
                    self.host_port(),
                    self.name
                );
                let extra = self.args_query();
                if !extra.is_empty() {
                    dsn.push('&');
                    dsn.push_str(&extra);
                }
                dsn
            }
            _ => self.name.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn postgres_dsn() {
        let c = DbConfig {
            name: "shop".into(),
            adapter: "postgres".into(),
            host: "db".into(),
            port: 5432,
            user: "u".into(),
            password: "p".into(),
            ..Default::default()
        };
        assert_eq!(
            c.dsn(),
            "postgres://u:p@db:5432/shop?sslmode=disable&binary_parameters=yes"
        );

        let ssl = DbConfig { ssl: true, port: 0, ..c };
        assert_eq!(ssl.dsn(), "postgres://u:p@db/shop?binary_parameters=yes");
    }

    #[test]
    fn mysql_and_sqlite_dsn() {
        let c = DbConfig {
            name: "shop".into(),
            adapter: "mysql".into(),
            host: "db".into(),
            port: 3306,
            user: "u".into(),
            password: "p".into(),
            ..Default::default()
        };
        assert_eq!(c.dsn(), "u:p@tcp(db:3306)/shop?parseTime=true");
        assert_eq!(DbConfig::sqlite("/x/system.db").dsn(), "/x/system.db");
    }

    #[test]
    fn parses_from_toml() {
        let c: DbConfig = toml::from_str("adapter = \"postgres\"\nname = \"n\"\n[args]\napplication_name = \"admin\"\n").unwrap();
        assert_eq!(c.adapter(), "postgres");
        assert!(c.dsn().ends_with("&application_name=admin"));
    }
}
