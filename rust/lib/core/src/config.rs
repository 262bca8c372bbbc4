use std::path::PathBuf;

/// Process-wide configuration shared by the server binary and the site layer.
///
/// Parsed from command-line flags, then used to resolve where site data
/// lives on disk.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Root data directory. Site roots default to `{data_dir}/sites/{name}`.
    pub data_dir: Option<PathBuf>,

    /// Path to the redb file holding runtime site configuration.
    /// Defaults to `{data_dir}/site-config.redb`.
    pub config_db: Option<PathBuf>,

    /// Listen address for the HTTP server.
    pub listen: String,

    /// Allow at most one registered site.
    pub alone: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            config_db: None,
            listen: "0.0.0.0:8080".to_string(),
            alone: false,
        }
    }
}

impl ServiceConfig {
    /// Parse configuration from command-line arguments.
    ///
    /// Supported flags:
    /// - `--data-dir=PATH`
    /// - `--config-db=PATH`
    /// - `--listen=ADDR`
    /// - `--alone`
    pub fn from_args(args: &[String]) -> Self {
        let mut config = ServiceConfig::default();

        for arg in args {
            if let Some(val) = arg.strip_prefix("--data-dir=") {
                config.data_dir = Some(PathBuf::from(val));
            } else if let Some(val) = arg.strip_prefix("--config-db=") {
                config.config_db = Some(PathBuf::from(val));
            } else if let Some(val) = arg.strip_prefix("--listen=") {
                config.listen = val.to_string();
            } else if arg == "--alone" {
                config.alone = true;
            }
        }

        config
    }

    /// Resolve the data directory, falling back to the working directory.
    pub fn resolve_data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(|| PathBuf::from("."))
    }

    /// Resolve the runtime config store path.
    pub fn resolve_config_db(&self) -> PathBuf {
        self.config_db
            .clone()
            .unwrap_or_else(|| self.resolve_data_dir().join("site-config.redb"))
    }

    /// Resolve the default root directory of a site.
    pub fn resolve_site_root(&self, site: &str) -> PathBuf {
        self.resolve_data_dir().join("sites").join(site)
    }
}
