use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Top-level configuration loaded from `config.yaml`.
///
/// Every section has defaults, so an absent file or an empty document
/// yields a usable (if unconfigured) gateway.  Connection credentials are
/// normally supplied through environment overrides, see
/// [`Config::apply_overrides`].
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// DataStage connection settings and client binaries.
    #[serde(default)]
    pub datastage: DataStageConfig,
    /// Result cache settings.
    #[serde(default)]
    pub cache: CacheConfig,
    /// Front-end and descriptor directory settings.
    #[serde(default)]
    pub gateway: GatewayConfig,
}

/// Connection settings passed to every `dsjob` invocation.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DataStageConfig {
    /// Services tier, e.g. `services.example.com:9443`.
    #[serde(default)]
    pub domain: Option<String>,
    /// Engine tier host name.
    #[serde(default)]
    pub server: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    /// Plain text or an env-var reference like `$DATASTAGE_PASSWORD`.
    #[serde(default)]
    pub password: Option<String>,
    /// Project used when an operation is called without `project`.
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default = "default_dsjob_bin")]
    pub dsjob_bin: String,
    #[serde(default = "default_dsexport_bin")]
    pub dsexport_bin: String,
    #[serde(default = "default_dssearch_bin")]
    pub dssearch_bin: String,
}

fn default_dsjob_bin() -> String {
    "dsjob".into()
}

fn default_dsexport_bin() -> String {
    "dsexport".into()
}

fn default_dssearch_bin() -> String {
    "dssearch".into()
}

impl Default for DataStageConfig {
    fn default() -> Self {
        Self {
            domain: None,
            server: None,
            user: None,
            password: None,
            project: None,
            dsjob_bin: default_dsjob_bin(),
            dsexport_bin: default_dsexport_bin(),
            dssearch_bin: default_dssearch_bin(),
        }
    }
}

impl DataStageConfig {
    /// Names of the connection settings that are still unset.
    pub fn missing_settings(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        for (name, value) in [
            ("domain", &self.domain),
            ("server", &self.server),
            ("user", &self.user),
            ("password", &self.password),
        ] {
            if value.as_deref().map_or(true, str::is_empty) {
                missing.push(name);
            }
        }
        missing
    }
}

/// Result cache settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CacheConfig {
    /// Master switch.  When `false` every operation runs uncached.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// SQLite database path.  Defaults to `<gateway_home>/cache.db`.
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Freshness window in seconds.  Default: 300.
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_ttl_secs() -> u64 {
    300
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: None,
            ttl_secs: default_ttl_secs(),
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    /// Effective database path.
    pub fn db_path(&self) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(|| crate::gateway_home().join("cache.db"))
    }
}

/// Front-end settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    /// Listen address for `dsgate serve`.
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Directory holding operation descriptors.
    #[serde(default = "default_tools_dir")]
    pub tools_dir: PathBuf,
    /// Directory holding prompt definitions.
    #[serde(default = "default_prompts_dir")]
    pub prompts_dir: PathBuf,
    /// Bearer token required on `/api` routes.  `None` disables auth.
    #[serde(default)]
    pub api_token: Option<String>,
}

fn default_bind() -> String {
    "127.0.0.1:8000".into()
}

fn default_tools_dir() -> PathBuf {
    PathBuf::from("tools")
}

fn default_prompts_dir() -> PathBuf {
    PathBuf::from("prompts")
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            tools_dir: default_tools_dir(),
            prompts_dir: default_prompts_dir(),
            api_token: None,
        }
    }
}

impl Config {
    /// Read and parse a YAML configuration file, then apply environment
    /// overrides and validate.
    ///
    /// A missing file is not an error: defaults are used so the gateway can
    /// be configured entirely from the environment.
    pub async fn load(path: &Path) -> anyhow::Result<Config> {
        Self::load_with(path, |key| std::env::var(key).ok()).await
    }

    /// [`load`](Self::load) with an explicit environment lookup.
    ///
    /// `$VAR` references are resolved for values read from the file only;
    /// environment overrides are applied afterwards and taken verbatim.
    pub async fn load_with<F>(path: &Path, env: F) -> anyhow::Result<Config>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match tokio::fs::read_to_string(path).await {
            Ok(contents) => Self::parse(&contents)
                .with_context(|| format!("failed to parse config file: {}", path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    path = %path.display(),
                    "config file not found, using defaults"
                );
                Config::default()
            }
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("failed to read config file: {}", path.display()));
            }
        };

        config.resolve_secret_refs(&env);
        config.apply_overrides(&env);
        config.validate()?;

        // Relative descriptor directories are resolved against the config
        // file's own directory so `--config` works from any cwd.
        if let Some(base) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            for dir in [&mut config.gateway.tools_dir, &mut config.gateway.prompts_dir] {
                if dir.is_relative() && base.join(&*dir).is_dir() {
                    *dir = base.join(&*dir);
                }
            }
        }

        tracing::debug!(
            tools_dir = %config.gateway.tools_dir.display(),
            cache_enabled = config.cache.enabled,
            ttl_secs = config.cache.ttl_secs,
            "configuration loaded"
        );

        Ok(config)
    }

    /// Parse a YAML document.  An empty document yields the defaults.
    pub fn parse(contents: &str) -> anyhow::Result<Config> {
        if contents.trim().is_empty() {
            return Ok(Config::default());
        }
        serde_yaml::from_str(contents).context("failed to parse config YAML")
    }

    /// Overlay values from the environment (or any lookup function).
    ///
    /// Recognised keys: `DATASTAGE_DOMAIN`, `DATASTAGE_SERVER`,
    /// `DATASTAGE_USER`, `DATASTAGE_PASSWORD`, `DATASTAGE_PROJECT`,
    /// `DSGATE_BIND`, `DSGATE_API_TOKEN`.  Empty values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        let ds = &mut self.datastage;
        for (key, slot) in [
            ("DATASTAGE_DOMAIN", &mut ds.domain),
            ("DATASTAGE_SERVER", &mut ds.server),
            ("DATASTAGE_USER", &mut ds.user),
            ("DATASTAGE_PASSWORD", &mut ds.password),
            ("DATASTAGE_PROJECT", &mut ds.project),
        ] {
            if let Some(v) = get(key) {
                *slot = Some(v);
            }
        }
        if let Some(v) = get("DSGATE_BIND") {
            self.gateway.bind = v;
        }
        if let Some(v) = get("DSGATE_API_TOKEN") {
            self.gateway.api_token = Some(v);
        }
    }

    /// Replace `$VAR` references in credential fields with their values.
    /// Unresolvable references are cleared so they surface as missing.
    pub fn resolve_secret_refs<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        for slot in [&mut self.datastage.password, &mut self.gateway.api_token] {
            let Some(var) = slot.as_deref().and_then(|v| v.strip_prefix('$')) else {
                continue;
            };
            let resolved = lookup(var).filter(|v| !v.is_empty());
            if resolved.is_none() {
                tracing::warn!(var, "config references an unset environment variable");
            }
            *slot = resolved;
        }
    }

    /// Validate semantic constraints that serde cannot enforce.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.cache.ttl_secs == 0 {
            anyhow::bail!("config: cache.ttl_secs must be greater than zero");
        }
        for (name, bin) in [
            ("dsjob_bin", &self.datastage.dsjob_bin),
            ("dsexport_bin", &self.datastage.dsexport_bin),
            ("dssearch_bin", &self.datastage.dssearch_bin),
        ] {
            if bin.trim().is_empty() {
                anyhow::bail!("config: datastage.{name} must not be empty");
            }
        }
        self.gateway
            .bind
            .parse::<std::net::SocketAddr>()
            .with_context(|| format!("config: invalid gateway.bind '{}'", self.gateway.bind))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn empty_document_yields_defaults() {
        let cfg = Config::parse("").unwrap();
        assert_eq!(cfg.cache.ttl_secs, 300);
        assert!(cfg.cache.enabled);
        assert_eq!(cfg.datastage.dsjob_bin, "dsjob");
        assert_eq!(cfg.gateway.bind, "127.0.0.1:8000");
        assert_eq!(cfg.gateway.tools_dir, PathBuf::from("tools"));
        cfg.validate().unwrap();
    }

    #[test]
    fn unknown_section_is_rejected() {
        assert!(Config::parse("bogus: 1\n").is_err());
    }

    #[test]
    fn env_overrides_replace_file_values() {
        let mut cfg = Config::parse(
            "datastage:\n  domain: file-domain:9443\n  project: FILE_PROJ\n",
        )
        .unwrap();
        cfg.apply_overrides(env(&[
            ("DATASTAGE_DOMAIN", "env-domain:9443"),
            ("DATASTAGE_USER", "etl"),
            ("DATASTAGE_PROJECT", ""),
            ("DSGATE_BIND", "0.0.0.0:9000"),
        ]));
        assert_eq!(cfg.datastage.domain.as_deref(), Some("env-domain:9443"));
        assert_eq!(cfg.datastage.user.as_deref(), Some("etl"));
        // Empty override leaves the file value alone.
        assert_eq!(cfg.datastage.project.as_deref(), Some("FILE_PROJ"));
        assert_eq!(cfg.gateway.bind, "0.0.0.0:9000");
    }

    #[test]
    fn password_reference_is_resolved() {
        let mut cfg = Config::parse("datastage:\n  password: $DS_PW\n").unwrap();
        cfg.resolve_secret_refs(env(&[("DS_PW", "s3cret")]));
        assert_eq!(cfg.datastage.password.as_deref(), Some("s3cret"));

        let mut cfg = Config::parse("datastage:\n  password: $NOPE\n").unwrap();
        cfg.resolve_secret_refs(env(&[]));
        assert!(cfg.datastage.password.is_none());
    }

    #[test]
    fn env_password_is_taken_verbatim() {
        let lookup = env(&[("DATASTAGE_PASSWORD", "$ecretPw1"), ("DSGATE_API_TOKEN", "$tok")]);
        let mut cfg = Config::parse("datastage:\n  password: $FROM_FILE\n").unwrap();
        cfg.resolve_secret_refs(&lookup);
        cfg.apply_overrides(&lookup);
        assert_eq!(cfg.datastage.password.as_deref(), Some("$ecretPw1"));
        assert_eq!(cfg.gateway.api_token.as_deref(), Some("$tok"));
    }

    #[test]
    fn missing_settings_lists_unset_credentials() {
        let mut cfg = Config::default();
        assert_eq!(
            cfg.datastage.missing_settings(),
            vec!["domain", "server", "user", "password"]
        );
        cfg.datastage.domain = Some("d".into());
        cfg.datastage.server = Some(String::new());
        assert_eq!(
            cfg.datastage.missing_settings(),
            vec!["server", "user", "password"]
        );
    }

    #[test]
    fn zero_ttl_is_invalid() {
        let cfg = Config::parse("cache:\n  ttl_secs: 0\n").unwrap();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn bad_bind_address_is_invalid() {
        let cfg = Config::parse("gateway:\n  bind: not-an-addr\n").unwrap();
        assert!(cfg.validate().is_err());
    }
}
