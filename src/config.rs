use serde::Deserialize;
use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    time::Duration,
};

pub const ENV_PREFIX: &str = "COLLECTD_PROXY";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ProxyCfg {
    #[serde(default)]
    pub http: HttpCfg,
    #[serde(default)]
    pub influx: InfluxCfg,
    #[serde(default)]
    pub diagnostics: DiagnosticsCfg,
    #[serde(default)]
    pub health: HealthCfg,
    #[serde(default)]
    pub shutdown: ShutdownCfg,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields, default)]
pub struct HttpCfg {
    pub bind: SocketAddr,
    pub request_log: bool,
    pub max_body_bytes: usize,
}
impl Default for HttpCfg {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            request_log: true,
            max_body_bytes: 2 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields, default)]
pub struct InfluxCfg {
    pub url: String,
    pub database: String,
}
impl Default for InfluxCfg {
    fn default() -> Self {
        Self {
            url: "http://localhost:8086/".into(),
            database: "collectd".into(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(deny_unknown_fields, default)]
pub struct DiagnosticsCfg {
    pub enabled: bool,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HealthCfg {
    pub require_backend: bool,
    pub probe_interval_ms: u64,
}
impl Default for HealthCfg {
    fn default() -> Self {
        Self {
            require_backend: false,
            probe_interval_ms: 1000,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields, default)]
pub struct ShutdownCfg {
    pub grace_period_secs: u64,
}
impl Default for ShutdownCfg {
    fn default() -> Self {
        Self {
            grace_period_secs: 5,
        }
    }
}
impl ShutdownCfg {
    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs)
    }
}

fn default_bind() -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 5826)
}

/// Values given on the command line; they win over every other source.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub http_bind: Option<String>,
    pub influx_url: Option<String>,
    pub database: Option<String>,
}

impl ProxyCfg {
    pub fn load(path: Option<String>, overrides: &Overrides) -> anyhow::Result<Self> {
        Self::from_builder(build_config(path, overrides)?)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            !self.influx.database.is_empty(),
            "influx.database cannot be empty"
        );
        let url = reqwest::Url::parse(&self.influx.url)
            .map_err(|e| anyhow::anyhow!("influx.url is invalid: {e}"))?;
        anyhow::ensure!(
            matches!(url.scheme(), "http" | "https"),
            "influx.url must use http or https, got {}",
            url.scheme()
        );
        anyhow::ensure!(
            self.http.max_body_bytes > 0,
            "http.max_body_bytes must be positive"
        );
        Ok(())
    }

    fn from_builder(cfg: config::Config) -> anyhow::Result<Self> {
        Ok(cfg.try_deserialize()?)
    }
}

fn build_config(path: Option<String>, overrides: &Overrides) -> anyhow::Result<config::Config> {
    use config::{Config, Environment, File};
    let mut builder = Config::builder().add_source(File::with_name("proxy").required(false));
    if let Some(path) = path {
        builder = builder.add_source(File::with_name(&path));
    }
    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));
    if let Some(bind) = &overrides.http_bind {
        builder = builder.set_override("http.bind", bind.as_str())?;
    }
    if let Some(url) = &overrides.influx_url {
        builder = builder.set_override("influx.url", url.as_str())?;
    }
    if let Some(db) = &overrides.database {
        builder = builder.set_override("influx.database", db.as_str())?;
    }
    Ok(builder.build()?)
}
