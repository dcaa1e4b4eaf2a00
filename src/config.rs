use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::{env, str::FromStr, time::Duration};

/// How a sweep pass treats an object younger than the TTL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SweepMode {
    /// Skip it and keep evaluating the rest of the listing.
    Skip,
    /// Stop the pass there, assuming the listing is ordered by upload time.
    Halt,
}

impl FromStr for SweepMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        <SweepMode as ValueEnum>::from_str(s, true).map_err(|e| anyhow::anyhow!(e))
    }
}

/// Request-path policy shared by the router and the sweeper.
#[derive(Debug, Clone, Default)]
pub struct GatewayConfig {
    /// Keys starting with this prefix cannot be written, deleted or swept.
    pub protected_prefix: Option<String>,
}

impl GatewayConfig {
    pub fn is_protected(&self, key: &str) -> bool {
        self.protected_prefix
            .as_deref()
            .is_some_and(|prefix| key.starts_with(prefix))
    }
}

#[derive(Debug, Clone)]
pub struct SweeperConfig {
    pub enabled: bool,
    /// Age after which an unprotected object is deleted.
    pub ttl: Duration,
    /// Time between sweep passes.
    pub interval: Duration,
    pub mode: SweepMode,
}

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub storage_dir: String,
    pub database_url: String,
    pub gateway: GatewayConfig,
    pub sweeper: SweeperConfig,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "HTTP gateway over a single object bucket")]
pub struct Args {
    /// Host to bind to (overrides BUCKET_GATEWAY_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides BUCKET_GATEWAY_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory where object payloads are stored (overrides BUCKET_GATEWAY_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Metadata database URL (overrides BUCKET_GATEWAY_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Keys with this prefix are read-only and never swept (overrides BUCKET_GATEWAY_PROTECTED_PREFIX)
    #[arg(long)]
    pub protected_prefix: Option<String>,

    /// Object lifetime in seconds (overrides BUCKET_GATEWAY_TTL_SECS)
    #[arg(long)]
    pub ttl_secs: Option<u64>,

    /// Seconds between sweep passes (overrides BUCKET_GATEWAY_SWEEP_INTERVAL_SECS)
    #[arg(long)]
    pub sweep_interval_secs: Option<u64>,

    /// What a sweep does on reaching a fresh object (overrides BUCKET_GATEWAY_SWEEP_MODE)
    #[arg(long, value_enum)]
    pub sweep_mode: Option<SweepMode>,

    /// Do not run the expiry sweeper
    #[arg(long)]
    pub no_sweeper: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig.
    pub fn from_env_and_args() -> Result<Self> {
        Self::from_args(Args::parse())
    }

    /// Merge already-parsed CLI args over the environment and defaults.
    pub fn from_args(args: Args) -> Result<Self> {
        // --- Environment fallback ---
        let env_host = env::var("BUCKET_GATEWAY_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = env_parse("BUCKET_GATEWAY_PORT", 8787)?;
        let env_storage =
            env::var("BUCKET_GATEWAY_STORAGE_DIR").unwrap_or_else(|_| "./data/objects".into());
        let env_db = env::var("BUCKET_GATEWAY_DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./data/meta/bucket.db".into());
        let env_prefix = env::var("BUCKET_GATEWAY_PROTECTED_PREFIX").ok();
        let env_ttl = env_parse("BUCKET_GATEWAY_TTL_SECS", 60)?;
        let env_interval = env_parse("BUCKET_GATEWAY_SWEEP_INTERVAL_SECS", 60)?;
        let env_mode = env_parse("BUCKET_GATEWAY_SWEEP_MODE", SweepMode::Skip)?;

        // --- Merge ---
        let interval_secs = args.sweep_interval_secs.unwrap_or(env_interval);
        if interval_secs == 0 {
            anyhow::bail!("sweep interval must be at least one second");
        }

        Ok(Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            storage_dir: args.storage_dir.unwrap_or(env_storage),
            database_url: args.database_url.unwrap_or(env_db),
            gateway: GatewayConfig {
                protected_prefix: args
                    .protected_prefix
                    .or(env_prefix)
                    .filter(|prefix| !prefix.is_empty()),
            },
            sweeper: SweeperConfig {
                enabled: !args.no_sweeper,
                ttl: Duration::from_secs(args.ttl_secs.unwrap_or(env_ttl)),
                interval: Duration::from_secs(interval_secs),
                mode: args.sweep_mode.unwrap_or(env_mode),
            },
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Read and parse an environment variable, falling back to `default` when unset.
fn env_parse<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(value) => value
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("{}", e))
            .with_context(|| format!("parsing {} value `{}`", name, value)),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("reading {}", name)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_values_win() {
        let args = Args::parse_from([
            "bucket-gateway",
            "--host",
            "127.0.0.1",
            "--port",
            "9000",
            "--protected-prefix",
            "static/",
            "--ttl-secs",
            "120",
            "--sweep-interval-secs",
            "30",
            "--sweep-mode",
            "halt",
            "--no-sweeper",
        ]);
        let cfg = AppConfig::from_args(args).unwrap();

        assert_eq!(cfg.addr(), "127.0.0.1:9000");
        assert_eq!(cfg.gateway.protected_prefix.as_deref(), Some("static/"));
        assert_eq!(cfg.sweeper.ttl, Duration::from_secs(120));
        assert_eq!(cfg.sweeper.interval, Duration::from_secs(30));
        assert_eq!(cfg.sweeper.mode, SweepMode::Halt);
        assert!(!cfg.sweeper.enabled);
    }

    #[test]
    fn empty_protected_prefix_protects_nothing() {
        let args = Args {
            protected_prefix: Some(String::new()),
            ..Default::default()
        };
        let cfg = AppConfig::from_args(args).unwrap();
        assert_eq!(cfg.gateway.protected_prefix, None);
        assert!(!cfg.gateway.is_protected("anything"));
    }

    #[test]
    fn zero_interval_is_rejected() {
        let args = Args {
            sweep_interval_secs: Some(0),
            ..Default::default()
        };
        assert!(AppConfig::from_args(args).is_err());
    }

    #[test]
    fn protection_is_a_plain_prefix_match() {
        let cfg = GatewayConfig {
            protected_prefix: Some("static/".into()),
        };
        assert!(cfg.is_protected("static/logo.png"));
        assert!(!cfg.is_protected("statics/logo.png"));
        assert!(!cfg.is_protected("x/static/logo.png"));
    }

    #[test]
    fn sweep_mode_parses_case_insensitively() {
        assert_eq!("HALT".parse::<SweepMode>().unwrap(), SweepMode::Halt);
        assert!("sometimes".parse::<SweepMode>().is_err());
    }
}
