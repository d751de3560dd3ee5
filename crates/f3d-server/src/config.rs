use std::env;
use std::net::IpAddr;
use std::path::PathBuf;

use anyhow::Context;

/// Server configuration, read from the environment (with `.env` support).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: IpAddr,
    pub port: u16,
    /// Root directory for per-job artifact storage.
    pub storage_root: PathBuf,
    /// How long after completion a job's artifacts stay downloadable.
    pub retention_secs: u64,
    /// Periodic sweep interval. Zero disables the timer; the per-completion
    /// trigger still runs.
    pub sweep_interval_secs: u64,
    /// Accelerator selection hint passed through to the engine.
    pub device: String,
}

impl ServerConfig {
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let host = var_or("F3D_HOST", "0.0.0.0")
            .parse()
            .context("F3D_HOST must be an IP address")?;
        let port = var_or("F3D_PORT", "8000")
            .parse()
            .context("F3D_PORT must be a port number")?;
        let storage_root = env::var("F3D_STORAGE_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|_| env::temp_dir().join("forge3d"));
        let retention_secs = parse_retention(&var_or("F3D_RETENTION_SECS", "3600"))
            .context("F3D_RETENTION_SECS must be a number of seconds in the representable range")?;
        let sweep_interval_secs = var_or("F3D_SWEEP_INTERVAL_SECS", "0")
            .parse()
            .context("F3D_SWEEP_INTERVAL_SECS must be a number of seconds")?;
        let device = var_or("F3D_DEVICE", "auto");

        Ok(Self {
            host,
            port,
            storage_root,
            retention_secs,
            sweep_interval_secs,
            device,
        })
    }

    pub fn retention_window(&self) -> chrono::Duration {
        // `load` rejects unrepresentable values, so the saturation only fires
        // for hand-built configs, which get the widest window instead.
        i64::try_from(self.retention_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .unwrap_or(chrono::Duration::MAX)
    }

    pub fn sweep_interval(&self) -> Option<std::time::Duration> {
        (self.sweep_interval_secs > 0)
            .then(|| std::time::Duration::from_secs(self.sweep_interval_secs))
    }
}

fn var_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

/// A retention value is only usable if it survives the trip into a signed
/// `chrono::Duration`; anything larger must be rejected up front rather
/// than wrapping into a negative window that sweeps everything instantly.
fn parse_retention(raw: &str) -> Option<u64> {
    let secs = raw.parse::<u64>().ok()?;
    let signed = i64::try_from(secs).ok()?;
    chrono::Duration::try_seconds(signed)?;
    Some(secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retention_parse_rejects_unrepresentable_values() {
        assert_eq!(parse_retention("3600"), Some(3600));
        assert_eq!(parse_retention("0"), Some(0));
        // Fits u64 but not i64.
        assert_eq!(parse_retention("9300000000000000000"), None);
        // Fits i64 seconds but overflows chrono's millisecond backing.
        assert_eq!(parse_retention("9223372036854775807"), None);
        assert_eq!(parse_retention("-1"), None);
        assert_eq!(parse_retention("soon"), None);
    }

    #[test]
    fn retention_window_never_goes_negative() {
        let config = ServerConfig {
            host: "127.0.0.1".parse().unwrap(),
            port: 0,
            storage_root: PathBuf::from("/tmp/forge3d-test"),
            retention_secs: u64::MAX,
            sweep_interval_secs: 0,
            device: "auto".into(),
        };
        assert!(config.retention_window() > chrono::Duration::zero());
        assert_eq!(
            ServerConfig {
                retention_secs: 3600,
                ..config
            }
            .retention_window(),
            chrono::Duration::hours(1)
        );
    }
}
