//! Runtime settings from CLI flags and `STRTR_`-prefixed environment variables.

use std::env;
use std::net::SocketAddr;

use anyhow::{Context, Result};

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 5454;

/// Resolved runtime settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Address to bind, e.g. `127.0.0.1`.
    pub host: String,
    /// TCP port to listen on.
    pub port: u16,
    /// Enable Schnorr signature verification on submitted events.
    pub verify_sig: bool,
}

impl Settings {
    /// Resolve settings, CLI values taking precedence over the environment.
    pub fn resolve(host: Option<String>, port: Option<u16>) -> Result<Self> {
        let host = host
            .or_else(|| env_var("STRTR_HOST"))
            .unwrap_or_else(|| DEFAULT_HOST.into());
        let port = match port {
            Some(p) => p,
            None => match env_var("STRTR_PORT") {
                Some(raw) => raw.parse().context("parsing STRTR_PORT")?,
                None => DEFAULT_PORT,
            },
        };
        let verify_sig = env_var("STRTR_VERIFY_SIG").is_some_and(|v| v == "1");
        Ok(Self {
            host,
            port,
            verify_sig,
        })
    }

    /// Socket address the server binds to.
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .context("parsing bind address")
    }
}

fn env_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.is_empty())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Serializes every test that touches `STRTR_*` environment variables.
    pub(crate) static ENV_MUTEX: Mutex<()> = Mutex::new(());

    fn clear_env() {
        for v in ["STRTR_HOST", "STRTR_PORT", "STRTR_VERIFY_SIG"] {
            env::remove_var(v);
        }
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let _g = ENV_MUTEX.lock().unwrap();
        clear_env();
        let cfg = Settings::resolve(None, None).unwrap();
        assert_eq!(cfg.host, "127.0.0.1");
        assert_eq!(cfg.port, 5454);
        assert!(!cfg.verify_sig);
        assert_eq!(cfg.bind_addr().unwrap().port(), 5454);
    }

    #[test]
    fn env_supplies_values() {
        let _g = ENV_MUTEX.lock().unwrap();
        clear_env();
        env::set_var("STRTR_HOST", "0.0.0.0");
        env::set_var("STRTR_PORT", "7777");
        env::set_var("STRTR_VERIFY_SIG", "1");
        let cfg = Settings::resolve(None, None).unwrap();
        assert_eq!(cfg.host, "0.0.0.0");
        assert_eq!(cfg.port, 7777);
        assert!(cfg.verify_sig);
        clear_env();
    }

    #[test]
    fn cli_beats_env() {
        let _g = ENV_MUTEX.lock().unwrap();
        clear_env();
        env::set_var("STRTR_HOST", "0.0.0.0");
        env::set_var("STRTR_PORT", "7777");
        let cfg = Settings::resolve(Some("10.0.0.1".into()), Some(9999)).unwrap();
        assert_eq!(cfg.host, "10.0.0.1");
        assert_eq!(cfg.port, 9999);
        clear_env();
    }

    #[test]
    fn empty_env_values_fall_through() {
        let _g = ENV_MUTEX.lock().unwrap();
        clear_env();
        env::set_var("STRTR_HOST", "");
        let cfg = Settings::resolve(None, None).unwrap();
        assert_eq!(cfg.host, "127.0.0.1");
        clear_env();
    }

    #[test]
    fn invalid_port_env_errors() {
        let _g = ENV_MUTEX.lock().unwrap();
        clear_env();
        env::set_var("STRTR_PORT", "notaport");
        assert!(Settings::resolve(None, None).is_err());
        clear_env();
    }

    #[test]
    fn bad_host_fails_at_bind_addr() {
        let _g = ENV_MUTEX.lock().unwrap();
        clear_env();
        let cfg = Settings::resolve(Some("not a host".into()), Some(1)).unwrap();
        assert!(cfg.bind_addr().is_err());
    }
}
