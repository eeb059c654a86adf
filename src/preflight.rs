use crate::config::Config;
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

/// Environment queries gating job admission.
pub trait Environment {
    fn transcoder_available(&self, name: &str) -> bool;
    fn is_online(&self) -> bool;
}

#[derive(Debug, Clone)]
pub struct SystemEnvironment {
    probe: String,
    timeout: Duration,
}

impl SystemEnvironment {
    pub fn new(probe: impl Into<String>, timeout: Duration) -> Self {
        Self {
            probe: probe.into(),
            timeout,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.reachability_probe.clone(), config.reachability_timeout())
    }
}

impl Environment for SystemEnvironment {
    fn transcoder_available(&self, name: &str) -> bool {
        binary_on_path(name)
    }

    fn is_online(&self) -> bool {
        let addrs = match self.probe.to_socket_addrs() {
            Ok(addrs) => addrs,
            Err(err) => {
                tracing::warn!(probe = %self.probe, error = %err, "reachability probe unresolved");
                return false;
            }
        };
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, self.timeout) {
                Ok(_) => return true,
                Err(err) => tracing::debug!(%addr, error = %err, "reachability probe failed"),
            }
        }
        false
    }
}

pub fn binary_on_path(name: &str) -> bool {
    which::which(name).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    #[test]
    fn local_listener_counts_as_online() -> anyhow::Result<()> {
        let listener = TcpListener::bind("127.0.0.1:0")?;
        let probe = listener.local_addr()?.to_string();
        let env = SystemEnvironment::new(probe, Duration::from_millis(500));
        assert!(env.is_online());
        Ok(())
    }

    #[test]
    fn closed_port_is_offline() -> anyhow::Result<()> {
        let addr = TcpListener::bind("127.0.0.1:0")?.local_addr()?;
        let env = SystemEnvironment::new(addr.to_string(), Duration::from_millis(200));
        assert!(!env.is_online());
        Ok(())
    }

    #[test]
    fn garbage_probe_is_offline() {
        let env = SystemEnvironment::new("not an address", Duration::from_millis(50));
        assert!(!env.is_online());
    }

    #[test]
    fn unknown_binary_is_missing() {
        assert!(!binary_on_path("tubetone-surely-missing-transcoder"));
    }
}
