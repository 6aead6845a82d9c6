use crate::scanner::ScanRequest;
use camfinder_protocol::Credentials;
use camfinder_protocol::DiscoveryOptions;
use std::time::Duration;

pub const DEFAULT_PORTS: &str = "80, 7575, 8000, 8080, 8081";
pub const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_millis(5000);
pub const DEFAULT_NAMESPACE: &str = "camfinder.0";

/// What to do with a scanned device whose ID is already registered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Rediscovery {
    /// Leave the registry entry untouched.
    #[default]
    Keep,

    /// Overwrite the entry's data with the new profile.
    Replace,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Prefix of qualified device IDs, also used by room enumerations.
    pub namespace: String,

    /// Bound on every single call to a device.
    pub step_timeout: Duration,

    pub default_ports: Vec<u16>,
    pub default_credentials: Credentials,
    pub rediscovery: Rediscovery,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.into(),
            step_timeout: DEFAULT_STEP_TIMEOUT,
            default_ports: parse_ports(DEFAULT_PORTS),
            default_credentials: Credentials {
                username: "admin".into(),
                password: "admin".into(),
            },
            rediscovery: Rediscovery::Keep,
        }
    }
}

impl Config {
    /// Fills in what a discovery command left out.
    ///
    /// A missing end address probes the start address alone.
    pub fn scan_request(&self, options: DiscoveryOptions) -> ScanRequest {
        let DiscoveryOptions {
            start_range,
            end_range,
            ports,
            user,
            pass,
        } = options;
        ScanRequest {
            end: end_range
                .filter(|end| !end.trim().is_empty())
                .unwrap_or_else(|| start_range.clone()),
            start: start_range,
            ports: ports
                .map(|list| parse_ports(&list))
                .unwrap_or_else(|| self.default_ports.clone()),
            credentials: Credentials {
                username: user.unwrap_or_else(|| self.default_credentials.username.clone()),
                password: pass.unwrap_or_else(|| self.default_credentials.password.clone()),
            },
        }
    }
}

/// Parses a comma-separated port list, skipping entries that are not valid ports.
pub fn parse_ports(list: &str) -> Vec<u16> {
    list.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .filter_map(|entry| match entry.parse::<u16>() {
            Ok(0) => {
                log::warn!("Ignoring port 0");
                None
            }
            Ok(port) => Some(port),
            Err(e) => {
                log::warn!("Ignoring invalid port `{}`: {}", entry, e);
                None
            }
        })
        .collect()
}
