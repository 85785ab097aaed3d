use std::net::{SocketAddr, ToSocketAddrs};
use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Parser};

use crate::error::{Result, ServerError};
use crate::logging::{LogFormat, LoggingConfig};

pub const DEFAULT_LISTEN_ADDR: &str = ":3001";
pub const DEFAULT_STORAGE_PATH: &str = "/var/lib/terraform";
pub const DEFAULT_MAX_BODY_BYTES: usize = 64 * 1024 * 1024;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

/// An HTTP backend for Terraform remote state.
///
/// Stores each state as `{name}.tfstate` under the storage path and tracks locks with an
/// empty `{name}.lock` marker next to it. Every flag may also be given through its
/// environment variable; a flag on the command line wins over the environment.
#[derive(Parser, Debug, Clone)]
#[command(name = "tf_http_backend")]
#[command(version, about, long_about = None)]
pub struct CliArgs {
    /// The address to which the HTTP server will bind.
    ///
    /// A bare `:port` binds all interfaces.
    #[arg(long, env = "TF_HTTP_ADDR", default_value = DEFAULT_LISTEN_ADDR)]
    pub address: String,

    /// The path to the Terraform state files storage.
    ///
    /// Created if it doesn't exist. The process must be able to create and remove
    /// files inside it.
    #[arg(long, env = "TF_HTTP_PATH", default_value = DEFAULT_STORAGE_PATH)]
    pub path: PathBuf,

    /// Enables debug logging. `RUST_LOG` still takes precedence when set.
    ///
    /// `TF_HTTP_DEBUG` accepts 1, t, T, TRUE, true, True and their false counterparts;
    /// any other value leaves debug logging off.
    #[arg(long, env = "TF_HTTP_DEBUG", action = ArgAction::SetTrue, value_parser = parse_env_bool)]
    pub debug: bool,

    /// Log output format.
    #[arg(long, env = "TF_HTTP_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Largest accepted request body, in bytes.
    #[arg(long, env = "TF_HTTP_MAX_BODY_BYTES", default_value_t = DEFAULT_MAX_BODY_BYTES)]
    pub max_body_bytes: usize,

    /// Upper bound on the time spent serving a single request, in seconds.
    #[arg(long, env = "TF_HTTP_REQUEST_TIMEOUT_SECS", default_value_t = DEFAULT_REQUEST_TIMEOUT_SECS)]
    pub request_timeout_secs: u64,
}

impl CliArgs {
    pub fn logging_config(&self) -> LoggingConfig {
        LoggingConfig {
            debug: self.debug,
            format: self.log_format,
        }
    }

    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            storage_root: self.path.clone(),
            address: self.address.clone(),
            max_body_bytes: self.max_body_bytes,
            request_timeout: Duration::from_secs(self.request_timeout_secs),
        }
    }
}

/// Lenient boolean for environment flags. Unrecognized values read as false.
fn parse_env_bool(value: &str) -> std::result::Result<bool, std::convert::Infallible> {
    Ok(matches!(value.trim(), "1" | "t" | "T" | "TRUE" | "true" | "True"))
}

/// Configuration for the state server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Directory holding the state files and lock markers.
    pub storage_root: PathBuf,
    /// Bind address, e.g. "127.0.0.1:3001" or ":3001".
    pub address: String,
    pub max_body_bytes: usize,
    pub request_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            storage_root: PathBuf::from(DEFAULT_STORAGE_PATH),
            address: DEFAULT_LISTEN_ADDR.to_string(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        resolve_bind_address(&self.address)
    }
}

/// Resolves a listen address. A leading `:` (no host) means every IPv4 interface.
pub fn resolve_bind_address(address: &str) -> Result<SocketAddr> {
    let address = address.trim();
    let full = if address.starts_with(':') {
        format!("0.0.0.0{address}")
    } else {
        address.to_string()
    };

    full.to_socket_addrs()
        .map_err(|e| ServerError::ConfigurationError(format!("Failed to resolve address {address:?}: {e}")))?
        .next()
        .ok_or_else(|| ServerError::ConfigurationError(format!("Address {address:?} resolved to nothing")))
}

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr};

    use std::ffi::OsStr;

    use clap::Parser;
    use serial_test::serial;

    use super::*;

    const ENV_VARS: [&str; 6] = [
        "TF_HTTP_ADDR",
        "TF_HTTP_PATH",
        "TF_HTTP_DEBUG",
        "TF_HTTP_LOG_FORMAT",
        "TF_HTTP_MAX_BODY_BYTES",
        "TF_HTTP_REQUEST_TIMEOUT_SECS",
    ];

    /// Sets or clears an environment variable and restores the previous value on drop.
    struct EnvVarGuard {
        key: &'static str,
        prev: Option<String>,
    }

    impl EnvVarGuard {
        fn set(key: &'static str, value: impl AsRef<OsStr>) -> Self {
            let prev = std::env::var(key).ok();
            std::env::set_var(key, value);
            Self { key, prev }
        }

        fn unset(key: &'static str) -> Self {
            let prev = std::env::var(key).ok();
            std::env::remove_var(key);
            Self { key, prev }
        }
    }

    impl Drop for EnvVarGuard {
        fn drop(&mut self) {
            match &self.prev {
                Some(v) => std::env::set_var(self.key, v),
                None => std::env::remove_var(self.key),
            }
        }
    }

    fn clean_env() -> Vec<EnvVarGuard> {
        ENV_VARS.into_iter().map(EnvVarGuard::unset).collect()
    }

    #[test]
    fn test_port_only_binds_all_interfaces() {
        let addr = resolve_bind_address(":3001").unwrap();
        assert_eq!(addr.ip(), IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        assert_eq!(addr.port(), 3001);
    }

    #[test]
    fn test_explicit_address() {
        let addr = resolve_bind_address("127.0.0.1:8080").unwrap();
        assert_eq!(addr, "127.0.0.1:8080".parse().unwrap());

        let addr = resolve_bind_address(" [::1]:9000 ").unwrap();
        assert_eq!(addr, "[::1]:9000".parse().unwrap());
    }

    #[test]
    fn test_bad_address() {
        assert!(matches!(resolve_bind_address("no-port-here"), Err(ServerError::ConfigurationError(_))));
        assert!(matches!(resolve_bind_address(":notaport"), Err(ServerError::ConfigurationError(_))));
    }

    #[test]
    #[serial(tf_http_env)]
    fn test_cli_flags() {
        let _env = clean_env();
        let args = CliArgs::try_parse_from([
            "tf_http_backend",
            "--address",
            "127.0.0.1:4000",
            "--path",
            "/srv/states",
            "--debug",
            "--log-format",
            "json",
            "--max-body-bytes",
            "1024",
            "--request-timeout-secs",
            "3",
        ])
        .unwrap();

        let config = args.server_config();
        assert_eq!(config.address, "127.0.0.1:4000");
        assert_eq!(config.storage_root, PathBuf::from("/srv/states"));
        assert_eq!(config.max_body_bytes, 1024);
        assert_eq!(config.request_timeout, Duration::from_secs(3));

        let logging = args.logging_config();
        assert!(logging.debug);
        assert_eq!(logging.format, LogFormat::Json);
    }

    #[test]
    #[serial(tf_http_env)]
    fn test_rejects_unknown_log_format() {
        let _env = clean_env();
        assert!(CliArgs::try_parse_from(["tf_http_backend", "--log-format", "xml"]).is_err());
    }

    #[test]
    #[serial(tf_http_env)]
    fn test_defaults_without_env() {
        let _env = clean_env();
        let args = CliArgs::try_parse_from(["tf_http_backend"]).unwrap();

        assert_eq!(args.address, DEFAULT_LISTEN_ADDR);
        assert_eq!(args.path, PathBuf::from(DEFAULT_STORAGE_PATH));
        assert!(!args.debug);
        assert_eq!(args.log_format, LogFormat::Text);
        assert_eq!(args.max_body_bytes, DEFAULT_MAX_BODY_BYTES);
        assert_eq!(args.request_timeout_secs, DEFAULT_REQUEST_TIMEOUT_SECS);
    }

    #[test]
    #[serial(tf_http_env)]
    fn test_env_values() {
        let _env = clean_env();
        let _addr = EnvVarGuard::set("TF_HTTP_ADDR", "127.0.0.1:5000");
        let _path = EnvVarGuard::set("TF_HTTP_PATH", "/tmp/tf-states");
        let _debug = EnvVarGuard::set("TF_HTTP_DEBUG", "1");
        let _format = EnvVarGuard::set("TF_HTTP_LOG_FORMAT", "json");
        let _body = EnvVarGuard::set("TF_HTTP_MAX_BODY_BYTES", "2048");
        let _timeout = EnvVarGuard::set("TF_HTTP_REQUEST_TIMEOUT_SECS", "30");

        let args = CliArgs::try_parse_from(["tf_http_backend"]).unwrap();
        let config = args.server_config();
        assert_eq!(config.address, "127.0.0.1:5000");
        assert_eq!(config.storage_root, PathBuf::from("/tmp/tf-states"));
        assert_eq!(config.max_body_bytes, 2048);
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(
            args.logging_config(),
            LoggingConfig {
                debug: true,
                format: LogFormat::Json,
            }
        );
    }

    #[test]
    #[serial(tf_http_env)]
    fn test_debug_env_accepts_boolean_spellings() {
        let _env = clean_env();
        let cases = [
            ("1", true),
            ("t", true),
            ("T", true),
            ("TRUE", true),
            ("true", true),
            ("True", true),
            (" true ", true),
            ("0", false),
            ("f", false),
            ("FALSE", false),
            ("false", false),
            ("", false),
            ("maybe", false),
        ];

        for (value, expected) in cases {
            let _debug = EnvVarGuard::set("TF_HTTP_DEBUG", value);
            let args = CliArgs::try_parse_from(["tf_http_backend"]).unwrap();
            assert_eq!(args.debug, expected, "TF_HTTP_DEBUG={value:?}");
        }
    }

    #[test]
    #[serial(tf_http_env)]
    fn test_flags_override_env() {
        let _env = clean_env();
        let _addr = EnvVarGuard::set("TF_HTTP_ADDR", "127.0.0.1:5000");
        let _debug = EnvVarGuard::set("TF_HTTP_DEBUG", "0");
        let _body = EnvVarGuard::set("TF_HTTP_MAX_BODY_BYTES", "2048");

        let args = CliArgs::try_parse_from([
            "tf_http_backend",
            "--address",
            ":7000",
            "--debug",
            "--max-body-bytes",
            "10",
        ])
        .unwrap();
        assert_eq!(args.address, ":7000");
        assert!(args.debug);
        assert_eq!(args.max_body_bytes, 10);
    }
}
