use std::env;
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_QUEUE_CAPACITY: usize = 256;
const DEFAULT_EVALUATOR_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub room: RoomConfig,
    pub evaluator: EvaluatorConfig,
    pub admin: AdminConfig,
    pub log_format: LogFormat,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub static_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct RoomConfig {
    pub name: String,
    /// Bound of every participant's outbound queue
    pub outbound_queue_capacity: usize,
}

#[derive(Debug, Clone)]
pub struct EvaluatorConfig {
    pub program: String,
    pub args: Vec<String>,
    /// `None` disables the timeout
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct AdminConfig {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();

        let port = env::var("SERVER_PORT")
            .or_else(|_| env::var("PORT"))
            .ok()
            .map(|raw| parse_or_default("SERVER_PORT", &raw, DEFAULT_PORT))
            .unwrap_or(DEFAULT_PORT);

        let outbound_queue_capacity = env::var("OUTBOUND_QUEUE_CAPACITY")
            .ok()
            .map(|raw| parse_or_default("OUTBOUND_QUEUE_CAPACITY", &raw, DEFAULT_QUEUE_CAPACITY))
            .filter(|capacity| *capacity > 0)
            .unwrap_or(DEFAULT_QUEUE_CAPACITY);

        let timeout_secs = env::var("EVALUATOR_TIMEOUT_SECS")
            .ok()
            .map(|raw| parse_or_default("EVALUATOR_TIMEOUT_SECS", &raw, DEFAULT_EVALUATOR_TIMEOUT_SECS))
            .unwrap_or(DEFAULT_EVALUATOR_TIMEOUT_SECS);

        Self {
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port,
                static_dir: PathBuf::from(
                    env::var("STATIC_DIR").unwrap_or_else(|_| "./static".to_string()),
                ),
            },
            room: RoomConfig {
                name: env::var("ROOM_NAME").unwrap_or_else(|_| "school-arena".to_string()),
                outbound_queue_capacity,
            },
            evaluator: EvaluatorConfig {
                program: env::var("EVALUATOR_PROGRAM").unwrap_or_else(|_| "python3".to_string()),
                args: env::var("EVALUATOR_ARGS")
                    .unwrap_or_else(|_| "sandbox.py".to_string())
                    .split_whitespace()
                    .map(str::to_string)
                    .collect(),
                timeout: timeout_from_secs(timeout_secs),
            },
            admin: AdminConfig {
                username: env::var("ADMIN_USER").unwrap_or_else(|_| "admin".to_string()),
                password: env::var("ADMIN_PASSWORD")
                    .ok()
                    .filter(|p| !p.is_empty())
                    .unwrap_or_else(|| "admin".to_string()),
            },
            log_format: match env::var("LOG_FORMAT").as_deref() {
                Ok("json") => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
        }
    }

    pub fn bind_address(&self) -> ([u8; 4], u16) {
        let ip_addr = self.parse_host_to_ipv4();
        (ip_addr.octets(), self.server.port)
    }

    fn parse_host_to_ipv4(&self) -> Ipv4Addr {
        // Try to parse as IP address first
        if let Ok(addr) = self.server.host.parse::<IpAddr>() {
            match addr {
                IpAddr::V4(ipv4) => return ipv4,
                IpAddr::V6(_) => {
                    tracing::warn!(
                        host = %self.server.host,
                        "IPv6 address provided but only IPv4 supported, using 0.0.0.0"
                    );
                    return Ipv4Addr::new(0, 0, 0, 0);
                }
            }
        }

        match self.server.host.as_str() {
            "localhost" => Ipv4Addr::new(127, 0, 0, 1),
            "" | "0.0.0.0" => Ipv4Addr::new(0, 0, 0, 0),
            _ => {
                tracing::warn!(
                    host = %self.server.host,
                    "Unable to parse host as IPv4, using 0.0.0.0"
                );
                Ipv4Addr::new(0, 0, 0, 0)
            }
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: DEFAULT_PORT,
                static_dir: PathBuf::from("./static"),
            },
            room: RoomConfig {
                name: "school-arena".to_string(),
                outbound_queue_capacity: DEFAULT_QUEUE_CAPACITY,
            },
            evaluator: EvaluatorConfig {
                program: "python3".to_string(),
                args: vec!["sandbox.py".to_string()],
                timeout: timeout_from_secs(DEFAULT_EVALUATOR_TIMEOUT_SECS),
            },
            admin: AdminConfig {
                username: "admin".to_string(),
                password: "admin".to_string(),
            },
            log_format: LogFormat::Pretty,
        }
    }
}

fn timeout_from_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

fn parse_or_default<T>(name: &str, raw: &str, default: T) -> T
where
    T: std::str::FromStr + std::fmt::Display + Copy,
{
    match raw.trim().parse() {
        Ok(value) => value,
        Err(_) => {
            tracing::warn!(var = name, value = %raw, default = %default, "Invalid value, using default");
            default
        }
    }
}
