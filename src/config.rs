//! Configuration loading: a line-oriented `name: value` file format plus
//! validated in-memory option structs, in the style of the teacher's
//! cluster configuration module (`thiserror`-backed errors, `Default`
//! baselines overridden field-by-field, a final `validate()` pass).

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cuckoo::CuckooPolicy;
use crate::slab::SlabEvictPolicy;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for `{option}`: {reason}")]
    InvalidValue { option: String, reason: String },
    #[error("unknown configuration option: {0}")]
    UnknownOption(String),
    #[error("failed to read configuration file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CuckooOptions {
    pub policy: CuckooPolicy,
    pub item_size: usize,
    pub nitem: usize,
    pub displace: u32,
}

impl Default for CuckooOptions {
    fn default() -> Self {
        Self {
            policy: CuckooPolicy::Expire,
            item_size: 64,
            nitem: 1 << 20,
            displace: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlabOptions {
    pub size: usize,
    pub mem: usize,
    pub prealloc: bool,
    pub evict_opt: SlabEvictPolicy,
    pub use_freeq: bool,
    pub use_cas: bool,
}

impl Default for SlabOptions {
    fn default() -> Self {
        Self {
            size: 1024 * 1024,
            mem: 64 * 1024 * 1024,
            prealloc: false,
            evict_opt: SlabEvictPolicy::Lru,
            use_freeq: true,
            use_cas: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KlogOptions {
    pub file: Option<String>,
    pub nbuf: usize,
    pub intvl: u64,
    pub sample: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub daemonize: bool,
    pub pid_filename: Option<String>,
    pub server_host: String,
    pub server_port: u16,
    pub admin_host: String,
    pub admin_port: u16,
    pub allow_flush: bool,
    pub max_conns: usize,
    pub buf_init_size: usize,
    pub dbuf_max_power: u32,
    pub cuckoo: CuckooOptions,
    pub slab: SlabOptions,
    pub klog: KlogOptions,
}

impl ServerConfig {
    fn base(port: u16) -> Self {
        Self {
            daemonize: false,
            pid_filename: None,
            server_host: "0.0.0.0".to_string(),
            server_port: port,
            admin_host: "0.0.0.0".to_string(),
            admin_port: 9999,
            allow_flush: false,
            max_conns: 1024,
            buf_init_size: 4096,
            dbuf_max_power: 6,
            cuckoo: CuckooOptions::default(),
            slab: SlabOptions::default(),
            klog: KlogOptions::default(),
        }
    }

    pub fn default_cuckoo() -> Self {
        Self::base(22222)
    }

    pub fn default_slab() -> Self {
        Self::base(12321)
    }

    pub fn default_ping() -> Self {
        Self::base(54321)
    }

    /// Load a `name: value` configuration file over this instance as a
    /// baseline, then validate the merged result.
    pub fn load_file(mut self, path: &Path) -> ConfigResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        for (lineno, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (name, value) = line.split_once(':').ok_or_else(|| ConfigError::Invalid(format!(
                "line {}: expected `name: value`, got {:?}",
                lineno + 1,
                raw
            )))?;
            self.apply(name.trim(), value.trim())?;
        }
        self.validate()?;
        Ok(self)
    }

    fn apply(&mut self, name: &str, value: &str) -> ConfigResult<()> {
        fn parse<T: std::str::FromStr>(option: &str, value: &str) -> ConfigResult<T> {
            value.parse().map_err(|_| ConfigError::InvalidValue {
                option: option.to_string(),
                reason: format!("cannot parse {value:?}"),
            })
        }
        fn parse_bool(option: &str, value: &str) -> ConfigResult<bool> {
            match value {
                "yes" | "true" | "1" => Ok(true),
                "no" | "false" | "0" => Ok(false),
                _ => Err(ConfigError::InvalidValue {
                    option: option.to_string(),
                    reason: format!("expected yes/no, got {value:?}"),
                }),
            }
        }

        match name {
            "daemonize" => self.daemonize = parse_bool(name, value)?,
            "pid_filename" => self.pid_filename = Some(value.to_string()),
            "server_host" => self.server_host = value.to_string(),
            "server_port" => self.server_port = parse(name, value)?,
            "admin_host" => self.admin_host = value.to_string(),
            "admin_port" => self.admin_port = parse(name, value)?,
            "allow_flush" => self.allow_flush = parse_bool(name, value)?,
            "max_conns" => self.max_conns = parse(name, value)?,
            "buf_init_size" => self.buf_init_size = parse(name, value)?,
            "dbuf_max_power" => self.dbuf_max_power = parse(name, value)?,
            "cuckoo_policy" => {
                self.cuckoo.policy = match value {
                    "random" => CuckooPolicy::Random,
                    "expire" => CuckooPolicy::Expire,
                    other => {
                        return Err(ConfigError::InvalidValue {
                            option: name.to_string(),
                            reason: format!("unknown policy {other:?}"),
                        })
                    }
                }
            }
            "cuckoo_item_size" => self.cuckoo.item_size = parse(name, value)?,
            "cuckoo_nitem" => self.cuckoo.nitem = parse(name, value)?,
            "cuckoo_displace" => self.cuckoo.displace = parse(name, value)?,
            "slab_size" => self.slab.size = parse(name, value)?,
            "slab_mem" => self.slab.mem = parse(name, value)?,
            "slab_prealloc" => self.slab.prealloc = parse_bool(name, value)?,
            "slab_evict_opt" => {
                self.slab.evict_opt = match value {
                    "none" => SlabEvictPolicy::None,
                    "random" => SlabEvictPolicy::Random,
                    "lru" => SlabEvictPolicy::Lru,
                    "expired_first" => SlabEvictPolicy::ExpiredFirst,
                    other => {
                        return Err(ConfigError::InvalidValue {
                            option: name.to_string(),
                            reason: format!("unknown eviction policy {other:?}"),
                        })
                    }
                }
            }
            "slab_use_freeq" => self.slab.use_freeq = parse_bool(name, value)?,
            "slab_use_cas" => self.slab.use_cas = parse_bool(name, value)?,
            "klog_file" => self.klog.file = Some(value.to_string()),
            "klog_nbuf" => self.klog.nbuf = parse(name, value)?,
            "klog_intvl" => self.klog.intvl = parse(name, value)?,
            "klog_sample" => self.klog.sample = parse(name, value)?,
            other => return Err(ConfigError::UnknownOption(other.to_string())),
        }
        Ok(())
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.server_port == 0 {
            return Err(ConfigError::Invalid("server_port must be nonzero".into()));
        }
        if self.max_conns == 0 {
            return Err(ConfigError::Invalid("max_conns must be at least 1".into()));
        }
        if self.buf_init_size == 0 {
            return Err(ConfigError::Invalid("buf_init_size must be at least 1".into()));
        }
        if self.cuckoo.nitem == 0 {
            return Err(ConfigError::Invalid("cuckoo_nitem must be at least 1".into()));
        }
        if self.slab.mem < self.slab.size {
            return Err(ConfigError::Invalid("slab_mem must be at least one slab_size".into()));
        }
        Ok(())
    }
}

impl fmt::Display for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} (admin {}:{})", self.server_host, self.server_port, self.admin_host, self.admin_port)
    }
}

/// Parse a configuration file's raw text without touching the filesystem,
/// useful for tests and for CLI `-c -` (stdin).
pub fn parse_lines(text: &str) -> ConfigResult<HashMap<String, String>> {
    let mut map = HashMap::new();
    for (lineno, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (name, value) = line.split_once(':').ok_or_else(|| {
            ConfigError::Invalid(format!("line {}: expected `name: value`, got {:?}", lineno + 1, raw))
        })?;
        map.insert(name.trim().to_string(), value.trim().to_string());
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(ServerConfig::default_cuckoo().validate().is_ok());
        assert!(ServerConfig::default_slab().validate().is_ok());
    }

    #[test]
    fn zero_port_rejected() {
        let mut cfg = ServerConfig::default_cuckoo();
        cfg.server_port = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn parse_lines_skips_comments_and_blanks() {
        let map = parse_lines("# comment\n\nserver_port: 9000\n").unwrap();
        assert_eq!(map.get("server_port"), Some(&"9000".to_string()));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn apply_rejects_unknown_option() {
        let mut cfg = ServerConfig::default_cuckoo();
        assert!(matches!(cfg.apply("bogus_option", "1"), Err(ConfigError::UnknownOption(_))));
    }

    #[test]
    fn apply_parses_cuckoo_policy() {
        let mut cfg = ServerConfig::default_cuckoo();
        cfg.apply("cuckoo_policy", "random").unwrap();
        assert_eq!(cfg.cuckoo.policy, CuckooPolicy::Random);
    }

    #[test]
    fn slab_mem_below_slab_size_is_rejected() {
        let mut cfg = ServerConfig::default_slab();
        cfg.slab.mem = 100;
        cfg.slab.size = 1024;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn config_round_trips_through_serde_json() {
        let cfg = ServerConfig::default_slab();
        let encoded = serde_json::to_string(&cfg).unwrap();
        let decoded: ServerConfig = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded.server_port, cfg.server_port);
        assert_eq!(decoded.slab.evict_opt, cfg.slab.evict_opt);
    }
}
