//! 应用运行配置加载。
//!
//! 配置来源：
//! - `config.yaml`（路径可由 `MMA_CONFIG_PATH` 覆盖），缺失时写出默认配置并停止启动
//! - 环境变量覆盖少量部署相关项（REST 地址与 token、各传输开关）

mod factory;
mod model;
mod validate;

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

pub use factory::build_memories;
pub use model::{
    AppConfig, AreaConfig, DEFAULT_MAX_CONNECTIONS, DEFAULT_MODBUS_PORT, GateConfig,
    IpFilterConfig, MemoryBlock, MemoryConfig, MqttConfig, PortConfig, RawIngestConfig,
    RestConfig, RoutingConfig, StateSealingConfig,
};
pub use validate::MAX_AREA_SIZE;

/// 默认配置文件路径。
pub const DEFAULT_CONFIG_PATH: &str = "config.yaml";

/// 配置加载错误。
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {0}: {1}")]
    Invalid(String, String),
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("config file not found; default config written to {0}, please review and restart")]
    DefaultCreated(String),
    #[error("invalid config: {0}")]
    Validation(String),
    #[error("failed to build memories: {0}")]
    Registry(#[from] domain::RegistryError),
}

impl AppConfig {
    /// 按环境变量定位配置文件，加载、覆盖并校验。
    pub fn from_env() -> Result<Self, ConfigError> {
        let path = config_path_from_env();
        let mut config = load_or_create(&path)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// 解析 YAML 文本并校验。
    pub fn from_yaml_str(source: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = serde_yaml::from_str(source).map_err(|source| ConfigError::Parse {
            path: "<inline>".to_string(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// 出厂配置：一块 default 内存 `memory1`，unit 1 路由到它。
    pub fn factory_default() -> Self {
        let mut memories = BTreeMap::new();
        memories.insert(
            "memory1".to_string(),
            MemoryBlock {
                default: true,
                coils: AreaConfig { start: 0, size: 1024 },
                discrete_inputs: AreaConfig { start: 0, size: 1024 },
                holding_registers: AreaConfig { start: 0, size: 4096 },
                input_registers: AreaConfig { start: 0, size: 4096 },
                state_sealing: None,
            },
        );
        Self {
            memory: MemoryConfig { memories },
            routing: RoutingConfig {
                unit_id_map: mma_policy::RoutingTable::new([(1, "memory1".to_string())]),
            },
            ports: BTreeMap::new(),
            rest: RestConfig::default(),
            mqtt: MqttConfig::default(),
            raw_ingest: RawIngestConfig::default(),
        }
    }

    /// 应用环境变量覆盖。
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(address) = read_optional("MMA_REST_ADDR") {
            self.rest.address = address;
        }
        if let Some(tokens) = read_optional("MMA_REST_TOKENS") {
            self.rest.tokens = tokens
                .split(',')
                .map(str::trim)
                .filter(|token| !token.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(enabled) = read_optional_bool("MMA_REST_ENABLED")? {
            self.rest.enabled = enabled;
        }
        if let Some(enabled) = read_optional_bool("MMA_MQTT_ENABLED")? {
            self.mqtt.enabled = enabled;
        }
        if let Some(enabled) = read_optional_bool("MMA_RAW_INGEST_ENABLED")? {
            self.raw_ingest.enabled = enabled;
        }
        if let Some(listen) = read_optional("MMA_RAW_INGEST_LISTEN") {
            self.raw_ingest.listen = listen;
        }
        Ok(())
    }
}

/// 配置文件路径（`MMA_CONFIG_PATH`，默认 `config.yaml`）。
pub fn config_path_from_env() -> PathBuf {
    read_optional("MMA_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// 读取并校验配置文件。
pub fn load(path: &Path) -> Result<AppConfig, ConfigError> {
    let display = path.display().to_string();
    let source = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: display.clone(),
        source,
    })?;
    let config: AppConfig = serde_yaml::from_str(&source).map_err(|source| ConfigError::Parse {
        path: display,
        source,
    })?;
    config.validate()?;
    Ok(config)
}

/// 文件存在则加载；不存在则写出出厂配置并返回 `DefaultCreated`。
pub fn load_or_create(path: &Path) -> Result<AppConfig, ConfigError> {
    if path.exists() {
        return load(path);
    }
    write_default_config(path)?;
    Err(ConfigError::DefaultCreated(path.display().to_string()))
}

fn write_default_config(path: &Path) -> Result<(), ConfigError> {
    let display = path.display().to_string();
    let rendered =
        serde_yaml::to_string(&AppConfig::factory_default()).map_err(|source| ConfigError::Parse {
            path: display.clone(),
            source,
        })?;
    fs::write(path, rendered).map_err(|source| ConfigError::Io {
        path: display,
        source,
    })
}

fn read_optional(key: &str) -> Option<String> {
    match env::var(key) {
        Ok(value) if !value.is_empty() => Some(value),
        _ => None,
    }
}

fn read_optional_bool(key: &str) -> Result<Option<bool>, ConfigError> {
    let Some(value) = read_optional(key) else {
        return Ok(None);
    };
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "on" => Ok(Some(true)),
        "0" | "false" | "off" => Ok(Some(false)),
        _ => Err(ConfigError::Invalid(key.to_string(), value)),
    }
}
