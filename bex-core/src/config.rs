//! 分层配置
//!
//! 多个配置源按优先级合并，优先级高的配置源覆盖低的：
//!
//! 1. `application.toml`（优先级 0）
//! 2. `application-{profile}.toml`（优先级 10 起递增）
//! 3. 内存配置源（默认 50）
//! 4. `APP_` 前缀的环境变量（优先级 100）

use crate::error::{CoreError, CoreResult};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// 配置值类型
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValue {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Array(Vec<ConfigValue>),
    Object(HashMap<String, ConfigValue>),
}

impl ConfigValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConfigValue::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// 环境变量只能提供字符串，因此数字和布尔值都允许从字符串解析
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ConfigValue::Int(i) => Some(*i),
            ConfigValue::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ConfigValue::Bool(b) => Some(*b),
            ConfigValue::String(s) => match s.trim().to_lowercase().as_str() {
                "true" | "yes" | "1" => Some(true),
                "false" | "no" | "0" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }
}

/// 配置源 trait
pub trait PropertySource: Send + Sync {
    /// 配置源名称（用于日志）
    fn name(&self) -> &str;

    fn get(&self, key: &str) -> Option<ConfigValue>;

    fn keys(&self) -> Vec<String>;

    /// 配置源优先级（数字越大优先级越高）
    fn priority(&self) -> i32 {
        0
    }
}

/// Environment - 配置管理器
///
/// 提供统一的配置访问接口，内部按优先级降序保存所有配置源
pub struct Environment {
    sources: RwLock<Vec<Box<dyn PropertySource>>>,
    active_profiles: RwLock<Vec<String>>,
}

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Environment")
            .field("active_profiles", &*self.active_profiles.read())
            .field("sources_count", &self.sources.read().len())
            .finish()
    }
}

impl Environment {
    pub fn new() -> Self {
        Self {
            sources: RwLock::new(Vec::new()),
            active_profiles: RwLock::new(Vec::new()),
        }
    }

    /// 按约定加载配置
    ///
    /// `config_files` 中存在的文件都会被加载，随后加载每个激活 profile 对应的
    /// `xxx-{profile}.toml`，最后叠加 `env_prefix` 前缀的环境变量。
    /// 没有显式传入 profile 时读取 `{env_prefix}PROFILES_ACTIVE`（逗号分隔）。
    pub fn load(config_files: &[String], env_prefix: &str, profiles: &[String]) -> CoreResult<Self> {
        let env = Self::new();

        let mut active_profiles = profiles.to_vec();
        if active_profiles.is_empty() {
            if let Ok(raw) = std::env::var(format!("{}PROFILES_ACTIVE", env_prefix)) {
                active_profiles = raw
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect();
            }
        }

        for file in config_files {
            env.try_load_file(file, 0)?;
        }

        for (index, profile) in active_profiles.iter().enumerate() {
            for file in config_files {
                env.try_load_file(&profile_config_path(file, profile), 10 + index as i32)?;
            }
        }

        env.add_property_source(Box::new(EnvironmentPropertySource::new(env_prefix)));

        if !active_profiles.is_empty() {
            tracing::info!(profiles = ?active_profiles, "Active profiles");
        }
        env.set_active_profiles(active_profiles);

        Ok(env)
    }

    fn try_load_file(&self, file: &str, priority: i32) -> CoreResult<()> {
        if !Path::new(file).exists() {
            tracing::debug!(file = %file, "Configuration file not found");
            return Ok(());
        }

        let source = TomlPropertySource::from_file(file)?.with_priority(priority);
        tracing::info!(file = %file, priority, "Loaded configuration");
        self.add_property_source(Box::new(source));
        Ok(())
    }

    pub fn add_property_source(&self, source: Box<dyn PropertySource>) {
        let mut sources = self.sources.write();
        sources.push(source);
        sources.sort_by(|a, b| b.priority().cmp(&a.priority()));
    }

    pub fn get(&self, key: &str) -> Option<ConfigValue> {
        let sources = self.sources.read();
        for source in sources.iter() {
            if let Some(value) = source.get(key) {
                tracing::trace!(key, source = source.name(), "Config resolved");
                return Some(value);
            }
        }
        None
    }

    pub fn get_string(&self, key: &str) -> Option<String> {
        self.get(key).and_then(|v| v.as_str().map(String::from))
    }

    pub fn get_string_or(&self, key: &str, default: &str) -> String {
        self.get_string(key).unwrap_or_else(|| default.to_string())
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(|v| v.as_i64())
    }

    pub fn get_i64_or(&self, key: &str, default: i64) -> i64 {
        self.get_i64(key).unwrap_or(default)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(|v| v.as_bool())
    }

    pub fn get_bool_or(&self, key: &str, default: bool) -> bool {
        self.get_bool(key).unwrap_or(default)
    }

    pub fn set_active_profiles(&self, profiles: Vec<String>) {
        *self.active_profiles.write() = profiles;
    }

    pub fn active_profiles(&self) -> Vec<String> {
        self.active_profiles.read().clone()
    }

    pub fn accepts_profile(&self, profile: &str) -> bool {
        self.active_profiles.read().iter().any(|p| p == profile)
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

/// `application.toml` -> `application-dev.toml`
fn profile_config_path(base_path: &str, profile: &str) -> String {
    match base_path.rfind('.') {
        Some(dot_pos) => {
            let (name, ext) = base_path.split_at(dot_pos);
            format!("{}-{}{}", name, profile, ext)
        }
        None => format!("{}-{}", base_path, profile),
    }
}

// ========== Property Sources ==========

/// 环境变量配置源
///
/// `bex.body-limit` 对应 `APP_BEX_BODY_LIMIT`
pub struct EnvironmentPropertySource {
    prefix: String,
    priority: i32,
}

impl EnvironmentPropertySource {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            priority: 100,
        }
    }

    fn key_to_env(&self, key: &str) -> String {
        format!(
            "{}{}",
            self.prefix,
            key.replace(['.', '-'], "_").to_uppercase()
        )
    }

    fn env_to_key(&self, env_key: &str) -> String {
        env_key
            .strip_prefix(&self.prefix)
            .unwrap_or(env_key)
            .to_lowercase()
            .replace('_', ".")
    }
}

impl PropertySource for EnvironmentPropertySource {
    fn name(&self) -> &str {
        "environment"
    }

    fn get(&self, key: &str) -> Option<ConfigValue> {
        std::env::var(self.key_to_env(key))
            .ok()
            .map(ConfigValue::String)
    }

    fn keys(&self) -> Vec<String> {
        std::env::vars()
            .filter(|(k, _)| k.starts_with(&self.prefix))
            .map(|(k, _)| self.env_to_key(&k))
            .collect()
    }

    fn priority(&self) -> i32 {
        self.priority
    }
}

/// TOML 文件配置源
///
/// 嵌套表被展平为点分隔的键：`[server] port = 80` -> `server.port`
pub struct TomlPropertySource {
    name: String,
    properties: HashMap<String, ConfigValue>,
    priority: i32,
}

impl TomlPropertySource {
    pub fn from_file(path: impl AsRef<Path>) -> CoreResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| CoreError::Config(format!("Failed to read {:?}: {}", path, e)))?;

        Self::parse(&content, path.to_string_lossy().to_string())
    }

    pub fn parse(content: &str, name: impl Into<String>) -> CoreResult<Self> {
        let value: toml::Value = toml::from_str(content)
            .map_err(|e| CoreError::Config(format!("Failed to parse TOML: {}", e)))?;

        let mut properties = HashMap::new();
        flatten_toml(&value, String::new(), &mut properties);

        Ok(Self {
            name: name.into(),
            properties,
            priority: 0,
        })
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

fn flatten_toml(value: &toml::Value, prefix: String, result: &mut HashMap<String, ConfigValue>) {
    match value {
        toml::Value::Table(table) => {
            for (key, val) in table {
                let nested = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{}.{}", prefix, key)
                };
                flatten_toml(val, nested, result);
            }
        }
        other => {
            result.insert(prefix, toml_to_config(other));
        }
    }
}

fn toml_to_config(value: &toml::Value) -> ConfigValue {
    match value {
        toml::Value::String(s) => ConfigValue::String(s.clone()),
        toml::Value::Integer(i) => ConfigValue::Int(*i),
        toml::Value::Float(f) => ConfigValue::Float(*f),
        toml::Value::Boolean(b) => ConfigValue::Bool(*b),
        toml::Value::Array(arr) => ConfigValue::Array(arr.iter().map(toml_to_config).collect()),
        toml::Value::Table(table) => ConfigValue::Object(
            table
                .iter()
                .map(|(k, v)| (k.clone(), toml_to_config(v)))
                .collect(),
        ),
        toml::Value::Datetime(dt) => ConfigValue::String(dt.to_string()),
    }
}

impl PropertySource for TomlPropertySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn get(&self, key: &str) -> Option<ConfigValue> {
        self.properties.get(key).cloned()
    }

    fn keys(&self) -> Vec<String> {
        self.properties.keys().cloned().collect()
    }

    fn priority(&self) -> i32 {
        self.priority
    }
}

/// 内存配置源（用于测试或运行时配置）
pub struct MapPropertySource {
    name: String,
    properties: HashMap<String, ConfigValue>,
    priority: i32,
}

impl MapPropertySource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            properties: HashMap::new(),
            priority: 50,
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: ConfigValue) -> Self {
        self.properties.insert(key.into(), value);
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

impl PropertySource for MapPropertySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn get(&self, key: &str) -> Option<ConfigValue> {
        self.properties.get(key).cloned()
    }

    fn keys(&self) -> Vec<String> {
        self.properties.keys().cloned().collect()
    }

    fn priority(&self) -> i32 {
        self.priority
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toml_source_flattens_tables() {
        let source = TomlPropertySource::parse(
            r#"
            [server]
            port = 9090
            host = "127.0.0.1"

            [bex]
            trust-proxy = false
            "#,
            "inline",
        )
        .unwrap();

        assert_eq!(source.get("server.port"), Some(ConfigValue::Int(9090)));
        assert_eq!(
            source.get("server.host"),
            Some(ConfigValue::String("127.0.0.1".to_string()))
        );
        assert_eq!(source.get("bex.trust-proxy"), Some(ConfigValue::Bool(false)));
    }

    #[test]
    fn test_higher_priority_source_wins() {
        let env = Environment::new();
        env.add_property_source(Box::new(
            MapPropertySource::new("low")
                .with_property("server.port", ConfigValue::Int(80))
                .with_priority(0),
        ));
        env.add_property_source(Box::new(
            MapPropertySource::new("high")
                .with_property("server.port", ConfigValue::String("8081".to_string()))
                .with_priority(10),
        ));

        assert_eq!(env.get_i64("server.port"), Some(8081));
        assert_eq!(env.get_i64_or("server.missing", 7), 7);
    }

    #[test]
    fn test_string_values_coerce_to_bool() {
        assert_eq!(ConfigValue::String("yes".into()).as_bool(), Some(true));
        assert_eq!(ConfigValue::String("0".into()).as_bool(), Some(false));
        assert_eq!(ConfigValue::String("maybe".into()).as_bool(), None);
    }

    #[test]
    fn test_profile_config_path() {
        assert_eq!(profile_config_path("application.toml", "dev"), "application-dev.toml");
        assert_eq!(profile_config_path("settings", "prod"), "settings-prod");
    }

    #[test]
    fn test_env_key_mapping() {
        let source = EnvironmentPropertySource::new("APP_");
        assert_eq!(source.key_to_env("bex.body-limit"), "APP_BEX_BODY_LIMIT");
        assert_eq!(source.env_to_key("APP_SERVER_PORT"), "server.port");
    }

    #[test]
    fn test_load_skips_missing_files() {
        let env = Environment::load(
            &["definitely-missing-bex-config.toml".to_string()],
            "BEX_CONFIG_TEST_",
            &["test".to_string()],
        )
        .unwrap();

        assert!(env.accepts_profile("test"));
        assert_eq!(env.get_string("server.host"), None);
    }
}
