//! 统一配置中心
//!
//! 提供应用的全局配置管理，包括：
//! - 服务监听地址
//! - 广播通道容量
//! - 附件入库目录
//! - 会话策略（校验上限、限流窗口、通知防抖窗口）
//!
//! 所有策略阈值都是配置而非硬编码，算法只消费这里的数值。

use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;

/// 全局应用配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// 服务配置
    pub server: ServerConfig,
    /// 广播器配置
    pub broadcast: BroadcastConfig,
    /// 附件存储配置
    pub attachments: AttachmentConfig,
    /// 会话策略配置
    pub chat: ChatConfig,
}

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// 广播器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastConfig {
    pub capacity: usize,
}

/// 附件存储配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachmentConfig {
    pub spool_dir: String,
}

/// 会话策略配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    pub validation: ValidationConfig,
    pub rate_limit: RateLimitConfig,
    pub debounce: DebounceConfig,
}

/// 消息校验配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// 正文最大字符数
    pub max_message_len: usize,
}

/// 限流配置（全部是滑动窗口）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// 频率窗口内允许的最大发送条数
    pub max_messages: u32,
    /// 频率窗口长度（秒）
    pub window_secs: u64,
    /// 重复内容判定窗口（秒）
    pub duplicate_window_secs: u64,
    /// 超过该字符数视为长消息
    pub long_message_len: usize,
    /// 长消息窗口内允许的最大条数
    pub max_long_messages: u32,
    /// 长消息窗口长度（秒）
    pub long_window_secs: u64,
}

/// 在线通知防抖配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebounceConfig {
    /// 重复加入抑制窗口（秒）
    pub join_suppress_secs: u64,
    /// 断线重连窗口（秒）
    pub reconnect_secs: u64,
    /// 缓存项过期时间（秒）
    pub expiry_secs: u64,
    /// 清扫定时器间隔（秒）
    pub sweep_interval_secs: u64,
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}

impl AppConfig {
    /// 从环境变量加载配置，未设置的项使用默认值。
    pub fn from_env() -> Self {
        Self {
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
                port: env_or("SERVER_PORT", 8080),
            },
            broadcast: BroadcastConfig {
                capacity: env_or("BROADCAST_CAPACITY", 256),
            },
            attachments: AttachmentConfig {
                spool_dir: env::var("ATTACHMENT_SPOOL_DIR")
                    .unwrap_or_else(|_| "./data/uploads".to_string()),
            },
            chat: ChatConfig {
                validation: ValidationConfig {
                    max_message_len: env_or("CHAT_MAX_MESSAGE_LEN", 2000),
                },
                rate_limit: RateLimitConfig {
                    max_messages: env_or("CHAT_RATE_MAX_MESSAGES", 5),
                    window_secs: env_or("CHAT_RATE_WINDOW_SECS", 10),
                    duplicate_window_secs: env_or("CHAT_DUPLICATE_WINDOW_SECS", 30),
                    long_message_len: env_or("CHAT_LONG_MESSAGE_LEN", 500),
                    max_long_messages: env_or("CHAT_MAX_LONG_MESSAGES", 3),
                    long_window_secs: env_or("CHAT_LONG_WINDOW_SECS", 60),
                },
                debounce: DebounceConfig {
                    join_suppress_secs: env_or("CHAT_JOIN_SUPPRESS_SECS", 30),
                    reconnect_secs: env_or("CHAT_RECONNECT_SECS", 15),
                    expiry_secs: env_or("CHAT_DEBOUNCE_EXPIRY_SECS", 300),
                    sweep_interval_secs: env_or("CHAT_SWEEP_INTERVAL_SECS", 5),
                },
            },
        }
    }

    /// 验证配置有效性
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chat.validation.max_message_len == 0 {
            return Err(ConfigError::InvalidChatConfig(
                "max_message_len must be greater than 0".to_string(),
            ));
        }

        if self.chat.rate_limit.long_message_len >= self.chat.validation.max_message_len {
            return Err(ConfigError::InvalidChatConfig(
                "long_message_len must be below max_message_len".to_string(),
            ));
        }

        if self.chat.rate_limit.max_messages == 0
            || self.chat.rate_limit.window_secs == 0
            || self.chat.rate_limit.duplicate_window_secs == 0
            || self.chat.rate_limit.long_window_secs == 0
        {
            return Err(ConfigError::InvalidChatConfig(
                "rate limit windows and counts must be greater than 0".to_string(),
            ));
        }

        if self.chat.debounce.sweep_interval_secs == 0
            || self.chat.debounce.sweep_interval_secs > self.chat.debounce.reconnect_secs
        {
            return Err(ConfigError::InvalidChatConfig(
                "sweep interval must fit within the reconnect window".to_string(),
            ));
        }

        if self.chat.debounce.expiry_secs < self.chat.debounce.join_suppress_secs
            || self.chat.debounce.expiry_secs < self.chat.debounce.reconnect_secs
        {
            return Err(ConfigError::InvalidChatConfig(
                "debounce expiry must cover the suppress windows".to_string(),
            ));
        }

        if self.broadcast.capacity == 0 {
            return Err(ConfigError::InvalidBroadcastConfig(
                "broadcast capacity must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

/// 配置错误类型
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid chat configuration: {0}")]
    InvalidChatConfig(String),
    #[error("Invalid broadcast configuration: {0}")]
    InvalidBroadcastConfig(String),
    #[error("Invalid server configuration: {0}")]
    InvalidServerConfig(String),
}
