//! 错误类型
//!
//! 按"是否致命"划分：
//! - 致命：`EnumerationError`（语料不可读）、`StoreError`（结果文件无法持久化）、`ConfigError`
//! - 单张图片级别：`TransportError`（可重试）、`ParseError`（不重试，直接记录）

use std::path::PathBuf;
use thiserror::Error;

/// 应用程序错误类型（只包含会中止整个批次的错误）
#[derive(Debug, Error)]
pub enum AppError {
    /// 语料枚举失败
    #[error("语料枚举失败: {0}")]
    Enumeration(#[from] EnumerationError),
    /// 结果存储失败
    #[error("结果存储失败: {0}")]
    Store(#[from] StoreError),
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
    /// HTTP 客户端创建失败
    #[error("HTTP 客户端创建失败: {0}")]
    Client(#[from] TransportError),
}

/// 语料目录枚举错误
#[derive(Debug, Error)]
pub enum EnumerationError {
    /// 根目录不存在
    #[error("目录不存在: {}", path.display())]
    RootNotFound { path: PathBuf },
    /// 根路径不是目录
    #[error("不是目录: {}", path.display())]
    NotADirectory { path: PathBuf },
    /// 读取目录失败
    #[error("无法读取目录 {}: {source}", path.display())]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// 递归遍历失败
    #[error("遍历目录失败: {0}")]
    Walk(#[from] walkdir::Error),
}

/// 请求传输错误（网络 / 超时 / 响应结构不符），可重试
#[derive(Debug, Error)]
pub enum TransportError {
    /// 网络请求失败
    #[error("请求失败: {0}")]
    Request(String),
    /// 请求超时
    #[error("请求超时: {0}")]
    Timeout(String),
    /// 非 2xx 状态码
    #[error("服务端返回状态码 {status}: {body}")]
    Status { status: u16, body: String },
    /// 响应体不是预期的 JSON 结构
    #[error("响应格式错误: {0}")]
    MalformedEnvelope(String),
    /// choices 为空或 content 缺失
    #[error("响应中没有内容")]
    EmptyContent,
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout(err.to_string())
        } else {
            TransportError::Request(err.to_string())
        }
    }
}

/// 响应解析错误，不重试
#[derive(Debug, Error)]
pub enum ParseError {
    /// 找不到 ```json 代码块
    #[error("响应中未找到 json 代码块")]
    MissingBlock,
    /// JSON 解析失败
    #[error("JSON 解析失败: {0}")]
    InvalidJson(#[from] serde_json::Error),
    /// 代码块顶层不是对象
    #[error("JSON 顶层不是对象")]
    NotAnObject,
    /// 没有任何可识别的群体键
    #[error("JSON 中没有可识别的群体")]
    NoSubgroups,
}

/// 结果文件读写错误（致命）
#[derive(Debug, Error)]
pub enum StoreError {
    /// 读取失败
    #[error("读取结果文件失败 ({}): {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// 解析失败
    #[error("结果文件不是合法 JSON ({}): {source}", path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    /// 写入失败
    #[error("写入结果文件失败 ({}): {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// 原子替换失败
    #[error("替换结果文件失败 ({}): {source}", path.display())]
    Persist {
        path: PathBuf,
        #[source]
        source: tempfile::PersistError,
    },
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 环境变量解析失败
    #[error("环境变量 {var_name} 解析失败: 值 '{value}' 无法转换为 {expected_type}")]
    EnvVarParseFailed {
        var_name: String,
        value: String,
        expected_type: String,
    },
    /// 配置文件读取失败
    #[error("读取配置文件失败 ({}): {source}", path.display())]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// TOML 解析失败
    #[error("TOML解析失败 ({}): {source}", path.display())]
    TomlParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    /// 配置值不合法
    #[error("配置值不合法: {0}")]
    Invalid(String),
}

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;
