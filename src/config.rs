use crate::error::ConfigError;
use rand::Rng;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// 默认配置文件名（位于工作目录）
pub const DEFAULT_CONFIG_FILE: &str = "annotate.toml";

/// 程序配置
#[derive(Clone, Debug)]
pub struct Config {
    /// 语料根目录（每个子目录是一个组）
    pub corpus_root: PathBuf,
    /// 结果文件
    pub output_file: PathBuf,
    /// 规范化结果输出文件（可选）
    pub normalized_output_file: Option<PathBuf>,
    /// 是否递归遍历组目录下的子目录
    pub recursive: bool,
    /// 识别为图片的扩展名（不区分大小写）
    pub image_extensions: Vec<String>,
    /// 同时进行的请求数量
    pub max_concurrent_requests: usize,
    // --- LLM 配置 ---
    pub api_key: String,
    pub api_base_url: String,
    pub model_name: String,
    pub max_tokens: u32,
    /// 自定义提示词文件，不设置则使用内置提示词
    pub prompt_file: Option<PathBuf>,
    // --- 重试与重跑策略 ---
    pub retry: RetryPolicy,
    pub reprocess: ReprocessPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            corpus_root: PathBuf::from("imgs_downsample"),
            output_file: PathBuf::from("results_clean.json"),
            normalized_output_file: None,
            recursive: false,
            image_extensions: vec!["jpg".to_string(), "jpeg".to_string(), "png".to_string()],
            max_concurrent_requests: 1,
            api_key: String::new(),
            api_base_url: "http://127.0.0.1:3000/v1/chat/completions".to_string(),
            model_name: "gpt-4o".to_string(),
            max_tokens: 450,
            prompt_file: None,
            retry: RetryPolicy::default(),
            reprocess: ReprocessPolicy::default(),
        }
    }
}

/// 请求重试策略
///
/// 第 n 次失败后的等待时间为 `initial_delay * 2^n + jitter`，
/// 其中 jitter 取自 `[0, max_jitter]` 的均匀分布。
#[derive(Clone, Debug, PartialEq)]
pub struct RetryPolicy {
    /// 最大尝试次数（包含第一次）
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_jitter: Duration,
    /// 单次请求超时
    pub request_timeout: Duration,
    /// 成功处理一张图片后的随机等待区间
    pub inter_item_delay_min: Duration,
    pub inter_item_delay_max: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            initial_delay: Duration::from_secs(5),
            max_jitter: Duration::from_secs(3),
            request_timeout: Duration::from_secs(30),
            inter_item_delay_min: Duration::from_millis(500),
            inter_item_delay_max: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// 不等待的策略，测试用
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::ZERO,
            max_jitter: Duration::ZERO,
            request_timeout: Duration::from_secs(5),
            inter_item_delay_min: Duration::ZERO,
            inter_item_delay_max: Duration::ZERO,
        }
    }

    /// 第 `failures` 次失败后的基础等待时间（不含抖动）
    pub fn base_delay(&self, failures: u32) -> Duration {
        let factor = 1u32.checked_shl(failures.min(31)).unwrap_or(u32::MAX);
        self.initial_delay
            .checked_mul(factor)
            .unwrap_or(Duration::MAX)
    }

    /// 基础等待时间加上给定抖动
    pub fn backoff_delay(&self, failures: u32, jitter: Duration) -> Duration {
        self.base_delay(failures)
            .saturating_add(jitter.min(self.max_jitter))
    }

    /// 随机抽取抖动并计算等待时间
    pub fn next_backoff(&self, failures: u32) -> Duration {
        let jitter = random_between(Duration::ZERO, self.max_jitter);
        self.backoff_delay(failures, jitter)
    }

    /// 随机抽取图片间隔
    pub fn next_inter_item_delay(&self) -> Duration {
        random_between(self.inter_item_delay_min, self.inter_item_delay_max)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::Invalid("max_attempts 必须大于 0".to_string()));
        }
        if self.inter_item_delay_min > self.inter_item_delay_max {
            return Err(ConfigError::Invalid(
                "inter_item_delay_min 不能大于 inter_item_delay_max".to_string(),
            ));
        }
        Ok(())
    }
}

fn random_between(min: Duration, max: Duration) -> Duration {
    if max <= min {
        return min;
    }
    let secs = rand::rng().random_range(min.as_secs_f64()..=max.as_secs_f64());
    Duration::from_secs_f64(secs)
}

/// 重跑策略：下一次运行时，哪些已记录的失败需要重新请求
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReprocessPolicy {
    pub retry_transport_failures: bool,
    pub retry_parse_failures: bool,
    pub retry_input_failures: bool,
}

impl Default for ReprocessPolicy {
    fn default() -> Self {
        Self {
            retry_transport_failures: true,
            retry_parse_failures: true,
            retry_input_failures: true,
        }
    }
}

// ========== TOML 配置文件 ==========

/// 配置文件结构，所有字段可选
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    corpus_root: Option<PathBuf>,
    output_file: Option<PathBuf>,
    normalized_output_file: Option<PathBuf>,
    recursive: Option<bool>,
    image_extensions: Option<Vec<String>>,
    max_concurrent_requests: Option<usize>,
    api_key: Option<String>,
    api_base_url: Option<String>,
    model_name: Option<String>,
    max_tokens: Option<u32>,
    prompt_file: Option<PathBuf>,
    retry: FileRetry,
    reprocess: FileReprocess,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileRetry {
    max_attempts: Option<u32>,
    initial_delay_secs: Option<f64>,
    max_jitter_secs: Option<f64>,
    request_timeout_secs: Option<f64>,
    inter_item_delay_min_secs: Option<f64>,
    inter_item_delay_max_secs: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileReprocess {
    retry_transport_failures: Option<bool>,
    retry_parse_failures: Option<bool>,
    retry_input_failures: Option<bool>,
}

impl Config {
    /// 加载配置：默认值 <- TOML 文件 <- 环境变量
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        let explicit = std::env::var("ANNOTATE_CONFIG").ok().map(PathBuf::from);
        let file = explicit.or_else(|| {
            let default = PathBuf::from(DEFAULT_CONFIG_FILE);
            default.exists().then_some(default)
        });
        if let Some(path) = file {
            config = config.merge_file(&path)?;
        }

        config = config.merge_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// 只从环境变量加载（不读取配置文件）
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Self::default().merge_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// 合并 TOML 配置文件
    pub fn merge_file(self, path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        self.merge_toml(&content, path)
    }

    fn merge_toml(mut self, content: &str, path: &Path) -> Result<Self, ConfigError> {
        let file: FileConfig = toml::from_str(content).map_err(|source| ConfigError::TomlParse {
            path: path.to_path_buf(),
            source,
        })?;

        if let Some(v) = file.corpus_root {
            self.corpus_root = v;
        }
        if let Some(v) = file.output_file {
            self.output_file = v;
        }
        if file.normalized_output_file.is_some() {
            self.normalized_output_file = file.normalized_output_file;
        }
        if let Some(v) = file.recursive {
            self.recursive = v;
        }
        if let Some(v) = file.image_extensions {
            self.image_extensions = v;
        }
        if let Some(v) = file.max_concurrent_requests {
            self.max_concurrent_requests = v;
        }
        if let Some(v) = file.api_key {
            self.api_key = v;
        }
        if let Some(v) = file.api_base_url {
            self.api_base_url = v;
        }
        if let Some(v) = file.model_name {
            self.model_name = v;
        }
        if let Some(v) = file.max_tokens {
            self.max_tokens = v;
        }
        if file.prompt_file.is_some() {
            self.prompt_file = file.prompt_file;
        }

        let retry = file.retry;
        if let Some(v) = retry.max_attempts {
            self.retry.max_attempts = v;
        }
        apply_secs(&mut self.retry.initial_delay, retry.initial_delay_secs, "initial_delay_secs")?;
        apply_secs(&mut self.retry.max_jitter, retry.max_jitter_secs, "max_jitter_secs")?;
        apply_secs(&mut self.retry.request_timeout, retry.request_timeout_secs, "request_timeout_secs")?;
        apply_secs(
            &mut self.retry.inter_item_delay_min,
            retry.inter_item_delay_min_secs,
            "inter_item_delay_min_secs",
        )?;
        apply_secs(
            &mut self.retry.inter_item_delay_max,
            retry.inter_item_delay_max_secs,
            "inter_item_delay_max_secs",
        )?;

        let reprocess = file.reprocess;
        if let Some(v) = reprocess.retry_transport_failures {
            self.reprocess.retry_transport_failures = v;
        }
        if let Some(v) = reprocess.retry_parse_failures {
            self.reprocess.retry_parse_failures = v;
        }
        if let Some(v) = reprocess.retry_input_failures {
            self.reprocess.retry_input_failures = v;
        }

        Ok(self)
    }

    /// 合并环境变量，`lookup` 便于测试注入
    pub fn merge_env<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("CORPUS_ROOT") {
            self.corpus_root = PathBuf::from(v);
        }
        if let Some(v) = lookup("OUTPUT_FILE") {
            self.output_file = PathBuf::from(v);
        }
        if let Some(v) = lookup("NORMALIZED_OUTPUT_FILE") {
            self.normalized_output_file = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("PROMPT_FILE") {
            self.prompt_file = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("LLM_API_KEY") {
            self.api_key = v;
        }
        if let Some(v) = lookup("LLM_API_BASE_URL") {
            self.api_base_url = v;
        }
        if let Some(v) = lookup("LLM_MODEL_NAME") {
            self.model_name = v;
        }
        env_parse(&lookup, "LLM_MAX_TOKENS", &mut self.max_tokens, "u32")?;
        env_parse(&lookup, "RECURSIVE", &mut self.recursive, "bool")?;
        env_parse(
            &lookup,
            "MAX_CONCURRENT_REQUESTS",
            &mut self.max_concurrent_requests,
            "usize",
        )?;
        env_parse(&lookup, "MAX_RETRIES", &mut self.retry.max_attempts, "u32")?;
        env_secs(&lookup, "INITIAL_DELAY_SECS", &mut self.retry.initial_delay)?;
        env_secs(&lookup, "MAX_JITTER_SECS", &mut self.retry.max_jitter)?;
        env_secs(&lookup, "REQUEST_TIMEOUT_SECS", &mut self.retry.request_timeout)?;
        env_secs(
            &lookup,
            "INTER_ITEM_DELAY_MIN_SECS",
            &mut self.retry.inter_item_delay_min,
        )?;
        env_secs(
            &lookup,
            "INTER_ITEM_DELAY_MAX_SECS",
            &mut self.retry.inter_item_delay_max,
        )?;
        env_parse(
            &lookup,
            "RETRY_TRANSPORT_FAILURES",
            &mut self.reprocess.retry_transport_failures,
            "bool",
        )?;
        env_parse(
            &lookup,
            "RETRY_PARSE_FAILURES",
            &mut self.reprocess.retry_parse_failures,
            "bool",
        )?;
        Ok(self)
    }

    /// 检查配置是否合法
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent_requests == 0 {
            return Err(ConfigError::Invalid(
                "max_concurrent_requests 必须大于 0".to_string(),
            ));
        }
        if self.image_extensions.is_empty() {
            return Err(ConfigError::Invalid("image_extensions 不能为空".to_string()));
        }
        self.retry.validate()
    }
}

fn env_parse<F, T>(lookup: &F, var_name: &str, target: &mut T, expected_type: &str) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    if let Some(value) = lookup(var_name) {
        *target = value
            .trim()
            .parse()
            .map_err(|_| ConfigError::EnvVarParseFailed {
                var_name: var_name.to_string(),
                value: value.clone(),
                expected_type: expected_type.to_string(),
            })?;
    }
    Ok(())
}

fn env_secs<F>(lookup: &F, var_name: &str, target: &mut Duration) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut secs: Option<f64> = None;
    if let Some(value) = lookup(var_name) {
        let parsed: f64 = value
            .trim()
            .parse()
            .map_err(|_| ConfigError::EnvVarParseFailed {
                var_name: var_name.to_string(),
                value: value.clone(),
                expected_type: "秒数 (f64)".to_string(),
            })?;
        secs = Some(parsed);
    }
    apply_secs(target, secs, var_name)
}

fn apply_secs(target: &mut Duration, secs: Option<f64>, name: &str) -> Result<(), ConfigError> {
    if let Some(secs) = secs {
        *target = Duration::try_from_secs_f64(secs)
            .map_err(|_| ConfigError::Invalid(format!("{} 必须是非负秒数，实际为 {}", name, secs)))?;
    }
    Ok(())
}
