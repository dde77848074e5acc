/// 日志工具模块
///
/// 提供日志初始化和格式化输出的辅助函数
use crate::config::Config;
use crate::orchestrator::RunSummary;
use crate::services::taxonomy::ValidationReport;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// 初始化日志输出
///
/// 默认级别为 info，可通过 `RUST_LOG` 覆盖
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// 记录程序启动信息
pub fn log_startup(config: &Config) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - 批量图片标注模式");
    info!("📁 语料目录: {}", config.corpus_root.display());
    info!("💾 结果文件: {}", config.output_file.display());
    info!("🤖 模型: {} @ {}", config.model_name, config.api_base_url);
    info!("📊 最大并发数: {}", config.max_concurrent_requests);
    info!("🔁 最大尝试次数: {}", config.retry.max_attempts);
    info!("{}", "=".repeat(60));
}

/// 记录语料加载信息
///
/// # 参数
/// - `groups`: 组数量
/// - `images`: 图片总数
pub fn log_groups_loaded(groups: usize, images: usize) {
    info!("✓ 找到 {} 个组，共 {} 张图片", groups, images);
}

/// 记录组内进度，整组处理完时额外输出分隔线
pub fn log_group_progress(group: &str, done: usize, total: usize) {
    if done >= total {
        info!("{}", "─".repeat(60));
        info!("✓ 组 {} 处理完成: {}/{}", group, done, total);
        info!("{}", "─".repeat(60));
    } else {
        info!("📦 组 {} 进度: {}/{}", group, done, total);
    }
}

/// 记录取值校验结果
pub fn log_validation(report: &ValidationReport) {
    if report.is_clean() {
        info!("✓ 取值校验通过，共检查 {} 条记录", report.checked);
        return;
    }

    warn!(
        "⚠️ 取值校验: {} 条记录中有 {} 张图片含非法取值",
        report.checked,
        report.affected_images.len()
    );
    for (aspect, values) in &report.invalid_values {
        let values: Vec<&str> = values.iter().map(String::as_str).collect();
        warn!("  {}: {}", aspect.name(), values.join(", "));
    }
}

/// 打印最终统计信息
pub fn print_final_stats(summary: &RunSummary, config: &Config) {
    info!("\n{}", "=".repeat(60));
    info!("📊 处理统计 ({})", summary.state);
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    info!("✅ 成功: {}/{}", summary.completed, summary.processed());
    info!(
        "❌ 失败: {} (请求 {} / 解析 {} / 读图 {})",
        summary.failed(),
        summary.failed_transport,
        summary.failed_parse,
        summary.failed_input
    );
    info!("⏭ 跳过: {}", summary.skipped);
    if summary.remaining > 0 {
        info!("⏸ 未处理: {}（再次运行将继续）", summary.remaining);
    }
    info!("{}", "=".repeat(60));
    info!(
        "\n结果已保存至: {}（共 {} 条）",
        config.output_file.display(),
        summary.persisted
    );
}

/// 截断长文本用于日志显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大长度
///
/// # 返回
/// 返回截断后的文本
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}
