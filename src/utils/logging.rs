/// 日志工具模块
///
/// 提供日志初始化和输出的辅助函数
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::models::GradingReport;

/// 初始化 tracing 日志
///
/// 优先使用 `RUST_LOG`，否则按 `verbose` 选择 debug 或 info 级别。
/// 重复调用是安全的（测试中常见）。
pub fn init(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// 记录程序启动信息
///
/// 不输出任何凭据
pub fn log_startup(config: &Config) {
    info!("{}", "=".repeat(60));
    info!(
        "🚀 试卷批改服务启动 - {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("🔌 当前提供方: {}", config.provider);
    info!(
        "⏱️ 单次调用截止时间: {} 秒, 回退模式: {:?}",
        config.attempt_timeout_secs, config.fallback_mode
    );
    info!("{}", "=".repeat(60));
}

/// 打印批改结果摘要
pub fn log_grading_summary(report: &GradingReport) {
    info!("\n{}", "─".repeat(60));
    info!("📊 批改完成 (模型: {})", report.model);
    info!(
        "✅ 得分: {}/{}，共 {} 页 {} 题",
        report.result.total_score,
        report.result.total_max_score,
        report.result.pages.len(),
        report.result.question_count()
    );
    if !report.failed_attempts.is_empty() {
        info!("🔁 成功前失败 {} 次", report.failed_attempts.len());
    }
    for issue in &report.issues {
        warn!("⚠️ {}", issue);
    }
    info!("{}", "─".repeat(60));
}

/// 截断长文本用于日志显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大字符数
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_text_counts_chars() {
        assert_eq!(truncate_text("批改结果", 2), "批改...");
        assert_eq!(truncate_text("short", 10), "short");
    }
}
