use anyhow::{bail, Context, Result};
use tracing::{error, info};

use exam_grader::utils::logging;
use exam_grader::{Config, GradingOrchestrator, RawImage};

const USAGE: &str = "用法: exam-grader <满分> <图片路径>...";

#[tokio::main]
async fn main() -> Result<()> {
    // 加载配置
    let config = Config::from_env();

    // 初始化日志
    logging::init(config.verbose_logging);
    logging::log_startup(&config);

    let mut args = std::env::args().skip(1);
    let total_max_score: f64 = args
        .next()
        .context(USAGE)?
        .parse()
        .context("满分必须是数字")?;
    let paths: Vec<String> = args.collect();
    if paths.is_empty() {
        bail!(USAGE);
    }

    let mut images = Vec::with_capacity(paths.len());
    for path in &paths {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("无法读取图片: {}", path))?;
        images.push(RawImage::new(path.as_str(), bytes));
    }

    let orchestrator = GradingOrchestrator::new(&config)?;

    let report = tokio::select! {
        report = orchestrator.grade_exam(&images, total_max_score) => report,
        _ = tokio::signal::ctrl_c() => {
            orchestrator.cancel_all();
            bail!("已手动中断");
        }
    };

    match report {
        Ok(report) => {
            println!("{}", serde_json::to_string_pretty(&report.result)?);
            info!("✅ 完成");
            Ok(())
        }
        Err(e) => {
            error!("❌ 批改失败: {}", e);
            Err(e.into())
        }
    }
}
