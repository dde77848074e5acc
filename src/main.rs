use anyhow::Result;
use image_annotator::utils::logging;
use image_annotator::{App, Config, RunState};

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志
    logging::init();

    // 加载配置
    let config = Config::load()?;

    // 初始化并运行应用
    let summary = App::initialize(config)?.run().await?;

    if summary.state == RunState::Interrupted {
        std::process::exit(130);
    }
    Ok(())
}
