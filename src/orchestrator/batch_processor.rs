//! 批量图片处理器 - 编排层
//!
//! ## 职责
//!
//! 本模块是整个应用的入口，负责一次批次运行的完整生命周期。
//!
//! ## 核心功能
//!
//! 1. **应用初始化**：读取提示词、创建 HTTP 传输、加载已有结果
//! 2. **语料加载**：按确定顺序列出所有组和图片
//! 3. **批次处理**：委托 `Pipeline` 并发处理并逐张落盘
//! 4. **收尾**：批次完整结束后做取值校验，按需输出规范化结果
//! 5. **全局统计**：汇总本次运行的结果
//!
//! ## 设计特点
//!
//! - **顶层编排**：不处理单张图片的细节
//! - **资源所有者**：唯一持有 `ResultStore` 和 `HttpTransport` 的模块

use crate::config::Config;
use crate::error::AppResult;
use crate::infrastructure::HttpTransport;
use crate::models::WorkGroup;
use crate::orchestrator::pipeline::{Pipeline, RunState, RunSummary};
use crate::orchestrator::shutdown::{listen_for_signals, Shutdown};
use crate::services::{taxonomy, CorpusWalker, RequestClient, ResultStore};
use crate::utils::logging::{log_groups_loaded, log_startup, log_validation, print_final_stats};
use crate::workflow::{load_instruction, ImageFlow};
use tracing::{info, warn};

/// 应用主结构
pub struct App {
    config: Config,
    pipeline: Pipeline<HttpTransport>,
    store: ResultStore,
}

impl App {
    /// 初始化应用
    pub fn initialize(config: Config) -> AppResult<Self> {
        log_startup(&config);

        let instruction = load_instruction(&config)?;
        let transport = HttpTransport::new(&config)?;
        let client = RequestClient::new(transport, config.retry.clone());
        let pipeline = Pipeline::new(
            ImageFlow::new(client, instruction),
            config.max_concurrent_requests,
            config.reprocess.clone(),
        );

        let store = ResultStore::load(&config.output_file)?;
        info!(
            "💾 已加载结果文件: {} 条（成功 {} 条）",
            store.len(),
            store.success_count()
        );

        Ok(Self {
            config,
            pipeline,
            store,
        })
    }

    /// 运行应用主逻辑，Ctrl-C / SIGTERM 时提前结束
    pub async fn run(&mut self) -> AppResult<RunSummary> {
        let shutdown = listen_for_signals();
        self.run_until(&shutdown).await
    }

    /// 运行应用主逻辑，直到处理完毕或 `shutdown` 触发
    pub async fn run_until(&mut self, shutdown: &Shutdown) -> AppResult<RunSummary> {
        let groups = self.load_groups()?;

        let summary = self.pipeline.run(&groups, &mut self.store, shutdown).await?;

        if summary.state == RunState::Finished {
            self.finish()?;
        } else {
            warn!("⏸ 批次被中断，跳过取值校验；再次运行将从断点继续");
        }

        print_final_stats(&summary, &self.config);
        Ok(summary)
    }

    /// 加载语料
    fn load_groups(&self) -> AppResult<Vec<WorkGroup>> {
        info!("\n📁 正在扫描语料目录...");
        let walker = CorpusWalker::new(
            &self.config.corpus_root,
            &self.config.image_extensions,
            self.config.recursive,
        );
        let groups = walker.enumerate()?;

        let images: usize = groups.iter().map(WorkGroup::len).sum();
        if images == 0 {
            warn!("⚠️ 没有找到任何图片");
        }
        log_groups_loaded(groups.len(), images);
        Ok(groups)
    }

    /// 批次完整结束后的校验与规范化
    fn finish(&self) -> AppResult<()> {
        log_validation(&taxonomy::validate(&self.store));

        if let Some(path) = &self.config.normalized_output_file {
            let mut normalized = ResultStore::load(self.store.path())?;
            let changed = taxonomy::normalize_store(&mut normalized);
            normalized.write_to(path)?;
            info!(
                "🧹 规范化结果已写入 {}（修改 {} 个字段）",
                path.display(),
                changed
            );
        }
        Ok(())
    }

    pub fn store(&self) -> &ResultStore {
        &self.store
    }
}
