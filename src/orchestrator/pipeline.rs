//! 批次流水线 - 编排层
//!
//! ## 职责
//!
//! 1. 过滤出需要处理的图片（已成功的永远跳过）
//! 2. 以 `max_concurrent` 个 worker 并发处理
//! 3. 每张图片的结果写入存储并立即落盘，然后才记为完成
//! 4. 响应停止信号：不再领取新图片，放弃进行中的请求
//!
//! ## 落盘顺序
//!
//! 所有写入都经过同一把锁，`put` 与 `flush` 在锁内完成，
//! 因此结果文件在任意时刻都是某个完整快照。落盘失败会中止整个批次。

use crate::config::ReprocessPolicy;
use crate::error::StoreError;
use crate::models::{ErrorKind, StoredEntry, WorkGroup, WorkItem};
use crate::orchestrator::shutdown::Shutdown;
use crate::services::{pending_items, ResultStore, Transport};
use crate::utils::logging::log_group_progress;
use crate::workflow::{ImageCtx, ImageFlow, ItemState};
use std::collections::{HashMap, VecDeque};
use std::fmt::Display;
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// 批次状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Running,
    /// 所有待处理图片都已落盘
    Finished,
    /// 收到停止信号，仍有图片未处理
    Interrupted,
}

impl Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunState::Running => f.write_str("运行中"),
            RunState::Finished => f.write_str("已完成"),
            RunState::Interrupted => f.write_str("已中断"),
        }
    }
}

/// 批次统计
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub state: RunState,
    /// 本次成功标注的图片
    pub completed: usize,
    pub failed_transport: usize,
    pub failed_parse: usize,
    pub failed_input: usize,
    /// 之前已有结果而跳过的图片
    pub skipped: usize,
    /// 本次未处理的图片（中断时大于 0）
    pub remaining: usize,
    /// 结果文件中的条目总数
    pub persisted: usize,
}

impl RunSummary {
    fn new(skipped: usize, remaining: usize) -> Self {
        Self {
            state: RunState::Running,
            completed: 0,
            failed_transport: 0,
            failed_parse: 0,
            failed_input: 0,
            skipped,
            remaining,
            persisted: 0,
        }
    }

    pub fn failed(&self) -> usize {
        self.failed_transport + self.failed_parse + self.failed_input
    }

    pub fn processed(&self) -> usize {
        self.completed + self.failed()
    }

    fn count(&mut self, state: ItemState) {
        match state {
            ItemState::Completed => self.completed += 1,
            ItemState::Failed(ErrorKind::Transport) => self.failed_transport += 1,
            ItemState::Failed(ErrorKind::Parse) => self.failed_parse += 1,
            ItemState::Failed(ErrorKind::Input) => self.failed_input += 1,
            ItemState::Pending | ItemState::InFlight => return,
        }
        self.remaining = self.remaining.saturating_sub(1);
    }
}

/// 所有 worker 共享、需要互斥修改的状态
struct Progress<'s> {
    store: &'s mut ResultStore,
    summary: RunSummary,
    /// 组名 → (已处理, 待处理)
    groups: HashMap<String, (usize, usize)>,
}

impl Progress<'_> {
    /// 写入并落盘一张图片的结果
    fn record(&mut self, item: &WorkItem, ctx: &ImageCtx, entry: StoredEntry) -> Result<(), StoreError> {
        let state = ItemState::of(&entry);
        self.store.put(item.id(), entry);
        self.store.flush()?;

        self.summary.count(state);
        debug!("{} 状态: {} -> {}", ctx, ItemState::InFlight, state);

        if let Some((done, total)) = self.groups.get_mut(&item.group) {
            *done += 1;
            log_group_progress(&item.group, *done, *total);
        }
        Ok(())
    }
}

/// 批次流水线
pub struct Pipeline<T> {
    flow: ImageFlow<T>,
    max_concurrent: usize,
    reprocess: ReprocessPolicy,
}

impl<T: Transport> Pipeline<T> {
    pub fn new(flow: ImageFlow<T>, max_concurrent: usize, reprocess: ReprocessPolicy) -> Self {
        Self {
            flow,
            max_concurrent: max_concurrent.max(1),
            reprocess,
        }
    }

    /// 处理所有组中需要处理的图片
    ///
    /// # 返回
    /// 批次统计；只有结果文件无法落盘时返回错误
    pub async fn run(
        &self,
        groups: &[WorkGroup],
        store: &mut ResultStore,
        shutdown: &Shutdown,
    ) -> Result<RunSummary, StoreError> {
        let total_items: usize = groups.iter().map(WorkGroup::len).sum();

        let pending = pending_items(groups, store, &self.reprocess);
        let mut group_progress: HashMap<String, (usize, usize)> = HashMap::new();
        for item in &pending {
            group_progress.entry(item.group.clone()).or_default().1 += 1;
        }

        let pending_total = pending.len();
        let skipped = total_items - pending_total;
        info!(
            "📋 共 {} 张图片，已有结果跳过 {} 张，本次处理 {} 张",
            total_items, skipped, pending_total
        );

        let queue: Mutex<VecDeque<(ImageCtx, &WorkItem)>> = Mutex::new(
            pending
                .into_iter()
                .enumerate()
                .map(|(i, item)| {
                    (ImageCtx::new(&item.group, i + 1, pending_total, &item.file_name), item)
                })
                .collect(),
        );
        let progress = Mutex::new(Progress {
            store,
            summary: RunSummary::new(skipped, pending_total),
            groups: group_progress,
        });

        let (queue_ref, progress_ref) = (&queue, &progress);
        let workers = (0..self.max_concurrent.min(pending_total.max(1)))
            .map(move |id| self.worker(id, queue_ref, progress_ref, shutdown));
        futures::future::try_join_all(workers).await?;

        let Progress { store, mut summary, .. } = progress.into_inner();
        store.flush()?;
        summary.persisted = store.len();
        summary.state = if shutdown.is_triggered() && summary.remaining > 0 {
            RunState::Interrupted
        } else {
            RunState::Finished
        };
        Ok(summary)
    }

    /// 不断领取下一张图片直到队列为空或收到停止信号
    async fn worker(
        &self,
        id: usize,
        queue: &Mutex<VecDeque<(ImageCtx, &WorkItem)>>,
        progress: &Mutex<Progress<'_>>,
        shutdown: &Shutdown,
    ) -> Result<(), StoreError> {
        loop {
            if shutdown.is_triggered() {
                debug!("worker {} 收到停止信号", id);
                break;
            }
            let Some((ctx, item)) = queue.lock().await.pop_front() else {
                break;
            };

            info!("{} 🔄 开始处理", ctx);
            let entry = tokio::select! {
                biased;
                _ = shutdown.triggered() => {
                    warn!("{} ⏹ 已放弃进行中的请求", ctx);
                    break;
                }
                entry = self.flow.run(item, &ctx) => entry,
            };

            let state = ItemState::of(&entry);
            progress.lock().await.record(item, &ctx, entry)?;

            match state {
                ItemState::Completed => info!("{} ✅ 已保存", ctx),
                other => warn!("{} ❌ 已记录: {}", ctx, other),
            }

            // 只有成功后才等待，失败已经在重试中等待过
            if state == ItemState::Completed {
                let delay = self.flow.client().policy().next_inter_item_delay();
                if !delay.is_zero() {
                    tokio::select! {
                        _ = sleep(delay) => {}
                        _ = shutdown.triggered() => break,
                    }
                }
            }
        }
        Ok(())
    }
}
