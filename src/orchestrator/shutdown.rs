//! 停止信号
//!
//! Ctrl-C / SIGTERM 触发后，编排层不再领取新图片，进行中的请求直接放弃（不落盘）。

use tokio::sync::watch;
use tracing::{info, warn};

/// 停止信号的接收端，可随意 clone
#[derive(Clone, Debug)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

/// 停止信号的触发端
#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

/// 创建一对触发端 / 接收端
pub fn channel() -> (ShutdownTrigger, Shutdown) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger { tx }, Shutdown { rx })
}

impl Shutdown {
    /// 永远不会触发的信号
    pub fn never() -> Self {
        channel().1
    }

    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// 等待信号触发；触发端已丢弃且未触发时永远挂起
    pub async fn triggered(&self) {
        let mut rx = self.rx.clone();
        if rx.wait_for(|&stopped| stopped).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

impl ShutdownTrigger {
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn subscribe(&self) -> Shutdown {
        Shutdown {
            rx: self.tx.subscribe(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SignalEvent {
    CtrlC,
    SigTerm,
    ListenerFailed,
}

/// 后台监听 Ctrl-C / SIGTERM，收到后触发停止信号
pub fn listen_for_signals() -> Shutdown {
    let (trigger, shutdown) = channel();
    tokio::spawn(async move {
        match wait_for_signal().await {
            SignalEvent::ListenerFailed => {
                warn!("⚠️ 无法监听停止信号，只能等待批次自然结束");
                // 保持触发端存活，避免接收端误判
                std::future::pending::<()>().await;
            }
            event => {
                info!("\n⏹ 收到停止信号 ({:?})，完成当前写入后退出...", event);
                trigger.trigger();
            }
        }
    });
    shutdown
}

async fn wait_for_signal() -> SignalEvent {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => SignalEvent::CtrlC,
            Err(error) => {
                warn!(%error, "监听 Ctrl+C 失败");
                SignalEvent::ListenerFailed
            }
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => match term.recv().await {
                Some(_) => SignalEvent::SigTerm,
                None => SignalEvent::ListenerFailed,
            },
            Err(error) => {
                warn!(%error, "监听 SIGTERM 失败");
                SignalEvent::ListenerFailed
            }
        }
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending();

    tokio::select! {
        event = ctrl_c => event,
        event = sigterm => event,
    }
}
