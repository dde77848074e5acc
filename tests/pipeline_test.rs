use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use image_annotator::error::{StoreError, TransportError};
use image_annotator::models::AnnotationRequest;
use image_annotator::orchestrator::shutdown::{self, ShutdownTrigger};
use image_annotator::{
    CorpusWalker, ErrorKind, ImageFlow, Pipeline, ReprocessPolicy, RequestClient, ResultStore,
    RetryPolicy, RunState, Shutdown, StoredEntry, Transport, WorkGroup,
};
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tempfile::TempDir;

const VALID_REPLY: &str = "Here you go:\n```json\n{\"male\": {\"quality\": \"positive\", \"aesthetic\": \"normal\", \"emotion\": \"awe\"}, \"child\": {\"quality\": \"normal\", \"aesthetic\": \"positive\", \"emotion\": \"amusement\"}}\n```";

/// 按图片内容（即文件名）返回预设结果的传输，未预设的图片返回合法回复
#[derive(Default)]
struct ScriptedTransport {
    scripts: Mutex<HashMap<String, VecDeque<Result<String, TransportError>>>>,
    calls: Mutex<HashMap<String, usize>>,
    total: AtomicUsize,
    trigger_at: Option<(usize, ShutdownTrigger)>,
}

impl ScriptedTransport {
    fn script(self, name: &str, responses: Vec<Result<String, TransportError>>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(name.to_string(), responses.into());
        self
    }

    /// 第 `call` 次请求时触发停止信号
    fn stop_at(mut self, call: usize, trigger: ShutdownTrigger) -> Self {
        self.trigger_at = Some((call, trigger));
        self
    }

    fn calls_for(&self, name: &str) -> usize {
        self.calls.lock().unwrap().get(name).copied().unwrap_or(0)
    }

    fn total_calls(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }
}

impl Transport for ScriptedTransport {
    async fn send(&self, request: &AnnotationRequest) -> Result<String, TransportError> {
        let bytes = BASE64_STANDARD.decode(&request.image_base64).unwrap();
        let name = String::from_utf8(bytes).unwrap();

        let count = self.total.fetch_add(1, Ordering::SeqCst) + 1;
        *self.calls.lock().unwrap().entry(name.clone()).or_default() += 1;
        if let Some((at, trigger)) = &self.trigger_at {
            if *at == count {
                trigger.trigger();
            }
        }

        self.scripts
            .lock()
            .unwrap()
            .get_mut(&name)
            .and_then(|queue| queue.pop_front())
            .unwrap_or_else(|| Ok(VALID_REPLY.to_string()))
    }
}

/// 每张图片的内容就是它的文件名
fn corpus(root: &Path, layout: &[(&str, &[&str])]) -> Vec<WorkGroup> {
    for (group, files) in layout {
        let dir = root.join("corpus").join(group);
        std::fs::create_dir_all(&dir).unwrap();
        for file in *files {
            std::fs::write(dir.join(file), file.as_bytes()).unwrap();
        }
    }
    CorpusWalker::new(root.join("corpus"), &["jpg".to_string()], false)
        .enumerate()
        .unwrap()
}

fn pipeline(transport: &ScriptedTransport, attempts: u32, reprocess: ReprocessPolicy) -> Pipeline<&ScriptedTransport> {
    let client = RequestClient::new(transport, RetryPolicy::immediate(attempts));
    Pipeline::new(ImageFlow::new(client, "prompt"), 1, reprocess)
}

fn read_json(path: &Path) -> serde_json::Value {
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

#[tokio::test]
async fn test_second_run_makes_no_requests() {
    let dir = TempDir::new().unwrap();
    let groups = corpus(dir.path(), &[("A", &["a1.jpg", "a2.jpg"]), ("B", &["b1.jpg"])]);
    let output = dir.path().join("results.json");

    let transport = ScriptedTransport::default();
    let mut store = ResultStore::load(&output).unwrap();
    let summary = pipeline(&transport, 3, ReprocessPolicy::default())
        .run(&groups, &mut store, &Shutdown::never())
        .await
        .unwrap();

    assert_eq!(summary.state, RunState::Finished);
    assert_eq!(summary.completed, 3);
    assert_eq!(summary.persisted, 3);
    assert_eq!(transport.total_calls(), 3);

    let json = read_json(&output);
    assert_eq!(json["a1.jpg"]["male"]["emotion"], "awe");
    assert_eq!(json["b1.jpg"]["child"]["quality"], "normal");

    let rerun = ScriptedTransport::default();
    let mut store = ResultStore::load(&output).unwrap();
    let summary = pipeline(&rerun, 3, ReprocessPolicy::default())
        .run(&groups, &mut store, &Shutdown::never())
        .await
        .unwrap();

    assert_eq!(rerun.total_calls(), 0);
    assert_eq!(summary.skipped, 3);
    assert_eq!(summary.state, RunState::Finished);
    assert_eq!(read_json(&output), json);
}

#[tokio::test]
async fn test_interrupted_run_resumes_where_it_stopped() {
    let dir = TempDir::new().unwrap();
    let files = ["1.jpg", "2.jpg", "3.jpg", "4.jpg", "5.jpg"];
    let groups = corpus(dir.path(), &[("G", &files)]);
    let output = dir.path().join("results.json");

    let (trigger, stop) = shutdown::channel();
    let transport = ScriptedTransport::default().stop_at(2, trigger);
    let mut store = ResultStore::load(&output).unwrap();
    let summary = pipeline(&transport, 3, ReprocessPolicy::default())
        .run(&groups, &mut store, &stop)
        .await
        .unwrap();

    assert_eq!(summary.state, RunState::Interrupted);
    assert_eq!(transport.total_calls(), 2);
    let persisted = ResultStore::load(&output).unwrap();
    assert_eq!(persisted.len(), summary.persisted);
    assert_eq!(summary.remaining, files.len() - persisted.len());
    assert!(persisted.has("1.jpg"));
    assert!(!persisted.has("5.jpg"));

    let resumed = ScriptedTransport::default();
    let mut store = ResultStore::load(&output).unwrap();
    let summary = pipeline(&resumed, 3, ReprocessPolicy::default())
        .run(&groups, &mut store, &Shutdown::never())
        .await
        .unwrap();

    assert_eq!(summary.state, RunState::Finished);
    assert_eq!(resumed.total_calls(), files.len() - persisted.len());
    assert_eq!(ResultStore::load(&output).unwrap().success_count(), files.len());
}

#[tokio::test]
async fn test_retry_exhaustion_is_recorded_and_batch_continues() {
    let dir = TempDir::new().unwrap();
    let groups = corpus(dir.path(), &[("A", &["x.jpg", "y.jpg"])]);
    let output = dir.path().join("results.json");

    let failures = (0..10)
        .map(|_| Err(TransportError::Status { status: 503, body: "busy".to_string() }))
        .collect();
    let transport = ScriptedTransport::default().script("x.jpg", failures);
    let mut store = ResultStore::load(&output).unwrap();
    let summary = pipeline(&transport, 4, ReprocessPolicy::default())
        .run(&groups, &mut store, &Shutdown::never())
        .await
        .unwrap();

    assert_eq!(transport.calls_for("x.jpg"), 4);
    assert_eq!(transport.calls_for("y.jpg"), 1);
    assert_eq!(summary.failed_transport, 1);
    assert_eq!(summary.completed, 1);

    let json = read_json(&output);
    assert_eq!(json["x.jpg"]["kind"], "transport");
    assert!(json["x.jpg"]["error"].as_str().unwrap().contains("503"));

    // 关闭传输失败重跑时，下一次运行跳过它
    let skip = ReprocessPolicy {
        retry_transport_failures: false,
        ..ReprocessPolicy::default()
    };
    let rerun = ScriptedTransport::default();
    let mut store = ResultStore::load(&output).unwrap();
    pipeline(&rerun, 4, skip)
        .run(&groups, &mut store, &Shutdown::never())
        .await
        .unwrap();
    assert_eq!(rerun.total_calls(), 0);

    // 默认策略下重新请求
    let rerun = ScriptedTransport::default();
    let mut store = ResultStore::load(&output).unwrap();
    pipeline(&rerun, 4, ReprocessPolicy::default())
        .run(&groups, &mut store, &Shutdown::never())
        .await
        .unwrap();
    assert_eq!(rerun.calls_for("x.jpg"), 1);
    assert!(store.get("x.jpg").unwrap().is_success());
}

#[tokio::test]
async fn test_malformed_envelope_is_retried_once() {
    let dir = TempDir::new().unwrap();
    let groups = corpus(dir.path(), &[("A", &["x.jpg", "y.jpg"])]);
    let output = dir.path().join("results.json");

    let transport = ScriptedTransport::default().script(
        "y.jpg",
        vec![Err(TransportError::MalformedEnvelope("expected value at line 1".to_string()))],
    );
    let mut store = ResultStore::load(&output).unwrap();
    let summary = pipeline(&transport, 10, ReprocessPolicy::default())
        .run(&groups, &mut store, &Shutdown::never())
        .await
        .unwrap();

    assert_eq!(summary.completed, 2);
    assert_eq!(transport.calls_for("x.jpg"), 1);
    assert_eq!(transport.calls_for("y.jpg"), 2);
    assert_eq!(ResultStore::load(&output).unwrap().success_count(), 2);
}

#[tokio::test]
async fn test_parse_failure_is_recorded_without_retry() {
    let dir = TempDir::new().unwrap();
    let groups = corpus(dir.path(), &[("A", &["x.jpg"])]);
    let output = dir.path().join("results.json");

    let transport = ScriptedTransport::default()
        .script("x.jpg", vec![Ok("I cannot rate this image.".to_string())]);
    let mut store = ResultStore::load(&output).unwrap();
    let summary = pipeline(&transport, 10, ReprocessPolicy::default())
        .run(&groups, &mut store, &Shutdown::never())
        .await
        .unwrap();

    assert_eq!(transport.calls_for("x.jpg"), 1);
    assert_eq!(summary.failed_parse, 1);
    assert_eq!(
        store.get("x.jpg").and_then(StoredEntry::error_kind),
        Some(ErrorKind::Parse)
    );

    let json = read_json(&output);
    assert_eq!(json["x.jpg"]["kind"], "parse");
    assert_eq!(json["x.jpg"]["original_content"], "I cannot rate this image.");
}

#[tokio::test]
async fn test_existing_results_are_not_requested_again() {
    let dir = TempDir::new().unwrap();
    let groups = corpus(dir.path(), &[("A", &["x.jpg", "y.jpg"])]);
    let output = dir.path().join("results.json");

    // 旧格式：按会话分组，没有 kind 字段
    let legacy = serde_json::json!({
        "session_1": {
            "x.jpg": {"male": {"quality": "normal", "aesthetic": "normal", "emotion": "neutral"}}
        }
    });
    std::fs::write(&output, serde_json::to_string_pretty(&legacy).unwrap()).unwrap();

    let transport = ScriptedTransport::default();
    let mut store = ResultStore::load(&output).unwrap();
    let summary = pipeline(&transport, 3, ReprocessPolicy::default())
        .run(&groups, &mut store, &Shutdown::never())
        .await
        .unwrap();

    assert_eq!(transport.calls_for("x.jpg"), 0);
    assert_eq!(transport.calls_for("y.jpg"), 1);
    assert_eq!(summary.skipped, 1);

    let json = read_json(&output);
    assert_eq!(json["x.jpg"]["male"]["emotion"], "neutral");
    assert!(json.get("session_1").is_none());
}

#[tokio::test]
async fn test_unreadable_image_is_input_failure() {
    let dir = TempDir::new().unwrap();
    let groups = corpus(dir.path(), &[("A", &["x.jpg"])]);
    std::fs::remove_file(&groups[0].items[0].path).unwrap();
    let output = dir.path().join("results.json");

    let transport = ScriptedTransport::default();
    let mut store = ResultStore::load(&output).unwrap();
    let summary = pipeline(&transport, 3, ReprocessPolicy::default())
        .run(&groups, &mut store, &Shutdown::never())
        .await
        .unwrap();

    assert_eq!(transport.total_calls(), 0);
    assert_eq!(summary.failed_input, 1);
    assert_eq!(read_json(&output)["x.jpg"]["kind"], "input");
}

#[tokio::test]
async fn test_concurrent_workers_process_everything_once() {
    let dir = TempDir::new().unwrap();
    let files: Vec<String> = (0..12).map(|i| format!("{:02}.jpg", i)).collect();
    let names: Vec<&str> = files.iter().map(String::as_str).collect();
    let groups = corpus(dir.path(), &[("A", &names[..6]), ("B", &names[6..])]);
    let output = dir.path().join("results.json");

    let transport = ScriptedTransport::default();
    let client = RequestClient::new(&transport, RetryPolicy::immediate(2));
    let pipeline = Pipeline::new(ImageFlow::new(client, "prompt"), 4, ReprocessPolicy::default());
    let mut store = ResultStore::load(&output).unwrap();
    let summary = pipeline
        .run(&groups, &mut store, &Shutdown::never())
        .await
        .unwrap();

    assert_eq!(summary.completed, 12);
    assert_eq!(transport.total_calls(), 12);
    for name in &names {
        assert_eq!(transport.calls_for(name), 1);
    }
    assert_eq!(ResultStore::load(&output).unwrap().len(), 12);
}

#[tokio::test]
async fn test_unwritable_results_file_aborts_batch() {
    let dir = TempDir::new().unwrap();
    let groups = corpus(dir.path(), &[("A", &["x.jpg", "y.jpg", "z.jpg"])]);
    // 结果文件路径已被目录占用，原子替换必然失败
    let output = dir.path().join("results.json");
    std::fs::create_dir(&output).unwrap();

    let transport = ScriptedTransport::default();
    let mut store = ResultStore::empty(&output);
    let result = pipeline(&transport, 3, ReprocessPolicy::default())
        .run(&groups, &mut store, &Shutdown::never())
        .await;

    assert!(matches!(
        result,
        Err(StoreError::Persist { .. } | StoreError::Write { .. })
    ));
    assert_eq!(transport.total_calls(), 1);
    assert_eq!(transport.calls_for("y.jpg"), 0);
}
