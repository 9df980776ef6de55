use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use strata_artifact::{BlobTransfer, FsStore};
use strata_cache::{CacheStore, FsCacheStore, InMemoryCacheStore, SqliteCacheStore};
use strata_config::{RetryPolicy, Scope};
use strata_engine::{
  ChannelNotifier, Engine, EngineConfig, EngineError, ExecutionEvent, LaunchOptions, TASK_NODE_ID,
};
use strata_literal::{Blob, BlobType, Literal, LiteralMap, LiteralType, Primitive};
use strata_store::{
  ExecutionState, ExecutionStore, InMemoryExecutionStore, NodeErrorKind, NodeState,
  SqliteExecutionStore, StoreError,
};
use strata_task::{ExecutionContext, Task, TaskBody, TaskError};
use strata_workflow::{Binding, LaunchPlan, Node, Workflow, WorkflowError};

fn config() -> EngineConfig {
  EngineConfig::default().with_retry(RetryPolicy::none())
}

fn engine_with(cache: Arc<dyn CacheStore>) -> Engine {
  Engine::new(config(), cache, Arc::new(InMemoryExecutionStore::new()))
}

fn engine() -> Engine {
  engine_with(Arc::new(InMemoryCacheStore::new()))
}

fn n(value: i64) -> LiteralMap {
  LiteralMap::from([("n".to_string(), Literal::integer(value))])
}

fn int_output(value: i64) -> LiteralMap {
  LiteralMap::from([("o0".to_string(), Literal::integer(value))])
}

/// `square(n) -> o0`, counting body invocations.
fn square(version: &str, output: LiteralType, calls: Arc<AtomicUsize>) -> Task {
  let as_float = output == LiteralType::Float;
  Task::builder("square")
    .input("n", LiteralType::Integer)
    .output("o0", output)
    .cache(version)
    .body_fn(move |_, inputs| {
      calls.fetch_add(1, Ordering::SeqCst);
      let n = inputs["n"]
        .as_integer()
        .ok_or_else(|| TaskError::failed("n must be an integer"))?;
      let value = if as_float {
        Literal::float((n * n) as f64)
      } else {
        Literal::integer(n * n)
      };
      Ok(LiteralMap::from([("o0".to_string(), value)]))
    })
    .build()
    .unwrap()
}

fn inc() -> Task {
  Task::builder("inc")
    .input("x", LiteralType::Integer)
    .output("o0", LiteralType::Integer)
    .body_fn(|_, inputs| {
      let x = inputs["x"].as_integer().unwrap_or_default();
      Ok(int_output(x + 1))
    })
    .build()
    .unwrap()
}

fn add() -> Task {
  Task::builder("add")
    .input("a", LiteralType::Integer)
    .input("b", LiteralType::Integer)
    .output("o0", LiteralType::Integer)
    .body_fn(|_, inputs| {
      let a = inputs["a"].as_integer().unwrap_or_default();
      let b = inputs["b"].as_integer().unwrap_or_default();
      Ok(int_output(a + b))
    })
    .build()
    .unwrap()
}

/// Succeeds with the attempt number after sleeping `delays[attempt - 1]`.
struct Sleepy {
  delays: Vec<Duration>,
}

#[async_trait]
impl TaskBody for Sleepy {
  async fn invoke(
    &self,
    ctx: &ExecutionContext,
    _inputs: LiteralMap,
  ) -> Result<LiteralMap, TaskError> {
    let delay = self
      .delays
      .get(ctx.attempt as usize - 1)
      .copied()
      .unwrap_or_default();
    tokio::time::sleep(delay).await;
    Ok(int_output(i64::from(ctx.attempt)))
  }
}

fn sleepy(name: &str, delays: Vec<Duration>) -> Task {
  Task::builder(name)
    .output("o0", LiteralType::Integer)
    .body(Sleepy { delays })
    .build()
    .unwrap()
}

/// Fails its first `failures` attempts.
fn flaky(failures: usize, calls: Arc<AtomicUsize>) -> Task {
  Task::builder("flaky")
    .output("o0", LiteralType::Integer)
    .body_fn(move |ctx, _| {
      if calls.fetch_add(1, Ordering::SeqCst) < failures {
        return Err(TaskError::failed(format!("attempt {} failed", ctx.attempt)));
      }
      Ok(int_output(7))
    })
    .build()
    .unwrap()
}

#[tokio::test]
async fn test_second_identical_call_is_cached() {
  let engine = engine();
  let calls = Arc::new(AtomicUsize::new(0));
  let task = square("1.0", LiteralType::Integer, calls.clone());

  let first = engine.execute_task(&task, n(2)).await.unwrap();
  assert_eq!(first.state, ExecutionState::Succeeded);
  assert_eq!(first.node(TASK_NODE_ID).unwrap().state, NodeState::Succeeded);
  assert_eq!(first.node(TASK_NODE_ID).unwrap().attempts, 1);

  let second = engine.execute_task(&task, n(2)).await.unwrap();
  let node = second.node(TASK_NODE_ID).unwrap();
  assert_eq!(node.state, NodeState::Cached);
  assert_eq!(node.attempts, 0);
  assert_eq!(node.cache_key, first.node(TASK_NODE_ID).unwrap().cache_key);
  assert_eq!(second.outputs.unwrap()["o0"], Literal::integer(4));
  assert_eq!(calls.load(Ordering::SeqCst), 1);

  let other = engine.execute_task(&task, n(3)).await.unwrap();
  assert_eq!(other.node(TASK_NODE_ID).unwrap().state, NodeState::Succeeded);
  assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_version_bump_misses() {
  let engine = engine();
  let calls = Arc::new(AtomicUsize::new(0));

  engine
    .execute_task(&square("1.0", LiteralType::Integer, calls.clone()), n(2))
    .await
    .unwrap();
  let bumped = engine
    .execute_task(&square("1.1", LiteralType::Integer, calls.clone()), n(2))
    .await
    .unwrap();

  assert_eq!(bumped.node(TASK_NODE_ID).unwrap().state, NodeState::Succeeded);
  assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_output_type_change_misses() {
  let engine = engine();
  let calls = Arc::new(AtomicUsize::new(0));

  engine
    .execute_task(&square("1.0", LiteralType::Integer, calls.clone()), n(2))
    .await
    .unwrap();
  let changed = engine
    .execute_task(&square("1.0", LiteralType::Float, calls.clone()), n(2))
    .await
    .unwrap();

  assert_eq!(changed.node(TASK_NODE_ID).unwrap().state, NodeState::Succeeded);
  assert_eq!(changed.outputs.unwrap()["o0"], Literal::float(4.0));
  assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_different_scope_misses() {
  let cache: Arc<dyn CacheStore> = Arc::new(InMemoryCacheStore::new());
  let store = Arc::new(InMemoryExecutionStore::new());
  let dev = Engine::new(
    config().with_scope(Scope::new("p", "development")),
    cache.clone(),
    store.clone(),
  );
  let prod = Engine::new(
    config().with_scope(Scope::new("p", "production")),
    cache,
    store,
  );
  let calls = Arc::new(AtomicUsize::new(0));
  let task = square("1.0", LiteralType::Integer, calls.clone());

  dev.execute_task(&task, n(2)).await.unwrap();
  let record = prod.execute_task(&task, n(2)).await.unwrap();
  assert_eq!(record.node(TASK_NODE_ID).unwrap().state, NodeState::Succeeded);
  assert_eq!(record.scope, Scope::new("p", "production"));

  let again = dev.execute_task(&task, n(2)).await.unwrap();
  assert_eq!(again.node(TASK_NODE_ID).unwrap().state, NodeState::Cached);
  assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_diamond_with_failing_root() {
  let engine = engine();
  let fail = Task::builder("fail")
    .output("o0", LiteralType::Integer)
    .body_fn(|_, _| Err(TaskError::failed("boom")))
    .build()
    .unwrap();

  let workflow = Workflow::builder("diamond")
    .node(Node::new("a", &fail))
    .node(Node::new("b", &inc()).bind("x", Binding::output("a", "o0")))
    .node(Node::new("c", &inc()).bind("x", Binding::output("a", "o0")))
    .node(
      Node::new("d", &add())
        .bind("a", Binding::output("b", "o0"))
        .bind("b", Binding::output("c", "o0")),
    )
    .output("total", Binding::output("d", "o0"))
    .build()
    .unwrap();

  let record = engine.execute(&workflow, LiteralMap::new()).await.unwrap();
  assert_eq!(record.state, ExecutionState::Failed);
  assert!(record.outputs.is_none());

  let a = record.node("a").unwrap();
  assert_eq!(a.state, NodeState::Failed);
  assert_eq!(a.error.as_ref().unwrap().kind, NodeErrorKind::TaskExecution);
  assert!(a.error.as_ref().unwrap().message.contains("boom"));

  for id in ["b", "c", "d"] {
    let node = record.node(id).unwrap();
    assert_eq!(node.state, NodeState::Skipped, "node {id}");
    assert_eq!(node.attempts, 0);
    assert_eq!(
      node.error.as_ref().unwrap().kind,
      NodeErrorKind::UpstreamFailure {
        root_cause: "a".to_string()
      }
    );
  }

  let failure = record.failure.unwrap();
  assert_eq!(failure.root_cause_node, "a");
  assert!(failure.message.contains("boom"));
  assert_eq!(failure.skipped_nodes, ["b", "c", "d"]);
}

#[tokio::test]
async fn test_sibling_branch_continues_after_failure() {
  let engine = engine();
  let fail = Task::builder("fail")
    .output("o0", LiteralType::Integer)
    .body_fn(|_, _| Err(TaskError::failed("boom")))
    .build()
    .unwrap();

  let workflow = Workflow::builder("branches")
    .node(Node::new("bad", &fail))
    .node(Node::new("after_bad", &inc()).bind("x", Binding::output("bad", "o0")))
    .node(Node::new("good", &inc()).bind("x", Binding::literal(1)))
    .node(Node::new("after_good", &inc()).bind("x", Binding::output("good", "o0")))
    .build()
    .unwrap();

  let record = engine.execute(&workflow, LiteralMap::new()).await.unwrap();
  assert_eq!(record.state, ExecutionState::Failed);
  assert_eq!(record.node("after_bad").unwrap().state, NodeState::Skipped);
  assert_eq!(record.node("good").unwrap().state, NodeState::Succeeded);
  let after_good = record.node("after_good").unwrap();
  assert_eq!(after_good.state, NodeState::Succeeded);
  assert_eq!(after_good.outputs.as_ref().unwrap()["o0"], Literal::integer(3));
  assert_eq!(record.failure.unwrap().skipped_nodes, ["after_bad"]);
}

#[tokio::test]
async fn test_cycle_is_rejected_before_dispatch() {
  let calls = Arc::new(AtomicUsize::new(0));
  let task = Task::builder("t")
    .input("x", LiteralType::Integer)
    .output("o0", LiteralType::Integer)
    .body_fn({
      let calls = calls.clone();
      move |_, _| {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok(int_output(0))
      }
    })
    .build()
    .unwrap();

  let err = Workflow::builder("loop")
    .node(Node::new("a", &task).bind("x", Binding::output("b", "o0")))
    .node(Node::new("b", &task).bind("x", Binding::output("a", "o0")))
    .build()
    .unwrap_err();

  assert!(matches!(err, WorkflowError::Cycle { .. }));
  assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_workflow_outputs_and_repeated_queries() {
  let engine = engine();
  let calls = Arc::new(AtomicUsize::new(0));
  let workflow = Workflow::builder("chain")
    .version("v1")
    .input("n", LiteralType::Integer)
    .node(
      Node::new("sq", &square("1", LiteralType::Integer, calls)).bind("n", Binding::input("n")),
    )
    .node(Node::new("plus", &inc()).bind("x", Binding::output("sq", "o0")))
    .output("result", Binding::output("plus", "o0"))
    .build()
    .unwrap();

  let record = engine.execute(&workflow, n(3)).await.unwrap();
  assert_eq!(record.state, ExecutionState::Succeeded);
  assert_eq!(record.workflow_version, "v1");
  assert_eq!(
    record.outputs.as_ref().unwrap()["result"],
    Literal::integer(10)
  );
  assert_eq!(
    record.node("plus").unwrap().inputs["x"],
    Literal::integer(9)
  );

  let client = engine.client();
  let first = client.get_execution(&record.execution_id).await.unwrap();
  let second = client.get_execution(&record.execution_id).await.unwrap();
  assert_eq!(first, second);
  assert_eq!(first, record);

  let mut synced = first.clone();
  client.sync(&mut synced).await.unwrap();
  client.sync(&mut synced).await.unwrap();
  assert_eq!(synced, first);

  let node = client.get_node(&record.execution_id, "sq").await.unwrap();
  assert_eq!(node.outputs.unwrap()["o0"], Literal::integer(9));
}

#[tokio::test]
async fn test_retries_succeed_within_budget() {
  let engine = engine();
  let calls = Arc::new(AtomicUsize::new(0));
  let workflow = Workflow::builder("retry")
    .node(Node::new("f", &flaky(2, calls.clone())).retries(2))
    .build()
    .unwrap();

  let record = engine.execute(&workflow, LiteralMap::new()).await.unwrap();
  assert_eq!(record.state, ExecutionState::Succeeded);
  let node = record.node("f").unwrap();
  assert_eq!(node.state, NodeState::Succeeded);
  assert_eq!(node.attempts, 3);
  assert!(node.error.is_none());
  assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_retries_exhausted() {
  let engine = engine();
  let calls = Arc::new(AtomicUsize::new(0));
  let workflow = Workflow::builder("retry")
    .node(Node::new("f", &flaky(5, calls.clone())).retries(1))
    .build()
    .unwrap();

  let record = engine.execute(&workflow, LiteralMap::new()).await.unwrap();
  assert_eq!(record.state, ExecutionState::Failed);
  let node = record.node("f").unwrap();
  assert_eq!(node.state, NodeState::Failed);
  assert_eq!(node.attempts, 2);
  assert!(node.error.as_ref().unwrap().message.contains("attempt 2 failed"));
}

#[tokio::test]
async fn test_non_recoverable_error_is_not_retried() {
  let engine = engine();
  let calls = Arc::new(AtomicUsize::new(0));
  let task = Task::builder("fatal")
    .output("o0", LiteralType::Integer)
    .retries(3)
    .body_fn({
      let calls = calls.clone();
      move |_, _| {
        calls.fetch_add(1, Ordering::SeqCst);
        Err(TaskError::non_recoverable("bad config"))
      }
    })
    .build()
    .unwrap();

  let record = engine.execute_task(&task, LiteralMap::new()).await.unwrap();
  assert_eq!(record.node(TASK_NODE_ID).unwrap().state, NodeState::Failed);
  assert_eq!(record.node(TASK_NODE_ID).unwrap().attempts, 1);
  assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_timeout_counts_as_failed_attempt() {
  let engine = engine();
  let slow_then_fast = sleepy(
    "sleepy",
    vec![Duration::from_secs(30), Duration::from_millis(1)],
  );

  let workflow = Workflow::builder("timeout")
    .node(
      Node::new("s", &slow_then_fast)
        .timeout(Duration::from_millis(50))
        .retries(1),
    )
    .output("o0", Binding::output("s", "o0"))
    .build()
    .unwrap();

  let record = engine.execute(&workflow, LiteralMap::new()).await.unwrap();
  assert_eq!(record.state, ExecutionState::Succeeded);
  assert_eq!(record.node("s").unwrap().attempts, 2);
  assert_eq!(record.outputs.unwrap()["o0"], Literal::integer(2));

  let always_slow = Workflow::builder("timeout")
    .node(Node::new("s", &sleepy("sleepy", vec![Duration::from_secs(30)])).timeout(Duration::from_millis(20)))
    .build()
    .unwrap();
  let record = engine.execute(&always_slow, LiteralMap::new()).await.unwrap();
  let node = record.node("s").unwrap();
  assert_eq!(node.state, NodeState::Failed);
  assert!(node.error.as_ref().unwrap().message.contains("timed out"));
}

#[tokio::test]
async fn test_cancel_keeps_completed_nodes() {
  let engine = engine();
  let workflow = Workflow::builder("cancel")
    .node(Node::new("first", &inc()).bind("x", Binding::literal(1)))
    .node(
      Node::new("slow", &sleepy("slow", vec![Duration::from_secs(30)])).after("first"),
    )
    .node(Node::new("last", &inc()).bind("x", Binding::output("slow", "o0")))
    .build()
    .unwrap();

  let handle = engine.launch(&workflow, LiteralMap::new()).await.unwrap();
  let client = engine.client();
  let execution_id = handle.execution_id().to_string();

  let mut started = false;
  for _ in 0..500 {
    let node = client.get_node(&execution_id, "slow").await.unwrap();
    if node.state == NodeState::Running {
      started = true;
      break;
    }
    tokio::time::sleep(Duration::from_millis(10)).await;
  }
  assert!(started, "slow node never started");

  handle.cancel();
  let record = handle.wait().await.unwrap();

  assert_eq!(record.state, ExecutionState::Aborted);
  assert_eq!(record.node("first").unwrap().state, NodeState::Succeeded);

  let slow = record.node("slow").unwrap();
  assert_eq!(slow.state, NodeState::Aborted);
  assert_eq!(slow.error.as_ref().unwrap().kind, NodeErrorKind::Cancelled);

  let last = record.node("last").unwrap();
  assert_eq!(last.state, NodeState::Skipped);
  assert_eq!(last.error.as_ref().unwrap().kind, NodeErrorKind::Cancelled);

  let first = client.get_node(&execution_id, "first").await.unwrap();
  assert_eq!(first.outputs.unwrap()["o0"], Literal::integer(2));
  assert_eq!(client.get_execution(&execution_id).await.unwrap(), record);
}

/// Tracks how many bodies are running at once.
struct Gauge {
  current: Arc<AtomicUsize>,
  peak: Arc<AtomicUsize>,
}

#[async_trait]
impl TaskBody for Gauge {
  async fn invoke(
    &self,
    _ctx: &ExecutionContext,
    _inputs: LiteralMap,
  ) -> Result<LiteralMap, TaskError> {
    let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
    self.peak.fetch_max(now, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(30)).await;
    self.current.fetch_sub(1, Ordering::SeqCst);
    Ok(LiteralMap::new())
  }
}

#[tokio::test]
async fn test_parallelism_bound() {
  let engine = Engine::new(
    config().with_max_parallelism(2),
    Arc::new(InMemoryCacheStore::new()),
    Arc::new(InMemoryExecutionStore::new()),
  );
  let current = Arc::new(AtomicUsize::new(0));
  let peak = Arc::new(AtomicUsize::new(0));
  let task = Task::builder("gauge")
    .body(Gauge {
      current: current.clone(),
      peak: peak.clone(),
    })
    .build()
    .unwrap();

  let mut builder = Workflow::builder("wide");
  for i in 0..6 {
    builder = builder.node(Node::new(format!("n{i}"), &task));
  }
  let record = engine
    .execute(&builder.build().unwrap(), LiteralMap::new())
    .await
    .unwrap();

  assert_eq!(record.state, ExecutionState::Succeeded);
  assert_eq!(record.nodes_in(NodeState::Succeeded).len(), 6);
  assert_eq!(peak.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_ordering_edge_gates_execution() {
  let engine = engine();
  let log = Arc::new(Mutex::new(Vec::new()));
  let logger = |name: &'static str, delay: Duration| {
    let log = log.clone();
    Task::builder(name)
      .body_fn(move |_, _| {
        std::thread::sleep(delay);
        log.lock().unwrap().push(name);
        Ok(LiteralMap::new())
      })
      .build()
      .unwrap()
  };

  let workflow = Workflow::builder("ordered")
    .node(Node::new("b", &logger("b", Duration::ZERO)).after("a"))
    .node(Node::new("a", &logger("a", Duration::from_millis(50))))
    .build()
    .unwrap();

  let record = engine.execute(&workflow, LiteralMap::new()).await.unwrap();
  assert_eq!(record.state, ExecutionState::Succeeded);
  assert_eq!(*log.lock().unwrap(), ["a", "b"]);
  assert!(record.node("b").unwrap().inputs.is_empty());
}

fn consume_blob(calls: Arc<AtomicUsize>) -> Task {
  Task::builder("count_lines")
    .input("df", LiteralType::Blob(BlobType::format("csv")))
    .output("lines", LiteralType::Integer)
    .cache("1")
    .body_fn(move |_, inputs| {
      calls.fetch_add(1, Ordering::SeqCst);
      let path = inputs["df"]
        .as_blob()
        .and_then(|b| b.local_path())
        .ok_or_else(|| TaskError::failed("df is not a local blob"))?;
      let text = std::fs::read_to_string(&path).map_err(|e| TaskError::failed(e.to_string()))?;
      Ok(LiteralMap::from([(
        "lines".to_string(),
        Literal::integer(text.lines().count() as i64),
      )]))
    })
    .build()
    .unwrap()
}

#[tokio::test]
async fn test_unknown_hash_method_fails_node() {
  let engine = engine();
  let mut blob = Blob::new("/tmp/input.csv").with_format("csv");
  blob.hash_method = Some("nope".to_string());

  let workflow = Workflow::builder("hash")
    .node(
      Node::new("count", &consume_blob(Arc::new(AtomicUsize::new(0))))
        .bind("df", Binding::literal(Literal::Blob(blob))),
    )
    .build()
    .unwrap();

  let record = engine.execute(&workflow, LiteralMap::new()).await.unwrap();
  assert_eq!(record.state, ExecutionState::Failed);
  let node = record.node("count").unwrap();
  assert_eq!(node.state, NodeState::Failed);
  assert_eq!(node.attempts, 0);
  let error = node.error.as_ref().unwrap();
  assert_eq!(error.kind, NodeErrorKind::CacheKey);
  assert!(error.message.contains("nope"));
}

#[tokio::test]
async fn test_corrupt_cache_entry_is_a_miss() {
  let dir = tempfile::tempdir().unwrap();
  let engine = engine_with(Arc::new(FsCacheStore::new(dir.path())));
  let calls = Arc::new(AtomicUsize::new(0));
  let task = square("1", LiteralType::Integer, calls.clone());

  engine.execute_task(&task, n(2)).await.unwrap();

  for entry in std::fs::read_dir(dir.path()).unwrap() {
    let path = entry.unwrap().path();
    if path.extension().is_some_and(|ext| ext == "json") {
      std::fs::write(&path, "{ not json").unwrap();
    }
  }

  let record = engine.execute_task(&task, n(2)).await.unwrap();
  assert_eq!(record.state, ExecutionState::Succeeded);
  assert_eq!(record.node(TASK_NODE_ID).unwrap().state, NodeState::Succeeded);
  assert_eq!(calls.load(Ordering::SeqCst), 2);

  // The rewritten entry is usable again.
  let record = engine.execute_task(&task, n(2)).await.unwrap();
  assert_eq!(record.node(TASK_NODE_ID).unwrap().state, NodeState::Cached);
}

#[tokio::test]
async fn test_blob_outputs_are_offloaded_and_hashed() {
  let remote = tempfile::tempdir().unwrap();
  let transfer = BlobTransfer::new(Arc::new(FsStore::new(remote.path())), "mem");
  let engine = engine().with_blob_transfer(transfer);

  let produced = Arc::new(AtomicUsize::new(0));
  let consumed = Arc::new(AtomicUsize::new(0));
  let make = Task::builder("make_csv")
    .output_with_hash("df", LiteralType::Blob(BlobType::format("csv")), "sha256")
    .body_fn({
      let produced = produced.clone();
      move |ctx, _| {
        produced.fetch_add(1, Ordering::SeqCst);
        let path = ctx.working_dir().join("data.csv");
        std::fs::write(&path, "a,b\n1,2\n3,4\n").map_err(|e| TaskError::failed(e.to_string()))?;
        Ok(LiteralMap::from([(
          "df".to_string(),
          Literal::Blob(Blob::new(path.to_string_lossy()).with_format("csv")),
        )]))
      }
    })
    .build()
    .unwrap();

  let workflow = Workflow::builder("blobs")
    .node(Node::new("make", &make))
    .node(Node::new("count", &consume_blob(consumed.clone())).bind("df", Binding::output("make", "df")))
    .output("lines", Binding::output("count", "lines"))
    .build()
    .unwrap();

  let first = engine.execute(&workflow, LiteralMap::new()).await.unwrap();
  assert_eq!(first.state, ExecutionState::Succeeded);
  assert_eq!(first.outputs.as_ref().unwrap()["lines"], Literal::integer(3));

  let df = first.node("make").unwrap().outputs.as_ref().unwrap()["df"]
    .as_blob()
    .unwrap()
    .clone();
  assert!(df.uri.starts_with("mem://"), "uri was {}", df.uri);
  assert_eq!(df.hash_method.as_deref(), Some("sha256"));
  assert!(df.digest.is_some());
  assert_eq!(first.node("count").unwrap().inputs["df"].as_blob().unwrap().uri, df.uri);

  // Same content at a different uri hits the cache through the hash method.
  let second = engine.execute(&workflow, LiteralMap::new()).await.unwrap();
  assert_eq!(second.node("make").unwrap().state, NodeState::Succeeded);
  assert_eq!(second.node("count").unwrap().state, NodeState::Cached);
  assert_ne!(
    second.node("make").unwrap().outputs.as_ref().unwrap()["df"],
    first.node("make").unwrap().outputs.as_ref().unwrap()["df"]
  );
  assert_eq!(second.outputs.unwrap()["lines"], Literal::integer(3));
  assert_eq!(produced.load(Ordering::SeqCst), 2);
  assert_eq!(consumed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_output_validation_failure_is_not_retried() {
  let engine = engine();
  let calls = Arc::new(AtomicUsize::new(0));
  let task = Task::builder("liar")
    .output("o0", LiteralType::Integer)
    .retries(3)
    .body_fn({
      let calls = calls.clone();
      move |_, _| {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok(LiteralMap::from([("o0".to_string(), Literal::string("four"))]))
      }
    })
    .build()
    .unwrap();

  let record = engine.execute_task(&task, LiteralMap::new()).await.unwrap();
  let node = record.node(TASK_NODE_ID).unwrap();
  assert_eq!(node.state, NodeState::Failed);
  assert_eq!(node.error.as_ref().unwrap().kind, NodeErrorKind::Validation);
  assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_invalid_launch_inputs() {
  let store = Arc::new(InMemoryExecutionStore::new());
  let engine = Engine::new(config(), Arc::new(InMemoryCacheStore::new()), store.clone());
  let task = square("1", LiteralType::Integer, Arc::new(AtomicUsize::new(0)));

  let err = engine
    .execute_task(
      &task,
      LiteralMap::from([("n".to_string(), Literal::string("two"))]),
    )
    .await
    .unwrap_err();
  assert!(matches!(err, EngineError::InvalidInputs { .. }));

  let err = engine
    .execute_task(&task, LiteralMap::new())
    .await
    .unwrap_err();
  assert!(matches!(err, EngineError::InvalidInputs { .. }));

  assert!(store.list_executions(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_events_are_delivered() {
  let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
  let engine = Engine::with_notifier(
    config(),
    Arc::new(InMemoryCacheStore::new()),
    Arc::new(InMemoryExecutionStore::new()),
    ChannelNotifier::new(tx),
  );
  let task = square("1", LiteralType::Integer, Arc::new(AtomicUsize::new(0)));

  let record = engine.execute_task(&task, n(2)).await.unwrap();
  let execution_id = record.execution_id.clone();

  let mut events = Vec::new();
  while let Ok(event) = rx.try_recv() {
    events.push(event);
  }
  assert_eq!(
    events,
    vec![
      ExecutionEvent::ExecutionStarted {
        execution_id: execution_id.clone(),
        workflow_name: "square".to_string(),
      },
      ExecutionEvent::NodeReady {
        execution_id: execution_id.clone(),
        node_id: TASK_NODE_ID.to_string(),
      },
      ExecutionEvent::NodeRunning {
        execution_id: execution_id.clone(),
        node_id: TASK_NODE_ID.to_string(),
        attempt: 1,
      },
      ExecutionEvent::NodeSucceeded {
        execution_id: execution_id.clone(),
        node_id: TASK_NODE_ID.to_string(),
      },
      ExecutionEvent::ExecutionFinished {
        execution_id,
        state: ExecutionState::Succeeded,
      },
    ]
  );

  let cached = engine.execute_task(&task, n(2)).await.unwrap();
  let mut saw_cached = false;
  while let Ok(event) = rx.try_recv() {
    if let ExecutionEvent::NodeCached { execution_id, cache_key, .. } = event {
      assert_eq!(execution_id, cached.execution_id);
      assert_eq!(Some(cache_key), cached.node(TASK_NODE_ID).unwrap().cache_key.clone());
      saw_cached = true;
    }
  }
  assert!(saw_cached);
}

#[tokio::test]
async fn test_sqlite_backends() {
  let pool = SqlitePoolOptions::new()
    .max_connections(1)
    .connect("sqlite::memory:")
    .await
    .unwrap();
  let cache = SqliteCacheStore::new(pool.clone());
  cache.migrate().await.unwrap();
  let store = SqliteExecutionStore::new(pool);
  store.migrate().await.unwrap();

  let engine = Engine::new(config(), Arc::new(cache), Arc::new(store));
  let calls = Arc::new(AtomicUsize::new(0));
  let task = square("1", LiteralType::Integer, calls.clone());

  let first = engine.execute_task(&task, n(4)).await.unwrap();
  let second = engine.execute_task(&task, n(4)).await.unwrap();
  assert_eq!(first.outputs.as_ref().unwrap()["o0"], Literal::integer(16));
  assert_eq!(second.node(TASK_NODE_ID).unwrap().state, NodeState::Cached);
  assert_eq!(calls.load(Ordering::SeqCst), 1);

  let client = engine.client();
  let fetched = client.get_execution(&second.execution_id).await.unwrap();
  assert_eq!(fetched.state, ExecutionState::Succeeded);
  assert_eq!(fetched.outputs, second.outputs);
  assert_eq!(fetched.node(TASK_NODE_ID).unwrap().state, NodeState::Cached);
  let listed = client.list_executions(None).await.unwrap();
  assert_eq!(listed.len(), 2);
}

#[tokio::test]
async fn test_far_future_datetimes_get_distinct_keys() {
  let engine = engine();
  let calls = Arc::new(AtomicUsize::new(0));
  let task = Task::builder("year")
    .input("t", LiteralType::Datetime)
    .output("o0", LiteralType::String)
    .cache("1")
    .body_fn({
      let calls = calls.clone();
      move |_, inputs| {
        calls.fetch_add(1, Ordering::SeqCst);
        let Literal::Primitive(Primitive::Datetime(t)) = &inputs["t"] else {
          return Err(TaskError::failed("t must be a datetime"));
        };
        Ok(LiteralMap::from([(
          "o0".to_string(),
          Literal::string(t.format("%Y").to_string()),
        )]))
      }
    })
    .build()
    .unwrap();
  let at = |year: i32| {
    LiteralMap::from([(
      "t".to_string(),
      Literal::datetime(Utc.with_ymd_and_hms(year, 1, 1, 0, 0, 0).unwrap()),
    )])
  };

  let first = engine.execute_task(&task, at(2300)).await.unwrap();
  let second = engine.execute_task(&task, at(2400)).await.unwrap();

  assert_ne!(
    first.node(TASK_NODE_ID).unwrap().cache_key,
    second.node(TASK_NODE_ID).unwrap().cache_key
  );
  assert_eq!(second.node(TASK_NODE_ID).unwrap().state, NodeState::Succeeded);
  assert_eq!(second.outputs.unwrap()["o0"], Literal::string("2400"));
  assert_eq!(calls.load(Ordering::SeqCst), 2);
}

fn write_report(calls: Arc<AtomicUsize>) -> Task {
  Task::builder("report")
    .output("out", LiteralType::Blob(BlobType::any()))
    .cache("1")
    .body_fn(move |ctx, _| {
      calls.fetch_add(1, Ordering::SeqCst);
      let path = ctx.working_dir().join("out.txt");
      std::fs::write(&path, "done").map_err(|e| TaskError::failed(e.to_string()))?;
      Ok(LiteralMap::from([(
        "out".to_string(),
        Literal::blob(path.to_string_lossy()),
      )]))
    })
    .build()
    .unwrap()
}

#[tokio::test]
async fn test_working_dir_blobs_outlive_the_execution() {
  let outputs = tempfile::tempdir().unwrap();
  let engine = Engine::new(
    config().with_output_root(outputs.path()),
    Arc::new(InMemoryCacheStore::new()),
    Arc::new(InMemoryExecutionStore::new()),
  );
  let calls = Arc::new(AtomicUsize::new(0));
  let task = write_report(calls.clone());
  let out_path = |record: &strata_store::ExecutionRecord| {
    let blob = record.outputs.as_ref().unwrap()["out"].as_blob().unwrap();
    blob.local_path().unwrap()
  };

  let first = engine.execute_task(&task, LiteralMap::new()).await.unwrap();
  assert_eq!(first.state, ExecutionState::Succeeded);
  let path = out_path(&first);
  assert!(path.starts_with(outputs.path()), "path was {}", path.display());
  assert_eq!(std::fs::read_to_string(&path).unwrap(), "done");

  let second = engine.execute_task(&task, LiteralMap::new()).await.unwrap();
  assert_eq!(second.node(TASK_NODE_ID).unwrap().state, NodeState::Cached);
  assert!(out_path(&second).exists());
  assert_eq!(calls.load(Ordering::SeqCst), 1);

  // A cached entry whose file was removed is recomputed.
  std::fs::remove_file(&path).unwrap();
  let third = engine.execute_task(&task, LiteralMap::new()).await.unwrap();
  assert_eq!(third.node(TASK_NODE_ID).unwrap().state, NodeState::Succeeded);
  assert_eq!(std::fs::read_to_string(out_path(&third)).unwrap(), "done");
  assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_zero_parallelism_still_runs_every_node() {
  let mut config = config();
  config.max_parallelism = 0;
  let engine = Engine::new(
    config,
    Arc::new(InMemoryCacheStore::new()),
    Arc::new(InMemoryExecutionStore::new()),
  );
  let calls = Arc::new(AtomicUsize::new(0));

  let record = engine
    .execute_task(&square("1", LiteralType::Integer, calls.clone()), n(3))
    .await
    .unwrap();

  assert_eq!(record.state, ExecutionState::Succeeded);
  assert_eq!(record.node(TASK_NODE_ID).unwrap().state, NodeState::Succeeded);
  assert_eq!(record.outputs.unwrap()["o0"], Literal::integer(9));
  assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_directory_outputs_round_trip_through_transfer() {
  let remote = tempfile::tempdir().unwrap();
  let transfer = BlobTransfer::new(Arc::new(FsStore::new(remote.path())), "mem");
  let engine = engine().with_blob_transfer(transfer);

  let make = Task::builder("make_parts")
    .output_with_hash("parts", LiteralType::MultiPartBlob(BlobType::any()), "sha256")
    .body_fn(|ctx, _| {
      let dir = ctx.working_dir().join("parts");
      let write = |relative: &str, text: &str| {
        let path = dir.join(relative);
        std::fs::create_dir_all(path.parent().unwrap())?;
        std::fs::write(path, text)
      };
      write("a.txt", "one\n")
        .and_then(|()| write("sub/b.txt", "two\nthree\n"))
        .map_err(|e| TaskError::failed(e.to_string()))?;
      Ok(LiteralMap::from([(
        "parts".to_string(),
        Literal::multipart_blob(dir.to_string_lossy()),
      )]))
    })
    .build()
    .unwrap();

  let count = Task::builder("count_parts")
    .input("parts", LiteralType::MultiPartBlob(BlobType::any()))
    .output("lines", LiteralType::Integer)
    .body_fn(|_, inputs| {
      let root = inputs["parts"]
        .as_blob()
        .and_then(|b| b.local_path())
        .ok_or_else(|| TaskError::failed("parts is not a local directory"))?;
      let read = |relative: &str| {
        std::fs::read_to_string(root.join(relative)).map_err(|e| TaskError::failed(e.to_string()))
      };
      let lines = read("a.txt")?.lines().count() + read("sub/b.txt")?.lines().count();
      Ok(LiteralMap::from([(
        "lines".to_string(),
        Literal::integer(lines as i64),
      )]))
    })
    .build()
    .unwrap();

  let workflow = Workflow::builder("dirs")
    .node(Node::new("make", &make))
    .node(Node::new("count", &count).bind("parts", Binding::output("make", "parts")))
    .output("lines", Binding::output("count", "lines"))
    .build()
    .unwrap();

  let record = engine.execute(&workflow, LiteralMap::new()).await.unwrap();
  assert_eq!(record.state, ExecutionState::Succeeded);
  assert_eq!(record.outputs.as_ref().unwrap()["lines"], Literal::integer(3));

  let Literal::MultiPartBlob(parts) = &record.node("make").unwrap().outputs.as_ref().unwrap()["parts"]
  else {
    panic!("expected a multipart blob");
  };
  assert!(parts.uri.starts_with("mem://"), "uri was {}", parts.uri);
  assert_eq!(parts.hash_method.as_deref(), Some("sha256"));
  assert!(parts.digest.is_some());
  assert_eq!(
    record.node("count").unwrap().inputs["parts"].as_blob().map(|b| &b.uri),
    Some(&parts.uri)
  );

  let stored = FsStore::new(remote.path());
  let prefix = parts.uri.trim_start_matches("mem://");
  let keys = strata_artifact::Store::list(&stored, prefix).await.unwrap();
  assert_eq!(keys, [format!("{prefix}/a.txt"), format!("{prefix}/sub/b.txt")]);
}

fn sum_workflow() -> Workflow {
  Workflow::builder("sum")
    .version("v2")
    .input("a", LiteralType::Integer)
    .input("b", LiteralType::Integer)
    .node(
      Node::new("add", &add())
        .bind("a", Binding::input("a"))
        .bind("b", Binding::input("b")),
    )
    .output("total", Binding::output("add", "o0"))
    .build()
    .unwrap()
}

#[tokio::test]
async fn test_launch_plan_merges_preset_inputs() {
  let engine = engine();
  let plan = LaunchPlan::builder("sum_lp", &sum_workflow())
    .default_input("a", 1i64)
    .fixed_input("b", 100i64)
    .build()
    .unwrap();

  let record = engine
    .launch_plan(&plan, LiteralMap::new(), &LaunchOptions::default())
    .await
    .unwrap()
    .wait()
    .await
    .unwrap();
  assert_eq!(record.state, ExecutionState::Succeeded);
  assert_eq!(record.workflow_version, "v2");
  assert_eq!(record.inputs["a"], Literal::integer(1));
  assert_eq!(record.outputs.unwrap()["total"], Literal::integer(101));

  let inputs = LiteralMap::from([("a".to_string(), Literal::integer(5))]);
  let record = engine
    .launch_plan(&plan, inputs, &LaunchOptions::default())
    .await
    .unwrap()
    .wait()
    .await
    .unwrap();
  assert_eq!(record.outputs.unwrap()["total"], Literal::integer(105));

  let inputs = LiteralMap::from([("b".to_string(), Literal::integer(0))]);
  let err = engine
    .launch_plan(&plan, inputs, &LaunchOptions::default())
    .await
    .unwrap_err();
  assert!(matches!(
    err,
    EngineError::InvalidWorkflow(WorkflowError::FixedInputOverride { .. })
  ));
}

#[tokio::test]
async fn test_named_executions_are_unique() {
  let engine = engine();
  let workflow = sum_workflow();
  let inputs = || {
    LiteralMap::from([
      ("a".to_string(), Literal::integer(2)),
      ("b".to_string(), Literal::integer(3)),
    ])
  };

  let handle = engine
    .launch_with(&workflow, inputs(), &LaunchOptions::named("nightly-sum"))
    .await
    .unwrap();
  assert_eq!(handle.execution_id(), "nightly-sum");
  let record = handle.wait().await.unwrap();
  assert_eq!(record.execution_id, "nightly-sum");

  let err = engine
    .launch_with(&workflow, inputs(), &LaunchOptions::named("nightly-sum"))
    .await
    .unwrap_err();
  assert!(matches!(err, EngineError::Store(StoreError::AlreadyExists(id)) if id == "nightly-sum"));
  let stored = engine.client().get_execution("nightly-sum").await.unwrap();
  assert_eq!(stored, record);

  let err = engine
    .launch_with(&workflow, inputs(), &LaunchOptions::named("a/b"))
    .await
    .unwrap_err();
  assert!(matches!(err, EngineError::InvalidExecutionName(_)));

  let first = engine
    .launch_with(&workflow, inputs(), &LaunchOptions::prefixed("sum"))
    .await
    .unwrap();
  let second = engine
    .launch_with(&workflow, inputs(), &LaunchOptions::prefixed("sum"))
    .await
    .unwrap();
  assert!(first.execution_id().starts_with("sum-"));
  assert_ne!(first.execution_id(), second.execution_id());
  assert_eq!(first.wait().await.unwrap().state, ExecutionState::Succeeded);
  assert_eq!(second.wait().await.unwrap().state, ExecutionState::Succeeded);
}
