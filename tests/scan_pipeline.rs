//! Integration tests for the scan pipeline.
//!
//! A scripted connector stands in for the jump host: it answers the listing
//! command with canned `find` output and each `cat` with canned file text.
//! A recording listener captures the callback sequence.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use upload_scout::error::{RemoteError, ScanError};
use upload_scout::remote::{RemoteConnector, RemoteExecutor};
use upload_scout::scan::{run_scan, ScanSettings, Scanner};
use upload_scout_core::batch::ScanListener;
use upload_scout_core::extract::ExtractionRules;
use upload_scout_core::models::UploadArtifact;
use upload_scout_core::store::memory::InMemoryArtifactStore;
use upload_scout_core::store::ArtifactStore;

const ROOT: &str = "/data/build";

// ─── Scripted remote ────────────────────────────────────────────────

#[derive(Clone)]
enum Listing {
    Output(String),
    FailedWith(String),
}

#[derive(Default)]
struct Log {
    commands: Mutex<Vec<String>>,
    closed: Mutex<bool>,
}

#[derive(Clone)]
struct ScriptedConnector {
    listing: Listing,
    files: Arc<HashMap<String, String>>,
    refuse: bool,
    gate: Option<Arc<Notify>>,
    log: Arc<Log>,
}

impl ScriptedConnector {
    fn new(listing: &str, files: &[(&str, &str)]) -> Self {
        Self {
            listing: Listing::Output(listing.to_string()),
            files: Arc::new(
                files
                    .iter()
                    .map(|(p, c)| (p.to_string(), c.to_string()))
                    .collect(),
            ),
            refuse: false,
            gate: None,
            log: Arc::new(Log::default()),
        }
    }

    fn commands(&self) -> Vec<String> {
        self.log.commands.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemoteConnector for ScriptedConnector {
    async fn connect(&self) -> Result<Box<dyn RemoteExecutor>, RemoteError> {
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if self.refuse {
            return Err(RemoteError::AuthRejected("builder".to_string()));
        }
        Ok(Box::new(ScriptedExecutor {
            listing: self.listing.clone(),
            files: Arc::clone(&self.files),
            log: Arc::clone(&self.log),
        }))
    }
}

struct ScriptedExecutor {
    listing: Listing,
    files: Arc<HashMap<String, String>>,
    log: Arc<Log>,
}

#[async_trait]
impl RemoteExecutor for ScriptedExecutor {
    async fn execute(&self, command: &str) -> Result<String, RemoteError> {
        self.log.commands.lock().unwrap().push(command.to_string());

        if command.starts_with("cd ") {
            return match &self.listing {
                Listing::Output(out) => Ok(out.clone()),
                Listing::FailedWith(out) => Err(RemoteError::CommandFailed {
                    status: 1,
                    output: out.clone(),
                }),
            };
        }

        let path = command
            .strip_prefix("cat '")
            .and_then(|rest| rest.strip_suffix('\''))
            .unwrap_or_default();
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| RemoteError::CommandFailed {
                status: 1,
                output: String::new(),
            })
    }

    async fn close(&self) {
        *self.log.closed.lock().unwrap() = true;
    }
}

// ─── Recording listener ─────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Event {
    Progress(String, usize, usize),
    Batch(Vec<String>),
    Complete,
}

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<Event>>,
    cancel_at: Option<(usize, CancellationToken)>,
    cancel_on_batch: Option<CancellationToken>,
}

impl Recorder {
    fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    fn batch_sizes(&self) -> Vec<usize> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Batch(images) => Some(images.len()),
                _ => None,
            })
            .collect()
    }
}

impl ScanListener for Recorder {
    fn on_progress(&self, directory: &str, processed: usize, total: usize) {
        self.events
            .lock()
            .unwrap()
            .push(Event::Progress(directory.to_string(), processed, total));
        if let Some((at, token)) = &self.cancel_at {
            if processed == *at {
                token.cancel();
            }
        }
    }

    fn on_batch_result(&self, artifacts: &[UploadArtifact]) {
        self.events.lock().unwrap().push(Event::Batch(
            artifacts.iter().map(|a| a.image.clone()).collect(),
        ));
        if let Some(token) = &self.cancel_on_batch {
            token.cancel();
        }
    }

    fn on_complete(&self) {
        self.events.lock().unwrap().push(Event::Complete);
    }
}

// ─── Failing store ──────────────────────────────────────────────────

/// Memory store whose `insert_artifacts` fails from the `fail_on`-th call.
struct FlakyStore {
    inner: InMemoryArtifactStore,
    inserts: AtomicUsize,
    fail_on: usize,
}

impl FlakyStore {
    fn failing_on(fail_on: usize) -> Self {
        Self {
            inner: InMemoryArtifactStore::new(),
            inserts: AtomicUsize::new(0),
            fail_on,
        }
    }
}

#[async_trait]
impl ArtifactStore for FlakyStore {
    async fn delete_all_artifacts(&self) -> anyhow::Result<u64> {
        self.inner.delete_all_artifacts().await
    }

    async fn insert_artifacts(&self, batch: &[UploadArtifact]) -> anyhow::Result<()> {
        let call = self.inserts.fetch_add(1, Ordering::SeqCst) + 1;
        if call >= self.fail_on {
            anyhow::bail!("disk full");
        }
        self.inner.insert_artifacts(batch).await
    }

    async fn find_by_exact_image(&self, image: &str) -> anyhow::Result<Vec<UploadArtifact>> {
        self.inner.find_by_exact_image(image).await
    }

    async fn find_by_image_template1(
        &self,
        image: &str,
    ) -> anyhow::Result<Vec<UploadArtifact>> {
        self.inner.find_by_image_template1(image).await
    }

    async fn find_by_image_template2(
        &self,
        base_name: &str,
    ) -> anyhow::Result<Vec<UploadArtifact>> {
        self.inner.find_by_image_template2(base_name).await
    }

    async fn list_artifacts(&self) -> anyhow::Result<Vec<UploadArtifact>> {
        self.inner.list_artifacts().await
    }
}

// ─── Fixtures ───────────────────────────────────────────────────────

fn settings(batch_size: usize) -> ScanSettings {
    ScanSettings {
        root_path: ROOT.to_string(),
        rules: ExtractionRules::default(),
        batch_size,
    }
}

const DOCKERFILE: &str = "FROM openjdk:8-jre\nCOPY target/orders.jar /app/app.jar\nEXPOSE 8080\n";

fn old_artifact() -> UploadArtifact {
    UploadArtifact {
        directory: "/old".to_string(),
        script: "old.sh".to_string(),
        package_name: "old.jar".to_string(),
        image: "h/old/app".to_string(),
    }
}

/// Five directories, each with a descriptor and one script.
fn five_services() -> ScriptedConnector {
    let mut listing = String::new();
    let mut files = Vec::new();
    for n in 0..5 {
        listing.push_str(&format!("./svc{n}/Dockerfile\n./svc{n}/deploy.sh\n"));
        files.push((format!("{ROOT}/svc{n}/Dockerfile"), DOCKERFILE.to_string()));
        files.push((
            format!("{ROOT}/svc{n}/deploy.sh"),
            format!("docker build -t h/shop/svc{n}:$1 .\ndocker push h/shop/svc{n}:$1\n"),
        ));
    }
    let files: Vec<(&str, &str)> = files
        .iter()
        .map(|(p, c)| (p.as_str(), c.as_str()))
        .collect();
    ScriptedConnector::new(&listing, &files)
}

// ─── Tests ──────────────────────────────────────────────────────────

#[tokio::test]
async fn one_directory_two_scripts_yields_two_artifacts() {
    let connector = ScriptedConnector::new(
        "./a/b/Dockerfile\r\n./a/b/deploy.sh\r\n./a/b/rollback.sh\r\n",
        &[
            ("/data/build/a/b/Dockerfile", DOCKERFILE),
            ("/data/build/a/b/deploy.sh", "#!/bin/sh\ndocker push h/shop/orders:$1\n"),
            ("/data/build/a/b/rollback.sh", "docker push h/shop/orders-rollback:$1\n"),
        ],
    );
    let store = InMemoryArtifactStore::new();
    let recorder = Recorder::default();

    let summary = run_scan(
        &connector,
        &store,
        &settings(20),
        &recorder,
        &CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(summary.directories_total, 1);
    assert_eq!(summary.artifacts, 2);
    assert!(!summary.cancelled);

    let stored = store.list_artifacts().await.unwrap();
    assert_eq!(stored.len(), 2);
    assert!(stored.iter().all(|a| a.package_name == "target/orders.jar"));
    assert!(stored.iter().all(|a| a.directory == "/data/build/a/b"));
    assert_eq!(stored[0].script, "deploy.sh");
    assert_eq!(stored[0].image, "h/shop/orders:$1");
    assert_eq!(stored[1].image, "h/shop/orders-rollback:$1");

    assert_eq!(
        recorder.events(),
        vec![
            Event::Progress("/data/build/a/b".to_string(), 1, 1),
            Event::Batch(vec![
                "h/shop/orders:$1".to_string(),
                "h/shop/orders-rollback:$1".to_string()
            ]),
            Event::Complete,
        ]
    );

    // One listing, one descriptor read, one read per script.
    let commands = connector.commands();
    assert_eq!(commands.len(), 4);
    assert!(commands[0].starts_with("cd '/data/build' && find . -type f"));
    assert_eq!(commands[1], "cat '/data/build/a/b/Dockerfile'");
    assert!(*connector.log.closed.lock().unwrap());
}

#[tokio::test]
async fn directories_missing_descriptor_or_script_yield_nothing() {
    let connector = ScriptedConnector::new(
        "./only-descriptor/Dockerfile\n./only-scripts/deploy.sh\n",
        &[
            ("/data/build/only-descriptor/Dockerfile", DOCKERFILE),
            ("/data/build/only-scripts/deploy.sh", "docker push h/x/y:$1\n"),
        ],
    );
    let store = InMemoryArtifactStore::with_artifacts(vec![old_artifact()]);
    let recorder = Recorder::default();

    let summary = run_scan(
        &connector,
        &store,
        &settings(2),
        &recorder,
        &CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(summary.directories_processed, 2);
    assert_eq!(summary.artifacts, 0);
    assert!(store.list_artifacts().await.unwrap().is_empty());
    assert_eq!(
        recorder.events(),
        vec![
            Event::Progress("/data/build/only-descriptor".to_string(), 1, 2),
            Event::Progress("/data/build/only-scripts".to_string(), 2, 2),
            Event::Complete,
        ]
    );
    // Only the listing ran; neither directory qualified for reads.
    assert_eq!(connector.commands().len(), 1);
}

#[tokio::test]
async fn five_artifacts_arrive_in_batches_of_two_two_one() {
    let connector = five_services();
    let store = InMemoryArtifactStore::new();
    let recorder = Recorder::default();

    let summary = run_scan(
        &connector,
        &store,
        &settings(2),
        &recorder,
        &CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(recorder.batch_sizes(), vec![2, 2, 1]);
    assert_eq!(recorder.events().last(), Some(&Event::Complete));
    assert_eq!(
        recorder
            .events()
            .iter()
            .filter(|e| **e == Event::Complete)
            .count(),
        1
    );
    assert_eq!(summary.batches, 3);
    assert_eq!(summary.artifacts, 5);
    assert_eq!(store.list_artifacts().await.unwrap().len(), 5);

    let indices: Vec<usize> = recorder
        .events()
        .into_iter()
        .filter_map(|e| match e {
            Event::Progress(_, n, total) => {
                assert_eq!(total, 5);
                Some(n)
            }
            _ => None,
        })
        .collect();
    assert_eq!(indices, vec![1, 2, 3, 4, 5]);
}

#[tokio::test]
async fn connection_failure_still_completes() {
    let mut connector = five_services();
    connector.refuse = true;
    let store = InMemoryArtifactStore::with_artifacts(vec![old_artifact()]);
    let recorder = Recorder::default();

    let err = run_scan(
        &connector,
        &store,
        &settings(2),
        &recorder,
        &CancellationToken::new(),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, ScanError::Connection(RemoteError::AuthRejected(_))));
    assert_eq!(recorder.events(), vec![Event::Complete]);
    assert_eq!(store.list_artifacts().await.unwrap().len(), 1);
}

#[tokio::test]
async fn listing_failure_without_output_is_fatal_and_keeps_store() {
    let mut connector = five_services();
    connector.listing = Listing::FailedWith(String::new());
    let store = InMemoryArtifactStore::with_artifacts(vec![old_artifact()]);
    let recorder = Recorder::default();

    let err = run_scan(
        &connector,
        &store,
        &settings(2),
        &recorder,
        &CancellationToken::new(),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, ScanError::Listing(_)));
    assert_eq!(recorder.events(), vec![Event::Complete]);
    assert_eq!(store.list_artifacts().await.unwrap().len(), 1);
    assert!(*connector.log.closed.lock().unwrap());
}

#[tokio::test]
async fn listing_failure_with_output_uses_the_output() {
    let mut connector = five_services();
    connector.listing = Listing::FailedWith("./svc0/Dockerfile\n./svc0/deploy.sh\n".to_string());
    let store = InMemoryArtifactStore::new();
    let recorder = Recorder::default();

    let summary = run_scan(
        &connector,
        &store,
        &settings(2),
        &recorder,
        &CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(summary.directories_total, 1);
    assert_eq!(summary.artifacts, 1);
}

#[tokio::test]
async fn empty_listing_clears_store_and_completes() {
    let connector = ScriptedConnector::new("", &[]);
    let store = InMemoryArtifactStore::with_artifacts(vec![old_artifact()]);
    let recorder = Recorder::default();

    let summary = run_scan(
        &connector,
        &store,
        &settings(2),
        &recorder,
        &CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(summary.directories_total, 0);
    assert!(store.list_artifacts().await.unwrap().is_empty());
    assert_eq!(recorder.events(), vec![Event::Complete]);
}

#[tokio::test]
async fn unreadable_script_is_skipped() {
    let connector = ScriptedConnector::new(
        "./a/Dockerfile\n./a/broken.sh\n./a/deploy.sh\n./b/Dockerfile\n./b/deploy.sh\n",
        &[
            ("/data/build/a/Dockerfile", DOCKERFILE),
            ("/data/build/a/deploy.sh", "docker push h/shop/a:$1\n"),
            // b's descriptor has no package line.
            ("/data/build/b/Dockerfile", "FROM scratch\n"),
            ("/data/build/b/deploy.sh", "docker push h/shop/b:$1\n"),
        ],
    );
    let store = InMemoryArtifactStore::new();
    let recorder = Recorder::default();

    let summary = run_scan(
        &connector,
        &store,
        &settings(10),
        &recorder,
        &CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(summary.artifacts, 1);
    let stored = store.list_artifacts().await.unwrap();
    assert_eq!(stored[0].script, "deploy.sh");
    assert_eq!(stored[0].image, "h/shop/a:$1");
    // b's script is never read once its descriptor has no package.
    assert!(!connector
        .commands()
        .contains(&"cat '/data/build/b/deploy.sh'".to_string()));
}

#[tokio::test]
async fn cancelled_before_start_touches_nothing() {
    let connector = five_services();
    let store = InMemoryArtifactStore::with_artifacts(vec![old_artifact()]);
    let recorder = Recorder::default();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let summary = run_scan(&connector, &store, &settings(2), &recorder, &cancel)
        .await
        .unwrap();

    assert!(summary.cancelled);
    assert!(connector.commands().is_empty());
    assert_eq!(store.list_artifacts().await.unwrap().len(), 1);
    assert_eq!(recorder.events(), vec![Event::Complete]);
}

#[tokio::test]
async fn cancellation_mid_scan_suppresses_further_batches() {
    let connector = five_services();
    let store = InMemoryArtifactStore::new();
    let cancel = CancellationToken::new();
    let recorder = Recorder {
        cancel_at: Some((2, cancel.clone())),
        ..Default::default()
    };

    let summary = run_scan(&connector, &store, &settings(1), &recorder, &cancel)
        .await
        .unwrap();

    assert!(summary.cancelled);
    assert_eq!(summary.artifacts, 1);
    assert_eq!(
        recorder.events(),
        vec![
            Event::Progress("/data/build/svc0".to_string(), 1, 5),
            Event::Batch(vec!["h/shop/svc0:$1".to_string()]),
            Event::Progress("/data/build/svc1".to_string(), 2, 5),
            Event::Complete,
        ]
    );
    assert_eq!(store.list_artifacts().await.unwrap().len(), 1);
}

#[tokio::test]
async fn scanner_rejects_a_second_concurrent_scan() {
    let gate = Arc::new(Notify::new());
    let mut connector = five_services();
    connector.gate = Some(Arc::clone(&gate));

    let store: Arc<dyn ArtifactStore> = Arc::new(InMemoryArtifactStore::new());
    let scanner = Scanner::new(Arc::new(connector), Arc::clone(&store), settings(2));

    let first = Arc::new(Recorder::default());
    let handle = scanner.spawn(first.clone()).unwrap();
    assert!(scanner.is_running());

    let second = Arc::new(Recorder::default());
    let err = scanner.clone().spawn(second.clone()).err().unwrap();
    assert!(matches!(err, ScanError::AlreadyRunning));
    assert!(second.events().is_empty());

    gate.notify_one();
    let summary = handle.wait().await.unwrap();
    assert_eq!(summary.artifacts, 5);
    assert_eq!(first.batch_sizes(), vec![2, 2, 1]);
    assert!(!scanner.is_running());

    // The guard is released once the scan ends.
    gate.notify_one();
    let again = scanner.spawn(Arc::new(Recorder::default())).unwrap();
    again.wait().await.unwrap();
}

#[tokio::test]
async fn scan_handle_cancel_stops_a_waiting_scan() {
    let gate = Arc::new(Notify::new());
    let mut connector = five_services();
    connector.gate = Some(Arc::clone(&gate));

    let store: Arc<dyn ArtifactStore> = Arc::new(InMemoryArtifactStore::new());
    let scanner = Scanner::new(Arc::new(connector), Arc::clone(&store), settings(2));

    let recorder = Arc::new(Recorder::default());
    let handle = scanner.spawn(recorder.clone()).unwrap();
    handle.cancel();
    gate.notify_one();

    let summary = handle.wait().await.unwrap();
    assert!(summary.cancelled);
    assert_eq!(summary.artifacts, 0);
    assert_eq!(recorder.events().last(), Some(&Event::Complete));
    assert!(recorder.batch_sizes().is_empty());
}

#[tokio::test]
async fn scan_into_sqlite_then_match() {
    let tmp = tempfile::TempDir::new().unwrap();
    let pool = upload_scout::db::connect_path(&tmp.path().join("scout.sqlite"))
        .await
        .unwrap();
    upload_scout::migrate::apply_schema(&pool).await.unwrap();
    let store = upload_scout::sqlite_store::SqliteArtifactStore::new(pool);
    store.insert_artifacts(&[old_artifact()]).await.unwrap();

    let recorder = Recorder::default();
    run_scan(
        &five_services(),
        &store,
        &settings(2),
        &recorder,
        &CancellationToken::new(),
    )
    .await
    .unwrap();

    let stored = store.list_artifacts().await.unwrap();
    assert_eq!(stored.len(), 5);
    assert!(stored.iter().all(|a| a.directory != "/old"));

    let matches = upload_scout_core::ranking::find_upload_matches(
        &store,
        "h/shop/svc3:2024.1",
        "corp-shop-prod",
    )
    .await
    .unwrap();
    assert_eq!(matches.len(), 1);
    assert_eq!(
        matches[0].invocation.command(),
        "cd /data/build/svc3 && sh deploy.sh 2024.1"
    );
}

#[tokio::test]
async fn cancel_from_batch_callback_stops_remaining_artifacts() {
    let connector = ScriptedConnector::new(
        "./a/b/Dockerfile\n./a/b/deploy.sh\n./a/b/rollback.sh\n",
        &[
            ("/data/build/a/b/Dockerfile", DOCKERFILE),
            ("/data/build/a/b/deploy.sh", "docker push h/shop/orders:$1\n"),
            ("/data/build/a/b/rollback.sh", "docker push h/shop/rb:$1\n"),
        ],
    );
    let store = InMemoryArtifactStore::new();
    let cancel = CancellationToken::new();
    let recorder = Recorder {
        cancel_on_batch: Some(cancel.clone()),
        ..Default::default()
    };

    let summary = run_scan(&connector, &store, &settings(1), &recorder, &cancel)
        .await
        .unwrap();

    assert!(summary.cancelled);
    assert_eq!(summary.batches, 1);
    assert_eq!(
        recorder.events(),
        vec![
            Event::Progress("/data/build/a/b".to_string(), 1, 1),
            Event::Batch(vec!["h/shop/orders:$1".to_string()]),
            Event::Complete,
        ]
    );
    let stored = store.list_artifacts().await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].image, "h/shop/orders:$1");
}

#[tokio::test]
async fn store_write_failure_fails_the_scan_and_completes_once() {
    let connector = five_services();
    let store = FlakyStore::failing_on(2);
    let recorder = Recorder::default();

    let err = run_scan(
        &connector,
        &store,
        &settings(2),
        &recorder,
        &CancellationToken::new(),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, ScanError::Store(_)));

    let events = recorder.events();
    assert_eq!(
        events.iter().find(|e| matches!(e, Event::Batch(_))),
        Some(&Event::Batch(vec![
            "h/shop/svc0:$1".to_string(),
            "h/shop/svc1:$1".to_string()
        ]))
    );
    // The batch whose write failed was already handed out; nothing after it.
    assert_eq!(recorder.batch_sizes(), vec![2, 2]);
    assert_eq!(events.iter().filter(|e| **e == Event::Complete).count(), 1);
    assert_eq!(events.last(), Some(&Event::Complete));

    assert_eq!(store.inner.list_artifacts().await.unwrap().len(), 2);
    assert!(*connector.log.closed.lock().unwrap());
}

#[tokio::test]
async fn listing_failure_with_only_whitespace_is_not_fatal() {
    let mut connector = five_services();
    connector.listing = Listing::FailedWith("\n".to_string());
    let store = InMemoryArtifactStore::with_artifacts(vec![old_artifact()]);
    let recorder = Recorder::default();

    let summary = run_scan(
        &connector,
        &store,
        &settings(2),
        &recorder,
        &CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(summary.directories_total, 0);
    assert!(store.list_artifacts().await.unwrap().is_empty());
    assert_eq!(recorder.events(), vec![Event::Complete]);
}
