//! Integration tests for the dispatcher, manifest worker and result sink.
//!
//! Primary fetches go to a wiremock server; the fallback is an in-test
//! transport so no external program is needed.

use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use batchfetch_core::download::{
    Dispatcher, DownloadError, HttpTransport, ItemDownloader, ManifestWorker, ResumePolicy,
    RetryPolicy, Transport, WorkerError,
};
use batchfetch_core::manifest::{Manifest, ManifestEntry};
use batchfetch_core::output::{OutputLayout, ResultSink};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Fallback double: succeeds for URLs in `allowed`, counts every call.
struct AllowListFallback {
    allowed: HashSet<String>,
    calls: AtomicUsize,
}

impl AllowListFallback {
    fn new(allowed: &[String]) -> Arc<Self> {
        Arc::new(Self {
            allowed: allowed.iter().cloned().collect(),
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl Transport for AllowListFallback {
    fn name(&self) -> &str {
        "allow-list"
    }

    async fn fetch(&self, url: &str, dest: &Path) -> Result<(), DownloadError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.allowed.contains(url) {
            tokio::fs::write(dest, b"from fallback")
                .await
                .map_err(|e| DownloadError::io(dest, e))?;
            Ok(())
        } else {
            Err(DownloadError::http_status(url, 502))
        }
    }
}

/// Transport that tracks how many fetches run at the same time.
#[derive(Default)]
struct GaugeTransport {
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    calls: AtomicUsize,
    fail_urls: Mutex<HashSet<String>>,
}

#[async_trait]
impl Transport for GaugeTransport {
    fn name(&self) -> &str {
        "gauge"
    }

    async fn fetch(&self, url: &str, dest: &Path) -> Result<(), DownloadError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(15)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.fail_urls.lock().unwrap().contains(url) {
            return Err(DownloadError::http_status(url, 500));
        }
        tokio::fs::write(dest, url)
            .await
            .map_err(|e| DownloadError::io(dest, e))
    }
}

fn fast_downloader(
    primary: Arc<dyn Transport>,
    fallback: Option<Arc<dyn Transport>>,
) -> ItemDownloader {
    ItemDownloader::new(primary, fallback)
        .with_retry_policy(RetryPolicy::new(2, Duration::ZERO))
        .with_pacing(Duration::ZERO)
}

async fn layout_in(temp_dir: &TempDir) -> OutputLayout {
    let layout = OutputLayout::new(temp_dir.path().join("out"));
    layout.ensure_dirs().await.expect("create layout");
    layout
}

fn write_manifest(dir: &Path, name: &str, urls: &[String]) -> std::path::PathBuf {
    let mut body = String::from("url,caption\n");
    for (i, url) in urls.iter().enumerate() {
        body.push_str(&format!("{url},caption {i}\n"));
    }
    let path = dir.join(name);
    std::fs::write(&path, body).expect("write manifest");
    path
}

#[tokio::test]
async fn test_primary_fallback_and_failure_scenario() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/0.jpg"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"primary".to_vec()))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    let urls: Vec<String> = (0..3)
        .map(|i| format!("{}/{i}.jpg", mock_server.uri()))
        .collect();
    let fallback = AllowListFallback::new(&urls[1..2]);

    let temp_dir = TempDir::new().unwrap();
    let layout = layout_in(&temp_dir).await;
    let sink = ResultSink::new(layout.clone());
    let downloader = fast_downloader(
        Arc::new(HttpTransport::new().unwrap()),
        Some(fallback.clone()),
    );
    let dispatcher = Dispatcher::new(4, Arc::new(downloader)).unwrap();
    let worker = ManifestWorker::new(&dispatcher, &layout, &sink);

    let manifest = Manifest::new(
        "m",
        urls.iter()
            .enumerate()
            .map(|(i, url)| ManifestEntry::new(url.clone(), format!("cap{i}")))
            .collect(),
    );
    let outcome = worker.process(&manifest).await.unwrap();

    let successes: Vec<_> = outcome
        .successes
        .iter()
        .map(|r| (r.path.as_str(), r.caption.as_str()))
        .collect();
    assert_eq!(
        successes,
        [("Data/m/0.jpg", "cap0"), ("Data/m/1.jpg", "cap1")]
    );
    assert_eq!(outcome.failures.len(), 1);
    assert_eq!(outcome.failures[0].index, 2);
    assert_eq!(outcome.failures[0].url, urls[2]);
    assert_eq!(outcome.failures[0].caption, "cap2");

    // item 1 once, item 2 once per attempt
    assert_eq!(fallback.calls.load(Ordering::SeqCst), 3);
    assert_eq!(
        std::fs::read(layout.data_dir("m").join("0.jpg")).unwrap(),
        b"primary"
    );
    assert_eq!(
        std::fs::read(layout.data_dir("m").join("1.jpg")).unwrap(),
        b"from fallback"
    );
    assert!(!layout.data_dir("m").join("2.jpg").exists());

    let log = std::fs::read_to_string(layout.log_path("m")).unwrap();
    assert_eq!(log, format!("HTTP 404. {}\n", urls[2]));

    sink.finalize("m", outcome).await.unwrap();
    let miss = std::fs::read_to_string(layout.miss_path("m")).unwrap();
    assert_eq!(miss.lines().count(), 2, "header plus one row: {miss}");
}

#[tokio::test]
async fn test_in_flight_fetches_never_exceed_pool_size_across_manifests() {
    let temp_dir = TempDir::new().unwrap();
    let layout = layout_in(&temp_dir).await;
    let sink = ResultSink::new(layout.clone());
    let gauge = Arc::new(GaugeTransport::default());
    let dispatcher = Dispatcher::new(3, Arc::new(fast_downloader(gauge.clone(), None)))
        .unwrap()
        .with_max_active_manifests(3);

    let input = temp_dir.path().join("in");
    std::fs::create_dir(&input).unwrap();
    let manifests: Vec<_> = (0..3)
        .map(|m| {
            let urls: Vec<String> = (0..10).map(|i| format!("http://h/{m}/{i}.jpg")).collect();
            write_manifest(&input, &format!("part_{m}.csv"), &urls)
        })
        .collect();

    let report = dispatcher.run(manifests, &layout, &sink).await;

    assert!(report.aborted().is_empty());
    assert_eq!(report.completed().len(), 3);
    assert_eq!(report.succeeded_items(), 30);
    assert_eq!(gauge.calls.load(Ordering::SeqCst), 30);
    let max = gauge.max_in_flight.load(Ordering::SeqCst);
    assert!(max <= 3, "observed {max} concurrent fetches with a pool of 3");
    assert!(max >= 1);
}

#[tokio::test]
async fn test_every_item_is_counted_exactly_once() {
    let temp_dir = TempDir::new().unwrap();
    let layout = layout_in(&temp_dir).await;
    let sink = ResultSink::new(layout.clone());
    let gauge = Arc::new(GaugeTransport::default());
    let urls: Vec<String> = (0..25).map(|i| format!("http://h/{i}.jpg")).collect();
    for url in urls.iter().step_by(4) {
        gauge.fail_urls.lock().unwrap().insert(url.clone());
    }
    let dispatcher = Dispatcher::new(8, Arc::new(fast_downloader(gauge.clone(), None))).unwrap();
    let worker = ManifestWorker::new(&dispatcher, &layout, &sink);

    let manifest = Manifest::new(
        "m",
        urls.iter().map(|u| ManifestEntry::new(u.clone(), "c")).collect(),
    );
    let outcome = worker.process(&manifest).await.unwrap();

    assert_eq!(outcome.total(), 25);
    assert_eq!(outcome.failures.len(), 7);
    let mut indexes: Vec<_> = outcome
        .successes
        .iter()
        .map(|r| r.index)
        .chain(outcome.failures.iter().map(|r| r.index))
        .collect();
    indexes.sort_unstable();
    assert_eq!(indexes, (0..25).collect::<Vec<_>>());
    assert!(outcome.successes.windows(2).all(|w| w[0].index < w[1].index));
}

#[tokio::test]
async fn test_rerun_only_fetches_missing_items() {
    let temp_dir = TempDir::new().unwrap();
    let layout = layout_in(&temp_dir).await;
    let sink = ResultSink::new(layout.clone());
    let input = temp_dir.path().join("in");
    std::fs::create_dir(&input).unwrap();
    let urls: Vec<String> = (0..4).map(|i| format!("http://h/{i}.jepg")).collect();
    let manifest_path = write_manifest(&input, "batch_7.csv", &urls);

    // First run: item 2 fails.
    let first = Arc::new(GaugeTransport::default());
    first.fail_urls.lock().unwrap().insert(urls[2].clone());
    let dispatcher = Dispatcher::new(2, Arc::new(fast_downloader(first.clone(), None))).unwrap();
    let report = dispatcher
        .run(vec![manifest_path.clone()], &layout, &sink)
        .await;
    assert_eq!(report.failed_items(), 1);
    assert!(layout.miss_path("batch_7").exists());
    assert!(layout.data_dir("batch_7").join("0.jpeg").exists());

    // Second run: only the missing item is fetched.
    let second = Arc::new(GaugeTransport::default());
    let dispatcher = Dispatcher::new(2, Arc::new(fast_downloader(second.clone(), None))).unwrap();
    let report = dispatcher.run(vec![manifest_path], &layout, &sink).await;

    assert_eq!(second.calls.load(Ordering::SeqCst), 1);
    let manifest_report = &report.completed()[0];
    assert_eq!(manifest_report.succeeded, 4);
    assert_eq!(manifest_report.resumed, 3);
    assert_eq!(manifest_report.failed, 0);
    assert!(!layout.miss_path("batch_7").exists());
    let annotation = std::fs::read_to_string(layout.annotation_path("batch_7")).unwrap();
    assert_eq!(annotation.lines().count(), 5);
    assert!(annotation.contains("Data/batch_7/2.jpeg,caption 2"));
}

#[tokio::test]
async fn test_refetch_policy_clears_previous_output() {
    let temp_dir = TempDir::new().unwrap();
    let layout = layout_in(&temp_dir).await;
    let sink = ResultSink::new(layout.clone());
    let stale = layout.data_dir("m").join("99.jpg");
    std::fs::create_dir_all(layout.data_dir("m")).unwrap();
    std::fs::write(&stale, b"old").unwrap();
    std::fs::write(layout.data_dir("m").join("0.jpg"), b"old").unwrap();

    let gauge = Arc::new(GaugeTransport::default());
    let downloader =
        fast_downloader(gauge.clone(), None).with_resume_policy(ResumePolicy::Refetch);
    let dispatcher = Dispatcher::new(2, Arc::new(downloader)).unwrap();
    let worker = ManifestWorker::new(&dispatcher, &layout, &sink);

    let manifest = Manifest::new("m", vec![ManifestEntry::new("http://h/0.jpg", "c")]);
    let outcome = worker.process(&manifest).await.unwrap();

    assert_eq!(outcome.resumed, 0);
    assert_eq!(gauge.calls.load(Ordering::SeqCst), 1);
    assert!(!stale.exists());
}

#[tokio::test]
async fn test_missing_manifest_aborts_only_that_manifest() {
    let temp_dir = TempDir::new().unwrap();
    let layout = layout_in(&temp_dir).await;
    let sink = ResultSink::new(layout.clone());
    let input = temp_dir.path().join("in");
    std::fs::create_dir(&input).unwrap();
    let good = write_manifest(&input, "good_1.csv", &["http://h/0.jpg".to_string()]);
    let missing = input.join("missing_2.csv");

    let gauge = Arc::new(GaugeTransport::default());
    let dispatcher = Dispatcher::new(2, Arc::new(fast_downloader(gauge, None))).unwrap();
    let report = dispatcher.run(vec![missing.clone(), good], &layout, &sink).await;

    assert_eq!(report.completed().len(), 1);
    assert_eq!(report.completed()[0].id, "good_1");
    assert_eq!(report.aborted().len(), 1);
    assert_eq!(report.aborted()[0].0, missing);
    assert!(matches!(report.aborted()[0].1, WorkerError::Manifest(_)));
}

#[tokio::test]
async fn test_uncreatable_data_dir_is_setup_error() {
    let temp_dir = TempDir::new().unwrap();
    let layout = layout_in(&temp_dir).await;
    let sink = ResultSink::new(layout.clone());
    // A regular file where the manifest's data directory should go.
    std::fs::write(layout.data_dir("m"), b"not a dir").unwrap();

    let gauge = Arc::new(GaugeTransport::default());
    let dispatcher =
        Dispatcher::new(2, Arc::new(fast_downloader(gauge.clone(), None))).unwrap();
    let worker = ManifestWorker::new(&dispatcher, &layout, &sink);

    let manifest = Manifest::new("m", vec![ManifestEntry::new("http://h/0.jpg", "c")]);
    let result = worker.process(&manifest).await;

    assert!(matches!(result, Err(WorkerError::Setup { .. })));
    assert_eq!(gauge.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_submit_returns_handle_resolving_the_item() {
    let temp_dir = TempDir::new().unwrap();
    let layout = layout_in(&temp_dir).await;
    std::fs::create_dir_all(layout.data_dir("m")).unwrap();
    let log = Arc::new(
        batchfetch_core::download::DiagnosticLog::create(layout.log_path("m"))
            .await
            .unwrap(),
    );
    let gauge = Arc::new(GaugeTransport::default());
    let dispatcher = Dispatcher::new(1, Arc::new(fast_downloader(gauge, None))).unwrap();

    let item = batchfetch_core::download::Item {
        index: 5,
        url: "http://h/5.jpg".to_string(),
        caption: "five".to_string(),
        dest: layout.data_dir("m").join("5.jpg"),
        exists: false,
    };
    let handle = dispatcher.submit(item, log).await.unwrap();
    let result = handle.await.unwrap();

    assert!(result.is_success());
    assert_eq!(result.index(), 5);
}
