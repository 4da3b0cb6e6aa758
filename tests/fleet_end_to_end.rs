//! End-to-end tests: an in-process fleet behind a real listener.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use ssr_app_server::cache::MemoryCache;
use ssr_app_server::config::AppServerConfig;
use ssr_app_server::deploy::{DownloadError, Downloader, Notifier, NotifierError, Subscription};
use ssr_app_server::lifecycle::{AppServer, AppSource, RunningServer, StartError};
use ssr_app_server::supervisor::WorkerFactory;
use ssr_app_server::worker::{Worker, WorkerEnv};

mod common;
use common::{counting_factory, eventually, stalling_factory, CountingRenderer, StallingRenderer};

const PAGE: &str = "<html><head></head><body>Welcome</body></html>";

fn config(workers: usize) -> AppServerConfig {
    let mut config = AppServerConfig::default();
    config.listener.host = Some("127.0.0.1".to_string());
    config.listener.port = Some(0);
    config.app.workers = workers;
    config
}

fn shell_workers(config: &AppServerConfig) -> WorkerFactory {
    let worker_config = config.worker_config();
    Arc::new(move |env: WorkerEnv| Worker::new(worker_config.clone(), env))
}

async fn start(config: AppServerConfig, source: AppSource, factory: WorkerFactory) -> RunningServer {
    AppServer::new(config, source)
        .in_process(factory)
        .start()
        .await
        .unwrap()
}

async fn fetch(server: &RunningServer, path: &str) -> (u16, String) {
    let addr = server.local_addr().unwrap();
    let response = reqwest::get(format!("http://{}{}", addr, path)).await.unwrap();
    let status = response.status().as_u16();
    (status, response.text().await.unwrap())
}

async fn within<T>(future: impl std::future::Future<Output = T>) -> T {
    tokio::time::timeout(Duration::from_secs(10), future)
        .await
        .expect("timed out")
}

/// Downloader whose result is set by the test.
struct ScriptedDownloader {
    result: Mutex<Result<PathBuf, String>>,
}

impl ScriptedDownloader {
    fn not_found() -> Arc<Self> {
        Arc::new(Self {
            result: Mutex::new(Err("not found".to_string())),
        })
    }

    fn publish(&self, path: PathBuf) {
        *self.result.lock().unwrap() = Ok(path);
    }

    fn fail(&self, detail: &str) {
        *self.result.lock().unwrap() = Err(detail.to_string());
    }
}

#[async_trait]
impl Downloader for ScriptedDownloader {
    async fn download(&self) -> Result<PathBuf, DownloadError> {
        match &*self.result.lock().unwrap() {
            Ok(path) => Ok(path.clone()),
            Err(detail) if detail == "not found" => Err(DownloadError::AppNotFound),
            Err(detail) => Err(DownloadError::Failed(detail.clone())),
        }
    }
}

/// Notifier fired by the test, or one that refuses to subscribe.
#[derive(Default)]
struct ManualNotifier {
    refuse: bool,
    tx: Mutex<Option<mpsc::UnboundedSender<()>>>,
}

impl ManualNotifier {
    fn fire(&self) {
        if let Some(tx) = &*self.tx.lock().unwrap() {
            tx.send(()).unwrap();
        }
    }
}

impl Notifier for ManualNotifier {
    fn subscribe(&self, tx: mpsc::UnboundedSender<()>) -> Result<Subscription, NotifierError> {
        if self.refuse {
            return Err(NotifierError::Watch("notifications unavailable".to_string()));
        }
        *self.tx.lock().unwrap() = Some(tx);
        Ok(Subscription::new(()))
    }
}

#[tokio::test]
async fn test_fleet_serves_and_replaces_killed_worker() {
    let bundle = common::write_bundle(PAGE);
    let config = config(2);
    let factory = shell_workers(&config);
    let server = start(config, AppSource::DistPath(bundle.path().to_path_buf()), factory).await;

    let (status, body) = fetch(&server, "/").await;
    assert_eq!(status, 200);
    assert!(body.contains("Welcome"));

    let victim = server.supervisor().snapshot().workers[0].id;
    server.supervisor().kill(victim);
    within(server.supervisor().wait_for(|s| s.restarts == 1 && s.ready_count() == 2))
        .await
        .unwrap();

    let (status, body) = fetch(&server, "/").await;
    assert_eq!(status, 200);
    assert!(body.contains("Welcome"));

    within(server.stop()).await;
}

#[tokio::test]
async fn test_second_request_is_a_cache_hit() {
    let bundle = common::write_bundle(PAGE);
    let config = config(1);
    let worker_config = config.worker_config();
    let cache = MemoryCache::new();
    let renderer = CountingRenderer::new(PAGE);

    let shared = cache.clone();
    let engine = renderer.clone();
    let factory: WorkerFactory = Arc::new(move |env: WorkerEnv| {
        Worker::new(worker_config.clone(), env)
            .with_cache(Arc::new(shared.clone()))
            .with_renderer_factory(counting_factory(engine.clone()))
    });
    let server = start(config, AppSource::DistPath(bundle.path().to_path_buf()), factory).await;

    let (status, first) = fetch(&server, "/blog").await;
    assert_eq!(status, 200);
    assert!(eventually(|| cache.get("/blog").is_some()).await);

    let (status, second) = fetch(&server, "/blog").await;
    assert_eq!(status, 200);
    assert_eq!(first, second);
    assert_eq!(renderer.calls(), 1);

    within(server.stop()).await;
}

#[tokio::test]
async fn test_missing_bundle_boots_fallback_then_new_bundle_is_picked_up() {
    let config = config(2);
    let factory = shell_workers(&config);
    let downloader = ScriptedDownloader::not_found();
    let notifier = Arc::new(ManualNotifier::default());
    let source = AppSource::Managed {
        downloader: downloader.clone(),
        notifier: notifier.clone(),
    };
    let server = start(config, source, factory).await;

    let (status, body) = fetch(&server, "/").await;
    assert_eq!(status, 500);
    assert!(body.contains("No Application Found"));

    let bundle = common::write_bundle(PAGE);
    downloader.publish(bundle.path().to_path_buf());
    notifier.fire();

    // Fallback workers leave on Reload and are reforked onto the new bundle.
    within(server.supervisor().wait_for(|s| s.restarts == 2 && s.ready_count() == 2))
        .await
        .unwrap();

    for _ in 0..4 {
        let (status, body) = fetch(&server, "/").await;
        assert_eq!(status, 200);
        assert!(body.contains("Welcome"));
    }

    within(server.stop()).await;
}

#[tokio::test]
async fn test_reload_does_not_block_new_connections() {
    let bundle = common::write_bundle(PAGE);
    let config = config(1);
    let worker_config = config.worker_config();
    let renderer = StallingRenderer::new(PAGE);
    let engine = renderer.clone();
    let factory: WorkerFactory = Arc::new(move |env: WorkerEnv| {
        Worker::new(worker_config.clone(), env).with_renderer_factory(stalling_factory(engine.clone()))
    });
    let server = start(config, AppSource::DistPath(bundle.path().to_path_buf()), factory).await;

    server.supervisor().reload();
    assert!(eventually(|| renderer.reloads() == 1).await);

    // The reload never finishes; the worker still accepts and renders.
    let (status, body) = within(fetch(&server, "/")).await;
    assert_eq!(status, 200);
    assert_eq!(body, PAGE);
    assert_eq!(server.supervisor().snapshot().restarts, 0);

    within(server.stop()).await;
}

#[tokio::test]
async fn test_failed_redownload_is_shown_on_fallback_page() {
    let config = config(1);
    let factory = shell_workers(&config);
    let downloader = ScriptedDownloader::not_found();
    let notifier = Arc::new(ManualNotifier::default());
    let source = AppSource::Managed {
        downloader: downloader.clone(),
        notifier: notifier.clone(),
    };
    let server = start(config, source, factory).await;

    downloader.fail("bucket unreachable");
    notifier.fire();

    let addr = server.local_addr().unwrap();
    let shown = within(async {
        loop {
            let body = reqwest::get(format!("http://{}/", addr))
                .await
                .unwrap()
                .text()
                .await
                .unwrap();
            if body.contains("bucket unreachable") {
                return body;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;
    assert!(shown.contains(r#"<pre style="color: red">"#));

    within(server.stop()).await;
}

#[tokio::test]
async fn test_subscription_failure_is_reported_after_boot() {
    let config = config(1);
    let factory = shell_workers(&config);
    let source = AppSource::Managed {
        downloader: ScriptedDownloader::not_found(),
        notifier: Arc::new(ManualNotifier {
            refuse: true,
            ..ManualNotifier::default()
        }),
    };
    let server = start(config, source, factory).await;

    let addr = server.local_addr().unwrap();
    let shown = within(async {
        loop {
            let body = reqwest::get(format!("http://{}/", addr))
                .await
                .unwrap()
                .text()
                .await
                .unwrap();
            if body.contains("notifications unavailable") {
                return body;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;
    assert!(shown.contains("No Application Found"));

    within(server.stop()).await;
}

#[tokio::test]
async fn test_download_failure_aborts_start_before_forking() {
    let config = config(2);
    let forks = Arc::new(AtomicUsize::new(0));
    let counter = forks.clone();
    let worker_config = config.worker_config();
    let factory: WorkerFactory = Arc::new(move |env: WorkerEnv| {
        counter.fetch_add(1, Ordering::SeqCst);
        Worker::new(worker_config.clone(), env)
    });

    let downloader = ScriptedDownloader::not_found();
    downloader.fail("access denied");
    let source = AppSource::Managed {
        downloader,
        notifier: Arc::new(ManualNotifier::default()),
    };

    let result = AppServer::new(config, source).in_process(factory).start().await;
    assert!(matches!(result, Err(StartError::Download(DownloadError::Failed(_)))));
    assert_eq!(forks.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_admin_api_exposes_fleet() {
    let bundle = common::write_bundle(PAGE);
    let mut config = config(2);
    config.admin.enabled = true;
    config.admin.api_key = "secret".to_string();
    config.admin.bind_address = "127.0.0.1:0".to_string();
    let factory = shell_workers(&config);
    let server = start(config, AppSource::DistPath(bundle.path().to_path_buf()), factory).await;
    let admin = server.admin_addr().unwrap();
    let client = reqwest::Client::new();

    let denied = client
        .get(format!("http://{}/admin/fleet", admin))
        .send()
        .await
        .unwrap();
    assert_eq!(denied.status().as_u16(), 401);

    let fleet: serde_json::Value = client
        .get(format!("http://{}/admin/fleet", admin))
        .bearer_auth("secret")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(fleet["phase"], "running");
    assert_eq!(fleet["workers"].as_array().unwrap().len(), 2);
    assert_eq!(fleet["workers"][0]["state"], "ready");

    let reload = client
        .post(format!("http://{}/admin/reload", admin))
        .bearer_auth("secret")
        .send()
        .await
        .unwrap();
    assert_eq!(reload.status().as_u16(), 202);

    within(server.stop()).await;
}
