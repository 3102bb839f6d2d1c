//! Monolith Binary - Local single-server deployment
//!
//! Wires up:
//! - Filesystem report store under `UPLOAD_DIR`
//! - Classifier capabilities (HTTP services, or a no-op detector)
//! - Scan jobs, one background task per upload
//! - JSON HTTP API

use moderator::adapters::local::http::{self, AppState};
use moderator::adapters::local::{FsReportStore, HttpBodyClassifier, HttpDetector, NoOpDetector};
use moderator::application::jobs::JobManager;
use moderator::application::scanner::{DetectionPipeline, ScanService};
use moderator::config::LocalConfig;
use moderator::domain::layout::MediaLayout;
use moderator::ports::detector::{ClassifierChain, Detector};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let config = LocalConfig::from_env();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // 1. Storage
    let layout = MediaLayout::new(&config.upload_dir);
    if let Err(e) = layout.ensure_dirs().await {
        tracing::error!("cannot create {:?}: {}", config.upload_dir, e);
        std::process::exit(1);
    }
    let reports = Arc::new(FsReportStore::new(layout.clone()));

    // 2. Classifier capabilities
    let detector = content_detector(&config);
    let bodies = body_classifiers(&config);
    tracing::info!(
        "detector: {}, body classifiers: {:?}",
        detector.name(),
        bodies.names()
    );

    // 3. Application services
    let pipeline = DetectionPipeline::new(
        detector,
        bodies,
        layout.clone(),
        config.scan.score_threshold,
    );
    let scanner = Arc::new(ScanService::new(
        Arc::new(JobManager::new()),
        pipeline,
        Arc::clone(&reports),
        layout.clone(),
        config.scan,
    ));

    // 4. HTTP layer
    let app = http::router(AppState {
        scanner,
        reports,
        layout,
    });

    // 5. Start server
    let listener = tokio::net::TcpListener::bind(format!("{}:{}", config.addr, config.port))
        .await
        .expect("Failed to bind TCP listener");
    tracing::info!("Listening at {}:{}", config.addr, config.port);
    axum::serve(listener, app)
        .await
        .expect("Server failed to start");
}

fn content_detector(config: &LocalConfig) -> Box<dyn Detector> {
    let Some(url) = &config.detector_url else {
        tracing::warn!("DETECTOR_URL not set, every frame will scan clean");
        return Box::new(NoOpDetector);
    };
    match HttpDetector::new(url.as_str()) {
        Ok(detector) => Box::new(detector),
        Err(e) => {
            tracing::warn!("content detector unavailable ({}), every frame will scan clean", e);
            Box::new(NoOpDetector)
        }
    }
}

fn body_classifiers(config: &LocalConfig) -> ClassifierChain {
    let mut chain = ClassifierChain::default();
    let ranked = [
        (&config.person_detector_url, "person-primary"),
        (&config.person_fallback_url, "person-fallback"),
    ];
    for (url, name) in ranked {
        let Some(url) = url else {
            continue;
        };
        match HttpBodyClassifier::new(url.as_str(), name) {
            Ok(classifier) => chain.push(Box::new(classifier)),
            Err(e) => tracing::warn!("{} unavailable: {}", name, e),
        }
    }
    if chain.is_empty() {
        tracing::warn!("no person classifier configured, body type will be unknown");
    }
    chain
}
