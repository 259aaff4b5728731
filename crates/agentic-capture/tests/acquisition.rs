//! End-to-end acquisition tests against a scripted browser.
//!
//! Time is paused, so deadlines of several seconds run instantly.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use agentic_capture::{
    AcquisitionCoordinator, AcquisitionRequest, ActionError, ActionTrigger, ArtifactStore,
    BrowserDriver, BrowsingContext, CaptureConfig, CaptureError, Locator, PageHandle,
    PersistTarget, Strategy, StrategyPolicy,
};
use futures::StreamExt;
use tokio::time::Instant;

use common::{handles, Effect, FakeDriver, FakeElement, Resource, PDF};

// ─────────────────────── helpers ───────────────────────

const APP: &str = "https://portal.test/app";

fn coordinator(driver: &Arc<FakeDriver>) -> AcquisitionCoordinator {
    AcquisitionCoordinator::new(
        Arc::clone(driver) as Arc<dyn BrowserDriver>,
        ArtifactStore::new(),
        CaptureConfig::default(),
    )
}

fn request(text: &str, wait_ms: u64, policy: StrategyPolicy) -> AcquisitionRequest {
    AcquisitionRequest::new(
        ActionTrigger::new(Locator::text(text), Duration::from_millis(wait_ms)),
        policy,
    )
}

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

// ─────────────────────── scenarios ───────────────────────

#[tokio::test(start_paused = true)]
async fn test_certificate_opens_in_new_tab() {
    let driver = Arc::new(FakeDriver::new());
    let page = driver.open_page(
        APP,
        vec![FakeElement::button("Download Certificate").with(Effect::NewPage {
            after: ms(400),
            url: "https://portal.test/certificates/8812".into(),
            content_type: "application/pdf".into(),
            bytes: PDF.to_vec(),
        })],
    );
    let (context, page) = handles(&driver, &page);
    let engine = coordinator(&driver);

    let report = engine
        .acquire(
            &context,
            &page,
            request("Download Certificate", 20_000, StrategyPolicy::capture()).with_name("certificate"),
        )
        .await
        .unwrap();

    assert_eq!(report.strategy, Strategy::NewPage);
    assert_eq!(report.source_url.as_deref(), Some("https://portal.test/certificates/8812"));
    let stored = engine.store().get("certificate").unwrap();
    assert_eq!(stored.mime_type, "application/pdf");
    assert_eq!(stored.bytes, PDF);
    assert_eq!(driver.auxiliary_contexts(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_export_resolves_through_cloned_session() {
    let driver = Arc::new(FakeDriver::new());
    let export = "https://portal.test/export?format=pdf";
    driver.world.serve(export, Resource::pdf().requiring("session"));
    driver.primary().set_cookie("session", "abc123");
    let page = driver.open_page(
        APP,
        vec![FakeElement::button("Export").with(Effect::Response {
            after: ms(300),
            url: export.into(),
            status: 200,
            content_type: "application/pdf".into(),
        })],
    );
    let (context, page) = handles(&driver, &page);
    let engine = coordinator(&driver);

    let report = engine
        .acquire(&context, &page, request("Export", 3_000, StrategyPolicy::capture()))
        .await
        .unwrap();

    assert_eq!(report.strategy, Strategy::NetworkResponse);
    assert_eq!(report.source_url.as_deref(), Some(export));
    let artifact = report.artifact.unwrap();
    assert_eq!(artifact.mime_type, "application/pdf");
    assert_eq!(artifact.size, PDF.len());
    assert!(driver.world.aux_created.load(Ordering::SeqCst) >= 1);
    assert_eq!(driver.auxiliary_contexts(), 0);
}

// ─────────────────────── ranking and timing ───────────────────────

#[tokio::test(start_paused = true)]
async fn test_download_before_deadline_wins() {
    let driver = Arc::new(FakeDriver::new());
    let page = driver.open_page(
        APP,
        vec![FakeElement::button("Get PDF")
            .with(Effect::Download {
                after: ms(1_000),
                url: "https://portal.test/files/statement.pdf".into(),
                filename: "statement.pdf".into(),
                bytes: PDF.to_vec(),
                takes: ms(200),
            })
            .with(Effect::NewPage {
                after: ms(1_200),
                url: "https://portal.test/viewer".into(),
                content_type: "text/html".into(),
                bytes: b"<html></html>".to_vec(),
            })],
    );
    let (context, page) = handles(&driver, &page);
    let engine = coordinator(&driver);

    let report = engine
        .acquire(&context, &page, request("Get PDF", 20_000, StrategyPolicy::capture()))
        .await
        .unwrap();

    assert_eq!(report.strategy, Strategy::NativeDownload);
    let artifact = report.artifact.unwrap();
    assert_eq!(artifact.name, "statement.pdf");
    assert_eq!(artifact.mime_type, "application/pdf");
    assert!(report.elapsed_ms < 20_000);
}

#[tokio::test(start_paused = true)]
async fn test_hook_exits_race_early() {
    let driver = Arc::new(FakeDriver::new());
    let target = "https://portal.test/files/report.pdf";
    driver.world.serve(target, Resource::pdf());
    let page = driver.open_page(
        APP,
        vec![FakeElement::button("Open report").with(Effect::Hook {
            after: ms(300),
            url: target.into(),
        })],
    );
    let (context, page) = handles(&driver, &page);
    let engine = coordinator(&driver);

    let started = Instant::now();
    let report = engine
        .acquire(
            &context,
            &page,
            request("Open report", 20_000, StrategyPolicy::capture()).with_name("report"),
        )
        .await
        .unwrap();

    assert_eq!(report.strategy, Strategy::HookedUrl);
    assert!(started.elapsed() < ms(20_000));
    let stored = engine.store().get("report").unwrap();
    assert_eq!(stored.bytes, PDF);
    assert_eq!(stored.mime_type, "application/pdf");
    assert_eq!(driver.auxiliary_contexts(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_no_signal_fails_after_deadline() {
    let driver = Arc::new(FakeDriver::new());
    let page = driver.open_page(APP, vec![FakeElement::button("Nothing")]);
    let (context, page) = handles(&driver, &page);
    let engine = coordinator(&driver);

    let started = Instant::now();
    let err = engine
        .acquire(&context, &page, request("Nothing", 5_000, StrategyPolicy::force_download()))
        .await
        .unwrap_err();

    assert!(matches!(err, CaptureError::NoArtifactFound { best_url: None, .. }));
    assert_eq!(err.kind(), "no_artifact_found");
    assert!(started.elapsed() >= ms(5_000));
    assert!(started.elapsed() <= ms(5_500));
    assert!(engine.store().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_current_page_redirect() {
    let driver = Arc::new(FakeDriver::new());
    let page = driver.open_page(
        APP,
        vec![FakeElement::button("View").with(Effect::Navigate {
            after: ms(200),
            url: "https://portal.test/view/notice.pdf".into(),
            content_type: "application/pdf".into(),
            bytes: PDF.to_vec(),
        })],
    );
    let (context, handle) = handles(&driver, &page);
    let engine = coordinator(&driver);

    let report = engine
        .acquire(&context, &handle, request("View", 2_000, StrategyPolicy::capture()))
        .await
        .unwrap();

    assert_eq!(report.strategy, Strategy::CurrentPageRedirect);
    assert_eq!(report.source_url.as_deref(), Some("https://portal.test/view/notice.pdf"));
    assert!(!page.state.closed.load(Ordering::SeqCst));
}

#[tokio::test(start_paused = true)]
async fn test_dom_link_found_after_click() {
    let driver = Arc::new(FakeDriver::new());
    driver
        .world
        .serve("https://portal.test/files/invoice-2291.pdf", Resource::pdf());
    let page = driver.open_page(
        APP,
        vec![FakeElement::button("Generate").with(Effect::AddLink {
            after: ms(500),
            href: "/files/invoice-2291.pdf".into(),
        })],
    );
    let (context, page) = handles(&driver, &page);
    let engine = coordinator(&driver);

    let report = engine
        .acquire(&context, &page, request("Generate", 2_000, StrategyPolicy::force_download()))
        .await
        .unwrap();

    assert_eq!(report.strategy, Strategy::DomLink);
    assert_eq!(
        report.source_url.as_deref(),
        Some("https://portal.test/files/invoice-2291.pdf")
    );
    assert_eq!(driver.auxiliary_contexts(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_script_literal_fallback() {
    let driver = Arc::new(FakeDriver::new());
    driver
        .world
        .serve("https://portal.test/static/terms.pdf", Resource::pdf());
    let page = driver.open_page(APP, vec![FakeElement::button("Terms")]);
    page.set_scripts("window.termsUrl = '/static/terms.pdf';");
    let (context, page) = handles(&driver, &page);
    let engine = coordinator(&driver);

    let report = engine
        .acquire(&context, &page, request("Terms", 1_000, StrategyPolicy::force_download()))
        .await
        .unwrap();

    assert_eq!(report.strategy, Strategy::ScriptLiteral);
}

// ─────────────────────── failure modes ───────────────────────

#[tokio::test(start_paused = true)]
async fn test_missing_trigger() {
    let driver = Arc::new(FakeDriver::new());
    let page = driver.open_page(APP, vec![FakeElement::button("Export")]);
    let (context, page) = handles(&driver, &page);
    let engine = coordinator(&driver);

    let err = engine
        .acquire(&context, &page, request("Import", 5_000, StrategyPolicy::capture()))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        CaptureError::Action(ActionError::TargetNotFound(_))
    ));
    assert_eq!(err.kind(), "target_not_found");
    assert_eq!(driver.world.performs.load(Ordering::SeqCst), 1);
    assert_eq!(driver.auxiliary_contexts(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_ambiguous_trigger_retries_once() {
    let driver = Arc::new(FakeDriver::new());
    let page = driver.open_page(
        APP,
        vec![
            FakeElement::button("Download").failing(),
            FakeElement::button("Download"),
        ],
    );
    let (context, page) = handles(&driver, &page);
    let engine = coordinator(&driver);

    let err = engine
        .acquire(&context, &page, request("Download", 5_000, StrategyPolicy::capture()))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        CaptureError::Action(ActionError::AmbiguousTargetFailed { matches: 2, .. })
    ));
    assert_eq!(driver.world.performs.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn test_ambiguous_trigger_uses_first_match() {
    let driver = Arc::new(FakeDriver::new());
    let page = driver.open_page(
        APP,
        vec![
            FakeElement::button("Download").with(Effect::Download {
                after: ms(100),
                url: "https://portal.test/a.pdf".into(),
                filename: "a.pdf".into(),
                bytes: PDF.to_vec(),
                takes: ms(0),
            }),
            FakeElement::button("Download"),
        ],
    );
    let (context, page) = handles(&driver, &page);
    let engine = coordinator(&driver);

    let report = engine
        .acquire(&context, &page, request("Download", 5_000, StrategyPolicy::capture()))
        .await
        .unwrap();

    assert_eq!(report.strategy, Strategy::NativeDownload);
    assert_eq!(driver.world.performs.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn test_stalled_download_times_out() {
    let driver = Arc::new(FakeDriver::new());
    let page = driver.open_page(
        APP,
        vec![FakeElement::button("Archive").with(Effect::Download {
            after: ms(100),
            url: "https://portal.test/archive.pdf".into(),
            filename: "archive.pdf".into(),
            bytes: PDF.to_vec(),
            takes: ms(120_000),
        })],
    );
    let (context, page) = handles(&driver, &page);
    let engine = coordinator(&driver);

    let err = engine
        .acquire(&context, &page, request("Archive", 5_000, StrategyPolicy::capture()))
        .await
        .unwrap_err();

    match err {
        CaptureError::DownloadTimeout { url, waited_ms } => {
            assert_eq!(url, "https://portal.test/archive.pdf");
            assert_eq!(waited_ms, CaptureConfig::default().download_grace_ms);
        }
        other => panic!("expected download timeout, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_unauthenticated_export_is_rejected() {
    let driver = Arc::new(FakeDriver::new());
    let export = "https://portal.test/export?format=pdf";
    driver.world.serve(export, Resource::pdf().requiring("session"));
    let page = driver.open_page(
        APP,
        vec![FakeElement::button("Export").with(Effect::Response {
            after: ms(300),
            url: export.into(),
            status: 200,
            content_type: "application/pdf".into(),
        })],
    );
    let (context, page) = handles(&driver, &page);
    let engine = coordinator(&driver);

    let err = engine
        .acquire(&context, &page, request("Export", 2_000, StrategyPolicy::capture()))
        .await
        .unwrap_err();

    assert!(matches!(err, CaptureError::NoArtifactFound { .. }));
    assert_eq!(err.best_url(), Some(export));
    assert_eq!(driver.auxiliary_contexts(), 0);
}

// ─────────────────────── variants ───────────────────────

#[tokio::test(start_paused = true)]
async fn test_extract_url_does_not_fetch() {
    let driver = Arc::new(FakeDriver::new());
    let target = "https://portal.test/files/report.pdf";
    let page = driver.open_page(
        APP,
        vec![FakeElement::button("Open").with(Effect::Hook {
            after: ms(100),
            url: target.into(),
        })],
    );
    let (context, page) = handles(&driver, &page);
    let engine = coordinator(&driver);

    let report = engine
        .acquire(&context, &page, request("Open", 5_000, StrategyPolicy::extract_url()))
        .await
        .unwrap();

    assert_eq!(report.strategy, Strategy::HookedUrl);
    assert_eq!(report.source_url.as_deref(), Some(target));
    assert!(report.artifact.is_none());
    assert!(engine.store().is_empty());
    assert_eq!(driver.world.aux_created.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_download_to_path_writes_dated_file() {
    let driver = Arc::new(FakeDriver::new());
    let out = tempfile::tempdir().unwrap();
    let page = driver.open_page(
        APP,
        vec![FakeElement::button("Download").with(Effect::Download {
            after: ms(100),
            url: "https://portal.test/arl.pdf".into(),
            filename: "arl.pdf".into(),
            bytes: PDF.to_vec(),
            takes: ms(50),
        })],
    );
    let (context, page) = handles(&driver, &page);
    let engine = coordinator(&driver);

    let report = engine
        .acquire(
            &context,
            &page,
            request("Download", 5_000, StrategyPolicy::download_to_path())
                .with_persist(PersistTarget::new(out.path(), "arl")),
        )
        .await
        .unwrap();

    let saved = report.saved_to.unwrap();
    let file_name = saved.file_name().unwrap().to_string_lossy().to_string();
    assert!(file_name.starts_with("arl_"));
    assert!(file_name.ends_with(".pdf"));
    assert_eq!(saved.parent().unwrap(), out.path());
    assert_eq!(std::fs::read(&saved).unwrap(), PDF);
}

#[tokio::test(start_paused = true)]
async fn test_authenticated_variant_reads_new_page_through_clone() {
    let driver = Arc::new(FakeDriver::new());
    let url = "https://portal.test/secure/letter.pdf";
    driver.world.serve(url, Resource::pdf().requiring("session"));
    driver.primary().set_cookie("session", "s3");
    let page = driver.open_page(
        APP,
        vec![FakeElement::button("Letter").with(Effect::NewPage {
            after: ms(200),
            url: url.into(),
            content_type: "application/pdf".into(),
            bytes: PDF.to_vec(),
        })],
    );
    let (context, page) = handles(&driver, &page);
    let engine = coordinator(&driver);

    let report = engine
        .acquire(
            &context,
            &page,
            request("Letter", 5_000, StrategyPolicy::download_authenticated()),
        )
        .await
        .unwrap();

    assert_eq!(report.strategy, Strategy::NewPage);
    assert_eq!(driver.world.aux_created.load(Ordering::SeqCst), 1);
    assert_eq!(driver.auxiliary_contexts(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_hook_is_deactivated_not_removed() {
    let driver = Arc::new(FakeDriver::new());
    let page = driver.open_page(APP, vec![FakeElement::button("Nothing")]);
    let (context, handle) = handles(&driver, &page);
    let engine = coordinator(&driver);

    let _ = engine
        .acquire(&context, &handle, request("Nothing", 1_000, StrategyPolicy::capture()))
        .await;

    let bindings = driver.world.bindings.lock().unwrap().clone();
    let deactivated = driver.world.hooks_deactivated.lock().unwrap().clone();
    assert_eq!(bindings.len(), 1);
    assert_eq!(deactivated, bindings);
}

#[tokio::test(start_paused = true)]
async fn test_spawned_pages_closed_after_call() {
    let driver = Arc::new(FakeDriver::new());
    let page = driver.open_page(
        APP,
        vec![FakeElement::button("Preview").with(Effect::NewPage {
            after: ms(100),
            url: "https://portal.test/preview/7.pdf".into(),
            content_type: "application/pdf".into(),
            bytes: PDF.to_vec(),
        })],
    );
    let (context, handle) = handles(&driver, &page);
    let engine = coordinator(&driver);
    let mut pages = context.subscribe_pages().await.unwrap();

    engine
        .acquire(&context, &handle, request("Preview", 5_000, StrategyPolicy::capture()))
        .await
        .unwrap();

    let spawned = pages.next().await.unwrap();
    assert!(spawned.is_closed());
    assert!(!handle.is_closed());
}

// ─────────────────────── untrusted tabs and slow loads ───────────────────────

#[tokio::test(start_paused = true)]
async fn test_waiting_tab_does_not_end_race() {
    let driver = Arc::new(FakeDriver::new());
    let page = driver.open_page(
        APP,
        vec![FakeElement::button("Generate")
            .with(Effect::NewPage {
                after: ms(200),
                url: "https://portal.test/please-wait".into(),
                content_type: "text/html".into(),
                bytes: b"<html>Preparing your file</html>".to_vec(),
            })
            .with(Effect::Download {
                after: ms(4_000),
                url: "https://portal.test/files/statement.pdf".into(),
                filename: "statement.pdf".into(),
                bytes: PDF.to_vec(),
                takes: ms(100),
            })],
    );
    let (context, page) = handles(&driver, &page);
    let engine = coordinator(&driver);

    let report = engine
        .acquire(&context, &page, request("Generate", 20_000, StrategyPolicy::capture()))
        .await
        .unwrap();

    assert_eq!(report.strategy, Strategy::NativeDownload);
    assert_eq!(report.artifact.unwrap().name, "statement.pdf");
    assert!(report.elapsed_ms >= 4_000);
    assert!(report.elapsed_ms < 20_000);
}

#[tokio::test(start_paused = true)]
async fn test_slow_tab_does_not_hold_back_later_tab() {
    let driver = Arc::new(FakeDriver::new());
    *driver.world.page_load.lock().unwrap() = ms(60_000);
    let page = driver.open_page(
        APP,
        vec![FakeElement::button("Open")
            .with(Effect::NewPage {
                after: ms(100),
                url: "https://portal.test/loading".into(),
                content_type: "text/html".into(),
                bytes: b"<html></html>".to_vec(),
            })
            .with(Effect::NewPage {
                after: ms(300),
                url: "https://portal.test/certificates/8812".into(),
                content_type: "application/pdf".into(),
                bytes: PDF.to_vec(),
            })],
    );
    let (context, handle) = handles(&driver, &page);
    let engine = coordinator(&driver);
    let mut opened = context.subscribe_pages().await.unwrap();

    let report = engine
        .acquire(&context, &handle, request("Open", 20_000, StrategyPolicy::capture()))
        .await
        .unwrap();

    assert_eq!(report.strategy, Strategy::NewPage);
    assert_eq!(report.source_url.as_deref(), Some("https://portal.test/certificates/8812"));
    assert!(report.elapsed_ms < 2_000);
    // Both tabs were recorded, including the one still loading, and closed.
    let first = opened.next().await.unwrap();
    let second = opened.next().await.unwrap();
    assert!(first.is_closed());
    assert!(second.is_closed());
}

// ─────────────────────── persistence failures ───────────────────────

#[tokio::test(start_paused = true)]
async fn test_failed_save_stores_nothing() {
    let driver = Arc::new(FakeDriver::new());
    let out = tempfile::tempdir().unwrap();
    let blocker = out.path().join("not-a-dir");
    std::fs::write(&blocker, b"").unwrap();
    let page = driver.open_page(
        APP,
        vec![FakeElement::button("Download").with(Effect::Download {
            after: ms(100),
            url: "https://portal.test/arl.pdf".into(),
            filename: "arl.pdf".into(),
            bytes: PDF.to_vec(),
            takes: ms(50),
        })],
    );
    let (context, page) = handles(&driver, &page);
    let engine = coordinator(&driver);
    let mut events = engine.store().subscribe();

    let err = engine
        .acquire(
            &context,
            &page,
            request("Download", 5_000, StrategyPolicy::download_to_path())
                .with_persist(PersistTarget::new(blocker.join("out"), "arl")),
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "persist_failed");
    assert_eq!(err.best_url(), Some("https://portal.test/arl.pdf"));
    assert!(engine.store().is_empty());
    assert!(events.try_recv().is_err());
    let leftovers = std::fs::read_dir(driver.world.download_dir.path()).unwrap().count();
    assert_eq!(leftovers, 0);
}

// ─────────────────────── resolution order ───────────────────────

#[tokio::test(start_paused = true)]
async fn test_bare_url_is_fetched_without_download_wait() {
    let driver = Arc::new(FakeDriver::new());
    let target = "https://portal.test/files/invoice.pdf";
    driver.world.serve(target, Resource::pdf());
    let page = driver.open_page(
        APP,
        vec![FakeElement::button("Invoice").with(Effect::Hook {
            after: ms(100),
            url: target.into(),
        })],
    );
    let (context, page) = handles(&driver, &page);
    let engine = coordinator(&driver);
    let policy = StrategyPolicy::capture();
    let bound = 100 + policy.settle.as_millis() as u64 + CaptureConfig::default().download_probe_ms;

    let report = engine
        .acquire(&context, &page, request("Invoice", 20_000, policy))
        .await
        .unwrap();

    assert_eq!(report.strategy, Strategy::HookedUrl);
    assert!(report.elapsed_ms < bound);
    assert_eq!(driver.auxiliary_contexts(), 0);
}
