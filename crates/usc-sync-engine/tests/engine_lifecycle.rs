//! Integration coverage for the commit loop's state machine: debounce,
//! fingerprint no-op elision, conflict resolution for both `sourceOfTruth`
//! modes, rate-limit freeze, the one-shot unauthorized retry, backoff
//! escalating to `ErrorHold`, and pause/resume. Every test runs against an
//! in-memory fake `Provider` — no network access.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use usc_bus::InMemoryStatusBus;
use usc_codec::{DocumentUniverseInfo, GraphStoreState, NodePrototype};
use usc_provider::{FileContent, FileEntry, Provider, PutResult, TokenSource};
use usc_rate_limiter::{Permit, RateLimitError, RateLimitStats, RateLimiter};
use usc_sync_engine::{spawn, EngineConfig};
use usc_types::{CoreError, Modality, RepoRef, Result as CoreResult, SourceOfTruth, StatusKind};

#[derive(Default)]
struct ProviderScript {
    put_responses: Mutex<Vec<CoreResult<PutResult>>>,
    get_responses: Mutex<Vec<CoreResult<FileContent>>>,
    put_calls: Mutex<Vec<Vec<u8>>>,
}

struct FakeProvider {
    script: Arc<ProviderScript>,
}

#[async_trait]
impl Provider for FakeProvider {
    async fn is_available(&self) -> bool {
        true
    }

    async fn list_files(&self, _path: &str) -> CoreResult<Vec<FileEntry>> {
        Ok(vec![])
    }

    async fn get_file(&self, _path: &str) -> CoreResult<FileContent> {
        let mut responses = self.script.get_responses.lock().unwrap();
        if responses.is_empty() {
            return Err(CoreError::NotFound("no scripted get_file response".into()));
        }
        responses.remove(0)
    }

    async fn put_file(&self, _path: &str, bytes: Vec<u8>, _expected_sha: Option<&str>) -> CoreResult<PutResult> {
        self.script.put_calls.lock().unwrap().push(bytes);
        let mut responses = self.script.put_responses.lock().unwrap();
        if responses.is_empty() {
            return Err(CoreError::Server("no scripted put_file response".into()));
        }
        responses.remove(0)
    }

    async fn delete_file(&self, _path: &str, _expected_sha: Option<&str>) -> CoreResult<()> {
        Ok(())
    }

    async fn create_repo(&self, _name: &str, _private: bool) -> CoreResult<RepoRef> {
        Err(CoreError::NotSupported("not exercised by these tests".into()))
    }

    async fn initialize_empty_repo(&self) -> CoreResult<()> {
        Ok(())
    }
}

#[derive(Default)]
struct FakeRateLimiter {
    frozen: Mutex<Vec<(Modality, DateTime<Utc>)>>,
}

#[async_trait]
impl RateLimiter for FakeRateLimiter {
    async fn acquire(&self, modality: Modality, _deadline: Option<DateTime<Utc>>) -> std::result::Result<Permit, RateLimitError> {
        Ok(Permit::new(modality))
    }

    async fn freeze(&self, modality: Modality, until: DateTime<Utc>) -> std::result::Result<(), RateLimitError> {
        self.frozen.lock().unwrap().push((modality, until));
        Ok(())
    }

    async fn stats(&self, _modality: Modality) -> std::result::Result<RateLimitStats, RateLimitError> {
        unimplemented!("not exercised by these tests")
    }
}

#[derive(Default)]
struct FakeTokenSource {
    force_refresh_calls: Mutex<u32>,
}

#[async_trait]
impl TokenSource for FakeTokenSource {
    async fn get_token(&self, _modality: Modality) -> CoreResult<String> {
        Ok("tok".into())
    }

    async fn force_refresh(&self, _modality: Modality) -> CoreResult<String> {
        *self.force_refresh_calls.lock().unwrap() += 1;
        Ok("tok-refreshed".into())
    }
}

fn sample_state(prototype_name: &str) -> GraphStoreState {
    let mut prototypes = BTreeMap::new();
    prototypes.insert(
        "p1".to_string(),
        NodePrototype {
            id: "p1".into(),
            name: prototype_name.into(),
            description: None,
            color: None,
            extra: Default::default(),
        },
    );
    GraphStoreState {
        prototypes,
        graphs: BTreeMap::new(),
        edges: BTreeMap::new(),
        open_graph_ids: vec![],
        active_graph_id: None,
    }
}

fn remote_document_bytes(prototype_name: &str) -> Vec<u8> {
    let state = sample_state(prototype_name);
    let universe = DocumentUniverseInfo {
        slug: "alpha".into(),
        name: "Alpha".into(),
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };
    let document = usc_codec::encode(&state, universe, None);
    serde_json::to_vec(&document).unwrap()
}

fn test_config(source_of_truth: SourceOfTruth) -> EngineConfig {
    EngineConfig {
        universe_slug: "alpha".into(),
        universe_name: "Alpha".into(),
        content_path: "universes/alpha/alpha.redstring".into(),
        modality: Modality::OAuth,
        source_of_truth,
        debounce: Duration::from_millis(20),
        debounce_while_dragging: Duration::from_millis(200),
        backoff_base: Duration::from_millis(50),
        backoff_max_attempts: 2,
        backoff_ceiling: Duration::from_millis(400),
        poll_interval: Duration::from_millis(10),
    }
}

#[tokio::test]
async fn commits_a_dirty_state_after_debounce() {
    let script = Arc::new(ProviderScript::default());
    script.put_responses.lock().unwrap().push(Ok(PutResult { new_sha: "sha-1".into() }));
    let provider = Arc::new(FakeProvider { script: script.clone() });
    let rate_limiter = Arc::new(FakeRateLimiter::default());
    let token_source = Arc::new(FakeTokenSource::default());
    let bus = Arc::new(InMemoryStatusBus::new(16));

    let handle = spawn(test_config(SourceOfTruth::Local), provider, rate_limiter, token_source, bus, None);
    handle.update_state(sample_state("Alpha"), false).await.unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;

    let status = handle.get_status();
    assert!(matches!(status.kind, StatusKind::Committed { ref sha } if sha == "sha-1"));
    assert_eq!(script.put_calls.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn force_commit_skips_a_repeat_of_the_same_content() {
    let script = Arc::new(ProviderScript::default());
    script.put_responses.lock().unwrap().push(Ok(PutResult { new_sha: "sha-1".into() }));
    let provider = Arc::new(FakeProvider { script: script.clone() });
    let rate_limiter = Arc::new(FakeRateLimiter::default());
    let token_source = Arc::new(FakeTokenSource::default());
    let bus = Arc::new(InMemoryStatusBus::new(16));

    let handle = spawn(test_config(SourceOfTruth::Local), provider, rate_limiter, token_source, bus, None);
    let first = handle.force_commit(sample_state("same")).await.unwrap();
    assert_eq!(first, "sha-1");

    // force_commit bypasses debounce but not the fingerprint no-op check —
    // wait, force_commit passes `force = true`, which *does* bypass the
    // fingerprint skip too (spec: "Save Now" always writes). Only the
    // debounce-driven poll path skips on an unchanged fingerprint.
    handle.update_state(sample_state("same"), false).await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    // The poll-driven attempt saw an identical fingerprint and skipped —
    // no second put_file call went out.
    assert_eq!(script.put_calls.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn conflict_with_git_authority_adopts_remote_and_discards_local_edit() {
    let script = Arc::new(ProviderScript::default());
    script.get_responses.lock().unwrap().push(Err(CoreError::NotFound("nothing yet".into())));
    script
        .get_responses
        .lock()
        .unwrap()
        .push(Ok(FileContent { bytes: remote_document_bytes("Remote"), sha: "remote-sha".into() }));
    script.put_responses.lock().unwrap().push(Err(CoreError::Conflict));
    let provider = Arc::new(FakeProvider { script: script.clone() });
    let rate_limiter = Arc::new(FakeRateLimiter::default());
    let token_source = Arc::new(FakeTokenSource::default());
    let bus = Arc::new(InMemoryStatusBus::new(16));

    let handle = spawn(
        test_config(SourceOfTruth::Git),
        provider,
        rate_limiter,
        token_source,
        bus,
        Some(sample_state("Local")),
    );

    tokio::time::sleep(Duration::from_millis(200)).await;

    let status = handle.get_status();
    match status.kind {
        StatusKind::Conflict { resolution: Some(ref r) } => assert!(r.contains("adopted remote")),
        other => panic!("expected a resolved conflict status, got {other:?}"),
    }
    // The local edit was superseded by the remote; no retried write went out.
    assert_eq!(script.put_calls.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn conflict_with_local_authority_retries_with_a_fresh_sha() {
    let script = Arc::new(ProviderScript::default());
    script
        .get_responses
        .lock()
        .unwrap()
        .push(Ok(FileContent { bytes: remote_document_bytes("Remote"), sha: "remote-sha".into() }));
    script.put_responses.lock().unwrap().push(Err(CoreError::Conflict));
    script.put_responses.lock().unwrap().push(Ok(PutResult { new_sha: "sha-overwritten".into() }));
    let provider = Arc::new(FakeProvider { script: script.clone() });
    let rate_limiter = Arc::new(FakeRateLimiter::default());
    let token_source = Arc::new(FakeTokenSource::default());
    let bus = Arc::new(InMemoryStatusBus::new(16));

    let handle = spawn(
        test_config(SourceOfTruth::Local),
        provider,
        rate_limiter,
        token_source,
        bus,
        Some(sample_state("Local")),
    );

    tokio::time::sleep(Duration::from_millis(200)).await;

    let status = handle.get_status();
    assert!(matches!(status.kind, StatusKind::Committed { ref sha } if sha == "sha-overwritten"));
    assert_eq!(script.put_calls.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn rate_limited_freezes_the_bucket_and_does_not_retry_immediately() {
    let script = Arc::new(ProviderScript::default());
    script
        .put_responses
        .lock()
        .unwrap()
        .push(Err(CoreError::RateLimited { retry_after: Duration::from_secs(1) }));
    let provider = Arc::new(FakeProvider { script: script.clone() });
    let rate_limiter = Arc::new(FakeRateLimiter::default());
    let token_source = Arc::new(FakeTokenSource::default());
    let bus = Arc::new(InMemoryStatusBus::new(16));

    let handle = spawn(
        test_config(SourceOfTruth::Local),
        provider,
        rate_limiter.clone(),
        token_source,
        bus,
        Some(sample_state("x")),
    );

    tokio::time::sleep(Duration::from_millis(150)).await;

    assert_eq!(rate_limiter.frozen.lock().unwrap().len(), 1);
    assert_eq!(script.put_calls.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn unauthorized_forces_one_refresh_then_succeeds() {
    let script = Arc::new(ProviderScript::default());
    script.put_responses.lock().unwrap().push(Err(CoreError::Unauthorized));
    script.put_responses.lock().unwrap().push(Ok(PutResult { new_sha: "sha-2".into() }));
    let provider = Arc::new(FakeProvider { script: script.clone() });
    let rate_limiter = Arc::new(FakeRateLimiter::default());
    let token_source = Arc::new(FakeTokenSource::default());
    let bus = Arc::new(InMemoryStatusBus::new(16));

    let handle = spawn(
        test_config(SourceOfTruth::Local),
        provider,
        rate_limiter,
        token_source.clone(),
        bus,
        Some(sample_state("x")),
    );

    tokio::time::sleep(Duration::from_millis(200)).await;

    let status = handle.get_status();
    assert!(matches!(status.kind, StatusKind::Committed { ref sha } if sha == "sha-2"));
    assert_eq!(*token_source.force_refresh_calls.lock().unwrap(), 1);
    assert_eq!(script.put_calls.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn repeated_network_failures_escalate_to_error_hold() {
    let script = Arc::new(ProviderScript::default());
    script.put_responses.lock().unwrap().push(Err(CoreError::Network("boom-1".into())));
    script.put_responses.lock().unwrap().push(Err(CoreError::Network("boom-2".into())));
    script.put_responses.lock().unwrap().push(Err(CoreError::Network("boom-3".into())));
    let provider = Arc::new(FakeProvider { script: script.clone() });
    let rate_limiter = Arc::new(FakeRateLimiter::default());
    let token_source = Arc::new(FakeTokenSource::default());
    let bus = Arc::new(InMemoryStatusBus::new(16));

    // backoff_max_attempts = 2: a third consecutive failure escalates.
    let handle = spawn(
        test_config(SourceOfTruth::Local),
        provider,
        rate_limiter,
        token_source,
        bus,
        Some(sample_state("x")),
    );

    tokio::time::sleep(Duration::from_millis(700)).await;

    let status = handle.get_status();
    match status.kind {
        StatusKind::Error { ref error_kind, .. } => assert_eq!(error_kind, "backoff_exhausted"),
        other => panic!("expected error_hold after exhausting backoff, got {other:?}"),
    }
    assert_eq!(script.put_calls.lock().unwrap().len(), 3);

    // restart() leaves ErrorHold; a fresh attempt is picked back up.
    handle.restart().await.unwrap();
}

#[tokio::test]
async fn pause_suspends_commits_until_resumed() {
    let script = Arc::new(ProviderScript::default());
    script.put_responses.lock().unwrap().push(Ok(PutResult { new_sha: "sha-3".into() }));
    let provider = Arc::new(FakeProvider { script: script.clone() });
    let rate_limiter = Arc::new(FakeRateLimiter::default());
    let token_source = Arc::new(FakeTokenSource::default());
    let bus = Arc::new(InMemoryStatusBus::new(16));

    let handle = spawn(test_config(SourceOfTruth::Local), provider, rate_limiter, token_source, bus, None);
    handle.pause().await.unwrap();
    handle.update_state(sample_state("x"), false).await.unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(script.put_calls.lock().unwrap().len(), 0);
    assert!(matches!(handle.get_status().kind, StatusKind::Paused));

    handle.resume().await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(script.put_calls.lock().unwrap().len(), 1);
    assert!(matches!(handle.get_status().kind, StatusKind::Committed { .. }));
}
