//! End-to-end tests for the sync, bulk action, unsubscribe and realtime
//! pipeline.
//!
//! The mailbox and inference seams are replaced with hand-written fakes;
//! storage is a real in-memory SQLite store. Each module carries its own
//! unit tests for the detailed logic.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{TimeZone, Utc};
use pretty_assertions::assert_eq;
use tokio_util::sync::CancellationToken;

use mailsift::config::UnsubscribeSettings;
use mailsift::domain::{Category, Credential, Message, MessageId, Owner, OwnerId};
use mailsift::providers::ai::{match_category, InferenceClient, InferenceResult};
use mailsift::providers::email::cursor::after_cursor;
use mailsift::providers::email::{
    decode_body, text_to_html, MailboxClient, MimePart, ProviderError, RawMessage,
};
use mailsift::realtime::{Broadcaster, Envelope};
use mailsift::services::unsubscribe::Strategy;
use mailsift::services::{
    BulkActionError, MessageService, SyncEngine, UnsubscribeExecutor,
};
use mailsift::storage::{CategoryStore, MessageStore, OwnerStore, SqliteStore};

// ============================================================================
// Fakes
// ============================================================================

#[derive(Default)]
struct FakeMailbox {
    page: Vec<RawMessage>,
    fail_delete: bool,
    deleted: Mutex<Vec<String>>,
}

#[async_trait]
impl MailboxClient for FakeMailbox {
    async fn list_and_fetch(
        &self,
        _credential: &Credential,
        max_results: u32,
        after_provider_id: Option<&str>,
    ) -> mailsift::providers::email::Result<Vec<RawMessage>> {
        let page = self.page.iter().take(max_results as usize).cloned().collect();
        Ok(after_cursor(page, after_provider_id, |m: &RawMessage| {
            m.provider_id.as_str()
        }))
    }

    async fn mutate_state(
        &self,
        _credential: &Credential,
        _provider_id: &str,
        _add_labels: &[&str],
        _remove_labels: &[&str],
    ) -> mailsift::providers::email::Result<()> {
        Ok(())
    }

    async fn delete(
        &self,
        _credential: &Credential,
        provider_ids: &[String],
    ) -> mailsift::providers::email::Result<()> {
        if self.fail_delete {
            return Err(ProviderError::Connection("connection reset".into()));
        }
        self.deleted.lock().unwrap().extend_from_slice(provider_ids);
        Ok(())
    }
}

/// Picks the first category after a short delay; counts `ask` calls.
struct FakeInference {
    delay: Duration,
    asks: AtomicUsize,
}

impl FakeInference {
    fn new(delay: Duration) -> Self {
        Self {
            delay,
            asks: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl InferenceClient for FakeInference {
    async fn classify(&self, _body: &str, categories: &[Category]) -> InferenceResult<String> {
        tokio::time::sleep(self.delay).await;
        Ok(categories[0].name.clone())
    }

    async fn summarize(&self, _body: &str) -> InferenceResult<String> {
        Ok("A short summary.".to_string())
    }

    async fn ask(&self, _prompt: &str) -> InferenceResult<String> {
        self.asks.fetch_add(1, Ordering::SeqCst);
        Ok("CONFIRMED".to_string())
    }
}

fn raw(id: &str, secs: i64) -> RawMessage {
    RawMessage {
        provider_id: id.to_string(),
        from: "news@example.com".to_string(),
        subject: format!("Issue {id}"),
        body: format!("<p>issue {id}</p>"),
        body_degraded: false,
        received_at: Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap(),
    }
}

async fn seeded_store() -> (Arc<SqliteStore>, OwnerId) {
    let store = Arc::new(SqliteStore::in_memory().await.unwrap());
    let owner = Owner::new("g-1", "a@example.com", "A", Credential::new("token"));
    OwnerStore::create(store.as_ref(), &owner).await.unwrap();
    CategoryStore::create(store.as_ref(), &Category::new("Newsletters", "digests"))
        .await
        .unwrap();
    (store, owner.id)
}

fn engine(store: &Arc<SqliteStore>, mailbox: Arc<FakeMailbox>) -> SyncEngine {
    SyncEngine::new(
        store.clone(),
        store.clone(),
        store.clone(),
        mailbox,
        Arc::new(FakeInference::new(Duration::from_millis(10))),
    )
    .with_concurrency(4)
}

// ============================================================================
// Sync
// ============================================================================

#[tokio::test]
async fn sync_is_idempotent() {
    let (store, owner) = seeded_store().await;
    let mailbox = Arc::new(FakeMailbox {
        page: vec![raw("a", 1), raw("b", 2), raw("c", 3)],
        ..Default::default()
    });
    let engine = engine(&store, mailbox);
    let cancel = CancellationToken::new();

    let first = tokio_test::assert_ok!(engine.sync(&owner, 10, None, &cancel).await);
    let stored_after_first = MessageStore::find_by_owner(store.as_ref(), &owner).await.unwrap();

    let second = tokio_test::assert_ok!(engine.sync(&owner, 10, None, &cancel).await);
    let stored_after_second = MessageStore::find_by_owner(store.as_ref(), &owner).await.unwrap();

    assert_eq!(first.persisted.len(), 3);
    assert_eq!(second.fetched.len(), 3);
    assert!(second.persisted.is_empty());

    let ids = |messages: &[Message]| -> Vec<String> {
        messages.iter().map(|m| m.provider_id.clone()).collect()
    };
    assert_eq!(ids(&stored_after_first), ids(&stored_after_second));
}

#[tokio::test]
async fn concurrent_syncs_store_each_provider_id_once() {
    let (store, owner) = seeded_store().await;
    let mailbox = Arc::new(FakeMailbox {
        page: vec![raw("a", 1), raw("b", 2), raw("a", 1), raw("c", 3)],
        ..Default::default()
    });
    let left = engine(&store, mailbox.clone());
    let right = engine(&store, mailbox);
    let cancel = CancellationToken::new();

    let (l, r) = tokio::join!(
        left.sync(&owner, 10, None, &cancel),
        right.sync(&owner, 10, None, &cancel),
    );
    let (l, r) = (l.unwrap(), r.unwrap());

    assert_eq!(l.persisted.len() + r.persisted.len(), 3);
    let stored = MessageStore::find_by_owner(store.as_ref(), &owner).await.unwrap();
    assert_eq!(stored.len(), 3);
}

#[tokio::test]
async fn checkpoint_is_latest_received_message() {
    let (store, owner) = seeded_store().await;
    let mailbox = Arc::new(FakeMailbox {
        page: vec![raw("old", 1), raw("newest", 30), raw("mid", 10)],
        ..Default::default()
    });
    let engine = engine(&store, mailbox);

    engine
        .sync(&owner, 10, None, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(
        engine.checkpoint(&owner).await.unwrap(),
        Some("newest".to_string())
    );
}

#[test]
fn cursor_returns_only_messages_after_it() {
    let page: Vec<RawMessage> = (1..=5).map(|i| raw(&format!("m{i}"), i)).collect();

    let after: Vec<String> = after_cursor(page.clone(), Some("m3"), |m: &RawMessage| {
        m.provider_id.as_str()
    })
    .into_iter()
    .map(|m| m.provider_id)
    .collect();
    assert_eq!(after, vec!["m4".to_string(), "m5".to_string()]);

    let missing = after_cursor(page, Some("m9"), |m: &RawMessage| m.provider_id.as_str());
    assert!(missing.is_empty());
}

// ============================================================================
// Body decoding and classification
// ============================================================================

#[test]
fn html_part_wins_over_plain_text() {
    let html = "<div><b>Sale</b> ends today</div>";
    let root = MimePart::multipart(
        "multipart/alternative",
        vec![
            MimePart::leaf("text/plain", URL_SAFE_NO_PAD.encode("Sale ends today")),
            MimePart::leaf("text/html", URL_SAFE_NO_PAD.encode(html)),
        ],
    );

    let decoded = decode_body(&root);
    assert_eq!(decoded.html, html);
    assert!(!decoded.is_degraded());
}

#[test]
fn plain_text_paragraphs_become_html() {
    let html = text_to_html("First paragraph\n\nSecond <one>\n\nThird");

    assert_eq!(html.matches("<p>&nbsp;</p>").count(), 2);
    let paragraphs: Vec<&str> = html
        .split("</p>")
        .filter(|p| !p.is_empty() && !p.ends_with("&nbsp;"))
        .collect();
    assert_eq!(paragraphs.len(), 3);
    assert!(html.contains("Second &lt;one&gt;"));
}

#[test]
fn classification_fallback_order() {
    let categories = vec![Category::new("Work", "job"), Category::new("Personal", "life")];
    let pick = |answer: &str| match_category(answer, &categories).unwrap().name.clone();

    assert_eq!(pick("work"), "Work");
    assert_eq!(pick("definitely work related"), "Work");
    assert_eq!(pick("personal"), "Personal");
    assert_eq!(pick("Unrelated"), "Work");
}

// ============================================================================
// Bulk actions
// ============================================================================

async fn message_service(
    store: &Arc<SqliteStore>,
    mailbox: Arc<FakeMailbox>,
) -> MessageService {
    let inference: Arc<dyn InferenceClient> =
        Arc::new(FakeInference::new(Duration::from_millis(0)));
    let unsubscriber = Arc::new(
        UnsubscribeExecutor::new(&UnsubscribeSettings::default(), inference.clone()).unwrap(),
    );
    MessageService::new(
        store.clone(),
        store.clone(),
        store.clone(),
        mailbox,
        inference,
        unsubscriber,
    )
}

async fn store_message(store: &SqliteStore, owner: &OwnerId, provider_id: &str) -> MessageId {
    let message = Message::new(
        owner.clone(),
        provider_id,
        "news@example.com",
        "Hello",
        "<p>body</p>",
        Utc::now(),
    );
    MessageStore::create(store, &message).await.unwrap();
    message.id
}

#[tokio::test]
async fn failed_remote_delete_keeps_whole_batch_locally() {
    let (store, owner) = seeded_store().await;
    let mailbox = Arc::new(FakeMailbox {
        fail_delete: true,
        ..Default::default()
    });
    let service = message_service(&store, mailbox).await;

    let mut ids = Vec::new();
    for pid in ["p1", "p2", "p3"] {
        ids.push(store_message(&store, &owner, pid).await);
    }

    let err = service
        .bulk_action(&owner, &ids, "delete", &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, BulkActionError::Remote(_)));
    for id in &ids {
        assert!(MessageStore::find_by_id(store.as_ref(), id)
            .await
            .unwrap()
            .is_some());
    }
}

#[tokio::test]
async fn delete_never_touches_foreign_messages() {
    let (store, owner) = seeded_store().await;
    let other = Owner::new("g-2", "b@example.com", "B", Credential::new("token"));
    OwnerStore::create(store.as_ref(), &other).await.unwrap();

    let mailbox = Arc::new(FakeMailbox::default());
    let service = message_service(&store, mailbox.clone()).await;

    let mine = store_message(&store, &owner, "p1").await;
    let theirs = store_message(&store, &other.id, "p2").await;

    let report = service
        .bulk_action(
            &owner,
            &[mine.clone(), theirs.clone()],
            "delete",
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(report.succeeded, vec![mine]);
    assert_eq!(report.skipped, vec![theirs.clone()]);
    assert_eq!(*mailbox.deleted.lock().unwrap(), vec!["p1".to_string()]);
    assert!(MessageStore::find_by_id(store.as_ref(), &theirs)
        .await
        .unwrap()
        .is_some());
}

// ============================================================================
// Unsubscribe
// ============================================================================

#[tokio::test]
async fn failing_link_falls_back_to_form_without_ai() {
    let mut server = mockito::Server::new_async().await;
    let base = server.url();

    server
        .mock("GET", "/unsubscribe/direct")
        .with_status(503)
        .create_async()
        .await;
    server
        .mock("GET", "/unsubscribe/page")
        .with_status(200)
        .with_body(
            r#"<form action="/unsubscribe/confirm" method="POST">
                 <input type="hidden" name="list" value="weekly">
                 <input type="checkbox" name="confirm">
                 <button type="submit">Unsubscribe</button>
               </form>"#,
        )
        .create_async()
        .await;
    let confirm = server
        .mock("POST", "/unsubscribe/confirm")
        .match_body(mockito::Matcher::AllOf(vec![
            mockito::Matcher::UrlEncoded("list".into(), "weekly".into()),
            mockito::Matcher::UrlEncoded("confirm".into(), "on".into()),
        ]))
        .with_status(200)
        .create_async()
        .await;

    let inference = Arc::new(FakeInference::new(Duration::ZERO));
    let executor =
        UnsubscribeExecutor::new(&UnsubscribeSettings::default(), inference.clone()).unwrap();
    let message = Message::new(
        OwnerId::from("owner-1"),
        "gm-1",
        "news@example.com",
        "Weekly",
        format!(
            r#"<p>Bye: <a href="{base}/unsubscribe/direct">unsubscribe</a>
               or <a href="{base}/unsubscribe/page">manage preferences</a></p>"#
        ),
        Utc::now(),
    );

    let report = executor
        .unsubscribe(&message, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.strategy, Strategy::Form);
    assert_eq!(report.succeeded_url, format!("{base}/unsubscribe/page"));
    assert_eq!(report.attempts.len(), 1);
    assert_eq!(inference.asks.load(Ordering::SeqCst), 0);
    confirm.assert_async().await;
}

// ============================================================================
// Realtime
// ============================================================================

#[tokio::test]
async fn delivery_without_subscribers_returns_immediately() {
    let broadcaster = Broadcaster::with_limits(1, Duration::from_secs(30));
    let started = Instant::now();

    let delivered = broadcaster
        .deliver(&OwnerId::from("offline"), &Envelope::email_summary(5))
        .await;

    assert_eq!(delivered, 0);
    assert!(started.elapsed() < Duration::from_millis(500));
}

#[tokio::test]
async fn stalled_sink_is_skipped_after_timeout() {
    let broadcaster = Broadcaster::with_limits(1, Duration::from_millis(150));
    let owner = OwnerId::from("owner-1");

    let _stalled = broadcaster.register(&owner).await;
    let mut live = broadcaster.register(&owner).await;
    live.receiver.recv().await.unwrap();

    let started = Instant::now();
    let delivered = broadcaster.deliver_summary(&owner, 1).await;
    let elapsed = started.elapsed();

    assert_eq!(delivered, 1);
    assert!(elapsed >= Duration::from_millis(100));
    assert!(elapsed < Duration::from_secs(3));
    assert!(live.receiver.try_recv().is_ok());
}
