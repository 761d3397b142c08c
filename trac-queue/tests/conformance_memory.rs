use chrono::Duration as ChronoDuration;

use trac_core::TenantContext;
use trac_queue::backend::{JobCacheBackend, ReadMode, StatusQuery};
use trac_queue::{CacheError, CacheKey, MemoryJobCache};

fn tenant() -> TenantContext {
    TenantContext::new("acme")
}

/// S5. open ticket on key K (rev 0), add entry, open another ticket on
/// the same key: first returns a valid ticket, second is superseded.
#[tokio::test]
async fn s5_second_open_new_ticket_on_locked_key_is_superseded() {
    let backend = MemoryJobCache::new();
    let t = tenant();
    let key = CacheKey::from("K");

    let first = backend
        .open_new_ticket(&t, &key, ChronoDuration::seconds(30))
        .await
        .unwrap();
    assert!(!first.superseded && !first.missing);
    assert_eq!(first.revision, 0);

    backend
        .add_entry(&t, &first, "QUEUED".into(), serde_json::json!({}))
        .await
        .unwrap();

    let second = backend
        .open_new_ticket(&t, &key, ChronoDuration::seconds(30))
        .await
        .unwrap();
    assert!(second.superseded);
}

/// Property 5: no other ticket for `k` is held simultaneously until
/// `closeTicket` or expiry releases it.
#[tokio::test]
async fn property5_closing_ticket_allows_new_grant() {
    let backend = MemoryJobCache::new();
    let t = tenant();
    let key = CacheKey::from("K2");

    let first = backend
        .open_new_ticket(&t, &key, ChronoDuration::seconds(30))
        .await
        .unwrap();

    let blocked = backend
        .open_new_ticket(&t, &key, ChronoDuration::seconds(30))
        .await
        .unwrap();
    assert!(blocked.superseded);

    backend.close_ticket(&t, &first).await.unwrap();

    let after_close = backend
        .open_new_ticket(&t, &key, ChronoDuration::seconds(30))
        .await
        .unwrap();
    assert!(!after_close.superseded);
}

#[tokio::test]
async fn open_ticket_on_unknown_key_returns_missing_sentinel() {
    let backend = MemoryJobCache::new();
    let t = tenant();
    let key = CacheKey::from("unknown-key");

    let ticket = backend
        .open_ticket(&t, &key, 0, ChronoDuration::seconds(30))
        .await
        .unwrap();
    assert!(ticket.missing);
}

#[tokio::test]
async fn update_entry_requires_held_ticket() {
    let backend = MemoryJobCache::new();
    let t = tenant();
    let key = CacheKey::from("K3");

    let ticket = backend
        .open_new_ticket(&t, &key, ChronoDuration::seconds(30))
        .await
        .unwrap();
    backend
        .add_entry(&t, &ticket, "QUEUED".into(), serde_json::json!({}))
        .await
        .unwrap();
    backend.close_ticket(&t, &ticket).await.unwrap();

    let result = backend
        .update_entry(&t, &ticket, "RUNNING".into(), serde_json::json!({}))
        .await;
    assert!(matches!(result, Err(CacheError::TicketMismatch(_))));
}

#[tokio::test]
async fn get_entry_by_revision_mismatch_errors() {
    let backend = MemoryJobCache::new();
    let t = tenant();
    let key = CacheKey::from("K4");

    let ticket = backend
        .open_new_ticket(&t, &key, ChronoDuration::seconds(30))
        .await
        .unwrap();
    backend
        .add_entry(&t, &ticket, "QUEUED".into(), serde_json::json!({}))
        .await
        .unwrap();

    let result = backend.get_entry(&t, &key, ReadMode::Revision(5)).await;
    assert!(matches!(result, Err(CacheError::RevisionMismatch { .. })));
}

#[tokio::test]
async fn query_status_filters_by_status_and_tenant() {
    let backend = MemoryJobCache::new();
    let t1 = tenant();
    let t2 = TenantContext::new("globex");

    for (tenant_ctx, key, status) in [
        (&t1, "a", "QUEUED"),
        (&t1, "b", "RUNNING"),
        (&t2, "c", "QUEUED"),
    ] {
        let ticket = backend
            .open_new_ticket(tenant_ctx, &CacheKey::from(key), ChronoDuration::seconds(30))
            .await
            .unwrap();
        backend
            .add_entry(tenant_ctx, &ticket, status.into(), serde_json::json!({}))
            .await
            .unwrap();
        backend.close_ticket(tenant_ctx, &ticket).await.unwrap();
    }

    let queued_t1 = backend
        .query_status(
            &t1,
            StatusQuery {
                statuses: vec!["QUEUED".to_string()],
                include_open_tickets: false,
            },
        )
        .await
        .unwrap();
    assert_eq!(queued_t1.len(), 1);
    assert_eq!(queued_t1[0].key.as_str(), "a");
}

#[tokio::test]
async fn remove_entry_requires_held_ticket_and_then_vanishes() {
    let backend = MemoryJobCache::new();
    let t = tenant();
    let key = CacheKey::from("K5");

    let ticket = backend
        .open_new_ticket(&t, &key, ChronoDuration::seconds(30))
        .await
        .unwrap();
    backend
        .add_entry(&t, &ticket, "QUEUED".into(), serde_json::json!({}))
        .await
        .unwrap();

    backend.remove_entry(&t, &ticket).await.unwrap();

    let result = backend.get_entry(&t, &key, ReadMode::Latest).await;
    assert!(matches!(result, Err(CacheError::EntryNotFound(_))));
}
