//! Integration tests for tab lifecycle, persistence and saved queries

mod common;

use async_trait::async_trait;
use pgdesk_core::{PgDeskError, QueryOutput, Result, TableRow, Value};
use pgdesk_services::{
    MemoryTabStore, Outcome, PersistedWorkspace, ServiceError, TabRecord, TabStore,
};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use uuid::Uuid;

use common::{Harness, MockDatabaseService, displayed_ids, users, users_harness, users_service};

/// Store that fails a fixed number of saves before succeeding
struct FlakyTabStore {
    failures_left: AtomicU32,
    saves: AtomicU32,
    inner: MemoryTabStore,
}

impl FlakyTabStore {
    fn failing(times: u32) -> Self {
        Self {
            failures_left: AtomicU32::new(times),
            saves: AtomicU32::new(0),
            inner: MemoryTabStore::new(),
        }
    }
}

#[async_trait]
impl TabStore for FlakyTabStore {
    async fn load(&self) -> Result<PersistedWorkspace> {
        self.inner.load().await
    }

    async fn save(&self, workspace: &PersistedWorkspace) -> Result<()> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        if self.failures_left.load(Ordering::SeqCst) > 0 {
            self.failures_left.fetch_sub(1, Ordering::SeqCst);
            return Err(PgDeskError::Persistence("database is locked".into()));
        }
        self.inner.save(workspace).await
    }
}

fn record(connection_id: Uuid, table: Option<&str>) -> TabRecord {
    TabRecord {
        id: Uuid::new_v4(),
        connection_id: Some(connection_id),
        database_name: Some("app".into()),
        query_text: String::new(),
        saved_query_id: None,
        selected_table_schema: table.map(|_| "public".to_string()),
        selected_table_name: table.map(str::to_string),
        selected_schema_filter: None,
    }
}

// ============ Tab Lifecycle Tests ============

#[tokio::test]
async fn closing_tab_mid_query_discards_result_and_stops_ticker() {
    let service = MockDatabaseService::new().with_query_result(
        "SELECT count(*)",
        QueryOutput::with_rows(vec!["count".into()], vec![TableRow::from_pairs([("count", 42_i64)])]),
    );
    let h = Harness::new(service);
    let first = h.workspace.read(|state| state.active_tab_id()).unwrap();
    let second = h.workspace.new_tab();

    let gate = h.service.hold_next("execute:SELECT count(*) FROM events");
    let (outcome, had_ticker) =
        tokio::join!(h.workspace.execute_query("SELECT count(*) FROM events"), async {
            let had_ticker = h
                .workspace
                .read(|state| state.tabs().by_id(first).is_some_and(|t| t.has_ticker()));
            let closed = h.workspace.close_tab(first).await.unwrap();
            assert!(closed.is_applied());
            gate.add_permits(1);
            had_ticker
        });

    assert!(had_ticker);
    assert_eq!(outcome.unwrap(), Outcome::Stale);
    assert_eq!(h.service.cancel_count(), 1);
    h.workspace.read(|state| {
        assert!(state.tabs().by_id(first).is_none());
        assert_eq!(state.active_tab_id(), Some(second));
        assert!(state.rows().is_empty());
    });
    h.workspace.history(|history| assert!(history.latest().unwrap().superseded));
}

#[tokio::test]
async fn closing_tab_mid_fetch_discards_result() {
    let (h, _) = users_harness(3).await;
    let first = h.workspace.read(|state| state.active_tab_id()).unwrap();
    let gate = h.service.hold_next("fetch:public.users");

    let (outcome, _) = tokio::join!(h.workspace.select_table(common::users_selection()), async {
        let _ = h.workspace.close_tab(first).await.unwrap();
        gate.add_permits(1);
    });

    assert_eq!(outcome.unwrap(), Outcome::Stale);
    h.workspace.read(|state| {
        assert!(state.tabs().is_empty());
        assert_eq!(state.active_tab_id(), None);
        assert_eq!(state.connection_id(), None);
        assert!(state.rows().is_empty());
    });
}

#[tokio::test]
async fn closing_unknown_tab_fails() {
    let h = Harness::new(MockDatabaseService::new());
    let missing = pgdesk_services::TabId(Uuid::new_v4());

    let err = h.workspace.close_tab(missing).await.unwrap_err();

    assert!(matches!(err, ServiceError::TabNotFound(_)));
}

#[tokio::test]
async fn forget_table_clears_every_trace() {
    let (h, _) = users_harness(3).await;
    let _ = h
        .workspace
        .primary_key_columns(&common::users_selection())
        .await
        .unwrap();

    h.workspace.forget_table(&users());

    h.workspace.read(|state| {
        assert_eq!(state.selected_table(), None);
        assert!(state.rows().is_empty());
        assert!(state.tables().is_empty());
        assert!(state.metadata().is_empty());
        let tab = state.active_tab().unwrap();
        assert!(!tab.has_cached_results());
        assert_eq!(tab.selected_table, None);
    });
}

// ============ Persistence Tests ============

#[tokio::test]
async fn save_tabs_writes_selection_not_rows() {
    let store = Arc::new(MemoryTabStore::new());
    let h = Harness::with_store(users_service(3), store.clone());
    let alpha = h.add_profile("alpha", "app").await;
    let _ = h.workspace.connect(alpha, None).await.unwrap();
    let _ = h.workspace.select_table(common::users_selection()).await.unwrap();
    let tab = h.workspace.read(|state| state.active_tab_id()).unwrap();
    h.workspace.set_query_text(tab, "SELECT 1").unwrap();

    h.workspace.save_tabs().await.unwrap();

    let saved = store.snapshot().unwrap();
    assert_eq!(saved.active_tab_id, Some(tab.0));
    assert_eq!(saved.tabs.len(), 1);
    let record = &saved.tabs[0];
    assert_eq!(record.connection_id, Some(alpha));
    assert_eq!(record.database_name.as_deref(), Some("app"));
    assert_eq!(record.selected_table_name.as_deref(), Some("users"));
    assert_eq!(record.query_text, "SELECT 1");
    let json = serde_json::to_string(&saved).unwrap();
    assert!(!json.contains("user-1"));
}

#[tokio::test]
async fn save_tabs_retries_once() {
    let store = Arc::new(FlakyTabStore::failing(1));
    let h = Harness::with_store(MockDatabaseService::new(), store.clone());

    h.workspace.save_tabs().await.unwrap();

    assert_eq!(store.saves.load(Ordering::SeqCst), 2);
    assert!(store.inner.snapshot().is_some());
    assert_eq!(h.workspace.read(|state| state.error_message().map(str::to_string)), None);
}

#[tokio::test]
async fn save_tabs_surfaces_persistent_failure() {
    let store = Arc::new(FlakyTabStore::failing(5));
    let h = Harness::with_store(MockDatabaseService::new(), store.clone());

    let err = h.workspace.save_tabs().await.unwrap_err();

    assert!(matches!(err, ServiceError::PersistenceFailed(_)));
    assert_eq!(store.saves.load(Ordering::SeqCst), 2);
    h.workspace.read(|state| {
        assert!(state.error_message().unwrap().contains("database is locked"));
    });
}

#[tokio::test]
async fn restored_tabs_refetch_and_drop_missing_tables() {
    let store = Arc::new(MemoryTabStore::new());
    let h = Harness::with_store(users_service(4), store.clone());
    let alpha = h.add_profile("alpha", "app").await;
    let ghost = record(alpha, Some("ghost"));
    let with_users = record(alpha, Some("users"));
    store
        .save(&PersistedWorkspace {
            tabs: vec![ghost.clone(), with_users.clone()],
            saved_queries: Vec::new(),
            active_tab_id: Some(with_users.id),
        })
        .await
        .unwrap();

    let active = h.workspace.restore_tabs().await.unwrap().unwrap();
    assert_eq!(active.0, with_users.id);
    h.workspace.read(|state| {
        // restored tabs never carry results
        assert!(state.tabs().iter().all(|t| !t.has_cached_results()));
    });

    assert_eq!(h.workspace.handle_tab_change(active).await.unwrap(), Outcome::Applied);
    assert_eq!(h.service.calls_to("fetch:public.users"), 1);
    assert_eq!(displayed_ids(&h.workspace), vec![1, 2, 3, 4]);

    let ghost_tab = pgdesk_services::TabId(ghost.id);
    assert_eq!(h.workspace.handle_tab_change(ghost_tab).await.unwrap(), Outcome::Applied);
    assert_eq!(h.service.calls_to("fetch:public.ghost"), 0);
    h.workspace.read(|state| {
        assert_eq!(state.selected_table(), None);
        assert_eq!(state.active_tab().unwrap().selected_table, None);
        assert!(state.rows().is_empty());
    });
}

// ============ Saved Query Tests ============

#[tokio::test]
async fn saved_query_results_are_restored_verbatim() {
    let output = QueryOutput::with_rows(
        vec!["total".into()],
        vec![TableRow::from_pairs([("total", 1234_i64)])],
    );
    let service = MockDatabaseService::new().with_query_result("SELECT sum", output);
    let h = Harness::new(service);
    let first = h.workspace.read(|state| state.active_tab_id()).unwrap();
    h.workspace
        .set_query_text(first, "SELECT sum(amount) AS total FROM orders")
        .unwrap();
    let saved = h.workspace.save_query(first, "Revenue").unwrap();
    let _ = h
        .workspace
        .execute_query("SELECT sum(amount) AS total FROM orders")
        .await
        .unwrap();

    let second = h.workspace.new_tab();
    let _ = h.workspace.handle_tab_change(second).await.unwrap();
    assert!(h.workspace.read(|state| state.rows().is_empty()));

    assert!(h.workspace.select_saved_query(second, saved).unwrap());

    assert_eq!(h.service.calls_to("execute:SELECT sum(amount) AS total FROM orders"), 1);
    h.workspace.read(|state| {
        let totals: Vec<_> = state
            .rows()
            .iter()
            .filter_map(|r| r.get("total").and_then(Value::as_i64))
            .collect();
        assert_eq!(totals, vec![1234]);
        let tab = state.active_tab().unwrap();
        assert_eq!(tab.query_text, "SELECT sum(amount) AS total FROM orders");
        assert_eq!(tab.saved_query_id, Some(saved));
    });
}

#[tokio::test]
async fn saving_again_updates_the_same_record() {
    let h = Harness::new(MockDatabaseService::new());
    let tab = h.workspace.read(|state| state.active_tab_id()).unwrap();
    h.workspace.set_query_text(tab, "SELECT 1").unwrap();
    let first = h.workspace.save_query(tab, "One").unwrap();
    h.workspace.set_query_text(tab, "SELECT 2").unwrap();
    let second = h.workspace.save_query(tab, "Two").unwrap();

    assert_eq!(first, second);
    h.workspace.read(|state| {
        assert_eq!(state.saved_queries().len(), 1);
        assert_eq!(state.saved_queries()[0].sql, "SELECT 2");
        assert_eq!(state.saved_queries()[0].name, "Two");
    });
}

#[tokio::test]
async fn unknown_saved_query_is_an_error() {
    let h = Harness::new(MockDatabaseService::new());
    let tab = h.workspace.read(|state| state.active_tab_id()).unwrap();

    let err = h.workspace.select_saved_query(tab, Uuid::new_v4()).unwrap_err();

    assert!(matches!(err, ServiceError::SavedQueryNotFound(_)));
}
