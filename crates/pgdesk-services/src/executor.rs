//! Query executor
//!
//! Table fetches are admitted by context snapshot: the result is committed iff
//! the owning tab still exists and the live `(connection, database, table)`
//! equals the one captured at start. Free-form queries are admitted by query
//! counter equality instead.

use pgdesk_core::{QueryContextSnapshot, TableSelection};
use pgdesk_query::{QueryHistoryEntry, StatementKind, table_name_matches};
use std::time::Instant;

use crate::error::{Outcome, ServiceError, ServiceResult};
use crate::state::WorkspaceEvent;
use crate::ticker::ElapsedTicker;
use crate::workspace::Workspace;

/// A completed free-form query is stale unless its id equals the live counter.
///
/// Equality, not ordering: cancellation moves the counter past every id
/// still in flight, and a later resubmission may carry an id greater than a
/// counter value observed earlier.
pub fn is_query_stale(query_id: u64, current_query_id: u64) -> bool {
    query_id != current_query_id
}

pub(crate) fn rows_affected_message(affected: u64) -> String {
    match affected {
        1 => "1 row affected".to_string(),
        n => format!("{} rows affected", n),
    }
}

enum QueryCompletion {
    Stale,
    Failed(ServiceError),
    Displayed,
    Notified,
    Mutated { refresh: Option<TableSelection> },
}

impl Workspace {
    /// Fetch the first page of `table`, which should be the live selection.
    ///
    /// A result whose context was superseded while the fetch was in flight is
    /// dropped without touching state, including loading and error flags.
    #[tracing::instrument(skip(self, table), fields(table = %table.id()))]
    pub async fn execute_table_query(&self, table: &TableSelection) -> ServiceResult<Outcome> {
        let table_id = table.id();
        let started = self.update(|state, events| {
            let tab_id = state.active_tab_id.filter(|id| state.tabs.is_valid(*id))?;
            let snapshot = QueryContextSnapshot::capture(
                state.connection_id,
                state.database_name.as_deref(),
                Some(&table_id),
            );
            state.set_tab_loading(tab_id, true, events);
            state.set_error(None, events);
            state.results_shown = false;
            Some((tab_id, snapshot))
        });
        let Some((tab_id, snapshot)) = started else {
            return Err(ServiceError::NoActiveTab);
        };

        let result = self
            .service
            .fetch_table_data(&table.schema, &table.name, 0, self.config.page_size)
            .await;

        self.update(|state, events| {
            if !state.tabs.is_valid(tab_id) || !snapshot.is_valid_against(&state.live_context()) {
                tracing::debug!(%tab_id, "discarding stale table fetch");
                return Ok(Outcome::Stale);
            }
            match result {
                Ok(output) => {
                    let rows = output.rows.len();
                    if let Some(tab) = state.tabs.by_id_mut(tab_id) {
                        tab.store_results(output.column_names.clone(), output.rows.clone(), Some(table_id));
                    }
                    let version = state.replace_results(output.column_names, output.rows, events);
                    state.set_tab_loading(tab_id, false, events);
                    tracing::debug!(rows, version, "table results applied");
                    Ok(Outcome::Applied)
                }
                Err(e) if e.is_cancelled() => {
                    tracing::debug!("table fetch superseded by the service");
                    state.set_tab_loading(tab_id, false, events);
                    Ok(Outcome::Stale)
                }
                Err(e) => {
                    let err = ServiceError::from_core(ServiceError::TableLoadFailed, e);
                    tracing::warn!(error = %err, "table fetch failed");
                    state.set_tab_loading(tab_id, false, events);
                    state.set_error(Some(self.status_text(&err)), events);
                    Err(err)
                }
            }
        })
    }

    /// Run free-form SQL on the active tab.
    ///
    /// Row-returning statements replace the grid. Mutations without RETURNING
    /// leave it alone, post an "N rows affected" notification, and refresh the
    /// displayed table when it was the one mutated.
    #[tracing::instrument(skip(self, sql), fields(sql_preview = %sql.chars().take(50).collect::<String>()))]
    pub async fn execute_query(&self, sql: &str) -> ServiceResult<Outcome> {
        let sender = self.event_sender();
        let interval = self.config.ticker_interval();
        let cancel_handle = self.service.cancel_handle();

        let submitted = self.update(|state, events| {
            let tab_id = state.active_tab_id.filter(|id| state.tabs.is_valid(*id))?;
            state.query_counter += 1;
            let query_id = state.query_counter;

            // every query still in flight is now stale
            for tab in state.tabs.iter_mut().filter(|t| t.running_query_id.is_some()) {
                tab.finish_query();
                events.push(WorkspaceEvent::LoadingChanged { tab_id: tab.id, loading: false });
            }

            let started_at = Instant::now();
            let ticker = ElapsedTicker::start(started_at, interval, move |elapsed| {
                let _ = sender.send(WorkspaceEvent::ElapsedTick { tab_id, elapsed });
            });
            if let Some(tab) = state.tabs.by_id_mut(tab_id) {
                tab.begin_query(query_id, started_at, cancel_handle, ticker);
            }
            state.set_error(None, events);
            events.push(WorkspaceEvent::LoadingChanged { tab_id, loading: true });
            events.push(WorkspaceEvent::QueryStarted { tab_id, query_id });
            Some((tab_id, query_id, state.connection_id, state.database_name.clone()))
        });
        let Some((tab_id, query_id, connection_id, database_name)) = submitted else {
            return Err(ServiceError::NoActiveTab);
        };
        tracing::debug!(%tab_id, query_id, "query submitted");

        let started = Instant::now();
        let result = self.service.execute_query(sql).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        let entry = match &result {
            Ok(output) => QueryHistoryEntry::succeeded(
                sql,
                connection_id,
                database_name,
                duration_ms,
                output.affected_rows.unwrap_or(output.rows.len() as u64),
            ),
            Err(e) => QueryHistoryEntry::failed(sql, connection_id, database_name, duration_ms, e.to_string()),
        };
        let kind = self.analyzer.classify(sql);
        let ttl = self.config.notification_ttl();

        let completion = self.update(|state, events| {
            if is_query_stale(query_id, state.query_counter) || !state.tabs.is_valid(tab_id) {
                tracing::debug!(query_id, current = state.query_counter, "discarding stale query result");
                return QueryCompletion::Stale;
            }
            if let Some(tab) = state.tabs.by_id_mut(tab_id) {
                tab.finish_query();
            }
            events.push(WorkspaceEvent::LoadingChanged { tab_id, loading: false });
            events.push(WorkspaceEvent::QueryFinished {
                tab_id,
                query_id,
                success: result.is_ok(),
            });

            let output = match result {
                Ok(output) => output,
                Err(e) if e.is_cancelled() => {
                    tracing::debug!(query_id, "query cancelled by the service");
                    return QueryCompletion::Stale;
                }
                Err(e) => {
                    let err = ServiceError::from_core(ServiceError::QueryFailed, e);
                    tracing::warn!(query_id, error = %err, "query failed");
                    state.set_error(Some(self.status_text(&err)), events);
                    return QueryCompletion::Failed(err);
                }
            };

            match kind {
                StatementKind::Mutation { table, .. } => {
                    let affected = output.affected_rows.unwrap_or(0);
                    state.notify(rows_affected_message(affected), ttl, events);
                    let refresh = state
                        .selected_table
                        .clone()
                        .filter(|selected| table_name_matches(&table, &selected.id()));
                    tracing::debug!(affected, mutated = %table, refresh = refresh.is_some(), "mutation executed");
                    QueryCompletion::Mutated { refresh }
                }
                StatementKind::Other if output.column_names.is_empty() => {
                    state.notify("Query executed successfully".to_string(), ttl, events);
                    QueryCompletion::Notified
                }
                StatementKind::Query | StatementKind::Other => {
                    let saved_query_id = state.tabs.by_id(tab_id).and_then(|t| t.saved_query_id);
                    if let Some(saved_query_id) = saved_query_id {
                        state.saved_query_results.store(
                            saved_query_id,
                            output.column_names.clone(),
                            output.rows.clone(),
                        );
                    }
                    if let Some(tab) = state.tabs.by_id_mut(tab_id) {
                        tab.store_results(output.column_names.clone(), output.rows.clone(), None);
                    }
                    if state.active_tab_id == Some(tab_id) {
                        state.replace_results(output.column_names, output.rows, events);
                    }
                    QueryCompletion::Displayed
                }
            }
        });

        let stale = matches!(completion, QueryCompletion::Stale);
        self.history
            .lock()
            .add(if stale { entry.superseded() } else { entry });

        match completion {
            QueryCompletion::Stale => Ok(Outcome::Stale),
            QueryCompletion::Failed(err) => Err(err),
            QueryCompletion::Displayed | QueryCompletion::Notified => Ok(Outcome::Applied),
            QueryCompletion::Mutated { refresh: None } => Ok(Outcome::Applied),
            QueryCompletion::Mutated { refresh: Some(table) } => {
                self.execute_table_query(&table).await.map(|_| Outcome::Applied)
            }
        }
    }

    /// Cancel the active tab's query.
    ///
    /// Bumps the query counter so any completion still in flight recognizes
    /// itself as stale. Returns whether a query was running on the active tab.
    #[tracing::instrument(skip(self))]
    pub fn cancel_query(&self) -> bool {
        self.update(|state, events| {
            state.query_counter += 1;
            let active = state.active_tab_id;
            let mut cancelled = false;
            for tab in state.tabs.iter_mut().filter(|t| t.running_query_id.is_some()) {
                if Some(tab.id) == active {
                    cancelled = tab.cancel_query();
                    events.push(WorkspaceEvent::QueryCancelled { tab_id: tab.id });
                } else {
                    tab.finish_query();
                }
                events.push(WorkspaceEvent::LoadingChanged { tab_id: tab.id, loading: false });
            }
            tracing::debug!(counter = state.query_counter, cancelled, "query cancellation requested");
            cancelled
        })
    }
}
