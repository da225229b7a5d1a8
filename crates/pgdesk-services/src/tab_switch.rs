//! Tab-switch coordinator
//!
//! ```text
//! Started ──► Connecting ──► LoadingDatabases ──► RestoringSelection ──► Done
//!    │  (fast path: same connection + database, live) ──────┘
//!    └──────── any step: generation moved on or tab closed ──► Aborted
//! ```
//!
//! Each switch advances the generation. After every suspension the pipeline
//! checks that its generation is still current and its tab still valid, and
//! quietly stops otherwise. Whatever loading flags it left behind belong to
//! the switch that superseded it.

use pgdesk_core::TableSelection;
use uuid::Uuid;

use crate::error::{Outcome, ServiceError, ServiceResult};
use crate::generation::Generation;
use crate::state::WorkspaceEvent;
use crate::tabs::{Tab, TabId};
use crate::workspace::Workspace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TabSwitchPhase {
    Started,
    Connecting,
    LoadingDatabases,
    RestoringSelection,
    Done,
    Aborted,
}

/// What the target tab wanted when the switch started
struct SwitchTarget {
    connection_id: Option<Uuid>,
    database_name: Option<String>,
    selected_table: Option<TableSelection>,
}

impl Workspace {
    /// Make `tab_id` the active tab and bring the live selection in line with it
    #[tracing::instrument(skip(self), fields(%tab_id))]
    pub async fn handle_tab_change(&self, tab_id: TabId) -> ServiceResult<Outcome> {
        let generation = self.generation.advance();
        tracing::debug!(%generation, "tab switch started");

        let target = self.update(|state, events| {
            let tab = state.tabs.by_id(tab_id).filter(|t| !t.is_pending_deletion)?;
            let target = SwitchTarget {
                connection_id: tab.connection_id,
                database_name: tab.database_name.clone(),
                selected_table: tab.selected_table.clone(),
            };
            let cached = tab
                .cached_results
                .clone()
                .map(|rows| (tab.cached_column_names.clone().unwrap_or_default(), rows));
            let idle = tab.running_query_id.is_none();

            if state.active_tab_id != Some(tab_id) {
                state.active_tab_id = Some(tab_id);
                events.push(WorkspaceEvent::ActiveTabChanged(Some(tab_id)));
            }
            state.is_connecting = false;
            if idle {
                // a table fetch that went stale while the tab was away leaves its flag behind
                state.set_tab_loading(tab_id, false, events);
            }
            state.set_phase(tab_id, TabSwitchPhase::Started, events);
            state.set_error(None, events);
            match cached {
                Some((columns, rows)) => {
                    state.replace_results(columns, rows, events);
                }
                None => state.clear_results(events),
            }
            Some(target)
        });
        let Some(target) = target else {
            tracing::debug!("tab gone before switch started");
            return Ok(Outcome::Stale);
        };

        let Some(connection_id) = target.connection_id else {
            self.update(|state, events| {
                state.set_connection(None, None, events);
                state.set_phase(tab_id, TabSwitchPhase::Done, events);
            });
            return Ok(Outcome::Applied);
        };

        // the live selection moves before a connect finishes, so it alone cannot
        // tell whether the service is really open on this database
        let fast_path = self.read(|state| {
            state.connection_id == Some(connection_id)
                && state.database_name == target.database_name
                && state.connected_to.as_ref().is_some_and(|(id, database)| {
                    *id == connection_id && target.database_name.as_deref() == Some(database.as_str())
                })
        }) && self.service.is_connected();

        if fast_path {
            tracing::debug!("already on this connection and database, restoring selection only");
        } else if self
            .reconnect(tab_id, generation, connection_id, target.database_name)
            .await?
            .is_stale()
        {
            return Ok(Outcome::Stale);
        }

        self.restore_selection(tab_id, generation, target.selected_table)
            .await
    }

    fn switch_is_current(&self, tab_id: TabId, generation: Generation) -> bool {
        self.generation.is_current(generation) && self.read(|state| state.tabs.is_valid(tab_id))
    }

    fn abort_switch(&self, tab_id: TabId, generation: Generation, phase: TabSwitchPhase) -> Outcome {
        tracing::debug!(
            %tab_id,
            %generation,
            current = %self.generation.current(),
            ?phase,
            "tab switch superseded"
        );
        Outcome::Stale
    }

    /// Record a genuine failure of a switch that is still current
    fn fail_switch(&self, tab_id: TabId, err: ServiceError) -> ServiceError {
        tracing::warn!(%tab_id, error = %err, "tab switch failed");
        let text = self.status_text(&err);
        self.update(|state, events| {
            state.is_connecting = false;
            state.set_phase(tab_id, TabSwitchPhase::Aborted, events);
            state.set_error(Some(text), events);
        });
        err
    }

    async fn reconnect(
        &self,
        tab_id: TabId,
        generation: Generation,
        connection_id: Uuid,
        database_name: Option<String>,
    ) -> ServiceResult<Outcome> {
        let Some(profile) = self.connections.get_saved(connection_id) else {
            return Err(self.fail_switch(tab_id, ServiceError::ConnectionNotFound(connection_id)));
        };
        let database = database_name.unwrap_or_else(|| profile.database.clone());

        // in-flight work for the previous selection is stale from here on
        self.update(|state, events| {
            state.set_phase(tab_id, TabSwitchPhase::Connecting, events);
            state.is_connecting = true;
            state.connected_to = None;
            state.set_connection(Some(connection_id), Some(database.clone()), events);
        });

        let password = match self.connections.password(connection_id).await {
            Ok(password) => password,
            Err(e) => {
                tracing::warn!(error = %e, "keychain lookup failed, connecting without password");
                None
            }
        };
        if !self.switch_is_current(tab_id, generation) {
            return Ok(self.abort_switch(tab_id, generation, TabSwitchPhase::Connecting));
        }

        let config = profile.connection_config(&database, password);
        let connected = self.service.connect(&config).await;
        if !self.switch_is_current(tab_id, generation) {
            return Ok(self.abort_switch(tab_id, generation, TabSwitchPhase::Connecting));
        }
        match connected {
            Ok(()) => {}
            Err(e) if e.is_cancelled() => {
                self.update(|state, _| state.is_connecting = false);
                return Ok(self.abort_switch(tab_id, generation, TabSwitchPhase::Connecting));
            }
            Err(e) => {
                return Err(self.fail_switch(tab_id, ServiceError::from_core(ServiceError::ConnectionFailed, e)));
            }
        }
        self.connections.mark_connected(connection_id);
        self.update(|state, events| {
            state.is_connecting = false;
            state.set_phase(tab_id, TabSwitchPhase::LoadingDatabases, events);
        });

        let loaded = futures::future::try_join(
            self.service.fetch_databases(),
            self.service.fetch_tables(&database),
        )
        .await;
        if !self.switch_is_current(tab_id, generation) {
            return Ok(self.abort_switch(tab_id, generation, TabSwitchPhase::LoadingDatabases));
        }
        let (databases, tables) = match loaded {
            Ok(loaded) => loaded,
            Err(e) if e.is_cancelled() => {
                return Ok(self.abort_switch(tab_id, generation, TabSwitchPhase::LoadingDatabases));
            }
            Err(e) => {
                return Err(self.fail_switch(tab_id, ServiceError::from_core(ServiceError::SchemaLoadFailed, e)));
            }
        };

        tracing::debug!(databases = databases.len(), tables = tables.len(), "schema loaded");
        self.update(|state, events| {
            events.push(WorkspaceEvent::DatabasesLoaded(databases.len()));
            events.push(WorkspaceEvent::TablesLoaded(tables.len()));
            state.databases = databases;
            state.tables = tables;
            state.connected_to = Some((connection_id, database));
        });
        Ok(Outcome::Applied)
    }

    async fn restore_selection(
        &self,
        tab_id: TabId,
        generation: Generation,
        table: Option<TableSelection>,
    ) -> ServiceResult<Outcome> {
        if !self.switch_is_current(tab_id, generation) {
            return Ok(self.abort_switch(tab_id, generation, TabSwitchPhase::RestoringSelection));
        }

        let needs_fetch = self.update(|state, events| {
            state.set_phase(tab_id, TabSwitchPhase::RestoringSelection, events);
            // a table dropped since the tab last saw it is not restored
            let table = table.filter(|t| {
                state.tables.is_empty() || state.tables.iter().any(|info| info.id() == t.id())
            });
            state.set_selected_table(table.clone(), events);
            let reuse = state.active_tab().is_some_and(Tab::can_reuse_cached_results);
            table.filter(|_| !reuse)
        });

        // let observers of the selection run before the table loads
        tokio::task::yield_now().await;
        if !self.switch_is_current(tab_id, generation) {
            return Ok(self.abort_switch(tab_id, generation, TabSwitchPhase::RestoringSelection));
        }

        if let Some(table) = needs_fetch {
            match self.execute_table_query(&table).await {
                Ok(Outcome::Applied) => {}
                Ok(Outcome::Stale) => {
                    return Ok(self.abort_switch(tab_id, generation, TabSwitchPhase::RestoringSelection));
                }
                Err(err) => {
                    if self.switch_is_current(tab_id, generation) {
                        self.update(|state, events| state.set_phase(tab_id, TabSwitchPhase::Aborted, events));
                    }
                    return Err(err);
                }
            }
        }
        if !self.switch_is_current(tab_id, generation) {
            return Ok(self.abort_switch(tab_id, generation, TabSwitchPhase::RestoringSelection));
        }

        self.update(|state, events| state.set_phase(tab_id, TabSwitchPhase::Done, events));
        tracing::debug!(%generation, "tab switch done");
        Ok(Outcome::Applied)
    }
}
