//! Row mutations
//!
//! Deletes are optimistic: rows leave the grid before the database confirms.
//! On failure they come back only if the grid has not been replaced since
//! (same results version); otherwise reinserting would corrupt newer results.
//! Updates are not optimistic and touch the grid only after success.

use pgdesk_core::{RowId, TableRow, Value};
use std::collections::{HashMap, HashSet};

use crate::error::{Outcome, ServiceError, ServiceResult};
use crate::state::{WorkspaceEvent, WorkspaceState};
use crate::workspace::Workspace;

/// Rows removed optimistically, in ascending original index order
#[derive(Debug)]
struct PendingDelete {
    version: u64,
    removed: Vec<(usize, TableRow)>,
}

/// Put rows back at their original positions, clamped to the current length.
///
/// `removed` must be in ascending index order so earlier insertions do not
/// shift later targets.
pub(crate) fn reinsert_rows(rows: &mut Vec<TableRow>, removed: Vec<(usize, TableRow)>) {
    for (index, row) in removed {
        let at = index.min(rows.len());
        rows.insert(at, row);
    }
}

fn deleted_message(count: u64) -> String {
    match count {
        1 => "1 row deleted".to_string(),
        n => format!("{} rows deleted", n),
    }
}

impl Workspace {
    /// Delete rows from the selected table.
    ///
    /// Returns `Stale` when the selection changed while primary keys were
    /// being resolved, or none of the rows are displayed any more.
    #[tracing::instrument(skip(self, row_ids), fields(rows = row_ids.len()))]
    pub async fn perform_delete(&self, row_ids: &[RowId]) -> ServiceResult<Outcome> {
        let table = self
            .read(|state| state.selected_table.clone())
            .ok_or(ServiceError::NoTableSelected)?;
        if row_ids.is_empty() {
            return Ok(Outcome::Applied);
        }

        let primary_keys = match self.primary_key_columns(&table).await {
            Ok(keys) => keys,
            Err(err) => {
                self.report_error(&err);
                return Err(err);
            }
        };

        let wanted: HashSet<RowId> = row_ids.iter().copied().collect();
        let pending = self.update(|state, events| {
            if state.selected_table_id() != Some(table.id()) {
                tracing::debug!("selection changed while resolving primary keys");
                return None;
            }
            let removed: Vec<(usize, TableRow)> = state
                .rows
                .iter()
                .enumerate()
                .filter(|(_, row)| wanted.contains(&row.id))
                .map(|(index, row)| (index, row.clone()))
                .collect();
            if removed.is_empty() {
                return None;
            }
            state.rows.retain(|row| !wanted.contains(&row.id));
            state.selected_rows.retain(|id| !wanted.contains(id));
            state.set_error(None, events);
            events.push(WorkspaceEvent::RowsRemoved(removed.len()));
            Some(PendingDelete {
                version: state.results_version,
                removed,
            })
        });
        let Some(pending) = pending else {
            return Ok(Outcome::Stale);
        };

        let rows: Vec<TableRow> = pending.removed.iter().map(|(_, row)| row.clone()).collect();
        let result = self
            .service
            .delete_rows(&table.schema, &table.name, &primary_keys, &rows)
            .await;
        let ttl = self.config.notification_ttl();

        self.update(|state, events| match result {
            Ok(affected) => {
                if state.results_version == pending.version {
                    state.sync_active_cache();
                }
                state.notify(deleted_message(affected), ttl, events);
                tracing::debug!(affected, "rows deleted");
                Ok(Outcome::Applied)
            }
            Err(e) => {
                let err = ServiceError::from_core(ServiceError::DeleteFailed, e);
                rollback_delete(state, pending, events);
                tracing::warn!(error = %err, "delete failed");
                state.set_error(Some(self.status_text(&err)), events);
                Err(err)
            }
        })
    }

    /// Update one displayed row.
    ///
    /// On success the row is replaced under a new identity and any selection
    /// of the old identity follows it. Returns the new identity, or `None` if
    /// the row was no longer displayed when the update completed.
    #[tracing::instrument(skip(self, new_values), fields(%row_id, columns = new_values.len()))]
    pub async fn perform_update(
        &self,
        row_id: RowId,
        new_values: HashMap<String, Value>,
    ) -> ServiceResult<Option<RowId>> {
        let (table, original) = self.read(|state| {
            (
                state.selected_table.clone(),
                state.rows.iter().find(|row| row.id == row_id).cloned(),
            )
        });
        let table = table.ok_or(ServiceError::NoTableSelected)?;
        let original = original.ok_or(ServiceError::RowNotFound)?;

        let primary_keys = match self.primary_key_columns(&table).await {
            Ok(keys) => keys,
            Err(err) => {
                self.report_error(&err);
                return Err(err);
            }
        };

        let result = self
            .service
            .update_row(&table.schema, &table.name, &primary_keys, &original, &new_values)
            .await;

        self.update(|state, events| match result {
            Ok(()) => {
                let Some(index) = state.row_index(row_id) else {
                    tracing::debug!("updated row no longer displayed");
                    return Ok(None);
                };
                let updated = state.rows[index].with_values(&new_values);
                let new_id = updated.id;
                state.rows[index] = updated;
                if state.selected_rows.remove(&row_id) {
                    state.selected_rows.insert(new_id);
                }
                state.sync_active_cache();
                events.push(WorkspaceEvent::RowUpdated { old: row_id, new: new_id });
                Ok(Some(new_id))
            }
            Err(e) => {
                let err = ServiceError::from_core(ServiceError::UpdateFailed, e);
                tracing::warn!(error = %err, "update failed");
                state.set_error(Some(self.status_text(&err)), events);
                Err(err)
            }
        })
    }
}

fn rollback_delete(state: &mut WorkspaceState, pending: PendingDelete, events: &mut Vec<WorkspaceEvent>) {
    if state.results_version != pending.version {
        tracing::debug!(
            started = pending.version,
            current = state.results_version,
            "results replaced since delete started, not restoring rows"
        );
        return;
    }
    let count = pending.removed.len();
    reinsert_rows(&mut state.rows, pending.removed);
    events.push(WorkspaceEvent::RowsRestored(count));
}
