//! In-memory editing sessions with debounced autosave.
//!
//! The session owns the current value of each open map. Each edit pushes the
//! map's save deadline out by the debounce window; one timer task per map
//! waits for that deadline and then writes the latest value. Writes, loads and
//! deletes are serialized so an older value can never land after a newer one
//! and a deleted map cannot be reopened from a stale row.

use crate::{internal, not_found, ApiError};
use hexatlas_engine::Engine;
use hexatlas_protocol::api::{AutosaveStatus, SessionStatus};
use hexatlas_protocol::{BrushState, Id, Map};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct MapSession {
    pub map: Map,
    pub brush: BrushState,
    /// Bumped on every edit that changes `map`.
    pub generation: u64,
    pub persisted_generation: u64,
    pub autosave: Option<AutosaveStatus>,
    /// When the pending autosave fires. `Some` while a timer task is running.
    save_due: Option<Instant>,
}

impl MapSession {
    fn new(map: Map) -> Self {
        Self {
            map,
            brush: BrushState::default(),
            generation: 0,
            persisted_generation: 0,
            autosave: None,
            save_due: None,
        }
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            map_id: self.map.id.clone(),
            generation: self.generation,
            persisted_generation: self.persisted_generation,
            dirty: self.generation > self.persisted_generation,
            autosave: self.autosave.clone(),
        }
    }
}

#[derive(Clone)]
pub struct Sessions {
    engine: Engine,
    debounce: Duration,
    open: Arc<Mutex<HashMap<Id, MapSession>>>,
    write_lock: Arc<Mutex<()>>,
}

impl Sessions {
    pub fn new(engine: Engine, debounce: Duration) -> Self {
        Self {
            engine,
            debounce,
            open: Arc::new(Mutex::new(HashMap::new())),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Loads the map from the store unless a session already holds it.
    async fn ensure_open(&self, id: &str) -> Result<(), ApiError> {
        if self.open.lock().await.contains_key(id) {
            return Ok(());
        }
        // Loading under the write lock orders it against `delete`.
        let _write = self.write_lock.lock().await;
        if self.open.lock().await.contains_key(id) {
            return Ok(());
        }
        let engine = self.engine.clone();
        let key = id.to_string();
        let loaded = blocking(move || engine.get_map(&key)).await.map_err(internal)?;
        let Some(map) = loaded else {
            return Err(not_found(format!("map not found: {id}")));
        };
        self.open
            .lock()
            .await
            .insert(id.to_string(), MapSession::new(map));
        Ok(())
    }

    /// Starts a session for a map that was just created in the store.
    pub async fn insert(&self, map: Map) {
        let id = map.id.clone();
        self.open.lock().await.insert(id, MapSession::new(map));
    }

    pub async fn read<T>(&self, id: &str, f: impl FnOnce(&MapSession) -> T) -> Result<T, ApiError> {
        self.ensure_open(id).await?;
        let guard = self.open.lock().await;
        let s = guard
            .get(id)
            .ok_or_else(|| not_found(format!("map not found: {id}")))?;
        Ok(f(s))
    }

    /// Runs `f` against the session. If the map changed, bumps the generation
    /// and pushes the autosave deadline out.
    pub async fn edit<T>(
        &self,
        id: &str,
        f: impl FnOnce(&mut MapSession) -> Result<T, ApiError>,
    ) -> Result<T, ApiError> {
        self.ensure_open(id).await?;
        let (out, start_timer) = {
            let mut guard = self.open.lock().await;
            let s = guard
                .get_mut(id)
                .ok_or_else(|| not_found(format!("map not found: {id}")))?;
            let before = s.map.clone();
            let out = f(s)?;
            if s.map != before {
                s.generation += 1;
                let idle = s.save_due.is_none();
                s.save_due = Some(Instant::now() + self.debounce);
                (out, idle)
            } else {
                (out, false)
            }
        };
        if start_timer {
            self.spawn_autosave_timer(id.to_string());
        }
        Ok(out)
    }

    /// Sleeps until the map has been quiet for the debounce window, then
    /// writes it. Edits made while it sleeps only move the deadline.
    fn spawn_autosave_timer(&self, id: Id) {
        let this = self.clone();
        tokio::spawn(async move {
            loop {
                let due = match this.open.lock().await.get(&id).and_then(|s| s.save_due) {
                    Some(due) => due,
                    None => return,
                };
                tokio::time::sleep_until(due).await;

                let mut guard = this.open.lock().await;
                let Some(s) = guard.get_mut(&id) else {
                    return;
                };
                match s.save_due {
                    Some(due) if due <= Instant::now() => {
                        s.save_due = None;
                        break;
                    }
                    Some(_) => continue,
                    None => return,
                }
            }
            // Failures are recorded on the session by `persist_latest`.
            let _ = this.persist_latest(&id).await;
        });
    }

    #[cfg(test)]
    pub(crate) async fn timer_pending(&self, id: &str) -> bool {
        self.open
            .lock()
            .await
            .get(id)
            .is_some_and(|s| s.save_due.is_some())
    }

    /// Writes the current value if it is newer than the last persisted one.
    /// Returns whether a write happened.
    pub async fn persist_latest(&self, id: &str) -> anyhow::Result<bool> {
        let _write = self.write_lock.lock().await;
        let snapshot = {
            let guard = self.open.lock().await;
            match guard.get(id) {
                Some(s) if s.generation > s.persisted_generation => {
                    Some((s.map.clone(), s.generation))
                }
                _ => None,
            }
        };
        let Some((map, generation)) = snapshot else {
            return Ok(false);
        };

        let engine = self.engine.clone();
        let result = blocking(move || engine.replace_map(&map)).await;

        let mut guard = self.open.lock().await;
        if let Some(s) = guard.get_mut(id) {
            match &result {
                Ok(()) => {
                    s.persisted_generation = s.persisted_generation.max(generation);
                    s.autosave = Some(AutosaveStatus {
                        ok: true,
                        error: None,
                        at: now_rfc3339(),
                        generation,
                    });
                    tracing::debug!(map_id = %id, generation, "autosaved");
                }
                Err(e) => {
                    // The in-memory value stays; the user only loses durability.
                    tracing::warn!(map_id = %id, generation, error = %e, "autosave failed");
                    s.autosave = Some(AutosaveStatus {
                        ok: false,
                        error: Some(format!("{e:#}")),
                        at: now_rfc3339(),
                        generation,
                    });
                }
            }
        }
        result.map(|()| true)
    }

    pub async fn flush_all(&self) {
        let ids: Vec<Id> = self.open.lock().await.keys().cloned().collect();
        for id in ids {
            if let Err(e) = self.persist_latest(&id).await {
                tracing::warn!(map_id = %id, error = %e, "flush failed");
            }
        }
    }

    /// Drops the session without writing it and deletes the stored row.
    /// Returns whether the row existed.
    pub async fn delete(&self, id: &str) -> anyhow::Result<bool> {
        let _write = self.write_lock.lock().await;
        self.open.lock().await.remove(id);
        let engine = self.engine.clone();
        let key = id.to_string();
        blocking(move || engine.delete_map(&key)).await
    }
}

pub(crate) async fn blocking<T, F>(f: F) -> anyhow::Result<T>
where
    F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await?
}

pub(crate) fn now_rfc3339() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_default()
}
