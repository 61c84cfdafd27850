use anyhow::Context;
use hexatlas_protocol::api::MapSummary;
use hexatlas_protocol::{HexTile, Id, Map, NewMap, Path as MapPath, ShapeParams};
use rusqlite::{Connection, OpenFlags, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

pub mod error;
pub mod grid;
pub mod hex;
pub mod map;
pub mod paint;
pub mod paths;
pub mod tiles;

pub use error::ConfigurationError;

static ID_COUNTER: AtomicU64 = AtomicU64::new(1);

pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
        .try_into()
        .unwrap_or(i64::MAX)
}

pub(crate) fn new_id(prefix: &str) -> String {
    let c = ID_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}-{}-{c}", now_ms())
}

/// SQLite-backed map store for one world.
#[derive(Debug, Clone)]
pub struct Engine {
    db_path: PathBuf,
}

impl Engine {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
        }
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn open(&self) -> anyhow::Result<Connection> {
        let path = self.db_path.clone();
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("create db dir: {}", dir.display()))?;
        }

        let conn = Connection::open_with_flags(
            &path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .with_context(|| format!("open sqlite db: {}", path.display()))?;

        // Durable + fast defaults.
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;

        migrate(&conn)?;
        Ok(conn)
    }

    pub fn list_maps(&self) -> anyhow::Result<Vec<Map>> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {MAP_COLUMNS} FROM maps ORDER BY updated_at_ms DESC"
        ))?;
        let rows = stmt.query_map([], MapRow::from_row)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?.into_map()?);
        }
        Ok(out)
    }

    /// Lightweight listing without decoding tiles.
    pub fn list_map_summaries(&self) -> anyhow::Result<Vec<MapSummary>> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(
            "SELECT id, name, shape, radius, width, height, tile_count, path_count, updated_at_ms
             FROM maps ORDER BY updated_at_ms DESC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<i64>>(3)?,
                row.get::<_, Option<i64>>(4)?,
                row.get::<_, Option<i64>>(5)?,
                row.get::<_, i64>(6)?,
                row.get::<_, i64>(7)?,
                row.get::<_, i64>(8)?,
            ))
        })?;
        let mut out = Vec::new();
        for row in rows {
            let (id, name, shape, radius, width, height, tiles, paths, updated_at_ms) = row?;
            out.push(MapSummary {
                shape: decode_shape(&shape, radius, width, height)
                    .with_context(|| format!("decode shape of map {id}"))?,
                id,
                name,
                tile_count: usize::try_from(tiles).unwrap_or(0),
                path_count: usize::try_from(paths).unwrap_or(0),
                updated_at_ms,
            });
        }
        Ok(out)
    }

    pub fn get_map(&self, id: &str) -> anyhow::Result<Option<Map>> {
        let conn = self.open()?;
        let row = conn
            .query_row(
                &format!("SELECT {MAP_COLUMNS} FROM maps WHERE id = ?1"),
                [id],
                MapRow::from_row,
            )
            .optional()?;
        row.map(MapRow::into_map).transpose()
    }

    pub fn create_map(&self, new_map: &NewMap) -> anyhow::Result<Id> {
        let mut conn = self.open()?;
        let tx = conn.transaction()?;
        let id = new_id("map");
        let ts = now_ms();
        let cols = ShapeColumns::from(&new_map.shape);
        tx.execute(
            "INSERT INTO maps (id, name, shape, radius, width, height, tiles_json, paths_json,
                               tile_count, path_count, created_at_ms, updated_at_ms, rev)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11, 1)",
            rusqlite::params![
                &id,
                &new_map.name,
                cols.shape,
                cols.radius,
                cols.width,
                cols.height,
                serde_json::to_string(&new_map.tiles)?,
                serde_json::to_string(&new_map.paths)?,
                new_map.tiles.len() as i64,
                new_map.paths.len() as i64,
                ts,
            ],
        )?;
        append_event_tx(
            &tx,
            "map.created",
            Some(&id),
            serde_json::json!({ "id": id, "name": new_map.name, "shape": cols.shape }),
        )?;
        tx.commit()?;
        tracing::debug!(map_id = %id, tiles = new_map.tiles.len(), "map created");
        Ok(id)
    }

    /// Overwrites a stored map. Fails if the id is unknown.
    pub fn replace_map(&self, map: &Map) -> anyhow::Result<()> {
        let mut conn = self.open()?;
        let tx = conn.transaction()?;
        let cols = ShapeColumns::from(&map.shape);
        let n = tx.execute(
            "UPDATE maps SET name = ?2, shape = ?3, radius = ?4, width = ?5, height = ?6,
                    tiles_json = ?7, paths_json = ?8, tile_count = ?9, path_count = ?10,
                    updated_at_ms = ?11, rev = rev + 1
             WHERE id = ?1",
            rusqlite::params![
                &map.id,
                &map.name,
                cols.shape,
                cols.radius,
                cols.width,
                cols.height,
                serde_json::to_string(&map.tiles)?,
                serde_json::to_string(&map.paths)?,
                map.tiles.len() as i64,
                map.paths.len() as i64,
                now_ms(),
            ],
        )?;
        if n == 0 {
            anyhow::bail!("map not found: {}", map.id);
        }
        append_event_tx(
            &tx,
            "map.replaced",
            Some(&map.id),
            serde_json::json!({ "id": map.id }),
        )?;
        tx.commit()?;
        tracing::debug!(map_id = %map.id, "map replaced");
        Ok(())
    }

    pub fn delete_map(&self, id: &str) -> anyhow::Result<bool> {
        let mut conn = self.open()?;
        let tx = conn.transaction()?;
        let n = tx.execute("DELETE FROM maps WHERE id = ?1", [id])?;
        if n > 0 {
            append_event_tx(
                &tx,
                "map.deleted",
                Some(id),
                serde_json::json!({ "id": id }),
            )?;
        }
        tx.commit()?;
        Ok(n > 0)
    }

    /// Stored revision counter of one map (bumped on every replace).
    pub fn map_rev(&self, id: &str) -> anyhow::Result<Option<i64>> {
        let conn = self.open()?;
        Ok(conn
            .query_row("SELECT rev FROM maps WHERE id = ?1", [id], |row| row.get(0))
            .optional()?)
    }

    pub fn get_rev(&self) -> anyhow::Result<i64> {
        let conn = self.open()?;
        let rev: Option<i64> =
            conn.query_row("SELECT MAX(seq) FROM event_log", [], |row| row.get(0))?;
        Ok(rev.unwrap_or(0))
    }
}

const MAP_COLUMNS: &str = "id, name, shape, radius, width, height, tiles_json, paths_json";

struct MapRow {
    id: String,
    name: String,
    shape: String,
    radius: Option<i64>,
    width: Option<i64>,
    height: Option<i64>,
    tiles_json: String,
    paths_json: String,
}

impl MapRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            shape: row.get(2)?,
            radius: row.get(3)?,
            width: row.get(4)?,
            height: row.get(5)?,
            tiles_json: row.get(6)?,
            paths_json: row.get(7)?,
        })
    }

    fn into_map(self) -> anyhow::Result<Map> {
        let shape = decode_shape(&self.shape, self.radius, self.width, self.height)
            .with_context(|| format!("decode shape of map {}", self.id))?;
        let tiles: Vec<HexTile> = serde_json::from_str(&self.tiles_json)
            .with_context(|| format!("decode tiles of map {}", self.id))?;
        let paths: Vec<MapPath> = serde_json::from_str(&self.paths_json)
            .with_context(|| format!("decode paths of map {}", self.id))?;
        Ok(Map {
            id: self.id,
            name: self.name,
            shape,
            tiles,
            paths,
        })
    }
}

struct ShapeColumns {
    shape: &'static str,
    radius: Option<i64>,
    width: Option<i64>,
    height: Option<i64>,
}

impl From<&ShapeParams> for ShapeColumns {
    fn from(shape: &ShapeParams) -> Self {
        match *shape {
            ShapeParams::Radial { radius } => Self {
                shape: "radial",
                radius: Some(i64::from(radius)),
                width: None,
                height: None,
            },
            ShapeParams::Rectangular { width, height } => Self {
                shape: "rectangular",
                radius: None,
                width: Some(i64::from(width)),
                height: Some(i64::from(height)),
            },
        }
    }
}

fn decode_shape(
    shape: &str,
    radius: Option<i64>,
    width: Option<i64>,
    height: Option<i64>,
) -> anyhow::Result<ShapeParams> {
    let dim = |v: Option<i64>, name: &str| -> anyhow::Result<u32> {
        let v = v.with_context(|| format!("{shape} map without {name}"))?;
        u32::try_from(v).with_context(|| format!("{name} out of range: {v}"))
    };
    match shape {
        "radial" => Ok(ShapeParams::Radial {
            radius: dim(radius, "radius")?,
        }),
        "rectangular" => Ok(ShapeParams::Rectangular {
            width: dim(width, "width")?,
            height: dim(height, "height")?,
        }),
        other => anyhow::bail!("unknown map shape: {other}"),
    }
}

fn migrate(conn: &Connection) -> anyhow::Result<()> {
    // `user_version` + IF NOT EXISTS keeps older world files opening cleanly.
    let v: i64 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

    if v < 1 {
        conn.execute_batch(
            r#"
-- Monotonic revision source for autosave bookkeeping.
CREATE TABLE IF NOT EXISTS event_log (
  seq INTEGER PRIMARY KEY AUTOINCREMENT,
  ts_ms INTEGER NOT NULL,
  kind TEXT NOT NULL,
  entity_id TEXT,
  payload_json TEXT NOT NULL DEFAULT '{}'
);

CREATE INDEX IF NOT EXISTS idx_event_log_ts ON event_log(ts_ms);
CREATE INDEX IF NOT EXISTS idx_event_log_kind ON event_log(kind);

CREATE TABLE IF NOT EXISTS maps (
  id TEXT PRIMARY KEY,
  name TEXT NOT NULL,
  shape TEXT NOT NULL,
  radius INTEGER,
  width INTEGER,
  height INTEGER,
  tiles_json TEXT NOT NULL DEFAULT '[]',
  paths_json TEXT NOT NULL DEFAULT '[]',
  created_at_ms INTEGER NOT NULL,
  updated_at_ms INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_maps_updated_at ON maps(updated_at_ms);
"#,
        )?;

        conn.pragma_update(None, "user_version", 1_i64)?;
    }

    // Best-effort column additions for existing DBs.
    ensure_column(conn, "maps", "rev", "INTEGER NOT NULL DEFAULT 0")?;
    ensure_column(conn, "maps", "tile_count", "INTEGER NOT NULL DEFAULT 0")?;
    ensure_column(conn, "maps", "path_count", "INTEGER NOT NULL DEFAULT 0")?;

    Ok(())
}

fn ensure_column(conn: &Connection, table: &str, col: &str, decl: &str) -> anyhow::Result<()> {
    let sql = format!("ALTER TABLE {table} ADD COLUMN {col} {decl}");
    match conn.execute(&sql, []) {
        Ok(_) => Ok(()),
        Err(e) => {
            // Ignore "duplicate column name".
            if e.to_string().to_lowercase().contains("duplicate column") {
                return Ok(());
            }
            Err(e).with_context(|| format!("ensure column {table}.{col}"))
        }
    }
}

fn append_event_tx(
    tx: &rusqlite::Transaction<'_>,
    kind: &str,
    entity_id: Option<&str>,
    payload: serde_json::Value,
) -> anyhow::Result<i64> {
    let ts = now_ms();
    let payload_json = payload.to_string();
    tx.execute(
        "INSERT INTO event_log (ts_ms, kind, entity_id, payload_json) VALUES (?1, ?2, ?3, ?4)",
        (ts, kind, entity_id, payload_json),
    )?;
    Ok(tx.last_insert_rowid())
}
