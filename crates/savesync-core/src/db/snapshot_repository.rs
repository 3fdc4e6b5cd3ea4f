//! Snapshot cache repository (save and state tables)

use crate::error::{Error, Result};
use crate::models::{SnapshotEntry, SnapshotKind};
use libsql::{params, Connection, Row};

const COLUMNS: &str = "id, game_id, emulator_id, channel_name, slot_number, content_hash, \
    captured_at, size_bytes, is_locked, note, cache_path, core_id, is_hardcore";

/// Null-safe channel comparison: `NULL` matches only `NULL`
const CHANNEL_MATCH: &str = "(channel_name = ?2 OR (channel_name IS NULL AND ?2 IS NULL))";

/// Trait for snapshot cache storage operations (async)
#[allow(async_fn_in_trait)]
pub trait SnapshotRepository {
    /// Insert an entry and return it with its assigned id
    async fn insert(&self, entry: &SnapshotEntry) -> Result<SnapshotEntry>;

    /// Replace the slotted entry for `(game, emulator, slot, channel)`
    async fn upsert_slot(&self, entry: &SnapshotEntry) -> Result<SnapshotEntry>;

    /// Get an entry by id
    async fn get(&self, id: i64) -> Result<Option<SnapshotEntry>>;

    /// List all entries for a game, newest first
    async fn list_by_game(&self, game_id: i64) -> Result<Vec<SnapshotEntry>>;

    /// Find an entry with this hash on the same `(game, channel)` key
    async fn find_by_hash(
        &self,
        game_id: i64,
        channel_name: Option<&str>,
        content_hash: &str,
    ) -> Result<Option<SnapshotEntry>>;

    /// Slotted entry lookup with null-safe channel matching
    async fn get_slot(
        &self,
        game_id: i64,
        emulator_id: Option<&str>,
        slot_number: i32,
        channel_name: Option<&str>,
    ) -> Result<Option<SnapshotEntry>>;

    /// Attach or clear a note; attaching locks, clearing unlocks
    async fn set_note(&self, id: i64, note: Option<&str>) -> Result<bool>;

    /// Set the lock flag explicitly
    async fn set_locked(&self, id: i64, locked: bool) -> Result<bool>;

    /// Bind a slotted entry to a named channel and lock it
    async fn bind_to_channel(&self, id: i64, channel_name: &str) -> Result<bool>;

    /// Move a slotted entry back to the default channel and unlock it
    async fn unbind_from_channel(&self, id: i64) -> Result<bool>;

    /// Delete one entry
    async fn delete(&self, id: i64) -> Result<bool>;

    /// Delete every entry for a game, returning the removed rows
    async fn delete_by_game(&self, game_id: i64) -> Result<Vec<SnapshotEntry>>;

    /// Delete the `count` oldest unlocked entries for a game, returning them
    async fn delete_oldest_unlocked(&self, game_id: i64, count: usize)
        -> Result<Vec<SnapshotEntry>>;

    /// Count all entries for a game
    async fn count_by_game(&self, game_id: i64) -> Result<usize>;

    /// Count unlocked entries for a game
    async fn count_unlocked(&self, game_id: i64) -> Result<usize>;
}

/// libSQL implementation of `SnapshotRepository` for one cache table
pub struct LibSqlSnapshotRepository<'a> {
    conn: &'a Connection,
    kind: SnapshotKind,
}

impl<'a> LibSqlSnapshotRepository<'a> {
    /// Create a new repository over the table for `kind`
    pub const fn new(conn: &'a Connection, kind: SnapshotKind) -> Self {
        Self { conn, kind }
    }

    fn table(&self) -> &'static str {
        self.kind.table()
    }

    fn parse_row(&self, row: &Row) -> Result<SnapshotEntry> {
        Ok(SnapshotEntry {
            id: row.get(0)?,
            kind: self.kind,
            game_id: row.get(1)?,
            emulator_id: row.get::<Option<String>>(2)?,
            channel_name: row.get::<Option<String>>(3)?,
            slot_number: row.get::<Option<i32>>(4)?,
            content_hash: row.get(5)?,
            captured_at: row.get(6)?,
            size_bytes: row.get(7)?,
            is_locked: row.get::<i64>(8)? != 0,
            note: row.get::<Option<String>>(9)?,
            cache_path: row.get(10)?,
            core_id: row.get::<Option<String>>(11)?,
            is_hardcore: row.get::<i64>(12)? != 0,
        })
    }

    async fn query_entries(
        &self,
        sql: &str,
        params: impl libsql::params::IntoParams,
    ) -> Result<Vec<SnapshotEntry>> {
        let mut rows = self.conn.query(sql, params).await?;
        let mut entries = Vec::new();
        while let Some(row) = rows.next().await? {
            entries.push(self.parse_row(&row)?);
        }
        Ok(entries)
    }

    async fn query_one(
        &self,
        sql: &str,
        params: impl libsql::params::IntoParams,
    ) -> Result<Option<SnapshotEntry>> {
        Ok(self.query_entries(sql, params).await?.into_iter().next())
    }

    async fn count(&self, sql: &str, game_id: i64) -> Result<usize> {
        let mut rows = self.conn.query(sql, [game_id]).await?;
        let count = match rows.next().await? {
            Some(row) => row.get::<i64>(0)?,
            None => 0,
        };
        Ok(usize::try_from(count).unwrap_or(0))
    }

    fn require_state(&self) -> Result<()> {
        match self.kind {
            SnapshotKind::State => Ok(()),
            SnapshotKind::Save => Err(Error::InvalidInput(
                "slot operations only apply to save states".to_string(),
            )),
        }
    }

    /// Reject moving `entry` onto a channel that already holds its content or slot
    async fn ensure_channel_free(&self, entry: &SnapshotEntry, channel_name: Option<&str>) -> Result<()> {
        if entry.channel_name.as_deref() == channel_name {
            return Ok(());
        }
        let label = channel_name.unwrap_or("default");
        if self
            .find_by_hash(entry.game_id, channel_name, &entry.content_hash)
            .await?
            .is_some()
        {
            return Err(Error::InvalidInput(format!(
                "channel {label} already holds identical content for game {}",
                entry.game_id
            )));
        }
        if let Some(slot) = entry.slot_number {
            if self
                .get_slot(entry.game_id, entry.emulator_id.as_deref(), slot, channel_name)
                .await?
                .is_some()
            {
                return Err(Error::InvalidInput(format!(
                    "channel {label} already has a state in slot {slot} for game {}",
                    entry.game_id
                )));
            }
        }
        Ok(())
    }
}

impl SnapshotRepository for LibSqlSnapshotRepository<'_> {
    async fn insert(&self, entry: &SnapshotEntry) -> Result<SnapshotEntry> {
        if self.kind == SnapshotKind::State && entry.slot_number.is_none() {
            return Err(Error::InvalidInput(
                "save state entries need a slot number".to_string(),
            ));
        }

        let sql = format!(
            "INSERT INTO {} (game_id, emulator_id, channel_name, slot_number, content_hash,
                captured_at, size_bytes, is_locked, note, cache_path, core_id, is_hardcore)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            self.table()
        );
        self.conn
            .execute(
                &sql,
                params![
                    entry.game_id,
                    entry.emulator_id.clone(),
                    entry.channel_name.clone(),
                    entry.slot_number,
                    entry.content_hash.clone(),
                    entry.captured_at,
                    entry.size_bytes,
                    i64::from(entry.is_locked),
                    entry.note.clone(),
                    entry.cache_path.clone(),
                    entry.core_id.clone(),
                    i64::from(entry.is_hardcore),
                ],
            )
            .await?;

        let mut stored = entry.clone();
        stored.id = self.conn.last_insert_rowid();
        stored.kind = self.kind;
        Ok(stored)
    }

    async fn upsert_slot(&self, entry: &SnapshotEntry) -> Result<SnapshotEntry> {
        self.require_state()?;
        let slot = entry
            .slot_number
            .ok_or_else(|| Error::InvalidInput("save state entries need a slot number".into()))?;

        let sql = format!(
            "DELETE FROM {} WHERE game_id = ?1
                AND {CHANNEL_MATCH}
                AND (emulator_id = ?3 OR (emulator_id IS NULL AND ?3 IS NULL))
                AND slot_number = ?4",
            self.table()
        );
        self.conn
            .execute(
                &sql,
                params![
                    entry.game_id,
                    entry.channel_name.clone(),
                    entry.emulator_id.clone(),
                    slot
                ],
            )
            .await?;
        self.insert(entry).await
    }

    async fn get(&self, id: i64) -> Result<Option<SnapshotEntry>> {
        let sql = format!("SELECT {COLUMNS} FROM {} WHERE id = ?", self.table());
        self.query_one(&sql, [id]).await
    }

    async fn list_by_game(&self, game_id: i64) -> Result<Vec<SnapshotEntry>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM {} WHERE game_id = ? ORDER BY captured_at DESC, id DESC",
            self.table()
        );
        self.query_entries(&sql, [game_id]).await
    }

    async fn find_by_hash(
        &self,
        game_id: i64,
        channel_name: Option<&str>,
        content_hash: &str,
    ) -> Result<Option<SnapshotEntry>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM {} WHERE game_id = ?1 AND {CHANNEL_MATCH} AND content_hash = ?3
             LIMIT 1",
            self.table()
        );
        self.query_one(&sql, params![game_id, channel_name, content_hash])
            .await
    }

    async fn get_slot(
        &self,
        game_id: i64,
        emulator_id: Option<&str>,
        slot_number: i32,
        channel_name: Option<&str>,
    ) -> Result<Option<SnapshotEntry>> {
        self.require_state()?;
        let sql = format!(
            "SELECT {COLUMNS} FROM {} WHERE game_id = ?1 AND {CHANNEL_MATCH}
                AND (emulator_id = ?3 OR (emulator_id IS NULL AND ?3 IS NULL))
                AND slot_number = ?4
             LIMIT 1",
            self.table()
        );
        self.query_one(
            &sql,
            params![game_id, channel_name, emulator_id, slot_number],
        )
        .await
    }

    async fn set_note(&self, id: i64, note: Option<&str>) -> Result<bool> {
        let sql = format!(
            "UPDATE {} SET note = ?1, is_locked = (?1 IS NOT NULL) WHERE id = ?2",
            self.table()
        );
        let changed = self.conn.execute(&sql, params![note, id]).await?;
        Ok(changed > 0)
    }

    async fn set_locked(&self, id: i64, locked: bool) -> Result<bool> {
        let sql = format!("UPDATE {} SET is_locked = ? WHERE id = ?", self.table());
        let changed = self
            .conn
            .execute(&sql, params![i64::from(locked), id])
            .await?;
        Ok(changed > 0)
    }

    async fn bind_to_channel(&self, id: i64, channel_name: &str) -> Result<bool> {
        self.require_state()?;
        let Some(entry) = self.get(id).await? else {
            return Ok(false);
        };
        self.ensure_channel_free(&entry, Some(channel_name)).await?;
        let sql = format!(
            "UPDATE {} SET channel_name = ?, is_locked = 1 WHERE id = ?",
            self.table()
        );
        let changed = self.conn.execute(&sql, params![channel_name, id]).await?;
        Ok(changed > 0)
    }

    async fn unbind_from_channel(&self, id: i64) -> Result<bool> {
        self.require_state()?;
        let Some(entry) = self.get(id).await? else {
            return Ok(false);
        };
        self.ensure_channel_free(&entry, None).await?;
        let sql = format!(
            "UPDATE {} SET channel_name = NULL, is_locked = 0 WHERE id = ?",
            self.table()
        );
        let changed = self.conn.execute(&sql, [id]).await?;
        Ok(changed > 0)
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let sql = format!("DELETE FROM {} WHERE id = ?", self.table());
        let changed = self.conn.execute(&sql, [id]).await?;
        Ok(changed > 0)
    }

    async fn delete_by_game(&self, game_id: i64) -> Result<Vec<SnapshotEntry>> {
        let removed = self.list_by_game(game_id).await?;
        let sql = format!("DELETE FROM {} WHERE game_id = ?", self.table());
        self.conn.execute(&sql, [game_id]).await?;
        Ok(removed)
    }

    async fn delete_oldest_unlocked(
        &self,
        game_id: i64,
        count: usize,
    ) -> Result<Vec<SnapshotEntry>> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let limit = i64::try_from(count).unwrap_or(i64::MAX);
        let select = format!(
            "SELECT {COLUMNS} FROM {} WHERE game_id = ? AND is_locked = 0
             ORDER BY captured_at ASC, id ASC LIMIT ?",
            self.table()
        );
        let victims = self.query_entries(&select, params![game_id, limit]).await?;

        let delete = format!("DELETE FROM {} WHERE id = ? AND is_locked = 0", self.table());
        for victim in &victims {
            self.conn.execute(&delete, [victim.id]).await?;
        }
        Ok(victims)
    }

    async fn count_by_game(&self, game_id: i64) -> Result<usize> {
        let sql = format!("SELECT COUNT(*) FROM {} WHERE game_id = ?", self.table());
        self.count(&sql, game_id).await
    }

    async fn count_unlocked(&self, game_id: i64) -> Result<usize> {
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE game_id = ? AND is_locked = 0",
            self.table()
        );
        self.count(&sql, game_id).await
    }
}
