use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use chrono_tz::Tz;

use crate::error::{StoreError, StoreResult};
use crate::store::{RecordStore, StoreContext, read_optional, remove_if_exists, write_atomic};
use crate::types::{Memo, Period, Team};

pub const MEMO_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Memos of a team for one month, kept in insertion order in a JSON array.
pub struct MemoStore {
    ctx: Arc<StoreContext>,
    timezone: Tz,
}

impl MemoStore {
    pub fn new(ctx: Arc<StoreContext>, timezone: Tz) -> Self {
        Self { ctx, timezone }
    }

    /// Current time in the memo timestamp format, one-second resolution.
    pub fn now_timestamp(&self) -> String {
        Utc::now()
            .with_timezone(&self.timezone)
            .format(MEMO_TIMESTAMP_FORMAT)
            .to_string()
    }

    /// Appends a memo stamped with the current time. Returns `false` without
    /// writing when an identical memo (note, author and timestamp) exists.
    pub fn append(&self, team: Team, period: Period, note: &str, author: &str) -> StoreResult<bool> {
        let timestamp = self.now_timestamp();
        self.append_at(team, period, note, author, &timestamp)
    }

    pub fn append_at(
        &self,
        team: Team,
        period: Period,
        note: &str,
        author: &str,
        timestamp: &str,
    ) -> StoreResult<bool> {
        let note = note.trim();
        if note.is_empty() {
            return Err(StoreError::malformed("memo text is empty"));
        }
        let memo = Memo {
            note: note.to_string(),
            author: author.trim().to_string(),
            timestamp: timestamp.to_string(),
        };

        let path = self.path((team, period));
        let label = format!("{team} memo");
        self.ctx
            .mutate_if_changed(&label, std::slice::from_ref(&path), || {
                let mut memos = self.read((team, period))?.unwrap_or_default();
                if memos.iter().any(|m| m.same_as(&memo)) {
                    tracing::info!(team = %team, "duplicate memo dropped");
                    return Ok((false, false));
                }
                memos.push(memo);
                write_atomic(&path, &encode(&path, &memos)?)?;
                Ok((true, true))
            })
    }

    /// Removes the entry identical to `memo` (note, author and timestamp),
    /// keeping the order of the rest.
    pub fn delete_entry(&self, team: Team, period: Period, memo: &Memo) -> StoreResult<bool> {
        let path = self.path((team, period));
        let label = format!("{team} memo delete");
        self.ctx
            .mutate_if_changed(&label, std::slice::from_ref(&path), || {
                let mut memos = self.read((team, period))?.unwrap_or_default();
                let Some(index) = memos.iter().position(|m| m.same_as(memo)) else {
                    return Ok((false, false));
                };
                memos.remove(index);
                write_atomic(&path, &encode(&path, &memos)?)?;
                Ok((true, true))
            })
    }
}

fn encode(path: &std::path::Path, memos: &[Memo]) -> StoreResult<Vec<u8>> {
    simd_json::to_string_pretty(memos)
        .map(String::into_bytes)
        .map_err(|e| StoreError::json(path, e))
}

impl RecordStore for MemoStore {
    type Key = (Team, Period);
    type Record = Vec<Memo>;

    fn path(&self, (team, period): Self::Key) -> PathBuf {
        self.ctx.layout().memo_file(team, period)
    }

    fn read(&self, key: Self::Key) -> StoreResult<Option<Vec<Memo>>> {
        let path = self.path(key);
        let Some(mut bytes) = read_optional(&path)? else {
            return Ok(None);
        };
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Some(Vec::new()));
        }
        simd_json::from_slice::<Vec<Memo>>(&mut bytes)
            .map(Some)
            .map_err(|e| StoreError::json(&path, e))
    }

    fn write(&self, key: Self::Key, memos: &Vec<Memo>) -> StoreResult<()> {
        let path = self.path(key);
        let bytes = encode(&path, memos)?;
        let label = format!("{} memo", key.0);
        self.ctx
            .mutate(&label, std::slice::from_ref(&path), || write_atomic(&path, &bytes))
    }

    fn delete(&self, key: Self::Key) -> StoreResult<bool> {
        let path = self.path(key);
        let label = format!("{} memo delete", key.0);
        self.ctx
            .mutate_if_changed(&label, std::slice::from_ref(&path), || {
                let removed = remove_if_exists(&path)?;
                Ok((removed, removed))
            })
    }
}
