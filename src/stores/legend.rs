use std::path::PathBuf;
use std::sync::Arc;

use crate::error::{StoreError, StoreResult};
use crate::ingest;
use crate::store::{RecordStore, StoreContext, read_optional, remove_if_exists, write_atomic};
use crate::types::{Legend, Team};

/// Shift-code legend of each team. No history beyond git is kept.
pub struct LegendStore {
    ctx: Arc<StoreContext>,
}

impl LegendStore {
    pub fn new(ctx: Arc<StoreContext>) -> Self {
        Self { ctx }
    }
}

impl RecordStore for LegendStore {
    type Key = Team;
    type Record = Legend;

    fn path(&self, team: Team) -> PathBuf {
        self.ctx.layout().legend_file(team)
    }

    fn read(&self, team: Team) -> StoreResult<Option<Legend>> {
        let Some(bytes) = read_optional(&self.path(team))? else {
            return Ok(None);
        };
        let (text, _) = ingest::decode_text(&bytes)?;
        let table = ingest::parse_csv(&text)?;
        Legend::from_table(&table).map(Some).ok_or_else(|| {
            StoreError::malformed(format!("stored legend of {team} is missing its columns"))
        })
    }

    fn write(&self, team: Team, legend: &Legend) -> StoreResult<()> {
        let path = self.path(team);
        let bytes = ingest::to_csv(&legend.to_table(), false)?;
        let label = format!("{team} legend");
        self.ctx
            .mutate(&label, std::slice::from_ref(&path), || write_atomic(&path, &bytes))
    }

    fn delete(&self, team: Team) -> StoreResult<bool> {
        let path = self.path(team);
        let label = format!("{team} legend delete");
        self.ctx
            .mutate_if_changed(&label, std::slice::from_ref(&path), || {
                let removed = remove_if_exists(&path)?;
                Ok((removed, removed))
            })
    }
}
