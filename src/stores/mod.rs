pub mod legend;
pub mod memo;
pub mod schedule;
pub mod snapshot;

pub use legend::LegendStore;
pub use memo::MemoStore;
pub use schedule::ScheduleStore;
pub use snapshot::SnapshotStore;
