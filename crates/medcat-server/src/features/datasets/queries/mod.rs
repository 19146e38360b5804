pub mod get_latest_snapshot;
pub mod list_sources;

pub use get_latest_snapshot::{GetLatestSnapshotError, GetLatestSnapshotQuery};
pub use list_sources::{ListSourcesError, ListSourcesQuery};
