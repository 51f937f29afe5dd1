//! On-disk dataset tiers and the upstream source that refreshes them.

mod fetcher;
mod tiers;

pub use fetcher::{DownloadedTable, RemoteFetcher};
pub use tiers::{Resolution, ResolvedTable, TierResolver, TierSource, modified_time};
