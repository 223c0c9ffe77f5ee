//! Translation job polling and derivative manifest resolution.
//!
//! [`JobPoller`] watches a translation job on a [`Ticker`] until the
//! manifest reports completion, the job fails, or the time ceiling passes.
//! [`ManifestResolver`] then flattens the manifest tree into the list of
//! [`Resource`](bucketmgr_protocol::Resource)s to download, with local paths
//! rebuilt by [`decompose_urn`].

mod decompose;
mod error;
mod poller;
mod resolver;
mod retry;
mod ticker;

#[cfg(test)]
mod mock;

pub use decompose::{PathInfo, decompose_urn, file_name_from_url};
pub use error::DerivativeError;
pub use poller::{JobPoller, PollConfig, PollOutcome, PollPhase, PollState, PollUpdate, parse_progress};
pub use resolver::{DerivativeService, ManifestResolver, downloadable_nodes};
pub use ticker::{Tick, TickHandler, Ticker, TickerConfig};
