//! Opaque HTTP client for the search cluster (§1, §6): `search/index/
//! bulk/update/refresh/exists` on named indices, plus a lazily-paged
//! gateway over a single index. No business logic lives here — the
//! orchestration layers in `connector-scheduler` decide what to fetch
//! and what to do with the results.

pub mod client;
pub mod gateway;

pub use client::{BulkItemResult, BulkOp, BulkResponse, SearchClient};
pub use gateway::IndexGateway;
