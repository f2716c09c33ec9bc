use thiserror::Error;

/// The five kinds of failure the orchestrator distinguishes when deciding
/// what persisted state a failure should produce.
///
/// Lower layers never match on `Error` variants directly; they classify
/// through [`Error::kind`] so the orchestrator can stay a single `match`
/// over five arms instead of growing a case per error variant.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// 5xx / network failures, already retried with backoff at the
    /// `Source` API boundary; surfaced only once retries are exhausted.
    Transient,
    /// Missing configuration field, invalid credential: sync is skipped,
    /// the connector is flipped to `needs_configuration` or `error`.
    Configuration,
    /// Auth denied, resource gone: the job fails, the connector errors.
    SourceFatal,
    /// A single document was rejected by the bulk endpoint; recorded on
    /// the job's `error` field without aborting the sync.
    Data,
    /// Programmer error or contract violation: logged and propagated,
    /// the heartbeat loop stops.
    Internal,
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("index `{0}` is not a valid index name")]
    InvalidIndexName(String),

    #[error("connector `{0}` not found")]
    ConnectorNotFound(String),

    #[error("sync job `{0}` not found")]
    SyncJobNotFound(String),

    #[error("invalid connector status `{0}`")]
    InvalidStatus(String),

    #[error("service type `{0}` has no registered source factory")]
    UnknownServiceType(String),

    /// A search-cluster HTTP request failed at the transport level
    /// (connection refused, timeout, DNS, 5xx after retries exhausted).
    /// `search-client` converts its `reqwest::Error` into this variant at
    /// the crate boundary rather than depending on a shared `#[from]`
    /// impl, keeping `connector-types` free of an HTTP dependency.
    #[error("search cluster request failed: {0}")]
    Transport(String),

    #[error("search cluster returned an error response: {status}: {body}")]
    ClusterResponse { status: u16, body: String },

    #[error("document `{doc_id}` rejected by bulk ingestion: {reason}")]
    BulkDocumentRejected { doc_id: String, reason: String },

    #[error("source `{service_type}` is not configured")]
    SourceNotConfigured { service_type: String },

    #[error("source ping failed: {0}")]
    SourcePingFailed(String),

    #[error("source fatal error: {0}")]
    SourceFatal(String),

    #[error("invalid cron schedule `{0}`: {1}")]
    InvalidSchedule(String, String),

    #[error(transparent)]
    Serde(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Classify this error into one of the five kinds §7 of the spec
    /// enumerates. The orchestrator is the only component allowed to act
    /// on this; lower layers just propagate or log-and-continue.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Transport(_) | Error::ClusterResponse { .. } => ErrorKind::Transient,
            Error::InvalidIndexName(_)
            | Error::UnknownServiceType(_)
            | Error::SourceNotConfigured { .. }
            | Error::InvalidSchedule(_, _) => ErrorKind::Configuration,
            Error::SourcePingFailed(_) | Error::SourceFatal(_) => ErrorKind::SourceFatal,
            Error::BulkDocumentRejected { .. } => ErrorKind::Data,
            Error::ConnectorNotFound(_)
            | Error::SyncJobNotFound(_)
            | Error::InvalidStatus(_)
            | Error::Serde(_)
            | Error::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn is_recoverable(&self) -> bool {
        !matches!(self.kind(), ErrorKind::Internal)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
