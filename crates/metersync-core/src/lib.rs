//! metersync-core - Cost-budgeted GraphQL sync client core.
//!
//! This crate provides:
//! - A request executor that self-throttles against a leaky-bucket query
//!   cost budget, retries throttled responses, and adaptively shrinks batch
//!   sizes when a query's declared cost exceeds the per-query maximum.
//! - A resumable pagination protocol driven one tick at a time by a host
//!   scheduler, threading an opaque persisted continuation.
//! - Record extraction from response bodies via declared dotted paths.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::doc_markdown)]

mod continuation;
mod cost;
mod error;
mod executor;
mod resource;
mod transport;

pub use continuation::{
    get_json_state, put_json_state, run_sync_tick, Continuation, FetchedPage, PageRequest,
    SyncInvocationResult,
};
pub use cost::{RequestCost, ThrottleStatus};
pub use error::{
    classify_protocol_errors, collect_user_errors, ClassifiedErrors, GraphqlError,
    GraphqlErrorLocation, GraphqlPathSegment, HttpErrorInfo, RetryableError, SyncError,
    MAX_COST_EXCEEDED_CODE, THROTTLED_CODE,
};
pub use executor::{ExecutionSuccess, Executor, ExecutorConfig, RequestParameters};
pub use resource::{
    extract_at_path, ExecutionContext, Record, ResourceCapabilities, ResourceDescriptor,
};
pub use transport::{HttpTransport, HttpTransportBuilder, Transport, TransportResponse};
