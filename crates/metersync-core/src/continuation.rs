//! Resumable sync continuation protocol.
//!
//! The host scheduler drives a sync one tick at a time, persisting an opaque
//! continuation between invocations as string key/value pairs. Each tick
//! reads the previous continuation, fetches at most one page, and hands back
//! the items plus the next continuation; `None` signals completion.

use std::collections::BTreeMap;
use std::future::Future;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::error::SyncError;

const CURSOR_KEY: &str = "cursor";
const SKIP_NEXT_RUN_KEY: &str = "skipNextRun";
const EXTRA_DATA_KEY: &str = "extraData";

/// Persisted resume state for a paginated sync.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Continuation {
    /// Opaque pagination cursor. `None` before the first page.
    pub cursor: Option<String>,
    /// When set, the next invocation yields its tick without doing I/O and
    /// re-presents this continuation with the flag cleared.
    pub skip_next_run: bool,
    /// Auxiliary caller state carried between invocations, e.g. a remaining
    /// parent-ID queue for multi-phase pagination.
    pub extra_state: BTreeMap<String, String>,
}

impl Continuation {
    /// Continuation pointing at the given cursor.
    #[must_use]
    pub fn with_cursor(cursor: impl Into<String>) -> Self {
        Self {
            cursor: Some(cursor.into()),
            ..Self::default()
        }
    }

    /// Serialize to the string key/value map the host persists.
    #[must_use]
    pub fn to_state_map(&self) -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        if let Some(cursor) = &self.cursor {
            map.insert(CURSOR_KEY.to_string(), cursor.clone());
        }
        map.insert(SKIP_NEXT_RUN_KEY.to_string(), self.skip_next_run.to_string());
        map.insert(
            EXTRA_DATA_KEY.to_string(),
            serde_json::to_string(&self.extra_state).unwrap_or_else(|_| "{}".to_string()),
        );
        map
    }

    /// Deserialize from a host-persisted string map.
    pub fn from_state_map(map: &BTreeMap<String, String>) -> Result<Self, SyncError> {
        let cursor = map.get(CURSOR_KEY).cloned();
        let skip_next_run = map.get(SKIP_NEXT_RUN_KEY).is_some_and(|value| value == "true");
        let extra_state = match map.get(EXTRA_DATA_KEY) {
            Some(raw) => serde_json::from_str(raw)?,
            None => BTreeMap::new(),
        };
        Ok(Self {
            cursor,
            skip_next_run,
            extra_state,
        })
    }
}

/// Store a structured value in extra state, JSON-encoded. The host persists
/// continuations as string key/value pairs, so structured values must be
/// encoded explicitly.
pub fn put_json_state<V: Serialize>(
    state: &mut BTreeMap<String, String>,
    key: impl Into<String>,
    value: &V,
) -> Result<(), SyncError> {
    state.insert(key.into(), serde_json::to_string(value)?);
    Ok(())
}

/// Read a structured value back out of extra state.
pub fn get_json_state<V: DeserializeOwned>(
    state: &BTreeMap<String, String>,
    key: &str,
) -> Result<Option<V>, SyncError> {
    match state.get(key) {
        Some(raw) => Ok(Some(serde_json::from_str(raw)?)),
        None => Ok(None),
    }
}

/// Input to a page-fetch call.
#[derive(Debug, Clone)]
pub struct PageRequest {
    /// Cursor from the previous continuation. `None` on the first page.
    pub cursor: Option<String>,
    /// Suggested batch size for this page.
    pub batch_size_hint: u32,
    /// Auxiliary state from the previous continuation. The fetcher returns
    /// the (possibly updated) state in [`FetchedPage::extra_state`].
    pub extra_state: BTreeMap<String, String>,
}

/// One fetched page plus continuation hints.
#[derive(Debug, Clone)]
pub struct FetchedPage<T> {
    /// Items in this page.
    pub items: Vec<T>,
    /// Cursor for the next page, if one exists.
    pub next_cursor: Option<String>,
    /// Auxiliary state to carry into the next continuation. Propagated even
    /// when no next cursor exists, enabling phase transitions.
    pub extra_state: BTreeMap<String, String>,
    /// Request that the next invocation yields its tick to the scheduler.
    pub defer_next_run: bool,
}

impl<T> FetchedPage<T> {
    /// Page with no further work.
    #[must_use]
    pub fn new(items: Vec<T>) -> Self {
        Self {
            items,
            next_cursor: None,
            extra_state: BTreeMap::new(),
            defer_next_run: false,
        }
    }

    /// Attach the next-page cursor.
    #[must_use]
    pub fn with_next_cursor(mut self, cursor: impl Into<String>) -> Self {
        self.next_cursor = Some(cursor.into());
        self
    }

    /// Attach auxiliary continuation state.
    #[must_use]
    pub fn with_extra_state(mut self, state: BTreeMap<String, String>) -> Self {
        self.extra_state = state;
        self
    }

    /// Mark the next invocation as a yield tick.
    #[must_use]
    pub const fn with_deferral(mut self) -> Self {
        self.defer_next_run = true;
        self
    }
}

/// Items and continuation returned to the host each tick.
#[derive(Debug, Clone)]
pub struct SyncInvocationResult<T> {
    /// Items fetched this tick.
    pub items: Vec<T>,
    /// Continuation to persist, or `None` when the sync is complete.
    pub continuation: Option<Continuation>,
}

/// Drive one sync tick.
///
/// Reads the previous continuation, invokes `fetch_page` at most once, and
/// computes the next continuation. Errors from the fetcher propagate
/// unchanged: a failed tick is never converted into an empty success, so the
/// host retries from the prior continuation.
pub async fn run_sync_tick<T, F, Fut>(
    previous: Option<Continuation>,
    batch_size_hint: u32,
    fetch_page: F,
) -> Result<SyncInvocationResult<T>, SyncError>
where
    F: FnOnce(PageRequest) -> Fut,
    Fut: Future<Output = Result<FetchedPage<T>, SyncError>>,
{
    let previous = previous.unwrap_or_default();

    if previous.skip_next_run {
        debug!("skip_next_run set; yielding this tick");
        return Ok(SyncInvocationResult {
            items: Vec::new(),
            continuation: Some(Continuation {
                skip_next_run: false,
                ..previous
            }),
        });
    }

    let page = fetch_page(PageRequest {
        cursor: previous.cursor,
        batch_size_hint,
        extra_state: previous.extra_state,
    })
    .await?;

    let continuation = if page.next_cursor.is_some() || !page.extra_state.is_empty() {
        Some(Continuation {
            cursor: page.next_cursor,
            skip_next_run: page.defer_next_run,
            extra_state: page.extra_state,
        })
    } else {
        None
    };

    debug!(
        items = page.items.len(),
        complete = continuation.is_none(),
        "sync tick finished"
    );

    Ok(SyncInvocationResult {
        items: page.items,
        continuation,
    })
}
