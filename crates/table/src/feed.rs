//! Event fan-out queue.
//!
//! Each table owns one [`Feed`]: an append-only log of responses, each tagged
//! with the [`Audience`] allowed to see it. Readers remember how many entries
//! they have consumed and ask for everything after that index, filtered to
//! their own tag. Entries are never reordered, rewritten or dropped; the whole
//! log goes away with its table.
//!
//! Long-polling is a bounded loop: [`Feed::poll`] retries a fixed number of
//! times with a short sleep and then reports [`Poll::NoNewData`], which is a
//! normal empty window rather than an error.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::types::{Audience, ResponseDesc};

/// Server to client message: a description tag plus arbitrary JSON data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub desc: ResponseDesc,
    pub data: Value,
}

impl Response {
    pub fn new(desc: ResponseDesc, data: impl Serialize) -> Self {
        let data = serde_json::to_value(data).unwrap_or_else(|err| {
            warn!(?err, ?desc, "response payload did not serialize");
            Value::Null
        });
        Self { desc, data }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(ResponseDesc::Error, message.into())
    }
}

#[derive(Debug, Clone)]
struct Entry {
    audience: Audience,
    response: Response,
}

/// Long-poll retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub attempts: u32,
    pub interval: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            attempts: 200,
            interval: Duration::from_millis(50),
        }
    }
}

/// Outcome of a read.
#[derive(Debug, Clone, PartialEq)]
pub enum Poll {
    /// New entries for this reader and the index to resume from.
    Data {
        responses: Vec<Response>,
        next_index: usize,
    },
    /// Nothing new within the polling window.
    NoNewData { next_index: usize },
    /// The table is gone and everything has been read.
    Closed,
}

/// Append-only, audience-tagged log of one table.
#[derive(Debug, Default)]
pub struct Feed {
    entries: RwLock<Vec<Entry>>,
    closed: AtomicBool,
}

impl Feed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one entry, returning its index.
    pub fn push(&self, audience: Audience, response: Response) -> usize {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.push(Entry { audience, response });
        entries.len() - 1
    }

    /// Append the same response once per audience.
    pub fn push_each(&self, audiences: &[Audience], response: Response) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        for &audience in audiences {
            entries.push(Entry {
                audience,
                response: response.clone(),
            });
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// No more entries will be appended after this.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Entries after `last_index` visible to `viewer`, and the new index.
    /// Both come from the same read of the log.
    pub fn read_since(&self, last_index: usize, viewer: Audience) -> (Vec<Response>, usize) {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let len = entries.len();
        let responses = entries[last_index.min(len)..]
            .iter()
            .filter(|e| e.audience.reaches(viewer))
            .map(|e| e.response.clone())
            .collect();
        (responses, len)
    }

    /// Bounded long-poll for entries after `last_index`.
    pub async fn poll(&self, last_index: usize, viewer: Audience, policy: PollPolicy) -> Poll {
        let mut index = last_index;
        for attempt in 0..policy.attempts.max(1) {
            let closed = self.is_closed();
            let (responses, next_index) = self.read_since(index, viewer);
            if !responses.is_empty() {
                return Poll::Data {
                    responses,
                    next_index,
                };
            }
            if closed {
                return Poll::Closed;
            }
            // entries for other audiences still advance the cursor
            index = next_index;
            if attempt + 1 < policy.attempts {
                tokio::time::sleep(policy.interval).await;
            }
        }
        Poll::NoNewData { next_index: index }
    }
}
