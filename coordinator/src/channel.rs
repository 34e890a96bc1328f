//! Message plumbing between the coordinator and page agents.
//!
//! A page has one inbox carrying both pushes and queries. Queries hand the
//! page an explicit [`oneshot::Sender`] to answer on; the open reply channel
//! replaces any "return true to keep the channel alive" convention, so an
//! unanswered exchange is visible as a dropped sender instead of a hang.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot};

use quill_types::{ModalPush, PageQuery, PageQueryReply};

/// How long the coordinator waits for a page to answer a query. A page that
/// has navigated away or crashed simply drops the reply sender.
pub const PAGE_QUERY_TIMEOUT: Duration = Duration::from_secs(5);

/// One message delivered to a page agent's inbox.
#[derive(Debug)]
pub enum PageEnvelope {
    /// Request expecting an answer on `reply`.
    Query {
        query: PageQuery,
        reply: oneshot::Sender<PageQueryReply>,
    },
    /// Fire-and-forget lifecycle push.
    Push(ModalPush),
}

/// The coordinator's sending half of a page inbox.
#[derive(Debug, Clone)]
pub struct PageHandle {
    tx: mpsc::UnboundedSender<PageEnvelope>,
}

impl PageHandle {
    /// Create a connected handle/inbox pair.
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<PageEnvelope>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Push a lifecycle message. A closed inbox (tab gone) is logged and
    /// swallowed; the operation it belonged to has no UI left to update.
    pub fn push(&self, push: ModalPush) {
        if self.tx.send(PageEnvelope::Push(push)).is_err() {
            tracing::debug!("Dropping push for a disconnected page");
        }
    }

    /// Ask the page something and wait (bounded) for the answer.
    ///
    /// Returns `None` when the page has nothing usable, is gone, or does not
    /// answer in time; callers decide whether that silence is an error.
    pub async fn query(&self, query: PageQuery) -> Option<String> {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self
            .tx
            .send(PageEnvelope::Query {
                query,
                reply: reply_tx,
            })
            .is_err()
        {
            tracing::debug!("Query sent to a disconnected page");
            return None;
        }

        let reply = match tokio::time::timeout(PAGE_QUERY_TIMEOUT, reply_rx).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(_)) => {
                tracing::debug!("Page dropped the reply channel for {query:?}");
                return None;
            }
            Err(_) => {
                tracing::warn!("Page query {query:?} timed out");
                return None;
            }
        };

        reply
            .text
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
    }
}
