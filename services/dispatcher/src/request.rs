//! Pending-request table and waiter multiplexing.
//!
//! At most one [`PendingRequest`] per cache key; every caller interested in
//! that key attaches a [`Handler`] to it.  A request leaves the table when
//! its response is delivered (the delivery path takes the whole entry out
//! atomically) or when its last handler cancels — cancellation of a key
//! that has already been taken is a no-op, which is what makes the
//! delivery/cancel race safe.

use axum::body::Bytes;
use std::collections::{BTreeMap, HashMap};
use std::time::Instant;
use tokio::sync::oneshot;

pub type HandlerId = u64;

/// The single payload a stream waiter receives.
#[derive(Debug)]
pub struct Delivery {
    pub status: u16,
    pub body: Bytes,
}

/// A waiter attached to a pending request.
pub enum Handler {
    /// One-shot delivery into an open response held by a caller.
    Stream(oneshot::Sender<Delivery>),
    /// Absolute URL to POST the body to once available.
    Webhook(String),
}

pub struct PendingRequest {
    pub key: String,
    pub href: String,
    pub headers: Option<BTreeMap<String, String>>,
    pub queue_name: String,
    /// Monotonic enqueue timestamp; the scheduler picks oldest-first.
    pub created_at: Instant,
    /// Wall-clock epoch millis of the last dispatch.  Unset means never
    /// dispatched, which the scheduler treats as infinitely old.
    pub started_at: Option<i64>,
    /// Re-dispatch count; incremented when a timed-out request is handed
    /// out again.
    pub attempts: u32,
    /// Waiters in attach order.
    pub handlers: Vec<(HandlerId, Handler)>,
}

#[derive(Default)]
pub struct RequestTable {
    entries: HashMap<String, PendingRequest>,
    next_handler_id: HandlerId,
}

impl RequestTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a handler to the request for `key`, creating the request if
    /// none exists.  Returns the handler id and whether a request was
    /// created.  The creator's `href`/`headers` stick; later callers only
    /// add waiters.
    pub fn attach(
        &mut self,
        key: &str,
        href: &str,
        headers: Option<&BTreeMap<String, String>>,
        queue_name: &str,
        handler: Handler,
    ) -> (HandlerId, bool) {
        let id = self.next_handler_id;
        self.next_handler_id += 1;
        match self.entries.get_mut(key) {
            Some(request) => {
                request.handlers.push((id, handler));
                (id, false)
            }
            None => {
                self.entries.insert(
                    key.to_owned(),
                    PendingRequest {
                        key: key.to_owned(),
                        href: href.to_owned(),
                        headers: headers.cloned(),
                        queue_name: queue_name.to_owned(),
                        created_at: Instant::now(),
                        started_at: None,
                        attempts: 0,
                        handlers: vec![(id, handler)],
                    },
                );
                (id, true)
            }
        }
    }

    /// Detach one handler.  Removes the request when that was the last
    /// waiter; a late cancel for a delivered (taken) key is a no-op.
    pub fn cancel(&mut self, key: &str, id: HandlerId) -> bool {
        let Some(request) = self.entries.get_mut(key) else {
            return false;
        };
        request.handlers.retain(|(handler_id, _)| *handler_id != id);
        if request.handlers.is_empty() {
            self.entries.remove(key);
            true
        } else {
            false
        }
    }

    /// Remove and return the request for delivery.
    pub fn take(&mut self, key: &str) -> Option<PendingRequest> {
        self.entries.remove(key)
    }

    pub fn get(&self, key: &str) -> Option<&PendingRequest> {
        self.entries.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut PendingRequest> {
        self.entries.get_mut(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &PendingRequest)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream_handler() -> (Handler, oneshot::Receiver<Delivery>) {
        let (tx, rx) = oneshot::channel();
        (Handler::Stream(tx), rx)
    }

    #[test]
    fn second_attach_coalesces_onto_the_existing_request() {
        let mut table = RequestTable::new();
        let (h1, _rx1) = stream_handler();
        let (h2, _rx2) = stream_handler();

        let (id1, created) = table.attach("q/abc", "http://q/a", None, "q", h1);
        assert!(created);
        let (id2, created) = table.attach("q/abc", "http://q/a", None, "q", h2);
        assert!(!created);

        assert_ne!(id1, id2);
        assert_eq!(table.len(), 1);
        assert_eq!(table.get("q/abc").unwrap().handlers.len(), 2);
    }

    #[test]
    fn handlers_keep_attach_order() {
        let mut table = RequestTable::new();
        let (h1, _rx1) = stream_handler();
        let (id1, _) = table.attach("q/abc", "http://q/a", None, "q", h1);
        let (id2, _) = table.attach(
            "q/abc",
            "http://q/a",
            None,
            "q",
            Handler::Webhook("http://hook".to_owned()),
        );

        let ids: Vec<HandlerId> = table
            .get("q/abc")
            .unwrap()
            .handlers
            .iter()
            .map(|(id, _)| *id)
            .collect();
        assert_eq!(ids, vec![id1, id2]);
    }

    #[test]
    fn cancel_removes_only_the_given_handler() {
        let mut table = RequestTable::new();
        let (h1, _rx1) = stream_handler();
        let (h2, _rx2) = stream_handler();
        let (id1, _) = table.attach("q/abc", "http://q/a", None, "q", h1);
        let (_id2, _) = table.attach("q/abc", "http://q/a", None, "q", h2);

        assert!(!table.cancel("q/abc", id1));
        assert_eq!(table.get("q/abc").unwrap().handlers.len(), 1);
    }

    #[test]
    fn last_cancel_removes_the_request() {
        let mut table = RequestTable::new();
        let (h1, _rx1) = stream_handler();
        let (id1, _) = table.attach("q/abc", "http://q/a", None, "q", h1);

        assert!(table.cancel("q/abc", id1));
        assert!(table.is_empty());
    }

    #[test]
    fn cancel_after_take_is_a_no_op() {
        let mut table = RequestTable::new();
        let (h1, _rx1) = stream_handler();
        let (id1, _) = table.attach("q/abc", "http://q/a", None, "q", h1);

        let taken = table.take("q/abc").unwrap();
        assert_eq!(taken.handlers.len(), 1);
        assert!(!table.cancel("q/abc", id1));
        assert!(table.is_empty());
    }

    #[test]
    fn creator_href_and_headers_stick() {
        let mut table = RequestTable::new();
        let mut headers = BTreeMap::new();
        headers.insert("accept".to_owned(), "text/html".to_owned());
        let (h1, _rx1) = stream_handler();
        let (h2, _rx2) = stream_handler();

        table.attach("q/abc", "http://q/a?x=1", Some(&headers), "q", h1);
        table.attach("q/abc", "http://q/a?x=1#other", None, "q", h2);

        let request = table.get("q/abc").unwrap();
        assert_eq!(request.href, "http://q/a?x=1");
        assert_eq!(request.headers.as_ref().unwrap().len(), 1);
    }
}
