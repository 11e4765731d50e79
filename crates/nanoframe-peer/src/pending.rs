use std::collections::BTreeMap;
use std::mem;

use nanoframe_frame::RpcError;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::error::PeerError;

/// Why a request failed, as delivered to its waiter.
#[derive(Debug, Clone)]
pub(crate) enum Failure {
    Rpc(RpcError),
    Closed(String),
    Encode(String),
}

impl From<Failure> for PeerError {
    fn from(failure: Failure) -> Self {
        match failure {
            Failure::Rpc(err) => err.into(),
            Failure::Closed(reason) => PeerError::Closed(reason),
            Failure::Encode(reason) => PeerError::Encode(reason),
        }
    }
}

pub(crate) type Outcome = std::result::Result<Value, Failure>;

/// What happened to an inbound response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Handed to the waiting caller.
    Delivered,
    /// The caller had given up; the result was dropped and the slot freed.
    Discarded,
    /// No such request in flight (never issued, or already resolved).
    Unmatched,
}

enum Slot {
    InFlight {
        tx: oneshot::Sender<Outcome>,
        method: String,
        issued_at: Instant,
    },
    Abandoned {
        method: String,
        issued_at: Instant,
    },
}

/// Outstanding requests, keyed by correlation id.
///
/// Ids start at 1, grow by one per request, and are never reused. A slot is
/// either in flight or abandoned; it is removed the moment it resolves, so a
/// request that never gets an answer does not hold back any other slot.
pub struct PendingTable {
    next_id: u64,
    slots: BTreeMap<u64, Slot>,
    abandoned: usize,
    closed: Option<String>,
}

impl PendingTable {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            slots: BTreeMap::new(),
            abandoned: 0,
            closed: None,
        }
    }

    /// Id the next [`issue`](Self::issue) will return.
    pub fn next_id(&self) -> u64 {
        self.next_id
    }

    /// Allocate an id and record a waiter for it.
    ///
    /// Once the table has been failed, the returned receiver is already
    /// resolved with the close reason.
    pub(crate) fn issue(&mut self, method: &str) -> (u64, oneshot::Receiver<Outcome>) {
        let id = self.next_id;
        self.next_id += 1;
        let (tx, rx) = oneshot::channel();

        if let Some(reason) = &self.closed {
            let _ = tx.send(Err(Failure::Closed(reason.clone())));
            return (id, rx);
        }

        self.slots.insert(
            id,
            Slot::InFlight {
                tx,
                method: method.to_string(),
                issued_at: Instant::now(),
            },
        );
        (id, rx)
    }

    /// Resolve a request. The slot is removed in the same step, so a second
    /// response for the same id is [`Completion::Unmatched`].
    pub(crate) fn complete(&mut self, id: u64, outcome: Outcome) -> Completion {
        match self.slots.remove(&id) {
            Some(Slot::InFlight {
                tx,
                method,
                issued_at,
            }) => {
                tracing::trace!(id, method = %method, elapsed = ?issued_at.elapsed(), "request completed");
                match tx.send(outcome) {
                    Ok(()) => Completion::Delivered,
                    Err(_) => Completion::Discarded,
                }
            }
            Some(Slot::Abandoned { method, issued_at }) => {
                self.abandoned -= 1;
                tracing::debug!(id, method = %method, elapsed = ?issued_at.elapsed(), "late response for abandoned request");
                Completion::Discarded
            }
            None => Completion::Unmatched,
        }
    }

    /// Mark an in-flight request as no longer awaited. Returns `false` if the
    /// id was not in flight.
    pub fn abandon(&mut self, id: u64) -> bool {
        let Some(slot) = self.slots.get_mut(&id) else {
            return false;
        };
        let Slot::InFlight {
            method, issued_at, ..
        } = slot
        else {
            return false;
        };

        *slot = Slot::Abandoned {
            method: mem::take(method),
            issued_at: *issued_at,
        };
        self.abandoned += 1;
        true
    }

    /// Reject every outstanding request with `reason` and refuse new ones.
    ///
    /// Returns how many waiters were notified.
    pub fn fail_all(&mut self, reason: &str) -> usize {
        if self.closed.is_none() {
            self.closed = Some(reason.to_string());
        }

        let mut failed = 0;
        for slot in mem::take(&mut self.slots).into_values() {
            if let Slot::InFlight { tx, .. } = slot {
                if tx.send(Err(Failure::Closed(reason.to_string()))).is_ok() {
                    failed += 1;
                }
            }
        }
        self.abandoned = 0;
        failed
    }

    /// Drop every abandoned slot. Late responses for them become
    /// [`Completion::Unmatched`].
    pub fn reap_abandoned(&mut self) -> usize {
        if self.abandoned == 0 {
            return 0;
        }
        let before = self.slots.len();
        self.slots
            .retain(|_, slot| !matches!(slot, Slot::Abandoned { .. }));
        self.abandoned = 0;
        before - self.slots.len()
    }

    /// Requests still awaited by a caller.
    pub fn in_flight(&self) -> usize {
        self.slots.len() - self.abandoned
    }

    /// Requests whose caller gave up before a response arrived.
    pub fn abandoned(&self) -> usize {
        self.abandoned
    }

    /// Slots currently held, in flight or abandoned.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Close reason, once [`fail_all`](Self::fail_all) has run.
    pub fn closed_reason(&self) -> Option<&str> {
        self.closed.as_deref()
    }
}

impl Default for PendingTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn ids_start_at_one_and_increase() {
        let mut table = PendingTable::new();
        let ids: Vec<u64> = (0..5).map(|_| table.issue("ping").0).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
        assert_eq!(table.in_flight(), 5);
    }

    #[test]
    fn complete_delivers_once() {
        let mut table = PendingTable::new();
        let (id, mut rx) = table.issue("ping");

        assert_eq!(table.complete(id, Ok(json!("pong"))), Completion::Delivered);
        assert_eq!(table.complete(id, Ok(json!("again"))), Completion::Unmatched);

        let outcome = rx.try_recv().expect("outcome should be delivered");
        assert_eq!(outcome.unwrap(), json!("pong"));
        assert_eq!(table.in_flight(), 0);
    }

    #[test]
    fn unknown_id_is_unmatched() {
        let mut table = PendingTable::new();
        let (_id, _rx) = table.issue("ping");
        assert_eq!(table.complete(0, Ok(json!(1))), Completion::Unmatched);
        assert_eq!(table.complete(42, Ok(json!(1))), Completion::Unmatched);
        assert_eq!(table.in_flight(), 1);
    }

    #[test]
    fn ids_are_not_reused_after_completion() {
        let mut table = PendingTable::new();
        let (first, _rx1) = table.issue("a");
        let (second, _rx2) = table.issue("b");
        table.complete(first, Ok(Value::Null));
        table.complete(second, Ok(Value::Null));

        let (third, _rx3) = table.issue("c");
        assert_eq!(third, 3);
        assert_eq!(table.complete(first, Ok(Value::Null)), Completion::Unmatched);
    }

    #[test]
    fn out_of_order_completion_keeps_later_slots() {
        let mut table = PendingTable::new();
        let (a, mut rx_a) = table.issue("a");
        let (b, mut rx_b) = table.issue("b");
        let (c, mut rx_c) = table.issue("c");

        assert_eq!(table.complete(c, Ok(json!("c"))), Completion::Delivered);
        assert_eq!(table.complete(a, Ok(json!("a"))), Completion::Delivered);
        assert_eq!(table.in_flight(), 1);
        assert_eq!(table.complete(b, Ok(json!("b"))), Completion::Delivered);

        assert_eq!(rx_a.try_recv().unwrap().unwrap(), json!("a"));
        assert_eq!(rx_b.try_recv().unwrap().unwrap(), json!("b"));
        assert_eq!(rx_c.try_recv().unwrap().unwrap(), json!("c"));
        assert_eq!(table.next_id(), 4);
    }

    #[test]
    fn abandoned_slot_discards_late_response() {
        let mut table = PendingTable::new();
        let (id, rx) = table.issue("slow");
        drop(rx);

        assert!(table.abandon(id));
        assert_eq!(table.abandoned(), 1);
        assert_eq!(table.in_flight(), 0);
        assert_eq!(table.complete(id, Ok(Value::Null)), Completion::Discarded);
        assert_eq!(table.abandoned(), 0);
    }

    #[test]
    fn reap_clears_abandoned_slots() {
        let mut table = PendingTable::new();
        let (slow, _rx1) = table.issue("slow");
        let (live, _rx2) = table.issue("live");
        table.abandon(slow);

        assert_eq!(table.reap_abandoned(), 1);
        assert_eq!(table.abandoned(), 0);
        assert_eq!(table.in_flight(), 1);
        assert_eq!(table.complete(slow, Ok(Value::Null)), Completion::Unmatched);
        assert_eq!(table.complete(live, Ok(Value::Null)), Completion::Delivered);
    }

    #[test]
    fn stuck_request_does_not_retain_later_slots() {
        let mut table = PendingTable::new();
        let (stuck, _rx) = table.issue("window.create");
        let (abandoned, rx) = table.issue("slow");
        drop(rx);
        table.abandon(abandoned);

        for _ in 0..10_000 {
            let (id, _rx) = table.issue("ping");
            assert_eq!(table.complete(id, Ok(json!("pong"))), Completion::Delivered);
        }

        assert_eq!(table.len(), 2);
        assert_eq!(table.in_flight(), 1);
        assert_eq!(table.abandoned(), 1);
        assert_eq!(table.next_id(), 10_003);
        assert_eq!(table.complete(stuck, Ok(Value::Null)), Completion::Delivered);
        assert_eq!(table.complete(abandoned, Ok(Value::Null)), Completion::Discarded);
        assert!(table.is_empty());
    }

    #[test]
    fn abandon_twice_counts_once() {
        let mut table = PendingTable::new();
        let (id, _rx) = table.issue("slow");
        assert!(table.abandon(id));
        assert!(!table.abandon(id));
        assert_eq!(table.abandoned(), 1);
        assert_eq!(table.in_flight(), 0);
    }

    #[test]
    fn fail_all_rejects_pending_and_later_requests() {
        let mut table = PendingTable::new();
        let (_a, mut rx_a) = table.issue("a");
        let (b, _rx_b) = table.issue("b");
        table.abandon(b);

        assert_eq!(table.fail_all("engine exited with code 1"), 1);
        assert_eq!(table.in_flight(), 0);
        assert_eq!(table.abandoned(), 0);
        assert!(matches!(
            rx_a.try_recv().unwrap(),
            Err(Failure::Closed(reason)) if reason == "engine exited with code 1"
        ));

        let (late, mut rx_late) = table.issue("late");
        assert_eq!(late, 3);
        assert!(matches!(rx_late.try_recv().unwrap(), Err(Failure::Closed(_))));
        assert_eq!(table.closed_reason(), Some("engine exited with code 1"));
    }
}
