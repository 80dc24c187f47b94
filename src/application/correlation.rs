use crate::domain::transaction::{Transaction, TransactionId};
use crate::error::{PurchaseError, Result};
use std::collections::{HashMap, VecDeque};
use tokio::sync::{Mutex, oneshot};
use tracing::debug;

pub type RequestId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestPhase {
    Submitted,
    AwaitingCorrelation,
}

struct PendingRequest {
    id: RequestId,
    /// Last update sequence observed when the request was registered.
    registered_at: u64,
    phase: RequestPhase,
    resolver: oneshot::Sender<Result<Transaction>>,
}

#[derive(Default)]
struct CorrelationState {
    next_request: RequestId,
    sequence: u64,
    pending: HashMap<String, VecDeque<PendingRequest>>,
    /// Sequence at which each transaction id was first observed.
    first_seen: HashMap<TransactionId, u64>,
    /// Transactions that already resolved a request.
    claimed: HashMap<TransactionId, RequestId>,
    /// Set once updates stop flowing; no request can be resolved after that.
    closed: bool,
}

/// Handle held by the caller of a purchase while it awaits resolution.
pub struct PendingTicket {
    pub id: RequestId,
    pub product_id: String,
    receiver: oneshot::Receiver<Result<Transaction>>,
}

impl PendingTicket {
    /// Waits for the request to be resolved. A resolver dropped without an
    /// answer means the update stream is gone.
    pub async fn resolution(self) -> Result<Transaction> {
        self.receiver.await.unwrap_or_else(|_| {
            Err(PurchaseError::BackendUnavailable(
                "transaction updates stopped before the purchase resolved".to_string(),
            ))
        })
    }
}

/// Matches transaction updates to pending purchase requests.
///
/// Requests are queued per product id and claimed first-in first-out. An
/// update only matches requests registered before its transaction was first
/// observed, and a transaction resolves at most one request. Only
/// `purchased` and `failed` updates resolve a purchase; restored
/// redeliveries are never matched to one.
#[derive(Default)]
pub struct Correlator {
    state: Mutex<CorrelationState>,
}

impl Correlator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a request for `product_id`. Fails with `BackendUnavailable`
    /// once the correlator has been closed.
    pub async fn register(&self, product_id: &str) -> Result<PendingTicket> {
        let mut state = self.state.lock().await;
        if state.closed {
            return Err(PurchaseError::BackendUnavailable(
                "transaction updates are no longer being consumed".to_string(),
            ));
        }
        state.next_request += 1;
        let id = state.next_request;
        let registered_at = state.sequence;
        let (resolver, receiver) = oneshot::channel();

        state
            .pending
            .entry(product_id.to_string())
            .or_default()
            .push_back(PendingRequest {
                id,
                registered_at,
                phase: RequestPhase::Submitted,
                resolver,
            });
        debug!(request_id = id, product_id, "registered pending purchase");

        Ok(PendingTicket {
            id,
            product_id: product_id.to_string(),
            receiver,
        })
    }

    /// Records that the backend accepted the submission.
    pub async fn mark_awaiting(&self, ticket: &PendingTicket) {
        let mut state = self.state.lock().await;
        if let Some(request) = state
            .pending
            .get_mut(&ticket.product_id)
            .and_then(|queue| queue.iter_mut().find(|r| r.id == ticket.id))
        {
            request.phase = RequestPhase::AwaitingCorrelation;
        }
    }

    /// Removes a request whose submission failed.
    pub async fn withdraw(&self, ticket: &PendingTicket) {
        let mut state = self.state.lock().await;
        if let Some(queue) = state.pending.get_mut(&ticket.product_id) {
            queue.retain(|r| r.id != ticket.id);
            if queue.is_empty() {
                state.pending.remove(&ticket.product_id);
            }
        }
    }

    /// Feeds one stored transaction through correlation. Returns the id of
    /// the request it resolved, if any.
    pub async fn observe(&self, tx: &Transaction) -> Option<RequestId> {
        let mut state = self.state.lock().await;
        state.sequence += 1;
        let sequence = state.sequence;
        let first_seen = *state.first_seen.entry(tx.id).or_insert(sequence);

        if !tx.purchase_state.resolves_purchase() || state.claimed.contains_key(&tx.id) {
            return None;
        }

        let queue = state.pending.get_mut(&tx.product_id)?;
        let outcome = match tx.failure() {
            Some(err) => Err(err),
            None => Ok(tx.clone()),
        };

        let mut resolved = None;
        while let Some(pos) = queue.iter().position(|r| r.registered_at < first_seen) {
            let Some(request) = queue.remove(pos) else {
                break;
            };
            // A dropped receiver means the caller went away; try the next one.
            if request.resolver.send(outcome.clone()).is_ok() {
                resolved = Some(request.id);
                break;
            }
        }
        if queue.is_empty() {
            state.pending.remove(&tx.product_id);
        }

        if let Some(request_id) = resolved {
            state.claimed.insert(tx.id, request_id);
            debug!(request_id, tx_id = tx.id, product_id = %tx.product_id, "correlated transaction");
        }
        resolved
    }

    /// Forgets a retired transaction.
    pub async fn forget(&self, tx_id: TransactionId) {
        let mut state = self.state.lock().await;
        state.first_seen.remove(&tx_id);
        state.claimed.remove(&tx_id);
    }

    /// Resolves every pending request with `err` and rejects later
    /// registrations. Returns how many callers were still waiting.
    pub async fn close(&self, err: PurchaseError) -> usize {
        let mut state = self.state.lock().await;
        state.closed = true;
        let mut failed = 0;
        for (product_id, queue) in state.pending.drain() {
            for request in queue {
                debug!(request_id = request.id, %product_id, phase = ?request.phase, "failing pending purchase");
                if request.resolver.send(Err(err.clone())).is_ok() {
                    failed += 1;
                }
            }
        }
        failed
    }

    #[cfg(test)]
    pub(crate) async fn pending_count(&self) -> usize {
        let state = self.state.lock().await;
        state.pending.values().map(VecDeque::len).sum()
    }

    #[cfg(test)]
    pub(crate) async fn tracked_count(&self) -> usize {
        let state = self.state.lock().await;
        state.first_seen.len() + state.claimed.len()
    }
}
