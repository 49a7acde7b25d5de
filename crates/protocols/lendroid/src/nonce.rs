//! Approval nonce issuance
//!
//! The contract stores the last nonce consumed per `(wrangler, creator)`.
//! Two approvals issued before either settles would otherwise read the same
//! value, so issuance is serialized per key and remembers what it handed out.
//!
//! A nonce is reserved for the length of one underwriting and only recorded
//! once the approval carrying it is signed. A reservation dropped without
//! [`NonceReservation::commit`] leaves the key as it was.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use ethers::types::{Address, U256};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use wrangler_core::NodeError;

type Key = (Address, Address);
type Slot = Arc<AsyncMutex<Option<U256>>>;

#[derive(Debug, Default)]
pub struct NonceBook {
    slots: Mutex<HashMap<Key, Slot>>,
}

impl NonceBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve the next nonce for `(wrangler, creator)`.
    ///
    /// `read_ledger` returns the last nonce the contract consumed; it runs
    /// while the key is held. The nonce is `max(ledger + 1, last committed + 1)`.
    /// The key stays held until the reservation is committed or dropped.
    pub async fn reserve<F, Fut>(
        &self,
        wrangler: Address,
        creator: Address,
        read_ledger: F,
    ) -> Result<NonceReservation<'_>, NodeError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<U256, NodeError>>,
    {
        let key = (wrangler, creator);
        let slot = self
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key)
            .or_default()
            .clone();

        let mut reservation = NonceReservation {
            book: self,
            key,
            guard: Some(slot.lock_owned().await),
            nonce: U256::zero(),
        };

        let on_chain = read_ledger().await?;
        let from_chain = on_chain.saturating_add(U256::one());
        if let Some(last_committed) = reservation.guard.as_deref_mut() {
            reservation.nonce = match *last_committed {
                Some(last) if last > on_chain => from_chain.max(last.saturating_add(U256::one())),
                // the ledger has consumed everything handed out
                _ => {
                    *last_committed = None;
                    from_chain
                }
            };
        }
        Ok(reservation)
    }

    /// Keys held by a reservation or ahead of the ledger
    #[cfg(test)]
    pub(crate) fn tracked_keys(&self) -> usize {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn release(&self, key: Key) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        let idle = slots.get(&key).map_or(false, |slot| {
            // waiters clone the slot under this lock, so a lone reference means none
            Arc::strong_count(slot) == 1 && slot.try_lock().map_or(false, |last| last.is_none())
        });
        if idle {
            slots.remove(&key);
        }
    }
}

/// A nonce held for one `(wrangler, creator)` until committed or dropped
#[derive(Debug)]
pub struct NonceReservation<'a> {
    book: &'a NonceBook,
    key: Key,
    guard: Option<OwnedMutexGuard<Option<U256>>>,
    nonce: U256,
}

impl NonceReservation<'_> {
    pub fn nonce(&self) -> U256 {
        self.nonce
    }

    /// Record the nonce as handed out; later reservations issue above it
    pub fn commit(mut self) {
        if let Some(mut last_committed) = self.guard.take() {
            *last_committed = Some(self.nonce);
        }
    }
}

impl Drop for NonceReservation<'_> {
    fn drop(&mut self) {
        if let Some(guard) = self.guard.take() {
            let uncommitted = guard.is_none();
            drop(guard);
            if uncommitted {
                self.book.release(self.key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys() -> (Address, Address) {
        (Address::repeat_byte(1), Address::repeat_byte(2))
    }

    async fn issue(book: &NonceBook, on_chain: u64) -> U256 {
        let (w, c) = keys();
        let reservation = book
            .reserve(w, c, || async move { Ok(U256::from(on_chain)) })
            .await
            .unwrap();
        let nonce = reservation.nonce();
        reservation.commit();
        nonce
    }

    #[tokio::test]
    async fn test_first_nonce_follows_ledger() {
        let book = NonceBook::new();
        assert_eq!(issue(&book, 7).await, U256::from(8u64));
    }

    #[tokio::test]
    async fn test_unsettled_approvals_get_distinct_nonces() {
        let book = Arc::new(NonceBook::new());
        let mut handles = Vec::new();
        for _ in 0..5 {
            let book = book.clone();
            handles.push(tokio::spawn(async move { issue(&book, 0).await }));
        }

        let mut issued = Vec::new();
        for handle in handles {
            issued.push(handle.await.unwrap().as_u64());
        }
        issued.sort_unstable();
        assert_eq!(issued, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn test_dropped_reservations_do_not_advance_the_key() {
        let book = NonceBook::new();
        let (w, c) = keys();
        for _ in 0..3 {
            let reservation = book.reserve(w, c, || async { Ok(U256::zero()) }).await.unwrap();
            assert_eq!(reservation.nonce(), U256::one());
        }
        assert_eq!(issue(&book, 0).await, U256::one());
        assert_eq!(issue(&book, 0).await, U256::from(2u64));
    }

    #[tokio::test]
    async fn test_reservation_holds_the_key() {
        let book = Arc::new(NonceBook::new());
        let (w, c) = keys();
        let held = book.reserve(w, c, || async { Ok(U256::zero()) }).await.unwrap();

        let waiter = {
            let book = book.clone();
            tokio::spawn(async move { issue(&book, 0).await })
        };
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        held.commit();
        assert_eq!(waiter.await.unwrap(), U256::from(2u64));
    }

    #[tokio::test]
    async fn test_ledger_ahead_wins() {
        let book = NonceBook::new();
        issue(&book, 0).await;
        assert_eq!(issue(&book, 10).await, U256::from(11u64));
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let book = NonceBook::new();
        let w = Address::repeat_byte(1);
        let a = book.reserve(w, Address::repeat_byte(2), || async { Ok(U256::zero()) });
        let a = a.await.unwrap();
        let b = book
            .reserve(w, Address::repeat_byte(3), || async { Ok(U256::zero()) })
            .await
            .unwrap();
        assert_eq!(a.nonce(), b.nonce());
    }

    #[tokio::test]
    async fn test_ledger_failure_issues_nothing() {
        let book = NonceBook::new();
        let (w, c) = keys();
        let failed = book
            .reserve(w, c, || async { Err(NodeError::Timeout { secs: 30 }) })
            .await;
        assert!(failed.is_err());
        assert_eq!(book.tracked_keys(), 0);
        assert_eq!(issue(&book, 0).await, U256::one());
    }

    #[tokio::test]
    async fn test_keys_are_forgotten_once_the_ledger_catches_up() {
        let book = NonceBook::new();
        let (w, c) = keys();

        for _ in 0..3 {
            let reservation = book.reserve(w, c, || async { Ok(U256::zero()) }).await.unwrap();
            drop(reservation);
        }
        assert_eq!(book.tracked_keys(), 0);

        issue(&book, 0).await;
        issue(&book, 0).await;
        assert_eq!(book.tracked_keys(), 1);

        // both approvals settled; a rejected request then finds nothing to keep
        let reservation = book
            .reserve(w, c, || async { Ok(U256::from(2u64)) })
            .await
            .unwrap();
        assert_eq!(reservation.nonce(), U256::from(3u64));
        drop(reservation);
        assert_eq!(book.tracked_keys(), 0);
    }
}
