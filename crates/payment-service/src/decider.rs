//! Payment-decision providers.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use common::{Money, OrderId, PaymentStatus};
use tokio::sync::RwLock;

use crate::{PaymentError, Result};

/// Decides whether an order's payment goes through.
///
/// Stands in for the external payment provider; only the outcome matters to
/// the ledger.
#[async_trait]
pub trait PaymentDecider: Send + Sync {
    async fn decide(&self, order_id: OrderId, amount: Money) -> Result<PaymentStatus>;
}

#[async_trait]
impl<D: PaymentDecider + ?Sized> PaymentDecider for Arc<D> {
    async fn decide(&self, order_id: OrderId, amount: Money) -> Result<PaymentStatus> {
        (**self).decide(order_id, amount).await
    }
}

/// Approves payments up to a fixed amount and declines anything above.
#[derive(Debug, Clone)]
pub struct AmountLimitDecider {
    limit: Money,
}

impl AmountLimitDecider {
    pub fn new(limit: Money) -> Self {
        Self { limit }
    }
}

impl Default for AmountLimitDecider {
    fn default() -> Self {
        Self::new(Money::from_dollars(10_000))
    }
}

#[async_trait]
impl PaymentDecider for AmountLimitDecider {
    async fn decide(&self, _order_id: OrderId, amount: Money) -> Result<PaymentStatus> {
        if amount.is_positive() && amount <= self.limit {
            Ok(PaymentStatus::Success)
        } else {
            Ok(PaymentStatus::Failed)
        }
    }
}

#[derive(Debug, Default)]
struct DeciderState {
    declined: RwLock<HashSet<OrderId>>,
    unavailable: AtomicBool,
    calls: AtomicUsize,
}

/// Scriptable decider for testing. Approves everything unless told otherwise.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPaymentDecider {
    state: Arc<DeciderState>,
}

impl InMemoryPaymentDecider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declines payment for the given order.
    pub async fn set_decline(&self, order_id: OrderId) {
        self.state.declined.write().await.insert(order_id);
    }

    /// Makes every call fail as if the provider were unreachable.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Returns the number of decisions requested so far.
    pub fn call_count(&self) -> usize {
        self.state.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentDecider for InMemoryPaymentDecider {
    async fn decide(&self, order_id: OrderId, _amount: Money) -> Result<PaymentStatus> {
        self.state.calls.fetch_add(1, Ordering::SeqCst);

        if self.state.unavailable.load(Ordering::SeqCst) {
            return Err(PaymentError::ProviderUnavailable(
                "payment provider did not respond".to_string(),
            ));
        }

        if self.state.declined.read().await.contains(&order_id) {
            Ok(PaymentStatus::Failed)
        } else {
            Ok(PaymentStatus::Success)
        }
    }
}
