//! Tracking of one pending subscription payment.
//!
//! The server announces settled payments with `PAYMENT_COMPLETED`. A pending
//! payment that is not settled before its deadline becomes
//! [`PaymentState::Expired`]; the operator then regenerates it.

use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};

use crate::channel::{PushChannel, Subscription};
use crate::event::{EventKind, PushEvent};

/// Where the tracked payment stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentState {
    /// No payment has been started.
    Idle,
    Pending {
        payment_id: String,
        expires_at: DateTime<Utc>,
    },
    Completed {
        payment_id: String,
    },
    /// The deadline passed before the server confirmed the payment.
    Expired {
        payment_id: String,
    },
}

/// Watches the push channel for the completion of one payment.
///
/// # Panics
///
/// Methods panic if the inner lock is poisoned.
#[derive(Debug)]
pub struct PaymentWatch {
    state: Arc<RwLock<PaymentState>>,
    _subscription: Subscription,
}

impl PaymentWatch {
    /// Subscribe to `PAYMENT_COMPLETED` on `channel`. Starts idle.
    pub fn new(channel: &PushChannel) -> Self {
        let state = Arc::new(RwLock::new(PaymentState::Idle));
        let handler_state = Arc::clone(&state);
        let subscription = channel.on(EventKind::PaymentCompleted, move |event| {
            let PushEvent::PaymentCompleted(completed) = event else {
                return;
            };
            let mut state = handler_state.write().expect("payment lock poisoned");
            // A confirmation that races past the deadline still counts.
            let matches = match &*state {
                PaymentState::Pending { payment_id, .. } | PaymentState::Expired { payment_id } => {
                    *payment_id == completed.payment_id
                }
                _ => false,
            };
            if matches {
                tracing::info!(payment_id = %completed.payment_id, "payment completed");
                *state = PaymentState::Completed {
                    payment_id: completed.payment_id.clone(),
                };
            }
        });
        Self {
            state,
            _subscription: subscription,
        }
    }

    /// Start tracking a freshly created payment.
    pub fn start(&self, payment_id: impl Into<String>, expires_at: DateTime<Utc>) {
        let payment_id = payment_id.into();
        tracing::debug!(%payment_id, %expires_at, "payment pending");
        *self.state.write().expect("payment lock poisoned") = PaymentState::Pending {
            payment_id,
            expires_at,
        };
    }

    /// Replace an expired payment with a new one.
    ///
    /// # Returns
    ///
    /// `false`, leaving the state untouched, unless the current payment has
    /// expired as of `now`.
    pub fn regenerate(
        &self,
        payment_id: impl Into<String>,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> bool {
        let mut state = self.state.write().expect("payment lock poisoned");
        if !matches!(resolve(&state, now), PaymentState::Expired { .. }) {
            return false;
        }
        *state = PaymentState::Pending {
            payment_id: payment_id.into(),
            expires_at,
        };
        true
    }

    /// The state as of `now`. A pending payment past its deadline reads as
    /// [`PaymentState::Expired`].
    pub fn state(&self, now: DateTime<Utc>) -> PaymentState {
        resolve(&self.state.read().expect("payment lock poisoned"), now)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.state(now), PaymentState::Expired { .. })
    }
}

fn resolve(state: &PaymentState, now: DateTime<Utc>) -> PaymentState {
    match state {
        PaymentState::Pending {
            payment_id,
            expires_at,
        } if now >= *expires_at => PaymentState::Expired {
            payment_id: payment_id.clone(),
        },
        other => other.clone(),
    }
}
