use std::fmt::Debug;

use chrono::{Duration, Utc};
use log::*;
use rand::thread_rng;
use taskpay_common::Cents;

use crate::{
    db_types::{Account, NewOrder, Order, OrderResponse, OrderStatus, Role, UserId},
    events::{EventProducers, OrderCompletedEvent, OrderRefundedEvent},
    helpers::codes::new_confirmation_code,
    traits::{EmailGateway, EscrowDatabase, EscrowError},
};

/// Tunables for the confirmation protocol. Defaults follow the deployment defaults: a 24 hour confirmation window
/// and six digit codes.
#[derive(Debug, Clone, Copy)]
pub struct LifecycleSettings {
    pub confirm_window: Duration,
    pub code_digits: u32,
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        Self { confirm_window: Duration::hours(24), code_digits: 6 }
    }
}

/// The result of a `deliver` transition. The state transition commits before the confirmation mail goes out, so a
/// gateway failure is reported here rather than rolling anything back. There is currently no dedicated resend
/// path; the issued code stays valid until the confirmation window lapses.
#[derive(Debug, Clone)]
pub struct DeliveryOutcome {
    pub order: Order,
    pub dispatch_error: Option<String>,
}

/// `OrderLifecycleApi` drives the escrow state machine:
/// `open → in_progress → waiting_confirmation → {completed | refunded}`.
///
/// Every transition with a monetary side effect delegates to a single atomic backend operation, so concurrent
/// callers (the chat front-end and the reconciliation worker) can never double-pay or double-refund an order.
pub struct OrderLifecycleApi<B, G> {
    db: B,
    gateway: G,
    producers: EventProducers,
    settings: LifecycleSettings,
}

impl<B, G> Debug for OrderLifecycleApi<B, G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OrderLifecycleApi")
    }
}

impl<B, G> OrderLifecycleApi<B, G> {
    pub fn new(db: B, gateway: G, producers: EventProducers, settings: LifecycleSettings) -> Self {
        Self { db, gateway, producers, settings }
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}

impl<B, G> OrderLifecycleApi<B, G>
where
    B: EscrowDatabase,
    G: EmailGateway,
{
    /// Registers the caller's account (creating it lazily) and records the chosen role.
    pub async fn register_role(&self, user: UserId, role: Role) -> Result<Account, EscrowError> {
        let account = self.db.fetch_or_create_account(user).await?;
        self.db.set_role(user, role).await?;
        debug!("🧑️ User {user} registered as {role}");
        Ok(Account { role, ..account })
    }

    /// Stores the contact address confirmation codes will be mailed to.
    pub async fn register_email(&self, user: UserId, email: &str) -> Result<(), EscrowError> {
        if !email.contains('@') {
            return Err(EscrowError::InvalidEmail(email.to_string()));
        }
        self.db.fetch_or_create_account(user).await?;
        self.db.set_contact_email(user, email.trim()).await
    }

    /// Credits a wallet. Demo-grade deposit path; a real payment provider would sit behind this call.
    pub async fn top_up(&self, user: UserId, amount: Cents) -> Result<Account, EscrowError> {
        if !amount.is_positive() {
            return Err(EscrowError::InvalidAmount(amount));
        }
        self.db.fetch_or_create_account(user).await?;
        self.db.adjust_balance(user, amount).await?;
        let account = self.db.fetch_account(user).await?.ok_or(EscrowError::AccountNotFound(user))?;
        Ok(account)
    }

    /// The `create` transition: reserves the amount in escrow and opens the order. Debit and insert are one
    /// atomic backend transaction; an underfunded requester gets `InsufficientFunds` and nothing is written.
    pub async fn create_order(&self, order: NewOrder) -> Result<Order, EscrowError> {
        if !order.amount.is_positive() {
            return Err(EscrowError::InvalidAmount(order.amount));
        }
        self.db.fetch_or_create_account(order.requester).await?;
        let order = self.db.create_escrow_order(order).await?;
        info!("🔄️📦️ Order #{} created; {} held in escrow", order.id, order.amount);
        Ok(order)
    }

    /// The `apply` transition: a worker expresses interest in an open order. A worker may apply to a given order
    /// at most once, and never to their own.
    pub async fn apply_to_order(&self, order_id: i64, worker: UserId) -> Result<(), EscrowError> {
        let order = self.db.fetch_order(order_id).await?.ok_or(EscrowError::OrderNotFound(order_id))?;
        if order.status != OrderStatus::Open {
            return Err(EscrowError::OrderNotOpen(order_id));
        }
        if order.requester == worker {
            return Err(EscrowError::CannotApplyToOwnOrder(order_id));
        }
        let inserted = self.db.add_response(order_id, worker).await?;
        if !inserted {
            return Err(EscrowError::AlreadyApplied { order_id, worker });
        }
        Ok(())
    }

    /// The `assign` transition: the owning requester picks one of the applicants. The status guard lives in the
    /// conditional update, so racing a second assign (or anything else) leaves exactly one winner.
    pub async fn assign_worker(
        &self,
        order_id: i64,
        requester: UserId,
        worker: UserId,
    ) -> Result<Order, EscrowError> {
        let order = self.db.fetch_order(order_id).await?.ok_or(EscrowError::OrderNotFound(order_id))?;
        if order.requester != requester {
            return Err(EscrowError::NotOwner { order_id, user: requester });
        }
        if order.status != OrderStatus::Open {
            return Err(EscrowError::OrderNotOpen(order_id));
        }
        if !self.db.has_response(order_id, worker).await? {
            return Err(EscrowError::UnknownApplicant { order_id, worker });
        }
        let order = self
            .db
            .assign_worker(order_id, worker)
            .await?
            .ok_or(EscrowError::OrderNotOpen(order_id))?;
        info!("🔄️🤝️ Worker {worker} assigned to order #{order_id}");
        Ok(order)
    }

    /// The `deliver` transition: the assigned worker reports the work done. A fresh code is issued, the
    /// confirmation window starts, and the code is mailed to the worker's registered address. The mail dispatch
    /// happens after the transition commits; its failure is reported in the outcome, never rolled back.
    pub async fn mark_delivered(&self, order_id: i64, worker: UserId) -> Result<DeliveryOutcome, EscrowError> {
        let order = self.db.fetch_order(order_id).await?.ok_or(EscrowError::OrderNotFound(order_id))?;
        if order.worker != Some(worker) {
            return Err(EscrowError::NotAssignedWorker { order_id, user: worker });
        }
        if order.status != OrderStatus::InProgress {
            return Err(EscrowError::OrderWrongState(order_id));
        }
        let account = self.db.fetch_account(worker).await?.ok_or(EscrowError::AccountNotFound(worker))?;
        let email = account.email.ok_or(EscrowError::NoContactEmail(worker))?;

        let pending = self.db.pending_confirmation_codes().await?;
        let code = new_confirmation_code(&mut thread_rng(), self.settings.code_digits, &pending)?;
        let deadline = Utc::now() + self.settings.confirm_window;
        let order = self
            .db
            .begin_confirmation(order_id, worker, &code, deadline)
            .await?
            .ok_or(EscrowError::OrderWrongState(order_id))?;
        info!("🔄️📮️ Order #{order_id} delivered; confirmation window ends at {deadline}");

        let dispatch_error = match self.gateway.send_confirmation(&email, order_id, &code).await {
            Ok(()) => None,
            Err(e) => {
                warn!("🔄️📮️ Could not mail the confirmation code for order #{order_id}: {e}");
                Some(e.to_string())
            },
        };
        Ok(DeliveryOutcome { order, dispatch_error })
    }

    /// The `confirm` transition, driven by the inbound mailbox. Polls the gateway for candidates from the
    /// worker's registered address and evaluates them in the order received; the first candidate satisfying every
    /// precondition commits and the rest are ignored for this scan. Returns the completed order, or `None` when
    /// no candidate was valid.
    pub async fn check_confirmations(&self, worker: UserId) -> Result<Option<Order>, EscrowError> {
        let account = self.db.fetch_account(worker).await?.ok_or(EscrowError::AccountNotFound(worker))?;
        let email = account.email.ok_or(EscrowError::NoContactEmail(worker))?;
        let candidates = self.gateway.poll_candidates(Some(&email)).await?;
        trace!("🔄️📬️ {} confirmation candidates polled for worker {worker}", candidates.len());

        for candidate in candidates {
            let Some(order) = self.db.fetch_order(candidate.order_id).await? else {
                continue;
            };
            if order.worker != Some(worker) || order.status != OrderStatus::WaitingConfirmation {
                continue;
            }
            if order.confirm_code.as_deref() != Some(candidate.code.as_str()) {
                trace!("🔄️📬️ Candidate code for order #{} does not match the issued one", order.id);
                continue;
            }
            if self.db.is_code_used(&candidate.code).await? {
                continue;
            }
            match self.db.confirm_delivery(order.id, &candidate.code).await {
                Ok(order) => {
                    info!("🔄️✅️ Order #{} confirmed; {} credited to worker {worker}", order.id, order.amount);
                    self.call_order_completed_hook(&order).await;
                    return Ok(Some(order));
                },
                // Someone else won the race between our precondition checks and the commit. Not an error.
                Err(EscrowError::CodeAlreadyUsed)
                | Err(EscrowError::OrderWrongState(_))
                | Err(EscrowError::CodeMismatch(_)) => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(None)
    }

    /// The `expire-refund` sweep used by the reconciliation worker. Failures on individual orders are logged and
    /// skipped so one bad row cannot halt the scan; anything missed is picked up by a later cycle, since the
    /// expiry predicate is a deadline comparison rather than an edge-triggered event.
    pub async fn expire_overdue_orders(&self) -> Result<Vec<Order>, EscrowError> {
        let now = Utc::now();
        let overdue = self.db.expired_confirmation_orders(now).await?;
        let mut refunded = Vec::with_capacity(overdue.len());
        for order in overdue {
            match self.db.refund_expired_order(order.id, now).await {
                Ok(Some(order)) => {
                    info!("🔄️⏳️ Order #{} expired; {} refunded to requester {}", order.id, order.amount, order.requester);
                    self.call_order_refunded_hook(&order).await;
                    refunded.push(order);
                },
                Ok(None) => {
                    debug!("🔄️⏳️ Order #{} was settled by another writer before the refund landed", order.id);
                },
                Err(e) => {
                    error!("🔄️⏳️ Could not refund expired order #{}: {e}", order.id);
                },
            }
        }
        Ok(refunded)
    }

    /// Open orders the given user may apply to.
    pub async fn open_orders_for(&self, user: UserId) -> Result<Vec<Order>, EscrowError> {
        self.db.open_orders_excluding(user).await
    }

    pub async fn orders_for_requester(&self, user: UserId) -> Result<Vec<Order>, EscrowError> {
        self.db.orders_for_requester(user).await
    }

    pub async fn active_orders_for_worker(&self, user: UserId) -> Result<Vec<Order>, EscrowError> {
        self.db.active_orders_for_worker(user).await
    }

    pub async fn responses_for_order(&self, order_id: i64) -> Result<Vec<OrderResponse>, EscrowError> {
        self.db.responses_for_order(order_id).await
    }

    async fn call_order_completed_hook(&self, order: &Order) {
        for emitter in &self.producers.order_completed_producer {
            let event = OrderCompletedEvent::new(order.clone());
            emitter.publish_event(event).await;
        }
    }

    async fn call_order_refunded_hook(&self, order: &Order) {
        for emitter in &self.producers.order_refunded_producer {
            let event = OrderRefundedEvent::new(order.clone());
            emitter.publish_event(event).await;
        }
    }
}
