//! Coordinator operations: listing, payment review and ledger maintenance.

use super::catalog::{Catalog, ParticipantCategory};
use super::config::Config;
use super::fees::FeeCalculator;
use super::payment::{Payment, PaymentId, PaymentLine, PaymentMethod, PaymentStatus, UserId};
use super::registration::{Registration, RegistrationError, RegistrationId, RegistrationStatus};
use super::store::{Ledger, LedgerWriter, NewPayment, StoreError, Transactional};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

/// A registration with its payments and current balance
#[derive(Debug, Clone, Serialize)]
pub struct RegistrationOverview {
    pub registration: Registration,
    pub payments: Vec<Payment>,
    pub status: RegistrationStatus,
    /// Events re-priced under current rules at the registration date
    pub current_total: Decimal,
    pub total_paid: Decimal,
    pub amount_due: Decimal,
}

impl RegistrationOverview {
    pub fn build<S>(store: &S, config: &Config, registration: Registration) -> Self
    where
        S: Catalog + Ledger + ?Sized,
    {
        let payments = store.payments_for_registration(registration.id);
        let status = registration.payment_status(&payments);
        let current_total = FeeCalculator::new(store, config).current_total_fee(&registration);
        let total_paid: Decimal = payments
            .iter()
            .filter(|p| p.is_paid())
            .map(|p| p.total_amount)
            .sum();
        RegistrationOverview {
            registration,
            payments,
            status,
            current_total,
            total_paid,
            amount_due: current_total - total_paid,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RegistrationFilter {
    pub status: Option<RegistrationStatus>,
    pub event_code: Option<String>,
    pub category: Option<ParticipantCategory>,
    /// Case-insensitive match on name or email
    pub search: Option<String>,
}

impl RegistrationFilter {
    fn matches(&self, overview: &RegistrationOverview) -> bool {
        let reg = &overview.registration;
        if self.status.is_some_and(|s| s != overview.status) {
            return false;
        }
        if let Some(code) = &self.event_code {
            if !reg.has_event(code) {
                return false;
            }
        }
        if self.category.is_some_and(|c| c != reg.category) {
            return false;
        }
        if let Some(term) = &self.search {
            let term = term.to_lowercase();
            if !reg.full_name.to_lowercase().contains(&term)
                && !reg.email.to_lowercase().contains(&term)
            {
                return false;
            }
        }
        true
    }
}

pub fn filter_registrations<S>(
    store: &S,
    config: &Config,
    filter: &RegistrationFilter,
) -> Vec<RegistrationOverview>
where
    S: Catalog + Ledger + ?Sized,
{
    let mut rows: Vec<_> = store
        .registrations()
        .into_iter()
        .map(|r| RegistrationOverview::build(store, config, r))
        .filter(|o| filter.matches(o))
        .collect();
    rows.sort_by(|a, b| b.registration.created_at.cmp(&a.registration.created_at));
    rows
}

/// Attach a transfer proof to one of the user's pending payments.
pub fn submit_proof<S>(
    store: &mut S,
    user_id: UserId,
    payment_id: PaymentId,
    proof_reference: &str,
    now: DateTime<Utc>,
) -> Result<Payment, RegistrationError>
where
    S: LedgerWriter + Transactional,
{
    store.transaction(|tx| -> Result<_, RegistrationError> {
        let mut payment = tx
            .payment(payment_id)
            .ok_or(StoreError::UnknownPayment(payment_id))?;
        payment.submit_proof(user_id, proof_reference, now)?;
        tx.update_payment(payment.clone())?;
        log::info!(
            "Proof {} submitted for payment {} by user {}",
            proof_reference,
            payment_id,
            user_id
        );
        Ok(payment)
    })
}

/// Change a payment's status on behalf of a coordinator. Returns the updated
/// payment and its previous status.
pub fn update_payment_status<S>(
    store: &mut S,
    payment_id: PaymentId,
    status: PaymentStatus,
    admin: &str,
    now: DateTime<Utc>,
) -> Result<(Payment, PaymentStatus), RegistrationError>
where
    S: LedgerWriter + Transactional,
{
    store.transaction(|tx| -> Result<_, RegistrationError> {
        let mut payment = tx
            .payment(payment_id)
            .ok_or(StoreError::UnknownPayment(payment_id))?;
        let old = payment.change_status(status, admin, now)?;
        tx.update_payment(payment.clone())?;
        log::info!(
            "Payment {} changed from {} to {} by {}",
            payment_id,
            old,
            status,
            admin
        );
        Ok((payment, old))
    })
}

#[derive(Debug, Default, Serialize)]
pub struct OrphanReport {
    pub created: Vec<Payment>,
    /// Registrations without payments whose total is zero
    pub skipped: Vec<RegistrationId>,
    pub failed: Vec<(RegistrationId, String)>,
}

/// Open a pending payment for every registration that owes money but has none.
pub fn fix_orphaned_payments<S>(store: &mut S, now: DateTime<Utc>) -> OrphanReport
where
    S: LedgerWriter + Transactional,
{
    let mut report = OrphanReport::default();
    let orphans: Vec<Registration> = store
        .registrations()
        .into_iter()
        .filter(|r| store.payments_for_registration(r.id).is_empty())
        .collect();
    log::info!("Found {} registrations without payments", orphans.len());

    for registration in orphans {
        let total = registration.total_at_registration();
        if total <= Decimal::ZERO {
            log::warn!(
                "registration {} has no payment and a total of {}, skipping",
                registration.id,
                total
            );
            report.skipped.push(registration.id);
            continue;
        }

        let result = store.transaction(|tx| {
            tx.insert_payment(NewPayment {
                user_id: registration.user_id,
                registration_id: registration.id,
                method: PaymentMethod::BankTransfer,
                status: PaymentStatus::PendingPayment,
                total_amount: total,
                lines: registration
                    .events
                    .iter()
                    .map(|e| PaymentLine {
                        event_code: e.event_code.clone(),
                        individual_price: e.price_at_registration,
                    })
                    .collect(),
                created_at: now,
            })
        });
        match result {
            Ok(payment) => {
                log::info!(
                    "Created payment {} ({}) for registration {}",
                    payment.id,
                    payment.total_amount,
                    registration.id
                );
                report.created.push(payment);
            }
            Err(err) => {
                log::error!("registration {}: {}", registration.id, err);
                report.failed.push((registration.id, err.to_string()));
            }
        }
    }
    report
}

/// Registration with an unpaid event whose early-bird price ends tomorrow
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EarlyBirdReminder {
    pub registration_id: RegistrationId,
    pub full_name: String,
    pub email: String,
    pub event_code: String,
    pub event_name: String,
    pub deadline: NaiveDate,
    pub payment_reference: String,
    pub amount: Decimal,
}

/// Registrations that still have a pending payment for an event whose
/// early deadline falls in `(today, today + 1 day]`.
pub fn early_bird_candidates<S>(store: &S, today: NaiveDate) -> Vec<EarlyBirdReminder>
where
    S: Catalog + Ledger + ?Sized,
{
    let horizon = today + Duration::days(1);
    let closing: Vec<_> = store
        .list_events()
        .into_iter()
        .filter_map(|e| {
            let deadline = e.registration_deadline_early?;
            (deadline > today && deadline <= horizon).then_some((e, deadline))
        })
        .collect();
    if closing.is_empty() {
        log::debug!("no early deadlines closing after {}", today);
        return Vec::new();
    }

    let mut reminders = Vec::new();
    for registration in store.registrations() {
        let payments = store.payments_for_registration(registration.id);
        let Some(pending) = payments.iter().find(|p| p.status.is_pending()) else {
            continue;
        };
        for (event, deadline) in &closing {
            if registration.has_event(&event.code)
                && registration.created_at.date_naive() <= *deadline
            {
                reminders.push(EarlyBirdReminder {
                    registration_id: registration.id,
                    full_name: registration.full_name.clone(),
                    email: registration.email.clone(),
                    event_code: event.code.clone(),
                    event_name: event.name.clone(),
                    deadline: *deadline,
                    payment_reference: pending.reference.clone(),
                    amount: pending.total_amount,
                });
            }
        }
    }
    log::info!("{} early-bird reminders due", reminders.len());
    reminders
}
