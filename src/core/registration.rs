use super::catalog::{Catalog, ParticipantCategory, ParticipationFormat};
use super::config::Config;
use super::fees::{FeeBreakdown, FeeCalculator};
use super::payment::{Payment, PaymentError, PaymentLine, PaymentMethod, PaymentStatus, UserId};
use super::store::{LedgerWriter, NewPayment, NewRegistration, StoreError, Transactional};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

pub type RegistrationId = u64;

pub const PAID_EVENTS_LOCKED: &str =
    "Some events are already paid and cannot be modified. Paid events are non-refundable.";

/// A request the ledger declines to carry out. Returned as data, never logged as an error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Refusal {
    #[error("No existing registration found")]
    NoRegistration,
    #[error("{}", PAID_EVENTS_LOCKED)]
    PaidEventsLocked {
        events: Vec<String>,
        paid_payments: Vec<Payment>,
    },
    #[error("All selected events are already registered")]
    AlreadyRegistered { paid_payments: Vec<Payment> },
    #[error("User {user_id} already has registration {registration_id}")]
    RegistrationExists {
        user_id: UserId,
        registration_id: RegistrationId,
    },
    #[error("At least one event must be selected")]
    NoEventsSelected,
    #[error("Some selected events have no fee for this participant and cannot be added")]
    UnpricedEvents { events: Vec<String> },
}

impl Refusal {
    /// Events that caused the refusal, if any
    pub fn blocked_events(&self) -> &[String] {
        match self {
            Refusal::PaidEventsLocked { events, .. } | Refusal::UnpricedEvents { events } => {
                events.as_slice()
            }
            _ => &[],
        }
    }

    pub fn paid_payments(&self) -> &[Payment] {
        match self {
            Refusal::PaidEventsLocked { paid_payments, .. }
            | Refusal::AlreadyRegistered { paid_payments } => paid_payments.as_slice(),
            _ => &[],
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RegistrationError {
    #[error(transparent)]
    Refused(#[from] Refusal),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Payment(#[from] PaymentError),
}

/// Event held by a registration together with the price charged when it was added
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RegisteredEvent {
    pub event_code: String,
    #[schemars(with = "f64")]
    pub price_at_registration: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Registration {
    pub id: RegistrationId,
    pub user_id: UserId,
    pub full_name: String,
    pub email: String,
    #[serde(default)]
    pub position: Option<String>,
    #[serde(default)]
    pub is_abe_member: bool,
    /// Participant category at the time of registration
    #[serde(rename = "registration_category_snapshot")]
    pub category: ParticipantCategory,
    #[serde(default)]
    pub participation_format: ParticipationFormat,
    #[serde(default)]
    pub events: Vec<RegisteredEvent>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl Registration {
    pub fn event_codes(&self) -> Vec<String> {
        self.events.iter().map(|e| e.event_code.clone()).collect()
    }

    pub fn has_event(&self, code: &str) -> bool {
        self.events.iter().any(|e| e.event_code == code)
    }

    /// Sum of the prices charged when each event was added
    pub fn total_at_registration(&self) -> Decimal {
        self.events.iter().map(|e| e.price_at_registration).sum()
    }

    /// Overall payment state across the registration's payments.
    pub fn payment_status(&self, payments: &[Payment]) -> RegistrationStatus {
        if payments.is_empty() {
            return if self.total_at_registration().is_zero() {
                RegistrationStatus::Free
            } else {
                RegistrationStatus::PendingPayment
            };
        }
        payments
            .iter()
            .filter(|p| p.status != PaymentStatus::Cancelled)
            .map(|p| RegistrationStatus::from(p.status))
            .min()
            .unwrap_or(RegistrationStatus::Cancelled)
    }
}

/// Consolidated status of a registration, ordered from least to most advanced
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationStatus {
    PendingPayment,
    PendingProofApproval,
    InvoiceSent,
    Paid,
    Free,
    Cancelled,
}

impl RegistrationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RegistrationStatus::PendingPayment => "pending_payment",
            RegistrationStatus::PendingProofApproval => "pending_proof_approval",
            RegistrationStatus::InvoiceSent => "invoice_sent",
            RegistrationStatus::Paid => "paid",
            RegistrationStatus::Free => "free",
            RegistrationStatus::Cancelled => "cancelled",
        }
    }
}

impl From<PaymentStatus> for RegistrationStatus {
    fn from(status: PaymentStatus) -> Self {
        match status {
            PaymentStatus::PendingPayment => RegistrationStatus::PendingPayment,
            PaymentStatus::PendingProofApproval => RegistrationStatus::PendingProofApproval,
            PaymentStatus::InvoiceSentInt => RegistrationStatus::InvoiceSent,
            PaymentStatus::PaidBr | PaymentStatus::PaidInt => RegistrationStatus::Paid,
            PaymentStatus::Cancelled => RegistrationStatus::Cancelled,
        }
    }
}

impl fmt::Display for RegistrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a participant submits when registering for the first time
#[derive(Debug, Clone)]
pub struct RegistrationForm {
    pub full_name: String,
    pub email: String,
    pub position: String,
    pub is_abe_member: bool,
    pub event_codes: Vec<String>,
    pub participation_format: ParticipationFormat,
    pub method: PaymentMethod,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegistrationReceipt {
    pub registration: Registration,
    pub payment: Option<Payment>,
    pub fees: FeeBreakdown,
}

/// Create a user's first registration, pricing the selection at `now`.
///
/// Events that could not be priced are left off the registration. A pending
/// payment is opened when anything is owed. Every write happens in one
/// transaction.
pub fn create_registration<S>(
    store: &mut S,
    config: &Config,
    user_id: UserId,
    form: &RegistrationForm,
    now: DateTime<Utc>,
) -> Result<RegistrationReceipt, RegistrationError>
where
    S: Catalog + LedgerWriter + Transactional,
{
    if form.event_codes.is_empty() {
        return Err(Refusal::NoEventsSelected.into());
    }
    if let Some(existing) = store.registration_for_user(user_id) {
        return Err(Refusal::RegistrationExists {
            user_id,
            registration_id: existing.id,
        }
        .into());
    }

    let category = ParticipantCategory::from_position(&form.position, form.is_abe_member);
    let fees = FeeCalculator::new(&*store, config).calculate_fees(
        category,
        &form.event_codes,
        now.date_naive(),
        form.participation_format,
    );
    log::debug!(
        "registration for user {} priced at {} ({} events, {})",
        user_id,
        fees.total_fee,
        fees.details.len(),
        category
    );

    store.transaction(|tx| -> Result<_, RegistrationError> {
        let registration = tx.insert_registration(NewRegistration {
            user_id,
            full_name: form.full_name.clone(),
            email: form.email.clone(),
            position: Some(form.position.clone()),
            is_abe_member: form.is_abe_member,
            category,
            participation_format: form.participation_format,
            created_at: now,
        })?;

        let priced: Vec<_> = fees.details.iter().filter(|l| l.error.is_none()).collect();
        for line in &priced {
            tx.attach_registration_event(registration.id, &line.event_code, line.calculated_price)?;
        }

        let payment = if fees.total_fee > Decimal::ZERO {
            Some(tx.insert_payment(NewPayment {
                user_id,
                registration_id: registration.id,
                method: form.method,
                status: PaymentStatus::PendingPayment,
                total_amount: fees.total_fee,
                lines: priced
                    .iter()
                    .map(|l| PaymentLine {
                        event_code: l.event_code.clone(),
                        individual_price: l.calculated_price,
                    })
                    .collect(),
                created_at: now,
            })?)
        } else {
            log::debug!("registration {} is free, no payment needed", registration.id);
            None
        };

        let registration = tx
            .registration(registration.id)
            .ok_or(StoreError::UnknownRegistration(registration.id))?;
        log::info!(
            "Registration {} created for user {} (total {})",
            registration.id,
            user_id,
            fees.total_fee
        );
        Ok(RegistrationReceipt {
            registration,
            payment,
            fees: fees.clone(),
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::catalog::default_catalogue;
    use crate::core::store::{Database, Ledger};
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn early() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 8, 1, 10, 0, 0).unwrap()
    }

    fn form(position: &str, abe: bool, events: &[&str]) -> RegistrationForm {
        RegistrationForm {
            full_name: "Grace Hopper".to_string(),
            email: "grace@example.org".to_string(),
            position: position.to_string(),
            is_abe_member: abe,
            event_codes: events.iter().map(|e| e.to_string()).collect(),
            participation_format: ParticipationFormat::InPerson,
            method: PaymentMethod::BankTransfer,
        }
    }

    fn store() -> (Database, UserId) {
        let (events, fees) = default_catalogue();
        let mut db = Database::with_catalogue(events, fees);
        let user = db.insert_user("Grace", "grace@example.org").unwrap();
        (db, user.id)
    }

    #[test]
    fn paid_registration_opens_pending_payment() {
        let (mut db, user) = store();
        let receipt = create_registration(
            &mut db,
            &Config::default(),
            user,
            &form("professor", true, &["BCSMIF2025", "RAA2025"]),
            early(),
        )
        .unwrap();

        assert_eq!(receipt.registration.category, ParticipantCategory::ProfessorAbe);
        assert_eq!(receipt.fees.total_fee, dec!(1300.00));
        let payment = receipt.payment.unwrap();
        assert_eq!(payment.status, PaymentStatus::PendingPayment);
        assert_eq!(payment.total_amount, dec!(1300.00));
        assert_eq!(payment.events.len(), 2);
        assert_eq!(receipt.registration.total_at_registration(), dec!(1300.00));
        assert_eq!(
            receipt.registration.payment_status(&db.payments_for_registration(receipt.registration.id)),
            RegistrationStatus::PendingPayment
        );
    }

    #[test]
    fn free_registration_has_no_payment() {
        let (mut db, user) = store();
        let receipt = create_registration(
            &mut db,
            &Config::default(),
            user,
            &form("undergraduate_student", false, &["BCSMIF2025"]),
            early(),
        )
        .unwrap();
        assert!(receipt.payment.is_none());
        assert!(db.payments.is_empty());
        assert_eq!(receipt.registration.payment_status(&[]), RegistrationStatus::Free);
    }

    #[test]
    fn unknown_events_are_left_off() {
        let (mut db, user) = store();
        let receipt = create_registration(
            &mut db,
            &Config::default(),
            user,
            &form("graduate_student", false, &["BCSMIF2025", "GHOST"]),
            early(),
        )
        .unwrap();
        assert_eq!(receipt.registration.event_codes(), vec!["BCSMIF2025"]);
        assert_eq!(receipt.payment.unwrap().events.len(), 1);
    }

    #[test]
    fn second_registration_is_refused() {
        let (mut db, user) = store();
        let f = form("graduate_student", false, &["BCSMIF2025"]);
        create_registration(&mut db, &Config::default(), user, &f, early()).unwrap();
        let before = db.clone();
        let err = create_registration(&mut db, &Config::default(), user, &f, early()).unwrap_err();
        assert!(matches!(
            err,
            RegistrationError::Refused(Refusal::RegistrationExists { .. })
        ));
        assert_eq!(db, before);
    }

    #[test]
    fn empty_selection_is_refused() {
        let (mut db, user) = store();
        let err = create_registration(
            &mut db,
            &Config::default(),
            user,
            &form("graduate_student", false, &[]),
            early(),
        )
        .unwrap_err();
        assert!(matches!(err, RegistrationError::Refused(Refusal::NoEventsSelected)));
    }

    #[test]
    fn consolidated_status_follows_least_advanced_payment() {
        let (mut db, user) = store();
        let receipt = create_registration(
            &mut db,
            &Config::default(),
            user,
            &form("graduate_student", false, &["BCSMIF2025"]),
            early(),
        )
        .unwrap();
        let mut paid = receipt.payment.clone().unwrap();
        paid.status = PaymentStatus::PaidBr;
        let mut review = paid.clone();
        review.status = PaymentStatus::PendingProofApproval;
        let mut cancelled = paid.clone();
        cancelled.status = PaymentStatus::Cancelled;

        let reg = &receipt.registration;
        assert_eq!(reg.payment_status(&[paid.clone()]), RegistrationStatus::Paid);
        assert_eq!(
            reg.payment_status(&[paid.clone(), review]),
            RegistrationStatus::PendingProofApproval
        );
        assert_eq!(
            reg.payment_status(&[paid, cancelled.clone()]),
            RegistrationStatus::Paid
        );
        assert_eq!(reg.payment_status(&[cancelled]), RegistrationStatus::Cancelled);
        // positive total but no payment at all: orphaned, still owes
        assert_eq!(reg.payment_status(&[]), RegistrationStatus::PendingPayment);
    }
}
