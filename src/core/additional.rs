//! Adding events to an existing registration without re-charging what has been paid.

use super::catalog::{Catalog, ParticipantCategory, ParticipationFormat};
use super::config::Config;
use super::fees::{FeeCalculator, FeeLine};
use super::payment::{Payment, PaymentLine, PaymentMethod, PaymentStatus, UserId};
use super::registration::{Refusal, Registration, RegistrationError, PAID_EVENTS_LOCKED};
use super::store::{Ledger, LedgerWriter, NewPayment, StoreError, Transactional};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};

#[derive(Debug, Clone)]
pub struct AdditionalEventsRequest {
    pub user_id: UserId,
    pub event_codes: Vec<String>,
    pub category: ParticipantCategory,
    pub format: ParticipationFormat,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdditionalEventsQuote {
    /// Priced lines for the events not yet on the registration
    pub new_events: Vec<FeeLine>,
    pub total_new_fee: Decimal,
    /// What still has to be paid once existing payments are credited per event
    pub amount_owed: Decimal,
    /// Price of the whole selection (existing plus new) under current rules
    pub recalculated_total: Decimal,
    pub total_paid: Decimal,
    pub paid_payments: Vec<Payment>,
}

impl AdditionalEventsQuote {
    pub fn requires_payment(&self) -> bool {
        self.amount_owed > Decimal::ZERO
    }

    pub fn message(&self) -> &'static str {
        if self.requires_payment() {
            "Additional payment required for new events"
        } else {
            "Selected events are free"
        }
    }

    pub fn new_event_codes(&self) -> Vec<String> {
        self.new_events.iter().map(|l| l.event_code.clone()).collect()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AdditionalRegistrationReceipt {
    pub registration: Registration,
    pub payment: Payment,
    pub quote: AdditionalEventsQuote,
}

/// Whether a set of events may still be selected by a user
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Eligibility {
    pub can_register: bool,
    pub message: String,
    pub blocked_events: Vec<String>,
}

/// Price the events a user wants to add to their registration.
///
/// Events already covered by a paid payment can never be requested again.
/// The whole selection is re-priced at `today`, so adding the main conference
/// can make existing workshops cheaper; each event's paid amount is credited
/// against its new price, but an overpaid event never offsets another one.
pub fn quote_additional_events<S>(
    store: &S,
    config: &Config,
    request: &AdditionalEventsRequest,
    today: NaiveDate,
) -> Result<AdditionalEventsQuote, Refusal>
where
    S: Catalog + Ledger + ?Sized,
{
    let registration = store
        .registration_for_user(request.user_id)
        .ok_or(Refusal::NoRegistration)?;

    let paid_payments = store.paid_payments_for_user(request.user_id);
    let paid_codes: BTreeSet<String> = paid_payments
        .iter()
        .flat_map(Payment::immutable_event_codes)
        .collect();

    let mut blocked: Vec<String> = Vec::new();
    for code in &request.event_codes {
        if paid_codes.contains(code) && !blocked.contains(code) {
            blocked.push(code.clone());
        }
    }
    if !blocked.is_empty() {
        log::info!(
            "user {} asked for already paid events {:?}",
            request.user_id,
            blocked
        );
        return Err(Refusal::PaidEventsLocked {
            events: blocked,
            paid_payments,
        });
    }

    let existing = registration.event_codes();
    let mut new_codes: Vec<String> = Vec::new();
    for code in &request.event_codes {
        if !existing.contains(code) && !new_codes.contains(code) {
            new_codes.push(code.clone());
        }
    }
    if new_codes.is_empty() {
        return Err(Refusal::AlreadyRegistered { paid_payments });
    }

    let selection: Vec<String> = existing.iter().chain(&new_codes).cloned().collect();
    let fees = FeeCalculator::new(store, config).calculate_fees(
        request.category,
        &selection,
        today,
        request.format,
    );

    let mut paid_by_event: HashMap<&str, Decimal> = HashMap::new();
    for line in paid_payments.iter().flat_map(|p| &p.events) {
        *paid_by_event.entry(line.event_code.as_str()).or_default() += line.individual_price;
    }

    let amount_owed: Decimal = fees
        .details
        .iter()
        .map(|line| {
            let paid = paid_by_event
                .get(line.event_code.as_str())
                .copied()
                .unwrap_or_default();
            (line.calculated_price - paid).max(Decimal::ZERO)
        })
        .sum();

    let new_events: Vec<FeeLine> = fees
        .details
        .iter()
        .filter(|l| new_codes.contains(&l.event_code))
        .cloned()
        .collect();
    let total_new_fee: Decimal = new_events
        .iter()
        .filter(|l| l.error.is_none())
        .map(|l| l.calculated_price)
        .sum();
    let total_paid: Decimal = paid_payments.iter().map(|p| p.total_amount).sum();

    log::debug!(
        "additional events for user {}: new {:?}, recalculated {}, paid {}, owed {}",
        request.user_id,
        new_codes,
        fees.total_fee,
        total_paid,
        amount_owed
    );

    Ok(AdditionalEventsQuote {
        new_events,
        total_new_fee,
        amount_owed,
        recalculated_total: fees.total_fee,
        total_paid,
        paid_payments,
    })
}

/// Quote and record additional events in one transaction.
///
/// An owed amount opens a pending payment for it. Otherwise the new events
/// are recorded under a zero-amount payment that is immediately settled.
/// Events that could not be priced are refused before anything is written.
pub fn create_additional_registration<S>(
    store: &mut S,
    config: &Config,
    request: &AdditionalEventsRequest,
    method: PaymentMethod,
    now: DateTime<Utc>,
) -> Result<AdditionalRegistrationReceipt, RegistrationError>
where
    S: Catalog + LedgerWriter + Transactional,
{
    store.transaction(|tx| -> Result<_, RegistrationError> {
        let quote = quote_additional_events(&*tx, config, request, now.date_naive())?;
        let unpriced: Vec<String> = quote
            .new_events
            .iter()
            .filter(|l| l.error.is_some())
            .map(|l| l.event_code.clone())
            .collect();
        if !unpriced.is_empty() {
            log::info!(
                "user {} asked for events without a fee: {:?}",
                request.user_id,
                unpriced
            );
            return Err(Refusal::UnpricedEvents { events: unpriced }.into());
        }
        let registration = tx
            .registration_for_user(request.user_id)
            .ok_or(Refusal::NoRegistration)?;

        let new_payment = if quote.requires_payment() {
            NewPayment {
                user_id: request.user_id,
                registration_id: registration.id,
                method,
                status: PaymentStatus::PendingPayment,
                total_amount: quote.amount_owed,
                lines: quote
                    .new_events
                    .iter()
                    .map(|l| PaymentLine {
                        event_code: l.event_code.clone(),
                        individual_price: l.calculated_price,
                    })
                    .collect(),
                created_at: now,
            }
        } else {
            NewPayment {
                user_id: request.user_id,
                registration_id: registration.id,
                method: PaymentMethod::None,
                status: PaymentStatus::PaidBr,
                total_amount: Decimal::ZERO,
                lines: quote
                    .new_events
                    .iter()
                    .map(|l| PaymentLine {
                        event_code: l.event_code.clone(),
                        individual_price: Decimal::ZERO,
                    })
                    .collect(),
                created_at: now,
            }
        };
        let payment = tx.insert_payment(new_payment)?;

        for line in &quote.new_events {
            tx.attach_registration_event(registration.id, &line.event_code, line.calculated_price)?;
        }

        let registration = tx
            .registration(registration.id)
            .ok_or(StoreError::UnknownRegistration(registration.id))?;
        log::info!(
            "Registration {} extended with {:?}, payment {} ({}, {})",
            registration.id,
            quote.new_event_codes(),
            payment.id,
            payment.total_amount,
            payment.status
        );
        Ok(AdditionalRegistrationReceipt {
            registration,
            payment,
            quote,
        })
    })
}

/// Distinct events covered by the user's paid payments, keyed by code.
pub fn accessible_events<S>(store: &S, user_id: UserId) -> BTreeMap<String, String>
where
    S: Catalog + Ledger + ?Sized,
{
    store
        .paid_event_codes(user_id)
        .into_iter()
        .map(|code| {
            let name = store
                .find_event(&code)
                .map(|e| e.name)
                .unwrap_or_else(|| code.clone());
            (code, name)
        })
        .collect()
}

pub fn can_register_for_events<S>(store: &S, user_id: UserId, event_codes: &[String]) -> Eligibility
where
    S: Ledger + ?Sized,
{
    let paid = store.paid_event_codes(user_id);
    let mut blocked: Vec<String> = Vec::new();
    for code in event_codes {
        if paid.contains(code) && !blocked.contains(code) {
            blocked.push(code.clone());
        }
    }
    if blocked.is_empty() {
        Eligibility {
            can_register: true,
            message: "Events can be selected".to_string(),
            blocked_events: blocked,
        }
    } else {
        Eligibility {
            can_register: false,
            message: PAID_EVENTS_LOCKED.to_string(),
            blocked_events: blocked,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::catalog::{default_catalogue, Event, Fee, FeeKey, Period};
    use crate::core::payment::PaymentId;
    use crate::core::registration::RegistrationId;
    use crate::core::store::{Database, NewRegistration, User};
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 8, 1, 10, 0, 0).unwrap()
    }

    fn codes(c: &[&str]) -> Vec<String> {
        c.iter().map(|s| s.to_string()).collect()
    }

    fn event(code: &str, main: bool) -> Event {
        Event {
            code: code.to_string(),
            name: code.to_string(),
            description: None,
            start_date: None,
            end_date: None,
            location: None,
            registration_deadline_early: NaiveDate::from_ymd_opt(2025, 8, 15),
            registration_deadline_late: None,
            is_main_conference: main,
        }
    }

    fn fee(code: &str, price: Decimal, discounted: bool) -> Fee {
        Fee {
            event_code: code.to_string(),
            participant_category: ParticipantCategory::GradStudent,
            participation_format: ParticipationFormat::InPerson,
            period: Period::Early,
            price,
            is_discount_for_main_event_participant: discounted,
        }
    }

    /// Grad student who paid 50.00 for WORKSHOP1 alone
    fn paid_workshop() -> (Database, UserId) {
        let mut db = Database::with_catalogue(
            vec![event("BCSMIF2025", true), event("WORKSHOP1", false)],
            vec![
                fee("BCSMIF2025", dec!(100.00), false),
                fee("WORKSHOP1", dec!(50.00), false),
                fee("WORKSHOP1", dec!(25.00), true),
            ],
        );
        let user = db.insert_user("Ada", "ada@example.org").unwrap();
        let registration = db
            .insert_registration(NewRegistration {
                user_id: user.id,
                full_name: "Ada".to_string(),
                email: user.email.clone(),
                position: Some("graduate_student".to_string()),
                is_abe_member: false,
                category: ParticipantCategory::GradStudent,
                participation_format: ParticipationFormat::InPerson,
                created_at: now(),
            })
            .unwrap();
        db.attach_registration_event(registration.id, "WORKSHOP1", dec!(50.00))
            .unwrap();
        db.insert_payment(NewPayment {
            user_id: user.id,
            registration_id: registration.id,
            method: PaymentMethod::BankTransfer,
            status: PaymentStatus::PaidBr,
            total_amount: dec!(50.00),
            lines: vec![PaymentLine {
                event_code: "WORKSHOP1".to_string(),
                individual_price: dec!(50.00),
            }],
            created_at: now(),
        })
        .unwrap();
        (db, user.id)
    }

    fn request(user_id: UserId, events: &[&str]) -> AdditionalEventsRequest {
        AdditionalEventsRequest {
            user_id,
            event_codes: codes(events),
            category: ParticipantCategory::GradStudent,
            format: ParticipationFormat::InPerson,
        }
    }

    #[test]
    fn adding_main_conference_reprices_paid_workshop() {
        let (db, user) = paid_workshop();
        let quote = quote_additional_events(
            &db,
            &Config::default(),
            &request(user, &["BCSMIF2025"]),
            now().date_naive(),
        )
        .unwrap();

        assert_eq!(quote.new_event_codes(), vec!["BCSMIF2025"]);
        assert_eq!(quote.total_new_fee, dec!(100.00));
        assert_eq!(quote.recalculated_total, dec!(125.00));
        assert_eq!(quote.total_paid, dec!(50.00));
        // WORKSHOP1 now costs 25.00 but its 50.00 does not count towards BCSMIF2025
        assert_eq!(quote.amount_owed, dec!(100.00));
        assert_eq!(quote.message(), "Additional payment required for new events");
    }

    #[test]
    fn requesting_paid_event_is_refused_without_writes() {
        let (mut db, user) = paid_workshop();
        let before = db.clone();
        let err = create_additional_registration(
            &mut db,
            &Config::default(),
            &request(user, &["WORKSHOP1", "BCSMIF2025"]),
            PaymentMethod::BankTransfer,
            now(),
        )
        .unwrap_err();

        match err {
            RegistrationError::Refused(refusal) => {
                assert_eq!(refusal.blocked_events(), ["WORKSHOP1".to_string()]);
                assert_eq!(refusal.paid_payments().len(), 1);
                assert_eq!(
                    refusal.to_string(),
                    "Some events are already paid and cannot be modified. Paid events are non-refundable."
                );
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(db, before);
    }

    #[test]
    fn no_registration_is_refused() {
        let (mut db, _) = paid_workshop();
        let stranger = db.insert_user("Bob", "bob@example.org").unwrap();
        assert_eq!(
            quote_additional_events(
                &db,
                &Config::default(),
                &request(stranger.id, &["BCSMIF2025"]),
                now().date_naive(),
            ),
            Err(Refusal::NoRegistration)
        );
    }

    #[test]
    fn already_registered_unpaid_events_are_refused() {
        let (mut db, user) = paid_workshop();
        create_additional_registration(
            &mut db,
            &Config::default(),
            &request(user, &["BCSMIF2025"]),
            PaymentMethod::BankTransfer,
            now(),
        )
        .unwrap();

        let err = quote_additional_events(
            &db,
            &Config::default(),
            &request(user, &["BCSMIF2025", "BCSMIF2025"]),
            now().date_naive(),
        )
        .unwrap_err();
        assert!(matches!(err, Refusal::AlreadyRegistered { ref paid_payments } if paid_payments.len() == 1));
    }

    #[test]
    fn owed_amount_opens_pending_payment() {
        let (mut db, user) = paid_workshop();
        let receipt = create_additional_registration(
            &mut db,
            &Config::default(),
            &request(user, &["BCSMIF2025", "BCSMIF2025"]),
            PaymentMethod::InternationalInvoice,
            now(),
        )
        .unwrap();

        assert_eq!(receipt.payment.status, PaymentStatus::PendingPayment);
        assert_eq!(receipt.payment.method, PaymentMethod::InternationalInvoice);
        assert_eq!(receipt.payment.total_amount, dec!(100.00));
        assert_eq!(receipt.payment.events.len(), 1);
        assert_eq!(receipt.registration.event_codes(), vec!["WORKSHOP1", "BCSMIF2025"]);
        // the paid workshop keeps its original price
        assert_eq!(receipt.registration.events[0].price_at_registration, dec!(50.00));
        assert_eq!(db.payments.len(), 2);
    }

    #[test]
    fn free_additions_are_settled_immediately() {
        let (events, fees) = default_catalogue();
        let mut db = Database::with_catalogue(events, fees);
        let user = db.insert_user("Una", "una@example.org").unwrap();
        let registration = db
            .insert_registration(NewRegistration {
                user_id: user.id,
                full_name: "Una".to_string(),
                email: user.email.clone(),
                position: Some("undergraduate_student".to_string()),
                is_abe_member: false,
                category: ParticipantCategory::UndergradStudent,
                participation_format: ParticipationFormat::InPerson,
                created_at: now(),
            })
            .unwrap();
        db.attach_registration_event(registration.id, "BCSMIF2025", Decimal::ZERO)
            .unwrap();

        let receipt = create_additional_registration(
            &mut db,
            &Config::default(),
            &AdditionalEventsRequest {
                user_id: user.id,
                event_codes: codes(&["RAA2025"]),
                category: ParticipantCategory::UndergradStudent,
                format: ParticipationFormat::InPerson,
            },
            PaymentMethod::BankTransfer,
            now(),
        )
        .unwrap();

        assert_eq!(receipt.quote.message(), "Selected events are free");
        assert_eq!(receipt.payment.method, PaymentMethod::None);
        assert_eq!(receipt.payment.status, PaymentStatus::PaidBr);
        assert_eq!(receipt.payment.total_amount, Decimal::ZERO);
        assert_eq!(receipt.payment.events[0].individual_price, Decimal::ZERO);
        assert!(db.paid_event_codes(user.id).contains("RAA2025"));
    }

    #[test]
    fn event_without_fee_is_refused_without_writes() {
        let (mut db, user) = paid_workshop();
        db.events.push(event("WORKSHOP2", false));
        let before = db.clone();

        // nothing else is owed, so this would otherwise settle WORKSHOP2 for free
        let err = create_additional_registration(
            &mut db,
            &Config::default(),
            &request(user, &["WORKSHOP2"]),
            PaymentMethod::BankTransfer,
            now(),
        )
        .unwrap_err();

        match err {
            RegistrationError::Refused(refusal) => {
                assert_eq!(refusal.blocked_events(), ["WORKSHOP2".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(db, before);
        assert!(!db.paid_event_codes(user).contains("WORKSHOP2"));
    }

    #[test]
    fn unknown_event_is_refused_without_writes() {
        let (mut db, user) = paid_workshop();
        let before = db.clone();
        let err = create_additional_registration(
            &mut db,
            &Config::default(),
            &request(user, &["BCSMIF2025", "GHOST"]),
            PaymentMethod::BankTransfer,
            now(),
        )
        .unwrap_err();

        assert!(matches!(
            err,
            RegistrationError::Refused(Refusal::UnpricedEvents { ref events }) if events == &["GHOST"]
        ));
        assert_eq!(db, before);
    }

    #[test]
    fn eligibility_and_accessible_events() {
        let (db, user) = paid_workshop();
        let blocked = can_register_for_events(&db, user, &codes(&["WORKSHOP1", "BCSMIF2025"]));
        assert!(!blocked.can_register);
        assert_eq!(blocked.blocked_events, vec!["WORKSHOP1"]);
        assert_eq!(
            blocked.message,
            "Some events are already paid and cannot be modified. Paid events are non-refundable."
        );

        let open = can_register_for_events(&db, user, &codes(&["BCSMIF2025"]));
        assert!(open.can_register);
        assert!(open.blocked_events.is_empty());

        let accessible = accessible_events(&db, user);
        assert_eq!(accessible.keys().collect::<Vec<_>>(), vec!["WORKSHOP1"]);
    }

    /// Database whose writes start failing after a fixed number of successes
    struct FlakyStore {
        inner: Database,
        writes_left: usize,
    }

    impl FlakyStore {
        fn write(&mut self) -> Result<(), StoreError> {
            if self.writes_left == 0 {
                return Err(StoreError::Io {
                    path: "flaky".to_string(),
                    source: std::io::Error::other("disk full"),
                });
            }
            self.writes_left -= 1;
            Ok(())
        }
    }

    impl Catalog for FlakyStore {
        fn find_event(&self, code: &str) -> Option<Event> {
            self.inner.find_event(code)
        }
        fn find_fee(&self, key: &FeeKey, discounted: bool) -> Option<Fee> {
            self.inner.find_fee(key, discounted)
        }
        fn list_events(&self) -> Vec<Event> {
            self.inner.list_events()
        }
    }

    impl Ledger for FlakyStore {
        fn user(&self, id: UserId) -> Option<User> {
            self.inner.user(id)
        }
        fn user_by_email(&self, email: &str) -> Option<User> {
            self.inner.user_by_email(email)
        }
        fn registration(&self, id: RegistrationId) -> Option<Registration> {
            self.inner.registration(id)
        }
        fn registration_for_user(&self, user_id: UserId) -> Option<Registration> {
            self.inner.registration_for_user(user_id)
        }
        fn registrations(&self) -> Vec<Registration> {
            self.inner.registrations()
        }
        fn payment(&self, id: PaymentId) -> Option<Payment> {
            self.inner.payment(id)
        }
        fn payments_for_user(&self, user_id: UserId) -> Vec<Payment> {
            self.inner.payments_for_user(user_id)
        }
        fn payments_for_registration(&self, registration_id: RegistrationId) -> Vec<Payment> {
            self.inner.payments_for_registration(registration_id)
        }
    }

    impl LedgerWriter for FlakyStore {
        fn insert_user(&mut self, name: &str, email: &str) -> Result<User, StoreError> {
            self.write()?;
            self.inner.insert_user(name, email)
        }
        fn insert_registration(
            &mut self,
            new: NewRegistration,
        ) -> Result<Registration, StoreError> {
            self.write()?;
            self.inner.insert_registration(new)
        }
        fn attach_registration_event(
            &mut self,
            registration_id: RegistrationId,
            event_code: &str,
            price: Decimal,
        ) -> Result<(), StoreError> {
            self.write()?;
            self.inner
                .attach_registration_event(registration_id, event_code, price)
        }
        fn insert_payment(&mut self, new: NewPayment) -> Result<Payment, StoreError> {
            self.write()?;
            self.inner.insert_payment(new)
        }
        fn update_payment(&mut self, payment: Payment) -> Result<(), StoreError> {
            self.write()?;
            self.inner.update_payment(payment)
        }
    }

    impl Transactional for FlakyStore {
        fn transaction<T, E, F>(&mut self, f: F) -> Result<T, E>
        where
            F: FnOnce(&mut Self) -> Result<T, E>,
        {
            let snapshot = self.inner.clone();
            let result = f(self);
            if result.is_err() {
                self.inner = snapshot;
            }
            result
        }
    }

    #[test]
    fn store_failure_mid_creation_rolls_back() {
        let (db, user) = paid_workshop();
        let before = db.clone();
        // payment insert succeeds, attaching the event fails
        let mut store = FlakyStore {
            inner: db,
            writes_left: 1,
        };
        let err = create_additional_registration(
            &mut store,
            &Config::default(),
            &request(user, &["BCSMIF2025"]),
            PaymentMethod::BankTransfer,
            now(),
        )
        .unwrap_err();
        assert!(matches!(err, RegistrationError::Store(StoreError::Io { .. })));
        assert_eq!(store.inner, before);
    }
}
