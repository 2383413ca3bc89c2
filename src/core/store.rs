//! Persistence seam: repository traits plus a JSON-file backed database.

use super::catalog::{Catalog, Event, Fee, FeeKey};
use super::payment::{
    generate_reference, Payment, PaymentId, PaymentLine, PaymentMethod, PaymentStatus, UserId,
};
use super::registration::{RegisteredEvent, Registration, RegistrationId};
use super::ParticipantCategory;
use super::ParticipationFormat;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("unknown event: {0}")]
    UnknownEvent(String),
    #[error("unknown user: {0}")]
    UnknownUser(UserId),
    #[error("unknown registration: {0}")]
    UnknownRegistration(RegistrationId),
    #[error("unknown payment: {0}")]
    UnknownPayment(PaymentId),
    #[error("user {user_id} already has registration {registration_id}")]
    DuplicateRegistration {
        user_id: UserId,
        registration_id: RegistrationId,
    },
    #[error("a user with email {0} already exists")]
    DuplicateEmail(String),
    #[error("store file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("store file {path} is not valid: {source}")]
    Format {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: String,
}

/// Fields of a registration before the store assigns its id
#[derive(Debug, Clone)]
pub struct NewRegistration {
    pub user_id: UserId,
    pub full_name: String,
    pub email: String,
    pub position: Option<String>,
    pub is_abe_member: bool,
    pub category: ParticipantCategory,
    pub participation_format: ParticipationFormat,
    pub created_at: DateTime<Utc>,
}

/// Fields of a payment before the store assigns its id and reference
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub user_id: UserId,
    pub registration_id: RegistrationId,
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    pub total_amount: Decimal,
    pub lines: Vec<PaymentLine>,
    pub created_at: DateTime<Utc>,
}

/// Read-side access to users, registrations and payments
pub trait Ledger {
    fn user(&self, id: UserId) -> Option<User>;
    fn user_by_email(&self, email: &str) -> Option<User>;
    fn registration(&self, id: RegistrationId) -> Option<Registration>;
    fn registration_for_user(&self, user_id: UserId) -> Option<Registration>;
    fn registrations(&self) -> Vec<Registration>;
    fn payment(&self, id: PaymentId) -> Option<Payment>;
    fn payments_for_user(&self, user_id: UserId) -> Vec<Payment>;
    fn payments_for_registration(&self, registration_id: RegistrationId) -> Vec<Payment>;

    fn paid_payments_for_user(&self, user_id: UserId) -> Vec<Payment> {
        self.payments_for_user(user_id)
            .into_iter()
            .filter(Payment::is_paid)
            .collect()
    }

    /// Codes of every event covered by one of the user's paid payments.
    fn paid_event_codes(&self, user_id: UserId) -> BTreeSet<String> {
        self.paid_payments_for_user(user_id)
            .iter()
            .flat_map(Payment::immutable_event_codes)
            .collect()
    }
}

/// Write-side access; every call may fail and abort the surrounding transaction
pub trait LedgerWriter: Ledger {
    fn insert_user(&mut self, name: &str, email: &str) -> Result<User, StoreError>;
    fn insert_registration(&mut self, new: NewRegistration) -> Result<Registration, StoreError>;
    /// Attach an event with the price charged. Already attached events keep
    /// their original price.
    fn attach_registration_event(
        &mut self,
        registration_id: RegistrationId,
        event_code: &str,
        price: Decimal,
    ) -> Result<(), StoreError>;
    fn insert_payment(&mut self, new: NewPayment) -> Result<Payment, StoreError>;
    fn update_payment(&mut self, payment: Payment) -> Result<(), StoreError>;
}

/// All-or-nothing execution of a unit of work
pub trait Transactional {
    fn transaction<T, E, F>(&mut self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut Self) -> Result<T, E>;
}

/// The whole store, persisted as one JSON document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Database {
    #[serde(default)]
    pub users: Vec<User>,
    #[serde(default)]
    pub events: Vec<Event>,
    #[serde(default)]
    pub fees: Vec<Fee>,
    #[serde(default)]
    pub registrations: Vec<Registration>,
    #[serde(default)]
    pub payments: Vec<Payment>,
}

impl Database {
    pub fn with_catalogue(events: Vec<Event>, fees: Vec<Fee>) -> Self {
        Database {
            events,
            fees,
            ..Default::default()
        }
    }

    pub fn load(path: &Path) -> Result<Self, StoreError> {
        let display = path.display().to_string();
        let file = File::open(path).map_err(|source| StoreError::Io {
            path: display.clone(),
            source,
        })?;
        let db: Database = serde_json::from_reader(BufReader::new(file))
            .map_err(|source| StoreError::Format {
                path: display,
                source,
            })?;
        log::debug!(
            "Loaded store: {} events, {} fees, {} registrations, {} payments",
            db.events.len(),
            db.fees.len(),
            db.registrations.len(),
            db.payments.len()
        );
        Ok(db)
    }

    /// Write to a sibling temp file first so a failed write never truncates the store.
    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        let display = path.display().to_string();
        let tmp = path.with_extension("json.tmp");
        let file = File::create(&tmp).map_err(|source| StoreError::Io {
            path: display.clone(),
            source,
        })?;
        let file = self.write_json(file, &display)?;
        file.sync_all().map_err(|source| StoreError::Io {
            path: display.clone(),
            source,
        })?;
        fs::rename(&tmp, path).map_err(|source| StoreError::Io {
            path: display.clone(),
            source,
        })?;
        log::debug!("Saved store to {}", display);
        Ok(())
    }

    /// Serialize into `inner` and flush, handing the writer back only once
    /// every byte has reached it.
    fn write_json<W: Write>(&self, inner: W, display: &str) -> Result<W, StoreError> {
        let mut writer = BufWriter::new(inner);
        serde_json::to_writer_pretty(&mut writer, self).map_err(|source| StoreError::Format {
            path: display.to_string(),
            source,
        })?;
        writer.flush().map_err(|source| StoreError::Io {
            path: display.to_string(),
            source,
        })?;
        writer.into_inner().map_err(|err| StoreError::Io {
            path: display.to_string(),
            source: err.into_error(),
        })
    }

    fn registration_mut(&mut self, id: RegistrationId) -> Result<&mut Registration, StoreError> {
        self.registrations
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(StoreError::UnknownRegistration(id))
    }

    fn ensure_event(&self, code: &str) -> Result<(), StoreError> {
        if self.events.iter().any(|e| e.code == code) {
            Ok(())
        } else {
            Err(StoreError::UnknownEvent(code.to_string()))
        }
    }
}

impl Catalog for Database {
    fn find_event(&self, code: &str) -> Option<Event> {
        self.events.iter().find(|e| e.code == code).cloned()
    }

    fn find_fee(&self, key: &FeeKey, discounted: bool) -> Option<Fee> {
        self.fees.iter().find(|f| f.matches(key, discounted)).cloned()
    }

    fn list_events(&self) -> Vec<Event> {
        self.events.clone()
    }
}

impl Ledger for Database {
    fn user(&self, id: UserId) -> Option<User> {
        self.users.iter().find(|u| u.id == id).cloned()
    }

    fn user_by_email(&self, email: &str) -> Option<User> {
        self.users
            .iter()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned()
    }

    fn registration(&self, id: RegistrationId) -> Option<Registration> {
        self.registrations.iter().find(|r| r.id == id).cloned()
    }

    fn registration_for_user(&self, user_id: UserId) -> Option<Registration> {
        self.registrations
            .iter()
            .find(|r| r.user_id == user_id)
            .cloned()
    }

    fn registrations(&self) -> Vec<Registration> {
        self.registrations.clone()
    }

    fn payment(&self, id: PaymentId) -> Option<Payment> {
        self.payments.iter().find(|p| p.id == id).cloned()
    }

    fn payments_for_user(&self, user_id: UserId) -> Vec<Payment> {
        self.payments
            .iter()
            .filter(|p| p.user_id == user_id)
            .cloned()
            .collect()
    }

    fn payments_for_registration(&self, registration_id: RegistrationId) -> Vec<Payment> {
        self.payments
            .iter()
            .filter(|p| p.registration_id == registration_id)
            .cloned()
            .collect()
    }
}

impl LedgerWriter for Database {
    fn insert_user(&mut self, name: &str, email: &str) -> Result<User, StoreError> {
        if self.user_by_email(email).is_some() {
            return Err(StoreError::DuplicateEmail(email.to_string()));
        }
        let user = User {
            id: self.users.iter().map(|u| u.id).max().unwrap_or(0) + 1,
            name: name.to_string(),
            email: email.to_string(),
        };
        self.users.push(user.clone());
        Ok(user)
    }

    fn insert_registration(&mut self, new: NewRegistration) -> Result<Registration, StoreError> {
        if self.user(new.user_id).is_none() {
            return Err(StoreError::UnknownUser(new.user_id));
        }
        if let Some(existing) = self.registration_for_user(new.user_id) {
            return Err(StoreError::DuplicateRegistration {
                user_id: new.user_id,
                registration_id: existing.id,
            });
        }
        let registration = Registration {
            id: self.registrations.iter().map(|r| r.id).max().unwrap_or(0) + 1,
            user_id: new.user_id,
            full_name: new.full_name,
            email: new.email,
            position: new.position,
            is_abe_member: new.is_abe_member,
            category: new.category,
            participation_format: new.participation_format,
            events: Vec::new(),
            created_at: new.created_at,
            notes: None,
        };
        self.registrations.push(registration.clone());
        Ok(registration)
    }

    fn attach_registration_event(
        &mut self,
        registration_id: RegistrationId,
        event_code: &str,
        price: Decimal,
    ) -> Result<(), StoreError> {
        self.ensure_event(event_code)?;
        let registration = self.registration_mut(registration_id)?;
        if registration.has_event(event_code) {
            log::debug!(
                "registration {} already holds {}, keeping original price",
                registration_id,
                event_code
            );
            return Ok(());
        }
        registration.events.push(RegisteredEvent {
            event_code: event_code.to_string(),
            price_at_registration: price,
        });
        Ok(())
    }

    fn insert_payment(&mut self, new: NewPayment) -> Result<Payment, StoreError> {
        if self.user(new.user_id).is_none() {
            return Err(StoreError::UnknownUser(new.user_id));
        }
        self.registration_mut(new.registration_id)?;
        for line in &new.lines {
            self.ensure_event(&line.event_code)?;
        }
        let id = self.payments.iter().map(|p| p.id).max().unwrap_or(0) + 1;
        let payment = Payment {
            id,
            user_id: new.user_id,
            registration_id: new.registration_id,
            reference: generate_reference(id, new.user_id, new.created_at),
            method: new.method,
            status: new.status,
            total_amount: new.total_amount,
            events: new.lines,
            proof_reference: None,
            proof_uploaded_at: None,
            invoice_sent_at: None,
            notes: None,
            created_at: new.created_at,
        };
        self.payments.push(payment.clone());
        Ok(payment)
    }

    fn update_payment(&mut self, payment: Payment) -> Result<(), StoreError> {
        let slot = self
            .payments
            .iter_mut()
            .find(|p| p.id == payment.id)
            .ok_or(StoreError::UnknownPayment(payment.id))?;
        *slot = payment;
        Ok(())
    }
}

impl Transactional for Database {
    fn transaction<T, E, F>(&mut self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut Self) -> Result<T, E>,
    {
        let snapshot = self.clone();
        let result = f(self);
        if result.is_err() {
            *self = snapshot;
            log::debug!("transaction rolled back");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::catalog::default_catalogue;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 7, 1, 12, 0, 0).unwrap()
    }

    fn seeded() -> (Database, User, Registration) {
        let (events, fees) = default_catalogue();
        let mut db = Database::with_catalogue(events, fees);
        let user = db.insert_user("Ada", "ada@example.org").unwrap();
        let registration = db
            .insert_registration(NewRegistration {
                user_id: user.id,
                full_name: "Ada Lovelace".to_string(),
                email: user.email.clone(),
                position: Some("graduate_student".to_string()),
                is_abe_member: false,
                category: ParticipantCategory::GradStudent,
                participation_format: ParticipationFormat::InPerson,
                created_at: now(),
            })
            .unwrap();
        (db, user, registration)
    }

    #[test]
    fn one_registration_per_user() {
        let (mut db, user, registration) = seeded();
        let err = db
            .insert_registration(NewRegistration {
                user_id: user.id,
                full_name: "Ada again".to_string(),
                email: user.email.clone(),
                position: None,
                is_abe_member: false,
                category: ParticipantCategory::GradStudent,
                participation_format: ParticipationFormat::Online,
                created_at: now(),
            })
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::DuplicateRegistration { registration_id, .. } if registration_id == registration.id
        ));
    }

    #[test]
    fn attach_keeps_existing_price() {
        let (mut db, _, registration) = seeded();
        db.attach_registration_event(registration.id, "BCSMIF2025", dec!(600))
            .unwrap();
        db.attach_registration_event(registration.id, "BCSMIF2025", dec!(1))
            .unwrap();
        let stored = db.registration(registration.id).unwrap();
        assert_eq!(stored.events.len(), 1);
        assert_eq!(stored.events[0].price_at_registration, dec!(600));
    }

    #[test]
    fn attach_unknown_event_fails() {
        let (mut db, _, registration) = seeded();
        assert!(matches!(
            db.attach_registration_event(registration.id, "NOPE", dec!(1)),
            Err(StoreError::UnknownEvent(code)) if code == "NOPE"
        ));
    }

    #[test]
    fn paid_event_codes_ignore_pending_payments() {
        let (mut db, user, registration) = seeded();
        for (status, code) in [
            (PaymentStatus::PaidBr, "BCSMIF2025"),
            (PaymentStatus::PendingPayment, "RAA2025"),
        ] {
            db.insert_payment(NewPayment {
                user_id: user.id,
                registration_id: registration.id,
                method: PaymentMethod::BankTransfer,
                status,
                total_amount: dec!(100),
                lines: vec![PaymentLine {
                    event_code: code.to_string(),
                    individual_price: dec!(100),
                }],
                created_at: now(),
            })
            .unwrap();
        }
        let paid = db.paid_event_codes(user.id);
        assert_eq!(paid.into_iter().collect::<Vec<_>>(), vec!["BCSMIF2025"]);
    }

    #[test]
    fn failed_transaction_restores_snapshot() {
        let (mut db, user, registration) = seeded();
        let before = db.clone();
        let result: Result<(), StoreError> = db.transaction(|tx| {
            tx.insert_payment(NewPayment {
                user_id: user.id,
                registration_id: registration.id,
                method: PaymentMethod::BankTransfer,
                status: PaymentStatus::PendingPayment,
                total_amount: dec!(10),
                lines: Vec::new(),
                created_at: now(),
            })?;
            tx.attach_registration_event(registration.id, "MISSING", dec!(10))
        });
        assert!(result.is_err());
        assert_eq!(db, before);
    }

    /// Accepts nothing; every write and flush fails as on a full disk
    #[derive(Debug)]
    struct FullDisk;

    impl Write for FullDisk {
        fn write(&mut self, _: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::other("no space left on device"))
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Err(std::io::Error::other("no space left on device"))
        }
    }

    #[test]
    fn failed_flush_is_reported() {
        let mut db = Database::default();
        db.insert_user("Ada", "ada@example.org").unwrap();
        // small enough to sit in the buffer until the final flush
        let err = db.write_json(FullDisk, "full.json").unwrap_err();
        assert!(matches!(err, StoreError::Io { ref path, .. } if path == "full.json"));
    }

    #[test]
    fn save_and_load_round_trip() {
        let (db, _, _) = seeded();
        let path = std::env::temp_dir().join(format!("confreg-store-{}.json", std::process::id()));
        db.save(&path).unwrap();
        let loaded = Database::load(&path).unwrap();
        fs::remove_file(&path).unwrap();
        assert_eq!(loaded, db);
    }
}
