pub mod additional;
pub mod admin;
pub mod catalog;
pub mod config;
pub mod fees;
pub mod payment;
pub mod registration;
pub mod store;

// Flat public surface for domain types and functions.
pub use additional::{
    accessible_events, can_register_for_events, create_additional_registration,
    quote_additional_events, AdditionalEventsQuote, AdditionalEventsRequest,
};
pub use admin::{
    early_bird_candidates, filter_registrations, fix_orphaned_payments, submit_proof,
    update_payment_status, RegistrationFilter, RegistrationOverview,
};
pub use catalog::{
    default_catalogue, read_events_csv, read_fees_csv, Catalog, ParticipantCategory,
    ParticipationFormat,
};
pub use config::Config;
pub use fees::{FeeCalculator, FeeLine};
pub use payment::{PaymentId, PaymentMethod, PaymentStatus, UserId};
pub use registration::{
    create_registration, Refusal, RegistrationError, RegistrationForm, RegistrationId,
    RegistrationStatus,
};
pub use store::{Database, Ledger, LedgerWriter};
