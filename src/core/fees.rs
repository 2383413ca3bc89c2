//! Fee resolution: turns a (category, events, date, format) request into priced lines.

use super::catalog::{Catalog, FeeKey, ParticipantCategory, ParticipationFormat};
use super::config::Config;
use super::payment::Payment;
use super::registration::Registration;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a line could not be priced. The line still appears, at zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FeeLineError {
    EventNotFound,
    FeeConfigNotFound,
}

impl fmt::Display for FeeLineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeeLineError::EventNotFound => f.write_str("Event not found"),
            FeeLineError::FeeConfigNotFound => {
                f.write_str("Fee configuration not found for this combination")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct FeeLine {
    pub event_code: String,
    pub event_name: String,
    #[schemars(with = "f64")]
    pub calculated_price: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<FeeLineError>,
}

impl FeeLine {
    fn failed(event_code: &str, event_name: &str, error: FeeLineError) -> Self {
        FeeLine {
            event_code: event_code.to_string(),
            event_name: event_name.to_string(),
            calculated_price: Decimal::ZERO,
            error: Some(error),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeeBreakdown {
    pub details: Vec<FeeLine>,
    pub total_fee: Decimal,
}

impl FeeBreakdown {
    fn from_lines(details: Vec<FeeLine>) -> Self {
        let total_fee: Decimal = details
            .iter()
            .filter(|l| l.error.is_none())
            .map(|l| l.calculated_price)
            .sum();
        FeeBreakdown { details, total_fee }
    }

    #[cfg(test)]
    pub fn line(&self, event_code: &str) -> Option<&FeeLine> {
        self.details.iter().find(|l| l.event_code == event_code)
    }

    pub fn has_errors(&self) -> bool {
        self.details.iter().any(|l| l.error.is_some())
    }
}

/// Re-pricing of an existing registration against what it has already paid
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegistrationQuote {
    #[serde(flatten)]
    pub fees: FeeBreakdown,
    pub new_total_fee: Decimal,
    /// Sum over the registration's paid payments
    pub total_paid: Decimal,
    /// `new_total_fee - total_paid`; negative when overpaid
    pub amount_due: Decimal,
}

pub struct FeeCalculator<'a, C: ?Sized> {
    catalog: &'a C,
    main_conference_code: &'a str,
}

impl<'a, C: Catalog + ?Sized> FeeCalculator<'a, C> {
    pub fn new(catalog: &'a C, config: &'a Config) -> Self {
        FeeCalculator {
            catalog,
            main_conference_code: &config.main_conference_code,
        }
    }

    /// Price every requested event.
    ///
    /// Missing events and missing fee rows produce zero-priced lines carrying
    /// an error marker; the remaining events are still priced. Workshops are
    /// priced with the main-event discount row when the request includes the
    /// main conference and such a row exists.
    pub fn calculate_fees(
        &self,
        category: ParticipantCategory,
        event_codes: &[String],
        date: NaiveDate,
        format: ParticipationFormat,
    ) -> FeeBreakdown {
        let attends_main = event_codes.iter().any(|c| c == self.main_conference_code);

        let lines = event_codes
            .iter()
            .map(|code| self.price_event(code, category, date, format, attends_main))
            .collect();

        FeeBreakdown::from_lines(lines)
    }

    fn price_event(
        &self,
        code: &str,
        category: ParticipantCategory,
        date: NaiveDate,
        format: ParticipationFormat,
        attends_main: bool,
    ) -> FeeLine {
        let Some(event) = self.catalog.find_event(code) else {
            log::warn!("fee calculation: event {} not found", code);
            return FeeLine::failed(code, code, FeeLineError::EventNotFound);
        };

        let period = event.period_on(date);
        let key = FeeKey {
            event_code: event.code.clone(),
            category,
            format,
            period,
        };

        let discounted = if attends_main && !event.is_main_conference {
            self.catalog.find_fee(&key, true)
        } else {
            None
        };
        if let Some(fee) = &discounted {
            log::debug!(
                "{} priced with main-event discount: {} ({}, {}, {})",
                code,
                fee.price,
                category,
                format,
                period
            );
        }

        match discounted.or_else(|| self.catalog.find_fee(&key, false)) {
            Some(fee) => FeeLine {
                event_code: event.code,
                event_name: event.name,
                calculated_price: fee.price,
                error: None,
            },
            None => {
                log::warn!(
                    "fee calculation: no fee for {} ({}, {}, {})",
                    code,
                    category,
                    format,
                    period
                );
                FeeLine::failed(code, &event.name, FeeLineError::FeeConfigNotFound)
            }
        }
    }

    /// Price `event_codes` for an existing registration and compare with what
    /// its paid payments already cover.
    pub fn quote_for_registration(
        &self,
        registration: &Registration,
        payments: &[Payment],
        event_codes: &[String],
        date: NaiveDate,
        format: ParticipationFormat,
    ) -> RegistrationQuote {
        let fees = self.calculate_fees(registration.category, event_codes, date, format);
        let total_paid: Decimal = payments
            .iter()
            .filter(|p| p.registration_id == registration.id && p.is_paid())
            .map(|p| p.total_amount)
            .sum();
        let new_total_fee = fees.total_fee;
        RegistrationQuote {
            fees,
            new_total_fee,
            total_paid,
            amount_due: new_total_fee - total_paid,
        }
    }

    /// Current price of a registration's events under today's rules, as of
    /// the date it was created. Falls back to the recorded prices when the
    /// registration holds nothing that can be priced.
    pub fn current_total_fee(&self, registration: &Registration) -> Decimal {
        let codes = registration.event_codes();
        let fees = self.calculate_fees(
            registration.category,
            &codes,
            registration.created_at.date_naive(),
            registration.participation_format,
        );
        if codes.is_empty() || fees.details.iter().all(|l| l.error.is_some()) {
            registration.total_at_registration()
        } else {
            fees.total_fee
        }
    }
}
