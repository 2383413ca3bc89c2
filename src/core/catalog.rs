use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Read;
use std::str::FromStr;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("unknown participant category: {0}")]
    UnknownCategory(String),
    #[error("unknown participation format: {0}")]
    UnknownFormat(String),
    #[error("unknown registration period: {0}")]
    UnknownPeriod(String),
    #[error("invalid price '{price}' for {event_code}")]
    InvalidPrice { event_code: String, price: String },
}

/// Pricing tier of a participant
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantCategory {
    UndergradStudent,
    GradStudent,
    ProfessorAbe,
    ProfessorNonAbeProfessional,
}

impl ParticipantCategory {
    pub const ALL: [ParticipantCategory; 4] = [
        ParticipantCategory::UndergradStudent,
        ParticipantCategory::GradStudent,
        ParticipantCategory::ProfessorAbe,
        ParticipantCategory::ProfessorNonAbeProfessional,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ParticipantCategory::UndergradStudent => "undergrad_student",
            ParticipantCategory::GradStudent => "grad_student",
            ParticipantCategory::ProfessorAbe => "professor_abe",
            ParticipantCategory::ProfessorNonAbeProfessional => "professor_non_abe_professional",
        }
    }

    /// Map the position declared on the registration form to a pricing category.
    ///
    /// Professors are split on ABE membership; every other position
    /// (professional, researcher, other, or anything unrecognised) is priced
    /// as a non-member professional.
    pub fn from_position(position: &str, is_abe_member: bool) -> Self {
        match position {
            "undergraduate_student" => ParticipantCategory::UndergradStudent,
            "graduate_student" => ParticipantCategory::GradStudent,
            "professor" if is_abe_member => ParticipantCategory::ProfessorAbe,
            "professor" | "professional" | "researcher" => {
                ParticipantCategory::ProfessorNonAbeProfessional
            }
            other => {
                log::warn!(
                    "unhandled position '{}', defaulting to {}",
                    other,
                    ParticipantCategory::ProfessorNonAbeProfessional
                );
                ParticipantCategory::ProfessorNonAbeProfessional
            }
        }
    }
}

impl fmt::Display for ParticipantCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ParticipantCategory {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ParticipantCategory::ALL
            .into_iter()
            .find(|c| c.as_str() == s.trim())
            .ok_or_else(|| CatalogError::UnknownCategory(s.to_string()))
    }
}

/// Attendance mode, priced separately
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema,
)]
pub enum ParticipationFormat {
    #[default]
    #[serde(rename = "in-person", alias = "in_person")]
    InPerson,
    #[serde(rename = "online")]
    Online,
}

impl ParticipationFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            ParticipationFormat::InPerson => "in-person",
            ParticipationFormat::Online => "online",
        }
    }
}

impl fmt::Display for ParticipationFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ParticipationFormat {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "in-person" | "in_person" => Ok(ParticipationFormat::InPerson),
            "online" => Ok(ParticipationFormat::Online),
            _ => Err(CatalogError::UnknownFormat(s.to_string())),
        }
    }
}

/// Registration pricing window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    Early,
    Late,
}

impl Period {
    /// Early on or before the event's early deadline, late otherwise (or when
    /// the event has no early deadline at all).
    pub fn for_date(deadline_early: Option<NaiveDate>, date: NaiveDate) -> Self {
        match deadline_early {
            Some(deadline) if date <= deadline => Period::Early,
            _ => Period::Late,
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Period::Early => f.write_str("early"),
            Period::Late => f.write_str("late"),
        }
    }
}

impl FromStr for Period {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "early" => Ok(Period::Early),
            "late" => Ok(Period::Late),
            _ => Err(CatalogError::UnknownPeriod(s.to_string())),
        }
    }
}

/// A conference or satellite workshop
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Event {
    /// Unique short code (e.g. BCSMIF2025)
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub location: Option<String>,
    /// Last day of early-bird pricing
    #[serde(default)]
    pub registration_deadline_early: Option<NaiveDate>,
    #[serde(default)]
    pub registration_deadline_late: Option<NaiveDate>,
    #[serde(default)]
    pub is_main_conference: bool,
}

impl Event {
    pub fn period_on(&self, date: NaiveDate) -> Period {
        Period::for_date(self.registration_deadline_early, date)
    }
}

/// Lookup key for a fee row
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FeeKey {
    pub event_code: String,
    pub category: ParticipantCategory,
    pub format: ParticipationFormat,
    pub period: Period,
}

/// Price for one (event, category, format, period) combination
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Fee {
    pub event_code: String,
    pub participant_category: ParticipantCategory,
    pub participation_format: ParticipationFormat,
    pub period: Period,
    #[schemars(with = "f64")]
    pub price: Decimal,
    /// Reduced price only available when the main conference is also attended
    #[serde(default)]
    pub is_discount_for_main_event_participant: bool,
}

impl Fee {
    pub fn matches(&self, key: &FeeKey, discounted: bool) -> bool {
        self.event_code == key.event_code
            && self.participant_category == key.category
            && self.participation_format == key.format
            && self.period == key.period
            && self.is_discount_for_main_event_participant == discounted
    }
}

/// Read-side access to events and their fee table
pub trait Catalog {
    fn find_event(&self, code: &str) -> Option<Event>;
    fn find_fee(&self, key: &FeeKey, discounted: bool) -> Option<Fee>;
    fn list_events(&self) -> Vec<Event>;
}

/// Events and fees of the 8th BCSMIF and its two satellite workshops
pub fn default_catalogue() -> (Vec<Event>, Vec<Fee>) {
    let deadline = NaiveDate::from_ymd_opt(2025, 8, 15);
    let events = vec![
        Event {
            code: "BCSMIF2025".to_string(),
            name: "8th Brazilian Conference on Statistical Modeling in Insurance and Finance"
                .to_string(),
            description: None,
            start_date: NaiveDate::from_ymd_opt(2025, 9, 28),
            end_date: NaiveDate::from_ymd_opt(2025, 10, 3),
            location: Some("Maresias Beach Hotel, Maresias, SP".to_string()),
            registration_deadline_early: deadline,
            registration_deadline_late: None,
            is_main_conference: true,
        },
        Event {
            code: "RAA2025".to_string(),
            name: "Risk Analysis and Applications Workshop".to_string(),
            description: None,
            start_date: NaiveDate::from_ymd_opt(2025, 9, 24),
            end_date: NaiveDate::from_ymd_opt(2025, 9, 25),
            location: Some("IME-USP, São Paulo".to_string()),
            registration_deadline_early: deadline,
            registration_deadline_late: None,
            is_main_conference: false,
        },
        Event {
            code: "WDA2025".to_string(),
            name: "Dependence Analysis Workshop".to_string(),
            description: None,
            start_date: NaiveDate::from_ymd_opt(2025, 9, 26),
            end_date: NaiveDate::from_ymd_opt(2025, 9, 27),
            location: Some("IMECC-UNICAMP, Campinas".to_string()),
            registration_deadline_early: deadline,
            registration_deadline_late: None,
            is_main_conference: false,
        },
    ];

    use ParticipantCategory::*;
    use ParticipationFormat::*;
    use Period::*;

    // (category, format, period, price)
    let main_prices = [
        (UndergradStudent, InPerson, Early, dec!(0.00)),
        (UndergradStudent, InPerson, Late, dec!(0.00)),
        (UndergradStudent, Online, Early, dec!(0.00)),
        (UndergradStudent, Online, Late, dec!(0.00)),
        (GradStudent, InPerson, Early, dec!(600.00)),
        (GradStudent, InPerson, Late, dec!(700.00)),
        (GradStudent, Online, Early, dec!(200.00)),
        (GradStudent, Online, Late, dec!(200.00)),
        (ProfessorAbe, InPerson, Early, dec!(1200.00)),
        (ProfessorAbe, InPerson, Late, dec!(1400.00)),
        (ProfessorAbe, Online, Early, dec!(400.00)),
        (ProfessorAbe, Online, Late, dec!(400.00)),
        (ProfessorNonAbeProfessional, InPerson, Early, dec!(1600.00)),
        (ProfessorNonAbeProfessional, InPerson, Late, dec!(2000.00)),
        (ProfessorNonAbeProfessional, Online, Early, dec!(800.00)),
        (ProfessorNonAbeProfessional, Online, Late, dec!(800.00)),
    ];

    // (category, format, period, discounted price, normal price)
    let workshop_prices = [
        (UndergradStudent, InPerson, Early, dec!(0.00), dec!(0.00)),
        (UndergradStudent, InPerson, Late, dec!(0.00), dec!(0.00)),
        (UndergradStudent, Online, Early, dec!(0.00), dec!(0.00)),
        (UndergradStudent, Online, Late, dec!(0.00), dec!(0.00)),
        (GradStudent, InPerson, Early, dec!(0.00), dec!(0.00)),
        (GradStudent, InPerson, Late, dec!(0.00), dec!(0.00)),
        (GradStudent, Online, Early, dec!(0.00), dec!(0.00)),
        (GradStudent, Online, Late, dec!(0.00), dec!(0.00)),
        (ProfessorAbe, InPerson, Early, dec!(100.00), dec!(250.00)),
        (ProfessorAbe, InPerson, Late, dec!(200.00), dec!(350.00)),
        (ProfessorAbe, Online, Early, dec!(100.00), dec!(150.00)),
        (ProfessorAbe, Online, Late, dec!(100.00), dec!(150.00)),
        (ProfessorNonAbeProfessional, InPerson, Early, dec!(500.00), dec!(700.00)),
        (ProfessorNonAbeProfessional, InPerson, Late, dec!(650.00), dec!(850.00)),
        (ProfessorNonAbeProfessional, Online, Early, dec!(200.00), dec!(350.00)),
        (ProfessorNonAbeProfessional, Online, Late, dec!(200.00), dec!(350.00)),
    ];

    let mut fees: Vec<Fee> = main_prices
        .iter()
        .map(|&(category, format, period, price)| Fee {
            event_code: "BCSMIF2025".to_string(),
            participant_category: category,
            participation_format: format,
            period,
            price,
            is_discount_for_main_event_participant: false,
        })
        .collect();

    for workshop in ["RAA2025", "WDA2025"] {
        for &(category, format, period, discounted, normal) in &workshop_prices {
            for (price, is_discount) in [(discounted, true), (normal, false)] {
                fees.push(Fee {
                    event_code: workshop.to_string(),
                    participant_category: category,
                    participation_format: format,
                    period,
                    price,
                    is_discount_for_main_event_participant: is_discount,
                });
            }
        }
    }

    (events, fees)
}

#[derive(Debug, Deserialize)]
struct FeeRecord {
    event_code: String,
    participant_category: String,
    participation_format: String,
    period: String,
    price: String,
    #[serde(default)]
    is_discount_for_main_event_participant: Option<bool>,
}

/// Read events from CSV (header row named after the `Event` fields)
pub fn read_events_csv<R: Read>(reader: R) -> anyhow::Result<Vec<Event>> {
    let mut rdr = csv::Reader::from_reader(reader);
    let events = rdr.deserialize::<Event>().collect::<Result<Vec<_>, _>>()?;
    log::info!("Read {} event records", events.len());
    Ok(events)
}

/// Read fee rows from CSV
pub fn read_fees_csv<R: Read>(reader: R) -> anyhow::Result<Vec<Fee>> {
    let mut rdr = csv::Reader::from_reader(reader);
    let mut fees = Vec::new();
    for record in rdr.deserialize::<FeeRecord>() {
        let record = record?;
        let price = Decimal::from_str(record.price.trim()).map_err(|_| {
            CatalogError::InvalidPrice {
                event_code: record.event_code.clone(),
                price: record.price.clone(),
            }
        })?;
        fees.push(Fee {
            participant_category: record.participant_category.parse()?,
            participation_format: record.participation_format.parse()?,
            period: record.period.parse()?,
            price,
            is_discount_for_main_event_participant: record
                .is_discount_for_main_event_participant
                .unwrap_or(false),
            event_code: record.event_code,
        });
    }
    log::info!("Read {} fee records", fees.len());
    Ok(fees)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn period_is_early_on_the_deadline_itself() {
        let deadline = Some(date(2025, 8, 15));
        assert_eq!(Period::for_date(deadline, date(2025, 8, 15)), Period::Early);
        assert_eq!(Period::for_date(deadline, date(2025, 8, 1)), Period::Early);
        assert_eq!(Period::for_date(deadline, date(2025, 8, 16)), Period::Late);
    }

    #[test]
    fn period_is_late_without_early_deadline() {
        assert_eq!(Period::for_date(None, date(2020, 1, 1)), Period::Late);
    }

    #[test]
    fn position_maps_to_category() {
        assert_eq!(
            ParticipantCategory::from_position("undergraduate_student", false),
            ParticipantCategory::UndergradStudent
        );
        assert_eq!(
            ParticipantCategory::from_position("graduate_student", true),
            ParticipantCategory::GradStudent
        );
        assert_eq!(
            ParticipantCategory::from_position("professor", true),
            ParticipantCategory::ProfessorAbe
        );
        assert_eq!(
            ParticipantCategory::from_position("professor", false),
            ParticipantCategory::ProfessorNonAbeProfessional
        );
        assert_eq!(
            ParticipantCategory::from_position("researcher", true),
            ParticipantCategory::ProfessorNonAbeProfessional
        );
        assert_eq!(
            ParticipantCategory::from_position("astronaut", false),
            ParticipantCategory::ProfessorNonAbeProfessional
        );
    }

    #[test]
    fn parse_formats_and_categories() {
        assert_eq!("in-person".parse(), Ok(ParticipationFormat::InPerson));
        assert_eq!("in_person".parse(), Ok(ParticipationFormat::InPerson));
        assert_eq!("Online".parse(), Ok(ParticipationFormat::Online));
        assert!("hybrid".parse::<ParticipationFormat>().is_err());
        assert_eq!("grad_student".parse(), Ok(ParticipantCategory::GradStudent));
        assert_eq!(
            "nobody".parse::<ParticipantCategory>(),
            Err(CatalogError::UnknownCategory("nobody".to_string()))
        );
    }

    #[test]
    fn default_catalogue_has_discount_rows_only_for_workshops() {
        let (events, fees) = default_catalogue();
        assert_eq!(events.len(), 3);
        assert_eq!(events.iter().filter(|e| e.is_main_conference).count(), 1);
        // 16 main rows + 2 workshops * 16 combinations * 2 variants
        assert_eq!(fees.len(), 16 + 64);
        assert!(fees
            .iter()
            .filter(|f| f.event_code == "BCSMIF2025")
            .all(|f| !f.is_discount_for_main_event_participant));
    }

    #[test]
    fn reads_fee_csv() {
        let data = "\
event_code,participant_category,participation_format,period,price,is_discount_for_main_event_participant
WORKSHOP1,grad_student,in-person,early,50.00,false
WORKSHOP1,grad_student,in-person,early,25.00,true
";
        let fees = read_fees_csv(data.as_bytes()).unwrap();
        assert_eq!(fees.len(), 2);
        assert_eq!(fees[1].price, dec!(25.00));
        assert!(fees[1].is_discount_for_main_event_participant);
        assert_eq!(fees[0].participation_format, ParticipationFormat::InPerson);
    }

    #[test]
    fn rejects_fee_csv_with_bad_price() {
        let data = "\
event_code,participant_category,participation_format,period,price,is_discount_for_main_event_participant
WORKSHOP1,grad_student,online,late,cheap,false
";
        assert!(read_fees_csv(data.as_bytes()).is_err());
    }

    #[test]
    fn reads_event_csv_with_optional_columns() {
        let data = "\
code,name,is_main_conference,registration_deadline_early
MAIN,Main Conference,true,2025-08-15
WORKSHOP1,Workshop One,false,
";
        let events = read_events_csv(data.as_bytes()).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].registration_deadline_early, Some(date(2025, 8, 15)));
        assert_eq!(events[1].registration_deadline_early, None);
        assert!(!events[1].is_main_conference);
    }
}
