//! Schema command - print the store format and the catalogue import columns

use crate::core::Database;
use clap::Args;
use schemars::schema_for;

#[derive(Args, Debug)]
pub struct SchemaCommand {
    /// Output format
    #[arg(value_enum, default_value = "json-schema")]
    format: SchemaFormat,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum SchemaFormat {
    /// JSON Schema for the store file
    JsonSchema,
    /// CSV header row for event imports
    EventsCsv,
    /// CSV header row for fee imports
    FeesCsv,
    /// Column descriptions for both imports
    CsvFields,
}

impl SchemaCommand {
    pub fn exec(&self) -> anyhow::Result<()> {
        match self.format {
            SchemaFormat::JsonSchema => {
                let schema = schema_for!(Database);
                println!("{}", serde_json::to_string_pretty(&schema)?);
            }
            SchemaFormat::EventsCsv => println!("{}", column_names(EVENT_FIELDS)),
            SchemaFormat::FeesCsv => println!("{}", column_names(FEE_FIELDS)),
            SchemaFormat::CsvFields => {
                for (title, fields) in [("Events CSV", EVENT_FIELDS), ("Fees CSV", FEE_FIELDS)] {
                    println!("{}", title);
                    println!("{}", "=".repeat(title.len()));
                    for (name, required, description) in fields {
                        let req = if *required { "required" } else { "optional" };
                        println!("{:40} ({:8})  {}", name, req, description);
                    }
                    println!();
                }
            }
        }
        Ok(())
    }
}

fn column_names(fields: &[(&str, bool, &str)]) -> String {
    fields
        .iter()
        .map(|(name, _, _)| *name)
        .collect::<Vec<_>>()
        .join(",")
}

const EVENT_FIELDS: &[(&str, bool, &str)] = &[
    ("code", true, "Unique event code (e.g. BCSMIF2025)"),
    ("name", true, "Display name"),
    ("description", false, "Free text"),
    ("start_date", false, "YYYY-MM-DD"),
    ("end_date", false, "YYYY-MM-DD"),
    ("location", false, "Venue"),
    (
        "registration_deadline_early",
        false,
        "Last day of early-bird pricing (YYYY-MM-DD); empty means always late",
    ),
    ("registration_deadline_late", false, "YYYY-MM-DD"),
    ("is_main_conference", true, "true for the single main conference"),
];

const FEE_FIELDS: &[(&str, bool, &str)] = &[
    ("event_code", true, "Event this price applies to"),
    (
        "participant_category",
        true,
        "undergrad_student, grad_student, professor_abe, professor_non_abe_professional",
    ),
    ("participation_format", true, "in-person or online"),
    ("period", true, "early or late"),
    ("price", true, "Decimal amount in BRL"),
    (
        "is_discount_for_main_event_participant",
        false,
        "true for the reduced workshop price when attending the main conference",
    ),
];
