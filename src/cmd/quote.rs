//! Quote command - price a selection of events

use super::Context;
use crate::core::{
    FeeCalculator, FeeLine, Ledger, ParticipantCategory, ParticipationFormat, RegistrationId,
};
use crate::utils::format_brl;
use chrono::{NaiveDate, Utc};
use clap::Args;
use tabled::{
    settings::{object::Columns, Alignment, Modify, Style},
    Table, Tabled,
};

#[derive(Args, Debug)]
pub struct QuoteCommand {
    /// Participant category (e.g. grad_student, professor_abe)
    #[arg(short, long)]
    category: Option<ParticipantCategory>,

    /// Event codes to price
    #[arg(short, long, num_args = 1.., value_delimiter = ',', required = true)]
    events: Vec<String>,

    /// Pricing date (YYYY-MM-DD), defaults to today
    #[arg(short, long)]
    date: Option<NaiveDate>,

    /// in-person or online
    #[arg(short, long)]
    format: Option<ParticipationFormat>,

    /// Compare against what an existing registration has already paid
    #[arg(short, long)]
    registration: Option<RegistrationId>,

    /// Output as JSON instead of a table
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Tabled)]
struct QuoteRow {
    #[tabled(rename = "Event")]
    code: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Price")]
    price: String,
    #[tabled(rename = "Note")]
    note: String,
}

impl From<&FeeLine> for QuoteRow {
    fn from(line: &FeeLine) -> Self {
        QuoteRow {
            code: line.event_code.clone(),
            name: line.event_name.clone(),
            price: format_brl(line.calculated_price),
            note: line.error.map(|e| e.to_string()).unwrap_or_default(),
        }
    }
}

impl QuoteCommand {
    pub fn exec(&self, ctx: &Context) -> anyhow::Result<()> {
        let db = ctx.open_store()?;
        let date = self.date.unwrap_or_else(|| Utc::now().date_naive());
        let calculator = FeeCalculator::new(&db, &ctx.config);

        if let Some(id) = self.registration {
            let Some(registration) = db.registration(id) else {
                anyhow::bail!("Registration {} not found", id);
            };
            let category = self.category.unwrap_or(registration.category);
            let format = self.format.unwrap_or(registration.participation_format);
            if category != registration.category {
                log::warn!(
                    "quoting registration {} as {} instead of {}",
                    id,
                    category,
                    registration.category
                );
            }
            let mut registration = registration;
            registration.category = category;
            let payments = db.payments_for_registration(id);
            let quote =
                calculator.quote_for_registration(&registration, &payments, &self.events, date, format);

            if self.json {
                println!("{}", serde_json::to_string_pretty(&quote)?);
            } else {
                print_lines(&quote.fees.details);
                println!("Total:      {}", format_brl(quote.new_total_fee));
                println!("Paid:       {}", format_brl(quote.total_paid));
                println!("Amount due: {}", format_brl(quote.amount_due));
            }
            return Ok(());
        }

        let Some(category) = self.category else {
            anyhow::bail!("--category is required unless --registration is given");
        };
        let format = self
            .format
            .unwrap_or(ctx.config.default_participation_format);
        let fees = calculator.calculate_fees(category, &self.events, date, format);

        if self.json {
            println!("{}", serde_json::to_string_pretty(&fees)?);
        } else {
            println!("{} / {} / {}", category, format, date);
            print_lines(&fees.details);
            println!("Total: {}", format_brl(fees.total_fee));
        }
        Ok(())
    }
}

fn print_lines(lines: &[FeeLine]) {
    let rows: Vec<QuoteRow> = lines.iter().map(QuoteRow::from).collect();
    let table = Table::new(rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(2..3)).with(Alignment::right()))
        .to_string();
    println!("{}", table);
}
