//! Add-events command - extend a registration, crediting what is already paid

use super::{refuse, report_failure, Context, MethodArg};
use crate::core::{
    create_additional_registration, quote_additional_events, AdditionalEventsQuote,
    AdditionalEventsRequest, Ledger, ParticipantCategory, ParticipationFormat, UserId,
};
use crate::utils::format_brl;
use chrono::Utc;
use clap::Args;
use tabled::{settings::Style, Table, Tabled};

#[derive(Args, Debug)]
pub struct AddEventsCommand {
    /// User whose registration is extended
    #[arg(short, long)]
    user: UserId,

    /// Event codes to add
    #[arg(short, long, num_args = 1.., value_delimiter = ',', required = true)]
    events: Vec<String>,

    /// Pricing category, defaults to the one recorded on the registration
    #[arg(short, long)]
    category: Option<ParticipantCategory>,

    /// in-person or online, defaults to the registration's format
    #[arg(short, long)]
    format: Option<ParticipationFormat>,

    /// Record the events and open the payment instead of only quoting
    #[arg(long)]
    commit: bool,

    #[arg(long, value_enum, default_value_t = MethodArg::BankTransfer)]
    method: MethodArg,

    /// Output as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Tabled)]
struct NewEventRow {
    #[tabled(rename = "Event")]
    code: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Price")]
    price: String,
}

impl AddEventsCommand {
    pub fn exec(&self, ctx: &Context) -> anyhow::Result<()> {
        let mut db = ctx.open_store()?;

        // category and format come from the registration when not given
        let registration = db.registration_for_user(self.user);
        let request = AdditionalEventsRequest {
            user_id: self.user,
            event_codes: self.events.clone(),
            category: self
                .category
                .or(registration.as_ref().map(|r| r.category))
                .unwrap_or(ParticipantCategory::ProfessorNonAbeProfessional),
            format: self
                .format
                .or(registration.as_ref().map(|r| r.participation_format))
                .unwrap_or(ctx.config.default_participation_format),
        };

        if !self.commit {
            let quote = match quote_additional_events(
                &db,
                &ctx.config,
                &request,
                Utc::now().date_naive(),
            ) {
                Ok(quote) => quote,
                Err(refusal) => return refuse(refusal, self.json),
            };
            if self.json {
                println!("{}", serde_json::to_string_pretty(&quote)?);
            } else {
                print_quote(&quote);
            }
            return Ok(());
        }

        let receipt = match create_additional_registration(
            &mut db,
            &ctx.config,
            &request,
            self.method.into(),
            Utc::now(),
        ) {
            Ok(receipt) => receipt,
            Err(err) => return report_failure(err, self.json),
        };
        ctx.save_store(&db)?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&receipt)?);
        } else {
            print_quote(&receipt.quote);
            println!(
                "Payment {} ({}) {}: {}",
                receipt.payment.id,
                receipt.payment.reference,
                receipt.payment.status,
                format_brl(receipt.payment.total_amount)
            );
        }
        Ok(())
    }
}

fn print_quote(quote: &AdditionalEventsQuote) {
    let rows: Vec<NewEventRow> = quote
        .new_events
        .iter()
        .map(|l| NewEventRow {
            code: l.event_code.clone(),
            name: l.event_name.clone(),
            price: match l.error {
                Some(error) => error.to_string(),
                None => format_brl(l.calculated_price),
            },
        })
        .collect();
    println!("{}", Table::new(rows).with(Style::rounded()));
    println!("{}", quote.message());
    println!("New events:         {}", format_brl(quote.total_new_fee));
    println!("Recalculated total: {}", format_brl(quote.recalculated_total));
    println!("Already paid:       {}", format_brl(quote.total_paid));
    println!("Amount owed:        {}", format_brl(quote.amount_owed));
}
