//! Show command - one registration with its events, payments and balance

use super::Context;
use crate::core::{Catalog, Ledger, RegistrationId, RegistrationOverview};
use crate::utils::format_brl;
use clap::Args;
use tabled::{settings::Style, Table, Tabled};

#[derive(Args, Debug)]
pub struct ShowCommand {
    #[arg(short, long)]
    registration: RegistrationId,

    /// Output as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Tabled)]
struct EventRow {
    #[tabled(rename = "Event")]
    code: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Price at registration")]
    price: String,
}

#[derive(Debug, Tabled)]
struct PaymentRow {
    #[tabled(rename = "#")]
    id: u64,
    #[tabled(rename = "Reference")]
    reference: String,
    #[tabled(rename = "Method")]
    method: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Amount")]
    amount: String,
    #[tabled(rename = "Events")]
    events: String,
}

impl ShowCommand {
    pub fn exec(&self, ctx: &Context) -> anyhow::Result<()> {
        let db = ctx.open_store()?;
        let Some(registration) = db.registration(self.registration) else {
            anyhow::bail!("Registration {} not found", self.registration);
        };
        let overview = RegistrationOverview::build(&db, &ctx.config, registration);

        if self.json {
            println!("{}", serde_json::to_string_pretty(&overview)?);
            return Ok(());
        }

        let reg = &overview.registration;
        println!("Registration {} - {} <{}>", reg.id, reg.full_name, reg.email);
        println!(
            "Category: {}  Format: {}  Created: {}",
            reg.category,
            reg.participation_format,
            reg.created_at.format("%Y-%m-%d %H:%M:%S")
        );
        println!("Status: {}", overview.status);

        let events: Vec<EventRow> = reg
            .events
            .iter()
            .map(|e| EventRow {
                code: e.event_code.clone(),
                name: db
                    .find_event(&e.event_code)
                    .map(|ev| ev.name)
                    .unwrap_or_default(),
                price: format_brl(e.price_at_registration),
            })
            .collect();
        println!("{}", Table::new(events).with(Style::rounded()));

        if overview.payments.is_empty() {
            println!("No payments");
        } else {
            let payments: Vec<PaymentRow> = overview
                .payments
                .iter()
                .map(|p| PaymentRow {
                    id: p.id,
                    reference: p.reference.clone(),
                    method: p.method.to_string(),
                    status: p.status.to_string(),
                    amount: format_brl(p.total_amount),
                    events: p
                        .events
                        .iter()
                        .map(|l| l.event_code.as_str())
                        .collect::<Vec<_>>()
                        .join(" "),
                })
                .collect();
            println!("{}", Table::new(payments).with(Style::rounded()));
        }

        println!("Total fee:  {}", format_brl(overview.current_total));
        println!("Total paid: {}", format_brl(overview.total_paid));
        println!("Amount due: {}", format_brl(overview.amount_due));
        Ok(())
    }
}
