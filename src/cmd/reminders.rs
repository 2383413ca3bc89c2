//! Reminders command - pending registrations whose early-bird price ends tomorrow

use super::Context;
use crate::core::early_bird_candidates;
use crate::utils::{format_brl, write_csv};
use chrono::{NaiveDate, Utc};
use clap::Args;
use std::io;
use tabled::{settings::Style, Table, Tabled};

#[derive(Args, Debug)]
pub struct RemindersCommand {
    /// Reference day (YYYY-MM-DD), defaults to today
    #[arg(short, long)]
    date: Option<NaiveDate>,

    /// Output as CSV instead of formatted table
    #[arg(long)]
    csv: bool,
}

#[derive(Debug, Tabled, serde::Serialize)]
struct ReminderRow {
    #[tabled(rename = "#")]
    registration_id: u64,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Email")]
    email: String,
    #[tabled(rename = "Event")]
    event: String,
    #[tabled(rename = "Deadline")]
    deadline: NaiveDate,
    #[tabled(rename = "Payment")]
    reference: String,
    #[tabled(rename = "Amount")]
    amount: String,
}

impl RemindersCommand {
    pub fn exec(&self, ctx: &Context) -> anyhow::Result<()> {
        let db = ctx.open_store()?;
        let today = self.date.unwrap_or_else(|| Utc::now().date_naive());
        let rows: Vec<ReminderRow> = early_bird_candidates(&db, today)
            .into_iter()
            .map(|r| ReminderRow {
                registration_id: r.registration_id,
                name: r.full_name,
                email: r.email,
                event: r.event_code,
                deadline: r.deadline,
                reference: r.payment_reference,
                amount: format_brl(r.amount),
            })
            .collect();

        if self.csv {
            return write_csv(rows, io::stdout());
        }
        if rows.is_empty() {
            println!("No early-bird reminders due after {}", today);
            return Ok(());
        }
        println!("{}", Table::new(rows).with(Style::rounded()));
        Ok(())
    }
}
