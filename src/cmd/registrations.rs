//! Registrations command - coordinator listing with filters

use super::Context;
use crate::core::{
    filter_registrations, ParticipantCategory, RegistrationFilter, RegistrationOverview,
    RegistrationStatus,
};
use crate::utils::{format_brl, write_csv};
use clap::{Args, ValueEnum};
use rust_decimal::Decimal;
use std::io;
use tabled::{settings::Style, Table, Tabled};

#[derive(Args, Debug)]
pub struct RegistrationsCommand {
    /// Consolidated payment status
    #[arg(short, long, value_enum)]
    status: Option<StatusFilter>,

    /// Only registrations holding this event
    #[arg(short, long)]
    event: Option<String>,

    #[arg(short, long)]
    category: Option<ParticipantCategory>,

    /// Search in name and email
    #[arg(long)]
    search: Option<String>,

    /// Output as CSV instead of formatted table
    #[arg(long)]
    csv: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum StatusFilter {
    PendingPayment,
    PendingProofApproval,
    InvoiceSent,
    Paid,
    Free,
    Cancelled,
}

impl From<StatusFilter> for RegistrationStatus {
    fn from(filter: StatusFilter) -> Self {
        match filter {
            StatusFilter::PendingPayment => RegistrationStatus::PendingPayment,
            StatusFilter::PendingProofApproval => RegistrationStatus::PendingProofApproval,
            StatusFilter::InvoiceSent => RegistrationStatus::InvoiceSent,
            StatusFilter::Paid => RegistrationStatus::Paid,
            StatusFilter::Free => RegistrationStatus::Free,
            StatusFilter::Cancelled => RegistrationStatus::Cancelled,
        }
    }
}

/// Row for the registrations table and CSV output
#[derive(Debug, Clone, Tabled, serde::Serialize)]
pub struct RegistrationRow {
    #[tabled(rename = "#")]
    id: u64,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Email")]
    email: String,
    #[tabled(rename = "Category")]
    category: String,
    #[tabled(rename = "Events")]
    events: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Total")]
    total: String,
    #[tabled(rename = "Paid")]
    paid: String,
    #[tabled(rename = "Created")]
    created: String,
}

impl From<&RegistrationOverview> for RegistrationRow {
    fn from(overview: &RegistrationOverview) -> Self {
        let reg = &overview.registration;
        RegistrationRow {
            id: reg.id,
            name: reg.full_name.clone(),
            email: reg.email.clone(),
            category: reg.category.to_string(),
            events: reg.event_codes().join(" "),
            status: overview.status.to_string(),
            total: format!("{:.2}", overview.current_total),
            paid: format!("{:.2}", overview.total_paid),
            created: reg.created_at.format("%Y-%m-%d %H:%M").to_string(),
        }
    }
}

impl RegistrationsCommand {
    pub fn exec(&self, ctx: &Context) -> anyhow::Result<()> {
        let db = ctx.open_store()?;
        let filter = RegistrationFilter {
            status: self.status.map(Into::into),
            event_code: self.event.clone(),
            category: self.category,
            search: self.search.clone(),
        };
        let overviews = filter_registrations(&db, &ctx.config, &filter);
        let rows: Vec<RegistrationRow> = overviews.iter().map(RegistrationRow::from).collect();

        if self.csv {
            return write_csv(rows, io::stdout());
        }
        if rows.is_empty() {
            println!("No registrations found matching filters");
            return Ok(());
        }

        let total: Decimal = overviews.iter().map(|o| o.total_paid).sum();
        let table = Table::new(rows).with(Style::rounded()).to_string();
        println!("{}", table);
        println!(
            "{} registrations, {} received",
            overviews.len(),
            format_brl(total)
        );
        Ok(())
    }
}
