//! Fix-orphans command - registrations that owe money but have no payment

use super::Context;
use crate::core::fix_orphaned_payments;
use crate::utils::format_brl;
use chrono::Utc;
use clap::Args;

#[derive(Args, Debug)]
pub struct FixOrphansCommand {}

impl FixOrphansCommand {
    pub fn exec(&self, ctx: &Context) -> anyhow::Result<()> {
        let mut db = ctx.open_store()?;
        let report = fix_orphaned_payments(&mut db, Utc::now());
        if !report.created.is_empty() {
            ctx.save_store(&db)?;
        }

        for payment in &report.created {
            println!(
                "Registration {}: created payment {} ({}) for {}",
                payment.registration_id,
                payment.id,
                payment.reference,
                format_brl(payment.total_amount)
            );
        }
        println!(
            "{} created, {} skipped with zero total, {} failed",
            report.created.len(),
            report.skipped.len(),
            report.failed.len()
        );
        if !report.failed.is_empty() {
            anyhow::bail!(
                "Could not fix registrations {:?}",
                report.failed.iter().map(|(id, _)| *id).collect::<Vec<_>>()
            );
        }
        Ok(())
    }
}
