//! Review command - coordinator status update on a payment

use super::Context;
use crate::core::{update_payment_status, PaymentId, PaymentStatus};
use chrono::Utc;
use clap::Args;

#[derive(Args, Debug)]
pub struct ReviewCommand {
    #[arg(short, long)]
    payment: PaymentId,

    /// New status (pending_payment, pending_proof_approval, invoice_sent_int, paid_br, paid_int, cancelled)
    #[arg(short, long)]
    status: PaymentStatus,

    /// Name recorded in the payment notes
    #[arg(long, default_value = "admin")]
    admin: String,
}

impl ReviewCommand {
    pub fn exec(&self, ctx: &Context) -> anyhow::Result<()> {
        let mut db = ctx.open_store()?;
        let (payment, old) =
            update_payment_status(&mut db, self.payment, self.status, &self.admin, Utc::now())?;
        ctx.save_store(&db)?;
        println!(
            "Payment {} ({}): {} -> {}",
            payment.id, payment.reference, old, payment.status
        );
        Ok(())
    }
}
