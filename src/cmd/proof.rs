//! Proof command - attach a transfer receipt to a pending payment

use super::Context;
use crate::core::{submit_proof, PaymentId, UserId};
use chrono::Utc;
use clap::Args;

#[derive(Args, Debug)]
pub struct ProofCommand {
    #[arg(short, long)]
    user: UserId,

    #[arg(short, long)]
    payment: PaymentId,

    /// Reference of the uploaded receipt (file name or storage key)
    #[arg(long)]
    file: String,
}

impl ProofCommand {
    pub fn exec(&self, ctx: &Context) -> anyhow::Result<()> {
        let mut db = ctx.open_store()?;
        let payment = submit_proof(&mut db, self.user, self.payment, &self.file, Utc::now())?;
        ctx.save_store(&db)?;
        println!(
            "Payment {} ({}) is now {}",
            payment.id, payment.reference, payment.status
        );
        Ok(())
    }
}
