//! Register command - first registration of a participant

use super::{report_failure, Context, MethodArg};
use crate::core::{create_registration, Ledger, LedgerWriter, ParticipationFormat, RegistrationForm};
use crate::utils::format_brl;
use chrono::Utc;
use clap::Args;

#[derive(Args, Debug)]
pub struct RegisterCommand {
    /// Full name as it should appear on the badge
    #[arg(long)]
    name: String,

    /// Contact email; identifies the user
    #[arg(long)]
    email: String,

    /// undergraduate_student, graduate_student, professor, professional, researcher or other
    #[arg(long)]
    position: String,

    /// Member of the Brazilian Statistical Association
    #[arg(long)]
    abe_member: bool,

    /// Event codes to register for
    #[arg(short, long, num_args = 1.., value_delimiter = ',', required = true)]
    events: Vec<String>,

    /// in-person or online
    #[arg(short, long)]
    format: Option<ParticipationFormat>,

    #[arg(long, value_enum, default_value_t = MethodArg::BankTransfer)]
    method: MethodArg,

    /// Output as JSON
    #[arg(long)]
    json: bool,
}

impl RegisterCommand {
    pub fn exec(&self, ctx: &Context) -> anyhow::Result<()> {
        let mut db = ctx.open_store()?;

        let user = match db.user_by_email(&self.email) {
            Some(user) => user,
            None => {
                let user = db.insert_user(&self.name, &self.email)?;
                log::info!("Created user {} for {}", user.id, user.email);
                user
            }
        };

        let form = RegistrationForm {
            full_name: self.name.clone(),
            email: self.email.clone(),
            position: self.position.clone(),
            is_abe_member: self.abe_member,
            event_codes: self.events.clone(),
            participation_format: self
                .format
                .unwrap_or(ctx.config.default_participation_format),
            method: self.method.into(),
        };

        let receipt = match create_registration(&mut db, &ctx.config, user.id, &form, Utc::now()) {
            Ok(receipt) => receipt,
            Err(err) => return report_failure(err, self.json),
        };
        ctx.save_store(&db)?;
        if receipt.fees.has_errors() {
            log::warn!(
                "registration {} left out events that could not be priced",
                receipt.registration.id
            );
        }

        if self.json {
            println!("{}", serde_json::to_string_pretty(&receipt)?);
            return Ok(());
        }

        let registration = &receipt.registration;
        println!(
            "Registration {} for {} (user {}, {})",
            registration.id, registration.full_name, user.id, registration.category
        );
        for line in &receipt.fees.details {
            match line.error {
                Some(error) => println!("  {:12} skipped: {}", line.event_code, error),
                None => println!(
                    "  {:12} {}",
                    line.event_code,
                    format_brl(line.calculated_price)
                ),
            }
        }
        match &receipt.payment {
            Some(payment) => println!(
                "Payment {} ({}) pending: {}",
                payment.id,
                payment.reference,
                format_brl(payment.total_amount)
            ),
            None => println!("No payment required"),
        }
        Ok(())
    }
}
