pub mod add_events;
pub mod check;
pub mod fix_orphans;
pub mod init;
pub mod proof;
pub mod quote;
pub mod register;
pub mod registrations;
pub mod reminders;
pub mod review;
pub mod schema;
pub mod show;

use crate::core::{Config, Database, PaymentMethod, Refusal, RegistrationError};
use anyhow::Context as _;
use clap::ValueEnum;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Options shared by every command
#[derive(Debug)]
pub struct Context {
    pub store: PathBuf,
    pub config: Config,
}

impl Context {
    pub fn open_store(&self) -> anyhow::Result<Database> {
        open_store(&self.store)
    }

    pub fn save_store(&self, db: &Database) -> anyhow::Result<()> {
        db.save(&self.store)
            .with_context(|| format!("Failed to save {}", self.store.display()))
    }
}

fn open_store(path: &Path) -> anyhow::Result<Database> {
    if !path.exists() {
        anyhow::bail!(
            "Store {} not found. Run `confreg init` first.",
            path.display()
        );
    }
    Ok(Database::load(path)?)
}

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum MethodArg {
    #[default]
    BankTransfer,
    InternationalInvoice,
}

impl From<MethodArg> for PaymentMethod {
    fn from(arg: MethodArg) -> Self {
        match arg {
            MethodArg::BankTransfer => PaymentMethod::BankTransfer,
            MethodArg::InternationalInvoice => PaymentMethod::InternationalInvoice,
        }
    }
}

#[derive(Debug, Serialize)]
struct RefusalOutput<'a> {
    can_register: bool,
    message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    blocked_events: Vec<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    paid_payments: Vec<&'a str>,
}

/// Print a refusal for the user and turn it into a failed exit status.
pub fn refuse(refusal: Refusal, json: bool) -> anyhow::Result<()> {
    if json {
        let output = RefusalOutput {
            can_register: false,
            message: refusal.to_string(),
            blocked_events: refusal.blocked_events().iter().map(String::as_str).collect(),
            paid_payments: refusal
                .paid_payments()
                .iter()
                .map(|p| p.reference.as_str())
                .collect(),
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("{}", refusal);
        if !refusal.blocked_events().is_empty() {
            println!("Blocked events: {}", refusal.blocked_events().join(", "));
        }
    }
    Err(refusal.into())
}

/// Refusals are shown to the user; anything else is a real failure.
pub fn report_failure(err: RegistrationError, json: bool) -> anyhow::Result<()> {
    match err {
        RegistrationError::Refused(refusal) => refuse(refusal, json),
        other => Err(other.into()),
    }
}
