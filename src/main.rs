mod cmd;
mod core;
mod utils;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "confreg", version, about = "Conference registration fees and payment ledger")]
struct Cli {
    /// JSON store file
    #[arg(long, global = true, default_value = "confreg.json")]
    store: PathBuf,

    /// JSON config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a store with the default or an imported catalogue
    Init(cmd::init::InitCommand),
    /// Price a selection of events
    Quote(cmd::quote::QuoteCommand),
    /// Register a participant for the first time
    Register(cmd::register::RegisterCommand),
    /// Quote or add events to an existing registration
    AddEvents(cmd::add_events::AddEventsCommand),
    /// Check whether events can still be selected by a user
    Check(cmd::check::CheckCommand),
    /// Submit a payment proof
    Proof(cmd::proof::ProofCommand),
    /// Change a payment's status
    Review(cmd::review::ReviewCommand),
    /// List registrations
    Registrations(cmd::registrations::RegistrationsCommand),
    /// Show one registration with its payments and balance
    Show(cmd::show::ShowCommand),
    /// Create missing payments for registrations that owe money
    FixOrphans(cmd::fix_orphans::FixOrphansCommand),
    /// List registrations whose early-bird price ends tomorrow
    Reminders(cmd::reminders::RemindersCommand),
    /// Print the store file schema or the catalogue CSV headers
    Schema(cmd::schema::SchemaCommand),
}

fn main() -> anyhow::Result<()> {
    pretty_env_logger::init();

    let cli = Cli::parse();
    let config = crate::core::Config::load(cli.config.as_deref())?;
    let ctx = cmd::Context {
        store: cli.store,
        config,
    };

    match cli.command {
        Command::Init(init) => init.exec(&ctx),
        Command::Quote(quote) => quote.exec(&ctx),
        Command::Register(register) => register.exec(&ctx),
        Command::AddEvents(add) => add.exec(&ctx),
        Command::Check(check) => check.exec(&ctx),
        Command::Proof(proof) => proof.exec(&ctx),
        Command::Review(review) => review.exec(&ctx),
        Command::Registrations(list) => list.exec(&ctx),
        Command::Show(show) => show.exec(&ctx),
        Command::FixOrphans(fix) => fix.exec(&ctx),
        Command::Reminders(reminders) => reminders.exec(&ctx),
        Command::Schema(schema) => schema.exec(),
    }
}
