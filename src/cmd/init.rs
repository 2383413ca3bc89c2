//! Init command - create the store with its event catalogue

use super::Context;
use crate::core::{default_catalogue, read_events_csv, read_fees_csv, Database};
use anyhow::Context as _;
use clap::Args;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

#[derive(Args, Debug)]
pub struct InitCommand {
    /// CSV file of events to import instead of the default catalogue
    #[arg(long, requires = "fees")]
    events: Option<PathBuf>,

    /// CSV file of fees to import
    #[arg(long, requires = "events")]
    fees: Option<PathBuf>,

    /// Overwrite an existing store
    #[arg(long)]
    force: bool,
}

impl InitCommand {
    pub fn exec(&self, ctx: &Context) -> anyhow::Result<()> {
        if ctx.store.exists() && !self.force {
            anyhow::bail!(
                "Store {} already exists. Use --force to overwrite it.",
                ctx.store.display()
            );
        }

        let (events, fees) = match (&self.events, &self.fees) {
            (Some(events), Some(fees)) => (
                read_events_csv(open(events)?)?,
                read_fees_csv(open(fees)?)?,
            ),
            _ => default_catalogue(),
        };

        let mains = events.iter().filter(|e| e.is_main_conference).count();
        if mains != 1 {
            log::warn!("catalogue has {} main conference events", mains);
        }
        for fee in &fees {
            if !events.iter().any(|e| e.code == fee.event_code) {
                anyhow::bail!("Fee row references unknown event {}", fee.event_code);
            }
        }

        let db = Database::with_catalogue(events, fees);
        ctx.save_store(&db)?;
        println!(
            "Initialised {} with {} events and {} fees",
            ctx.store.display(),
            db.events.len(),
            db.fees.len()
        );
        Ok(())
    }
}

fn open(path: &Path) -> anyhow::Result<BufReader<File>> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    Ok(BufReader::new(file))
}
