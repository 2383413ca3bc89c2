//! Check command - can these events still be selected?

use super::Context;
use crate::core::{accessible_events, can_register_for_events, UserId};
use clap::Args;

#[derive(Args, Debug)]
pub struct CheckCommand {
    #[arg(short, long)]
    user: UserId,

    /// Event codes to check
    #[arg(short, long, num_args = 1.., value_delimiter = ',', required = true)]
    events: Vec<String>,

    /// Output as JSON
    #[arg(long)]
    json: bool,
}

impl CheckCommand {
    pub fn exec(&self, ctx: &Context) -> anyhow::Result<()> {
        let db = ctx.open_store()?;
        let eligibility = can_register_for_events(&db, self.user, &self.events);

        if self.json {
            println!("{}", serde_json::to_string_pretty(&eligibility)?);
            return Ok(());
        }

        println!("{}", eligibility.message);
        if !eligibility.blocked_events.is_empty() {
            println!("Blocked events: {}", eligibility.blocked_events.join(", "));
        }
        let paid = accessible_events(&db, self.user);
        if !paid.is_empty() {
            println!("Paid events:");
            for (code, name) in paid {
                println!("  {:12} {}", code, name);
            }
        }
        Ok(())
    }
}
