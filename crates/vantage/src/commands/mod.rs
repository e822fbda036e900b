//! Command dispatch: CLI args -> hub and flow calls -> output formatting.

pub mod discover;
pub mod entries;
pub mod inspect;
pub mod run;
pub mod task;
pub mod util;

use crate::cli::Command;
use crate::context::Context;
use crate::error::CliError;

pub async fn dispatch(cmd: Command, ctx: &mut Context) -> Result<(), CliError> {
    match cmd {
        Command::Discover(args) => discover::handle(&args, ctx).await,
        Command::Entries(args) => entries::handle(args, ctx).await,
        Command::Inspect(args) => inspect::handle(&args, ctx),
        Command::Run(args) => run::handle(&args, ctx).await,
        Command::Task(args) => task::handle(args, ctx).await,
        // Completions are handled before a context exists
        Command::Completions(_) => Ok(()),
    }
}
