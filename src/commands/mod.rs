use anyhow::{Context, Result};
use serde::Serialize;

pub mod browse;
pub mod instances;
pub mod resolve;

pub use browse::{channel, comments, info, search, trending};
pub use instances::instances;
pub use resolve::resolve;

/// Write a value to stdout as pretty JSON
pub(crate) fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("Failed to render JSON output")?;
    println!("{rendered}");
    Ok(())
}
