//! Value commands - last known values and history

use anyhow::{Context, Result};
use i3x_client::I3xClient;

use crate::output::{value_rows, OutputContext, ValueRow};

/// Read the last known value of one or more elements
pub async fn value(
    client: &I3xClient,
    element_ids: &[String],
    depth: u32,
    ctx: &OutputContext,
) -> Result<()> {
    let ids: Vec<&str> = element_ids.iter().map(String::as_str).collect();
    let values = client
        .get_values(&ids, depth)
        .await
        .context("Failed to read values")?;

    let missing: Vec<&str> = ids
        .iter()
        .copied()
        .filter(|id| !values.contains_key(*id))
        .collect();
    if !missing.is_empty() {
        ctx.error(&format!("No value for: {}", missing.join(", ")));
    }

    let rows: Vec<ValueRow> = values.values().flat_map(value_rows).collect();
    ctx.print(&rows);
    Ok(())
}

/// Read historical values of an element
pub async fn history(
    client: &I3xClient,
    element_id: &str,
    start: Option<&str>,
    end: Option<&str>,
    ctx: &OutputContext,
) -> Result<()> {
    let history = client
        .get_history(element_id, start, end, 0)
        .await
        .with_context(|| format!("Failed to read history of {}", element_id))?;

    ctx.print(&value_rows(&history));
    Ok(())
}
