//! Subscriptions command - list subscriptions known to the server

use anyhow::{Context, Result};
use i3x_client::I3xClient;

use crate::output::{format_json_value, OutputContext, SubscriptionRow};

/// List subscriptions with their details
pub async fn subscriptions(client: &I3xClient, ctx: &OutputContext) -> Result<()> {
    let ids = client
        .get_subscriptions()
        .await
        .context("Failed to list subscriptions")?;

    let mut rows = Vec::with_capacity(ids.len());
    for id in ids.iter().map(format_json_value) {
        let sub = client
            .get_subscription(&id)
            .await
            .with_context(|| format!("Failed to read subscription {}", id))?;

        rows.push(SubscriptionRow {
            id: sub.subscription_id,
            created: sub.created,
            streaming: if sub.is_streaming { "yes" } else { "no" }.to_string(),
            queued: sub.queued_updates,
            objects: sub.objects.join(", "),
        });
    }

    ctx.print(&rows);
    Ok(())
}
