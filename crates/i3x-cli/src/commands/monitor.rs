//! Monitor command - live value streaming

use anyhow::{Context, Result};
use colored::Colorize;
use i3x_client::{EventHandlers, I3xClient, ValueChange};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::output::{csv_line, value_rows, OutputContext, OutputFormat};

const CSV_HEADER: [&str; 4] = ["element", "value", "quality", "timestamp"];

/// Subscribe to elements and print every value change until Ctrl+C
pub async fn monitor(
    client: I3xClient,
    element_ids: &[String],
    depth: u32,
    ctx: &OutputContext,
) -> Result<()> {
    let format = ctx.format;
    let stream_failed = Arc::new(AtomicBool::new(false));
    let failed = stream_failed.clone();

    let handlers = EventHandlers::new()
        .on_value_change(move |change| print_change(change, format))
        .on_error(move |err| {
            eprintln!("{}", format!("Stream error: {}", err).red());
            failed.store(true, Ordering::SeqCst);
        });

    let client = client.with_handlers(handlers);
    client
        .connect()
        .await
        .with_context(|| format!("Failed to connect to {}", client.base_url()))?;

    // Rows can arrive as soon as the stream starts
    if format == OutputFormat::Csv {
        println!("{}", csv_line(&CSV_HEADER));
    }

    ctx.info(&format!("Subscribing to {} element(s)...", element_ids.len()));
    let ids: Vec<&str> = element_ids.iter().map(String::as_str).collect();
    let subscription = client
        .subscribe(&ids, depth)
        .await
        .context("Failed to subscribe")?;
    ctx.info("Press Ctrl+C to stop");

    // Set up Ctrl+C handler
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })?;

    while running.load(Ordering::SeqCst) {
        if stream_failed.load(Ordering::SeqCst) {
            break;
        }
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    }

    ctx.info("\nStopping subscription...");
    let result = client.unsubscribe(&subscription.subscription_id).await;
    client.disconnect().await;
    result.context("Failed to delete subscription")?;
    ctx.success("Subscription cancelled");

    Ok(())
}

/// Print one value change in the appropriate format
fn print_change(change: &ValueChange, format: OutputFormat) {
    for line in change_lines(change, format) {
        println!("{}", line);
    }
}

fn change_lines(change: &ValueChange, format: OutputFormat) -> Vec<String> {
    match format {
        OutputFormat::Table => value_rows(change)
            .into_iter()
            .map(|row| {
                format!(
                    "[{}] {} = {} ({})",
                    row.timestamp, row.element, row.value, row.quality
                )
            })
            .collect(),
        OutputFormat::Json => serde_json::to_string(change).into_iter().collect(),
        OutputFormat::Csv => value_rows(change)
            .into_iter()
            .map(|row| {
                csv_line(&[
                    row.element.as_str(),
                    row.value.as_str(),
                    row.quality.as_str(),
                    row.timestamp.as_str(),
                ])
            })
            .collect(),
    }
}
