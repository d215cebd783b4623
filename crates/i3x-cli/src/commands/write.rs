//! Write command - write the current value of an element

use anyhow::{Context, Result};
use i3x_client::I3xClient;

use crate::output::{format_json_value, OutputContext};

/// Parse a command-line value: JSON when it parses, otherwise a plain string
pub fn parse_value(value: &str) -> serde_json::Value {
    serde_json::from_str(value).unwrap_or_else(|_| serde_json::Value::String(value.to_string()))
}

/// Write an element value
pub async fn write(
    client: &I3xClient,
    element_id: &str,
    value: &str,
    ctx: &OutputContext,
) -> Result<()> {
    let json_value = parse_value(value);

    let response = client
        .update_value(element_id, &json_value)
        .await
        .with_context(|| format!("Failed to write {}", element_id))?;

    ctx.success(&format!(
        "Successfully wrote {} = {}",
        element_id,
        format_json_value(&json_value)
    ));
    if let Some(response) = response {
        ctx.info(&format_json_value(&response));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_value() {
        assert_eq!(parse_value("42"), json!(42));
        assert_eq!(parse_value("1.5"), json!(1.5));
        assert_eq!(parse_value("true"), json!(true));
        assert_eq!(parse_value(r#"{"a": 1}"#), json!({"a": 1}));
        assert_eq!(parse_value("running"), json!("running"));
        assert_eq!(parse_value("{broken"), json!("{broken"));
    }
}
