//! CLI command definitions

use clap::Args;
use serde_json::Value;

/// Run every configured runner
#[derive(Debug, Args, Clone)]
pub struct RunCommand {
    /// Path to orchestrator YAML file
    #[arg(short, long)]
    pub file: String,

    /// Ambient parameter overrides (key=value, value parsed as YAML)
    #[arg(long, value_parser = parse_param)]
    pub param: Vec<(String, Value)>,

    /// Stop after this many seconds instead of waiting for Ctrl-C
    #[arg(long)]
    pub for_secs: Option<u64>,
}

/// Validate an orchestrator configuration
#[derive(Debug, Args, Clone)]
pub struct ValidateCommand {
    /// Path to orchestrator YAML file
    #[arg(short, long)]
    pub file: String,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Parse key=value pairs
pub fn parse_key_value(s: &str) -> Result<(String, String), String> {
    let parts: Vec<&str> = s.splitn(2, '=').collect();
    if parts.len() != 2 || parts[0].is_empty() {
        return Err(format!("Invalid key=value pair: {}", s));
    }
    Ok((parts[0].to_string(), parts[1].to_string()))
}

/// Parse key=value where the value is a YAML scalar (`5`, `true`, `Inbox`)
pub fn parse_param(s: &str) -> Result<(String, Value), String> {
    let (key, raw) = parse_key_value(s)?;
    if raw.trim().is_empty() {
        return Ok((key, Value::String(raw)));
    }
    let value = match serde_yaml::from_str::<Value>(&raw) {
        Ok(Value::Null) if raw.trim() != "null" => Value::String(raw),
        Ok(value) => value,
        Err(_) => Value::String(raw),
    };
    Ok((key, value))
}
