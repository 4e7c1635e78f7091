// Command-line flags for iohid-watch

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use iohid::native::keys;
use iohid::{HostObject, HostValue, WatchConfig};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "iohid-watch")]
#[command(author, version, about = "Watch HID devices attach and detach")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Match vendor ID (decimal or 0x-prefixed hex)
    #[arg(long, global = true, value_parser = parse_u16)]
    pub vid: Option<u16>,

    /// Match product ID (decimal or 0x-prefixed hex)
    #[arg(long, global = true, value_parser = parse_u16)]
    pub pid: Option<u16>,

    /// Match primary usage page
    #[arg(long, global = true, value_parser = parse_u16)]
    pub usage_page: Option<u16>,

    /// Match primary usage
    #[arg(long, global = true, value_parser = parse_u16)]
    pub usage: Option<u16>,

    /// Matching criteria as JSON: an object or a list of objects
    #[arg(long, global = true, value_name = "JSON")]
    pub criteria: Option<String>,

    /// TOML config file with `poll_interval_ms` and `[[criteria]]` tables
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Re-enumeration interval in milliseconds
    #[arg(long, global = true)]
    pub poll_ms: Option<u64>,

    /// Print events as JSON lines
    #[arg(long, global = true)]
    pub json: bool,

    /// Debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Clone, Copy, PartialEq, Eq)]
pub enum Commands {
    /// Print attach/detach events until interrupted (default)
    #[command(visible_alias = "w")]
    Watch,

    /// List matching devices currently attached
    #[command(visible_aliases = ["ls", "l"])]
    List,
}

impl Cli {
    /// Criteria to install. ID/usage flags take precedence over `--criteria`,
    /// which takes precedence over the config file.
    pub fn criteria(&self, config: &WatchConfig) -> Result<HostValue> {
        let mut flags = HostObject::new();
        for (key, value) in [
            (keys::VENDOR_ID, self.vid),
            (keys::PRODUCT_ID, self.pid),
            (keys::PRIMARY_USAGE_PAGE, self.usage_page),
            (keys::PRIMARY_USAGE, self.usage),
        ] {
            if let Some(value) = value {
                flags.set(key, f64::from(value));
            }
        }
        if !flags.is_empty() {
            return Ok(flags.into());
        }

        if let Some(json) = &self.criteria {
            let value: serde_json::Value =
                serde_json::from_str(json).context("--criteria is not valid JSON")?;
            return Ok(value.into());
        }

        Ok(config.criteria_value()?)
    }
}

fn parse_u16(s: &str) -> std::result::Result<u16, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid 16-bit value '{s}': {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_u16() {
        assert_eq!(parse_u16("0x05AC"), Ok(0x05AC));
        assert_eq!(parse_u16("591"), Ok(591));
        assert!(parse_u16("0x1FFFF").is_err());
        assert!(parse_u16("keyboard").is_err());
    }

    #[test]
    fn test_flags_override_json_and_config() {
        let cli = Cli::parse_from([
            "iohid-watch",
            "--vid",
            "0x05ac",
            "--criteria",
            r#"{"ProductID": 1}"#,
        ]);
        let value = cli.criteria(&WatchConfig::default()).unwrap();
        let obj = value.as_object().unwrap();
        assert_eq!(obj.get("VendorID"), Some(&HostValue::Number(1452.0)));
        assert_eq!(obj.get("ProductID"), None);
    }

    #[test]
    fn test_json_criteria() {
        let cli = Cli::parse_from(["iohid-watch", "list", "--criteria", r#"[{"VendorID": 1}]"#]);
        assert!(cli.command == Some(Commands::List));
        let value = cli.criteria(&WatchConfig::default()).unwrap();
        assert_eq!(value.as_array().map(|a| a.len()), Some(1));
    }

    #[test]
    fn test_falls_back_to_config() {
        let cli = Cli::parse_from(["iohid-watch"]);
        let config = WatchConfig::parse("[[criteria]]\nProduct = \"Keyboard\"\n").unwrap();
        let value = cli.criteria(&config).unwrap();
        assert!(value.as_array().is_some());
        assert_eq!(
            cli.criteria(&WatchConfig::default()).unwrap(),
            HostValue::Null
        );
    }
}
