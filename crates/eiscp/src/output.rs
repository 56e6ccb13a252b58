use std::collections::BTreeMap;
use std::io::IsTerminal;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use eiscp_frame::Message;
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct MessageOutput<'a> {
    #[serde(flatten)]
    message: &'a Message,
    device: &'a str,
    timestamp: String,
}

#[derive(Serialize)]
struct StateOutput<'a> {
    device: &'a str,
    state: &'a BTreeMap<String, String>,
    missing: &'a [String],
}

pub fn print_message(message: &Message, device: &str, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = MessageOutput {
                message,
                device,
                timestamp: now_unix_seconds(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["COMMAND", "PARAMETER", "DEVICE"])
                .add_row(vec![
                    message.command().to_string(),
                    message.parameter().to_string(),
                    device.to_string(),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "command={} parameter={} device={}",
                message.command(),
                message.parameter(),
                device
            );
        }
        OutputFormat::Raw => println!("{message}"),
    }
}

/// Print a state snapshot. `missing` lists queried commands that never answered.
pub fn print_state(
    state: &BTreeMap<String, String>,
    missing: &[String],
    device: &str,
    format: OutputFormat,
) {
    match format {
        OutputFormat::Json => {
            let out = StateOutput {
                device,
                state,
                missing,
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["COMMAND", "PARAMETER"]);
            for (command, parameter) in state {
                table.add_row(vec![command.as_str(), parameter.as_str()]);
            }
            for command in missing {
                table.add_row(vec![command.as_str(), "<no reply>"]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for (command, parameter) in state {
                println!("{command}={parameter}");
            }
            for command in missing {
                println!("{command}=<no reply>");
            }
        }
        OutputFormat::Raw => {
            for (command, parameter) in state {
                println!("{command}{parameter}");
            }
        }
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_json_keeps_wire_field_names() {
        let message = Message::parse("PWR01").unwrap();
        let out = MessageOutput {
            message: &message,
            device: "127.0.0.1:60128",
            timestamp: "0".to_string(),
        };
        let json: serde_json::Value = serde_json::to_value(&out).unwrap();
        assert_eq!(json["Command"], "PWR");
        assert_eq!(json["Parameter"], "01");
        assert_eq!(json["device"], "127.0.0.1:60128");
    }

    #[test]
    fn state_json_lists_missing() {
        let mut state = BTreeMap::new();
        state.insert("PWR".to_string(), "01".to_string());
        let missing = vec!["MVL".to_string()];
        let out = StateOutput {
            device: "dev",
            state: &state,
            missing: &missing,
        };
        let json = serde_json::to_string(&out).unwrap();
        assert_eq!(
            json,
            r#"{"device":"dev","state":{"PWR":"01"},"missing":["MVL"]}"#
        );
    }
}
