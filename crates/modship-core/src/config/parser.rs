//! TOML parser with helpful error messages

use super::schema::ModshipConfig;
use anyhow::{Context, Result};
use std::path::Path;

/// Parse modship.toml with detailed error messages
pub fn parse_modship_toml(path: &Path) -> Result<ModshipConfig> {
    let content = read_config_file(path)?;

    parse_modship_toml_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Parse modship.toml content from string
pub fn parse_modship_toml_str(content: &str) -> Result<ModshipConfig> {
    let config: ModshipConfig =
        toml::from_str(content).map_err(|e| enhance_toml_error(e, content))?;
    config.validate()?;
    Ok(config)
}

/// Parse into an untyped table, for layer merging.
pub(crate) fn parse_table(path: &Path) -> Result<toml::Table> {
    let content = read_config_file(path)?;
    content
        .parse::<toml::Table>()
        .map_err(|e| enhance_toml_error(e, &content))
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

fn read_config_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))
}

/// Enhance TOML parsing errors with the offending lines
pub(crate) fn enhance_toml_error(error: toml::de::Error, content: &str) -> anyhow::Error {
    let error_msg = error.message().to_string();

    let line_num = error.span().map(|span| {
        let end = span.start.min(content.len());
        content.as_bytes()[..end].iter().filter(|b| **b == b'\n').count() + 1
    });

    match line_num {
        Some(line_num) => anyhow::anyhow!(
            "TOML parsing error at line {}:\n{}\n\nError: {}",
            line_num,
            get_line_context(content, line_num),
            error_msg
        ),
        None => anyhow::anyhow!("TOML parsing error: {}", error_msg),
    }
}

/// Get context lines around an error
fn get_line_context(content: &str, line_num: usize) -> String {
    let lines: Vec<&str> = content.lines().collect();
    let start = line_num.saturating_sub(2);
    let end = (line_num + 1).min(lines.len());

    lines
        .get(start..end)
        .unwrap_or_default()
        .iter()
        .enumerate()
        .map(|(i, line)| {
            let num = start + i + 1;
            let marker = if num == line_num { ">>>" } else { "   " };
            format!("{} {:4} | {}", marker, num, line)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Serialize a configuration to TOML string
pub fn to_toml(config: &ModshipConfig) -> Result<String> {
    toml::to_string_pretty(config).with_context(|| "Failed to serialize configuration to TOML")
}
