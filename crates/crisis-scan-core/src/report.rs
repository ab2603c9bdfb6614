use std::fmt::Write;

use serde::Serialize;

use crate::scanner::{RiskLevel, ScanResult};

/// Format styles supported by the default renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Human,
    Json,
    Yaml,
}

/// Produce a report string for a scan result and its risk level.
pub fn render_report(
    result: &ScanResult,
    level: RiskLevel,
    format: OutputFormat,
) -> anyhow::Result<String> {
    match format {
        OutputFormat::Human => render_human(result, level),
        OutputFormat::Json => Ok(serde_json::to_string_pretty(&RenderedReport::new(
            result, level,
        ))?),
        OutputFormat::Yaml => Ok(serde_yaml::to_string(&RenderedReport::new(result, level))?),
    }
}

/// Short flag shown next to a session when crisis language was found.
pub fn badge(result: &ScanResult) -> Option<String> {
    if !result.has_crisis_language {
        return None;
    }
    let mut label = String::from("Possible crisis language");
    if !result.keywords.is_empty() {
        let _ = write!(label, " ({} flags)", result.keywords.len());
    }
    Some(label)
}

fn render_human(result: &ScanResult, level: RiskLevel) -> anyhow::Result<String> {
    let mut out = String::new();
    writeln!(out, "Risk Level: {level}")?;

    let Some(badge) = badge(result) else {
        writeln!(out, "No crisis language detected.")?;
        return Ok(out);
    };
    writeln!(out, "{badge}")?;
    writeln!(out)?;
    writeln!(out, "Keywords: {}", result.keywords.join(", "))?;

    if !result.excerpts.is_empty() {
        writeln!(out)?;
        writeln!(out, "Excerpts:")?;
        for excerpt in &result.excerpts {
            writeln!(out, "  - \"{}\"", sanitize_excerpt(excerpt.trim()))?;
        }
    }
    writeln!(out)?;
    writeln!(
        out,
        "Flags are a lexical triage signal for clinician review, not a clinical assessment."
    )?;

    Ok(out)
}

fn sanitize_excerpt(input: &str) -> String {
    input
        .chars()
        .map(|c| match c {
            '\n' | '\r' => ' ',
            _ => c,
        })
        .collect()
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RenderedReport<'a> {
    risk_level: RiskLevel,
    has_crisis_language: bool,
    keywords: &'a [String],
    excerpts: &'a [String],
}

impl<'a> RenderedReport<'a> {
    fn new(result: &'a ScanResult, level: RiskLevel) -> Self {
        Self {
            risk_level: level,
            has_crisis_language: result.has_crisis_language,
            keywords: &result.keywords,
            excerpts: &result.excerpts,
        }
    }
}
