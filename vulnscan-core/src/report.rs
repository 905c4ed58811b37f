//! Normalization of Trivy JSON reports into findings.

use serde::Deserialize;
use serde_json::Value;
use vulnscan_model::NewFinding;

use crate::error::ReportError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Report {
    #[serde(default)]
    results: Option<Vec<ReportResult>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ReportResult {
    #[serde(default)]
    vulnerabilities: Option<Vec<ReportVulnerability>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ReportVulnerability {
    #[serde(default)]
    pkg_name: Option<String>,
    #[serde(default)]
    severity: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    fixed_version: Option<String>,
}

/// Produce one finding per vulnerability entry, in report order.
///
/// Missing `Results` or `Vulnerabilities` yield no findings. Entries that are
/// not shaped like a report (wrong types where arrays, objects or strings are
/// expected) fail the whole parse.
pub fn parse_findings(report: &Value) -> Result<Vec<NewFinding>, ReportError> {
    let report = Report::deserialize(report)?;

    Ok(report
        .results
        .into_iter()
        .flatten()
        .flat_map(|result| result.vulnerabilities.into_iter().flatten())
        .map(|vuln| {
            NewFinding::with_defaults(
                vuln.pkg_name,
                vuln.severity,
                vuln.description,
                vuln.fixed_version,
            )
        })
        .collect())
}
