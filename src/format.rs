//! Output formatters for match results.
//!
//! Results are grouped per source (a file name or `"-"` for inline text),
//! then per matched span, mirroring how the resolver returns them.

use std::fmt;
use std::str::FromStr;

use concepts::ConceptMatch;
use serde::{Deserialize, Serialize};

use crate::FacetError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Json,
    Yaml,
    /// `<matches>` root with one `<match>` element per match.
    Xml,
    /// One row per match with a leading `source` column.
    Csv,
    /// One line per match of `field=value` pairs joined by `|`.
    Kv,
}

impl FromStr for OutputFormat {
    type Err = FacetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "yaml" | "yml" => Ok(OutputFormat::Yaml),
            "xml" => Ok(OutputFormat::Xml),
            "csv" => Ok(OutputFormat::Csv),
            "kv" => Ok(OutputFormat::Kv),
            other => Err(FacetError::Format(format!(
                "unknown output format {other:?} (expected json, yaml, xml, csv or kv)"
            ))),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OutputFormat::Json => "json",
            OutputFormat::Yaml => "yaml",
            OutputFormat::Xml => "xml",
            OutputFormat::Csv => "csv",
            OutputFormat::Kv => "kv",
        })
    }
}

/// Matches found in one source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchReport {
    pub source: String,
    pub matches: Vec<Vec<ConceptMatch>>,
}

impl MatchReport {
    pub fn new(source: impl Into<String>, matches: Vec<Vec<ConceptMatch>>) -> Self {
        Self {
            source: source.into(),
            matches,
        }
    }

    fn rows(&self) -> impl Iterator<Item = &ConceptMatch> {
        self.matches.iter().flatten()
    }
}

/// One match flattened with its source; the row shape shared by the CSV,
/// key-value and XML formatters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename = "match")]
pub struct MatchRecord {
    pub source: String,
    pub start: usize,
    pub end: usize,
    pub ngram: String,
    pub term: String,
    pub cui: String,
    pub similarity: f64,
    /// Semantic type codes joined by `,`.
    pub semtypes: String,
    pub preferred: bool,
}

impl MatchRecord {
    fn new(source: &str, m: &ConceptMatch) -> Self {
        Self {
            source: source.to_string(),
            start: m.start,
            end: m.end,
            ngram: m.ngram.clone(),
            term: m.term.clone(),
            cui: m.cui.clone(),
            similarity: m.similarity,
            semtypes: m.semtypes.join(","),
            preferred: m.preferred,
        }
    }

    fn fields(&self) -> [(&'static str, String); 9] {
        [
            ("source", self.source.clone()),
            ("start", self.start.to_string()),
            ("end", self.end.to_string()),
            ("ngram", self.ngram.clone()),
            ("term", self.term.clone()),
            ("cui", self.cui.clone()),
            ("similarity", self.similarity.to_string()),
            ("semtypes", self.semtypes.clone()),
            ("preferred", self.preferred.to_string()),
        ]
    }
}

/// Every match of `reports` as flat rows, in report then text order.
pub fn match_records(reports: &[MatchReport]) -> Vec<MatchRecord> {
    reports
        .iter()
        .flat_map(|report| report.rows().map(|m| MatchRecord::new(&report.source, m)))
        .collect()
}

/// XML document root: `<matches><match>..</match></matches>`.
#[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename = "matches")]
pub struct XmlMatches {
    #[serde(rename = "match", default)]
    pub records: Vec<MatchRecord>,
}

const CSV_HEADER: [&str; 9] = [
    "source",
    "start",
    "end",
    "ngram",
    "term",
    "cui",
    "similarity",
    "semtypes",
    "preferred",
];

pub fn format_reports(reports: &[MatchReport], format: OutputFormat) -> Result<String, FacetError> {
    match format {
        OutputFormat::Json => {
            serde_json::to_string_pretty(reports).map_err(|e| FacetError::Format(e.to_string()))
        }
        OutputFormat::Yaml => {
            serde_yaml::to_string(reports).map_err(|e| FacetError::Format(e.to_string()))
        }
        OutputFormat::Xml => format_xml(reports),
        OutputFormat::Csv => format_csv(reports),
        OutputFormat::Kv => Ok(format_kv(reports)),
    }
}

fn format_xml(reports: &[MatchReport]) -> Result<String, FacetError> {
    let document = XmlMatches {
        records: match_records(reports),
    };
    let mut out = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    let mut serializer = quick_xml::se::Serializer::new(&mut out);
    serializer.indent(' ', 2);
    document
        .serialize(serializer)
        .map_err(|e| FacetError::Format(e.to_string()))?;
    out.push('\n');
    Ok(out)
}

fn format_csv(reports: &[MatchReport]) -> Result<String, FacetError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(CSV_HEADER).map_err(csv_error)?;
    for record in match_records(reports) {
        writer
            .write_record(record.fields().map(|(_, value)| value))
            .map_err(csv_error)?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| FacetError::Format(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| FacetError::Format(e.to_string()))
}

fn format_kv(reports: &[MatchReport]) -> String {
    let mut out = String::new();
    for record in match_records(reports) {
        let line: Vec<String> = record
            .fields()
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect();
        out.push_str(&line.join("|"));
        out.push('\n');
    }
    out
}

fn csv_error(err: csv::Error) -> FacetError {
    FacetError::Format(err.to_string())
}
