//! Log and metric exports

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::core::LogEntry;
use crate::monitor::{MetricCategory, MetricSample};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Json,
    Csv,
    Text,
}

impl ExportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Csv => "csv",
            Self::Text => "text",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Json => "application/json",
            Self::Csv => "text/csv; charset=utf-8",
            Self::Text => "text/plain; charset=utf-8",
        }
    }

    fn extension(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Csv => "csv",
            Self::Text => "log",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            "text" | "txt" => Ok(Self::Text),
            other => Err(format!("unsupported export format: {}", other)),
        }
    }
}

/// A rendered export, tagged with its format
#[derive(Debug, Clone, Serialize)]
pub struct ExportBlob {
    pub format: ExportFormat,
    pub content_type: &'static str,
    pub filename: String,
    pub body: String,
}

impl ExportBlob {
    fn new(kind: &str, format: ExportFormat, body: String) -> Self {
        Self {
            format,
            content_type: format.content_type(),
            filename: format!(
                "{}-{}.{}",
                kind,
                chrono::Utc::now().format("%Y%m%dT%H%M%SZ"),
                format.extension()
            ),
            body,
        }
    }
}

pub fn export_logs(entries: &[LogEntry], format: ExportFormat) -> Result<ExportBlob, serde_json::Error> {
    let body = match format {
        ExportFormat::Json => serde_json::to_string_pretty(entries)?,
        ExportFormat::Csv => {
            let mut out = String::from("id,timestamp,level,component,message,data\n");
            for entry in entries {
                let data = entry.data.as_ref().map(|d| d.to_string()).unwrap_or_default();
                let row = [
                    entry.id.to_string(),
                    entry.timestamp.to_rfc3339(),
                    entry.level.to_string(),
                    csv_field(&entry.component),
                    csv_field(&entry.message),
                    csv_field(&data),
                ];
                out.push_str(&row.join(","));
                out.push('\n');
            }
            out
        }
        ExportFormat::Text => {
            let mut out = String::new();
            for entry in entries {
                out.push_str(&format!(
                    "[{}] {:<5} [{}] {}",
                    entry.timestamp.to_rfc3339(),
                    entry.level.as_str().to_uppercase(),
                    entry.component,
                    entry.message
                ));
                if let Some(data) = &entry.data {
                    out.push(' ');
                    out.push_str(&data.to_string());
                }
                out.push('\n');
            }
            out
        }
    };

    Ok(ExportBlob::new("logs", format, body))
}

/// Text exports are not offered for metrics; callers get `None` back.
pub fn export_metrics(
    metrics: &BTreeMap<MetricCategory, Vec<MetricSample>>,
    format: ExportFormat,
) -> Result<Option<ExportBlob>, serde_json::Error> {
    let body = match format {
        ExportFormat::Json => serde_json::to_string_pretty(metrics)?,
        ExportFormat::Csv => {
            let mut out = String::from("category,timestamp,field,value,sample\n");
            for samples in metrics.values() {
                for sample in samples {
                    let (field, value) = sample.primary_value();
                    let row = [
                        sample.category().to_string(),
                        sample.timestamp().to_rfc3339(),
                        field.to_string(),
                        value.to_string(),
                        csv_field(&serde_json::to_string(sample)?),
                    ];
                    out.push_str(&row.join(","));
                    out.push('\n');
                }
            }
            out
        }
        ExportFormat::Text => return Ok(None),
    };

    Ok(Some(ExportBlob::new("metrics", format, body)))
}

/// Quote a CSV field when it contains a delimiter, quote or line break
fn csv_field(value: &str) -> String {
    if value.contains(|c| matches!(c, ',' | '"' | '\n' | '\r')) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::LogLevel;
    use crate::monitor::{CpuSample, MemorySample};
    use crate::process::ProcessInfo;
    use chrono::Utc;
    use serde_json::json;

    fn entry(message: &str) -> LogEntry {
        LogEntry {
            id: 7,
            timestamp: Utc::now(),
            level: LogLevel::Warn,
            component: "cache".to_string(),
            message: message.to_string(),
            data: Some(json!({"key": "a,b"})),
            process: ProcessInfo::current(),
            memory: None,
            performance: None,
        }
    }

    #[test]
    fn test_csv_escaping() {
        assert_eq!(csv_field("plain"), "plain");
        assert_eq!(csv_field("hello, world"), "\"hello, world\"");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(csv_field("line\rbreak"), "\"line\rbreak\"");
        assert_eq!(csv_field("crlf\r\n"), "\"crlf\r\n\"");
    }

    #[test]
    fn test_export_logs_csv() {
        let blob = export_logs(&[entry("evicted, retrying")], ExportFormat::Csv).unwrap();
        let lines: Vec<&str> = blob.body.lines().collect();
        assert_eq!(lines[0], "id,timestamp,level,component,message,data");
        assert!(lines[1].starts_with("7,"));
        assert!(lines[1].contains("\"evicted, retrying\""));
        assert_eq!(blob.content_type, "text/csv; charset=utf-8");
        assert!(blob.filename.starts_with("logs-") && blob.filename.ends_with(".csv"));
    }

    #[test]
    fn test_export_logs_text_and_json() {
        let text = export_logs(&[entry("slow query")], ExportFormat::Text).unwrap();
        assert!(text.body.contains("WARN  [cache] slow query"));

        let json = export_logs(&[entry("slow query")], ExportFormat::Json).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json.body).unwrap();
        assert_eq!(parsed[0]["message"], "slow query");
    }

    #[test]
    fn test_export_metrics() {
        let mut metrics = BTreeMap::new();
        metrics.insert(
            MetricCategory::Memory,
            vec![MetricSample::Memory(MemorySample::with_heap_mb(12.0))],
        );
        metrics.insert(
            MetricCategory::Cpu,
            vec![MetricSample::Cpu(CpuSample::with_usage(40.0))],
        );

        let blob = export_metrics(&metrics, ExportFormat::Csv).unwrap().unwrap();
        let lines: Vec<&str> = blob.body.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].starts_with("memory,"));
        assert!(lines[2].starts_with("cpu,"));

        assert!(export_metrics(&metrics, ExportFormat::Text).unwrap().is_none());
    }

    #[test]
    fn test_format_parse() {
        assert_eq!("CSV".parse::<ExportFormat>().unwrap(), ExportFormat::Csv);
        assert_eq!("txt".parse::<ExportFormat>().unwrap(), ExportFormat::Text);
        assert!("xml".parse::<ExportFormat>().is_err());
    }
}
