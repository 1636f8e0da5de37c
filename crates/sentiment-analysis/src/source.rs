use async_trait::async_trait;
use chrono::NaiveDate;
use portfolio_core::{EngagementRecord, PipelineError, SentimentSource};
use std::time::Duration;

const DATE_COLUMNS: &[&str] = &["date"];
const SYMBOL_COLUMNS: &[&str] = &["symbol", "ticker"];
const LIKE_COLUMNS: &[&str] = &["likecount", "twitterlikes", "likes"];
const COMMENT_COLUMNS: &[&str] = &["commentcount", "twittercomments", "comments"];

/// Reads the engagement dataset from an `http(s)://` URL or a local CSV file.
#[derive(Clone)]
pub struct CsvSentimentSource {
    client: reqwest::Client,
}

impl CsvSentimentSource {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client }
    }

    async fn read_location(&self, location: &str) -> Result<String, PipelineError> {
        if location.starts_with("http://") || location.starts_with("https://") {
            let response = self
                .client
                .get(location)
                .send()
                .await
                .map_err(|e| PipelineError::DataSource(format!("sentiment source unreachable: {}", e)))?;

            if !response.status().is_success() {
                return Err(PipelineError::DataSource(format!(
                    "sentiment source returned HTTP {}",
                    response.status()
                )));
            }

            response
                .text()
                .await
                .map_err(|e| PipelineError::DataSource(format!("sentiment source body: {}", e)))
        } else {
            tokio::fs::read_to_string(location)
                .await
                .map_err(|e| PipelineError::DataSource(format!("cannot read {}: {}", location, e)))
        }
    }
}

impl Default for CsvSentimentSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SentimentSource for CsvSentimentSource {
    async fn load(&self, location: &str) -> Result<Vec<EngagementRecord>, PipelineError> {
        let text = self.read_location(location).await?;
        let records = parse_engagement_csv(&text)?;
        tracing::info!("Loaded {} engagement records from {}", records.len(), location);
        Ok(records)
    }
}

/// Parse the engagement CSV. Column names are matched case-insensitively and
/// ignoring punctuation, so both `likeCount` and `twitterLikes` are accepted.
/// Blank counts load as NaN (they never pass the engagement threshold).
pub fn parse_engagement_csv(text: &str) -> Result<Vec<EngagementRecord>, PipelineError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers = reader
        .headers()
        .map_err(|e| PipelineError::DataSource(format!("malformed sentiment CSV header: {}", e)))?
        .clone();
    let normalized: Vec<String> = headers.iter().map(normalize_header).collect();

    let date_idx = find_column(&normalized, DATE_COLUMNS, "date")?;
    let symbol_idx = find_column(&normalized, SYMBOL_COLUMNS, "symbol")?;
    let like_idx = find_column(&normalized, LIKE_COLUMNS, "likeCount")?;
    let comment_idx = find_column(&normalized, COMMENT_COLUMNS, "commentCount")?;

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row.map_err(|e| PipelineError::DataSource(format!("malformed sentiment CSV: {}", e)))?;
        let line = row.position().map(|p| p.line()).unwrap_or_default();

        let symbol = row.get(symbol_idx).unwrap_or_default().to_uppercase();
        if symbol.is_empty() {
            continue;
        }

        records.push(EngagementRecord {
            date: parse_date(row.get(date_idx).unwrap_or_default(), line)?,
            symbol,
            like_count: parse_count(row.get(like_idx).unwrap_or_default(), "likeCount", line)?,
            comment_count: parse_count(row.get(comment_idx).unwrap_or_default(), "commentCount", line)?,
        });
    }

    Ok(records)
}

fn normalize_header(header: &str) -> String {
    header
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_lowercase()
}

fn find_column(headers: &[String], aliases: &[&str], name: &str) -> Result<usize, PipelineError> {
    headers
        .iter()
        .position(|h| aliases.contains(&h.as_str()))
        .ok_or_else(|| {
            PipelineError::DataSource(format!("sentiment data is missing required column '{}'", name))
        })
}

/// Accepts `YYYY-MM-DD` with an optional time suffix.
fn parse_date(value: &str, line: u64) -> Result<NaiveDate, PipelineError> {
    value
        .get(..10)
        .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
        .ok_or_else(|| PipelineError::DataSource(format!("line {}: invalid date '{}'", line, value)))
}

fn parse_count(value: &str, column: &str, line: u64) -> Result<f64, PipelineError> {
    if value.is_empty() {
        return Ok(f64::NAN);
    }
    value.parse::<f64>().map_err(|_| {
        PipelineError::DataSource(format!("line {}: invalid {} '{}'", line, column, value))
    })
}
