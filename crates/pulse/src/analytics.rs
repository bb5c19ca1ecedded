//! Read-only tools over a product-analytics snapshot.
//!
//! The snapshot is loaded once from a JSON export and shared read-only by
//! every tool, so a reply turn never observes the data changing under it.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use indoc::indoc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::errors::{AgentError, AgentResult};
use crate::models::tool::ToolSpec;
use crate::tool::{Tool, ToolRegistry};

/// Event counts keyed by ISO date. BTreeMap keeps dates sorted, which the
/// trend and period tools rely on.
pub type DailySeries = BTreeMap<String, i64>;

/// One scraped analytics export.
///
/// Events live in a BTreeMap so key iteration order is stable; fuzzy name
/// resolution is first-match-wins, so an unordered map would make matches
/// irreproducible.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalyticsSnapshot {
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub date_range: Option<Value>,
    #[serde(default)]
    pub scraped_at: Option<String>,
    #[serde(default)]
    pub summary: Value,
    #[serde(default)]
    pub events: BTreeMap<String, DailySeries>,
}

impl AnalyticsSnapshot {
    pub fn from_path<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("could not read analytics data from {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("could not parse analytics data in {}", path.display()))
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn available_events(&self) -> Vec<String> {
        self.events.keys().cloned().collect()
    }

    /// Resolve a caller-supplied event name against the stored keys.
    ///
    /// Permissive on purpose: after normalizing (lowercase, spaces and
    /// hyphens to underscores), a key matches on equality or when either
    /// side is a substring of the other, and the first match in sorted key
    /// order wins. "Signup Completed" therefore finds `signup_completed`,
    /// but an ambiguous query like "signup" resolves to whichever matching
    /// key sorts first.
    pub fn resolve_event(&self, name: &str) -> Option<(&str, &DailySeries)> {
        let query = normalize_event_name(name);
        for (key, series) in &self.events {
            let key_norm = normalize_event_name(key);
            if key_norm == query || key_norm.contains(&query) || query.contains(&key_norm) {
                return Some((key.as_str(), series));
            }
        }
        None
    }
}

fn normalize_event_name(name: &str) -> String {
    name.to_lowercase().replace(' ', "_").replace('-', "_")
}

fn no_data() -> Value {
    json!({ "error": "No analytics data available" })
}

fn event_not_found(snapshot: &AnalyticsSnapshot, name: &str) -> Value {
    json!({
        "error": format!("Event '{}' not found", name),
        "available_events": snapshot.available_events(),
    })
}

fn arg_str<'a>(arguments: &'a Value, key: &str) -> Option<&'a str> {
    arguments.get(key).and_then(Value::as_str)
}

/// The directive the agent runs under when wired to this toolkit.
pub const SYSTEM_PROMPT: &str = indoc! {r#"
    You are a business analyst for a consumer product team. You have access to
    the team's product-analytics data through tools, and you MUST use them to
    answer questions with real numbers.

    ## Always use tools
    - NEVER make up or guess numbers.
    - ALWAYS call tools to get real data before answering.
    - Start with get_business_summary if you need to see which metrics exist.
    - Use several tools when one is not enough to answer the question.

    ## Available tools
    1. get_business_summary - overview of all metrics; use first to see what's available
    2. get_metric_data - daily data and statistics for one event
    3. get_daily_trend - day-over-day changes for recent days
    4. calculate_conversion - funnel conversion between two events
    5. compare_periods - compare a metric between two time periods

    ## Response format
    After gathering data with tools, provide:
    1. TL;DR - one sentence answer
    2. Key numbers - the specific metrics
    3. Insight - what it means
    4. Recommendation - what to do, if applicable
"#};

/// Overview of every metric in the snapshot.
pub struct BusinessSummary {
    snapshot: Arc<AnalyticsSnapshot>,
}

impl BusinessSummary {
    pub fn new(snapshot: Arc<AnalyticsSnapshot>) -> Self {
        Self { snapshot }
    }
}

#[async_trait]
impl Tool for BusinessSummary {
    fn spec(&self) -> ToolSpec {
        ToolSpec::new(
            "get_business_summary",
            "Get an overview of all available business metrics and KPIs. Use this FIRST to \
             understand what data is available before making specific queries.",
            json!({
                "type": "object",
                "properties": {},
                "required": []
            }),
        )
    }

    async fn invoke(&self, _arguments: Value) -> AgentResult<Value> {
        if self.snapshot.is_empty() {
            return Ok(no_data());
        }

        Ok(json!({
            "project_id": self.snapshot.project_id,
            "date_range": self.snapshot.date_range,
            "scraped_at": self.snapshot.scraped_at,
            "summary": self.snapshot.summary,
            "available_metrics": self.snapshot.available_events(),
        }))
    }
}

/// Daily values and aggregate statistics for one event.
pub struct MetricData {
    snapshot: Arc<AnalyticsSnapshot>,
}

impl MetricData {
    pub fn new(snapshot: Arc<AnalyticsSnapshot>) -> Self {
        Self { snapshot }
    }
}

#[async_trait]
impl Tool for MetricData {
    fn spec(&self) -> ToolSpec {
        ToolSpec::new(
            "get_metric_data",
            "Get detailed daily data and statistics for a specific metric/event. Returns daily \
             values and aggregate statistics (total, average, max, min).",
            json!({
                "type": "object",
                "properties": {
                    "event_name": {
                        "type": "string",
                        "description": "Name of the event/metric (e.g., 'signup_completed', 'dashboard_viewed')"
                    },
                    "start_date": {
                        "type": "string",
                        "description": "Optional start date filter (YYYY-MM-DD format)"
                    },
                    "end_date": {
                        "type": "string",
                        "description": "Optional end date filter (YYYY-MM-DD format)"
                    }
                },
                "required": ["event_name"]
            }),
        )
    }

    async fn invoke(&self, arguments: Value) -> AgentResult<Value> {
        if self.snapshot.is_empty() {
            return Ok(no_data());
        }

        let event_name = arg_str(&arguments, "event_name").unwrap_or_default();
        let (key, series) = match self.snapshot.resolve_event(event_name) {
            Some(found) => found,
            None => return Ok(event_not_found(&self.snapshot, event_name)),
        };

        let start_date = arg_str(&arguments, "start_date");
        let end_date = arg_str(&arguments, "end_date");
        let filtered: BTreeMap<&str, i64> = series
            .iter()
            .filter(|(date, _)| {
                start_date.is_none_or(|start| date.as_str() >= start)
                    && end_date.is_none_or(|end| date.as_str() <= end)
            })
            .map(|(date, value)| (date.as_str(), *value))
            .collect();

        let values: Vec<i64> = filtered.values().copied().collect();
        let total: i64 = values.iter().sum();
        let average = if values.is_empty() {
            0
        } else {
            (total as f64 / values.len() as f64).round() as i64
        };

        Ok(json!({
            "event": key,
            "data": filtered,
            "stats": {
                "total": total,
                "average": average,
                "max": values.iter().max().copied().unwrap_or(0),
                "min": values.iter().min().copied().unwrap_or(0),
                "days": values.len(),
            }
        }))
    }
}

/// Recent day-over-day movement for one event.
pub struct DailyTrend {
    snapshot: Arc<AnalyticsSnapshot>,
}

impl DailyTrend {
    pub fn new(snapshot: Arc<AnalyticsSnapshot>) -> Self {
        Self { snapshot }
    }
}

#[async_trait]
impl Tool for DailyTrend {
    fn spec(&self) -> ToolSpec {
        ToolSpec::new(
            "get_daily_trend",
            "Get daily trend with day-over-day changes for a metric. Shows recent patterns and \
             momentum.",
            json!({
                "type": "object",
                "properties": {
                    "event_name": {
                        "type": "string",
                        "description": "Name of the event/metric"
                    },
                    "days": {
                        "type": "integer",
                        "description": "Number of recent days to show (default: 7)"
                    }
                },
                "required": ["event_name"]
            }),
        )
    }

    async fn invoke(&self, arguments: Value) -> AgentResult<Value> {
        if self.snapshot.is_empty() {
            return Ok(no_data());
        }

        let event_name = arg_str(&arguments, "event_name").unwrap_or_default();
        let days = arguments
            .get("days")
            .and_then(Value::as_u64)
            .unwrap_or(7) as usize;

        let (key, series) = match self.snapshot.resolve_event(event_name) {
            Some(found) => found,
            None => return Ok(event_not_found(&self.snapshot, event_name)),
        };

        let dates: Vec<&String> = series.keys().collect();
        let recent = &dates[dates.len().saturating_sub(days)..];

        let mut trend = Vec::new();
        for (i, date) in recent.iter().enumerate() {
            let value = series[*date];
            let mut entry = json!({ "date": date, "value": value });

            if i > 0 {
                let prev = series[recent[i - 1]];
                let change = value - prev;
                let change_pct = if prev > 0 {
                    change as f64 / prev as f64 * 100.0
                } else {
                    0.0
                };
                entry["change"] = json!(change);
                entry["change_percent"] = json!(format!("{:+.1}%", change_pct));
            }

            trend.push(entry);
        }

        Ok(json!({
            "event": key,
            "days": days,
            "trend": trend,
        }))
    }
}

/// Funnel conversion between two events.
pub struct CalculateConversion {
    snapshot: Arc<AnalyticsSnapshot>,
}

impl CalculateConversion {
    pub fn new(snapshot: Arc<AnalyticsSnapshot>) -> Self {
        Self { snapshot }
    }
}

#[async_trait]
impl Tool for CalculateConversion {
    fn spec(&self) -> ToolSpec {
        ToolSpec::new(
            "calculate_conversion",
            "Calculate conversion rate between two events (funnel analysis). Shows conversion \
             percentage and drop-off.",
            json!({
                "type": "object",
                "properties": {
                    "start_event": {
                        "type": "string",
                        "description": "The starting event in the funnel (e.g., 'signup_start')"
                    },
                    "end_event": {
                        "type": "string",
                        "description": "The ending event in the funnel (e.g., 'signup_completed')"
                    }
                },
                "required": ["start_event", "end_event"]
            }),
        )
    }

    async fn invoke(&self, arguments: Value) -> AgentResult<Value> {
        if self.snapshot.is_empty() {
            return Ok(no_data());
        }

        let start_event = arg_str(&arguments, "start_event").unwrap_or_default();
        let end_event = arg_str(&arguments, "end_event").unwrap_or_default();

        let (start_key, start_series) = match self.snapshot.resolve_event(start_event) {
            Some(found) => found,
            None => {
                return Ok(json!({
                    "error": format!("Start event '{}' not found", start_event),
                    "available_events": self.snapshot.available_events(),
                }))
            }
        };
        let (end_key, end_series) = match self.snapshot.resolve_event(end_event) {
            Some(found) => found,
            None => {
                return Ok(json!({
                    "error": format!("End event '{}' not found", end_event),
                    "available_events": self.snapshot.available_events(),
                }))
            }
        };

        let start_total: i64 = start_series.values().sum();
        let end_total: i64 = end_series.values().sum();
        let conversion = if start_total > 0 {
            end_total as f64 / start_total as f64 * 100.0
        } else {
            0.0
        };

        Ok(json!({
            "funnel": format!("{} -> {}", start_key, end_key),
            "start_event": { "name": start_key, "total": start_total },
            "end_event": { "name": end_key, "total": end_total },
            "conversion_rate": format!("{:.2}%", conversion),
            "drop_off": format!("{:.2}%", 100.0 - conversion),
        }))
    }
}

/// A metric compared across two date ranges.
pub struct ComparePeriods {
    snapshot: Arc<AnalyticsSnapshot>,
}

impl ComparePeriods {
    pub fn new(snapshot: Arc<AnalyticsSnapshot>) -> Self {
        Self { snapshot }
    }
}

#[async_trait]
impl Tool for ComparePeriods {
    fn spec(&self) -> ToolSpec {
        ToolSpec::new(
            "compare_periods",
            "Compare a metric between two time periods. Useful for week-over-week or custom \
             period comparisons.",
            json!({
                "type": "object",
                "properties": {
                    "event_name": {
                        "type": "string",
                        "description": "Name of the event/metric to compare"
                    },
                    "period1_start": {
                        "type": "string",
                        "description": "Start date of first (current) period (YYYY-MM-DD)"
                    },
                    "period1_end": {
                        "type": "string",
                        "description": "End date of first (current) period (YYYY-MM-DD)"
                    },
                    "period2_start": {
                        "type": "string",
                        "description": "Start date of second (previous) period (YYYY-MM-DD)"
                    },
                    "period2_end": {
                        "type": "string",
                        "description": "End date of second (previous) period (YYYY-MM-DD)"
                    }
                },
                "required": ["event_name", "period1_start", "period1_end", "period2_start", "period2_end"]
            }),
        )
    }

    async fn invoke(&self, arguments: Value) -> AgentResult<Value> {
        if self.snapshot.is_empty() {
            return Ok(no_data());
        }

        let event_name = arg_str(&arguments, "event_name").unwrap_or_default();
        let (key, series) = match self.snapshot.resolve_event(event_name) {
            Some(found) => found,
            None => return Ok(event_not_found(&self.snapshot, event_name)),
        };

        let mut bounds = Vec::new();
        for name in ["period1_start", "period1_end", "period2_start", "period2_end"] {
            match arg_str(&arguments, name) {
                Some(value) => bounds.push(value),
                None => {
                    return Err(AgentError::InvalidArguments(format!(
                        "missing required argument: {name}"
                    )))
                }
            }
        }

        let period_total = |start: &str, end: &str| -> i64 {
            series
                .iter()
                .filter(|(date, _)| date.as_str() >= start && date.as_str() <= end)
                .map(|(_, value)| value)
                .sum()
        };

        let p1_total = period_total(bounds[0], bounds[1]);
        let p2_total = period_total(bounds[2], bounds[3]);
        let change = p1_total - p2_total;
        let change_pct = if p2_total > 0 {
            change as f64 / p2_total as f64 * 100.0
        } else {
            0.0
        };
        let trend = match change.cmp(&0) {
            std::cmp::Ordering::Greater => "up",
            std::cmp::Ordering::Less => "down",
            std::cmp::Ordering::Equal => "flat",
        };

        Ok(json!({
            "event": key,
            "period1": { "range": format!("{} to {}", bounds[0], bounds[1]), "total": p1_total },
            "period2": { "range": format!("{} to {}", bounds[2], bounds[3]), "total": p2_total },
            "comparison": {
                "absolute_change": change,
                "percent_change": format!("{:+.1}%", change_pct),
                "trend": trend,
            }
        }))
    }
}

/// The full analytics toolkit, in the order the model should discover it.
pub fn registry(snapshot: Arc<AnalyticsSnapshot>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(BusinessSummary::new(snapshot.clone()));
    registry.register(MetricData::new(snapshot.clone()));
    registry.register(DailyTrend::new(snapshot.clone()));
    registry.register(CalculateConversion::new(snapshot.clone()));
    registry.register(ComparePeriods::new(snapshot));
    registry
}
