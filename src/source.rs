//! Metric Source Adapter (spec.md §4.F): the boundary between the engine and
//! a Grafana-compatible data source, plus the registry of known instances
//! and the individual metrics configured against them.

use crate::error::Result;
use crate::http::HttpTransport;
use crate::processor::Sample;
use crate::store::model::{GrafanaInstance, IndividualMetric};
use crate::store::Store;
use std::sync::Arc;
use std::time::Duration;

pub trait MetricSource: Send + Sync {
    fn get_metric_names(&self, instance_id: &str) -> Result<Vec<String>>;
    fn get_query_for_metric(&self, instance_id: &str, metric_name: &str) -> Result<Option<String>>;
    fn get_last_data_source_type(&self, instance_id: &str) -> Result<Option<String>>;
    fn query_range(&self, instance_id: &str, query: &str, start: i64, end: i64, step_seconds: i64) -> Result<Vec<Sample>>;
}

/// HTTP-backed adapter against a Grafana-style `/query_range`-shaped API,
/// with the instance/metric registry served out of the Cache Store
/// (spec.md §4.D's `grafana_instances`/`grafana_individual_metrics` tables).
pub struct HttpMetricSource {
    store: Arc<Store>,
    transport: HttpTransport,
}

impl HttpMetricSource {
    pub fn new(store: Arc<Store>, transport: HttpTransport) -> Self {
        Self { store, transport }
    }

    pub fn register_instance(&self, instance: &GrafanaInstance) -> Result<()> {
        self.store.upsert_instance(instance)
    }

    pub fn register_metric(&self, metric: &IndividualMetric) -> Result<()> {
        self.store.upsert_individual_metric(metric)
    }

    fn instance_base_url(&self, instance_id: &str) -> Result<Option<String>> {
        Ok(self.store.get_instance(instance_id)?.map(|i| i.base_url))
    }
}

impl MetricSource for HttpMetricSource {
    fn get_metric_names(&self, instance_id: &str) -> Result<Vec<String>> {
        self.store.list_metric_names(instance_id)
    }

    fn get_query_for_metric(&self, instance_id: &str, metric_name: &str) -> Result<Option<String>> {
        self.store.query_for_metric(instance_id, metric_name)
    }

    fn get_last_data_source_type(&self, _instance_id: &str) -> Result<Option<String>> {
        Ok(Some("prometheus".to_string()))
    }

    fn query_range(&self, instance_id: &str, query: &str, start: i64, end: i64, step_seconds: i64) -> Result<Vec<Sample>> {
        let base = self.instance_base_url(instance_id)?.unwrap_or_default();
        let url = format!(
            "{base}/api/v1/query_range?query={}&start={start}&end={end}&step={step_seconds}",
            urlencode(query)
        );
        let body = self.transport.get_json(&url, Some(Duration::from_secs(30)))?;
        Ok(parse_range_response(&body))
    }
}

fn urlencode(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' | '.' | '~' => c.to_string(),
            other => format!("%{:02X}", other as u32),
        })
        .collect()
}

/// Parse a Prometheus-style `{"data":{"result":[{"values":[[ts, "v"], ...]}]}}`
/// body into flat samples, taking the first series and skipping points whose
/// value doesn't parse as a finite float.
fn parse_range_response(body: &serde_json::Value) -> Vec<Sample> {
    let mut out = Vec::new();
    let Some(values) = body
        .get("data")
        .and_then(|d| d.get("result"))
        .and_then(|r| r.as_array())
        .and_then(|arr| arr.first())
        .and_then(|series| series.get("values"))
        .and_then(|v| v.as_array())
    else {
        return out;
    };

    for point in values {
        let Some(pair) = point.as_array() else { continue };
        let (Some(ts), Some(raw_value)) = (pair.first().and_then(|v| v.as_f64()), pair.get(1)) else {
            continue;
        };
        let value = raw_value
            .as_str()
            .and_then(|s| s.parse::<f64>().ok())
            .or_else(|| raw_value.as_f64());
        if let Some(value) = value {
            if value.is_finite() {
                out.push(Sample { timestamp: ts as i64, value });
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_range_response_extracts_finite_points() {
        let body = serde_json::json!({
            "data": {
                "result": [{
                    "values": [[100, "1.5"], [200, "nan"], [300, "2.5"]]
                }]
            }
        });
        let samples = parse_range_response(&body);
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0], Sample { timestamp: 100, value: 1.5 });
        assert_eq!(samples[1], Sample { timestamp: 300, value: 2.5 });
    }

    #[test]
    fn parse_range_response_missing_shape_yields_empty() {
        let body = serde_json::json!({"unexpected": true});
        assert!(parse_range_response(&body).is_empty());
    }

    #[test]
    fn urlencode_keeps_safe_characters_and_escapes_rest() {
        assert_eq!(urlencode("a_b-c.d~e"), "a_b-c.d~e");
        assert_eq!(urlencode("a b"), "a%20b");
        assert_eq!(urlencode("{job=\"x\"}"), "%7Bjob%3D%22x%22%7D");
    }
}
