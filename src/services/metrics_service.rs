use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

/// Thin statsd wrapper for API-side counters and timings. When no statsd
/// address is configured the service is a no-op, so handlers never have to
/// care whether metrics are wired up.
#[derive(Clone)]
pub struct MetricsService {
    client: Option<Arc<statsd::Client>>,
}

impl MetricsService {
    pub fn new(addr: Option<&str>, prefix: &str) -> Self {
        let client = addr.and_then(|addr| match statsd::Client::new(addr, prefix) {
            Ok(client) => Some(Arc::new(client)),
            Err(e) => {
                warn!("statsd client unavailable, metrics disabled: {}", e);
                None
            }
        });
        Self { client }
    }

    pub fn disabled() -> Self {
        Self { client: None }
    }

    fn metric_name(name: &str, tags: Option<&HashMap<String, String>>) -> String {
        let Some(tags) = tags else {
            return name.to_string();
        };
        let mut keys: Vec<&String> = tags.keys().collect();
        keys.sort();
        let suffix: Vec<&str> = keys.iter().map(|k| tags[*k].as_str()).collect();
        if suffix.is_empty() {
            name.to_string()
        } else {
            format!("{}.{}", name, suffix.join("."))
        }
    }

    pub fn increment(&self, name: &str, tags: Option<HashMap<String, String>>) {
        if let Some(client) = &self.client {
            client.incr(&Self::metric_name(name, tags.as_ref()));
        }
    }

    pub fn timing(&self, name: &str, elapsed: Duration, tags: Option<HashMap<String, String>>) {
        if let Some(client) = &self.client {
            client.timer(&Self::metric_name(name, tags.as_ref()), elapsed.as_millis() as f64);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_are_appended_in_key_order() {
        let mut tags = HashMap::new();
        tags.insert("endpoint".to_string(), "submit".to_string());
        tags.insert("outcome".to_string(), "hit".to_string());
        assert_eq!(
            MetricsService::metric_name("api_latency", Some(&tags)),
            "api_latency.submit.hit"
        );
        assert_eq!(MetricsService::metric_name("api_latency", None), "api_latency");
    }

    #[test]
    fn disabled_service_is_a_noop() {
        // Must not panic or block without a backend.
        let metrics = MetricsService::disabled();
        metrics.increment("api_success", None);
        metrics.timing("api_latency", Duration::from_millis(5), None);
    }
}
