//! Pushgateway sink
//!
//! Uses the gateway's standard push API: `PUT /metrics/job/<job>{/<label>/<value>}`
//! replaces every metric in the grouping key with the pushed body.

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE;
use base64::Engine as _;
use reqwest::{header, Client};
use tracing::debug;
use url::Url;

use rowcount_core::{render_push_body, Gauge, LabelSet, MetricName, Sample, EXPOSITION_CONTENT_TYPE};

use super::MetricSink;
use crate::{InfraError, Result};

/// Build the push URL for a grouping key.
///
/// `job` is mandatory and always comes first. Values that are empty or
/// contain `/` use the `<label>@base64/<value>` form.
pub fn grouping_url(address: &str, grouping: &LabelSet) -> Result<Url> {
    let job = grouping
        .get("job")
        .ok_or_else(|| InfraError::Configuration("pushgateway grouping requires a job".into()))?;

    let address = if address.contains("://") {
        address.to_string()
    } else {
        format!("http://{}", address)
    };
    let mut url = Url::parse(&address)?;

    {
        let mut segments = url.path_segments_mut().map_err(|_| {
            InfraError::Configuration(format!("invalid pushgateway address: {}", address))
        })?;
        segments.pop_if_empty().push("metrics");
        push_label(&mut segments, "job", job);
        for (name, value) in grouping.iter().filter(|(name, _)| *name != "job") {
            push_label(&mut segments, name, value);
        }
    }

    Ok(url)
}

fn push_label(segments: &mut url::PathSegmentsMut<'_>, name: &str, value: &str) {
    if value.is_empty() {
        segments.push(&format!("{}@base64", name)).push("=");
    } else if value.contains('/') {
        segments
            .push(&format!("{}@base64", name))
            .push(&URL_SAFE.encode(value));
    } else {
        segments.push(name).push(value);
    }
}

/// Pushes the row count gauge to a Pushgateway every cycle
#[derive(Debug)]
pub struct PushgatewaySink {
    http: Client,
    url: Url,
    metric: MetricName,
    help: String,
    gauge: Gauge,
}

impl PushgatewaySink {
    pub fn new(
        address: &str,
        metric: MetricName,
        help: impl Into<String>,
        grouping: &LabelSet,
    ) -> Result<Self> {
        let url = grouping_url(address, grouping)?;
        let http = Client::builder()
            .user_agent(format!("rowcount-exporter/{}", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            url,
            metric,
            help: help.into(),
            gauge: Gauge::new(),
        })
    }

    /// Current gauge value (last pushed sample)
    pub fn gauge_value(&self) -> f64 {
        self.gauge.get()
    }
}

#[async_trait]
impl MetricSink for PushgatewaySink {
    async fn emit(&self, sample: &Sample) -> Result<()> {
        self.gauge.set(sample.value() as f64);
        let body = render_push_body(&self.metric, &self.help, self.gauge.get());

        debug!(url = %self.url, "Pushing metric");
        let response = self
            .http
            .put(self.url.clone())
            .header(header::CONTENT_TYPE, EXPOSITION_CONTENT_TYPE)
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(InfraError::PushRejected {
                status: status.as_u16(),
                body,
            })
        }
    }

    fn describe(&self) -> String {
        format!("pushgateway {}", self.url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string, header as header_eq, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn grouping(job: &str, instance: &str) -> LabelSet {
        LabelSet::new().with("instance", instance).with("job", job)
    }

    #[test]
    fn test_grouping_url_puts_job_first() {
        let url = grouping_url("http://gateway:9091", &grouping("batch", "db-1")).unwrap();
        assert_eq!(
            url.as_str(),
            "http://gateway:9091/metrics/job/batch/instance/db-1"
        );
    }

    #[test]
    fn test_grouping_url_defaults_scheme_and_keeps_prefix() {
        let url = grouping_url("gateway:9091", &grouping("batch", "db-1")).unwrap();
        assert_eq!(
            url.as_str(),
            "http://gateway:9091/metrics/job/batch/instance/db-1"
        );

        let url = grouping_url("https://metrics.example.com/push/", &grouping("batch", "db-1"))
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://metrics.example.com/push/metrics/job/batch/instance/db-1"
        );
    }

    #[test]
    fn test_grouping_url_encodes_awkward_values() {
        let url = grouping_url("http://gw", &grouping("batch", "10.0.0.1/24")).unwrap();
        assert_eq!(
            url.as_str(),
            "http://gw/metrics/job/batch/instance@base64/MTAuMC4wLjEvMjQ="
        );

        let url = grouping_url("http://gw", &grouping("batch", "")).unwrap();
        assert_eq!(url.as_str(), "http://gw/metrics/job/batch/instance@base64/=");

        let url = grouping_url("http://gw", &grouping("nightly batch", "db")).unwrap();
        assert_eq!(
            url.as_str(),
            "http://gw/metrics/job/nightly%20batch/instance/db"
        );
    }

    #[test]
    fn test_grouping_url_requires_job() {
        let result = grouping_url("http://gw", &LabelSet::new().with("instance", "db"));
        assert!(matches!(result, Err(InfraError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_emit_pushes_gauge() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/metrics/job/batch/instance/db-1"))
            .and(header_eq("content-type", EXPOSITION_CONTENT_TYPE))
            .and(body_string(
                "# HELP orders_rows Row count for table orders\n\
                 # TYPE orders_rows gauge\n\
                 orders_rows 314\n",
            ))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let sink = PushgatewaySink::new(
            &server.uri(),
            MetricName::parse("orders_rows").unwrap(),
            "Row count for table orders",
            &grouping("batch", "db-1"),
        )
        .unwrap();

        sink.emit(&Sample::count(314)).await.unwrap();
        assert_eq!(sink.gauge_value(), 314.0);
    }

    #[tokio::test]
    async fn test_emit_reports_rejection() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad metric"))
            .mount(&server)
            .await;

        let sink = PushgatewaySink::new(
            &server.uri(),
            MetricName::parse("orders_rows").unwrap(),
            "Row count for table orders",
            &grouping("batch", "db-1"),
        )
        .unwrap();

        let err = sink.emit(&Sample::failed()).await.unwrap_err();
        match err {
            InfraError::PushRejected { status, body } => {
                assert_eq!(status, 400);
                assert_eq!(body, "bad metric");
            }
            other => panic!("unexpected error: {}", other),
        }
        assert_eq!(sink.gauge_value(), -1.0);
    }
}
