//! Alert sinks and non-blocking delivery

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use vault_core::{Alert, AlertConfig, AlertLevel, AlertSink, Result};

/// Sink that only writes alerts to the log
#[derive(Debug, Clone, Default)]
pub struct LogAlertSink;

#[async_trait]
impl AlertSink for LogAlertSink {
    async fn send_alert(&self, alert: &Alert) -> Result<()> {
        match alert.level {
            AlertLevel::Warning => warn!(level = %alert.level, "ALERT: {}", alert.message),
            AlertLevel::Error | AlertLevel::Critical => {
                error!(level = %alert.level, "ALERT: {}", alert.message)
            }
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    level: AlertLevel,
    message: &'a str,
}

/// Sink that POSTs `{level, message}` to a notification endpoint
#[derive(Debug, Clone)]
pub struct WebhookAlertSink {
    client: Client,
    url: String,
}

impl WebhookAlertSink {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| vault_core::Error::config(format!("Failed to build alert client: {}", e)))?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl AlertSink for WebhookAlertSink {
    async fn send_alert(&self, alert: &Alert) -> Result<()> {
        let payload = WebhookPayload {
            level: alert.level,
            message: &alert.message,
        };

        let response = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| vault_core::Error::transient_io(format!("Alert delivery failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(vault_core::Error::transient_io(format!(
                "Alert endpoint returned {}",
                response.status()
            )));
        }

        debug!("Delivered {} alert to {}", alert.level, self.url);
        Ok(())
    }
}

/// Build the sink selected by the alert configuration
pub fn create_alert_sink(config: &AlertConfig) -> Result<Arc<dyn AlertSink>> {
    match &config.webhook_url {
        Some(url) => {
            info!("Delivering alerts to webhook {}", url);
            Ok(Arc::new(WebhookAlertSink::new(url.clone(), config.timeout())?))
        }
        None => {
            info!("No alert webhook configured, alerts will only be logged");
            Ok(Arc::new(LogAlertSink))
        }
    }
}

/// Delivery statistics
#[derive(Debug, Default)]
pub struct DeliveryStats {
    pub delivered: AtomicU64,
    pub failed: AtomicU64,
}

/// Hands alerts to a sink on a background task with a bounded wait.
///
/// Delivery failures and timeouts are logged and counted; callers never see them.
#[derive(Clone)]
pub struct AlertDispatcher {
    sink: Arc<dyn AlertSink>,
    timeout: Duration,
    stats: Arc<DeliveryStats>,
}

impl AlertDispatcher {
    pub fn new(sink: Arc<dyn AlertSink>, timeout: Duration) -> Self {
        Self {
            sink,
            timeout,
            stats: Arc::new(DeliveryStats::default()),
        }
    }

    /// Queue `alert` for delivery and return immediately
    pub fn dispatch(&self, alert: Alert) -> JoinHandle<()> {
        let sink = Arc::clone(&self.sink);
        let stats = Arc::clone(&self.stats);
        let timeout = self.timeout;

        tokio::spawn(async move {
            match tokio::time::timeout(timeout, sink.send_alert(&alert)).await {
                Ok(Ok(())) => {
                    stats.delivered.fetch_add(1, Ordering::Relaxed);
                }
                Ok(Err(e)) => {
                    stats.failed.fetch_add(1, Ordering::Relaxed);
                    warn!("Failed to deliver {} alert '{}': {}", alert.level, alert.message, e);
                }
                Err(_) => {
                    stats.failed.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        "Alert delivery timed out after {:?}: '{}'",
                        timeout, alert.message
                    );
                }
            }
        })
    }

    pub fn stats(&self) -> &DeliveryStats {
        &self.stats
    }
}

impl std::fmt::Debug for AlertDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlertDispatcher")
            .field("timeout", &self.timeout)
            .field("stats", &self.stats)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vault_core::RecordingAlertSink;

    struct HangingSink;

    #[async_trait]
    impl AlertSink for HangingSink {
        async fn send_alert(&self, _alert: &Alert) -> Result<()> {
            std::future::pending::<()>().await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_dispatch_delivers_to_sink() {
        let sink = RecordingAlertSink::new();
        let dispatcher = AlertDispatcher::new(Arc::new(sink.clone()), Duration::from_secs(1));

        dispatcher.dispatch(Alert::critical("array degraded")).await.unwrap();

        let alerts = sink.alerts().await;
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].level, AlertLevel::Critical);
        assert_eq!(dispatcher.stats().delivered.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_hanging_sink_times_out() {
        let dispatcher = AlertDispatcher::new(Arc::new(HangingSink), Duration::from_millis(20));

        dispatcher.dispatch(Alert::warning("slow")).await.unwrap();
        assert_eq!(dispatcher.stats().failed.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_unreachable_webhook_is_transient() {
        let sink = WebhookAlertSink::new("http://127.0.0.1:1/notify", Duration::from_millis(500)).unwrap();
        let err = sink.send_alert(&Alert::error("drive failing")).await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_log_sink_never_fails() {
        LogAlertSink.send_alert(&Alert::warning("hot")).await.unwrap();
    }

    #[test]
    fn test_create_alert_sink_selects_webhook() {
        let config = AlertConfig {
            webhook_url: Some("http://localhost:9000/notify".to_string()),
            ..Default::default()
        };
        assert!(create_alert_sink(&config).is_ok());
        assert!(create_alert_sink(&AlertConfig::default()).is_ok());
    }

    #[test]
    fn test_webhook_payload_shape() {
        let payload = WebhookPayload {
            level: AlertLevel::Error,
            message: "boom",
        };
        assert_eq!(
            serde_json::to_value(&payload).unwrap(),
            serde_json::json!({"level": "error", "message": "boom"})
        );
    }
}
