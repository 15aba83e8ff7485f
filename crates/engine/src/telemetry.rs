use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;
use verifai_common::config::TelemetryConfig;

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("Invalid metrics listen address '{addr}': {detail}")]
    ListenAddr { addr: String, detail: String },

    #[error("Failed to install metrics exporter: {0}")]
    Exporter(String),
}

/// Install the global tracing subscriber.
///
/// Output goes to stderr so interactive prompts on stdout stay readable.
/// `RUST_LOG` refines the default `info` level.
pub fn init_tracing(config: &TelemetryConfig) {
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(tracing::Level::INFO.into());

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    // A second call (tests, embedding) keeps the first subscriber.
    let _ = if config.log_format == "pretty" {
        builder.pretty().try_init()
    } else {
        builder.json().try_init()
    };
}

/// Serve Prometheus metrics on `telemetry.metrics_listen`, when set.
///
/// Must run inside the Tokio runtime.
pub fn install_metrics_exporter(config: &TelemetryConfig) -> Result<Option<SocketAddr>, TelemetryError> {
    let Some(listen) = config.metrics_listen.as_deref() else {
        return Ok(None);
    };

    let addr: SocketAddr = listen.parse().map_err(|e: std::net::AddrParseError| {
        TelemetryError::ListenAddr {
            addr: listen.to_string(),
            detail: e.to_string(),
        }
    })?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| TelemetryError::Exporter(e.to_string()))?;

    tracing::info!(listen = %addr, "Prometheus exporter listening");
    Ok(Some(addr))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_listen_address_is_noop() {
        let config = TelemetryConfig::default();
        assert_eq!(install_metrics_exporter(&config).unwrap(), None);
    }

    #[test]
    fn test_bad_listen_address_rejected() {
        let config = TelemetryConfig {
            log_format: "json".into(),
            metrics_listen: Some("not-an-address".into()),
        };
        let err = install_metrics_exporter(&config).unwrap_err();
        assert!(matches!(err, TelemetryError::ListenAddr { .. }));
    }

    #[test]
    fn test_init_tracing_twice_is_harmless() {
        init_tracing(&TelemetryConfig::default());
        init_tracing(&TelemetryConfig {
            log_format: "pretty".into(),
            metrics_listen: None,
        });
    }
}
