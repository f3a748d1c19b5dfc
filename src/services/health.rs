//! Health check HTTP server
//!
//! Liveness and readiness probes for process supervision (systemd, k8s) and
//! a Prometheus metrics endpoint.

use crate::services::reconciler::TickReport;
use crate::services::Metrics;
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

/// Health status for a component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    fn worst(self, other: HealthStatus) -> HealthStatus {
        match (self, other) {
            (HealthStatus::Unhealthy, _) | (_, HealthStatus::Unhealthy) => HealthStatus::Unhealthy,
            (HealthStatus::Degraded, _) | (_, HealthStatus::Degraded) => HealthStatus::Degraded,
            _ => HealthStatus::Healthy,
        }
    }
}

/// Component health check result
#[derive(Debug, Clone, Serialize)]
pub struct ComponentHealth {
    pub name: String,
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Overall health response
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub timestamp: DateTime<Utc>,
    pub uptime_seconds: u64,
    pub ticks: u64,
    pub bound_channels: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_tick_at: Option<DateTime<Utc>>,
    pub components: Vec<ComponentHealth>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_tick: Option<TickReport>,
}

/// Shared state, written by the run loop and read by the handlers
pub struct HealthState {
    pub started_at: DateTime<Utc>,
    pub metrics: Arc<Metrics>,
    /// A tick older than this many seconds marks the bot unhealthy
    pub stale_after_secs: u64,
    pub bound_channels: AtomicUsize,
    last_tick_at: RwLock<Option<DateTime<Utc>>>,
    last_report: RwLock<Option<TickReport>>,
}

impl HealthState {
    pub fn new(metrics: Arc<Metrics>, interval_secs: u64) -> Self {
        Self {
            started_at: Utc::now(),
            metrics,
            stale_after_secs: interval_secs.saturating_mul(3).max(60),
            bound_channels: AtomicUsize::new(0),
            last_tick_at: RwLock::new(None),
            last_report: RwLock::new(None),
        }
    }

    /// Record a completed tick
    pub async fn record_tick(&self, report: &TickReport, bound_channels: usize) {
        self.metrics.record_tick(report);
        self.bound_channels.store(bound_channels, Ordering::SeqCst);
        *self.last_tick_at.write().await = Some(Utc::now());
        *self.last_report.write().await = Some(report.clone());
    }

    /// Ready once the first tick has completed
    pub async fn is_ready(&self) -> bool {
        self.last_tick_at.read().await.is_some()
    }

    pub async fn get_health(&self) -> HealthResponse {
        let now = Utc::now();
        let last_tick_at = *self.last_tick_at.read().await;
        let last_report = self.last_report.read().await.clone();
        let mut components = Vec::new();

        let (scheduler_status, scheduler_message) = match last_tick_at {
            None => (HealthStatus::Degraded, Some("No tick completed yet".to_string())),
            Some(at) => {
                let age = (now - at).num_seconds().max(0) as u64;
                if age > self.stale_after_secs {
                    (
                        HealthStatus::Unhealthy,
                        Some(format!("Last tick {}s ago", age)),
                    )
                } else {
                    (HealthStatus::Healthy, None)
                }
            }
        };
        components.push(ComponentHealth {
            name: "scheduler".to_string(),
            status: scheduler_status,
            message: scheduler_message,
        });

        if let Some(report) = &last_report {
            let fetch_status = if report.fetch_failures.is_empty() {
                HealthStatus::Healthy
            } else {
                HealthStatus::Degraded
            };
            components.push(ComponentHealth {
                name: "sources".to_string(),
                status: fetch_status,
                message: (!report.fetch_failures.is_empty()).then(|| {
                    let failed: Vec<String> =
                        report.fetch_failures.iter().map(|f| f.to_string()).collect();
                    format!("Serving stale data for {}", failed.join(", "))
                }),
            });

            let platform_status = if report.rename_failed.is_empty() {
                HealthStatus::Healthy
            } else {
                HealthStatus::Degraded
            };
            components.push(ComponentHealth {
                name: "platform".to_string(),
                status: platform_status,
                message: (!report.rename_failed.is_empty())
                    .then(|| format!("{} renames failed", report.rename_failed.len())),
            });
        }

        let status = components
            .iter()
            .fold(HealthStatus::Healthy, |acc, c| acc.worst(c.status));

        HealthResponse {
            status,
            timestamp: now,
            uptime_seconds: (now - self.started_at).num_seconds().max(0) as u64,
            ticks: self.metrics.ticks.load(Ordering::Relaxed),
            bound_channels: self.bound_channels.load(Ordering::SeqCst),
            last_tick_at,
            components,
            last_tick: last_report,
        }
    }
}

/// Health check server
pub struct HealthServer {
    state: Arc<HealthState>,
    port: u16,
}

impl HealthServer {
    pub fn new(state: Arc<HealthState>, port: u16) -> Self {
        Self { state, port }
    }

    pub fn router(state: Arc<HealthState>) -> Router {
        Router::new()
            .route("/health", get(health_handler))
            .route("/healthz", get(liveness_handler))
            .route("/readyz", get(readiness_handler))
            .route("/metrics", get(metrics_handler))
            .with_state(state)
    }

    /// Serve until the process exits
    pub async fn run(&self) -> crate::Result<()> {
        let app = Self::router(Arc::clone(&self.state));

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        info!("Starting health server on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app)
            .await
            .map_err(|e| crate::StatBotError::Internal(format!("Health server error: {}", e)))?;

        Ok(())
    }
}

async fn health_handler(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    let health = state.get_health().await;
    let status_code = match health.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status_code, Json(health))
}

async fn liveness_handler() -> impl IntoResponse {
    StatusCode::OK
}

async fn readiness_handler(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    if state.is_ready().await {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

async fn metrics_handler(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    let health = state.get_health().await;
    let up = match health.status {
        HealthStatus::Healthy => 1,
        HealthStatus::Degraded => 0,
        HealthStatus::Unhealthy => -1,
    };

    let body = format!(
        "# HELP statbot_up Health status (1=healthy, 0=degraded, -1=unhealthy)\n\
         # TYPE statbot_up gauge\n\
         statbot_up {}\n\n\
         # HELP statbot_uptime_seconds Uptime in seconds\n\
         # TYPE statbot_uptime_seconds counter\n\
         statbot_uptime_seconds {}\n\n\
         # HELP statbot_bound_channels Channels bound in the registry\n\
         # TYPE statbot_bound_channels gauge\n\
         statbot_bound_channels {}\n\n{}",
        up,
        health.uptime_seconds,
        health.bound_channels,
        state.metrics.prometheus()
    );

    (
        StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; charset=utf-8",
        )],
        body,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{StatFamily, StatRole};
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn state() -> Arc<HealthState> {
        Arc::new(HealthState::new(Arc::new(Metrics::new()), 300))
    }

    async fn request(state: Arc<HealthState>, uri: &str) -> (StatusCode, String) {
        let resp = HealthServer::router(state)
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_not_ready_before_first_tick() {
        let state = state();
        assert_eq!(request(state.clone(), "/healthz").await.0, StatusCode::OK);
        assert_eq!(
            request(state.clone(), "/readyz").await.0,
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(state.get_health().await.status, HealthStatus::Degraded);
    }

    #[tokio::test]
    async fn test_ready_and_healthy_after_clean_tick() {
        let state = state();
        let report = TickReport {
            tick: 1,
            renamed: vec![StatRole::price("btc")],
            ..TickReport::default()
        };
        state.record_tick(&report, 3).await;

        assert_eq!(request(state.clone(), "/readyz").await.0, StatusCode::OK);
        let (status, body) = request(state.clone(), "/health").await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["bound_channels"], 3);
        assert_eq!(json["last_tick"]["renamed"][0], "price:btc");
    }

    #[tokio::test]
    async fn test_fetch_failures_degrade() {
        let state = state();
        let report = TickReport {
            tick: 1,
            fetch_failures: vec![StatFamily::FloorPrice],
            ..TickReport::default()
        };
        state.record_tick(&report, 1).await;

        let health = state.get_health().await;
        assert_eq!(health.status, HealthStatus::Degraded);
        let sources = health
            .components
            .iter()
            .find(|c| c.name == "sources")
            .unwrap();
        assert_eq!(
            sources.message.as_deref(),
            Some("Serving stale data for floor_price")
        );
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let state = state();
        state
            .record_tick(
                &TickReport {
                    renamed: vec![StatRole::FloorPrice],
                    ..TickReport::default()
                },
                1,
            )
            .await;
        let (status, body) = request(state, "/metrics").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("statbot_up 1\n"));
        assert!(body.contains("statbot_renames_total 1\n"));
    }
}
