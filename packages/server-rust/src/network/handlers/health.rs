//! Health, liveness and readiness endpoints.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use super::AppState;
use crate::network::Phase;

#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub phase: Phase,
    pub in_flight: u64,
    pub uptime_secs: u64,
    /// Registered service names, the fallback entry included.
    pub services: Vec<String>,
}

/// Always 200; the `phase` field says whether the server is really serving.
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthReport> {
    Json(HealthReport {
        phase: state.lifecycle.phase(),
        in_flight: state.lifecycle.in_flight(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        services: state
            .dispatcher
            .registries()
            .services
            .names()
            .map(str::to_string)
            .collect(),
    })
}

/// 200 while the process is responsive.
pub async fn liveness_handler() -> StatusCode {
    StatusCode::OK
}

/// 200 while serving, 503 while starting or draining.
pub async fn readiness_handler(State(state): State<AppState>) -> StatusCode {
    if state.lifecycle.is_serving() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Instant;

    use serde_json::json;

    use super::*;
    use crate::config::DispatchConfig;
    use crate::dispatch::{Dispatcher, Registries};
    use crate::network::Lifecycle;

    fn test_state() -> AppState {
        AppState {
            dispatcher: Arc::new(Dispatcher::new(Registries::stock(), DispatchConfig::default())),
            lifecycle: Arc::new(Lifecycle::new()),
            body_limit: 1024,
            start_time: Instant::now(),
        }
    }

    #[tokio::test]
    async fn health_reports_phase_and_counters() {
        let state = test_state();
        state.lifecycle.set_phase(Phase::Serving);
        let _guard = state.lifecycle.track();

        let json = serde_json::to_value(health_handler(State(state)).await.0).unwrap();
        assert_eq!(json["phase"], "serving");
        assert_eq!(json["in_flight"], 1);
        assert!(json["uptime_secs"].is_number());
        let services = json["services"].as_array().unwrap();
        assert!(services.contains(&json!("ping")));
        assert!(services.contains(&json!("doc")));
    }

    #[tokio::test]
    async fn health_reports_draining() {
        let state = test_state();
        state.lifecycle.request_stop();
        let report = health_handler(State(state)).await.0;
        assert_eq!(report.phase, Phase::Draining);
    }

    #[tokio::test]
    async fn liveness_is_always_ok() {
        assert_eq!(liveness_handler().await, StatusCode::OK);
    }

    #[tokio::test]
    async fn readiness_follows_phase() {
        let state = test_state();
        assert_eq!(readiness_handler(State(state.clone())).await, StatusCode::SERVICE_UNAVAILABLE);

        state.lifecycle.set_phase(Phase::Serving);
        assert_eq!(readiness_handler(State(state.clone())).await, StatusCode::OK);

        state.lifecycle.request_stop();
        assert_eq!(readiness_handler(State(state)).await, StatusCode::SERVICE_UNAVAILABLE);
    }
}
