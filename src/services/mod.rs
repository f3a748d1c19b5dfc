pub mod health;
pub mod metrics;
pub mod reconciler;

pub use health::{ComponentHealth, HealthResponse, HealthServer, HealthState, HealthStatus};
pub use metrics::Metrics;
pub use reconciler::{Fetchers, Reconciler, ReconcilerSettings, TickOutcome, TickReport};
