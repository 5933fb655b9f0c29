pub mod alert_dispatchers;
pub mod http_client;
pub mod http_handler;
pub mod incident_log;
pub mod maintenance;
pub mod memory_store;
pub mod middleware;

/// Re-export commonly used types from adapters
pub use alert_dispatchers::{LogAlertDispatcher, WebhookAlertDispatcher};
pub use http_client::HttpClientAdapter;
pub use http_handler::{HttpHandler, router};
pub use incident_log::StoreIncidentRecorder;
pub use maintenance::StoreMaintenance;
pub use memory_store::MemoryStore;
pub use middleware::*;
