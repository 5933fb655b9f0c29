pub mod alert_dispatcher;
pub mod http_client;
pub mod incident_recorder;
pub mod kv_store;
