//! Accepts collectd `write_http` JSON reports and forwards each request as a
//! single batch write to InfluxDB.

pub mod app;
pub mod config;
pub mod domain;
pub mod http;
pub mod ingest;
pub mod metrics;
pub mod readiness;
pub mod shutdown;
pub mod sink;
