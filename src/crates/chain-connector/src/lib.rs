//! HTTP connector for chainflow
//!
//! Maps the core's outbound callback traits onto HTTP POST on conventional
//! paths, and exposes the inbound surface peer supervisors and clients talk
//! to. The core stays transport-agnostic; everything HTTP lives here.

pub mod api;
pub mod callbacks;
pub mod config;

pub use callbacks::{
    http_callbacks, HttpBroadcastPre, HttpBroadcastSetup, HttpNodeStatusBroadcast,
    HttpProcessCallback, HttpRemoteService, HttpReportingSink, NOTIFY_PATH, PRE_PATH, RUN_PATH,
    SETUP_PATH, STATUS_PATH,
};
pub use config::ConnectorConfig;
