//! SNMP polling agent that maps device OIDs to typed metric samples.
//!
//! A declaration file names reusable data definitions (which OIDs make up
//! a metric) and hosts (where to read them), and binds them together.
//! Each read cycle opens a short-lived session per host, reads every
//! bound definition, and dispatches one sample per metric instance.

pub mod binder;
pub mod config;
pub mod metrics;
pub mod oid;
pub mod poller;
pub mod registry;
pub mod schema;
pub mod secret;
pub mod snmp;
pub mod value;
