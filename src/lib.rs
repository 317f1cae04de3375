//! Assessment scoring and ILO attainment engine, plus the JSON-lines sidecar
//! that persists courses in a SQLite workspace.

pub mod attainment;
pub mod criteria;
pub mod db;
pub mod error;
pub mod grade;
pub mod ipc;
pub mod model;
pub mod outcomes;
pub mod snapshot;
pub mod telemetry;
pub mod transmute;
