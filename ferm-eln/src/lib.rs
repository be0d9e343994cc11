//! # Fermentation lab notebook engine
//!
//! Records the life of a fermentation batch (setup, probe calibration, inoculation,
//! periodic sampling, deviations and closure) and keeps it internally consistent:
//!
//! - [`calc`]: derived quantities from raw manual measurements
//! - [`calibration`]: per-probe pass/fail judgement
//! - [`validation`]: fail-fast checks for every record type ([`RecordInput`])
//! - [`lifecycle`]: the batch state machine and its guards
//! - [`ledger`]: append-only process changes, review-once failures
//! - [`notebook`]: transactional accept/query facade over SQLite
//!
//! HTTP, authentication and rendering live elsewhere; callers hand the engine an
//! [`Actor`] with every write and receive typed records or a [`ferm_common::Error`].

pub mod calc;
pub mod calibration;
pub mod db;
pub mod identity;
pub mod ledger;
pub mod lifecycle;
pub mod models;
pub mod notebook;
pub mod report;
pub mod validation;

pub use identity::{Actor, AuthLevel};
pub use lifecycle::{BatchStatus, Transition};
pub use notebook::Notebook;
pub use report::{BatchRecordSet, TimeOrigin};
pub use validation::RecordInput;
