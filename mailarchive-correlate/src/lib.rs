//! Delivery tracking from the transport daemon's syslog stream.
//!
//! Accepting a message over SMTP says nothing about whether it was delivered
//! afterwards. The transport daemon does report that, but only in its own
//! vocabulary of queue IDs, spread over many unordered log lines. This crate
//! puts those lines back together:
//!
//! - [`CorrelationEngine`] classifies lines, ties queue IDs to `Message-ID`s
//!   and derives a status for each queue ID
//! - [`CorrelationWorker`] feeds the engine one line at a time
//! - [`Reconciler`] copies changed statuses onto the archived messages
//! - [`Sweeper`] drops messages past their retention, with their trail

mod config;
mod engine;
mod error;
mod pending;
mod reconcile;
pub mod rules;
mod state;
mod sweep;
mod worker;

pub use config::{CorrelationConfig, ReconcilerConfig, RetentionConfig};
pub use engine::{CorrelationEngine, LineOutcome};
pub use error::CorrelationError;
pub use pending::PendingUpdates;
pub use reconcile::{ReconcileReport, Reconciler};
pub use rules::{Classification, Classifier, RuleKind};
pub use state::{ConnectionState, InFlight, PendingConnection};
pub use sweep::{SweepReport, Sweeper};
pub use worker::{CorrelationWorker, SyslogSender, channel};
