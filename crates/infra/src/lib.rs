//! Infrastructure layer: document storage, transactional write paths and jobs.
//!
//! Every write to shared state (counters, wallets, stock entries, lots) goes
//! through `CommitCoordinator` or `ProductionEngine`; both commit through
//! `unit_of_work::run_transaction`.

pub mod config;
pub mod coordinator;
pub mod document_store;
pub mod error;
pub mod genealogy;
pub mod profiles;
pub mod reconciliation;
pub mod unit_of_work;


pub use config::LedgerConfig;
pub use coordinator::{CommitCoordinator, PostingReceipt};
pub use document_store::{DocumentStore, InMemoryDocumentStore, StoreError};
pub use error::CommitError;
pub use genealogy::{GenealogyQuery, ProductionEngine};
pub use profiles::{InMemoryProfileDirectory, ProfileDirectory};
pub use reconciliation::{ReconciliationJob, ReconciliationReport, WalletReconciliation};
