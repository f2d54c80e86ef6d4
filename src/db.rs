pub mod billing_repo;
pub use billing_repo::BillingRepository;
pub mod ledger_repo;
pub use ledger_repo::LedgerRepository;
