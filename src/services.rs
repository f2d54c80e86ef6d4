pub mod allocation;
pub mod audit;
pub mod billing_service;
pub mod ledger_service;

pub use billing_service::BillingService;
pub use ledger_service::LedgerService;
