pub mod agent;
pub mod core;
pub mod inference;
pub mod ledger;
pub mod protocol;
