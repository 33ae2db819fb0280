pub mod benchmark;
pub mod ledger;
pub mod tasks;
