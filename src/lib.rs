pub mod config;
pub mod debts;
pub mod output;
pub mod planner;
pub mod server;
