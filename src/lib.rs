pub mod address;
pub mod app;
pub mod chain;
pub mod claim;
pub mod client;
pub mod eligibility;
pub mod error;
pub mod index;
pub mod resolver;
pub mod session;
pub mod state;
pub mod submitter;
pub mod tracker;
pub mod wallet;
