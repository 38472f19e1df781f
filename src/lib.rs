pub mod chunker;
pub mod configuration;
pub mod domain;
pub mod eligibility;
pub mod error;
pub mod pipeline;
pub mod purger;
pub mod scanner;
pub mod startup;
pub mod store;
pub mod telemetry;
