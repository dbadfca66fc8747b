// src/lib.rs
// BRANDSCOPE CORE
// Brand and competitor research: discover a brand's site, crawl it, gather
// news and social evidence, enrich with e-commerce listings, compare rivals.

pub mod analyst;
pub mod api;
pub mod brain;
pub mod config;
pub mod crawler;
pub mod discovery;
pub mod error;
pub mod extract;
pub mod fetcher;
pub mod orchestrator;
pub mod pricing;
pub mod progress;
pub mod quality;
pub mod report;
pub mod reporter;
pub mod retry;
pub mod scout;
pub mod search;
pub mod shopping;

pub use config::{load_config, ResearchConfig};
pub use error::ResearchError;
pub use orchestrator::{Collaborators, ResearchOrchestrator, ResearchRequest, ResearchRun};
pub use report::ResearchReport;
