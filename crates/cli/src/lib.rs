//! Administrative layer for Temporal Graph Retrieval

pub mod commands;

pub use commands::{
    run_fuse, run_ingest, strategy_listing, FuseRequest, IngestReport, IngestRequest,
    StrategyListing,
};
