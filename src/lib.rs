pub mod archive;
pub mod cache;
pub mod config;
pub mod db;
pub mod dedup;
pub mod humanize;
pub mod import;
pub mod lister;
pub mod observability;
pub mod queue;
pub mod shutdown;
pub mod summary;
pub mod upload;
pub mod worker;
pub mod worklist;
