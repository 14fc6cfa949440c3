//! Counting engine: before-count fetcher, live counters and the merge

pub mod before;
pub mod builder;
pub mod live;
pub mod merge;

pub use before::{BeforeFetcher, FetchPolicy};
pub use builder::CounterEngineBuilder;
pub use live::LiveCounter;
pub use merge::CounterEngine;
