//! Periodic scrape cycle
//!
//! Each configured metric is processed independently and in order: its
//! resources are fetched, grouped by the metric's label selector, and the
//! counts handed to the reporter. A failure in one metric is logged and the
//! cycle moves on to the next one.

mod r#loop;

#[cfg(test)]
mod tests;

pub use r#loop::{
    CycleResults, ScrapeLoop, ScrapeLoopBuilder, ScrapeState, DEFAULT_SCRAPE_INTERVAL,
};
