//! Driver layer for browser automation.
//!
//! This crate connects to a WebDriver endpoint and exposes pages that the
//! cache executor can drive.
//!
//! - [`reprise_browser::driver::RepriseDriver`]: WebDriver client wrapper
//! - [`reprise_browser::page::BrowserPage`]: DOM helpers plus the LLM-backed
//!   [`reprise_cache::Resolver`] and [`reprise_cache::PageContext`] implementations
//! - [`reprise_browser::prompt`]: observation prompt and reply parsing
pub mod reprise_browser;
