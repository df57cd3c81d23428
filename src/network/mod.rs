//! Stylesheet retrieval
//!
//! One external I/O boundary: fetching stylesheet text. Everything above it
//! (caching, request coalescing, ordered batch delivery) lives in
//! [`Downloader`]; the wire itself is behind the [`Fetcher`] trait.

pub mod download;

pub use download::{Downloader, Fetcher, HttpFetcher, StaticFetcher};
