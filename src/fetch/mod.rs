//! Request/response model and the network client trait.

mod client;
mod types;

pub use client::{Fetcher, HttpFetcher};
pub use types::{Destination, Request, Response};

#[cfg(test)]
pub(crate) use client::testing;
