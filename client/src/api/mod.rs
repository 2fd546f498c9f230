//! HTTP access to the BaaS REST API.

mod client;
mod records;

pub use client::BaasClient;
pub(crate) use client::{authorize, check, endpoint};
pub use records::{ListPage, ListQuery};
