//! # Roost Client
//!
//! Keeps local [`roost_engine::LiveCollection`]s in sync with a BaaS.
//!
//! - [`BaasClient`] lists records over HTTP and owns the realtime connection
//! - [`RealtimeClient`] subscribes to change events over Server-Sent Events
//! - [`LiveQuery`] seeds a collection, applies live events, and resyncs after
//!   reconnects
//! - [`Inquiry`] is the typed view of the `messages` collection
//!
//! ```no_run
//! use roost_client::{BaasClient, ClientConfig, LiveQuery, LiveQueryConfig};
//!
//! # async fn run() -> roost_client::Result<()> {
//! let client = BaasClient::new(ClientConfig::new("http://127.0.0.1:8090"))?;
//! let mut query = LiveQuery::start(&client, LiveQueryConfig::inquiries("prop_1")).await?;
//!
//! query.collection().on_change(|change| println!("{:?}", change));
//! // ...
//! query.stop();
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod config;
pub mod error;
pub mod inquiry;
pub mod live;
pub mod realtime;

pub use api::{BaasClient, ListPage, ListQuery};
pub use config::{ClientConfig, ConfigError};
pub use error::{ClientError, Result};
pub use inquiry::{Inquiry, InquiryKind, InquiryStatus};
pub use live::{LiveQuery, LiveQueryConfig};
pub use realtime::{
    HandlerSubscription, RealtimeClient, RealtimeMessage, SubscribeOptions, Subscription,
};
