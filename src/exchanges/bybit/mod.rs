//! Bybit v5 REST integration: signed client, linear derivatives exchange and
//! the public announcements feed.

mod announcements;
mod client;
mod exchange;

pub use announcements::BybitAnnouncementFeed;
pub use client::{Client, ClientConfig, ClientError, MAINNET_API_URL, TESTNET_API_URL};
pub use exchange::BybitExchange;
