//! # dvrip-client
//!
//! Async client for the proprietary "DVRIP" / "Sofia" TCP command protocol
//! spoken by a family of network DVR/NVR surveillance devices.
//!
//! The crate speaks the framed, length-prefixed binary transport the devices
//! use: a single TCP socket multiplexes many in-flight request/response
//! exchanges (correlated by message-type code) interleaved with an
//! unsolicited alarm push stream, while a keepalive task derived from the
//! server-advertised interval keeps the session from expiring.
//!
//! ## Architecture
//!
//! - **Transport** (crate-internal): owns the socket halves, extracts
//!   complete frames from the byte stream, serializes writes.
//! - **Session** ([`Connection`]): login, request/response commands, reply
//!   correlation, alarm subscription, keepalive.
//!
//! ## Example
//!
//! ```ignore
//! use dvrip_client::Connection;
//!
//! #[tokio::main]
//! async fn main() -> dvrip_client::Result<()> {
//!     let conn = Connection::connect("192.168.1.10", 34567).await?;
//!     conn.login("admin", "secret").await?;
//!     for name in conn.channel_names().await? {
//!         println!("channel: {name}");
//!     }
//!     conn.monitor_alarms(|alarm| match alarm {
//!         Ok(a) => println!("channel {} {} ({})", a.channel, a.event,
//!                           if a.is_start { "start" } else { "stop" }),
//!         Err(e) => eprintln!("alarm error: {e}"),
//!     });
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod protocol;

mod connection;
mod sofia;
mod transport;

pub use connection::{Alarm, Connection};
pub use error::{DvripError, Result};
pub use sofia::sofia_hash;
