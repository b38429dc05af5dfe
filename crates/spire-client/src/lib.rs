//! # spire-client
//!
//! The ITRC-Client proxy logic (spec §4.3): signs and fans out client
//! updates to the control center, and verifies/delivers the threshold-signed
//! replies that come back over the reply multicast group.

mod client;
mod error;
mod fanout;

pub use client::Client;
pub use error::{ClientError, ClientResult};
pub use fanout::control_center_fanout;
