//! Utilities for driving a gateway from tests: a scripted protocol client on the other end of an
//!  in-memory serial line, and a dialer handing out in-memory upstream connections.

pub mod client;
pub mod dialer;

pub use client::{client_transport, TestClient};
pub use dialer::DuplexDialer;
