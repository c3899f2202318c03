//! Transport layer: the dial primitive sessions are built on.
//! Everything in here is protocol-agnostic.

pub mod dialer;

pub use dialer::{AsyncStream, BoxedStream, Dialer, TcpDialer};
