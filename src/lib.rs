//! fraglet: traffic fragmentation for forward-proxy connections
//!
//! This library splits outbound byte streams into randomly sized,
//! randomly paced chunks so that passive DPI cannot match a TLS ClientHello
//! or a fixed traffic shape in a single segment.

pub mod config;
pub mod constants;
pub mod fragment;
pub mod logging;
pub mod transport;

pub use fragment::{FragmentSpec, FragmentWriter, Fragmenter, SpecError, WriteError};
pub use transport::Connection;
