//! Transport layer modules for fraglet
//!
//! The duplex connection abstraction the fragmentation layer decorates, and
//! the dial path that applies it.

pub mod conn;
pub mod deadline;
pub mod forward;
pub mod ip4p;

pub use conn::Connection;
pub use deadline::DeadlineStream;
pub use forward::Forwarder;
pub use ip4p::lookup_ip4p;
