// Fragmentation engine for DPI bypass
//
// Parses the packets/length/interval options into a FragmentSpec and
// decorates outbound connections so that writes leave the process as
// jittered chunks.

pub mod factory;
pub mod jitter;
pub mod record;
pub mod spec;
pub mod writer;

pub use factory::Fragmenter;
pub use record::RecordHeader;
pub use spec::{FragmentSpec, Packets, SpecError};
pub use writer::{FragmentWriter, WriteError};
