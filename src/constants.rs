//! Global constants for fraglet fragmentation and networking

// ============================================================================
// TLS RECORD LAYER
// ============================================================================

/// TLS record header size (content type + version + length)
pub const TLS_RECORD_HEADER_SIZE: usize = 5;

/// TLS record content type for handshake messages
pub const TLS_CONTENT_TYPE_HANDSHAKE: u8 = 22;

// ============================================================================
// IP4P
// ============================================================================

/// Leading IPv6 bytes that mark an IP4P-encoded address (2001:0000::/32)
pub const IP4P_PREFIX: [u8; 4] = [0x20, 0x01, 0x00, 0x00];

// ============================================================================
// RELAY
// ============================================================================

/// Default local listen address for the forwarder
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:1080";

/// Default connect timeout for outbound dials (seconds)
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

// ============================================================================
// END OF CONSTANTS
// ============================================================================
