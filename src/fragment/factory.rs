//! Process-wide fragmentation factory
//!
//! The fragment options are parsed once at startup into a [`Fragmenter`],
//! which is cloned into every dial path and wraps each new outbound
//! connection in a [`FragmentWriter`] sharing the same spec.

use crate::config::FragmentConfig;
use crate::fragment::spec::{FragmentSpec, SpecError};
use crate::fragment::writer::FragmentWriter;
use std::sync::Arc;
use tracing::{debug, info};

/// Shared, read-only fragmentation settings.
#[derive(Debug, Clone)]
pub struct Fragmenter {
    spec: Arc<FragmentSpec>,
}

impl Fragmenter {
    pub fn new(spec: FragmentSpec) -> Self {
        Self {
            spec: Arc::new(spec),
        }
    }

    /// Build the factory from configuration.
    ///
    /// `Ok(None)` means fragmentation is off: `packets` was left empty and
    /// the remaining options do not form a valid spec.
    ///
    /// # Errors
    ///
    /// A parse failure is fatal once `packets` is set, since fragmentation
    /// was then explicitly requested.
    pub fn from_config(config: &FragmentConfig) -> Result<Option<Self>, SpecError> {
        match FragmentSpec::parse(&config.packets, &config.length, &config.interval) {
            Ok(spec) => {
                info!("Fragmentation enabled: {}", spec);
                Ok(Some(Self::new(spec)))
            }
            Err(e) if config.packets.trim().is_empty() => {
                debug!("Fragmentation disabled: {}", e);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    pub fn spec(&self) -> &FragmentSpec {
        &self.spec
    }

    /// Decorate a freshly established connection
    pub fn wrap<C>(&self, conn: C) -> FragmentWriter<C> {
        FragmentWriter::new(conn, Arc::clone(&self.spec))
    }
}
