//! Extension discovery.
//!
//! Every function annotated with `#[register_extension]` contributes one
//! [`ExtensionDescriptor`] to [`EXTENSIONS`] at link time.
//! [`HostConfiguration::with_registered_extensions`](crate::HostConfiguration::with_registered_extensions)
//! applies them.

use std::fmt;

use linkme::distributed_slice;
use weld_core::ConfigResult;

use crate::host::HostConfiguration;

/// Initializer of one extension.
pub type ExtensionInit = fn(&mut HostConfiguration) -> ConfigResult<()>;

/// A named extension initializer.
#[derive(Clone, Copy)]
pub struct ExtensionDescriptor {
    /// Unique name; an extension is applied at most once per host.
    pub name: &'static str,
    pub init: ExtensionInit,
}

impl ExtensionDescriptor {
    pub const fn new(name: &'static str, init: ExtensionInit) -> Self {
        Self { name, init }
    }
}

impl fmt::Debug for ExtensionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionDescriptor")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Extensions registered with `#[register_extension]`.
#[distributed_slice]
pub static EXTENSIONS: [ExtensionDescriptor];

/// Returns the registered extensions sorted by name.
pub fn registered_extensions() -> Vec<ExtensionDescriptor> {
    let mut extensions: Vec<_> = EXTENSIONS.iter().copied().collect();
    extensions.sort_by_key(|e| e.name);
    extensions
}
