#![cfg_attr(docsrs, feature(doc_cfg))]
//! Typed views over the XML documents libvirt reports and consumes.
//!
//! Each type is a thin wrapper around a [`Model`] bound to a static schema
//! table. Reads of absent values return defaults, writes create the missing
//! elements in the order libvirt expects.
//!
//! ```rust
//! use virtcaps::sysinfo::DomainSysinfo;
//!
//! let sysinfo = DomainSysinfo::new();
//! sysinfo.set_bios_date("01/01/2015")?;
//! sysinfo.set_type("smbios")?;
//! sysinfo.set_bios_vendor("LENOVO")?;
//! assert!(sysinfo.to_xml()?.starts_with("<sysinfo type=\"smbios\">"));
//! # Ok::<(), virtcaps::ModelError>(())
//! ```

pub use virtxml_model::{
    build_from_params, Capability, CapabilityContext, Model, ModelError, ModelView, QueryError,
    QueryParams,
};

/// Declare a typed wrapper around a [`Model`] bound to `$schema`.
macro_rules! model_view {
    ($(#[$meta:meta])* $name:ident, $schema:path) => {
        $(#[$meta])*
        #[derive(Debug, Clone)]
        pub struct $name {
            model: $crate::Model,
        }

        impl $crate::ModelView for $name {
            fn from_model(model: $crate::Model) -> Self {
                Self { model }
            }

            fn model(&self) -> &$crate::Model {
                &self.model
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl $name {
            /// Fresh, unattached instance.
            pub fn new() -> Self {
                Self {
                    model: $crate::Model::new(&$schema),
                }
            }

            /// Bind to parsed XML whose root matches this type.
            pub fn parse(xml: &str) -> Result<Self, $crate::ModelError> {
                $crate::Model::parse(&$schema, xml).map(|model| Self { model })
            }

            /// Render this node and everything below it.
            pub fn to_xml(&self) -> Result<String, $crate::ModelError> {
                self.model.to_xml()
            }
        }
    };
}

pub mod capabilities;
pub mod domcapabilities;
pub mod sysinfo;

pub use capabilities::Capabilities;
pub use domcapabilities::DomainCapabilities;
pub use sysinfo::DomainSysinfo;
