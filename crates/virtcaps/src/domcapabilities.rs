//! Domain capabilities (`virsh domcapabilities`): what one emulator,
//! architecture and machine type combination can offer a guest.

use std::sync::OnceLock;

use regex::Regex;
use tracing::{debug, warn};
use virtxml_model::{ChildBinding, PropertyBinding, Schema};

use crate::{
    build_from_params, Capability, CapabilityContext, Model, ModelError, ModelView, QueryParams,
};

/// Feature id passed to [`CapabilityContext::supports`].
pub const DOMAIN_CAPABILITIES_FEATURE: &str = "domain_capabilities";

/// Firmware file name patterns per architecture, most specific first.
const UEFI_ARCH_PATTERNS: &[(&str, &[&str])] = &[
    (
        "x86_64",
        &[
            r".*OVMF_CODE\.fd",
            r".*ovmf-x64/OVMF.*\.fd",
            r".*ovmf-x86_64-.*",
            r".*ovmf.*",
            r".*OVMF.*",
        ],
    ),
    (
        "aarch64",
        &[r".*AAVMF_CODE\.fd", r".*aarch64/QEMU_EFI.*", r".*aarch64.*"],
    ),
];

const VALUE: Schema = Schema {
    tag: "value",
    properties: &[PropertyBinding::text("value", ".")],
    children: &[],
    order: &[],
};

const ENUM: Schema = Schema {
    tag: "enum",
    properties: &[PropertyBinding::text("name", "./@name")],
    children: &[ChildBinding::many("values", &VALUE)],
    order: &[],
};

const BLOCK_PROPERTIES: &[PropertyBinding] =
    &[PropertyBinding::yesno("supported", "./@supported")];

const BLOCK_CHILDREN: &[ChildBinding] = &[
    ChildBinding::many("values", &VALUE),
    ChildBinding::many("enums", &ENUM),
];

/// Schema of a plain capability block rooted at `tag`.
const fn caps_block(tag: &'static str) -> Schema {
    Schema {
        tag,
        properties: BLOCK_PROPERTIES,
        children: BLOCK_CHILDREN,
        order: &[],
    }
}

const LOADER: Schema = caps_block("loader");
const DISK: Schema = caps_block("disk");
const GRAPHICS: Schema = caps_block("graphics");
const VIDEO: Schema = caps_block("video");
const HOSTDEV: Schema = caps_block("hostdev");
const GIC: Schema = caps_block("gic");

const OS: Schema = Schema {
    tag: "os",
    properties: BLOCK_PROPERTIES,
    children: &[
        ChildBinding::many("values", &VALUE),
        ChildBinding::many("enums", &ENUM),
        ChildBinding::single("loader", &LOADER),
    ],
    order: &[],
};

const DEVICES: Schema = Schema {
    tag: "devices",
    properties: BLOCK_PROPERTIES,
    children: &[
        ChildBinding::many("values", &VALUE),
        ChildBinding::many("enums", &ENUM),
        ChildBinding::single("disk", &DISK),
        ChildBinding::single("graphics", &GRAPHICS),
        ChildBinding::single("video", &VIDEO),
        ChildBinding::single("hostdev", &HOSTDEV),
    ],
    order: &[],
};

const FEATURES: Schema = Schema {
    tag: "features",
    properties: BLOCK_PROPERTIES,
    children: &[
        ChildBinding::many("values", &VALUE),
        ChildBinding::many("enums", &ENUM),
        ChildBinding::single("gic", &GIC),
    ],
    order: &[],
};

const DOMAIN_CAPABILITIES: Schema = Schema {
    tag: "domainCapabilities",
    properties: &[
        PropertyBinding::text("path", "./path"),
        PropertyBinding::text("domain", "./domain"),
        PropertyBinding::text("machine", "./machine"),
        PropertyBinding::text("arch", "./arch"),
    ],
    children: &[
        ChildBinding::single("os", &OS),
        ChildBinding::single("devices", &DEVICES),
        ChildBinding::single("features", &FEATURES),
    ],
    order: &[],
};

fn values_of(model: &Model) -> Result<Vec<String>, ModelError> {
    let mut out = Vec::new();
    for value in model.children("values")? {
        if let Some(text) = value.get_text("value")? {
            out.push(text);
        }
    }
    Ok(out)
}

/// `<enum name=…>` listing the accepted values of one setting.
#[derive(Debug, Clone)]
pub struct Enum {
    model: Model,
}

impl ModelView for Enum {
    fn from_model(model: Model) -> Self {
        Self { model }
    }

    fn model(&self) -> &Model {
        &self.model
    }
}

impl Enum {
    pub fn name(&self) -> Result<Option<String>, ModelError> {
        self.model.get_text("name")
    }

    pub fn get_values(&self) -> Result<Vec<String>, ModelError> {
        values_of(&self.model)
    }
}

/// Any capability block: a `supported` flag plus values and enums.
#[derive(Debug, Clone)]
pub struct CapsBlock {
    model: Model,
}

impl ModelView for CapsBlock {
    fn from_model(model: Model) -> Self {
        Self { model }
    }

    fn model(&self) -> &Model {
        &self.model
    }
}

impl CapsBlock {
    /// Root tag of the block (`loader`, `disk`, …).
    pub fn tag(&self) -> &'static str {
        self.model.schema().tag
    }

    pub fn supported(&self) -> Result<bool, ModelError> {
        self.model.get_bool("supported")
    }

    pub fn set_supported(&self, value: bool) -> Result<(), ModelError> {
        self.model.set_bool("supported", value)
    }

    pub fn get_values(&self) -> Result<Vec<String>, ModelError> {
        values_of(&self.model)
    }

    pub fn add_value(&self, value: &str) -> Result<(), ModelError> {
        self.model.add_child("values")?.set_text("value", value)
    }

    pub fn enums(&self) -> Result<Vec<Enum>, ModelError> {
        self.model.children_view("enums")
    }

    pub fn enum_names(&self) -> Result<Vec<String>, ModelError> {
        let mut names = Vec::new();
        for item in self.enums()? {
            if let Some(name) = item.name()? {
                names.push(name);
            }
        }
        Ok(names)
    }

    /// Enum called `name`; [`ModelError::NotFound`] when the block lacks it.
    pub fn get_enum(&self, name: &str) -> Result<Enum, ModelError> {
        self.model
            .find_child("enums", "name", name)
            .map(Enum::from_model)
    }

    pub fn add_enum(&self, name: &str, values: &[&str]) -> Result<Enum, ModelError> {
        let item = self.model.add_child("enums")?;
        item.set_text("name", name)?;
        for value in values {
            item.add_child("values")?.set_text("value", value)?;
        }
        Ok(Enum::from_model(item))
    }
}

model_view!(Os, OS);

impl Os {
    pub fn block(&self) -> CapsBlock {
        CapsBlock::from_model(self.model.clone())
    }

    pub fn loader(&self) -> Result<CapsBlock, ModelError> {
        self.model.child_view("loader")
    }
}

model_view!(Devices, DEVICES);

impl Devices {
    pub fn block(&self) -> CapsBlock {
        CapsBlock::from_model(self.model.clone())
    }

    pub fn disk(&self) -> Result<CapsBlock, ModelError> {
        self.model.child_view("disk")
    }

    pub fn graphics(&self) -> Result<CapsBlock, ModelError> {
        self.model.child_view("graphics")
    }

    pub fn video(&self) -> Result<CapsBlock, ModelError> {
        self.model.child_view("video")
    }

    pub fn hostdev(&self) -> Result<CapsBlock, ModelError> {
        self.model.child_view("hostdev")
    }
}

model_view!(DomainFeatures, FEATURES);

impl DomainFeatures {
    pub fn block(&self) -> CapsBlock {
        CapsBlock::from_model(self.model.clone())
    }

    pub fn gic(&self) -> Result<CapsBlock, ModelError> {
        self.model.child_view("gic")
    }
}

model_view!(
    /// `<domainCapabilities>` document.
    DomainCapabilities,
    DOMAIN_CAPABILITIES
);

impl DomainCapabilities {
    /// Ask `ctx` for the domain capabilities of one emulator/arch/machine/
    /// hypervisor combination. An unsupported feature or a failed query
    /// falls back to an empty document; a malformed reply is an error.
    pub fn build_from_params<C>(
        ctx: &C,
        emulator: Option<&str>,
        arch: Option<&str>,
        machine: Option<&str>,
        virt_type: Option<&str>,
    ) -> Result<Capability<DomainCapabilities>, ModelError>
    where
        C: CapabilityContext + ?Sized,
    {
        let params = QueryParams::new()
            .with("emulator", emulator)
            .with("arch", arch)
            .with("machine", machine)
            .with("virttype", virt_type);
        let caps =
            build_from_params(ctx, &DOMAIN_CAPABILITIES, DOMAIN_CAPABILITIES_FEATURE, &params)?;
        Ok(caps.map(DomainCapabilities::from_model))
    }

    pub fn path(&self) -> Result<Option<String>, ModelError> {
        self.model.get_text("path")
    }

    pub fn domain(&self) -> Result<Option<String>, ModelError> {
        self.model.get_text("domain")
    }

    pub fn machine(&self) -> Result<Option<String>, ModelError> {
        self.model.get_text("machine")
    }

    pub fn arch(&self) -> Result<Option<String>, ModelError> {
        self.model.get_text("arch")
    }

    pub fn set_arch(&self, value: &str) -> Result<(), ModelError> {
        self.model.set_text("arch", value)
    }

    pub fn os(&self) -> Result<Os, ModelError> {
        self.model.child_view("os")
    }

    pub fn devices(&self) -> Result<Devices, ModelError> {
        self.model.child_view("devices")
    }

    pub fn features(&self) -> Result<DomainFeatures, ModelError> {
        self.model.child_view("features")
    }

    /// Whether firmware auto-detection knows this architecture.
    pub fn arch_can_uefi(&self) -> Result<bool, ModelError> {
        let arch = self.arch()?;
        Ok(arch
            .as_deref()
            .is_some_and(|arch| uefi_patterns().iter().any(|(known, _)| *known == arch)))
    }

    /// First loader path that looks like UEFI firmware for this arch.
    pub fn find_uefi_path_for_arch(&self) -> Result<Option<String>, ModelError> {
        let Some(arch) = self.arch()? else {
            return Ok(None);
        };
        let Some((_, patterns)) = uefi_patterns().iter().find(|(known, _)| *known == arch) else {
            return Ok(None);
        };
        let paths = self.os()?.loader()?.get_values()?;
        for pattern in patterns {
            if let Some(path) = paths.iter().find(|path| pattern.is_match(path)) {
                debug!(arch = %arch, path = %path, "found UEFI firmware");
                return Ok(Some(path.clone()));
            }
        }
        Ok(None)
    }

    /// Human readable label for a firmware path (`None` meaning no loader).
    pub fn label_for_firmware_path(&self, path: Option<&str>) -> Result<String, ModelError> {
        let Some(path) = path.filter(|path| !path.is_empty()) else {
            let arch = self.arch()?;
            return Ok(match arch.as_deref() {
                Some("i686") | Some("x86_64") => "BIOS".to_string(),
                _ => "None".to_string(),
            });
        };
        for (arch, patterns) in uefi_patterns() {
            if patterns.iter().any(|pattern| pattern.is_match(path)) {
                return Ok(format!("UEFI {arch}: {path}"));
            }
        }
        Ok(format!("Custom: {path}"))
    }

    /// Whether libvirt advertises read-only pflash loaders.
    pub fn supports_uefi_xml(&self) -> Result<bool, ModelError> {
        let loader = self.os()?.loader()?;
        if !loader.enum_names()?.iter().any(|name| name == "readonly") {
            return Ok(false);
        }
        let readonly = loader.get_enum("readonly")?.get_values()?;
        Ok(readonly.iter().any(|value| value == "yes"))
    }
}

/// Compiled [`UEFI_ARCH_PATTERNS`], anchored at the start of the path.
fn uefi_patterns() -> &'static [(&'static str, Vec<Regex>)] {
    static PATTERNS: OnceLock<Vec<(&'static str, Vec<Regex>)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        UEFI_ARCH_PATTERNS
            .iter()
            .map(|(arch, patterns)| {
                let compiled = patterns
                    .iter()
                    .filter_map(|pattern| match Regex::new(&format!("^(?:{pattern})")) {
                        Ok(regex) => Some(regex),
                        Err(err) => {
                            warn!(pattern, error = %err, "skipping firmware pattern");
                            None
                        }
                    })
                    .collect();
                (*arch, compiled)
            })
            .collect()
    })
}
