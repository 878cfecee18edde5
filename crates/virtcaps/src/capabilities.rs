//! Host capabilities (`virsh capabilities`).

use tracing::debug;
use virtxml_model::{ChildBinding, PropertyBinding, Schema};

use crate::{ModelError, ModelView};

const TOPOLOGY_CPU: Schema = Schema {
    tag: "cpu",
    properties: &[
        PropertyBinding::text("id", "./@id"),
        PropertyBinding::text("socket_id", "./@socket_id"),
        PropertyBinding::text("core_id", "./@core_id"),
        PropertyBinding::text("siblings", "./@siblings"),
    ],
    children: &[],
    order: &[],
};

const CELL: Schema = Schema {
    tag: "cell",
    properties: &[PropertyBinding::text("id", "./@id")],
    children: &[ChildBinding::many("cpus", &TOPOLOGY_CPU).under("./cpus")],
    order: &[],
};

const TOPOLOGY: Schema = Schema {
    tag: "topology",
    properties: &[],
    children: &[ChildBinding::many("cells", &CELL).under("./cells")],
    order: &[],
};

const CPU_FEATURE: Schema = Schema {
    tag: "feature",
    properties: &[PropertyBinding::text("name", "./@name")],
    children: &[],
    order: &[],
};

const HOST_CPU: Schema = Schema {
    tag: "cpu",
    properties: &[
        PropertyBinding::text("arch", "./arch"),
        PropertyBinding::text("model", "./model"),
        PropertyBinding::text("vendor", "./vendor"),
        PropertyBinding::integer("sockets", "./topology/@sockets"),
        PropertyBinding::integer("cores", "./topology/@cores"),
        PropertyBinding::integer("threads", "./topology/@threads"),
    ],
    children: &[ChildBinding::many("features", &CPU_FEATURE)],
    order: &[],
};

const HOST: Schema = Schema {
    tag: "host",
    properties: &[PropertyBinding::text("uuid", "./uuid")],
    children: &[
        ChildBinding::single("cpu", &HOST_CPU),
        ChildBinding::single("topology", &TOPOLOGY),
    ],
    order: &[],
};

const GUEST_DOMAIN: Schema = Schema {
    tag: "domain",
    properties: &[
        PropertyBinding::text("type", "./@type"),
        PropertyBinding::text("emulator", "./emulator"),
    ],
    children: &[],
    order: &[],
};

const MACHINE: Schema = Schema {
    tag: "machine",
    properties: &[
        PropertyBinding::text("name", "."),
        PropertyBinding::text("canonical", "./@canonical"),
        PropertyBinding::integer("max_cpus", "./@maxCpus"),
    ],
    children: &[],
    order: &[],
};

const GUEST_ARCH: Schema = Schema {
    tag: "arch",
    properties: &[
        PropertyBinding::text("name", "./@name"),
        PropertyBinding::integer("wordsize", "./wordsize"),
        PropertyBinding::text("emulator", "./emulator"),
        PropertyBinding::text("loader", "./loader"),
    ],
    children: &[
        ChildBinding::many("machines", &MACHINE),
        ChildBinding::many("domains", &GUEST_DOMAIN),
    ],
    order: &[],
};

const GUEST: Schema = Schema {
    tag: "guest",
    properties: &[PropertyBinding::text("os_type", "./os_type")],
    children: &[ChildBinding::single("arch", &GUEST_ARCH)],
    order: &[],
};

const CAPABILITIES: Schema = Schema {
    tag: "capabilities",
    properties: &[],
    children: &[
        ChildBinding::single("host", &HOST),
        ChildBinding::many("guests", &GUEST),
    ],
    order: &[],
};

model_view!(
    /// `<capabilities>` document describing a hypervisor host.
    Capabilities,
    CAPABILITIES
);

impl Capabilities {
    pub fn host(&self) -> Result<Host, ModelError> {
        self.model.child_view("host")
    }

    pub fn guests(&self) -> Result<Vec<Guest>, ModelError> {
        self.model.children_view("guests")
    }

    pub fn add_guest(&self) -> Result<Guest, ModelError> {
        self.model.add_child("guests").map(Guest::from_model)
    }

    /// First guest matching `os_type` and architecture `arch`, if any.
    pub fn guest_for(&self, os_type: &str, arch: &str) -> Result<Option<Guest>, ModelError> {
        for guest in self.guests()? {
            if guest.os_type()?.as_deref() == Some(os_type)
                && guest.arch()?.name()?.as_deref() == Some(arch)
            {
                return Ok(Some(guest));
            }
        }
        debug!(os_type, arch, "no guest capabilities match");
        Ok(None)
    }
}

model_view!(Host, HOST);

impl Host {
    pub fn uuid(&self) -> Result<Option<String>, ModelError> {
        self.model.get_text("uuid")
    }

    pub fn set_uuid(&self, value: &str) -> Result<(), ModelError> {
        self.model.set_text("uuid", value)
    }

    pub fn cpu(&self) -> Result<HostCpu, ModelError> {
        self.model.child_view("cpu")
    }

    pub fn topology(&self) -> Result<Topology, ModelError> {
        self.model.child_view("topology")
    }
}

model_view!(
    /// Host CPU description: model, vendor, topology and feature flags.
    HostCpu,
    HOST_CPU
);

impl HostCpu {
    pub fn arch(&self) -> Result<Option<String>, ModelError> {
        self.model.get_text("arch")
    }

    pub fn set_arch(&self, value: &str) -> Result<(), ModelError> {
        self.model.set_text("arch", value)
    }

    pub fn model_name(&self) -> Result<Option<String>, ModelError> {
        self.model.get_text("model")
    }

    pub fn set_model_name(&self, value: &str) -> Result<(), ModelError> {
        self.model.set_text("model", value)
    }

    pub fn vendor(&self) -> Result<Option<String>, ModelError> {
        self.model.get_text("vendor")
    }

    pub fn set_vendor(&self, value: &str) -> Result<(), ModelError> {
        self.model.set_text("vendor", value)
    }

    pub fn sockets(&self) -> Result<Option<i64>, ModelError> {
        self.model.get_int("sockets")
    }

    pub fn set_sockets(&self, value: i64) -> Result<(), ModelError> {
        self.model.set_int("sockets", value)
    }

    pub fn cores(&self) -> Result<Option<i64>, ModelError> {
        self.model.get_int("cores")
    }

    pub fn set_cores(&self, value: i64) -> Result<(), ModelError> {
        self.model.set_int("cores", value)
    }

    pub fn threads(&self) -> Result<Option<i64>, ModelError> {
        self.model.get_int("threads")
    }

    pub fn set_threads(&self, value: i64) -> Result<(), ModelError> {
        self.model.set_int("threads", value)
    }

    pub fn features(&self) -> Result<Vec<CpuFeature>, ModelError> {
        self.model.children_view("features")
    }

    pub fn add_feature(&self, name: &str) -> Result<CpuFeature, ModelError> {
        let feature = CpuFeature::from_model(self.model.add_child("features")?);
        feature.model.set_text("name", name)?;
        Ok(feature)
    }

    /// Feature names in document order, from `<feature name=…>` entries or,
    /// for older libvirt, the empty child elements of `<features>`.
    pub fn feature_names(&self) -> Result<Vec<String>, ModelError> {
        let mut names = Vec::new();
        for feature in self.features()? {
            if let Some(name) = feature.name()? {
                names.push(name);
            }
        }
        names.extend(self.model.child_tags("./features")?);
        Ok(names)
    }

    pub fn has_feature(&self, name: &str) -> Result<bool, ModelError> {
        Ok(self.feature_names()?.iter().any(|feature| feature == name))
    }
}

model_view!(CpuFeature, CPU_FEATURE);

impl CpuFeature {
    pub fn name(&self) -> Result<Option<String>, ModelError> {
        self.model.get_text("name")
    }
}

model_view!(
    /// NUMA topology of the host.
    Topology,
    TOPOLOGY
);

impl Topology {
    pub fn cells(&self) -> Result<Vec<Cell>, ModelError> {
        self.model.children_view("cells")
    }

    pub fn add_cell(&self) -> Result<Cell, ModelError> {
        self.model.add_child("cells").map(Cell::from_model)
    }
}

model_view!(Cell, CELL);

impl Cell {
    pub fn id(&self) -> Result<Option<String>, ModelError> {
        self.model.get_text("id")
    }

    pub fn set_id(&self, value: &str) -> Result<(), ModelError> {
        self.model.set_text("id", value)
    }

    pub fn cpus(&self) -> Result<Vec<TopologyCpu>, ModelError> {
        self.model.children_view("cpus")
    }

    pub fn add_cpu(&self) -> Result<TopologyCpu, ModelError> {
        self.model.add_child("cpus").map(TopologyCpu::from_model)
    }
}

model_view!(
    /// One logical CPU inside a NUMA cell.
    TopologyCpu,
    TOPOLOGY_CPU
);

impl TopologyCpu {
    pub fn id(&self) -> Result<Option<String>, ModelError> {
        self.model.get_text("id")
    }

    pub fn set_id(&self, value: &str) -> Result<(), ModelError> {
        self.model.set_text("id", value)
    }

    pub fn socket_id(&self) -> Result<Option<String>, ModelError> {
        self.model.get_text("socket_id")
    }

    pub fn core_id(&self) -> Result<Option<String>, ModelError> {
        self.model.get_text("core_id")
    }

    pub fn siblings(&self) -> Result<Option<String>, ModelError> {
        self.model.get_text("siblings")
    }
}

model_view!(
    /// Guest capabilities for one OS type and architecture.
    Guest,
    GUEST
);

impl Guest {
    pub fn os_type(&self) -> Result<Option<String>, ModelError> {
        self.model.get_text("os_type")
    }

    pub fn set_os_type(&self, value: &str) -> Result<(), ModelError> {
        self.model.set_text("os_type", value)
    }

    pub fn arch(&self) -> Result<GuestArch, ModelError> {
        self.model.child_view("arch")
    }

    /// Whether any hypervisor domain type can install this guest.
    pub fn has_install_options(&self) -> Result<bool, ModelError> {
        Ok(!self.arch()?.domains()?.is_empty())
    }

    pub fn is_kvm_available(&self) -> Result<bool, ModelError> {
        for domain in self.arch()?.domains()? {
            if domain.domain_type()?.as_deref() == Some("kvm") {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

model_view!(GuestArch, GUEST_ARCH);

impl GuestArch {
    pub fn name(&self) -> Result<Option<String>, ModelError> {
        self.model.get_text("name")
    }

    pub fn set_name(&self, value: &str) -> Result<(), ModelError> {
        self.model.set_text("name", value)
    }

    pub fn wordsize(&self) -> Result<Option<i64>, ModelError> {
        self.model.get_int("wordsize")
    }

    pub fn set_wordsize(&self, value: i64) -> Result<(), ModelError> {
        self.model.set_int("wordsize", value)
    }

    pub fn emulator(&self) -> Result<Option<String>, ModelError> {
        self.model.get_text("emulator")
    }

    pub fn set_emulator(&self, value: &str) -> Result<(), ModelError> {
        self.model.set_text("emulator", value)
    }

    pub fn loader(&self) -> Result<Option<String>, ModelError> {
        self.model.get_text("loader")
    }

    pub fn machines(&self) -> Result<Vec<Machine>, ModelError> {
        self.model.children_view("machines")
    }

    pub fn domains(&self) -> Result<Vec<GuestDomain>, ModelError> {
        self.model.children_view("domains")
    }

    pub fn add_domain(&self, domain_type: &str) -> Result<GuestDomain, ModelError> {
        let domain = GuestDomain::from_model(self.model.add_child("domains")?);
        domain.model.set_text("type", domain_type)?;
        Ok(domain)
    }
}

model_view!(Machine, MACHINE);

impl Machine {
    pub fn name(&self) -> Result<Option<String>, ModelError> {
        self.model.get_text("name")
    }

    pub fn canonical(&self) -> Result<Option<String>, ModelError> {
        self.model.get_text("canonical")
    }

    pub fn max_cpus(&self) -> Result<Option<i64>, ModelError> {
        self.model.get_int("max_cpus")
    }
}

model_view!(
    /// Hypervisor domain type (`qemu`, `kvm`, …) offered for a guest arch.
    GuestDomain,
    GUEST_DOMAIN
);

impl GuestDomain {
    pub fn domain_type(&self) -> Result<Option<String>, ModelError> {
        self.model.get_text("type")
    }

    pub fn emulator(&self) -> Result<Option<String>, ModelError> {
        self.model.get_text("emulator")
    }

    pub fn set_emulator(&self, value: &str) -> Result<(), ModelError> {
        self.model.set_text("emulator", value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const QEMU_WITH_KVM: &str = r#"
<capabilities>
  <host>
    <uuid>34353438-3934-434e-3738-313830323543</uuid>
    <cpu>
      <arch>x86_64</arch>
      <model>core2duo</model>
      <vendor>Intel</vendor>
      <topology sockets='7' cores='5' threads='3'/>
      <feature name='lahf_lm'/>
      <feature name='xtpr'/>
      <feature name='cx16'/>
      <feature name='tm2'/>
      <feature name='est'/>
      <feature name='vmx'/>
      <feature name='ds_cpl'/>
      <feature name='pbe'/>
      <feature name='tm'/>
      <feature name='ht'/>
      <feature name='ss'/>
      <feature name='acpi'/>
      <feature name='ds'/>
    </cpu>
  </host>
  <guest>
    <os_type>hvm</os_type>
    <arch name='i686'>
      <wordsize>32</wordsize>
      <emulator>/usr/bin/qemu</emulator>
      <machine maxCpus='255'>pc-0.11</machine>
      <machine canonical='pc-0.11' maxCpus='255'>pc</machine>
      <domain type='qemu'/>
      <domain type='kvm'>
        <emulator>/usr/bin/qemu-kvm</emulator>
      </domain>
    </arch>
  </guest>
  <guest>
    <os_type>hvm</os_type>
    <arch name='x86_64'>
      <wordsize>64</wordsize>
      <emulator>/usr/bin/qemu-system-x86_64</emulator>
      <machine>pc</machine>
      <domain type='qemu'/>
      <domain type='kvm'/>
    </arch>
  </guest>
</capabilities>
"#;

    const QEMU_NO_KVM: &str = r#"
<capabilities>
  <host>
    <cpu><arch>x86_64</arch></cpu>
  </host>
  <guest>
    <os_type>hvm</os_type>
    <arch name='x86_64'>
      <wordsize>64</wordsize>
      <emulator>/usr/bin/qemu-system-x86_64</emulator>
      <domain type='qemu'/>
    </arch>
  </guest>
</capabilities>
"#;

    const OLD_VMX: &str = r#"
<capabilities>
  <host>
    <cpu>
      <arch>i686</arch>
      <features>
        <pae/>
        <vmx/>
      </features>
    </cpu>
  </host>
</capabilities>
"#;

    const OLD_SVM: &str = r#"
<capabilities>
  <host>
    <cpu>
      <arch>x86_64</arch>
      <features>
        <svm/>
      </features>
    </cpu>
  </host>
</capabilities>
"#;

    const LXC: &str = r#"
<capabilities>
  <host>
    <cpu><arch>x86_64</arch></cpu>
    <topology>
      <cells num='1'>
        <cell id='0'>
          <cpus num='8'>
            <cpu id='0' socket_id='0' core_id='0' siblings='0'/>
            <cpu id='1' socket_id='0' core_id='1' siblings='1'/>
            <cpu id='2' socket_id='0' core_id='2' siblings='2'/>
            <cpu id='3' socket_id='0' core_id='3' siblings='3'/>
            <cpu id='4' socket_id='0' core_id='4' siblings='4'/>
            <cpu id='5' socket_id='0' core_id='5' siblings='5'/>
            <cpu id='6' socket_id='0' core_id='6' siblings='6'/>
            <cpu id='7' socket_id='0' core_id='7' siblings='7'/>
          </cpus>
        </cell>
      </cells>
    </topology>
  </host>
  <guest>
    <os_type>exe</os_type>
    <arch name='x86_64'>
      <wordsize>64</wordsize>
      <emulator>/usr/libexec/libvirt_lxc</emulator>
      <domain type='lxc'/>
    </arch>
  </guest>
</capabilities>
"#;

    fn host_cpu(xml: &str) -> HostCpu {
        Capabilities::parse(xml)
            .and_then(|caps| caps.host())
            .and_then(|host| host.cpu())
            .expect("host cpu")
    }

    #[test]
    fn old_syntax_features() {
        assert!(host_cpu(OLD_VMX).has_feature("vmx").expect("vmx"));
        assert!(host_cpu(OLD_VMX).has_feature("pae").expect("pae"));
        assert!(host_cpu(OLD_SVM).has_feature("svm").expect("svm"));
        assert!(!host_cpu(OLD_SVM).has_feature("vmx").expect("vmx"));
    }

    #[test]
    fn new_syntax_features_and_topology() {
        let cpu = host_cpu(QEMU_WITH_KVM);
        for name in [
            "lahf_lm", "xtpr", "cx16", "tm2", "est", "vmx", "ds_cpl", "pbe", "tm", "ht", "ss",
            "acpi", "ds",
        ] {
            assert!(cpu.has_feature(name).expect("feature"), "{name} missing");
        }
        assert!(!cpu.has_feature("sse2").expect("sse2"));
        assert_eq!(cpu.features().expect("features").len(), 13);
        assert_eq!(cpu.model_name().expect("model").as_deref(), Some("core2duo"));
        assert_eq!(cpu.vendor().expect("vendor").as_deref(), Some("Intel"));
        assert_eq!(cpu.threads().expect("threads"), Some(3));
        assert_eq!(cpu.cores().expect("cores"), Some(5));
        assert_eq!(cpu.sockets().expect("sockets"), Some(7));
    }

    #[test]
    fn guest_install_options() {
        let check = |xml: &str, has_guests: bool, is_kvm: bool| {
            let caps = Capabilities::parse(xml).expect("parse caps");
            let guests = caps.guests().expect("guests");
            if let Some(guest) = guests.first() {
                assert_eq!(guest.has_install_options().expect("install"), has_guests);
                assert_eq!(guest.is_kvm_available().expect("kvm"), is_kvm);
            } else {
                assert!(!has_guests && !is_kvm);
            }
        };
        check(OLD_VMX, false, false);
        check(QEMU_WITH_KVM, true, true);
        check(QEMU_NO_KVM, true, false);
    }

    #[test]
    fn numa_cells() {
        let caps = Capabilities::parse(LXC).expect("parse lxc");
        let cells = caps
            .host()
            .and_then(|host| host.topology())
            .and_then(|topology| topology.cells())
            .expect("cells");
        assert_eq!(cells.len(), 1);
        let cpus = cells[0].cpus().expect("cpus");
        assert_eq!(cpus.len(), 8);
        assert_eq!(cpus[3].id().expect("id").as_deref(), Some("3"));
        assert_eq!(cpus[3].core_id().expect("core").as_deref(), Some("3"));
        assert_eq!(cpus[3].socket_id().expect("socket").as_deref(), Some("0"));
        assert_eq!(cpus[7].siblings().expect("siblings").as_deref(), Some("7"));
    }

    #[test]
    fn guest_arch_details() {
        let caps = Capabilities::parse(QEMU_WITH_KVM).expect("parse caps");
        let guest = caps
            .guest_for("hvm", "i686")
            .expect("lookup")
            .expect("i686 guest");
        let arch = guest.arch().expect("arch");
        assert_eq!(arch.wordsize().expect("wordsize"), Some(32));
        assert_eq!(arch.emulator().expect("emulator").as_deref(), Some("/usr/bin/qemu"));
        assert_eq!(arch.loader().expect("loader"), None);
        let machines = arch.machines().expect("machines");
        assert_eq!(machines.len(), 2);
        assert_eq!(machines[1].name().expect("name").as_deref(), Some("pc"));
        assert_eq!(machines[1].canonical().expect("canonical").as_deref(), Some("pc-0.11"));
        assert_eq!(machines[0].max_cpus().expect("max cpus"), Some(255));
        let domains = arch.domains().expect("domains");
        assert_eq!(domains[1].domain_type().expect("type").as_deref(), Some("kvm"));
        assert_eq!(
            domains[1].emulator().expect("emulator").as_deref(),
            Some("/usr/bin/qemu-kvm")
        );
        assert!(caps.guest_for("exe", "x86_64").expect("lookup").is_none());
    }

    #[test]
    fn empty_capabilities_read_defaults() {
        let caps = Capabilities::new();
        let cpu = caps.host().and_then(|host| host.cpu()).expect("cpu");
        assert_eq!(cpu.model_name().expect("model"), None);
        assert_eq!(cpu.sockets().expect("sockets"), None);
        assert!(!cpu.has_feature("vmx").expect("vmx"));
        assert!(caps.guests().expect("guests").is_empty());
        assert_eq!(caps.to_xml().expect("render"), "");
    }

    #[test]
    fn build_host_description() {
        let caps = Capabilities::new();
        let host = caps.host().expect("host");
        let cpu = host.cpu().expect("cpu");
        cpu.set_threads(2).expect("threads");
        cpu.add_feature("vmx").expect("feature");
        cpu.set_model_name("Nehalem").expect("model");
        cpu.set_sockets(1).expect("sockets");
        host.set_uuid("abc").expect("uuid");
        let guest = caps.add_guest().expect("guest");
        guest.set_os_type("hvm").expect("os type");
        let arch = guest.arch().expect("arch");
        arch.set_name("x86_64").expect("name");
        arch.add_domain("kvm").expect("domain");
        arch.set_wordsize(64).expect("wordsize");

        assert_eq!(
            caps.to_xml().expect("render"),
            "<capabilities>\n  \
             <host>\n    \
             <uuid>abc</uuid>\n    \
             <cpu>\n      \
             <model>Nehalem</model>\n      \
             <topology sockets=\"1\" threads=\"2\"/>\n      \
             <feature name=\"vmx\"/>\n    \
             </cpu>\n  \
             </host>\n  \
             <guest>\n    \
             <os_type>hvm</os_type>\n    \
             <arch name=\"x86_64\">\n      \
             <wordsize>64</wordsize>\n      \
             <domain type=\"kvm\"/>\n    \
             </arch>\n  \
             </guest>\n\
             </capabilities>"
        );
        assert!(caps
            .guests()
            .expect("guests")
            .first()
            .expect("guest")
            .is_kvm_available()
            .expect("kvm"));
    }
}
