use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;
use virtcaps::DomainCapabilities;

use crate::common::{self, or_dash, yes_no};

#[derive(Debug, Serialize)]
struct EnumEntry {
    name: String,
    values: Vec<String>,
}

#[derive(Debug, Serialize)]
struct DomcapsReport {
    arch: Option<String>,
    machine: Option<String>,
    loader_supported: bool,
    loader_values: Vec<String>,
    loader_enums: Vec<EnumEntry>,
    uefi_path: Option<String>,
    firmware_label: String,
    uefi_xml: bool,
}

fn report(caps: &DomainCapabilities) -> Result<DomcapsReport> {
    let loader = caps.os()?.loader()?;
    let mut loader_enums = Vec::new();
    for item in loader.enums()? {
        loader_enums.push(EnumEntry {
            name: item.name()?.unwrap_or_default(),
            values: item.get_values()?,
        });
    }
    let uefi_path = caps.find_uefi_path_for_arch()?;
    let firmware_label = caps.label_for_firmware_path(uefi_path.as_deref())?;
    Ok(DomcapsReport {
        arch: caps.arch()?,
        machine: caps.machine()?,
        loader_supported: loader.supported()?,
        loader_values: loader.get_values()?,
        loader_enums,
        uefi_path,
        firmware_label,
        uefi_xml: caps.supports_uefi_xml()?,
    })
}

pub fn run(file: &Path, json: bool) -> Result<()> {
    let xml = common::read_xml(file)?;
    let caps = DomainCapabilities::parse(&xml)
        .with_context(|| format!("parse domain capabilities from {}", file.display()))?;
    let report = report(&caps).context("inspect domain capabilities")?;
    info!(
        arch = report.arch.as_deref().unwrap_or_default(),
        "read domain capabilities"
    );

    if json {
        return common::print_json(&report);
    }

    println!("arch:     {}", or_dash(report.arch.as_deref()));
    println!("machine:  {}", or_dash(report.machine.as_deref()));
    println!("loader:   supported={}", yes_no(report.loader_supported));
    for value in &report.loader_values {
        println!("  value {value}");
    }
    for item in &report.loader_enums {
        println!("  enum {}: {}", item.name, item.values.join(", "));
    }
    println!("firmware: {}", report.firmware_label);
    println!("uefi xml: {}", yes_no(report.uefi_xml));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = r#"
<domainCapabilities>
  <machine>virt</machine>
  <arch>aarch64</arch>
  <os supported='yes'>
    <loader supported='yes'>
      <value>/usr/share/AAVMF/AAVMF_CODE.fd</value>
      <enum name='readonly'>
        <value>yes</value>
        <value>no</value>
      </enum>
    </loader>
  </os>
</domainCapabilities>
"#;

    #[test]
    fn report_resolves_firmware() {
        let caps = DomainCapabilities::parse(FIXTURE).expect("parse");
        let report = report(&caps).expect("report");
        assert_eq!(report.machine.as_deref(), Some("virt"));
        assert!(report.loader_supported);
        assert_eq!(
            report.uefi_path.as_deref(),
            Some("/usr/share/AAVMF/AAVMF_CODE.fd")
        );
        assert_eq!(
            report.firmware_label,
            "UEFI aarch64: /usr/share/AAVMF/AAVMF_CODE.fd"
        );
        assert!(report.uefi_xml);
        assert_eq!(report.loader_enums[0].name, "readonly");
        assert_eq!(report.loader_enums[0].values, ["yes", "no"]);
    }

    #[test]
    fn empty_document_reports_bios_defaults() {
        let caps = DomainCapabilities::parse(
            "<domainCapabilities><arch>x86_64</arch></domainCapabilities>",
        )
        .expect("parse");
        let report = report(&caps).expect("report");
        assert!(!report.loader_supported);
        assert!(report.loader_values.is_empty());
        assert_eq!(report.uefi_path, None);
        assert_eq!(report.firmware_label, "BIOS");
        assert!(!report.uefi_xml);
    }
}
