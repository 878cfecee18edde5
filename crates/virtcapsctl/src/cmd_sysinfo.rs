use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use tracing::debug;
use virtcaps::DomainSysinfo;

use crate::common;

/// SMBIOS strings for a new `<sysinfo>` block.
#[derive(Args, Debug, Default, Clone)]
pub struct SysinfoArgs {
    #[arg(long = "type", default_value = "smbios")]
    pub sysinfo_type: String,
    #[arg(long)]
    pub bios_vendor: Option<String>,
    #[arg(long)]
    pub bios_version: Option<String>,
    /// mm/dd/yyyy or mm/dd/yy
    #[arg(long)]
    pub bios_date: Option<String>,
    #[arg(long)]
    pub bios_release: Option<String>,
    #[arg(long)]
    pub system_manufacturer: Option<String>,
    #[arg(long)]
    pub system_product: Option<String>,
    #[arg(long)]
    pub system_version: Option<String>,
    #[arg(long)]
    pub system_serial: Option<String>,
    #[arg(long)]
    pub system_uuid: Option<String>,
    #[arg(long)]
    pub system_sku: Option<String>,
    #[arg(long)]
    pub system_family: Option<String>,
    #[arg(long)]
    pub baseboard_manufacturer: Option<String>,
    #[arg(long)]
    pub baseboard_product: Option<String>,
    #[arg(long)]
    pub baseboard_version: Option<String>,
    #[arg(long)]
    pub baseboard_serial: Option<String>,
    #[arg(long)]
    pub baseboard_asset: Option<String>,
    #[arg(long)]
    pub baseboard_location: Option<String>,
}

impl SysinfoArgs {
    /// Field names paired with the values given on the command line.
    fn fields(&self) -> Vec<(&'static str, Option<&str>)> {
        vec![
            ("type", Some(self.sysinfo_type.as_str())),
            ("bios_vendor", self.bios_vendor.as_deref()),
            ("bios_version", self.bios_version.as_deref()),
            ("bios_date", self.bios_date.as_deref()),
            ("bios_release", self.bios_release.as_deref()),
            ("system_manufacturer", self.system_manufacturer.as_deref()),
            ("system_product", self.system_product.as_deref()),
            ("system_version", self.system_version.as_deref()),
            ("system_serial", self.system_serial.as_deref()),
            ("system_uuid", self.system_uuid.as_deref()),
            ("system_sku", self.system_sku.as_deref()),
            ("system_family", self.system_family.as_deref()),
            ("baseBoard_manufacturer", self.baseboard_manufacturer.as_deref()),
            ("baseBoard_product", self.baseboard_product.as_deref()),
            ("baseBoard_version", self.baseboard_version.as_deref()),
            ("baseBoard_serial", self.baseboard_serial.as_deref()),
            ("baseBoard_asset", self.baseboard_asset.as_deref()),
            ("baseBoard_location", self.baseboard_location.as_deref()),
        ]
    }
}

#[derive(Debug, Serialize)]
struct SysinfoOutput {
    entries: Vec<(String, String)>,
    xml: String,
}

fn build(args: &SysinfoArgs) -> Result<DomainSysinfo> {
    let sysinfo = DomainSysinfo::new();
    for (field, value) in args.fields() {
        if let Some(value) = value {
            debug!(field, value, "set sysinfo field");
            sysinfo
                .set(field, value)
                .with_context(|| format!("set {field}"))?;
        }
    }
    Ok(sysinfo)
}

pub fn run(args: &SysinfoArgs, json: bool) -> Result<()> {
    let sysinfo = build(args)?;
    let xml = sysinfo.to_xml().context("render sysinfo")?;
    if json {
        let entries = sysinfo
            .entries()?
            .into_iter()
            .map(|(name, value)| (name.to_string(), value))
            .collect();
        return common::print_json(&SysinfoOutput { entries, xml });
    }
    println!("{xml}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_orders_fields() {
        let args = SysinfoArgs {
            sysinfo_type: "smbios".into(),
            system_serial: Some("S-1".into()),
            bios_vendor: Some("Acme".into()),
            ..Default::default()
        };
        let xml = build(&args).and_then(|s| Ok(s.to_xml()?)).expect("build");
        assert_eq!(
            xml,
            "<sysinfo type=\"smbios\">\n  <bios>\n    <entry name=\"vendor\">Acme</entry>\n  \
             </bios>\n  <system>\n    <entry name=\"serial\">S-1</entry>\n  </system>\n</sysinfo>"
        );
    }

    #[test]
    fn bad_date_is_reported() {
        let args = SysinfoArgs {
            sysinfo_type: "smbios".into(),
            bios_date: Some("2020-01-01".into()),
            ..Default::default()
        };
        let err = build(&args).unwrap_err();
        let text = format!("{err:#}");
        assert!(text.contains("set bios_date"), "{text}");
        assert!(text.contains("SMBios date string '2020-01-01' is invalid."), "{text}");
    }
}
