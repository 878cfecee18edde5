use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;
use virtcaps::capabilities::{Capabilities, Guest};

use crate::common::{self, or_dash, yes_no};

#[derive(Debug, Serialize)]
struct HostSummary {
    uuid: Option<String>,
    arch: Option<String>,
    model: Option<String>,
    vendor: Option<String>,
    sockets: Option<i64>,
    cores: Option<i64>,
    threads: Option<i64>,
    numa_cells: usize,
    features: Vec<String>,
}

#[derive(Debug, Serialize)]
struct GuestSummary {
    os_type: Option<String>,
    arch: Option<String>,
    install_options: bool,
    kvm: bool,
}

#[derive(Debug, Serialize)]
struct FeatureCheck {
    name: String,
    present: bool,
}

#[derive(Debug, Serialize)]
struct CapsReport {
    host: HostSummary,
    guests: Vec<GuestSummary>,
    checks: Vec<FeatureCheck>,
}

fn summarize_guest(guest: &Guest) -> Result<GuestSummary> {
    Ok(GuestSummary {
        os_type: guest.os_type()?,
        arch: guest.arch()?.name()?,
        install_options: guest.has_install_options()?,
        kvm: guest.is_kvm_available()?,
    })
}

fn report(caps: &Capabilities, features: &[String]) -> Result<CapsReport> {
    let host = caps.host()?;
    let cpu = host.cpu()?;
    let summary = HostSummary {
        uuid: host.uuid()?,
        arch: cpu.arch()?,
        model: cpu.model_name()?,
        vendor: cpu.vendor()?,
        sockets: cpu.sockets()?,
        cores: cpu.cores()?,
        threads: cpu.threads()?,
        numa_cells: host.topology()?.cells()?.len(),
        features: cpu.feature_names()?,
    };
    let guests = caps
        .guests()?
        .iter()
        .map(summarize_guest)
        .collect::<Result<Vec<_>>>()?;
    let checks = features
        .iter()
        .map(|name| -> Result<FeatureCheck> {
            Ok(FeatureCheck {
                name: name.clone(),
                present: cpu.has_feature(name)?,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(CapsReport {
        host: summary,
        guests,
        checks,
    })
}

pub fn run(file: &Path, features: &[String], json: bool) -> Result<()> {
    let xml = common::read_xml(file)?;
    let caps = Capabilities::parse(&xml)
        .with_context(|| format!("parse capabilities from {}", file.display()))?;
    let report = report(&caps, features).context("inspect capabilities")?;
    info!(guests = report.guests.len(), "read host capabilities");

    if json {
        return common::print_json(&report);
    }

    let host = &report.host;
    println!("Host CPU");
    println!("  arch:     {}", or_dash(host.arch.as_deref()));
    println!("  model:    {}", or_dash(host.model.as_deref()));
    println!("  vendor:   {}", or_dash(host.vendor.as_deref()));
    println!(
        "  topology: sockets={} cores={} threads={}",
        host.sockets.map_or("-".into(), |v| v.to_string()),
        host.cores.map_or("-".into(), |v| v.to_string()),
        host.threads.map_or("-".into(), |v| v.to_string()),
    );
    println!("  features: {}", host.features.len());
    println!("NUMA cells: {}", host.numa_cells);
    for (idx, guest) in report.guests.iter().enumerate() {
        println!(
            "Guest {idx}: {} {} install={} kvm={}",
            or_dash(guest.os_type.as_deref()),
            or_dash(guest.arch.as_deref()),
            yes_no(guest.install_options),
            yes_no(guest.kvm),
        );
    }
    for check in &report.checks {
        println!("feature {}: {}", check.name, yes_no(check.present));
    }
    Ok(())
}
