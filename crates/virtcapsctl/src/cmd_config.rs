use std::path::Path;

use anyhow::Result;
use tracing::info;

use crate::common;
use crate::config::CliConfig;

fn print_list(label: &str, items: &[String]) {
    if items.is_empty() {
        println!("{label}: -");
    } else {
        println!("{label}: {}", items.join(", "));
    }
}

pub fn run(path: Option<&Path>, json: bool) -> Result<()> {
    let config = CliConfig::load(path)?;
    info!(prefix = %config.prefix.display(), "resolved settings");

    if json {
        return common::print_json(&config);
    }

    println!("version: {}", config.version);
    if let Some(cfgpath) = &config.cfgpath {
        println!("cfgpath: {}", cfgpath.display());
    }
    println!("default_qemu_user: {}", config.default_qemu_user);
    println!("stable_defaults: {}", config.stable_defaults);
    print_list("preferred_distros", &config.preferred_distros);
    print_list("hv_packages", &config.hv_packages);
    print_list("askpass_packages", &config.askpass_packages);
    print_list("libvirt_packages", &config.libvirt_packages);
    println!("default_graphics: {}", config.default_graphics);
    print_list("default_hvs", &config.default_hvs);
    println!("prefix: {}", config.prefix.display());
    println!("gettext_dir: {}", config.gettext_dir.display());
    println!("ui_dir: {}", config.ui_dir.display());
    println!("icon_dir: {}", config.icon_dir.display());
    println!("gsettings_dir: {}", config.gsettings_dir.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_prints_defaults() {
        let path = std::env::temp_dir().join("virtcapsctl-no-such-config.toml");
        run(Some(&path), false).expect("text output");
        run(Some(&path), true).expect("json output");
    }
}
