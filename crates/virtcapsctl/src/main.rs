use std::path::PathBuf;

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use virtcapsctl::cmd_caps;
use virtcapsctl::cmd_config;
use virtcapsctl::cmd_domcaps;
use virtcapsctl::cmd_sysinfo::{self, SysinfoArgs};

#[derive(Parser, Debug)]
#[command(name = "virtcapsctl", version, about = "libvirt capability XML inspector")]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
    /// Output JSON where applicable
    #[arg(long)]
    json: bool,
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Summarise a host capabilities document
    Caps {
        #[arg(long)]
        file: PathBuf,
        /// CPU feature to check (repeatable)
        #[arg(long)]
        feature: Vec<String>,
    },
    /// Summarise a domain capabilities document
    Domcaps {
        #[arg(long)]
        file: PathBuf,
    },
    /// Build a domain <sysinfo> block
    Sysinfo(SysinfoArgs),
    /// Show resolved settings
    Config {
        #[arg(long)]
        path: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let Cli { verbose, json, cmd } = Cli::parse();

    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| level.into()),
        ))
        .with_target(false)
        .init();

    match cmd {
        Cmd::Caps { file, feature } => cmd_caps::run(&file, &feature, json)?,
        Cmd::Domcaps { file } => cmd_domcaps::run(&file, json)?,
        Cmd::Sysinfo(args) => cmd_sysinfo::run(&args, json)?,
        Cmd::Config { path } => cmd_config::run(path.as_deref(), json)?,
    };

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_caps_features() {
        let cli = Cli::parse_from([
            "virtcapsctl",
            "caps",
            "--file",
            "caps.xml",
            "--feature",
            "vmx",
            "--feature",
            "svm",
        ]);
        match cli.cmd {
            Cmd::Caps { file, feature } => {
                assert_eq!(file, PathBuf::from("caps.xml"));
                assert_eq!(feature, ["vmx", "svm"]);
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn parse_sysinfo_defaults() {
        let cli = Cli::parse_from([
            "virtcapsctl",
            "-vv",
            "--json",
            "sysinfo",
            "--bios-date",
            "01/02/2015",
        ]);
        assert_eq!(cli.verbose, 2);
        assert!(cli.json);
        match cli.cmd {
            Cmd::Sysinfo(args) => {
                assert_eq!(args.sysinfo_type, "smbios");
                assert_eq!(args.bios_date.as_deref(), Some("01/02/2015"));
                assert_eq!(args.system_uuid, None);
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn parse_config_path() {
        let cli = Cli::parse_from(["virtcapsctl", "config", "--path", "cli.toml"]);
        match cli.cmd {
            Cmd::Config { path } => assert_eq!(path, Some(PathBuf::from("cli.toml"))),
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn domcaps_requires_file() {
        assert!(Cli::try_parse_from(["virtcapsctl", "domcaps"]).is_err());
    }
}
