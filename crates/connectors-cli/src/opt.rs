use std::path::PathBuf;

use clap::Parser;

fn default_config_file() -> PathBuf {
    PathBuf::from("config.yml")
}

/// CLI surface (SPEC_FULL §6): `--config-file` names the YAML config,
/// `--debug` raises the log level, `--service-type` is only consumed by
/// the bundled demo binary path, mirroring `kibana.py`'s own
/// `--service-type`/`--index-name` flags kept out of the production
/// orchestrator's required args.
#[derive(Debug, Clone, Parser)]
#[clap(version, next_display_order = None)]
pub struct Opt {
    #[clap(long, default_value_os_t = default_config_file())]
    pub config_file: PathBuf,

    #[clap(long)]
    pub debug: bool,

    #[clap(long)]
    pub service_type: Option<String>,
}
