use std::io;

use anyhow::{Context, Result};
use clap_serde_derive::ClapSerde;

#[derive(ClapSerde, Debug)]
pub struct Config {
    /// The address the listener binds to
    #[default("0.0.0.0".to_string())]
    #[arg(short, long, env)]
    pub(crate) address: String,

    /// The port the listener binds to
    #[default(8080)]
    #[arg(short, long, env)]
    pub(crate) port: u16,

    /// Root directory under which per-request workspaces are created
    #[default("/tmp/demucs_runner".to_string())]
    #[arg(long, env)]
    pub(crate) scratch_dir: String,

    /// Program and leading arguments used to start Demucs
    #[default("python3 -m demucs.separate".to_string())]
    #[arg(long, env)]
    pub(crate) demucs_command: String,

    /// Demucs model name, also used as the output folder name
    #[default("htdemucs".to_string())]
    #[arg(long, env = "DEMUCS_MODEL")]
    pub(crate) model: String,

    /// Stem isolated in two-stem mode
    #[default("vocals".to_string())]
    #[arg(long, env)]
    pub(crate) two_stems: String,

    /// Seconds a single Demucs run may take before it is killed
    #[default(3600)]
    #[arg(long, env)]
    pub(crate) tool_timeout_secs: u64,

    /// OTLP collector endpoint, traces and metrics are only exported when set
    #[arg(long, env)]
    pub(crate) otlp_endpoint: Option<String>,

    /// Keep logging to the console while exporting to OTLP
    #[default(false)]
    #[arg(long, env)]
    pub(crate) console: bool,
}

impl Config {
    pub fn from_toml(path: &str) -> Result<Self> {
        let str = std::fs::read_to_string(path)?;
        let opt: <Config as ClapSerde>::Opt = toml::from_str(&str)?;
        Ok(Config::from(opt))
    }

    /// Reads `path`, falling back to the defaults only when the file does not
    /// exist and `allow_missing` is set. Parse errors are always returned.
    pub fn load(path: &str, allow_missing: bool) -> Result<Self> {
        match Config::from_toml(path) {
            Ok(config) => Ok(config),
            Err(err) if allow_missing && is_not_found(&err) => Ok(Config::default()),
            Err(err) => Err(err).with_context(|| format!("Failed to read configuration file {path}")),
        }
    }
}

fn is_not_found(err: &anyhow::Error) -> bool {
    err.downcast_ref::<io::Error>()
        .is_some_and(|err| err.kind() == io::ErrorKind::NotFound)
}
