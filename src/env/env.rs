// SPDX-License-Identifier: GPL-2.0-or-later

use bytesize::ByteSize;
use common::EnvConfig;
use serde::Deserialize;
use std::{
    collections::HashMap,
    fs::{self, File},
    io::Write,
    path::{Path, PathBuf},
    time::Duration,
};
use thiserror::Error;

/// Main config. Should not be editable at runtime.
#[derive(Clone, Debug, PartialEq)]
pub struct EnvConf {
    listen_addr: String,
    max_manifest_segments: usize,
    max_manifest_size: ByteSize,
    min_segment_size: ByteSize,
    max_get_time_secs: u64,
    rate_limit_after_segment: usize,
    rate_limit_segments_per_sec: u32,
    max_buffered_delete_segments: usize,
    storage_dir: PathBuf,
    raw: String,
}

#[derive(Debug, Deserialize)]
pub struct RawEnvConf {
    listen_addr: String,
    max_manifest_segments: usize,
    max_manifest_size: ByteSize,
    min_segment_size: ByteSize,
    max_get_time_secs: u64,
    rate_limit_after_segment: usize,
    rate_limit_segments_per_sec: u32,
    max_buffered_delete_segments: usize,
    storage_dir: PathBuf,
}

impl EnvConf {
    pub fn new(config_path: &PathBuf) -> Result<EnvConf, EnvConfigNewError> {
        use EnvConfigNewError::*;
        let file_exist = config_path.exists();
        if !file_exist {
            print!(
                "\n\nGenerating '{}' and exiting..\n\n\n",
                config_path.to_string_lossy()
            );

            generate_config(config_path)?;
            std::process::exit(0);
        }

        let env_toml = fs::read_to_string(config_path).map_err(ReadFile)?;
        let env = parse_config(env_toml)?;

        Ok(env)
    }
}

impl EnvConfig for EnvConf {
    fn listen_addr(&self) -> &str {
        &self.listen_addr
    }
    fn max_manifest_segments(&self) -> usize {
        self.max_manifest_segments
    }
    fn max_manifest_size(&self) -> ByteSize {
        self.max_manifest_size
    }
    fn min_segment_size(&self) -> ByteSize {
        self.min_segment_size
    }
    fn max_get_time(&self) -> Duration {
        Duration::from_secs(self.max_get_time_secs)
    }
    fn rate_limit_after_segment(&self) -> usize {
        self.rate_limit_after_segment
    }
    fn rate_limit_segments_per_sec(&self) -> u32 {
        self.rate_limit_segments_per_sec
    }
    fn max_buffered_delete_segments(&self) -> usize {
        self.max_buffered_delete_segments
    }
    fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }
    fn raw(&self) -> &str {
        &self.raw
    }
}

#[derive(Debug, Error)]
pub enum EnvConfigNewError {
    #[error("read env config file: {0}")]
    ReadFile(std::io::Error),

    #[error("generate env config: {0}")]
    Generate(#[from] GenerateEnvConfigError),

    #[error("parse env config: {0}")]
    Parse(#[from] ParseEnvConfigError),
}

#[derive(Debug, Error)]
pub enum GenerateEnvConfigError {
    #[error("create file: {0}")]
    CreateFile(std::io::Error),

    #[error("templater error: {0}")]
    AddTemplate(upon::Error),

    #[error("render template: {0}")]
    RenderTemplate(upon::Error),

    #[error("get parent directory")]
    GetParentDir(),

    #[error("create directory: {0}")]
    CreateDir(std::io::Error),

    #[error("write file: {0}")]
    WriteFile(std::io::Error),
}

fn generate_config(path: &Path) -> Result<(), GenerateEnvConfigError> {
    use GenerateEnvConfigError::*;

    let data: HashMap<&str, &str> = HashMap::new();

    let mut engine = upon::Engine::new();
    engine
        .add_template("config", CONFIG_TEMPLATE)
        .map_err(AddTemplate)?;

    let config = engine
        .get_template("config")
        .expect("template should just have been added")
        .render(data)
        .to_string()
        .map_err(RenderTemplate)?;

    let config_dir = path.parent().ok_or(GetParentDir())?;
    fs::create_dir_all(config_dir).map_err(CreateDir)?;

    let mut file = File::create(path).map_err(CreateFile)?;
    write!(file, "{config}").map_err(WriteFile)?;

    Ok(())
}

const CONFIG_TEMPLATE: &str = include_str!("./default_config.tpl");

#[derive(Debug, Error)]
pub enum ParseEnvConfigError {
    #[error("{0}")]
    DeserializeToml(#[from] toml::de::Error),

    #[error("listen_addr must not be empty")]
    ListenAddrEmpty,
}

fn parse_config(env_toml: String) -> Result<EnvConf, ParseEnvConfigError> {
    use ParseEnvConfigError::*;
    let raw: RawEnvConf = toml::from_str(&env_toml)?;

    if raw.listen_addr.is_empty() {
        return Err(ListenAddrEmpty);
    }

    Ok(EnvConf {
        listen_addr: raw.listen_addr,
        max_manifest_segments: raw.max_manifest_segments,
        max_manifest_size: raw.max_manifest_size,
        min_segment_size: raw.min_segment_size,
        max_get_time_secs: raw.max_get_time_secs,
        rate_limit_after_segment: raw.rate_limit_after_segment,
        rate_limit_segments_per_sec: raw.rate_limit_segments_per_sec,
        max_buffered_delete_segments: raw.max_buffered_delete_segments,
        storage_dir: raw.storage_dir,
        raw: env_toml,
    })
}
