// SPDX-License-Identifier: GPL-2.0-or-later

mod app;

use app::run;

use clap::Parser;
use std::path::PathBuf;

#[tokio::main]
async fn main() {
    let rt_handle = tokio::runtime::Handle::current();
    let args = Args::parse();

    if let Err(e) = run(rt_handle, &args.config).await {
        eprintln!("failed to run app: {e}");
    }
}

const DEFAULT_CONFIG_PATH: &str = "./configs/slo-proxy.toml";

#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
pub struct Args {
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,
}
