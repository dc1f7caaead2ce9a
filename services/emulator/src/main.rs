use std::path::Path;

use clap::{Arg, Command};
use tracing::info;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "js8emu starting");

    let matches = Command::new("JS8Emu")
        .version(env!("CARGO_PKG_VERSION"))
        .about("A JS8Call service emulator: radios and airwaves over local TCP")
        .arg(
            Arg::new("config")
                .help("Path to the INI configuration file")
                .short('c')
                .long("config")
                .default_value("config.ini"),
        )
        .get_matches();

    let path = matches
        .get_one::<String>("config")
        .expect("config has a default");
    let config = match js8emu::load_config_from_path(Path::new(path)) {
        Ok(config) => config,
        Err(error) => {
            eprintln!("{error}");
            std::process::exit(1);
        }
    };

    if let Err(error) = js8emu::run(config).await {
        eprintln!("{error}");
        std::process::exit(1);
    }
}
