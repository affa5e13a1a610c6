use clap::Parser;

/// Command-line flags, grounded on the original's `--host`/`--port`/`--config`
/// flags in `main.go`.
#[derive(Debug, Parser)]
#[command(name = "gateway", about = "HTTP-to-gRPC dynamic invocation gateway")]
pub struct Cli {
    /// Overrides the YAML config's listen host.
    #[arg(long)]
    pub host: Option<String>,

    /// Overrides the YAML config's listen port.
    #[arg(long)]
    pub port: Option<u16>,

    /// Path to the gateway's YAML config file.
    #[arg(long, default_value = "config.yaml")]
    pub config: String,
}
