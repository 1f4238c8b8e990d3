use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(
    name = "rutil",
    version,
    about = "A terminal dashboard for oVirt-compatible virtualization engines."
)]
pub struct CliArgs {
    /// Engine API base URL (for example: https://engine.example.com/ovirt-engine/api)
    #[arg(long)]
    pub url: Option<String>,

    /// Login name; `@internal` is appended when no domain is given
    #[arg(short, long)]
    pub username: Option<String>,

    /// Accept self-signed engine certificates
    #[arg(long)]
    pub insecure: bool,

    /// Path to a rutil YAML config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Input tick in milliseconds; overrides refresh.input_tick_ms
    #[arg(long)]
    pub refresh_ms: Option<u64>,

    /// tracing filter (for example: info,debug,trace)
    #[arg(long, default_value = "info")]
    pub log_filter: String,

    /// Write logs to this file instead of discarding them
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::CliArgs;
    use clap::Parser;

    #[test]
    fn parses_connection_flags() {
        let args = CliArgs::parse_from([
            "rutil",
            "--url",
            "https://engine.lab/ovirt-engine/api",
            "-u",
            "admin",
            "--insecure",
            "--refresh-ms",
            "100",
        ]);
        assert_eq!(
            args.url.as_deref(),
            Some("https://engine.lab/ovirt-engine/api")
        );
        assert_eq!(args.username.as_deref(), Some("admin"));
        assert!(args.insecure);
        assert_eq!(args.refresh_ms, Some(100));
        assert_eq!(args.log_filter, "info");
        assert!(args.log_file.is_none());
    }
}
