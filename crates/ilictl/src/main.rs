use anyhow::Result;
use ilictl::cli::parse_cli;
use ilictl::logging::init_tracing;

fn main() -> Result<()> {
    let cli = parse_cli();
    init_tracing(cli.log_format)?;

    let mut out = std::io::stdout().lock();
    let mut err = std::io::stderr();
    ilictl::run(cli, &mut out, &mut err)
}
