use std::io::Write;

use anyhow::{Context, Result};
use ili_analysis::{analyze_consecutive_pairs, analyze_runs};
use ili_config::{config_path, ensure_workspace_config, validate_config};

pub mod cli;
pub mod logging;
pub mod report;
pub mod runs;

use crate::cli::{Cli, Commands};
use crate::report::{write_config_warnings, write_pairs, write_report};
use crate::runs::load_run_files;

/// Executes one command. Reports go to `out`, config warnings to `err`.
pub fn run(cli: Cli, out: &mut dyn Write, err: &mut dyn Write) -> Result<()> {
    let workspace = cli.workspace.canonicalize().with_context(|| {
        format!(
            "failed to resolve workspace path {}",
            cli.workspace.display()
        )
    })?;

    let config = ensure_workspace_config(&workspace).with_context(|| {
        format!(
            "failed to load or create workspace config at {}",
            config_path(&workspace).display()
        )
    })?;
    let warnings = validate_config(&config);
    let settings = config.settings();

    match cli.command {
        Commands::Analyze(args) => {
            write_config_warnings(&warnings, err)?;
            let runs = load_run_files(&args.run_files)?;
            let report = analyze_runs(&runs, &settings).context("run analysis failed")?;
            write_report(&report, args.output, out)
        }
        Commands::Pairs(args) => {
            write_config_warnings(&warnings, err)?;
            let runs = load_run_files(&args.run_files)?;
            let pairs =
                analyze_consecutive_pairs(&runs, &settings).context("pair analysis failed")?;
            write_pairs(&pairs, args.output, out)
        }
        Commands::CheckConfig => {
            writeln!(out, "# {}", config_path(&workspace).display())?;
            if warnings.is_empty() {
                writeln!(out, "# no warnings")?;
            }
            for warning in &warnings {
                writeln!(out, "# warning [{}]: {}", warning.code, warning.message)?;
            }
            let rendered =
                toml::to_string_pretty(&config).context("failed to render configuration")?;
            out.write_all(rendered.as_bytes())?;
            Ok(())
        }
    }
}
