//! cascade CLI entry point.

// CLI binary needs to output to stdout/stderr
#![allow(clippy::print_stdout, clippy::print_stderr)]

use cascade::cli::{self, CliError, EXIT_OK, exit_code_for, render_error};
use cascade::commands::{self, Command};
use cascade::tracing::{self, TracingConfig, TracingFormat};

fn main() {
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("Application panicked: {panic_info}");
        eprintln!("Internal error occurred. Run with RUST_LOG=debug for more information.");
    }));

    let cli = cli::parse();
    let json = cli.json;

    let format = if json { TracingFormat::Json } else { cli.log_format };
    let config = TracingConfig {
        format,
        level: cli.level.into(),
        ..TracingConfig::default()
    };
    if let Err(e) = tracing::init_tracing(config) {
        eprintln!("{e:?}");
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            render_error(
                CliError::other(format!("Failed to create tokio runtime: {e}")),
                json,
            );
            std::process::exit(1);
        }
    };

    let command: Command = cli.command.into();
    match runtime.block_on(commands::execute(command, json)) {
        Ok(output) => {
            println!("{output}");
            std::process::exit(EXIT_OK);
        }
        Err(err) => {
            let code = exit_code_for(&err);
            render_error(err, json);
            std::process::exit(code);
        }
    }
}
