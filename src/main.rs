use cfgrid::cli::Cli;
use cfgrid::log::{config_echo, init_logger, show_farewell_with_timing, show_greeting};
use cfgrid::{load_config, run};
use clap::Parser;
use std::process::ExitCode;
use std::time::Instant;

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // help and version land here too, on stdout
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };
    init_logger(cli.verbose, cli.quiet);

    let start_time = Instant::now();
    let banners = !cli.quiet && !cli.command.prints_data();
    if banners {
        show_greeting(cli.command.name());
        if cli.verbose
            && let Ok(config) = load_config(cli.config.as_deref())
        {
            config_echo(&config, cli.config.as_deref());
        }
    }

    match run(&cli) {
        Ok(()) => {
            if banners {
                show_farewell_with_timing(start_time.elapsed());
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
