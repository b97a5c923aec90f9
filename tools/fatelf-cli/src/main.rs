pub mod cli;
pub mod logger;
pub mod output;

use std::process::ExitCode;

use clap::Parser;
use fatelf::{osabi, BuildOptions, BuildReport, ContainerBuilder, FatElfError, Trampoline};

use crate::cli::{BuildArgs, Cli, Command, RunArgs};
use crate::output::OutputFormat;

fn main() -> ExitCode {
    let cli = Cli::parse();
    logger::init(cli.log_level());

    let result = match cli.command {
        Command::Build(args) => build(args).map(|report| {
            let _ = output::emit(cli.output, &report);
            ExitCode::SUCCESS
        }),
        Command::Run(args) => run(args),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            output::emit_error(cli.output, e.exit_status(), &e.to_string());
            if matches!(e, FatElfError::UnknownAbiName { .. }) && cli.output == OutputFormat::Human {
                eprintln!("known ABIs: {}", known_abis());
            }
            e.exit_code()
        }
    }
}

fn build(args: BuildArgs) -> Result<BuildReport, FatElfError> {
    let inputs = cli::parse_inputs(&args.inputs)?;
    let mut builder = ContainerBuilder::with_options(BuildOptions {
        overwrite: args.force,
        ..BuildOptions::for_host()
    });
    for input in inputs {
        builder.push(input.path, input.osabi)?;
    }
    builder.build(&args.output)
}

fn known_abis() -> String {
    osabi::all()
        .iter()
        .map(|info| info.name)
        .collect::<Vec<_>>()
        .join(", ")
}

fn run(args: RunArgs) -> Result<ExitCode, FatElfError> {
    let trampoline = Trampoline::new();
    log::debug!("launching through {}", trampoline.launcher_name());
    let status = trampoline.run(&args.container, &args.args)?;
    Ok(ExitCode::from(status.clamp(0, 255) as u8))
}
