use std::ffi::{OsStr, OsString};
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use fatelf::format::MAX_RECORDS;
use fatelf::{osabi, FatElfError, OsAbiInfo};
use log::LevelFilter;

use crate::output::OutputFormat;

/// Build FatELF containers and run the image that matches this host.
#[derive(Parser, Debug)]
#[command(name = "fatelf", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Output format for reports and errors.
    #[arg(long, value_enum, default_value = "human", global = true)]
    pub output: OutputFormat,

    /// Log every step to stderr.
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only report errors (suppresses warnings).
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

impl Cli {
    pub fn log_level(&self) -> LevelFilter {
        if self.verbose {
            LevelFilter::Debug
        } else if self.quiet {
            LevelFilter::Error
        } else {
            LevelFilter::Warn
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Glue ELF binaries into one FatELF container.
    Build(BuildArgs),

    /// Run the container's image for this host in place of this process.
    Run(RunArgs),
}

// ── build ────────────────────────────────────────────────────────────

#[derive(clap::Args, Debug)]
pub struct BuildArgs {
    /// Overwrite the output if it already exists (must precede the inputs).
    #[arg(long, default_value_t = false)]
    pub force: bool,

    /// Container to create.
    // Own id: the global `--output` flag already owns `output`.
    #[arg(id = "out_path", value_name = "OUTPUT")]
    pub output: PathBuf,

    /// Input binaries, each optionally preceded by `--osabi <name>`.
    #[arg(
        required = true,
        num_args = 1..,
        allow_hyphen_values = true,
        trailing_var_arg = true,
        value_name = "[--osabi NAME] BINARY"
    )]
    pub inputs: Vec<OsString>,
}

// ── run ──────────────────────────────────────────────────────────────

#[derive(clap::Args, Debug)]
pub struct RunArgs {
    /// FatELF container to run.
    pub container: PathBuf,

    /// Arguments for the embedded program.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<OsString>,
}

/// One build input after `--osabi` has been attached to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputSpec {
    pub path: PathBuf,
    pub osabi: Option<&'static OsAbiInfo>,
}

/// Minimum number of binaries `build` accepts.
pub const MIN_INPUTS: usize = 2;

/// Split `[--osabi NAME] BINARY ...` into inputs.
///
/// `--osabi` (or `--osabi=NAME`) applies to the next binary only.
pub fn parse_inputs(raw: &[OsString]) -> Result<Vec<InputSpec>, FatElfError> {
    let mut inputs = Vec::new();
    let mut pending: Option<&'static OsAbiInfo> = None;
    let mut args = raw.iter();

    while let Some(arg) = args.next() {
        let name = if arg == "--osabi" {
            let value = args
                .next()
                .ok_or_else(|| FatElfError::usage("--osabi requires an argument"))?;
            Some(value.as_os_str())
        } else {
            arg.to_str()
                .and_then(|s| s.strip_prefix("--osabi="))
                .map(OsStr::new)
        };

        if let Some(name) = name {
            pending = Some(lookup_osabi(name)?);
            continue;
        }

        if inputs.len() == MAX_RECORDS {
            return Err(FatElfError::TooManyInputs { limit: MAX_RECORDS });
        }
        inputs.push(InputSpec {
            path: PathBuf::from(arg),
            osabi: pending.take(),
        });
    }

    if pending.is_some() {
        return Err(FatElfError::usage("--osabi must be followed by a binary"));
    }
    if inputs.len() < MIN_INPUTS {
        return Err(FatElfError::usage(format!(
            "at least {MIN_INPUTS} binaries are required, got {}",
            inputs.len()
        )));
    }
    Ok(inputs)
}

fn lookup_osabi(name: &OsStr) -> Result<&'static OsAbiInfo, FatElfError> {
    let name = name.to_string_lossy();
    osabi::lookup_by_name(&name).ok_or_else(|| FatElfError::UnknownAbiName {
        name: name.into_owned(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use proptest::prelude::*;

    fn os(list: &[&str]) -> Vec<OsString> {
        list.iter().map(OsString::from).collect()
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();

        // Every value must downcast to its field type, globals included.
        let cli = Cli::try_parse_from(["fatelf", "--output", "json", "build", "out", "a", "b"]).unwrap();
        assert_eq!(cli.output, OutputFormat::Json);
        let Command::Build(args) = cli.command else {
            panic!("expected build");
        };
        assert_eq!(args.output, PathBuf::from("out"));
        assert_eq!(args.inputs, os(&["a", "b"]));
    }

    #[test]
    fn build_output_path_does_not_clash_with_format_flag() {
        let cli = Cli::try_parse_from(["fatelf", "build", "--output", "json", "human", "a", "b"]).unwrap();
        assert_eq!(cli.output, OutputFormat::Json);
        let Command::Build(args) = cli.command else {
            panic!("expected build");
        };
        assert_eq!(args.output, PathBuf::from("human"));
        assert_eq!(args.inputs, os(&["a", "b"]));
    }

    #[test]
    fn build_accepts_leading_osabi() {
        let cli = Cli::try_parse_from([
            "fatelf", "build", "out", "--osabi", "linux", "a", "--osabi", "freebsd", "b",
        ])
        .unwrap();
        let Command::Build(args) = cli.command else {
            panic!("expected build");
        };
        assert_eq!(args.output, PathBuf::from("out"));
        assert!(!args.force);
        assert_eq!(args.inputs, os(&["--osabi", "linux", "a", "--osabi", "freebsd", "b"]));
    }

    #[test]
    fn build_force_precedes_inputs() {
        let cli = Cli::try_parse_from(["fatelf", "build", "--force", "out", "a", "b"]).unwrap();
        let Command::Build(args) = cli.command else {
            panic!("expected build");
        };
        assert!(args.force);
        assert_eq!(args.inputs, os(&["a", "b"]));
    }

    #[test]
    fn run_passes_flags_through() {
        let cli = Cli::try_parse_from(["fatelf", "run", "app.fat", "-c", "exit 5", "-v", "--output", "x"])
            .unwrap();
        assert!(!cli.verbose);
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.container, PathBuf::from("app.fat"));
        assert_eq!(args.args, os(&["-c", "exit 5", "-v", "--output", "x"]));
    }

    #[test]
    fn run_args_after_double_dash() {
        let cli = Cli::try_parse_from(["fatelf", "run", "app.fat", "--", "-q"]).unwrap();
        assert!(!cli.quiet);
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.args, os(&["-q"]));
    }

    #[test]
    fn global_flags_before_subcommand() {
        let cli = Cli::try_parse_from(["fatelf", "-q", "--output", "json", "run", "c"]).unwrap();
        assert!(cli.quiet);
        assert_eq!(cli.output, OutputFormat::Json);
        assert_eq!(cli.log_level(), LevelFilter::Error);
    }

    #[test]
    fn osabi_applies_to_next_binary_only() {
        let inputs = parse_inputs(&os(&["--osabi", "linux", "a", "b", "--osabi=openbsd", "c"])).unwrap();
        assert_eq!(inputs.len(), 3);
        assert_eq!(inputs[0].osabi.map(|o| o.name), Some("linux"));
        assert_eq!(inputs[1].osabi, None);
        assert_eq!(inputs[2].osabi.map(|o| o.name), Some("openbsd"));
        assert_eq!(inputs[2].path, PathBuf::from("c"));
    }

    #[test]
    fn later_osabi_replaces_earlier_one() {
        let inputs = parse_inputs(&os(&["--osabi", "linux", "--osabi", "hurd", "a", "b"])).unwrap();
        assert_eq!(inputs[0].osabi.map(|o| o.name), Some("hurd"));
    }

    #[test]
    fn unknown_osabi_is_fatal() {
        let err = parse_inputs(&os(&["--osabi", "Linux", "a", "b"])).unwrap_err();
        match err {
            FatElfError::UnknownAbiName { name } => assert_eq!(name, "Linux"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn dangling_osabi_is_fatal() {
        assert!(matches!(
            parse_inputs(&os(&["a", "b", "--osabi"])),
            Err(FatElfError::Usage { .. })
        ));
        assert!(matches!(
            parse_inputs(&os(&["a", "b", "--osabi", "linux"])),
            Err(FatElfError::Usage { .. })
        ));
    }

    #[test]
    fn fewer_than_two_binaries_is_fatal() {
        assert!(matches!(
            parse_inputs(&os(&["--osabi", "linux", "a"])),
            Err(FatElfError::Usage { .. })
        ));
        assert!(matches!(parse_inputs(&[]), Err(FatElfError::Usage { .. })));
    }

    #[test]
    fn more_than_255_binaries_is_fatal() {
        let raw: Vec<OsString> = (0..256).map(|i| OsString::from(format!("in{i}"))).collect();
        assert!(matches!(
            parse_inputs(&raw),
            Err(FatElfError::TooManyInputs { limit: 255 })
        ));
        assert_eq!(parse_inputs(&raw[..255]).unwrap().len(), 255);
    }

    proptest! {
        /// Every binary gets exactly the `--osabi` written immediately before it.
        #[test]
        fn overrides_attach_to_following_binary(
            plan in proptest::collection::vec(proptest::option::of(0usize..4), 2..12),
        ) {
            let names = ["linux", "freebsd", "netbsd", "solaris"];
            let mut raw = Vec::new();
            for (i, abi) in plan.iter().enumerate() {
                if let Some(n) = abi {
                    raw.push(OsString::from("--osabi"));
                    raw.push(OsString::from(names[*n]));
                }
                raw.push(OsString::from(format!("bin{i}")));
            }
            let inputs = parse_inputs(&raw).unwrap();
            prop_assert_eq!(inputs.len(), plan.len());
            for (input, abi) in inputs.iter().zip(&plan) {
                prop_assert_eq!(input.osabi.map(|o| o.name), abi.map(|n| names[n]));
            }
        }
    }
}
