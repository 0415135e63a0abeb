use anyhow::Result as AnyResult;
use clap::{Parser, Subcommand, ValueEnum};

use duct::{cmd, Expression};

const PACKAGES: &[&str] = &[
    "palmas-fg",
    "palmas",
    "device-descriptor",
    "register-access",
    "signal-processing",
];

#[derive(Debug, Subcommand)]
pub enum Subcommands {
    /// Runs tests on the host.
    Test {
        /// Only test this package.
        #[clap(long, short)]
        package: Option<String>,
    },

    /// Checks the project for errors.
    Check {
        /// Which logging backend to enable.
        logging: Option<Logging>,

        /// Cross-check for an embedded target, e.g. `thumbv7em-none-eabihf`.
        #[clap(long)]
        target: Option<String>,
    },

    /// Builds the documentation.
    Doc {
        /// Whether to open the documentation in a browser.
        #[clap(long)]
        open: bool,
    },

    /// Runs extra checks (fmt, clippy).
    ExtraCheck {
        /// Which logging backend to enable.
        logging: Option<Logging>,
    },
}

#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Logging {
    #[default]
    None,
    Log,
    Defmt,
}

impl Logging {
    fn feature(&self) -> Option<&str> {
        match self {
            Logging::None => None,
            Logging::Log => Some("--features=log"),
            Logging::Defmt => Some("--features=defmt"),
        }
    }
}

#[derive(Debug, Parser)]
#[clap(about, version, propagate_version = true)]
pub struct Cli {
    #[clap(subcommand)]
    pub subcommand: Subcommands,
}

fn cargo(args: &[&str]) -> Expression {
    println!("🛠️  Running command: cargo {}", args.join(" "));

    cmd("cargo", args)
}

fn checks(logging: Logging, target: Option<String>) -> AnyResult<()> {
    let target = target.map(|target| format!("--target={target}"));

    let mut args = vec!["check", "-p", "palmas-fg"];
    args.extend(logging.feature());
    args.extend(target.as_deref());

    cargo(&args).run()?;

    Ok(())
}

fn docs(open: bool) -> AnyResult<()> {
    let mut args = vec!["doc", "--no-deps", "-p", "palmas-fg", "-p", "palmas"];

    if open {
        args.push("--open");
    }

    cargo(&args).run()?;

    Ok(())
}

fn extra_checks(logging: Logging) -> AnyResult<()> {
    cargo(&["fmt", "--check"]).run()?;

    let mut args = vec!["clippy", "--workspace"];
    args.extend(logging.feature());

    cargo(&args).run()?;

    Ok(())
}

fn test(package: Option<String>) -> AnyResult<()> {
    let mut args = vec!["test"];

    match package.as_deref() {
        Some(package) => args.extend(["-p", package]),
        None => {
            for p in PACKAGES {
                args.push("-p");
                args.push(p);
            }
        }
    }

    cargo(&args).run()?;

    Ok(())
}

fn main() -> AnyResult<()> {
    let cli = Cli::parse();

    match cli.subcommand {
        Subcommands::Test { package } => test(package),
        Subcommands::Check { logging, target } => checks(logging.unwrap_or_default(), target),
        Subcommands::Doc { open } => docs(open),
        Subcommands::ExtraCheck { logging } => extra_checks(logging.unwrap_or_default()),
    }
}
