//! Version command implementation

use anyhow::Result;
use clap::Args;

use crate::cli::Output;

#[derive(Args, Default)]
pub struct VersionArgs {
    /// Include build details
    #[arg(long)]
    pub detailed: bool,
}

/// Execute the version command
pub async fn execute(args: VersionArgs) -> Result<()> {
    let version = env!("CARGO_PKG_VERSION");
    let name = env!("CARGO_PKG_NAME");

    println!("{} {}", name, version);
    if !args.detailed {
        return Ok(());
    }

    let output = Output::new(false, false);
    output.key_value("Description:", env!("CARGO_PKG_DESCRIPTION"), false);
    output.key_value("Repository:", env!("CARGO_PKG_REPOSITORY"), false);
    output.key_value("Target:", std::env::consts::ARCH, false);
    output.key_value(
        "Profile:",
        if cfg!(debug_assertions) { "debug" } else { "release" },
        false,
    );
    output.key_value("Available cores:", &num_cpus::get().to_string(), false);

    Ok(())
}
