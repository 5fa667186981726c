//! Init command for the swup CLI.
//!
//! Sets up swup for the current user.
//!
//! ## Usage
//!
//! ```bash
//! swup init                          # Interactive setup
//! swup init -y                       # Accept the defaults
//! swup init -y --skip-install        # Set up without installing a toolchain
//! swup init --home-dir ~/swup        # Custom home directory
//! swup init -y --overwrite           # Start over, removing installed toolchains
//! ```
//!
//! ## Behavior
//!
//! - Creates the home, toolchains and bin directories and `config.json`
//! - Writes `env.sh` and `env.fish`, which put the active toolchain on `PATH`
//! - Sources the matching script from the shell profile unless
//!   `--no-modify-profile` is given
//! - Installs and activates the latest release when nothing is installed
//!
//! Running it again keeps the existing installation and only refreshes the
//! environment scripts.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use swup_engine::InitOptions;

use super::{confirm, open_engine_with};
use crate::shell::{configure_profile, format_result_message};

/// Arguments for the `init` command.
#[derive(Args)]
pub struct InitArgs {
    /// Do not ask for confirmation.
    #[arg(short = 'y', long)]
    pub assume_yes: bool,

    /// Do not install a toolchain.
    #[arg(long)]
    pub skip_install: bool,

    /// Do not touch the shell profile.
    #[arg(long)]
    pub no_modify_profile: bool,

    /// Remove an existing installation, including its toolchains, first.
    #[arg(long)]
    pub overwrite: bool,

    /// swup home directory.
    #[arg(long, value_name = "DIR")]
    pub home_dir: Option<PathBuf>,

    /// Directory the environment scripts add to `PATH`.
    #[arg(long, value_name = "DIR")]
    pub bin_dir: Option<PathBuf>,

    /// Where toolchains are installed.
    #[arg(long, value_name = "DIR")]
    pub toolchains_dir: Option<PathBuf>,
}

impl InitArgs {
    fn options(&self) -> InitOptions {
        InitOptions {
            assume_yes: self.assume_yes,
            skip_install: self.skip_install,
            no_modify_profile: self.no_modify_profile,
            home_dir: self.home_dir.clone(),
            bin_dir: self.bin_dir.clone(),
            toolchains_dir: self.toolchains_dir.clone(),
            overwrite: self.overwrite,
        }
    }
}

/// Executes the `init` command.
///
/// # Errors
///
/// Returns an error if:
/// - The platform is not supported
/// - The user declines
/// - Directories, configuration or environment scripts cannot be written
/// - Installing the latest release fails
pub async fn execute(args: &InitArgs) -> Result<()> {
    let options = args.options();
    let engine = open_engine_with(options.path_overrides())?;
    let paths = engine.paths();

    if engine.is_initialized() && !options.overwrite {
        println!("swup is already set up in {}.", paths.home.display());
    } else {
        println!("swup will be set up for {}:", engine.platform().descriptor());
        println!("  home:       {}", paths.home.display());
        println!("  toolchains: {}", paths.toolchains.display());
        println!("  bin:        {}", paths.bin.display());
        if options.overwrite {
            println!("The existing installation and its toolchains will be removed.");
        }
        if !options.skip_install {
            println!("The latest release will be installed.");
        }
        confirm("Proceed?", options.assume_yes)?;
    }

    let outcome = engine.init(&options).await?;
    if outcome.created {
        println!("Created {}", outcome.paths.home.display());
    }
    if let Some(installed) = &outcome.installed {
        println!("Installed toolchain {}.", installed.version);
        if let Some(script) = &installed.post_install_script {
            println!("The toolchain needs additional system packages. Review and run:");
            println!("  sh {}", script.display());
        }
    }

    if options.no_modify_profile {
        println!(
            "To use swup, source {} from your shell profile.",
            outcome.env_sh.display()
        );
    } else {
        match dirs::home_dir() {
            Some(user_home) => {
                let result = configure_profile(&user_home, &outcome.env_sh, &outcome.env_fish)?;
                println!("{}", format_result_message(&result, &outcome.env_sh));
            }
            None => tracing::warn!("home directory unknown; shell profile left unchanged"),
        }
    }

    Ok(())
}
