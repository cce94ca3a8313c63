// Import and re-export the `error` module
pub use self::error::{Error, Result};
mod error;

use clap::Parser;
use cli::{Cli, Commands};

mod cli;
mod inspect;
mod logging;

fn main() -> Result<()> {
    if let Err(e) = run() {
        log::error!("{}", e);
        std::process::exit(1);
    }
    Ok(())
}

fn run() -> Result<()> {
    logging::init()?;

    let args = Cli::parse();

    match &args.command {
        Commands::Version => {
            println!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
        }
        Commands::GenerateSecret => {
            println!("{}", keyway_core::auth::jwt::generate_secret());
        }
        Commands::InspectToken {
            token,
            secret,
            issuer,
            audience,
        } => {
            let inspection =
                inspect::inspect(token, secret.as_deref(), issuer, audience.as_deref())?;
            if !inspection.verified {
                log::warn!("no signing secret given; signature NOT verified");
            }
            println!("{}", serde_json::to_string_pretty(&inspection.claims)?);
        }
    }

    Ok(())
}
