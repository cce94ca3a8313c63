use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "keyway", version, about = "Keyway SSO broker operator tools")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the CLI version.
    Version,

    /// Print a fresh random signing secret suitable for `KEYWAY_SIGNING_SECRET`.
    GenerateSecret,

    /// Decode a broker token and print its claims as JSON.
    ///
    /// With a secret the signature, expiry and issuer are verified;
    /// without one the payload is only decoded.
    InspectToken {
        /// The JWT to inspect.
        token: String,

        /// Signing secret to verify against.
        #[arg(long, env = "KEYWAY_SIGNING_SECRET", hide_env_values = true)]
        secret: Option<String>,

        /// Expected issuer.
        #[arg(long, env = "KEYWAY_ISSUER", default_value = "keyway")]
        issuer: String,

        /// Product id whose scoped tokens are accepted.
        #[arg(long)]
        audience: Option<String>,
    },
}
