use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};

use crate::commands::{
    CompletionsCommand, ConfigureCommand, CredentialsCommand, DoctorCommand, ExportCommand,
    LoginCommand, StatusCommand,
};

#[derive(Debug, Clone, Parser)]
#[command(name = "sso-autologin", version, about = "Headless automation of AWS SSO token login", long_about = None, arg_required_else_help = false)]
pub struct Cli {
    #[arg(
        short = 'p',
        long,
        global = true,
        env = "AWS_PROFILE",
        default_value = "prod",
        help = "AWS profile to use"
    )]
    pub profile: String,

    #[arg(short = 'v', long, global = true, action = ArgAction::Count, help = "Increase verbosity (-v info, -vv debug, -vvv trace)")]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    #[command(about = "Log in to AWS SSO by driving the browser flow")]
    Login(LoginCommand),
    #[command(about = "Configure browser and credential settings for a profile")]
    Configure(ConfigureCommand),
    #[command(about = "Show the cached SSO token and stored credentials")]
    Status(StatusCommand),
    #[command(about = "Print stored role credentials")]
    Export(ExportCommand),
    #[command(about = "Manage the sign-in email and password in the keyring")]
    Credentials(CredentialsCommand),
    #[command(about = "Check the AWS CLI, Chrome and keyring setup")]
    Doctor(DoctorCommand),
    #[command(about = "Generate shell completion scripts for sso-autologin")]
    Completions(CompletionsCommand),
}

impl Cli {
    pub async fn execute(self) -> Result<()> {
        let profile = self.profile;
        let command = self
            .command
            .unwrap_or_else(|| Commands::Login(LoginCommand::default()));

        match command {
            Commands::Login(cmd) => cmd.execute(&profile).await,
            Commands::Configure(cmd) => cmd.execute(&profile).await,
            Commands::Status(cmd) => cmd.execute(&profile).await,
            Commands::Export(cmd) => cmd.execute(&profile).await,
            Commands::Credentials(cmd) => cmd.execute(&profile).await,
            Commands::Doctor(cmd) => cmd.execute(&profile).await,
            Commands::Completions(cmd) => {
                cmd.execute();
                Ok(())
            }
        }
    }
}
