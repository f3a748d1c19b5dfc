use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::adapters::PlatformChannel;
use crate::domain::StatRole;
use crate::error::Result;
use crate::persistence::ChannelRegistry;
use crate::services::TickReport;

#[derive(Parser)]
#[command(name = "statbot")]
#[command(version)]
#[command(about = "Keeps Discord channel names in sync with token, floor and mining stats", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Directory holding default.toml and <STATBOT_ENV>.toml
    #[arg(short, long, default_value = "config", env = "STATBOT_CONFIG_DIR")]
    pub config: PathBuf,
}

#[derive(Subcommand, Clone, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Run the reconciliation loop until SIGINT/SIGTERM (default)
    Run,
    /// Run a single tick with every role due, then exit
    Once,
    /// Fetch all stats and print the labels without touching Discord
    Preview,
    /// Show the channel registry and whether each channel still exists
    Channels,
    /// Import `<channelId>.<statKey>` marker files into the registry
    Migrate {
        /// Directory containing the marker files
        #[arg(long)]
        from: PathBuf,
    },
}

/// Print rendered labels, one line per role
pub fn print_preview(labels: &[(StatRole, Result<String>)]) {
    println!("\n  {:<22} LABEL", "ROLE");
    println!("  {}", "-".repeat(60));
    for (role, label) in labels {
        match label {
            Ok(label) => println!("  {:<22} {}", role.key(), label),
            Err(e) => println!("  {:<22} \x1b[33m(no label: {})\x1b[0m", role.key(), e),
        }
    }
    println!();
}

/// Print the registry, marking bindings whose channel is gone.
///
/// `platform_channels` is `None` when the platform could not be listed.
pub fn print_channels(registry: &ChannelRegistry, platform_channels: Option<&[PlatformChannel]>) {
    println!("\nRegistry: {}", registry.path().display());
    if registry.is_empty() {
        println!("  (no channels bound)\n");
        return;
    }

    println!("  {:<22} {:<20} {:<8} LAST LABEL", "ROLE", "CHANNEL", "STATUS");
    println!("  {}", "-".repeat(80));
    for binding in registry.bindings() {
        let status = match platform_channels {
            Some(channels) if channels.iter().any(|c| c.id == binding.channel_id) => {
                "\x1b[32mok\x1b[0m     "
            }
            Some(_) => "\x1b[31mmissing\x1b[0m",
            None => "?      ",
        };
        println!(
            "  {:<22} {:<20} {} {}",
            binding.role.key(),
            binding.channel_id,
            status,
            binding.last_label
        );
    }
    println!();
}

/// Print a tick report as pretty JSON
pub fn print_report(report: &TickReport) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(report)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_command_is_none() {
        let cli = Cli::try_parse_from(["statbot"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.config, PathBuf::from("config"));
    }

    #[test]
    fn test_migrate_requires_from() {
        assert!(Cli::try_parse_from(["statbot", "migrate"]).is_err());

        let cli = Cli::try_parse_from(["statbot", "-c", "/etc/statbot", "migrate", "--from", "db"])
            .unwrap();
        assert_eq!(
            cli.command,
            Some(Commands::Migrate {
                from: PathBuf::from("db")
            })
        );
        assert_eq!(cli.config, PathBuf::from("/etc/statbot"));
    }
}
