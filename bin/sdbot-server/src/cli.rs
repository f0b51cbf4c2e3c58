//! Command-line interface.

use clap::{Args, Parser, Subcommand};
use sdbot_topology::Ipv4Cidr;

#[derive(Debug, Parser)]
#[command(name = "sdbot-server", version, about = "Discord relay for the image-generation runtime")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Serve the webhook endpoints. The default.
    Serve,
    /// Replace the bot's global slash commands with `/ai`.
    RegisterCommands,
    /// Print the NAT network layout for the compute subnet as JSON.
    Topology(TopologyArgs),
}

#[derive(Debug, Args)]
pub struct TopologyArgs {
    #[arg(long, default_value = "sdbot")]
    pub name: String,

    #[arg(long, default_value = "10.0.0.0/16")]
    pub vpc_cidr: Ipv4Cidr,

    #[arg(long, default_value = "us-east-1a")]
    pub availability_zone: String,

    #[arg(long, default_value_t = 1)]
    pub isolated_subnets: u32,

    /// Fetch the EC2 Instance Connect range for this region from the
    /// published AWS IP ranges instead of using the us-east-1 default.
    #[arg(long, env = "AWS_REGION")]
    pub region: Option<String>,

    /// Print only the NAT instance's first-boot user data.
    #[arg(long)]
    pub user_data: bool,
}
