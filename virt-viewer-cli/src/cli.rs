//! CLI argument parsing types using `clap`.

use clap::{Args, Parser};

/// Options shared by both front-ends
#[derive(Args, Debug, Clone, Default)]
pub struct CommonArgs {
    /// Display verbose information
    #[arg(short, long)]
    pub verbose: bool,

    /// Display debugging information
    #[arg(long)]
    pub debug: bool,

    /// Open in full screen mode (adjusts guest resolution to fit the client)
    #[arg(short = 'f', long = "full-screen")]
    pub full_screen: bool,

    /// Zoom level of window, in percentage
    #[arg(short, long, value_name = "ZOOM", value_parser = clap::value_parser!(u32).range(10..=200))]
    pub zoom: Option<u32>,
}

/// Virtual machine graphical console
#[derive(Parser, Debug)]
#[command(name = "virt-viewer")]
#[command(author, version, about = "Virtual machine graphical console")]
pub struct VirtViewerArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Connect to hypervisor
    #[arg(short = 'c', long = "connect", value_name = "URI", env = "LIBVIRT_DEFAULT_URI")]
    pub connect: Option<String>,

    /// Wait for domain to start
    #[arg(short, long)]
    pub wait: bool,

    /// Reconnect to domain upon restart
    #[arg(short, long)]
    pub reconnect: bool,

    /// Direct connection with no automatic tunnels
    #[arg(short, long)]
    pub direct: bool,

    /// Attach to the local display using libvirt
    #[arg(short, long)]
    pub attach: bool,

    /// Domain name, ID or UUID
    #[arg(value_name = "DOMAIN-NAME|ID|UUID")]
    pub domain: String,
}

/// Remote viewer client
#[derive(Parser, Debug)]
#[command(name = "remote-viewer")]
#[command(author, version, about = "Remote viewer client")]
pub struct RemoteViewerArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Set window title
    #[arg(short, long, value_name = "TITLE")]
    pub title: Option<String>,

    /// Open connection using Spice controller communication
    #[arg(long, conflicts_with = "uri")]
    pub spice_controller: bool,

    /// Display URI or `.vv` connection file
    #[arg(value_name = "URI")]
    pub uri: Option<String>,
}
