//! `virt-viewer` - graphical console of a libvirt guest

use virt_viewer_cli::cli::VirtViewerArgs;
use virt_viewer_cli::commands::cmd_virt_viewer;
use virt_viewer_cli::util::parse_args;

fn main() {
    let args: VirtViewerArgs = parse_args();

    if let Err(e) = cmd_virt_viewer(args) {
        if e.needs_report() {
            eprintln!("Error: {e}");
        }
        std::process::exit(e.exit_code());
    }
}
