//! `remote-viewer` - graphical console of a display URI or `.vv` file

use virt_viewer_cli::cli::RemoteViewerArgs;
use virt_viewer_cli::commands::cmd_remote_viewer;
use virt_viewer_cli::util::parse_args;

fn main() {
    let args: RemoteViewerArgs = parse_args();

    if let Err(e) = cmd_remote_viewer(args) {
        if e.needs_report() {
            eprintln!("Error: {e}");
        }
        std::process::exit(e.exit_code());
    }
}
