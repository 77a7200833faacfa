//! virt-viewer: console of a libvirt guest.

use virt_viewer_core::app::App;
use virt_viewer_core::domain::{DomainKey, DomainSource, LibvirtResolver};
use virt_viewer_core::session::BackendRegistry;
use virt_viewer_core::transport::TransportOpener;

use crate::cli::VirtViewerArgs;
use crate::error::CliError;
use crate::runner;
use crate::terminal::{TerminalCollector, TerminalNotifier};
use crate::util::{app_config, init_logging, load_settings, runtime};

/// virt-viewer handler
pub fn cmd_virt_viewer(args: VirtViewerArgs) -> Result<(), CliError> {
    let (_, settings) = load_settings()?;
    init_logging(&args.common, &settings);

    let mut config = app_config("virt-viewer", &args.common, &settings);
    config.reconnect = args.reconnect;

    let key = DomainKey::parse(&args.domain);
    tracing::debug!(%key, uri = ?args.connect, "Looking up guest domain");
    let resolver = LibvirtResolver::new(args.connect.clone());
    let mut source = DomainSource::new(resolver, key)
        .with_wait(args.wait)
        .with_direct(args.direct)
        .with_attach(args.attach);
    if (args.wait || args.reconnect) && !source.start_events() {
        tracing::info!("Lifecycle events unavailable, polling instead");
    }

    let opener = TransportOpener::new().with_ssh_program(&settings.ssh.program);
    let mut app = App::new(
        config,
        BackendRegistry::builtin(),
        Box::new(source),
        Box::new(TerminalNotifier::default()),
        Box::new(TerminalCollector),
    )
    .with_opener(opener);

    let runtime = runtime()?;
    runner::start(&mut app)?;
    runner::drive(&runtime, &mut app);
    Ok(())
}
