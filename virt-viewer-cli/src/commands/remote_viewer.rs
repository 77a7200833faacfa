//! remote-viewer: console of a display URI, `.vv` file or oVirt VM.

use std::path::Path;

use chrono::Utc;
use virt_viewer_core::app::{App, UriSource};
use virt_viewer_core::config::ConfigManager;
use virt_viewer_core::models::ConnectionSpec;
use virt_viewer_core::ovirt::resolve_target;
use virt_viewer_core::recent::{RecentConnections, VV_FILE_MIME};
use virt_viewer_core::session::BackendRegistry;
use virt_viewer_core::transport::TransportOpener;
use virt_viewer_core::uri::{DisplayUri, parse_display_uri};
use virt_viewer_core::vv_file::VvFile;

use crate::cli::RemoteViewerArgs;
use crate::error::CliError;
use crate::runner;
use crate::terminal::{TerminalCollector, TerminalNotifier, read_line};
use crate::util::{app_config, init_logging, load_settings, runtime};

/// MIME types offered in the recent-connections list
pub const RECENT_MIME_TYPES: &[&str] = &[
    "application/x-spice",
    "application/x-vnc",
    VV_FILE_MIME,
];

/// Connection target after reading the file or asking the engine
#[derive(Debug)]
struct Resolved {
    spec: ConnectionSpec,
    guest_name: Option<String>,
    title: Option<String>,
    fullscreen: bool,
    mime_type: &'static str,
}

/// Whether `uri` names a `.vv` connection file rather than a display URI
#[must_use]
pub fn is_vv_file(uri: &str) -> bool {
    if uri.contains("://") {
        return false;
    }
    let path = Path::new(uri);
    path.extension().is_some_and(|ext| ext == "vv") || path.is_file()
}

/// Picks the address from a prompt answer
///
/// A number selects the recent entry with that position (1-based); any
/// other text is taken as typed.
fn choose_uri(answer: &str, recent: &[&str]) -> Option<String> {
    let answer = answer.trim();
    if answer.is_empty() {
        return None;
    }
    if let Ok(n) = answer.parse::<usize>()
        && let Some(uri) = n.checked_sub(1).and_then(|i| recent.get(i))
    {
        return Some((*uri).to_string());
    }
    Some(answer.to_string())
}

fn load_recent(manager: Option<&ConfigManager>) -> Option<RecentConnections> {
    let manager = manager?;
    match RecentConnections::load(manager.recent_path()) {
        Ok(recent) => Some(recent),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to load recent connections");
            None
        }
    }
}

fn prompt_uri(manager: Option<&ConfigManager>) -> Result<String, CliError> {
    let recent = load_recent(manager);
    let uris: Vec<&str> = recent
        .iter()
        .flat_map(|r| r.filtered(RECENT_MIME_TYPES))
        .map(|e| e.uri.as_str())
        .collect();

    if !uris.is_empty() {
        eprintln!("Recent connections:");
        for (i, uri) in uris.iter().enumerate() {
            eprintln!("  {}. {uri}", i + 1);
        }
    }
    read_line("Connection address: ")
        .and_then(|answer| choose_uri(&answer, &uris))
        .ok_or_else(|| CliError::Usage("No connection address given".to_string()))
}

fn resolve(uri: &str, runtime: &tokio::runtime::Runtime) -> Result<Resolved, CliError> {
    if is_vv_file(uri) {
        let file = VvFile::load(Path::new(uri))?;
        return Ok(Resolved {
            spec: file.connection_spec()?,
            guest_name: None,
            title: file.title.clone(),
            fullscreen: file.fullscreen.unwrap_or(false),
            mime_type: VV_FILE_MIME,
        });
    }

    match parse_display_uri(uri)? {
        DisplayUri::Direct(spec) => Ok(Resolved {
            mime_type: spec.kind.mime_type(),
            spec,
            guest_name: None,
            title: None,
            fullscreen: false,
        }),
        DisplayUri::Ovirt(target) => {
            tracing::info!(host = %target.host, vm = %target.vm_name, "Resolving oVirt VM");
            let (spec, vm_name) =
                runtime.block_on(resolve_target(&target, &mut TerminalCollector))?;
            Ok(Resolved {
                mime_type: spec.kind.mime_type(),
                spec,
                guest_name: Some(vm_name),
                title: None,
                fullscreen: false,
            })
        }
    }
}

fn remember(manager: Option<&ConfigManager>, uri: &str, mime_type: &str) {
    let Some(mut recent) = load_recent(manager) else {
        return;
    };
    recent.add(uri, mime_type, Utc::now());
    if let Err(e) = recent.save() {
        tracing::warn!(error = %e, "Failed to save recent connections");
    }
}

/// remote-viewer handler
pub fn cmd_remote_viewer(args: RemoteViewerArgs) -> Result<(), CliError> {
    if args.spice_controller {
        return Err(CliError::Unavailable(
            "SPICE controller support is not available".to_string(),
        ));
    }

    let (manager, settings) = load_settings()?;
    init_logging(&args.common, &settings);
    let runtime = runtime()?;

    let uri = match args.uri {
        Some(ref uri) => uri.clone(),
        None => prompt_uri(manager.as_ref())?,
    };
    let resolved = resolve(&uri, &runtime)?;

    let mut config = app_config("remote-viewer", &args.common, &settings);
    config.title = args.title.clone().or(resolved.title);
    config.fullscreen |= resolved.fullscreen;

    let mut source = UriSource::new(resolved.spec);
    if let Some(name) = resolved.guest_name {
        source = source.with_guest_name(name);
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

    runner::start(&mut app)?;
    remember(manager.as_ref(), &uri, resolved.mime_type);
    runner::drive(&runtime, &mut app);
    Ok(())
}
