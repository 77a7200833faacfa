//! Graphics device extraction from domain XML
//!
//! Reference: <https://libvirt.org/formatdomain.html#graphical-framebuffers>

use std::path::PathBuf;

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::error::{DomainError, DomainResult};
use crate::models::SessionKind;

/// First usable `<graphics>` device of a domain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphicsInfo {
    /// Protocol
    pub kind: SessionKind,
    /// TCP port, `-1` while not yet allocated
    pub port: i32,
    /// SPICE TLS port
    pub tls_port: Option<i32>,
    /// Listen address
    pub listen: Option<String>,
    /// Unix socket the server listens on
    pub socket: Option<PathBuf>,
    /// Clear-text password (`--security-info` dumps only)
    pub password: Option<String>,
}

#[derive(Debug, Default)]
struct RawGraphics {
    graphics_type: String,
    port: Option<i32>,
    tls_port: Option<i32>,
    listen: Option<String>,
    socket: Option<PathBuf>,
    password: Option<String>,
}

fn attributes(e: &BytesStart<'_>) -> impl Iterator<Item = (String, String)> {
    e.attributes().flatten().map(|attr| {
        (
            String::from_utf8_lossy(attr.key.as_ref()).to_string(),
            String::from_utf8_lossy(&attr.value).to_string(),
        )
    })
}

fn graphics_attributes(e: &BytesStart<'_>) -> RawGraphics {
    let mut raw = RawGraphics::default();
    for (key, val) in attributes(e) {
        match key.as_str() {
            "type" => raw.graphics_type = val.to_ascii_lowercase(),
            "port" => raw.port = val.parse().ok(),
            "tlsPort" => raw.tls_port = val.parse().ok(),
            "listen" if !val.is_empty() => raw.listen = Some(val),
            "socket" if !val.is_empty() => raw.socket = Some(PathBuf::from(val)),
            "passwd" if !val.is_empty() => raw.password = Some(val),
            _ => {}
        }
    }
    raw
}

/// `<listen type='address' address=...>` or `<listen type='socket' socket=...>`
fn listen_element(e: &BytesStart<'_>, raw: &mut RawGraphics) {
    let mut listen_type = String::new();
    let mut address = None;
    let mut socket = None;
    for (key, val) in attributes(e) {
        match key.as_str() {
            "type" => listen_type = val,
            "address" if !val.is_empty() => address = Some(val),
            "socket" if !val.is_empty() => socket = Some(PathBuf::from(val)),
            _ => {}
        }
    }
    match listen_type.as_str() {
        "address" | "network" => {
            if raw.listen.is_none() {
                raw.listen = address;
            }
        }
        "socket" => {
            if raw.socket.is_none() {
                raw.socket = socket;
            }
        }
        _ => {}
    }
}

/// Extracts the first VNC or SPICE graphics device
///
/// Returns `Ok(None)` when the domain has no such device.
///
/// # Errors
///
/// Returns `InvalidXml` when the document is malformed.
pub fn parse_graphics(content: &str) -> DomainResult<Option<GraphicsInfo>> {
    let mut reader = Reader::from_str(content.trim_start_matches('\u{feff}'));
    reader.config_mut().trim_text(true);

    let mut found: Vec<RawGraphics> = Vec::new();
    let mut in_graphics = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.name().as_ref() {
                b"graphics" => {
                    found.push(graphics_attributes(&e));
                    in_graphics = true;
                }
                b"listen" if in_graphics => {
                    if let Some(raw) = found.last_mut() {
                        listen_element(&e, raw);
                    }
                }
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.name().as_ref() {
                b"graphics" => found.push(graphics_attributes(&e)),
                b"listen" if in_graphics => {
                    if let Some(raw) = found.last_mut() {
                        listen_element(&e, raw);
                    }
                }
                _ => {}
            },
            Ok(Event::End(e)) => {
                if e.name().as_ref() == b"graphics" {
                    in_graphics = false;
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(DomainError::InvalidXml(e.to_string())),
            _ => {}
        }
    }

    Ok(found.into_iter().find_map(|raw| {
        let kind = SessionKind::from_graphics_type(&raw.graphics_type)?;
        Some(GraphicsInfo {
            kind,
            port: raw.port.unwrap_or(-1),
            tls_port: raw.tls_port,
            listen: raw.listen,
            socket: raw.socket,
            password: raw.password,
        })
    }))
}
