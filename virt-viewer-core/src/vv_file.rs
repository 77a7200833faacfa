//! `.vv` connection files
//!
//! Management portals hand out short-lived INI files describing one console
//! connection. Only the `[virt-viewer]` group is read; unknown keys are
//! ignored.
//!
//! ```text
//! [virt-viewer]
//! type=spice
//! host=10.0.0.5
//! port=5900
//! tls-port=5901
//! password=ticket
//! delete-this-file=1
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use secrecy::SecretString;

use crate::error::VvFileError;
use crate::models::{ConnectionSpec, SessionKind};

const GROUP: &str = "virt-viewer";

/// Parsed `[virt-viewer]` group
#[derive(Debug, Clone)]
pub struct VvFile {
    /// Display protocol
    pub kind: SessionKind,
    /// Display server host
    pub host: Option<String>,
    /// Plain port
    pub port: Option<u16>,
    /// TLS port (SPICE)
    pub tls_port: Option<u16>,
    /// Password or ticket
    pub password: Option<SecretString>,
    /// Window title
    pub title: Option<String>,
    /// Start fullscreen
    pub fullscreen: Option<bool>,
    /// Remove the file once read
    pub delete_this_file: bool,
    /// CA certificate, PEM text
    pub ca: Option<String>,
    /// Expected certificate subject
    pub host_subject: Option<String>,
    /// HTTP proxy for the SPICE connection
    pub proxy: Option<String>,
    /// Allow USB redirection
    pub enable_usbredir: Option<bool>,
    /// Allow smartcard passthrough
    pub enable_smartcard: Option<bool>,
    /// Key combination replacing Ctrl+Alt+Del
    pub secure_attention: Option<String>,
}

/// Splits key-file text into groups of key/value pairs
fn parse_groups(content: &str) -> HashMap<String, HashMap<String, String>> {
    let mut groups: HashMap<String, HashMap<String, String>> = HashMap::new();
    let mut current: Option<String> = None;

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if line.starts_with('[') && line.ends_with(']') {
            let name = line[1..line.len() - 1].trim().to_string();
            groups.entry(name.clone()).or_default();
            current = Some(name);
            continue;
        }
        if let Some((key, value)) = line.split_once('=')
            && let Some(ref group) = current
        {
            groups
                .entry(group.clone())
                .or_default()
                .insert(key.trim().to_string(), unescape(value.trim()));
        }
    }
    groups
}

/// Expands key-file escapes (`\n`, `\t`, `\\`, ...)
fn unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('s') => out.push(' '),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

fn parse_bool(key: &'static str, value: &str) -> Result<bool, VvFileError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" => Ok(true),
        "0" | "false" => Ok(false),
        _ => Err(VvFileError::InvalidValue {
            key,
            value: value.to_string(),
        }),
    }
}

fn parse_port(key: &'static str, value: &str) -> Result<u16, VvFileError> {
    value.parse().map_err(|_| VvFileError::InvalidValue {
        key,
        value: value.to_string(),
    })
}

impl VvFile {
    /// Parses file contents
    ///
    /// # Errors
    ///
    /// Returns an error if the group or the `type` key is missing, or a
    /// value cannot be parsed.
    pub fn parse(content: &str) -> Result<Self, VvFileError> {
        let mut groups = parse_groups(content);
        let mut group = groups.remove(GROUP).ok_or(VvFileError::MissingGroup)?;
        let mut take = |key: &str| group.remove(key).filter(|v| !v.is_empty());

        let type_value = take("type").ok_or(VvFileError::MissingKey("type"))?;
        let kind = SessionKind::from_graphics_type(&type_value).ok_or_else(|| {
            VvFileError::InvalidValue {
                key: "type",
                value: type_value.clone(),
            }
        })?;

        let port = take("port").map(|v| parse_port("port", &v)).transpose()?;
        let tls_port = take("tls-port")
            .map(|v| parse_port("tls-port", &v))
            .transpose()?;
        let fullscreen = take("fullscreen")
            .map(|v| parse_bool("fullscreen", &v))
            .transpose()?;
        let delete_this_file = take("delete-this-file")
            .map(|v| parse_bool("delete-this-file", &v))
            .transpose()?
            .unwrap_or(false);
        let enable_usbredir = take("enable-usbredir")
            .map(|v| parse_bool("enable-usbredir", &v))
            .transpose()?;
        let enable_smartcard = take("enable-smartcard")
            .map(|v| parse_bool("enable-smartcard", &v))
            .transpose()?;

        Ok(Self {
            kind,
            host: take("host"),
            port,
            tls_port,
            password: take("password").map(SecretString::from),
            title: take("title"),
            fullscreen,
            delete_this_file,
            ca: take("ca"),
            host_subject: take("host-subject"),
            proxy: take("proxy"),
            enable_usbredir,
            enable_smartcard,
            secure_attention: take("secure-attention"),
        })
    }

    /// Reads and parses a file, deleting it when it asks for that
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, VvFileError> {
        let content = fs::read_to_string(path).map_err(|source| VvFileError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let file = Self::parse(&content)?;
        if file.delete_this_file {
            match fs::remove_file(path) {
                Ok(()) => tracing::debug!(path = %path.display(), "Deleted connection file"),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to delete connection file");
                }
            }
        }
        Ok(file)
    }

    /// Connection parameters described by the file
    ///
    /// A SPICE file with only a TLS port becomes a `spice://` URI carrying
    /// the `tls-port` query parameter.
    ///
    /// # Errors
    ///
    /// Returns `MissingKey` when the host or every port is missing.
    pub fn connection_spec(&self) -> Result<ConnectionSpec, VvFileError> {
        let host = self.host.clone().ok_or(VvFileError::MissingKey("host"))?;
        let mut spec = match (self.kind, self.port, self.tls_port) {
            (_, Some(port), _) => ConnectionSpec::with_host(self.kind, host, port),
            (SessionKind::Spice, None, Some(tls_port)) => {
                let host = if host.contains(':') {
                    format!("[{host}]")
                } else {
                    host
                };
                ConnectionSpec::with_uri(
                    SessionKind::Spice,
                    format!("spice://{host}?tls-port={tls_port}"),
                )
            }
            _ => return Err(VvFileError::MissingKey("port")),
        };
        spec.tls_port = self.tls_port;
        spec.password.clone_from(&self.password);
        spec.ca.clone_from(&self.ca);
        spec.host_subject.clone_from(&self.host_subject);
        Ok(spec)
    }
}
