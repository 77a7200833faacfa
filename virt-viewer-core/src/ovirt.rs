//! oVirt REST collaborator
//!
//! `ovirt://[user@]engine[:port]/VMNAME` is resolved by searching the VM
//! collection, reading its display descriptor and acquiring a one-time
//! ticket that becomes the display password.

use quick_xml::Reader;
use quick_xml::events::Event;
use secrecy::{ExposeSecret, SecretString};

use crate::credentials::{CredentialCollector, CredentialRequest};
use crate::error::OvirtError;
use crate::models::{ConnectionSpec, SessionKind};

/// Result type for oVirt operations
pub type OvirtResult<T> = std::result::Result<T, OvirtError>;

/// Ticket lifetime requested from the engine, in seconds
pub const TICKET_EXPIRY_SECS: u32 = 120;

/// Parsed `ovirt://` URI
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OvirtTarget {
    /// Engine host
    pub host: String,
    /// Engine HTTPS port
    pub port: Option<u16>,
    /// Login user, asked for when missing
    pub user: Option<String>,
    /// VM name
    pub vm_name: String,
}

impl OvirtTarget {
    /// Root of the REST API
    #[must_use]
    pub fn base_url(&self) -> String {
        match self.port {
            Some(port) => format!("https://{}:{port}/ovirt-engine/api", self.host),
            None => format!("https://{}/ovirt-engine/api", self.host),
        }
    }

    fn ca_url(&self) -> String {
        let root = self.base_url();
        let root = root.trim_end_matches("/api");
        format!("{root}/services/pki-resource?resource=ca-certificate&format=X509-PEM-CA")
    }
}

/// Display descriptor of a VM
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OvirtDisplay {
    /// `spice` or `vnc`
    pub kind: String,
    /// Display host
    pub address: Option<String>,
    /// Plain port
    pub port: Option<u16>,
    /// TLS port
    pub secure_port: Option<u16>,
    /// Expected certificate subject
    pub host_subject: Option<String>,
}

/// VM entry of the collection
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OvirtVm {
    /// Engine id
    pub id: String,
    /// VM name
    pub name: String,
    /// Display, absent while the VM is down
    pub display: Option<OvirtDisplay>,
}

impl OvirtVm {
    /// Connection parameters for this VM's display with `ticket` as password
    ///
    /// # Errors
    ///
    /// Returns `NoDisplay` when the VM has no usable display.
    pub fn connection_spec(&self, ticket: SecretString) -> OvirtResult<ConnectionSpec> {
        let no_display = || OvirtError::NoDisplay(self.name.clone());
        let display = self.display.as_ref().ok_or_else(no_display)?;
        let kind = SessionKind::from_graphics_type(&display.kind).ok_or_else(no_display)?;
        let address = display.address.clone().ok_or_else(no_display)?;

        let mut spec = match (display.port, display.secure_port) {
            (Some(port), _) => ConnectionSpec::with_host(kind, address, port),
            (None, Some(tls_port)) if kind == SessionKind::Spice => {
                ConnectionSpec::with_uri(kind, format!("spice://{address}?tls-port={tls_port}"))
            }
            _ => return Err(no_display()),
        };
        spec.tls_port = display.secure_port;
        spec.host_subject.clone_from(&display.host_subject);
        spec.password = Some(ticket);
        Ok(spec)
    }
}

fn path_ends_with(depth: &[String], tail: &[&str]) -> bool {
    depth.len() >= tail.len()
        && depth[depth.len() - tail.len()..]
            .iter()
            .zip(tail)
            .all(|(a, b)| a == b)
}

/// Parses a `<vms>` collection
///
/// # Errors
///
/// Returns `Parse` on malformed XML.
pub fn parse_vms(content: &str) -> OvirtResult<Vec<OvirtVm>> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    let mut vms: Vec<OvirtVm> = Vec::new();
    let mut depth: Vec<String> = Vec::new();
    let mut text_buf = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let tag = String::from_utf8_lossy(e.name().as_ref()).to_string();
                if tag == "vm" {
                    let id = e
                        .attributes()
                        .flatten()
                        .find(|a| a.key.as_ref() == b"id")
                        .map(|a| String::from_utf8_lossy(&a.value).to_string())
                        .unwrap_or_default();
                    vms.push(OvirtVm {
                        id,
                        ..OvirtVm::default()
                    });
                }
                if tag == "display"
                    && depth.last().is_some_and(|d| d == "vm")
                    && let Some(vm) = vms.last_mut()
                {
                    vm.display = Some(OvirtDisplay::default());
                }
                depth.push(tag);
                text_buf.clear();
            }
            Ok(Event::Text(e)) => {
                text_buf = String::from_utf8_lossy(&e).trim().to_string();
            }
            Ok(Event::End(_)) => {
                let Some(vm) = vms.last_mut() else {
                    depth.pop();
                    continue;
                };
                if path_ends_with(&depth, &["vm", "name"]) {
                    vm.name.clone_from(&text_buf);
                } else if let Some(display) = vm.display.as_mut() {
                    if path_ends_with(&depth, &["vm", "display", "type"]) {
                        display.kind = text_buf.to_ascii_lowercase();
                    } else if path_ends_with(&depth, &["vm", "display", "address"]) {
                        display.address = Some(text_buf.clone());
                    } else if path_ends_with(&depth, &["vm", "display", "port"]) {
                        display.port = text_buf.parse().ok();
                    } else if path_ends_with(&depth, &["vm", "display", "secure_port"]) {
                        display.secure_port = text_buf.parse().ok();
                    } else if path_ends_with(&depth, &["display", "certificate", "subject"]) {
                        display.host_subject = Some(text_buf.clone());
                    }
                }
                depth.pop();
                text_buf.clear();
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(OvirtError::Parse(e.to_string())),
            _ => {}
        }
    }
    Ok(vms)
}

/// Extracts the ticket value from a `<action>` response
///
/// # Errors
///
/// Returns `Parse` when the XML is malformed or has no ticket value.
pub fn parse_ticket(content: &str) -> OvirtResult<SecretString> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);
    let mut depth: Vec<String> = Vec::new();
    let mut value = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                depth.push(String::from_utf8_lossy(e.name().as_ref()).to_string());
            }
            Ok(Event::Text(e)) => {
                if path_ends_with(&depth, &["ticket", "value"]) {
                    value = Some(String::from_utf8_lossy(&e).trim().to_string());
                }
            }
            Ok(Event::End(_)) => {
                depth.pop();
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(OvirtError::Parse(e.to_string())),
            _ => {}
        }
    }
    value
        .filter(|v| !v.is_empty())
        .map(SecretString::from)
        .ok_or_else(|| OvirtError::Parse("no ticket in response".to_string()))
}

/// Authenticated REST client
#[derive(Debug, Clone)]
pub struct OvirtClient {
    target: OvirtTarget,
    username: String,
    password: SecretString,
    http: reqwest::Client,
}

impl OvirtClient {
    /// Builds a client for `target`
    ///
    /// # Errors
    ///
    /// Returns `Http` if the HTTP client cannot be built.
    pub fn new(
        target: OvirtTarget,
        username: impl Into<String>,
        password: SecretString,
    ) -> OvirtResult<Self> {
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()?;
        Ok(Self {
            target,
            username: username.into(),
            password,
            http,
        })
    }

    async fn check(response: reqwest::Response) -> OvirtResult<String> {
        let status = response.status();
        let body = response.text().await?;
        if status.is_success() {
            Ok(body)
        } else {
            Err(OvirtError::Status {
                status: status.as_u16(),
                body: body.chars().take(200).collect(),
            })
        }
    }

    /// Looks the target VM up by name
    ///
    /// # Errors
    ///
    /// Returns `VmNotFound` when no VM has that name, or the HTTP/parse
    /// error.
    pub async fn find_vm(&self) -> OvirtResult<OvirtVm> {
        let url = format!("{}/vms", self.target.base_url());
        tracing::debug!(%url, vm = %self.target.vm_name, "Searching oVirt VM");
        let response = self
            .http
            .get(&url)
            .query(&[("search", format!("name={}", self.target.vm_name))])
            .basic_auth(&self.username, Some(self.password.expose_secret()))
            .header("Accept", "application/xml")
            .send()
            .await?;
        let body = Self::check(response).await?;
        parse_vms(&body)?
            .into_iter()
            .find(|vm| vm.name == self.target.vm_name)
            .ok_or_else(|| OvirtError::VmNotFound(self.target.vm_name.clone()))
    }

    /// Acquires a display ticket for `vm`
    ///
    /// # Errors
    ///
    /// Returns the HTTP or parse error.
    pub async fn acquire_ticket(&self, vm: &OvirtVm) -> OvirtResult<SecretString> {
        let url = format!("{}/vms/{}/ticket", self.target.base_url(), vm.id);
        let body = format!(
            "<action><ticket><expiry>{TICKET_EXPIRY_SECS}</expiry></ticket></action>"
        );
        let response = self
            .http
            .post(&url)
            .basic_auth(&self.username, Some(self.password.expose_secret()))
            .header("Content-Type", "application/xml")
            .header("Accept", "application/xml")
            .body(body)
            .send()
            .await?;
        parse_ticket(&Self::check(response).await?)
    }

    /// Downloads the engine CA certificate (PEM)
    ///
    /// # Errors
    ///
    /// Returns the HTTP error.
    pub async fn fetch_ca(&self) -> OvirtResult<String> {
        let response = self.http.get(self.target.ca_url()).send().await?;
        Self::check(response).await
    }

    /// Full resolution: VM, ticket and CA
    ///
    /// A CA download failure is logged and the connection proceeds without
    /// it.
    ///
    /// # Errors
    ///
    /// Returns the lookup or ticket error.
    pub async fn resolve(&self) -> OvirtResult<(ConnectionSpec, String)> {
        let vm = self.find_vm().await?;
        let ticket = self.acquire_ticket(&vm).await?;
        let mut spec = vm.connection_spec(ticket)?;
        if spec.kind == SessionKind::Spice {
            match self.fetch_ca().await {
                Ok(ca) => spec.ca = Some(ca),
                Err(e) => tracing::warn!(error = %e, "Cannot fetch oVirt CA certificate"),
            }
        }
        tracing::info!(vm = %vm.name, address = %spec.pretty_address(), "Resolved oVirt display");
        Ok((spec, vm.name))
    }
}

/// Prompts for engine credentials and resolves the target
///
/// Returns the connection parameters and the VM name.
///
/// # Errors
///
/// Returns `Cancelled` if the prompt is dismissed, or the resolution error.
pub async fn resolve_target(
    target: &OvirtTarget,
    collector: &mut dyn CredentialCollector,
) -> OvirtResult<(ConnectionSpec, String)> {
    let request = if target.user.is_some() {
        CredentialRequest::password("oVirt", Some(target.host.clone()))
    } else {
        CredentialRequest::username_password("oVirt", Some(target.host.clone()))
    };
    let creds = collector
        .collect(&request)
        .map_err(|_| OvirtError::Cancelled)?;
    let username = creds
        .username
        .or_else(|| target.user.clone())
        .unwrap_or_default();
    let password = creds
        .password
        .unwrap_or_else(|| SecretString::from(String::new()));
    OvirtClient::new(target.clone(), username, password)?
        .resolve()
        .await
}
