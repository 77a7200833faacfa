//! Property-based tests for connection targets: display URIs, management
//! URIs, guest keys, `.vv` files and SSH tunnel commands

use std::path::Path;

use proptest::prelude::*;
use uuid::Uuid;
use virt_viewer_core::domain::DomainKey;
use virt_viewer_core::error::UriError;
use virt_viewer_core::transport::ssh_tunnel_args;
use virt_viewer_core::{
    DisplayUri, LibvirtUri, SessionKind, SshRelay, VvFile, parse_display_uri,
};

// ============================================================================
// Strategies
// ============================================================================

fn arb_hostname() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-z][a-z0-9-]{0,15}(\\.[a-z][a-z0-9]{0,8}){0,2}",
        (1u8..=254, 0u8..=255, 0u8..=255, 1u8..=254)
            .prop_map(|(a, b, c, d)| format!("{a}.{b}.{c}.{d}")),
    ]
}

fn arb_port() -> impl Strategy<Value = u16> {
    1u16..65535
}

fn arb_user() -> impl Strategy<Value = Option<String>> {
    prop::option::of("[a-z][a-z0-9_]{0,10}")
}

fn arb_domain_name() -> impl Strategy<Value = String> {
    "[a-zA-Z][a-zA-Z0-9_.-]{0,20}"
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// vnc:// URIs connect directly to the named host and port
    #[test]
    fn prop_vnc_uri_host_and_port(host in arb_hostname(), port in arb_port()) {
        let parsed = parse_display_uri(&format!("vnc://{host}:{port}")).unwrap();
        let DisplayUri::Direct(spec) = parsed else {
            return Err(TestCaseError::fail("expected a direct target"));
        };
        prop_assert_eq!(spec.kind, SessionKind::Vnc);
        prop_assert_eq!(spec.host.as_deref(), Some(host.as_str()));
        prop_assert_eq!(spec.port, Some(port));
        prop_assert_eq!(spec.pretty_address(), format!("{host}:{port}"));
    }

    /// spice:// URIs are handed to the protocol library unchanged
    #[test]
    fn prop_spice_uri_verbatim(host in arb_hostname(), port in arb_port(), tls in prop::option::of(arb_port())) {
        let uri = match tls {
            Some(tls) => format!("spice://{host}:{port}?tls-port={tls}"),
            None => format!("spice://{host}:{port}"),
        };
        let DisplayUri::Direct(spec) = parse_display_uri(&uri).unwrap() else {
            return Err(TestCaseError::fail("expected a direct target"));
        };
        prop_assert_eq!(spec.kind, SessionKind::Spice);
        prop_assert_eq!(spec.uri.as_deref(), Some(uri.as_str()));
    }

    /// Schemes other than the display protocols are refused
    #[test]
    fn prop_unknown_scheme_rejected(scheme in "(ftp|http|rdp|ssh|telnet)", host in arb_hostname()) {
        let result = parse_display_uri(&format!("{scheme}://{host}/"));
        prop_assert!(
            matches!(result, Err(UriError::UnsupportedScheme(ref s)) if *s == scheme),
            "unexpected result {:?}", result
        );
    }

    /// An ssh management URI yields a relay with the same host, port and user
    #[test]
    fn prop_ssh_management_uri_relay(host in arb_hostname(), port in prop::option::of(arb_port()), user in arb_user()) {
        let mut uri = "qemu+ssh://".to_string();
        if let Some(ref user) = user {
            uri.push_str(user);
            uri.push('@');
        }
        uri.push_str(&host);
        if let Some(port) = port {
            uri.push_str(&format!(":{port}"));
        }
        uri.push_str("/system");

        let parsed = LibvirtUri::parse(&uri).unwrap();
        prop_assert_eq!(parsed.driver.as_str(), "qemu");
        let relay = parsed.ssh_relay().unwrap();
        prop_assert_eq!(relay.host, host);
        prop_assert_eq!(relay.port, port);
        prop_assert_eq!(relay.user, user);
    }

    /// Numbers name running guests by id, UUIDs by UUID, the rest by name
    #[test]
    fn prop_domain_key_parse(id in any::<u32>(), raw_uuid in any::<u128>(), name in arb_domain_name()) {
        prop_assert_eq!(DomainKey::parse(&id.to_string()), DomainKey::Id(id));

        let uuid = Uuid::from_u128(raw_uuid);
        prop_assert_eq!(DomainKey::parse(&uuid.to_string()), DomainKey::Uuid(uuid));

        prop_assert_eq!(DomainKey::parse(&name), DomainKey::Name(name.clone()));
    }

    /// The tunnel command is `[-p port] [-l user] host nc <target>`
    #[test]
    fn prop_ssh_tunnel_args_shape(
        relay_host in arb_hostname(),
        ssh_port in prop::option::of(arb_port()),
        user in arb_user(),
        display_port in prop::option::of(arb_port()),
    ) {
        let mut relay = SshRelay::new(relay_host.clone());
        relay.port = ssh_port;
        relay.user = user.clone();
        let socket = Path::new("/run/libvirt/qemu/vm.sock");

        let args = ssh_tunnel_args(&relay, Some("localhost"), display_port, Some(socket)).unwrap();
        let options = 2 * usize::from(ssh_port.is_some()) + 2 * usize::from(user.is_some());
        prop_assert_eq!(args.len(), options + 4);
        prop_assert_eq!(&args[options], &relay_host);
        prop_assert_eq!(args[options + 1].as_str(), "nc");

        match display_port {
            Some(port) => {
                prop_assert_eq!(args[options + 2].as_str(), "localhost");
                prop_assert_eq!(args[options + 3].clone(), port.to_string());
            }
            None => {
                prop_assert_eq!(args[options + 2].as_str(), "-U");
                prop_assert_eq!(args[options + 3].as_str(), "/run/libvirt/qemu/vm.sock");
            }
        }
        if let Some(user) = user {
            let at = args.iter().position(|a| a == "-l").unwrap();
            prop_assert_eq!(&args[at + 1], &user);
        }
    }

    /// `.vv` files connect to their host and port whatever else they carry
    #[test]
    fn prop_vv_file_target(
        vnc in any::<bool>(),
        host in arb_hostname(),
        port in arb_port(),
        extra in prop::collection::vec(("[a-z][a-z-]{2,12}", "[A-Za-z0-9 ]{0,12}"), 0..5),
    ) {
        let mut content = format!(
            "[virt-viewer]\ntype={}\nhost={host}\nport={port}\n",
            if vnc { "vnc" } else { "spice" }
        );
        for (key, value) in &extra {
            if matches!(key.as_str(), "type" | "host" | "port" | "tls-port" | "fullscreen"
                | "delete-this-file" | "enable-usbredir" | "enable-smartcard")
            {
                continue;
            }
            content.push_str(&format!("{key}={value}\n"));
        }

        let file = VvFile::parse(&content).unwrap();
        let spec = file.connection_spec().unwrap();
        prop_assert_eq!(spec.kind, if vnc { SessionKind::Vnc } else { SessionKind::Spice });
        prop_assert_eq!(spec.pretty_address(), format!("{host}:{port}"));
        prop_assert!(!file.delete_this_file);
    }
}
