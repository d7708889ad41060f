//! Shared fixtures for integration tests

#![allow(dead_code)]

use attrbridge_core::{DirectoryEntry, Properties};
use attrbridge_resolver::testing::{InMemoryBackend, InMemoryDirectory};
use attrbridge_resolver::AttributeService;
use std::sync::Arc;

pub const PEOPLE: &str = "ou=people,dc=corp";
pub const SERVER: &str = "SERV1_";
pub const HANDLER: &str = "Z_AOR";

/// Property set builder
#[derive(Default)]
pub struct PropertiesBuilder {
    props: Properties,
}

impl PropertiesBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, key: &str, value: &str) -> Self {
        self.props.insert(key.to_string(), value.to_string());
        self
    }

    /// A complete domain profile pulling `pulls`
    pub fn domain(self, name: &str, pulls: &str) -> Self {
        self.set(&format!("{name}_host"), "dc.corp")
            .set(&format!("{name}_port"), "389")
            .set(&format!("{name}_authentication"), "none")
            .set(&format!("{name}_user_search_base"), PEOPLE)
            .set(&format!("{name}_user_filter"), "objectClass=person")
            .set(&format!("{name}_user_key_attributes"), "cs:uid,ci:employeeNumber")
            .set(&format!("{name}_user_attributes_to_pull"), pulls)
    }

    /// Backend profile calling `handler` and pulling `pulls`
    pub fn backend(self, handler: &str, pulls: &str) -> Self {
        self.set("sap_server_prefix", SERVER)
            .set("sap_handler", handler)
            .set("aor_attributes_to_pull", pulls)
    }

    pub fn build(self) -> Properties {
        self.props
    }
}

pub fn person(uid: &str, number: &str) -> DirectoryEntry {
    DirectoryEntry::new(format!("uid={uid},{PEOPLE}"))
        .with_attribute("uid", uid)
        .with_attribute("employeeNumber", number)
}

/// Install a test subscriber honouring `RUST_LOG`; later calls are no-ops
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

pub struct Harness {
    pub service: AttributeService,
    pub directory: Arc<InMemoryDirectory>,
    pub backend: Arc<InMemoryBackend>,
}

pub fn harness(props: Properties, directory: InMemoryDirectory, backend: InMemoryBackend) -> Harness {
    init_tracing();
    let directory = Arc::new(directory);
    let backend = Arc::new(backend);
    let service = AttributeService::builder(props)
        .directory_client(directory.clone())
        .backend_client(backend.clone())
        .build()
        .expect("clients are set");

    Harness {
        service,
        directory,
        backend,
    }
}
