//! Shared fixtures for tests that need a live controller

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::{tempdir, TempDir};
use tokio::net::TcpListener;

use crate::config::GatewaySettings;
use crate::controller::GatewayController;
use crate::gateway::{MemoryConfigStore, ProviderSelection};
use crate::supervisor::testing::FakeSupervisor;

pub(crate) struct TestGateway {
    pub controller: Arc<GatewayController>,
    pub supervisor: Arc<FakeSupervisor>,
    pub store: Arc<MemoryConfigStore>,
    pub token: Option<String>,
    dir: TempDir,
    _control: Option<TcpListener>,
}

impl TestGateway {
    /// Gateway home holding the secrets file and gateway config file
    pub fn home(&self) -> &Path {
        self.dir.path()
    }
}

pub(crate) fn test_settings(home: &Path, port: u16, control_port: u16) -> GatewaySettings {
    GatewaySettings {
        home_dir: home.to_path_buf(),
        workspace_dir: home.join("workspace"),
        port,
        control_port,
        start_timeout: Duration::from_secs(2),
        poll_interval: Duration::from_millis(10),
        ..GatewaySettings::default()
    }
}

pub(crate) fn openai_selection() -> ProviderSelection {
    ProviderSelection::new("openai").with_key("sk-validlengthkey1234")
}

/// A loopback port nothing listens on
pub(crate) async fn dead_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

/// Controller over the given fakes, in `Stopped`
pub(crate) fn gateway_with(
    port: u16,
    control_port: u16,
    supervisor: FakeSupervisor,
    store: MemoryConfigStore,
) -> TestGateway {
    let dir = tempdir().unwrap();
    let supervisor = Arc::new(supervisor);
    let store = Arc::new(store);
    let controller = Arc::new(GatewayController::new(
        test_settings(dir.path(), port, control_port),
        store.clone(),
        supervisor.clone(),
    ));
    TestGateway {
        controller,
        supervisor,
        store,
        token: None,
        dir,
        _control: None,
    }
}

/// Controller in `Stopped`
pub(crate) fn stopped_gateway(port: u16, control_port: u16) -> TestGateway {
    gateway_with(
        port,
        control_port,
        FakeSupervisor::new(),
        MemoryConfigStore::new(),
    )
}

/// Controller in `Stopped` whose control port accepts TCP
pub(crate) async fn listening_gateway(port: u16) -> TestGateway {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let mut gw = stopped_gateway(port, listener.local_addr().unwrap().port());
    gw._control = Some(listener);
    gw
}

/// Controller in `Running`; something must accept TCP on `control_port`
pub(crate) async fn running_gateway(port: u16, control_port: u16) -> TestGateway {
    let mut gw = stopped_gateway(port, control_port);
    start(&mut gw).await;
    gw
}

/// Controller in `Running` with a control listener of its own
pub(crate) async fn serving_gateway(port: u16) -> TestGateway {
    let mut gw = listening_gateway(port).await;
    start(&mut gw).await;
    gw
}

async fn start(gw: &mut TestGateway) {
    let outcome = gw
        .controller
        .start_with_config(openai_selection())
        .await
        .unwrap();
    gw.token = Some(outcome.token);
}
