use std::sync::Arc;
use std::time::Duration;

use dicom_retriever::{
    IndexRegistry, RecordCache, RedbCache, Retriever, ScuConnector, SharedEndpoint,
    StoreScpFactory,
};
use dimse::{DimseConfig, DimseScu, RemoteNode};

fn dcmtk_available() -> bool {
    for bin in ["storescp", "echoscu"] {
        if std::process::Command::new(bin)
            .arg("--version")
            .output()
            .is_err()
        {
            eprintln!("Skipping DCMTK test: {} not found", bin);
            return false;
        }
    }
    true
}

#[tokio::test]
async fn shared_store_scp_answers_echo_while_leased() {
    if !dcmtk_available() {
        return;
    }

    // Pick a free local port by binding to port 0 first
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind ephem port");
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let temp_dir = tempfile::tempdir().unwrap();
    let config = DimseConfig {
        local_aet: "RETRIEVER_SCU".into(),
        port,
        storage_dir: temp_dir.path().join("incoming"),
        ..DimseConfig::default()
    };

    let shared = SharedEndpoint::new(StoreScpFactory::new(config.clone()));
    let lease = shared.acquire(|_| {}).await.expect("start storescp");

    // Wait for port to be ready
    for _ in 0..60 {
        if tokio::net::TcpStream::connect(("127.0.0.1", port)).await.is_ok() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    let scu_config = DimseConfig {
        local_aet: "ECHO_SCU".into(),
        ..config
    };
    let connector = ScuConnector::new(
        DimseScu::new(scu_config),
        RemoteNode::new("RETRIEVER_SCU", "127.0.0.1", port),
    );
    let store = RedbCache::open(temp_dir.path().join("cache.redb")).unwrap();
    let cache = RecordCache::new(Arc::new(store), Arc::new(IndexRegistry::new().unwrap()));
    let retriever = Retriever::new(connector, cache, 0);

    retriever.echo().await.expect("C-ECHO against storescp");

    lease.release().await.unwrap();
    assert!(!shared.is_running().await);
}
