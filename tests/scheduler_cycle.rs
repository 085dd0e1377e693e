//! End-to-end scheduler cycles against `InMemoryStorage`, exercising the
//! full probe -> status -> history -> notification pipeline without a
//! real device on the other end where possible.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use secrecy::SecretString;

use topology_monitor::config::Config;
use topology_monitor::credentials::{DeviceCredentials, MikrotikCredentials, PrometheusCredentials};
use topology_monitor::notifications::transport::NotificationTransport;
use topology_monitor::storage::model::{
    Device, DeviceData, DeviceStatus, DeviceType, HttpMethod, Notification, NotificationSubscription,
};
use topology_monitor::storage::StorageBackend;
use topology_monitor::{InMemoryStorage, Scheduler};

#[derive(Default)]
struct RecordingTransport {
    count: AtomicUsize,
    bodies: Mutex<Vec<String>>,
}

#[async_trait]
impl NotificationTransport for RecordingTransport {
    async fn send(&self, _method: HttpMethod, _url: &str, body: &str) -> Result<u16, String> {
        self.count.fetch_add(1, Ordering::SeqCst);
        self.bodies.lock().unwrap().push(body.to_string());
        Ok(200)
    }
}

fn device(id: &str, device_type: DeviceType, ip: &str, creds: Option<DeviceCredentials>) -> Device {
    Device {
        id: id.into(),
        name: id.into(),
        device_type,
        ip_address: Some(ip.into()),
        status: DeviceStatus::Unknown,
        credential_profile_id: None,
        custom_credentials: creds,
        device_data: DeviceData::default(),
        updated_at: Utc::now(),
    }
}

/// A Mikrotik device pointed at a closed loopback port fails its TCP
/// connect immediately (no real router required), driving the device to
/// `offline` and firing the subscribed notification.
#[tokio::test]
async fn unreachable_mikrotik_device_goes_offline_and_notifies() {
    let creds = DeviceCredentials::Mikrotik(MikrotikCredentials {
        username: "admin".into(),
        password: SecretString::from("x".to_string()),
        port: Some(1),
    });
    let storage = Arc::new(InMemoryStorage::new());
    storage
        .upsert_device(device("r1", DeviceType::MikrotikRouter, "127.0.0.1", Some(creds)))
        .await
        .unwrap();
    storage
        .seed_notification(Notification {
            id: "n1".into(),
            enabled: true,
            url: "https://hooks.example/notify".into(),
            method: HttpMethod::Post,
            message_template: "[Device.Name] is [Status.New]".into(),
        })
        .await;
    storage
        .seed_subscription(NotificationSubscription { id: "s1".into(), device_id: "r1".into(), notification_id: "n1".into() })
        .await;

    let transport = Arc::new(RecordingTransport::default());
    let mut config = Config::default();
    config.probe_deadline_ms = 2_000;
    let scheduler = Scheduler::new(storage.clone() as Arc<dyn StorageBackend>, transport.clone(), config);

    let report = scheduler.run_cycle().await;
    assert_eq!(report.total, 1);
    assert_eq!(report.error, 1);

    let updated = storage.get_device("r1").await.unwrap().unwrap();
    assert_eq!(updated.status, DeviceStatus::Offline);
    assert_eq!(transport.count.load(Ordering::SeqCst), 1);
    assert_eq!(transport.bodies.lock().unwrap()[0], "r1 is offline");
}

/// A `server` device carrying Prometheus credentials resolves to the
/// Prometheus adapter (not SNMP) purely from its credentials, scrapes a
/// local node_exporter-style endpoint, and lands derived CPU usage plus a
/// history row.
#[tokio::test]
async fn server_device_with_prometheus_credentials_scrapes_and_records_history() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        if let Ok((mut socket, _)) = listener.accept().await {
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).await;
            let body = "# HELP node_cpu_seconds_total seconds\n\
# TYPE node_cpu_seconds_total counter\n\
node_cpu_seconds_total{cpu=\"0\",mode=\"idle\"} 80\n\
node_cpu_seconds_total{cpu=\"0\",mode=\"user\"} 20\n\
node_cpu_seconds_total{cpu=\"1\",mode=\"idle\"} 60\n\
node_cpu_seconds_total{cpu=\"1\",mode=\"user\"} 40\n";
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
        }
    });

    let creds = DeviceCredentials::Prometheus(PrometheusCredentials {
        bearer_token: None,
        basic_auth: None,
        scrape_path: Some("/metrics".into()),
        scheme: Some("http".into()),
        port: Some(addr.port()),
    });

    let storage = Arc::new(InMemoryStorage::new());
    storage
        .upsert_device(device("srv1", DeviceType::Server, "127.0.0.1", Some(creds)))
        .await
        .unwrap();

    let scheduler = Scheduler::new(
        storage.clone() as Arc<dyn StorageBackend>,
        Arc::new(topology_monitor::notifications::transport::NullTransport),
        Config::default(),
    );
    let report = scheduler.run_cycle().await;
    assert_eq!(report.success, 1, "scrape should succeed against the local mock server");

    let updated = storage.get_device("srv1").await.unwrap().unwrap();
    assert_eq!(updated.status, DeviceStatus::Online);
    let cpu = updated.device_data.cpu_usage_pct.expect("cpu usage should be derived");
    assert!((cpu - 30.0).abs() < 0.5, "expected ~30% average cpu busy, got {cpu}");

    let dropped = storage
        .prune_history_older_than("device_metrics", Utc::now() + chrono::Duration::hours(1))
        .await
        .unwrap();
    assert_eq!(dropped, 1, "one device metric row should have been recorded");
}

/// Ping-category devices are explicitly not serviced by the scheduler's
/// per-device worker pool; they're covered by the independent batch
/// pinger instead.
#[tokio::test]
async fn ping_device_type_is_not_probed_by_scheduler() {
    let storage = Arc::new(InMemoryStorage::new());
    storage
        .upsert_device(device("ping1", DeviceType::GenericPing, "127.0.0.1", None))
        .await
        .unwrap();

    let scheduler = Scheduler::new(
        storage.clone() as Arc<dyn StorageBackend>,
        Arc::new(topology_monitor::notifications::transport::NullTransport),
        Config::default(),
    );
    let report = scheduler.run_cycle().await;
    assert_eq!(report.total, 0, "generic_ping devices must never enter the per-device worker pool");
    assert_eq!(report.error, 0);

    let updated = storage.get_device("ping1").await.unwrap().unwrap();
    assert_eq!(updated.status, DeviceStatus::Unknown, "status should be untouched since no probe ran");
}
