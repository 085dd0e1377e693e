//! Duty-roster-gated notification dispatch, a scenario distinct from the
//! global-mute and plain-dispatch cases already covered inline in
//! `notifications::tests`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use topology_monitor::notifications::transport::NotificationTransport;
use topology_monitor::storage::model::{
    Device, DeviceData, DeviceStatus, DeviceType, DutyScheduleEntry, DutyShift, HttpMethod, Notification,
    NotificationSubscription, UserNotificationChannel,
};
use topology_monitor::storage::StorageBackend;
use topology_monitor::{Dispatcher, InMemoryStorage};

#[derive(Default)]
struct CountingTransport(AtomicUsize);

#[async_trait]
impl NotificationTransport for CountingTransport {
    async fn send(&self, _method: HttpMethod, _url: &str, _body: &str) -> Result<u16, String> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Ok(200)
    }
}

fn device() -> Device {
    Device {
        id: "d1".into(),
        name: "switch1".into(),
        device_type: DeviceType::MikrotikSwitch,
        ip_address: Some("10.0.0.1".into()),
        status: DeviceStatus::Offline,
        credential_profile_id: None,
        custom_credentials: None,
        device_data: DeviceData::default(),
        updated_at: Utc::now(),
    }
}

async fn seed_notification(storage: &Arc<InMemoryStorage>) {
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
        .seed_subscription(NotificationSubscription { id: "s1".into(), device_id: "d1".into(), notification_id: "n1".into() })
        .await;
}

/// A non-empty duty schedule with a zero-width shift window (`start ==
/// end`) never matches any minute of day, so nobody is ever on duty. The
/// dispatcher must suppress delivery rather than fall back to "no
/// schedule configured means always reachable".
#[tokio::test]
async fn nobody_on_duty_suppresses_dispatch() {
    let storage = Arc::new(InMemoryStorage::new());
    seed_notification(&storage).await;
    storage
        .seed_duty_schedule_entry(DutyScheduleEntry { user_id: "alice".into(), shift: DutyShift::Day, start_minute: 0, end_minute: 0 })
        .await;
    storage.seed_user_channel(UserNotificationChannel { user_id: "alice".into(), enabled: true }).await;

    let transport = Arc::new(CountingTransport::default());
    let dispatcher = Dispatcher::new(storage.clone() as Arc<dyn StorageBackend>, transport.clone());
    dispatcher.dispatch_status_change(&device(), DeviceStatus::Unknown, DeviceStatus::Offline).await;

    assert_eq!(transport.0.load(Ordering::SeqCst), 0);
}

/// Same schedule shape but with a full-day window and the on-duty user's
/// channel enabled: dispatch proceeds normally.
#[tokio::test]
async fn on_duty_user_with_enabled_channel_receives_dispatch() {
    let storage = Arc::new(InMemoryStorage::new());
    seed_notification(&storage).await;
    storage
        .seed_duty_schedule_entry(DutyScheduleEntry { user_id: "alice".into(), shift: DutyShift::Day, start_minute: 0, end_minute: 24 * 60 })
        .await;
    storage.seed_user_channel(UserNotificationChannel { user_id: "alice".into(), enabled: true }).await;

    let transport = Arc::new(CountingTransport::default());
    let dispatcher = Dispatcher::new(storage.clone() as Arc<dyn StorageBackend>, transport.clone());
    dispatcher.dispatch_status_change(&device(), DeviceStatus::Unknown, DeviceStatus::Offline).await;

    assert_eq!(transport.0.load(Ordering::SeqCst), 1);
}

/// The on-duty user's channel is disabled and nobody else is scheduled:
/// dispatch is suppressed even though a shift technically covers now.
#[tokio::test]
async fn on_duty_user_with_disabled_channel_suppresses_dispatch() {
    let storage = Arc::new(InMemoryStorage::new());
    seed_notification(&storage).await;
    storage
        .seed_duty_schedule_entry(DutyScheduleEntry { user_id: "alice".into(), shift: DutyShift::Day, start_minute: 0, end_minute: 24 * 60 })
        .await;
    storage.seed_user_channel(UserNotificationChannel { user_id: "alice".into(), enabled: false }).await;

    let transport = Arc::new(CountingTransport::default());
    let dispatcher = Dispatcher::new(storage.clone() as Arc<dyn StorageBackend>, transport.clone());
    dispatcher.dispatch_status_change(&device(), DeviceStatus::Unknown, DeviceStatus::Offline).await;

    assert_eq!(transport.0.load(Ordering::SeqCst), 0);
}
