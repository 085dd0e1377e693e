//! Status-change notification dispatch: mute check, duty-roster fan-out,
//! template rendering, delivery.

pub mod mute;
pub mod roster;
pub mod template;
pub mod transport;

use std::sync::Arc;

use chrono::Utc;

use crate::storage::model::{Device, DeviceStatus, DeviceType, HttpMethod};
use crate::storage::StorageBackend;
use transport::NotificationTransport;

pub struct Dispatcher {
    storage: Arc<dyn StorageBackend>,
    transport: Arc<dyn NotificationTransport>,
}

impl Dispatcher {
    #[must_use]
    pub fn new(storage: Arc<dyn StorageBackend>, transport: Arc<dyn NotificationTransport>) -> Self {
        Self { storage, transport }
    }

    /// Fires every notification subscribed to `device` for its status
    /// transition, unless a global mute is active or every on-duty user's
    /// channel for this device is muted/disabled. Delivery failures are
    /// logged and otherwise swallowed — a notification backend outage must
    /// never stall the polling scheduler.
    pub async fn dispatch_status_change(&self, device: &Device, previous: DeviceStatus, new: DeviceStatus) {
        let now = Utc::now();

        let mutes = match self.storage.get_active_mutes().await {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!(error = %e, "failed to load alarm mutes, skipping notification dispatch");
                return;
            }
        };
        if mute::is_globally_muted(&mutes, now) {
            tracing::debug!(device_id = %device.id, "notification suppressed, globally muted");
            return;
        }

        if !self.any_on_duty_user_reachable(&mutes, now).await {
            tracing::debug!(device_id = %device.id, "notification suppressed, no reachable on-duty user");
            return;
        }

        let subscriptions = match self.storage.get_subscriptions_for_device(&device.id).await {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(device_id = %device.id, error = %e, "failed to load notification subscriptions");
                return;
            }
        };
        if subscriptions.is_empty() {
            return;
        }

        let all_notifications = match self.storage.get_all_notifications().await {
            Ok(n) => n,
            Err(e) => {
                tracing::warn!(error = %e, "failed to load notifications");
                return;
            }
        };

        let address = device.ip_address.as_deref().unwrap_or("");
        let identity = device.device_data.identity.as_deref().unwrap_or("");
        let new_label = status_label(new);
        let context = [
            ("[Device.Name]", device.name.as_str()),
            ("[Device.Address]", address),
            ("[Device.Identity]", identity),
            ("[Device.Type]", device_type_label(device.device_type)),
            ("[Status.Old]", status_label(previous)),
            ("[Status.New]", new_label),
            ("[Service.Status]", new_label),
        ];

        for sub in subscriptions {
            let Some(notification) = all_notifications.iter().find(|n| n.id == sub.notification_id) else {
                continue;
            };
            if !notification.enabled {
                continue;
            }
            self.send(notification, &context).await;
        }
    }

    async fn any_on_duty_user_reachable(&self, mutes: &[crate::storage::model::AlarmMute], now: chrono::DateTime<Utc>) -> bool {
        let schedule = match self.storage.get_duty_schedule().await {
            Ok(s) => s,
            Err(_) => return true,
        };
        if schedule.is_empty() {
            return true;
        }
        let on_duty = roster::on_duty_users(&schedule, roster::minute_of_day(now));
        if on_duty.is_empty() {
            return false;
        }
        let channels = self.storage.get_user_channels().await.unwrap_or_default();
        on_duty.iter().any(|user_id| {
            let enabled = channels.iter().any(|c| c.user_id == *user_id && c.enabled);
            enabled && !mute::is_user_muted(mutes, user_id, now)
        })
    }

    async fn send(&self, notification: &crate::storage::model::Notification, context: &[(&str, &str)]) {
        let body = template::render_template(&notification.message_template, context);
        let url = if notification.method == HttpMethod::Get {
            let mut rendered_url = notification.url.clone();
            for (token, value) in context {
                rendered_url = rendered_url.replace(token, &template::percent_encode(value));
            }
            rendered_url
        } else {
            notification.url.clone()
        };

        match self.transport.send(notification.method, &url, &body).await {
            Ok(status) if (200..300).contains(&status) => {}
            Ok(status) => {
                tracing::warn!(notification_id = %notification.id, status, "notification endpoint returned non-2xx");
            }
            Err(e) => {
                tracing::warn!(notification_id = %notification.id, error = %e, "notification delivery failed");
            }
        }
    }
}

fn status_label(status: DeviceStatus) -> &'static str {
    match status {
        DeviceStatus::Online => "online",
        DeviceStatus::Warning => "warning",
        DeviceStatus::Offline => "offline",
        DeviceStatus::Unknown => "unknown",
    }
}

fn device_type_label(device_type: DeviceType) -> &'static str {
    match device_type {
        DeviceType::MikrotikRouter => "mikrotik_router",
        DeviceType::MikrotikSwitch => "mikrotik_switch",
        DeviceType::GenericSnmp => "generic_snmp",
        DeviceType::GenericPing => "generic_ping",
        DeviceType::Server => "server",
        DeviceType::AccessPoint => "access_point",
        DeviceType::Proxmox => "proxmox",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::InMemoryStorage;
    use crate::storage::model::{Notification, NotificationSubscription};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingTransport {
        calls: Mutex<Vec<(String, String)>>,
        count: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl NotificationTransport for RecordingTransport {
        async fn send(&self, _method: HttpMethod, url: &str, body: &str) -> Result<u16, String> {
            self.count.fetch_add(1, Ordering::SeqCst);
            self.calls.lock().unwrap().push((url.to_string(), body.to_string()));
            Ok(200)
        }
    }

    fn device() -> Device {
        Device {
            id: "d1".into(),
            name: "router1".into(),
            device_type: crate::storage::model::DeviceType::MikrotikRouter,
            ip_address: Some("10.0.0.1".into()),
            status: DeviceStatus::Offline,
            credential_profile_id: None,
            custom_credentials: None,
            device_data: crate::storage::model::DeviceData::default(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn dispatches_to_enabled_subscribed_notification() {
        let storage = Arc::new(InMemoryStorage::new());
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

        let transport = Arc::new(RecordingTransport::default());
        let dispatcher = Dispatcher::new(storage.clone(), transport.clone());
        dispatcher.dispatch_status_change(&device(), DeviceStatus::Unknown, DeviceStatus::Offline).await;

        assert_eq!(transport.count.load(Ordering::SeqCst), 1);
        let calls = transport.calls.lock().unwrap();
        assert_eq!(calls[0].1, "router1 is offline");
    }

    #[tokio::test]
    async fn template_renders_all_seven_tokens() {
        let storage = Arc::new(InMemoryStorage::new());
        storage
            .seed_notification(Notification {
                id: "n1".into(),
                enabled: true,
                url: "https://hooks.example/notify".into(),
                method: HttpMethod::Post,
                message_template: "[Device.Name]/[Device.Address]/[Device.Identity]/[Device.Type]: \
                    [Status.Old] -> [Status.New] ([Service.Status])"
                    .into(),
            })
            .await;
        storage
            .seed_subscription(NotificationSubscription { id: "s1".into(), device_id: "d1".into(), notification_id: "n1".into() })
            .await;

        let mut d = device();
        d.device_data.identity = Some("RB5009".into());
        let transport = Arc::new(RecordingTransport::default());
        let dispatcher = Dispatcher::new(storage.clone(), transport.clone());
        dispatcher.dispatch_status_change(&d, DeviceStatus::Online, DeviceStatus::Offline).await;

        let calls = transport.calls.lock().unwrap();
        assert_eq!(calls[0].1, "router1/10.0.0.1/RB5009/mikrotik_router: online -> offline (offline)");
    }

    #[tokio::test]
    async fn global_mute_suppresses_dispatch() {
        let storage = Arc::new(InMemoryStorage::new());
        storage
            .seed_notification(Notification {
                id: "n1".into(),
                enabled: true,
                url: "https://hooks.example/notify".into(),
                method: HttpMethod::Post,
                message_template: "x".into(),
            })
            .await;
        storage
            .seed_subscription(NotificationSubscription { id: "s1".into(), device_id: "d1".into(), notification_id: "n1".into() })
            .await;
        storage
            .seed_alarm_mute(crate::storage::model::AlarmMute { id: "m1".into(), user_id: None, expires_at: None, indefinite: true })
            .await;

        let transport = Arc::new(RecordingTransport::default());
        let dispatcher = Dispatcher::new(storage.clone(), transport.clone());
        dispatcher.dispatch_status_change(&device(), DeviceStatus::Unknown, DeviceStatus::Offline).await;

        assert_eq!(transport.count.load(Ordering::SeqCst), 0);
    }
}
