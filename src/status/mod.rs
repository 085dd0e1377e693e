//! Derives device status from a probe outcome and appends the
//! corresponding status-change event, firing notifications on transition.

use std::sync::Arc;

use chrono::Utc;

use crate::adapters::ProbeResult;
use crate::error::Result;
use crate::notifications::Dispatcher;
use crate::storage::model::{Device, DeviceStatus, DeviceStatusEvent};
use crate::storage::StorageBackend;

pub struct StatusEngine {
    storage: Arc<dyn StorageBackend>,
    dispatcher: Arc<Dispatcher>,
}

impl StatusEngine {
    #[must_use]
    pub fn new(storage: Arc<dyn StorageBackend>, dispatcher: Arc<Dispatcher>) -> Self {
        Self { storage, dispatcher }
    }

    /// success + any of {model, uptime, version} present -> online;
    /// success otherwise -> unknown; failure -> offline. `warning` is
    /// never produced here; it's an API-driven value only (see `spec.md`
    /// §9's open question).
    #[must_use]
    pub fn derive_status(result: &ProbeResult) -> DeviceStatus {
        if !result.success {
            return DeviceStatus::Offline;
        }
        if result.model.is_some() || result.uptime_seconds.is_some() || result.version.is_some() {
            DeviceStatus::Online
        } else {
            DeviceStatus::Unknown
        }
    }

    /// Applies `derived` to `device` in place. If it differs from the
    /// stored status, appends a `DeviceStatusEvent` and fires
    /// notifications. Returns whether the status changed.
    pub async fn apply(&self, device: &mut Device, derived: DeviceStatus) -> Result<bool> {
        let previous = device.status;
        if previous == derived {
            return Ok(false);
        }

        device.status = derived;
        let now = Utc::now();
        self.storage
            .append_device_status_event(DeviceStatusEvent {
                id: format!("evt-{}-{}", device.id, now.timestamp_nanos_opt().unwrap_or_default()),
                device_id: device.id.clone(),
                previous_status: Some(previous),
                new_status: derived,
                created_at: now,
            })
            .await?;

        self.dispatcher.dispatch_status_change(device, previous, derived).await;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifications::transport::NullTransport;
    use crate::storage::memory::InMemoryStorage;
    use crate::storage::model::{DeviceData, DeviceType};

    fn device(status: DeviceStatus) -> Device {
        Device {
            id: "d1".into(),
            name: "r1".into(),
            device_type: DeviceType::MikrotikRouter,
            ip_address: Some("10.0.0.1".into()),
            status,
            credential_profile_id: None,
            custom_credentials: None,
            device_data: DeviceData::default(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn success_with_model_is_online() {
        let result = ProbeResult { success: true, model: Some("CCR2004".into()), ..Default::default() };
        assert_eq!(StatusEngine::derive_status(&result), DeviceStatus::Online);
    }

    #[test]
    fn success_with_no_identifying_fields_is_unknown() {
        let result = ProbeResult { success: true, ..Default::default() };
        assert_eq!(StatusEngine::derive_status(&result), DeviceStatus::Unknown);
    }

    #[test]
    fn failure_is_offline() {
        let result = ProbeResult::failure("timeout");
        assert_eq!(StatusEngine::derive_status(&result), DeviceStatus::Offline);
    }

    #[tokio::test]
    async fn no_event_appended_when_status_unchanged() {
        let storage = Arc::new(InMemoryStorage::new());
        let dispatcher = Arc::new(Dispatcher::new(storage.clone(), Arc::new(NullTransport)));
        let engine = StatusEngine::new(storage.clone(), dispatcher);
        let mut dev = device(DeviceStatus::Online);
        let changed = engine.apply(&mut dev, DeviceStatus::Online).await.unwrap();
        assert!(!changed);
        assert!(storage.get_latest_status_event("d1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn transition_appends_matching_event() {
        let storage = Arc::new(InMemoryStorage::new());
        let dispatcher = Arc::new(Dispatcher::new(storage.clone(), Arc::new(NullTransport)));
        let engine = StatusEngine::new(storage.clone(), dispatcher);
        let mut dev = device(DeviceStatus::Unknown);
        let changed = engine.apply(&mut dev, DeviceStatus::Online).await.unwrap();
        assert!(changed);
        let event = storage.get_latest_status_event("d1").await.unwrap().unwrap();
        assert_eq!(event.previous_status, Some(DeviceStatus::Unknown));
        assert_eq!(event.new_status, DeviceStatus::Online);
    }
}
