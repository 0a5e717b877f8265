//! Privileged operations requested over the restricted bus object.

use log::{debug, warn};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::api::models::{ObjectHandle, UnlockRequest};
use crate::core::aggregator::{ConnectivitySource, SharedState, read_state};

/// Capacity of the unlock request broadcast channel.
const UNLOCK_CAPACITY: usize = 16;

/// Forwards mutation requests to the connectivity source.
///
/// Setters return once the source has accepted the request. Failures are
/// logged here and reported by the source as `ReportError`; they are never
/// returned to the bus caller.
pub struct ControlFacade {
    source: Arc<dyn ConnectivitySource>,
    state: SharedState,
    unlock: broadcast::Sender<UnlockRequest>,
}

impl ControlFacade {
    pub fn new(source: Arc<dyn ConnectivitySource>, state: SharedState) -> Self {
        let (unlock, _) = broadcast::channel(UNLOCK_CAPACITY);
        Self {
            source,
            state,
            unlock,
        }
    }

    pub async fn set_flight_mode(&self, enabled: bool) {
        debug!("Request: flight mode {enabled}");
        if let Err(e) = self.source.set_flight_mode(enabled).await {
            warn!("Failed to set flight mode to {enabled}: {e}");
        }
    }

    pub async fn set_wifi_enabled(&self, enabled: bool) {
        debug!("Request: wifi enabled {enabled}");
        if let Err(e) = self.source.set_wifi_enabled(enabled).await {
            warn!("Failed to set wifi enabled to {enabled}: {e}");
        }
    }

    pub async fn set_hotspot_enabled(&self, enabled: bool) {
        debug!("Request: hotspot enabled {enabled}");
        if let Err(e) = self.source.set_hotspot_enabled(enabled).await {
            warn!("Failed to set hotspot enabled to {enabled}: {e}");
        }
    }

    pub async fn set_hotspot_ssid(&self, ssid: Vec<u8>) {
        debug!("Request: hotspot ssid {}", String::from_utf8_lossy(&ssid));
        if let Err(e) = self.source.set_hotspot_ssid(ssid).await {
            warn!("Failed to set hotspot ssid: {e}");
        }
    }

    pub async fn set_hotspot_password(&self, password: String) {
        // Never log the password itself.
        debug!("Request: hotspot password change");
        if let Err(e) = self.source.set_hotspot_password(password).await {
            warn!("Failed to set hotspot password: {e}");
        }
    }

    pub async fn set_hotspot_mode(&self, mode: String) {
        debug!("Request: hotspot mode {mode}");
        if let Err(e) = self.source.set_hotspot_mode(mode).await {
            warn!("Failed to set hotspot mode: {e}");
        }
    }

    /// Asks the unlock handler to unlock one modem.
    pub fn unlock_modem(&self, modem: ObjectHandle) {
        debug!("Request: unlock modem {modem}");
        self.send_unlock(UnlockRequest::Modem(modem));
    }

    /// Asks the unlock handler to unlock every locked modem.
    pub fn unlock_all_modems(&self) {
        debug!("Request: unlock all modems");
        self.send_unlock(UnlockRequest::AllModems);
    }

    fn send_unlock(&self, request: UnlockRequest) {
        if self.unlock.send(request).is_err() {
            debug!("No unlock handler is listening");
        }
    }

    pub fn unlock_requests(&self) -> broadcast::Receiver<UnlockRequest> {
        self.unlock.subscribe()
    }

    /// Current hotspot password. Only exposed on the restricted object.
    pub fn hotspot_password(&self) -> String {
        read_state(&self.state).hotspot.password.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Result;
    use crate::api::models::ConnectivityError;
    use crate::core::aggregator::{SourceEvent, SourceState};
    use async_trait::async_trait;
    use futures::stream::{self, BoxStream};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSource {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ConnectivitySource for RecordingSource {
        async fn snapshot(&self) -> Result<SourceState> {
            Ok(SourceState::default())
        }

        async fn events(&self) -> Result<BoxStream<'static, SourceEvent>> {
            Ok(Box::pin(stream::empty()))
        }

        async fn set_flight_mode(&self, enabled: bool) -> Result<()> {
            self.calls.lock().unwrap().push(format!("flight {enabled}"));
            Ok(())
        }

        async fn set_wifi_enabled(&self, enabled: bool) -> Result<()> {
            self.calls.lock().unwrap().push(format!("wifi {enabled}"));
            Ok(())
        }

        async fn set_hotspot_enabled(&self, enabled: bool) -> Result<()> {
            self.calls.lock().unwrap().push(format!("hotspot {enabled}"));
            Ok(())
        }

        async fn set_hotspot_ssid(&self, ssid: Vec<u8>) -> Result<()> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("ssid {}", String::from_utf8_lossy(&ssid)));
            Ok(())
        }

        async fn set_hotspot_password(&self, password: String) -> Result<()> {
            self.calls.lock().unwrap().push(format!("password {password}"));
            Ok(())
        }

        async fn set_hotspot_mode(&self, mode: String) -> Result<()> {
            Err(ConnectivityError::InvalidHotspotSettings(format!(
                "unsupported mode {mode}"
            )))
        }
    }

    fn facade() -> (Arc<RecordingSource>, SharedState, ControlFacade) {
        let source = Arc::new(RecordingSource::default());
        let state = SharedState::default();
        let facade = ControlFacade::new(source.clone(), state.clone());
        (source, state, facade)
    }

    #[tokio::test]
    async fn setters_forward_to_source() {
        let (source, _, facade) = facade();

        facade.set_flight_mode(true).await;
        facade.set_wifi_enabled(false).await;
        facade.set_hotspot_enabled(true).await;
        facade.set_hotspot_ssid(b"MyNet".to_vec()).await;
        facade.set_hotspot_password("hunter2hunter2".into()).await;

        assert_eq!(
            *source.calls.lock().unwrap(),
            vec![
                "flight true",
                "wifi false",
                "hotspot true",
                "ssid MyNet",
                "password hunter2hunter2",
            ]
        );
    }

    #[tokio::test]
    async fn source_errors_are_swallowed() {
        let (_, _, facade) = facade();
        // Returns normally even though the source rejects the mode.
        facade.set_hotspot_mode("mesh".into()).await;
    }

    #[tokio::test]
    async fn unlock_requests_are_broadcast() {
        let (_, _, facade) = facade();
        let mut requests = facade.unlock_requests();

        let modem = ObjectHandle::try_from("/ril_0").unwrap();
        facade.unlock_modem(modem.clone());
        facade.unlock_all_modems();

        assert_eq!(requests.recv().await.unwrap(), UnlockRequest::Modem(modem));
        assert_eq!(requests.recv().await.unwrap(), UnlockRequest::AllModems);
    }

    #[test]
    fn unlock_without_listener_is_fire_and_forget() {
        let (_, _, facade) = facade();
        facade.unlock_all_modems();
    }

    #[test]
    fn hotspot_password_reads_shared_state() {
        let (_, state, facade) = facade();
        state.write().unwrap().hotspot.password = "abcdefgh".into();
        assert_eq!(facade.hotspot_password(), "abcdefgh");
    }
}
