//! Camera acquisition API and capability probe.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::oneshot;

use super::constraints::MediaConstraints;
use super::stream::MediaStream;
use super::types::{MediaError, MediaErrorKind};

/// Called with the stream when a legacy request succeeds.
pub type SuccessCallback = Box<dyn FnOnce(MediaStream) + Send>;
/// Called with the failure when a legacy request fails.
pub type ErrorCallback = Box<dyn FnOnce(MediaError) + Send>;

/// A platform's camera acquisition API.
///
/// Platforms expose an awaitable entry point, an older callback-based one,
/// both, or neither. [`AcquisitionApi::probe`] picks one up front.
#[async_trait]
pub trait MediaDevices: Send + Sync {
    /// User agent used to classify the device.
    fn user_agent(&self) -> String;

    /// Whether [`MediaDevices::get_user_media`] is available.
    fn has_get_user_media(&self) -> bool;

    /// Whether [`MediaDevices::legacy_get_user_media`] is available.
    fn has_legacy_get_user_media(&self) -> bool {
        false
    }

    /// Request a stream.
    async fn get_user_media(
        &self,
        constraints: &MediaConstraints,
    ) -> Result<MediaStream, MediaError>;

    /// Request a stream through the callback entry point.
    fn legacy_get_user_media(
        &self,
        _constraints: &MediaConstraints,
        _on_success: SuccessCallback,
        on_error: ErrorCallback,
    ) {
        on_error(MediaError::new(
            MediaErrorKind::NotSupported,
            "legacy getUserMedia is not available",
        ));
    }
}

/// Which acquisition entry point a session uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquisitionApi {
    Standard,
    LegacyPrefixed,
    Unsupported,
}

impl AcquisitionApi {
    /// Pick the best entry point the platform offers.
    pub fn probe(devices: &dyn MediaDevices) -> Self {
        if devices.has_get_user_media() {
            AcquisitionApi::Standard
        } else if devices.has_legacy_get_user_media() {
            AcquisitionApi::LegacyPrefixed
        } else {
            AcquisitionApi::Unsupported
        }
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, AcquisitionApi::Unsupported)
    }

    /// Request a stream through this entry point.
    pub async fn acquire(
        &self,
        devices: &dyn MediaDevices,
        constraints: &MediaConstraints,
    ) -> Result<MediaStream, MediaError> {
        match self {
            AcquisitionApi::Standard => devices.get_user_media(constraints).await,
            AcquisitionApi::LegacyPrefixed => legacy_acquire(devices, constraints).await,
            AcquisitionApi::Unsupported => Err(MediaError::new(
                MediaErrorKind::NotSupported,
                "getUserMedia is not available",
            )),
        }
    }
}

/// Bridge the success/error callback pair into a single future.
async fn legacy_acquire(
    devices: &dyn MediaDevices,
    constraints: &MediaConstraints,
) -> Result<MediaStream, MediaError> {
    let (tx, rx) = oneshot::channel();
    let tx = Arc::new(Mutex::new(Some(tx)));
    let error_tx = Arc::clone(&tx);

    devices.legacy_get_user_media(
        constraints,
        Box::new(move |stream| {
            if let Some(tx) = tx.lock().unwrap_or_else(PoisonError::into_inner).take() {
                let _ = tx.send(Ok(stream));
            }
        }),
        Box::new(move |err| {
            if let Some(tx) = error_tx
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take()
            {
                let _ = tx.send(Err(err));
            }
        }),
    );

    rx.await.unwrap_or_else(|_| {
        Err(MediaError::new(
            MediaErrorKind::Abort,
            "acquisition callbacks were dropped without being called",
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceClass;
    use crate::media::stream::TrackSettings;
    use crate::media::types::Resolution;

    struct Probe {
        standard: bool,
        legacy: bool,
    }

    #[async_trait]
    impl MediaDevices for Probe {
        fn user_agent(&self) -> String {
            "probe".to_string()
        }

        fn has_get_user_media(&self) -> bool {
            self.standard
        }

        fn has_legacy_get_user_media(&self) -> bool {
            self.legacy
        }

        async fn get_user_media(
            &self,
            _constraints: &MediaConstraints,
        ) -> Result<MediaStream, MediaError> {
            Err(MediaError::new(MediaErrorKind::NotFound, "standard"))
        }

        fn legacy_get_user_media(
            &self,
            constraints: &MediaConstraints,
            on_success: SuccessCallback,
            _on_error: ErrorCallback,
        ) {
            let settings = TrackSettings {
                resolution: constraints.video.resolution(),
                frame_rate: 30,
            };
            let (_tx, stream) = MediaStream::channel("legacy", settings, 1);
            on_success(stream);
        }
    }

    #[test]
    fn test_probe_prefers_standard() {
        let both = Probe {
            standard: true,
            legacy: true,
        };
        assert_eq!(AcquisitionApi::probe(&both), AcquisitionApi::Standard);
    }

    #[test]
    fn test_probe_falls_back_to_legacy() {
        let legacy = Probe {
            standard: false,
            legacy: true,
        };
        assert_eq!(AcquisitionApi::probe(&legacy), AcquisitionApi::LegacyPrefixed);
    }

    #[test]
    fn test_probe_unsupported() {
        let none = Probe {
            standard: false,
            legacy: false,
        };
        let api = AcquisitionApi::probe(&none);
        assert_eq!(api, AcquisitionApi::Unsupported);
        assert!(!api.is_supported());
    }

    #[tokio::test]
    async fn test_legacy_callbacks_bridge_to_future() {
        let legacy = Probe {
            standard: false,
            legacy: true,
        };
        let constraints = MediaConstraints::for_device(DeviceClass::Mobile);
        let stream = AcquisitionApi::LegacyPrefixed
            .acquire(&legacy, &constraints)
            .await
            .expect("legacy stream");
        assert_eq!(stream.label(), "legacy");
        assert_eq!(stream.settings().resolution, Resolution::MOBILE);
    }

    #[tokio::test]
    async fn test_unsupported_acquire_errors() {
        let none = Probe {
            standard: false,
            legacy: false,
        };
        let constraints = MediaConstraints::for_device(DeviceClass::Desktop);
        let err = AcquisitionApi::Unsupported
            .acquire(&none, &constraints)
            .await
            .unwrap_err();
        assert_eq!(err.kind, MediaErrorKind::NotSupported);
    }
}
