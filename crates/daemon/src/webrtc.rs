//! WebRTC streaming stub.
//!
//! Browser playback goes through the segmented HLS stream today. A WebRTC
//! path would need a gateway (Janus, mediasoup, or a Pion-style stack) in
//! front of the cameras; the surface is reserved here so the API layer can
//! report the capability as unsupported instead of unknown.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WebRtcError {
    #[error("WebRTC streaming is not implemented")]
    Unsupported,
}

/// Placeholder for an RTSP-to-WebRTC streamer.
#[derive(Debug, Default)]
pub struct WebRtcStreamer;

impl WebRtcStreamer {
    pub fn new() -> Self {
        Self
    }

    /// Always fails with `Unsupported`.
    pub fn start_webrtc_stream(
        &self,
        _camera_id: &str,
        _rtsp_url: &str,
    ) -> Result<(), WebRtcError> {
        Err(WebRtcError::Unsupported)
    }

    /// Always fails with `Unsupported`.
    pub fn create_offer(&self, _camera_id: &str) -> Result<String, WebRtcError> {
        Err(WebRtcError::Unsupported)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_webrtc_is_unsupported() {
        let streamer = WebRtcStreamer::new();
        assert!(matches!(
            streamer.start_webrtc_stream("cam-1", "rtsp://10.0.0.5/stream1"),
            Err(WebRtcError::Unsupported)
        ));
        assert!(matches!(
            streamer.create_offer("cam-1"),
            Err(WebRtcError::Unsupported)
        ));
    }
}
