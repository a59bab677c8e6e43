//! Platform capability detection
//!
//! The controller asks exactly once per session which output variant applies.

use serde::{Deserialize, Serialize};

use crate::output::OutputTarget;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Web,
    Android,
    Ios,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Web => "web",
            Platform::Android => "android",
            Platform::Ios => "ios",
        }
    }

    /// Only Android exposes a shared media directory the app can write into;
    /// iOS and the web fall back to a download.
    pub fn has_writable_gallery(&self) -> bool {
        matches!(self, Platform::Android)
    }
}

impl OutputTarget {
    pub fn for_platform(platform: Platform) -> Self {
        if platform.has_writable_gallery() {
            OutputTarget::NativeGallery
        } else {
            OutputTarget::Download
        }
    }
}

/// Synchronous capability query.
pub trait PlatformProbe: Send + Sync {
    fn platform(&self) -> Platform;
}

/// Answers from the build target, unless an override is configured.
#[derive(Debug, Clone, Default)]
pub struct HostPlatform {
    override_platform: Option<Platform>,
}

impl HostPlatform {
    pub fn new(override_platform: Option<Platform>) -> Self {
        Self { override_platform }
    }
}

impl PlatformProbe for HostPlatform {
    fn platform(&self) -> Platform {
        if let Some(platform) = self.override_platform {
            return platform;
        }
        if cfg!(target_os = "android") {
            Platform::Android
        } else if cfg!(target_os = "ios") {
            Platform::Ios
        } else {
            Platform::Web
        }
    }
}

/// Always reports the same platform.
#[derive(Debug, Clone, Copy)]
pub struct FixedPlatform(pub Platform);

impl PlatformProbe for FixedPlatform {
    fn platform(&self) -> Platform {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_android_writes_to_gallery() {
        assert_eq!(
            OutputTarget::for_platform(Platform::Android),
            OutputTarget::NativeGallery
        );
        assert_eq!(OutputTarget::for_platform(Platform::Ios), OutputTarget::Download);
        assert_eq!(OutputTarget::for_platform(Platform::Web), OutputTarget::Download);
    }

    #[test]
    fn override_wins_over_build_target() {
        let probe = HostPlatform::new(Some(Platform::Android));
        assert_eq!(probe.platform(), Platform::Android);
    }

    #[test]
    fn platform_serializes_lowercase() {
        let json = serde_json::to_string(&Platform::Ios).unwrap();
        assert_eq!(json, "\"ios\"");
    }
}
