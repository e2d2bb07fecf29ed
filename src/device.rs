//! Device classification from a user-agent string.
//!
//! The class decides which resolution hints are requested and whether the
//! preview redraw loop runs at all.

use serde::Deserialize;
use std::fmt;

const IOS_TOKENS: &[&str] = &["iphone", "ipad", "ipod"];
const ANDROID_TOKENS: &[&str] = &["android"];

/// Whether the user agent belongs to an iOS device.
pub fn is_ios(user_agent: &str) -> bool {
    contains_any(user_agent, IOS_TOKENS)
}

/// Whether the user agent belongs to an Android device.
pub fn is_android(user_agent: &str) -> bool {
    contains_any(user_agent, ANDROID_TOKENS)
}

/// Whether the user agent belongs to any mobile device.
pub fn is_mobile(user_agent: &str) -> bool {
    is_android(user_agent) || is_ios(user_agent)
}

fn contains_any(user_agent: &str, tokens: &[&str]) -> bool {
    let lower = user_agent.to_lowercase();
    tokens.iter().any(|token| lower.contains(token))
}

/// Broad device category of the machine the camera runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceClass {
    Mobile,
    Desktop,
}

impl DeviceClass {
    /// Classify a user-agent string.
    pub fn detect(user_agent: &str) -> Self {
        if is_mobile(user_agent) {
            DeviceClass::Mobile
        } else {
            DeviceClass::Desktop
        }
    }

    pub fn is_mobile(&self) -> bool {
        matches!(self, DeviceClass::Mobile)
    }
}

impl fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceClass::Mobile => write!(f, "mobile"),
            DeviceClass::Desktop => write!(f, "desktop"),
        }
    }
}

/// Device class setting as written in the config file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceClassSetting {
    /// Detect from the user agent
    #[default]
    Auto,
    Mobile,
    Desktop,
}

impl DeviceClassSetting {
    /// Resolve the setting to a concrete override, if any.
    pub fn forced(&self) -> Option<DeviceClass> {
        match self {
            DeviceClassSetting::Auto => None,
            DeviceClassSetting::Mobile => Some(DeviceClass::Mobile),
            DeviceClassSetting::Desktop => Some(DeviceClass::Desktop),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const IPHONE_UA: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Mobile/15E148 Safari/604.1";
    const ANDROID_UA: &str = "Mozilla/5.0 (Linux; Android 14; Pixel 8) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Mobile Safari/537.36";
    const DESKTOP_UA: &str = "Mozilla/5.0 (X11; Linux x86_64; rv:121.0) Gecko/20100101 Firefox/121.0";

    #[test]
    fn test_is_ios() {
        assert!(is_ios(IPHONE_UA));
        assert!(is_ios("Mozilla/5.0 (iPad; CPU OS 16_0 like Mac OS X)"));
        assert!(!is_ios(ANDROID_UA));
        assert!(!is_ios(DESKTOP_UA));
    }

    #[test]
    fn test_is_android() {
        assert!(is_android(ANDROID_UA));
        assert!(!is_android(IPHONE_UA));
        assert!(!is_android(DESKTOP_UA));
    }

    #[test]
    fn test_detect_class() {
        assert_eq!(DeviceClass::detect(IPHONE_UA), DeviceClass::Mobile);
        assert_eq!(DeviceClass::detect(ANDROID_UA), DeviceClass::Mobile);
        assert_eq!(DeviceClass::detect(DESKTOP_UA), DeviceClass::Desktop);
    }

    #[test]
    fn test_kiosk_browser_is_desktop() {
        let ua = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36 KioskBrowser/2.0";
        assert!(!is_ios(ua));
        assert_eq!(DeviceClass::detect(ua), DeviceClass::Desktop);
        assert_eq!(DeviceClass::detect("Studios Capture Station (bios 1.2)"), DeviceClass::Desktop);
    }

    #[test]
    fn test_case_insensitive() {
        assert!(is_android("absence-capture/0.1 (android)"));
    }

    #[test]
    fn test_setting_forced() {
        assert_eq!(DeviceClassSetting::Auto.forced(), None);
        assert_eq!(DeviceClassSetting::Mobile.forced(), Some(DeviceClass::Mobile));
        assert_eq!(DeviceClassSetting::Desktop.forced(), Some(DeviceClass::Desktop));
    }
}
