//! Typed device fingerprinting from the user-agent string.

use woothee::parser::Parser;

/// Parsed device identity attached to sessions and login attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceFingerprint {
    pub device_type: String,
    pub browser: Option<String>,
    pub browser_version: Option<String>,
    pub os_name: Option<String>,
    pub os_version: Option<String>,
}

impl DeviceFingerprint {
    #[must_use]
    pub fn unknown() -> Self {
        Self {
            device_type: "unknown".to_string(),
            browser: None,
            browser_version: None,
            os_name: None,
            os_version: None,
        }
    }
}

/// Classify a user-agent string into a [`DeviceFingerprint`].
///
/// Unparseable agents degrade to the unknown fingerprint rather than failing.
#[must_use]
pub fn parse_user_agent(user_agent: &str) -> DeviceFingerprint {
    let Some(result) = Parser::new().parse(user_agent) else {
        return DeviceFingerprint::unknown();
    };

    let device_type = match result.category {
        "pc" => "desktop",
        "smartphone" | "mobilephone" => "mobile",
        "crawler" => "bot",
        _ => "unknown",
    };

    DeviceFingerprint {
        device_type: device_type.to_string(),
        browser: known(result.name),
        browser_version: known(result.version),
        os_name: known(result.os),
        os_version: known(&result.os_version),
    }
}

fn known(value: &str) -> Option<String> {
    if value.is_empty() || value == "UNKNOWN" {
        None
    } else {
        Some(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHROME_DESKTOP: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
        AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
    const IPHONE_SAFARI: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) \
        AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Mobile/15E148 Safari/604.1";

    #[test]
    fn desktop_chrome_is_classified() {
        let fingerprint = parse_user_agent(CHROME_DESKTOP);
        assert_eq!(fingerprint.device_type, "desktop");
        assert_eq!(fingerprint.browser.as_deref(), Some("Chrome"));
        assert!(fingerprint
            .os_name
            .as_deref()
            .is_some_and(|os| os.contains("Windows")));
    }

    #[test]
    fn iphone_safari_is_mobile() {
        let fingerprint = parse_user_agent(IPHONE_SAFARI);
        assert_eq!(fingerprint.device_type, "mobile");
        assert_eq!(fingerprint.browser.as_deref(), Some("Safari"));
    }

    #[test]
    fn garbage_degrades_to_unknown() {
        let fingerprint = parse_user_agent("definitely-not-a-browser");
        assert_eq!(fingerprint.device_type, "unknown");
        assert!(fingerprint.browser.is_none());
    }

    #[test]
    fn empty_agent_degrades_to_unknown() {
        assert_eq!(parse_user_agent(""), DeviceFingerprint::unknown());
    }
}
