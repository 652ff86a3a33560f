//! The fraud-prevention header table.
//!
//! Each [`FraudHeader`] variant owns its wire name, category, requirement
//! level and [`WireFormat`]. The generator and the validator both read
//! from here.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HeaderCategory {
    Device,
    User,
    Vendor,
    ConnectionMethod,
    Browser,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Requirement {
    Required,
    RequiredIfAvailable,
    Optional,
}

/// How a single `key=value` pair inside a fixed-key header is checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueRule {
    /// `^\d+$`
    Integer,
    /// `^\d+(\.\d+)?$`
    Decimal,
}

impl ValueRule {
    fn accepts(self, value: &str) -> bool {
        let all_digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
        match self {
            ValueRule::Integer => all_digits(value),
            ValueRule::Decimal => match value.split_once('.') {
                Some((whole, frac)) => all_digits(whole) && all_digits(frac),
                None => all_digits(value),
            },
        }
    }
}

/// Syntax of a header value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireFormat {
    /// `DeviceType=<uuid>`.
    TypedUuid,
    /// One or more `key=value` pairs joined by `&`.
    KeyValueList,
    /// Exactly these keys, each `key=value`, joined by `&`.
    FixedKeys(&'static [(&'static str, ValueRule)]),
    /// IANA zone name such as `Europe/London`.
    IanaZone,
    /// Comma-separated dotted-quad IPv4 addresses.
    Ipv4List,
    /// Non-empty comma-separated list.
    CommaList,
    /// Literal `true` or `false`.
    Boolean,
    /// A [`ConnectionMethod`] wire name.
    ConnectionMethod,
    /// `vendor&product&version`, every part non-empty.
    AmpersandTriple,
    FreeText,
}

const SCREEN_KEYS: &[(&str, ValueRule)] = &[
    ("width", ValueRule::Integer),
    ("height", ValueRule::Integer),
    ("scaling-factor", ValueRule::Decimal),
    ("colour-depth", ValueRule::Integer),
];

const WINDOW_KEYS: &[(&str, ValueRule)] =
    &[("width", ValueRule::Integer), ("height", ValueRule::Integer)];

impl WireFormat {
    /// Checks an already-encoded value, returning the reason it is invalid.
    pub fn check(self, value: &str) -> Result<(), String> {
        match self {
            WireFormat::TypedUuid => {
                let (kind, id) = value
                    .split_once('=')
                    .ok_or_else(|| "expected [device-type]=[device-id]".to_string())?;
                if kind.is_empty() || !kind.chars().all(|c| c.is_ascii_alphabetic()) {
                    return Err(format!("invalid device type '{kind}'"));
                }
                Uuid::parse_str(id).map_err(|_| format!("device id '{id}' is not a UUID"))?;
                Ok(())
            }
            WireFormat::KeyValueList => {
                for part in value.split('&') {
                    parse_pair(part)?;
                }
                Ok(())
            }
            WireFormat::FixedKeys(keys) => {
                let mut seen = Vec::with_capacity(keys.len());
                for part in value.split('&') {
                    let (key, val) = parse_pair(part)?;
                    let (_, rule) = keys
                        .iter()
                        .find(|(k, _)| *k == key)
                        .ok_or_else(|| format!("unexpected key '{key}'"))?;
                    if !rule.accepts(val) {
                        return Err(format!("invalid value for {key}: {val}"));
                    }
                    seen.push(key);
                }
                match keys.iter().find(|(k, _)| !seen.contains(k)) {
                    Some((missing, _)) => Err(format!("missing key {missing}")),
                    None => Ok(()),
                }
            }
            WireFormat::IanaZone => {
                if value.contains('/') {
                    Ok(())
                } else {
                    Err("expected an IANA time zone such as Europe/London".to_string())
                }
            }
            WireFormat::Ipv4List => {
                for ip in value.split(',').map(str::trim) {
                    if !is_dotted_quad(ip) {
                        return Err(format!("invalid IPv4 address '{ip}'"));
                    }
                }
                Ok(())
            }
            WireFormat::CommaList => {
                if value.split(',').any(|item| !item.trim().is_empty()) {
                    Ok(())
                } else {
                    Err("list cannot be empty".to_string())
                }
            }
            WireFormat::Boolean => match value {
                "true" | "false" => Ok(()),
                _ => Err("expected \"true\" or \"false\"".to_string()),
            },
            WireFormat::ConnectionMethod => {
                value.parse::<ConnectionMethod>().map(|_| ()).map_err(|_| {
                    let allowed: Vec<&str> =
                        ConnectionMethod::ALL.iter().map(|m| m.as_str()).collect();
                    format!("expected one of: {}", allowed.join(", "))
                })
            }
            WireFormat::AmpersandTriple => {
                let parts: Vec<&str> = value.split('&').collect();
                if parts.len() != 3 {
                    return Err("expected [vendor-name]&[product-name]&[product-version]".to_string());
                }
                if parts.iter().any(|p| p.trim().is_empty()) {
                    return Err("parts cannot be empty".to_string());
                }
                Ok(())
            }
            WireFormat::FreeText => {
                if value.is_empty() {
                    Err("value cannot be empty".to_string())
                } else {
                    Ok(())
                }
            }
        }
    }
}

fn parse_pair(part: &str) -> Result<(&str, &str), String> {
    match part.split_once('=') {
        Some((k, v)) if !k.is_empty() && !v.is_empty() && !v.contains('=') => Ok((k, v)),
        _ => Err(format!("invalid part '{part}', expected key=value")),
    }
}

fn is_dotted_quad(ip: &str) -> bool {
    let octets: Vec<&str> = ip.split('.').collect();
    octets.len() == 4
        && octets.iter().all(|o| {
            (1..=3).contains(&o.len())
                && o.bytes().all(|b| b.is_ascii_digit())
                && o.parse::<u16>().is_ok_and(|n| n <= 255)
        })
}

/// How the client reaches the regulator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionMethod {
    #[default]
    DesktopAppDirect,
    DesktopAppViaServer,
    MobileAppDirect,
    MobileAppViaServer,
    BatchProcessDirect,
    OtherDirect,
    WebAppViaServer,
}

impl ConnectionMethod {
    pub const ALL: [ConnectionMethod; 7] = [
        ConnectionMethod::DesktopAppDirect,
        ConnectionMethod::DesktopAppViaServer,
        ConnectionMethod::MobileAppDirect,
        ConnectionMethod::MobileAppViaServer,
        ConnectionMethod::BatchProcessDirect,
        ConnectionMethod::OtherDirect,
        ConnectionMethod::WebAppViaServer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionMethod::DesktopAppDirect => "DESKTOP_APP_DIRECT",
            ConnectionMethod::DesktopAppViaServer => "DESKTOP_APP_VIA_SERVER",
            ConnectionMethod::MobileAppDirect => "MOBILE_APP_DIRECT",
            ConnectionMethod::MobileAppViaServer => "MOBILE_APP_VIA_SERVER",
            ConnectionMethod::BatchProcessDirect => "BATCH_PROCESS_DIRECT",
            ConnectionMethod::OtherDirect => "OTHER_DIRECT",
            ConnectionMethod::WebAppViaServer => "WEB_APP_VIA_SERVER",
        }
    }
}

impl fmt::Display for ConnectionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConnectionMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| format!("unknown connection method '{s}'"))
    }
}

/// One mandated header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FraudHeader {
    DeviceId,
    UserIds,
    Timezone,
    LocalIps,
    Screens,
    WindowSize,
    BrowserJsUserAgent,
    BrowserPlugins,
    BrowserDoNotTrack,
    ConnectionMethod,
    VendorVersion,
    VendorLicenseIds,
}

impl FraudHeader {
    pub const ALL: [FraudHeader; 12] = [
        FraudHeader::DeviceId,
        FraudHeader::UserIds,
        FraudHeader::Timezone,
        FraudHeader::LocalIps,
        FraudHeader::Screens,
        FraudHeader::WindowSize,
        FraudHeader::BrowserJsUserAgent,
        FraudHeader::BrowserPlugins,
        FraudHeader::BrowserDoNotTrack,
        FraudHeader::ConnectionMethod,
        FraudHeader::VendorVersion,
        FraudHeader::VendorLicenseIds,
    ];

    pub fn name(self) -> &'static str {
        match self {
            FraudHeader::DeviceId => "Gov-Client-Device-ID",
            FraudHeader::UserIds => "Gov-Client-User-IDs",
            FraudHeader::Timezone => "Gov-Client-Timezone",
            FraudHeader::LocalIps => "Gov-Client-Local-IPs",
            FraudHeader::Screens => "Gov-Client-Screens",
            FraudHeader::WindowSize => "Gov-Client-Window-Size",
            FraudHeader::BrowserJsUserAgent => "Gov-Client-Browser-JS-User-Agent",
            FraudHeader::BrowserPlugins => "Gov-Client-Browser-Plugins",
            FraudHeader::BrowserDoNotTrack => "Gov-Client-Browser-Do-Not-Track",
            FraudHeader::ConnectionMethod => "Gov-Client-Connection-Method",
            FraudHeader::VendorVersion => "Gov-Vendor-Version",
            FraudHeader::VendorLicenseIds => "Gov-Vendor-License-IDs",
        }
    }

    pub fn category(self) -> HeaderCategory {
        match self {
            FraudHeader::DeviceId
            | FraudHeader::Timezone
            | FraudHeader::LocalIps
            | FraudHeader::Screens => HeaderCategory::Device,
            FraudHeader::UserIds => HeaderCategory::User,
            FraudHeader::WindowSize
            | FraudHeader::BrowserJsUserAgent
            | FraudHeader::BrowserPlugins
            | FraudHeader::BrowserDoNotTrack => HeaderCategory::Browser,
            FraudHeader::ConnectionMethod => HeaderCategory::ConnectionMethod,
            FraudHeader::VendorVersion | FraudHeader::VendorLicenseIds => HeaderCategory::Vendor,
        }
    }

    pub fn requirement(self) -> Requirement {
        match self {
            FraudHeader::DeviceId
            | FraudHeader::UserIds
            | FraudHeader::Timezone
            | FraudHeader::ConnectionMethod
            | FraudHeader::VendorVersion => Requirement::Required,
            FraudHeader::VendorLicenseIds => Requirement::Optional,
            _ => Requirement::RequiredIfAvailable,
        }
    }

    pub fn format(self) -> WireFormat {
        match self {
            FraudHeader::DeviceId => WireFormat::TypedUuid,
            FraudHeader::UserIds => WireFormat::KeyValueList,
            FraudHeader::Timezone => WireFormat::IanaZone,
            FraudHeader::LocalIps => WireFormat::Ipv4List,
            FraudHeader::Screens => WireFormat::FixedKeys(SCREEN_KEYS),
            FraudHeader::WindowSize => WireFormat::FixedKeys(WINDOW_KEYS),
            FraudHeader::BrowserJsUserAgent => WireFormat::FreeText,
            FraudHeader::BrowserPlugins => WireFormat::CommaList,
            FraudHeader::BrowserDoNotTrack => WireFormat::Boolean,
            FraudHeader::ConnectionMethod => WireFormat::ConnectionMethod,
            FraudHeader::VendorVersion => WireFormat::AmpersandTriple,
            FraudHeader::VendorLicenseIds => WireFormat::FreeText,
        }
    }

    pub fn example(self) -> &'static str {
        match self {
            FraudHeader::DeviceId => "Desktop=b41894d8-abf9-4b2f-a3d6-594f2af93b4d",
            FraudHeader::UserIds => "os=jdoe&platform=123456&vendor=Acme-12345678",
            FraudHeader::Timezone => "Europe/London",
            FraudHeader::LocalIps => "10.1.2.3,192.168.0.1",
            FraudHeader::Screens => "width=1920&height=1080&scaling-factor=1.0&colour-depth=24",
            FraudHeader::WindowSize => "width=1280&height=720",
            FraudHeader::BrowserJsUserAgent => {
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36"
            }
            FraudHeader::BrowserPlugins => "PDF Viewer,Chrome PDF Viewer",
            FraudHeader::BrowserDoNotTrack => "false",
            FraudHeader::ConnectionMethod => "DESKTOP_APP_DIRECT",
            FraudHeader::VendorVersion => "Acme&Landlord&1.0.0",
            FraudHeader::VendorLicenseIds => "ABC123456",
        }
    }

    /// Header names compare case-insensitively on the wire.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|h| h.name().eq_ignore_ascii_case(name))
    }

    pub fn required() -> impl Iterator<Item = FraudHeader> {
        Self::ALL
            .into_iter()
            .filter(|h| h.requirement() == Requirement::Required)
    }
}

impl fmt::Display for FraudHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
