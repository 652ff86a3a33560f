use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::catalog::{ConnectionMethod, FraudHeader};
use super::validator::{
    FraudPreventionHeaderSet, HeaderValidationReport, ValidatedHeaders, validate_headers,
};
use crate::models::VendorMetadata;

const DEFAULT_DEVICE_TYPE: &str = "Desktop";
const DEFAULT_TIMEZONE: &str = "UTC";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenInfo {
    pub width: u32,
    pub height: u32,
    pub scaling_factor: Decimal,
    #[serde(alias = "colorDepth")]
    pub colour_depth: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowSize {
    pub width: u32,
    pub height: u32,
}

/// What the client told us about itself for this session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientTelemetry {
    pub device_id: String,
    pub device_type: Option<String>,
    pub os_user: Option<String>,
    pub platform_user: Option<String>,
    pub user_agent: Option<String>,
    pub plugins: Vec<String>,
    pub screen: Option<ScreenInfo>,
    pub window: Option<WindowSize>,
    pub timezone: Option<String>,
    pub local_ips: Vec<String>,
    pub do_not_track: bool,
    pub connection_method: Option<ConnectionMethod>,
}

/// Builds the header set for one user's session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FraudPreventionHeaderGenerator {
    vendor: VendorMetadata,
}

impl FraudPreventionHeaderGenerator {
    pub fn new(vendor: VendorMetadata) -> Self {
        Self { vendor }
    }

    /// Headers the telemetry can support. Required headers are always
    /// emitted; the rest only when their data is present.
    pub fn generate(&self, telemetry: &ClientTelemetry, user_id: &str) -> FraudPreventionHeaderSet {
        let mut set = FraudPreventionHeaderSet::new();

        let device_type = telemetry
            .device_type
            .as_deref()
            .filter(|t| !t.is_empty())
            .unwrap_or(DEFAULT_DEVICE_TYPE);
        set.insert(
            FraudHeader::DeviceId,
            format!("{device_type}={}", telemetry.device_id),
        );

        set.insert(FraudHeader::UserIds, self.user_ids(telemetry, user_id));

        set.insert(
            FraudHeader::Timezone,
            telemetry.timezone.as_deref().unwrap_or(DEFAULT_TIMEZONE),
        );

        set.insert(
            FraudHeader::ConnectionMethod,
            telemetry.connection_method.unwrap_or_default().as_str(),
        );

        set.insert(
            FraudHeader::VendorVersion,
            format!(
                "{}&{}&{}",
                self.vendor.name, self.vendor.product_name, self.vendor.product_version
            ),
        );

        if !telemetry.local_ips.is_empty() {
            set.insert(FraudHeader::LocalIps, telemetry.local_ips.join(","));
        }

        if let Some(screen) = &telemetry.screen {
            set.insert(
                FraudHeader::Screens,
                format!(
                    "width={}&height={}&scaling-factor={}&colour-depth={}",
                    screen.width,
                    screen.height,
                    scaling_factor(screen.scaling_factor),
                    screen.colour_depth
                ),
            );
        }

        if let Some(window) = telemetry.window {
            set.insert(
                FraudHeader::WindowSize,
                format!("width={}&height={}", window.width, window.height),
            );
        }

        if let Some(agent) = telemetry.user_agent.as_deref().filter(|a| !a.is_empty()) {
            set.insert(FraudHeader::BrowserJsUserAgent, agent);
        }

        if !telemetry.plugins.is_empty() {
            set.insert(FraudHeader::BrowserPlugins, telemetry.plugins.join(","));
        }

        set.insert(
            FraudHeader::BrowserDoNotTrack,
            if telemetry.do_not_track { "true" } else { "false" },
        );

        if !self.vendor.license_ids.is_empty() {
            set.insert(FraudHeader::VendorLicenseIds, self.vendor.license_ids.join(","));
        }

        debug!(user_id, headers = set.len(), "Generated fraud prevention headers");
        set
    }

    /// [`generate`](Self::generate) followed by validation.
    pub fn generate_validated(
        &self,
        telemetry: &ClientTelemetry,
        user_id: &str,
    ) -> Result<ValidatedHeaders, HeaderValidationReport> {
        validate_headers(&self.generate(telemetry, user_id))
    }

    fn user_ids(&self, telemetry: &ClientTelemetry, user_id: &str) -> String {
        let os = telemetry.os_user.as_deref().unwrap_or(user_id);
        let platform = telemetry.platform_user.as_deref().unwrap_or(user_id);
        let short_id: String = user_id.chars().take(8).collect();
        format!(
            "os={os}&platform={platform}&vendor={}-{short_id}",
            self.vendor.name
        )
    }
}

/// `N.N`, keeping at least one fractional digit.
fn scaling_factor(value: Decimal) -> String {
    let value = value.normalize();
    if value.scale() == 0 {
        format!("{value}.0")
    } else {
        value.to_string()
    }
}
