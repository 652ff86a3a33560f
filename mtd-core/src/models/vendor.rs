use serde::{Deserialize, Serialize};

/// Static identity of this software, sent to the regulator on every call
/// and stamped on every formatted submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorMetadata {
    pub name: String,
    pub product_name: String,
    pub product_version: String,
    #[serde(default)]
    pub license_ids: Vec<String>,
}

impl Default for VendorMetadata {
    fn default() -> Self {
        Self {
            name: "PropertyDesk".to_string(),
            product_name: "mtd".to_string(),
            product_version: env!("CARGO_PKG_VERSION").to_string(),
            license_ids: Vec::new(),
        }
    }
}
