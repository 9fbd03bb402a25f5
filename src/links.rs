// 🔗 Link Resolver - platform-specific addresses for invoice images
// Locators stay platform-agnostic fragments; all joining rules live here

use crate::period::Quarter;
use crate::resolution::RankedRecord;
use serde::{Deserialize, Serialize};

// ============================================================================
// PLATFORM
// ============================================================================

/// Where the invoice image library lives. One formatting strategy per
/// variant; no string concatenation elsewhere in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Platform {
    /// Synced Dropbox folder: forward slashes, percent-encoded segments
    Dropbox,

    /// Mapped local drive: Windows backslash paths, verbatim segments
    LocalDrive,
}

impl Platform {
    /// Human-readable name for display and report column headers
    pub fn name(&self) -> &str {
        match self {
            Platform::Dropbox => "Dropbox",
            Platform::LocalDrive => "Local Drive",
        }
    }

    /// Short code for internal use
    pub fn code(&self) -> &str {
        match self {
            Platform::Dropbox => "dropbox",
            Platform::LocalDrive => "local-drive",
        }
    }

    pub const ALL: [Platform; 2] = [Platform::Dropbox, Platform::LocalDrive];
}

// ============================================================================
// LINK RESOLVER
// ============================================================================

/// Image library roots per platform. Bases are operator configuration,
/// never hard-coded in the resolution rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkConfig {
    /// e.g. "C:/Users/brend/Dropbox/Images MP-BC-AP R4Q2"
    pub dropbox_base: String,

    /// e.g. r"F:\Images MP-BC-AP R4Q2"
    pub local_base: String,
}

impl LinkConfig {
    pub fn new(dropbox_base: &str, local_base: &str) -> Self {
        LinkConfig {
            dropbox_base: dropbox_base.to_string(),
            local_base: local_base.to_string(),
        }
    }
}

pub struct LinkResolver {
    config: LinkConfig,
}

impl LinkResolver {
    pub fn new(config: LinkConfig) -> Self {
        LinkResolver { config }
    }

    /// Fully qualified address for one locator fragment inside a quarter
    /// folder, using the platform's joining rules.
    pub fn address(&self, platform: Platform, quarter: Quarter, fragment: &str) -> String {
        let folder = quarter.folder_name();
        match platform {
            Platform::Dropbox => {
                let base = self.config.dropbox_base.replace('\\', "/");
                let base = base.trim_end_matches('/');
                format!(
                    "{}/{}/{}",
                    base,
                    urlencoding::encode(&folder),
                    urlencoding::encode(fragment)
                )
            }
            Platform::LocalDrive => {
                let base = self.config.local_base.trim_end_matches('\\');
                format!("{}\\{}\\{}", base, folder, fragment)
            }
        }
    }

    /// Addresses for every locator on a record, stored order. A record
    /// with no locators yields an empty list - absence, not an error.
    pub fn resolve(
        &self,
        record: &RankedRecord,
        platform: Platform,
        quarter: Quarter,
    ) -> Vec<String> {
        record
            .locators
            .iter()
            .map(|fragment| self.address(platform, quarter, fragment))
            .collect()
    }
}

// ============================================================================
// TESTS
// ============================================================================
