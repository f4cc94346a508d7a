//! Firmware requirements parsing
//!
//! A build's firmware metadata is line-oriented text of the form
//! `require <key>=<value>`. The keys the flasher cares about are `board`
//! (one or more acceptable board identifiers, separated by `|`),
//! `version-bootloader`, and `version-baseband`. Other `require` keys are
//! ignored. Any non-blank line that is not a well-formed declaration is a
//! parse failure; a build whose metadata cannot be parsed must not be
//! flashed.

use crate::errors::{Result, SetupError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

const REQUIRE_PREFIX: &str = "require";
const BOARD_KEY: &str = "board";
const BOOTLOADER_VERSION_KEY: &str = "version-bootloader";
const BASEBAND_VERSION_KEY: &str = "version-baseband";

/// Firmware requirements a build declares for the device it is flashed onto.
///
/// Derived fresh from the build's metadata per flash attempt; never mutated
/// after construction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirmwareRequirements {
    /// Board identifiers this build may be flashed onto. Empty means the
    /// metadata declared none, which the flasher treats as an error.
    pub boards: BTreeSet<String>,
    /// Bootloader version this build requires, if any.
    pub bootloader_version: Option<String>,
    /// Baseband/radio version this build requires, if any.
    pub baseband_version: Option<String>,
}

impl FirmwareRequirements {
    /// Parse requirements from metadata text.
    pub fn parse(text: &str) -> Result<Self> {
        let mut requirements = FirmwareRequirements::default();
        for (index, raw_line) in text.lines().enumerate() {
            let line = raw_line.trim();
            if line.is_empty() {
                continue;
            }
            let (key, value) = parse_declaration(line).ok_or_else(|| SetupError::Metadata {
                message: format!("malformed declaration on line {}: '{}'", index + 1, line),
            })?;
            match key {
                BOARD_KEY => {
                    requirements
                        .boards
                        .extend(value.split('|').map(|board| board.trim().to_string()));
                }
                BOOTLOADER_VERSION_KEY => {
                    requirements.bootloader_version = Some(value.to_string());
                }
                BASEBAND_VERSION_KEY => {
                    requirements.baseband_version = Some(value.to_string());
                }
                // other require keys are legal but not ours to interpret
                _ => {}
            }
        }
        Ok(requirements)
    }

    /// Comma-separated board list for error messages.
    pub fn boards_for_display(&self) -> String {
        self.boards
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Split one `require <key>=<value>` line into its key and value.
fn parse_declaration(line: &str) -> Option<(&str, &str)> {
    let rest = line.strip_prefix(REQUIRE_PREFIX)?;
    // "requireboard=x" is not a declaration
    let rest = rest.strip_prefix(char::is_whitespace)?.trim_start();
    let (key, value) = rest.split_once('=')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }
    Some((key, value.trim()))
}
