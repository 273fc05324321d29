// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Power actions applied to devices and channels.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A power action for a device or a single channel.
///
/// # Examples
///
/// ```
/// use casahub::types::PowerAction;
///
/// assert_eq!(PowerAction::On.inverse(), PowerAction::Off);
/// assert!(PowerAction::On.as_bool());
/// assert_eq!("off".parse::<PowerAction>().unwrap(), PowerAction::Off);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerAction {
    /// Switch the target on.
    On,
    /// Switch the target off.
    Off,
}

impl PowerAction {
    /// Returns the boolean channel value this action writes.
    #[must_use]
    pub const fn as_bool(self) -> bool {
        matches!(self, Self::On)
    }

    /// Returns the action for a given boolean channel value.
    #[must_use]
    pub const fn from_bool(on: bool) -> Self {
        if on { Self::On } else { Self::Off }
    }

    /// Returns the opposite action.
    ///
    /// Timers are scheduled with the inverse of the channel's current state:
    /// a channel that is on gets an Off timer and vice versa.
    #[must_use]
    pub const fn inverse(self) -> Self {
        match self {
            Self::On => Self::Off,
            Self::Off => Self::On,
        }
    }

    /// Returns the lowercase wire representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::On => "on",
            Self::Off => "off",
        }
    }

    /// Returns the label used in human-readable messages.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::On => "ON",
            Self::Off => "OFF",
        }
    }
}

impl fmt::Display for PowerAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PowerAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "on" => Ok(Self::On),
            "off" => Ok(Self::Off),
            other => Err(format!("unknown power action: {other}")),
        }
    }
}
