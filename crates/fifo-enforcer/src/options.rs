// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, serde_as};

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize, derive_builder::Builder, PartialEq)]
#[serde(rename_all = "kebab-case", default)]
#[builder(default)]
pub struct FifoSinkOptions {
    /// # Slow admission threshold
    ///
    /// How long a token may wait for admission at the sink before a warning is logged. The
    /// warning repeats with exponential backoff (up to every 30 seconds) for as long as the
    /// token keeps waiting. Set to `null` to disable.
    #[serde_as(as = "Option<DisplayFromStr>", no_default)]
    pub slow_admission_threshold: Option<humantime::Duration>,
}

impl FifoSinkOptions {
    pub fn slow_admission_threshold(&self) -> Option<Duration> {
        self.slow_admission_threshold.map(Into::into)
    }
}

impl Default for FifoSinkOptions {
    fn default() -> Self {
        Self {
            slow_admission_threshold: Some(Duration::from_secs(10).into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_human_friendly_durations() {
        let options: FifoSinkOptions =
            serde_json::from_str(r#"{"slow-admission-threshold": "500ms"}"#).unwrap();
        assert_eq!(
            options.slow_admission_threshold(),
            Some(Duration::from_millis(500))
        );

        let options: FifoSinkOptions =
            serde_json::from_str(r#"{"slow-admission-threshold": null}"#).unwrap();
        assert_eq!(options.slow_admission_threshold(), None);
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let options: FifoSinkOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(options, FifoSinkOptions::default());
        assert_eq!(
            options.slow_admission_threshold(),
            Some(Duration::from_secs(10))
        );
    }

    #[test]
    fn default_threshold_survives_serialization() {
        let serialized = serde_json::to_string(&FifoSinkOptions::default()).unwrap();
        assert_eq!(serialized, r#"{"slow-admission-threshold":"10s"}"#);
        let options: FifoSinkOptions = serde_json::from_str(&serialized).unwrap();
        assert_eq!(options, FifoSinkOptions::default());
    }

    #[test]
    fn builder_overrides_defaults() {
        let options = FifoSinkOptionsBuilder::default()
            .slow_admission_threshold(None)
            .build()
            .unwrap();
        assert_eq!(options.slow_admission_threshold, None);
    }
}
