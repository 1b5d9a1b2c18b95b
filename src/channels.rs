//! Sensor identification and channel-availability resolution.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{FcdrError, SENSOR_CHANNELS};

/// Channel layout family of an AVHRR instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorFamily {
    /// AVHRR/1: Ch1, Ch2, Ch3b, Ch4
    TwoChannelIr,
    /// AVHRR/2: Ch1, Ch2, Ch3b, Ch4, Ch5
    ThreeChannelIr,
    /// AVHRR/3: Ch3a and Ch3b time-share one detector slot
    SecondaryVisible,
}

/// Resolved platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sensor {
    pub identifier: String,
    pub family: SensorFamily,
}

impl Sensor {
    pub fn from_identifier(identifier: &str) -> Result<Self, FcdrError> {
        let family = match identifier {
            "NOAA06" | "NOAA08" | "NOAA10" => SensorFamily::TwoChannelIr,
            "NOAA07" | "NOAA09" | "NOAA11" | "NOAA12" | "NOAA14" => SensorFamily::ThreeChannelIr,
            "NOAA15" | "NOAA16" | "NOAA17" | "NOAA18" | "NOAA19" | "METOPA" | "METOPB"
            | "METOPC" => SensorFamily::SecondaryVisible,
            other => return Err(FcdrError::UnknownSensor(other.to_string())),
        };
        Ok(Self {
            identifier: identifier.to_string(),
            family,
        })
    }

    /// Three-letter platform code used in product file names.
    pub fn platform_code(&self) -> Option<&'static str> {
        platform_code(&self.identifier)
    }

    pub fn secondary_visible_capable(&self) -> bool {
        self.family == SensorFamily::SecondaryVisible
    }

    /// Channel configuration for a segment, given whether Ch3a is active in it.
    pub fn configuration(&self, secondary_visible: bool) -> ChannelConfiguration {
        ChannelConfiguration::resolve(self.family, secondary_visible)
    }
}

pub fn platform_code(identifier: &str) -> Option<&'static str> {
    let code = match identifier {
        "TIROSN" => "TRN",
        "NOAA06" => "N06",
        "NOAA07" => "N07",
        "NOAA08" => "N08",
        "NOAA09" => "N09",
        "NOAA10" => "N10",
        "NOAA11" => "N11",
        "NOAA12" => "N12",
        "NOAA14" => "N14",
        "NOAA15" => "N15",
        "NOAA16" => "N16",
        "NOAA17" => "N17",
        "NOAA18" => "N18",
        "NOAA19" => "N19",
        "METOPA" => "MTA",
        "METOPB" => "MTB",
        "METOPC" => "MTC",
        _ => return None,
    };
    Some(code)
}

/// Ordered, deduplicated set of channel slots.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ChannelSubset(Vec<usize>);

impl ChannelSubset {
    pub fn new(channels: impl IntoIterator<Item = usize>) -> Result<Self, FcdrError> {
        let mut channels: Vec<usize> = channels.into_iter().collect();
        if let Some(&bad) = channels.iter().find(|&&ch| ch >= SENSOR_CHANNELS) {
            return Err(FcdrError::InvalidConfig(format!(
                "channel index {bad} outside 0..{SENSOR_CHANNELS}"
            )));
        }
        channels.sort_unstable();
        channels.dedup();
        Ok(Self(channels))
    }

    fn from_sorted(channels: &[usize]) -> Self {
        Self(channels.to_vec())
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, channel: usize) -> bool {
        self.0.binary_search(&channel).is_ok()
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.0.iter().copied()
    }

    /// Channels present in `self` or `other`.
    pub fn union(&self, other: &ChannelSubset) -> ChannelSubset {
        let mut all = self.0.clone();
        all.extend_from_slice(&other.0);
        all.sort_unstable();
        all.dedup();
        Self(all)
    }
}

/// Channel-availability case selecting which channel slots a gather may read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelCase {
    /// Ch3b, Ch4, Ch5
    InfraredThree,
    /// Ch3b, Ch4
    InfraredTwo,
    /// Ch4, Ch5 (Ch3a active)
    InfraredNo37,
    /// Ch1, Ch2, Ch3a
    VisibleWithSecondary,
    /// Ch1, Ch2
    VisibleWithoutSecondary,
}

impl ChannelCase {
    pub fn supported(self) -> &'static [usize] {
        match self {
            ChannelCase::InfraredThree => &[3, 4, 5],
            ChannelCase::InfraredTwo => &[3, 4],
            ChannelCase::InfraredNo37 => &[4, 5],
            ChannelCase::VisibleWithSecondary => &[0, 1, 2],
            ChannelCase::VisibleWithoutSecondary => &[0, 1],
        }
    }

    pub fn supports(self, channel: usize) -> bool {
        self.supported().contains(&channel)
    }

    pub fn is_visible(self) -> bool {
        matches!(
            self,
            ChannelCase::VisibleWithSecondary | ChannelCase::VisibleWithoutSecondary
        )
    }
}

impl fmt::Display for ChannelCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ChannelCase::InfraredThree => "3-channel infra-red",
            ChannelCase::InfraredTwo => "2-channel infra-red",
            ChannelCase::InfraredNo37 => "infra-red without 3.7um",
            ChannelCase::VisibleWithSecondary => "visible with Ch3a",
            ChannelCase::VisibleWithoutSecondary => "visible without Ch3a",
        };
        f.write_str(label)
    }
}

/// Channels a segment carries and the cases used to gather them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelConfiguration {
    pub family: SensorFamily,
    pub secondary_visible: bool,
    pub visible_case: ChannelCase,
    pub infrared_case: ChannelCase,
}

impl ChannelConfiguration {
    pub fn resolve(family: SensorFamily, secondary_visible: bool) -> Self {
        let (visible_case, infrared_case) = match family {
            SensorFamily::TwoChannelIr => {
                (ChannelCase::VisibleWithoutSecondary, ChannelCase::InfraredTwo)
            }
            SensorFamily::ThreeChannelIr => {
                (ChannelCase::VisibleWithoutSecondary, ChannelCase::InfraredThree)
            }
            SensorFamily::SecondaryVisible if secondary_visible => {
                (ChannelCase::VisibleWithSecondary, ChannelCase::InfraredNo37)
            }
            SensorFamily::SecondaryVisible => {
                (ChannelCase::VisibleWithoutSecondary, ChannelCase::InfraredThree)
            }
        };
        Self {
            family,
            secondary_visible: secondary_visible && family == SensorFamily::SecondaryVisible,
            visible_case,
            infrared_case,
        }
    }

    pub fn visible_channels(&self) -> ChannelSubset {
        ChannelSubset::from_sorted(self.visible_case.supported())
    }

    pub fn infrared_channels(&self) -> ChannelSubset {
        ChannelSubset::from_sorted(self.infrared_case.supported())
    }

    /// All channels present in the segment.
    pub fn channels(&self) -> ChannelSubset {
        self.visible_channels().union(&self.infrared_channels())
    }

    /// Channel slots with no data in this configuration.
    pub fn absent_channels(&self) -> Vec<usize> {
        let present = self.channels();
        (0..SENSOR_CHANNELS)
            .filter(|&ch| !present.contains(ch))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sensor_families_resolve() {
        for id in ["NOAA06", "NOAA08", "NOAA10"] {
            let sensor = Sensor::from_identifier(id).expect("known sensor");
            assert_eq!(sensor.configuration(false).channels().as_slice(), &[0, 1, 3, 4]);
        }
        for id in ["NOAA07", "NOAA09", "NOAA11", "NOAA12", "NOAA14"] {
            let sensor = Sensor::from_identifier(id).expect("known sensor");
            assert_eq!(
                sensor.configuration(false).channels().as_slice(),
                &[0, 1, 3, 4, 5]
            );
        }
        for id in ["NOAA15", "NOAA19", "METOPA", "METOPC"] {
            let sensor = Sensor::from_identifier(id).expect("known sensor");
            assert!(sensor.secondary_visible_capable());
            assert_eq!(
                sensor.configuration(true).channels().as_slice(),
                &[0, 1, 2, 4, 5]
            );
            assert_eq!(
                sensor.configuration(false).channels().as_slice(),
                &[0, 1, 3, 4, 5]
            );
        }
    }

    #[test]
    fn unknown_sensor_is_rejected() {
        assert!(matches!(
            Sensor::from_identifier("NOAA13"),
            Err(FcdrError::UnknownSensor(id)) if id == "NOAA13"
        ));
    }

    #[test]
    fn secondary_flag_ignored_for_older_families() {
        let config = ChannelConfiguration::resolve(SensorFamily::ThreeChannelIr, true);
        assert!(!config.secondary_visible);
        assert_eq!(config.infrared_case, ChannelCase::InfraredThree);
        assert_eq!(config.absent_channels(), vec![2]);
    }

    #[test]
    fn subset_is_sorted_and_deduplicated() {
        let subset = ChannelSubset::new([5, 3, 4, 3]).expect("valid subset");
        assert_eq!(subset.as_slice(), &[3, 4, 5]);
        assert!(ChannelSubset::new([6]).is_err());
    }

    #[test]
    fn platform_codes() {
        assert_eq!(platform_code("METOPB"), Some("MTB"));
        assert_eq!(platform_code("NOAA07"), Some("N07"));
        assert_eq!(platform_code("GOES16"), None);
    }
}
