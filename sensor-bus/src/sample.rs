use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DecodeError;

const FIELD_COUNT: usize = 10;
const ACCEL_SCALE: f64 = 1_000.0;
const MAG_SCALE: f64 = 1_000_000.0;

/// Positional field layout emitted by the sensor firmware.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Layout {
    /// `time, accel×3, gyro×3, mag×3` as integers, raw units.
    Legacy,
    /// `accel×3, gyro×3, mag×3, aux` as floats; accel in mg, mag in µT.
    #[default]
    Current,
}

impl FromStr for Layout {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "legacy" | "a" => Ok(Layout::Legacy),
            "current" | "b" => Ok(Layout::Current),
            other => Err(anyhow::anyhow!("unknown layout {:?}", other)),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    fn scaled(values: &[f64], divisor: f64) -> Self {
        Self::new(values[0] / divisor, values[1] / divisor, values[2] / divisor)
    }
}

/// One unit-normalized sensor reading.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SensorSample {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<i64>,
    pub accel: Vec3,
    pub gyro: Vec3,
    pub mag: Vec3,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aux: Option<f64>,
}

impl SensorSample {
    /// Parses one `key:value\t...` record. Keys are ignored, only position counts.
    pub fn parse(line: &str, layout: Layout) -> Result<Self, DecodeError> {
        let values = split_values(line)?;
        match layout {
            Layout::Legacy => {
                let mut ints = [0i64; FIELD_COUNT];
                for (index, value) in values.iter().enumerate() {
                    ints[index] = leading_int(value).ok_or_else(|| not_a_number(index, value))?;
                }
                let raw: Vec<f64> = ints[1..].iter().map(|v| *v as f64).collect();
                Ok(Self {
                    time: Some(ints[0]),
                    accel: Vec3::scaled(&raw[0..3], 1.0),
                    gyro: Vec3::scaled(&raw[3..6], 1.0),
                    mag: Vec3::scaled(&raw[6..9], 1.0),
                    aux: None,
                })
            }
            Layout::Current => {
                let mut floats = [0f64; FIELD_COUNT];
                for (index, value) in values.iter().enumerate() {
                    floats[index] = value
                        .parse::<f64>()
                        .ok()
                        .filter(|v| v.is_finite())
                        .ok_or_else(|| not_a_number(index, value))?;
                }
                Ok(Self {
                    time: None,
                    accel: Vec3::scaled(&floats[0..3], ACCEL_SCALE),
                    gyro: Vec3::scaled(&floats[3..6], 1.0),
                    mag: Vec3::scaled(&floats[6..9], MAG_SCALE),
                    aux: Some(floats[9]),
                })
            }
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

fn split_values(line: &str) -> Result<Vec<&str>, DecodeError> {
    let segments: Vec<&str> = line.split('\t').collect();
    if segments.len() != FIELD_COUNT {
        return Err(DecodeError::FieldCount {
            expected: FIELD_COUNT,
            actual: segments.len(),
        });
    }
    segments
        .into_iter()
        .enumerate()
        .map(|(index, segment)| match segment.split_once(':') {
            Some((_, value)) => Ok(value.trim()),
            None => Err(DecodeError::MissingSeparator {
                index,
                segment: segment.to_string(),
            }),
        })
        .collect()
}

/// Integer prefix of `value`: `12.7` and `12abc` both read as 12. `None` when
/// there is no leading digit or the prefix overflows.
fn leading_int(value: &str) -> Option<i64> {
    let sign_len = usize::from(value.starts_with(['+', '-']));
    let digits = value[sign_len..]
        .bytes()
        .take_while(u8::is_ascii_digit)
        .count();
    if digits == 0 {
        return None;
    }
    value[..sign_len + digits].parse().ok()
}

fn not_a_number(index: usize, value: &str) -> DecodeError {
    DecodeError::NotANumber {
        index,
        value: value.to_string(),
    }
}

#[cfg(test)]
#[path = "sample_test.rs"]
mod sample_test;
