// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Serde helpers for the human-readable values found in agent config files.
//!
//! Durations accept Go-style strings (`"10s"`, `"1h30m"`, `"250ms"`) and bare
//! integers, which are read as seconds. Sizes accept plain byte counts or a
//! number followed by a decimal (`KB`, `MB`, `GB`) or binary (`KiB`, `MiB`,
//! `GiB`) unit.

use std::time::Duration;

use serde::{de, Deserialize, Deserializer};

#[derive(Deserialize)]
#[serde(untagged)]
enum StringOrInt {
    Int(i64),
    String(String),
}

/// Parses a Go-style duration string.
///
/// A bare integer is read as a number of seconds.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use fleet_core::config::deserialize::parse_duration;
///
/// assert_eq!(parse_duration("1h30m"), Ok(Duration::from_secs(5_400)));
/// assert_eq!(parse_duration("250ms"), Ok(Duration::from_millis(250)));
/// assert_eq!(parse_duration("30"), Ok(Duration::from_secs(30)));
/// assert!(parse_duration("soon").is_err());
/// ```
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let s = input.trim();
    if s.is_empty() {
        return Err("empty duration".to_string());
    }
    if let Ok(secs) = s.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }

    let mut nanos = 0f64;
    let mut rest = s;
    while !rest.is_empty() {
        let number_end = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if number_end == 0 {
            return Err(format!("invalid duration '{input}'"));
        }
        let value: f64 = rest[..number_end]
            .parse()
            .map_err(|_| format!("invalid duration '{input}'"))?;
        rest = &rest[number_end..];

        let unit_end = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let per_unit = match &rest[..unit_end] {
            "ns" => 1.0,
            "us" | "µs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3_600e9,
            "d" => 86_400e9,
            "" => return Err(format!("missing unit in duration '{input}'")),
            unit => return Err(format!("unknown unit '{unit}' in duration '{input}'")),
        };
        nanos += value * per_unit;
        rest = &rest[unit_end..];
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let nanos = nanos as u64;
    Ok(Duration::from_nanos(nanos))
}

/// Parses a size string into a number of bytes.
pub fn parse_size(input: &str) -> Result<u64, String> {
    let s = input.trim();
    let number_end = s
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(s.len());
    if number_end == 0 {
        return Err(format!("invalid size '{input}'"));
    }
    let value: f64 = s[..number_end]
        .parse()
        .map_err(|_| format!("invalid size '{input}'"))?;
    let multiplier = match s[number_end..].trim().to_ascii_lowercase().as_str() {
        "" | "b" => 1.0,
        "kb" | "k" => 1e3,
        "mb" | "m" => 1e6,
        "gb" | "g" => 1e9,
        "kib" => 1024.0,
        "mib" => 1024.0 * 1024.0,
        "gib" => 1024.0 * 1024.0 * 1024.0,
        unit => return Err(format!("unknown unit '{unit}' in size '{input}'")),
    };

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let bytes = (value * multiplier) as u64;
    Ok(bytes)
}

pub fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    match StringOrInt::deserialize(deserializer)? {
        StringOrInt::Int(secs) => u64::try_from(secs)
            .map(Duration::from_secs)
            .map_err(|_| de::Error::custom(format!("duration cannot be negative: {secs}"))),
        StringOrInt::String(s) => parse_duration(&s).map_err(de::Error::custom),
    }
}

pub fn deserialize_optional_duration<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    deserialize_duration(deserializer).map(Some)
}

pub fn deserialize_size<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    match StringOrInt::deserialize(deserializer)? {
        StringOrInt::Int(bytes) => u64::try_from(bytes)
            .map_err(|_| de::Error::custom(format!("size cannot be negative: {bytes}"))),
        StringOrInt::String(s) => parse_size(&s).map_err(de::Error::custom),
    }
}
