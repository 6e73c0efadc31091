#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Listening statistics result types.
//!
//! A [`ListeningSummary`] holds the aggregations behind the listening
//! dashboards: top artists, skip and pick statistics, device usage per
//! year, the biggest listening days and year, and the listening map.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A name with a play count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedCount {
    /// Artist, city or other grouping key.
    pub name: String,
    /// Number of plays.
    pub count: usize,
}

/// A track with a play count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackCount {
    /// Track name.
    pub track: String,
    /// Artist name, if present.
    pub artist: Option<String>,
    /// Album name, if present.
    pub album: Option<String>,
    /// Number of matching plays.
    pub count: usize,
}

/// Plays on one device model in one year.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceYearCount {
    /// Calendar year (UTC).
    pub year: i32,
    /// Device model, e.g. `iPhone13,2`, or the raw platform string.
    pub device: String,
    /// Number of plays.
    pub count: usize,
}

/// Total listening time on one day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DayTotal {
    /// Calendar date (UTC).
    pub date: NaiveDate,
    /// Milliseconds played.
    pub ms_played: u64,
    /// Number of plays.
    pub plays: usize,
}

/// The year with the most plays, and its favourites.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YearHighlight {
    /// Calendar year (UTC).
    pub year: i32,
    /// Number of plays in the year.
    pub plays: usize,
    /// Most played artist.
    pub top_artist: Option<RankedCount>,
    /// Most played album.
    pub top_album: Option<RankedCount>,
    /// Most played track.
    pub top_track: Option<RankedCount>,
}

/// A resolved location on the listening map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapPoint {
    /// Latitude (WGS84).
    pub latitude: f64,
    /// Longitude (WGS84).
    pub longitude: f64,
    /// City name, if known.
    pub city: Option<String>,
    /// ISO country code, if known.
    pub country_code: Option<String>,
    /// Number of plays at this location.
    pub count: usize,
}

/// Aggregated listening statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListeningSummary {
    /// Records summarized.
    pub total_records: usize,
    /// Sum of `ms_played`.
    pub total_ms_played: u64,
    /// `total_ms_played` in hours.
    pub total_hours: f64,
    /// Most played artists.
    pub top_artists: Vec<RankedCount>,
    /// Most skipped tracks.
    pub most_skipped: Vec<TrackCount>,
    /// Tracks most often started by picking them directly.
    pub most_picked: Vec<TrackCount>,
    /// Plays per device model per year, ordered by year then count.
    pub device_usage: Vec<DeviceYearCount>,
    /// Days with the most listening time.
    pub biggest_days: Vec<DayTotal>,
    /// The year with the most plays.
    pub biggest_year: Option<YearHighlight>,
    /// Cities with the most plays.
    pub top_cities: Vec<RankedCount>,
    /// Distinct resolved locations, most plays first.
    pub map_points: Vec<MapPoint>,
    /// Most frequent words in track names.
    #[serde(default)]
    pub top_keywords: Vec<RankedCount>,
}
