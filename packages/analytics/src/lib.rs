#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Listening statistics over enriched streaming-history records.
//!
//! [`summarize`] computes every aggregation in one pass over the records.
//! Rankings are ordered by count descending with ties broken by name
//! ascending, so the output is deterministic for a given input.

mod fields;

use std::collections::BTreeMap;

use chrono::{Datelike as _, NaiveDate};
use stream_atlas_analytics_models::{
    DayTotal, DeviceYearCount, ListeningSummary, MapPoint, RankedCount, TrackCount,
    YearHighlight,
};
use stream_atlas_enrich_models::EnrichedRecord;

/// Label for resolved locations without a city name.
pub const UNKNOWN_CITY: &str = "Unknown city";

const MS_PER_HOUR: f64 = 3_600_000.0;

/// Words too common in track names to be interesting.
const COMMON_WORDS: &[&str] = &["the", "and", "for"];

#[derive(Default)]
struct TrackTally {
    album: Option<String>,
    count: usize,
}

#[derive(Default)]
struct DayTally {
    ms_played: u64,
    plays: usize,
}

#[derive(Default)]
struct YearTally {
    plays: usize,
    artists: BTreeMap<String, usize>,
    albums: BTreeMap<String, usize>,
    tracks: BTreeMap<String, usize>,
}

struct PointTally {
    latitude: f64,
    longitude: f64,
    city: Option<String>,
    country_code: Option<String>,
    count: usize,
}

/// Computes listening statistics. Ranked lists hold at most `top_n`
/// entries; `device_usage` and `map_points` are complete.
#[must_use]
#[allow(clippy::too_many_lines)]
pub fn summarize(records: &[EnrichedRecord], top_n: usize) -> ListeningSummary {
    let mut total_ms_played = 0u64;
    let mut artists: BTreeMap<String, usize> = BTreeMap::new();
    let mut skipped: BTreeMap<(String, Option<String>), TrackTally> = BTreeMap::new();
    let mut picked: BTreeMap<(String, Option<String>), TrackTally> = BTreeMap::new();
    let mut devices: BTreeMap<(i32, String), usize> = BTreeMap::new();
    let mut days: BTreeMap<NaiveDate, DayTally> = BTreeMap::new();
    let mut years: BTreeMap<i32, YearTally> = BTreeMap::new();
    let mut cities: BTreeMap<String, usize> = BTreeMap::new();
    let mut points: BTreeMap<(u64, u64), PointTally> = BTreeMap::new();
    let mut keywords: BTreeMap<String, usize> = BTreeMap::new();

    for record in records {
        let ms = fields::ms_played(record);
        total_ms_played = total_ms_played.saturating_add(ms);

        let artist = fields::text(record, fields::ARTIST);
        let album = fields::text(record, fields::ALBUM);
        let track = fields::text(record, fields::TRACK);

        if let Some(artist) = artist {
            *artists.entry(artist.to_string()).or_default() += 1;
        }

        if let Some(track) = track {
            for word in track_keywords(track) {
                *keywords.entry(word).or_default() += 1;
            }

            let key = (track.to_string(), artist.map(str::to_string));
            if fields::skipped(record) {
                tally_track(&mut skipped, key.clone(), album);
            }
            if fields::picked(record) {
                tally_track(&mut picked, key, album);
            }
        }

        if let Some(ts) = fields::timestamp(record) {
            let year = ts.year();
            *devices
                .entry((year, fields::device_model(record)))
                .or_default() += 1;

            let day = days.entry(ts.date_naive()).or_default();
            day.ms_played = day.ms_played.saturating_add(ms);
            day.plays += 1;

            let year_tally = years.entry(year).or_default();
            year_tally.plays += 1;
            if let Some(artist) = artist {
                *year_tally.artists.entry(artist.to_string()).or_default() += 1;
            }
            if let Some(album) = album {
                *year_tally.albums.entry(album.to_string()).or_default() += 1;
            }
            if let Some(track) = track {
                *year_tally.tracks.entry(track.to_string()).or_default() += 1;
            }
        }

        if let Some(location) = record.location() {
            let city = location.city.as_deref().unwrap_or(UNKNOWN_CITY);
            *cities.entry(city.to_string()).or_default() += 1;

            points
                .entry((location.latitude.to_bits(), location.longitude.to_bits()))
                .or_insert_with(|| PointTally {
                    latitude: location.latitude,
                    longitude: location.longitude,
                    city: location.city.clone(),
                    country_code: location.country_code.clone(),
                    count: 0,
                })
                .count += 1;
        }
    }

    let mut device_usage: Vec<DeviceYearCount> = devices
        .into_iter()
        .map(|((year, device), count)| DeviceYearCount {
            year,
            device,
            count,
        })
        .collect();
    device_usage.sort_by(|a, b| {
        a.year
            .cmp(&b.year)
            .then_with(|| b.count.cmp(&a.count))
            .then_with(|| a.device.cmp(&b.device))
    });

    let mut biggest_days: Vec<DayTotal> = days
        .into_iter()
        .map(|(date, tally)| DayTotal {
            date,
            ms_played: tally.ms_played,
            plays: tally.plays,
        })
        .collect();
    biggest_days.sort_by(|a, b| b.ms_played.cmp(&a.ms_played).then_with(|| a.date.cmp(&b.date)));
    biggest_days.truncate(top_n);

    let biggest_year = years
        .into_iter()
        .fold(None::<(i32, YearTally)>, |best, (year, tally)| {
            if best
                .as_ref()
                .is_some_and(|(_, current)| current.plays >= tally.plays)
            {
                best
            } else {
                Some((year, tally))
            }
        })
        .map(|(year, tally)| YearHighlight {
            year,
            plays: tally.plays,
            top_artist: rank(tally.artists, 1).into_iter().next(),
            top_album: rank(tally.albums, 1).into_iter().next(),
            top_track: rank(tally.tracks, 1).into_iter().next(),
        });

    let mut map_points: Vec<MapPoint> = points
        .into_values()
        .map(|p| MapPoint {
            latitude: p.latitude,
            longitude: p.longitude,
            city: p.city,
            country_code: p.country_code,
            count: p.count,
        })
        .collect();
    map_points.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then_with(|| a.city.cmp(&b.city))
            .then_with(|| a.latitude.total_cmp(&b.latitude))
            .then_with(|| a.longitude.total_cmp(&b.longitude))
    });

    #[allow(clippy::cast_precision_loss)]
    let total_hours = total_ms_played as f64 / MS_PER_HOUR;

    log::debug!(
        "Summarized {} records: {} artists, {} cities, {} map points",
        records.len(),
        artists.len(),
        cities.len(),
        map_points.len()
    );

    ListeningSummary {
        total_records: records.len(),
        total_ms_played,
        total_hours,
        top_artists: rank(artists, top_n),
        most_skipped: rank_tracks(skipped, top_n),
        most_picked: rank_tracks(picked, top_n),
        device_usage,
        biggest_days,
        biggest_year,
        top_cities: rank(cities, top_n),
        map_points,
        top_keywords: rank(keywords, top_n),
    }
}

/// Lowercased words of a track name, keeping those longer than two
/// characters that are not [`COMMON_WORDS`].
fn track_keywords(track: &str) -> impl Iterator<Item = String> + '_ {
    track
        .split_whitespace()
        .map(str::to_lowercase)
        .filter(|word| word.chars().count() > 2 && !COMMON_WORDS.contains(&word.as_str()))
}

fn tally_track(
    tallies: &mut BTreeMap<(String, Option<String>), TrackTally>,
    key: (String, Option<String>),
    album: Option<&str>,
) {
    let tally = tallies.entry(key).or_default();
    if tally.album.is_none() {
        tally.album = album.map(str::to_string);
    }
    tally.count += 1;
}

/// Ranks counts descending, ties by name ascending.
fn rank(counts: BTreeMap<String, usize>, top_n: usize) -> Vec<RankedCount> {
    let mut ranked: Vec<RankedCount> = counts
        .into_iter()
        .map(|(name, count)| RankedCount { name, count })
        .collect();
    // Stable sort keeps the map's name order for equal counts.
    ranked.sort_by(|a, b| b.count.cmp(&a.count));
    ranked.truncate(top_n);
    ranked
}

fn rank_tracks(
    tallies: BTreeMap<(String, Option<String>), TrackTally>,
    top_n: usize,
) -> Vec<TrackCount> {
    let mut ranked: Vec<TrackCount> = tallies
        .into_iter()
        .map(|((track, artist), tally)| TrackCount {
            track,
            artist,
            album: tally.album,
            count: tally.count,
        })
        .collect();
    ranked.sort_by(|a, b| b.count.cmp(&a.count));
    ranked.truncate(top_n);
    ranked
}
