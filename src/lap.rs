// Copyright 2026 bmc::labs Gmbh. All rights reserved.
//
// Authors:
//   Florian Eich <florian@bmc-labs.com>
//   Jonas Reitemeyer <alumni@bmc-labs.com>

use super::{Error, Result};
use getset::{CopyGetters, Getters};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};


/// One row of synchronized channel values keyed by channel name.
pub type DataPoint = HashMap<String, f64>;

/// Channel names recognized as the session time axis, in lookup order.
pub const TIME_CHANNELS: [&str; 5] =
  ["Time", "TIME", "time", "Session Time", "TimeOfDay"];

/// Channel names recognized as lap markers, in lookup order.
pub const LAP_CHANNELS: [&str; 5] =
  ["LAP_BEACON", "Lap", "Lap Number", "LapNumber", "LAPS"];

/// Channel names recognized as lap distance, in lookup order.
pub const DISTANCE_CHANNELS: [&str; 5] =
  ["Distance", "LAP_DISTANCE", "Lap Distance", "Track Distance", "distance"];

/// Metadata key carrying beacon times as whitespace separated seconds.
pub const BEACON_METADATA_KEY: &str = "Beacon Markers";

/// Laps shorter than this many seconds merge into their predecessor.
pub const DEFAULT_MIN_LAP_TIME: f64 = 10.0;


/// Knobs for lap detection. `marker_channel` overrides the built in
/// candidate list; boundaries closer than `min_lap_time` to their
/// predecessor are treated as bounce and merged away.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct SegmentOptions {
  pub min_lap_time:   f64,
  pub marker_channel: Option<String>,
}

impl Default for SegmentOptions {
  fn default() -> Self {
    Self { min_lap_time:   DEFAULT_MIN_LAP_TIME,
           marker_channel: None, }
  }
}


/// Boundary times and derived timing of one lap within a recording.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize, CopyGetters)]
#[getset(get_copy = "pub")]
pub struct LapInfo {
  number:     usize,
  start_time: f64,
  end_time:   f64,
  lap_time:   f64,
  partial:    bool,
}

impl LapInfo {
  pub fn new(number: usize,
             start_time: f64,
             end_time: f64,
             partial: bool)
             -> Self {
    Self { number,
           start_time,
           end_time,
           lap_time: end_time - start_time,
           partial }
  }
}


/// One lap cut from a recording: its timing plus the data points falling
/// within its bounds. A `partial` lap ends with the recording instead of a
/// detected boundary.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize, CopyGetters,
         Getters)]
pub struct Lap {
  #[getset(get_copy = "pub")]
  number:      usize,
  #[getset(get_copy = "pub")]
  start_time:  f64,
  #[getset(get_copy = "pub")]
  end_time:    f64,
  #[getset(get_copy = "pub")]
  lap_time:    f64,
  #[getset(get_copy = "pub")]
  partial:     bool,
  #[getset(get = "pub")]
  data_points: Vec<DataPoint>,
}

impl Lap {
  pub fn new(info: LapInfo, data_points: Vec<DataPoint>) -> Self {
    Self { number: info.number(),
           start_time: info.start_time(),
           end_time: info.end_time(),
           lap_time: info.lap_time(),
           partial: info.partial(),
           data_points }
  }

  pub fn info(&self) -> LapInfo {
    LapInfo::new(self.number, self.start_time, self.end_time, self.partial)
  }

  /// Values of the named channel across this lap, skipping points which do
  /// not carry it.
  pub fn values(&self, name: &str) -> Vec<f64> {
    self.data_points
        .iter()
        .filter_map(|point| point.get(name).copied())
        .collect()
  }

  pub fn len(&self) -> usize {
    self.data_points.len()
  }

  pub fn is_empty(&self) -> bool {
    self.data_points.is_empty()
  }
}


/// Cuts a recording into laps.
///
/// Boundary sources are tried in order until one yields at least one
/// boundary: changes of a lap marker channel, beacon times from the
/// metadata, then wraps of a lap distance channel. The recording start is
/// always the first lap's start; a stretch left over after the last
/// boundary becomes a trailing partial lap.
pub fn segment(points: &[DataPoint],
               metadata: Option<&HashMap<String, String>>,
               options: &SegmentOptions)
               -> Result<Vec<Lap>> {
  if points.is_empty() {
    return Err(Error::NoLapsDetected);
  }
  let time_key =
    time_channel(points).ok_or_else(|| {
                          Error::MissingRequiredColumn("Time".to_string())
                        })?;
  let times = series(points, time_key);

  let boundaries = marker_boundaries(points, &times, options)
    .or_else(|| beacon_boundaries(metadata))
    .or_else(|| distance_boundaries(points, &times))
    .ok_or(Error::NoLapsDetected)?;

  collect_laps(points, &times, &boundaries, options)
}

/// Cuts a recording into laps along boundary times known up front, for
/// example from a lap index file next to the log.
pub fn laps_from_boundaries(points: &[DataPoint],
                            boundaries: &[f64],
                            options: &SegmentOptions)
                            -> Result<Vec<Lap>> {
  if points.is_empty() || boundaries.is_empty() {
    return Err(Error::NoLapsDetected);
  }
  let time_key =
    time_channel(points).ok_or_else(|| {
                          Error::MissingRequiredColumn("Time".to_string())
                        })?;
  let times = series(points, time_key);

  collect_laps(points, &times, boundaries, options)
}

/// First known time channel name carried by any point.
fn time_channel(points: &[DataPoint]) -> Option<&'static str> {
  TIME_CHANNELS.iter().copied().find(|name| carried(points, name))
}

/// Whether any point of the recording carries the named channel. Ingestion
/// omits empty cells, so a channel may be absent from the first points.
fn carried(points: &[DataPoint], name: &str) -> bool {
  points.iter().any(|point| point.contains_key(name))
}

/// Column as a dense series, gaps carried forward from the last value and
/// the leading gap backfilled from the first one.
fn series(points: &[DataPoint], key: &str) -> Vec<f64> {
  let mut value = points.iter()
                        .find_map(|point| point.get(key).copied())
                        .unwrap_or(0.0);
  points.iter()
        .map(|point| {
          if let Some(&sample) = point.get(key) {
            value = sample;
          }
          value
        })
        .collect()
}

fn marker_boundaries(points: &[DataPoint],
                     times: &[f64],
                     options: &SegmentOptions)
                     -> Option<Vec<f64>> {
  let channel = match &options.marker_channel {
    Some(name) => name.as_str(),
    None => {
      LAP_CHANNELS.iter().copied().find(|name| carried(points, name))?
    }
  };
  if !carried(points, channel) {
    warn!(channel, "configured lap marker channel is not in the data");
    return None;
  }

  let values = series(points, channel);
  let boundaries: Vec<f64> =
    (1..values.len()).filter(|&index| values[index] != values[index - 1])
                     .map(|index| times[index])
                     .collect();
  if boundaries.is_empty() {
    None
  } else {
    Some(boundaries)
  }
}

fn beacon_boundaries(metadata: Option<&HashMap<String, String>>)
                     -> Option<Vec<f64>> {
  let markers = metadata?.get(BEACON_METADATA_KEY)?;
  let boundaries: Vec<f64> =
    markers.split_whitespace()
           .filter_map(|token| match token.parse() {
             Ok(time) => Some(time),
             Err(_) => {
               debug!(token, "skipping non numeric beacon marker");
               None
             }
           })
           .collect();
  if boundaries.is_empty() {
    None
  } else {
    Some(boundaries)
  }
}

fn distance_boundaries(points: &[DataPoint],
                       times: &[f64])
                       -> Option<Vec<f64>> {
  let channel =
    DISTANCE_CHANNELS.iter().copied().find(|name| carried(points, name))?;
  let values = series(points, channel);

  // a genuine wrap drops by more than half of the distance covered so
  // far, anything smaller is sensor noise
  let mut rolling = values[0];
  let mut boundaries = Vec::new();
  for index in 1..values.len() {
    rolling = rolling.max(values[index - 1]);
    if values[index] < values[index - 1]
       && values[index - 1] - values[index] > 0.5 * rolling
    {
      boundaries.push(times[index]);
    }
  }
  if boundaries.is_empty() {
    None
  } else {
    Some(boundaries)
  }
}

fn collect_laps(points: &[DataPoint],
                times: &[f64],
                boundaries: &[f64],
                options: &SegmentOptions)
                -> Result<Vec<Lap>> {
  let end = if let Some(&end) = times.last() {
    end
  } else {
    return Err(Error::NoLapsDetected);
  };

  let mut sorted = boundaries.to_vec();
  sorted.sort_by(f64::total_cmp);

  // the recording start always opens the first lap
  let mut kept = vec![times[0]];
  for boundary in sorted {
    if boundary <= times[0] || boundary > end {
      debug!(boundary, "lap boundary outside the recording");
      continue;
    }
    if boundary - kept[kept.len() - 1] < options.min_lap_time {
      debug!(boundary, "lap boundary within minimum lap time, merging");
      continue;
    }
    kept.push(boundary);
  }

  let mut segments: Vec<(f64, f64, bool)> =
    kept.windows(2)
        .map(|window| (window[0], window[1], false))
        .collect();
  let last = kept[kept.len() - 1];
  if end > last {
    segments.push((last, end, true));
  }
  if segments.is_empty() {
    return Err(Error::NoLapsDetected);
  }

  let count = segments.len();
  Ok(segments.into_iter()
             .enumerate()
             .map(|(index, (start, stop, partial))| {
               let bounded = index + 1 < count;
               let members =
                 points.iter()
                       .zip(times)
                       .filter(|&(_, &time)| {
                         time >= start
                         && if bounded { time < stop } else { time <= stop }
                       })
                       .map(|(point, _)| point.clone())
                       .collect();
               Lap::new(LapInfo::new(index + 1, start, stop, partial),
                        members)
             })
             .collect())
}
