// Copyright 2026 bmc::labs Gmbh. All rights reserved.
//
// Authors:
//   Florian Eich <florian@bmc-labs.com>
//   Jonas Reitemeyer <alumni@bmc-labs.com>

use super::{lap::{self, TIME_CHANNELS},
            DataPoint,
            Error,
            Lap,
            Result,
            SegmentOptions};
use getset::Getters;
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, ffi::OsStr, fs, path::Path, str::FromStr};
use tracing::{debug, warn};


lazy_static! {
  /// Export metadata keys mapped onto the canonical names used by the
  /// rest of the crate. The original key is kept alongside its alias.
  static ref METADATA_ALIASES: HashMap<&'static str, &'static str> =
    HashMap::from([("Venue", "track"),
                   ("Vehicle", "car"),
                   ("Driver", "driver"),
                   ("Log Date", "date"),
                   ("Log Time", "time"),
                   ("Duration", "duration")]);
}


/// A recording ingested from delimited text, for example a MoTeC i2 CSV
/// export: preamble metadata, the channel table with units and the laps
/// cut from it.
///
/// Rows are recognized by content rather than position. Everything before
/// the header row is treated as metadata, the header is the first row
/// opening with a known time channel name, and an immediately following
/// row without a numeric time cell is taken as the units row.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize, Getters)]
#[getset(get = "pub")]
pub struct TelemetryDataset {
  metadata:    HashMap<String, String>,
  channels:    Vec<String>,
  units:       Vec<String>,
  data_points: Vec<DataPoint>,
  laps:        Vec<Lap>,
}

impl TelemetryDataset {
  /// Parses delimited text with explicit lap detection options.
  ///
  /// Parsing is lenient below the row level: a cell which does not parse
  /// as a number only loses that cell, while a row without a parsable
  /// time value is dropped whole. A recording without any lap signal
  /// keeps its data and simply has no laps.
  pub fn parse_with(input: &str, options: &SegmentOptions) -> Result<Self> {
    let mut metadata: HashMap<String, String> = HashMap::new();
    let mut channels: Vec<String> = Vec::new();
    let mut units: Vec<String> = Vec::new();
    let mut data_points: Vec<DataPoint> = Vec::new();

    let mut saw_content = false;
    let mut in_data = false;
    let mut units_candidate = false;

    for (index, line) in input.lines().enumerate() {
      if line.trim().is_empty() {
        continue;
      }
      saw_content = true;
      let cells = split_row(line);

      if !in_data {
        if TIME_CHANNELS.contains(&cells[0].as_str()) {
          channels = cells;
          in_data = true;
          units_candidate = true;
        } else if cells.len() <= 2 {
          let key = cells[0].clone();
          if key.is_empty() {
            continue;
          }
          let value = cells.get(1).cloned().unwrap_or_default();
          if let Some(&canonical) = METADATA_ALIASES.get(key.as_str()) {
            metadata.insert(canonical.to_string(), value.clone());
          }
          metadata.insert(key, value);
        } else {
          debug!(line = index + 1, "skipping unrecognized preamble row");
        }
        continue;
      }

      let time_cell = cells.first().map(String::as_str).unwrap_or("");
      if time_cell.parse::<f64>().is_err() {
        if units_candidate {
          units = cells;
          units.resize(channels.len(), String::new());
        } else {
          warn!(line = index + 1,
                "dropping row without a parsable time value");
        }
        units_candidate = false;
        continue;
      }
      units_candidate = false;

      let mut point = DataPoint::new();
      for (column, cell) in cells.iter().enumerate() {
        if cell.is_empty() {
          continue;
        }
        let name = match channels.get(column) {
          Some(name) => name,
          None => {
            debug!(line = index + 1, column, "cell beyond the header");
            continue;
          }
        };
        match cell.parse::<f64>() {
          Ok(value) => {
            point.insert(name.clone(), value);
          }
          Err(_) => debug!(line = index + 1,
                           channel = name.as_str(),
                           "skipping non numeric cell"),
        }
      }
      data_points.push(point);
    }

    if !saw_content {
      return Err(Error::EmptyInput);
    }
    if !in_data {
      return Err(Error::MissingRequiredColumn("Time".to_string()));
    }
    if data_points.is_empty() {
      return Err(Error::EmptyInput);
    }

    let laps = match lap::segment(&data_points, Some(&metadata), options) {
      Ok(laps) => laps,
      Err(Error::NoLapsDetected) => {
        warn!("no lap signal in the recording, laps left empty");
        Vec::new()
      }
      Err(error) => return Err(error),
    };

    Ok(Self { metadata,
              channels,
              units,
              data_points,
              laps })
  }

  /// Reads and parses a recording from disk.
  pub fn load(path: &Path) -> Result<Self> {
    match path.extension().and_then(OsStr::to_str) {
      Some("csv") => fs::read_to_string(path)?.parse(),
      _ => Err(Error::UnexpectedExtension { expected: "csv",
                                            path:     path.display()
                                                          .to_string(), }),
    }
  }

  /// Values of the named channel across the whole recording, skipping
  /// points which do not carry it.
  pub fn values(&self, name: &str) -> Vec<f64> {
    self.data_points
        .iter()
        .filter_map(|point| point.get(name).copied())
        .collect()
  }

  /// Unit of the named channel, if the export carried a units row.
  pub fn unit(&self, name: &str) -> Option<&str> {
    self.channels
        .iter()
        .position(|channel| channel == name)
        .and_then(|index| self.units.get(index))
        .map(String::as_str)
  }
}

impl FromStr for TelemetryDataset {
  type Err = Error;

  fn from_str(input: &str) -> Result<Self> {
    Self::parse_with(input, &SegmentOptions::default())
  }
}


/// Splits one delimited row into trimmed cells. Cells may be quoted to
/// carry the delimiter, a doubled quote inside a quoted cell is a literal
/// quote.
fn split_row(line: &str) -> Vec<String> {
  let mut cells = Vec::new();
  let mut cell = String::new();
  let mut quoted = false;
  let mut chars = line.chars().peekable();

  while let Some(character) = chars.next() {
    match character {
      '"' if quoted => {
        if chars.peek() == Some(&'"') {
          chars.next();
          cell.push('"');
        } else {
          quoted = false;
        }
      }
      '"' => quoted = true,
      ',' if !quoted => {
        cells.push(cell.trim().to_string());
        cell.clear();
      }
      _ => cell.push(character),
    }
  }
  cells.push(cell.trim().to_string());

  cells
}
