// Copyright 2026 bmc::labs Gmbh. All rights reserved.
//
// Authors:
//   Florian Eich <florian@bmc-labs.com>
//   Jonas Reitemeyer <alumni@bmc-labs.com>

use super::{lap, DataPoint, Error, Lap, Result, SegmentOptions};
use getset::{CopyGetters, Getters};
use lazy_static::lazy_static;
use quick_xml::{events::{BytesStart, Event},
                Reader};
use regex::Regex;
use std::{collections::HashMap, ffi::OsStr, fs, path::Path, str::FromStr};
use tracing::warn;


lazy_static! {
  // lap times come as "1:39.841" with the minutes part optional
  static ref LAP_TIME: Regex =
    Regex::new(r"^(?:(\d+):)?(\d{1,2})\.(\d{3})$").unwrap();
}


/// One beacon crossing from a lap index, time in seconds from the start of
/// the recording.
#[derive(Clone, Debug, Default, PartialEq, CopyGetters, Getters)]
pub struct Beacon {
  #[getset(get_copy = "pub")]
  time: f64,
  #[getset(get = "pub")]
  name: String,
}


/// Lap index read from an `.ldx` sidecar file as written next to the log.
///
/// The index carries the beacon crossings of the session plus a string
/// table of session details such as the fastest lap. Beacons are kept
/// sorted by time regardless of their order in the file.
#[derive(Clone, Debug, Default, PartialEq, Getters)]
#[getset(get = "pub")]
pub struct LapIndex {
  beacons: Vec<Beacon>,
  details: HashMap<String, String>,
}

impl LapIndex {
  /// Reads and parses a lap index from disk.
  pub fn load(path: &Path) -> Result<Self> {
    match path.extension().and_then(OsStr::to_str) {
      Some("ldx") => fs::read_to_string(path)?.parse(),
      _ => Err(Error::UnexpectedExtension { expected: "ldx",
                                            path:     path.display()
                                                          .to_string(), }),
    }
  }

  /// Beacon times in seconds, sorted ascending.
  pub fn boundary_times(&self) -> Vec<f64> {
    self.beacons.iter().map(Beacon::time).collect()
  }

  pub fn total_laps(&self) -> Option<usize> {
    self.details.get("Total Laps")?.trim().parse().ok()
  }

  pub fn fastest_lap(&self) -> Option<usize> {
    self.details.get("Fastest Lap")?.trim().parse().ok()
  }

  /// Fastest lap time in seconds, parsed from the session details.
  pub fn fastest_time(&self) -> Option<f64> {
    let value = self.details.get("Fastest Time")?;
    let captures = LAP_TIME.captures(value.trim())?;

    let minutes = match captures.get(1) {
      Some(minutes) => minutes.as_str().parse::<f64>().ok()?,
      None => 0.0,
    };
    let seconds: f64 = captures[2].parse().ok()?;
    let millis: f64 = captures[3].parse().ok()?;
    Some(minutes * 60.0 + seconds + millis / 1000.0)
  }

  /// Cuts `points` into laps along this index's beacon times.
  pub fn laps_over(&self,
                   points: &[DataPoint],
                   options: &SegmentOptions)
                   -> Result<Vec<Lap>> {
    lap::laps_from_boundaries(points, &self.boundary_times(), options)
  }
}

impl FromStr for LapIndex {
  type Err = Error;

  fn from_str(input: &str) -> Result<Self> {
    let mut reader = Reader::from_str(input);
    reader.config_mut().trim_text(true);

    let mut beacons = Vec::new();
    let mut details = HashMap::new();
    let mut saw_root = false;
    let mut in_beacons = false;
    let mut buf = Vec::new();

    loop {
      match reader.read_event_into(&mut buf) {
        Ok(Event::Start(ref element)) | Ok(Event::Empty(ref element)) => {
          if !saw_root {
            if element.name().as_ref() != b"LDXFile" {
              return Err(Error::MalformedIndex("missing LDXFile root"
                                               .to_string()));
            }
            saw_root = true;
          }
          match element.name().as_ref() {
            b"MarkerGroup" => {
              in_beacons = get_attribute(element, "Name").as_deref()
                           == Some("Beacons");
            }
            b"Marker" if in_beacons => {
              if let Some(beacon) = read_beacon(element) {
                beacons.push(beacon);
              }
            }
            b"String" => {
              if let (Some(id), Some(value)) =
                (get_attribute(element, "Id"),
                 get_attribute(element, "Value"))
              {
                details.insert(id, value);
              }
            }
            _ => {}
          }
        }
        Ok(Event::End(ref element)) => {
          if element.name().as_ref() == b"MarkerGroup" {
            in_beacons = false;
          }
        }
        Ok(Event::Eof) => break,
        Err(error) => return Err(error.into()),
        _ => {}
      }
      buf.clear();
    }

    if !saw_root {
      return Err(Error::MalformedIndex("missing LDXFile root".to_string()));
    }

    beacons.sort_by(|a, b| a.time.total_cmp(&b.time));
    Ok(Self { beacons, details })
  }
}

/// Beacon from a marker element. Times are stored in nanoseconds and
/// converted to seconds here.
fn read_beacon(element: &BytesStart) -> Option<Beacon> {
  let raw = get_attribute(element, "Time")?;
  let time = match raw.parse::<f64>() {
    Ok(nanoseconds) => nanoseconds / 1e9,
    Err(_) => {
      warn!(time = raw.as_str(),
            "skipping marker with non numeric time");
      return None;
    }
  };
  Some(Beacon { time,
                name: get_attribute(element, "Name").unwrap_or_default() })
}

fn get_attribute(element: &BytesStart, name: &str) -> Option<String> {
  for attribute in element.attributes().flatten() {
    if attribute.key.as_ref() == name.as_bytes() {
      return Some(String::from_utf8_lossy(&attribute.value).to_string());
    }
  }
  None
}


#[cfg(test)]
mod tests {
  use super::*;
  use pretty_assertions::assert_eq;


  const SAMPLE_LDX: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<LDXFile Locale="English_United Kingdom.1252" DefaultLocale="C" Version="1.6">
  <Layers>
    <Layer Number="0">
      <MarkerBlock>
        <MarkerGroup Name="Beacons" Index="0">
          <Marker Version="100" ClassName="BCN" Name="Manual.0" Flags="269"
                  Time="95500000000"/>
          <Marker Version="100" ClassName="BCN" Name="Manual.1" Flags="269"
                  Time="188300000000"/>
        </MarkerGroup>
      </MarkerBlock>
    </Layer>
    <Details>
      <String Id="Total Laps" Value="3"/>
      <String Id="Fastest Time" Value="1:32.800"/>
      <String Id="Fastest Lap" Value="2"/>
    </Details>
  </Layers>
</LDXFile>
"#;

  #[test]
  fn parse_test() {
    let index: LapIndex = SAMPLE_LDX.parse().unwrap();

    assert_eq!(2, index.beacons().len());
    assert_eq!(95.5, index.beacons()[0].time());
    assert_eq!("Manual.0", index.beacons()[0].name());
    assert_eq!(vec![95.5, 188.3], index.boundary_times());

    assert_eq!(Some(3), index.total_laps());
    assert_eq!(Some(2), index.fastest_lap());
    assert!((92.8 - index.fastest_time().unwrap()).abs() < 1e-9);
  }

  #[test]
  fn unsorted_markers_test() {
    let xml = r#"<LDXFile><Layers><Layer><MarkerBlock>
      <MarkerGroup Name="Beacons">
        <Marker Name="b" Time="60000000000"/>
        <Marker Name="a" Time="30000000000"/>
        <Marker Name="x" Time="warblgarbl"/>
      </MarkerGroup>
    </MarkerBlock></Layer></Layers></LDXFile>"#;
    let index: LapIndex = xml.parse().unwrap();

    assert_eq!(vec![30.0, 60.0], index.boundary_times());
    assert_eq!("a", index.beacons()[0].name());
  }

  #[test]
  fn other_marker_groups_test() {
    let xml = r#"<LDXFile>
      <MarkerGroup Name="Sections">
        <Marker Name="s1" Time="10000000000"/>
      </MarkerGroup>
      <MarkerGroup Name="Beacons">
        <Marker Name="b1" Time="45000000000"/>
      </MarkerGroup>
    </LDXFile>"#;
    let index: LapIndex = xml.parse().unwrap();

    assert_eq!(vec![45.0], index.boundary_times());
  }

  #[test]
  fn fastest_time_without_minutes_test() {
    let index =
      LapIndex { details: HashMap::from([("Fastest Time".to_string(),
                                          "45.123".to_string())]),
                 ..LapIndex::default() };
    assert!((45.123 - index.fastest_time().unwrap()).abs() < 1e-9);

    let index =
      LapIndex { details: HashMap::from([("Fastest Time".to_string(),
                                          "warblgarbl".to_string())]),
                 ..LapIndex::default() };
    assert_eq!(None, index.fastest_time());
  }

  #[test]
  fn malformed_root_test() {
    assert!(matches!("<NotAnIndex/>".parse::<LapIndex>(),
                     Err(Error::MalformedIndex(_))));
    assert!(matches!("".parse::<LapIndex>(),
                     Err(Error::MalformedIndex(_))));
  }

  #[test]
  fn laps_over_test() {
    let index: LapIndex = SAMPLE_LDX.parse().unwrap();
    let points: Vec<DataPoint> =
      (0..=2200).map(|tenth| {
                  DataPoint::from([("Time".to_string(),
                                    f64::from(tenth) * 0.1)])
                })
                .collect();

    let laps = index.laps_over(&points, &SegmentOptions::default()).unwrap();
    assert_eq!(3, laps.len());
    assert_eq!(95.5, laps[0].end_time());
    assert_eq!(188.3, laps[1].end_time());
    assert_eq!(true, laps[2].partial());
  }

  #[test]
  fn load_extension_test() {
    assert!(matches!(LapIndex::load(Path::new("./run.xml")),
                     Err(Error::UnexpectedExtension { expected: "ldx",
                                                      .. })));
  }
}
