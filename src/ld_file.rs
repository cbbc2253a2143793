// Copyright 2026 bmc::labs Gmbh. All rights reserved.
//
// Authors:
//   Florian Eich <florian@bmc-labs.com>
//   Jonas Reitemeyer <alumni@bmc-labs.com>

use super::{channel::RECORD_BYTES,
            head::{HeadInfo, EVENT_BYTES, HEAD_BYTES},
            lap::{self, TIME_CHANNELS},
            Channel,
            DataPoint,
            Error,
            Head,
            Lap,
            Result,
            SegmentOptions};
use getset::{Getters, MutGetters};
use std::{collections::HashSet, ffi::OsStr, fs, path::Path};
use tracing::{debug, warn};


/// Bounds checked access to `len` bytes at `offset`. All wire reads go
/// through here so a short buffer surfaces as `TruncatedBuffer` instead of
/// a slice panic.
pub(crate) fn region(buffer: &[u8],
                     offset: usize,
                     len: usize)
                     -> Result<&[u8]> {
  let end = offset.checked_add(len)
                  .ok_or(Error::OffsetOverflow(offset))?;
  if end > buffer.len() {
    return Err(Error::TruncatedBuffer { need: end,
                                        have: buffer.len() });
  }
  Ok(&buffer[offset..end])
}


/// An in-memory log: header plus channels in insertion order.
///
/// The wire format chains channel records through absolute file pointers;
/// in memory the directory is just this ordered `Vec`, and pointers exist
/// only inside [`from_bytes`](LdFile::from_bytes) and
/// [`to_bytes`](LdFile::to_bytes).
#[derive(Clone, Debug, Default, PartialEq, Getters, MutGetters)]
pub struct LdFile {
  #[getset(get = "pub", get_mut = "pub")]
  head:     Head,
  #[getset(get = "pub")]
  channels: Vec<Channel>,
}

impl LdFile {
  pub fn new(head: Head) -> Self {
    Self { head, channels: Vec::new() }
  }

  // CODEC ----------------------------------------------------------------- //

  /// Decodes a complete log from `buffer`.
  ///
  /// Channels are collected by following the record chain from the header;
  /// when chain order and file order disagree, the chain wins. A buffer
  /// with a zero channel pointer decodes to an empty channel collection.
  pub fn from_bytes(buffer: &[u8]) -> Result<Self> {
    let (head, info) = Head::read(buffer)?;

    let mut channels = Vec::new();
    let mut visited = HashSet::new();
    let mut offset = info.meta_ptr as usize;
    while offset != 0 {
      if !visited.insert(offset) {
        return Err(Error::MalformedHeader(format!("channel directory \
                                                   loops at offset {:#x}",
                                                  offset)));
      }
      let (channel, next_ptr) = Channel::read(buffer, offset)?;
      channels.push(channel);
      offset = next_ptr as usize;
    }

    if channels.len() != info.channel_count as usize {
      warn!(declared = info.channel_count,
            walked = channels.len(),
            "channel count field disagrees with the directory chain");
    }

    Ok(Self { head, channels })
  }

  /// Encodes the log into a fresh buffer.
  ///
  /// Layout is fixed: header, event record if present, channel record
  /// directory in insertion order, sample blocks in the same order. All
  /// offsets are computed up front, then the buffer is written linearly.
  /// Channels still carrying id 0 are numbered sequentially on the way
  /// out.
  pub fn to_bytes(&self) -> Result<Vec<u8>> {
    let event_bytes = if self.head.event().is_some() {
      EVENT_BYTES
    } else {
      0
    };
    let meta_base = HEAD_BYTES + event_bytes;
    let data_base = meta_base + self.channels.len() * RECORD_BYTES;

    let mut data_offsets = Vec::with_capacity(self.channels.len());
    let mut cursor = data_base;
    for channel in &self.channels {
      data_offsets.push(cursor);
      let block = channel.len()
                         .checked_mul(channel.datatype().size())
                         .ok_or(Error::OffsetOverflow(cursor))?;
      cursor = cursor.checked_add(block)
                     .ok_or(Error::OffsetOverflow(cursor))?;
    }
    u32::try_from(cursor).map_err(|_| Error::OffsetOverflow(cursor))?;

    let (meta_ptr, data_ptr) = if self.channels.is_empty() {
      (0, 0)
    } else {
      (meta_base as u32, data_base as u32)
    };
    let info = HeadInfo { meta_ptr,
                          data_ptr,
                          event_ptr: if event_bytes == 0 {
                            0
                          } else {
                            HEAD_BYTES as u32
                          },
                          channel_count: self.channels.len() as u32 };

    let mut out = Vec::with_capacity(cursor);
    self.head.write(&mut out, &info);
    if let Some(event) = self.head.event() {
      event.write(&mut out);
    }

    let last = self.channels.len().saturating_sub(1);
    for (index, channel) in self.channels.iter().enumerate() {
      let id = if channel.id() == 0 {
        index as u16 + 1
      } else {
        channel.id()
      };
      let prev_ptr = if index == 0 {
        0
      } else {
        (meta_base + (index - 1) * RECORD_BYTES) as u32
      };
      let next_ptr = if index == last {
        0
      } else {
        (meta_base + (index + 1) * RECORD_BYTES) as u32
      };
      channel.write_record(&mut out,
                           id,
                           prev_ptr,
                           next_ptr,
                           data_offsets[index] as u32);
    }

    for channel in &self.channels {
      channel.data().write(&mut out)?;
    }

    Ok(out)
  }

  /// Reads and decodes a log from disk.
  pub fn load(path: &Path) -> Result<Self> {
    match path.extension().and_then(OsStr::to_str) {
      Some("ld") => Self::from_bytes(&fs::read(path)?),
      _ => Err(Error::UnexpectedExtension { expected: "ld",
                                            path:     path.display()
                                                          .to_string(), }),
    }
  }

  /// Encodes the log and writes it to disk.
  pub fn write(&self, path: &Path) -> Result<()> {
    Ok(fs::write(path, self.to_bytes()?)?)
  }

  // CHANNEL FUNCTIONS ----------------------------------------------------- //

  /// Appends a channel. Channels without an id (0) get the next free one;
  /// ids brought along by the caller are kept. Returns the effective id.
  pub fn add_channel(&mut self, mut channel: Channel) -> u16 {
    if channel.id() == 0 {
      let next = self.channels
                     .iter()
                     .map(Channel::id)
                     .max()
                     .unwrap_or(0)
                     + 1;
      channel.assign_id(next);
    }
    let id = channel.id();
    self.channels.push(channel);
    id
  }

  pub fn channel_count(&self) -> usize {
    self.channels.len()
  }

  pub fn channel_names(&self) -> Vec<String> {
    self.channels
        .iter()
        .map(|channel| channel.name().as_str().to_string())
        .collect()
  }

  pub fn channel(&self, index: usize) -> Option<&Channel> {
    self.channels.get(index)
  }

  pub fn channel_idx(&self, name: &str) -> Option<usize> {
    self.channels
        .iter()
        .position(|channel| channel.name().as_str() == name)
  }

  pub fn channel_by_name(&self, name: &str) -> Option<&Channel> {
    self.channel_idx(name).and_then(|index| self.channels.get(index))
  }

  /// Builds a new log containing the named channels in the given order,
  /// ids resequenced from 1. Names without a matching channel are skipped.
  pub fn select(&self, names: &[&str]) -> Self {
    let mut log = Self::new(self.head.clone());
    for name in names {
      match self.channel_by_name(name) {
        Some(channel) => {
          let mut channel = channel.clone();
          channel.assign_id(log.channels.len() as u16 + 1);
          log.channels.push(channel);
        }
        None => debug!(channel = *name, "selection skips unknown channel"),
      }
    }
    log
  }

  // LAP FUNCTIONS --------------------------------------------------------- //

  /// Recording length in seconds, taken from the longest channel.
  pub fn duration(&self) -> f64 {
    self.channels
        .iter()
        .map(Channel::duration)
        .fold(0.0, f64::max)
  }

  /// Row-aligns all channels into data points, one per sample row of the
  /// longest channel. Every point carries a `Time` field: from a time
  /// channel when one covers every row, otherwise derived for the whole
  /// log from the highest recording frequency so the axis stays
  /// monotonic. Shorter channels simply stop contributing.
  pub fn data_points(&self) -> Vec<DataPoint> {
    let decoded: Vec<(&str, Vec<f64>)> =
      self.channels
          .iter()
          .map(|channel| (channel.name().as_str(), channel.physical()))
          .collect();
    let rows = decoded.iter()
                      .map(|(_, values)| values.len())
                      .max()
                      .unwrap_or(0);

    let time = self.channels
                   .iter()
                   .find(|channel| {
                     TIME_CHANNELS.contains(&channel.name().as_str())
                   })
                   .map(Channel::physical)
                   .filter(|values| values.len() == rows);
    let rate = f64::from(self.channels
                             .iter()
                             .map(Channel::freq)
                             .max()
                             .unwrap_or(1)
                             .max(1));

    (0..rows).map(|row| {
               let mut point = DataPoint::new();
               for (name, values) in &decoded {
                 if let Some(&value) = values.get(row) {
                   point.insert((*name).to_string(), value);
                 }
               }
               let timestamp = match &time {
                 Some(values) => values[row],
                 None => row as f64 / rate,
               };
               point.insert("Time".to_string(), timestamp);
               point
             })
             .collect()
  }

  /// Runs lap detection over the row-aligned data points.
  pub fn laps(&self, options: &SegmentOptions) -> Result<Vec<Lap>> {
    lap::segment(&self.data_points(), None, options)
  }
}


#[cfg(test)]
mod tests {
  use super::{super::{Event, Samples},
              *};
  use byteorder::{ByteOrder, LittleEndian};
  use pretty_assertions::assert_eq;


  fn put_u16(buffer: &mut [u8], offset: usize, value: u16) {
    LittleEndian::write_u16(&mut buffer[offset..], value);
  }

  fn put_u32(buffer: &mut [u8], offset: usize, value: u32) {
    LittleEndian::write_u32(&mut buffer[offset..], value);
  }

  fn put_i16(buffer: &mut [u8], offset: usize, value: i16) {
    LittleEndian::write_i16(&mut buffer[offset..], value);
  }

  fn put_text(buffer: &mut [u8], offset: usize, text: &str) {
    buffer[offset..offset + text.len()].copy_from_slice(text.as_bytes());
  }

  /// Pokes a minimal channel record into `buffer` at `offset`.
  fn put_record(buffer: &mut [u8],
                offset: usize,
                next_ptr: u32,
                data_ptr: u32,
                count: u32,
                id: u16,
                freq: u16,
                scale: i16,
                name: &str) {
    put_u32(buffer, offset + 0x04, next_ptr);
    put_u32(buffer, offset + 0x08, data_ptr);
    put_u32(buffer, offset + 0x0c, count);
    put_u16(buffer, offset + 0x10, id);
    put_u16(buffer, offset + 0x12, 0x03);
    put_u16(buffer, offset + 0x14, 2);
    put_u16(buffer, offset + 0x16, freq);
    put_i16(buffer, offset + 0x1a, 1); // multiplier
    put_i16(buffer, offset + 0x1c, scale);
    put_text(buffer, offset + 0x20, name);
  }

  fn sample_log() -> LdFile {
    let mut head = Head::default();
    head.driver_mut().set("A. Senna");
    head.vehicle_mut().set("988");
    head.venue_mut().set("Interlagos");
    head.date_mut().set("21/03/2026");
    head.time_mut().set("14:21:05");

    let mut log = LdFile::new(head);
    log.add_channel(Channel::new("Ground Speed", "GndSpd", "km/h", 4, 0, 1,
                                 10, 1,
                                 Samples::I16(vec![0, 500, 1000, 1500])));
    log.add_channel(Channel::from_samples("Time", "s", 4,
                                          Samples::F32(vec![0.0, 0.25, 0.5,
                                                            0.75])));
    log.add_channel(Channel::from_samples("Lap", "", 4,
                                          Samples::I32(vec![1, 1, 2, 2])));
    log
  }

  #[test]
  fn decode_test() {
    // header, two records, then their sample blocks
    let first = 1762;
    let second = first + 124;
    let data_first = second + 124;
    let data_second = data_first + 8;
    let mut buffer = vec![0u8; data_second + 4];

    put_u32(&mut buffer, 0x00, 0x40);
    put_u32(&mut buffer, 0x08, first as u32);
    put_u32(&mut buffer, 0x0c, data_first as u32);
    put_u32(&mut buffer, 0x56, 2);
    put_text(&mut buffer, 0x9e, "J. Stewart");

    put_record(&mut buffer, first, second as u32, data_first as u32, 4, 1,
               10, 10, "Ground Speed");
    put_record(&mut buffer, second, 0, data_second as u32, 2, 2, 1, 1,
               "Lap");
    for (index, raw) in [0i16, 500, 1000, 1500].iter().enumerate() {
      put_i16(&mut buffer, data_first + 2 * index, *raw);
    }
    put_i16(&mut buffer, data_second, 1);
    put_i16(&mut buffer, data_second + 2, 2);

    let log = LdFile::from_bytes(&buffer).unwrap();
    assert_eq!("J. Stewart", log.head().driver().as_str());
    assert_eq!(2, log.channel_count());
    assert_eq!(vec!["Ground Speed".to_string(), "Lap".to_string()],
               log.channel_names());

    let speed = log.channel_by_name("Ground Speed").unwrap();
    assert_eq!(1, speed.id());
    assert_eq!(10, speed.freq());
    assert_eq!(vec![0.0, 50.0, 100.0, 150.0], speed.physical());

    let lap = log.channel(1).unwrap();
    assert_eq!(vec![1.0, 2.0], lap.physical());
    // the slow lap channel covers two full seconds
    assert_eq!(2.0, log.duration());
  }

  #[test]
  fn pointer_order_wins_test() {
    // two records in file order A, B; the chain visits B first
    let first = 1762;
    let second = first + 124;
    let data = second + 124;
    let mut buffer = vec![0u8; data + 4];

    put_u32(&mut buffer, 0x00, 0x40);
    put_u32(&mut buffer, 0x08, second as u32);
    put_u32(&mut buffer, 0x56, 2);
    put_record(&mut buffer, first, 0, data as u32, 1, 1, 10, 1, "A");
    put_record(&mut buffer, second, first as u32, data as u32, 1, 2, 10, 1,
               "B");

    let log = LdFile::from_bytes(&buffer).unwrap();
    assert_eq!(vec!["B".to_string(), "A".to_string()], log.channel_names());
  }

  #[test]
  fn chain_loop_test() {
    let first = 1762;
    let mut buffer = vec![0u8; first + 124];
    put_u32(&mut buffer, 0x00, 0x40);
    put_u32(&mut buffer, 0x08, first as u32);
    // record points back at itself
    put_record(&mut buffer, first, first as u32, 0, 0, 1, 10, 1, "A");

    assert!(matches!(LdFile::from_bytes(&buffer),
                     Err(Error::MalformedHeader(_))));
  }

  #[test]
  fn zero_channels_test() {
    let mut buffer = vec![0u8; 1762];
    put_u32(&mut buffer, 0x00, 0x40);

    let log = LdFile::from_bytes(&buffer).unwrap();
    assert_eq!(0, log.channel_count());
    assert_eq!(true, log.channels().is_empty());
  }

  #[test]
  fn roundtrip_test() {
    let mut log = sample_log();
    *log.head_mut().event_mut() =
      Some(Event::new("Winter Series", "Race 2", "wet"));

    let buffer = log.to_bytes().unwrap();
    // header + event + 3 records + 8 + 16 + 16 bytes of samples
    assert_eq!(1762 + 1154 + 3 * 124 + 40, buffer.len());

    let decoded = LdFile::from_bytes(&buffer).unwrap();
    assert_eq!(log, decoded);
    assert_eq!(vec!["Ground Speed".to_string(),
                    "Time".to_string(),
                    "Lap".to_string()],
               decoded.channel_names());
    assert_eq!(1, decoded.channel(0).unwrap().id());
    assert_eq!(3, decoded.channel(2).unwrap().id());
  }

  #[test]
  fn truncated_roundtrip_test() {
    let log = sample_log();
    let buffer = log.to_bytes().unwrap();

    // cut mid sample block
    assert!(matches!(LdFile::from_bytes(&buffer[..buffer.len() - 2]),
                     Err(Error::TruncatedBuffer { .. })));
    // cut mid directory
    assert!(matches!(LdFile::from_bytes(&buffer[..1800]),
                     Err(Error::TruncatedBuffer { .. })));
  }

  #[test]
  fn select_test() {
    let log = sample_log();
    let subset = log.select(&["Lap", "Ground Speed", "warblgarbl"]);

    assert_eq!(vec!["Lap".to_string(), "Ground Speed".to_string()],
               subset.channel_names());
    assert_eq!(1, subset.channel(0).unwrap().id());
    assert_eq!(2, subset.channel(1).unwrap().id());
    assert_eq!(log.head(), subset.head());
  }

  #[test]
  fn data_points_test() {
    let mut log = sample_log();
    // a shorter channel stops contributing after its last sample
    log.add_channel(Channel::from_samples("pBrakeF", "bar", 4,
                                          Samples::I16(vec![4, 8])));

    let points = log.data_points();
    assert_eq!(4, points.len());
    assert_eq!(0.5, points[2]["Time"]);
    assert_eq!(100.0, points[2]["Ground Speed"]);
    assert_eq!(true, points[0].contains_key("pBrakeF"));
    assert_eq!(false, points[2].contains_key("pBrakeF"));
  }

  #[test]
  fn mixed_rate_time_axis_test() {
    let mut log = LdFile::new(Head::default());
    let slow: Vec<f32> = (0..10).map(|index| index as f32 * 0.2).collect();
    log.add_channel(Channel::from_samples("Time", "s", 5,
                                          Samples::F32(slow)));
    log.add_channel(Channel::from_samples("fEngRpm", "rpm", 10,
                                          Samples::I32((0..20).collect())));

    // the 5 Hz time channel covers only half the rows, the whole axis
    // derives from the 10 Hz rate
    let points = log.data_points();
    assert_eq!(20, points.len());
    let times: Vec<f64> = points.iter().map(|point| point["Time"]).collect();
    assert_eq!(0.5, times[5]);
    assert_eq!(1.0, times[10]);
    assert_eq!(true, times.windows(2).all(|pair| pair[0] < pair[1]));
  }

  #[test]
  fn laps_test() {
    let mut head = Head::default();
    head.driver_mut().set("T. Brooks");
    let mut log = LdFile::new(head);
    let times: Vec<f32> = (0..300).map(|index| index as f32 * 0.1).collect();
    let marker: Vec<i16> =
      times.iter().map(|&t| if t < 12.0 { 1 } else { 2 }).collect();
    log.add_channel(Channel::from_samples("Time", "s",
                                          10,
                                          Samples::F32(times)));
    log.add_channel(Channel::from_samples("Lap", "", 10,
                                          Samples::I16(marker)));

    let laps = log.laps(&SegmentOptions::default()).unwrap();
    assert_eq!(2, laps.len());
    assert_eq!(1, laps[0].number());
    assert_eq!(false, laps[0].partial());
    assert_eq!(true, laps[1].partial());
  }

  #[test]
  fn load_extension_test() {
    assert!(matches!(LdFile::load(Path::new("./run.xrk")),
                     Err(Error::UnexpectedExtension { expected: "ld",
                                                      .. })));
  }

  #[test]
  fn region_test() {
    let buffer = [0u8; 8];
    assert_eq!(4, region(&buffer, 2, 4).unwrap().len());
    assert!(matches!(region(&buffer, 6, 4),
                     Err(Error::TruncatedBuffer { need: 10, have: 8 })));
    assert!(matches!(region(&buffer, usize::MAX, 2),
                     Err(Error::OffsetOverflow(_))));
  }
}
