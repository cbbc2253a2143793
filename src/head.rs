// Copyright 2026 bmc::labs Gmbh. All rights reserved.
//
// Authors:
//   Florian Eich <florian@bmc-labs.com>
//   Jonas Reitemeyer <alumni@bmc-labs.com>

use super::{ld_file::region, Error, Result, TextField};
use byteorder::{ByteOrder, LittleEndian};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use getset::{CopyGetters, Getters, MutGetters};


pub(crate) const HEAD_BYTES: usize = 1762;
pub(crate) const EVENT_BYTES: usize = 1154;
pub(crate) const VENUE_BYTES: usize = 1100;

const MARKER: u32 = 0x40;

// constant words observed in device written files; readers ignore them
const STATIC_WORDS: [u16; 3] = [0x0001, 0x4240, 0x000f];
const DEVICE_FLAG: u16 = 0xadb0;
const PRO_LOGGING: u32 = 0x000c_81a4;

const DATE_FORMAT: &str = "%d/%m/%Y";
const TIME_FORMAT: &str = "%H:%M:%S";

// fixed offsets within the header region
const OFF_MARKER: usize = 0x00;
const OFF_META_PTR: usize = 0x08;
const OFF_DATA_PTR: usize = 0x0c;
const OFF_EVENT_PTR: usize = 0x24;
const OFF_STATIC_WORDS: usize = 0x40;
const OFF_SERIAL: usize = 0x46;
const OFF_DEVICE_TYPE: usize = 0x4a;
const OFF_DEVICE_VERSION: usize = 0x52;
const OFF_DEVICE_FLAG: usize = 0x54;
const OFF_CHANNEL_COUNT: usize = 0x56;
const OFF_DATE: usize = 0x5e;
const OFF_TIME: usize = 0x7e;
const OFF_DRIVER: usize = 0x9e;
const OFF_VEHICLE: usize = 0xde;
const OFF_VENUE: usize = 0x15e;
const OFF_PRO_LOGGING: usize = 0x5de;
const OFF_SHORT_COMMENT: usize = 0x624;

// fixed offsets within the event record
const OFF_EVENT_SESSION: usize = 0x40;
const OFF_EVENT_COMMENT: usize = 0x80;
const OFF_EVENT_VENUE_PTR: usize = 0x480;


/// Raw file pointers and counts exchanged between the header codec and the
/// whole file codec. Never part of the model; recomputed on every encode.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct HeadInfo {
  pub meta_ptr:      u32,
  pub data_ptr:      u32,
  pub event_ptr:     u32,
  pub channel_count: u32,
}


/// Recording level metadata of a log: who drove what, where and when, plus
/// the device identity and an optional [`Event`].
///
/// Mutable accessors exist so fields can be assigned before an encode;
/// after a decode the header is usually read only.
#[derive(Clone, Debug, PartialEq, CopyGetters, Getters, MutGetters)]
pub struct Head {
  /// Recording date as stored, `%d/%m/%Y`.
  #[getset(get = "pub", get_mut = "pub")]
  date:           TextField<16>,
  /// Recording time of day as stored, `%H:%M:%S`.
  #[getset(get = "pub", get_mut = "pub")]
  time:           TextField<16>,
  #[getset(get = "pub", get_mut = "pub")]
  driver:         TextField<64>,
  #[getset(get = "pub", get_mut = "pub")]
  vehicle:        TextField<64>,
  #[getset(get = "pub", get_mut = "pub")]
  venue:          TextField<64>,
  #[getset(get = "pub", get_mut = "pub")]
  short_comment:  TextField<64>,
  #[getset(get_copy = "pub", get_mut = "pub")]
  device_serial:  u32,
  #[getset(get = "pub", get_mut = "pub")]
  device_type:    TextField<8>,
  #[getset(get_copy = "pub", get_mut = "pub")]
  device_version: u16,
  #[getset(get = "pub", get_mut = "pub")]
  event:          Option<Event>,
}

impl Default for Head {
  fn default() -> Self {
    Self { date:           TextField::default(),
           time:           TextField::default(),
           driver:         TextField::default(),
           vehicle:        TextField::default(),
           venue:          TextField::default(),
           short_comment:  TextField::default(),
           device_serial:  0,
           device_type:    TextField::new("ADL"),
           device_version: 420,
           event:          None, }
  }
}

impl Head {
  /// Combines the date and time fields into a single timestamp. Fails if
  /// either field does not follow the stored text format.
  pub fn datetime(&self) -> Result<NaiveDateTime> {
    let date = NaiveDate::parse_from_str(self.date.as_str(), DATE_FORMAT)?;
    let time = NaiveTime::parse_from_str(self.time.as_str(), TIME_FORMAT)?;
    Ok(NaiveDateTime::new(date, time))
  }

  /// Writes `datetime` into the date and time text fields.
  pub fn set_datetime(&mut self, datetime: NaiveDateTime) {
    self.date.set(&datetime.format(DATE_FORMAT).to_string());
    self.time.set(&datetime.format(TIME_FORMAT).to_string());
  }

  pub(crate) fn read(buffer: &[u8]) -> Result<(Self, HeadInfo)> {
    let head = region(buffer, 0, HEAD_BYTES)?;

    let marker = LittleEndian::read_u32(&head[OFF_MARKER..]);
    if marker != MARKER {
      return Err(Error::MalformedHeader(format!("unknown file marker \
                                                 {:#010x}",
                                                marker)));
    }

    let info =
      HeadInfo { meta_ptr:      LittleEndian::read_u32(&head[OFF_META_PTR..]),
                 data_ptr:      LittleEndian::read_u32(&head[OFF_DATA_PTR..]),
                 event_ptr:     LittleEndian::read_u32(&head[OFF_EVENT_PTR..]),
                 channel_count:
                   LittleEndian::read_u32(&head[OFF_CHANNEL_COUNT..]), };

    let event = if info.event_ptr != 0 {
      Some(Event::read(buffer, info.event_ptr as usize)?)
    } else {
      None
    };

    let head =
      Self { date:           TextField::from_bytes(&head[OFF_DATE
                                                         ..OFF_DATE + 16]),
             time:           TextField::from_bytes(&head[OFF_TIME
                                                         ..OFF_TIME + 16]),
             driver:         TextField::from_bytes(&head[OFF_DRIVER
                                                         ..OFF_DRIVER + 64]),
             vehicle:        TextField::from_bytes(&head[OFF_VEHICLE
                                                         ..OFF_VEHICLE + 64]),
             venue:          TextField::from_bytes(&head[OFF_VENUE
                                                         ..OFF_VENUE + 64]),
             short_comment:
               TextField::from_bytes(&head[OFF_SHORT_COMMENT
                                           ..OFF_SHORT_COMMENT + 64]),
             device_serial:  LittleEndian::read_u32(&head[OFF_SERIAL..]),
             device_type:
               TextField::from_bytes(&head[OFF_DEVICE_TYPE
                                           ..OFF_DEVICE_TYPE + 8]),
             device_version:
               LittleEndian::read_u16(&head[OFF_DEVICE_VERSION..]),
             event, };

    Ok((head, info))
  }

  pub(crate) fn write(&self, out: &mut Vec<u8>, info: &HeadInfo) {
    let mut record = [0u8; HEAD_BYTES];

    LittleEndian::write_u32(&mut record[OFF_MARKER..], MARKER);
    LittleEndian::write_u32(&mut record[OFF_META_PTR..], info.meta_ptr);
    LittleEndian::write_u32(&mut record[OFF_DATA_PTR..], info.data_ptr);
    LittleEndian::write_u32(&mut record[OFF_EVENT_PTR..], info.event_ptr);
    for (index, word) in STATIC_WORDS.iter().enumerate() {
      LittleEndian::write_u16(&mut record[OFF_STATIC_WORDS + 2 * index..],
                              *word);
    }
    LittleEndian::write_u32(&mut record[OFF_SERIAL..], self.device_serial);
    record[OFF_DEVICE_TYPE..OFF_DEVICE_TYPE + 8]
      .copy_from_slice(&self.device_type.encoded());
    LittleEndian::write_u16(&mut record[OFF_DEVICE_VERSION..],
                            self.device_version);
    LittleEndian::write_u16(&mut record[OFF_DEVICE_FLAG..], DEVICE_FLAG);
    LittleEndian::write_u32(&mut record[OFF_CHANNEL_COUNT..],
                            info.channel_count);
    record[OFF_DATE..OFF_DATE + 16].copy_from_slice(&self.date.encoded());
    record[OFF_TIME..OFF_TIME + 16].copy_from_slice(&self.time.encoded());
    record[OFF_DRIVER..OFF_DRIVER + 64].copy_from_slice(&self.driver
                                                             .encoded());
    record[OFF_VEHICLE..OFF_VEHICLE + 64].copy_from_slice(&self.vehicle
                                                               .encoded());
    record[OFF_VENUE..OFF_VENUE + 64].copy_from_slice(&self.venue.encoded());
    LittleEndian::write_u32(&mut record[OFF_PRO_LOGGING..], PRO_LOGGING);
    record[OFF_SHORT_COMMENT..OFF_SHORT_COMMENT + 64]
      .copy_from_slice(&self.short_comment.encoded());

    out.extend_from_slice(&record);
  }
}


/// Session context attached to a log: event name, session label and a free
/// text comment, plus the venue it references.
#[derive(Clone, Debug, Default, PartialEq, Getters, MutGetters)]
#[getset(get = "pub", get_mut = "pub")]
pub struct Event {
  name:    TextField<64>,
  session: TextField<64>,
  comment: TextField<1024>,
  venue:   Option<Venue>,
}

impl Event {
  pub fn new(name: &str, session: &str, comment: &str) -> Self {
    Self { name:    TextField::new(name),
           session: TextField::new(session),
           comment: TextField::new(comment),
           venue:   None, }
  }

  pub(crate) fn read(buffer: &[u8], offset: usize) -> Result<Self> {
    let record = region(buffer, offset, EVENT_BYTES)?;

    let venue_ptr = LittleEndian::read_u16(&record[OFF_EVENT_VENUE_PTR..]);
    let venue = if venue_ptr != 0 {
      Some(Venue::read(buffer, venue_ptr as usize)?)
    } else {
      None
    };

    Ok(Self { name:    TextField::from_bytes(&record[..OFF_EVENT_SESSION]),
              session:
                TextField::from_bytes(&record[OFF_EVENT_SESSION
                                              ..OFF_EVENT_COMMENT]),
              comment:
                TextField::from_bytes(&record[OFF_EVENT_COMMENT
                                              ..OFF_EVENT_VENUE_PTR]),
              venue, })
  }

  /// Writes the event record. The venue pointer is always written as zero:
  /// no venue table is modeled, so encoded files are venue-less even when
  /// a decoded event carried one.
  pub(crate) fn write(&self, out: &mut Vec<u8>) {
    let mut record = [0u8; EVENT_BYTES];

    record[..OFF_EVENT_SESSION].copy_from_slice(&self.name.encoded());
    record[OFF_EVENT_SESSION..OFF_EVENT_COMMENT]
      .copy_from_slice(&self.session.encoded());
    record[OFF_EVENT_COMMENT..OFF_EVENT_VENUE_PTR]
      .copy_from_slice(&self.comment.encoded());
    LittleEndian::write_u16(&mut record[OFF_EVENT_VENUE_PTR..], 0);

    out.extend_from_slice(&record);
  }
}


/// Venue record referenced by an event. Read only; see [`Event::write`].
#[derive(Clone, Debug, Default, PartialEq, Getters)]
#[getset(get = "pub")]
pub struct Venue {
  name: TextField<64>,
}

impl Venue {
  pub fn new(name: &str) -> Self {
    Self { name: TextField::new(name) }
  }

  pub(crate) fn read(buffer: &[u8], offset: usize) -> Result<Self> {
    let record = region(buffer, offset, VENUE_BYTES)?;
    Ok(Self { name: TextField::from_bytes(&record[..64]) })
  }
}
