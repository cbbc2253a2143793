// Copyright 2026 bmc::labs Gmbh. All rights reserved.
//
// Authors:
//   Florian Eich <florian@bmc-labs.com>
//   Jonas Reitemeyer <alumni@bmc-labs.com>

use super::{ld_file::region, Error, Result, TextField};
use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use getset::{CopyGetters, Getters, MutGetters};
use half::f16;


pub(crate) const RECORD_BYTES: usize = 124;

// wire codes of the datatype families
const FLOAT_FAMILY: u16 = 0x07;
const INT_FAMILIES: [u16; 3] = [0x00, 0x03, 0x05];

// fixed offsets within a channel record
const OFF_PREV_PTR: usize = 0x00;
const OFF_NEXT_PTR: usize = 0x04;
const OFF_DATA_PTR: usize = 0x08;
const OFF_COUNT: usize = 0x0c;
const OFF_ID: usize = 0x10;
const OFF_DATATYPE: usize = 0x12;
const OFF_DATASIZE: usize = 0x14;
const OFF_FREQ: usize = 0x16;
const OFF_SHIFT: usize = 0x18;
const OFF_MULTIPLIER: usize = 0x1a;
const OFF_SCALE: usize = 0x1c;
const OFF_DEC_PLACES: usize = 0x1e;
const OFF_NAME: usize = 0x20;
const OFF_SHORT_NAME: usize = 0x40;
const OFF_UNIT: usize = 0x48;


/// Storage datatype of a channel's samples. The wire format tags each
/// channel with a family code and a byte width; only these four
/// combinations are meaningful.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Datatype {
  I16,
  I32,
  F16,
  F32,
}

impl Datatype {
  pub fn from_code(datatype: u16, datasize: u16) -> Result<Self> {
    match (datatype, datasize) {
      (FLOAT_FAMILY, 2) => Ok(Self::F16),
      (FLOAT_FAMILY, 4) => Ok(Self::F32),
      (code, 2) if INT_FAMILIES.contains(&code) => Ok(Self::I16),
      (code, 4) if INT_FAMILIES.contains(&code) => Ok(Self::I32),
      (datatype, datasize) => {
        Err(Error::UnsupportedDatatype { datatype, datasize })
      }
    }
  }

  /// Family code written to the wire.
  pub fn code(&self) -> u16 {
    match self {
      Self::I16 => 0x03,
      Self::I32 => 0x05,
      Self::F16 | Self::F32 => FLOAT_FAMILY,
    }
  }

  /// Width of one sample in bytes.
  pub fn size(&self) -> usize {
    match self {
      Self::I16 | Self::F16 => 2,
      Self::I32 | Self::F32 => 4,
    }
  }
}


/// Raw samples of a channel, stored exactly as on the wire so that encode
/// reproduces them bit for bit. The variant doubles as the datatype tag.
#[derive(Clone, Debug, PartialEq)]
pub enum Samples {
  I16(Vec<i16>),
  I32(Vec<i32>),
  F16(Vec<f16>),
  F32(Vec<f32>),
}

impl Default for Samples {
  fn default() -> Self {
    Self::F32(Vec::new())
  }
}

impl Samples {
  pub fn datatype(&self) -> Datatype {
    match self {
      Self::I16(_) => Datatype::I16,
      Self::I32(_) => Datatype::I32,
      Self::F16(_) => Datatype::F16,
      Self::F32(_) => Datatype::F32,
    }
  }

  pub fn len(&self) -> usize {
    match self {
      Self::I16(values) => values.len(),
      Self::I32(values) => values.len(),
      Self::F16(values) => values.len(),
      Self::F32(values) => values.len(),
    }
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Raw values widened to f64, before the channel transform.
  pub fn as_f64(&self) -> Vec<f64> {
    match self {
      Self::I16(values) => values.iter().map(|&raw| f64::from(raw)).collect(),
      Self::I32(values) => values.iter().map(|&raw| f64::from(raw)).collect(),
      Self::F16(values) => values.iter().map(|&raw| raw.to_f64()).collect(),
      Self::F32(values) => values.iter().map(|&raw| f64::from(raw)).collect(),
    }
  }

  pub(crate) fn read(buffer: &[u8],
                     offset: usize,
                     count: usize,
                     datatype: Datatype)
                     -> Result<Self> {
    let bytes = count.checked_mul(datatype.size())
                     .ok_or(Error::OffsetOverflow(count))?;
    let block = region(buffer, offset, bytes)?;

    Ok(match datatype {
      Datatype::I16 => Self::I16(block.chunks_exact(2)
                                      .map(LittleEndian::read_i16)
                                      .collect()),
      Datatype::I32 => Self::I32(block.chunks_exact(4)
                                      .map(LittleEndian::read_i32)
                                      .collect()),
      Datatype::F16 => {
        Self::F16(block.chunks_exact(2)
                       .map(|chunk| {
                         f16::from_bits(LittleEndian::read_u16(chunk))
                       })
                       .collect())
      }
      Datatype::F32 => Self::F32(block.chunks_exact(4)
                                      .map(LittleEndian::read_f32)
                                      .collect()),
    })
  }

  pub(crate) fn write(&self, out: &mut Vec<u8>) -> Result<()> {
    match self {
      Self::I16(values) => {
        values.iter()
              .try_for_each(|&value| out.write_i16::<LittleEndian>(value))?
      }
      Self::I32(values) => {
        values.iter()
              .try_for_each(|&value| out.write_i32::<LittleEndian>(value))?
      }
      Self::F16(values) => {
        values.iter().try_for_each(|&value| {
                       out.write_u16::<LittleEndian>(value.to_bits())
                     })?
      }
      Self::F32(values) => {
        values.iter()
              .try_for_each(|&value| out.write_f32::<LittleEndian>(value))?
      }
    }
    Ok(())
  }
}


/// One measured signal across the recording: metadata, the linear decode
/// transform and the owned raw samples.
///
/// `len(raw) == freq * duration` is the expected relationship but is not
/// enforced; the record's sample count is authoritative. Physical values
/// are `(raw - shift) * multiplier / scale`; `dec_places` is display
/// metadata and does not enter the transform.
#[derive(Clone, Debug, Default, PartialEq, CopyGetters, Getters, MutGetters)]
pub struct Channel {
  /// Identifier unique within a log, assigned sequentially on insertion.
  #[getset(get_copy = "pub")]
  id:         u16,
  #[getset(get = "pub", get_mut = "pub")]
  name:       TextField<32>,
  #[getset(get = "pub", get_mut = "pub")]
  short_name: TextField<8>,
  #[getset(get = "pub", get_mut = "pub")]
  unit:       TextField<12>,
  #[getset(get_copy = "pub")]
  freq:       u16,
  #[getset(get_copy = "pub")]
  shift:      i16,
  #[getset(get_copy = "pub")]
  multiplier: i16,
  #[getset(get_copy = "pub")]
  scale:      i16,
  #[getset(get_copy = "pub")]
  dec_places: i16,
  #[getset(get = "pub")]
  data:       Samples,
}

impl Channel {
  pub fn new(name: &str,
             short_name: &str,
             unit: &str,
             freq: u16,
             shift: i16,
             multiplier: i16,
             scale: i16,
             dec_places: i16,
             data: Samples)
             -> Self {
    Self { id: 0,
           name: TextField::new(name),
           short_name: TextField::new(short_name),
           unit: TextField::new(unit),
           freq,
           shift,
           multiplier,
           scale,
           dec_places,
           data }
  }

  /// Builds a channel with the identity transform, for synthesized logs.
  /// The short name mirrors the full name and is truncated on encode.
  pub fn from_samples(name: &str,
                      unit: &str,
                      freq: u16,
                      data: Samples)
                      -> Self {
    Self::new(name, name, unit, freq, 0, 1, 1, 0, data)
  }

  pub fn datatype(&self) -> Datatype {
    self.data.datatype()
  }

  pub fn len(&self) -> usize {
    self.data.len()
  }

  pub fn is_empty(&self) -> bool {
    self.data.is_empty()
  }

  /// Recording length covered by this channel in seconds.
  pub fn duration(&self) -> f64 {
    if self.freq == 0 {
      return 0.0;
    }
    self.len() as f64 / f64::from(self.freq)
  }

  /// Sample timestamps derived from the recording frequency.
  pub fn timestamps(&self) -> Vec<f64> {
    let rate = f64::from(self.freq.max(1));
    (0..self.len()).map(|index| index as f64 / rate).collect()
  }

  /// Samples after the linear transform, in physical units.
  pub fn physical(&self) -> Vec<f64> {
    let (shift, multiplier, scale) = (f64::from(self.shift),
                                      f64::from(self.multiplier),
                                      f64::from(self.scale));
    self.data
        .as_f64()
        .into_iter()
        .map(|raw| (raw - shift) * multiplier / scale)
        .collect()
  }

  pub(crate) fn assign_id(&mut self, id: u16) {
    self.id = id;
  }

  pub(crate) fn read(buffer: &[u8], offset: usize) -> Result<(Self, u32)> {
    let record = region(buffer, offset, RECORD_BYTES)?;

    let next_ptr = LittleEndian::read_u32(&record[OFF_NEXT_PTR..]);
    let data_ptr = LittleEndian::read_u32(&record[OFF_DATA_PTR..]);
    let count = LittleEndian::read_u32(&record[OFF_COUNT..]);
    let datatype =
      Datatype::from_code(LittleEndian::read_u16(&record[OFF_DATATYPE..]),
                          LittleEndian::read_u16(&record[OFF_DATASIZE..]))?;
    let data =
      Samples::read(buffer, data_ptr as usize, count as usize, datatype)?;

    let channel =
      Self { id: LittleEndian::read_u16(&record[OFF_ID..]),
             name: TextField::from_bytes(&record[OFF_NAME..OFF_SHORT_NAME]),
             short_name:
               TextField::from_bytes(&record[OFF_SHORT_NAME..OFF_UNIT]),
             unit: TextField::from_bytes(&record[OFF_UNIT..OFF_UNIT + 12]),
             freq: LittleEndian::read_u16(&record[OFF_FREQ..]),
             shift: LittleEndian::read_i16(&record[OFF_SHIFT..]),
             multiplier: LittleEndian::read_i16(&record[OFF_MULTIPLIER..]),
             scale: LittleEndian::read_i16(&record[OFF_SCALE..]),
             dec_places: LittleEndian::read_i16(&record[OFF_DEC_PLACES..]),
             data };

    Ok((channel, next_ptr))
  }

  pub(crate) fn write_record(&self,
                             out: &mut Vec<u8>,
                             id: u16,
                             prev_ptr: u32,
                             next_ptr: u32,
                             data_ptr: u32) {
    let mut record = [0u8; RECORD_BYTES];

    LittleEndian::write_u32(&mut record[OFF_PREV_PTR..], prev_ptr);
    LittleEndian::write_u32(&mut record[OFF_NEXT_PTR..], next_ptr);
    LittleEndian::write_u32(&mut record[OFF_DATA_PTR..], data_ptr);
    LittleEndian::write_u32(&mut record[OFF_COUNT..], self.len() as u32);
    LittleEndian::write_u16(&mut record[OFF_ID..], id);
    LittleEndian::write_u16(&mut record[OFF_DATATYPE..],
                            self.datatype().code());
    LittleEndian::write_u16(&mut record[OFF_DATASIZE..],
                            self.datatype().size() as u16);
    LittleEndian::write_u16(&mut record[OFF_FREQ..], self.freq);
    LittleEndian::write_i16(&mut record[OFF_SHIFT..], self.shift);
    LittleEndian::write_i16(&mut record[OFF_MULTIPLIER..], self.multiplier);
    LittleEndian::write_i16(&mut record[OFF_SCALE..], self.scale);
    LittleEndian::write_i16(&mut record[OFF_DEC_PLACES..], self.dec_places);
    record[OFF_NAME..OFF_SHORT_NAME].copy_from_slice(&self.name.encoded());
    record[OFF_SHORT_NAME..OFF_UNIT].copy_from_slice(&self.short_name
                                                          .encoded());
    record[OFF_UNIT..OFF_UNIT + 12].copy_from_slice(&self.unit.encoded());

    out.extend_from_slice(&record);
  }
}
