// Copyright 2026 bmc::labs Gmbh. All rights reserved.
//
// Authors:
//   Florian Eich <florian@bmc-labs.com>
//   Jonas Reitemeyer <alumni@bmc-labs.com>

use thiserror::Error;


/// Crate wide result type; all fallible operations report [`Error`].
pub type Result<T> = std::result::Result<T, Error>;


/// Failure modes of decoding, encoding, text ingestion and lap detection.
///
/// Decode and ingestion failures are total: no partially populated model is
/// ever returned alongside one of these.
#[derive(Debug, Error)]
pub enum Error {
  /// A read would run past the end of the provided buffer.
  #[error("buffer truncated: need {need} bytes, have {have}")]
  TruncatedBuffer { need: usize, have: usize },

  /// The file marker is missing or the channel directory is inconsistent.
  #[error("malformed header: {0}")]
  MalformedHeader(String),

  /// A channel record carries a datatype/size pair outside the known set.
  /// The whole decode aborts; the byte width of the sample block is
  /// unrecoverable.
  #[error("unsupported datatype {datatype:#06x} with size {datasize}")]
  UnsupportedDatatype { datatype: u16, datasize: u16 },

  /// The encoded layout would exceed the u32 file pointers of the format.
  #[error("layout offset {0} exceeds format pointer width")]
  OffsetOverflow(usize),

  /// Text ingestion found no recognizable time column.
  #[error("missing required column '{0}'")]
  MissingRequiredColumn(String),

  /// Text ingestion found no data rows.
  #[error("input contains no data rows")]
  EmptyInput,

  /// Lap detection found neither a marker channel, nor beacon metadata,
  /// nor a usable distance channel.
  #[error("no lap boundary signal detected")]
  NoLapsDetected,

  /// A lap index sidecar could not be interpreted.
  #[error("malformed lap index: {0}")]
  MalformedIndex(String),

  /// A path helper was handed a file of the wrong type.
  #[error("expected a .{expected} file, got '{path}'")]
  UnexpectedExtension { expected: &'static str, path: String },

  #[error("timestamp parse error: {0}")]
  Timestamp(#[from] chrono::ParseError),

  #[error("XML error: {0}")]
  Xml(#[from] quick_xml::Error),

  #[error("I/O error: {0}")]
  Io(#[from] std::io::Error),
}
