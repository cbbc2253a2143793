// Copyright 2026 bmc::labs Gmbh. All rights reserved.
//
// Author: Florian Eich <florian@bmc-labs.com>

mod channel;
mod dataset;
mod error;
mod head;
mod lap;
mod ld_file;
mod ldx;
mod text;

pub use channel::{Channel, Datatype, Samples};
pub use dataset::TelemetryDataset;
pub use error::{Error, Result};
pub use head::{Event, Head, Venue};
pub use lap::{laps_from_boundaries,
              segment,
              DataPoint,
              Lap,
              LapInfo,
              SegmentOptions,
              BEACON_METADATA_KEY,
              DEFAULT_MIN_LAP_TIME,
              DISTANCE_CHANNELS,
              LAP_CHANNELS,
              TIME_CHANNELS};
pub use ld_file::LdFile;
pub use ldx::{Beacon, LapIndex};
pub use text::TextField;
