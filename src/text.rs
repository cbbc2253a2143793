// Copyright 2026 bmc::labs Gmbh. All rights reserved.
//
// Authors:
//   Florian Eich <florian@bmc-labs.com>
//   Jonas Reitemeyer <alumni@bmc-labs.com>

use std::fmt;


/// Fixed capacity text as stored in the wire format: `N` bytes, NUL padded.
///
/// The value itself is kept at full length; truncation happens on encode
/// only, and [`fits`](TextField::fits) tells beforehand whether it will.
/// Values longer than `N` bytes lose data when written, which the format
/// accepts silently, so callers who care must check first.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct TextField<const N: usize> {
  value: String,
}

impl<const N: usize> TextField<N> {
  /// Width of the encoded field in bytes.
  pub const WIDTH: usize = N;

  pub fn new(value: &str) -> Self {
    Self { value: value.to_string() }
  }

  /// Reads a field from its wire representation: bytes up to the first NUL,
  /// lossily decoded, surrounding whitespace stripped.
  pub fn from_bytes(raw: &[u8]) -> Self {
    let end = raw.iter().position(|&byte| byte == 0).unwrap_or(raw.len());
    Self { value: String::from_utf8_lossy(&raw[..end]).trim().to_string() }
  }

  pub fn as_str(&self) -> &str {
    &self.value
  }

  pub fn set(&mut self, value: &str) {
    self.value = value.to_string();
  }

  pub fn len(&self) -> usize {
    self.value.len()
  }

  pub fn is_empty(&self) -> bool {
    self.value.is_empty()
  }

  /// Whether the value encodes without truncation.
  pub fn fits(&self) -> bool {
    self.value.len() <= N
  }

  /// The padded wire representation. Over-length values are cut at the
  /// last character boundary at or below `N` bytes.
  pub fn encoded(&self) -> [u8; N] {
    let mut buffer = [0u8; N];
    let mut end = self.value.len().min(N);
    while !self.value.is_char_boundary(end) {
      end -= 1;
    }
    buffer[..end].copy_from_slice(&self.value.as_bytes()[..end]);
    buffer
  }
}

impl<const N: usize> fmt::Display for TextField<N> {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    write!(f, "{}", self.value)
  }
}

impl<const N: usize> From<&str> for TextField<N> {
  fn from(value: &str) -> Self {
    Self::new(value)
  }
}


#[cfg(test)]
mod tests {
  use super::*;
  use pretty_assertions::assert_eq;


  #[test]
  fn text_field_test() {
    let field = TextField::<8>::new("warbl");
    assert_eq!("warbl", field.as_str());
    assert_eq!(5, field.len());
    assert_eq!(true, field.fits());
    assert_eq!(8, TextField::<8>::WIDTH);
    assert_eq!([b'w', b'a', b'r', b'b', b'l', 0, 0, 0], field.encoded());

    let mut field = field;
    field.set("warblgarbl");
    assert_eq!(false, field.fits());
    assert_eq!(b"warblgar".as_ref(), field.encoded().as_ref());
  }

  #[test]
  fn truncation_boundary_test() {
    // multi byte character straddling the cutoff must not be split
    let field = TextField::<6>::new("Kyalami");
    assert_eq!(false, field.fits());
    assert_eq!(b"Kyalam".as_ref(), field.encoded().as_ref());

    let field = TextField::<5>::new("Имола");
    assert_eq!(false, field.fits());
    assert_eq!(4, field.encoded().iter().filter(|&&b| b != 0).count());
  }

  #[test]
  fn from_bytes_test() {
    let field = TextField::<8>::from_bytes(b"ADL\0\0\0\0\0");
    assert_eq!("ADL", field.as_str());

    // padding after the terminator is ignored, whitespace is stripped
    let field = TextField::<8>::from_bytes(b" foo \0ZZ");
    assert_eq!("foo", field.as_str());

    let field = TextField::<4>::from_bytes(&[0u8; 4]);
    assert_eq!(true, field.is_empty());

    let round = TextField::<16>::new("01/01/2026");
    assert_eq!(round, TextField::<16>::from_bytes(&round.encoded()));
  }

  #[test]
  fn display_test() {
    let field: TextField<12> = "km/h".into();
    assert_eq!("km/h", format!("{}", field));
  }
}
