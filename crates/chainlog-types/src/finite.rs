//! Walks a `Serialize` value looking for NaN or infinite floats.
//!
//! `serde_json` writes those as `null` without complaint, so payloads built
//! from arbitrary serializable values are scanned first.

use std::fmt;

use serde::ser::{self, Serialize};
use serde_json::Value;

/// Key under which the first non-finite float was found, if any.
///
/// `root` names the value itself; struct fields and map keys below it
/// replace it as the scan descends.
pub(crate) fn non_finite_key<T: Serialize + ?Sized>(value: &T, root: &str) -> Option<String> {
    let mut scan = FiniteScan {
        key: root.to_string(),
    };
    match value.serialize(&mut scan) {
        Err(ScanError::NonFinite) => Some(scan.key),
        // Anything else is left for serde_json to report.
        Err(ScanError::Custom(_)) | Ok(()) => None,
    }
}

struct FiniteScan {
    key: String,
}

impl FiniteScan {
    fn check(&self, finite: bool) -> Result<(), ScanError> {
        if finite {
            Ok(())
        } else {
            Err(ScanError::NonFinite)
        }
    }
}

#[derive(Debug)]
enum ScanError {
    NonFinite,
    Custom(String),
}

impl fmt::Display for ScanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NonFinite => f.write_str("non-finite float"),
            Self::Custom(msg) => f.write_str(msg),
        }
    }
}

impl std::error::Error for ScanError {}

impl ser::Error for ScanError {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        Self::Custom(msg.to_string())
    }
}

type ScanResult = Result<(), ScanError>;

impl<'a> ser::Serializer for &'a mut FiniteScan {
    type Ok = ();
    type Error = ScanError;
    type SerializeSeq = Self;
    type SerializeTuple = Self;
    type SerializeTupleStruct = Self;
    type SerializeTupleVariant = Self;
    type SerializeMap = Self;
    type SerializeStruct = Self;
    type SerializeStructVariant = Self;

    fn serialize_bool(self, _: bool) -> ScanResult {
        Ok(())
    }
    fn serialize_i8(self, _: i8) -> ScanResult {
        Ok(())
    }
    fn serialize_i16(self, _: i16) -> ScanResult {
        Ok(())
    }
    fn serialize_i32(self, _: i32) -> ScanResult {
        Ok(())
    }
    fn serialize_i64(self, _: i64) -> ScanResult {
        Ok(())
    }
    fn serialize_i128(self, _: i128) -> ScanResult {
        Ok(())
    }
    fn serialize_u8(self, _: u8) -> ScanResult {
        Ok(())
    }
    fn serialize_u16(self, _: u16) -> ScanResult {
        Ok(())
    }
    fn serialize_u32(self, _: u32) -> ScanResult {
        Ok(())
    }
    fn serialize_u64(self, _: u64) -> ScanResult {
        Ok(())
    }
    fn serialize_u128(self, _: u128) -> ScanResult {
        Ok(())
    }

    fn serialize_f32(self, v: f32) -> ScanResult {
        self.check(v.is_finite())
    }

    fn serialize_f64(self, v: f64) -> ScanResult {
        self.check(v.is_finite())
    }

    fn serialize_char(self, _: char) -> ScanResult {
        Ok(())
    }
    fn serialize_str(self, _: &str) -> ScanResult {
        Ok(())
    }
    fn serialize_bytes(self, _: &[u8]) -> ScanResult {
        Ok(())
    }
    fn serialize_none(self) -> ScanResult {
        Ok(())
    }

    fn serialize_some<T: ?Sized + Serialize>(self, value: &T) -> ScanResult {
        value.serialize(self)
    }

    fn serialize_unit(self) -> ScanResult {
        Ok(())
    }

    fn serialize_unit_struct(self, _name: &'static str) -> ScanResult {
        Ok(())
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
    ) -> ScanResult {
        Ok(())
    }

    fn serialize_newtype_struct<T: ?Sized + Serialize>(
        self,
        _name: &'static str,
        value: &T,
    ) -> ScanResult {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: ?Sized + Serialize>(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        value: &T,
    ) -> ScanResult {
        value.serialize(self)
    }

    fn serialize_seq(self, _len: Option<usize>) -> Result<Self, ScanError> {
        Ok(self)
    }

    fn serialize_tuple(self, _len: usize) -> Result<Self, ScanError> {
        Ok(self)
    }

    fn serialize_tuple_struct(self, _name: &'static str, _len: usize) -> Result<Self, ScanError> {
        Ok(self)
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self, ScanError> {
        Ok(self)
    }

    fn serialize_map(self, _len: Option<usize>) -> Result<Self, ScanError> {
        Ok(self)
    }

    fn serialize_struct(self, _name: &'static str, _len: usize) -> Result<Self, ScanError> {
        Ok(self)
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self, ScanError> {
        Ok(self)
    }
}

impl<'a> ser::SerializeSeq for &'a mut FiniteScan {
    type Ok = ();
    type Error = ScanError;

    fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> ScanResult {
        value.serialize(&mut **self)
    }

    fn end(self) -> ScanResult {
        Ok(())
    }
}

impl<'a> ser::SerializeTuple for &'a mut FiniteScan {
    type Ok = ();
    type Error = ScanError;

    fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> ScanResult {
        value.serialize(&mut **self)
    }

    fn end(self) -> ScanResult {
        Ok(())
    }
}

impl<'a> ser::SerializeTupleStruct for &'a mut FiniteScan {
    type Ok = ();
    type Error = ScanError;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, value: &T) -> ScanResult {
        value.serialize(&mut **self)
    }

    fn end(self) -> ScanResult {
        Ok(())
    }
}

impl<'a> ser::SerializeTupleVariant for &'a mut FiniteScan {
    type Ok = ();
    type Error = ScanError;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, value: &T) -> ScanResult {
        value.serialize(&mut **self)
    }

    fn end(self) -> ScanResult {
        Ok(())
    }
}

impl<'a> ser::SerializeMap for &'a mut FiniteScan {
    type Ok = ();
    type Error = ScanError;

    fn serialize_key<T: ?Sized + Serialize>(&mut self, key: &T) -> ScanResult {
        match serde_json::to_value(key) {
            Ok(Value::String(name)) => self.key = name,
            Ok(other) => self.key = other.to_string(),
            Err(_) => {}
        }
        Ok(())
    }

    fn serialize_value<T: ?Sized + Serialize>(&mut self, value: &T) -> ScanResult {
        value.serialize(&mut **self)
    }

    fn end(self) -> ScanResult {
        Ok(())
    }
}

impl<'a> ser::SerializeStruct for &'a mut FiniteScan {
    type Ok = ();
    type Error = ScanError;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, key: &'static str, value: &T) -> ScanResult {
        self.key = key.to_string();
        value.serialize(&mut **self)
    }

    fn end(self) -> ScanResult {
        Ok(())
    }
}

impl<'a> ser::SerializeStructVariant for &'a mut FiniteScan {
    type Ok = ();
    type Error = ScanError;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, key: &'static str, value: &T) -> ScanResult {
        self.key = key.to_string();
        value.serialize(&mut **self)
    }

    fn end(self) -> ScanResult {
        Ok(())
    }
}
