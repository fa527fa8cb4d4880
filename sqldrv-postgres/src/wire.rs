use byteorder::{NetworkEndian, ReadBytesExt};
use postgres_types::{FromSql, Type};
use std::{error::Error, fmt::Write, io::Cursor};

/// `xid` and `cid`: unsigned 32-bit counters without a `FromSql` of their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TransactionId(pub(crate) u32);

impl<'a> FromSql<'a> for TransactionId {
    fn from_sql(_ty: &Type, raw: &'a [u8]) -> Result<Self, Box<dyn Error + Sync + Send>> {
        let mut raw = Cursor::new(raw);
        Ok(Self(raw.read_u32::<NetworkEndian>()?))
    }

    fn accepts(ty: &Type) -> bool {
        matches!(*ty, Type::XID | Type::CID)
    }
}

impl From<TransactionId> for i64 {
    fn from(value: TransactionId) -> Self {
        value.0 as i64
    }
}

/// Binary `interval`, rendered the way the server does with `IntervalStyle = postgres`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct IntervalText {
    pub(crate) months: i32,
    pub(crate) days: i32,
    pub(crate) micros: i64,
}

const MICROS_IN_SECOND: i64 = 1_000_000;

impl<'a> FromSql<'a> for IntervalText {
    fn from_sql(_ty: &Type, raw: &'a [u8]) -> Result<Self, Box<dyn Error + Sync + Send>> {
        let mut raw = Cursor::new(raw);
        let micros = raw.read_i64::<NetworkEndian>()?;
        let days = raw.read_i32::<NetworkEndian>()?;
        let months = raw.read_i32::<NetworkEndian>()?;
        Ok(Self {
            months,
            days,
            micros,
        })
    }

    fn accepts(ty: &Type) -> bool {
        matches!(*ty, Type::INTERVAL)
    }
}

impl IntervalText {
    pub(crate) fn render(&self) -> String {
        let mut out = String::new();
        let mut part = |value: i64, unit: &str| {
            if value != 0 {
                if !out.is_empty() {
                    out.push(' ');
                }
                let _ = write!(out, "{} {}{}", value, unit, if value.abs() == 1 { "" } else { "s" });
            }
        };
        part(self.months as i64 / 12, "year");
        part(self.months as i64 % 12, "mon");
        part(self.days as i64, "day");
        if self.micros != 0 || out.is_empty() {
            if !out.is_empty() {
                out.push(' ');
            }
            if self.micros < 0 {
                out.push('-');
            }
            let micros = self.micros.unsigned_abs();
            let seconds = micros / MICROS_IN_SECOND as u64;
            let fraction = micros % MICROS_IN_SECOND as u64;
            let _ = write!(
                out,
                "{:02}:{:02}:{:02}",
                seconds / 3600,
                seconds / 60 % 60,
                seconds % 60
            );
            if fraction != 0 {
                let fraction = format!("{:06}", fraction);
                let _ = write!(out, ".{}", fraction.trim_end_matches('0'));
            }
        }
        out
    }
}

const NUMERIC_NEG: u16 = 0x4000;
const NUMERIC_NAN: u16 = 0xC000;
const NUMERIC_PINF: u16 = 0xD000;
const NUMERIC_NINF: u16 = 0xF000;

/// Binary `numeric` printed digit by digit, so that values outside of what `Decimal` holds
/// (NaN, infinities, more than 28 digits) keep their exact text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct NumericText(pub(crate) String);

impl<'a> FromSql<'a> for NumericText {
    fn from_sql(_ty: &Type, raw: &'a [u8]) -> Result<Self, Box<dyn Error + Sync + Send>> {
        let mut raw = Cursor::new(raw);
        let ndigits = raw.read_i16::<NetworkEndian>()?;
        let weight = raw.read_i16::<NetworkEndian>()? as i32;
        let sign = raw.read_u16::<NetworkEndian>()?;
        let dscale = raw.read_u16::<NetworkEndian>()? as usize;
        let digits = (0..ndigits.max(0))
            .map(|_| raw.read_i16::<NetworkEndian>())
            .collect::<Result<Vec<_>, _>>()?;
        let text = match sign {
            NUMERIC_NAN => "NaN".to_string(),
            NUMERIC_PINF => "Infinity".to_string(),
            NUMERIC_NINF => "-Infinity".to_string(),
            0 | NUMERIC_NEG => {
                // Base 10000 digits, the first one sits at `weight`
                let digit = |i: i32| {
                    usize::try_from(i)
                        .ok()
                        .and_then(|i| digits.get(i).copied())
                        .unwrap_or(0)
                };
                let mut out = String::new();
                if sign == NUMERIC_NEG {
                    out.push('-');
                }
                if weight < 0 {
                    out.push('0');
                } else {
                    let _ = write!(out, "{}", digit(0));
                    for i in 1..=weight {
                        let _ = write!(out, "{:04}", digit(i));
                    }
                }
                if dscale > 0 {
                    let mut fraction = String::with_capacity(dscale + 4);
                    let mut i = weight + 1;
                    while fraction.len() < dscale {
                        let _ = write!(fraction, "{:04}", digit(i));
                        i += 1;
                    }
                    fraction.truncate(dscale);
                    out.push('.');
                    out.push_str(&fraction);
                }
                out
            }
            _ => return Err(format!("Invalid numeric sign 0x{:04X}", sign).into()),
        };
        Ok(Self(text))
    }

    fn accepts(ty: &Type) -> bool {
        matches!(*ty, Type::NUMERIC)
    }
}

/// Layout of a binary array: dimensions as `(length, lower bound)` and the elements in row-major
/// order, `None` for null.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct ArrayLayout<'a> {
    pub(crate) element: u32,
    pub(crate) dimensions: Vec<(i32, i32)>,
    pub(crate) elements: Vec<Option<&'a [u8]>>,
}

impl<'a> ArrayLayout<'a> {
    pub(crate) fn read(raw: &'a [u8]) -> Result<Self, Box<dyn Error + Sync + Send>> {
        let mut cursor = Cursor::new(raw);
        let ndim = cursor.read_i32::<NetworkEndian>()?;
        let _has_null = cursor.read_i32::<NetworkEndian>()?;
        let element = cursor.read_u32::<NetworkEndian>()?;
        let dimensions = (0..ndim.max(0))
            .map(|_| {
                Ok::<_, std::io::Error>((
                    cursor.read_i32::<NetworkEndian>()?,
                    cursor.read_i32::<NetworkEndian>()?,
                ))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let count = if dimensions.is_empty() {
            0
        } else {
            dimensions
                .iter()
                .map(|(len, _)| usize::try_from(*len).unwrap_or(0))
                .product()
        };
        let mut elements = Vec::with_capacity(count);
        for _ in 0..count {
            let len = cursor.read_i32::<NetworkEndian>()?;
            if len < 0 {
                elements.push(None);
                continue;
            }
            let start = cursor.position() as usize;
            let end = start + len as usize;
            let bytes = raw.get(start..end).ok_or("Truncated array element")?;
            cursor.set_position(end as u64);
            elements.push(Some(bytes));
        }
        Ok(Self {
            element,
            dimensions,
            elements,
        })
    }
}
