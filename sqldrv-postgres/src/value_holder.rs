use crate::{
    Format, ResultFormats,
    wire::{ArrayLayout, IntervalText, NumericText, TransactionId},
};
use bytes::{BufMut, BytesMut};
use postgres_types::{FromSql, IsNull, Kind, ToSql, Type, to_sql_checked};
use rust_decimal::Decimal;
use sqldrv_core::{ErrorContext, Row, Value};
use std::{
    error::Error,
    fmt::{Display, Write},
    str::FromStr,
};
use time::{
    Date, OffsetDateTime, PrimitiveDateTime, Time, UtcOffset, format_description::BorrowedFormatItem,
    macros::format_description,
};
use uuid::Uuid;

/// Binary-format column, or a parameter.
#[derive(Debug, Clone)]
pub(crate) struct ValueHolder(pub(crate) Value);

impl From<Value> for ValueHolder {
    fn from(value: Value) -> Self {
        ValueHolder(value)
    }
}

impl<'a> FromSql<'a> for ValueHolder {
    fn from_sql(ty: &Type, raw: &'a [u8]) -> Result<Self, Box<dyn Error + Sync + Send>> {
        Self::from_sql_nullable(ty, Some(raw))
    }
    fn from_sql_null(ty: &Type) -> Result<Self, Box<dyn Error + Sync + Send>> {
        Self::from_sql_nullable(ty, None)
    }
    fn from_sql_nullable(
        ty: &Type,
        raw: Option<&'a [u8]>,
    ) -> Result<Self, Box<dyn Error + Sync + Send>> {
        macro_rules! to_value {
            ($ty_var:ident, $raw:ident, $($($ty:path)|+ => ( $value:path, $source:ty ) ,)+) => {
                match *$ty_var {
                    $($($ty)|+ => $value(if let Some($raw) = $raw { Some(<$source>::from_sql($ty_var, $raw)?.into()) } else { None }),)+
                    _ if is_text($ty_var) => Value::Varchar($raw.map(|v| String::from_utf8_lossy(v).into_owned())),
                    _ => {
                        if $raw.is_some() {
                            return Err(sqldrv_core::Error::msg(format!("Cannot decode sql type: `{}`", $ty_var)).into());
                        }
                        Value::Null
                    }
                }
            };
        }
        let value = to_value!(ty, raw,
            Type::BOOL => (Value::Boolean, bool),
            Type::INT2 => (Value::Int16, i16),
            Type::INT4 => (Value::Int32, i32),
            Type::INT8 => (Value::Int64, i64),
            Type::OID => (Value::Int64, u32),
            Type::XID | Type::CID => (Value::Int64, TransactionId),
            Type::FLOAT4 => (Value::Float32, f32),
            Type::FLOAT8 => (Value::Float64, f64),
            Type::NUMERIC => (Value::Decimal, Decimal),
            Type::BYTEA => (Value::Blob, Vec<u8>),
            Type::DATE => (Value::Date, Date),
            Type::TIME => (Value::Time, Time),
            Type::TIMESTAMP => (Value::Timestamp, PrimitiveDateTime),
            Type::TIMESTAMPTZ => (Value::TimestampWithTimezone, OffsetDateTime),
            Type::UUID => (Value::Uuid, Uuid),
        );
        Ok(value.into())
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }
}

/// Column requested in text format, rendered as the server would print it.
#[derive(Debug)]
pub(crate) struct TextHolder(pub(crate) Value);

const DATE_FORMAT: &[BorrowedFormatItem<'static>] = format_description!("[year]-[month]-[day]");
const TIME_FORMAT: &[BorrowedFormatItem<'static>] = format_description!("[hour]:[minute]:[second]");
const FRACTION_FORMAT: &[BorrowedFormatItem<'static>] = format_description!("[subsecond digits:6]");

fn render_time(time: Time) -> Result<String, Box<dyn Error + Sync + Send>> {
    let mut out = time.format(TIME_FORMAT)?;
    if time.nanosecond() != 0 {
        out.push('.');
        out.push_str(time.format(FRACTION_FORMAT)?.trim_end_matches('0'));
    }
    Ok(out)
}

fn render_timestamp(value: PrimitiveDateTime) -> Result<String, Box<dyn Error + Sync + Send>> {
    Ok(format!(
        "{} {}",
        value.date().format(DATE_FORMAT)?,
        render_time(value.time())?
    ))
}

fn render_float<F: Copy + Display + Into<f64>>(value: F) -> String {
    let wide: f64 = value.into();
    if wide == f64::INFINITY {
        "Infinity".into()
    } else if wide == f64::NEG_INFINITY {
        "-Infinity".into()
    } else {
        value.to_string()
    }
}

/// Text the server would print for `raw`, a binary value of type `ty`.
fn render_text(ty: &Type, raw: &[u8]) -> Result<String, Box<dyn Error + Sync + Send>> {
    Ok(match *ty {
        Type::BOOL => (if bool::from_sql(ty, raw)? { "t" } else { "f" }).to_string(),
        Type::INT2 => i16::from_sql(ty, raw)?.to_string(),
        Type::INT4 => i32::from_sql(ty, raw)?.to_string(),
        Type::INT8 => i64::from_sql(ty, raw)?.to_string(),
        Type::OID => u32::from_sql(ty, raw)?.to_string(),
        Type::XID | Type::CID => TransactionId::from_sql(ty, raw)?.0.to_string(),
        Type::FLOAT4 => render_float(f32::from_sql(ty, raw)?),
        Type::FLOAT8 => render_float(f64::from_sql(ty, raw)?),
        Type::NUMERIC => NumericText::from_sql(ty, raw)?.0,
        Type::UUID => Uuid::from_sql(ty, raw)?.to_string(),
        Type::DATE => Date::from_sql(ty, raw)?.format(DATE_FORMAT)?,
        Type::TIME => render_time(Time::from_sql(ty, raw)?)?,
        Type::TIMESTAMP => render_timestamp(PrimitiveDateTime::from_sql(ty, raw)?)?,
        Type::TIMESTAMPTZ => {
            let value = OffsetDateTime::from_sql(ty, raw)?.to_offset(UtcOffset::UTC);
            format!(
                "{}+00",
                render_timestamp(PrimitiveDateTime::new(value.date(), value.time()))?
            )
        }
        Type::INTERVAL => IntervalText::from_sql(ty, raw)?.render(),
        Type::BYTEA => {
            let mut out = String::with_capacity(2 + raw.len() * 2);
            out.push_str("\\x");
            for byte in raw {
                let _ = write!(out, "{:02x}", byte);
            }
            out
        }
        Type::JSONB => match raw.split_first() {
            Some((&1, json)) => String::from_utf8(json.to_vec())?,
            _ => return Err(sqldrv_core::Error::msg("Unsupported jsonb version").into()),
        },
        _ if is_text(ty) => String::from_utf8(raw.to_vec())?,
        _ => match ty.kind() {
            Kind::Array(member) => render_array(member, raw)?,
            Kind::Domain(inner) => render_text(inner, raw)?,
            _ => return Err(format!("Cannot render sql type `{}` as text", ty).into()),
        },
    })
}

fn render_array(member: &Type, raw: &[u8]) -> Result<String, Box<dyn Error + Sync + Send>> {
    let layout = ArrayLayout::read(raw)?;
    if layout.element != member.oid() {
        return Err(format!(
            "Array of `{}` holds elements with oid {}",
            member,
            layout.element
        )
        .into());
    }
    let mut out = String::new();
    if layout.dimensions.iter().any(|(_, lower)| *lower != 1) {
        for (len, lower) in &layout.dimensions {
            let _ = write!(out, "[{}:{}]", lower, lower + len - 1);
        }
        out.push('=');
    }
    render_dimension(member, &layout.dimensions, &mut layout.elements.iter(), &mut out)?;
    Ok(out)
}

fn render_dimension(
    member: &Type,
    dimensions: &[(i32, i32)],
    elements: &mut std::slice::Iter<'_, Option<&[u8]>>,
    out: &mut String,
) -> Result<(), Box<dyn Error + Sync + Send>> {
    out.push('{');
    if let Some(((len, _), inner)) = dimensions.split_first() {
        for i in 0..*len {
            if i > 0 {
                out.push(',');
            }
            if !inner.is_empty() {
                render_dimension(member, inner, elements, out)?;
                continue;
            }
            match elements.next().ok_or("Missing array element")? {
                Some(raw) => quote_element(&render_text(member, raw)?, out),
                None => out.push_str("NULL"),
            }
        }
    }
    out.push('}');
    Ok(())
}

fn quote_element(text: &str, out: &mut String) {
    let quote = text.is_empty()
        || text.eq_ignore_ascii_case("NULL")
        || text
            .chars()
            .any(|c| matches!(c, '{' | '}' | ',' | '"' | '\\') || c.is_ascii_whitespace());
    if !quote {
        out.push_str(text);
        return;
    }
    out.push('"');
    for c in text.chars() {
        if matches!(c, '"' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
}

impl<'a> FromSql<'a> for TextHolder {
    fn from_sql(ty: &Type, raw: &'a [u8]) -> Result<Self, Box<dyn Error + Sync + Send>> {
        Ok(TextHolder(Value::Varchar(Some(render_text(ty, raw)?))))
    }

    fn from_sql_null(ty: &Type) -> Result<Self, Box<dyn Error + Sync + Send>> {
        Ok(TextHolder(if is_text(ty) || *ty == Type::JSONB {
            Value::Varchar(None)
        } else {
            Value::Null
        }))
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }
}

fn is_text(ty: &Type) -> bool {
    <String as FromSql>::accepts(ty)
        || matches!(*ty, Type::JSON | Type::XML | Type::CHAR)
        || matches!(ty.kind(), Kind::Enum(..))
}

/// Decode every column of `row` in the format its type was requested in.
pub(crate) fn decode_row(
    row: &tokio_postgres::Row,
    formats: &ResultFormats,
) -> sqldrv_core::Result<Row> {
    row.columns()
        .iter()
        .enumerate()
        .map(|(i, col)| {
            let value = match formats.format_of(col.type_().oid()) {
                Format::Binary => row.try_get::<_, ValueHolder>(i).map(|v| v.0),
                Format::Text => row.try_get::<_, TextHolder>(i).map(|v| v.0),
            };
            value.with_context(|| {
                format!(
                    "Could not decode column {} `{}`: {}",
                    i,
                    col.name(),
                    col.type_()
                )
            })
        })
        .collect()
}

fn mismatch(value: &Value, ty: &Type) -> Box<dyn Error + Sync + Send> {
    sqldrv_core::Error::msg(format!("Cannot encode {:?} as a `{}` parameter", value, ty)).into()
}

fn put_text(text: &str, out: &mut BytesMut) -> IsNull {
    out.put_slice(text.as_bytes());
    IsNull::No
}

fn parse_bool(text: &str) -> Option<bool> {
    match text.trim().to_ascii_lowercase().as_str() {
        "t" | "true" | "y" | "yes" | "on" | "1" => Some(true),
        "f" | "false" | "n" | "no" | "off" | "0" => Some(false),
        _ => None,
    }
}

impl ValueHolder {
    fn integer_to_sql(
        &self,
        v: i64,
        ty: &Type,
        out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn Error + Sync + Send>> {
        match *ty {
            Type::INT2 => i16::try_from(v)?.to_sql(ty, out),
            Type::INT4 => i32::try_from(v)?.to_sql(ty, out),
            Type::INT8 => v.to_sql(ty, out),
            Type::OID => u32::try_from(v)?.to_sql(ty, out),
            Type::FLOAT4 => (v as f32).to_sql(ty, out),
            Type::FLOAT8 => (v as f64).to_sql(ty, out),
            Type::NUMERIC => Decimal::from(v).to_sql(ty, out),
            Type::BOOL => (v != 0).to_sql(ty, out),
            _ if is_text(ty) => Ok(put_text(&v.to_string(), out)),
            _ => Err(mismatch(&self.0, ty)),
        }
    }

    fn float_to_sql(
        &self,
        v: f64,
        ty: &Type,
        out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn Error + Sync + Send>> {
        match *ty {
            Type::FLOAT4 => (v as f32).to_sql(ty, out),
            Type::FLOAT8 => v.to_sql(ty, out),
            Type::NUMERIC => Decimal::try_from(v)?.to_sql(ty, out),
            _ if is_text(ty) => Ok(put_text(&render_float(v), out)),
            _ => Err(mismatch(&self.0, ty)),
        }
    }

    fn text_to_sql(
        &self,
        v: &str,
        ty: &Type,
        out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn Error + Sync + Send>> {
        match *ty {
            Type::INT2 | Type::INT4 | Type::INT8 | Type::OID => {
                self.integer_to_sql(v.trim().parse()?, ty, out)
            }
            Type::FLOAT4 | Type::FLOAT8 => self.float_to_sql(v.trim().parse()?, ty, out),
            Type::NUMERIC => Decimal::from_str(v.trim())?.to_sql(ty, out),
            Type::UUID => Uuid::parse_str(v.trim())?.to_sql(ty, out),
            Type::BOOL => parse_bool(v)
                .ok_or_else(|| mismatch(&self.0, ty))?
                .to_sql(ty, out),
            Type::BYTEA => Ok(put_text(v, out)),
            Type::JSONB => {
                out.put_u8(1);
                Ok(put_text(v, out))
            }
            _ if is_text(ty) => Ok(put_text(v, out)),
            _ => Err(mismatch(&self.0, ty)),
        }
    }
}

impl ToSql for ValueHolder {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, Box<dyn Error + Sync + Send>>
    where
        Self: Sized,
    {
        if self.0.is_null() {
            return Ok(IsNull::Yes);
        }
        match &self.0 {
            Value::Boolean(Some(v)) => match *ty {
                Type::BOOL => v.to_sql(ty, out),
                _ if is_text(ty) => Ok(put_text(if *v { "true" } else { "false" }, out)),
                _ => self.integer_to_sql(*v as i64, ty, out),
            },
            Value::Int16(Some(v)) => self.integer_to_sql(*v as i64, ty, out),
            Value::Int32(Some(v)) => self.integer_to_sql(*v as i64, ty, out),
            Value::Int64(Some(v)) => self.integer_to_sql(*v, ty, out),
            Value::Float32(Some(v)) => self.float_to_sql(*v as f64, ty, out),
            Value::Float64(Some(v)) => self.float_to_sql(*v, ty, out),
            Value::Decimal(Some(v)) => match *ty {
                Type::NUMERIC => v.to_sql(ty, out),
                Type::INT2 | Type::INT4 | Type::INT8 | Type::OID => {
                    self.integer_to_sql(i64::try_from(*v)?, ty, out)
                }
                Type::FLOAT4 | Type::FLOAT8 => self.float_to_sql(f64::try_from(*v)?, ty, out),
                _ if is_text(ty) => Ok(put_text(&v.to_string(), out)),
                _ => Err(mismatch(&self.0, ty)),
            },
            Value::Varchar(Some(v)) => self.text_to_sql(v, ty, out),
            Value::Blob(Some(v)) if *ty == Type::BYTEA || is_text(ty) => {
                out.put_slice(v);
                Ok(IsNull::No)
            }
            Value::Date(Some(v)) if *ty == Type::DATE => v.to_sql(ty, out),
            Value::Time(Some(v)) if *ty == Type::TIME => v.to_sql(ty, out),
            Value::Timestamp(Some(v)) if *ty == Type::TIMESTAMP => v.to_sql(ty, out),
            Value::Timestamp(Some(v)) if *ty == Type::TIMESTAMPTZ => {
                v.assume_utc().to_sql(ty, out)
            }
            Value::TimestampWithTimezone(Some(v)) if *ty == Type::TIMESTAMPTZ => v.to_sql(ty, out),
            Value::Uuid(Some(v)) if *ty == Type::UUID => v.to_sql(ty, out),
            Value::Date(Some(v)) if is_text(ty) => Ok(put_text(&v.format(DATE_FORMAT)?, out)),
            Value::Time(Some(v)) if is_text(ty) => Ok(put_text(&render_time(*v)?, out)),
            Value::Timestamp(Some(v)) if is_text(ty) => Ok(put_text(&render_timestamp(*v)?, out)),
            Value::Uuid(Some(v)) if is_text(ty) => Ok(put_text(&v.to_string(), out)),
            _ => Err(mismatch(&self.0, ty)),
        }
    }

    fn accepts(_ty: &Type) -> bool
    where
        Self: Sized,
    {
        true
    }

    to_sql_checked!();
}
