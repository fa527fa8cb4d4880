use postgres_types::Type;
use std::{
    collections::HashMap,
    sync::{Arc, LazyLock},
};

/// Wire format of a result column.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    #[default]
    Text = 0,
    Binary = 1,
}

/// Result column format by type OID. Types not listed are read as text.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ResultFormats(HashMap<u32, Format>);

static INTRINSIC: LazyLock<Arc<ResultFormats>> = LazyLock::new(|| {
    Arc::new(
        [
            Type::BOOL,
            Type::BYTEA,
            Type::CID,
            Type::DATE,
            Type::FLOAT4,
            Type::FLOAT8,
            Type::INT2,
            Type::INT4,
            Type::INT8,
            Type::OID,
            Type::TIMESTAMP,
            Type::TIMESTAMPTZ,
            Type::XID,
        ]
        .iter()
        .map(|ty| (ty.oid(), Format::Binary))
        .collect(),
    )
});

impl ResultFormats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scalar types with a native value representation in binary, everything else in text.
    pub fn intrinsic() -> Arc<ResultFormats> {
        INTRINSIC.clone()
    }

    pub fn with(mut self, ty: &Type, format: Format) -> Self {
        self.0.insert(ty.oid(), format);
        self
    }

    pub fn format_of(&self, oid: u32) -> Format {
        self.0.get(&oid).copied().unwrap_or_default()
    }
}

impl FromIterator<(u32, Format)> for ResultFormats {
    fn from_iter<T: IntoIterator<Item = (u32, Format)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}
