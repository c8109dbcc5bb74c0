use crate::error::{Result, TsqlError};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum DataType {
    Bit,
    TinyInt,
    SmallInt,
    Int,
    BigInt,
    Decimal,
    Numeric,
    Money,
    SmallMoney,
    Float,
    Real,
    Date,
    Time,
    DateTime,
    DateTime2,
    SmallDateTime,
    DateTimeOffset,
    Char,
    VarChar,
    NChar,
    NVarChar,
    Text,
    NText,
    Binary,
    VarBinary,
    Image,
    UniqueIdentifier,
    Xml,
    SqlVariant,
    Table,
}

impl DataType {
    pub const ALL: [DataType; 30] = [
        DataType::Bit,
        DataType::TinyInt,
        DataType::SmallInt,
        DataType::Int,
        DataType::BigInt,
        DataType::Decimal,
        DataType::Numeric,
        DataType::Money,
        DataType::SmallMoney,
        DataType::Float,
        DataType::Real,
        DataType::Date,
        DataType::Time,
        DataType::DateTime,
        DataType::DateTime2,
        DataType::SmallDateTime,
        DataType::DateTimeOffset,
        DataType::Char,
        DataType::VarChar,
        DataType::NChar,
        DataType::NVarChar,
        DataType::Text,
        DataType::NText,
        DataType::Binary,
        DataType::VarBinary,
        DataType::Image,
        DataType::UniqueIdentifier,
        DataType::Xml,
        DataType::SqlVariant,
        DataType::Table,
    ];

    pub fn name(self) -> &'static str {
        match self {
            DataType::Bit => "bit",
            DataType::TinyInt => "tinyint",
            DataType::SmallInt => "smallint",
            DataType::Int => "int",
            DataType::BigInt => "bigint",
            DataType::Decimal => "decimal",
            DataType::Numeric => "numeric",
            DataType::Money => "money",
            DataType::SmallMoney => "smallmoney",
            DataType::Float => "float",
            DataType::Real => "real",
            DataType::Date => "date",
            DataType::Time => "time",
            DataType::DateTime => "datetime",
            DataType::DateTime2 => "datetime2",
            DataType::SmallDateTime => "smalldatetime",
            DataType::DateTimeOffset => "datetimeoffset",
            DataType::Char => "char",
            DataType::VarChar => "varchar",
            DataType::NChar => "nchar",
            DataType::NVarChar => "nvarchar",
            DataType::Text => "text",
            DataType::NText => "ntext",
            DataType::Binary => "binary",
            DataType::VarBinary => "varbinary",
            DataType::Image => "image",
            DataType::UniqueIdentifier => "uniqueidentifier",
            DataType::Xml => "xml",
            DataType::SqlVariant => "sql_variant",
            DataType::Table => "table",
        }
    }

    pub fn is_integer(self) -> bool {
        matches!(
            self,
            DataType::Bit | DataType::TinyInt | DataType::SmallInt | DataType::Int | DataType::BigInt
        )
    }

    /// Exact fixed-point family: decimal/numeric and the money types.
    pub fn is_decimal(self) -> bool {
        matches!(
            self,
            DataType::Decimal | DataType::Numeric | DataType::Money | DataType::SmallMoney
        )
    }

    pub fn is_float(self) -> bool {
        matches!(self, DataType::Float | DataType::Real)
    }

    pub fn is_numeric(self) -> bool {
        self.is_integer() || self.is_decimal() || self.is_float()
    }

    pub fn is_string(self) -> bool {
        matches!(
            self,
            DataType::Char
                | DataType::VarChar
                | DataType::NChar
                | DataType::NVarChar
                | DataType::Text
                | DataType::NText
                | DataType::Xml
        )
    }

    pub fn is_unicode(self) -> bool {
        matches!(self, DataType::NChar | DataType::NVarChar | DataType::NText)
    }

    pub fn is_datetime(self) -> bool {
        matches!(
            self,
            DataType::Date
                | DataType::Time
                | DataType::DateTime
                | DataType::DateTime2
                | DataType::SmallDateTime
                | DataType::DateTimeOffset
        )
    }

    pub fn is_binary(self) -> bool {
        matches!(self, DataType::Binary | DataType::VarBinary | DataType::Image)
    }

    /// Inclusive value range for the integer types.
    pub fn int_range(self) -> Option<(i64, i64)> {
        match self {
            DataType::Bit => Some((0, 1)),
            DataType::TinyInt => Some((0, 255)),
            DataType::SmallInt => Some((i16::MIN as i64, i16::MAX as i64)),
            DataType::Int => Some((i32::MIN as i64, i32::MAX as i64)),
            DataType::BigInt => Some((i64::MIN, i64::MAX)),
            _ => None,
        }
    }

    /// Data type precedence; the operand with the higher value wins implicit conversion.
    pub fn precedence(self) -> u8 {
        match self {
            DataType::Table => 0,
            DataType::SqlVariant => 29,
            DataType::Xml => 28,
            DataType::DateTimeOffset => 27,
            DataType::DateTime2 => 26,
            DataType::DateTime => 25,
            DataType::SmallDateTime => 24,
            DataType::Date => 23,
            DataType::Time => 22,
            DataType::Float => 21,
            DataType::Real => 20,
            DataType::Decimal | DataType::Numeric => 19,
            DataType::Money => 18,
            DataType::SmallMoney => 17,
            DataType::BigInt => 16,
            DataType::Int => 15,
            DataType::SmallInt => 14,
            DataType::TinyInt => 13,
            DataType::Bit => 12,
            DataType::NText => 11,
            DataType::Text => 10,
            DataType::Image => 9,
            DataType::UniqueIdentifier => 7,
            DataType::NVarChar => 6,
            DataType::NChar => 5,
            DataType::VarChar => 4,
            DataType::Char => 3,
            DataType::VarBinary => 2,
            DataType::Binary => 1,
        }
    }

    /// Default fractional digits kept by the type (decimal scale or seconds precision).
    pub fn default_scale(self) -> u8 {
        match self {
            DataType::Money | DataType::SmallMoney => 4,
            DataType::DateTime2 | DataType::Time | DataType::DateTimeOffset => 7,
            DataType::DateTime => 3,
            _ => 0,
        }
    }

    pub fn default_precision(self) -> u8 {
        match self {
            DataType::Decimal | DataType::Numeric => 18,
            DataType::Money => 19,
            DataType::SmallMoney => 10,
            DataType::TinyInt => 3,
            DataType::SmallInt => 5,
            DataType::Int => 10,
            DataType::BigInt => 19,
            DataType::Float => 53,
            DataType::Real => 24,
            _ => 0,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A declared type: the catalog variant plus its declaration modifiers.
///
/// `max_len` of `None` means unbounded (`MAX`, `text`, or a non-string type).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TypeSpec {
    pub data_type: DataType,
    pub precision: u8,
    pub scale: u8,
    pub max_len: Option<usize>,
}

impl TypeSpec {
    pub fn new(data_type: DataType) -> Self {
        let max_len = match data_type {
            DataType::Char | DataType::NChar | DataType::Binary => Some(1),
            _ => None,
        };
        Self {
            data_type,
            precision: data_type.default_precision(),
            scale: data_type.default_scale(),
            max_len,
        }
    }

    pub fn decimal(precision: u8, scale: u8) -> Self {
        Self {
            data_type: DataType::Decimal,
            precision,
            scale,
            max_len: None,
        }
    }

    pub fn with_len(data_type: DataType, max_len: Option<usize>) -> Self {
        Self {
            max_len,
            ..Self::new(data_type)
        }
    }
}

impl fmt::Display for TypeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ty = self.data_type;
        if matches!(ty, DataType::Decimal | DataType::Numeric) {
            return write!(f, "{}({},{})", ty, self.precision, self.scale);
        }
        let sized = matches!(
            ty,
            DataType::Char
                | DataType::VarChar
                | DataType::NChar
                | DataType::NVarChar
                | DataType::Binary
                | DataType::VarBinary
        );
        if sized {
            return match self.max_len {
                Some(n) => write!(f, "{ty}({n})"),
                None => write!(f, "{ty}(max)"),
            };
        }
        write!(f, "{ty}")
    }
}

/// Resolve a textual type name from a declaration (`NVARCHAR(50)`, `[decimal](10, 2)`,
/// `varchar(max)`) into the catalog.
pub fn parse_data_type(name: &str) -> Result<TypeSpec> {
    let text = name.trim();
    let (base, args) = match text.find('(') {
        Some(open) => {
            let close = text
                .rfind(')')
                .ok_or_else(|| TsqlError::Invalid(format!("unbalanced type name: {text}")))?;
            if close < open {
                return Err(TsqlError::Invalid(format!("unbalanced type name: {text}")));
            }
            (&text[..open], Some(&text[open + 1..close]))
        }
        None => (text, None),
    };

    let base = base
        .trim()
        .trim_start_matches('[')
        .trim_end_matches(']')
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_ascii_lowercase();
    let base = base.strip_prefix("sys.").unwrap_or(&base);

    let data_type = match base {
        "bit" => DataType::Bit,
        "tinyint" => DataType::TinyInt,
        "smallint" => DataType::SmallInt,
        "int" | "integer" => DataType::Int,
        "bigint" => DataType::BigInt,
        "decimal" | "dec" => DataType::Decimal,
        "numeric" => DataType::Numeric,
        "money" => DataType::Money,
        "smallmoney" => DataType::SmallMoney,
        "float" | "double precision" | "double" => DataType::Float,
        "real" => DataType::Real,
        "date" => DataType::Date,
        "time" => DataType::Time,
        "datetime" => DataType::DateTime,
        "datetime2" => DataType::DateTime2,
        "smalldatetime" => DataType::SmallDateTime,
        "datetimeoffset" => DataType::DateTimeOffset,
        "char" | "character" => DataType::Char,
        "varchar" | "character varying" | "char varying" => DataType::VarChar,
        "nchar" | "national character" | "national char" => DataType::NChar,
        "nvarchar" | "national character varying" | "national char varying" => DataType::NVarChar,
        "sysname" => return Ok(TypeSpec::with_len(DataType::NVarChar, Some(128))),
        "text" => DataType::Text,
        "ntext" => DataType::NText,
        "binary" => DataType::Binary,
        "varbinary" | "binary varying" => DataType::VarBinary,
        "rowversion" | "timestamp" => return Ok(TypeSpec::with_len(DataType::Binary, Some(8))),
        "image" => DataType::Image,
        "uniqueidentifier" => DataType::UniqueIdentifier,
        "xml" => DataType::Xml,
        "sql_variant" => DataType::SqlVariant,
        "table" => DataType::Table,
        other => return Err(TsqlError::NotFound(format!("unknown data type: {other}"))),
    };

    let mut spec = TypeSpec::new(data_type);
    let Some(args) = args else {
        // Unsized character types default to a single character in declarations.
        if matches!(data_type, DataType::VarChar | DataType::NVarChar | DataType::VarBinary) {
            spec.max_len = Some(1);
        }
        return Ok(spec);
    };

    let parts: Vec<&str> = args.split(',').map(str::trim).collect();
    let parse_num = |s: &str| {
        s.parse::<u32>()
            .map_err(|_| TsqlError::Invalid(format!("invalid type argument '{s}' in {text}")))
    };

    match data_type {
        DataType::Decimal | DataType::Numeric => {
            let precision = parse_num(parts[0])?;
            let scale = match parts.get(1) {
                Some(s) => parse_num(s)?,
                None => 0,
            };
            if precision == 0 || precision > 38 || scale > precision {
                return Err(TsqlError::Invalid(format!(
                    "invalid precision/scale in {text}"
                )));
            }
            spec.precision = precision as u8;
            spec.scale = scale as u8;
        }
        DataType::Float => {
            let n = parse_num(parts[0])?;
            if n <= 24 {
                spec = TypeSpec::new(DataType::Real);
            }
        }
        DataType::Time | DataType::DateTime2 | DataType::DateTimeOffset => {
            let n = parse_num(parts[0])?;
            if n > 7 {
                return Err(TsqlError::Invalid(format!(
                    "fractional seconds precision out of range in {text}"
                )));
            }
            spec.scale = n as u8;
        }
        t if t.is_string() || t.is_binary() => {
            spec.max_len = if parts[0].eq_ignore_ascii_case("max") {
                None
            } else {
                Some(parse_num(parts[0])? as usize)
            };
        }
        _ => {
            return Err(TsqlError::Invalid(format!(
                "type {data_type} does not take arguments: {text}"
            )))
        }
    }
    Ok(spec)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_variant_has_a_parsable_name() {
        for ty in DataType::ALL {
            let spec = parse_data_type(ty.name()).unwrap();
            assert_eq!(spec.data_type, ty, "{ty}");
        }
    }

    #[test]
    fn every_variant_belongs_to_at_most_one_family() {
        for ty in DataType::ALL {
            let families = [
                ty.is_numeric(),
                ty.is_string(),
                ty.is_datetime(),
                ty.is_binary(),
            ];
            assert!(families.iter().filter(|f| **f).count() <= 1, "{ty}");
            if ty.is_integer() {
                assert!(ty.is_numeric());
                assert!(ty.int_range().is_some());
            }
        }
    }

    #[test]
    fn parses_modifiers() {
        let d = parse_data_type("DECIMAL(10, 2)").unwrap();
        assert_eq!((d.data_type, d.precision, d.scale), (DataType::Decimal, 10, 2));

        let v = parse_data_type("[nvarchar](MAX)").unwrap();
        assert_eq!(v.data_type, DataType::NVarChar);
        assert_eq!(v.max_len, None);

        let v = parse_data_type("varchar(50)").unwrap();
        assert_eq!(v.max_len, Some(50));

        let s = parse_data_type("sysname").unwrap();
        assert_eq!(s.max_len, Some(128));

        assert_eq!(parse_data_type("float(10)").unwrap().data_type, DataType::Real);
        assert_eq!(
            parse_data_type("double precision").unwrap().data_type,
            DataType::Float
        );
        assert!(parse_data_type("geography").is_err());
        assert!(parse_data_type("decimal(40,2)").is_err());
    }

    #[test]
    fn precedence_orders_numeric_families() {
        assert!(DataType::Decimal.precedence() > DataType::BigInt.precedence());
        assert!(DataType::Float.precedence() > DataType::Decimal.precedence());
        assert!(DataType::BigInt.precedence() > DataType::Int.precedence());
        assert!(DataType::Int.precedence() > DataType::VarChar.precedence());
        assert!(DataType::DateTime.precedence() > DataType::VarChar.precedence());
    }
}
