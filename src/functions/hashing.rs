use super::FunctionRegistry;
use crate::context::ExecutionContext;
use crate::error::{Result, TsqlError};
use crate::types::DataType;
use crate::value::Value;
use sha1::{Digest, Sha1};
use sha2::{Sha256, Sha512};

pub(super) fn register(registry: &mut FunctionRegistry) {
    registry.register("HASHBYTES", 2, Some(2), hashbytes);
    registry.register("CHECKSUM", 1, None, checksum);
    registry.register("BINARY_CHECKSUM", 1, None, binary_checksum);
}

/// Bytes hashed for a value: binary payloads as-is, everything else as UTF-8 text.
fn input_bytes(v: &Value) -> Vec<u8> {
    if v.data_type().is_binary() {
        v.as_bytes()
    } else {
        v.as_string().into_bytes()
    }
}

pub(crate) fn digest(algorithm: &str, input: &[u8]) -> Result<Vec<u8>> {
    let out = match algorithm.trim().to_ascii_uppercase().as_str() {
        "MD5" => md5::compute(input).0.to_vec(),
        "SHA" | "SHA1" => Sha1::digest(input).to_vec(),
        "SHA2_256" | "SHA256" => Sha256::digest(input).to_vec(),
        "SHA2_512" | "SHA512" => Sha512::digest(input).to_vec(),
        other => {
            return Err(TsqlError::Invalid(format!(
                "'{other}' is not a supported HASHBYTES algorithm"
            )))
        }
    };
    Ok(out)
}

fn hashbytes(_: &ExecutionContext, args: &[Value]) -> Result<Value> {
    let algorithm = args[0].as_string();
    if args[1].is_null() {
        // still reject a bad algorithm name
        digest(&algorithm, &[])?;
        return Ok(Value::null(DataType::VarBinary));
    }
    let bytes = digest(&algorithm, &input_bytes(&args[1]))?;
    Ok(Value::binary_of(DataType::VarBinary, bytes, Some(8000)))
}

const NULL_MARK: i32 = 0x7fff_0001;

/// Rotate-and-xor fold over bytes, the shape of the server's checksum family.
fn fold(mut h: i32, bytes: &[u8]) -> i32 {
    for &b in bytes {
        h = h.rotate_left(4) ^ b as i32;
    }
    h
}

fn family_tag(ty: DataType) -> u8 {
    match ty {
        t if t.is_string() => 1,
        t if t.is_numeric() => 2,
        t if t.is_datetime() => 3,
        t if t.is_binary() => 4,
        _ => 5,
    }
}

fn combine(args: &[Value], normalize: impl Fn(&Value) -> Vec<u8>) -> i32 {
    args.iter().fold(0i32, |h, v| {
        let h = h.rotate_left(4);
        if v.is_null() {
            return h ^ NULL_MARK;
        }
        let h = fold(h, &[family_tag(v.data_type())]);
        fold(h, &normalize(v))
    })
}

fn checksum(_: &ExecutionContext, args: &[Value]) -> Result<Value> {
    // the default collation is case-insensitive and ignores trailing blanks
    let h = combine(args, |v| {
        if v.data_type().is_string() {
            v.as_string().trim_end_matches(' ').to_uppercase().into_bytes()
        } else {
            input_bytes(v)
        }
    });
    Ok(Value::int(h))
}

fn binary_checksum(_: &ExecutionContext, args: &[Value]) -> Result<Value> {
    Ok(Value::int(combine(args, input_bytes)))
}
