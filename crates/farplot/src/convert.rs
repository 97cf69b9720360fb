//! Reading plain values out of worker replies.

use farproxy::Error;
use farproxy::Result;
use farproxy::Value;

pub(crate) fn string(value: Value, what: &str) -> Result<String> {
    match value {
        Value::Str(s) => Ok(s),
        other => Err(Error::type_mismatch(format!("a string for {what}"), other.kind())),
    }
}

pub(crate) fn floats(value: &Value, what: &str) -> Result<Vec<f64>> {
    value
        .to_f64s()
        .ok_or_else(|| Error::type_mismatch(format!("numbers for {what}"), value.kind()))
}

pub(crate) fn float_pair(value: &Value, what: &str) -> Result<(f64, f64)> {
    match floats(value, what)?.as_slice() {
        [a, b] => Ok((*a, *b)),
        other => Err(Error::type_mismatch(
            format!("a pair for {what}"),
            format!("{} numbers", other.len()),
        )),
    }
}

pub(crate) fn list(value: Value, what: &str) -> Result<Vec<Value>> {
    let kind = value.kind();
    value
        .into_seq()
        .ok_or_else(|| Error::type_mismatch(format!("a sequence for {what}"), kind))
}
