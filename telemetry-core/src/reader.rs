// Total accessors over a telemetry source.
// Invariants: never panic; absent keys, type mismatches and an unready source all yield the default.

use crate::source::TelemetrySource;
use crate::value::FromValue;

pub fn lookup<T, S>(source: &S, key: &str) -> Option<T>
where
    T: FromValue,
    S: TelemetrySource + ?Sized,
{
    if !source.is_ready() {
        return None;
    }
    source.get(key).and_then(T::from_value)
}

pub fn read_scalar<T, S>(source: &S, key: &str, default: T) -> T
where
    T: FromValue,
    S: TelemetrySource + ?Sized,
{
    lookup(source, key).unwrap_or(default)
}

pub fn read_indexed<T, S>(source: &S, key: &str, index: i64, default: T) -> T
where
    T: FromValue,
    S: TelemetrySource + ?Sized,
{
    if !source.is_ready() {
        return default;
    }
    let Ok(index) = usize::try_from(index) else {
        return default;
    };
    source
        .get(key)
        .and_then(|value| value.as_array())
        .and_then(|items| items.get(index))
        .and_then(T::from_value)
        .unwrap_or(default)
}
