//! The `widget` host module imported by WASM bundles.
//!
//! | import                                          | behaviour                                   |
//! |-------------------------------------------------|---------------------------------------------|
//! | `input_len(name_ptr, name_len) -> i32`          | byte length of the input, `-1` if absent     |
//! | `input_read(name_ptr, name_len, dst, cap) -> i32` | copy up to `cap` bytes, `-1` if absent     |
//! | `input_number(name_ptr, name_len) -> f64`       | parse the input as a number, raise if not    |
//! | `output(ptr, len)`                              | set the result text                          |
//! | `output_number(value: f64)`                     | set the result to the number's text form     |
//! | `fail(ptr, len)`                                | raise an execution failure with that message |
//!
//! File inputs are seen as their stored path.

use anyhow::{Result, anyhow};
use wasmtime::{Caller, Extern, Linker, Memory};

use crate::widget_state::WidgetState;

pub const HOST_MODULE: &str = "widget";

pub fn add_to_linker(linker: &mut Linker<WidgetState>) -> Result<()> {
    linker.func_wrap(
        HOST_MODULE,
        "input_len",
        |mut caller: Caller<'_, WidgetState>, name_ptr: i32, name_len: i32| -> Result<i32> {
            let name = read_string(&mut caller, name_ptr, name_len)?;
            Ok(caller
                .data()
                .inputs
                .get(&name)
                .map(|value| clamp_len(value.as_text().len()))
                .unwrap_or(-1))
        },
    )?;

    linker.func_wrap(
        HOST_MODULE,
        "input_read",
        |mut caller: Caller<'_, WidgetState>,
         name_ptr: i32,
         name_len: i32,
         dst_ptr: i32,
         dst_cap: i32|
         -> Result<i32> {
            let name = read_string(&mut caller, name_ptr, name_len)?;
            let Some(value) = caller.data().inputs.get(&name).map(|v| v.as_text()) else {
                return Ok(-1);
            };
            let cap = usize::try_from(dst_cap).map_err(|_| anyhow!("negative buffer capacity"))?;
            let count = value.len().min(cap);
            let offset = usize::try_from(dst_ptr).map_err(|_| anyhow!("negative buffer pointer"))?;
            let memory = memory(&mut caller)?;
            memory
                .write(&mut caller, offset, &value.as_bytes()[..count])
                .map_err(|e| anyhow!("input_read out of bounds: {e}"))?;
            Ok(clamp_len(count))
        },
    )?;

    linker.func_wrap(
        HOST_MODULE,
        "input_number",
        |mut caller: Caller<'_, WidgetState>, name_ptr: i32, name_len: i32| -> Result<f64> {
            let name = read_string(&mut caller, name_ptr, name_len)?;
            let Some(text) = caller.data().inputs.get(&name).map(|v| v.as_text()) else {
                return Err(raise(&mut caller, format!("input '{name}' is missing")));
            };
            match text.trim().parse::<f64>() {
                Ok(value) => Ok(value),
                Err(_) => Err(raise(
                    &mut caller,
                    format!("input '{name}' is not a number: '{text}'"),
                )),
            }
        },
    )?;

    linker.func_wrap(
        HOST_MODULE,
        "output",
        |mut caller: Caller<'_, WidgetState>, ptr: i32, len: i32| -> Result<()> {
            let text = read_string(&mut caller, ptr, len)?;
            caller.data_mut().output = Some(text);
            Ok(())
        },
    )?;

    linker.func_wrap(
        HOST_MODULE,
        "output_number",
        |mut caller: Caller<'_, WidgetState>, value: f64| -> Result<()> {
            caller.data_mut().output = Some(format_number(value));
            Ok(())
        },
    )?;

    linker.func_wrap(
        HOST_MODULE,
        "fail",
        |mut caller: Caller<'_, WidgetState>, ptr: i32, len: i32| -> Result<()> {
            let message = read_string(&mut caller, ptr, len)?;
            Err(raise(&mut caller, message))
        },
    )?;

    Ok(())
}

/// Record `message` as the invocation's failure and build the trap error.
fn raise(caller: &mut Caller<'_, WidgetState>, message: String) -> anyhow::Error {
    let error = anyhow!("widget raised: {message}");
    caller.data_mut().failure = Some(message);
    error
}

fn memory(caller: &mut Caller<'_, WidgetState>) -> Result<Memory> {
    caller
        .get_export("memory")
        .and_then(Extern::into_memory)
        .ok_or_else(|| anyhow!("widget module does not export 'memory'"))
}

fn read_string(caller: &mut Caller<'_, WidgetState>, ptr: i32, len: i32) -> Result<String> {
    let start = usize::try_from(ptr).map_err(|_| anyhow!("negative string pointer"))?;
    let len = usize::try_from(len).map_err(|_| anyhow!("negative string length"))?;
    let end = start
        .checked_add(len)
        .ok_or_else(|| anyhow!("string range overflows"))?;

    let memory = memory(caller)?;
    let bytes = memory
        .data(&*caller)
        .get(start..end)
        .ok_or_else(|| anyhow!("string range {start}..{end} is out of bounds"))?;
    String::from_utf8(bytes.to_vec()).map_err(|e| anyhow!("string is not UTF-8: {e}"))
}

fn clamp_len(len: usize) -> i32 {
    i32::try_from(len).unwrap_or(i32::MAX)
}

/// Render a number the way a Python widget's `str()` would for ints and
/// floats: integral values without a fractional part.
pub fn format_number(value: f64) -> String {
    if value.is_nan() {
        return "nan".into();
    }
    if value.is_infinite() {
        return if value > 0.0 { "inf".into() } else { "-inf".into() };
    }
    if value.fract() == 0.0 && value.abs() < 1e15 {
        return format!("{}", value as i64);
    }
    format!("{value}")
}
