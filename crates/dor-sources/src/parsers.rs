//! Response parsing strategies.
//!
//! Every endpoint is paired with one [`RateParser`] variant. Parsing returns
//! the rate in percent; callers convert to basis points.

use crate::SourceError;
use dor_types::{RateParser, RateScale};
use serde_json::Value;

/// Extracts a rate in percent from an endpoint's JSON body.
pub fn extract_percent(parser: &RateParser, body: &Value) -> Result<f64, SourceError> {
	match parser {
		RateParser::Field { pointers, scale } => first_number(body, pointers, *scale),
		RateParser::SeriesLatest {
			array,
			pointers,
			scale,
		} => {
			let latest = as_array(body, array)?
				.last()
				.ok_or_else(|| SourceError::Parse(format!("Array at {} is empty", array)))?;
			first_number(latest, pointers, *scale)
		}
		RateParser::PoolLookup {
			array,
			filter,
			pointers,
			scale,
		} => {
			let entry = as_array(body, array)?
				.iter()
				.find(|entry| {
					filter
						.iter()
						.all(|(key, expected)| field_matches(entry.get(key), expected))
				})
				.ok_or_else(|| {
					SourceError::Parse(format!("No entry at {} matches {:?}", array, filter))
				})?;
			first_number(entry, pointers, *scale)
		}
	}
}

fn as_array<'a>(body: &'a Value, pointer: &str) -> Result<&'a Vec<Value>, SourceError> {
	body.pointer(pointer)
		.and_then(Value::as_array)
		.ok_or_else(|| SourceError::Parse(format!("No array at {}", pointer)))
}

fn field_matches(value: Option<&Value>, expected: &str) -> bool {
	match value {
		Some(Value::String(s)) => s.eq_ignore_ascii_case(expected),
		Some(Value::Number(n)) => n.to_string() == expected,
		Some(Value::Bool(b)) => b.to_string() == expected,
		_ => false,
	}
}

/// Tries each pointer in order and returns the first usable number.
fn first_number(value: &Value, pointers: &[String], scale: RateScale) -> Result<f64, SourceError> {
	for pointer in pointers {
		let number = match value.pointer(pointer) {
			Some(Value::Number(n)) => n.as_f64(),
			Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
			_ => None,
		};

		match number {
			Some(n) if n.is_finite() => {
				return Ok(match scale {
					RateScale::Percent => n,
					RateScale::Fraction => n * 100.0,
				})
			}
			Some(n) => return Err(SourceError::NotFinite(n)),
			None => continue,
		}
	}

	Err(SourceError::MissingField(pointers.join(", ")))
}
