use std::str;

use crate::protocol::{MetricType, MetricUpdate, MetricValue, ParseMetricError};

/// A read position over an immutable line.
#[derive(Clone, Debug)]
struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(bytes: &'a [u8], pos: usize) -> Self {
        Self { bytes, pos }
    }

    fn position(&self) -> usize {
        self.pos
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn bump(&mut self) {
        self.pos = (self.pos + 1).min(self.bytes.len());
    }

    /// Advances past `byte` if it is the next byte.
    fn eat(&mut self, byte: u8) -> bool {
        if self.peek() == Some(byte) {
            self.bump();
            true
        } else {
            false
        }
    }

    /// Advances while `f` matches and returns the consumed bytes.
    fn eat_while(&mut self, f: impl Fn(u8) -> bool) -> &'a [u8] {
        let start = self.pos;
        while self.peek().is_some_and(&f) {
            self.bump();
        }
        &self.bytes[start..self.pos]
    }

    fn rest(&self) -> &'a [u8] {
        &self.bytes[self.pos..]
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.bytes.len()
    }
}

/// Parses a single statsd line into a [`MetricUpdate`].
///
/// The line must not contain the trailing newline. Spaces in the key are rewritten to `_` in
/// place, which is why the line is borrowed mutably. The returned update borrows from the line.
///
/// The supported format is:
///
/// ```text
/// <key>:<value>|<type>[|@<sample_rate>]
/// ```
///
/// # Example
///
/// ```
/// use sluice_metrics::{parse_line, MetricType, MetricValue};
///
/// let mut line = *b"my key:-5.5|ms";
/// let update = parse_line(&mut line).unwrap();
///
/// assert_eq!(update.key, "my_key");
/// assert_eq!(update.ty, MetricType::Timer);
/// assert_eq!(update.value, MetricValue::Number(-5.5));
/// ```
pub fn parse_line<'a>(line: &'a mut [u8]) -> Result<MetricUpdate<'a>, ParseMetricError> {
    // A NUL byte ends the line.
    let line = match line.iter().position(|&b| b == b'\0') {
        Some(end) => &mut line[..end],
        None => line,
    };

    let key_len = normalize_key(line)?;
    let line: &'a [u8] = line;

    let key = &line[..key_len];
    if key.is_empty() || key.ends_with(b".") {
        return Err(ParseMetricError::MalformedKey);
    }
    let key = str::from_utf8(key).map_err(|_| ParseMetricError::MalformedKey)?;

    let mut cursor = Cursor::new(line, key_len + 1);
    let raw_value = cursor.eat_while(|b| !matches!(b, b'|' | b'\n'));
    if !cursor.eat(b'|') {
        return Err(ParseMetricError::MalformedType);
    }

    let ty = parse_type(&mut cursor)?;
    let sample_rate = parse_sample_rate(cursor.rest())?;

    let value = match ty {
        MetricType::Set => {
            let raw = str::from_utf8(raw_value).map_err(|_| ParseMetricError::MalformedValue)?;
            MetricValue::Set(raw)
        }
        _ => MetricValue::Number(parse_number(raw_value)?),
    };

    Ok(MetricUpdate {
        key,
        ty,
        value,
        sample_rate,
    })
}

/// Rewrites spaces in the key and returns the position of the `:` delimiter.
fn normalize_key(line: &mut [u8]) -> Result<usize, ParseMetricError> {
    for (index, byte) in line.iter_mut().enumerate() {
        match *byte {
            b':' => return Ok(index),
            b' ' => *byte = b'_',
            _ => (),
        }
    }

    Err(ParseMetricError::MalformedKey)
}

fn parse_type(cursor: &mut Cursor<'_>) -> Result<MetricType, ParseMetricError> {
    let ty = match cursor.peek() {
        Some(b'g') => MetricType::Gauge,
        Some(b'C') => MetricType::Meter,
        Some(b'c') => MetricType::Counter,
        Some(b'h') => MetricType::Histogram,
        Some(b's') => MetricType::Set,
        Some(b'm') => {
            cursor.bump();
            if cursor.peek() != Some(b's') {
                return Err(ParseMetricError::MalformedType);
            }
            MetricType::Timer
        }
        _ => return Err(ParseMetricError::MalformedType),
    };

    cursor.bump();
    Ok(ty)
}

/// Parses the trailing bytes after the type selector.
///
/// Anything that does not start with a number after skipping `@` and `|` yields a rate of `0.0`
/// and is therefore rejected.
fn parse_sample_rate(rest: &[u8]) -> Result<f64, ParseMetricError> {
    if matches!(rest, [] | [b'\n'] | [b'\r']) {
        return Ok(1.0);
    }

    let mut cursor = Cursor::new(rest, 0);
    cursor.eat_while(|b| b == b'@' || b == b'|');

    let rate = parse_float_prefix(cursor.rest()).map_or(0.0, |(value, _)| value);
    if rate > 0.0 && rate <= 1.0 {
        Ok(rate)
    } else {
        Err(ParseMetricError::MalformedSampleRate)
    }
}

/// Parses a numeric value, requiring the entire input to be consumed.
///
/// Plain decimals are accumulated digit by digit. Values with an exponent fall back to the
/// standard float parser.
fn parse_number(raw: &[u8]) -> Result<f64, ParseMetricError> {
    let mut cursor = Cursor::new(raw, 0);
    cursor.eat_while(|b| b == b' ');
    let start = cursor.position();

    let negative = cursor.eat(b'-');
    let mut value = accumulate(cursor.eat_while(|b| b.is_ascii_digit()));

    if cursor.eat(b'.') {
        let fraction = cursor.eat_while(|b| b.is_ascii_digit());
        value += accumulate(fraction) / 10f64.powi(fraction.len() as i32);
    }

    if negative {
        value = -value;
    }

    if matches!(cursor.peek(), Some(b'e' | b'E')) {
        let (parsed, consumed) =
            parse_float_prefix(&raw[start..]).ok_or(ParseMetricError::MalformedValue)?;
        value = parsed;
        cursor = Cursor::new(raw, start + consumed);
    }

    if cursor.is_empty() {
        Ok(value)
    } else {
        Err(ParseMetricError::MalformedValue)
    }
}

fn accumulate(digits: &[u8]) -> f64 {
    digits
        .iter()
        .fold(0.0, |acc, digit| acc * 10.0 + f64::from(digit - b'0'))
}

/// Parses the longest prefix of `bytes` that forms a decimal float.
///
/// Leading spaces are skipped. Returns the value and the number of bytes consumed, including the
/// skipped spaces, or `None` if there is no numeric prefix.
fn parse_float_prefix(bytes: &[u8]) -> Option<(f64, usize)> {
    let mut cursor = Cursor::new(bytes, 0);
    cursor.eat_while(|b| b == b' ');
    let start = cursor.position();

    if !cursor.eat(b'-') {
        cursor.eat(b'+');
    }

    let integer = cursor.eat_while(|b| b.is_ascii_digit());
    let mut fraction: &[u8] = &[];
    let before_dot = cursor.clone();
    if cursor.eat(b'.') {
        fraction = cursor.eat_while(|b| b.is_ascii_digit());
        if integer.is_empty() && fraction.is_empty() {
            cursor = before_dot;
        }
    }

    if integer.is_empty() && fraction.is_empty() {
        return None;
    }

    // The exponent only counts if at least one digit follows the marker.
    let mantissa_end = cursor.clone();
    if cursor.eat(b'e') || cursor.eat(b'E') {
        if !cursor.eat(b'-') {
            cursor.eat(b'+');
        }
        if cursor.eat_while(|b| b.is_ascii_digit()).is_empty() {
            cursor = mantissa_end;
        }
    }

    let end = cursor.position();
    let text = str::from_utf8(&bytes[start..end]).ok()?;
    let value = text.parse().ok()?;
    Some((value, end))
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;

    fn parse(line: &str) -> Result<MetricUpdate<'static>, ParseMetricError> {
        let buf = line.as_bytes().to_vec().leak();
        parse_line(buf)
    }

    #[test]
    fn test_parse_counter() {
        let update = parse("gorets:1|c").unwrap();
        insta::assert_debug_snapshot!(update, @r###"
        MetricUpdate {
            key: "gorets",
            ty: Counter,
            value: Number(
                1.0,
            ),
            sample_rate: 1.0,
        }
        "###);
    }

    #[test]
    fn test_parse_gauge() {
        let update = parse("gaugor:333|g").unwrap();
        assert_eq!(update.ty, MetricType::Gauge);
        assert_eq!(update.value, MetricValue::Number(333.0));
    }

    #[test]
    fn test_parse_set() {
        let update = parse("uniques:765|s").unwrap();
        insta::assert_debug_snapshot!(update, @r###"
        MetricUpdate {
            key: "uniques",
            ty: Set,
            value: Set(
                "765",
            ),
            sample_rate: 1.0,
        }
        "###);
    }

    #[test]
    fn test_parse_set_text() {
        let update = parse("users:jane doe|s").unwrap();
        assert_eq!(update.value, MetricValue::Set("jane doe"));
    }

    #[test]
    fn test_parse_sample_rate() {
        let update = parse("gorets:1|c|@0.1").unwrap();
        assert_eq!(update.ty, MetricType::Counter);
        assert_eq!(update.value, MetricValue::Number(1.0));
        assert_eq!(update.sample_rate, 0.1);
    }

    #[test]
    fn test_parse_sample_rate_without_pipe() {
        let update = parse("gorets:1|c@0.5").unwrap();
        assert_eq!(update.sample_rate, 0.5);
    }

    #[test]
    fn test_parse_sample_rate_terminators() {
        for line in ["hits:1|c\n", "hits:1|c\r", "hits:1|c\0"] {
            assert_eq!(parse(line).unwrap().sample_rate, 1.0, "{line:?}");
        }
    }

    #[test]
    fn test_parse_sample_rate_out_of_range() {
        for line in ["hits:1|c|@0", "hits:1|c|@1.5", "hits:1|c|@-0.5", "hits:1|c|@abc"] {
            assert_eq!(
                parse(line),
                Err(ParseMetricError::MalformedSampleRate),
                "{line:?}"
            );
        }
    }

    #[test]
    fn test_parse_sample_rate_one() {
        assert_eq!(parse("hits:1|c|@1").unwrap().sample_rate, 1.0);
    }

    #[test]
    fn test_parse_timer_leading_space() {
        let update = parse("sample: -5.5|ms").unwrap();
        assert_eq!(update.ty, MetricType::Timer);
        assert_eq!(update.value, MetricValue::Number(-5.5));
    }

    #[test]
    fn test_parse_meter_and_histogram() {
        assert_eq!(parse("rate:2|C").unwrap().ty, MetricType::Meter);
        assert_eq!(parse("size:7.25|h").unwrap().value, MetricValue::Number(7.25));
    }

    #[test]
    fn test_parse_exponent() {
        assert_eq!(parse("big:1e3|g").unwrap().value, MetricValue::Number(1000.0));
        assert_eq!(
            parse("small:-2.5E-1|g").unwrap().value,
            MetricValue::Number(-0.25)
        );
    }

    #[test]
    fn test_parse_empty_value() {
        assert_eq!(parse("empty:|c").unwrap().value, MetricValue::Number(0.0));
    }

    #[test]
    fn test_parse_space_in_key() {
        let mut line = *b"my key:1|c";
        let update = parse_line(&mut line).unwrap();
        assert_eq!(update.key, "my_key");
        assert_eq!(&line, b"my_key:1|c");
    }

    #[test]
    fn test_parse_bad_type() {
        assert_eq!(parse("bad:1|x"), Err(ParseMetricError::MalformedType));
        assert_eq!(parse("bad:1|m"), Err(ParseMetricError::MalformedType));
        assert_eq!(parse("bad:1|"), Err(ParseMetricError::MalformedType));
    }

    #[test]
    fn test_parse_missing_pipe() {
        assert_eq!(parse("bad:1"), Err(ParseMetricError::MalformedType));
        assert_eq!(parse("bad:1\n|c"), Err(ParseMetricError::MalformedType));
    }

    #[test]
    fn test_parse_bad_key() {
        assert_eq!(parse("nocolon"), Err(ParseMetricError::MalformedKey));
        assert_eq!(parse(":1|c"), Err(ParseMetricError::MalformedKey));
        assert_eq!(parse("trailing.:1|c"), Err(ParseMetricError::MalformedKey));
        assert_eq!(parse("nul\0key:1|c"), Err(ParseMetricError::MalformedKey));
    }

    #[test]
    fn test_parse_key_not_utf8() {
        let mut line = b"ke\xffy:1|c".to_vec();
        assert_eq!(parse_line(&mut line), Err(ParseMetricError::MalformedKey));
    }

    #[test]
    fn test_parse_trailing_garbage() {
        assert_eq!(parse("bad:12abc|c"), Err(ParseMetricError::MalformedValue));
        assert_eq!(parse("bad:1.2.3|g"), Err(ParseMetricError::MalformedValue));
        assert_eq!(parse("bad:1e|g"), Err(ParseMetricError::MalformedValue));
    }

    #[test]
    fn test_parse_stops_at_nul() {
        let update = parse("hits:1|c\0junk").unwrap();
        assert_eq!(update.key, "hits");
        assert_eq!(update.ty, MetricType::Counter);
        assert_eq!(update.value, MetricValue::Number(1.0));
        assert_eq!(update.sample_rate, 1.0);

        assert_eq!(parse("hits\0:1|c"), Err(ParseMetricError::MalformedKey));
        assert_eq!(parse("hits:1\0|c"), Err(ParseMetricError::MalformedType));
    }

    #[test]
    fn test_float_prefix() {
        assert_eq!(parse_float_prefix(b"0.25xyz"), Some((0.25, 4)));
        assert_eq!(parse_float_prefix(b" 3"), Some((3.0, 2)));
        assert_eq!(parse_float_prefix(b"1e"), Some((1.0, 1)));
        assert_eq!(parse_float_prefix(b".5"), Some((0.5, 2)));
        assert_eq!(parse_float_prefix(b"."), None);
        assert_eq!(parse_float_prefix(b""), None);
    }
}
