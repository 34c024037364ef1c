use std::fmt;

/// Why a command payload was dropped
#[derive(Debug, Clone, PartialEq)]
pub enum CommandError {
    /// Payload is not one of the accepted literals
    UnknownPayload(String),
    /// Payload does not parse as a number
    NotANumber(String),
    /// Payload is not one of the configured options
    UnknownOption(String),
    /// Payload exceeds the maximum length
    TooLong { length: usize, max: usize },
    /// Payload is not valid UTF-8
    InvalidUtf8,
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandError::UnknownPayload(p) => write!(f, "unknown payload '{}'", p),
            CommandError::NotANumber(p) => write!(f, "'{}' is not a number", p),
            CommandError::UnknownOption(p) => write!(f, "'{}' is not a configured option", p),
            CommandError::TooLong { length, max } => {
                write!(f, "payload length {} exceeds maximum {}", length, max)
            }
            CommandError::InvalidUtf8 => write!(f, "payload is not valid UTF-8"),
        }
    }
}

impl std::error::Error for CommandError {}

/// Payload as text, rejecting invalid UTF-8
pub fn decode_text(payload: &[u8]) -> Result<String, CommandError> {
    std::str::from_utf8(payload)
        .map(str::to_string)
        .map_err(|_| CommandError::InvalidUtf8)
}

/// Exact match against the two accepted literals
pub fn decode_bool(payload: &[u8], on: &str, off: &str) -> Result<bool, CommandError> {
    let text = decode_text(payload)?;
    if text == on {
        Ok(true)
    } else if text == off {
        Ok(false)
    } else {
        Err(CommandError::UnknownPayload(text))
    }
}

/// Integer clamped inclusively to `[min, max]`.
///
/// A finite decimal payload is rounded to the nearest integer.
pub fn decode_integer(payload: &[u8], min: i64, max: i64) -> Result<i64, CommandError> {
    let text = decode_text(payload)?;
    let trimmed = text.trim();

    let value = match trimmed.parse::<i64>() {
        Ok(v) => v,
        Err(_) => match trimmed.parse::<f64>() {
            Ok(f) if f.is_finite() => f.round() as i64,
            _ => return Err(CommandError::NotANumber(text)),
        },
    };

    Ok(value.clamp(min, max))
}

/// Decimal clamped inclusively to `[min, max]`
pub fn decode_decimal(payload: &[u8], min: f64, max: f64) -> Result<f64, CommandError> {
    let text = decode_text(payload)?;
    match text.trim().parse::<f64>() {
        Ok(f) if f.is_finite() => Ok(f.clamp(min, max)),
        _ => Err(CommandError::NotANumber(text)),
    }
}

/// Exact member of `options`
pub fn decode_option(payload: &[u8], options: &[String]) -> Result<String, CommandError> {
    let text = decode_text(payload)?;
    if options.iter().any(|option| *option == text) {
        Ok(text)
    } else {
        Err(CommandError::UnknownOption(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_bool_exact_match() {
        assert_eq!(decode_bool(b"true", "true", "false"), Ok(true));
        assert_eq!(decode_bool(b"false", "true", "false"), Ok(false));
        assert_eq!(
            decode_bool(b"TRUE", "true", "false"),
            Err(CommandError::UnknownPayload("TRUE".to_string()))
        );
        assert_eq!(
            decode_bool(b" true", "true", "false"),
            Err(CommandError::UnknownPayload(" true".to_string()))
        );
    }

    #[test]
    fn test_decode_integer_clamps_inclusively() {
        assert_eq!(decode_integer(b"55", 0, 100), Ok(55));
        assert_eq!(decode_integer(b"150", 0, 100), Ok(100));
        assert_eq!(decode_integer(b"-3", 0, 100), Ok(0));
        assert_eq!(decode_integer(b"0", 0, 100), Ok(0));
        assert_eq!(decode_integer(b"100", 0, 100), Ok(100));
    }

    #[test]
    fn test_decode_integer_accepts_decimals_and_whitespace() {
        assert_eq!(decode_integer(b"42.0", 0, 100), Ok(42));
        assert_eq!(decode_integer(b"42.6", 0, 100), Ok(43));
        assert_eq!(decode_integer(b" 7\n", 0, 100), Ok(7));
    }

    #[test]
    fn test_decode_integer_rejects_garbage() {
        assert_eq!(
            decode_integer(b"loud", 0, 100),
            Err(CommandError::NotANumber("loud".to_string()))
        );
        assert!(decode_integer(b"NaN", 0, 100).is_err());
        assert!(decode_integer(b"", 0, 100).is_err());
    }

    #[test]
    fn test_decode_decimal() {
        assert_eq!(decode_decimal(b"0.25", 0.0, 1.0), Ok(0.25));
        assert_eq!(decode_decimal(b"3", 0.0, 1.0), Ok(1.0));
        assert!(decode_decimal(b"inf", 0.0, 1.0).is_err());
    }

    #[test]
    fn test_decode_option() {
        let options = vec!["work".to_string(), "gaming".to_string()];
        assert_eq!(decode_option(b"gaming", &options), Ok("gaming".to_string()));
        assert_eq!(
            decode_option(b"sleep", &options),
            Err(CommandError::UnknownOption("sleep".to_string()))
        );
    }

    #[test]
    fn test_invalid_utf8() {
        assert_eq!(decode_text(&[0xff, 0xfe]), Err(CommandError::InvalidUtf8));
    }
}
