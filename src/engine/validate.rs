use super::{EngineError, Language};

/// Rejects a request before any resource is allocated for it
///
/// The language tag must name a supported language and the code must contain
/// something other than whitespace.
pub fn validate(language: &str, code: &str) -> Result<Language, EngineError> {
    let language = language.parse::<Language>()?;
    if code.trim().is_empty() {
        return Err(EngineError::EmptyInput);
    }
    Ok(language)
}
