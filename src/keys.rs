/// Shape key resolution.
///
/// Callers may pass full 12-character municipality keys or shorter prefixes
/// (state, district, ...). All identifiers are folded into one anchored
/// alternation which the store evaluates against its municipality keys.

use crate::model::{AreaQuery, FULL_KEY_LENGTH, MatchPattern, MunicipalityKey};
use crate::error::PipelineError;
use crate::store::ForecastStore;

/// Builds the pattern matching every identifier and, for prefixes, every
/// key below it.
///
/// Returns `None` when the query holds no usable identifier.
///
/// # Example
/// ```
/// use water_forecast_service::keys::build_match_pattern;
/// use water_forecast_service::model::AreaQuery;
///
/// let pattern = build_match_pattern(&AreaQuery::new(["06001", "060020000000"])).unwrap();
/// assert_eq!(pattern.as_str(), r"^(06001\d{7}|060020000000)$");
/// ```
pub fn build_match_pattern(query: &AreaQuery) -> Option<MatchPattern> {
    let mut terms: Vec<String> = Vec::new();

    for identifier in &query.identifiers {
        let identifier = identifier.trim();
        if identifier.is_empty() {
            continue;
        }

        let escaped = regex::escape(identifier);
        let length = identifier.chars().count();
        let term = if length < FULL_KEY_LENGTH {
            format!(r"{}\d{{{}}}", escaped, FULL_KEY_LENGTH - length)
        } else {
            escaped
        };

        if !terms.contains(&term) {
            terms.push(term);
        }
    }

    if terms.is_empty() {
        return None;
    }

    Some(MatchPattern(format!("^({})$", terms.join("|"))))
}

/// Looks up all municipality keys matching the pattern. May be empty.
///
/// A failed lookup is reported as [`PipelineError::ResolveKeys`].
pub fn resolve_keys<S: ForecastStore + ?Sized>(
    store: &mut S,
    pattern: &MatchPattern,
) -> Result<Vec<MunicipalityKey>, PipelineError> {
    let keys = store
        .resolve_keys(pattern)
        .map_err(PipelineError::ResolveKeys)?;
    log::debug!("pattern {} resolved to {} municipality keys", pattern, keys.len());
    Ok(keys)
}
