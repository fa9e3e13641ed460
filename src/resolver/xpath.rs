use crate::ResolveError;

/// Splits a slash-delimited xpath into its elements.
///
/// A single leading `/` is accepted. Empty or whitespace-only segments are
/// rejected, so `COUNTERS//Ethernet0` and `COUNTERS/` are both invalid.
pub fn parse_xpath(xpath: &str) -> Result<Vec<String>, ResolveError> {
    let trimmed = xpath.strip_prefix('/').unwrap_or(xpath);
    if trimmed.is_empty() {
        return Err(invalid(xpath, "path is empty"));
    }

    let elems: Vec<String> = trimmed.split('/').map(str::to_string).collect();
    validate_elems(xpath, &elems)?;
    Ok(elems)
}

/// Applies the segment rules of [`parse_xpath`] to already split elements
pub fn validate_elems(
    xpath: &str,
    elems: &[String],
) -> Result<(), ResolveError> {
    if elems.is_empty() {
        return Err(invalid(xpath, "path is empty"));
    }
    if let Some(pos) = elems.iter().position(|e| e.trim().is_empty()) {
        return Err(invalid(xpath, &format!("segment {} is empty", pos + 1)));
    }
    Ok(())
}

fn invalid(
    path: &str,
    reason: &str,
) -> ResolveError {
    ResolveError::InvalidPath {
        path: path.to_string(),
        reason: reason.to_string(),
    }
}
