//! Helpers for model output that is supposed to be JSON.

/// Pull a JSON object out of model output: bare, fenced (```json or ```),
/// or embedded in surrounding prose.
pub fn extract_json(response: &str) -> Option<&str> {
    let t = response.trim();
    if t.starts_with('{') && t.ends_with('}') {
        return Some(t);
    }

    if let Some(start) = t.find("```") {
        let after_fence = &t[start + 3..];
        // Skip the language tag line
        let body_start = after_fence.find('\n').map(|i| i + 1).unwrap_or(0);
        let body = &after_fence[body_start..];
        if let Some(end) = body.find("```") {
            let inner = body[..end].trim();
            if inner.starts_with('{') {
                return Some(inner);
            }
        }
    }

    match (t.find('{'), t.rfind('}')) {
        (Some(s), Some(e)) if s < e => Some(&t[s..=e]),
        _ => None,
    }
}
