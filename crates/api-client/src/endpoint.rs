//! Target resolution against the configured base URL

/// Resolve a request target.
///
/// Absolute `http://` / `https://` targets (any case) are used verbatim.
/// Relative targets are joined to `base` with exactly one `/` between them.
/// An empty target resolves to the base itself.
pub fn resolve_url(base: &str, target: &str) -> String {
    let base = base.trim_end_matches('/');
    if target.is_empty() {
        return base.to_owned();
    }
    if is_absolute(target) {
        return target.to_owned();
    }
    format!("{base}/{}", target.trim_start_matches('/'))
}

fn is_absolute(target: &str) -> bool {
    ["http://", "https://"].iter().any(|scheme| {
        target
            .get(..scheme.len())
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case(scheme))
    })
}
