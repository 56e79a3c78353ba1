//! URL resolution for playlist entries (§4.2): absolute entry URLs are used
//! as-is; relative ones are resolved by directory replacement against the
//! base URL, with the entry's query parameters merged into the base's query
//! (entry wins on duplicate keys).

pub fn resolve_url(base_url: &str, entry: &str) -> String {
    let entry = entry.trim();
    if is_absolute(entry) {
        return entry.to_string();
    }

    let (base_path, base_query) = split_query(base_url);
    let dir = match base_path.rfind('/') {
        Some(idx) => &base_path[..=idx],
        None => "",
    };
    let (entry_path, entry_query) = split_query(entry);
    let merged_path = format!("{dir}{entry_path}");
    let merged_query = merge_query(base_query, entry_query);

    if merged_query.is_empty() {
        merged_path
    } else {
        format!("{merged_path}?{merged_query}")
    }
}

fn is_absolute(s: &str) -> bool {
    s.contains("://")
}

fn split_query(s: &str) -> (&str, &str) {
    match s.find('?') {
        Some(idx) => (&s[..idx], &s[idx + 1..]),
        None => (s, ""),
    }
}

fn merge_query(base_query: &str, entry_query: &str) -> String {
    let mut pairs: Vec<(String, String)> = Vec::new();
    let mut upsert = |k: String, v: String| {
        if let Some(existing) = pairs.iter_mut().find(|(ek, _)| *ek == k) {
            existing.1 = v;
        } else {
            pairs.push((k, v));
        }
    };
    for kv in base_query.split('&').filter(|s| !s.is_empty()) {
        let (k, v) = split_kv(kv);
        upsert(k, v);
    }
    for kv in entry_query.split('&').filter(|s| !s.is_empty()) {
        let (k, v) = split_kv(kv);
        upsert(k, v);
    }
    pairs
        .into_iter()
        .map(|(k, v)| if v.is_empty() { k } else { format!("{k}={v}") })
        .collect::<Vec<_>>()
        .join("&")
}

fn split_kv(s: &str) -> (String, String) {
    match s.find('=') {
        Some(idx) => (s[..idx].to_string(), s[idx + 1..].to_string()),
        None => (s.to_string(), String::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absolute_entry_is_used_verbatim() {
        let resolved = resolve_url(
            "https://server/hls/abc/master.m3u8",
            "https://cdn.example.com/seg1.ts",
        );
        assert_eq!(resolved, "https://cdn.example.com/seg1.ts");
    }

    #[test]
    fn relative_entry_resolves_by_directory_replacement() {
        let resolved = resolve_url("https://server/hls/abc/master.m3u8", "720p/stream.m3u8");
        assert_eq!(resolved, "https://server/hls/abc/720p/stream.m3u8");
    }

    #[test]
    fn relative_entry_one_level_up_style_path_is_still_appended() {
        let resolved = resolve_url("https://server/hls/abc/", "seg0.ts");
        assert_eq!(resolved, "https://server/hls/abc/seg0.ts");
    }

    #[test]
    fn entry_query_params_merge_over_base_and_win_on_conflict() {
        let resolved = resolve_url(
            "https://server/hls/abc/master.m3u8?token=base&lang=en",
            "seg1.ts?token=fresh",
        );
        assert_eq!(
            resolved,
            "https://server/hls/abc/seg1.ts?token=fresh&lang=en"
        );
    }

    #[test]
    fn no_query_anywhere_yields_no_trailing_question_mark() {
        let resolved = resolve_url("https://server/hls/abc/master.m3u8", "seg1.ts");
        assert!(!resolved.contains('?'));
    }
}
