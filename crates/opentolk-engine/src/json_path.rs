//! Response-path extraction: `data.items[0].text` style lookups into a
//! parsed JSON response.

use serde_json::Value;

#[derive(Debug, PartialEq, Eq)]
enum Segment<'a> {
    Key(&'a str),
    Index(usize),
}

/// Split a path into keys and indices.  Returns `None` for malformed
/// brackets.
fn segments(path: &str) -> Option<Vec<Segment<'_>>> {
    let mut out = Vec::new();
    for part in path.split('.').map(str::trim).filter(|p| !p.is_empty()) {
        let (key, mut rest) = match part.find('[') {
            Some(open) => (&part[..open], &part[open..]),
            None => (part, ""),
        };
        if !key.is_empty() {
            out.push(Segment::Key(key));
        }
        while let Some(inner) = rest.strip_prefix('[') {
            let close = inner.find(']')?;
            out.push(Segment::Index(inner[..close].trim().parse().ok()?));
            rest = &inner[close + 1..];
        }
        if !rest.is_empty() {
            return None;
        }
    }
    Some(out)
}

/// Select the value at `path`.
pub fn select<'v>(value: &'v Value, path: &str) -> Option<&'v Value> {
    segments(path)?
        .into_iter()
        .try_fold(value, |current, segment| match segment {
            Segment::Key(key) => current.get(key),
            Segment::Index(index) => current.get(index),
        })
}

/// Select the value at `path` as text: strings as-is, anything else
/// serialized back to JSON.
pub fn extract_path(value: &Value, path: &str) -> Option<String> {
    select(value, path).map(|found| match found {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    })
}
