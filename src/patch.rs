//! Patch Applier
//!
//! Writes version changes back into source text. Every edit is a splice of
//! the version token alone, so quoting, whitespace, comments and key order
//! survive untouched. Text that no longer matches what the graph reported is
//! rejected with `MalformedSpan` instead of being patched blindly.

use crate::specifier::Dependency;
use crate::update::{ImportMapIndirection, Update};
use crate::{Error, Result};
use std::collections::HashSet;
use std::ops::Range;
use std::path::{Path, PathBuf};

/// New content for one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    pub path: PathBuf,
    pub content: String,
}

impl FileChange {
    /// Persist the new content
    pub fn write(&self) -> Result<()> {
        std::fs::write(&self.path, &self.content)?;
        Ok(())
    }
}

/// Apply an update to whichever text it targets
pub fn apply(update: &Update, text: &str) -> Result<String> {
    match update.map {
        Some(_) => apply_to_import_map(update, text),
        None => apply_to_module(update, text),
    }
}

/// Replace the version token of the specifier at `update.span`
pub fn apply_to_module(update: &Update, text: &str) -> Result<String> {
    let span = update.span;
    let malformed = |message: String| Error::MalformedSpan {
        location: update.referrer.display().to_string(),
        message,
    };

    if span.start > span.end
        || span.end > text.len()
        || !text.is_char_boundary(span.start)
        || !text.is_char_boundary(span.end)
    {
        return Err(malformed(format!(
            "span {} out of bounds for {} bytes",
            span,
            text.len()
        )));
    }

    let literal = &text[span.start..span.end];
    if literal != update.from {
        return Err(malformed(format!(
            "expected {} at {}, found {}",
            update.from, span, literal
        )));
    }

    let version = version_range(&update.from, &update.referrer)?;
    Ok(splice(
        text,
        span.start + version.start..span.start + version.end,
        &update.version.to,
    ))
}

/// Replace the version token inside the matched import map value
///
/// The entry is looked up structurally: under `imports`, or under the
/// recorded scope of `scopes`, so equal keys in other sections stay put.
pub fn apply_to_import_map(update: &Update, text: &str) -> Result<String> {
    let map = update.map.as_ref().ok_or_else(|| Error::MalformedSpan {
        location: update.referrer.display().to_string(),
        message: format!("{} was not resolved through an import map", update.from),
    })?;
    let malformed = |message: String| Error::MalformedSpan {
        location: map.location.display().to_string(),
        message,
    };

    let value = find_entry(text, map).ok_or_else(|| {
        let section = map.scope.as_deref().unwrap_or("imports");
        malformed(format!("no entry {:?}: {:?} in {}", map.key, map.value, section))
    })?;
    if text[value.clone()] != serde_json::to_string(&map.value)? {
        return Err(malformed(format!("escaped value {} cannot be patched", &text[value])));
    }

    // Offsets inside the JSON literal, past the opening quote
    let version = version_range(&map.value, &map.location)?;
    let range = value.start + 1 + version.start..value.start + 1 + version.end;
    let old = update.version.from.as_deref().unwrap_or_default();
    if text.get(range.clone()) != Some(old) {
        return Err(malformed(format!("version {} not found in {:?}", old, map.value)));
    }

    Ok(splice(text, range, &update.version.to))
}

/// Compute the new content of every file touched by `updates`
///
/// Module updates are applied from the end of the file backwards so earlier
/// spans stay valid. An import map entry shared by several updates is
/// patched once.
pub fn plan(updates: &[Update]) -> Result<Vec<FileChange>> {
    let mut targets: Vec<(&Path, Vec<&Update>)> = Vec::new();
    for update in updates {
        let target = update.target();
        match targets.iter_mut().find(|(path, _)| *path == target) {
            Some((_, group)) => group.push(update),
            None => targets.push((target, vec![update])),
        }
    }

    let mut changes = Vec::with_capacity(targets.len());
    for (path, mut group) in targets {
        let mut content = std::fs::read_to_string(path)?;

        group.sort_by(|a, b| b.span.cmp(&a.span));
        let mut seen_spans = HashSet::new();
        let mut seen_entries = HashSet::new();
        for update in group {
            let fresh = match &update.map {
                Some(map) => seen_entries.insert((
                    map.scope.as_deref(),
                    map.key.as_str(),
                    map.value.as_str(),
                )),
                None => seen_spans.insert(update.span),
            };
            if fresh {
                content = apply(update, &content)?;
            }
        }

        tracing::debug!("Patched {}", path.display());
        changes.push(FileChange {
            path: path.to_path_buf(),
            content,
        });
    }
    Ok(changes)
}

/// Apply and write every change for `updates`
pub fn write(updates: &[Update]) -> Result<Vec<PathBuf>> {
    let changes = plan(updates)?;
    for change in &changes {
        change.write()?;
    }
    Ok(changes.into_iter().map(|c| c.path).collect())
}

fn version_range(specifier: &str, location: &Path) -> Result<Range<usize>> {
    Dependency::parse(specifier)?
        .version_span()
        .ok_or_else(|| Error::MalformedSpan {
            location: location.display().to_string(),
            message: format!("{} has no version", specifier),
        })
}

/// Byte range of the entry's value literal, quotes included
fn find_entry(text: &str, map: &ImportMapIndirection) -> Option<Range<usize>> {
    let root = skip_trivia(text, 0);
    if text.as_bytes().get(root) != Some(&b'{') {
        return None;
    }
    let section = match &map.scope {
        None => object_member(text, root, "imports")?,
        Some(scope) => {
            let scopes = object_member(text, root, "scopes")?;
            object_member(text, scopes, scope)?
        }
    };

    members(text, section)?
        .into_iter()
        .find(|member| {
            member.key == map.key
                && serde_json::from_str::<String>(&text[member.value.clone()]).ok().as_deref()
                    == Some(map.value.as_str())
        })
        .map(|member| member.value)
}

/// A `"key": value` pair of a JSON(C) object
struct Member {
    key: String,
    value: Range<usize>,
}

/// Offset of the object value stored under `key`
fn object_member(text: &str, object: usize, key: &str) -> Option<usize> {
    members(text, object)?
        .into_iter()
        .find(|member| member.key == key && text.as_bytes()[member.value.start] == b'{')
        .map(|member| member.value.start)
}

/// Members of the object whose `{` sits at `object`, in source order
fn members(text: &str, object: usize) -> Option<Vec<Member>> {
    let bytes = text.as_bytes();
    let mut members = Vec::new();
    let mut pos = skip_trivia(text, object + 1);

    while bytes.get(pos) != Some(&b'}') {
        if bytes.get(pos) != Some(&b'"') {
            return None;
        }
        let key_end = value_end(text, pos)?;
        let key: String = serde_json::from_str(&text[pos..key_end]).ok()?;

        pos = skip_trivia(text, key_end);
        if bytes.get(pos) != Some(&b':') {
            return None;
        }
        let start = skip_trivia(text, pos + 1);
        let end = value_end(text, start)?;
        members.push(Member {
            key,
            value: start..end,
        });

        pos = skip_trivia(text, end);
        if bytes.get(pos) == Some(&b',') {
            pos = skip_trivia(text, pos + 1);
        }
    }
    Some(members)
}

/// End of the JSON(C) value starting at `start`
fn value_end(text: &str, start: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    match bytes.get(start)? {
        b'"' => {
            let mut pos = start + 1;
            loop {
                match bytes.get(pos)? {
                    b'\\' => pos += 2,
                    b'"' => return Some(pos + 1),
                    _ => pos += 1,
                }
            }
        }
        b'{' | b'[' => {
            let mut depth = 0usize;
            let mut pos = start;
            loop {
                pos = skip_trivia(text, pos);
                match bytes.get(pos)? {
                    b'"' => pos = value_end(text, pos)?,
                    b'{' | b'[' => {
                        depth += 1;
                        pos += 1;
                    }
                    b'}' | b']' => {
                        depth -= 1;
                        pos += 1;
                        if depth == 0 {
                            return Some(pos);
                        }
                    }
                    _ => pos += 1,
                }
            }
        }
        _ => {
            let len = text[start..]
                .find(|c: char| c == ',' || c == '}' || c == ']' || c.is_whitespace())
                .unwrap_or(text.len() - start);
            Some(start + len)
        }
    }
}

/// Skip whitespace and comments
fn skip_trivia(text: &str, mut pos: usize) -> usize {
    let bytes = text.as_bytes();
    loop {
        match (bytes.get(pos), bytes.get(pos + 1)) {
            (Some(b), _) if b.is_ascii_whitespace() => pos += 1,
            (Some(b'/'), Some(b'/')) => {
                pos = text[pos..].find('\n').map_or(text.len(), |n| pos + n);
            }
            (Some(b'/'), Some(b'*')) => {
                pos = text[pos + 2..].find("*/").map_or(text.len(), |n| pos + 2 + n + 2);
            }
            _ => return pos,
        }
    }
}

fn splice(text: &str, range: Range<usize>, replacement: &str) -> String {
    let mut out = String::with_capacity(text.len() + replacement.len());
    out.push_str(&text[..range.start]);
    out.push_str(replacement);
    out.push_str(&text[range.end..]);
    out
}
