//! On-disk cache format of a subscription.
//!
//! ```text
//! Title: <title>
//! Url: <url>
//! [Adblock Plus <version>]
//! <filter line>
//! ...
//! ```
//!
//! Only the third line is checked on read; the first two are regenerated
//! from the subscription on every write.

use std::fs;
use std::io::Write;
use std::path::Path;

use bw_core::Rule;

use crate::error::{Result, SubscriptionError};

/// Prefix every filter list must start with.
pub const FORMAT_TAG: &str = "[Adblock";

/// Format line written for locally serialized lists.
pub const FORMAT_LINE: &str = "[Adblock Plus 1.1.1]";

/// Start of the section dropped in limited mode.
pub const THIRD_PARTY_MARKER: &str =
    "!-----------------------------Third-party adverts-----------------------------!";

/// Start of the section kept in limited mode.
pub const WHITELIST_MARKER: &str =
    "!---------------------------------Whitelists----------------------------------!";

/// Read a cache file and return its filter lines (everything after the
/// header).
pub fn read_cache(path: &Path) -> Result<Vec<String>> {
    let bytes = fs::read(path).map_err(|source| SubscriptionError::CacheRead {
        path: path.to_path_buf(),
        source,
    })?;
    let text = String::from_utf8_lossy(&bytes);

    let mut lines = text.lines();
    let _title = lines.next();
    let _url = lines.next();
    match lines.next() {
        Some(tag) if tag.starts_with(FORMAT_TAG) => {}
        _ => return Err(SubscriptionError::Format(path.display().to_string())),
    }

    Ok(lines.map(str::to_string).collect())
}

/// Read a file that lacks a valid header and return the lines that are
/// not header lines. Empty lines are dropped.
pub fn salvage_lines(path: &Path) -> Result<Vec<String>> {
    let bytes = fs::read(path).map_err(|source| SubscriptionError::CacheRead {
        path: path.to_path_buf(),
        source,
    })?;
    let text = String::from_utf8_lossy(&bytes);

    Ok(text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| !line.starts_with("Title:") && !line.starts_with("Url:") && !line.starts_with(FORMAT_TAG))
        .map(str::to_string)
        .collect())
}

/// Whether a downloaded body is a filter list.
pub fn is_filter_list(body: &[u8]) -> bool {
    body.starts_with(FORMAT_TAG.as_bytes())
}

/// Drop the third-party section of EasyList, keeping everything from the
/// whitelist marker on.
///
/// The body is returned whole unless both markers are present in order.
pub fn limit_easy_list(body: &str) -> String {
    match (body.find(THIRD_PARTY_MARKER), body.find(WHITELIST_MARKER)) {
        (Some(start), Some(end)) if start <= end => {
            let mut limited = String::with_capacity(body.len() - (end - start));
            limited.push_str(&body[..start]);
            limited.push_str(&body[end..]);
            limited
        }
        _ => body.to_string(),
    }
}

/// Write a downloaded body behind a fresh `Title:` / `Url:` header.
pub fn write_downloaded(path: &Path, title: &str, url: &str, body: &str) -> Result<()> {
    let mut contents = String::with_capacity(body.len() + title.len() + url.len() + 16);
    contents.push_str(&header(title, url));
    contents.push_str(body);
    write_atomic(path, contents.as_bytes())
}

/// Serialize a rule list, disabled rules included.
pub fn write_rules(path: &Path, title: &str, url: &str, rules: &[Rule]) -> Result<()> {
    write_filters(path, title, url, rules.iter().map(|rule| rule.filter.as_str()))
}

/// Write filter lines behind a full header.
pub fn write_filters<'a>(path: &Path, title: &str, url: &str, filters: impl IntoIterator<Item = &'a str>) -> Result<()> {
    let mut contents = header(title, url);
    contents.push_str(FORMAT_LINE);
    contents.push('\n');
    for filter in filters {
        contents.push_str(filter);
        contents.push('\n');
    }
    write_atomic(path, contents.as_bytes())
}

/// Append filter lines to an existing cache file.
pub fn append_lines(path: &Path, lines: &[&str]) -> Result<()> {
    let persist_err = |source| SubscriptionError::Persist {
        path: path.to_path_buf(),
        source,
    };

    let existing = fs::read(path).map_err(persist_err)?;
    let mut file = fs::OpenOptions::new().append(true).open(path).map_err(persist_err)?;
    if !existing.is_empty() && !existing.ends_with(b"\n") {
        file.write_all(b"\n").map_err(persist_err)?;
    }
    for line in lines {
        file.write_all(line.as_bytes()).map_err(persist_err)?;
        file.write_all(b"\n").map_err(persist_err)?;
    }
    Ok(())
}

fn header(title: &str, url: &str) -> String {
    format!("Title: {title}\nUrl: {url}\n")
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let persist_err = |source| SubscriptionError::Persist {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(persist_err)?;
    }

    let temp_path = path.with_extension("tmp");
    let mut file = fs::File::create(&temp_path).map_err(persist_err)?;
    file.write_all(bytes).map_err(persist_err)?;
    file.sync_all().map_err(persist_err)?;
    drop(file);
    fs::rename(&temp_path, path).map_err(persist_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_read_cache_checks_format_line() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("list.txt");

        fs::write(&path, "Title: A\nUrl: http://a\n[Adblock Plus 2.0]\n||a.com^\n! c\n").unwrap();
        assert_eq!(read_cache(&path).unwrap(), vec!["||a.com^".to_string(), "! c".to_string()]);

        fs::write(&path, "Title: A\nUrl: http://a\n||a.com^\n").unwrap();
        assert!(matches!(read_cache(&path), Err(SubscriptionError::Format(_))));

        fs::write(&path, "Title: A\n").unwrap();
        assert!(matches!(read_cache(&path), Err(SubscriptionError::Format(_))));

        assert!(matches!(
            read_cache(&dir.path().join("missing.txt")),
            Err(SubscriptionError::CacheRead { .. })
        ));
    }

    #[test]
    fn test_salvage_lines_skips_header_remnants() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("list.txt");

        fs::write(&path, "").unwrap();
        assert!(salvage_lines(&path).unwrap().is_empty());

        fs::write(&path, "Title: A\n||a.com^\n\n##.ad\n").unwrap();
        assert_eq!(salvage_lines(&path).unwrap(), vec!["||a.com^".to_string(), "##.ad".to_string()]);

        write_filters(&path, "A", "", ["||a.com^"]).unwrap();
        assert_eq!(read_cache(&path).unwrap(), vec!["||a.com^".to_string()]);
    }

    #[test]
    fn test_is_filter_list() {
        assert!(is_filter_list(b"[Adblock Plus 2.0]\n||a.com^"));
        assert!(!is_filter_list(b"<html>"));
        assert!(!is_filter_list(b""));
    }

    #[test]
    fn test_limit_easy_list() {
        let body = format!(
            "[Adblock Plus 2.0]\n||first.com^\n{THIRD_PARTY_MARKER}\n||third.com^\n{WHITELIST_MARKER}\n@@||ok.com^\n"
        );
        let limited = limit_easy_list(&body);
        assert!(limited.contains("||first.com^"));
        assert!(!limited.contains("||third.com^"));
        assert!(!limited.contains(THIRD_PARTY_MARKER));
        assert!(limited.ends_with(&format!("{WHITELIST_MARKER}\n@@||ok.com^\n")));
    }

    #[test]
    fn test_limit_easy_list_needs_both_markers() {
        let body = format!("[Adblock Plus 2.0]\n{THIRD_PARTY_MARKER}\n||third.com^\n");
        assert_eq!(limit_easy_list(&body), body);

        let body = format!("[Adblock Plus 2.0]\n{WHITELIST_MARKER}\n{THIRD_PARTY_MARKER}\n");
        assert_eq!(limit_easy_list(&body), body);
    }

    #[test]
    fn test_write_downloaded_keeps_format_line() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sub").join("list.txt");
        write_downloaded(&path, "EasyList", "https://e/l.txt", "[Adblock Plus 2.0]\n||a.com^\n").unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text, "Title: EasyList\nUrl: https://e/l.txt\n[Adblock Plus 2.0]\n||a.com^\n");
        assert_eq!(read_cache(&path).unwrap(), vec!["||a.com^".to_string()]);
    }

    #[test]
    fn test_append_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("custom.txt");
        fs::write(&path, "Title: C\nUrl: \n[Adblock Plus 1.1.1]\n||a.com^").unwrap();

        append_lines(&path, &["##.ad", "@@||b.com^"]).unwrap();
        assert_eq!(
            read_cache(&path).unwrap(),
            vec!["||a.com^".to_string(), "##.ad".to_string(), "@@||b.com^".to_string()]
        );
    }
}
