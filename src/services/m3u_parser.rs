use lazy_static::lazy_static;
use regex::Regex;
use url::Url;

use crate::models::Channel;

const EXTINF_PREFIX: &str = "#EXTINF:";
const EXTGRP_PREFIX: &str = "#EXTGRP:";

lazy_static! {
    /// Regex to normalize multiple whitespaces into single space
    static ref MULTI_SPACE_REGEX: Regex = Regex::new(r"\s{2,}").unwrap();
    /// Attribute key at the current scan position (tvg-logo=, group-title=, ...)
    static ref ATTR_KEY_REGEX: Regex = Regex::new(r"^([A-Za-z][A-Za-z0-9_]*(?:-[A-Za-z0-9_]+)*)\s*=").unwrap();
}

/// Attributes of an EXTINF line that we keep. Anything else is ignored.
#[derive(Debug, Default, PartialEq, Eq)]
struct ExtinfAttributes {
    tvg_id: Option<String>,
    tvg_name: Option<String>,
    tvg_logo: Option<String>,
    group_title: Option<String>,
}

impl ExtinfAttributes {
    fn set(&mut self, key: &str, value: String) {
        let value = Some(value).filter(|v| !v.is_empty());
        match key.to_ascii_lowercase().as_str() {
            "tvg-id" => self.tvg_id = value,
            "tvg-name" => self.tvg_name = value,
            "tvg-logo" => self.tvg_logo = value,
            "group-title" => self.group_title = value,
            _ => {}
        }
    }
}

/// Parsed EXTINF line data
#[derive(Debug, Default)]
struct ExtinfData {
    attributes: ExtinfAttributes,
    title: String,
}

/// Case-insensitive directive prefix check (`#EXTINF:`, `#EXTGRP:`)
fn strip_directive<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    let head = line.get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix) {
        Some(&line[prefix.len()..])
    } else {
        None
    }
}

/// Split EXTINF content into attribute header and title.
///
/// The title is the text after the last comma that is not inside a quoted
/// attribute value. With unbalanced quotes the last comma anywhere is used.
fn split_title(content: &str) -> (&str, &str) {
    let mut in_quotes = false;
    let mut split = None;

    for (idx, c) in content.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => split = Some(idx),
            _ => {}
        }
    }

    let split = if in_quotes { content.rfind(',') } else { split };

    match split {
        Some(idx) => (&content[..idx], &content[idx + 1..]),
        None => (content, ""),
    }
}

/// Scan `key=value` pairs from an EXTINF header.
///
/// Values may be double quoted, single quoted or bare. A quote that is never
/// closed, or whose "closing" quote actually opens the next attribute, ends the
/// value at the next whitespace instead.
fn parse_attributes(header: &str) -> ExtinfAttributes {
    let mut attributes = ExtinfAttributes::default();
    let mut rest = header;

    while !rest.is_empty() {
        rest = rest.trim_start();

        let Some(caps) = ATTR_KEY_REGEX.captures(rest) else {
            // Not an attribute (duration token or junk): skip one token
            let next = rest
                .find(char::is_whitespace)
                .unwrap_or(rest.len());
            rest = &rest[next..];
            continue;
        };

        let key = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
        let after_key = &rest[caps.get(0).map(|m| m.end()).unwrap_or(0)..];
        let after_key = after_key.trim_start();

        let (value, remainder) = read_value(after_key);
        attributes.set(key, value.trim().to_string());
        rest = remainder;
    }

    attributes
}

fn read_value(input: &str) -> (&str, &str) {
    let quote = match input.chars().next() {
        Some(q @ ('"' | '\'')) => q,
        _ => return read_bare(input),
    };

    let body = &input[1..];
    match body.find(quote) {
        Some(end) if !body[..end].trim_end().ends_with('=') => (&body[..end], &body[end + 1..]),
        _ => read_bare(body),
    }
}

fn read_bare(input: &str) -> (&str, &str) {
    let end = input.find(char::is_whitespace).unwrap_or(input.len());
    let value = input[..end].trim_matches(|c| c == '"' || c == '\'');
    (value, &input[end..])
}

/// Parse an EXTINF line. The duration token is skipped.
/// Format: #EXTINF:duration tvg-id="..." tvg-name="..." tvg-logo="..." group-title="...",Title
fn parse_extinf(line: &str) -> Option<ExtinfData> {
    let content = strip_directive(line, EXTINF_PREFIX)?;
    let (header, title) = split_title(content);

    Some(ExtinfData {
        attributes: parse_attributes(header),
        title: title.trim().to_string(),
    })
}

/// Normalize text: trim and collapse multiple spaces into single space
fn normalize_text(text: &str) -> String {
    let trimmed = text.trim();
    MULTI_SPACE_REGEX.replace_all(trimmed, " ").to_string()
}

/// A stream line must be an absolute URL with an authority (http, https, rtmp, udp, ...)
fn is_stream_url(line: &str) -> bool {
    Url::parse(line)
        .map(|url| !url.cannot_be_a_base())
        .unwrap_or(false)
}

fn build_channel(
    extinf: Option<ExtinfData>,
    extgrp: Option<String>,
    stream_url: &str,
    order: usize,
) -> Channel {
    let ExtinfData {
        attributes, title, ..
    } = extinf.unwrap_or_default();

    // title -> tvg-name -> stream URL
    let name = Some(normalize_text(&title))
        .filter(|n| !n.is_empty())
        .or_else(|| {
            attributes
                .tvg_name
                .as_deref()
                .map(normalize_text)
                .filter(|n| !n.is_empty())
        })
        .unwrap_or_else(|| stream_url.to_string());

    let group_title = attributes
        .group_title
        .as_deref()
        .map(normalize_text)
        .or(extgrp)
        .filter(|g| !g.is_empty());

    Channel {
        name,
        stream_url: stream_url.to_string(),
        logo_url: attributes.tvg_logo,
        group_title,
        tvg_id: attributes.tvg_id,
        order,
    }
}

/// Parse raw M3U text into channels, in playlist order.
///
/// Never fails: entries without a stream URL are dropped, missing metadata
/// falls back to defaults, and a document with no entries yields an empty list.
pub fn parse(raw: &str) -> Vec<Channel> {
    let mut channels = Vec::new();
    let mut current_extinf: Option<ExtinfData> = None;
    let mut current_group: Option<String> = None;
    let mut dropped = 0usize;

    for line in raw.trim_start_matches('\u{feff}').lines() {
        let trimmed = line.trim();

        if trimmed.is_empty() {
            continue;
        }

        if strip_directive(trimmed, EXTINF_PREFIX).is_some() {
            if current_extinf.is_some() {
                dropped += 1;
            }
            current_extinf = parse_extinf(trimmed);
            continue;
        }

        if let Some(group) = strip_directive(trimmed, EXTGRP_PREFIX) {
            current_group = Some(normalize_text(group));
            continue;
        }

        // #EXTM3U and any other comment/directive
        if trimmed.starts_with('#') {
            continue;
        }

        if !is_stream_url(trimmed) {
            if current_extinf.take().is_some() {
                dropped += 1;
            }
            current_group = None;
            continue;
        }

        let order = channels.len();
        channels.push(build_channel(
            current_extinf.take(),
            current_group.take(),
            trimmed,
            order,
        ));
    }

    if current_extinf.is_some() {
        dropped += 1;
    }

    if dropped > 0 {
        tracing::debug!(
            channels = channels.len(),
            dropped = dropped,
            "entries without stream URL dropped"
        );
    }

    channels
}
