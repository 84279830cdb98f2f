// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::fmt;

use chrono::{DateTime, FixedOffset};

use crate::error::FeedError;

/// Channel-level metadata of a parsed feed
#[derive(Debug, Clone)]
pub struct Channel {
    pub title: String,
    pub link: Option<String>,
    pub description: Option<String>,
}

/// A single feed item
#[derive(Debug, Clone)]
pub struct Episode {
    pub title: String,
    pub pub_date: Option<DateTime<FixedOffset>>,
    pub guid: Option<String>,
    pub enclosure: Option<Enclosure>,
}

/// The media file attached to an episode
#[derive(Debug, Clone)]
pub struct Enclosure {
    pub url: String,
    pub length: Option<u64>,
    pub mime_type: Option<String>,
}

/// A parsed feed together with everything that did not decode cleanly.
///
/// Field-level decode problems never fail the parse; the affected field
/// defaults and a warning is recorded instead.
#[derive(Debug, Clone)]
pub struct Feed {
    pub channel: Channel,
    pub episodes: Vec<Episode>,
    pub warnings: Vec<ParseWarning>,
}

/// A field that failed to decode and was defaulted
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseWarning {
    MissingTitle { item: usize },
    InvalidPubDate { item: usize, value: String },
    NoMediaReference { item: usize },
}

impl fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseWarning::MissingTitle { item } => {
                write!(f, "item {item}: missing title")
            }
            ParseWarning::InvalidPubDate { item, value } => {
                write!(f, "item {item}: unparseable pubDate '{value}'")
            }
            ParseWarning::NoMediaReference { item } => {
                write!(f, "item {item}: neither guid nor enclosure present")
            }
        }
    }
}

/// Parse RSS feed bytes into a [`Feed`].
///
/// Only unreadable XML is an error; every item that is present in the
/// document yields an [`Episode`], with undecodable fields defaulted.
pub fn parse_feed(xml_bytes: &[u8]) -> Result<Feed, FeedError> {
    let channel = rss::Channel::read_from(xml_bytes)?;

    let mut warnings = Vec::new();

    let episodes = channel
        .items()
        .iter()
        .enumerate()
        .map(|(index, item)| parse_item(index, item, &mut warnings))
        .collect();

    Ok(Feed {
        channel: Channel {
            title: channel.title().to_string(),
            link: Some(channel.link().to_string()).filter(|s| !s.is_empty()),
            description: Some(channel.description().to_string()).filter(|s| !s.is_empty()),
        },
        episodes,
        warnings,
    })
}

fn parse_item(index: usize, item: &rss::Item, warnings: &mut Vec<ParseWarning>) -> Episode {
    let title = match item.title() {
        Some(title) if !title.trim().is_empty() => title.to_string(),
        _ => {
            warnings.push(ParseWarning::MissingTitle { item: index });
            String::new()
        }
    };

    let pub_date = item.pub_date().and_then(|date_str| {
        let parsed = DateTime::parse_from_rfc2822(date_str)
            .or_else(|_| parse_relaxed_date(date_str))
            .ok();
        if parsed.is_none() {
            warnings.push(ParseWarning::InvalidPubDate {
                item: index,
                value: date_str.to_string(),
            });
        }
        parsed
    });

    let guid = item.guid().map(|g| g.value().to_string());

    let enclosure = item.enclosure().map(|enclosure| Enclosure {
        url: enclosure.url().to_string(),
        length: enclosure.length().parse().ok(),
        mime_type: Some(enclosure.mime_type().to_string()).filter(|s| !s.is_empty()),
    });

    if guid.is_none() && enclosure.is_none() {
        warnings.push(ParseWarning::NoMediaReference { item: index });
    }

    Episode {
        title,
        pub_date,
        guid,
        enclosure,
    }
}

/// Try to parse dates that don't strictly conform to RFC 2822
fn parse_relaxed_date(date_str: &str) -> Result<DateTime<FixedOffset>, chrono::ParseError> {
    let formats = [
        "%a, %d %b %Y %H:%M:%S %z",
        "%Y-%m-%dT%H:%M:%S%:z",
        "%Y-%m-%d %H:%M:%S %z",
    ];

    for format in formats {
        if let Ok(dt) = DateTime::parse_from_str(date_str, format) {
            return Ok(dt);
        }
    }

    Err(chrono::DateTime::parse_from_rfc2822("invalid").unwrap_err())
}
