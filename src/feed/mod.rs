mod parse;

pub use parse::{Channel, Enclosure, Episode, Feed, ParseWarning, parse_feed};
