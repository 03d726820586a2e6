//! Topic pattern matching with broker-style wildcards.
//!
//! Patterns and topics are `/`-separated level lists. A `+` level matches
//! exactly one topic level and records it as the capture; a `#` level matches
//! everything from its position onwards, including an empty remainder when it
//! is the last pattern level (`a/#` matches `a`).

use clockwire_config::CaptureMode;

const SINGLE_LEVEL: &str = "+";
const MULTI_LEVEL: &str = "#";

/// Value extracted from a successful match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capture<'t> {
    /// The topic level consumed by the last `+` in the pattern.
    Wildcard(&'t str),
    /// No `+` participated; carries the whole concrete topic.
    Topic(&'t str),
}

impl<'t> Capture<'t> {
    /// Resolves the capture string handed to handlers.
    #[must_use]
    pub const fn resolve(self, mode: CaptureMode) -> &'t str {
        match (self, mode) {
            (Self::Wildcard(level), _) => level,
            (Self::Topic(topic), CaptureMode::WholeTopic) => topic,
            (Self::Topic(_), CaptureMode::Empty) => "",
        }
    }
}

/// Matches `topic` against `pattern`, returning the capture on success.
///
/// No match is an ordinary outcome and yields `None`.
#[must_use]
pub fn match_topic<'t>(pattern: &str, topic: &'t str) -> Option<Capture<'t>> {
    let pattern_levels: Vec<&str> = pattern.split('/').collect();
    let topic_levels: Vec<&'t str> = topic.split('/').collect();

    let mut wildcard: Option<&'t str> = None;
    let mut pattern_rest = pattern_levels.as_slice();
    let mut topic_rest = topic_levels.as_slice();

    loop {
        let ([level, pattern_tail @ ..], [current, topic_tail @ ..]) = (pattern_rest, topic_rest)
        else {
            return None;
        };

        match (pattern_tail.is_empty(), topic_tail.is_empty()) {
            (true, true) => {
                return match *level {
                    MULTI_LEVEL => Some(finish(wildcard, topic)),
                    SINGLE_LEVEL => Some(Capture::Wildcard(*current)),
                    literal if literal == *current => Some(finish(wildcard, topic)),
                    _ => None,
                };
            }
            (true, false) => {
                return (*level == MULTI_LEVEL).then(|| finish(wildcard, topic));
            }
            (false, true) => {
                if *level == MULTI_LEVEL {
                    return Some(finish(wildcard, topic));
                }
                // `a/#` also matches the parent topic `a`.
                if pattern_tail != [MULTI_LEVEL] {
                    return None;
                }
                return match *level {
                    SINGLE_LEVEL => Some(Capture::Wildcard(*current)),
                    literal if literal == *current => Some(finish(wildcard, topic)),
                    _ => None,
                };
            }
            (false, false) => {}
        }

        if *level == SINGLE_LEVEL {
            wildcard = Some(*current);
        } else if level != current {
            return None;
        }
        pattern_rest = pattern_tail;
        topic_rest = topic_tail;
    }
}

fn finish<'t>(wildcard: Option<&'t str>, topic: &'t str) -> Capture<'t> {
    wildcard.map_or(Capture::Topic(topic), Capture::Wildcard)
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("ptp/clock", "ptp/clock")]
    #[case("a/b/c", "a/b/c")]
    #[case("single", "single")]
    fn literal_patterns_capture_the_whole_topic(#[case] pattern: &str, #[case] topic: &str) {
        assert_eq!(match_topic(pattern, topic), Some(Capture::Topic(topic)));
    }

    #[rstest]
    #[case("a/+/c", "a/b/c", "b")]
    #[case("ptp/port/+/status", "ptp/port/eth0/status", "eth0")]
    #[case("a/+", "a/b", "b")]
    #[case("+", "anything", "anything")]
    #[case("+/+/c", "x/y/c", "y")]
    #[case("a/+/#", "a/b/c/d", "b")]
    fn single_level_wildcard_captures_its_level(
        #[case] pattern: &str,
        #[case] topic: &str,
        #[case] expected: &str,
    ) {
        assert_eq!(match_topic(pattern, topic), Some(Capture::Wildcard(expected)));
    }

    #[rstest]
    #[case("a/#", "a/b/c")]
    #[case("a/#", "a/b")]
    #[case("a/#", "a")]
    #[case("#", "a/b/c")]
    #[case("#", "a")]
    fn multi_level_wildcard_absorbs_the_remainder(#[case] pattern: &str, #[case] topic: &str) {
        assert_eq!(match_topic(pattern, topic), Some(Capture::Topic(topic)));
    }

    #[rstest]
    #[case("a/+", "a/b/c")]
    #[case("a/b", "a/c")]
    #[case("a/b/c", "a/b")]
    #[case("a/b", "a/b/c")]
    #[case("a/#", "b/c")]
    #[case("ptp/clock", "ptp/Clock")]
    #[case("a/+/c", "a/b/d")]
    fn mismatches_yield_none(#[case] pattern: &str, #[case] topic: &str) {
        assert_eq!(match_topic(pattern, topic), None);
    }

    #[test]
    fn levels_compare_exactly_rather_than_by_prefix() {
        assert_eq!(match_topic("ptp/port", "ptp/portal"), None);
        assert_eq!(match_topic("ptp/portal", "ptp/port"), None);
    }

    #[rstest]
    #[case(CaptureMode::WholeTopic, "a/b")]
    #[case(CaptureMode::Empty, "")]
    fn topic_capture_resolution_follows_mode(#[case] mode: CaptureMode, #[case] expected: &str) {
        let capture = match_topic("a/b", "a/b").expect("literal pattern should match");
        assert_eq!(capture.resolve(mode), expected);
    }

    #[test]
    fn wildcard_capture_ignores_mode() {
        let capture = match_topic("a/+", "a/b").expect("wildcard pattern should match");
        assert_eq!(capture.resolve(CaptureMode::Empty), "b");
    }
}
