//! Strict two-outcome parser for agent responses.
//!
//! A legitimate response ends in exactly one of two shapes:
//!
//! ```text
//! TASK_COMPLETE: <non-empty summary>
//! KNOWLEDGE_GAP: <non-empty search query>
//! ```
//!
//! Anything else — both markers, neither marker, or a marker with an empty
//! payload — is a protocol violation. There is deliberately no heuristic
//! fallback: a loop that infers intent from free-form text either stalls
//! silently or hallucinates progress.

pub const COMPLETE_MARKER: &str = "TASK_COMPLETE:";
pub const GAP_MARKER: &str = "KNOWLEDGE_GAP:";

/// A successfully parsed response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedOutcome {
    Complete { summary: String },
    Gap { query: String },
}

/// Why a response failed to parse. Carried into the attempt record and, on a
/// second consecutive violation, into the fatal protocol error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    BothMarkers,
    NoMarker,
    EmptyPayload { marker: &'static str },
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Violation::BothMarkers => {
                write!(f, "response contains both {} and {}", COMPLETE_MARKER, GAP_MARKER)
            }
            Violation::NoMarker => {
                write!(f, "response contains neither {} nor {}", COMPLETE_MARKER, GAP_MARKER)
            }
            Violation::EmptyPayload { marker } => {
                write!(f, "{} marker present but its payload is empty", marker)
            }
        }
    }
}

/// Parse a raw agent response against the two-outcome grammar.
pub fn parse(raw: &str) -> Result<ParsedOutcome, Violation> {
    let has_complete = raw.contains(COMPLETE_MARKER);
    let has_gap = raw.contains(GAP_MARKER);

    match (has_complete, has_gap) {
        (true, true) => Err(Violation::BothMarkers),
        (false, false) => Err(Violation::NoMarker),
        (true, false) => {
            let summary = payload_after(raw, COMPLETE_MARKER);
            if summary.is_empty() {
                Err(Violation::EmptyPayload {
                    marker: COMPLETE_MARKER,
                })
            } else {
                Ok(ParsedOutcome::Complete { summary })
            }
        }
        (false, true) => {
            let query = payload_after(raw, GAP_MARKER);
            if query.is_empty() {
                Err(Violation::EmptyPayload { marker: GAP_MARKER })
            } else {
                Ok(ParsedOutcome::Gap { query })
            }
        }
    }
}

/// Text after the marker, up to the end of that line.
fn payload_after(raw: &str, marker: &str) -> String {
    let idx = match raw.find(marker) {
        Some(i) => i,
        None => return String::new(),
    };
    let rest = &raw[idx + marker.len()..];
    let line = rest.lines().next().unwrap_or("");
    line.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_complete() {
        let raw = "Here is the solution.\n\nTASK_COMPLETE: built and tested the parser";
        assert_eq!(
            parse(raw),
            Ok(ParsedOutcome::Complete {
                summary: "built and tested the parser".into()
            })
        );
    }

    #[test]
    fn test_gap() {
        let raw = "The docs do not cover this.\nKNOWLEDGE_GAP: tokio graceful shutdown pattern\nThanks.";
        assert_eq!(
            parse(raw),
            Ok(ParsedOutcome::Gap {
                query: "tokio graceful shutdown pattern".into()
            })
        );
    }

    #[test]
    fn test_both_markers_is_violation() {
        let raw = "TASK_COMPLETE: done\nKNOWLEDGE_GAP: but also need more";
        assert_eq!(parse(raw), Err(Violation::BothMarkers));
    }

    #[test]
    fn test_no_marker_is_violation() {
        let raw = "I believe the task is mostly finished, see above.";
        assert_eq!(parse(raw), Err(Violation::NoMarker));
    }

    #[test]
    fn test_empty_summary_is_violation() {
        assert_eq!(
            parse("TASK_COMPLETE:   \nmore text"),
            Err(Violation::EmptyPayload {
                marker: COMPLETE_MARKER
            })
        );
    }

    #[test]
    fn test_empty_gap_is_violation() {
        assert_eq!(
            parse("KNOWLEDGE_GAP:"),
            Err(Violation::EmptyPayload { marker: GAP_MARKER })
        );
    }

    #[test]
    fn test_payload_stops_at_newline() {
        let raw = "TASK_COMPLETE: wired up the CLI\nextra commentary that is not the summary";
        assert_eq!(
            parse(raw),
            Ok(ParsedOutcome::Complete {
                summary: "wired up the CLI".into()
            })
        );
    }

    #[test]
    fn test_hedged_phrasing_is_not_inferred() {
        // Phrases like "I couldn't find documentation for X" used to be
        // treated as implicit gaps; they are violations now.
        let raw = "I couldn't find documentation for the streaming API.";
        assert_eq!(parse(raw), Err(Violation::NoMarker));
    }
}
