// Decoding of the judge's generated text into a typed verdict.
//
// The reply must contain one JSON object, optionally inside a markdown code
// fence. Anything short of a complete verdict is a `Decode::Failure`.

use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerdictWinner {
    Character1,
    Character2,
    Draw,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub winner: VerdictWinner,
    pub is_draw: bool,
    pub narrative: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Decode {
    Decoded(Verdict),
    Failure(String),
}

#[derive(Debug, Deserialize)]
struct RawVerdict {
    winner: String,
    narrative: String,
    #[serde(default, rename = "isDraw", alias = "is_draw")]
    is_draw: Option<bool>,
}

/// Strip a surrounding ```` ```json ```` fence if one is present.
fn strip_code_fence(text: &str) -> &str {
    let Some(open) = text.find("```") else {
        return text;
    };
    let after_open = &text[open + 3..];
    // Skip the language tag on the opening fence line.
    let body = match after_open.find('\n') {
        Some(nl) => &after_open[nl + 1..],
        None => after_open,
    };
    match body.find("```") {
        Some(close) => &body[..close],
        None => body,
    }
}

fn extract_json_object(text: &str) -> Option<&str> {
    let body = strip_code_fence(text);
    let start = body.find('{')?;
    let end = body.rfind('}')?;
    (end > start).then(|| &body[start..=end])
}

fn parse_winner(raw: &str) -> Option<VerdictWinner> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "character1" => Some(VerdictWinner::Character1),
        "character2" => Some(VerdictWinner::Character2),
        "draw" => Some(VerdictWinner::Draw),
        _ => None,
    }
}

pub fn decode_verdict(text: &str) -> Decode {
    if text.trim().is_empty() {
        return Decode::Failure("empty response".into());
    }
    let Some(json) = extract_json_object(text) else {
        return Decode::Failure("no JSON object in response".into());
    };
    let raw: RawVerdict = match serde_json::from_str(json) {
        Ok(raw) => raw,
        Err(e) => return Decode::Failure(format!("malformed verdict JSON: {e}")),
    };
    let Some(winner) = parse_winner(&raw.winner) else {
        return Decode::Failure(format!("unknown winner '{}'", raw.winner));
    };
    let narrative = raw.narrative.trim();
    if narrative.is_empty() {
        return Decode::Failure("empty narrative".into());
    }
    Decode::Decoded(Verdict {
        winner,
        is_draw: winner == VerdictWinner::Draw || raw.is_draw.unwrap_or(false),
        narrative: narrative.to_string(),
    })
}
