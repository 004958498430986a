//! Deterministic, total extraction of the final decision and confidence
//! from free-text `final_trade_decision` content. No regex dependency —
//! plain line/window scanning.

use crate::models::Decision;

/// Token sequence "final ... proposal" followed by BUY/HOLD/SELL
/// (case-insensitive). Last occurrence wins; `None` if never found.
pub fn extract_final_decision(content: &str) -> Option<Decision> {
    let lower = content.to_lowercase();
    let mut best: Option<Decision> = None;
    let mut search_from = 0usize;

    while let Some(rel_final) = lower[search_from..].find("final") {
        let final_idx = search_from + rel_final;
        let after_final = &lower[final_idx..];

        if let Some(rel_proposal) = after_final.find("proposal") {
            let proposal_idx = final_idx + rel_proposal;
            let window_end = (proposal_idx + 64).min(lower.len());
            let window = &lower[proposal_idx..window_end];
            if let Some(decision) = find_decision_token(window) {
                best = Some(decision);
            }
        }

        search_from = final_idx + "final".len();
    }

    best
}

fn find_decision_token(window: &str) -> Option<Decision> {
    window
        .split(|c: char| !c.is_alphanumeric())
        .find_map(|word| Decision::from_str(word))
}

/// A percentage token (0-100) on a line mentioning "confidence", divided by
/// 100. `None` if no such line, or the token is out of range.
pub fn extract_confidence(content: &str) -> Option<f64> {
    content
        .lines()
        .filter(|line| line.to_lowercase().contains("confidence"))
        .find_map(parse_percentage_token)
}

fn parse_percentage_token(line: &str) -> Option<f64> {
    let bytes = line.as_bytes();
    for (i, &b) in bytes.iter().enumerate() {
        if b != b'%' {
            continue;
        }
        let mut start = i;
        while start > 0 && (bytes[start - 1].is_ascii_digit() || bytes[start - 1] == b'.') {
            start -= 1;
        }
        if start == i {
            continue;
        }
        if let Ok(value) = line[start..i].parse::<f64>() {
            if (0.0..=100.0).contains(&value) {
                return Some(value / 100.0);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_decision_after_final_proposal_phrase() {
        let content = "Analysis follows.\nFinal trade proposal: BUY\nRisk notes.";
        assert_eq!(extract_final_decision(content), Some(Decision::Buy));
    }

    #[test]
    fn last_occurrence_wins() {
        let content = "Earlier final proposal: SELL\n...more debate...\nFinal proposal: HOLD";
        assert_eq!(extract_final_decision(content), Some(Decision::Hold));
    }

    #[test]
    fn missing_phrase_yields_none() {
        let content = "We recommend buying more shares.";
        assert_eq!(extract_final_decision(content), None);
    }

    #[test]
    fn extracts_confidence_from_tagged_line() {
        let content = "Final proposal: BUY\nConfidence: 82%\n";
        assert_eq!(extract_confidence(content), Some(0.82));
    }

    #[test]
    fn ignores_out_of_range_confidence() {
        let content = "Confidence: 150%\n";
        assert_eq!(extract_confidence(content), None);
    }

    #[test]
    fn missing_confidence_line_yields_none() {
        assert_eq!(extract_confidence("Final proposal: HOLD"), None);
    }
}
