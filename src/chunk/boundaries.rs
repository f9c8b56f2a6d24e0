//! Chunk boundary detection

use unicode_segmentation::UnicodeSegmentation;

/// Priority of a break point (higher is preferred)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BreakPriority {
    Word = 1,
    Sentence = 2,
    Paragraph = 3,
}

/// A candidate position to end a chunk, in characters from the start of the text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakPoint {
    pub position: usize,
    pub priority: BreakPriority,
}

/// Find every break point in `text`, sorted by position.
/// When several kinds coincide the strongest one wins.
pub fn find_break_points(text: &str) -> Vec<BreakPoint> {
    let mut points = Vec::new();

    let mut prev = None;
    for (pos, c) in text.chars().enumerate() {
        if c == '\n' && prev == Some('\n') {
            points.push(BreakPoint {
                position: pos + 1,
                priority: BreakPriority::Paragraph,
            });
        } else if c.is_whitespace() {
            points.push(BreakPoint {
                position: pos + 1,
                priority: BreakPriority::Word,
            });
        }
        prev = Some(c);
    }

    let total = text.chars().count();
    let mut offset = 0;
    for sentence in text.split_sentence_bounds() {
        offset += sentence.chars().count();
        if offset < total {
            points.push(BreakPoint {
                position: offset,
                priority: BreakPriority::Sentence,
            });
        }
    }

    points.sort_by(|a, b| {
        a.position
            .cmp(&b.position)
            .then_with(|| b.priority.cmp(&a.priority))
    });
    points.dedup_by_key(|p| p.position);

    points
}

/// Pick the end of a chunk starting at `start` that should not pass `target`.
///
/// Only break points in the last fifth of the window are considered; among
/// those the strongest, then the latest, wins. Falls back to `target`.
pub fn find_best_break(
    start: usize,
    target: usize,
    chunk_size: usize,
    break_points: &[BreakPoint],
) -> usize {
    let min_pos = start + chunk_size * 4 / 5;

    break_points
        .iter()
        .filter(|p| p.position > start && p.position >= min_pos && p.position <= target)
        .max_by_key(|p| (p.priority, p.position))
        .map(|p| p.position)
        .unwrap_or(target)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_break_priority_ordering() {
        assert!(BreakPriority::Paragraph > BreakPriority::Sentence);
        assert!(BreakPriority::Sentence > BreakPriority::Word);
    }

    #[test]
    fn test_paragraph_beats_word() {
        let points = find_break_points("one\n\ntwo three");
        let para = points.iter().find(|p| p.position == 5).unwrap();
        assert_eq!(para.priority, BreakPriority::Paragraph);
        assert!(points.windows(2).all(|w| w[0].position < w[1].position));
    }

    #[test]
    fn test_sentence_positions_are_char_offsets() {
        let points = find_break_points("Héllo wörld. Next one.");
        assert!(points
            .iter()
            .any(|p| p.position == 13 && p.priority == BreakPriority::Sentence));
    }

    #[test]
    fn test_best_break_prefers_strong_break_in_window() {
        let points = vec![
            BreakPoint {
                position: 85,
                priority: BreakPriority::Sentence,
            },
            BreakPoint {
                position: 95,
                priority: BreakPriority::Word,
            },
            BreakPoint {
                position: 40,
                priority: BreakPriority::Paragraph,
            },
        ];
        assert_eq!(find_best_break(0, 100, 100, &points), 85);
        assert_eq!(find_best_break(0, 100, 100, &[]), 100);
    }
}
