//! Continuous temporal-intent scoring.
//!
//! A query's temporal intent is a scalar in [0, 1]: 0 favors the earliest
//! narrative, 0.5 is neutral, 1 favors the most recent. Three lexicons
//! carry per-phrase weights; a secondary event-term lexicon nudges the score
//! without dominating it.

const EARLY_SIGNALS: &[(&str, f32)] = &[
    ("first", 0.1),
    ("initial", 0.1),
    ("earliest", 0.0),
    ("begin", 0.1),
    ("beginning", 0.1),
    ("start", 0.1),
    ("origin", 0.0),
    ("genesis", 0.0),
    ("inception", 0.0),
    ("original", 0.1),
    ("early on", 0.1),
    ("at first", 0.1),
    ("in the beginning", 0.0),
    ("initially", 0.1),
    ("long ago", 0.1),
    ("originally", 0.1),
    ("before", 0.2),
];

const RECENT_SIGNALS: &[(&str, f32)] = &[
    ("recent", 0.9),
    ("latest", 1.0),
    ("newest", 1.0),
    ("current", 0.9),
    ("last", 0.9),
    ("now", 0.9),
    ("ongoing", 0.8),
    ("present", 0.9),
    ("final", 0.9),
    ("most recent", 1.0),
    ("currently", 0.9),
    ("these days", 0.9),
    ("nowadays", 0.9),
    ("at the moment", 0.9),
    ("recently", 0.9),
    ("later", 0.8),
    ("after", 0.7),
    ("eventually", 0.8),
];

const MID_SIGNALS: &[(&str, f32)] = &[
    ("during", 0.5),
    ("middle", 0.5),
    ("midst", 0.5),
    ("meanwhile", 0.5),
    ("while", 0.5),
    ("throughout", 0.5),
    ("subsequently", 0.6),
    ("then", 0.6),
    ("next", 0.6),
    ("following", 0.6),
    ("after that", 0.6),
    ("afterwards", 0.6),
    ("ensuing", 0.6),
];

/// Event vocabulary with a positional bias; applied with a 0.8/0.2 blend so
/// it nudges rather than overrides.
const EVENT_TERMS: &[(&str, f32)] = &[
    ("begin", 0.2),
    ("start", 0.2),
    ("commence", 0.2),
    ("initiate", 0.2),
    ("conclude", 0.8),
    ("end", 0.8),
    ("finish", 0.8),
    ("complete", 0.8),
    ("happen", 0.5),
    ("occur", 0.5),
    ("take place", 0.5),
    ("event", 0.5),
    ("change", 0.6),
    ("turn", 0.6),
    ("shift", 0.6),
    ("evolve", 0.7),
    ("cause", 0.4),
    ("lead to", 0.6),
    ("result in", 0.7),
    ("aftermath", 0.8),
];

/// Score a query's temporal intent on [0, 1].
///
/// Early hits take the minimum weight found, recent hits the maximum; mid
/// signals apply only when neither fired. Conflicting signals pull the score
/// 20% back toward neutral.
pub fn score_temporal_intent(query: &str) -> f32 {
    let lowered = query.to_lowercase();

    let mut score: f32 = 0.5;
    let mut signals_found = 0;

    for (signal, weight) in EARLY_SIGNALS {
        if lowered.contains(signal) {
            score = score.min(*weight);
            signals_found += 1;
        }
    }

    for (signal, weight) in RECENT_SIGNALS {
        if lowered.contains(signal) {
            score = score.max(*weight);
            signals_found += 1;
        }
    }

    if signals_found == 0 {
        for (signal, weight) in MID_SIGNALS {
            if lowered.contains(signal) {
                score = *weight;
                signals_found += 1;
            }
        }
    }

    if signals_found > 1 {
        score = 0.5 + (score - 0.5) * 0.8;
    }

    for (term, bias) in EVENT_TERMS {
        if lowered.contains(term) {
            score = score * 0.8 + bias * 0.2;
        }
    }

    score.clamp(0.0, 1.0)
}
