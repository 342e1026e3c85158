//! Human-readable score explanations

use std::collections::BTreeMap;

use ontoforge_core::CriticScore;

/// Overall score from which an ontology is considered ready for use
pub const READY_THRESHOLD: f64 = 0.70;

/// Band word for a score in `[0, 1]`
pub fn band(value: f64) -> &'static str {
    if value >= 0.85 {
        "excellent"
    } else if value >= 0.70 {
        "good"
    } else if value >= 0.50 {
        "acceptable"
    } else if value >= 0.30 {
        "weak"
    } else {
        "poor"
    }
}

fn describe(dimension: &str) -> &'static str {
    match dimension {
        "completeness" => "coverage of the entities and relationships the domain expects",
        "consistency" => "freedom from dangling, duplicate and contradictory elements",
        "clarity" => "how clear and unambiguous entity labels are",
        "granularity" => "fit of entity volume and relationship density to the domain",
        "relationship_coherence" => "plausibility of relationship endpoints",
        "domain_alignment" => "conformance to the domain taxonomy",
        _ => "quality",
    }
}

fn label(dimension: &str) -> String {
    let mut words = dimension.split('_');
    let mut label = String::new();
    if let Some(first) = words.next() {
        let mut chars = first.chars();
        if let Some(c) = chars.next() {
            label.extend(c.to_uppercase());
            label.push_str(chars.as_str());
        }
    }
    for word in words {
        label.push(' ');
        label.push_str(word);
    }
    label
}

fn percent(value: f64) -> String {
    format!("{:.0}%", (value * 100.0).clamp(0.0, 100.0))
}

/// One sentence per dimension plus an `overall` summary
pub fn explain_score(score: &CriticScore) -> BTreeMap<String, String> {
    let mut explanations = BTreeMap::new();

    for (name, value) in score.dimensions() {
        explanations.insert(
            name.to_string(),
            format!(
                "{} is {} ({}): {}.",
                label(name),
                band(value),
                percent(value),
                describe(name)
            ),
        );
    }

    let verdict = if score.overall >= READY_THRESHOLD {
        "ready for use"
    } else {
        "further refinement is recommended"
    };
    explanations.insert(
        "overall".to_string(),
        format!(
            "Overall quality is {} ({}); {}.",
            band(score.overall),
            percent(score.overall),
            verdict
        ),
    );

    explanations
}
