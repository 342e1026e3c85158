//! Relation Extraction (RE) module
//!
//! Infers relationships between extracted entities from co-occurrence in the
//! source text. Candidate pairs are scored serially or across a fixed-size
//! worker pool; ids come from one shared sequence per call.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use ontoforge_core::{
    domain::GENERIC_RELATIONSHIP, Entity, OntologyGenerationContext, Relationship, WorkerFailure,
};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::patterns::{CompiledPattern, PatternCompiler, PASSIVE_VERB_FRAMES, VERB_FRAMES};

/// Entity count below which parallel inference runs serially
pub const PARALLEL_MIN_ENTITIES: usize = 10;

/// Types whose same-type pairs never yield a relationship
pub const BLOCKED_SAME_TYPE: &[&str] = &[
    "Date",
    "Location",
    "MonetaryAmount",
    "Duration",
    "Time",
    "Concept",
];

/// Confidence ceiling for inferred relationships
const MAX_RELATIONSHIP_CONFIDENCE: f64 = 0.95;

/// Bonus for a verb frame between the two mentions
const VERB_BONUS: f64 = 0.1;

const ABBREVIATIONS: &[&str] = &[
    "Mr", "Mrs", "Ms", "Dr", "Prof", "Inc", "Corp", "Ltd", "Co", "St", "Jr", "Sr", "vs", "etc",
    "No",
];

// ============================================================================
// Id Sequence
// ============================================================================

/// Monotonic `rel_0001` sequence shared by every worker of one call
#[derive(Debug, Default)]
pub struct IdSequence {
    issued: AtomicUsize,
}

impl IdSequence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve the next id
    pub fn next_id(&self) -> String {
        let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        format!("rel_{:04}", n)
    }

    /// Number of ids handed out so far
    pub fn issued(&self) -> usize {
        self.issued.load(Ordering::SeqCst)
    }
}

/// Sequence number of an id issued by [`IdSequence`]
pub fn id_number(id: &str) -> Option<usize> {
    id.strip_prefix("rel_")?.parse().ok()
}

// ============================================================================
// Text Index
// ============================================================================

/// One occurrence of an entity in the text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mention {
    pub start: usize,
    pub end: usize,
    pub sentence: usize,
    pub token: usize,
}

/// Sentence and token positions of a text
#[derive(Debug, Clone)]
pub struct TextIndex {
    sentence_starts: Vec<usize>,
    token_starts: Vec<usize>,
}

impl TextIndex {
    pub fn new(text: &str) -> Self {
        Self {
            sentence_starts: sentence_starts(text),
            token_starts: token_starts(text),
        }
    }

    /// Number of sentences
    pub fn sentence_count(&self) -> usize {
        self.sentence_starts.len()
    }

    /// Sentence containing a byte offset
    pub fn sentence_of(&self, offset: usize) -> usize {
        self.sentence_starts
            .partition_point(|&s| s <= offset)
            .saturating_sub(1)
    }

    /// Index of the first token starting at or after a byte offset
    pub fn token_of(&self, offset: usize) -> usize {
        self.token_starts.partition_point(|&t| t < offset)
    }

    /// Whole-word occurrences of `needle` in `text`
    pub fn mentions(&self, text: &str, needle: &str) -> Vec<Mention> {
        if needle.is_empty() {
            return Vec::new();
        }
        text.match_indices(needle)
            .filter(|(start, _)| is_word_bounded(text, *start, start + needle.len()))
            .map(|(start, _)| Mention {
                start,
                end: start + needle.len(),
                sentence: self.sentence_of(start),
                token: self.token_of(start),
            })
            .collect()
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn is_word_bounded(text: &str, start: usize, end: usize) -> bool {
    let before = text[..start].chars().next_back();
    let after = text[end..].chars().next();
    let first = text[start..end].chars().next();
    let last = text[start..end].chars().next_back();

    let left_ok = match (before, first) {
        (Some(b), Some(f)) => !(is_word_char(b) && is_word_char(f)),
        _ => true,
    };
    let right_ok = match (last, after) {
        (Some(l), Some(a)) => !(is_word_char(l) && is_word_char(a)),
        _ => true,
    };
    left_ok && right_ok
}

/// Byte offsets where sentences begin
///
/// A sentence ends at `.`, `!` or `?` followed by whitespace or the end of
/// the text, unless the period closes a known abbreviation.
fn sentence_starts(text: &str) -> Vec<usize> {
    let mut starts = vec![0];
    let chars: Vec<(usize, char)> = text.char_indices().collect();

    for (i, &(offset, c)) in chars.iter().enumerate() {
        if !matches!(c, '.' | '!' | '?') {
            continue;
        }
        let followed_by_space = chars.get(i + 1).is_some_and(|(_, next)| next.is_whitespace());
        if !followed_by_space {
            continue;
        }
        if c == '.' && closes_abbreviation(&text[..offset]) {
            continue;
        }
        if let Some(&(start, _)) = chars[i + 1..].iter().find(|(_, ch)| !ch.is_whitespace()) {
            starts.push(start);
        }
    }

    starts
}

fn closes_abbreviation(prefix: &str) -> bool {
    let word_start = prefix
        .char_indices()
        .rev()
        .find(|(_, c)| !c.is_alphabetic())
        .map_or(0, |(i, c)| i + c.len_utf8());
    ABBREVIATIONS.contains(&&prefix[word_start..])
}

fn token_starts(text: &str) -> Vec<usize> {
    let mut starts = Vec::new();
    let mut previous: Option<char> = None;
    for (offset, c) in text.char_indices() {
        let joins = matches!(previous, Some(p) if is_word_char(p) || p == '-' || p == '\'');
        if is_word_char(c) && !joins {
            starts.push(offset);
        }
        previous = Some(c);
    }
    starts
}

// ============================================================================
// Pair Scoring
// ============================================================================

/// Everything a scorer sees for one candidate pair
#[derive(Debug, Clone, Copy)]
pub struct PairContext<'a> {
    pub first: &'a Entity,
    pub second: &'a Entity,
    pub first_mentions: &'a [Mention],
    pub second_mentions: &'a [Mention],
    pub text: &'a str,
    pub window_size: usize,
}

/// A scored relationship before it receives an id
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredRelation {
    pub source_id: String,
    pub target_id: String,
    pub relationship_type: String,
    pub confidence: f64,
    /// Sentence distance between the closest mentions
    pub sentence_distance: usize,
}

/// Scores one candidate pair
///
/// `Ok(None)` means the pair carries no relationship; `Err` aborts the whole
/// inference call.
pub trait RelationScorer: Send + Sync {
    fn score(&self, pair: &PairContext<'_>) -> Result<Option<ScoredRelation>, String>;
}

/// Co-occurrence proximity scorer with verb-frame typing
pub struct ProximityScorer {
    active: Arc<[CompiledPattern]>,
    passive: Arc<[CompiledPattern]>,
}

impl ProximityScorer {
    /// Create a scorer, compiling the verb frames through `compiler`
    pub fn new(compiler: &PatternCompiler) -> Self {
        Self {
            active: compiler.compile(VERB_FRAMES),
            passive: compiler.compile(PASSIVE_VERB_FRAMES),
        }
    }

    /// Proximity score for two mentions
    pub fn proximity(sentence_distance: usize, token_distance: usize, window_size: usize) -> f64 {
        let window = window_size.max(1) as f64;
        match sentence_distance {
            0 if token_distance <= window_size => {
                0.6 + 0.3 * (1.0 - token_distance.saturating_sub(1) as f64 / window)
            }
            0 => 0.55,
            sd => 0.45 / sd as f64,
        }
    }

    /// Relationship type named by the text between two mentions, and whether
    /// the frame is passive
    fn verb_frame(&self, between: &str) -> Option<(String, bool)> {
        if let Some(frame) = self.passive.iter().find(|p| p.regex.is_match(between)) {
            return Some((frame.label.clone(), true));
        }
        self.active
            .iter()
            .find(|p| p.regex.is_match(between))
            .map(|frame| (frame.label.clone(), false))
    }
}

impl Default for ProximityScorer {
    fn default() -> Self {
        Self::new(&PatternCompiler::new())
    }
}

impl RelationScorer for ProximityScorer {
    fn score(&self, pair: &PairContext<'_>) -> Result<Option<ScoredRelation>, String> {
        let mut best: Option<(Mention, Mention, usize, usize)> = None;
        for a in pair.first_mentions {
            for b in pair.second_mentions {
                let sd = a.sentence.abs_diff(b.sentence);
                let d = a.token.abs_diff(b.token);
                let better = match best {
                    Some((_, _, best_sd, best_d)) => (sd, d) < (best_sd, best_d),
                    None => true,
                };
                if better {
                    best = Some((*a, *b, sd, d));
                }
            }
        }
        let Some((ma, mb, sd, d)) = best else {
            return Ok(None);
        };

        // endpoints follow the text unless a passive frame reverses them
        let (lead, lead_mention, trail, trail_mention) = if ma.start <= mb.start {
            (pair.first, ma, pair.second, mb)
        } else {
            (pair.second, mb, pair.first, ma)
        };

        let mut confidence = Self::proximity(sd, d, pair.window_size);
        let mut relationship_type = GENERIC_RELATIONSHIP.to_string();
        let mut reversed = false;

        if sd == 0 && lead_mention.end <= trail_mention.start {
            let between = &pair.text[lead_mention.end..trail_mention.start];
            if let Some((frame, passive)) = self.verb_frame(between) {
                relationship_type = frame;
                reversed = passive;
                confidence += VERB_BONUS;
            }
        }

        let (source, target) = if reversed { (trail, lead) } else { (lead, trail) };

        Ok(Some(ScoredRelation {
            source_id: source.id.clone(),
            target_id: target.id.clone(),
            relationship_type,
            confidence: confidence.min(MAX_RELATIONSHIP_CONFIDENCE),
            sentence_distance: sd,
        }))
    }
}

// ============================================================================
// Inference Engine
// ============================================================================

/// Whether a pair is a degenerate same-type pair
pub fn is_blocked_pair(a: &Entity, b: &Entity) -> bool {
    a.entity_type == b.entity_type && BLOCKED_SAME_TYPE.contains(&a.entity_type.as_str())
}

/// All unordered candidate pairs, blocklist applied, in entity order
pub fn candidate_pairs(entities: &[Entity]) -> Vec<(usize, usize)> {
    let mut pairs = Vec::new();
    for i in 0..entities.len() {
        for j in (i + 1)..entities.len() {
            if entities[i].id != entities[j].id && !is_blocked_pair(&entities[i], &entities[j]) {
                pairs.push((i, j));
            }
        }
    }
    pairs
}

struct Proposed {
    pair_index: usize,
    relationship: Relationship,
}

/// Relationship inference over a candidate-pair set, serial or pooled
pub struct RelationshipInference {
    scorer: Arc<dyn RelationScorer>,
    pools: Mutex<HashMap<usize, Arc<ThreadPool>>>,
}

impl RelationshipInference {
    /// Create with the default proximity scorer
    pub fn new(compiler: &PatternCompiler) -> Self {
        Self::with_scorer(Arc::new(ProximityScorer::new(compiler)))
    }

    /// Create with a custom scorer
    pub fn with_scorer(scorer: Arc<dyn RelationScorer>) -> Self {
        Self {
            scorer,
            pools: Mutex::new(HashMap::new()),
        }
    }

    /// Infer relationships between `entities` from their co-occurrence in `text`
    ///
    /// Any scorer error or panic fails the whole call; no partial result is
    /// returned.
    pub fn infer(
        &self,
        entities: &[Entity],
        context: &OntologyGenerationContext,
        text: &str,
    ) -> Result<Vec<Relationship>, WorkerFailure> {
        self.infer_pairs(entities, candidate_pairs(entities), context, text)
    }

    /// Infer only the pairs involving `entities[first_new..]`
    pub fn infer_extending(
        &self,
        entities: &[Entity],
        first_new: usize,
        context: &OntologyGenerationContext,
        text: &str,
    ) -> Result<Vec<Relationship>, WorkerFailure> {
        let pairs = candidate_pairs(entities)
            .into_iter()
            .filter(|&(_, j)| j >= first_new)
            .collect();
        self.infer_pairs(entities, pairs, context, text)
    }

    fn infer_pairs(
        &self,
        entities: &[Entity],
        pairs: Vec<(usize, usize)>,
        context: &OntologyGenerationContext,
        text: &str,
    ) -> Result<Vec<Relationship>, WorkerFailure> {
        let settings = context.settings();
        if pairs.is_empty() {
            return Ok(Vec::new());
        }

        let index = TextIndex::new(text);
        let mentions: Vec<Vec<Mention>> = entities
            .iter()
            .map(|e| index.mentions(text, &e.text))
            .collect();

        let job = ScoringJob {
            scorer: self.scorer.as_ref(),
            entities,
            mentions: &mentions,
            text,
            window_size: settings.window_size,
            sentence_window: settings.sentence_window,
            threshold: settings.confidence_threshold,
            ids: IdSequence::new(),
        };

        let parallel =
            settings.enable_parallel_inference && entities.len() >= PARALLEL_MIN_ENTITIES;
        let indexed: Vec<(usize, (usize, usize))> = pairs.into_iter().enumerate().collect();

        let mut proposed = if parallel {
            let workers = settings.max_workers.max(1);
            let pool = self.pool(workers)?;
            let chunk_size = indexed.len().div_ceil(workers);

            tracing::debug!(
                workers,
                pairs = indexed.len(),
                chunk_size,
                "running parallel relationship inference"
            );

            let buffers = pool.install(|| {
                indexed
                    .par_chunks(chunk_size)
                    .enumerate()
                    .map(|(worker, chunk)| job.run_guarded(worker, chunk))
                    .collect::<Result<Vec<_>, WorkerFailure>>()
            })?;
            buffers.into_iter().flatten().collect::<Vec<_>>()
        } else {
            job.run_guarded(0, &indexed)?
        };

        // The cap keeps the earliest candidate pairs so serial and parallel
        // runs agree; the survivors are then ordered by id.
        proposed.sort_by_key(|p| p.pair_index);
        if settings.max_relationships > 0 {
            proposed.truncate(settings.max_relationships);
        }
        let mut relationships: Vec<Relationship> =
            proposed.into_iter().map(|p| p.relationship).collect();
        relationships.sort_by(|a, b| {
            id_number(&a.id)
                .cmp(&id_number(&b.id))
                .then_with(|| a.id.cmp(&b.id))
        });

        tracing::debug!(
            relationships = relationships.len(),
            ids_issued = job.ids.issued(),
            parallel,
            "relationship inference finished"
        );

        Ok(relationships)
    }

    fn pool(&self, workers: usize) -> Result<Arc<ThreadPool>, WorkerFailure> {
        let mut pools = self.pools.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(pool) = pools.get(&workers) {
            return Ok(Arc::clone(pool));
        }

        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("ontoforge-infer-{}", i))
            .build()
            .map_err(|e| WorkerFailure {
                worker: 0,
                message: format!("failed to build worker pool: {}", e),
            })?;
        let pool = Arc::new(pool);
        pools.insert(workers, Arc::clone(&pool));
        Ok(pool)
    }
}

struct ScoringJob<'a> {
    scorer: &'a dyn RelationScorer,
    entities: &'a [Entity],
    mentions: &'a [Vec<Mention>],
    text: &'a str,
    window_size: usize,
    sentence_window: usize,
    threshold: f64,
    ids: IdSequence,
}

impl ScoringJob<'_> {
    fn run_guarded(
        &self,
        worker: usize,
        chunk: &[(usize, (usize, usize))],
    ) -> Result<Vec<Proposed>, WorkerFailure> {
        match catch_unwind(AssertUnwindSafe(|| self.run(chunk))) {
            Ok(Ok(buffer)) => Ok(buffer),
            Ok(Err(message)) => Err(WorkerFailure { worker, message }),
            Err(panic) => Err(WorkerFailure {
                worker,
                message: panic_message(panic.as_ref()),
            }),
        }
    }

    fn run(&self, chunk: &[(usize, (usize, usize))]) -> Result<Vec<Proposed>, String> {
        let mut buffer = Vec::new();

        for &(pair_index, (i, j)) in chunk {
            let pair = PairContext {
                first: &self.entities[i],
                second: &self.entities[j],
                first_mentions: &self.mentions[i],
                second_mentions: &self.mentions[j],
                text: self.text,
                window_size: self.window_size,
            };

            let Some(scored) = self.scorer.score(&pair)? else {
                continue;
            };
            if self.sentence_window > 0 && scored.sentence_distance > self.sentence_window {
                continue;
            }
            if scored.confidence < self.threshold || scored.source_id == scored.target_id {
                continue;
            }

            buffer.push(Proposed {
                pair_index,
                relationship: Relationship::new(
                    self.ids.next_id(),
                    scored.source_id,
                    scored.target_id,
                    scored.relationship_type,
                    scored.confidence,
                ),
            });
        }

        Ok(buffer)
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("worker panicked: {}", s)
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("worker panicked: {}", s)
    } else {
        "worker panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn person(id: &str, text: &str) -> Entity {
        Entity::new(id, text, "Person", 0.6)
    }

    #[test]
    fn test_id_sequence() {
        let ids = IdSequence::new();
        assert_eq!(ids.next_id(), "rel_0001");
        assert_eq!(ids.next_id(), "rel_0002");
        assert_eq!(ids.issued(), 2);
    }

    #[test]
    fn test_id_number() {
        assert_eq!(id_number("rel_0007"), Some(7));
        assert_eq!(id_number("rel_10000"), Some(10_000));
        assert_eq!(id_number("ent_0001"), None);
    }

    struct EveryPair;

    impl RelationScorer for EveryPair {
        fn score(&self, pair: &PairContext<'_>) -> Result<Option<ScoredRelation>, String> {
            Ok(Some(ScoredRelation {
                source_id: pair.first.id.clone(),
                target_id: pair.second.id.clone(),
                relationship_type: GENERIC_RELATIONSHIP.to_string(),
                confidence: 0.9,
                sentence_distance: 0,
            }))
        }
    }

    #[test]
    fn test_ids_past_four_digits_stay_in_sequence() {
        let entities: Vec<Entity> = (1..=150)
            .map(|i| person(&format!("ent_{:04}", i), &format!("Person{}", i)))
            .collect();
        let inference = RelationshipInference::with_scorer(Arc::new(EveryPair));
        let context = OntologyGenerationContext::new("doc", "general");

        let relationships = inference.infer(&entities, &context, "").unwrap();
        assert_eq!(relationships.len(), 150 * 149 / 2);

        let numbers: Vec<usize> = relationships
            .iter()
            .map(|r| id_number(&r.id).unwrap())
            .collect();
        assert!(numbers.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(relationships[1000].id, "rel_1001");
        assert_eq!(relationships[9999].id, "rel_10000");
    }

    #[test]
    fn test_sentence_index() {
        let text = "Dr. Smith arrived. He left! Did he? Yes";
        let index = TextIndex::new(text);
        assert_eq!(index.sentence_count(), 4);
        assert_eq!(index.sentence_of(4), 0);
        assert_eq!(index.sentence_of(text.find("He").unwrap()), 1);
        assert_eq!(index.sentence_of(text.len() - 1), 3);
    }

    #[test]
    fn test_mentions_are_whole_words() {
        let text = "Bob met Bobby. Bob left.";
        let index = TextIndex::new(text);
        let mentions = index.mentions(text, "Bob");
        assert_eq!(mentions.len(), 2);
        assert_eq!(mentions[1].sentence, 1);
        assert_eq!(index.mentions("costs $5 now", "$5").len(), 1);
    }

    #[test]
    fn test_proximity_bands() {
        assert!((ProximityScorer::proximity(0, 1, 5) - 0.9).abs() < 1e-9);
        assert!(ProximityScorer::proximity(0, 5, 5) > ProximityScorer::proximity(0, 6, 5));
        assert_eq!(ProximityScorer::proximity(0, 20, 5), 0.55);
        assert_eq!(ProximityScorer::proximity(1, 1, 5), 0.45);
        assert!(ProximityScorer::proximity(2, 1, 5) < 0.5);
    }

    #[test]
    fn test_verb_frame_types_relationship() {
        let text = "Alice manages Bob.";
        let entities = vec![person("ent_0001", "Alice"), person("ent_0002", "Bob")];
        let inference = RelationshipInference::new(&PatternCompiler::new());
        let ctx = OntologyGenerationContext::new("doc", "general");

        let relationships = inference.infer(&entities, &ctx, text).unwrap();
        assert_eq!(relationships.len(), 1);
        assert_eq!(relationships[0].id, "rel_0001");
        assert_eq!(relationships[0].source_id, "ent_0001");
        assert_eq!(relationships[0].target_id, "ent_0002");
        assert_eq!(relationships[0].relationship_type, "manages");
    }

    #[test]
    fn test_passive_frame_reverses_direction() {
        let text = "Bob is employed by Acme Corp.";
        let entities = vec![
            person("ent_0001", "Bob"),
            Entity::new("ent_0002", "Acme Corp", "Organization", 0.85),
        ];
        let inference = RelationshipInference::new(&PatternCompiler::new());
        let ctx = OntologyGenerationContext::new("doc", "general");

        let relationships = inference.infer(&entities, &ctx, text).unwrap();
        assert_eq!(relationships[0].relationship_type, "employs");
        assert_eq!(relationships[0].source_id, "ent_0002");
        assert_eq!(relationships[0].target_id, "ent_0001");
    }

    #[test]
    fn test_blocked_pairs_are_skipped() {
        let entities = vec![
            Entity::new("ent_0001", "2024-01-01", "Date", 0.9),
            Entity::new("ent_0002", "2024-02-01", "Date", 0.9),
            person("ent_0003", "Alice"),
        ];
        let pairs = candidate_pairs(&entities);
        assert_eq!(pairs, vec![(0, 2), (1, 2)]);
    }

    #[test]
    fn test_unrelated_sentences_fall_below_threshold() {
        let text = "Alice spoke. Later that week Bob left.";
        let entities = vec![person("ent_0001", "Alice"), person("ent_0002", "Bob")];
        let inference = RelationshipInference::new(&PatternCompiler::new());
        let ctx = OntologyGenerationContext::new("doc", "general");
        assert!(inference.infer(&entities, &ctx, text).unwrap().is_empty());
    }

    #[test]
    fn test_infer_extending_scores_only_new_pairs() {
        let text = "Alice manages Bob and Carol.";
        let entities = vec![
            person("ent_0001", "Alice"),
            person("ent_0002", "Bob"),
            person("ent_0003", "Carol"),
        ];
        let inference = RelationshipInference::new(&PatternCompiler::new());
        let ctx = OntologyGenerationContext::new("doc", "general");

        let all = inference.infer(&entities, &ctx, text).unwrap();
        assert!(all
            .iter()
            .any(|r| r.source_id == "ent_0001" && r.target_id == "ent_0002"));

        let extending = inference.infer_extending(&entities, 2, &ctx, text).unwrap();
        assert!(!extending.is_empty());
        assert!(extending
            .iter()
            .all(|r| r.source_id == "ent_0003" || r.target_id == "ent_0003"));
        assert!(inference.infer_extending(&entities, 3, &ctx, text).unwrap().is_empty());
    }

    #[test]
    fn test_panic_message() {
        let panic = catch_unwind(|| panic!("boom")).unwrap_err();
        assert_eq!(panic_message(panic.as_ref()), "worker panicked: boom");
    }
}
